//! Drives the four collaborators through the workflow stages.
//!
//! The controller owns the [`StateStore`] and decides, from the persisted
//! record alone, which collaborator runs next. It enforces the critique
//! retry ceiling and is the single place where run-level errors are caught:
//! a failing run resets the workflow before the error is returned.

use std::fmt;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use super::approval::{ApprovalDecision, ApprovalStrategy, Gate};
use super::persistence::PersistenceError;
use super::store::StateStore;
use super::types::{
    Critique, CritiqueStatus, HistoryDetails, HistoryEntry, Stage, StateSnapshot, StateUpdate,
    WorkflowState,
};
use crate::config::WorkflowSettings;
use crate::roles::WorkflowRoles;
use crate::telemetry::{create_stage_span, create_workflow_span, generate_correlation_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Instructor,
    Preparer,
    Executor,
    Critic,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Instructor => "instructor",
            Role::Preparer => "preparer",
            Role::Executor => "executor",
            Role::Critic => "critic",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Cannot run {stage}: {missing} is missing from the workflow state")]
    MissingPrerequisite { stage: Stage, missing: &'static str },

    #[error("The instructor did not produce an instruction")]
    InstructionMissing,

    #[error("{role} failed: {source}")]
    Collaborator {
        role: Role,
        #[source]
        source: anyhow::Error,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// The critic's decision predicate held
    Accepted,
    /// The retry ceiling was exceeded; the last critique is accepted as is
    RetryCeiling,
    /// Retrying was declined at the `continue_retrying` gate
    RetryDeclined,
}

/// What a completed workflow hands to report and export consumers
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub final_status: Option<CritiqueStatus>,
    pub reason: CompletionReason,
    pub iteration_count: u32,
    pub history: Vec<HistoryEntry>,
}

impl CompletionReport {
    pub fn forced(&self) -> bool {
        self.reason == CompletionReason::RetryCeiling
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    Completed(CompletionReport),
    /// A gate was declined or left unanswered; committed state is kept
    Stopped { gate: Gate },
    /// A collaborator declined to produce a result; the state stays resumable
    Abandoned { role: Role },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Entry {
    Instruct,
    Prepare,
    Execute,
    Critique,
}

pub struct WorkflowController {
    store: StateStore,
    roles: WorkflowRoles,
    approval: Box<dyn ApprovalStrategy>,
    settings: WorkflowSettings,
    previous_critiques: Vec<Critique>,
}

impl fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowController")
            .field("store", &self.store)
            .field("settings", &self.settings)
            .field("previous_critiques", &self.previous_critiques.len())
            .finish_non_exhaustive()
    }
}

impl WorkflowController {
    pub fn new(
        store: StateStore,
        roles: WorkflowRoles,
        approval: impl ApprovalStrategy + 'static,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            store,
            roles,
            approval: Box::new(approval),
            settings,
            previous_critiques: Vec::new(),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.store.state()
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.store.subscribe()
    }

    /// Entry point for a user asking to start. A workflow already in progress
    /// is continued or replaced depending on the `continue_existing` answer.
    pub async fn start_workflow(&mut self) -> Result<WorkflowOutcome, WorkflowError> {
        let stage = self.store.current_stage();
        if stage == Stage::Idle {
            return self.run_workflow().await;
        }

        let gate = Gate::ContinueExisting { stage };
        match self.approval.confirm(gate).await {
            ApprovalDecision::Accept => self.continue_workflow().await,
            ApprovalDecision::Decline => {
                self.reset_workflow()?;
                self.run_workflow().await
            }
            ApprovalDecision::Cancel => {
                info!(stage = %stage, "Start cancelled, existing workflow left untouched");
                Ok(WorkflowOutcome::Stopped { gate })
            }
        }
    }

    /// Run a fresh attempt from the instructor onwards. Any previous record
    /// is discarded first so the iteration count belongs to this attempt.
    pub async fn run_workflow(&mut self) -> Result<WorkflowOutcome, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("run", &correlation_id);

        async {
            info!(
                max_critique_iterations = self.settings.max_critique_iterations,
                auto_proceed = self.settings.auto_proceed,
                "Starting EDA workflow"
            );
            let result = self.run_fresh().await;
            self.guard(result)
        }
        .instrument(span)
        .await
    }

    /// Pick up a mid-flight workflow at the step its persisted artifacts
    /// call for, then carry on through the rest of the pipeline.
    pub async fn continue_workflow(&mut self) -> Result<WorkflowOutcome, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("continue", &correlation_id);

        async {
            let result = self.resume().await;
            self.guard(result)
        }
        .instrument(span)
        .await
    }

    pub fn reset_workflow(&mut self) -> Result<(), WorkflowError> {
        self.previous_critiques.clear();
        self.store.reset()?;
        Ok(())
    }

    /// Top-level error boundary: a failed run leaves the workflow idle.
    fn guard(
        &mut self,
        result: Result<WorkflowOutcome, WorkflowError>,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                error!(error = %err, stage = %self.store.current_stage(), "Workflow failed, resetting");
                self.previous_critiques.clear();
                if let Err(reset_err) = self.store.reset() {
                    error!(error = %reset_err, "Failed to reset workflow after error");
                }
                Err(err)
            }
        }
    }

    async fn run_fresh(&mut self) -> Result<WorkflowOutcome, WorkflowError> {
        if self.store.current_stage() != Stage::Idle {
            debug!(stage = %self.store.current_stage(), "Discarding previous workflow record");
            self.previous_critiques.clear();
            self.store.reset()?;
        }
        self.drive(Entry::Instruct, 0).await
    }

    async fn resume(&mut self) -> Result<WorkflowOutcome, WorkflowError> {
        let state = self.store.state();
        self.previous_critiques = rejected_critiques(&state.history);
        let counter = state.iteration_count;

        info!(
            stage = %state.current_stage,
            iteration_count = counter,
            seeded_critiques = self.previous_critiques.len(),
            "Resuming EDA workflow"
        );

        match state.current_stage {
            Stage::FatherInstruction if state.instruction.is_some() => {
                self.drive(Entry::Prepare, counter).await
            }
            Stage::FatherInstruction => {
                info!("No instruction recorded, starting from the instructor");
                self.run_fresh().await
            }
            Stage::MotherDelivery if state.data.is_some() => {
                self.drive(Entry::Execute, counter).await
            }
            Stage::MotherDelivery => self.drive(Entry::Prepare, counter).await,
            Stage::SonExecution => match (&state.execution, &state.critique) {
                (Some(execution), Some(critique))
                    if critique.execution_id == execution.id && critique.needs_improvement() =>
                {
                    self.resume_retry(critique.clone(), counter).await
                }
                (Some(_), _) => self.drive(Entry::Critique, counter).await,
                (None, _) => self.drive(Entry::Execute, counter).await,
            },
            Stage::DaughterCritique => match state.critique {
                Some(critique) if critique.needs_improvement() => {
                    self.resume_retry(critique, counter).await
                }
                Some(critique) => self.finalize(Some(critique), CompletionReason::Accepted),
                None => self.drive(Entry::Critique, counter).await,
            },
            Stage::Idle | Stage::Completed => self.run_fresh().await,
        }
    }

    /// Re-enter the retry loop with a rejected critique as prior feedback.
    async fn resume_retry(
        &mut self,
        critique: Critique,
        counter: u32,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        if self.previous_critiques.last().map(|c| &c.id) != Some(&critique.id) {
            self.previous_critiques.push(critique.clone());
        }

        if counter > self.settings.max_critique_iterations {
            warn!(
                iteration_count = counter,
                max = self.settings.max_critique_iterations,
                "Retry ceiling already reached, completing with the last critique"
            );
            return self.finalize(Some(critique), CompletionReason::RetryCeiling);
        }

        self.drive(Entry::Execute, counter).await
    }

    async fn drive(&mut self, entry: Entry, counter: u32) -> Result<WorkflowOutcome, WorkflowError> {
        if entry == Entry::Instruct {
            self.instruct().await?;
            if !self.gate(Gate::BeforePreparer).await {
                return Ok(WorkflowOutcome::Stopped { gate: Gate::BeforePreparer });
            }
        }

        if entry <= Entry::Prepare {
            if !self.prepare().await? {
                return Ok(WorkflowOutcome::Abandoned { role: Role::Preparer });
            }
            if !self.gate(Gate::BeforeExecution).await {
                return Ok(WorkflowOutcome::Stopped { gate: Gate::BeforeExecution });
            }
        }

        self.retry_loop(entry == Entry::Critique, counter).await
    }

    async fn retry_loop(
        &mut self,
        mut skip_execution: bool,
        mut counter: u32,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let max = self.settings.max_critique_iterations;

        loop {
            if !skip_execution {
                if !self.execute(counter).await? {
                    return Ok(WorkflowOutcome::Abandoned { role: Role::Executor });
                }
                let gate = Gate::BeforeCritique { iteration: counter };
                if !self.gate(gate).await {
                    return Ok(WorkflowOutcome::Stopped { gate });
                }
            }
            skip_execution = false;

            let Some(critique) = self.critique(counter).await? else {
                return Ok(WorkflowOutcome::Abandoned { role: Role::Critic });
            };

            if self
                .roles
                .critic
                .should_proceed_to_instructor(&critique, &self.settings)
            {
                return self.finalize(Some(critique), CompletionReason::Accepted);
            }

            self.previous_critiques.push(critique.clone());
            counter += 1;

            if counter > max {
                warn!(
                    max,
                    status = %critique.status,
                    "Maximum critique iterations reached, proceeding with current results"
                );
                return self.finalize(Some(critique), CompletionReason::RetryCeiling);
            }

            if !self.gate(Gate::ContinueRetrying { iteration: counter }).await {
                info!(iteration = counter, "Retrying declined, completing with the last critique");
                return self.finalize(Some(critique), CompletionReason::RetryDeclined);
            }
        }
    }

    /// `true` when the run may cross `gate`
    async fn gate(&self, gate: Gate) -> bool {
        if self.settings.auto_proceed {
            return true;
        }
        match self.approval.confirm(gate).await {
            ApprovalDecision::Accept => true,
            decision => {
                info!(gate = %gate, decision = ?decision, "Workflow paused at gate");
                false
            }
        }
    }

    async fn instruct(&mut self) -> Result<(), WorkflowError> {
        let instruction = self
            .roles
            .instructor
            .create_instruction()
            .instrument(create_stage_span(Role::Instructor.as_str(), 0))
            .await
            .map_err(|source| WorkflowError::Collaborator {
                role: Role::Instructor,
                source,
            })?
            .ok_or(WorkflowError::InstructionMissing)?;

        info!(
            instruction_id = %instruction.id,
            kind = %instruction.kind,
            "Instruction created"
        );
        self.store.set_instruction(instruction)?;
        Ok(())
    }

    async fn prepare(&mut self) -> Result<bool, WorkflowError> {
        let data = self
            .roles
            .preparer
            .select_and_prepare_data()
            .instrument(create_stage_span(Role::Preparer.as_str(), 0))
            .await
            .map_err(|source| WorkflowError::Collaborator {
                role: Role::Preparer,
                source,
            })?;

        let Some(data) = data else {
            warn!("Preparer produced no data, stopping");
            return Ok(false);
        };

        info!(data_id = %data.id, path = %data.path, format = %data.format, "Data prepared");
        self.store.set_data(data)?;
        Ok(true)
    }

    async fn execute(&mut self, iteration: u32) -> Result<bool, WorkflowError> {
        let state = self.store.state();
        let instruction = state.instruction.ok_or(WorkflowError::MissingPrerequisite {
            stage: Stage::SonExecution,
            missing: "instruction",
        })?;
        let data = state.data.ok_or(WorkflowError::MissingPrerequisite {
            stage: Stage::SonExecution,
            missing: "data",
        })?;
        let prior = self.previous_critiques.last();

        let execution = self
            .roles
            .executor
            .execute(&instruction, &data, prior)
            .instrument(create_stage_span(Role::Executor.as_str(), iteration))
            .await
            .map_err(|source| WorkflowError::Collaborator {
                role: Role::Executor,
                source,
            })?;

        let Some(execution) = execution else {
            warn!(iteration, "Executor produced no execution, stopping");
            return Ok(false);
        };

        if execution.is_completed() {
            info!(execution_id = %execution.id, results = execution.results.len(), "Execution completed");
        } else {
            warn!(
                execution_id = %execution.id,
                status = ?execution.status,
                error = execution.error.as_deref().unwrap_or(""),
                "Execution did not complete"
            );
        }
        self.store.set_execution(execution)?;
        Ok(true)
    }

    async fn critique(&mut self, iteration: u32) -> Result<Option<Critique>, WorkflowError> {
        let execution = self
            .store
            .state()
            .execution
            .ok_or(WorkflowError::MissingPrerequisite {
                stage: Stage::DaughterCritique,
                missing: "execution",
            })?;

        let critique = self
            .roles
            .critic
            .critique_results(&execution, &self.previous_critiques)
            .instrument(create_stage_span(Role::Critic.as_str(), iteration))
            .await
            .map_err(|source| WorkflowError::Collaborator {
                role: Role::Critic,
                source,
            })?;

        let Some(critique) = critique else {
            warn!(iteration, "Critic produced no critique, stopping");
            return Ok(None);
        };

        info!(
            critique_id = %critique.id,
            status = %critique.status,
            issues = critique.issues.len(),
            "Critique recorded"
        );
        self.store.set_critique(critique.clone())?;
        Ok(Some(critique))
    }

    fn finalize(
        &mut self,
        critique: Option<Critique>,
        reason: CompletionReason,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        self.store.update_state(StateUpdate::stage(Stage::Completed))?;
        self.previous_critiques.clear();

        let state = self.store.state();
        let report = CompletionReport {
            final_status: critique.map(|c| c.status),
            reason,
            iteration_count: state.iteration_count,
            history: state.history,
        };

        info!(
            final_status = report.final_status.map(|s| s.as_str()).unwrap_or("none"),
            reason = ?report.reason,
            iteration_count = report.iteration_count,
            "Workflow completed"
        );
        Ok(WorkflowOutcome::Completed(report))
    }
}

/// Rejected critiques of the current attempt, oldest first, as recorded in
/// history.
fn rejected_critiques(history: &[HistoryEntry]) -> Vec<Critique> {
    history
        .iter()
        .filter_map(|entry| match &entry.details {
            HistoryDetails::CritiqueCommitted { critique, .. } if critique.needs_improvement() => {
                Some(critique.clone())
            }
            _ => None,
        })
        .collect()
}

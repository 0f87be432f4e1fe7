//! Owner of the single persisted workflow record.
//!
//! Every mutation goes through [`StateStore::update_state`]: the partial
//! update is merged into a copy of the current state, a history entry is
//! appended when the stage changes, the result is written to the backend, and
//! only then does the in-memory copy move forward. Observers are notified
//! through a `watch` channel after each successful write.

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::persistence::{PersistedRecord, PersistenceConfig, PersistenceError, StatePersistence};
use super::types::{
    Critique, DataDescriptor, Execution, HistoryDetails, HistoryEntry, Instruction, Stage,
    StateSnapshot, StateUpdate, WorkflowState,
};

pub struct StateStore {
    persistence: Box<dyn StatePersistence>,
    key: String,
    max_history_entries: Option<usize>,
    state: WorkflowState,
    notifier: watch::Sender<StateSnapshot>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("key", &self.key)
            .field("max_history_entries", &self.max_history_entries)
            .field("state", &self.state)
            .finish()
    }
}

impl StateStore {
    /// Load the record for `config.state_key`, or start from the idle default
    /// when nothing has been persisted yet.
    pub fn open(
        persistence: impl StatePersistence + 'static,
        config: &PersistenceConfig,
    ) -> Result<Self, PersistenceError> {
        let state = match persistence.load(&config.state_key)? {
            Some(record) => record.state,
            None => {
                debug!(key = %config.state_key, "Starting from idle workflow state");
                WorkflowState::default()
            }
        };

        let (notifier, _) = watch::channel(StateSnapshot::from(&state));

        Ok(Self {
            persistence: Box::new(persistence),
            key: config.state_key.clone(),
            max_history_entries: config.max_history_entries,
            state,
            notifier,
        })
    }

    /// Copy of the current state; mutating it has no effect on the store.
    pub fn state(&self) -> WorkflowState {
        self.state.clone()
    }

    pub fn current_stage(&self) -> Stage {
        self.state.current_stage
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Receive a snapshot after every committed mutation
    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.notifier.subscribe()
    }

    pub fn update_state(&mut self, update: StateUpdate) -> Result<(), PersistenceError> {
        let mut next = self.state.clone();
        let previous_stage = next.current_stage;

        if let Some(instruction) = &update.instruction {
            next.instruction = Some(instruction.clone());
        }
        if let Some(data) = &update.data {
            next.data = Some(data.clone());
        }
        if let Some(execution) = &update.execution {
            next.execution = Some(execution.clone());
        }
        if let Some(critique) = &update.critique {
            next.critique = Some(critique.clone());
        }
        if let Some(count) = update.iteration_count {
            next.iteration_count = count;
        }

        if let Some(stage) = update.current_stage {
            next.current_stage = stage;
            let details = history_details(&update, &next);
            next.history.push(HistoryEntry {
                stage,
                timestamp: Utc::now(),
                details,
            });
            self.prune_history(&mut next);

            info!(
                key = %self.key,
                from = %previous_stage,
                to = %stage,
                iteration_count = next.iteration_count,
                "Workflow stage transition"
            );
        }

        self.commit(next)
    }

    pub fn set_instruction(&mut self, instruction: Instruction) -> Result<(), PersistenceError> {
        self.update_state(StateUpdate::stage(Stage::FatherInstruction).with_instruction(instruction))
    }

    pub fn set_data(&mut self, data: DataDescriptor) -> Result<(), PersistenceError> {
        self.update_state(StateUpdate::stage(Stage::MotherDelivery).with_data(data))
    }

    pub fn set_execution(&mut self, execution: Execution) -> Result<(), PersistenceError> {
        self.update_state(StateUpdate::stage(Stage::SonExecution).with_execution(execution))
    }

    /// Commit a critique. A `needs_improvement` verdict counts one iteration
    /// and sends the workflow back to execution; any other verdict parks it
    /// at `daughter_critique`.
    pub fn set_critique(&mut self, critique: Critique) -> Result<(), PersistenceError> {
        let update = if critique.needs_improvement() {
            StateUpdate::stage(Stage::SonExecution)
                .with_iteration_count(self.state.iteration_count + 1)
        } else {
            StateUpdate::stage(Stage::DaughterCritique)
        };

        self.update_state(update.with_critique(critique))
    }

    /// Return to the idle default, dropping every artifact and the history.
    pub fn reset(&mut self) -> Result<(), PersistenceError> {
        info!(key = %self.key, from = %self.state.current_stage, "Resetting workflow state");
        self.commit(WorkflowState::default())
    }

    pub fn can_proceed_to_next_stage(&self) -> bool {
        let state = &self.state;
        match state.current_stage {
            Stage::Idle => true,
            Stage::FatherInstruction => state.instruction.is_some(),
            Stage::MotherDelivery => state.data.is_some(),
            Stage::SonExecution => state.execution.as_ref().is_some_and(|e| e.is_completed()),
            Stage::DaughterCritique => state.critique.as_ref().is_some_and(|c| !c.needs_improvement()),
            Stage::Completed => false,
        }
    }

    fn commit(&mut self, next: WorkflowState) -> Result<(), PersistenceError> {
        self.persistence.save(&PersistedRecord::new(&self.key, next.clone()))?;
        self.state = next;
        self.notifier.send_replace(StateSnapshot::from(&self.state));
        Ok(())
    }

    fn prune_history(&self, state: &mut WorkflowState) {
        if let Some(max) = self.max_history_entries {
            if state.history.len() > max {
                let excess = state.history.len() - max;
                state.history.drain(0..excess);
                debug!(
                    key = %self.key,
                    pruned = excess,
                    remaining = state.history.len(),
                    "Pruned excess history entries"
                );
            }
        }
    }
}

fn history_details(update: &StateUpdate, merged: &WorkflowState) -> HistoryDetails {
    if let Some(critique) = &update.critique {
        HistoryDetails::CritiqueCommitted {
            critique: critique.clone(),
            iteration_count: merged.iteration_count,
        }
    } else if let Some(execution) = &update.execution {
        HistoryDetails::ExecutionCommitted {
            execution: execution.clone(),
        }
    } else if let Some(data) = &update.data {
        HistoryDetails::DataCommitted { data: data.clone() }
    } else if let Some(instruction) = &update.instruction {
        HistoryDetails::InstructionCommitted {
            instruction: instruction.clone(),
        }
    } else if merged.current_stage == Stage::Completed {
        HistoryDetails::WorkflowCompleted {
            final_status: merged.critique.as_ref().map(|c| c.status),
        }
    } else {
        HistoryDetails::StageChanged
    }
}

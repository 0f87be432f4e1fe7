//! Scripted collaborators shared by the workflow integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use eda_family::config::WorkflowSettings;
use eda_family::roles::{Critic, Executor, Instructor, Preparer, WorkflowRoles};
use eda_family::workflow::{
    AnalysisKind, ApprovalDecision, ApprovalStrategy, Critique, CritiqueStatus, DataDescriptor,
    Execution, ExecutionStatus, Gate, Instruction, Priority,
};

pub fn sample_instruction() -> Instruction {
    Instruction {
        id: "instr_sample".to_string(),
        kind: AnalysisKind::StatisticalSummary,
        description: "Summarise every numeric column".to_string(),
        parameters: HashMap::from([("precision".to_string(), json!(2))]),
        priority: Priority::Low,
    }
}

pub fn sample_data() -> DataDescriptor {
    DataDescriptor {
        id: "data_sample".to_string(),
        path: "/data/sales.csv".to_string(),
        format: "csv".to_string(),
        size_bytes: 4096,
        metadata: HashMap::from([("row_count".to_string(), json!(120))]),
    }
}

pub fn sample_execution(id: &str, status: ExecutionStatus) -> Execution {
    Execution {
        id: id.to_string(),
        instruction_id: "instr_sample".to_string(),
        data_id: "data_sample".to_string(),
        results: vec![json!({"type": "analysis_summary"})],
        status,
        error: None,
    }
}

pub fn sample_critique(id: &str, execution_id: &str, status: CritiqueStatus) -> Critique {
    Critique {
        id: id.to_string(),
        execution_id: execution_id.to_string(),
        feedback: format!("scripted {status}"),
        issues: vec![],
        status,
        timestamp: Utc::now(),
    }
}

pub fn settings(max_critique_iterations: u32, auto_proceed: bool) -> WorkflowSettings {
    WorkflowSettings {
        auto_proceed,
        max_critique_iterations,
        ..WorkflowSettings::default()
    }
}

#[derive(Clone)]
pub struct ScriptedInstructor {
    instruction: Option<Instruction>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedInstructor {
    pub fn returning(instruction: Option<Instruction>) -> Self {
        Self {
            instruction,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Instructor for ScriptedInstructor {
    async fn create_instruction(&self) -> anyhow::Result<Option<Instruction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.instruction.clone())
    }
}

#[derive(Clone)]
pub struct ScriptedPreparer {
    data: Option<DataDescriptor>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedPreparer {
    pub fn returning(data: Option<DataDescriptor>) -> Self {
        Self {
            data,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Preparer for ScriptedPreparer {
    async fn select_and_prepare_data(&self) -> anyhow::Result<Option<DataDescriptor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.data.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorStep {
    Complete,
    Fail,
    Abstain,
    Error,
}

/// Executor following a script of steps; completes once the script runs out.
/// Records the id of the prior critique handed to every call.
#[derive(Clone)]
pub struct ScriptedExecutor {
    steps: Arc<Mutex<VecDeque<ExecutorStep>>>,
    pub priors: Arc<Mutex<Vec<Option<String>>>>,
    counter: Arc<AtomicUsize>,
}

impl ScriptedExecutor {
    pub fn completing() -> Self {
        Self::scripted(&[])
    }

    pub fn scripted(steps: &[ExecutorStep]) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.iter().copied().collect())),
            priors: Arc::new(Mutex::new(Vec::new())),
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.priors.lock().unwrap().len()
    }

    pub fn prior_ids(&self) -> Vec<Option<String>> {
        self.priors.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(
        &self,
        instruction: &Instruction,
        data: &DataDescriptor,
        prior_critique: Option<&Critique>,
    ) -> anyhow::Result<Option<Execution>> {
        self.priors
            .lock()
            .unwrap()
            .push(prior_critique.map(|c| c.id.clone()));
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ExecutorStep::Complete);

        let mut execution = Execution {
            id: format!("exec_{n}"),
            instruction_id: instruction.id.clone(),
            data_id: data.id.clone(),
            results: vec![json!({"type": "analysis_summary", "run": n})],
            status: ExecutionStatus::Completed,
            error: None,
        };

        match step {
            ExecutorStep::Complete => Ok(Some(execution)),
            ExecutorStep::Fail => {
                execution.results.clear();
                execution.status = ExecutionStatus::Failed;
                execution.error = Some("ModuleNotFoundError: No module named 'pandas'".to_string());
                Ok(Some(execution))
            }
            ExecutorStep::Abstain => Ok(None),
            ExecutorStep::Error => Err(anyhow::anyhow!("analysis host unreachable")),
        }
    }
}

/// Critic returning scripted verdicts; abstains once the script runs out.
/// Records how many prior critiques it was shown on each call.
#[derive(Clone)]
pub struct ScriptedCritic {
    verdicts: Arc<Mutex<VecDeque<CritiqueStatus>>>,
    pub prior_counts: Arc<Mutex<Vec<usize>>>,
    counter: Arc<AtomicUsize>,
}

impl ScriptedCritic {
    pub fn verdicts(verdicts: &[CritiqueStatus]) -> Self {
        Self {
            verdicts: Arc::new(Mutex::new(verdicts.iter().copied().collect())),
            prior_counts: Arc::new(Mutex::new(Vec::new())),
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prior_counts.lock().unwrap().len()
    }
}

#[async_trait]
impl Critic for ScriptedCritic {
    async fn critique_results(
        &self,
        execution: &Execution,
        prior_critiques: &[Critique],
    ) -> anyhow::Result<Option<Critique>> {
        self.prior_counts.lock().unwrap().push(prior_critiques.len());
        let Some(status) = self.verdicts.lock().unwrap().pop_front() else {
            return Ok(None);
        };
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(sample_critique(&format!("critique_{n}"), &execution.id, status)))
    }
}

/// Approval strategy answering from a policy and recording every gate asked.
#[derive(Clone)]
pub struct RecordingApproval {
    policy: Arc<dyn Fn(&Gate) -> ApprovalDecision + Send + Sync>,
    pub asked: Arc<Mutex<Vec<Gate>>>,
}

impl RecordingApproval {
    pub fn accept_all() -> Self {
        Self::with_policy(|_| ApprovalDecision::Accept)
    }

    pub fn with_policy(policy: impl Fn(&Gate) -> ApprovalDecision + Send + Sync + 'static) -> Self {
        Self {
            policy: Arc::new(policy),
            asked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn asked_gates(&self) -> Vec<Gate> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalStrategy for RecordingApproval {
    async fn confirm(&self, gate: Gate) -> ApprovalDecision {
        self.asked.lock().unwrap().push(gate);
        (self.policy)(&gate)
    }
}

/// Handles onto the scripted collaborators of one controller
#[derive(Clone)]
pub struct Family {
    pub instructor: ScriptedInstructor,
    pub preparer: ScriptedPreparer,
    pub executor: ScriptedExecutor,
    pub critic: ScriptedCritic,
}

impl Family {
    pub fn new(executor: ScriptedExecutor, critic: ScriptedCritic) -> Self {
        Self {
            instructor: ScriptedInstructor::returning(Some(sample_instruction())),
            preparer: ScriptedPreparer::returning(Some(sample_data())),
            executor,
            critic,
        }
    }

    pub fn roles(&self) -> WorkflowRoles {
        WorkflowRoles::new(
            self.instructor.clone(),
            self.preparer.clone(),
            self.executor.clone(),
            self.critic.clone(),
        )
    }
}

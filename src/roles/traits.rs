// Collaborator contracts - the controller only ever talks to these

use anyhow::Result;
use async_trait::async_trait;

use crate::config::WorkflowSettings;
use crate::workflow::types::{Critique, DataDescriptor, Execution, Instruction};

/// Issues the instruction that starts a workflow attempt.
/// `Ok(None)` means the instructor declined to produce one.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Instructor: Send + Sync {
    async fn create_instruction(&self) -> Result<Option<Instruction>>;
}

/// Chooses a dataset and describes it
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Preparer: Send + Sync {
    async fn select_and_prepare_data(&self) -> Result<Option<DataDescriptor>>;
}

/// Runs the analysis.
///
/// Failures inside the analysis must come back as an [`Execution`] with
/// `status = failed` and an `error`, so the critic can judge them. `Err` is
/// reserved for the executor itself breaking.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        instruction: &Instruction,
        data: &DataDescriptor,
        prior_critique: Option<&Critique>,
    ) -> Result<Option<Execution>>;
}

#[async_trait]
pub trait Critic: Send + Sync {
    /// Judge `execution`. `prior_critiques` holds every earlier verdict of
    /// this attempt, oldest first.
    async fn critique_results(
        &self,
        execution: &Execution,
        prior_critiques: &[Critique],
    ) -> Result<Option<Critique>>;

    /// Whether the pipeline is satisfied with `critique`
    fn should_proceed_to_instructor(&self, critique: &Critique, _settings: &WorkflowSettings) -> bool {
        !critique.needs_improvement()
    }
}

/// The four collaborators a controller drives
pub struct WorkflowRoles {
    pub instructor: Box<dyn Instructor>,
    pub preparer: Box<dyn Preparer>,
    pub executor: Box<dyn Executor>,
    pub critic: Box<dyn Critic>,
}

impl WorkflowRoles {
    pub fn new(
        instructor: impl Instructor + 'static,
        preparer: impl Preparer + 'static,
        executor: impl Executor + 'static,
        critic: impl Critic + 'static,
    ) -> Self {
        Self {
            instructor: Box::new(instructor),
            preparer: Box::new(preparer),
            executor: Box::new(executor),
            critic: Box::new(critic),
        }
    }
}

impl std::fmt::Debug for WorkflowRoles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRoles").finish_non_exhaustive()
    }
}

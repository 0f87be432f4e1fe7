//! Collaborators driven by the workflow controller
//!
//! The controller depends only on the traits in [`traits`]. The
//! implementations here are the ones the binary wires up; tests and
//! embedders are free to substitute their own.

pub mod critic;
pub mod executor;
pub mod instructor;
pub mod preparer;
pub mod script;
pub mod traits;

pub use critic::RuleBasedCritic;
pub use executor::CommandExecutor;
pub use instructor::ConfiguredInstructor;
pub use preparer::FilePreparer;
pub use script::generate_analysis_script;
pub use traits::{Critic, Executor, Instructor, Preparer, WorkflowRoles};

use crate::config::EdaFamilyConfig;

impl WorkflowRoles {
    /// Wire the reference collaborators from configuration
    pub fn from_config(config: &EdaFamilyConfig) -> Self {
        Self::new(
            ConfiguredInstructor::new(config.instructor.clone()),
            FilePreparer::new(config.preparer.clone()),
            CommandExecutor::new(config.executor.clone()),
            RuleBasedCritic::new(),
        )
    }
}

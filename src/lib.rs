// eda-family library - resumable workflow control for exploratory data analysis
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod roles;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use config::{EdaFamilyConfig, WorkflowSettings};
pub use roles::{Critic, Executor, Instructor, Preparer, WorkflowRoles};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use workflow::{
    ApprovalDecision, ApprovalStrategy, AutoApprove, CompletionReport, Gate, InteractiveApproval,
    StateStore, WorkflowController, WorkflowError, WorkflowOutcome, WorkflowState,
};

//! Workflow control core
//!
//! A single persisted [`WorkflowState`] record moves through the stages
//! `idle → father_instruction → mother_delivery → son_execution ⇄
//! daughter_critique → completed`.
//!
//! - **Types**: the record, its artifacts and the tagged history log
//! - **Persistence**: versioned save/load behind [`StatePersistence`]
//! - **Store**: merge, history bookkeeping and observer notification
//! - **Approval**: confirmation gates between stages
//! - **Controller**: fresh runs, resumption, retry ceiling and reset-on-error
//! - **Export**: JSON export document and plain-text summary

pub mod approval;
pub mod controller;
pub mod export;
pub mod persistence;
pub mod store;
pub mod types;

pub use approval::{
    ApprovalDecision, ApprovalRequest, ApprovalStrategy, AutoApprove, Gate, InteractiveApproval,
};
pub use controller::{
    CompletionReason, CompletionReport, Role, WorkflowController, WorkflowError, WorkflowOutcome,
};
pub use export::{render_summary, write_export, ExportDocument};
pub use persistence::{
    FileSystemPersistence, InMemoryPersistence, PersistedRecord, PersistenceConfig,
    PersistenceError, StatePersistence,
};
pub use store::StateStore;
pub use types::{
    AnalysisKind, Critique, CritiqueIssue, CritiqueStatus, DataDescriptor, Execution,
    ExecutionStatus, HistoryDetails, HistoryEntry, Instruction, Priority, Severity, Stage,
    StateSnapshot, StateUpdate, WorkflowState,
};

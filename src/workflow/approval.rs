//! Confirmation gates between stages.
//!
//! The controller asks an [`ApprovalStrategy`] before crossing a gate. The
//! algorithm does not care whether the answer comes from a human or from
//! [`AutoApprove`]; anything other than [`ApprovalDecision::Accept`] means
//! "do not proceed".

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::types::Stage;

/// Points at which a run may pause for confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// A workflow is already in progress. Accept continues it, decline resets
    /// and starts over.
    ContinueExisting { stage: Stage },
    BeforePreparer,
    BeforeExecution,
    BeforeCritique { iteration: u32 },
    /// The critic asked for improvements; accept runs the executor again.
    ContinueRetrying { iteration: u32 },
}

impl Gate {
    pub fn prompt(&self) -> String {
        match self {
            Gate::ContinueExisting { stage } => format!(
                "A workflow is already in progress (stage: {}). Continue it? (no resets and starts over)",
                stage
            ),
            Gate::BeforePreparer => "Proceed to data preparation?".to_string(),
            Gate::BeforeExecution => "Proceed to execution?".to_string(),
            Gate::BeforeCritique { .. } => "Proceed to critique?".to_string(),
            Gate::ContinueRetrying { iteration } => format!(
                "Iteration {}: the critic found issues. Run the executor again with its feedback?",
                iteration
            ),
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::ContinueExisting { .. } => f.write_str("continue_existing"),
            Gate::BeforePreparer => f.write_str("before_preparer"),
            Gate::BeforeExecution => f.write_str("before_execution"),
            Gate::BeforeCritique { .. } => f.write_str("before_critique"),
            Gate::ContinueRetrying { .. } => f.write_str("continue_retrying"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Accept,
    Decline,
    /// No answer: dismissed, timed out, or the responder went away
    Cancel,
}

#[async_trait]
pub trait ApprovalStrategy: Send + Sync {
    async fn confirm(&self, gate: Gate) -> ApprovalDecision;
}

/// Non-interactive strategy: every gate is accepted
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalStrategy for AutoApprove {
    async fn confirm(&self, gate: Gate) -> ApprovalDecision {
        debug!(gate = %gate, "Gate auto-approved");
        ApprovalDecision::Accept
    }
}

/// A pending question handed to whoever drives the interactive side
#[derive(Debug)]
pub struct ApprovalRequest {
    pub gate: Gate,
    respond_to: oneshot::Sender<ApprovalDecision>,
}

impl ApprovalRequest {
    pub fn respond(self, decision: ApprovalDecision) {
        if self.respond_to.send(decision).is_err() {
            debug!(gate = %self.gate, "Approval answered after the workflow stopped waiting");
        }
    }
}

/// Suspends the workflow until an external decision arrives over a channel.
pub struct InteractiveApproval {
    requests: mpsc::Sender<ApprovalRequest>,
    timeout: Option<Duration>,
}

impl InteractiveApproval {
    /// Build the strategy together with the receiver that must answer its
    /// requests.
    pub fn channel(timeout: Option<Duration>) -> (Self, mpsc::Receiver<ApprovalRequest>) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                requests: tx,
                timeout,
            },
            rx,
        )
    }
}

#[async_trait]
impl ApprovalStrategy for InteractiveApproval {
    async fn confirm(&self, gate: Gate) -> ApprovalDecision {
        let (respond_to, answer) = oneshot::channel();

        if self.requests.send(ApprovalRequest { gate, respond_to }).await.is_err() {
            warn!(gate = %gate, "No approval responder available, treating as cancel");
            return ApprovalDecision::Cancel;
        }

        let decision = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, answer).await {
                Ok(result) => result.unwrap_or(ApprovalDecision::Cancel),
                Err(_) => {
                    warn!(gate = %gate, timeout_secs = limit.as_secs(), "Approval timed out");
                    ApprovalDecision::Cancel
                }
            },
            None => answer.await.unwrap_or(ApprovalDecision::Cancel),
        };

        debug!(gate = %gate, decision = ?decision, "Gate decided");
        decision
    }
}

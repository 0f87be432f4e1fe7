use anyhow::Result;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EdaFamilyConfig;
use crate::roles::WorkflowRoles;
use crate::workflow::{
    ApprovalDecision, ApprovalRequest, AutoApprove, CompletionReason, FileSystemPersistence,
    InteractiveApproval, StateStore, WorkflowController, WorkflowOutcome,
};

pub mod export;
pub mod init;
pub mod reset;
pub mod resume;
pub mod run;
pub mod status;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Open the store configured under `[persistence]`
pub fn open_store(config: &EdaFamilyConfig) -> Result<StateStore> {
    let backend = FileSystemPersistence::from_config(&config.persistence);
    Ok(StateStore::open(backend, &config.persistence)?)
}

/// Controller plus, for interactive runs, the task answering its prompts
pub struct ControllerSession {
    pub controller: WorkflowController,
    responder: Option<JoinHandle<()>>,
}

impl ControllerSession {
    pub fn open(config: &EdaFamilyConfig, yes: bool) -> Result<Self> {
        let store = open_store(config)?;
        let roles = WorkflowRoles::from_config(config);
        let settings = config.workflow.clone();

        if yes {
            return Ok(Self {
                controller: WorkflowController::new(store, roles, AutoApprove, settings),
                responder: None,
            });
        }

        let timeout = settings.approval_timeout_seconds.map(Duration::from_secs);
        let (approval, requests) = InteractiveApproval::channel(timeout);
        Ok(Self {
            controller: WorkflowController::new(store, roles, approval, settings),
            responder: Some(spawn_terminal_responder(requests)),
        })
    }
}

impl Drop for ControllerSession {
    fn drop(&mut self) {
        if let Some(responder) = self.responder.take() {
            responder.abort();
        }
    }
}

/// Answer approval requests from the terminal. End of input cancels.
pub fn spawn_terminal_responder(mut requests: mpsc::Receiver<ApprovalRequest>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(request) = requests.recv().await {
            eprint!("❓ {} [y/N] ", request.gate.prompt());
            let decision = match lines.next_line().await {
                Ok(Some(line)) => parse_answer(&line),
                Ok(None) | Err(_) => ApprovalDecision::Cancel,
            };
            request.respond(decision);
        }
    })
}

pub fn parse_answer(line: &str) -> ApprovalDecision {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ApprovalDecision::Accept,
        _ => ApprovalDecision::Decline,
    }
}

pub fn print_outcome(outcome: &WorkflowOutcome) {
    match outcome {
        WorkflowOutcome::Completed(report) => {
            let status = report
                .final_status
                .map(|s| s.as_str().to_uppercase())
                .unwrap_or_else(|| "N/A".to_string());
            println!("🎉 Workflow completed! Final status: {}", status);
            println!("   🔁 Iterations: {}", report.iteration_count);
            println!("   📜 History entries: {}", report.history.len());
            match report.reason {
                CompletionReason::Accepted => {}
                CompletionReason::RetryCeiling => {
                    println!("   ⚠️  Maximum iterations reached, proceeded with current results")
                }
                CompletionReason::RetryDeclined => {
                    println!("   ⏹️  Retrying was declined, kept the last critique")
                }
            }
            println!();
            println!("💡 Export the results with: eda-family export");
        }
        WorkflowOutcome::Stopped { gate } => {
            println!("⏸️  Workflow paused at {}", gate);
            println!("💡 Continue later with: eda-family resume");
        }
        WorkflowOutcome::Abandoned { role } => {
            println!("⏹️  The {} produced no result; workflow stopped", role);
            println!("💡 Continue later with: eda-family resume");
        }
    }
}

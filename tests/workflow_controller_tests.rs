//! End-to-end controller scenarios over in-memory persistence

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use eda_family::roles::{RuleBasedCritic, WorkflowRoles};
use eda_family::workflow::{
    ApprovalDecision, AutoApprove, CompletionReason, CritiqueStatus, Gate, HistoryDetails,
    InMemoryPersistence, InteractiveApproval, PersistenceConfig, PersistenceError, PersistedRecord,
    Role, Severity, Stage, StatePersistence, StateStore, WorkflowController, WorkflowError,
    WorkflowOutcome, WorkflowState,
};
use fixtures::*;

fn memory_store() -> StateStore {
    StateStore::open(InMemoryPersistence::new(), &PersistenceConfig::default()).unwrap()
}

fn auto_controller(family: &Family, max: u32) -> WorkflowController {
    WorkflowController::new(memory_store(), family.roles(), AutoApprove, settings(max, true))
}

fn expect_completed(outcome: WorkflowOutcome) -> eda_family::workflow::CompletionReport {
    match outcome {
        WorkflowOutcome::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_single_pass_to_excellent() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[CritiqueStatus::Excellent]),
    );
    let mut controller = auto_controller(&family, 3);

    let report = expect_completed(controller.run_workflow().await.unwrap());

    assert_eq!(report.final_status, Some(CritiqueStatus::Excellent));
    assert_eq!(report.iteration_count, 0);
    assert_eq!(family.executor.call_count(), 1);

    let state = controller.state();
    assert_eq!(state.current_stage, Stage::Completed);
    let stages: Vec<Stage> = state.history.iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::FatherInstruction,
            Stage::MotherDelivery,
            Stage::SonExecution,
            Stage::DaughterCritique,
            Stage::Completed,
        ]
    );
    assert!(state
        .history
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[tokio::test]
async fn test_two_rejections_then_acceptable() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[
            CritiqueStatus::NeedsImprovement,
            CritiqueStatus::NeedsImprovement,
            CritiqueStatus::Acceptable,
        ]),
    );
    let mut controller = auto_controller(&family, 3);

    let report = expect_completed(controller.run_workflow().await.unwrap());

    assert_eq!(report.iteration_count, 2);
    assert_eq!(report.reason, CompletionReason::Accepted);
    assert_eq!(family.executor.call_count(), 3);
    assert_eq!(
        family.executor.prior_ids(),
        vec![None, Some("critique_1".to_string()), Some("critique_2".to_string())]
    );
    // The critic sees every earlier verdict of the attempt
    assert_eq!(*family.critic.prior_counts.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(controller.state().rejected_critiques_in_history(), 2);
}

#[tokio::test]
async fn test_ceiling_forces_completion_with_negative_critique() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[CritiqueStatus::NeedsImprovement; 10]),
    );
    let mut controller = auto_controller(&family, 1);

    let report = expect_completed(controller.run_workflow().await.unwrap());

    assert!(report.forced());
    assert_eq!(report.final_status, Some(CritiqueStatus::NeedsImprovement));
    assert_eq!(family.executor.call_count(), 2);
    assert_eq!(controller.state().current_stage, Stage::Completed);
}

#[tokio::test]
async fn test_zero_ceiling_runs_executor_once() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[CritiqueStatus::NeedsImprovement; 3]),
    );
    let mut controller = auto_controller(&family, 0);

    let report = expect_completed(controller.run_workflow().await.unwrap());

    assert!(report.forced());
    assert_eq!(report.iteration_count, 1);
    assert_eq!(family.executor.call_count(), 1);
}

#[tokio::test]
async fn test_failed_execution_is_judged_not_fatal() {
    let family = Family::new(
        ScriptedExecutor::scripted(&[ExecutorStep::Fail]),
        ScriptedCritic::verdicts(&[]),
    );
    let roles = WorkflowRoles::new(
        family.instructor.clone(),
        family.preparer.clone(),
        family.executor.clone(),
        RuleBasedCritic::new(),
    );
    let mut controller =
        WorkflowController::new(memory_store(), roles, AutoApprove, settings(3, true));

    let report = expect_completed(controller.run_workflow().await.unwrap());

    // First run fails and is rejected, the retry completes with no issues
    assert_eq!(family.executor.call_count(), 2);
    assert_eq!(report.iteration_count, 1);
    assert_eq!(report.final_status, Some(CritiqueStatus::Excellent));

    let rejected = report
        .history
        .iter()
        .find_map(|entry| match &entry.details {
            HistoryDetails::CritiqueCommitted { critique, .. } if critique.needs_improvement() => {
                Some(critique.clone())
            }
            _ => None,
        })
        .expect("rejected critique in history");
    assert_eq!(rejected.execution_id, "exec_1");
    assert_eq!(rejected.issues[0].severity, Severity::High);
    assert_eq!(rejected.issues[0].description, "Execution failed");
    assert!(rejected.issues[0]
        .suggestion
        .as_deref()
        .unwrap()
        .contains("pandas"));
}

#[tokio::test]
async fn test_declined_before_preparer_stops_with_instruction_committed() {
    let family = Family::new(ScriptedExecutor::completing(), ScriptedCritic::verdicts(&[]));
    let approval = RecordingApproval::with_policy(|_| ApprovalDecision::Decline);
    let mut controller =
        WorkflowController::new(memory_store(), family.roles(), approval.clone(), settings(3, false));

    let outcome = controller.run_workflow().await.unwrap();

    assert_eq!(outcome, WorkflowOutcome::Stopped { gate: Gate::BeforePreparer });
    assert_eq!(family.preparer.call_count(), 0);
    let state = controller.state();
    assert_eq!(state.current_stage, Stage::FatherInstruction);
    assert!(state.instruction.is_some());
    assert_eq!(approval.asked_gates(), vec![Gate::BeforePreparer]);
}

#[tokio::test]
async fn test_cancelled_before_critique_keeps_execution() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[CritiqueStatus::Excellent]),
    );
    let approval = RecordingApproval::with_policy(|gate| match gate {
        Gate::BeforeCritique { .. } => ApprovalDecision::Cancel,
        _ => ApprovalDecision::Accept,
    });
    let mut controller =
        WorkflowController::new(memory_store(), family.roles(), approval, settings(3, false));

    let outcome = controller.run_workflow().await.unwrap();

    assert_eq!(
        outcome,
        WorkflowOutcome::Stopped {
            gate: Gate::BeforeCritique { iteration: 0 }
        }
    );
    assert_eq!(family.critic.call_count(), 0);
    let state = controller.state();
    assert_eq!(state.current_stage, Stage::SonExecution);
    assert!(state.execution.is_some());
}

#[tokio::test]
async fn test_declined_retry_completes_with_last_critique() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[CritiqueStatus::NeedsImprovement; 3]),
    );
    let approval = RecordingApproval::with_policy(|gate| match gate {
        Gate::ContinueRetrying { .. } => ApprovalDecision::Decline,
        _ => ApprovalDecision::Accept,
    });
    let mut controller =
        WorkflowController::new(memory_store(), family.roles(), approval.clone(), settings(3, false));

    let report = expect_completed(controller.run_workflow().await.unwrap());

    assert_eq!(report.reason, CompletionReason::RetryDeclined);
    assert_eq!(report.final_status, Some(CritiqueStatus::NeedsImprovement));
    assert_eq!(report.iteration_count, 1);
    assert_eq!(family.executor.call_count(), 1);
    assert_eq!(
        approval.asked_gates(),
        vec![
            Gate::BeforePreparer,
            Gate::BeforeExecution,
            Gate::BeforeCritique { iteration: 0 },
            Gate::ContinueRetrying { iteration: 1 },
        ]
    );
}

#[tokio::test]
async fn test_auto_proceed_never_consults_strategy() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[CritiqueStatus::NeedsImprovement, CritiqueStatus::Acceptable]),
    );
    let approval = RecordingApproval::with_policy(|_| ApprovalDecision::Decline);
    let mut controller =
        WorkflowController::new(memory_store(), family.roles(), approval.clone(), settings(3, true));

    expect_completed(controller.run_workflow().await.unwrap());
    assert!(approval.asked_gates().is_empty());
}

#[tokio::test]
async fn test_executor_abstention_is_soft_abort() {
    let family = Family::new(
        ScriptedExecutor::scripted(&[ExecutorStep::Abstain]),
        ScriptedCritic::verdicts(&[CritiqueStatus::Excellent]),
    );
    let mut controller = auto_controller(&family, 3);

    let outcome = controller.run_workflow().await.unwrap();

    assert_eq!(outcome, WorkflowOutcome::Abandoned { role: Role::Executor });
    let state = controller.state();
    assert_eq!(state.current_stage, Stage::MotherDelivery);
    assert!(state.data.is_some());
    assert!(state.execution.is_none());
}

#[tokio::test]
async fn test_executor_error_resets_to_idle() {
    let family = Family::new(
        ScriptedExecutor::scripted(&[ExecutorStep::Error]),
        ScriptedCritic::verdicts(&[]),
    );
    let mut controller = auto_controller(&family, 3);

    let err = controller.run_workflow().await.unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Collaborator {
            role: Role::Executor,
            ..
        }
    ));
    assert_eq!(controller.state(), WorkflowState::default());
}

#[tokio::test]
async fn test_missing_instruction_is_fatal() {
    let mut family = Family::new(ScriptedExecutor::completing(), ScriptedCritic::verdicts(&[]));
    family.instructor = ScriptedInstructor::returning(None);
    let mut controller = auto_controller(&family, 3);

    let err = controller.run_workflow().await.unwrap_err();

    assert!(matches!(err, WorkflowError::InstructionMissing));
    assert_eq!(family.preparer.call_count(), 0);
    assert_eq!(controller.state().current_stage, Stage::Idle);
}

#[tokio::test]
async fn test_run_discards_previous_attempt() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[
            CritiqueStatus::NeedsImprovement,
            CritiqueStatus::Acceptable,
            CritiqueStatus::Excellent,
        ]),
    );
    let mut controller = auto_controller(&family, 3);

    let first = expect_completed(controller.run_workflow().await.unwrap());
    assert_eq!(first.iteration_count, 1);

    let second = expect_completed(controller.run_workflow().await.unwrap());
    assert_eq!(second.iteration_count, 0);
    assert_eq!(second.history.len(), 5);
}

#[tokio::test]
async fn test_start_on_existing_workflow_follows_answer() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[CritiqueStatus::Excellent, CritiqueStatus::Excellent]),
    );

    // Leave a workflow parked after the instructor
    let parked = RecordingApproval::with_policy(|_| ApprovalDecision::Decline);
    let backend = Arc::new(InMemoryPersistence::new());
    let store = StateStore::open(backend.clone(), &PersistenceConfig::default()).unwrap();
    let mut controller = WorkflowController::new(store, family.roles(), parked, settings(3, false));
    controller.start_workflow().await.unwrap();
    assert_eq!(controller.state().current_stage, Stage::FatherInstruction);

    // Cancel leaves it untouched
    let cancel = RecordingApproval::with_policy(|_| ApprovalDecision::Cancel);
    let store = StateStore::open(backend.clone(), &PersistenceConfig::default()).unwrap();
    let mut controller = WorkflowController::new(store, family.roles(), cancel, settings(3, false));
    let outcome = controller.start_workflow().await.unwrap();
    assert_eq!(
        outcome,
        WorkflowOutcome::Stopped {
            gate: Gate::ContinueExisting {
                stage: Stage::FatherInstruction
            }
        }
    );
    assert_eq!(controller.state().current_stage, Stage::FatherInstruction);

    // Accept continues at the preparer without asking the instructor again
    let accept = RecordingApproval::accept_all();
    let store = StateStore::open(backend.clone(), &PersistenceConfig::default()).unwrap();
    let mut controller =
        WorkflowController::new(store, family.roles(), accept.clone(), settings(3, false));
    expect_completed(controller.start_workflow().await.unwrap());
    assert_eq!(family.instructor.call_count(), 1);
    assert_eq!(family.preparer.call_count(), 1);
    assert_eq!(accept.asked_gates()[0], Gate::ContinueExisting { stage: Stage::FatherInstruction });

    // Decline on a completed workflow starts over
    let decline_existing = RecordingApproval::with_policy(|gate| match gate {
        Gate::ContinueExisting { .. } => ApprovalDecision::Decline,
        _ => ApprovalDecision::Accept,
    });
    let store = StateStore::open(backend, &PersistenceConfig::default()).unwrap();
    let mut controller =
        WorkflowController::new(store, family.roles(), decline_existing, settings(3, false));
    let report = expect_completed(controller.start_workflow().await.unwrap());
    assert_eq!(family.instructor.call_count(), 2);
    assert_eq!(report.history.len(), 5);
}

#[tokio::test]
async fn test_interactive_approval_round_trip() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[CritiqueStatus::Acceptable]),
    );
    let (approval, mut requests) = InteractiveApproval::channel(Some(Duration::from_secs(5)));
    let responder = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(request) = requests.recv().await {
            seen.push(request.gate);
            request.respond(ApprovalDecision::Accept);
        }
        seen
    });

    let mut controller =
        WorkflowController::new(memory_store(), family.roles(), approval, settings(3, false));
    expect_completed(controller.run_workflow().await.unwrap());
    drop(controller);

    let seen = responder.await.unwrap();
    assert_eq!(
        seen,
        vec![
            Gate::BeforePreparer,
            Gate::BeforeExecution,
            Gate::BeforeCritique { iteration: 0 },
        ]
    );
}

#[tokio::test]
async fn test_observers_follow_every_commit() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[CritiqueStatus::Excellent]),
    );
    let mut controller = auto_controller(&family, 3);
    let mut rx = controller.subscribe();

    expect_completed(controller.run_workflow().await.unwrap());

    assert!(rx.has_changed().unwrap());
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.current_stage, Stage::Completed);
    assert_eq!(snapshot.history_len, 5);
    assert_eq!(snapshot.critique_status, Some(CritiqueStatus::Excellent));
}

struct ReadOnlyPersistence;

impl StatePersistence for ReadOnlyPersistence {
    fn load(&self, _key: &str) -> Result<Option<PersistedRecord>, PersistenceError> {
        Ok(None)
    }

    fn save(&self, _record: &PersistedRecord) -> Result<(), PersistenceError> {
        Err(PersistenceError::LockError {
            reason: "state file locked by another process".to_string(),
        })
    }
}

#[tokio::test]
async fn test_persistence_failure_surfaces() {
    let family = Family::new(
        ScriptedExecutor::completing(),
        ScriptedCritic::verdicts(&[CritiqueStatus::Excellent]),
    );
    let store = StateStore::open(ReadOnlyPersistence, &PersistenceConfig::default()).unwrap();
    let mut controller = WorkflowController::new(store, family.roles(), AutoApprove, settings(3, true));

    let err = controller.run_workflow().await.unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Persistence(PersistenceError::LockError { .. })
    ));
    assert_eq!(family.preparer.call_count(), 0);
    assert_eq!(controller.state(), WorkflowState::default());
}

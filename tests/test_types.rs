//! Tests for run record types and their transition rules.

use chrono::Utc;
use serde_json::json;

use gateflow::engine::EngineError;
use gateflow::engine::types::*;
use gateflow::protocol::{SuspendEnvelope, SuspendReason};

fn entry(step_id: &str, index: usize, kind: OutcomeKind) -> HistoryEntry {
    let now = Utc::now();
    HistoryEntry {
        step_id: step_id.to_string(),
        step_index: index,
        entered_at: now,
        left_at: now,
        outcome_kind: kind,
    }
}

// --- RunStatus ---

#[test]
fn status_display_and_parse() {
    for status in [
        RunStatus::Running,
        RunStatus::Suspended,
        RunStatus::Completed,
        RunStatus::Failed,
    ] {
        let parsed: RunStatus = status.to_string().parse().unwrap();
        assert_eq!(parsed, status);
    }
    assert!("done".parse::<RunStatus>().is_err());
}

#[test]
fn terminal_statuses() {
    assert!(RunStatus::Completed.is_terminal());
    assert!(RunStatus::Failed.is_terminal());
    assert!(!RunStatus::Running.is_terminal());
    assert!(!RunStatus::Suspended.is_terminal());
}

// --- Serialization ---

#[test]
fn new_record_serializes_flat_status() {
    let record = RunRecord::new("wf", json!({"x": 1}));
    let value = serde_json::to_value(&record).unwrap();

    assert_eq!(value["status"], "running");
    assert_eq!(value["workflowId"], "wf");
    assert_eq!(value["currentStepIndex"], 0);
    assert_eq!(value["input"], json!({"x": 1}));
    assert!(value.get("suspendEnvelope").is_none());
    assert!(value.get("finalResult").is_none());
    assert!(value.get("error").is_none());
}

#[test]
fn suspended_record_carries_envelope() {
    let mut record = RunRecord::new("wf", json!({}));
    let envelope = SuspendEnvelope::new(SuspendReason::AwaitingApproval, "approve please")
        .with_required_inputs(["approved"]);
    record.suspend(envelope, entry("gate", 0, OutcomeKind::Suspend));

    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["status"], "suspended");
    assert_eq!(value["suspendEnvelope"]["reason"], "awaiting_approval");
    assert_eq!(value["suspendEnvelope"]["requiredAction"]["actionType"], "approve");
    assert_eq!(
        value["suspendEnvelope"]["resumeConditions"]["requiredInputs"],
        json!(["approved"])
    );

    let back: RunRecord = serde_json::from_value(value).unwrap();
    assert_eq!(back, record);
}

#[test]
fn failed_record_round_trips_error() {
    let mut record = RunRecord::new("wf", json!({}));
    let error = ErrorRecord {
        kind: ErrorKind::AgentFailure,
        message: "timeout".to_string(),
        step_id: "write".to_string(),
        at: Utc::now(),
    };
    record.fail(error.clone(), entry("write", 0, OutcomeKind::Fail));

    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["status"], "failed");
    assert_eq!(value["error"]["kind"], "AgentFailure");
    assert_eq!(value["error"]["stepId"], "write");

    let back: RunRecord = serde_json::from_value(value).unwrap();
    assert_eq!(back.error(), Some(&error));
}

// --- Step input ---

#[test]
fn step_input_uses_initial_then_last_output() {
    let mut record = RunRecord::new("wf", json!({"x": 1}));
    assert_eq!(record.step_input(), json!({"x": 1}));

    record.advance(json!({"y": 2}), entry("a", 0, OutcomeKind::Continue));
    assert_eq!(record.current_step_index, 1);
    assert_eq!(record.step_input(), json!({"y": 2}));
}

#[test]
fn complete_sets_final_result() {
    let mut record = RunRecord::new("wf", json!({}));
    record.complete(json!({"done": true}), entry("a", 0, OutcomeKind::Continue));
    assert_eq!(record.status(), RunStatus::Completed);
    assert_eq!(record.final_result(), Some(&json!({"done": true})));
    assert_eq!(record.current_step_index, 0);
}

// --- Transitions ---

#[test]
fn begin_resume_requires_suspension_at_index() {
    let mut record = RunRecord::new("wf", json!({}));
    assert!(matches!(
        record.begin_resume(0),
        Err(EngineError::InvalidTransition { .. })
    ));

    record.suspend(
        SuspendEnvelope::new(SuspendReason::Other, "wait"),
        entry("a", 0, OutcomeKind::Suspend),
    );
    assert!(record.begin_resume(1).is_err());
    record.begin_resume(0).unwrap();
    assert_eq!(record.status(), RunStatus::Running);
    assert!(record.suspend_envelope().is_none());
}

#[test]
fn transition_from_terminal_is_rejected() {
    let mut record = RunRecord::new("wf", json!({}));
    record.complete(json!(1), entry("a", 0, OutcomeKind::Continue));

    let next = record.clone();
    let err = record.validate_transition(&next).unwrap_err();
    assert_eq!(err.kind(), "InvalidTransition");
}

#[test]
fn rewinding_or_rewriting_history_is_rejected() {
    let mut record = RunRecord::new("wf", json!({}));
    record.advance(json!(1), entry("a", 0, OutcomeKind::Continue));

    let mut rewound = record.clone();
    rewound.current_step_index = 0;
    assert!(record.validate_transition(&rewound).is_err());

    let mut truncated = record.clone();
    truncated.history.clear();
    assert!(record.validate_transition(&truncated).is_err());

    let mut renamed = record.clone();
    renamed.workflow_id = "other".to_string();
    assert!(record.validate_transition(&renamed).is_err());

    let mut advanced = record.clone();
    advanced.advance(json!(2), entry("b", 1, OutcomeKind::Continue));
    record.validate_transition(&advanced).unwrap();
}

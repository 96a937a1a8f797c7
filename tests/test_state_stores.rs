//! Tests for RunStore implementations: JsonRunStore and MemoryRunStore.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use gateflow::engine::EngineError;
use gateflow::engine::types::*;
use gateflow::protocol::{SuspendEnvelope, SuspendReason};
use gateflow::storage::{JsonRunStore, MemoryRunStore, RunStore};

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

/// Shared contract checks, run against every store.
async fn exercise_store(store: Arc<dyn RunStore>) {
    // --- create / get ---
    let created = store.create("wf", &json!({"x": 1})).await.unwrap();
    assert_eq!(created.status(), RunStatus::Running);
    assert_eq!(created.current_step_index, 0);

    let fetched = store.get(&created.run_id).await.unwrap();
    assert_eq!(fetched, created);

    // --- update ---
    let updated = store
        .update(
            &created.run_id,
            Box::new(|r: &mut RunRecord| {
                r.advance(json!({"y": 2}), entry("a", 0, OutcomeKind::Continue));
                Ok(())
            }),
        )
        .await
        .unwrap();
    assert_eq!(updated.current_step_index, 1);
    assert!(updated.updated_at >= created.updated_at);
    assert_eq!(store.get(&created.run_id).await.unwrap(), updated);

    // --- failing mutator leaves record untouched ---
    let err = store
        .update(
            &created.run_id,
            Box::new(|r: &mut RunRecord| {
                r.current_step_index = 7;
                Err(EngineError::InvalidDefinition("nope".to_string()))
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidDefinition");
    assert_eq!(store.get(&created.run_id).await.unwrap(), updated);

    // --- rewinding is rejected ---
    let err = store
        .update(
            &created.run_id,
            Box::new(|r: &mut RunRecord| {
                r.current_step_index = 0;
                Ok(())
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidTransition");
    assert_eq!(store.get(&created.run_id).await.unwrap().current_step_index, 1);

    // --- terminal records are frozen ---
    store
        .update(
            &created.run_id,
            Box::new(|r: &mut RunRecord| {
                r.complete(json!("done"), entry("b", 1, OutcomeKind::Continue));
                Ok(())
            }),
        )
        .await
        .unwrap();
    let err = store
        .update(&created.run_id, Box::new(|_: &mut RunRecord| Ok(())))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            status: RunStatus::Completed,
            ..
        }
    ));

    // --- list ---
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = store.create("wf", &json!({})).await.unwrap();
    store
        .update(
            &second.run_id,
            Box::new(|r: &mut RunRecord| {
                r.suspend(
                    SuspendEnvelope::new(SuspendReason::AwaitingHumanInput, "wait"),
                    entry("a", 0, OutcomeKind::Suspend),
                );
                Ok(())
            }),
        )
        .await
        .unwrap();

    let all = store.list(None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].run_id, second.run_id, "newest first");

    let suspended = store.list(Some(RunStatus::Suspended)).await.unwrap();
    assert_eq!(suspended.len(), 1);
    assert!(suspended[0].suspend_envelope().is_some());

    // --- delete ---
    store.delete(&second.run_id).await.unwrap();
    assert!(matches!(
        store.get(&second.run_id).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        store.delete(&second.run_id).await,
        Err(EngineError::NotFound(_))
    ));

    // --- unknown ids ---
    assert!(matches!(store.get("missing").await, Err(EngineError::NotFound(_))));
    assert!(matches!(
        store.update("missing", Box::new(|_: &mut RunRecord| Ok(()))).await,
        Err(EngineError::NotFound(_))
    ));
}

// ===== MemoryRunStore =====

#[tokio::test]
async fn memory_store_contract() {
    exercise_store(Arc::new(MemoryRunStore::new())).await;
}

// ===== JsonRunStore =====

#[tokio::test]
async fn json_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    exercise_store(Arc::new(JsonRunStore::new(dir.path()))).await;
}

#[tokio::test]
async fn json_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();

    let run_id = {
        let store = JsonRunStore::new(dir.path());
        let record = store.create("wf", &json!({"name": "Ada"})).await.unwrap();
        store
            .update(
                &record.run_id,
                Box::new(|r: &mut RunRecord| {
                    r.suspend(
                        SuspendEnvelope::new(SuspendReason::AwaitingApproval, "approve")
                            .with_required_inputs(["approved"]),
                        entry("gate", 0, OutcomeKind::Suspend),
                    );
                    Ok(())
                }),
            )
            .await
            .unwrap();
        record.run_id
    };

    let reopened = JsonRunStore::new(dir.path());
    let record = reopened.get(&run_id).await.unwrap();
    assert_eq!(record.status(), RunStatus::Suspended);
    assert_eq!(record.input, json!({"name": "Ada"}));
    assert_eq!(
        record.suspend_envelope().unwrap().resume_conditions.required_inputs,
        vec!["approved".to_string()]
    );
}

#[tokio::test]
async fn json_store_writes_one_file_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());
    let record = store.create("wf", &json!({})).await.unwrap();

    let path = dir.path().join(format!("{}.json", record.run_id));
    assert!(path.exists());
    assert!(!dir.path().join(format!("{}.json.tmp", record.run_id)).exists());

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(raw["status"], "running");
    assert_eq!(raw["runId"], record.run_id);
}

#[tokio::test]
async fn json_store_rejects_path_like_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());
    assert!(matches!(
        store.get("../etc/passwd").await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn json_store_list_skips_corrupt_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path());
    store.create("wf", &json!({})).await.unwrap();
    std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

    let runs = store.list(None).await.unwrap();
    assert_eq!(runs.len(), 1);
}

#[tokio::test]
async fn json_store_list_on_missing_dir_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonRunStore::new(dir.path().join("never-created"));
    assert!(store.list(None).await.unwrap().is_empty());
}

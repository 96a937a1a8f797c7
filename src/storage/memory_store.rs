use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::engine::error::EngineError;
use crate::engine::types::*;
use crate::storage::{Mutator, RunStore, apply};

/// In-memory run store. Holds runs only for the lifetime of the store instance.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, workflow_id: &str, input: &Payload) -> Result<RunRecord, EngineError> {
        let record = RunRecord::new(workflow_id, input.clone());
        self.runs
            .write()
            .await
            .insert(record.run_id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, run_id: &str) -> Result<RunRecord, EngineError> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(run_id.to_string()))
    }

    async fn update(&self, run_id: &str, mutator: Mutator) -> Result<RunRecord, EngineError> {
        let mut runs = self.runs.write().await;
        let current = runs
            .get(run_id)
            .ok_or_else(|| EngineError::NotFound(run_id.to_string()))?;
        let next = apply(current, mutator)?;
        runs.insert(run_id.to_string(), next.clone());
        Ok(next)
    }

    async fn list(&self, status: Option<RunStatus>) -> Result<Vec<RunRecord>, EngineError> {
        let runs = self.runs.read().await;
        let mut out: Vec<RunRecord> = runs
            .values()
            .filter(|r| status.is_none_or(|s| r.status() == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn delete(&self, run_id: &str) -> Result<(), EngineError> {
        self.runs
            .write()
            .await
            .remove(run_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(run_id.to_string()))
    }
}

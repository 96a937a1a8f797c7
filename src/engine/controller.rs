use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::agent::GenerationAgent;
use crate::engine::error::EngineError;
use crate::engine::executor::StepExecutor;
use crate::engine::types::*;
use crate::protocol::SuspendEnvelope;
use crate::storage::RunStore;
use crate::workflow::{WorkflowDefinition, WorkflowRegistry, WorkflowSummary};

/// Transport-facing projection of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    pub run_id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    pub current_step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend_envelope: Option<SuspendEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl RunView {
    pub fn new(record: RunRecord, workflow: Option<&WorkflowDefinition>) -> Self {
        let current_step_id = workflow
            .and_then(|w| w.step(record.current_step_index))
            .map(|s| s.id().to_string());
        Self {
            status: record.status(),
            suspend_envelope: record.suspend_envelope().cloned(),
            final_result: record.final_result().cloned(),
            error: record.error().cloned(),
            run_id: record.run_id,
            workflow_id: record.workflow_id,
            current_step_index: record.current_step_index,
            current_step_id,
            last_output: record.last_output,
            history: record.history,
        }
    }
}

/// One line of a run listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    pub current_step_index: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&RunRecord> for RunSummary {
    fn from(record: &RunRecord) -> Self {
        Self {
            run_id: record.run_id.clone(),
            workflow_id: record.workflow_id.clone(),
            status: record.status(),
            current_step_index: record.current_step_index,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Public boundary of the engine.
///
/// Mutating operations on one run are serialized through a per-run lock;
/// different runs proceed independently. Each drive runs on its own task
/// and holds the lock until the run stops, so a caller that goes away never
/// leaves a run half-advanced.
#[derive(Clone)]
pub struct RunController {
    registry: Arc<WorkflowRegistry>,
    executor: Arc<StepExecutor>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl RunController {
    pub fn new(
        registry: WorkflowRegistry,
        store: Arc<dyn RunStore>,
        agent: Arc<dyn GenerationAgent>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            executor: Arc::new(StepExecutor::new(store, agent)),
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        self.executor.store()
    }

    fn workflow(&self, workflow_id: &str) -> Result<Arc<WorkflowDefinition>, EngineError> {
        self.registry
            .get(workflow_id)
            .ok_or_else(|| EngineError::UnknownWorkflow(workflow_id.to_string()))
    }

    async fn lock_run(&self, run_id: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(run_id.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    /// Start a run and drive it until it suspends, completes or fails.
    pub async fn start(&self, workflow_id: &str, input: Payload) -> Result<RunRecord, EngineError> {
        let workflow = self.workflow(workflow_id)?;
        let record = self.executor.create_run(&workflow, input).await?;
        let guard = self.lock_run(&record.run_id).await;
        join(self.spawn_drive(workflow, record.run_id, None, guard)).await
    }

    /// Start a run and return immediately while it is driven in the background.
    pub async fn start_async(
        &self,
        workflow_id: &str,
        input: Payload,
    ) -> Result<RunRecord, EngineError> {
        let workflow = self.workflow(workflow_id)?;
        let record = self.executor.create_run(&workflow, input).await?;
        let guard = self.lock_run(&record.run_id).await;
        let _ = self.spawn_drive(workflow, record.run_id.clone(), None, guard);
        Ok(record)
    }

    /// Resume a suspended run at `step_id` with `payload`.
    pub async fn resume(
        &self,
        run_id: &str,
        step_id: &str,
        payload: Payload,
    ) -> Result<RunRecord, EngineError> {
        let record = self.executor.store().get(run_id).await?;
        let workflow = self.workflow(&record.workflow_id)?;

        let guard = self.lock_run(run_id).await;
        self.executor
            .admit_resume(&workflow, run_id, step_id, &payload)
            .await?;
        join(self.spawn_drive(workflow, run_id.to_string(), Some(payload), guard)).await
    }

    /// Read-only snapshot of a run.
    pub async fn get_status(&self, run_id: &str) -> Result<RunRecord, EngineError> {
        self.executor.store().get(run_id).await
    }

    pub async fn view(&self, run_id: &str) -> Result<RunView, EngineError> {
        let record = self.get_status(run_id).await?;
        Ok(self.to_view(record))
    }

    pub fn to_view(&self, record: RunRecord) -> RunView {
        let workflow = self.registry.get(&record.workflow_id);
        RunView::new(record, workflow.as_deref())
    }

    pub async fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<RunRecord>, EngineError> {
        self.executor.store().list(status).await
    }

    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        self.registry.list().iter().map(|w| w.describe()).collect()
    }

    /// Remove a run record. Waits for any in-flight drive of the run to finish.
    pub async fn delete_run(&self, run_id: &str) -> Result<(), EngineError> {
        let guard = self.lock_run(run_id).await;
        let result = self.executor.store().delete(run_id).await;
        self.locks.remove(run_id);
        drop(guard);
        if result.is_ok() {
            info!(run_id = %run_id, "Run deleted");
        }
        result
    }

    fn spawn_drive(
        &self,
        workflow: Arc<WorkflowDefinition>,
        run_id: String,
        resume: Option<Payload>,
        guard: OwnedMutexGuard<()>,
    ) -> JoinHandle<Result<RunRecord, EngineError>> {
        let executor = self.executor.clone();
        let locks = self.locks.clone();

        tokio::spawn(async move {
            let result = executor.drive(workflow, &run_id, resume).await;
            match &result {
                Ok(record) if record.status().is_terminal() => {
                    locks.remove(&run_id);
                }
                Ok(_) => {}
                Err(e) => error!(run_id = %run_id, error = %e, "Run drive failed"),
            }
            drop(guard);
            result
        })
    }
}

async fn join(
    handle: JoinHandle<Result<RunRecord, EngineError>>,
) -> Result<RunRecord, EngineError> {
    handle
        .await
        .map_err(|e| EngineError::Storage(anyhow::anyhow!("run driver task failed: {}", e)))?
}

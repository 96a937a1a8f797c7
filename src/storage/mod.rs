pub mod json_store;
pub mod memory_store;

use async_trait::async_trait;

use crate::engine::error::EngineError;
use crate::engine::types::*;

pub use json_store::JsonRunStore;
pub use memory_store::MemoryRunStore;

/// Change applied to a run record inside [`RunStore::update`].
/// Returning an error leaves the stored record untouched.
pub type Mutator = Box<dyn FnOnce(&mut RunRecord) -> Result<(), EngineError> + Send>;

/// Sole owner of run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a new run in `running` at step 0 and return it.
    async fn create(&self, workflow_id: &str, input: &Payload) -> Result<RunRecord, EngineError>;

    /// Consistent snapshot of a run. Fails with `NotFound` for unknown ids.
    async fn get(&self, run_id: &str) -> Result<RunRecord, EngineError>;

    /// Apply `mutator` atomically with respect to other updates of the same run.
    ///
    /// Fails with `NotFound` for unknown ids and `InvalidTransition` when the
    /// result is not a legal successor of the stored record.
    async fn update(&self, run_id: &str, mutator: Mutator) -> Result<RunRecord, EngineError>;

    /// List runs newest first, optionally filtered by status.
    async fn list(&self, status: Option<RunStatus>) -> Result<Vec<RunRecord>, EngineError>;

    /// Remove a run record. The engine never calls this; it exists for retention.
    async fn delete(&self, run_id: &str) -> Result<(), EngineError>;
}

/// Applies `mutator` to a copy of `current` and checks the transition.
pub(crate) fn apply(current: &RunRecord, mutator: Mutator) -> Result<RunRecord, EngineError> {
    let mut next = current.clone();
    mutator(&mut next)?;
    current.validate_transition(&next)?;
    next.updated_at = chrono::Utc::now();
    Ok(next)
}

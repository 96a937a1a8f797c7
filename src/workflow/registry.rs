use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::error::EngineError;
use crate::workflow::WorkflowDefinition;

/// Workflow definitions known to a controller, keyed by id.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in workflows registered.
    pub fn with_builtins() -> Result<Self, EngineError> {
        let mut registry = Self::new();
        crate::workflows::register_all(&mut registry)?;
        Ok(registry)
    }

    /// Register a definition, replacing any previous one with the same id.
    pub fn register(&mut self, workflow: WorkflowDefinition) {
        self.workflows
            .insert(workflow.id().to_string(), Arc::new(workflow));
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(id).cloned()
    }

    /// All definitions, sorted by id.
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut entries: Vec<Arc<WorkflowDefinition>> = self.workflows.values().cloned().collect();
        entries.sort_by(|a, b| a.id().cmp(b.id()));
        entries
    }
}

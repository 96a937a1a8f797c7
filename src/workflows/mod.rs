//! Built-in workflow definitions.

pub mod fiction;

use crate::engine::error::EngineError;
use crate::workflow::WorkflowRegistry;

/// Register every built-in workflow.
pub fn register_all(registry: &mut WorkflowRegistry) -> Result<(), EngineError> {
    registry.register(fiction::workflow()?);
    Ok(())
}

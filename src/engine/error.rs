use crate::engine::types::RunStatus;

/// Errors returned by the run store, executor and controller.
///
/// Every variant except `Storage` is detected before step logic runs and
/// leaves the run record untouched.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("{subject} does not match its schema: {}", .errors.join("; "))]
    SchemaValidation { subject: String, errors: Vec<String> },

    #[error("Run is suspended at step '{expected}', not '{actual}'")]
    StepMismatch { expected: String, actual: String },

    #[error("Resume payload for step '{step_id}' is missing required inputs: {}", .missing.join(", "))]
    IncompleteResume {
        step_id: String,
        missing: Vec<String>,
    },

    #[error("Cannot {operation} run '{run_id}' while it is {status}")]
    InvalidTransition {
        run_id: String,
        status: RunStatus,
        operation: &'static str,
    },

    #[error("Run not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::UnknownWorkflow(_) => "UnknownWorkflow",
            EngineError::SchemaValidation { .. } => "SchemaValidationError",
            EngineError::StepMismatch { .. } => "StepMismatch",
            EngineError::IncompleteResume { .. } => "IncompleteResume",
            EngineError::InvalidTransition { .. } => "InvalidTransition",
            EngineError::NotFound(_) => "NotFound",
            EngineError::InvalidDefinition(_) => "InvalidDefinition",
            EngineError::Storage(_) => "StorageError",
        }
    }

    /// Individual problems behind the error, for clients that render them one by one.
    pub fn details(&self) -> Vec<String> {
        match self {
            EngineError::SchemaValidation { errors, .. } => errors.clone(),
            EngineError::IncompleteResume { missing, .. } => missing.clone(),
            _ => Vec::new(),
        }
    }
}

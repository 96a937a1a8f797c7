use crate::engine::error::EngineError;
use crate::engine::types::{Payload, RunRecord, RunStatus};
use crate::protocol::envelope::ResumeConditions;
use crate::workflow::WorkflowDefinition;

/// Required inputs that are absent or `null` in `payload`.
///
/// A payload that is not a JSON object is missing every required input.
pub fn missing_inputs(conditions: &ResumeConditions, payload: &Payload) -> Vec<String> {
    conditions
        .required_inputs
        .iter()
        .filter(|field| {
            payload
                .as_object()
                .and_then(|obj| obj.get(field.as_str()))
                .is_none_or(|value| value.is_null())
        })
        .cloned()
        .collect()
}

/// Decides whether `payload` may resume `record` at `step_id`.
///
/// Checks run in a fixed order: status, suspension point, required inputs,
/// then the step's resume shape. Returns the index of the step to re-run.
pub fn admit(
    record: &RunRecord,
    workflow: &WorkflowDefinition,
    step_id: &str,
    payload: &Payload,
) -> Result<usize, EngineError> {
    if record.status() != RunStatus::Suspended {
        return Err(record.invalid_transition("resume"));
    }

    let index = record.current_step_index;
    let step = workflow.step(index).ok_or_else(|| {
        EngineError::InvalidDefinition(format!(
            "workflow '{}' has no step at index {}",
            workflow.id(),
            index
        ))
    })?;

    if step.id() != step_id {
        return Err(EngineError::StepMismatch {
            expected: step.id().to_string(),
            actual: step_id.to_string(),
        });
    }

    if let Some(envelope) = record.suspend_envelope() {
        let missing = missing_inputs(&envelope.resume_conditions, payload);
        if !missing.is_empty() {
            return Err(EngineError::IncompleteResume {
                step_id: step_id.to_string(),
                missing,
            });
        }
    }

    if let Some(shape) = step.resume_shape() {
        shape
            .validate(payload)
            .map_err(|errors| EngineError::SchemaValidation {
                subject: format!("Resume payload for step '{}'", step_id),
                errors,
            })?;
    }

    Ok(index)
}

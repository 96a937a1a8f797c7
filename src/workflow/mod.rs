pub mod registry;
pub mod schema;
pub mod step;

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::engine::error::EngineError;

pub use registry::WorkflowRegistry;
pub use schema::Shape;
pub use step::{PureFn, Step, StepContext, StepError, StepLogic, StepOutcome, StepSpec, Typed};

/// Immutable, validated, strictly linear sequence of steps.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    id: String,
    description: String,
    input_shape: Shape,
    output_shape: Option<Shape>,
    steps: Vec<StepSpec>,
}

impl WorkflowDefinition {
    pub fn builder(id: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            id: id.into(),
            description: String::new(),
            input_schema: None,
            output_schema: None,
            steps: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Shape the initial input must satisfy.
    pub fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    pub fn output_shape(&self) -> Option<&Shape> {
        self.output_shape.as_ref()
    }

    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&StepSpec> {
        self.steps.get(index)
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id() == step_id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.steps.len()
    }

    /// Ids of the steps after `index`.
    pub fn pending_after(&self, index: usize) -> Vec<String> {
        self.steps
            .iter()
            .skip(index + 1)
            .map(|s| s.id().to_string())
            .collect()
    }

    /// Serializable description for listings.
    pub fn describe(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            description: self.description.clone(),
            input_shape: self.input_shape.clone(),
            output_shape: self.output_shape.clone(),
            steps: self
                .steps
                .iter()
                .map(|s| StepSummary {
                    id: s.id().to_string(),
                    input_shape: s.input_shape().clone(),
                    output_shape: s.output_shape().clone(),
                    resume_shape: s.resume_shape().cloned(),
                    suspend_shape: s.suspend_shape().cloned(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub description: String,
    pub input_shape: Shape,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_shape: Option<Shape>,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub id: String,
    pub input_shape: Shape,
    pub output_shape: Shape,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_shape: Option<Shape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend_shape: Option<Shape>,
}

pub struct WorkflowBuilder {
    id: String,
    description: String,
    input_schema: Option<Value>,
    output_schema: Option<Value>,
    steps: Vec<StepSpec>,
}

impl WorkflowBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declared workflow input. Defaults to the first step's input shape.
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Declared workflow output. The last step's output must satisfy it.
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Appends a step. Steps run in the order they are added.
    pub fn step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Result<WorkflowDefinition, EngineError> {
        let invalid = |msg: String| {
            EngineError::InvalidDefinition(format!("workflow '{}': {}", self.id, msg))
        };

        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidDefinition(
                "workflow id must not be empty".to_string(),
            ));
        }
        let Some(first) = self.steps.first() else {
            return Err(invalid("has no steps".to_string()));
        };

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id().trim().is_empty() {
                return Err(invalid("step id must not be empty".to_string()));
            }
            if !seen.insert(step.id()) {
                return Err(invalid(format!("duplicate step id '{}'", step.id())));
            }
            if let Some(err) = &step.schema_error {
                return Err(invalid(err.clone()));
            }
        }

        let input_shape = match self.input_schema {
            Some(schema) => Shape::new(schema).map_err(|e| invalid(format!("input schema: {}", e)))?,
            None => first.input_shape().clone(),
        };
        let output_shape = self
            .output_schema
            .map(Shape::new)
            .transpose()
            .map_err(|e| invalid(format!("output schema: {}", e)))?;

        first
            .input_shape()
            .check_satisfied_by(&input_shape)
            .map_err(|e| invalid(format!("step '{}' cannot accept workflow input: {}", first.id(), e)))?;

        for pair in self.steps.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            next.input_shape()
                .check_satisfied_by(prev.output_shape())
                .map_err(|e| {
                    invalid(format!(
                        "step '{}' cannot accept output of '{}': {}",
                        next.id(),
                        prev.id(),
                        e
                    ))
                })?;
        }

        if let (Some(declared), Some(last)) = (&output_shape, self.steps.last()) {
            declared.check_satisfied_by(last.output_shape()).map_err(|e| {
                invalid(format!(
                    "output of last step '{}' does not satisfy workflow output: {}",
                    last.id(),
                    e
                ))
            })?;
        }

        Ok(WorkflowDefinition {
            id: self.id,
            description: self.description,
            input_shape,
            output_shape,
            steps: self.steps,
        })
    }
}

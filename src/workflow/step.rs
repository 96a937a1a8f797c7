use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::agent::{AgentError, GenerationAgent};
use crate::engine::types::{ErrorKind, Payload};
use crate::protocol::{StateSnapshot, SuspendEnvelope};
use crate::workflow::schema::Shape;

/// Result of one invocation of step logic.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T = Payload> {
    /// Finished normally; the value feeds the next step.
    Continue(T),
    /// Cannot proceed without external input.
    Suspend(SuspendEnvelope),
    /// Cannot proceed at all. The run becomes permanently failed.
    Fail(StepError),
}

/// Failure reported by step logic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn step(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StepFailure, message)
    }

    pub fn agent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AgentFailure, message)
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaValidationError, message)
    }
}

impl From<AgentError> for StepError {
    fn from(err: AgentError) -> Self {
        StepError::agent(err.to_string())
    }
}

/// Everything step logic may know about where it is running.
#[derive(Clone)]
pub struct StepContext {
    pub run_id: String,
    pub workflow_id: String,
    pub step_id: String,
    pub step_index: usize,
    pub last_completed_step: Option<String>,
    pub pending_steps: Vec<String>,
    agent: Arc<dyn GenerationAgent>,
}

impl StepContext {
    pub fn new(
        run_id: impl Into<String>,
        workflow_id: impl Into<String>,
        step_id: impl Into<String>,
        step_index: usize,
        agent: Arc<dyn GenerationAgent>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            workflow_id: workflow_id.into(),
            step_id: step_id.into(),
            step_index,
            last_completed_step: None,
            pending_steps: Vec::new(),
            agent,
        }
    }

    pub fn with_position(
        mut self,
        last_completed_step: Option<String>,
        pending_steps: Vec<String>,
    ) -> Self {
        self.last_completed_step = last_completed_step;
        self.pending_steps = pending_steps;
        self
    }

    pub fn agent(&self) -> &dyn GenerationAgent {
        self.agent.as_ref()
    }

    /// Calls the generation agent once.
    pub async fn generate(&self, prompt: &str) -> Result<String, AgentError> {
        debug!(
            run_id = %self.run_id,
            step = %self.step_id,
            agent = %self.agent.name(),
            prompt_len = prompt.len(),
            "Calling generation agent"
        );
        self.agent.generate(prompt).await
    }

    /// Snapshot of the run position, for building a suspend envelope.
    pub fn snapshot(&self, partial_output: Option<Payload>) -> StateSnapshot {
        StateSnapshot {
            last_completed_step: self.last_completed_step.clone(),
            pending_steps: self.pending_steps.clone(),
            partial_output,
        }
    }
}

/// Object-safe step behaviour over JSON values.
#[async_trait]
pub trait StepLogic: Send + Sync {
    async fn run(
        &self,
        input: Payload,
        resume: Option<Payload>,
        ctx: &StepContext,
    ) -> StepOutcome;
}

/// Step behaviour over typed input, output and resume data.
///
/// Wrap in [`Typed`] (or use [`StepSpec::typed`]) to register it.
#[async_trait]
pub trait Step: Send + Sync + 'static {
    type Input: DeserializeOwned + Send;
    type Output: Serialize + Send;
    type Resume: DeserializeOwned + Send;

    async fn run(
        &self,
        input: Self::Input,
        resume: Option<Self::Resume>,
        ctx: &StepContext,
    ) -> StepOutcome<Self::Output>;
}

/// Adapts a typed [`Step`] to [`StepLogic`].
pub struct Typed<S>(pub S);

#[async_trait]
impl<S: Step> StepLogic for Typed<S> {
    async fn run(
        &self,
        input: Payload,
        resume: Option<Payload>,
        ctx: &StepContext,
    ) -> StepOutcome {
        let input: S::Input = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return StepOutcome::Fail(StepError::schema(format!("input: {}", e))),
        };
        let resume: Option<S::Resume> = match resume.map(serde_json::from_value).transpose() {
            Ok(v) => v,
            Err(e) => return StepOutcome::Fail(StepError::schema(format!("resume data: {}", e))),
        };

        match self.0.run(input, resume, ctx).await {
            StepOutcome::Continue(output) => match serde_json::to_value(output) {
                Ok(v) => StepOutcome::Continue(v),
                Err(e) => StepOutcome::Fail(StepError::step(format!("output: {}", e))),
            },
            StepOutcome::Suspend(envelope) => StepOutcome::Suspend(envelope),
            StepOutcome::Fail(err) => StepOutcome::Fail(err),
        }
    }
}

/// Synchronous transform step built from a closure.
pub struct PureFn<F>(pub F);

#[async_trait]
impl<F> StepLogic for PureFn<F>
where
    F: Fn(Payload, Option<Payload>) -> StepOutcome + Send + Sync,
{
    async fn run(
        &self,
        input: Payload,
        resume: Option<Payload>,
        _ctx: &StepContext,
    ) -> StepOutcome {
        (self.0)(input, resume)
    }
}

/// A named step with its shapes and logic.
///
/// Schema setters compile eagerly; the first compile error is held until
/// [`crate::workflow::WorkflowBuilder::build`] reports it.
#[derive(Clone)]
pub struct StepSpec {
    id: String,
    input_shape: Shape,
    output_shape: Shape,
    resume_shape: Option<Shape>,
    suspend_shape: Option<Shape>,
    logic: Arc<dyn StepLogic>,
    pub(crate) schema_error: Option<String>,
}

impl StepSpec {
    pub fn new(id: impl Into<String>, logic: impl StepLogic + 'static) -> Self {
        Self {
            id: id.into(),
            input_shape: Shape::any(),
            output_shape: Shape::any(),
            resume_shape: None,
            suspend_shape: None,
            logic: Arc::new(logic),
            schema_error: None,
        }
    }

    pub fn typed<S: Step>(id: impl Into<String>, step: S) -> Self {
        Self::new(id, Typed(step))
    }

    pub fn pure<F>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(Payload, Option<Payload>) -> StepOutcome + Send + Sync + 'static,
    {
        Self::new(id, PureFn(f))
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        if let Some(shape) = self.compile("input", schema) {
            self.input_shape = shape;
        }
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        if let Some(shape) = self.compile("output", schema) {
            self.output_shape = shape;
        }
        self
    }

    pub fn resume_schema(mut self, schema: Value) -> Self {
        self.resume_shape = self.compile("resume", schema);
        self
    }

    pub fn suspend_schema(mut self, schema: Value) -> Self {
        self.suspend_shape = self.compile("suspend", schema);
        self
    }

    fn compile(&mut self, which: &str, schema: Value) -> Option<Shape> {
        match Shape::new(schema) {
            Ok(shape) => Some(shape),
            Err(e) => {
                self.schema_error
                    .get_or_insert_with(|| format!("step '{}' {} schema: {}", self.id, which, e));
                None
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    pub fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    pub fn resume_shape(&self) -> Option<&Shape> {
        self.resume_shape.as_ref()
    }

    pub fn suspend_shape(&self) -> Option<&Shape> {
        self.suspend_shape.as_ref()
    }

    pub fn logic(&self) -> Arc<dyn StepLogic> {
        self.logic.clone()
    }
}

impl std::fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSpec")
            .field("id", &self.id)
            .field("input_shape", &self.input_shape)
            .field("output_shape", &self.output_shape)
            .field("resume_shape", &self.resume_shape)
            .field("suspend_shape", &self.suspend_shape)
            .finish_non_exhaustive()
    }
}

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::agent::GenerationAgent;
use crate::engine::error::EngineError;
use crate::engine::types::*;
use crate::protocol::{self, SuspendEnvelope};
use crate::storage::RunStore;
use crate::workflow::{StepContext, StepError, StepLogic, StepOutcome, StepSpec, WorkflowDefinition};

/// What a step invocation does to its run once its outcome has been checked.
enum Transition {
    Advance(Payload),
    Complete(Payload),
    Suspend(SuspendEnvelope),
    Fail(StepError),
}

impl Transition {
    fn outcome_kind(&self) -> OutcomeKind {
        match self {
            Transition::Advance(_) | Transition::Complete(_) => OutcomeKind::Continue,
            Transition::Suspend(_) => OutcomeKind::Suspend,
            Transition::Fail(_) => OutcomeKind::Fail,
        }
    }
}

/// Runs the steps of one run and records every outcome in the run store.
pub struct StepExecutor {
    store: Arc<dyn RunStore>,
    agent: Arc<dyn GenerationAgent>,
}

impl StepExecutor {
    pub fn new(store: Arc<dyn RunStore>, agent: Arc<dyn GenerationAgent>) -> Self {
        Self { store, agent }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Validate the initial input and create the run record.
    ///
    /// Nothing is persisted when the input does not conform.
    pub async fn create_run(
        &self,
        workflow: &WorkflowDefinition,
        input: Payload,
    ) -> Result<RunRecord, EngineError> {
        let first = workflow.step(0).ok_or_else(|| {
            EngineError::InvalidDefinition(format!("workflow '{}' has no steps", workflow.id()))
        })?;

        workflow
            .input_shape()
            .validate(&input)
            .and_then(|_| first.input_shape().validate(&input))
            .map_err(|errors| EngineError::SchemaValidation {
                subject: format!("Input for workflow '{}'", workflow.id()),
                errors,
            })?;

        let record = self.store.create(workflow.id(), &input).await?;
        info!(run_id = %record.run_id, workflow = %workflow.id(), "Run created");
        Ok(record)
    }

    /// Check a resume request and move the run back into `running`.
    ///
    /// Returns the index of the step that will be re-invoked. A rejected
    /// request leaves the record as it was.
    pub async fn admit_resume(
        &self,
        workflow: &WorkflowDefinition,
        run_id: &str,
        step_id: &str,
        payload: &Payload,
    ) -> Result<usize, EngineError> {
        let record = self.store.get(run_id).await?;
        let index = protocol::admit(&record, workflow, step_id, payload)?;

        self.store
            .update(run_id, Box::new(move |r: &mut RunRecord| r.begin_resume(index)))
            .await?;

        info!(run_id = %run_id, step = %step_id, "Resume admitted");
        Ok(index)
    }

    /// Execute the run from its current step until it suspends, completes or fails.
    ///
    /// `resume` is handed to the first step invoked and to no other. When a
    /// store write fails mid-run, the run is marked failed before the error
    /// is returned so it cannot stay `running` with nothing driving it.
    pub async fn drive(
        &self,
        workflow: Arc<WorkflowDefinition>,
        run_id: &str,
        resume: Option<Payload>,
    ) -> Result<RunRecord, EngineError> {
        match self.drive_steps(&workflow, run_id, resume).await {
            Err(EngineError::Storage(cause)) => {
                self.fail_after_store_error(&workflow, run_id, &cause).await;
                Err(EngineError::Storage(cause))
            }
            other => other,
        }
    }

    async fn drive_steps(
        &self,
        workflow: &WorkflowDefinition,
        run_id: &str,
        mut resume: Option<Payload>,
    ) -> Result<RunRecord, EngineError> {
        let mut record = self.store.get(run_id).await?;

        while record.status() == RunStatus::Running {
            let index = record.current_step_index;

            let Some(step) = workflow.step(index) else {
                record = self.fail_out_of_range(workflow, run_id, index).await?;
                break;
            };

            let last_completed = index
                .checked_sub(1)
                .and_then(|i| workflow.step(i))
                .map(|s| s.id().to_string());
            let pending = workflow.pending_after(index);

            let ctx = StepContext::new(run_id, workflow.id(), step.id(), index, self.agent.clone())
                .with_position(last_completed.clone(), pending.clone());

            info!(run_id = %run_id, step = %step.id(), index, resumed = resume.is_some(), "Executing step");

            let entered_at = Utc::now();
            let outcome = invoke(step.logic(), record.step_input(), resume.take(), ctx).await;
            let left_at = Utc::now();

            let transition = check_outcome(workflow, step, index, outcome, last_completed, pending);
            let entry = HistoryEntry {
                step_id: step.id().to_string(),
                step_index: index,
                entered_at,
                left_at,
                outcome_kind: transition.outcome_kind(),
            };

            log_transition(run_id, step.id(), &transition);

            record = self
                .store
                .update(
                    run_id,
                    Box::new(move |r: &mut RunRecord| {
                        apply_transition(r, index, transition, entry)
                    }),
                )
                .await?;
        }

        Ok(record)
    }

    /// Best-effort write of a `failed` state after the store rejected a
    /// transition. Leaves runs another caller already moved on untouched.
    async fn fail_after_store_error(
        &self,
        workflow: &WorkflowDefinition,
        run_id: &str,
        cause: &anyhow::Error,
    ) {
        let step_ids: Vec<String> = workflow.steps().iter().map(|s| s.id().to_string()).collect();
        let message = format!("run store write failed: {:#}", cause);

        let result = self
            .store
            .update(
                run_id,
                Box::new(move |r: &mut RunRecord| {
                    if r.status() != RunStatus::Running {
                        return Err(r.invalid_transition("fail"));
                    }
                    let error = ErrorRecord {
                        kind: ErrorKind::StepFailure,
                        message,
                        step_id: step_ids
                            .get(r.current_step_index)
                            .cloned()
                            .unwrap_or_default(),
                        at: Utc::now(),
                    };
                    r.state = RunState::Failed { error };
                    Ok(())
                }),
            )
            .await;

        match result {
            Ok(_) => warn!(run_id = %run_id, error = %cause, "Run failed after a store write error"),
            Err(e) => error!(run_id = %run_id, error = %e, "Could not record run failure; run may be left running"),
        }
    }

    async fn fail_out_of_range(
        &self,
        workflow: &WorkflowDefinition,
        run_id: &str,
        index: usize,
    ) -> Result<RunRecord, EngineError> {
        error!(run_id = %run_id, workflow = %workflow.id(), index, "Run points past the last step");
        let error = ErrorRecord {
            kind: ErrorKind::StepFailure,
            message: format!(
                "workflow '{}' has {} steps; run is at index {}",
                workflow.id(),
                workflow.len(),
                index
            ),
            step_id: String::new(),
            at: Utc::now(),
        };
        self.store
            .update(
                run_id,
                Box::new(move |r: &mut RunRecord| {
                    r.state = RunState::Failed { error };
                    Ok(())
                }),
            )
            .await
    }
}

/// Runs step logic on its own task so a panic becomes a step failure.
async fn invoke(
    logic: Arc<dyn StepLogic>,
    input: Payload,
    resume: Option<Payload>,
    ctx: StepContext,
) -> StepOutcome {
    let handle = tokio::spawn(async move { logic.run(input, resume, &ctx).await });

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            StepOutcome::Fail(StepError::step(format!("step panicked: {}", message)))
        }
        Err(e) => StepOutcome::Fail(StepError::step(format!("step task aborted: {}", e))),
    }
}

/// Validates what a step returned against the shapes around it.
fn check_outcome(
    workflow: &WorkflowDefinition,
    step: &StepSpec,
    index: usize,
    outcome: StepOutcome,
    last_completed: Option<String>,
    pending: Vec<String>,
) -> Transition {
    match outcome {
        StepOutcome::Continue(output) => {
            if let Err(errors) = step.output_shape().validate(&output) {
                return shape_failure(format!("output of step '{}'", step.id()), errors);
            }

            if workflow.is_last(index) {
                if let Some(shape) = workflow.output_shape()
                    && let Err(errors) = shape.validate(&output)
                {
                    return shape_failure(format!("output of workflow '{}'", workflow.id()), errors);
                }
                return Transition::Complete(output);
            }

            if let Some(next) = workflow.step(index + 1)
                && let Err(errors) = next.input_shape().validate(&output)
            {
                return shape_failure(format!("input of step '{}'", next.id()), errors);
            }
            Transition::Advance(output)
        }
        StepOutcome::Suspend(mut envelope) => {
            let shape_required = step
                .resume_shape()
                .map(|s| s.required_fields())
                .unwrap_or_default();
            envelope.normalize(last_completed, pending, &shape_required);

            if let Some(shape) = step.suspend_shape() {
                let value = match serde_json::to_value(&envelope) {
                    Ok(v) => v,
                    Err(e) => {
                        return Transition::Fail(StepError::schema(format!(
                            "suspend envelope of step '{}' is not serializable: {}",
                            step.id(),
                            e
                        )));
                    }
                };
                if let Err(errors) = shape.validate(&value) {
                    return shape_failure(format!("suspend envelope of step '{}'", step.id()), errors);
                }
            }
            Transition::Suspend(envelope)
        }
        StepOutcome::Fail(err) => Transition::Fail(err),
    }
}

fn shape_failure(subject: String, errors: Vec<String>) -> Transition {
    Transition::Fail(StepError::schema(format!(
        "{} does not match its schema: {}",
        subject,
        errors.join("; ")
    )))
}

fn apply_transition(
    record: &mut RunRecord,
    index: usize,
    transition: Transition,
    entry: HistoryEntry,
) -> Result<(), EngineError> {
    if record.status() != RunStatus::Running || record.current_step_index != index {
        return Err(record.invalid_transition("record step outcome for"));
    }

    match transition {
        Transition::Advance(output) => record.advance(output, entry),
        Transition::Complete(output) => record.complete(output, entry),
        Transition::Suspend(envelope) => record.suspend(envelope, entry),
        Transition::Fail(err) => {
            let error = ErrorRecord {
                kind: err.kind,
                message: err.message,
                step_id: entry.step_id.clone(),
                at: entry.left_at,
            };
            record.fail(error, entry);
        }
    }
    Ok(())
}

fn log_transition(run_id: &str, step_id: &str, transition: &Transition) {
    match transition {
        Transition::Advance(_) => info!(run_id = %run_id, step = %step_id, "Step completed"),
        Transition::Complete(_) => info!(run_id = %run_id, step = %step_id, "Run completed"),
        Transition::Suspend(envelope) => info!(
            run_id = %run_id,
            step = %step_id,
            reason = ?envelope.reason,
            required = ?envelope.resume_conditions.required_inputs,
            "Run suspended"
        ),
        Transition::Fail(err) => warn!(
            run_id = %run_id,
            step = %step_id,
            kind = %err.kind,
            error = %err.message,
            "Step failed"
        ),
    }
}

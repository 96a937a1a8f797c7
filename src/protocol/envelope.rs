use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::types::Payload;

/// Why a step stopped to wait for the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendReason {
    AwaitingHumanInput,
    AwaitingApproval,
    MissingInformation,
    ConflictingInstructions,
    QualityCheckRequired,
    ExternalDependency,
    ManualInterventionRequired,
    Other,
}

/// What the external actor is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ProvideInput,
    Approve,
    Edit,
    Clarify,
    ResolveConflict,
    SupplyData,
    Review,
    Other,
}

/// Advisory urgency. Has no scheduling effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredAction {
    pub action_type: ActionType,
    pub instructions: String,
    /// Field names that must appear in the resume payload.
    #[serde(default)]
    pub required_fields: Vec<String>,
}

/// Progress information a client can render without reading the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_step: Option<String>,
    #[serde(default)]
    pub pending_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_output: Option<Payload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeConditions {
    /// Top-level payload fields checked before the step is re-invoked.
    #[serde(default)]
    pub required_inputs: Vec<String>,
    #[serde(default)]
    pub approval_required_from: Vec<String>,
    #[serde(default)]
    pub auto_resume_allowed: bool,
}

/// Domain entity the suspension is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendContext {
    pub entity_type: String,
    pub entity_id: String,
    pub workflow_stage: String,
}

/// Self-describing payload emitted by a suspending step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendEnvelope {
    pub reason: SuspendReason,
    pub description: String,
    pub required_action: RequiredAction,
    #[serde(default)]
    pub state_snapshot: StateSnapshot,
    #[serde(default)]
    pub resume_conditions: ResumeConditions,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<SuspendContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<DateTime<Utc>>,
}

impl SuspendEnvelope {
    pub fn new(reason: SuspendReason, description: impl Into<String>) -> Self {
        let description = description.into();
        let action_type = match reason {
            SuspendReason::AwaitingApproval => ActionType::Approve,
            SuspendReason::QualityCheckRequired => ActionType::Review,
            SuspendReason::ConflictingInstructions => ActionType::ResolveConflict,
            SuspendReason::MissingInformation => ActionType::SupplyData,
            _ => ActionType::ProvideInput,
        };
        Self {
            reason,
            required_action: RequiredAction {
                action_type,
                instructions: description.clone(),
                required_fields: Vec::new(),
            },
            description,
            state_snapshot: StateSnapshot::default(),
            resume_conditions: ResumeConditions::default(),
            priority: Priority::default(),
            context: None,
            suspended_at: None,
        }
    }

    pub fn with_action(mut self, action_type: ActionType, instructions: impl Into<String>) -> Self {
        self.required_action.action_type = action_type;
        self.required_action.instructions = instructions.into();
        self
    }

    /// Declares the payload fields a resume must carry.
    pub fn with_required_inputs<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.required_action.required_fields = fields.clone();
        self.resume_conditions.required_inputs = fields;
        self
    }

    pub fn with_approvers<I, S>(mut self, approvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resume_conditions.approval_required_from =
            approvers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auto_resume(mut self, allowed: bool) -> Self {
        self.resume_conditions.auto_resume_allowed = allowed;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_partial_output(mut self, output: Payload) -> Self {
        self.state_snapshot.partial_output = Some(output);
        self
    }

    pub fn with_context(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        workflow_stage: impl Into<String>,
    ) -> Self {
        self.context = Some(SuspendContext {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            workflow_stage: workflow_stage.into(),
        });
        self
    }

    /// Completes the envelope with what only the engine knows.
    ///
    /// Fills the run position into the snapshot, falls back to the resume
    /// shape's required fields when the step listed none, and makes every
    /// required input visible in `required_action.required_fields`.
    pub(crate) fn normalize(
        &mut self,
        last_completed_step: Option<String>,
        pending_steps: Vec<String>,
        shape_required: &[String],
    ) {
        self.state_snapshot.last_completed_step = last_completed_step;
        self.state_snapshot.pending_steps = pending_steps;

        if self.resume_conditions.required_inputs.is_empty() {
            self.resume_conditions.required_inputs = shape_required.to_vec();
        }
        for field in &self.resume_conditions.required_inputs {
            if !self.required_action.required_fields.contains(field) {
                self.required_action.required_fields.push(field.clone());
            }
        }

        if self.suspended_at.is_none() {
            self.suspended_at = Some(Utc::now());
        }
    }
}

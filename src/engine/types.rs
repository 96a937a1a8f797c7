use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;
use crate::protocol::SuspendEnvelope;

/// JSON data flowing into and out of steps.
pub type Payload = serde_json::Value;

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Suspended,
    Completed,
    Failed,
}

impl RunStatus {
    /// Completed and failed runs accept no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Suspended => write!(f, "suspended"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "suspended" => Ok(RunStatus::Suspended),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!(
                "Invalid status '{}'. Use: running, suspended, completed, failed",
                s
            )),
        }
    }
}

/// How a single step invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Continue,
    Suspend,
    Fail,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Continue => write!(f, "continue"),
            OutcomeKind::Suspend => write!(f, "suspend"),
            OutcomeKind::Fail => write!(f, "fail"),
        }
    }
}

/// Audit entry appended once per step invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub step_id: String,
    pub step_index: usize,
    pub entered_at: DateTime<Utc>,
    pub left_at: DateTime<Utc>,
    pub outcome_kind: OutcomeKind,
}

/// Category of a failure raised while a step was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The generation agent timed out, errored, or returned garbage.
    AgentFailure,
    /// Step logic reported a failure of its own, or panicked.
    StepFailure,
    /// The step produced an output or envelope that violates its declared shape.
    SchemaValidationError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::AgentFailure => write!(f, "AgentFailure"),
            ErrorKind::StepFailure => write!(f, "StepFailure"),
            ErrorKind::SchemaValidationError => write!(f, "SchemaValidationError"),
        }
    }
}

/// Structured error stored on a failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub step_id: String,
    pub at: DateTime<Utc>,
}

/// Status together with the data that status owns.
///
/// Encoding the envelope, result and error inside the variant keeps
/// "exactly one of them is present, matching the status" true by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunState {
    Running,
    Suspended {
        #[serde(rename = "suspendEnvelope")]
        suspend_envelope: SuspendEnvelope,
    },
    Completed {
        #[serde(rename = "finalResult")]
        final_result: Payload,
    },
    Failed {
        error: ErrorRecord,
    },
}

impl RunState {
    pub fn status(&self) -> RunStatus {
        match self {
            RunState::Running => RunStatus::Running,
            RunState::Suspended { .. } => RunStatus::Suspended,
            RunState::Completed { .. } => RunStatus::Completed,
            RunState::Failed { .. } => RunStatus::Failed,
        }
    }
}

/// Persistent record of one run. Only the run store hands these out, and only
/// the step executor mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub workflow_id: String,
    #[serde(flatten)]
    pub state: RunState,
    pub current_step_index: usize,
    /// Input the run was started with; feeds step 0.
    pub input: Payload,
    /// Output of the most recently completed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<Payload>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// A fresh record in `running` at step 0 with a newly generated run id.
    pub fn new(workflow_id: &str, input: Payload) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            state: RunState::Running,
            current_step_index: 0,
            input,
            last_output: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.state.status()
    }

    pub fn suspend_envelope(&self) -> Option<&SuspendEnvelope> {
        match &self.state {
            RunState::Suspended { suspend_envelope } => Some(suspend_envelope),
            _ => None,
        }
    }

    pub fn final_result(&self) -> Option<&Payload> {
        match &self.state {
            RunState::Completed { final_result } => Some(final_result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match &self.state {
            RunState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Input for the step at `current_step_index`: the original input for
    /// step 0, otherwise the previous step's output.
    pub fn step_input(&self) -> Payload {
        if self.current_step_index == 0 {
            self.input.clone()
        } else {
            self.last_output.clone().unwrap_or(Payload::Null)
        }
    }

    /// Moves a run suspended at `step_index` back into `running`, clearing
    /// its envelope.
    pub fn begin_resume(&mut self, step_index: usize) -> Result<(), EngineError> {
        if self.status() != RunStatus::Suspended {
            return Err(self.invalid_transition("resume"));
        }
        if self.current_step_index != step_index {
            return Err(self.invalid_transition("resume"));
        }
        self.state = RunState::Running;
        Ok(())
    }

    /// Records a successful non-final step and moves the cursor forward.
    pub fn advance(&mut self, output: Payload, entry: HistoryEntry) {
        self.history.push(entry);
        self.last_output = Some(output);
        self.current_step_index += 1;
        self.state = RunState::Running;
    }

    /// Records the final step's output as the run result.
    pub fn complete(&mut self, output: Payload, entry: HistoryEntry) {
        self.history.push(entry);
        self.last_output = Some(output.clone());
        self.state = RunState::Completed {
            final_result: output,
        };
    }

    pub fn suspend(&mut self, envelope: SuspendEnvelope, entry: HistoryEntry) {
        self.history.push(entry);
        self.state = RunState::Suspended {
            suspend_envelope: envelope,
        };
    }

    pub fn fail(&mut self, error: ErrorRecord, entry: HistoryEntry) {
        self.history.push(entry);
        self.state = RunState::Failed { error };
    }

    /// Checks that `next` is a legal successor of this record.
    pub fn validate_transition(&self, next: &RunRecord) -> Result<(), EngineError> {
        if self.status().is_terminal() {
            return Err(self.invalid_transition("update"));
        }
        if next.run_id != self.run_id || next.workflow_id != self.workflow_id {
            return Err(self.invalid_transition("rewrite identity of"));
        }
        if next.current_step_index < self.current_step_index {
            return Err(self.invalid_transition("rewind"));
        }
        if next.history.len() < self.history.len()
            || next.history[..self.history.len()] != self.history[..]
        {
            return Err(self.invalid_transition("rewrite history of"));
        }
        Ok(())
    }

    pub(crate) fn invalid_transition(&self, operation: &'static str) -> EngineError {
        EngineError::InvalidTransition {
            run_id: self.run_id.clone(),
            status: self.status(),
            operation,
        }
    }
}

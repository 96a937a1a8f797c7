//! Suspend/resume contract between steps and the clients that unblock them.
//!
//! A suspending step emits a [`SuspendEnvelope`] describing exactly what it
//! needs; a resume payload must satisfy the envelope's required inputs and the
//! step's declared resume shape before the step logic sees it.

pub mod envelope;
pub mod resume;

pub use envelope::{
    ActionType, Priority, RequiredAction, ResumeConditions, StateSnapshot, SuspendContext,
    SuspendEnvelope, SuspendReason,
};
pub use resume::{admit, missing_inputs};

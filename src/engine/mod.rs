pub mod controller;
pub mod error;
pub mod executor;
pub mod types;

pub use controller::{RunController, RunSummary, RunView};
pub use error::EngineError;
pub use executor::StepExecutor;
pub use types::*;

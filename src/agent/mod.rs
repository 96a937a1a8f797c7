//! Adapter boundary for the external text-generation service.
//!
//! Steps see only [`GenerationAgent::generate`]; the engine never inspects
//! the returned text.

pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

pub use openai::{AgentSettings, OpenAiAgent};

#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    #[error("generation agent unavailable: {0}")]
    Unavailable(String),

    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation request timed out after {0}s")]
    Timeout(f64),

    #[error("generation agent returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed generation response: {0}")]
    Malformed(String),
}

/// Produces text for a prompt. Slow, fallible, and stateless from the
/// engine's point of view.
#[async_trait]
pub trait GenerationAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Stand-in used when no provider is configured. Every call fails.
pub struct UnconfiguredAgent;

#[async_trait]
impl GenerationAgent for UnconfiguredAgent {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, AgentError> {
        Err(AgentError::Unavailable(
            "no API key configured (set OPENAI_API_KEY or agent.api_key)".to_string(),
        ))
    }
}

/// Builds the configured agent, falling back to [`UnconfiguredAgent`] when
/// no API key is available.
pub fn from_settings(settings: AgentSettings) -> Arc<dyn GenerationAgent> {
    match OpenAiAgent::new(settings.with_env_fallbacks()) {
        Ok(agent) => {
            info!(model = %agent.model(), "Generation agent configured");
            Arc::new(agent)
        }
        Err(e) => {
            warn!(error = %e, "Generation agent not configured; agent-backed steps will fail");
            Arc::new(UnconfiguredAgent)
        }
    }
}

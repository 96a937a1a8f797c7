use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use super::{AgentError, GenerationAgent};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-5-mini";
const DEFAULT_TIMEOUT_S: f64 = 120.0;

/// Provider settings from the `agent:` config section.
/// Missing values fall back to environment variables, then defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub timeout_s: Option<f64>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl AgentSettings {
    /// Fill unset fields from `OPENAI_BASE_URL`, `OPENAI_API_KEY` and `GATEFLOW_MODEL`.
    pub fn with_env_fallbacks(mut self) -> Self {
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if self.model.is_none() {
            self.model = std::env::var("GATEFLOW_MODEL").ok();
        }
        self
    }
}

/// Chat Completions client for OpenAI and OpenAI-compatible endpoints.
pub struct OpenAiAgent {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    model: String,
    system_prompt: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u64>,
    timeout_s: f64,
}

impl OpenAiAgent {
    pub fn new(settings: AgentSettings) -> Result<Self, AgentError> {
        let api_key = settings
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AgentError::Unavailable("missing API key".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| AgentError::Unavailable(format!("invalid API key: {}", e)))?,
        );

        let base_url = settings
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_s = settings.timeout_s.unwrap_or(DEFAULT_TIMEOUT_S);
        let timeout = Duration::try_from_secs_f64(timeout_s)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| AgentError::Unavailable(format!("invalid timeout_s: {}", timeout_s)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            headers,
            model: settings.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            system_prompt: settings.system_prompt,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout_s,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body(&self, prompt: &str) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &self.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(self.model.clone()));
        body.insert("messages".to_string(), Value::Array(messages));
        if let Some(temperature) = self.temperature {
            body.insert("temperature".to_string(), Value::from(temperature));
        }
        if let Some(max_tokens) = self.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl GenerationAgent for OpenAiAgent {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, AgentError> {
        let body = self.build_body(prompt);

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout(self.timeout_s)
                } else {
                    AgentError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::Request(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            warn!(model = %self.model, status = status.as_u16(), "Generation request rejected");
            return Err(AgentError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| AgentError::Malformed(format!("response is not JSON: {}", e)))?;
        let reply = extract_chat_reply(&parsed)
            .ok_or_else(|| AgentError::Malformed("response contains no text".to_string()))?;

        info!(model = %self.model, chars = reply.len(), "Generation complete");
        Ok(reply)
    }
}

fn extract_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            if !s.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(s);
            }
        }
        Value::Array(items) => {
            for item in items {
                extract_text(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(text) = map.get("text").or_else(|| map.get("content")) {
                extract_text(text, out);
            }
        }
        _ => {}
    }
}

/// Text of the first choice, accepting string or content-part replies.
pub(crate) fn extract_chat_reply(data: &Value) -> Option<String> {
    let first = data.get("choices")?.as_array()?.first()?;
    let mut out = String::new();

    if let Some(content) = first.get("message").and_then(|m| m.get("content")) {
        extract_text(content, &mut out);
    }

    if out.is_empty()
        && let Some(text) = first.get("text").and_then(Value::as_str)
    {
        out.push_str(text);
    }

    if out.trim().is_empty() { None } else { Some(out) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_message_content() {
        let data = json!({ "choices": [{ "message": { "role": "assistant", "content": "Once upon a time" } }] });
        assert_eq!(extract_chat_reply(&data).as_deref(), Some("Once upon a time"));
    }

    #[test]
    fn extracts_content_parts() {
        let data = json!({
            "choices": [{ "message": { "content": [
                { "type": "text", "text": "TITLE: Ash" },
                { "type": "text", "text": "Chapter 1: Ember" }
            ] } }]
        });
        assert_eq!(
            extract_chat_reply(&data).as_deref(),
            Some("TITLE: Ash Chapter 1: Ember")
        );
    }

    #[test]
    fn empty_reply_is_none() {
        let data = json!({ "choices": [{ "message": { "content": "" } }] });
        assert!(extract_chat_reply(&data).is_none());
        assert!(extract_chat_reply(&json!({})).is_none());
    }

    #[test]
    fn missing_api_key_is_unavailable() {
        let result = OpenAiAgent::new(AgentSettings::default());
        assert!(matches!(result, Err(AgentError::Unavailable(_))));
    }

    #[test]
    fn unusable_timeout_is_unavailable() {
        for timeout_s in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = OpenAiAgent::new(AgentSettings {
                api_key: Some("sk-test".to_string()),
                timeout_s: Some(timeout_s),
                ..Default::default()
            });
            assert!(
                matches!(result, Err(AgentError::Unavailable(ref m)) if m.contains("timeout_s")),
                "timeout_s = {}",
                timeout_s
            );
        }
    }

    #[test]
    fn body_includes_system_prompt_and_limits() {
        let agent = OpenAiAgent::new(AgentSettings {
            api_key: Some("sk-test".to_string()),
            model: Some("test-model".to_string()),
            system_prompt: Some("You write fiction.".to_string()),
            temperature: Some(0.7),
            max_tokens: Some(512),
            ..Default::default()
        })
        .unwrap();

        let body = agent.build_body("hello");
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 512);
    }
}

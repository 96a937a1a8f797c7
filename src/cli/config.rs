use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::agent::AgentSettings;
use crate::client::PollConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STORE_DIR: &str = "data/runs";
pub const DEFAULT_MAX_BODY: usize = 1_048_576;

/// Configuration loaded from `gateflow.yaml`.
/// All fields are optional; missing fields fall back to CLI/env/defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct GateflowConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub store_dir: Option<String>,
    pub max_body: Option<usize>,
    /// Generation agent provider settings.
    pub agent: AgentSettings,
    /// Client polling schedule used by `gateflow wait`.
    pub poll: PollSettings,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct PollSettings {
    pub interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl PollSettings {
    pub fn to_poll_config(&self) -> PollConfig {
        let defaults = PollConfig::default();
        PollConfig {
            interval: self
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
        }
    }
}

impl GateflowConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `gateflow.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new("gateflow.yaml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))
    }

    /// Parse configuration from YAML text. An empty document yields defaults.
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(contents)?)
    }
}

use std::io::Write;
use std::time::Duration;

use gateflow::cli::GateflowConfig;
use tempfile::NamedTempFile;

#[test]
fn load_valid_config_all_fields() {
    let yaml = r#"
host: "127.0.0.1"
port: 8080
store_dir: "custom/runs"
max_body: 2097152
agent:
  base_url: "http://localhost:11434/v1"
  api_key: "sk-test"
  model: "llama3"
  timeout_s: 45.5
  temperature: 0.7
  max_tokens: 4000
poll:
  interval_ms: 500
  max_attempts: 10
"#;

    let mut f = NamedTempFile::new().unwrap();
    f.write_all(yaml.as_bytes()).unwrap();

    let cfg = GateflowConfig::load(Some(f.path())).unwrap();

    assert_eq!(cfg.host.as_deref(), Some("127.0.0.1"));
    assert_eq!(cfg.port, Some(8080));
    assert_eq!(cfg.store_dir.as_deref(), Some("custom/runs"));
    assert_eq!(cfg.max_body, Some(2097152));
    assert_eq!(cfg.agent.base_url.as_deref(), Some("http://localhost:11434/v1"));
    assert_eq!(cfg.agent.api_key.as_deref(), Some("sk-test"));
    assert_eq!(cfg.agent.model.as_deref(), Some("llama3"));
    assert_eq!(cfg.agent.timeout_s, Some(45.5));
    assert_eq!(cfg.agent.max_tokens, Some(4000));
    assert_eq!(cfg.poll.interval_ms, Some(500));
    assert_eq!(cfg.poll.max_attempts, Some(10));
}

#[test]
fn load_partial_config() {
    let yaml = r#"
port: 9090
"#;

    let mut f = NamedTempFile::new().unwrap();
    f.write_all(yaml.as_bytes()).unwrap();

    let cfg = GateflowConfig::load(Some(f.path())).unwrap();

    assert_eq!(cfg.port, Some(9090));
    assert!(cfg.host.is_none());
    assert!(cfg.store_dir.is_none());
    assert!(cfg.max_body.is_none());
    assert!(cfg.agent.api_key.is_none());
    assert!(cfg.poll.interval_ms.is_none());
}

#[test]
fn missing_explicit_path_returns_error() {
    let result = GateflowConfig::load(Some(std::path::Path::new("/nonexistent/gateflow.yaml")));
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Config file not found")
    );
}

#[test]
fn empty_document_yields_defaults() {
    let cfg = GateflowConfig::parse("   \n").unwrap();
    assert!(cfg.host.is_none());
    assert!(cfg.port.is_none());
    assert!(cfg.agent.model.is_none());
}

#[test]
fn invalid_yaml_returns_error() {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(b"port: [not, a, number]").unwrap();

    let err = GateflowConfig::load(Some(f.path())).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn poll_settings_fall_back_to_defaults() {
    let cfg = GateflowConfig::parse("poll:\n  max_attempts: 5\n").unwrap();
    let poll = cfg.poll.to_poll_config();
    assert_eq!(poll.max_attempts, 5);
    assert_eq!(poll.interval, Duration::from_millis(3000));

    let poll = GateflowConfig::default().poll.to_poll_config();
    assert_eq!(poll.max_attempts, 60);
}

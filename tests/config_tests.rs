//! Configuration loading, validation and environment override tests

use std::fs;
use std::path::PathBuf;

use baseline_realtime::config::{MonitorConfig, ReconnectStrategy, DEFAULT_ENDPOINT_URL};
use baseline_realtime::error::{Error, ErrorCode};
use tempfile::TempDir;

/// Temporary directory holding one config file
struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("realtime.toml");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

fn cli() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("baseline-realtime").unwrap();
    cmd.env_remove("BASELINE_WS_URL");
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_minimal_config_uses_defaults() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[realtime]\n");

    let config = MonitorConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(config.realtime.endpoint_url, DEFAULT_ENDPOINT_URL);
    assert_eq!(config.realtime.heartbeat_interval_ms, 30_000);
    assert_eq!(config.realtime.reconnect_delay_ms, 3_000);
    assert_eq!(config.realtime.reconnect_strategy, ReconnectStrategy::Fixed);
    assert!(config.realtime.auto_start);
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[realtime]
endpoint_url = "wss://monitor.example.com/api/v1/ws"
heartbeat_interval_ms = 10000
reconnect_delay_ms = 500
reconnect_strategy = "exponential"
max_reconnect_delay_ms = 8000
connect_timeout_ms = 2000
auto_start = false

[logging]
level = "warn"
json_format = true
"#,
    );

    let config = MonitorConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(config.realtime.endpoint_url, "wss://monitor.example.com/api/v1/ws");
    assert_eq!(config.realtime.heartbeat_interval_ms, 10_000);
    assert_eq!(config.realtime.reconnect_delay_ms, 500);
    assert_eq!(config.realtime.reconnect_strategy, ReconnectStrategy::Exponential);
    assert_eq!(config.realtime.max_reconnect_delay_ms, 8_000);
    assert!(!config.realtime.auto_start);
    assert_eq!(config.logging.level, "warn");
    assert!(config.logging.json_format);
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_rejects_non_websocket_url() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[realtime]
endpoint_url = "https://monitor.example.com/api/v1/ws"
"#,
    );

    let err = MonitorConfig::load(Some(fixture.path())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfigValidation);
}

#[test]
fn test_rejects_zero_heartbeat() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[realtime]
heartbeat_interval_ms = 0
"#,
    );

    match MonitorConfig::load(Some(fixture.path())).unwrap_err() {
        Error::ConfigValidation { field, .. } => {
            assert_eq!(field.as_deref(), Some("realtime.heartbeat_interval_ms"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_rejects_cap_below_delay() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[realtime]
reconnect_delay_ms = 5000
max_reconnect_delay_ms = 1000
"#,
    );

    assert!(MonitorConfig::load(Some(fixture.path())).is_err());
}

#[test]
fn test_rejects_unknown_strategy() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[realtime]
reconnect_strategy = "linear"
"#,
    );

    let err = MonitorConfig::load(Some(fixture.path())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfigParseError);
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[realtime\nendpoint_url = ");

    cli()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .stderr(predicates::str::contains("E101"));
}

// ─────────────────────────────────────────────────────────────────
// Environment Overrides
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_overrides_file() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[realtime]
endpoint_url = "ws://file.example.com/api/v1/ws"
reconnect_delay_ms = 3000
"#,
    );

    cli()
        .args(["config", "show", "--config", fixture.path()])
        .env("BASELINE_WS_URL", "wss://env.example.com/api/v1/ws")
        .env("BASELINE_RECONNECT_DELAY_MS", "750")
        .env("BASELINE_RECONNECT_STRATEGY", "exponential")
        .assert()
        .success()
        .stdout(predicates::str::contains("wss://env.example.com/api/v1/ws"))
        .stdout(predicates::str::contains("reconnect_delay_ms = 750"))
        .stdout(predicates::str::contains("exponential"));
}

#[test]
fn test_invalid_env_strategy_fails() {
    cli()
        .args(["config", "validate"])
        .env("BASELINE_RECONNECT_STRATEGY", "sometimes")
        .assert()
        .failure()
        .stderr(predicates::str::contains("reconnect strategy"));
}

#[test]
fn test_tilde_expansion_in_log_file() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[logging]
file = "~/.baseline/logs/realtime.log"
"#,
    );

    let config = MonitorConfig::load(Some(fixture.path())).unwrap();
    let file = config.logging.file.unwrap();
    assert!(!file.starts_with('~'));
    assert!(file.ends_with(".baseline/logs/realtime.log"));
}

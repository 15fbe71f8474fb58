//! CLI integration tests using assert_cmd

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn realtime_cmd() -> Command {
    let mut cmd = Command::cargo_bin("baseline-realtime").unwrap();
    cmd.env_remove("BASELINE_WS_URL")
        .env_remove("BASELINE_CONFIG")
        .env_remove("BASELINE_LOG_LEVEL");
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Help and Version
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_commands() {
    realtime_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Baseline Monitor"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("version"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    realtime_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("baseline-realtime"))
        .stdout(predicate::str::contains("Target"))
        .stdout(predicate::str::contains("Compiler"));
}

#[test]
fn test_short_version_flag() {
    realtime_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("baseline-realtime"));
}

#[test]
fn test_watch_help() {
    realtime_cmd()
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--url"));
}

// ─────────────────────────────────────────────────────────────────
// Config Commands
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_fixture() {
    realtime_cmd()
        .args(["config", "show", "--config"])
        .arg(common::valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("[realtime]"))
        .stdout(predicate::str::contains("[logging]"))
        .stdout(predicate::str::contains("wss://monitor.example.com/api/v1/ws"))
        .stdout(predicate::str::contains("exponential"));
}

#[test]
fn test_config_validate_fixture() {
    realtime_cmd()
        .args(["config", "validate", "--config"])
        .arg(common::valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_rejects_invalid_fixture() {
    realtime_cmd()
        .args(["config", "validate", "--config"])
        .arg(common::invalid_config_fixture())
        .assert()
        .failure()
        .stderr(predicate::str::contains("E102"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    realtime_cmd()
        .args(["config", "validate", "--config", "/nonexistent/path/realtime.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"))
        .stderr(predicate::str::contains("config init"));
}

#[test]
fn test_config_init_writes_loadable_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("realtime.toml");

    realtime_cmd()
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("realtime.toml"));

    assert!(path.exists());

    realtime_cmd()
        .args(["config", "validate", "--config"])
        .arg(&path)
        .assert()
        .success();
}

// ─────────────────────────────────────────────────────────────────
// Watch
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_watch_with_missing_config_fails() {
    realtime_cmd()
        .args(["watch", "--config", "/nonexistent/realtime.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_watch_rejects_http_url() {
    realtime_cmd()
        .args(["watch", "--url", "http://localhost:8000/api/v1/ws"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ws://"));
}

// ─────────────────────────────────────────────────────────────────
// Flags and Errors
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_verbosity_flags() {
    realtime_cmd().args(["-v", "version"]).assert().success();
    realtime_cmd().args(["-vv", "version"]).assert().success();
    realtime_cmd().args(["--quiet", "version"]).assert().success();
}

#[test]
fn test_unknown_command() {
    realtime_cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    realtime_cmd().assert().failure();
}

//! Build script for baseline-realtime
//!
//! Embeds git revision and branch, build timestamp, target and compiler into the binary
//! as `BASELINE_*` compile-time environment variables.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_branch = command_output("git", &["rev-parse", "--abbrev-ref", "HEAD"]);
    let git_dirty = match command_output("git", &["status", "--porcelain"]).as_deref() {
        Some("") => "false",
        Some(_) => "true",
        None => "unknown",
    };
    let rustc_version = command_output("rustc", &["--version"]);

    let entries = [
        ("BASELINE_GIT_HASH", git_hash.unwrap_or_else(unknown)),
        ("BASELINE_GIT_BRANCH", git_branch.unwrap_or_else(unknown)),
        ("BASELINE_GIT_DIRTY", git_dirty.to_string()),
        (
            "BASELINE_BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("BASELINE_TARGET", env::var("TARGET").unwrap_or_else(|_| unknown())),
        ("BASELINE_PROFILE", env::var("PROFILE").unwrap_or_else(|_| unknown())),
        ("BASELINE_RUSTC_VERSION", rustc_version.unwrap_or_else(unknown)),
    ];

    for (key, value) in entries {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

fn unknown() -> String {
    "unknown".to_string()
}

/// Trimmed stdout of a successful command
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

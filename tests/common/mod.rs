//! Shared test fixtures

#![allow(dead_code)]

use std::path::PathBuf;

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Config with every `[realtime]` and `[logging]` field set
pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

/// Config that parses but fails validation
pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_exist() {
        assert!(valid_config_fixture().exists(), "Valid config fixture should exist");
        assert!(invalid_config_fixture().exists(), "Invalid config fixture should exist");
    }
}

//! Configuration system for the Baseline realtime client
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (BASELINE_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

/// Endpoint used when nothing else is configured (local backend)
pub const DEFAULT_ENDPOINT_URL: &str = "ws://localhost:8000/api/v1/ws";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Push channel connection settings
    pub realtime: RealtimeSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// How the delay between reconnect attempts evolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectStrategy {
    /// Same delay before every attempt, forever
    Fixed,
    /// Doubling delay with jitter, capped at `max_reconnect_delay_ms`
    Exponential,
}

impl std::str::FromStr for ReconnectStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(ReconnectStrategy::Fixed),
            "exponential" => Ok(ReconnectStrategy::Exponential),
            other => Err(Error::config_field_invalid(
                "realtime.reconnect_strategy",
                format!("Unknown reconnect strategy '{}'. Must be one of: fixed, exponential", other),
            )),
        }
    }
}

/// Push channel connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// WebSocket URL of the push endpoint
    pub endpoint_url: String,

    /// Interval between `ping` frames while connected, in milliseconds
    pub heartbeat_interval_ms: u64,

    /// Delay before a reconnect attempt, in milliseconds
    pub reconnect_delay_ms: u64,

    /// Reconnect delay policy
    pub reconnect_strategy: ReconnectStrategy,

    /// Upper bound for the exponential strategy, in milliseconds
    pub max_reconnect_delay_ms: u64,

    /// Handshake timeout, in milliseconds
    pub connect_timeout_ms: u64,

    /// Begin connecting as soon as the client is created
    pub auto_start: bool,
}

impl RealtimeSettings {
    /// Settings for an explicit endpoint, defaults otherwise
    pub fn for_endpoint(url: impl Into<String>) -> Self {
        Self {
            endpoint_url: url.into(),
            ..Self::default()
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate connection settings
    pub fn validate(&self) -> Result<()> {
        if self.endpoint_url.is_empty() {
            return Err(Error::config_field_invalid(
                "realtime.endpoint_url",
                "Endpoint URL cannot be empty",
            ));
        }

        let url = Url::parse(&self.endpoint_url).map_err(|e| {
            Error::config_field_invalid(
                "realtime.endpoint_url",
                format!("Invalid endpoint URL '{}': {}", self.endpoint_url, e),
            )
        })?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(Error::config_field_invalid(
                "realtime.endpoint_url",
                "Endpoint URL must start with ws:// or wss://",
            ));
        }

        for (field, value) in [
            ("realtime.heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("realtime.reconnect_delay_ms", self.reconnect_delay_ms),
            ("realtime.connect_timeout_ms", self.connect_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::config_field_invalid(field, format!("{} must be greater than 0", field)));
            }
        }

        if self.max_reconnect_delay_ms < self.reconnect_delay_ms {
            return Err(Error::config_field_invalid(
                "realtime.max_reconnect_delay_ms",
                "max_reconnect_delay_ms must not be smaller than reconnect_delay_ms",
            ));
        }

        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Rotate the log file every hour instead of daily
    pub hourly_rotation: bool,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            heartbeat_interval_ms: 30_000,
            reconnect_delay_ms: 3_000,
            reconnect_strategy: ReconnectStrategy::Fixed,
            max_reconnect_delay_ms: 60_000,
            connect_timeout_ms: 10_000,
            auto_start: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            hourly_rotation: false,
            json_format: false,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e.message()),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        config.apply_env_overrides()?;
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("baseline-realtime.toml"),
            dirs::config_dir()
                .map(|p| p.join("baseline").join("realtime.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".baseline").join("realtime.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/baseline/realtime.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("BASELINE_WS_URL") {
            self.realtime.endpoint_url = val;
        }
        if let Some(n) = env_number("BASELINE_HEARTBEAT_INTERVAL_MS") {
            self.realtime.heartbeat_interval_ms = n;
        }
        if let Some(n) = env_number("BASELINE_RECONNECT_DELAY_MS") {
            self.realtime.reconnect_delay_ms = n;
        }
        if let Some(n) = env_number("BASELINE_MAX_RECONNECT_DELAY_MS") {
            self.realtime.max_reconnect_delay_ms = n;
        }
        if let Some(n) = env_number("BASELINE_CONNECT_TIMEOUT_MS") {
            self.realtime.connect_timeout_ms = n;
        }
        if let Ok(val) = std::env::var("BASELINE_RECONNECT_STRATEGY") {
            self.realtime.reconnect_strategy = val.parse()?;
        }
        if let Ok(val) = std::env::var("BASELINE_AUTO_START") {
            self.realtime.auto_start = env_flag(&val);
        }

        if let Ok(val) = std::env::var("BASELINE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("BASELINE_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("BASELINE_LOG_JSON") {
            self.logging.json_format = env_flag(&val);
        }

        Ok(())
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.realtime.validate()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|val| val.parse().ok())
}

fn env_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path.map(|p| PathBuf::from(expand_path(p))).unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".baseline")
            .join("realtime.toml")
    });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Baseline Monitor realtime client configuration

[realtime]
# Push channel WebSocket URL
endpoint_url = "ws://localhost:8000/api/v1/ws"

# Interval between heartbeat pings while connected (milliseconds)
heartbeat_interval_ms = 30000

# Delay before reconnecting after the connection closes (milliseconds)
reconnect_delay_ms = 3000

# Reconnect policy: "fixed" (same delay forever) or "exponential"
reconnect_strategy = "fixed"

# Cap for the exponential policy (milliseconds)
max_reconnect_delay_ms = 60000

# Handshake timeout (milliseconds)
connect_timeout_ms = 10000

# Connect as soon as the client starts
auto_start = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.baseline/logs/realtime.log"

# Number of rotated log files to keep
max_files = 5

# Rotate hourly instead of daily
hourly_rotation = false

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.realtime.endpoint_url, DEFAULT_ENDPOINT_URL);
        assert_eq!(config.realtime.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.realtime.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(config.realtime.reconnect_strategy, ReconnectStrategy::Fixed);
        assert!(config.realtime.auto_start);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_override() {
        env::set_var("BASELINE_WS_URL", "wss://monitor.example.com/api/v1/ws");
        env::set_var("BASELINE_RECONNECT_DELAY_MS", "500");
        env::set_var("BASELINE_RECONNECT_STRATEGY", "exponential");
        env::set_var("BASELINE_AUTO_START", "0");

        let mut config = MonitorConfig::default();
        config.apply_env_overrides().unwrap();

        assert_eq!(config.realtime.endpoint_url, "wss://monitor.example.com/api/v1/ws");
        assert_eq!(config.realtime.reconnect_delay_ms, 500);
        assert_eq!(config.realtime.reconnect_strategy, ReconnectStrategy::Exponential);
        assert!(!config.realtime.auto_start);

        env::remove_var("BASELINE_WS_URL");
        env::remove_var("BASELINE_RECONNECT_DELAY_MS");
        env::remove_var("BASELINE_RECONNECT_STRATEGY");
        env::remove_var("BASELINE_AUTO_START");
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut config = MonitorConfig::default();
        config.realtime.endpoint_url = "http://localhost:8000/api/v1/ws".to_string();
        assert!(config.validate().is_err());

        config.realtime.endpoint_url = String::new();
        assert!(config.validate().is_err());

        config.realtime.endpoint_url = "ws://".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_intervals() {
        let mut config = MonitorConfig::default();
        config.realtime.heartbeat_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.realtime.reconnect_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_max_delay() {
        let mut config = MonitorConfig::default();
        config.realtime.reconnect_delay_ms = 5_000;
        config.realtime.max_reconnect_delay_ms = 1_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_reconnect_delay_ms"));
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = MonitorConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Fixed".parse::<ReconnectStrategy>().unwrap(), ReconnectStrategy::Fixed);
        assert!("linear".parse::<ReconnectStrategy>().is_err());
    }

    #[test]
    fn test_default_file_parses() {
        let config: MonitorConfig = toml::from_str(&generate_default_config()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.realtime.endpoint_url, DEFAULT_ENDPOINT_URL);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = MonitorConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: MonitorConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.realtime.endpoint_url, parsed.realtime.endpoint_url);
        assert_eq!(config.realtime.reconnect_strategy, parsed.realtime.reconnect_strategy);
    }

    #[test]
    fn test_parse_config_file() {
        let config_str = r#"
[realtime]
endpoint_url = "wss://monitor.example.com/api/v1/ws"
reconnect_delay_ms = 1500
reconnect_strategy = "exponential"

[logging]
level = "debug"
"#;

        let config: MonitorConfig = toml::from_str(config_str).unwrap();
        assert_eq!(config.realtime.endpoint_url, "wss://monitor.example.com/api/v1/ws");
        assert_eq!(config.realtime.reconnect_delay_ms, 1500);
        assert_eq!(config.realtime.heartbeat_interval_ms, 30_000);
        assert_eq!(config.realtime.reconnect_strategy, ReconnectStrategy::Exponential);
        assert_eq!(config.logging.level, "debug");
    }
}

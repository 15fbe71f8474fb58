//! CLI argument parsing using clap v4

use clap::{Parser, Subcommand};

/// Baseline Monitor realtime client
///
/// Subscribes to the Baseline Monitor push channel and prints compliance
/// events (violations, agents, rules) as they happen.
#[derive(Parser, Debug)]
#[command(name = "baseline-realtime")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the push channel and print every event as a JSON line
    Watch {
        /// Path to configuration file
        #[arg(short, long, env = "BASELINE_CONFIG")]
        config: Option<String>,

        /// Override the push endpoint (ws:// or wss://)
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Where to create the file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_watch_defaults() {
        let cli = Cli::parse_from(["baseline-realtime", "watch"]);
        match cli.command {
            Commands::Watch { config, url } => {
                assert!(config.is_none());
                assert!(url.is_none());
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_watch_with_url_override() {
        let cli = Cli::parse_from([
            "baseline-realtime",
            "watch",
            "--url",
            "wss://monitor.example.com/api/v1/ws",
        ]);
        match cli.command {
            Commands::Watch { url, .. } => {
                assert_eq!(url.as_deref(), Some("wss://monitor.example.com/api/v1/ws"));
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_verbosity_flags() {
        let cli = Cli::parse_from(["baseline-realtime", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);

        let cli = Cli::parse_from(["baseline-realtime", "watch", "-q"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init_force() {
        let cli = Cli::parse_from(["baseline-realtime", "config", "init", "--path", "/tmp/rt.toml", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert_eq!(path.as_deref(), Some("/tmp/rt.toml"));
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}

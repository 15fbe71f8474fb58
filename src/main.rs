//! baseline-realtime - Baseline Monitor push channel client
//!
//! Connects to the Baseline Monitor WebSocket endpoint and prints
//! violation, agent and rule events as JSON lines.

mod cli;

use std::io::Write;

use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use baseline_realtime::config::{self, MonitorConfig};
use baseline_realtime::error::{Error, Result};
use baseline_realtime::protocol::{EventTag, ServerEvent};
use baseline_realtime::realtime::{Handlers, LinkState, RealtimeClient};
use baseline_realtime::{logging, version};

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Watch { config, url } => {
            let mut config = MonitorConfig::load(config.as_deref())?;
            if let Some(url) = url {
                config.realtime.endpoint_url = url;
                config.validate()?;
            }

            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

            let build = version::build_info();
            info!(
                version = %build.full_version(),
                target = %build.target,
                "Starting baseline-realtime"
            );

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name("baseline-realtime")
                .build()
                .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

            runtime.block_on(watch(config))
        }
    }
}

/// Stream events to stdout until Ctrl+C
async fn watch(config: MonitorConfig) -> Result<()> {
    info!(
        url = %config.realtime.endpoint_url,
        heartbeat_ms = config.realtime.heartbeat_interval_ms,
        reconnect_ms = config.realtime.reconnect_delay_ms,
        strategy = ?config.realtime.reconnect_strategy,
        "Configuration loaded"
    );

    let mut handlers = Handlers::new();
    for tag in EventTag::ALL.into_iter().filter(|tag| tag.is_subscribable()) {
        handlers = handlers.on(tag, print_event);
    }

    let client = RealtimeClient::spawn(config.realtime.clone(), handlers)?;
    if !config.realtime.auto_start {
        client.start();
    }

    let mut state_rx = client.watch_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    warn!("Realtime client terminated");
                    break;
                }
                let state = *state_rx.borrow_and_update();
                match state {
                    LinkState::Open => info!("Connected to push channel"),
                    LinkState::Backoff => warn!("Push channel lost, waiting to reconnect"),
                    _ => {}
                }
            }
        }
    }

    client.shutdown();
    let _ = client.wait_for_state(LinkState::Idle).await;

    let stats = client.stats();
    info!(
        attempts = stats.connect_attempts,
        opened = stats.connections_opened,
        frames = stats.frames_received,
        dropped = stats.frames_dropped,
        dispatched = stats.events_dispatched,
        faults = stats.handler_faults,
        "Session summary"
    );

    Ok(())
}

/// Write one event as a JSON line on stdout
fn print_event(event: &ServerEvent) {
    let line = json!({
        "received_at": chrono::Utc::now().to_rfc3339(),
        "event": event.tag(),
        "data": event.data_json(),
    });

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
        warn!(error = %e, "Failed to write event");
    }
}

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = MonitorConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            MonitorConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}

//! Health Monitor CLI Application
//!
//! Headless front end for the health-monitor library. It:
//! - Loads the application settings (TOML) and the health document (JSON)
//! - Connects to the MQTT broker with bounded retry
//! - Feeds broker telemetry into the health orchestrator
//! - Prints periodic status reports (text or JSON)

use anyhow::{Context, Result};
use clap::Parser;
use health_monitor::{ConnectionManager, ConnectionState, HealthOrchestrator, MqttTransport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Interval, MissedTickBehavior};

mod config;
mod report;

use config::AppConfig;
use report::StatusReport;

/// Health Monitor - Watch subsystem health telemetry over MQTT
#[derive(Parser, Debug)]
#[command(name = "health-monitor")]
#[command(about = "Monitor subsystem health telemetry published over MQTT", long_about = None)]
#[command(version)]
struct Args {
    /// Path to application configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the health document (overrides `health_config`)
    #[arg(long, value_name = "FILE")]
    health: Option<PathBuf>,

    /// MQTT broker host (overrides [mqtt].host)
    #[arg(long)]
    host: Option<String>,

    /// MQTT broker port (overrides [mqtt].port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds between status reports (0 disables periodic reports)
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    status_interval: u64,

    /// Print status reports as JSON
    #[arg(long)]
    json: bool,

    /// Validate the configuration and exit without connecting
    #[arg(long)]
    check: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Health Monitor CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using health-monitor library v{}", health_monitor::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => {
            log::info!("No configuration file given, using defaults");
            AppConfig::default()
        }
    };
    if let Some(host) = &args.host {
        config.mqtt.host = host.clone();
    }
    if let Some(port) = args.port {
        config.mqtt.port = port;
    }

    let health_path = args
        .health
        .clone()
        .unwrap_or_else(|| config.health_path(args.config.as_deref()));
    let health = HealthOrchestrator::from_path(&health_path)
        .with_context(|| format!("Failed to load health document: {:?}", health_path))?;
    log::info!(
        "Loaded health document v{}: {} monitors, {} heartbeats",
        health.version(),
        health.monitor_ids().count(),
        health.heartbeats().count()
    );

    if args.check {
        println!("✓ Configuration OK");
        return Ok(ExitCode::SUCCESS);
    }

    monitor(&args, &config, Arc::new(health)).await
}

/// Connect, dispatch telemetry and report until interrupted or retries run out
async fn monitor(args: &Args, config: &AppConfig, health: Arc<HealthOrchestrator>) -> Result<ExitCode> {
    let transport = MqttTransport::new(&config.mqtt);
    let manager = ConnectionManager::new(config.mqtt.clone(), transport);

    let events = manager.events();
    let dispatcher = tokio::spawn({
        let health = Arc::clone(&health);
        async move { health.run(events).await }
    });

    let mut states = manager.state_changes();
    let mut ticker = (args.status_interval > 0).then(|| {
        let mut ticker = time::interval(Duration::from_secs(args.status_interval));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    manager.start().await;

    let failed = loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(err) = signal {
                    log::error!("Failed to listen for Ctrl-C: {}", err);
                }
                log::info!("Interrupted, shutting down");
                break false;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break false;
                }
                let state = *states.borrow_and_update();
                log::info!("Connection: {}", state);
                if state == ConnectionState::Failed {
                    break true;
                }
            }
            _ = next_report(&mut ticker) => {
                print_report(args, config, &manager, &health)?;
            }
        }
    };

    manager.cancel().await;
    print_report(args, config, &manager, &health)?;

    drop(manager);
    if let Err(err) = dispatcher.await {
        log::warn!("Dispatcher ended abnormally: {}", err);
    }

    if failed {
        log::error!(
            "Could not connect to {} after {} attempts",
            config.mqtt.endpoint(),
            config.mqtt.retries_max
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Wait for the next report tick; never resolves when reports are disabled
async fn next_report(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn print_report(
    args: &Args,
    config: &AppConfig,
    manager: &ConnectionManager<MqttTransport>,
    health: &HealthOrchestrator,
) -> Result<()> {
    let report = StatusReport {
        app: &config.app,
        connection: manager.state(),
        retry_attempt: manager.retry_attempt(),
        retry_limit: manager.retry_limit(),
        health: health.snapshot(),
    };

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.to_text());
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

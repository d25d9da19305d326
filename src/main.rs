//! Main entry point for the inhouse ladder service
//!
//! Loads configuration, initialises logging, starts the lobby workers,
//! scheduler and health endpoints, and shuts them down on SIGINT or SIGTERM.

use anyhow::Result;
use clap::Parser;
use inhouse_ladder::config::{validate_config, AppConfig};
use inhouse_ladder::service::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Inhouse Ladder - team balancer and lobby automation for a 5v5 ladder
#[derive(Parser)]
#[command(
    name = "inhouse-ladder",
    version,
    about = "Team balancer, lobby workers and queue scheduler for a 5v5 inhouse ladder"
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Health server port override
    #[arg(long, value_name = "PORT", help = "Override health and metrics port")]
    health_port: Option<u16>,

    /// Number of lobby workers override
    #[arg(long, value_name = "N", help = "Override number of lobby workers")]
    workers: Option<usize>,

    /// Seed demo players into a queue
    #[arg(
        long,
        help = "Register a demo roster and queue it so a worker picks it up"
    )]
    simulate: bool,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C) signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}

fn display_startup_banner(config: &AppConfig) {
    info!("Inhouse Ladder {}", inhouse_ladder::VERSION);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    info!("   Lobby workers: {}", config.driver.worker_count);
    info!(
        "   Team size: {}, exponent: {}, role balancing: {}",
        config.balancer.team_size, config.balancer.mmr_exponent, config.balancer.role_balancing
    );
    info!(
        "   Rating per game: {}, clamp to boundaries: {}",
        config.rating.mmr_per_game, config.rating.clamp_to_boundaries
    );
    info!("   Scheduler tick: {:?}", config.tick_interval());
}

/// Load configuration from file or environment and apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if args.debug {
        config.service.log_level = "debug".to_string();
    }
    if let Some(port) = args.health_port {
        config.service.health_port = port;
    }
    if let Some(workers) = args.workers {
        config.driver.worker_count = workers;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config);
    if args.dry_run {
        info!("Configuration is valid, exiting without starting the service");
        return Ok(());
    }

    let app_state = match AppState::new(config).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    if args.simulate {
        match app_state.seed_demo() {
            Ok(channel) => info!("Demo roster queued in channel '{}'", channel.name),
            Err(e) => warn!("Failed to seed demo roster: {}", e),
        }
    }

    info!("Inhouse ladder is running, press Ctrl+C to stop");
    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, stopping service components");
    if let Err(e) = app_state.shutdown().await {
        warn!("Shutdown incomplete: {}", e);
    }

    info!("Inhouse ladder stopped");
    Ok(())
}

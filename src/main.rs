//! Main entry point for the matchmaking relay service
//!
//! Initializes configuration and logging, starts the combined
//! WebSocket/monitoring listener and shuts down gracefully on
//! SIGINT/SIGTERM.

use anyhow::Result;
use clap::Parser;
use mimic_room::config::{validate_config, AppConfig};
use mimic_room::service::{HealthCheck, HealthStatus, ServiceApp};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// Anonymous two-party matchmaking and session relay
#[derive(Parser)]
#[command(
    name = "mimic-room",
    version,
    about = "Matchmaking and session relay for anonymous two-party deduction games",
    long_about = "mimic-room pairs anonymous players into two-seat rooms over WebSocket, \
                 relays their frames verbatim, and probabilistically substitutes one seat \
                 with a synthetic peer backed by a language-model responder."
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

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Listener port override
    #[arg(short, long, value_name = "PORT", help = "Override listener port")]
    port: Option<u16>,

    /// Substitution rate override
    #[arg(
        long,
        value_name = "PERCENT",
        help = "Override synthetic-peer substitution rate (0-100)"
    )]
    substitution_rate: Option<u8>,

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

/// Perform health check and return appropriate exit code
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app = ServiceApp::new(config)?;
    let handle = app.handle();

    match HealthCheck::check(&handle).await {
        Ok(health) => {
            println!("Health Check: {}", health.status);
            println!("  Guessers waiting: {}", health.stats.guessers_waiting);
            println!("  Mimics waiting: {}", health.stats.mimics_waiting);
            println!("  Active rooms: {}", health.stats.active_rooms);
            println!("  Human matches: {}", health.stats.human_matches);
            println!(
                "  Substituted matches: {}",
                health.stats.substituted_matches
            );
            println!("  Uptime: {}", health.stats.uptime_info);

            if health.status == HealthStatus::Healthy {
                std::process::exit(0);
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Mimic Room Matchmaking Relay");
    info!("   Service: {}", config.server.name);
    info!("   Log level: {}", config.server.log_level);
    info!("   Listener: {}", config.bind_addr());
    info!(
        "   Peer wait: {}s",
        config.matchmaking.peer_wait_seconds
    );
    info!(
        "   Substitution rate: {}%",
        config.matchmaking.substitution_rate
    );
    info!(
        "   Responder: {} ({})",
        config.responder.api_url,
        if config.responder.api_key.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.server.log_level = log_level.clone();
    }

    if args.debug {
        config.server.log_level = "debug".to_string();
    }

    if let Some(port) = args.port {
        config.server.port = port;
    }

    if let Some(rate) = args.substitution_rate {
        config.matchmaking.substitution_rate = rate;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // CLI args can override environment/config file
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.server.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    // Handle special modes
    if args.health_check {
        return perform_health_check(config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let mut app = match ServiceApp::new(config.clone()) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("✅ Mimic Room Matchmaking Relay is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");

    match tokio::time::timeout(config.shutdown_timeout(), app.shutdown()).await {
        Ok(Ok(())) => {
            info!("✅ Graceful shutdown completed successfully");
        }
        Ok(Err(e)) => {
            error!("Shutdown failed: {}", e);
        }
        Err(_) => {
            warn!("⚠️  Shutdown timeout exceeded, forcing exit");
        }
    }

    info!("🛑 Mimic Room Matchmaking Relay stopped");
    Ok(())
}

//! Scene tracker - Main Entry Point
//!
//! Bridges camera detections to scene updates over MQTT, with liveness and
//! readiness probes for container orchestration.

use clap::{Parser, Subcommand};
use scene_tracker::config::{ServiceConfig, LOG_LEVELS};
use scene_tracker::error::TrackerResult;
use scene_tracker::observability::health::DEFAULT_PROBE_ENDPOINT;
use scene_tracker::observability::{
    init_logging, parse_level, run_healthcheck, HealthServer, LogFormat,
};
use scene_tracker::routing::MessageRouter;
use scene_tracker::transport::mqtt::connection::DEFAULT_DRAIN_TIMEOUT;
use scene_tracker::transport::{MqttTransport, Transport};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Default healthcheck port when neither flag nor config provides one
const DEFAULT_HEALTHCHECK_PORT: u16 = 8080;

/// Camera-to-scene MQTT tracker service
#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Validates camera detections and republishes scene data over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "TRACKER_CONFIG",
        default_value = "config/tracker.toml",
        global = true
    )]
    config: PathBuf,

    /// Log level (trace|debug|info|warn|error)
    #[arg(short, long, env = "LOG_LEVEL", value_parser = LOG_LEVELS, global = true)]
    log_level: Option<String>,

    /// Healthcheck server port
    #[arg(
        long,
        env = "HEALTHCHECK_PORT",
        value_parser = clap::value_parser!(u16).range(1024..),
        global = true
    )]
    healthcheck_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracker service (default)
    Run,
    /// Query the service health endpoint and exit 0 when it answers 200
    Healthcheck {
        /// Health endpoint to query
        #[arg(long, default_value = DEFAULT_PROBE_ENDPOINT)]
        endpoint: String,

        /// Port of the healthcheck server
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(Commands::Healthcheck { endpoint, port }) = &cli.command {
        let port = port
            .or(cli.healthcheck_port)
            .unwrap_or(DEFAULT_HEALTHCHECK_PORT);
        let healthy = run_healthcheck(endpoint, port).await;
        process::exit(if healthy { 0 } else { 1 });
    }

    // Load configuration
    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            init_logging(
                parse_level(cli.log_level.as_deref().unwrap_or("info")),
                LogFormat::Json,
            );
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Initialize observability system
    init_logging(
        parse_level(&config.logging.level),
        LogFormat::parse(&config.logging.format),
    );

    // Execute command
    let result = match cli.command {
        Some(Commands::Config { show }) => handle_config_command(&config, show),
        Some(Commands::Run) | None => run_service(config).await,
        Some(Commands::Healthcheck { .. }) => Ok(()),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

/// Load the file, then let CLI flags override level and healthcheck port
fn load_configuration(cli: &Cli) -> TrackerResult<ServiceConfig> {
    let mut config = ServiceConfig::load_from_file(&cli.config)?;

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(port) = cli.healthcheck_port {
        config.tracker.healthcheck.port = port;
    }
    config.validate()?;

    Ok(config)
}

async fn run_service(config: ServiceConfig) -> TrackerResult<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.mqtt.host,
        port = config.mqtt.port,
        "Starting scene tracker"
    );

    let transport = Arc::new(MqttTransport::new(&config.mqtt)?);

    let probe = Arc::clone(&transport);
    let health_server = HealthServer::new(
        config.tracker.healthcheck.port,
        Arc::new(move || probe.is_connected() && probe.is_subscribed()),
    );
    health_server.start()?;

    let router = MessageRouter::new(
        transport.clone(),
        config.tracker.schema_validation,
        &config.tracker.schema_dir,
    );
    router.start();

    {
        let _span =
            scene_tracker::mqtt_span!(operation = "connect", client_id = %transport.client_id())
                .entered();
        transport.connect();
    }

    // Set up signal handling for graceful shutdown
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Tracker is running and waiting for camera data on MQTT...");

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    // Stop intake first, then drain the session, then the probes
    router.stop();
    transport.disconnect(DEFAULT_DRAIN_TIMEOUT).await;
    health_server.stop().await;

    let stats = transport.stats();
    info!(
        connection_attempts = stats.connection_attempts,
        connection_losses = stats.connection_losses,
        publishes_dropped = stats.publishes_dropped,
        "Transport closed"
    );

    Ok(())
}

fn handle_config_command(config: &ServiceConfig, show: bool) -> TrackerResult<()> {
    if show {
        match toml::to_string_pretty(config) {
            Ok(rendered) => {
                println!("Effective configuration:");
                println!("{rendered}");
            }
            Err(e) => error!("Failed to render configuration: {}", e),
        }
    }

    info!("Configuration validation complete");
    Ok(())
}

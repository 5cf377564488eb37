//! # GROWTH Controller Binary
//!
//! Command dispatch server of a GROWTH detector.
//!
//! # Usage
//!
//! ```bash
//! # Run with the configuration found in the default search order
//! growth_controller
//!
//! # Explicit configuration and port
//! growth_controller --config /etc/growth/growth_config.toml --port 10000
//!
//! # Verbose JSON logging
//! growth_controller -v --json
//! ```

use clap::Parser;
use growth_common::config::GrowthConfig;
use growth_common::consts::{DAQ_SERVER_PORT, DETECTOR_CONTROLLER_PORT, DISPLAY_SERVER_PORT};
use growth_controller::drivers::{list_drivers, open_board};
use growth_controller::modules::PeerEndpoints;
use growth_controller::server::ControllerServer;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// GROWTH detector controller - command dispatch server
#[derive(Parser, Debug)]
#[command(name = "growth_controller")]
#[command(version)]
#[command(about = "Command dispatch server for a GROWTH gamma-ray detector")]
#[command(long_about = None)]
struct Args {
    /// Path to growth_config.toml. Defaults to the first of
    /// $GROWTH_CONFIG_FILE, ~/growth_config.toml, /etc/growth/growth_config.toml.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Listen port
    #[arg(short, long, default_value_t = DETECTOR_CONTROLLER_PORT)]
    port: u16,

    /// Hardware backend
    #[arg(short, long, default_value = "simulation")]
    driver: String,

    /// DAQ program ZeroMQ endpoint
    #[arg(long, default_value_t = format!("tcp://127.0.0.1:{DAQ_SERVER_PORT}"))]
    daq_endpoint: String,

    /// Display server ZeroMQ endpoint
    #[arg(long, default_value_t = format!("tcp://127.0.0.1:{DISPLAY_SERVER_PORT}"))]
    display_endpoint: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("Controller startup failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Configuration first: it carries the default log level.
    let config = GrowthConfig::load_default(args.config.as_deref());
    let log_level = config
        .as_ref()
        .map(|c| c.shared().log_level.into())
        .unwrap_or(Level::INFO);
    setup_tracing(&args, log_level);

    info!("GROWTH controller v{} starting...", env!("CARGO_PKG_VERSION"));
    let config = Arc::new(config?);
    info!("detector_id: {}", config.detector_id());

    info!("Available drivers: {:?}", list_drivers());
    let board = open_board(&args.driver)?;
    info!("Using driver '{}'", args.driver);

    let peers = PeerEndpoints {
        daq: args.daq_endpoint.clone(),
        display: args.display_endpoint.clone(),
        ..PeerEndpoints::default()
    };
    let addr = format!("{}:{}", args.bind, args.port);
    let server = ControllerServer::from_board(&addr, config, board, &peers)?;

    let running = server.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    server.run()?;

    info!("GROWTH controller shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args, configured: Level) {
    let level = if args.verbose { Level::DEBUG } else { configured };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

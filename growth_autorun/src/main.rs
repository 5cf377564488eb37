//! # GROWTH Autorun Binary
//!
//! Starts, pauses and resumes the DAQ run by watching the slide switch and
//! the electronics temperature.
//!
//! # Usage
//!
//! ```bash
//! growth_autorun
//! growth_autorun --config ~/growth_config.toml --endpoint 127.0.0.1:10000 -v
//! ```

use clap::Parser;
use growth_autorun::port::RemoteDetector;
use growth_autorun::supervisor::AutorunSupervisor;
use growth_common::config::GrowthConfig;
use growth_common::consts::DETECTOR_CONTROLLER_PORT;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// GROWTH autorun supervisor
#[derive(Parser, Debug)]
#[command(name = "growth_autorun")]
#[command(version)]
#[command(about = "Automatic DAQ run control driven by housekeeping telemetry")]
#[command(long_about = None)]
struct Args {
    /// Path to growth_config.toml. Defaults to the first of
    /// $GROWTH_CONFIG_FILE, ~/growth_config.toml, /etc/growth/growth_config.toml.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Detector controller endpoint
    #[arg(short, long, default_value_t = format!("127.0.0.1:{DETECTOR_CONTROLLER_PORT}"))]
    endpoint: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("Autorun startup failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = GrowthConfig::load_default(args.config.as_deref());
    let log_level = config
        .as_ref()
        .map(|c| c.shared().log_level.into())
        .unwrap_or(Level::INFO);
    setup_tracing(&args, log_level);

    info!("GROWTH autorun v{} starting...", env!("CARGO_PKG_VERSION"));
    let config = Arc::new(config?);

    let port = RemoteDetector::new(args.endpoint.clone());
    let mut supervisor = AutorunSupervisor::new(port, Arc::clone(&config))?;
    info!(
        "Controller {} exposure {} s period {} s HK check {} s",
        args.endpoint,
        config.autorun().exposure_sec,
        config.autorun().period_sec,
        config.autorun().hk_check_period_sec
    );

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    supervisor.run(&running);

    info!("GROWTH autorun shutdown complete");
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

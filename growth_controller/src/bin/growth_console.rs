//! # GROWTH Console
//!
//! One-shot command client for the dispatch server.
//!
//! ```bash
//! growth_console hk.read
//! growth_console hv.set --option '{"ch": 0, "value_in_mV": 1000}'
//! growth_console controller.stop --endpoint 192.168.1.20:10000
//! ```
//!
//! The reply is printed as JSON on stdout. The exit status is 1 when the
//! reply status is `error` or the server cannot be reached.

use clap::Parser;
use growth_common::client::Requester;
use growth_common::consts::{CLIENT_TIMEOUT, DETECTOR_CONTROLLER_PORT};
use growth_common::protocol::{CommandRequest, Options, ReplyStatus};
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Send one command to a GROWTH controller
#[derive(Parser, Debug)]
#[command(name = "growth_console")]
#[command(version)]
#[command(about = "Send one command to a GROWTH detector controller")]
struct Args {
    /// Command in `<target>.<verb>` form (e.g. `hv.status`)
    command: String,

    /// Options as a JSON object
    #[arg(short, long, value_name = "JSON")]
    option: Option<String>,

    /// Controller endpoint
    #[arg(short, long, default_value_t = format!("127.0.0.1:{DETECTOR_CONTROLLER_PORT}"))]
    endpoint: String,

    /// Send/receive timeout in milliseconds
    #[arg(long, default_value_t = CLIENT_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether the reply status was `ok`.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut request = CommandRequest::bare(&args.command);
    if let Some(json) = &args.option {
        let options: Options = serde_json::from_str(json)
            .map_err(|e| format!("--option must be a JSON object ({e})"))?;
        request = request.with_options(options);
    }

    let mut requester = Requester::new(args.endpoint.clone())
        .with_timeout(Duration::from_millis(args.timeout_ms));
    let frame = requester.request(&request)?;

    println!("{}", serde_json::to_string_pretty(&frame)?);
    Ok(frame.status == ReplyStatus::Ok)
}

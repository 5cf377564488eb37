//! Subsystem modules served by the dispatch server.
//!
//! - [`detector`] - `det`: detector id, IP address, software hash, ping
//! - [`hv`] - `hv`: HV DAC level and output per channel
//! - [`display`] - `disp`: proxy to the display server
//! - [`hk`] - `hk`: housekeeping snapshot
//! - [`daq`] - `daq`: proxy to the DAQ program
//! - [`heartbeat`] - `heartbeat`: heartbeat task control

pub mod daq;
pub mod detector;
pub mod display;
pub mod heartbeat;
pub mod hk;
pub mod hv;

pub use daq::DaqModule;
pub use detector::DetModule;
pub use display::DisplayModule;
pub use heartbeat::HeartbeatModule;
pub use hk::HkModule;
pub use hv::HvModule;

use crate::error::RegistryError;
use crate::heartbeat::HeartbeatControls;
use crate::registry::ModuleRegistry;
use crate::peer::PeerRequester;
use growth_common::config::GrowthConfig;
use growth_common::consts::{CLIENT_TIMEOUT, DAQ_SERVER_PORT, DISPLAY_SERVER_PORT};
use growth_common::hw::{HkSensors, HvDriver};
use std::sync::Arc;
use std::time::Duration;

/// ZeroMQ endpoints of the peer programs proxied by `daq` and `disp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoints {
    pub daq: String,
    pub display: String,
    /// Send/receive timeout toward either program.
    pub timeout: Duration,
}

impl PeerEndpoints {
    fn requester(&self, context: &zmq::Context, endpoint: &str) -> PeerRequester {
        PeerRequester::new(context, endpoint).with_timeout(self.timeout)
    }
}

impl Default for PeerEndpoints {
    fn default() -> Self {
        Self {
            daq: format!("tcp://127.0.0.1:{DAQ_SERVER_PORT}"),
            display: format!("tcp://127.0.0.1:{DISPLAY_SERVER_PORT}"),
            timeout: CLIENT_TIMEOUT,
        }
    }
}

/// Build the registry in its fixed order: det, hv, disp, hk, daq, heartbeat.
pub fn build_registry(
    config: Arc<GrowthConfig>,
    hv: Box<dyn HvDriver>,
    hk: Box<dyn HkSensors>,
    heartbeat: HeartbeatControls,
    peers: &PeerEndpoints,
) -> Result<ModuleRegistry, RegistryError> {
    let context = zmq::Context::new();
    let mut registry = ModuleRegistry::new();
    registry.register("det", Box::new(DetModule::new(Arc::clone(&config))))?;
    registry.register("hv", Box::new(HvModule::new(hv, config)))?;
    registry.register(
        "disp",
        Box::new(DisplayModule::new(peers.requester(&context, &peers.display))),
    )?;
    registry.register("hk", Box::new(HkModule::new(hk)))?;
    registry.register(
        "daq",
        Box::new(DaqModule::new(peers.requester(&context, &peers.daq))),
    )?;
    registry.register("heartbeat", Box::new(HeartbeatModule::new(heartbeat)))?;
    Ok(registry)
}

//! # GROWTH Controller Library
//!
//! Command dispatch server of a GROWTH detector. Clients send
//! `<target>.<verb>` commands; the server routes each one to the subsystem
//! module registered under `<target>` and replies with a JSON object.
//!
//! # Module Structure
//!
//! - [`server`] - Listen socket, connection threads and the dispatch loop
//! - [`dispatch`] - Command parsing, routing and reply stamping
//! - [`registry`] - Name to module table with capability lookups
//! - [`modules`] - `det`, `hv`, `disp`, `hk`, `daq` and `heartbeat`
//! - [`peer`] - ZeroMQ REQ client toward the DAQ program and display server
//! - [`heartbeat`] - Periodic watchdog counter task
//! - [`drivers`] - Hardware backends (simulation)
//! - [`error`] - Startup and registration errors
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      growth_controller                        │
//! │  ┌──────────────┐   ┌─────────────┐   ┌────────────────────┐  │
//! │  │ ControllerSrv│──►│ Dispatcher  │──►│  ModuleRegistry    │  │
//! │  │ (TCP, FIFO)  │   │             │   │  det hv disp hk    │  │
//! │  └──────────────┘   └─────────────┘   │  daq heartbeat     │  │
//! │                                       └─────────┬──────────┘  │
//! │  ┌──────────────┐                               │             │
//! │  │  Heartbeat   │◄── HeartbeatControls ─────────┤             │
//! │  └──────┬───────┘                               ▼             │
//! │         └──────────────►  BoardDrivers (HvDriver, HkSensors,  │
//! │                                         HeartbeatSink)        │
//! │                     daq, disp ──► PeerRequester (ZeroMQ REQ)  │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod dispatch;
pub mod drivers;
pub mod error;
pub mod heartbeat;
pub mod modules;
pub mod peer;
pub mod registry;
pub mod server;

pub use crate::dispatch::Dispatcher;
pub use crate::drivers::{BoardDrivers, list_drivers, open_board};
pub use crate::error::{ControllerError, PeerError, RegistryError};
pub use crate::heartbeat::{Heartbeat, HeartbeatControls, HeartbeatError};
pub use crate::modules::{PeerEndpoints, build_registry};
pub use crate::peer::PeerRequester;
pub use crate::registry::ModuleRegistry;
pub use crate::server::ControllerServer;

//! # GROWTH Autorun Library
//!
//! Unattended run supervisor. Watches housekeeping telemetry and drives the
//! HV and DAQ modules of the detector controller so that data is taken only
//! while the slide switch is on and the electronics temperature is within
//! limits.
//!
//! # Module Structure
//!
//! - [`permission`] - HK snapshot to run permission
//! - [`port`] - `CommandPort` trait and the TCP-backed `RemoteDetector`
//! - [`supervisor`] - `AutorunSupervisor` state machine and loop
//! - [`error`] - Startup errors

pub mod error;
pub mod permission;
pub mod port;
pub mod supervisor;

pub use crate::error::AutorunError;
pub use crate::permission::evaluate_permission;
pub use crate::port::{CommandPort, RemoteDetector};
pub use crate::supervisor::{AutorunState, AutorunSupervisor, TickAction};

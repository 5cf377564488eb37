//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use growth_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use growth_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{AutorunSettings, ConfigError, ConfigLoader, GrowthConfig, TemperatureLimits, TemperatureSource};

// ─── Protocol ───────────────────────────────────────────────────────
pub use crate::protocol::{Command, CommandRequest, Options, ProtocolError, Reply, ReplyFrame, Target};

// ─── Modules & clients ──────────────────────────────────────────────
pub use crate::client::{RemoteModule, Requester};
pub use crate::module::{DetectorModule, Subsystem, Verb};

// ─── Hardware & telemetry ───────────────────────────────────────────
pub use crate::hw::{HeartbeatSink, HkSensors, HvDriver, HwError};
pub use crate::telemetry::{DaqRunState, DaqStatus, HkSnapshot, HvChannelStatus, Measurement, OnOff};

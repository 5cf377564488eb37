//! GROWTH Common Library
//!
//! This crate provides the wire protocol, configuration loading, module
//! capability contract and remote client shared by every process that runs
//! on a GROWTH detector (the command dispatch server, the autorun supervisor
//! and the console).
//!
//! # Module Structure
//!
//! - [`consts`] - Ports, timeouts, HV ranges and autorun defaults
//! - [`config`] - TOML configuration loading and validated limits
//! - [`protocol`] - Commands, replies and length-prefixed JSON framing
//! - [`module`] - Capability contract implemented by every subsystem module
//! - [`client`] - Request/reply client with lazy reconnect
//! - [`hw`] - Hardware collaborator traits (HV DAC/GPIO, HK sensors, heartbeat)
//! - [`telemetry`] - Typed snapshots decoded from replies
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! growth_common = { workspace = true }
//! ```
//!
//! ```rust
//! use growth_common::prelude::*;
//! ```

pub mod client;
pub mod config;
pub mod consts;
pub mod hw;
pub mod module;
pub mod prelude;
pub mod protocol;
pub mod telemetry;

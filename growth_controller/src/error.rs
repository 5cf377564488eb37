//! Error types of the dispatch server process.

use growth_common::config::ConfigError;
use growth_common::hw::HwError;
use std::io;
use thiserror::Error;

/// Registration faults. Raised only during server startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A module with the same name is already registered.
    #[error("Module '{0}' is already registered")]
    Duplicate(String),

    /// The reserved controller name cannot be used by a module.
    #[error("Module name '{0}' is reserved")]
    Reserved(String),
}

/// Fatal startup faults of the dispatch server.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Listen endpoint could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Module registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// No hardware backend with the requested name.
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Hardware backend failed to initialize.
    #[error("Driver initialization failed: {0}")]
    Driver(#[from] HwError),

    /// Worker thread could not be spawned.
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Faults talking to a peer program (DAQ program, display server).
#[derive(Debug, Error)]
pub enum PeerError {
    /// REQ socket could not be created or connected.
    #[error("could not connect to {endpoint} ({source})")]
    Connect {
        endpoint: String,
        #[source]
        source: zmq::Error,
    },

    #[error("ZeroMQ send failed ({0})")]
    Send(#[source] zmq::Error),

    /// Includes the receive timeout (`EAGAIN`).
    #[error("ZeroMQ receive failed ({0})")]
    Receive(#[source] zmq::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

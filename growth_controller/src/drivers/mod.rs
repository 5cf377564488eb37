//! Hardware backends.
//!
//! This module contains all board backends:
//!
//! - [`simulation`] - Software board model for development and testing
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `HvDriver`, `HkSensors` and `HeartbeatSink` from
//!    `growth_common::hw`
//! 3. Add a factory entry to `BOARD_FACTORIES`

pub mod simulation;

use crate::error::ControllerError;
use growth_common::hw::{HeartbeatSink, HkSensors, HvDriver};

/// Hardware handles injected into the modules.
pub struct BoardDrivers {
    /// HV DAC and output enable.
    pub hv: Box<dyn HvDriver>,
    /// Housekeeping sensors.
    pub hk: Box<dyn HkSensors>,
    /// Heartbeat GPIO lines.
    pub heartbeat: Box<dyn HeartbeatSink>,
}

impl BoardDrivers {
    /// Split one board implementing every hardware trait into its handles.
    pub fn from_board<B>(board: B) -> Self
    where
        B: HvDriver + HkSensors + HeartbeatSink + Clone,
    {
        Self {
            hv: Box::new(board.clone()),
            hk: Box::new(board.clone()),
            heartbeat: Box::new(board),
        }
    }
}

/// Factory function type for board backends.
pub type BoardFactory = fn() -> BoardDrivers;

/// Built-in backends by name.
const BOARD_FACTORIES: &[(&str, BoardFactory)] = &[("simulation", simulation::create_board)];

/// Names of all built-in backends.
pub fn list_drivers() -> Vec<&'static str> {
    BOARD_FACTORIES.iter().map(|(name, _)| *name).collect()
}

/// Open a backend by name.
///
/// # Errors
/// Returns `ControllerError::DriverNotFound` for unknown names.
pub fn open_board(name: &str) -> Result<BoardDrivers, ControllerError> {
    BOARD_FACTORIES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, factory)| factory())
        .ok_or_else(|| ControllerError::DriverNotFound(name.to_string()))
}

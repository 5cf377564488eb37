//! Simulation driver module.
//!
//! This module provides a software board model for development and testing
//! without physical hardware.

mod board;

pub use board::{BoardState, SimulatedBoard};

use super::BoardDrivers;

/// Factory function to create a simulated board.
pub fn create_board() -> BoardDrivers {
    BoardDrivers::from_board(SimulatedBoard::new())
}

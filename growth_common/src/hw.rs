//! Hardware collaborator traits and error types.
//!
//! This module defines:
//! - `HvDriver` trait - HV DAC level and output enable per channel
//! - `HkSensors` trait - Slow ADC, BME280 and slide switch readout
//! - `HeartbeatSink` trait - Liveness signal to the external watchdog
//! - `HwError` enum - Error types for hardware access
//!
//! Register-level access (SPI/I2C/GPIO bit manipulation, temperature
//! conversion polynomials) lives behind these traits. The controller only
//! consumes them.

use crate::telemetry::{Bme280Reading, Measurement};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error types for hardware access.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HwError {
    /// Bus or device communication failed (SPI/I2C/GPIO)
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Device not present or not opened
    #[error("Device not available: {0}")]
    NotAvailable(String),

    /// Channel index outside the device range
    #[error("Invalid channel: {0}")]
    InvalidChannel(u8),
}

/// HV power supply control (slow DAC + GPIO enable lines).
///
/// # Lifecycle
///
/// The controller forces every channel off at startup by driving the DAC
/// to 0 mV and disabling the output.
pub trait HvDriver: Send {
    /// Set the DAC output that programs the HV level.
    fn set_dac_mv(&mut self, channel: u8, value_mv: f64) -> Result<(), HwError>;

    /// Enable or disable the HV output.
    fn set_output(&mut self, channel: u8, on: bool) -> Result<(), HwError>;
}

/// Housekeeping sensors.
pub trait HkSensors: Send {
    /// Read all slow ADC channels, keyed by channel index.
    fn read_slow_adc(&mut self) -> Result<BTreeMap<u8, Measurement>, HwError>;

    /// Read the BME280 environmental sensor.
    ///
    /// Implementations reopen the device on the next call after a failure.
    fn read_bme280(&mut self) -> Result<Bme280Reading, HwError>;

    /// True when the operator slide switch is in the "on" position.
    fn slide_switch_on(&mut self) -> Result<bool, HwError>;
}

/// Output of the heartbeat counter (two GPIO lines watched by the
/// external watchdog).
pub trait HeartbeatSink: Send + 'static {
    /// Present a new 2-bit value.
    fn set_heartbeat(&mut self, value: u8) -> Result<(), HwError>;
}

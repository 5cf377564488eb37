//! Typed telemetry snapshots.
//!
//! These types describe the payload of `hk.read`, `daq.status` and
//! `hv.status` replies. Producers serialize them into a [`Reply`]; consumers
//! decode them back with [`Reply::decode`].
//!
//! [`Reply`]: crate::protocol::Reply
//! [`Reply::decode`]: crate::protocol::Reply::decode

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One slow ADC channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Raw ADC count.
    pub raw: u32,
    /// Input voltage in V.
    pub voltage: f64,
    /// Value converted to physical units.
    pub converted_value: f64,
    /// Units of `converted_value`.
    pub units: String,
}

/// Value with units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub units: String,
}

impl Quantity {
    pub fn new(value: f64, units: &str) -> Self {
        Self {
            value,
            units: units.to_string(),
        }
    }
}

/// BME280 environmental reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bme280Reading {
    pub temperature: Quantity,
    pub pressure: Quantity,
    pub humidity: Quantity,
}

/// Slide switch position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchPosition {
    On,
    Off,
}

/// `hk` object of an HK reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HkReadout {
    /// Slow ADC channels keyed by decimal channel index ("0", "1", ...).
    #[serde(default)]
    pub slow_adc: BTreeMap<String, Measurement>,
    /// Omitted when the BME280 could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bme280: Option<Bme280Reading>,
    pub slide_switch: SwitchPosition,
}

impl HkReadout {
    /// Converted value of a slow ADC channel.
    pub fn slow_adc_value(&self, channel: u8) -> Option<f64> {
        self.slow_adc
            .get(&channel.to_string())
            .map(|m| m.converted_value)
    }
}

/// Payload of an `hk.read` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HkSnapshot {
    pub unixtime: i64,
    #[serde(default)]
    pub time: String,
    pub hk: HkReadout,
}

/// Run state reported by the DAQ program.
///
/// Anything other than `Paused` means events are being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaqRunState {
    Running,
    Paused,
    #[serde(other)]
    Other,
}

impl DaqRunState {
    pub fn is_paused(self) -> bool {
        self == DaqRunState::Paused
    }
}

/// Payload of a `daq.status` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaqStatus {
    pub daq_status: DaqRunState,
    #[serde(default)]
    pub output_file_name: String,
    /// Seconds since the current output file was opened. Negative when unknown.
    #[serde(default = "unknown_elapsed")]
    pub elapsed_time_of_current_output_file: f64,
    #[serde(default, rename = "nEvents")]
    pub n_events: u64,
    #[serde(default)]
    pub unix_time: i64,
}

fn unknown_elapsed() -> f64 {
    -1.0
}

/// HV channel output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnOff {
    On,
    #[default]
    Off,
}

/// One channel entry of an `hv.status` reply (`"0": {...}`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HvChannelStatus {
    pub status: OnOff,
    #[serde(rename = "value_in_mV")]
    pub value_in_mv: f64,
}

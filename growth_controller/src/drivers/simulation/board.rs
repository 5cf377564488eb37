//! Simulated detector board.
//!
//! The `SimulatedBoard` models the parts of the readout board the controller
//! talks to:
//! - HV DAC levels and output enable lines for both channels
//! - an 8-channel slow ADC (two LM60 temperature sensors, three supply rail
//!   current monitors, three spare inputs)
//! - a BME280 environmental sensor that can be disconnected or made to fail
//! - the operator slide switch
//! - the two heartbeat GPIO lines
//!
//! Clones share one state, so tests keep a handle to inspect what the
//! controller drove and to inject faults.

use growth_common::consts::{HV_CHANNELS, HV_DAC_MV_MAX, HV_DAC_MV_MIN};
use growth_common::hw::{HeartbeatSink, HkSensors, HvDriver, HwError};
use growth_common::telemetry::{Bme280Reading, Measurement, Quantity};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// MCP3208 full scale.
const ADC_RESOLUTION: f64 = 4095.0;
/// MCP3208 reference voltage.
const ADC_VREF: f64 = 3.3;
/// LM60 output at 0 degC.
const LM60_OFFSET_V: f64 = 0.424;
/// LM60 slope.
const LM60_V_PER_DEGC: f64 = 0.00625;
/// Number of slow ADC channels.
const SLOW_ADC_CHANNELS: u8 = 8;

/// Observable state of the simulated board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardState {
    /// DAC output per HV channel (mV).
    pub dac_mv: [f64; 2],
    /// HV output enable per channel.
    pub hv_output: [bool; 2],
    /// Last heartbeat value on the GPIO lines.
    pub heartbeat: u8,
    /// Number of heartbeat writes.
    pub heartbeat_writes: u64,
    /// PCB temperatures seen by slow ADC channels 0 and 1.
    pub pcb_temperature_degc: [f64; 2],
    /// Supply rail currents on slow ADC channels 2..=4 (mA).
    pub rail_current_ma: [f64; 3],
    /// BME280 reading; `None` when the sensor is not connected.
    pub bme280: Option<Bme280Reading>,
    /// Number of upcoming BME280 reads that fail.
    pub bme280_failures: usize,
    /// Number of BME280 read attempts so far.
    pub bme280_reads: usize,
    /// Slide switch position; `None` makes the GPIO read fail.
    pub slide_switch: Option<bool>,
    /// Makes every slow ADC read fail.
    pub slow_adc_fault: bool,
    /// Makes every DAC write fail.
    pub spi_fault: bool,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            dac_mv: [0.0; 2],
            hv_output: [false; 2],
            heartbeat: 0,
            heartbeat_writes: 0,
            pcb_temperature_degc: [25.0, 27.5],
            rail_current_ma: [180.0, 95.0, 210.0],
            bme280: Some(Bme280Reading {
                temperature: Quantity::new(22.5, "degC"),
                pressure: Quantity::new(1013.2, "mb"),
                humidity: Quantity::new(45.0, "%"),
            }),
            bme280_failures: 0,
            bme280_reads: 0,
            slide_switch: Some(true),
            slow_adc_fault: false,
            spi_fault: false,
        }
    }
}

/// Software model of the detector board.
#[derive(Clone, Default)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    /// Board with nominal sensor readings and all HV channels off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current board state.
    pub fn snapshot(&self) -> BoardState {
        self.state.lock().clone()
    }

    /// Set the PCB temperature seen by slow ADC channel `channel` (0 or 1).
    pub fn set_pcb_temperature(&self, channel: usize, degc: f64) {
        if let Some(t) = self.state.lock().pcb_temperature_degc.get_mut(channel) {
            *t = degc;
        }
    }

    /// Set the slide switch; `None` makes the GPIO read fail.
    pub fn set_slide_switch(&self, on: Option<bool>) {
        self.state.lock().slide_switch = on;
    }

    /// Connect (`Some`) or disconnect (`None`) the BME280.
    pub fn set_bme280(&self, reading: Option<Bme280Reading>) {
        self.state.lock().bme280 = reading;
    }

    /// Make the next `count` BME280 reads fail.
    pub fn fail_bme280_reads(&self, count: usize) {
        self.state.lock().bme280_failures = count;
    }

    /// Make slow ADC reads fail.
    pub fn set_slow_adc_fault(&self, fault: bool) {
        self.state.lock().slow_adc_fault = fault;
    }

    /// Make DAC writes fail.
    pub fn set_spi_fault(&self, fault: bool) {
        self.state.lock().spi_fault = fault;
    }
}

fn hv_index(channel: u8) -> Result<usize, HwError> {
    if HV_CHANNELS.contains(&channel) {
        Ok(channel as usize)
    } else {
        Err(HwError::InvalidChannel(channel))
    }
}

fn adc_measurement(voltage: f64, converted_value: f64, units: &str) -> Measurement {
    let voltage = voltage.clamp(0.0, ADC_VREF);
    let raw = (voltage / ADC_VREF * ADC_RESOLUTION).round() as u32;
    Measurement {
        raw,
        voltage,
        converted_value,
        units: units.to_string(),
    }
}

impl HvDriver for SimulatedBoard {
    fn set_dac_mv(&mut self, channel: u8, value_mv: f64) -> Result<(), HwError> {
        let index = hv_index(channel)?;
        let mut state = self.state.lock();
        if state.spi_fault {
            return Err(HwError::CommunicationError("SPI transfer failed".to_string()));
        }
        state.dac_mv[index] = value_mv.clamp(HV_DAC_MV_MIN, HV_DAC_MV_MAX);
        debug!("HV DAC ch{} = {} mV", channel, state.dac_mv[index]);
        Ok(())
    }

    fn set_output(&mut self, channel: u8, on: bool) -> Result<(), HwError> {
        let index = hv_index(channel)?;
        self.state.lock().hv_output[index] = on;
        debug!("HV output ch{} = {}", channel, if on { "on" } else { "off" });
        Ok(())
    }
}

impl HkSensors for SimulatedBoard {
    fn read_slow_adc(&mut self) -> Result<BTreeMap<u8, Measurement>, HwError> {
        let state = self.state.lock();
        if state.slow_adc_fault {
            return Err(HwError::CommunicationError("MCP3208 not responding".to_string()));
        }

        let mut result = BTreeMap::new();
        for channel in 0..SLOW_ADC_CHANNELS {
            let measurement = match channel {
                0 | 1 => {
                    let t = state.pcb_temperature_degc[channel as usize];
                    adc_measurement(LM60_OFFSET_V + LM60_V_PER_DEGC * t, t, "degC")
                }
                2 | 4 => {
                    let current = state.rail_current_ma[channel as usize - 2];
                    adc_measurement(current / 1000.0, current, "mA")
                }
                3 => {
                    let current = state.rail_current_ma[1];
                    adc_measurement(current / 500.0, current, "mA")
                }
                _ => adc_measurement(0.0, 0.0, ""),
            };
            result.insert(channel, measurement);
        }
        trace!("Slow ADC read {} channels", result.len());
        Ok(result)
    }

    fn read_bme280(&mut self) -> Result<Bme280Reading, HwError> {
        let mut state = self.state.lock();
        state.bme280_reads += 1;
        if state.bme280_failures > 0 {
            state.bme280_failures -= 1;
            return Err(HwError::CommunicationError("BME280 I2C read failed".to_string()));
        }
        state
            .bme280
            .clone()
            .ok_or_else(|| HwError::NotAvailable("BME280".to_string()))
    }

    fn slide_switch_on(&mut self) -> Result<bool, HwError> {
        self.state
            .lock()
            .slide_switch
            .ok_or_else(|| HwError::CommunicationError("GPIO read failed".to_string()))
    }
}

impl HeartbeatSink for SimulatedBoard {
    fn set_heartbeat(&mut self, value: u8) -> Result<(), HwError> {
        let mut state = self.state.lock();
        state.heartbeat = value;
        state.heartbeat_writes += 1;
        Ok(())
    }
}

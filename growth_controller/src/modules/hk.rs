//! `hk` module: housekeeping snapshot.

use chrono::Local;
use growth_common::consts::BME280_READ_TRIALS;
use growth_common::hw::HkSensors;
use growth_common::module::{Subsystem, Verb};
use growth_common::protocol::{Options, Reply};
use growth_common::telemetry::{Bme280Reading, HkReadout, SwitchPosition};
use tracing::{debug, error, warn};

/// Format of the human-readable `time` field.
const HK_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Verbs served by the `hk` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HkVerb {
    Read,
}

impl Verb for HkVerb {
    const ALL: &'static [Self] = &[HkVerb::Read];

    fn as_str(self) -> &'static str {
        "read"
    }
}

pub struct HkModule {
    sensors: Box<dyn HkSensors>,
}

impl HkModule {
    pub fn new(sensors: Box<dyn HkSensors>) -> Self {
        Self { sensors }
    }

    fn read(&mut self) -> Reply {
        let slow_adc = match self.sensors.read_slow_adc() {
            Ok(adc) => adc,
            Err(e) => {
                error!("Slow ADC read failed ({})", e);
                return Reply::error(format!("SlowADC read failed ({e})"));
            }
        };

        let readout = HkReadout {
            slow_adc: slow_adc
                .into_iter()
                .map(|(ch, m)| (ch.to_string(), m))
                .collect(),
            bme280: self.read_bme280(),
            slide_switch: self.read_slide_switch(),
        };

        let now = Local::now();
        Reply::ok()
            .with("unixtime", now.timestamp())
            .with("time", now.format(HK_TIME_FORMAT).to_string())
            .with("hk", readout)
    }

    fn read_bme280(&mut self) -> Option<Bme280Reading> {
        for trial in 0..BME280_READ_TRIALS {
            match self.sensors.read_bme280() {
                Ok(reading) => {
                    debug!("BME280 read successful (trial {})", trial);
                    return Some(reading);
                }
                Err(e) => warn!("BME280 read error (trial {}) ({})", trial, e),
            }
        }
        warn!("Continue without BME280");
        None
    }

    fn read_slide_switch(&mut self) -> SwitchPosition {
        match self.sensors.slide_switch_on() {
            Ok(true) => SwitchPosition::On,
            Ok(false) => SwitchPosition::Off,
            Err(e) => {
                warn!("Slide switch read failed ({}); reporting off", e);
                SwitchPosition::Off
            }
        }
    }
}

impl Subsystem for HkModule {
    type Verb = HkVerb;

    fn handle(&mut self, verb: HkVerb, _options: &Options) -> Reply {
        match verb {
            HkVerb::Read => self.read(),
        }
    }
}

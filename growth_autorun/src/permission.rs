//! Autorun permission evaluation.
//!
//! Permission is granted only when the slide switch is on AND the
//! monitored temperature is within the configured limits. Every other
//! outcome (error reply, undecodable snapshot, missing sensor reading)
//! denies permission.

use growth_common::config::{TemperatureLimits, TemperatureSource};
use growth_common::protocol::Reply;
use growth_common::telemetry::{HkReadout, HkSnapshot, SwitchPosition};
use tracing::debug;

/// Evaluate an `hk.read` reply.
pub fn evaluate_permission(reply: &Reply, limits: &TemperatureLimits) -> bool {
    if !reply.is_ok() {
        debug!("HK not available: {}", reply.message().unwrap_or("no message"));
        return false;
    }
    match reply.decode::<HkSnapshot>() {
        Ok(snapshot) => readout_permits(&snapshot.hk, limits),
        Err(e) => {
            debug!("HK snapshot could not be decoded ({})", e);
            false
        }
    }
}

/// Evaluate a decoded HK readout.
pub fn readout_permits(hk: &HkReadout, limits: &TemperatureLimits) -> bool {
    let switch_on = hk.slide_switch == SwitchPosition::On;
    debug!("Slide switch = {:?}", hk.slide_switch);

    let temperature_valid = temperature_valid(hk, limits);
    switch_on && temperature_valid
}

fn temperature_valid(hk: &HkReadout, limits: &TemperatureLimits) -> bool {
    match limits.source {
        TemperatureSource::TemperaturePcb => {
            if limits.channels.is_empty() {
                return false;
            }
            limits.channels.iter().all(|&ch| match hk.slow_adc_value(ch) {
                Some(degc) => {
                    debug!("PCB temperature ch{} = {} degC", ch, degc);
                    limits.contains(degc)
                }
                None => {
                    debug!("SlowADC temperature ch{} missing", ch);
                    false
                }
            })
        }
        TemperatureSource::Bme280 => match &hk.bme280 {
            Some(reading) => {
                debug!("BME280 temperature = {} degC", reading.temperature.value);
                limits.contains(reading.temperature.value)
            }
            None => {
                debug!("BME280 reading missing");
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growth_common::telemetry::{Bme280Reading, Measurement, Quantity};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn limits(source: TemperatureSource) -> TemperatureLimits {
        TemperatureLimits {
            lower: 0.0,
            upper: 45.0,
            source,
            channels: vec![0, 1],
        }
    }

    fn measurement(degc: f64) -> Measurement {
        Measurement {
            raw: 0,
            voltage: 0.424 + 0.00625 * degc,
            converted_value: degc,
            units: "degC".to_string(),
        }
    }

    fn readout(switch: SwitchPosition, temps: &[(u8, f64)]) -> HkReadout {
        let slow_adc: BTreeMap<String, Measurement> = temps
            .iter()
            .map(|&(ch, t)| (ch.to_string(), measurement(t)))
            .collect();
        HkReadout {
            slow_adc,
            bme280: None,
            slide_switch: switch,
        }
    }

    #[test]
    fn switch_on_and_temperatures_inside() {
        let hk = readout(SwitchPosition::On, &[(0, 20.0), (1, 30.0)]);
        assert!(readout_permits(&hk, &limits(TemperatureSource::TemperaturePcb)));
    }

    #[test]
    fn limits_are_inclusive() {
        let hk = readout(SwitchPosition::On, &[(0, 0.0), (1, 45.0)]);
        assert!(readout_permits(&hk, &limits(TemperatureSource::TemperaturePcb)));
    }

    #[test]
    fn one_channel_outside_denies() {
        let hk = readout(SwitchPosition::On, &[(0, 20.0), (1, 45.5)]);
        assert!(!readout_permits(&hk, &limits(TemperatureSource::TemperaturePcb)));
    }

    #[test]
    fn missing_channel_denies() {
        let hk = readout(SwitchPosition::On, &[(0, 20.0)]);
        assert!(!readout_permits(&hk, &limits(TemperatureSource::TemperaturePcb)));
    }

    #[test]
    fn bme280_source() {
        let mut hk = readout(SwitchPosition::On, &[]);
        let limits = limits(TemperatureSource::Bme280);
        assert!(!readout_permits(&hk, &limits));

        hk.bme280 = Some(Bme280Reading {
            temperature: Quantity::new(21.5, "degC"),
            pressure: Quantity::new(1013.0, "hPa"),
            humidity: Quantity::new(40.0, "%"),
        });
        assert!(readout_permits(&hk, &limits));
    }

    #[test]
    fn error_reply_denies() {
        let reply = Reply::error("SlowADC read failed (SPI)");
        assert!(!evaluate_permission(&reply, &limits(TemperatureSource::TemperaturePcb)));
    }

    #[test]
    fn reply_is_decoded() {
        let hk = readout(SwitchPosition::On, &[(0, 20.0), (1, 30.0)]);
        let reply = Reply::ok()
            .with("unixtime", 1_500_000_000)
            .with("time", "2017-07-14T11-40-00")
            .with("hk", &hk);
        assert!(evaluate_permission(&reply, &limits(TemperatureSource::TemperaturePcb)));

        let garbage = Reply::ok().with("hk", json!({"slide_switch": 3}));
        assert!(!evaluate_permission(&garbage, &limits(TemperatureSource::TemperaturePcb)));
    }
}

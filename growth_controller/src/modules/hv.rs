//! `hv` module: HV power supply control.
//!
//! Each channel is programmed through the slow DAC (`hv.set`) and switched
//! through a GPIO enable line (`hv.on` / `hv.off`). All channels are forced
//! off when the module is constructed.
//!
//! When the configuration carries both HV limits and a DAC→HV conversion,
//! `hv.set` refuses any level whose converted voltage exceeds the channel
//! limit.

use growth_common::config::GrowthConfig;
use growth_common::consts::{HV_CHANNELS, HV_DAC_MV_MAX, HV_DAC_MV_MIN};
use growth_common::hw::HvDriver;
use growth_common::module::{Subsystem, Verb};
use growth_common::protocol::{OptionError, Options, Reply};
use growth_common::telemetry::{HvChannelStatus, OnOff};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Verbs served by the `hv` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvVerb {
    Status,
    Set,
    On,
    Off,
    OffAll,
}

impl Verb for HvVerb {
    const ALL: &'static [Self] = &[
        HvVerb::Status,
        HvVerb::Set,
        HvVerb::On,
        HvVerb::Off,
        HvVerb::OffAll,
    ];

    fn as_str(self) -> &'static str {
        match self {
            HvVerb::Status => "status",
            HvVerb::Set => "set",
            HvVerb::On => "on",
            HvVerb::Off => "off",
            HvVerb::OffAll => "off_all",
        }
    }
}

/// HV module state: one [`HvChannelStatus`] per channel.
pub struct HvModule {
    driver: Box<dyn HvDriver>,
    config: Arc<GrowthConfig>,
    channels: [HvChannelStatus; 2],
}

impl HvModule {
    /// Create the module and force every channel off.
    pub fn new(driver: Box<dyn HvDriver>, config: Arc<GrowthConfig>) -> Self {
        let off = HvChannelStatus {
            status: OnOff::Off,
            value_in_mv: 0.0,
        };
        let mut module = Self {
            driver,
            config,
            channels: [off; 2],
        };
        for ch in HV_CHANNELS {
            module.switch_off(ch);
        }
        module
    }

    /// Current state of a channel.
    pub fn channel(&self, ch: u8) -> Option<&HvChannelStatus> {
        self.channels.get(ch as usize)
    }

    fn status(&self) -> Reply {
        HV_CHANNELS
            .iter()
            .fold(Reply::ok(), |reply, &ch| {
                reply.with(&ch.to_string(), self.channels[ch as usize])
            })
    }

    fn set(&mut self, options: &Options) -> Reply {
        let ch = match parse_channel(options, "hv.set") {
            Ok(ch) => ch,
            Err(reply) => return reply,
        };
        let value_in_mv = match options.number("value_in_mV") {
            Ok(v) => v,
            Err(OptionError::Missing(_)) => {
                return Reply::error("hv.set command requires DAC output voltage in mV");
            }
            Err(e) => return Reply::error(format!("hv.set command received {e}")),
        };
        if !(HV_DAC_MV_MIN..=HV_DAC_MV_MAX).contains(&value_in_mv) {
            return Reply::error(format!(
                "hv.set command received invalid 'voltage in mV' of {value_in_mv}"
            ));
        }

        let mut value_in_hv_v = 0.0;
        if self.config.hv_limit_enforced() {
            let limit = self.config.hv_limit_v(ch);
            match self.config.to_hv_voltage(ch, value_in_mv) {
                Some(hv) if hv <= limit => value_in_hv_v = hv,
                _ => {
                    warn!("hv.set ch{} {} mV rejected by HV limit {} V", ch, value_in_mv, limit);
                    return Reply::error(format!(
                        "hv.set command failed exceeding the limit ({limit})"
                    ));
                }
            }
        }

        if let Err(e) = self.driver.set_dac_mv(ch, value_in_mv) {
            error!("HV DAC write failed on ch{}: {}", ch, e);
            return Reply::error(format!(
                "hv.set command failed to set DAC output voltage ({e})"
            ));
        }
        self.channels[ch as usize].value_in_mv = value_in_mv;
        info!("HV ch{} set to {} mV", ch, value_in_mv);

        Reply::ok()
            .with_message("hv.set executed")
            .with("ch", ch)
            .with("value_in_mV", value_in_mv)
            .with("value_in_HV_V", value_in_hv_v)
    }

    fn on(&mut self, options: &Options) -> Reply {
        let ch = match parse_channel(options, "hv.on") {
            Ok(ch) => ch,
            Err(reply) => return reply,
        };
        if let Err(e) = self.driver.set_output(ch, true) {
            error!("HV output enable failed on ch{}: {}", ch, e);
            return Reply::error(format!("hv.on command failed ({e})"));
        }
        let state = &mut self.channels[ch as usize];
        state.status = OnOff::On;
        info!("HV ch{} on ({} mV)", ch, state.value_in_mv);

        Reply::ok()
            .with_message("hv.on executed")
            .with("ch", ch)
            .with("value_in_mV", state.value_in_mv)
    }

    fn off(&mut self, options: &Options) -> Reply {
        let ch = match parse_channel(options, "hv.off") {
            Ok(ch) => ch,
            Err(reply) => return reply,
        };
        self.switch_off(ch);
        Reply::ok().with_message("hv.off executed").with("ch", ch)
    }

    fn off_all(&mut self) -> Reply {
        for ch in HV_CHANNELS {
            self.switch_off(ch);
        }
        Reply::ok().with_message("hv.off_all executed")
    }

    /// Drive the DAC to 0 mV, then disable the output. The recorded state is
    /// off/0 even if the hardware write fails.
    fn switch_off(&mut self, ch: u8) {
        if let Err(e) = self.driver.set_dac_mv(ch, 0.0) {
            error!("HV DAC reset failed on ch{}: {}", ch, e);
        }
        if let Err(e) = self.driver.set_output(ch, false) {
            error!("HV output disable failed on ch{}: {}", ch, e);
        }
        self.channels[ch as usize] = HvChannelStatus {
            status: OnOff::Off,
            value_in_mv: 0.0,
        };
        info!("HV ch{} off", ch);
    }
}

/// Parse and range-check the `ch` option.
fn parse_channel(options: &Options, command: &str) -> Result<u8, Reply> {
    let ch = match options.integer("ch") {
        Ok(ch) => ch,
        Err(OptionError::Missing(_)) => {
            return Err(Reply::error(format!("{command} command requires channel option")));
        }
        Err(e) => return Err(Reply::error(format!("{command} command received {e}"))),
    };
    u8::try_from(ch)
        .ok()
        .filter(|ch| HV_CHANNELS.contains(ch))
        .ok_or_else(|| Reply::error(format!("Invalid channel index {ch}")))
}

impl Subsystem for HvModule {
    type Verb = HvVerb;

    fn handle(&mut self, verb: HvVerb, options: &Options) -> Reply {
        match verb {
            HvVerb::Status => self.status(),
            HvVerb::Set => self.set(options),
            HvVerb::On => self.on(options),
            HvVerb::Off => self.off(options),
            HvVerb::OffAll => self.off_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulation::SimulatedBoard;
    use serde_json::json;

    const LIMITED: &str = r#"
detector_id = "growth-test"
[hv.conversion]
0 = [0.0, 0.3]
[limits.hv]
0 = 600.0
"#;

    fn module(config: &str) -> (HvModule, SimulatedBoard) {
        let board = SimulatedBoard::new();
        let config = Arc::new(GrowthConfig::from_toml_str(config).unwrap());
        (HvModule::new(Box::new(board.clone()), config), board)
    }

    fn plain() -> (HvModule, SimulatedBoard) {
        module("detector_id = \"growth-test\"\n[hv]\n")
    }

    fn opts(ch: i64) -> Options {
        Options::new().with("ch", ch)
    }

    #[test]
    fn construction_forces_all_off() {
        let board = SimulatedBoard::new();
        let mut driver = board.clone();
        driver.set_dac_mv(0, 1500.0).unwrap();
        driver.set_output(0, true).unwrap();

        let config = Arc::new(GrowthConfig::from_toml_str("detector_id = \"x\"\n[hv]\n").unwrap());
        let hv = HvModule::new(Box::new(board.clone()), config);
        assert_eq!(board.snapshot().dac_mv, [0.0, 0.0]);
        assert_eq!(board.snapshot().hv_output, [false, false]);
        assert_eq!(hv.channel(0).unwrap().status, OnOff::Off);
    }

    #[test]
    fn status_reports_both_channels() {
        let (mut hv, _) = plain();
        hv.handle(HvVerb::Set, &opts(1).with("value_in_mV", 1200));
        hv.handle(HvVerb::On, &opts(1));

        let reply = hv.handle(HvVerb::Status, &Options::new());
        assert_eq!(reply.field("0"), Some(&json!({"status":"off","value_in_mV":0.0})));
        assert_eq!(reply.field("1"), Some(&json!({"status":"on","value_in_mV":1200.0})));
    }

    #[test]
    fn set_then_on_drives_hardware() {
        let (mut hv, board) = plain();
        let reply = hv.handle(HvVerb::Set, &opts(0).with("value_in_mV", 1000));
        assert!(reply.is_ok());
        assert_eq!(reply.field("value_in_mV"), Some(&json!(1000.0)));

        let reply = hv.handle(HvVerb::On, &opts(0));
        assert_eq!(reply.message(), Some("hv.on executed"));
        assert_eq!(board.snapshot().dac_mv[0], 1000.0);
        assert!(board.snapshot().hv_output[0]);
    }

    #[test]
    fn on_without_set_keeps_zero_level() {
        let (mut hv, board) = plain();
        let reply = hv.handle(HvVerb::On, &opts(1));
        assert!(reply.is_ok());
        assert_eq!(reply.field("value_in_mV"), Some(&json!(0.0)));
        assert!(board.snapshot().hv_output[1]);
    }

    #[test]
    fn invalid_channel_rejected() {
        let (mut hv, _) = plain();
        for verb in [HvVerb::Set, HvVerb::On, HvVerb::Off] {
            let reply = hv.handle(verb, &opts(2).with("value_in_mV", 100));
            assert_eq!(reply.message(), Some("Invalid channel index 2"));
        }
        let reply = hv.handle(HvVerb::On, &Options::new());
        assert_eq!(reply.message(), Some("hv.on command requires channel option"));
    }

    #[test]
    fn out_of_range_level_leaves_state_unchanged() {
        let (mut hv, board) = plain();
        hv.handle(HvVerb::Set, &opts(0).with("value_in_mV", 800));
        for value in [-1.0, 3300.5, 10000.0] {
            let reply = hv.handle(HvVerb::Set, &opts(0).with("value_in_mV", value));
            assert!(!reply.is_ok());
        }
        assert_eq!(hv.channel(0).unwrap().value_in_mv, 800.0);
        assert_eq!(board.snapshot().dac_mv[0], 800.0);
    }

    #[test]
    fn missing_level_rejected() {
        let (mut hv, _) = plain();
        let reply = hv.handle(HvVerb::Set, &opts(0));
        assert_eq!(
            reply.message(),
            Some("hv.set command requires DAC output voltage in mV")
        );
    }

    #[test]
    fn hv_limit_enforced_with_conversion() {
        let (mut hv, _) = module(LIMITED);
        let reply = hv.handle(HvVerb::Set, &opts(0).with("value_in_mV", 2000));
        assert!(reply.is_ok());
        assert_eq!(reply.field("value_in_HV_V"), Some(&json!(600.0)));

        let reply = hv.handle(HvVerb::Set, &opts(0).with("value_in_mV", 2001));
        assert_eq!(
            reply.message(),
            Some("hv.set command failed exceeding the limit (600)")
        );
        assert_eq!(hv.channel(0).unwrap().value_in_mv, 2000.0);
    }

    #[test]
    fn channel_without_conversion_refused_when_limited() {
        let (mut hv, _) = module(LIMITED);
        let reply = hv.handle(HvVerb::Set, &opts(1).with("value_in_mV", 10));
        assert_eq!(
            reply.message(),
            Some("hv.set command failed exceeding the limit (700)")
        );
    }

    #[test]
    fn spi_fault_reported() {
        let (mut hv, board) = plain();
        board.set_spi_fault(true);
        let reply = hv.handle(HvVerb::Set, &opts(0).with("value_in_mV", 100));
        assert!(!reply.is_ok());
        assert_eq!(hv.channel(0).unwrap().value_in_mv, 0.0);
    }

    #[test]
    fn off_all_resets_every_channel() {
        let (mut hv, board) = plain();
        for ch in [0, 1] {
            hv.handle(HvVerb::Set, &opts(ch).with("value_in_mV", 1500));
            hv.handle(HvVerb::On, &opts(ch));
        }
        let reply = hv.handle(HvVerb::OffAll, &Options::new());
        assert_eq!(reply.message(), Some("hv.off_all executed"));

        let status = hv.handle(HvVerb::Status, &Options::new());
        for ch in ["0", "1"] {
            assert_eq!(status.field(ch), Some(&json!({"status":"off","value_in_mV":0.0})));
        }
        assert_eq!(board.snapshot().dac_mv, [0.0, 0.0]);
        assert_eq!(board.snapshot().hv_output, [false, false]);
    }
}

//! Autorun state machine.
//!
//! Every period the supervisor:
//!
//! 1. re-evaluates the permission from `hk.read`, at most once per HK check
//!    period (the last value is reused in between)
//! 2. reads `daq.status` and acts on the (run state, permission) pair:
//!
//! | DAQ     | permission | action                                          |
//! |---------|------------|-------------------------------------------------|
//! | error   | any        | none                                            |
//! | Paused  | true       | HV on, `daq.resume`                             |
//! | Paused  | false      | none                                            |
//! | Running | true       | HV on again if a channel is off; rotate file    |
//! | Running | false      | `daq.pause`, `hv.off_all`                       |
//!
//! A communication failure alone never changes HV or DAQ state.

use crate::error::AutorunError;
use crate::permission::evaluate_permission;
use crate::port::CommandPort;
use growth_common::config::{GrowthConfig, TemperatureLimits};
use growth_common::consts::HV_CHANNELS;
use growth_common::protocol::{Options, Reply};
use growth_common::telemetry::{DaqStatus, HvChannelStatus, OnOff};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Granularity of the sleep between ticks.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Supervisor state, derived from the DAQ run state and the permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutorunState {
    /// No DAQ status received yet.
    Uninitialized,
    /// DAQ paused and conditions not met.
    IdleConditionsNotMet,
    /// DAQ running with permission.
    RunActive,
    /// A run was paused by the supervisor and conditions are still not met.
    RunSuspended,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// `daq.status` failed; nothing was changed.
    DaqUnreachable,
    /// DAQ paused and no permission.
    StayPaused,
    /// HV switched on and DAQ resumed.
    Resumed,
    /// Run continues.
    Continued {
        hv_recovered: bool,
        file_switched: bool,
    },
    /// DAQ paused and HV switched off.
    Suspended,
}

pub struct AutorunSupervisor<P> {
    port: P,
    config: Arc<GrowthConfig>,
    limits: TemperatureLimits,
    permitted: bool,
    since_last_hk_check: Duration,
    state: AutorunState,
}

impl<P: CommandPort> AutorunSupervisor<P> {
    /// # Errors
    /// Returns `AutorunError::MissingTemperatureLimits` when the
    /// configuration has no temperature limits.
    pub fn new(port: P, config: Arc<GrowthConfig>) -> Result<Self, AutorunError> {
        let limits = config
            .temperature_limits()
            .cloned()
            .ok_or(AutorunError::MissingTemperatureLimits)?;
        Ok(Self {
            port,
            config,
            limits,
            permitted: false,
            // First tick always checks HK.
            since_last_hk_check: Duration::MAX,
            state: AutorunState::Uninitialized,
        })
    }

    pub fn state(&self) -> AutorunState {
        self.state
    }

    /// Last computed permission.
    pub fn permitted(&self) -> bool {
        self.permitted
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Run one iteration.
    pub fn tick(&mut self) -> TickAction {
        debug!("Autorun check...");
        self.check_hk();

        let reply = self.port.send("daq", "status", Options::new());
        let status = match decode_daq_status(&reply) {
            Some(status) => status,
            None => {
                warn!("DAQ program is not running. Wait until it is restarted.");
                return TickAction::DaqUnreachable;
            }
        };

        if status.daq_status.is_paused() {
            debug!("DAQ program is paused");
            if self.permitted {
                info!("Automatic run can be started (conditions are met)");
                self.hv_on();
                info!("Resuming DAQ run");
                self.send_logged("daq", "resume", Options::new());
                self.state = AutorunState::RunActive;
                TickAction::Resumed
            } else {
                debug!("Autorun conditions are not met");
                if self.state != AutorunState::RunSuspended {
                    self.state = AutorunState::IdleConditionsNotMet;
                }
                TickAction::StayPaused
            }
        } else if self.permitted {
            debug!("DAQ program is running");
            let hv_recovered = self.ensure_hv_on();
            let file_switched = self.rotate_output_if_due(&status);
            self.state = AutorunState::RunActive;
            TickAction::Continued {
                hv_recovered,
                file_switched,
            }
        } else {
            warn!("Limit check not satisfied. Pausing the current DAQ run and turning HV off.");
            self.send_logged("daq", "pause", Options::new());
            self.send_logged("hv", "off_all", Options::new());
            self.state = AutorunState::RunSuspended;
            TickAction::Suspended
        }
    }

    /// Tick every period until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) {
        let period = self.config.autorun().period();
        info!("Autorun started (period {:?})", period);
        while running.load(Ordering::SeqCst) {
            let action = self.tick();
            debug!("Autorun tick: {:?} -> {:?}", action, self.state);
            sleep_while(running, period);
        }
        info!("Autorun stopped");
    }

    fn check_hk(&mut self) {
        self.since_last_hk_check = self
            .since_last_hk_check
            .saturating_add(self.config.autorun().period());
        if self.since_last_hk_check < self.config.autorun().hk_check_period() {
            return;
        }
        self.since_last_hk_check = Duration::ZERO;

        let reply = self.port.send("hk", "read", Options::new());
        self.permitted = evaluate_permission(&reply, &self.limits);
        debug!("Automatic DAQ start = {}", self.permitted);
    }

    /// Program the default DAC level and switch on every channel that has a
    /// positive default.
    fn hv_on(&mut self) {
        info!("Turning on HV");
        for ch in HV_CHANNELS {
            let dac_mv = match self.config.hv_default_mv(ch) {
                Some(mv) if mv > 0.0 => mv,
                _ => continue,
            };
            self.send_logged(
                "hv",
                "set",
                Options::new().with("ch", ch).with("value_in_mV", dac_mv),
            );
            self.send_logged("hv", "on", Options::new().with("ch", ch));
        }
    }

    /// Re-run the HV-on sequence if `hv.status` shows a channel off.
    fn ensure_hv_on(&mut self) -> bool {
        let reply = self.port.send("hv", "status", Options::new());
        if !reply.is_ok() {
            warn!("hv.status failed: {}", reply.message().unwrap_or("no message"));
            return false;
        }
        let all_on = HV_CHANNELS.iter().all(|ch| {
            reply
                .field(&ch.to_string())
                .and_then(|v| serde_json::from_value::<HvChannelStatus>(v.clone()).ok())
                .is_some_and(|status| status.status == OnOff::On)
        });
        if all_on {
            return false;
        }
        info!("HV is turned off for some reason. Turning on again...");
        self.hv_on();
        true
    }

    fn rotate_output_if_due(&mut self, status: &DaqStatus) -> bool {
        let elapsed = status.elapsed_time_of_current_output_file;
        debug!(
            "Current file = {} Elapsed time = {}",
            status.output_file_name, elapsed
        );
        let exposure = self.config.autorun().exposure_sec as f64;
        if elapsed >= exposure || elapsed < 0.0 {
            info!("Switching output file (closing {})", status.output_file_name);
            self.send_logged("daq", "switch_output", Options::new());
            true
        } else {
            false
        }
    }

    fn send_logged(&mut self, target: &str, verb: &str, options: Options) -> Reply {
        let reply = self.port.send(target, verb, options);
        if !reply.is_ok() {
            warn!(
                "{}.{} failed: {}",
                target,
                verb,
                reply.message().unwrap_or("no message")
            );
        }
        reply
    }
}

fn decode_daq_status(reply: &Reply) -> Option<DaqStatus> {
    if !reply.is_ok() {
        return None;
    }
    match reply.decode::<DaqStatus>() {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("daq.status reply could not be decoded ({})", e);
            None
        }
    }
}

/// Sleep for `total`, returning early once `running` is cleared.
fn sleep_while(running: &AtomicBool, total: Duration) {
    let mut remaining = total;
    while !remaining.is_zero() && running.load(Ordering::SeqCst) {
        let slice = remaining.min(SLEEP_SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
}

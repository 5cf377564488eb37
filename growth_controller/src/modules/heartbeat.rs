//! `heartbeat` module: introspection and tuning of the heartbeat task.

use crate::heartbeat::HeartbeatControls;
use growth_common::module::{Subsystem, Verb};
use growth_common::protocol::{OptionError, Options, Reply};

/// Verbs served by the `heartbeat` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatVerb {
    GetHeartbeatValue,
    GetWaitDurationSec,
    SetWaitDurationSec,
}

impl Verb for HeartbeatVerb {
    const ALL: &'static [Self] = &[
        HeartbeatVerb::GetHeartbeatValue,
        HeartbeatVerb::GetWaitDurationSec,
        HeartbeatVerb::SetWaitDurationSec,
    ];

    fn as_str(self) -> &'static str {
        match self {
            HeartbeatVerb::GetHeartbeatValue => "get_heartbeat_value",
            HeartbeatVerb::GetWaitDurationSec => "get_wait_duration_sec",
            HeartbeatVerb::SetWaitDurationSec => "set_wait_duration_sec",
        }
    }
}

pub struct HeartbeatModule {
    controls: HeartbeatControls,
}

impl HeartbeatModule {
    pub fn new(controls: HeartbeatControls) -> Self {
        Self { controls }
    }

    fn set_wait_duration(&self, options: &Options) -> Reply {
        let seconds = match options.number("wait_duration_sec") {
            Ok(seconds) => seconds,
            Err(OptionError::Missing(_)) => {
                return Reply::error(
                    "heartbeat.set_wait_duration_sec command requires 'wait_duration_sec' option",
                );
            }
            Err(e) => return Reply::error(format!("heartbeat.set_wait_duration_sec received {e}")),
        };
        match self.controls.set_interval_sec(seconds) {
            Ok(()) => Reply::ok().with("wait_duration_sec", seconds),
            Err(e) => Reply::error(e.to_string()),
        }
    }
}

impl Subsystem for HeartbeatModule {
    type Verb = HeartbeatVerb;

    fn handle(&mut self, verb: HeartbeatVerb, options: &Options) -> Reply {
        match verb {
            HeartbeatVerb::GetHeartbeatValue => {
                Reply::ok().with("heartbeat_value", self.controls.value())
            }
            HeartbeatVerb::GetWaitDurationSec => {
                Reply::ok().with("wait_duration_sec", self.controls.interval().as_secs_f64())
            }
            HeartbeatVerb::SetWaitDurationSec => self.set_wait_duration(options),
        }
    }
}

//! `daq` module: proxy to the DAQ program's ZeroMQ command endpoint.
//!
//! Each verb maps to one command of the DAQ program's own vocabulary. The
//! reply of the DAQ program is passed through unchanged; a transport fault
//! becomes an error reply and the socket is re-opened on the next call.

use crate::peer::PeerRequester;
use growth_common::module::{Subsystem, Verb};
use growth_common::protocol::{CommandRequest, Options, Reply};
use tracing::debug;

/// Verbs served by the `daq` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaqVerb {
    Ping,
    Stop,
    Pause,
    Resume,
    Status,
    SwitchOutput,
}

impl DaqVerb {
    /// Command understood by the DAQ program.
    pub fn program_command(self) -> &'static str {
        match self {
            DaqVerb::Ping => "ping",
            DaqVerb::Stop => "stop",
            DaqVerb::Pause => "pause",
            DaqVerb::Resume => "resume",
            DaqVerb::Status => "getStatus",
            DaqVerb::SwitchOutput => "startNewOutputFile",
        }
    }
}

impl Verb for DaqVerb {
    const ALL: &'static [Self] = &[
        DaqVerb::Ping,
        DaqVerb::Stop,
        DaqVerb::Pause,
        DaqVerb::Resume,
        DaqVerb::Status,
        DaqVerb::SwitchOutput,
    ];

    fn as_str(self) -> &'static str {
        match self {
            DaqVerb::Ping => "ping",
            DaqVerb::Stop => "stop",
            DaqVerb::Pause => "pause",
            DaqVerb::Resume => "resume",
            DaqVerb::Status => "status",
            DaqVerb::SwitchOutput => "switch_output",
        }
    }
}

pub struct DaqModule {
    requester: PeerRequester,
}

impl DaqModule {
    pub fn new(requester: PeerRequester) -> Self {
        Self { requester }
    }
}

impl Subsystem for DaqModule {
    type Verb = DaqVerb;

    fn handle(&mut self, verb: DaqVerb, _options: &Options) -> Reply {
        debug!("{} command invoked", verb.as_str());
        self.requester
            .call(&CommandRequest::bare(verb.program_command()))
    }
}

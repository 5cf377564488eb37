//! `disp` module: proxy to the display server's ZeroMQ endpoint.

use crate::peer::PeerRequester;
use growth_common::module::{Subsystem, Verb};
use growth_common::protocol::{CommandRequest, OptionError, Options, Reply};
use tracing::{debug, warn};

/// Verbs served by the `disp` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayVerb {
    Clear,
    Display,
    Ping,
    Connected,
}

impl Verb for DisplayVerb {
    const ALL: &'static [Self] = &[
        DisplayVerb::Clear,
        DisplayVerb::Display,
        DisplayVerb::Ping,
        DisplayVerb::Connected,
    ];

    fn as_str(self) -> &'static str {
        match self {
            DisplayVerb::Clear => "clear",
            DisplayVerb::Display => "display",
            DisplayVerb::Ping => "ping",
            DisplayVerb::Connected => "connected",
        }
    }
}

pub struct DisplayModule {
    requester: PeerRequester,
}

impl DisplayModule {
    pub fn new(requester: PeerRequester) -> Self {
        Self { requester }
    }

    fn display(&mut self, options: &Options) -> Reply {
        match options.string("message") {
            Ok(_) => self
                .requester
                .call(&CommandRequest::bare("display").with_options(options.clone())),
            Err(OptionError::Missing(_)) => {
                Reply::error("disp.display command requires 'message' option")
            }
            Err(e) => Reply::error(format!("disp.display command received {e}")),
        }
    }

    /// Whether a socket to the display server is set up. ZeroMQ connects in
    /// the background, so this does not prove the server is listening.
    fn connected(&mut self) -> Reply {
        let connected = match self.requester.connect() {
            Ok(()) => true,
            Err(e) => {
                warn!("Continue with being disconnected from display server ({})", e);
                false
            }
        };
        Reply::ok()
            .with_message(connected.to_string())
            .with("connected", connected)
    }
}

impl Subsystem for DisplayModule {
    type Verb = DisplayVerb;

    fn handle(&mut self, verb: DisplayVerb, options: &Options) -> Reply {
        debug!("{} command invoked", verb.as_str());
        match verb {
            DisplayVerb::Clear => self.requester.call(&CommandRequest::bare("clear")),
            DisplayVerb::Display => self.display(options),
            DisplayVerb::Ping => self.requester.call(&CommandRequest::bare("ping")),
            DisplayVerb::Connected => self.connected(),
        }
    }
}

//! Command port to the detector controller.
//!
//! The supervisor talks to the `hv`, `hk` and `daq` modules only through
//! [`CommandPort`], so its decisions can be exercised against an in-memory
//! port in tests.

use growth_common::client::{RemoteModule, Requester};
use growth_common::protocol::{Options, Reply};
use std::collections::HashMap;
use std::time::Duration;

/// Sends one `<target>.<verb>` command and always yields a reply.
pub trait CommandPort {
    fn send(&mut self, target: &str, verb: &str, options: Options) -> Reply;
}

/// [`CommandPort`] backed by the controller's TCP endpoint. One
/// [`RemoteModule`] is kept per target, each with its own lazily opened
/// connection.
pub struct RemoteDetector {
    endpoint: String,
    timeout: Option<Duration>,
    modules: HashMap<String, RemoteModule>,
}

impl RemoteDetector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: None,
            modules: HashMap::new(),
        }
    }

    /// Override the send/receive timeout of every module connection.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn module(&mut self, target: &str) -> &mut RemoteModule {
        let endpoint = &self.endpoint;
        let timeout = self.timeout;
        self.modules
            .entry(target.to_string())
            .or_insert_with(|| {
                let mut requester = Requester::new(endpoint.clone());
                if let Some(timeout) = timeout {
                    requester = requester.with_timeout(timeout);
                }
                RemoteModule::with_requester(target, requester)
            })
    }
}

impl CommandPort for RemoteDetector {
    fn send(&mut self, target: &str, verb: &str, options: Options) -> Reply {
        self.module(target).send_command(verb, options)
    }
}

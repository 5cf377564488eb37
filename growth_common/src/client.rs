//! Request/reply client.
//!
//! [`Requester`] owns one connection to an endpoint. It connects lazily,
//! bounds every send and receive by a timeout, and on any transport fault
//! discards the connection so that the next call reconnects. A failed call is
//! never retried.
//!
//! [`RemoteModule`] is the client-side stub of one dispatch-server module:
//! `hv.send_command("on", ...)` sends `{"command": "hv.on", ...}` and always
//! yields a [`Reply`].

use crate::consts::CLIENT_TIMEOUT;
use crate::protocol::{Command, CommandRequest, Options, ProtocolError, Reply, ReplyFrame, read_message, write_frame};
use serde::Serialize;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection to one request/reply endpoint.
pub struct Requester {
    endpoint: String,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl Requester {
    /// Create a requester for `host:port`. No connection is made yet.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: CLIENT_TIMEOUT,
            stream: None,
        }
    }

    /// Requester for a port on the local host.
    pub fn localhost(port: u16) -> Self {
        Self::new(format!("127.0.0.1:{port}"))
    }

    /// Override the send/receive/connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// True while a connection is held.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the connection if not already open.
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        if self.stream.is_some() {
            return Ok(());
        }
        debug!("Connecting to {}...", self.endpoint);
        let addrs = self
            .endpoint
            .to_socket_addrs()
            .map_err(|_| ProtocolError::NotConnected(self.endpoint.clone()))?;

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    stream.set_nodelay(true)?;
                    info!("Connected to {}", self.endpoint);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => debug!("Connect to {} failed: {}", addr, e),
            }
        }
        Err(ProtocolError::NotConnected(self.endpoint.clone()))
    }

    /// Drop the connection; the next request reconnects.
    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    /// Send one message and wait for its reply.
    ///
    /// On any failure the connection is discarded before returning.
    pub fn request<T: Serialize>(&mut self, message: &T) -> Result<ReplyFrame, ProtocolError> {
        self.connect()?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(ProtocolError::NotConnected(self.endpoint.clone()));
        };

        let result = match write_frame(stream, message) {
            Ok(()) => read_message::<ReplyFrame, _>(stream),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!("Request to {} failed ({}); dropping connection", self.endpoint, e);
            self.stream = None;
        }
        result
    }

    /// Send one request and fold transport faults into an error reply.
    pub fn call(&mut self, request: &CommandRequest) -> Reply {
        match self.request(request) {
            Ok(frame) => Reply::from(frame),
            Err(e) => Reply::error(format!(
                "communication with {} failed ({})",
                self.endpoint, e
            )),
        }
    }
}

/// Client-side stub of a module hosted by the dispatch server.
pub struct RemoteModule {
    name: String,
    requester: Requester,
}

impl RemoteModule {
    /// Stub for module `name` served at `endpoint`.
    pub fn new(name: &str, endpoint: impl Into<String>) -> Self {
        Self::with_requester(name, Requester::new(endpoint))
    }

    pub fn with_requester(name: &str, requester: Requester) -> Self {
        Self {
            name: name.to_string(),
            requester,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Issue `<name>.<verb>`.
    pub fn send_command(&mut self, verb: &str, options: Options) -> Reply {
        let request = Command::new(&self.name, verb, options).to_request();
        debug!("Sending command: {}", request.command);
        self.requester.call(&request)
    }
}

//! ZeroMQ request client for the peer programs.
//!
//! The DAQ program and the display server each serve a ZeroMQ REP socket
//! and exchange one JSON object per message: `{"command": "getStatus"}` in,
//! `{"status": "ok", ...}` out. [`PeerRequester`] holds one REQ socket to
//! such a program.
//!
//! The socket is opened lazily with bounded send and receive timeouts. A REQ
//! socket cannot send again before it has received, so after any fault the
//! socket is closed and the next call opens a fresh one. A failed call is
//! never retried.

use crate::error::PeerError;
use growth_common::consts::CLIENT_TIMEOUT;
use growth_common::protocol::{CommandRequest, Reply, ReplyFrame};
use std::time::Duration;
use tracing::{debug, info, warn};

/// ZeroMQ address for `endpoint`. A bare `host:port` is taken as TCP.
pub fn zmq_endpoint(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("tcp://{endpoint}")
    }
}

/// REQ socket to one peer program.
pub struct PeerRequester {
    context: zmq::Context,
    endpoint: String,
    timeout: Duration,
    socket: Option<zmq::Socket>,
}

impl PeerRequester {
    /// Requester for `endpoint`. No socket is opened yet.
    pub fn new(context: &zmq::Context, endpoint: &str) -> Self {
        Self {
            context: context.clone(),
            endpoint: zmq_endpoint(endpoint),
            timeout: CLIENT_TIMEOUT,
            socket: None,
        }
    }

    /// Override the send/receive timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// True while a socket is held.
    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Open the socket if not already open.
    ///
    /// ZeroMQ connects in the background, so this succeeds for any well-formed
    /// endpoint even when nothing listens there yet.
    pub fn connect(&mut self) -> Result<(), PeerError> {
        self.socket().map(|_| ())
    }

    /// Send one message and wait for its reply.
    ///
    /// On any failure the socket is closed before returning.
    pub fn request(&mut self, request: &CommandRequest) -> Result<ReplyFrame, PeerError> {
        let result = self.socket().and_then(|socket| exchange(socket, request));
        if let Err(e) = &result {
            warn!("Request to {} failed ({}); closing socket", self.endpoint, e);
            self.socket = None;
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

    fn socket(&mut self) -> Result<&zmq::Socket, PeerError> {
        if let Some(socket) = self.socket.take() {
            return Ok(self.socket.insert(socket));
        }
        debug!("Connecting to {}...", self.endpoint);
        let socket = self.open().map_err(|source| PeerError::Connect {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        info!("Connected to {}", self.endpoint);
        Ok(self.socket.insert(socket))
    }

    fn open(&self) -> Result<zmq::Socket, zmq::Error> {
        let millis = i32::try_from(self.timeout.as_millis()).unwrap_or(i32::MAX);
        let socket = self.context.socket(zmq::REQ)?;
        socket.set_linger(0)?;
        socket.set_sndtimeo(millis)?;
        socket.set_rcvtimeo(millis)?;
        socket.connect(&self.endpoint)?;
        Ok(socket)
    }
}

fn exchange(socket: &zmq::Socket, request: &CommandRequest) -> Result<ReplyFrame, PeerError> {
    let body = serde_json::to_vec(request)?;
    socket.send(body, 0).map_err(PeerError::Send)?;
    let reply = socket.recv_bytes(0).map_err(PeerError::Receive)?;
    Ok(serde_json::from_slice(&reply)?)
}

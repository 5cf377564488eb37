//! Dispatch server and its request loop.
//!
//! The `ControllerServer` owns the listen socket, the [`Dispatcher`] and
//! the [`Heartbeat`] task.
//!
//! # Threads
//!
//! ```text
//!  acceptor ──spawn──► connection 1 ──┐
//!                      connection 2 ──┼──► job queue ──► dispatch (this thread)
//!                      connection N ──┘     (FIFO)          │
//!                                                           └─ reply → client
//!  heartbeat (independent)
//! ```
//!
//! Connection threads only read frames. Every request is dispatched and
//! answered by the single dispatch thread, in arrival order, so handlers
//! never run concurrently and replies on one connection never interleave.
//! A frame rejected by a reader is answered through the same queue.
//!
//! # Shutdown
//!
//! `controller.stop` or the running flag (cleared by the signal handler)
//! ends the loop. The stop reply is written before the loop exits. The
//! acceptor then shuts down every client socket, which wakes the reader
//! threads, and joins them; the heartbeat is stopped and joined last.

use crate::dispatch::Dispatcher;
use crate::drivers::BoardDrivers;
use crate::error::ControllerError;
use crate::heartbeat::Heartbeat;
use crate::modules::{PeerEndpoints, build_registry};
use growth_common::config::GrowthConfig;
use growth_common::consts::{CLIENT_TIMEOUT, CONTROLLER_TARGET};
use growth_common::protocol::{ProtocolError, Reply, read_frame, write_frame};
use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Poll interval of the acceptor and of the running-flag check.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One request waiting for dispatch.
struct Job {
    work: Work,
    peer: SocketAddr,
    reply_to: Arc<TcpStream>,
}

enum Work {
    /// Frame body to dispatch.
    Request(Vec<u8>),
    /// Reject the connection with this message, then close it.
    Reject(String),
}

/// Command dispatch server.
pub struct ControllerServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
    heartbeat: Heartbeat,
    running: Arc<AtomicBool>,
}

impl ControllerServer {
    /// Bind the listen endpoint.
    ///
    /// # Errors
    /// Returns `ControllerError::Bind` if the address cannot be bound.
    pub fn bind(
        addr: &str,
        dispatcher: Dispatcher,
        heartbeat: Heartbeat,
    ) -> Result<Self, ControllerError> {
        let listener = TcpListener::bind(addr).map_err(|source| ControllerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self {
            listener,
            dispatcher,
            heartbeat,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Build every module on top of a hardware backend and bind.
    pub fn from_board(
        addr: &str,
        config: Arc<GrowthConfig>,
        board: BoardDrivers,
        peers: &PeerEndpoints,
    ) -> Result<Self, ControllerError> {
        let BoardDrivers { hv, hk, heartbeat } = board;
        let heartbeat = Heartbeat::new(heartbeat);
        let registry = build_registry(config, hv, hk, heartbeat.controls(), peers)?;
        Self::bind(addr, Dispatcher::new(registry), heartbeat)
    }

    /// Actual bound address (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Serve until `controller.stop` or the running flag is cleared.
    pub fn run(mut self) -> Result<(), ControllerError> {
        info!("Controller started on {:?}", self.listener.local_addr().ok());

        self.heartbeat
            .start()
            .map_err(|source| ControllerError::Spawn {
                name: "heartbeat",
                source,
            })?;

        let (jobs_tx, jobs_rx) = mpsc::channel();
        let acceptor = self.spawn_acceptor(jobs_tx)?;

        self.dispatch_loop(&jobs_rx);

        self.running.store(false, Ordering::SeqCst);
        info!("Stopping heartbeat thread");
        self.heartbeat.stop();
        if acceptor.join().is_err() {
            warn!("Acceptor thread panicked");
        }
        info!("Controller stopped");
        Ok(())
    }

    fn spawn_acceptor(&self, jobs: Sender<Job>) -> Result<JoinHandle<()>, ControllerError> {
        let spawn_err = |source| ControllerError::Spawn {
            name: "acceptor",
            source,
        };
        let listener = self.listener.try_clone().map_err(spawn_err)?;
        listener.set_nonblocking(true).map_err(spawn_err)?;
        let running = Arc::clone(&self.running);
        thread::Builder::new()
            .name("acceptor".to_string())
            .spawn(move || accept_loop(listener, jobs, running))
            .map_err(spawn_err)
    }

    fn dispatch_loop(&mut self, jobs: &Receiver<Job>) {
        while self.running.load(Ordering::SeqCst) {
            let job = match jobs.recv_timeout(POLL_INTERVAL) {
                Ok(job) => job,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match job.work {
                Work::Request(payload) => {
                    debug!("Received {} bytes from {}", payload.len(), job.peer);
                    let frame = self.dispatcher.handle_bytes(&payload);
                    if let Err(e) = write_frame(&mut &*job.reply_to, &frame) {
                        warn!("Failed to send reply to {}: {}", job.peer, e);
                    }
                }
                Work::Reject(message) => {
                    let frame = Reply::error(message).into_frame(CONTROLLER_TARGET);
                    let _ = write_frame(&mut &*job.reply_to, &frame);
                    let _ = job.reply_to.shutdown(Shutdown::Both);
                }
            }

            if self.dispatcher.is_stopping() {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }
}

/// Live client connection and its reader thread.
struct Connection {
    stream: Arc<TcpStream>,
    reader: JoinHandle<()>,
}

fn accept_loop(listener: TcpListener, jobs: Sender<Job>, running: Arc<AtomicBool>) {
    let mut connections: Vec<Connection> = Vec::new();
    while running.load(Ordering::SeqCst) {
        connections.retain(|c| !c.reader.is_finished());
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("Accepted connection from {}", peer);
                if let Err(e) = configure_stream(&stream) {
                    warn!("Dropping connection from {}: {}", peer, e);
                    continue;
                }
                let stream = Arc::new(stream);
                let reader_stream = Arc::clone(&stream);
                let jobs = jobs.clone();
                let spawned = thread::Builder::new()
                    .name(format!("conn-{peer}"))
                    .spawn(move || serve_connection(reader_stream, peer, jobs));
                match spawned {
                    Ok(reader) => connections.push(Connection { stream, reader }),
                    Err(e) => error!("Failed to spawn connection thread for {}: {}", peer, e),
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                warn!("Accept failed: {}", e);
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    debug!("Closing {} client connection(s)", connections.len());
    for connection in &connections {
        let _ = connection.stream.shutdown(Shutdown::Both);
    }
    for connection in connections {
        if connection.reader.join().is_err() {
            warn!("Connection thread panicked");
        }
    }
    debug!("Acceptor stopped");
}

/// Read frames from one client and queue them for dispatch.
fn serve_connection(stream: Arc<TcpStream>, peer: SocketAddr, jobs: Sender<Job>) {
    let queue = |work: Work| {
        jobs.send(Job {
            work,
            peer,
            reply_to: Arc::clone(&stream),
        })
        .is_ok()
    };

    loop {
        match read_frame(&mut &*stream) {
            Ok(payload) => {
                if !queue(Work::Request(payload)) {
                    break;
                }
            }
            Err(ProtocolError::Closed) => {
                debug!("Connection from {} closed", peer);
                break;
            }
            Err(ProtocolError::FrameTooLarge(len)) => {
                warn!("Frame of {} bytes from {} rejected", len, peer);
                queue(Work::Reject(format!("Frame too large ({len} bytes)")));
                break;
            }
            Err(e) => {
                warn!("Connection from {} failed: {}", peer, e);
                break;
            }
        }
    }
}

fn configure_stream(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(CLIENT_TIMEOUT))
}

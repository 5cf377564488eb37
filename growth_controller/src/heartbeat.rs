//! Heartbeat task.
//!
//! A dedicated thread waits for the configured interval, then advances a
//! 2-bit counter and presents it on the [`HeartbeatSink`] watched by the
//! external watchdog. The interval is changed at runtime through
//! [`HeartbeatControls`], which records the new value and wakes the task
//! over a message channel. The next increment is then due one new interval
//! after the previous increment, so repeated changes never postpone it.
//!
//! Stopping is cooperative: `stop()` sends a message the task observes
//! within one wait, then joins it.

use growth_common::consts::{
    DEFAULT_HEARTBEAT_INTERVAL_SEC, HEARTBEAT_MODULUS, MAX_HEARTBEAT_INTERVAL_SEC,
};
use growth_common::hw::HeartbeatSink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Heartbeat control errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HeartbeatError {
    /// Interval outside `(0, 1800]` seconds.
    #[error("Invalid wait duration ({0} sec; should be 0 < duration_sec <= 1800)")]
    IntervalOutOfRange(f64),
}

enum HeartbeatMessage {
    /// Interval changed; recompute the deadline from the last increment.
    Reload,
    Stop,
}

#[derive(Debug)]
struct HeartbeatState {
    value: u8,
    interval: Duration,
}

/// Shared handle used by the `heartbeat` module to inspect and tune the task.
#[derive(Clone)]
pub struct HeartbeatControls {
    state: Arc<Mutex<HeartbeatState>>,
    tx: Sender<HeartbeatMessage>,
}

impl HeartbeatControls {
    /// Last value presented on the sink.
    pub fn value(&self) -> u8 {
        self.state.lock().value
    }

    /// Current increment interval.
    pub fn interval(&self) -> Duration {
        self.state.lock().interval
    }

    /// Change the increment interval.
    ///
    /// # Errors
    /// Returns `HeartbeatError::IntervalOutOfRange` unless
    /// `0 < seconds <= 1800`.
    pub fn set_interval_sec(&self, seconds: f64) -> Result<(), HeartbeatError> {
        let interval = validate_interval(seconds)?;
        self.state.lock().interval = interval;
        // The task may already be gone during shutdown.
        let _ = self.tx.send(HeartbeatMessage::Reload);
        info!("Heartbeat interval set to {} sec", seconds);
        Ok(())
    }
}

fn validate_interval(seconds: f64) -> Result<Duration, HeartbeatError> {
    if seconds.is_finite() && seconds > 0.0 && seconds <= MAX_HEARTBEAT_INTERVAL_SEC as f64 {
        Ok(Duration::from_secs_f64(seconds))
    } else {
        Err(HeartbeatError::IntervalOutOfRange(seconds))
    }
}

/// Heartbeat task owner.
pub struct Heartbeat {
    controls: HeartbeatControls,
    pending: Option<(Box<dyn HeartbeatSink>, Receiver<HeartbeatMessage>)>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Create a stopped heartbeat with the default interval. The counter
    /// starts at 0 and is presented on the sink immediately.
    pub fn new(mut sink: Box<dyn HeartbeatSink>) -> Self {
        if let Err(e) = sink.set_heartbeat(0) {
            warn!("Failed to reset heartbeat output: {}", e);
        }
        let (tx, rx) = mpsc::channel();
        let state = HeartbeatState {
            value: 0,
            interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SEC),
        };
        Self {
            controls: HeartbeatControls {
                state: Arc::new(Mutex::new(state)),
                tx,
            },
            pending: Some((sink, rx)),
            handle: None,
        }
    }

    /// Builder-style initial interval.
    ///
    /// # Errors
    /// Same range check as [`HeartbeatControls::set_interval_sec`].
    pub fn with_interval(self, interval: Duration) -> Result<Self, HeartbeatError> {
        let interval = validate_interval(interval.as_secs_f64())?;
        self.controls.state.lock().interval = interval;
        Ok(self)
    }

    /// Handle for runtime inspection and tuning.
    pub fn controls(&self) -> HeartbeatControls {
        self.controls.clone()
    }

    /// True while the task thread is running.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the task thread. No-op if already started.
    pub fn start(&mut self) -> std::io::Result<()> {
        let Some((sink, rx)) = self.pending.take() else {
            return Ok(());
        };
        let state = Arc::clone(&self.controls.state);
        let handle = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || run_heartbeat(sink, rx, state))?;
        info!("Heartbeat auto increment started");
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the task and wait for it to exit.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.controls.tx.send(HeartbeatMessage::Stop);
        if handle.join().is_err() {
            warn!("Heartbeat thread panicked");
        }
        info!("Heartbeat auto increment stopped");
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_heartbeat(
    mut sink: Box<dyn HeartbeatSink>,
    rx: Receiver<HeartbeatMessage>,
    state: Arc<Mutex<HeartbeatState>>,
) {
    let mut last_tick = Instant::now();
    loop {
        let due = last_tick + state.lock().interval;
        match rx.recv_timeout(due.saturating_duration_since(Instant::now())) {
            Err(RecvTimeoutError::Timeout) => {
                last_tick = Instant::now();
                let value = {
                    let mut state = state.lock();
                    state.value = (state.value + 1) % HEARTBEAT_MODULUS;
                    state.value
                };
                debug!("Setting heartbeat value {}", value);
                if let Err(e) = sink.set_heartbeat(value) {
                    warn!("Failed to set heartbeat value {}: {}", value, e);
                }
            }
            Ok(HeartbeatMessage::Reload) => continue,
            Ok(HeartbeatMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growth_common::hw::HwError;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct RecordingSink {
        values: Arc<Mutex<Vec<u8>>>,
    }

    impl HeartbeatSink for RecordingSink {
        fn set_heartbeat(&mut self, value: u8) -> Result<(), HwError> {
            self.values.lock().push(value);
            Ok(())
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn counter_wraps_modulo_four() {
        let sink = RecordingSink::default();
        let values = Arc::clone(&sink.values);
        let mut heartbeat = Heartbeat::new(Box::new(sink))
            .with_interval(Duration::from_millis(5))
            .unwrap();
        heartbeat.start().unwrap();

        assert!(wait_for(|| values.lock().len() >= 7));
        heartbeat.stop();

        let values = values.lock();
        assert_eq!(&values[..7], &[0, 1, 2, 3, 0, 1, 2]);
    }

    #[test]
    fn stop_latency_bounded_by_message() {
        let mut heartbeat = Heartbeat::new(Box::new(RecordingSink::default()))
            .with_interval(Duration::from_secs(1800))
            .unwrap();
        heartbeat.start().unwrap();
        assert!(heartbeat.is_running());

        let started = Instant::now();
        heartbeat.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!heartbeat.is_running());
    }

    #[test]
    fn interval_range_enforced() {
        let heartbeat = Heartbeat::new(Box::new(RecordingSink::default()));
        let controls = heartbeat.controls();
        assert_eq!(controls.interval(), Duration::from_secs(10));

        assert!(controls.set_interval_sec(0.0).is_err());
        assert!(controls.set_interval_sec(-1.0).is_err());
        assert!(controls.set_interval_sec(1800.5).is_err());
        assert!(controls.set_interval_sec(f64::NAN).is_err());
        assert_eq!(controls.interval(), Duration::from_secs(10));

        controls.set_interval_sec(1800.0).unwrap();
        assert_eq!(controls.interval(), Duration::from_secs(1800));
    }

    #[test]
    fn reload_applies_new_interval() {
        let sink = RecordingSink::default();
        let values = Arc::clone(&sink.values);
        let mut heartbeat = Heartbeat::new(Box::new(sink))
            .with_interval(Duration::from_secs(1800))
            .unwrap();
        heartbeat.start().unwrap();

        heartbeat.controls().set_interval_sec(0.01).unwrap();
        assert!(wait_for(|| values.lock().len() >= 3));
        assert!(heartbeat.controls().value() < HEARTBEAT_MODULUS);
    }

    #[test]
    fn frequent_interval_updates_do_not_starve_counter() {
        let sink = RecordingSink::default();
        let values = Arc::clone(&sink.values);
        let mut heartbeat = Heartbeat::new(Box::new(sink))
            .with_interval(Duration::from_millis(200))
            .unwrap();
        heartbeat.start().unwrap();

        let controls = heartbeat.controls();
        let until = Instant::now() + Duration::from_secs(2);
        while Instant::now() < until {
            controls.set_interval_sec(0.2).unwrap();
            thread::sleep(Duration::from_millis(100));
        }
        heartbeat.stop();

        // First value is the reset to 0 made by `new`.
        let increments = values.lock().len() - 1;
        assert!(increments >= 5, "only {increments} increments in 2 s");
    }
}

//! Session management
//!
//! Owns the connect/disconnect lifecycle, the single-writer command path and
//! the background telemetry reader. The transport is shared by exactly two
//! parties: the reader thread blocks on its own cloned handle, the session
//! writes commands through the other. To share a [`Session`] across threads,
//! wrap it in a mutex; telemetry keeps flowing while the session lock is
//! held because the reader never takes it.

mod reader;

pub use reader::SessionEvent;

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::datalog::{self, EventLog};
use crate::protocol::{
    clear_buffers, configure_port, open_port, Channel, ParameterSet, ProtocolError, SerialChannel,
    DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS,
};
use crate::stats::{PulseStats, StatsSnapshot};
use reader::TelemetryReader;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Baud rate used when opening a serial port
    pub baud_rate: u32,
    /// Read timeout per attempt; also bounds how long a disconnect waits
    /// for the reader to observe the stop flag
    pub read_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }
}

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No transport attached
    Disconnected,
    /// Transport attached, reader running
    Connected,
}

/// Handle to the running reader thread
struct ReaderHandle {
    join: JoinHandle<()>,
    running: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<String>>>,
}

impl ReaderHandle {
    fn fault(&self) -> Option<String> {
        self.fault.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// A control session with the generator.
///
/// Created once and reused across connects: statistics, the event log and
/// the event channel all outlive any single connection.
pub struct Session {
    config: SessionConfig,
    writer: Option<Box<dyn Channel>>,
    reader: Option<ReaderHandle>,
    stats: Arc<PulseStats>,
    log: Arc<EventLog>,
    event_tx: Sender<SessionEvent>,
}

impl Session {
    /// Create a session and the receiving end of its event channel.
    ///
    /// The receiver sees one [`SessionEvent::Line`] per raw device line,
    /// one [`SessionEvent::Pulse`] per accepted pulse and a
    /// [`SessionEvent::Fault`] if the transport dies mid-session.
    pub fn new(config: SessionConfig) -> (Self, Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel();
        (
            Self {
                config,
                writer: None,
                reader: None,
                stats: Arc::new(PulseStats::new()),
                log: Arc::new(EventLog::new()),
                event_tx,
            },
            event_rx,
        )
    }

    /// Open `port` and start the telemetry reader.
    ///
    /// Fails with [`ProtocolError::ConnectionFailed`] when the port cannot
    /// be opened and with [`ProtocolError::AlreadyConnected`] while a live
    /// session exists. A session that died on a transport fault is cleaned
    /// up here, so reconnecting always works.
    pub fn connect(&mut self, port: &str) -> Result<(), ProtocolError> {
        self.reap_faulted();
        if self.state() == SessionState::Connected {
            return Err(ProtocolError::AlreadyConnected);
        }

        let mut handle = open_port(port, Some(self.config.baud_rate))?;
        configure_port(handle.as_mut())?;
        clear_buffers(handle.as_mut())?;

        self.attach(Box::new(SerialChannel::new(handle)))?;
        info!(port, "connected to generator");
        Ok(())
    }

    /// Start a session over an already-open channel (demo device, tests).
    pub fn connect_channel(&mut self, channel: Box<dyn Channel>) -> Result<(), ProtocolError> {
        self.reap_faulted();
        if self.state() == SessionState::Connected {
            return Err(ProtocolError::AlreadyConnected);
        }
        self.attach(channel)?;
        info!("connected to generator over injected channel");
        Ok(())
    }

    /// Wire up the write half, clone the read half and spawn the reader.
    fn attach(&mut self, mut channel: Box<dyn Channel>) -> Result<(), ProtocolError> {
        channel
            .set_read_timeout(self.config.read_timeout)
            .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;
        let read_half = channel
            .try_clone()
            .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let fault = Arc::new(Mutex::new(None));
        let reader = TelemetryReader::new(
            read_half,
            running.clone(),
            fault.clone(),
            self.stats.clone(),
            self.log.clone(),
            self.event_tx.clone(),
        );
        let join = thread::Builder::new()
            .name("pulselink-reader".into())
            .spawn(move || reader.run())
            .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;

        self.writer = Some(channel);
        self.reader = Some(ReaderHandle {
            join,
            running,
            fault,
        });
        Ok(())
    }

    /// Stop the reader and release the transport. Idempotent; a no-op when
    /// already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.reader.take() {
            handle.running.store(false, Ordering::Release);
            // the loop re-checks the flag every read attempt, so the join
            // completes within one read timeout
            if handle.join.join().is_err() {
                warn!("telemetry reader panicked during shutdown");
            }
        }
        if self.writer.take().is_some() {
            info!("disconnected from generator");
        }
    }

    /// Encode and transmit a parameter set as one atomic write.
    ///
    /// Fails with [`ProtocolError::NotConnected`] outside a live session,
    /// writing nothing. A write failure terminates the session like any
    /// other transport error.
    pub fn send_parameters(&mut self, params: &ParameterSet) -> Result<(), ProtocolError> {
        if let Some(reason) = self.reader.as_ref().and_then(|h| h.fault()) {
            self.disconnect();
            return Err(ProtocolError::Transport(reason));
        }

        let frame = params.encode();
        let result = match self.writer.as_mut() {
            Some(writer) => {
                let written = writer.write_all(&frame);
                written.and_then(|()| writer.flush())
            }
            None => return Err(ProtocolError::NotConnected),
        };

        if let Err(e) = result {
            warn!(error = %e, "write failed, terminating session");
            self.disconnect();
            return Err(ProtocolError::Transport(e.to_string()));
        }

        debug!(
            lambda_hz = params.lambda_hz(),
            min_width_us = params.min_width_us(),
            max_width_us = params.max_width_us(),
            "parameters sent"
        );
        Ok(())
    }

    /// Current statistics; callable in any state. Before the first pulse
    /// this is the zero snapshot.
    pub fn current_stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Connection state. A session whose reader died on a transport fault
    /// reports [`SessionState::Disconnected`]; its resources are reclaimed
    /// by the next lifecycle call.
    pub fn state(&self) -> SessionState {
        match &self.reader {
            Some(handle) if handle.fault().is_none() => SessionState::Connected,
            _ => SessionState::Disconnected,
        }
    }

    /// Shared handle to the pulse log
    pub fn event_log(&self) -> Arc<EventLog> {
        self.log.clone()
    }

    /// Export the pulse log as CSV
    pub fn save_log_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        datalog::write_csv(path, &self.log.rows())
    }

    /// Tear down a session whose reader already stopped on a fault.
    fn reap_faulted(&mut self) {
        if self.reader.as_ref().is_some_and(|h| h.fault().is_some()) {
            debug!("reaping faulted reader before next lifecycle step");
            self.disconnect();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

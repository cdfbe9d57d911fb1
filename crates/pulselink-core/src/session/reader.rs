//! Background telemetry reader
//!
//! One thread per connected session: idle until spawned, reading while the
//! run flag is set, stopped once the flag clears or the transport fails.
//! A read timeout is not a failure, it is the expected silence between
//! pulses.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::datalog::EventLog;
use crate::protocol::{decode_line, Channel, ProtocolError, PulseEvent, TelemetryLine};
use crate::stats::PulseStats;

/// Notifications pushed from the reader to the control surface
#[derive(Debug)]
pub enum SessionEvent {
    /// A decoded pulse
    Pulse(PulseEvent),
    /// One raw line of device output, as received
    Line(String),
    /// The reader stopped on a transport failure
    Fault(String),
}

/// The read half of a session, run on its own thread.
pub(crate) struct TelemetryReader {
    channel: Box<dyn Channel>,
    running: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<String>>>,
    stats: Arc<PulseStats>,
    log: Arc<EventLog>,
    events: Sender<SessionEvent>,
    pending: Vec<u8>,
}

impl TelemetryReader {
    pub(crate) fn new(
        channel: Box<dyn Channel>,
        running: Arc<AtomicBool>,
        fault: Arc<Mutex<Option<String>>>,
        stats: Arc<PulseStats>,
        log: Arc<EventLog>,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            channel,
            running,
            fault,
            stats,
            log,
            events,
            pending: Vec::new(),
        }
    }

    /// Read loop. Returns when the run flag clears or the transport errors;
    /// the flag is re-checked every iteration, so a stop request is observed
    /// within one read timeout.
    pub(crate) fn run(mut self) {
        debug!("telemetry reader started");
        let mut buf = [0u8; 512];

        while self.running.load(Ordering::Acquire) {
            match self.channel.read(&mut buf) {
                Ok(0) => {
                    self.fail("transport closed".to_string());
                    break;
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&buf[..n]);
                    self.drain_lines();
                }
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    // silence between pulses, poll again
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.fail(e.to_string());
                    break;
                }
            }
        }

        debug!("telemetry reader stopped");
    }

    /// Pull complete lines out of the pending buffer and process each.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            // malformed bytes are replaced, never fail the stream
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if line.is_empty() {
                continue;
            }
            self.handle_line(&line);
        }
    }

    fn handle_line(&mut self, line: &str) {
        let _ = self.events.send(SessionEvent::Line(line.to_string()));

        match decode_line(line) {
            Ok(TelemetryLine::Pulse(event)) => {
                // stats before the log, then the push channel
                self.stats.update(&event);
                self.log.append(&event);
                let _ = self.events.send(SessionEvent::Pulse(event));
            }
            Ok(TelemetryLine::Diagnostic) => {
                debug!(line, "device diagnostic");
            }
            Err(ProtocolError::DecodeFailure(reason)) => {
                debug!(line, %reason, "discarding malformed telemetry");
            }
            Err(e) => {
                debug!(line, error = %e, "discarding line");
            }
        }
    }

    /// Record a terminal transport fault and surface it to the session.
    fn fail(&mut self, reason: String) {
        warn!(%reason, "telemetry reader stopping on transport error");
        *self.fault.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason.clone());
        let _ = self.events.send(SessionEvent::Fault(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::sync::mpsc;
    use std::time::Duration;

    /// Channel double that replays a fixed script of read results.
    /// An exhausted script keeps timing out.
    struct ScriptedChannel {
        script: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedChannel {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl Read for ScriptedChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no more data")),
            }
        }
    }

    impl Write for ScriptedChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Channel for ScriptedChannel {
        fn set_read_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }

        fn clear_input(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn try_clone(&self) -> io::Result<Box<dyn Channel>> {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "scripted channel is single-handle",
            ))
        }
    }

    struct Harness {
        stats: Arc<PulseStats>,
        log: Arc<EventLog>,
        fault: Arc<Mutex<Option<String>>>,
        events: mpsc::Receiver<SessionEvent>,
    }

    /// Run the reader to completion over a script ending in a read error.
    fn run_script(mut script: Vec<io::Result<Vec<u8>>>, terminate: bool) -> Harness {
        if terminate {
            script.push(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")));
        }
        let stats = Arc::new(PulseStats::new());
        let log = Arc::new(EventLog::new());
        let fault = Arc::new(Mutex::new(None));
        let (tx, rx) = mpsc::channel();
        let reader = TelemetryReader::new(
            Box::new(ScriptedChannel::new(script)),
            Arc::new(AtomicBool::new(true)),
            fault.clone(),
            stats.clone(),
            log.clone(),
            tx,
        );
        reader.run();
        Harness {
            stats,
            log,
            fault,
            events: rx,
        }
    }

    fn line(s: &str) -> io::Result<Vec<u8>> {
        Ok(format!("{s}\n").into_bytes())
    }

    #[test]
    fn valid_pulses_reach_stats_log_and_channel() {
        let h = run_script(
            vec![
                line("Generator impulsa spreman"),
                line("Impuls @ 10 ms | širina: 20 µs | sledeći razmak: 30 ms"),
                line("not telemetry at all"),
                line("Impuls @ oops"),
                line("Arduino: Impuls @ 40 ms | širina: 60 µs | sledeći razmak: 80 ms"),
            ],
            true,
        );

        let rows = h.log.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp_ms, 10);
        assert_eq!(rows[1].timestamp_ms, 40);

        let snap = h.stats.snapshot();
        assert_eq!(snap.pulse_count, 2);
        assert_eq!(snap.avg_width_us, 40.0);

        let pulses = h
            .events
            .try_iter()
            .filter(|e| matches!(e, SessionEvent::Pulse(_)))
            .count();
        assert_eq!(pulses, 2);
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let stream = "Impuls @ 1 ms | širina: 2 µs | sledeći razmak: 3 ms\n\
                      Impuls @ 4 ms | širina: 5 µs | sledeći razmak: 6 ms\n"
            .as_bytes();
        // split inside the two-byte 'š' of the first line
        let cut = stream.iter().position(|&b| b == 0xc5).unwrap() + 1;
        let h = run_script(
            vec![Ok(stream[..cut].to_vec()), Ok(stream[cut..].to_vec())],
            true,
        );

        let rows = h.log.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pulse_width_us, 2);
        assert_eq!(rows[1].pulse_width_us, 5);
    }

    #[test]
    fn invalid_utf8_does_not_stop_the_stream() {
        let h = run_script(
            vec![
                Ok(b"\xff\xfe garbage bytes \xff\n".to_vec()),
                line("Impuls @ 7 ms | širina: 8 µs | sledeći razmak: 9 ms"),
            ],
            true,
        );
        assert_eq!(h.log.len(), 1);
    }

    #[test]
    fn read_timeouts_are_not_faults() {
        let h = run_script(
            vec![
                Err(io::Error::new(io::ErrorKind::TimedOut, "quiet")),
                line("Impuls @ 1 ms | širina: 2 µs | sledeći razmak: 3 ms"),
            ],
            true,
        );
        assert_eq!(h.log.len(), 1);
    }

    #[test]
    fn transport_error_sets_fault_and_surfaces_event() {
        let h = run_script(vec![line("diagnostic only")], true);

        assert!(h.fault.lock().unwrap().is_some());
        let faults = h
            .events
            .try_iter()
            .filter(|e| matches!(e, SessionEvent::Fault(_)))
            .count();
        assert_eq!(faults, 1);
    }

    #[test]
    fn eof_is_a_transport_fault() {
        let h = run_script(vec![Ok(Vec::new())], false);
        assert!(h.fault.lock().unwrap().is_some());
    }

    #[test]
    fn cleared_run_flag_stops_without_fault() {
        let (tx, rx) = mpsc::channel();
        let fault = Arc::new(Mutex::new(None));
        let reader = TelemetryReader::new(
            Box::new(ScriptedChannel::new(Vec::new())),
            Arc::new(AtomicBool::new(false)),
            fault.clone(),
            Arc::new(PulseStats::new()),
            Arc::new(EventLog::new()),
            tx,
        );
        reader.run();
        assert!(fault.lock().unwrap().is_none());
        assert!(rx.try_iter().next().is_none());
    }
}

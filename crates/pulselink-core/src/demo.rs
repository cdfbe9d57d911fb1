//! Demo Mode - simulated generator device
//!
//! A software model of the pulse generator firmware, exposed as a
//! [`Channel`] so the whole session stack can run without hardware. Pulse
//! widths are drawn uniformly from the configured bounds and inter-pulse
//! gaps from the exponential distribution of the configured rate, which is
//! what the real firmware does with its lambda parameter. Parameter
//! commands written to the device are parsed and applied, closing the loop.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::protocol::{Channel, ParameterSet};

/// Greeting the simulated firmware prints on power-up
const GREETING: &str = "Generator impulsa spreman";

struct DemoState {
    params: ParameterSet,
    rng: StdRng,
    /// Device-side clock, advanced by the generated gaps
    device_clock_ms: i64,
    next_pulse_at: Instant,
    /// Telemetry bytes not yet read by the host
    outbox: Vec<u8>,
    /// Partial command bytes not yet terminated by a newline
    inbox: Vec<u8>,
    read_timeout: Duration,
}

impl DemoState {
    /// Emit telemetry for every pulse whose time has come.
    fn pump(&mut self, now: Instant) {
        while self.next_pulse_at <= now {
            let width_us = self
                .rng
                .gen_range(self.params.min_width_us()..=self.params.max_width_us());
            let gap_ms = self.draw_gap_ms();

            let line = format!(
                "Impuls @ {} ms | širina: {} µs | sledeći razmak: {} ms\n",
                self.device_clock_ms, width_us, gap_ms
            );
            self.outbox.extend_from_slice(line.as_bytes());

            self.device_clock_ms += gap_ms;
            self.next_pulse_at += Duration::from_millis(gap_ms as u64);
        }
    }

    /// Exponential inter-pulse gap for the configured rate, at least 1 ms.
    fn draw_gap_ms(&mut self) -> i64 {
        let u: f64 = self.rng.gen_range(0.0..1.0);
        let gap_s = -(1.0 - u).ln() / self.params.lambda_hz();
        ((gap_s * 1000.0).ceil() as i64).max(1)
    }

    /// Apply one complete command line, ignoring anything unparseable the
    /// way the firmware does.
    fn apply_command(&mut self, line: &str) {
        let mut lambda = None;
        let mut min_width = None;
        let mut max_width = None;
        for field in line.trim().split(';') {
            match field.split_once(':') {
                Some(("LAMBDA", v)) => lambda = v.parse::<f64>().ok(),
                Some(("MINW", v)) => min_width = v.parse::<u32>().ok(),
                Some(("MAXW", v)) => max_width = v.parse::<u32>().ok(),
                _ => {}
            }
        }

        let (Some(lambda), Some(min_width), Some(max_width)) = (lambda, min_width, max_width)
        else {
            debug!(line, "demo device ignoring unparseable command");
            return;
        };
        match ParameterSet::new(lambda, min_width, max_width) {
            Ok(params) => {
                self.params = params;
                // restart the schedule under the new rate
                let gap_ms = self.draw_gap_ms();
                self.next_pulse_at = Instant::now() + Duration::from_millis(gap_ms as u64);
                let ack = format!(
                    "Novi parametri: lambda={} Hz, širina={}-{} µs\n",
                    lambda, min_width, max_width
                );
                self.outbox.extend_from_slice(ack.as_bytes());
            }
            Err(e) => debug!(line, error = %e, "demo device rejecting command"),
        }
    }
}

/// Simulated pulse generator implementing [`Channel`].
///
/// Cloned handles share one device, matching the read/write split the
/// session expects from a serial port.
pub struct DemoDevice {
    state: Arc<Mutex<DemoState>>,
}

impl DemoDevice {
    /// Create a demo device with entropy seeding and firmware defaults
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a demo device with a fixed seed for deterministic runs
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut rng: StdRng) -> Self {
        let params = ParameterSet::default();
        let mut outbox = Vec::new();
        outbox.extend_from_slice(GREETING.as_bytes());
        outbox.push(b'\n');

        let u: f64 = rng.gen_range(0.0..1.0);
        let first_gap_s = -(1.0 - u).ln() / params.lambda_hz();
        let next_pulse_at = Instant::now() + Duration::from_secs_f64(first_gap_s);

        Self {
            state: Arc::new(Mutex::new(DemoState {
                params,
                rng,
                device_clock_ms: 0,
                next_pulse_at,
                outbox,
                inbox: Vec::new(),
                read_timeout: Duration::from_millis(crate::protocol::DEFAULT_READ_TIMEOUT_MS),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DemoState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for DemoDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for DemoDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + self.lock().read_timeout;

        loop {
            let now = Instant::now();
            let wait = {
                let mut state = self.lock();
                state.pump(now);
                if !state.outbox.is_empty() {
                    let n = state.outbox.len().min(buf.len());
                    buf[..n].copy_from_slice(&state.outbox[..n]);
                    state.outbox.drain(..n);
                    return Ok(n);
                }
                state.next_pulse_at.saturating_duration_since(now)
            };

            if now >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "no pulse within the read timeout",
                ));
            }
            // sleep outside the lock so writes keep flowing
            let remaining = deadline.saturating_duration_since(now);
            let nap = wait
                .min(remaining)
                .clamp(Duration::from_micros(100), Duration::from_millis(5));
            thread::sleep(nap);
        }
    }
}

impl Write for DemoDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        state.inbox.extend_from_slice(buf);
        while let Some(pos) = state.inbox.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = state.inbox.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).to_string();
            state.apply_command(&line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for DemoDevice {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.lock().read_timeout = timeout;
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.lock().outbox.clear();
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn Channel>> {
        Ok(Box::new(DemoDevice {
            state: Arc::clone(&self.state),
        }))
    }
}

//! Pulse statistics
//!
//! Cumulative pulse count and mean width, plus a sliding-window rate
//! estimate over the trailing five seconds.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::protocol::PulseEvent;

/// Width of the trailing window used for the rate estimate
pub const WINDOW: Duration = Duration::from_secs(5);

/// Point-in-time view of the aggregated statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Total pulses accepted since the aggregator was created
    pub pulse_count: u64,
    /// Mean pulse width over every pulse ever seen, in microseconds
    pub avg_width_us: f64,
    /// Pulses inside the trailing window divided by the window length, in Hz
    pub frequency_hz: f64,
}

impl StatsSnapshot {
    /// Snapshot with no pulses recorded
    pub fn zero() -> Self {
        Self {
            pulse_count: 0,
            avg_width_us: 0.0,
            frequency_hz: 0.0,
        }
    }
}

#[derive(Debug)]
struct StatsInner {
    pulse_count: u64,
    avg_width_us: f64,
    window: VecDeque<Instant>,
}

/// Thread-shared pulse aggregator.
///
/// The reader thread mutates it through [`update`](Self::update); any thread
/// may take a [`snapshot`](Self::snapshot). One lock guards count, mean and
/// window together, so a snapshot can never pair an incremented count with a
/// stale mean.
#[derive(Debug)]
pub struct PulseStats {
    inner: Mutex<StatsInner>,
}

impl PulseStats {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                pulse_count: 0,
                avg_width_us: 0.0,
                window: VecDeque::new(),
            }),
        }
    }

    /// Record one accepted pulse.
    ///
    /// Entries older than [`WINDOW`] relative to the event's own arrival time
    /// are evicted; a burst inside the window is never dropped for capacity.
    pub fn update(&self, event: &PulseEvent) {
        let mut inner = self.lock();

        inner.pulse_count += 1;
        // incremental mean, no width history kept
        let delta = event.width_us as f64 - inner.avg_width_us;
        inner.avg_width_us += delta / inner.pulse_count as f64;

        inner.window.push_back(event.received_at);
        while let Some(&front) = inner.window.front() {
            if event.received_at.duration_since(front) > WINDOW {
                inner.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current statistics, window measured against now
    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Current statistics with the window measured against an explicit
    /// reference instant.
    ///
    /// Pure read: entries that have aged out since the last update are not
    /// counted, so the reported frequency decays to zero during silence
    /// without waiting for the next event to trigger eviction.
    pub fn snapshot_at(&self, now: Instant) -> StatsSnapshot {
        let inner = self.lock();
        let in_window = inner
            .window
            .iter()
            .filter(|&&t| now.duration_since(t) <= WINDOW)
            .count();
        StatsSnapshot {
            pulse_count: inner.pulse_count,
            avg_width_us: inner.avg_width_us,
            frequency_hz: in_window as f64 / WINDOW.as_secs_f64(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        // a poisoned lock still guards consistent state, keep going
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PulseStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event_at(base: Instant, offset: Duration, width_us: i64) -> PulseEvent {
        PulseEvent {
            device_timestamp_ms: offset.as_millis() as i64,
            width_us,
            next_gap_ms: 0,
            received_at: base + offset,
        }
    }

    #[test]
    fn zero_snapshot_before_any_event() {
        let stats = PulseStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::zero());
    }

    #[test]
    fn mean_width_is_exact() {
        let stats = PulseStats::new();
        let base = Instant::now();
        for (i, width) in [50, 100, 150].into_iter().enumerate() {
            stats.update(&event_at(base, Duration::from_millis(i as u64), width));
        }
        let snap = stats.snapshot_at(base + Duration::from_millis(10));
        assert_eq!(snap.pulse_count, 3);
        assert_eq!(snap.avg_width_us, 100.0);
    }

    #[test]
    fn frequency_counts_window_over_five_seconds() {
        let stats = PulseStats::new();
        let base = Instant::now();
        let n = 8;
        for i in 0..n {
            stats.update(&event_at(base, Duration::from_millis(i * 100), 10));
        }
        let snap = stats.snapshot_at(base + Duration::from_millis(n * 100));
        assert_eq!(snap.frequency_hz, n as f64 / 5.0);
    }

    #[test]
    fn frequency_decays_to_zero_during_silence() {
        let stats = PulseStats::new();
        let base = Instant::now();
        for i in 0..4 {
            stats.update(&event_at(base, Duration::from_millis(i * 10), 10));
        }
        assert!(stats.snapshot_at(base + Duration::from_secs(1)).frequency_hz > 0.0);

        // window empties with no further updates
        let late = stats.snapshot_at(base + Duration::from_secs(6));
        assert_eq!(late.frequency_hz, 0.0);
        // cumulative figures are unaffected
        assert_eq!(late.pulse_count, 4);
    }

    #[test]
    fn update_evicts_entries_older_than_window() {
        let stats = PulseStats::new();
        let base = Instant::now();
        stats.update(&event_at(base, Duration::ZERO, 10));
        stats.update(&event_at(base, Duration::from_secs(1), 10));
        // this event pushes the first one out of its window
        stats.update(&event_at(base, Duration::from_secs(7), 10));

        let snap = stats.snapshot_at(base + Duration::from_secs(7));
        // entry at +1s evicted too: older than 5s relative to +7s
        assert_eq!(snap.frequency_hz, 1.0 / 5.0);
        assert_eq!(snap.pulse_count, 3);
    }

    #[test]
    fn burst_within_window_is_fully_counted() {
        let stats = PulseStats::new();
        let base = Instant::now();
        let n = 2000;
        for i in 0..n {
            stats.update(&event_at(base, Duration::from_micros(i * 50), 10));
        }
        let snap = stats.snapshot_at(base + Duration::from_secs(1));
        assert_eq!(snap.frequency_hz, n as f64 / 5.0);
    }

    #[test]
    fn snapshot_serializes_for_the_control_surface() {
        let stats = PulseStats::new();
        let base = Instant::now();
        stats.update(&event_at(base, Duration::ZERO, 42));
        let json = serde_json::to_value(stats.snapshot_at(base)).unwrap();
        assert_eq!(json["pulse_count"], 1);
        assert_eq!(json["avg_width_us"], 42.0);
        assert_eq!(json["frequency_hz"], 1.0 / 5.0);
    }
}

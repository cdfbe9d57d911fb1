//! Event log recorder

use std::sync::{Mutex, MutexGuard};

use crate::protocol::PulseEvent;

use super::PulseRecord;

/// Append-only, ordered log of accepted pulses.
///
/// Appended to by the reader thread; read by the control surface and the
/// CSV exporter through cheap row copies.
#[derive(Debug, Default)]
pub struct EventLog {
    rows: Mutex<Vec<PulseRecord>>,
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one accepted pulse
    pub fn append(&self, event: &PulseEvent) {
        self.lock().push(PulseRecord::from(event));
    }

    /// Number of logged pulses
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing has been logged yet
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the rows in arrival order
    pub fn rows(&self) -> Vec<PulseRecord> {
        self.lock().clone()
    }

    /// Drop all logged rows
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PulseRecord>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn event(ts: i64, width: i64, gap: i64) -> PulseEvent {
        PulseEvent {
            device_timestamp_ms: ts,
            width_us: width,
            next_gap_ms: gap,
            received_at: Instant::now(),
        }
    }

    #[test]
    fn appends_in_arrival_order() {
        let log = EventLog::new();
        assert!(log.is_empty());

        log.append(&event(10, 20, 30));
        log.append(&event(40, 50, 60));

        assert_eq!(log.len(), 2);
        let rows = log.rows();
        assert_eq!(rows[0].timestamp_ms, 10);
        assert_eq!(rows[1].timestamp_ms, 40);

        log.clear();
        assert!(log.is_empty());
    }
}

//! Pulse Event Logging
//!
//! Records every accepted pulse in arrival order and exports the log as CSV.

mod format;
mod recorder;

pub use format::write_csv;
pub use recorder::EventLog;

use serde::Serialize;

use crate::protocol::PulseEvent;

/// One logged pulse, in the shape the CSV export emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PulseRecord {
    /// Device-side timestamp in milliseconds
    pub timestamp_ms: i64,
    /// Pulse width in microseconds
    pub pulse_width_us: i64,
    /// Scheduled gap to the next pulse in milliseconds
    pub next_gap_ms: i64,
}

impl From<&PulseEvent> for PulseRecord {
    fn from(event: &PulseEvent) -> Self {
        Self {
            timestamp_ms: event.device_timestamp_ms,
            pulse_width_us: event.width_us,
            next_gap_ms: event.next_gap_ms,
        }
    }
}

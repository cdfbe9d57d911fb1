//! Telemetry decoding
//!
//! The firmware reports every emitted pulse as one newline-terminated line:
//!
//! ```text
//! Impuls @ 1234 ms | širina: 56 µs | sledeći razmak: 78 ms
//! ```
//!
//! The payload may arrive behind a source tag (`Arduino: Impuls @ ...`),
//! which is stripped before matching. Anything else the firmware prints is
//! plain diagnostic text, not an error.

use std::time::Instant;

use super::ProtocolError;

/// Literal marker opening every pulse telemetry payload
const PULSE_MARKER: &str = "Impuls @";

/// One decoded pulse report.
///
/// Created exactly once per successfully decoded telemetry line. The
/// aggregator and the event log each take their own copy.
#[derive(Debug, Clone)]
pub struct PulseEvent {
    /// Device-side timestamp in milliseconds since firmware boot
    pub device_timestamp_ms: i64,
    /// Pulse width in microseconds
    pub width_us: i64,
    /// Gap the firmware scheduled until the next pulse, in milliseconds
    pub next_gap_ms: i64,
    /// Host-side monotonic arrival time
    pub received_at: Instant,
}

/// Classification of one received line
#[derive(Debug, Clone)]
pub enum TelemetryLine {
    /// A well-formed pulse report
    Pulse(PulseEvent),
    /// Plain device text that is not pulse telemetry
    Diagnostic,
}

/// Decode one line of device output.
///
/// Lines without the pulse marker (after stripping an optional source tag)
/// are [`TelemetryLine::Diagnostic`]. Marked lines whose fields do not parse
/// yield [`ProtocolError::DecodeFailure`]; the caller logs and discards the
/// line and the stream continues. No input can make this panic.
pub fn decode_line(line: &str) -> Result<TelemetryLine, ProtocolError> {
    let line = line.trim();
    let payload = match strip_source_tag(line) {
        Some(payload) => payload,
        None => return Ok(TelemetryLine::Diagnostic),
    };

    let segments: Vec<&str> = payload.split('|').collect();
    if segments.len() < 3 {
        return Err(ProtocolError::DecodeFailure(format!(
            "expected 3 fields, got {}",
            segments.len()
        )));
    }

    // `Impuls @ <t> ms | širina: <w> µs | sledeći razmak: <g> ms`
    // Extra trailing segments are ignored, matching the firmware's own
    // tolerance for appended text.
    let device_timestamp_ms = int_after(segments[0], '@')?;
    let width_us = int_after(segments[1], ':')?;
    let next_gap_ms = int_after(segments[2], ':')?;

    Ok(TelemetryLine::Pulse(PulseEvent {
        device_timestamp_ms,
        width_us,
        next_gap_ms,
        received_at: Instant::now(),
    }))
}

/// Locate the pulse payload, skipping one optional `tag:` prefix.
fn strip_source_tag(line: &str) -> Option<&str> {
    if line.starts_with(PULSE_MARKER) {
        return Some(line);
    }
    if let Some((_tag, rest)) = line.split_once(':') {
        let rest = rest.trim_start();
        if rest.starts_with(PULSE_MARKER) {
            return Some(rest);
        }
    }
    None
}

/// First whitespace-delimited integer token after `sep` in `segment`.
fn int_after(segment: &str, sep: char) -> Result<i64, ProtocolError> {
    let (_, rest) = segment
        .split_once(sep)
        .ok_or_else(|| ProtocolError::DecodeFailure(format!("missing '{sep}' in {segment:?}")))?;
    let token = rest.split_whitespace().next().ok_or_else(|| {
        ProtocolError::DecodeFailure(format!("missing value after '{sep}' in {segment:?}"))
    })?;
    token
        .parse::<i64>()
        .map_err(|_| ProtocolError::DecodeFailure(format!("non-integer token {token:?}")))
}

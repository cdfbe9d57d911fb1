//! Generator Serial Protocol
//!
//! Implements the line-oriented ASCII protocol spoken by the aperiodic pulse
//! generator firmware: one configuration command going out, one telemetry
//! line per emitted pulse coming back.

pub mod command;
mod error;
pub mod serial;
pub mod stream;
pub mod telemetry;

pub use command::ParameterSet;
pub use error::ProtocolError;
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};
pub use stream::{Channel, SerialChannel};
pub use telemetry::{decode_line, PulseEvent, TelemetryLine};

/// Default baud rate for the generator link
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout per attempt in milliseconds.
/// Also bounds how long a disconnect waits for the reader to notice.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

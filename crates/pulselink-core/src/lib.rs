//! # PulseLink Core Library
//!
//! Core functionality for the PulseLink pulse-generator control software.
//!
//! This library provides:
//! - Command encoding and telemetry decoding for the generator's ASCII protocol
//! - Serial session management with a background telemetry reader
//! - Live pulse statistics (cumulative and sliding-window)
//! - Pulse event logging and CSV export
//! - A demo device that simulates the firmware for hardware-free testing
//!
//! ## Example
//!
//! ```rust,ignore
//! use pulselink_core::{protocol::ParameterSet, session::Session};
//!
//! let (mut session, events) = Session::new(Default::default());
//! session.connect("/dev/ttyACM0")?;
//! session.send_parameters(&ParameterSet::new(2.0, 50, 1000)?)?;
//!
//! for event in events.iter() {
//!     println!("{event:?}");
//! }
//! ```

#![warn(missing_docs)]

pub mod datalog;
pub mod demo;
pub mod protocol;
pub mod session;
pub mod stats;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::datalog::{EventLog, PulseRecord};
    pub use crate::demo::DemoDevice;
    pub use crate::protocol::{
        decode_line, ParameterSet, ProtocolError, PulseEvent, TelemetryLine,
    };
    pub use crate::session::{Session, SessionConfig, SessionEvent, SessionState};
    pub use crate::stats::{PulseStats, StatsSnapshot};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Transport abstraction
//!
//! The session and the telemetry reader talk to the generator through the
//! [`Channel`] trait, so the same logic runs over a real serial port, the
//! demo device or a scripted test double.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// A byte-stream link to the generator.
///
/// Implementations must support cloning into independent handles: the
/// session writes commands through one handle while the reader thread blocks
/// on another, so neither path can corrupt the other's I/O.
pub trait Channel: Read + Write + Send {
    /// Set the timeout for blocking reads
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard any unread input
    fn clear_input(&mut self) -> io::Result<()>;

    /// Clone into an independent handle over the same link
    fn try_clone(&self) -> io::Result<Box<dyn Channel>>;
}

/// Serial port implementation of [`Channel`]
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an already-open serial port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Channel for SerialChannel {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn try_clone(&self) -> io::Result<Box<dyn Channel>> {
        let port = self
            .port
            .try_clone()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Box::new(SerialChannel::new(port)))
    }
}

//! Serial port handling
//!
//! Low-level port access for the generator link: enumeration, opening and
//! 8N1 configuration.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;

use tracing::debug;

use super::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb) => (Some(usb.vid), Some(usb.pid), usb.product),
            _ => (None, None, None),
        };
        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// Sort key placing ttyACM* first, then ttyUSB*, then everything else,
/// numeric suffixes in order. Arduino-class boards enumerate as ttyACM.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let base = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "ttyACM"), (1, "ttyUSB")] {
        if let Some(suffix) = base.strip_prefix(prefix) {
            let num = suffix.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, base.to_string());
        }
    }
    (2, 0, base.to_string())
}

/// List available serial ports in deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// Open a serial port for the generator link.
///
/// The read timeout is one second per attempt; hitting it is normal between
/// pulses and the reader simply polls again.
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
    serialport::new(name, baud)
        .timeout(Duration::from_millis(DEFAULT_READ_TIMEOUT_MS))
        .open()
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))
}

/// Configure a serial port for the generator link (8N1, no flow control).
///
/// DTR is held high: opening the port toggles DTR, which resets Arduino
/// boards into the bootloader; keeping it asserted leaves the firmware
/// running.
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;

    if let Err(e) = port.write_data_terminal_ready(true) {
        debug!(error = %e, "failed to assert DTR, continuing");
    }

    Ok(())
}

/// Clear the serial port buffers
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::Transport(e.to_string()))
}

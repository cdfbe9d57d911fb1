//! Parameter commands
//!
//! Builds the configuration command understood by the generator firmware.
//! The wire format is a single ASCII line:
//! `LAMBDA:<hz>;MINW:<us>;MAXW:<us>\n`.

use serde::Serialize;

use super::ProtocolError;

/// Generator configuration: pulse rate and pulse width bounds.
///
/// Validated at construction, so every existing value satisfies
/// `min_width_us <= max_width_us` and carries a positive, finite rate.
/// A fresh set is built per send attempt; the firmware applies it whole,
/// never field by field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterSet {
    lambda_hz: f64,
    min_width_us: u32,
    max_width_us: u32,
}

impl ParameterSet {
    /// Validate and build a parameter set.
    ///
    /// Fails with [`ProtocolError::InvalidParameters`] when the rate is not a
    /// positive finite number or the width bounds are inverted.
    pub fn new(
        lambda_hz: f64,
        min_width_us: u32,
        max_width_us: u32,
    ) -> Result<Self, ProtocolError> {
        if !lambda_hz.is_finite() || lambda_hz <= 0.0 {
            return Err(ProtocolError::InvalidParameters(format!(
                "lambda must be a positive rate in Hz, got {lambda_hz}"
            )));
        }
        if min_width_us > max_width_us {
            return Err(ProtocolError::InvalidParameters(format!(
                "min width {min_width_us} us exceeds max width {max_width_us} us"
            )));
        }
        Ok(Self {
            lambda_hz,
            min_width_us,
            max_width_us,
        })
    }

    /// Mean pulse rate in Hz
    pub fn lambda_hz(&self) -> f64 {
        self.lambda_hz
    }

    /// Minimum pulse width in microseconds
    pub fn min_width_us(&self) -> u32 {
        self.min_width_us
    }

    /// Maximum pulse width in microseconds
    pub fn max_width_us(&self) -> u32 {
        self.max_width_us
    }

    /// Serialize to the newline-terminated wire command.
    ///
    /// Pure function; the bytes are handed to the session's write path as
    /// one atomic frame.
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "LAMBDA:{};MINW:{};MAXW:{}\n",
            self.lambda_hz, self.min_width_us, self.max_width_us
        )
        .into_bytes()
    }
}

impl Default for ParameterSet {
    /// Firmware power-on defaults: 2 Hz, widths 50 to 1000 microseconds.
    fn default() -> Self {
        Self {
            lambda_hz: 2.0,
            min_width_us: 50,
            max_width_us: 1000,
        }
    }
}

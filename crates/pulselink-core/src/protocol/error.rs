//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the generator
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("not connected to generator")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed telemetry line: {0}")]
    DecodeFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

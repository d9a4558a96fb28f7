use std::time::Duration;

use thiserror::Error;

/// A notification that could not be turned into a telemetry frame.
///
/// Always local to the one buffer; the link and command queue are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error("frame too long: {len} bytes")]
    FrameTooLong { len: usize },

    #[error("unsupported unit byte {0:#04x}")]
    InvalidUnitByte(u8),

    #[error("unsupported {field} sign byte {byte:#04x}")]
    InvalidSignByte { field: &'static str, byte: u8 },

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Failures reported by the BLE link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("BLE link error: {0}")]
    Link(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<btleplug::Error> for TransportError {
    fn from(error: btleplug::Error) -> Self {
        match error {
            btleplug::Error::DeviceNotFound => TransportError::DeviceNotFound(error.to_string()),
            btleplug::Error::TimedOut(duration) => TransportError::Timeout(duration),
            other => TransportError::Link(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{setting} must be between {min} and {max}, got {value}")]
    OutOfRange {
        setting: &'static str,
        value: u8,
        min: u8,
        max: u8,
    },

    #[error("scale is not connected")]
    NotConnected,

    #[error("setting not supported by this scale: {0}")]
    Unsupported(&'static str),
}

pub type Result<T, E = ScaleError> = std::result::Result<T, E>;

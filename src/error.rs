//! Error types for radar decoding operations

use crate::types::Dialect;
use thiserror::Error;

/// Main error type for radar decoding operations
///
/// Only conditions that abort opening a file live here. Soft inconsistencies
/// found while assembling a scan are reported as
/// [`ScanWarning`](crate::volume::ScanWarning)s instead.
#[derive(Error, Debug)]
pub enum RadarError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid radar format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported {dialect} file: {field} = {value}")]
    UnsupportedFormat {
        dialect: Dialect,
        field: &'static str,
        value: u32,
    },

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Volume scan has mixed doppler resolutions")]
    MixedDopplerResolution,

    #[error("Volume scan assembly was cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Specialized Result type for radar decoding operations
pub type Result<T> = std::result::Result<T, RadarError>;

impl From<serde_json::Error> for RadarError {
    fn from(err: serde_json::Error) -> Self {
        RadarError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for RadarError {
    fn from(err: tokio::task::JoinError) -> Self {
        RadarError::Task(err.to_string())
    }
}

impl RadarError {
    /// True when the error comes from running out of input bytes
    pub fn is_eof(&self) -> bool {
        matches!(self, RadarError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

//! Error types for the SoBoss system
//!
//! This module defines all error types used throughout the crate.
//!
//! The variants fall into three families:
//! - **Configuration** (`Config`, `InvalidInput`, `NotFound`): raised before any
//!   device I/O, abort only the current action or action list
//! - **Device operation** (`Device`, `Probe`): caught at the individual
//!   endpoint or probe call, logged, never propagated past that boundary
//! - **Scheduler** (`Scheduler`): a failed tick or reload pass, logged at the
//!   round boundary

use thiserror::Error;

/// Result type alias for SoBoss operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the SoBoss system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid enumerated value in an action list
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown identifier referenced by configuration
    #[error("Not found: {0}")]
    NotFound(String),

    /// Playback endpoint call failed
    #[error("Device error ({device}): {message}")]
    Device {
        /// Endpoint identifier
        device: String,
        /// Error message
        message: String,
    },

    /// Reachability probe failed
    #[error("Probe error: {0}")]
    Probe(String),

    /// A tick or reload pass failed
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// I/O errors (config files, probe process)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an endpoint operation error
    pub fn device(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Device {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a probe error
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a scheduler error
    pub fn scheduler(msg: impl Into<String>) -> Self {
        Self::Scheduler(msg.into())
    }

    /// Whether this error is a configuration error
    ///
    /// Configuration errors are detected before any device I/O is issued.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidInput(_) | Self::NotFound(_)
        )
    }

    /// Whether this error came from a device or probe operation
    pub fn is_device_operation(&self) -> bool {
        matches!(self, Self::Device { .. } | Self::Probe(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

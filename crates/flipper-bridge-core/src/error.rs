//! Error types shared by every bridge component.
//!
//! None of these are fatal to the process. Handlers convert them into a
//! single `[ERROR] <message>` frame, so the `Display` text is what the host
//! device sees.

use std::time::Duration;
use thiserror::Error;

/// Errors produced while handling one command.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed command payload.
    #[error("{0}")]
    Parse(String),

    /// No response within the fixed wait window.
    #[error("Request timed out after {} ms", .0.as_millis())]
    TransportTimeout(Duration),

    /// A chunk or body write failed part way through a message.
    #[error("Write failed after {sent} of {total} bytes: {reason}")]
    TransportWrite {
        sent: usize,
        total: usize,
        reason: String,
    },

    /// HTTP, WebSocket or Wi-Fi connect failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Credentials or other input out of bounds.
    #[error("{0}")]
    Validation(String),

    /// Settings could not be loaded or persisted.
    #[error("Settings storage failed: {0}")]
    Storage(#[from] ConfigError),

    /// The serial link itself failed.
    #[error("Serial I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the error means the serial link is gone.
    ///
    /// Only these stop the dispatcher; everything else becomes an error frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Io(_))
    }
}

/// Errors that can occur during settings storage operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The requested settings were never saved.
    #[error("Configuration not found: {0}")]
    NotFound(String),

    /// Failed to read settings.
    #[error("Read error: {0}")]
    ReadError(String),

    /// Failed to write settings.
    #[error("Write error: {0}")]
    WriteError(String),

    /// Stored data could not be decoded.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

//! Error types for rhx-tcp-client.

use thiserror::Error;

/// Main error type for all client operations.
///
/// Integrity-marker mismatches in the data streams are deliberately absent:
/// they are logged and counted by the decoders, never returned.
#[derive(Debug, Error)]
pub enum RhxError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (configuration files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (short decode buffer, malformed command reply, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A background read task panicked or failed to join.
    #[error("Task error: {0}")]
    Task(String),

    /// Connecting to a controller port did not complete in time.
    #[error("Timed out connecting to {addr}")]
    ConnectTimeout {
        /// Address that was being dialed.
        addr: String,
    },
}

/// Result type alias using RhxError.
pub type Result<T> = std::result::Result<T, RhxError>;

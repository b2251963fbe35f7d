//! Error types for the control layer
use mediasync_core::SyncError;
use thiserror::Error;

/// Control layer errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// Rejection from the playback state machine
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// HTTP server error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Push-channel message that could not be understood
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Connection to the server was lost or never established
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Server answered a command with an error
    #[error("Rejected by server ({status}): {code}: {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Wire error code
        code: String,
        /// Human-readable reason
        message: String,
    },

    /// HTTP client error
    #[cfg(feature = "client")]
    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),

    /// WebSocket client error
    #[cfg(feature = "client")]
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),
}

impl ControlError {
    /// Stable machine-readable code
    pub fn code(&self) -> &str {
        match self {
            ControlError::Sync(e) => e.code(),
            ControlError::InvalidMessage(_) => "invalid-message",
            ControlError::TransportUnavailable(_) => "transport-unavailable",
            ControlError::Rejected { code, .. } => code,
            _ => "internal",
        }
    }
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;

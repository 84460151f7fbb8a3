//! Error types for the toolbridge SDK.

use toolbridge_core::{ErrorCode, RpcError};

/// Result type for SDK operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Error types that can occur when using the toolbridge SDK.
///
/// A tool that ran and failed is *not* an error here: `call_tool` reports it
/// as the failure outcome of an `InvocationResult`. These variants mean the
/// call never completed.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No transport configured.
    #[error("No transport configured")]
    TransportUnavailable,

    /// Connection-level fault: socket closed, pipe broken, timeout.
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP exchange returned a non-success status.
    #[error("HTTP error (status {status}): {message}")]
    Http { status: u16, message: String },

    /// Server answered with an error envelope where a result was required.
    #[error("Remote error: {0}")]
    Remote(RpcError),

    /// Response could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    /// True when the call never reached a result (as opposed to a tool or
    /// protocol failure reported by the server).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportUnavailable | Self::Transport(_) | Self::Http { .. }
        )
    }

    /// Wire-level code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Remote(e) => e.code,
            Self::Protocol(_) | Self::Json(_) => ErrorCode::ParseError,
            _ => ErrorCode::TransportError,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Protocol(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

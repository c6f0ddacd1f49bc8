//! Error types for spotui

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for spotui operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in spotui
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Secure random source unavailable: {0}")]
    SecureRandomUnavailable(String),

    #[error("Failed to start callback listener on {addr}: {source}")]
    ListenerStartFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Callback listener error: {0}")]
    Listener(String),

    #[error("Authorization denied by provider: {0}")]
    Denied(String),

    #[error("State mismatch on callback: possible CSRF attack")]
    CsrfRejected,

    #[error("Callback did not include an authorization code")]
    NoCode,

    #[error("Timed out after {0:?} waiting for authorization")]
    Timeout(Duration),

    #[error("Authorization cancelled")]
    Cancelled,

    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Token file error at {path:?}: {source}")]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Flow-level failures end the current attempt; the user may simply retry.
    pub fn is_retryable_flow_failure(&self) -> bool {
        matches!(
            self,
            Error::Denied(_)
                | Error::CsrfRejected
                | Error::NoCode
                | Error::Timeout(_)
                | Error::Cancelled
                | Error::Listener(_)
        )
    }
}

//! Error types for cmdlink.

use thiserror::Error;

/// Main error type for cmdlink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Session with the given ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Command execution timeout.
    #[error("command execution timeout")]
    Timeout,

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// Malformed frame or undecodable message on the control channel.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A control frame field exceeded the maximum size.
    #[error("frame field too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// File transfer subchannel failure.
    #[error("transfer error: {0}")]
    Transfer(String),

    /// Transfer header carried a size that is not an integer.
    #[error("malformed transfer size: {0:?}")]
    MalformedSize(String),

    /// Declared or received transfer size exceeds the configured limit.
    #[error("transfer of {size} bytes exceeds limit of {max} bytes")]
    TransferTooLarge { size: u64, max: u64 },

    /// Peer closed the connection or the network failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket client failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// TLS setup failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Target address could not be turned into an endpoint.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl Error {
    /// Whether the session can answer with an error response and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Json(_))
    }
}

/// Convenience Result type for cmdlink operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for peer-rpc.

use thiserror::Error;

/// Main error type for all peer-rpc operations.
#[derive(Debug, Error)]
pub enum PeerRpcError {
    /// Service name or port rejected by `listen`.
    #[error("Invalid service identity: {0}")]
    InvalidIdentity(String),

    /// Builder configuration rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `listen` called on a server that is already listening.
    #[error("Server is already listening")]
    AlreadyListening,

    /// The server has been closed and cannot be restarted.
    #[error("Server is closed")]
    Closed,

    /// The transport refused to start.
    #[error("Transport failed to start: {0}")]
    StartFailed(String),

    /// The directory client could not announce the service.
    #[error("Announce failed: {0}")]
    Announce(String),

    /// A request handler reported a failure.
    #[error("Handler error: {0}")]
    Handler(String),

    /// The other side of the transport went away.
    #[error("Connection closed")]
    ConnectionClosed,

    /// JSON conversion of a payload failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using PeerRpcError.
pub type Result<T> = std::result::Result<T, PeerRpcError>;

//! Error types for the transport seam.

use thiserror::Error;

/// Errors surfaced by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation requires a live connection and there is none.
    #[error("transport not connected")]
    NotConnected,

    /// The connection attempt was rejected outright.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The wire layer rejected or lost the outbound message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Anything else the wire layer reports.
    #[error("transport error: {0}")]
    Other(String),
}

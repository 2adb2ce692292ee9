//! Session error types.

use herald_core::DeliverError;
use thiserror::Error;
use transport::TransportError;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The account is not in the Online state.
    #[error("account {0} is not online")]
    NotOnline(String),

    /// The transport failed the operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<SessionError> for DeliverError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotOnline(address) => DeliverError::NotOnline(address),
            SessionError::Transport(e) => DeliverError::Transport(e.to_string()),
        }
    }
}

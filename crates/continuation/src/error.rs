//! Continuation error types.

use herald_core::{DeliverError, RepoError};
use thiserror::Error;

/// Errors from one continuation pass.
///
/// Advisor failures never show up here: the engine treats them as an
/// implicit stop signal instead of an error.
#[derive(Debug, Error)]
pub enum ContinuationError {
    /// No live sender is registered for the account owning the thread.
    #[error("no live sender for account {0}")]
    NoSender(String),

    /// The follow-up could not be delivered.
    #[error("delivery failed: {0}")]
    Deliver(#[from] DeliverError),

    /// The repository failed.
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),

    /// The extraction result could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

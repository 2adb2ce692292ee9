//! Orchestrator error types.

use herald_core::RepoError;
use thiserror::Error;

/// Errors from orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// An account with this address is already registered.
    #[error("account already registered: {0}")]
    AccountExists(String),

    /// No account with this address is registered.
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// The account is banned and will never be reconnected.
    #[error("account is banned: {0}")]
    AccountBanned(String),

    /// A campaign cannot start because no eligible account is online.
    #[error("no accounts online")]
    NoAccountsOnline,

    /// The repository failed.
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),
}

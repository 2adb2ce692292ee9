//! The persistence seam.
//!
//! Everything the engine stores durably goes through [`Repository`]. The
//! engine itself is single-process and in-memory; persistence exists so
//! state survives a restart (accounts to reconnect, campaigns to resume,
//! conversations to reconcile). See the `store` crate for the SQLite and
//! in-memory implementations.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Account, AccountStatus, Campaign, CampaignStatus, ConversationMessage, Lead,
};

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Record already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Backend failure (connection, query, I/O).
    #[error("storage error: {0}")]
    Storage(String),

    /// Payload (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepoError>;

/// Fresh campaign counters returned by the atomic increment operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignCounters {
    /// Successful sends.
    pub sent: u64,
    /// Failed sends.
    pub errors: u64,
    /// Total leads.
    pub total: u64,
}

impl CampaignCounters {
    /// Whether every lead has reached a terminal send outcome.
    pub fn finished(&self) -> bool {
        self.total > 0 && self.sent + self.errors >= self.total
    }
}

/// CRUD plus the handful of queries the engine needs, safe to call
/// concurrently from multiple queues and sessions.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- accounts ---

    /// Insert or replace an account record.
    async fn upsert_account(&self, account: &Account) -> RepoResult<()>;

    /// Fetch one account by address.
    async fn account(&self, address: &str) -> RepoResult<Account>;

    /// List all registered accounts.
    async fn accounts(&self) -> RepoResult<Vec<Account>>;

    /// Persist an account's connection status.
    async fn update_account_status(&self, address: &str, status: AccountStatus) -> RepoResult<()>;

    /// Drop the stored credentials handle (account must re-pair).
    async fn clear_account_credentials(&self, address: &str) -> RepoResult<()>;

    /// Remove an account record.
    async fn remove_account(&self, address: &str) -> RepoResult<()>;

    // --- campaigns ---

    /// Insert a new campaign.
    async fn create_campaign(&self, campaign: &Campaign) -> RepoResult<()>;

    /// Fetch one campaign by id.
    async fn campaign(&self, id: &str) -> RepoResult<Campaign>;

    /// List all campaigns.
    async fn campaigns(&self) -> RepoResult<Vec<Campaign>>;

    /// Persist a campaign's lifecycle status.
    async fn set_campaign_status(&self, id: &str, status: CampaignStatus) -> RepoResult<()>;

    /// Atomically bump the sent counter; returns the fresh counters.
    async fn increment_sent(&self, id: &str) -> RepoResult<CampaignCounters>;

    /// Atomically bump the error counter; returns the fresh counters.
    async fn increment_errors(&self, id: &str) -> RepoResult<CampaignCounters>;

    // --- leads ---

    /// Bulk-insert leads and grow the owning campaign's total.
    async fn add_leads(&self, leads: &[Lead]) -> RepoResult<()>;

    /// Pending leads of a campaign, oldest first.
    async fn pending_leads(&self, campaign_id: &str) -> RepoResult<Vec<Lead>>;

    /// Mark a lead sent (stamps `sent_at`).
    async fn mark_lead_sent(&self, lead_id: &str) -> RepoResult<()>;

    /// Mark a lead failed with the error message.
    async fn mark_lead_failed(&self, lead_id: &str, error: &str) -> RepoResult<()>;

    /// Mark a lead skipped (dropped without a send attempt).
    async fn mark_lead_skipped(&self, lead_id: &str, reason: &str) -> RepoResult<()>;

    /// Mark the most recently contacted lead for this contact as replied.
    /// Returns the lead touched, if any.
    async fn mark_lead_replied(&self, contact: &str) -> RepoResult<Option<Lead>>;

    /// Find the most recent lead targeting this contact.
    async fn lead_for_contact(&self, contact: &str) -> RepoResult<Option<Lead>>;

    /// Store the structured extraction result against a lead.
    async fn store_lead_analysis(
        &self,
        lead_id: &str,
        analysis: &serde_json::Value,
    ) -> RepoResult<()>;

    /// Read back a lead's stored extraction result, if any.
    async fn lead_analysis(&self, lead_id: &str) -> RepoResult<Option<serde_json::Value>>;

    // --- conversations ---

    /// Append a message to a contact's thread.
    async fn append_message(&self, message: &ConversationMessage) -> RepoResult<()>;

    /// Full thread for a contact, oldest first.
    async fn conversation(&self, contact: &str) -> RepoResult<Vec<ConversationMessage>>;

    /// Re-key history stored under an alias to the resolved contact.
    /// Returns how many messages moved.
    async fn migrate_conversation(&self, from_alias: &str, to_contact: &str) -> RepoResult<u64>;

    /// The most recent contact this account sent to that has no later
    /// inbound message under its own address. Best-effort input for alias
    /// inference.
    async fn latest_unanswered_outbound(&self, account: &str) -> RepoResult<Option<String>>;

    /// Contacts whose thread ends with an inbound message and is not closed.
    /// Feed for the continuation reconciliation sweep.
    async fn conversations_awaiting_reply(&self) -> RepoResult<Vec<String>>;

    /// Mark a conversation closed (no further automated follow-ups).
    async fn set_conversation_closed(&self, contact: &str) -> RepoResult<()>;

    /// Whether a conversation has been closed.
    async fn is_conversation_closed(&self, contact: &str) -> RepoResult<bool>;
}

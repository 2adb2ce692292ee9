//! Core types and trait seams for Herald.
//!
//! This crate defines the shared vocabulary of the campaign engine:
//!
//! - Entity models and their status enums ([`Account`], [`Campaign`],
//!   [`Lead`], [`ConversationMessage`], [`QueueItem`])
//! - [`Repository`] - the persistence seam consumed by every component
//! - [`Advisor`] - the AI conversation-continuation capability
//! - [`AccountSender`] - the "send through this account" seam between the
//!   queues/continuation engine and a live session
//! - [`EventBus`] / [`Event`] - the fire-and-forget broadcast sink external
//!   observers (UI, logs) subscribe to
//! - [`DailyLedger`] - per-account daily send-cap bookkeeping
//!
//! No component owns ambient globals: the orchestrator constructs one of
//! each shared piece and hands references down.

mod advisor;
mod event;
mod ledger;
mod models;
mod repo;
mod sender;

pub use advisor::{Advice, Advisor, AdvisorError, Transcript, TranscriptEntry};
pub use event::{Event, EventBus};
pub use ledger::DailyLedger;
pub use models::{
    Account, AccountStatus, Campaign, CampaignStatus, ContinuationCriteria, ConversationMessage,
    Direction, Lead, LeadStatus, MessageTemplate, QueueItem, QueueState,
};
pub use repo::{CampaignCounters, RepoError, RepoResult, Repository};
pub use sender::{AccountSender, DeliverError, DeliveryAck};

// Re-export async_trait so implementors don't need a separate dependency.
pub use async_trait::async_trait;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

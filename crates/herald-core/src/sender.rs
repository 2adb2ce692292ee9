//! The seam between dispatchers and a live account session.
//!
//! Send queues and the continuation engine don't talk to the transport
//! directly; they go through [`AccountSender`], which a session implements.
//! This keeps "is the account usable" and "deliver this text" in one place
//! and makes both dispatchers trivially testable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Acknowledgement returned by the transport for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAck {
    /// Transport-assigned message id.
    pub id: String,
}

impl DeliveryAck {
    /// Create an ack with the given transport message id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Errors delivering through an account.
#[derive(Debug, Error)]
pub enum DeliverError {
    /// The account is not in the Online state.
    #[error("account {0} is not online")]
    NotOnline(String),

    /// The transport rejected or failed the send.
    #[error("send failed: {0}")]
    Transport(String),
}

/// Send capability of one live account.
#[async_trait]
pub trait AccountSender: Send + Sync {
    /// Stable contact address of the sending identity.
    fn address(&self) -> &str;

    /// Whether the account is currently Online.
    fn is_online(&self) -> bool;

    /// Deliver a text message. Fails with [`DeliverError::NotOnline`] when
    /// the account is not online.
    async fn send(&self, target: &str, text: &str) -> Result<DeliveryAck, DeliverError>;

    /// Toggle the typing indicator towards a contact. Best-effort; failures
    /// are for the caller to ignore.
    async fn send_typing(&self, target: &str, started: bool) -> Result<(), DeliverError>;
}

//! Chat transport capability seam.
//!
//! The wire-level chat protocol (and its cryptography) lives outside Herald.
//! This crate defines what the engine consumes from it:
//!
//! - [`Transport`] - connect/disconnect/send plus a typed event stream
//! - [`TransportEvent`] - pairing challenges, connection state, inbound
//!   messages and contact-sync notices
//! - [`CloseReason`] - the close codes the session state machine reacts to
//! - [`TransportFactory`] - builds a transport for an account at
//!   registration or restart-recovery time
//! - [`MockTransport`] / [`MockFactory`] - scriptable in-memory transport
//!   used by tests and demos
//!
//! # Example
//!
//! ```
//! use transport::{MockTransport, Transport, TransportEvent};
//!
//! # async fn example() -> Result<(), transport::TransportError> {
//! let transport = MockTransport::new();
//! let mut events = transport.subscribe();
//!
//! transport.connect().await?;
//! assert!(matches!(events.recv().await, Ok(TransportEvent::Established)));
//!
//! let ack = transport.send_text("+15550001111", "hello").await?;
//! assert!(!ack.id.is_empty());
//! # Ok(())
//! # }
//! ```

mod error;
mod mock;
mod types;

pub use error::TransportError;
pub use mock::{MockFactory, MockTransport, SentRecord};
pub use types::{CloseReason, PairingKind, TransportEvent};

use std::sync::Arc;

use async_trait::async_trait;
use herald_core::{Account, DeliveryAck};
use tokio::sync::broadcast;

/// Connect/send capability of one account's wire connection.
///
/// `connect` starts the connection attempt; progress (pairing challenge,
/// established, closed) arrives on the event stream. Implementations must
/// keep `subscribe` cheap and allow multiple subscribers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin connecting. Completion is signalled by [`TransportEvent::Established`]
    /// or [`TransportEvent::Closed`] on the event stream.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Tear the connection down without emitting a close event storm.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Deliver a text message to a contact.
    async fn send_text(&self, target: &str, text: &str) -> Result<DeliveryAck, TransportError>;

    /// Toggle the typing indicator towards a contact.
    async fn send_typing(&self, target: &str, started: bool) -> Result<(), TransportError>;

    /// Lightweight presence ping used as a keep-alive heartbeat.
    async fn send_presence(&self) -> Result<(), TransportError>;

    /// Subscribe to the typed event stream.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Builds transports for accounts.
///
/// The orchestrator has no knowledge of wire protocols; on account
/// registration and on restart recovery it asks the factory for the
/// account's transport.
pub trait TransportFactory: Send + Sync {
    /// Create (or reuse) the transport for this account.
    fn create(&self, account: &Account) -> Arc<dyn Transport>;
}

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

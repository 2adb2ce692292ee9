//! Per-account connection lifecycle.
//!
//! One [`Session`] per account drives the state machine
//! `Offline -> Initializing -> {QrPending | PairingPending} -> Online`, with
//! `Online -> Offline` on closes and the terminal `Online -> Banned` when the
//! platform blocks the account. The reconnect rules live in [`policy`] as a
//! pure close-reason-to-action mapping:
//!
//! - unauthorized: one 5 s retry, then credentials are cleared;
//! - forbidden: banned, never reconnected;
//! - superseded: offline, never reconnected;
//! - restart-required: reconnect after about 2 s;
//! - anything else: exponential backoff, 5 s doubling up to 60 s, during
//!   which the persisted status keeps its last connected value so a process
//!   restart mid-backoff still reconnects the account.
//!
//! While online the session sends a presence ping every 4 minutes as a
//! keep-alive; ping failures are suppressed and retried on the next tick.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use herald_core::EventBus;
//! use session::Session;
//! use store::MemoryRepository;
//! use transport::MockTransport;
//!
//! # async fn example() {
//! let transport = Arc::new(MockTransport::new());
//! let repo = Arc::new(MemoryRepository::new());
//! let session = Arc::new(Session::with_defaults(
//!     "+15550001111",
//!     transport,
//!     repo,
//!     EventBus::new(),
//! ));
//!
//! session.start();
//! // ... transport emits Established, session goes Online ...
//! session.stop().await;
//! # }
//! ```

mod config;
mod error;
pub mod policy;
mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use policy::{close_action, CloseAction};
pub use session::Session;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

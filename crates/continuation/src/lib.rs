//! AI-driven conversation continuation with anti-spam safeguards.
//!
//! When a contact replies to a campaign message, the [`ContinuationEngine`]
//! asks an [`Advisor`](herald_core::Advisor) for the next message and either
//! sends it through the owning account or terminates the conversation. The
//! engine enforces its own safeguards regardless of what the advisor says:
//! one pass per contact at a time, a cooldown between automated sends, a
//! hard cap on follow-ups, and rejection of exact and near-duplicate
//! replies. Termination stores the advisor's extraction result against the
//! lead and closes the thread for good.
//!
//! A periodic reconciliation sweep re-drives conversations whose last
//! message is inbound, covering replies that arrived while the process was
//! down or before their alias was resolved.

mod config;
mod engine;
mod error;
mod similarity;

pub use config::ContinuationConfig;
pub use engine::ContinuationEngine;
pub use error::ContinuationError;
pub use similarity::{find_repeat, is_repeat, overlap};

/// Crate version, for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

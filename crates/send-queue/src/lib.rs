//! Per-account send queue.
//!
//! One [`SendQueue`] per account dispatches that account's share of
//! campaign sends, strictly in order, with a human-shaped pacing delay
//! before each send (see the `pacing` crate). The loop holds while the
//! account is offline, skips sends past the daily cap without burning the
//! lead, and decomposes every multi-second wait into short checkpoints so
//! a pause or stop takes effect within about a second.
//!
//! Queues don't talk to campaigns or other queues; the orchestrator feeds
//! them [`QueueItem`](herald_core::QueueItem)s and propagates campaign
//! control calls.

mod config;
mod queue;

pub use config::QueueConfig;
pub use queue::SendQueue;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

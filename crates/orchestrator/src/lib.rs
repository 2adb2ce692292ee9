//! Multi-account campaign orchestration for Herald.
//!
//! The [`Orchestrator`] owns one [`Session`](session::Session) and one
//! [`SendQueue`](send_queue::SendQueue) per account plus the shared pieces
//! every component needs (repository, event bus, alias resolver, daily
//! ledger, continuation engine), and coordinates campaigns across them.
//!
//! ```text
//!                          ORCHESTRATOR
//!   start_campaign ──▶ round-robin pending leads over online accounts
//!                            │
//!            ┌───────────────┼───────────────┐
//!            ▼               ▼               ▼
//!       SendQueue A     SendQueue B     SendQueue C      (human pacing)
//!            │               │               │
//!        Session A       Session B       Session C       (lifecycle)
//!            │               │               │
//!        transport       transport       transport
//!            ▲               ▲               ▲
//!            └── inbound pump per account ───┘
//!                  resolver → lead Replied → continuation engine
//! ```
//!
//! Restart recovery rebuilds this graph from persisted state: only accounts
//! that were `Online` are reconnected, with a random 15-30 s stagger per
//! account, and after a settle delay still-`Running` campaigns get their
//! remaining pending leads requeued.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use herald_core::{Campaign, EventBus, MessageTemplate};
//! use orchestrator::{Orchestrator, OrchestratorConfig};
//!
//! # async fn example(
//! #     repo: Arc<dyn herald_core::Repository>,
//! #     factory: Arc<dyn transport::TransportFactory>,
//! #     advisor: Arc<dyn herald_core::Advisor>,
//! # ) -> Result<(), orchestrator::OrchestratorError> {
//! let orchestrator = Arc::new(Orchestrator::new(
//!     repo,
//!     factory,
//!     advisor,
//!     EventBus::new(),
//!     OrchestratorConfig::default(),
//! ));
//! orchestrator.recover().await?;
//! orchestrator.spawn_sweeper();
//!
//! let campaign = Campaign::new("spring", MessageTemplate::single("Hi!"), 30, 90);
//! orchestrator.create_campaign(&campaign).await?;
//! orchestrator
//!     .import_leads(&campaign.id, &["+15550001111".to_string()])
//!     .await?;
//! orchestrator.start_campaign(&campaign.id, None).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod inbound;
mod orchestrator;

pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use orchestrator::{AccountOverview, Orchestrator};

/// Crate version, for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

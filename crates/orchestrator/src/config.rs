//! Orchestrator timing knobs.

use std::time::Duration;

use continuation::ContinuationConfig;
use send_queue::QueueConfig;
use session::SessionConfig;

/// Timing and sub-component configuration for the orchestrator.
///
/// Restart-recovery logins are staggered by a random increment drawn from
/// `[stagger_min, stagger_max]` per account so the host platform never sees
/// a burst of simultaneous logins from one operator. `settle_delay` is how
/// long recovery waits before re-populating queues from still-`Running`
/// campaigns, giving the staggered sessions time to come online.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Lower bound of the per-account reconnect stagger.
    pub stagger_min: Duration,
    /// Upper bound of the per-account reconnect stagger.
    pub stagger_max: Duration,
    /// Wait between starting recovery reconnects and requeueing campaigns.
    pub settle_delay: Duration,
    /// Configuration handed to every session.
    pub session: SessionConfig,
    /// Configuration handed to every send queue.
    pub queue: QueueConfig,
    /// Configuration for the continuation engine.
    pub continuation: ContinuationConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stagger_min: Duration::from_secs(15),
            stagger_max: Duration::from_secs(30),
            settle_delay: Duration::from_secs(60),
            session: SessionConfig::default(),
            queue: QueueConfig::default(),
            continuation: ContinuationConfig::default(),
        }
    }
}

//! Queue tuning knobs.

use std::time::Duration;

/// Timing and quota configuration for a send queue.
///
/// Production values are the defaults; tests shrink the durations.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum sends per account per UTC day.
    pub daily_cap: u32,
    /// How long to hold the head item while its account is offline before
    /// re-checking.
    pub offline_hold: Duration,
    /// Granularity at which long waits re-check the stop/pause flags. A
    /// stop takes effect within one checkpoint, not after the full wait.
    pub checkpoint: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            daily_cap: 100,
            offline_hold: Duration::from_secs(30),
            checkpoint: Duration::from_secs(1),
        }
    }
}

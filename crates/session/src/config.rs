//! Timing configuration for the session lifecycle.

use std::time::Duration;

/// Timing knobs for a session. Defaults match production behaviour; tests
/// shrink them to keep lifecycle scenarios fast.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay before the single retry after a first unauthorized close.
    pub unauthorized_retry: Duration,
    /// Delay before reconnecting after a planned transport restart.
    pub restart_delay: Duration,
    /// First reconnect backoff step for unclassified closes.
    pub backoff_base: Duration,
    /// Upper bound on the reconnect backoff.
    pub backoff_cap: Duration,
    /// Presence ping period while the account is online.
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            unauthorized_retry: Duration::from_secs(5),
            restart_delay: Duration::from_secs(2),
            backoff_base: Duration::from_millis(5000),
            backoff_cap: Duration::from_millis(60_000),
            heartbeat_interval: Duration::from_secs(240),
        }
    }
}

impl SessionConfig {
    /// Backoff delay for the given attempt count: `base * 2^attempts`,
    /// capped at `backoff_cap`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let base = self.backoff_base.as_millis() as u64;
        let cap = self.backoff_cap.as_millis() as u64;
        let shift = attempts.min(16);
        Duration::from_millis(base.saturating_mul(1u64 << shift).min(cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = SessionConfig::default();
        let delays: Vec<u64> = (0..5)
            .map(|attempts| config.backoff(attempts).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![5000, 10_000, 20_000, 40_000, 60_000]);
    }

    #[test]
    fn test_backoff_stays_capped_for_large_attempt_counts() {
        let config = SessionConfig::default();
        assert_eq!(config.backoff(20), Duration::from_millis(60_000));
        assert_eq!(config.backoff(u32::MAX), Duration::from_millis(60_000));
    }
}

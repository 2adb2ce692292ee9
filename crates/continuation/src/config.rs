//! Continuation engine tuning.

use std::time::Duration;

/// Tuning knobs for the continuation engine.
#[derive(Debug, Clone)]
pub struct ContinuationConfig {
    /// Minimum gap between two automated follow-ups to the same contact.
    pub cooldown: Duration,
    /// How often the reconciliation sweep re-scans waiting conversations.
    pub sweep_interval: Duration,
    /// Gap between two conversations driven by one sweep pass.
    pub sweep_spacing: Duration,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(300),
            sweep_spacing: Duration::from_secs(5),
        }
    }
}

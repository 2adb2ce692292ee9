//! Close-reason policy.
//!
//! Every transport close maps to exactly one [`CloseAction`]; the session
//! task executes it. Keeping the mapping a pure function makes the reconnect
//! rules testable without timers or a live transport.

use std::time::Duration;

use herald_core::AccountStatus;
use transport::CloseReason;

use crate::config::SessionConfig;

/// What a session does after the transport reports a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Try the connection again after `delay`. `persist_status` controls
    /// whether the Initializing status shown during the wait is also written
    /// through to the repository; leaving the persisted value at its last
    /// connected state makes a process restart during the wait reconnect the
    /// account instead of treating it as cold.
    Reconnect {
        delay: Duration,
        persist_status: bool,
    },

    /// Give up on this connection and settle on a final status.
    Settle {
        status: AccountStatus,
        clear_credentials: bool,
    },
}

/// Decide what a close event means.
///
/// `unauthorized_strikes` counts consecutive unauthorized closes including
/// this one; `attempts` is the reconnect counter before this close.
pub fn close_action(
    reason: CloseReason,
    unauthorized_strikes: u32,
    attempts: u32,
    config: &SessionConfig,
) -> CloseAction {
    match reason {
        // A single unauthorized close can be a spurious credential expiry;
        // retry once before concluding the pairing is gone.
        CloseReason::Unauthorized if unauthorized_strikes < 2 => CloseAction::Reconnect {
            delay: config.unauthorized_retry,
            persist_status: true,
        },
        CloseReason::Unauthorized => CloseAction::Settle {
            status: AccountStatus::Offline,
            clear_credentials: true,
        },
        CloseReason::Forbidden => CloseAction::Settle {
            status: AccountStatus::Banned,
            clear_credentials: false,
        },
        // Another device logged in as this identity; reconnecting would just
        // fight it.
        CloseReason::Superseded => CloseAction::Settle {
            status: AccountStatus::Offline,
            clear_credentials: false,
        },
        CloseReason::RestartRequired => CloseAction::Reconnect {
            delay: config.restart_delay,
            persist_status: true,
        },
        CloseReason::Other { .. } => CloseAction::Reconnect {
            delay: config.backoff(attempts),
            persist_status: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_unauthorized_retries_keeping_credentials() {
        let action = close_action(CloseReason::Unauthorized, 1, 0, &SessionConfig::default());
        assert_eq!(
            action,
            CloseAction::Reconnect {
                delay: Duration::from_secs(5),
                persist_status: true,
            }
        );
    }

    #[test]
    fn test_second_unauthorized_clears_credentials() {
        let action = close_action(CloseReason::Unauthorized, 2, 0, &SessionConfig::default());
        assert_eq!(
            action,
            CloseAction::Settle {
                status: AccountStatus::Offline,
                clear_credentials: true,
            }
        );
    }

    #[test]
    fn test_forbidden_bans_without_reconnect() {
        let action = close_action(CloseReason::Forbidden, 0, 0, &SessionConfig::default());
        assert_eq!(
            action,
            CloseAction::Settle {
                status: AccountStatus::Banned,
                clear_credentials: false,
            }
        );
    }

    #[test]
    fn test_superseded_goes_offline_without_reconnect() {
        let action = close_action(CloseReason::Superseded, 0, 3, &SessionConfig::default());
        assert_eq!(
            action,
            CloseAction::Settle {
                status: AccountStatus::Offline,
                clear_credentials: false,
            }
        );
    }

    #[test]
    fn test_restart_required_reconnects_quickly() {
        let action = close_action(CloseReason::RestartRequired, 0, 3, &SessionConfig::default());
        assert_eq!(
            action,
            CloseAction::Reconnect {
                delay: Duration::from_secs(2),
                persist_status: true,
            }
        );
    }

    #[test]
    fn test_unclassified_close_backs_off_exponentially() {
        let config = SessionConfig::default();
        let expected = [5000u64, 10_000, 20_000, 40_000, 60_000];
        for (attempts, want_ms) in expected.iter().enumerate() {
            let action = close_action(
                CloseReason::Other { code: 1006 },
                0,
                attempts as u32,
                &config,
            );
            assert_eq!(
                action,
                CloseAction::Reconnect {
                    delay: Duration::from_millis(*want_ms),
                    persist_status: false,
                },
                "attempt {}",
                attempts
            );
        }
    }
}

//! Per-account daily send-cap bookkeeping.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};

/// Tracks how many messages each account sent today (UTC).
///
/// The day rolls over implicitly: the first consume attempt on a new UTC day
/// resets that account's count before counting. Check-and-consume happens
/// under one synchronous lock with no await points, so interleaved queue
/// tasks can't double-spend the last slot of a cap.
#[derive(Debug, Default)]
pub struct DailyLedger {
    counts: Mutex<HashMap<String, (NaiveDate, u32)>>,
}

impl DailyLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to consume one send slot for `account` under `cap`.
    ///
    /// Returns `true` and increments when under the cap, `false` (and leaves
    /// the count untouched) when exhausted.
    pub fn try_consume(&self, account: &str, cap: u32) -> bool {
        self.try_consume_on(account, cap, Utc::now().date_naive())
    }

    /// [`Self::try_consume`] with an explicit day, for tests and callers
    /// that batch reads of the clock.
    pub fn try_consume_on(&self, account: &str, cap: u32, today: NaiveDate) -> bool {
        let mut counts = self.counts.lock().expect("ledger lock poisoned");
        let entry = counts
            .entry(account.to_string())
            .or_insert_with(|| (today, 0));

        if entry.0 != today {
            *entry = (today, 0);
        }

        if entry.1 >= cap {
            return false;
        }
        entry.1 += 1;
        true
    }

    /// Sends counted for `account` today; 0 when the stored day is stale.
    pub fn count_today(&self, account: &str) -> u32 {
        self.count_on(account, Utc::now().date_naive())
    }

    /// [`Self::count_today`] with an explicit day.
    pub fn count_on(&self, account: &str, today: NaiveDate) -> u32 {
        let counts = self.counts.lock().expect("ledger lock poisoned");
        match counts.get(account) {
            Some((day, count)) if *day == today => *count,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_consume_until_cap() {
        let ledger = DailyLedger::new();
        let today = day("2025-03-01");

        for _ in 0..3 {
            assert!(ledger.try_consume_on("+1555", 3, today));
        }
        assert!(!ledger.try_consume_on("+1555", 3, today));
        assert_eq!(ledger.count_on("+1555", today), 3);
    }

    #[test]
    fn test_day_rollover_resets_exactly_once() {
        let ledger = DailyLedger::new();
        let monday = day("2025-03-03");
        let tuesday = day("2025-03-04");

        for _ in 0..2 {
            assert!(ledger.try_consume_on("+1555", 2, monday));
        }
        assert!(!ledger.try_consume_on("+1555", 2, monday));

        // New day: the count starts over and never goes negative.
        assert!(ledger.try_consume_on("+1555", 2, tuesday));
        assert_eq!(ledger.count_on("+1555", tuesday), 1);
        assert_eq!(ledger.count_on("+1555", monday), 0);
    }

    #[test]
    fn test_accounts_are_independent() {
        let ledger = DailyLedger::new();
        let today = day("2025-03-01");

        assert!(ledger.try_consume_on("a", 1, today));
        assert!(!ledger.try_consume_on("a", 1, today));
        assert!(ledger.try_consume_on("b", 1, today));
    }
}

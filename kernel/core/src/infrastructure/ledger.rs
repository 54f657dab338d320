// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Process-local cost ledger.
//!
//! Keeps metered calls in memory so the circuit breaker has live counters
//! without a database. Daily spend is bucketed by UTC calendar day; the loop
//! count covers the trailing hour. Entries older than a day are pruned on
//! every write.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::domain::ledger::{Ledger, LedgerEntry};

#[derive(Clone, Default)]
pub struct InMemoryLedger {
    entries: Arc<Mutex<VecDeque<LedgerEntry>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a metered call stamped with the current time.
    pub fn record(&self, cost_usd: f64, tokens_in: u64, tokens_out: u64, provider: &str, model: &str) {
        self.insert(LedgerEntry {
            cost_usd,
            tokens_in,
            tokens_out,
            provider: provider.to_string(),
            model: model.to_string(),
            created_at: Utc::now(),
        });
    }

    /// Insert a pre-stamped entry, keeping the queue ordered by time.
    pub fn insert(&self, entry: LedgerEntry) {
        let mut entries = self.entries.lock();
        let position = entries
            .iter()
            .rposition(|e| e.created_at <= entry.created_at)
            .map_or(0, |i| i + 1);
        entries.insert(position, entry);

        let horizon = Utc::now() - Duration::days(1);
        while entries.front().is_some_and(|e| e.created_at < horizon) {
            entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn daily_spend_at(&self, now: DateTime<Utc>) -> f64 {
        let today = now.date_naive();
        self.entries
            .lock()
            .iter()
            .filter(|e| e.created_at.date_naive() == today)
            .map(|e| e.cost_usd)
            .sum()
    }

    fn hourly_loop_count_at(&self, now: DateTime<Utc>) -> u64 {
        let since = now - Duration::hours(1);
        self.entries
            .lock()
            .iter()
            .rev()
            .take_while(|e| e.created_at >= since)
            .count() as u64
    }
}

impl Ledger for InMemoryLedger {
    fn daily_spend(&self) -> f64 {
        self.daily_spend_at(Utc::now())
    }

    fn hourly_loop_count(&self) -> u64 {
        self.hourly_loop_count_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cost_usd: f64, created_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            cost_usd,
            tokens_in: 100,
            tokens_out: 50,
            provider: "anthropic".to_string(),
            model: "claude".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_empty_ledger_reports_zero() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.daily_spend(), 0.0);
        assert_eq!(ledger.hourly_loop_count(), 0);
    }

    #[test]
    fn test_record_counts_spend_and_loops() {
        let ledger = InMemoryLedger::new();
        ledger.record(0.25, 1000, 200, "anthropic", "claude");
        ledger.record(0.5, 2000, 400, "openai", "gpt");

        assert!((ledger.daily_spend() - 0.75).abs() < 1e-9);
        assert_eq!(ledger.hourly_loop_count(), 2);
    }

    #[test]
    fn test_hourly_window_excludes_older_entries() {
        let ledger = InMemoryLedger::new();
        let now = Utc::now();
        ledger.insert(entry(1.0, now - Duration::minutes(90)));
        ledger.insert(entry(1.0, now - Duration::minutes(10)));
        ledger.insert(entry(1.0, now - Duration::minutes(59)));

        assert_eq!(ledger.hourly_loop_count_at(now), 2);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_daily_spend_is_calendar_day() {
        let ledger = InMemoryLedger::new();
        let now = Utc::now();
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        ledger.insert(entry(2.0, midnight - Duration::seconds(1)));
        ledger.insert(entry(3.0, midnight));

        assert!((ledger.daily_spend_at(now) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_entries_older_than_a_day_are_pruned() {
        let ledger = InMemoryLedger::new();
        let now = Utc::now();
        ledger.insert(entry(9.0, now - Duration::days(2)));
        ledger.insert(entry(1.0, now));

        assert_eq!(ledger.len(), 1);
    }
}

// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

/// Read-only view of the cost ledger owned by the memory layer.
///
/// The circuit breaker recomputes every decision from these counters and
/// keeps no state of its own.
pub trait Ledger: Send + Sync {
    /// Total spend for the current day, in dollars.
    fn daily_spend(&self) -> f64;

    /// Number of agent loops started in the trailing hour.
    fn hourly_loop_count(&self) -> u64;
}

/// One metered model call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LedgerEntry {
    pub cost_usd: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub provider: String,
    pub model: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

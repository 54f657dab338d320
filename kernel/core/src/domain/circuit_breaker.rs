// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Spend and rate thresholds. Both must be positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub max_daily_spend: f64,
    pub max_loops_per_hour: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CircuitBreakerError {
    #[error("Circuit breaker tripped: {0}")]
    Tripped(String),
}

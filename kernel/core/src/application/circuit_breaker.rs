// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Circuit Breaker - safety gate in front of cost-incurring work
//!
//! Every decision is recomputed from the ledger; nothing is cached here.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::domain::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerError};
use crate::domain::events::CircuitBreakerEvent;
use crate::domain::ledger::Ledger;
use crate::infrastructure::event_bus::EventBus;

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    ledger: Arc<dyn Ledger>,
    event_bus: Arc<EventBus>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, ledger: Arc<dyn Ledger>, event_bus: Arc<EventBus>) -> Self {
        Self {
            config,
            ledger,
            event_bus,
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.trip_reason().is_some()
    }

    /// First breached limit, spend before loop count.
    pub fn trip_reason(&self) -> Option<String> {
        let daily_spend = self.ledger.daily_spend();
        if daily_spend >= self.config.max_daily_spend {
            return Some(format!(
                "Daily spend limit exceeded: ${:.2} >= ${:.2}",
                daily_spend, self.config.max_daily_spend
            ));
        }

        let hourly_loops = self.ledger.hourly_loop_count();
        if hourly_loops >= self.config.max_loops_per_hour {
            return Some(format!(
                "Hourly loop limit exceeded: {} >= {}",
                hourly_loops, self.config.max_loops_per_hour
            ));
        }

        None
    }

    /// Fail with the trip reason, publishing a `Tripped` event first.
    pub fn check(&self) -> Result<(), CircuitBreakerError> {
        match self.trip_reason() {
            Some(reason) => {
                warn!(reason = %reason, "Circuit breaker tripped");
                metrics::counter!("crevnclaw_circuit_breaker_trips_total").increment(1);
                self.event_bus.publish_circuit_breaker_event(CircuitBreakerEvent::Tripped {
                    reason: reason.clone(),
                    tripped_at: Utc::now(),
                });
                Err(CircuitBreakerError::Tripped(reason))
            }
            None => Ok(()),
        }
    }
}

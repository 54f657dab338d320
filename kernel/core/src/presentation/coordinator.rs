// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Coordinator
//!
//! Turns gateway `message` events into routed work.
//!
//! ```text
//! MessageReceived ─► breaker.check() ─┬─ tripped ─► bankrupt notice to the sender
//!                                     └─ ok ──────► Interactive task ─► router.route()
//!                                                   scheduler.flush()
//! ```
//!
//! Flushes are awaited one at a time, so a single coordinator never overlaps
//! two `flush()` calls.

use std::sync::Arc;

use serde_json::{json, Map};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::{CircuitBreaker, MessageRouter, Scheduler};
use crate::domain::events::{GatewayEvent, SchedulerEvent};
use crate::domain::lane::Lane;
use crate::domain::message::{MessageType, WireMessage};
use crate::infrastructure::event_bus::{EventBusError, EventReceiver, KernelEvent};
use crate::presentation::gateway::{ClientId, GatewayServer};

pub struct Coordinator {
    gateway: Arc<GatewayServer>,
    scheduler: Arc<Scheduler>,
    router: Arc<MessageRouter>,
    breaker: Arc<CircuitBreaker>,
}

impl Coordinator {
    pub fn new(
        gateway: Arc<GatewayServer>,
        scheduler: Arc<Scheduler>,
        router: Arc<MessageRouter>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            gateway,
            scheduler,
            router,
            breaker,
        }
    }

    /// Run on a background task until the event bus closes.
    ///
    /// Subscribe before starting the gateway so no connection is missed.
    pub fn spawn(self, events: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    pub async fn run(self, mut events: EventReceiver) {
        loop {
            match events.recv().await {
                Ok(KernelEvent::Gateway(GatewayEvent::ClientConnected { client_id, .. })) => {
                    info!(client_id = %client_id, total = self.gateway.client_count(), "Client connected");
                }
                Ok(KernelEvent::Gateway(GatewayEvent::ClientDisconnected { client_id, .. })) => {
                    info!(client_id = %client_id, total = self.gateway.client_count(), "Client disconnected");
                }
                Ok(KernelEvent::Gateway(GatewayEvent::MessageReceived { client_id, message, .. })) => {
                    if let Err(e) = self.breaker.check() {
                        let notice = bankrupt_notice(&e.to_string());
                        if let Err(send_err) = self.gateway.send_to(ClientId(client_id), &notice) {
                            warn!(client_id = %client_id, error = %send_err, "Failed to deliver bankrupt notice");
                        }
                        continue;
                    }

                    let router = self.router.clone();
                    self.scheduler.enqueue(Lane::Interactive, move |_| async move {
                        router.route(&message);
                        Ok(())
                    });
                    self.scheduler.flush().await;
                }
                Ok(KernelEvent::Scheduler(SchedulerEvent::TaskFailed { lane, error, .. })) => {
                    error!(lane = %lane, error = %error, "Scheduler error");
                }
                Ok(_) => {}
                Err(EventBusError::Lagged(n)) => {
                    warn!(skipped = n, "Coordinator lagged behind the event bus");
                }
                Err(_) => break,
            }
        }
    }
}

/// Sent to the originating client instead of routing when the breaker is open.
pub fn bankrupt_notice(reason: &str) -> WireMessage {
    let mut payload = Map::new();
    payload.insert("reason".to_string(), json!(reason));
    WireMessage::new(MessageType::Bankrupt, payload)
}

// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Kernel Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Bootstrap code and UI bridges subscribe here for the named lifecycle
// events of the scheduler, gateway, circuit breaker and workflow engine.
//
// In-memory only: events published with no subscriber are dropped.

use crate::domain::events::{CircuitBreakerEvent, GatewayEvent, SchedulerEvent, WorkflowEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified kernel event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", content = "event", rename_all = "snake_case")]
pub enum KernelEvent {
    Scheduler(SchedulerEvent),
    Gateway(GatewayEvent),
    CircuitBreaker(CircuitBreakerEvent),
    Workflow(WorkflowEvent),
}

/// Event bus for publishing and subscribing to kernel events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<KernelEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before slow
    /// receivers start lagging
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_scheduler_event(&self, event: SchedulerEvent) {
        self.publish(KernelEvent::Scheduler(event));
    }

    pub fn publish_gateway_event(&self, event: GatewayEvent) {
        self.publish(KernelEvent::Gateway(event));
    }

    pub fn publish_circuit_breaker_event(&self, event: CircuitBreakerEvent) {
        self.publish(KernelEvent::CircuitBreaker(event));
    }

    pub fn publish_workflow_event(&self, event: WorkflowEvent) {
        self.publish(KernelEvent::Workflow(event));
    }

    /// Publish a kernel event to all subscribers
    fn publish(&self, event: KernelEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all kernel events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all kernel events
pub struct EventReceiver {
    receiver: broadcast::Receiver<KernelEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<KernelEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<KernelEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<KernelEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => return events,
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Message Router
//!
//! Validates inbound wire messages and fans them out to handlers.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Typed pub/sub dispatch for gateway traffic
//!
//! Handlers run synchronously inside `route()`, in registration order. A valid
//! message reaches the handlers for its type first, then the wildcard handlers;
//! an invalid one reaches only the error handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::message::{MessageType, MessageValidationError, WireMessage};

pub type MessageHandler = Arc<dyn Fn(&WireMessage) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&MessageValidationError) + Send + Sync>;

/// Subscription handle returned by the `on_*` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Listeners {
    by_type: HashMap<MessageType, Vec<(HandlerId, MessageHandler)>>,
    wildcard: Vec<(HandlerId, MessageHandler)>,
    errors: Vec<(HandlerId, ErrorHandler)>,
}

#[derive(Default)]
pub struct MessageRouter {
    listeners: RwLock<Listeners>,
    next_id: AtomicU64,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `raw` and dispatch it.
    pub fn route(&self, raw: &Value) {
        let message = match WireMessage::validate(raw) {
            Ok(message) => message,
            Err(error) => {
                warn!(error = %error, "Dropping invalid wire message");
                let handlers: Vec<ErrorHandler> =
                    self.listeners.read().errors.iter().map(|(_, h)| h.clone()).collect();
                for handler in handlers {
                    handler(&error);
                }
                return;
            }
        };

        debug!(message_type = %message.message_type, id = %message.id, "Routing message");
        metrics::counter!("crevnclaw_router_messages_total", "type" => message.message_type.as_str())
            .increment(1);

        // Snapshot so handlers may (un)register without deadlocking
        let (typed, wildcard): (Vec<MessageHandler>, Vec<MessageHandler>) = {
            let listeners = self.listeners.read();
            (
                listeners
                    .by_type
                    .get(&message.message_type)
                    .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
                    .unwrap_or_default(),
                listeners.wildcard.iter().map(|(_, h)| h.clone()).collect(),
            )
        };

        for handler in typed {
            handler(&message);
        }
        for handler in wildcard {
            handler(&message);
        }
    }

    /// Register a handler for one message type.
    pub fn on_type<F>(&self, message_type: MessageType, handler: F) -> HandlerId
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        let id = self.next_handler_id();
        self.listeners
            .write()
            .by_type
            .entry(message_type)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler registered with [`on_type`](Self::on_type).
    /// Returns whether anything was removed.
    pub fn off_type(&self, message_type: MessageType, id: HandlerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(handlers) = listeners.by_type.get_mut(&message_type) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        before != handlers.len()
    }

    /// Register a handler for every valid message.
    pub fn on_any<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        let id = self.next_handler_id();
        self.listeners.write().wildcard.push((id, Arc::new(handler)));
        id
    }

    pub fn off_any(&self, id: HandlerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.wildcard.len();
        listeners.wildcard.retain(|(handler_id, _)| *handler_id != id);
        before != listeners.wildcard.len()
    }

    /// Register a handler for validation failures.
    pub fn on_error<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&MessageValidationError) + Send + Sync + 'static,
    {
        let id = self.next_handler_id();
        self.listeners.write().errors.push((id, Arc::new(handler)));
        id
    }

    fn next_handler_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn chat(id: &str) -> Value {
        json!({
            "type": "chat",
            "id": id,
            "timestamp": "2026-03-01T12:00:00.000Z",
            "payload": {"text": "hello"}
        })
    }

    struct Counters {
        log: Arc<Mutex<Vec<String>>>,
    }

    fn wire(router: &MessageRouter) -> Counters {
        let log = Arc::new(Mutex::new(Vec::new()));
        let typed = log.clone();
        router.on_type(MessageType::Chat, move |m| typed.lock().push(format!("chat:{}", m.id)));
        let any = log.clone();
        router.on_any(move |m| any.lock().push(format!("any:{}", m.id)));
        let errors = log.clone();
        router.on_error(move |_| errors.lock().push("error".to_string()));
        Counters { log }
    }

    #[test]
    fn test_valid_message_hits_type_then_wildcard_once() {
        let router = MessageRouter::new();
        let counters = wire(&router);

        router.route(&chat("m1"));

        assert_eq!(*counters.log.lock(), vec!["chat:m1", "any:m1"]);
    }

    #[test]
    fn test_invalid_message_only_emits_error() {
        let router = MessageRouter::new();
        let counters = wire(&router);

        router.route(&json!({"type": "chat", "id": "m1"}));
        router.route(&json!("not even an object"));

        assert_eq!(*counters.log.lock(), vec!["error", "error"]);
    }

    #[test]
    fn test_other_types_skip_chat_handlers() {
        let router = MessageRouter::new();
        let counters = wire(&router);

        router.route(&json!({
            "type": "status",
            "id": "s1",
            "timestamp": "2026-03-01T12:00:00Z",
            "payload": {}
        }));

        assert_eq!(*counters.log.lock(), vec!["any:s1"]);
    }

    #[test]
    fn test_off_type_unregisters_handler() {
        let router = MessageRouter::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let id = router.on_type(MessageType::Chat, move |_| *counter.lock() += 1);

        router.route(&chat("m1"));
        assert!(router.off_type(MessageType::Chat, id));
        assert!(!router.off_type(MessageType::Chat, id));
        router.route(&chat("m2"));

        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_multiple_handlers_per_type() {
        let router = MessageRouter::new();
        let hits = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let hits = hits.clone();
            router.on_type(MessageType::Chat, move |_| hits.lock().push(name));
        }

        router.route(&chat("m1"));
        assert_eq!(*hits.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_handler_can_register_during_dispatch() {
        let router = Arc::new(MessageRouter::new());
        let inner = router.clone();
        router.on_type(MessageType::Chat, move |_| {
            inner.on_any(|_| {});
        });

        router.route(&chat("m1"));
    }
}

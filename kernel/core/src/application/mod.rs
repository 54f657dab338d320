// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod scheduler;
pub mod message_router;
pub mod circuit_breaker;
pub mod workflow_engine;

pub use scheduler::{Scheduler, TaskError};
pub use message_router::{HandlerId, MessageRouter};
pub use circuit_breaker::CircuitBreaker;
pub use workflow_engine::{ActionHandler, WorkflowEngine};

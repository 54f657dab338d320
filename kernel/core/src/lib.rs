// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! CrevnClaw Kernel
//!
//! Control-plane primitives for a locally hosted autonomous agent.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Domain:** lanes, wire messages, workflow definitions/state, tool
//!   server types, pairing claims, configuration
//! - **Application:** [`Scheduler`](application::scheduler::Scheduler),
//!   [`MessageRouter`](application::message_router::MessageRouter),
//!   [`CircuitBreaker`](application::circuit_breaker::CircuitBreaker),
//!   [`WorkflowEngine`](application::workflow_engine::WorkflowEngine)
//! - **Infrastructure:** event bus, workflow state store, workflow parser,
//!   pairing credentials, in-memory cost ledger, the MCP tool host
//! - **Presentation:** the message coordinator and the authenticated WebSocket
//!   [`GatewayServer`](presentation::gateway::GatewayServer)

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;

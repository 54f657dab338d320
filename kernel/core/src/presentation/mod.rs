// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Presentation Layer
//!
//! Client-facing transports. The gateway is the only surface operators talk
//! to; the coordinator feeds its messages into the scheduler and router.

pub mod coordinator;
pub mod gateway;

pub use coordinator::Coordinator;
pub use gateway::{ClientId, GatewayConfig, GatewayServer};

// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain types shared by every kernel component.

pub mod circuit_breaker;
pub mod events;
pub mod ledger;
pub mod lane;
pub mod mcp;
pub mod message;
pub mod node_config;
pub mod pairing;
pub mod repository;
pub mod workflow;

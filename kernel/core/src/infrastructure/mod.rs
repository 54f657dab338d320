// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod ledger;
pub mod mcp;
pub mod pairing;
pub mod workflow_parser;
pub mod workflow_state_store;

pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use ledger::InMemoryLedger;
pub use mcp::McpHost;
pub use workflow_parser::WorkflowParser;
pub use workflow_state_store::FileWorkflowStateStore;

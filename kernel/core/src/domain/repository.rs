// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Repository
//!
//! Persistence contracts the application layer depends on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Durable freeze/thaw of suspended workflows

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::workflow::WorkflowState;

/// Durable store for a single suspended workflow.
///
/// The contract is a whole-document round trip: `thaw(freeze(state))` returns
/// the state that was written, including the `frozen_at` stamp added by
/// `freeze`. Each `freeze` replaces the previous document; last writer wins.
#[async_trait]
pub trait WorkflowStateStore: Send + Sync {
    /// Persist `state` stamped with the current time. Returns the stored document.
    async fn freeze(&self, state: &WorkflowState) -> Result<WorkflowState, StateStoreError>;

    /// Read the stored document back verbatim.
    async fn thaw(&self) -> Result<WorkflowState, StateStoreError>;

    /// Whether a frozen document exists, without parsing it.
    async fn has_frozen_state(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt frozen state in {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode workflow state: {0}")]
    Encode(#[source] serde_json::Error),
}

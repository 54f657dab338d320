// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

//! File-backed [`WorkflowStateStore`].
//!
//! One pretty-printed JSON document per store, rewritten wholesale on every
//! freeze.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::domain::repository::{StateStoreError, WorkflowStateStore};
use crate::domain::workflow::WorkflowState;

pub struct FileWorkflowStateStore {
    path: PathBuf,
}

impl FileWorkflowStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StateStoreError {
        StateStoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl WorkflowStateStore for FileWorkflowStateStore {
    async fn freeze(&self, state: &WorkflowState) -> Result<WorkflowState, StateStoreError> {
        let mut frozen = state.clone();
        frozen.frozen_at = Some(Utc::now());

        let encoded = serde_json::to_string_pretty(&frozen).map_err(StateStoreError::Encode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), workflow = %frozen.workflow_name, "Froze workflow state");
        Ok(frozen)
    }

    async fn thaw(&self) -> Result<WorkflowState, StateStoreError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        serde_json::from_str(&raw).map_err(|source| StateStoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    async fn has_frozen_state(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

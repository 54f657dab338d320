// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Workflow YAML Parser
//!
//! Parses workflow definition files into domain objects.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → Domain objects
//!
//! # Definition Format
//!
//! ```yaml
//! name: release
//! description: Build, review and ship
//! steps:
//!   - id: build
//!     name: Build
//!     type: action
//!     action: run_build
//!     next: review
//!   - id: review
//!     name: Human review
//!     type: approval
//!     on_approve: deploy
//!     on_reject: cancel
//!   - id: deploy
//!     name: Deploy
//!     type: action
//!     action: deploy
//!   - id: cancel
//!     name: Cancel
//!     type: action
//!     action: notify_cancel
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::domain::workflow::WorkflowDefinition;

/// Workflow parser (Infrastructure service)
pub struct WorkflowParser;

impl WorkflowParser {
    /// Parse a workflow definition from a YAML file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<WorkflowDefinition, WorkflowParseError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| WorkflowParseError::IoError {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse_yaml(&content)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowParseError> {
        let definition: WorkflowDefinition =
            serde_yaml::from_str(yaml).map_err(|e| WorkflowParseError::YamlError(e.to_string()))?;

        Self::check_structure(definition)
    }

    /// Validate an already-decoded document (e.g. received over the wire)
    pub fn validate(value: Value) -> Result<WorkflowDefinition, WorkflowParseError> {
        let definition: WorkflowDefinition = serde_json::from_value(value)
            .map_err(|e| WorkflowParseError::SchemaError(e.to_string()))?;

        Self::check_structure(definition)
    }

    fn check_structure(definition: WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowParseError> {
        if definition.steps.is_empty() {
            return Err(WorkflowParseError::ValidationError(format!(
                "workflow '{}' must have at least one step",
                definition.name
            )));
        }

        let mut ids = HashSet::new();
        for step in &definition.steps {
            if !ids.insert(step.id.as_str()) {
                return Err(WorkflowParseError::ValidationError(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        for step in &definition.steps {
            if let Some(target) = step.successors().find(|target| !ids.contains(target)) {
                return Err(WorkflowParseError::ValidationError(format!(
                    "step '{}' references unknown step '{}'",
                    step.id, target
                )));
            }
        }

        Ok(definition)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WorkflowParseError {
    #[error("IO error reading {path}: {error}")]
    IoError { path: String, error: String },

    #[error("YAML parse error: {0}")]
    YamlError(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

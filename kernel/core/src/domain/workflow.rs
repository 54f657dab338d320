// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Domain Model
//!
//! Declarative multi-step processes and their mutable execution cursor.
//!
//! # Architectural Context
//!
//! - **Layer:** Domain Layer
//! - **Aggregate Root:** [`WorkflowDefinition`] (immutable once loaded)
//! - **Entity:** [`WorkflowState`] (mutated only by the engine)
//!
//! # Invariants
//!
//! - A definition has at least one step.
//! - While a state is `running`, `current_step` names a step of its definition.
//! - A frozen state carries `frozen_at`; a live one does not need to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Named, static process description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    /// Find a step by id.
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn first_step(&self) -> Option<&WorkflowStep> {
        self.steps.first()
    }
}

/// One node of the process graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_approve: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_reject: Option<String>,
}

impl WorkflowStep {
    /// Step ids this step can hand control to.
    pub fn successors(&self) -> impl Iterator<Item = &str> {
        [&self.next, &self.on_approve, &self.on_reject]
            .into_iter()
            .filter_map(|target| target.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Action,
    Approval,
    Conditional,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Action => f.write_str("action"),
            StepKind::Approval => f.write_str("approval"),
            StepKind::Conditional => f.write_str("conditional"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    WaitingApproval,
    Completed,
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Running => f.write_str("running"),
            WorkflowStatus::WaitingApproval => f.write_str("waiting_approval"),
            WorkflowStatus::Completed => f.write_str("completed"),
            WorkflowStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Mutable execution cursor over a [`WorkflowDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_name: String,
    pub current_step: String,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen_at: Option<DateTime<Utc>>,
}

impl WorkflowState {
    pub fn new(definition: &WorkflowDefinition, first_step: &str, context: Map<String, Value>) -> Self {
        Self {
            workflow_name: definition.name.clone(),
            current_step: first_step.to_string(),
            status: WorkflowStatus::Running,
            context,
            frozen_at: None,
        }
    }

    /// Merge an action result into the context. Incoming keys win.
    pub fn merge_context(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.context.insert(key, value);
        }
    }
}

/// JavaScript-style truthiness used by conditional steps.
///
/// `null`, `false`, `0`, `NaN` and the empty string are falsy; every other
/// value, including empty arrays and objects, is truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow has no steps")]
    NoSteps,

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("No workflow state to approve. Call run() first or thaw a frozen state.")]
    NoActiveWorkflow,

    #[error("Cannot approve workflow in status: {0}")]
    NotWaitingApproval(WorkflowStatus),

    #[error("Current step is not an approval step")]
    NotAnApprovalStep,

    #[error("Workflow state persistence failed: {0}")]
    StateStore(#[from] crate::domain::repository::StateStoreError),
}

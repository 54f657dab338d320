// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::lane::Lane;
use crate::domain::workflow::{WorkflowState, WorkflowStep};

/// Scheduler lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchedulerEvent {
    /// `enqueue`
    TaskEnqueued {
        lane: Lane,
        enqueued_at: DateTime<Utc>,
    },
    /// `error`: a task body failed for a reason other than preemption.
    TaskFailed {
        lane: Lane,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

/// Gateway connection events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GatewayEvent {
    /// `connection`
    ClientConnected {
        client_id: Uuid,
        origin: Option<String>,
        connected_at: DateTime<Utc>,
    },
    /// `message`: a parsed JSON frame and the connection it came from.
    MessageReceived {
        client_id: Uuid,
        message: Value,
        received_at: DateTime<Utc>,
    },
    /// `disconnect`
    ClientDisconnected {
        client_id: Uuid,
        disconnected_at: DateTime<Utc>,
    },
    /// `client_error`: transport failure on a single connection.
    ClientError {
        client_id: Uuid,
        error: String,
    },
}

/// Safety gate events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CircuitBreakerEvent {
    /// `tripped`
    Tripped {
        reason: String,
        tripped_at: DateTime<Utc>,
    },
}

/// Workflow engine events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    /// `start`
    Started { state: WorkflowState },
    /// `step`
    StepEntered { step: WorkflowStep },
    /// `waiting_approval`
    WaitingApproval { step: WorkflowStep },
    /// `approved`: emitted for both outcomes when a branch exists.
    Approved { approved: bool, next_step: String },
    /// `complete`
    Completed { state: WorkflowState },
    /// `failed`
    Failed { state: WorkflowState },
}

impl WorkflowEvent {
    /// Event name as exposed to bootstrap and UI-bridge subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::Started { .. } => "start",
            WorkflowEvent::StepEntered { .. } => "step",
            WorkflowEvent::WaitingApproval { .. } => "waiting_approval",
            WorkflowEvent::Approved { .. } => "approved",
            WorkflowEvent::Completed { .. } => "complete",
            WorkflowEvent::Failed { .. } => "failed",
        }
    }
}

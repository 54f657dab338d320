// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Engine
//!
//! Steps through a [`WorkflowDefinition`], suspending at approval gates.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Durable step-execution state machine
//! - **Dependencies:** Domain (workflow model, `WorkflowStateStore`), Infrastructure (EventBus)
//!
//! # State Machine
//!
//! ```text
//! run() ──► running ──► (action ok / conditional / next) ──► running
//!              │                                   │
//!              │ approval step (freeze)            │ no next step
//!              ▼                                   ▼
//!       waiting_approval ──approve()──► running   completed
//!              │
//!              └─ rejected, no branch ──► failed ◄── action error / missing step
//! ```
//!
//! The only suspension point is an approval step. At that point the state is
//! frozen to the [`WorkflowStateStore`] so a new process can pick it up with
//! [`WorkflowEngine::load_frozen_state`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::domain::events::WorkflowEvent;
use crate::domain::repository::WorkflowStateStore;
use crate::domain::workflow::{
    is_truthy, StepKind, WorkflowDefinition, WorkflowError, WorkflowState, WorkflowStatus, WorkflowStep,
};
use crate::infrastructure::event_bus::EventBus;

/// Executes `action` steps on behalf of the engine.
///
/// The returned map is merged into the workflow context. An error fails the
/// workflow; its message is recorded under `context.error`.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, step: &WorkflowStep, context: &Map<String, Value>) -> anyhow::Result<Map<String, Value>>;
}

pub struct WorkflowEngine {
    definition: Option<WorkflowDefinition>,
    state: Option<WorkflowState>,
    store: Arc<dyn WorkflowStateStore>,
    action_handler: Arc<dyn ActionHandler>,
    event_bus: Arc<EventBus>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStateStore>,
        action_handler: Arc<dyn ActionHandler>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            definition: None,
            state: None,
            store,
            action_handler,
            event_bus,
        }
    }

    /// Start `definition` from its first step with a copy of `initial_context`.
    pub async fn run(
        &mut self,
        definition: WorkflowDefinition,
        initial_context: Map<String, Value>,
    ) -> Result<WorkflowState, WorkflowError> {
        let first_step = definition.first_step().ok_or(WorkflowError::NoSteps)?.id.clone();
        let state = WorkflowState::new(&definition, &first_step, initial_context);

        info!(workflow = %definition.name, step = %first_step, "Starting workflow");
        self.event_bus
            .publish_workflow_event(WorkflowEvent::Started { state: state.clone() });

        self.definition = Some(definition);
        self.state = Some(state);
        self.execute_from_current_step().await
    }

    /// Resolve the pending approval gate and resume.
    pub async fn approve(&mut self, approved: bool) -> Result<WorkflowState, WorkflowError> {
        let (Some(definition), Some(state)) = (self.definition.as_ref(), self.state.as_mut()) else {
            return Err(WorkflowError::NoActiveWorkflow);
        };

        if state.status != WorkflowStatus::WaitingApproval {
            return Err(WorkflowError::NotWaitingApproval(state.status));
        }

        let step = definition
            .step(&state.current_step)
            .filter(|step| step.kind == StepKind::Approval)
            .ok_or(WorkflowError::NotAnApprovalStep)?;

        let branch = if approved { &step.on_approve } else { &step.on_reject };
        info!(workflow = %state.workflow_name, step = %step.id, approved, "Approval received");

        let Some(next_step) = branch.clone() else {
            if approved {
                state.status = WorkflowStatus::Completed;
                self.event_bus
                    .publish_workflow_event(WorkflowEvent::Completed { state: state.clone() });
            } else {
                state.status = WorkflowStatus::Failed;
                self.event_bus
                    .publish_workflow_event(WorkflowEvent::Failed { state: state.clone() });
            }
            return Ok(state.clone());
        };

        state.current_step = next_step.clone();
        state.status = WorkflowStatus::Running;
        self.event_bus
            .publish_workflow_event(WorkflowEvent::Approved { approved, next_step });

        self.execute_from_current_step().await
    }

    /// Attach `definition` to the state thawed from the store. No step is re-run.
    pub async fn load_frozen_state(&mut self, definition: WorkflowDefinition) -> Result<WorkflowState, WorkflowError> {
        let state = self.store.thaw().await?;
        info!(
            workflow = %state.workflow_name,
            step = %state.current_step,
            status = %state.status,
            "Loaded frozen workflow state"
        );
        self.definition = Some(definition);
        self.state = Some(state.clone());
        Ok(state)
    }

    pub fn state(&self) -> Option<&WorkflowState> {
        self.state.as_ref()
    }

    pub async fn has_frozen_state(&self) -> bool {
        self.store.has_frozen_state().await
    }

    async fn execute_from_current_step(&mut self) -> Result<WorkflowState, WorkflowError> {
        let (Some(definition), Some(state)) = (self.definition.as_ref(), self.state.as_mut()) else {
            return Err(WorkflowError::NoActiveWorkflow);
        };

        while state.status == WorkflowStatus::Running {
            let Some(step) = definition.step(&state.current_step) else {
                warn!(workflow = %state.workflow_name, step = %state.current_step, "Workflow step not found");
                state.status = WorkflowStatus::Failed;
                self.event_bus
                    .publish_workflow_event(WorkflowEvent::Failed { state: state.clone() });
                return Err(WorkflowError::StepNotFound(state.current_step.clone()));
            };

            debug!(workflow = %state.workflow_name, step = %step.id, kind = %step.kind, "Entering step");
            self.event_bus
                .publish_workflow_event(WorkflowEvent::StepEntered { step: step.clone() });

            let next = match step.kind {
                StepKind::Approval => {
                    state.status = WorkflowStatus::WaitingApproval;
                    self.store.freeze(state).await?;
                    info!(workflow = %state.workflow_name, step = %step.id, "Workflow waiting for approval");
                    self.event_bus
                        .publish_workflow_event(WorkflowEvent::WaitingApproval { step: step.clone() });
                    return Ok(state.clone());
                }
                StepKind::Action => match self.action_handler.handle(step, &state.context).await {
                    Ok(patch) => {
                        state.merge_context(patch);
                        step.next.clone()
                    }
                    Err(error) => {
                        warn!(workflow = %state.workflow_name, step = %step.id, error = %error, "Workflow action failed");
                        state.status = WorkflowStatus::Failed;
                        state
                            .context
                            .insert("error".to_string(), Value::String(error.to_string()));
                        self.event_bus
                            .publish_workflow_event(WorkflowEvent::Failed { state: state.clone() });
                        return Ok(state.clone());
                    }
                },
                StepKind::Conditional => {
                    let condition = step.action.as_deref().and_then(|key| state.context.get(key));
                    if is_truthy(condition) {
                        step.on_approve.clone()
                    } else {
                        step.on_reject.clone()
                    }
                }
            };

            match next {
                Some(next) => state.current_step = next,
                None => {
                    info!(workflow = %state.workflow_name, "Workflow completed");
                    state.status = WorkflowStatus::Completed;
                    self.event_bus
                        .publish_workflow_event(WorkflowEvent::Completed { state: state.clone() });
                    return Ok(state.clone());
                }
            }
        }

        Ok(state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::StateStoreError;
    use crate::infrastructure::event_bus::KernelEvent;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Keeps the frozen document in memory.
    #[derive(Default)]
    struct MemoryStore {
        frozen: Mutex<Option<WorkflowState>>,
    }

    #[async_trait]
    impl WorkflowStateStore for MemoryStore {
        async fn freeze(&self, state: &WorkflowState) -> Result<WorkflowState, StateStoreError> {
            let mut frozen = state.clone();
            frozen.frozen_at = Some(chrono::Utc::now());
            *self.frozen.lock() = Some(frozen.clone());
            Ok(frozen)
        }

        async fn thaw(&self) -> Result<WorkflowState, StateStoreError> {
            self.frozen.lock().clone().ok_or_else(|| StateStoreError::Io {
                path: "memory".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }

        async fn has_frozen_state(&self) -> bool {
            self.frozen.lock().is_some()
        }
    }

    /// Records the steps it runs; fails on actions named `explode`.
    #[derive(Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActionHandler for RecordingHandler {
        async fn handle(&self, step: &WorkflowStep, _context: &Map<String, Value>) -> anyhow::Result<Map<String, Value>> {
            self.calls.lock().push(step.id.clone());
            if step.action.as_deref() == Some("explode") {
                anyhow::bail!("deployment target unreachable");
            }
            let mut patch = Map::new();
            patch.insert(format!("{}_done", step.id), json!(true));
            Ok(patch)
        }
    }

    fn step(id: &str, kind: StepKind) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            action: Some(id.to_string()),
            args: None,
            next: None,
            on_approve: None,
            on_reject: None,
        }
    }

    fn release_workflow() -> WorkflowDefinition {
        let mut build = step("build", StepKind::Action);
        build.next = Some("review".to_string());
        let mut review = step("review", StepKind::Approval);
        review.on_approve = Some("deploy".to_string());
        review.on_reject = Some("cancel".to_string());

        WorkflowDefinition {
            name: "release".to_string(),
            description: "Build, review and ship".to_string(),
            steps: vec![
                build,
                review,
                step("deploy", StepKind::Action),
                step("cancel", StepKind::Action),
            ],
        }
    }

    struct Harness {
        engine: WorkflowEngine,
        store: Arc<MemoryStore>,
        handler: Arc<RecordingHandler>,
        bus: Arc<EventBus>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::default());
        let handler = Arc::new(RecordingHandler::default());
        let bus = Arc::new(EventBus::new(100));
        Harness {
            engine: WorkflowEngine::new(store.clone(), handler.clone(), bus.clone()),
            store,
            handler,
            bus,
        }
    }

    fn event_names(events: Vec<KernelEvent>) -> Vec<&'static str> {
        events
            .into_iter()
            .filter_map(|event| match event {
                KernelEvent::Workflow(event) => Some(event.name()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_run_suspends_at_approval_and_freezes() {
        let mut h = harness();
        let mut events = h.bus.subscribe();

        let state = h.engine.run(release_workflow(), Map::new()).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::WaitingApproval);
        assert_eq!(state.current_step, "review");
        assert_eq!(state.context.get("build_done"), Some(&json!(true)));
        assert!(h.engine.has_frozen_state().await);

        let frozen = h.store.thaw().await.unwrap();
        assert_eq!(frozen.current_step, "review");
        assert!(frozen.frozen_at.is_some());

        assert_eq!(
            event_names(events.drain()),
            vec!["start", "step", "step", "waiting_approval"]
        );
    }

    #[tokio::test]
    async fn test_approve_runs_deploy_branch() {
        let mut h = harness();
        h.engine.run(release_workflow(), Map::new()).await.unwrap();

        let state = h.engine.approve(true).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.current_step, "deploy");
        assert_eq!(*h.handler.calls.lock(), vec!["build", "deploy"]);
    }

    #[tokio::test]
    async fn test_reject_runs_cancel_branch() {
        let mut h = harness();
        h.engine.run(release_workflow(), Map::new()).await.unwrap();
        let mut events = h.bus.subscribe();

        let state = h.engine.approve(false).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.current_step, "cancel");
        assert_eq!(*h.handler.calls.lock(), vec!["build", "cancel"]);
        assert_eq!(event_names(events.drain()), vec!["approved", "step", "complete"]);
    }

    #[tokio::test]
    async fn test_reject_without_branch_fails() {
        let mut h = harness();
        let definition = WorkflowDefinition {
            name: "gate".to_string(),
            description: String::new(),
            steps: vec![step("gate", StepKind::Approval)],
        };
        h.engine.run(definition, Map::new()).await.unwrap();

        let state = h.engine.approve(false).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert!(h.handler.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_approve_requires_waiting_state() {
        let mut h = harness();
        assert!(matches!(h.engine.approve(true).await, Err(WorkflowError::NoActiveWorkflow)));

        let definition = WorkflowDefinition {
            name: "single".to_string(),
            description: String::new(),
            steps: vec![step("only", StepKind::Action)],
        };
        let state = h.engine.run(definition, Map::new()).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);

        let err = h.engine.approve(true).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot approve workflow in status: completed");
    }

    #[tokio::test]
    async fn test_action_failure_recorded_in_context() {
        let mut h = harness();
        let mut events = h.bus.subscribe();
        let mut build = step("build", StepKind::Action);
        build.action = Some("explode".to_string());
        build.next = Some("never".to_string());
        let definition = WorkflowDefinition {
            name: "broken".to_string(),
            description: String::new(),
            steps: vec![build, step("never", StepKind::Action)],
        };

        let state = h.engine.run(definition, Map::new()).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Failed);
        assert_eq!(state.context.get("error"), Some(&json!("deployment target unreachable")));
        assert_eq!(*h.handler.calls.lock(), vec!["build"]);
        assert_eq!(event_names(events.drain()), vec!["start", "step", "failed"]);
    }

    #[tokio::test]
    async fn test_missing_step_fails_and_raises() {
        let mut h = harness();
        let mut first = step("first", StepKind::Action);
        first.next = Some("ghost".to_string());
        let definition = WorkflowDefinition {
            name: "dangling".to_string(),
            description: String::new(),
            steps: vec![first],
        };

        let err = h.engine.run(definition, Map::new()).await.unwrap_err();

        assert!(matches!(err, WorkflowError::StepNotFound(ref id) if id == "ghost"));
        assert_eq!(h.engine.state().unwrap().status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_empty_definition_rejected() {
        let mut h = harness();
        let definition = WorkflowDefinition {
            name: "empty".to_string(),
            description: String::new(),
            steps: vec![],
        };

        assert!(matches!(h.engine.run(definition, Map::new()).await, Err(WorkflowError::NoSteps)));
        assert!(h.engine.state().is_none());
    }

    #[tokio::test]
    async fn test_conditional_follows_context_truthiness() {
        let mut check = step("check", StepKind::Conditional);
        check.action = Some("tests_passed".to_string());
        check.on_approve = Some("ship".to_string());
        check.on_reject = Some("fix".to_string());
        let definition = WorkflowDefinition {
            name: "ci".to_string(),
            description: String::new(),
            steps: vec![check, step("ship", StepKind::Action), step("fix", StepKind::Action)],
        };

        let mut h = harness();
        let mut context = Map::new();
        context.insert("tests_passed".to_string(), json!(true));
        let state = h.engine.run(definition.clone(), context).await.unwrap();
        assert_eq!(state.current_step, "ship");

        let mut h = harness();
        let mut context = Map::new();
        context.insert("tests_passed".to_string(), json!(0));
        let state = h.engine.run(definition, context).await.unwrap();
        assert_eq!(state.current_step, "fix");
        assert_eq!(state.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_conditional_without_branch_completes() {
        let mut h = harness();
        let mut check = step("check", StepKind::Conditional);
        check.on_approve = Some("ship".to_string());
        let definition = WorkflowDefinition {
            name: "ci".to_string(),
            description: String::new(),
            steps: vec![check, step("ship", StepKind::Action)],
        };

        let state = h.engine.run(definition, Map::new()).await.unwrap();

        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.current_step, "check");
        assert!(h.handler.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_load_frozen_state_resumes_without_rerunning() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(EventBus::new(100));

        let first_handler = Arc::new(RecordingHandler::default());
        let mut first = WorkflowEngine::new(store.clone(), first_handler.clone(), bus.clone());
        first.run(release_workflow(), Map::new()).await.unwrap();

        let second_handler = Arc::new(RecordingHandler::default());
        let mut second = WorkflowEngine::new(store, second_handler.clone(), bus);
        let thawed = second.load_frozen_state(release_workflow()).await.unwrap();
        assert_eq!(thawed.status, WorkflowStatus::WaitingApproval);
        assert!(second_handler.calls.lock().is_empty());

        let state = second.approve(true).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(*second_handler.calls.lock(), vec!["deploy"]);
        assert_eq!(state.context.get("build_done"), Some(&json!(true)));
    }
}

// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Scheduler Application Service
//!
//! Runs units of work across three fixed-priority lanes.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Priority ordering and cooperative preemption of agent work
//! - **Dependencies:** Domain (Lane, SchedulerEvent), Infrastructure (EventBus)
//!
//! # Flush Pass
//!
//! ```text
//! for lane in [System, Interactive, Background] {
//!     while let Some(task) = queue[lane].pop_front() {
//!         if task.token.is_cancelled() { continue }   // skipped, never run
//!         run(task)                                    // failures reported, not fatal
//!     }
//! }
//! ```
//!
//! A lane is drained once per pass. Work that lands in an already-drained lane
//! while the pass is still running waits for the next `flush()`.
//!
//! # Preemption
//!
//! Enqueuing Interactive work while a Background task runs cancels that task's
//! [`CancellationToken`]. The task body has to observe the token itself (see
//! [`preemption_point`]); the scheduler never interrupts in-flight work.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::events::SchedulerEvent;
use crate::domain::lane::Lane;
use crate::infrastructure::event_bus::EventBus;

/// Why a task body stopped early.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task observed its cancellation token. Swallowed by the scheduler.
    #[error("Preempted by interactive task")]
    Preempted,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Safe point for task bodies: returns `Err(TaskError::Preempted)` once the
/// task's token has been cancelled.
pub fn preemption_point(token: &CancellationToken) -> Result<(), TaskError> {
    if token.is_cancelled() {
        Err(TaskError::Preempted)
    } else {
        Ok(())
    }
}

type TaskFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), TaskError>> + Send>;

struct Task {
    id: u64,
    lane: Lane,
    work: TaskFn,
    token: CancellationToken,
}

/// Background task currently executing, if any.
struct RunningTask {
    id: u64,
    token: CancellationToken,
}

/// Three-lane priority scheduler.
///
/// `flush()` must not be called again while a previous call is still running;
/// callers serialise flushes (the bootstrap loop does this by awaiting each one).
pub struct Scheduler {
    queues: Mutex<[VecDeque<Task>; 3]>,
    running_background: Mutex<Option<RunningTask>>,
    next_task_id: AtomicU64,
    event_bus: Arc<EventBus>,
}

impl Scheduler {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            queues: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            running_background: Mutex::new(None),
            next_task_id: AtomicU64::new(1),
            event_bus,
        }
    }

    /// Append `work` to `lane` and return its cancellation token.
    ///
    /// Cancelling the returned token before the task is dequeued makes
    /// `flush()` skip it.
    pub fn enqueue<F, Fut>(&self, lane: Lane, work: F) -> CancellationToken
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let task = Task {
            id: self.next_task_id.fetch_add(1, Ordering::Relaxed),
            lane,
            work: Box::new(move |token| work(token).boxed()),
            token: token.clone(),
        };

        self.queues.lock()[lane.index()].push_back(task);

        if lane == Lane::Interactive {
            if let Some(running) = self.running_background.lock().take() {
                info!(task_id = running.id, "Preempting background task for interactive work");
                running.token.cancel();
            }
        }

        debug!(lane = %lane, "Task enqueued");
        self.event_bus.publish_scheduler_event(SchedulerEvent::TaskEnqueued {
            lane,
            enqueued_at: Utc::now(),
        });

        token
    }

    /// Run every queued task in priority order.
    pub async fn flush(&self) {
        for lane in Lane::PRIORITY_ORDER {
            loop {
                let next = self.queues.lock()[lane.index()].pop_front();
                let Some(task) = next else {
                    break;
                };
                self.run_task(task).await;
            }
        }
    }

    /// Number of tasks waiting in `lane`.
    pub fn pending(&self, lane: Lane) -> usize {
        self.queues.lock()[lane.index()].len()
    }

    async fn run_task(&self, task: Task) {
        let Task { id, lane, work, token } = task;

        if token.is_cancelled() {
            debug!(task_id = id, lane = %lane, "Skipping cancelled task");
            metrics::counter!("crevnclaw_scheduler_tasks_total", "lane" => lane.as_str(), "outcome" => "skipped")
                .increment(1);
            return;
        }

        if lane == Lane::Background {
            *self.running_background.lock() = Some(RunningTask {
                id,
                token: token.clone(),
            });
        }

        let result = work(token).await;

        {
            let mut running = self.running_background.lock();
            if running.as_ref().is_some_and(|r| r.id == id) {
                *running = None;
            }
        }

        let outcome = match result {
            Ok(()) => "completed",
            Err(TaskError::Preempted) => {
                debug!(task_id = id, lane = %lane, "Task stopped after preemption");
                "preempted"
            }
            Err(TaskError::Failed(error)) => {
                warn!(task_id = id, lane = %lane, error = %error, "Scheduled task failed");
                self.event_bus.publish_scheduler_event(SchedulerEvent::TaskFailed {
                    lane,
                    error: format!("{error:#}"),
                    failed_at: Utc::now(),
                });
                "failed"
            }
        };
        metrics::counter!("crevnclaw_scheduler_tasks_total", "lane" => lane.as_str(), "outcome" => outcome)
            .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::event_bus::KernelEvent;

    fn scheduler() -> (Arc<Scheduler>, Arc<EventBus>) {
        let event_bus = Arc::new(EventBus::new(100));
        (Arc::new(Scheduler::new(event_bus.clone())), event_bus)
    }

    fn record(log: &Arc<Mutex<Vec<String>>>, label: &str) -> impl FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), TaskError>> {
        let log = log.clone();
        let label = label.to_string();
        move |_token| {
            async move {
                log.lock().push(label);
                Ok(())
            }
            .boxed()
        }
    }

    fn failures(events: Vec<KernelEvent>) -> Vec<String> {
        events
            .into_iter()
            .filter_map(|event| match event {
                KernelEvent::Scheduler(SchedulerEvent::TaskFailed { error, .. }) => Some(error),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_flush_runs_lanes_in_priority_then_fifo_order() {
        let (scheduler, _bus) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.enqueue(Lane::Background, record(&log, "bg-1"));
        scheduler.enqueue(Lane::Interactive, record(&log, "int-1"));
        scheduler.enqueue(Lane::System, record(&log, "sys-1"));
        scheduler.enqueue(Lane::Background, record(&log, "bg-2"));
        scheduler.enqueue(Lane::System, record(&log, "sys-2"));
        scheduler.enqueue(Lane::Interactive, record(&log, "int-2"));

        scheduler.flush().await;

        assert_eq!(
            *log.lock(),
            vec!["sys-1", "sys-2", "int-1", "int-2", "bg-1", "bg-2"]
        );
        for lane in Lane::PRIORITY_ORDER {
            assert_eq!(scheduler.pending(lane), 0);
        }
    }

    #[tokio::test]
    async fn test_enqueue_emits_event_with_lane() {
        let (scheduler, bus) = scheduler();
        let mut events = bus.subscribe();

        scheduler.enqueue(Lane::System, |_| async { Ok(()) });

        match events.try_recv().unwrap() {
            KernelEvent::Scheduler(SchedulerEvent::TaskEnqueued { lane, .. }) => {
                assert_eq!(lane, Lane::System)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interactive_enqueue_preempts_running_background_task() {
        let (scheduler, bus) = scheduler();
        let mut events = bus.subscribe();
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner = scheduler.clone();
        let bg_log = log.clone();
        let int_log = log.clone();
        scheduler.enqueue(Lane::Background, move |token| async move {
            bg_log.lock().push("bg-start".to_string());
            inner.enqueue(Lane::Interactive, move |_| async move {
                int_log.lock().push("interactive".to_string());
                Ok(())
            });
            // the token is cancelled synchronously inside enqueue()
            assert!(token.is_cancelled());
            preemption_point(&token)?;
            bg_log.lock().push("bg-finished".to_string());
            Ok::<(), TaskError>(())
        });

        scheduler.flush().await;

        // Interactive lane was already drained during this pass
        assert_eq!(*log.lock(), vec!["bg-start"]);
        assert_eq!(scheduler.pending(Lane::Interactive), 1);

        scheduler.flush().await;
        assert_eq!(*log.lock(), vec!["bg-start", "interactive"]);

        // Preemption is never reported as an error
        assert!(failures(events.drain()).is_empty());
    }

    #[tokio::test]
    async fn test_interactive_enqueue_without_running_background_cancels_nothing() {
        let (scheduler, _bus) = scheduler();
        let queued_bg = scheduler.enqueue(Lane::Background, |_| async { Ok(()) });

        scheduler.enqueue(Lane::Interactive, |_| async { Ok(()) });

        // Only a *running* background task is a preemption target
        assert!(!queued_bg.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_task_is_skipped() {
        let (scheduler, _bus) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));

        let token = scheduler.enqueue(Lane::Background, record(&log, "cancelled"));
        scheduler.enqueue(Lane::Background, record(&log, "kept"));
        token.cancel();

        scheduler.flush().await;
        assert_eq!(*log.lock(), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_flush_continues() {
        let (scheduler, bus) = scheduler();
        let mut events = bus.subscribe();
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.enqueue(Lane::Interactive, |_| async {
            Err(TaskError::Failed(anyhow::anyhow!("provider unavailable")))
        });
        scheduler.enqueue(Lane::Interactive, record(&log, "after-failure"));
        scheduler.enqueue(Lane::Background, record(&log, "background"));

        scheduler.flush().await;

        assert_eq!(*log.lock(), vec!["after-failure", "background"]);
        assert_eq!(failures(events.drain()), vec!["provider unavailable".to_string()]);
    }

    #[tokio::test]
    async fn test_preempted_result_is_swallowed() {
        let (scheduler, bus) = scheduler();
        let mut events = bus.subscribe();

        scheduler.enqueue(Lane::Background, |_| async { Err(TaskError::Preempted) });
        scheduler.flush().await;

        assert!(failures(events.drain()).is_empty());
    }

    #[tokio::test]
    async fn test_background_marker_cleared_after_task() {
        let (scheduler, _bus) = scheduler();
        scheduler.enqueue(Lane::Background, |_| async { Ok(()) });
        scheduler.flush().await;

        assert!(scheduler.running_background.lock().is_none());
    }
}

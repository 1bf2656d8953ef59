// src/controller/observer.rs

//! Optional hooks for hosts and profilers.

use crate::graph::task::TaskId;
use crate::types::{TaskKind, TaskResult};

/// Description of a task handed to observer callbacks.
#[derive(Debug, Clone, Copy)]
pub struct TaskInfo<'a> {
    pub id: TaskId,
    pub name: &'a str,
    pub priority: u32,
    pub kind: TaskKind,
}

/// Receives scheduler notifications.
///
/// `on_dispatched_event` fires with the graph lock held whenever the main
/// thread may have new work; it must not call back into the controller. The
/// per-task hooks fire on the thread running the task, with the lock
/// released.
pub trait SchedulerObserver: Send + Sync + 'static {
    fn on_dispatched_event(&self) {}

    fn on_task_started(&self, _task: &TaskInfo<'_>) {}

    fn on_task_finished(&self, _task: &TaskInfo<'_>, _result: TaskResult) {}
}

// src/controller/context.rs

use std::time::Instant;

use crate::controller::ControllerHandle;
use crate::graph::task::{InterruptFlag, TaskId};
use crate::types::TaskKind;

/// What a running task body can see of the scheduler.
pub struct TaskContext<'a> {
    controller: &'a ControllerHandle,
    id: TaskId,
    priority: u32,
    kind: TaskKind,
    interrupt: &'a InterruptFlag,
    idle_deadline: Option<Instant>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        controller: &'a ControllerHandle,
        id: TaskId,
        priority: u32,
        kind: TaskKind,
        interrupt: &'a InterruptFlag,
        idle_deadline: Option<Instant>,
    ) -> Self {
        Self {
            controller,
            id,
            priority,
            kind,
            interrupt,
            idle_deadline,
        }
    }

    /// The controller running this task, for submitting follow-up work.
    pub fn controller(&self) -> &'a ControllerHandle {
        self.controller
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Most urgent effective priority the scheduler asked this run to yield
    /// for.
    pub fn interrupt_requested(&self) -> Option<i64> {
        self.interrupt.requested()
    }

    /// Deadline of the idle period this run belongs to (idle tasks only).
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }

    /// Whether a cooperative body should stop at its next safe point and
    /// return `Incomplete`.
    pub fn should_yield(&self) -> bool {
        self.interrupt_requested().is_some()
            || self.idle_deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

// src/workload/simulated.rs

//! Task bodies that pretend to work by sleeping.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::controller::TaskContext;
use crate::graph::task::TaskBody;
use crate::types::TaskResult;

/// What happened to a simulated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    Started,
    Yielded,
    Completed,
}

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub task: String,
    pub thread: String,
    pub event: RunEvent,
    pub at: Instant,
}

/// Shared, append-only record of simulated runs.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    records: Arc<Mutex<Vec<ExecutionRecord>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, task: &str, event: RunEvent) {
        let thread = thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        self.records.lock().push(ExecutionRecord {
            task: task.to_string(),
            thread,
            event,
            at: Instant::now(),
        });
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().clone()
    }

    /// Task names in the order they completed.
    pub fn completion_order(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.event == RunEvent::Completed)
            .map(|r| r.task.clone())
            .collect()
    }

    pub fn yield_count(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.event == RunEvent::Yielded)
            .count()
    }
}

/// Sleeps through `work` in `slice`-sized steps and returns `Incomplete` when
/// asked to yield between two steps.
///
/// Every run performs at least one step, so a task that keeps getting
/// interrupted still finishes eventually.
pub struct SimulatedWork {
    name: String,
    remaining: Duration,
    slice: Duration,
    log: ExecutionLog,
}

impl SimulatedWork {
    pub fn new(name: impl Into<String>, work_ms: u64, slice_ms: u64, log: ExecutionLog) -> Self {
        Self {
            name: name.into(),
            remaining: Duration::from_millis(work_ms),
            slice: Duration::from_millis(slice_ms.max(1)),
            log,
        }
    }
}

impl TaskBody for SimulatedWork {
    fn run(&mut self, cx: &TaskContext<'_>) -> TaskResult {
        self.log.push(&self.name, RunEvent::Started);

        while !self.remaining.is_zero() {
            let step = self.slice.min(self.remaining);
            thread::sleep(step);
            self.remaining -= step;

            if !self.remaining.is_zero() && cx.should_yield() {
                debug!(
                    task = %self.name,
                    remaining_ms = self.remaining.as_millis() as u64,
                    requested = ?cx.interrupt_requested(),
                    "yielding"
                );
                self.log.push(&self.name, RunEvent::Yielded);
                return TaskResult::Incomplete;
            }
        }

        self.log.push(&self.name, RunEvent::Completed);
        TaskResult::Complete
    }

    fn name(&self) -> &str {
        &self.name
    }
}

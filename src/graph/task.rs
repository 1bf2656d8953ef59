// src/graph/task.rs

//! Task handles, task specs and the per-task node stored in the arena.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use crate::controller::TaskContext;
use crate::graph::manager::TaskManager;
use crate::graph::queue::QueueKey;
use crate::types::{TaskKind, TaskResult};

static NEXT_TASK_SEQ: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process-unique task sequence number.
pub(crate) fn next_task_seq() -> u64 {
    NEXT_TASK_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Whether `seq` could have been handed out by [`next_task_seq`] already.
pub(crate) fn seq_was_issued(seq: u64) -> bool {
    seq != 0 && seq < NEXT_TASK_SEQ.load(Ordering::Relaxed)
}

/// Generation-checked handle to a task in the scheduler's arena.
///
/// `key` is the arena slot; `seq` is the process-unique sequence number the
/// task received on insertion. Once the task completes its slot is vacated
/// and the handle goes stale for good, even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    pub(crate) key: usize,
    pub(crate) seq: u64,
}

impl TaskId {
    /// Insertion sequence number of this task.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.seq)
    }
}

/// Where a task currently is, as seen from outside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Linked into one of the two queues.
    Queued,
    /// Assigned to a pool thread or on the main-thread running stack.
    Running,
    /// Completed and dropped from the graph (or a handle that is stale).
    Completed,
}

/// The work a task performs.
///
/// Bodies run with the graph lock released and may submit more tasks through
/// [`TaskContext::controller`]. A body that wants to cooperate with
/// interruption polls [`TaskContext::should_yield`] and returns
/// [`TaskResult::Incomplete`]; it will be run again later.
pub trait TaskBody: Send + 'static {
    fn run(&mut self, cx: &TaskContext<'_>) -> TaskResult;

    /// Name used in logs and observer callbacks.
    fn name(&self) -> &str {
        "anonymous task"
    }

    /// Called before an idle task runs with the deadline it should respect.
    fn set_idle_deadline(&mut self, _deadline: Instant) {}
}

/// Adapter turning a closure into a [`TaskBody`].
pub struct FnTask<F> {
    name: String,
    f: F,
}

impl<F> TaskBody for FnTask<F>
where
    F: FnMut(&TaskContext<'_>) -> TaskResult + Send + 'static,
{
    fn run(&mut self, cx: &TaskContext<'_>) -> TaskResult {
        (self.f)(cx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap a closure as a task body.
pub fn task_fn<F>(name: impl Into<String>, f: F) -> FnTask<F>
where
    F: FnMut(&TaskContext<'_>) -> TaskResult + Send + 'static,
{
    FnTask {
        name: name.into(),
        f,
    }
}

/// Cooperative interruption hint shared between the scheduler and a body.
///
/// Holds the most urgent effective priority (manager modifier included)
/// anyone asked the running task to yield for, or nothing.
#[derive(Debug)]
pub struct InterruptFlag {
    requested: AtomicI64,
}

const NO_INTERRUPT: i64 = i64::MAX;

impl InterruptFlag {
    pub(crate) fn new() -> Self {
        Self {
            requested: AtomicI64::new(NO_INTERRUPT),
        }
    }

    /// Ask the task to yield in favour of work at `priority`.
    pub(crate) fn request(&self, priority: i64) {
        self.requested.fetch_min(priority, Ordering::AcqRel);
    }

    pub(crate) fn clear(&self) {
        self.requested.store(NO_INTERRUPT, Ordering::Release);
    }

    /// Most urgent priority an interruption was requested for, if any.
    pub fn requested(&self) -> Option<i64> {
        match self.requested.load(Ordering::Acquire) {
            NO_INTERRUPT => None,
            p => Some(p),
        }
    }
}

/// Everything a producer supplies when submitting a task.
pub struct TaskSpec {
    pub(crate) body: Box<dyn TaskBody>,
    pub(crate) priority: u32,
    pub(crate) kind: TaskKind,
    pub(crate) dependencies: Vec<TaskId>,
    pub(crate) manager: Option<TaskManager>,
}

impl TaskSpec {
    pub fn new(kind: TaskKind, priority: u32, body: impl TaskBody) -> Self {
        Self {
            body: Box::new(body),
            priority,
            kind,
            dependencies: Vec::new(),
            manager: None,
        }
    }

    pub fn main_thread(priority: u32, body: impl TaskBody) -> Self {
        Self::new(TaskKind::MainThreadOnly, priority, body)
    }

    pub fn off_main_thread(priority: u32, body: impl TaskBody) -> Self {
        Self::new(TaskKind::OffMainThreadOnly, priority, body)
    }

    /// Require `dep` to complete before this task may run.
    ///
    /// Dependencies keep their insertion order; adding the same one twice is
    /// a no-op.
    pub fn depends_on(mut self, dep: TaskId) -> Self {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    pub fn with_manager(mut self, manager: &TaskManager) -> Self {
        self.manager = Some(manager.clone());
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.body.name())
            .field("priority", &self.priority)
            .field("kind", &self.kind)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// A task as stored in the arena.
pub(crate) struct TaskNode {
    pub(crate) seq: u64,
    pub(crate) name: String,
    pub(crate) priority: u32,
    pub(crate) priority_modifier: i32,
    pub(crate) kind: TaskKind,
    pub(crate) in_progress: bool,
    pub(crate) dependencies: Vec<TaskId>,
    pub(crate) manager: Option<TaskManager>,
    /// `None` only while the body is out running.
    pub(crate) body: Option<Box<dyn TaskBody>>,
    pub(crate) interrupt: Arc<InterruptFlag>,
    /// `Some` iff the task is linked into a queue.
    pub(crate) queue_key: Option<QueueKey>,
}

impl TaskNode {
    pub(crate) fn from_spec(spec: TaskSpec, seq: u64, priority_modifier: i32) -> Self {
        Self {
            seq,
            name: spec.body.name().to_string(),
            priority: spec.priority,
            priority_modifier,
            kind: spec.kind,
            in_progress: false,
            dependencies: spec.dependencies,
            manager: spec.manager,
            body: Some(spec.body),
            interrupt: Arc::new(InterruptFlag::new()),
            queue_key: None,
        }
    }

    /// Ordering key for the task's current priority and modifier.
    pub(crate) fn ordering_key(&self) -> QueueKey {
        QueueKey::new(self.priority, self.priority_modifier, self.seq)
    }

    pub(crate) fn effective_priority(&self) -> i64 {
        self.ordering_key().effective_priority
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("seq", &self.seq)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("priority_modifier", &self.priority_modifier)
            .field("kind", &self.kind)
            .field("in_progress", &self.in_progress)
            .field("dependencies", &self.dependencies)
            .field("queue_key", &self.queue_key)
            .finish_non_exhaustive()
    }
}

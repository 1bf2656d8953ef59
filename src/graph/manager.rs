// src/graph/manager.rs

//! Task managers: coarse policy (suspension, priority shifts) applied to
//! every task a manager owns.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use tracing::debug;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique manager identity. Ids grow monotonically, so iterating the
/// registry visits managers in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(u64);

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manager#{}", self.0)
    }
}

/// Policy hooks of a manager.
///
/// `is_suspended` and `priority_modifier_for_event_loop_turn` are evaluated
/// with the graph lock held and must not call back into the controller.
/// `will_run_task` / `did_run_task` run with the lock released.
pub trait ManagerPolicy: Send + Sync + 'static {
    fn is_suspended(&self) -> bool;

    /// Offset added to every owned task's priority. Positive values
    /// deprioritize.
    fn priority_modifier_for_event_loop_turn(&self) -> i32 {
        0
    }

    fn will_run_task(&self) {}

    fn did_run_task(&self) {}
}

/// Policy driven by explicit setters.
#[derive(Debug, Default)]
pub struct ManualPolicy {
    suspended: AtomicBool,
    priority_modifier: AtomicI32,
}

impl ManualPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Release);
    }

    pub fn set_priority_modifier(&self, modifier: i32) {
        self.priority_modifier.store(modifier, Ordering::Release);
    }
}

impl ManagerPolicy for ManualPolicy {
    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    fn priority_modifier_for_event_loop_turn(&self) -> i32 {
        self.priority_modifier.load(Ordering::Acquire)
    }
}

struct ManagerInner {
    id: ManagerId,
    name: String,
    policy: Arc<dyn ManagerPolicy>,
}

/// Cloneable handle to a task manager.
///
/// Dropping the last handle destroys the manager; tasks keep their manager
/// alive until they complete.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl TaskManager {
    pub fn new(name: impl Into<String>, policy: Arc<dyn ManagerPolicy>) -> Self {
        let id = ManagerId(NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            inner: Arc::new(ManagerInner {
                id,
                name: name.into(),
                policy,
            }),
        }
    }

    pub fn id(&self) -> ManagerId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn policy(&self) -> &dyn ManagerPolicy {
        self.inner.policy.as_ref()
    }
}

impl PartialEq for TaskManager {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for TaskManager {}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

/// How the per-iteration caches are being refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationType {
    /// A real main-thread turn: the priority modifier may change.
    EventLoopTurn,
    /// A query such as "is there pending work": only suspension is refreshed.
    NotEventLoopTurn,
}

/// Bookkeeping for a manager that currently owns queued tasks.
#[derive(Debug)]
pub struct ManagerEntry {
    pub manager: TaskManager,
    /// Tasks of this manager currently linked into a queue.
    pub task_count: usize,
    pub current_suspended: bool,
    pub current_priority_modifier: i32,
}

impl ManagerEntry {
    fn new(manager: TaskManager) -> Self {
        Self {
            manager,
            task_count: 0,
            current_suspended: false,
            current_priority_modifier: 0,
        }
    }

    /// Refresh the cached policy values. Returns `true` if the priority
    /// modifier changed, in which case the owned tasks must be reordered.
    pub fn update_caches_for_iteration(&mut self, iteration: IterationType) -> bool {
        self.current_suspended = self.manager.policy().is_suspended();

        if iteration == IterationType::EventLoopTurn && !self.current_suspended {
            let old = self.current_priority_modifier;
            self.current_priority_modifier =
                self.manager.policy().priority_modifier_for_event_loop_turn();
            return self.current_priority_modifier != old;
        }
        false
    }
}

/// Managers that currently own at least one task.
#[derive(Debug, Default)]
pub struct ManagerRegistry {
    entries: BTreeMap<ManagerId, ManagerEntry>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ManagerId) -> Option<&ManagerEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ManagerId) -> Option<&mut ManagerEntry> {
        self.entries.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<ManagerId> {
        self.entries.keys().copied().collect()
    }

    /// Count a newly queued task, registering the manager on its first one.
    /// Returns the manager's cached priority modifier.
    pub fn did_queue_task(&mut self, manager: &TaskManager) -> i32 {
        let entry = self.entries.entry(manager.id()).or_insert_with(|| {
            debug!(manager = %manager.id(), name = manager.name(), "registering task manager");
            ManagerEntry::new(manager.clone())
        });
        entry.task_count += 1;
        entry.current_priority_modifier
    }

    /// A queued task of `id` was taken out of its queue to run.
    pub fn will_run_task(&mut self, id: ManagerId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            debug_assert!(entry.task_count > 0, "task count underflow for {id}");
            entry.task_count = entry.task_count.saturating_sub(1);
        }
    }

    /// A task of `manager` went back into its queue after an incomplete run.
    ///
    /// A nested run of a sibling task may have unregistered the manager while
    /// this task was out, so the entry is recreated with its caches refreshed.
    /// Returns the priority modifier to requeue with.
    pub fn did_requeue_task(&mut self, manager: &TaskManager) -> i32 {
        let entry = self.entries.entry(manager.id()).or_insert_with(|| {
            debug!(manager = %manager.id(), name = manager.name(), "re-registering task manager");
            let mut entry = ManagerEntry::new(manager.clone());
            entry.update_caches_for_iteration(IterationType::EventLoopTurn);
            entry
        });
        entry.task_count += 1;
        entry.current_priority_modifier
    }

    /// Drop the manager from the registry if it owns no more queued tasks.
    pub fn unregister_if_idle(&mut self, id: ManagerId) -> bool {
        let idle = self.entries.get(&id).is_some_and(|e| e.task_count == 0);
        if idle {
            self.entries.remove(&id);
            debug!(manager = %id, "unregistered task manager with no remaining tasks");
        }
        idle
    }

    /// Whether the manager's cached state says it is suspended. Unregistered
    /// managers own nothing and count as not suspended.
    pub fn is_suspended(&self, id: ManagerId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.current_suspended)
    }

    /// Refresh all caches and sum the tasks owned by suspended managers.
    ///
    /// Returns the suspended total and the managers whose priority modifier
    /// changed during this refresh.
    pub fn refresh(&mut self, iteration: IterationType) -> (usize, Vec<ManagerId>) {
        let mut total_suspended = 0;
        let mut changed = Vec::new();

        for (id, entry) in self.entries.iter_mut() {
            if entry.update_caches_for_iteration(iteration) {
                changed.push(*id);
            }
            if entry.current_suspended {
                total_suspended += entry.task_count;
            }
        }

        (total_suspended, changed)
    }

    /// Sum of tasks owned by managers whose cached state is suspended.
    pub fn suspended_task_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.current_suspended)
            .map(|e| e.task_count)
            .sum()
    }
}

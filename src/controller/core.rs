// src/controller/core.rs

//! Pure scheduler core.
//!
//! [`SchedulerCore`] holds every piece of shared scheduling state (both
//! queues, the worker-slot table, the main-thread running stack and the
//! manager registry) and implements insertion, selection, interruption and
//! completion on top of it. It never blocks, spawns threads or runs task
//! bodies. Instead it records [`CoreCommand`]s describing which threads need
//! waking; the controller shell drains them with [`SchedulerCore::take_commands`]
//! while it still holds the graph lock.
//!
//! Running a task is split in two halves so that the body can run with the
//! lock released: `start_*` hands out a [`RunTicket`] owning the body, and
//! `finish_*` takes it back together with the body's [`TaskResult`].

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::graph::arena::TaskArena;
use crate::graph::manager::{IterationType, ManagerId, ManagerRegistry, TaskManager};
use crate::graph::queue::TaskQueue;
use crate::graph::task::{
    InterruptFlag, TaskBody, TaskId, TaskNode, TaskSpec, TaskState, next_task_seq,
    seq_was_issued,
};
use crate::types::{TaskKind, TaskResult};

/// Side effect the shell must apply after a core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreCommand {
    /// Signal the condition variable of pool thread `i`.
    NotifyWorker(usize),
    /// Wake the main-thread waiter and tell the observer about new work.
    WakeMainThread,
}

/// One pool thread's slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerSlot {
    /// Task assigned to (or running on) this thread.
    pub current: Option<TaskId>,
    /// Priority the task was dispatched at. This is the effective priority of
    /// the queue root it was picked for, which can be more urgent than the
    /// task's own.
    pub effective_priority: i64,
}

/// A task taken out of the graph to run, together with its body.
pub struct RunTicket {
    pub id: TaskId,
    pub name: String,
    pub priority: u32,
    pub kind: TaskKind,
    pub manager: Option<TaskManager>,
    pub interrupt: Arc<InterruptFlag>,
    pub body: Box<dyn TaskBody>,
}

impl std::fmt::Debug for RunTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunTicket")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A task that left the graph. Dropping it drops the body, the dependency
/// list and the task's manager reference, so the shell drops it with the
/// graph lock released.
#[derive(Debug)]
pub struct Retired {
    node: TaskNode,
}

impl Retired {
    pub fn name(&self) -> &str {
        &self.node.name
    }
}

/// Pure scheduling state.
#[derive(Debug, Default)]
pub struct SchedulerCore {
    arena: TaskArena,
    main_thread_tasks: TaskQueue,
    threadable_tasks: TaskQueue,
    workers: Vec<WorkerSlot>,
    idle_thread_count: usize,
    current_tasks_mt: Vec<TaskId>,
    managers: ManagerRegistry,
    idle_manager: Option<ManagerId>,
    may_have_main_thread_task: bool,
    shutting_down: bool,
    ran_out_of_main_thread_tasks: u64,
    commands: Vec<CoreCommand>,
}

impl SchedulerCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the commands produced since the last call.
    pub fn take_commands(&mut self) -> Vec<CoreCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Add `count` idle worker slots. Called once, when the pool is created.
    pub fn attach_workers(&mut self, count: usize) {
        assert!(self.workers.is_empty(), "worker slots attached twice");
        self.workers = vec![WorkerSlot::default(); count];
        self.idle_thread_count = count;
        debug!(count, "attached pool worker slots");

        // Off-main-thread work submitted before the pool existed.
        self.dispatch_threadable_tasks();
    }

    pub fn set_idle_manager(&mut self, id: ManagerId) {
        self.idle_manager = Some(id);
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn task_state(&self, id: TaskId) -> TaskState {
        match self.arena.get(id) {
            None => TaskState::Completed,
            Some(node) if node.queue_key.is_some() => TaskState::Queued,
            Some(_) => TaskState::Running,
        }
    }

    /// Most urgent interruption requested for a live task.
    pub fn interrupt_requested(&self, id: TaskId) -> Option<i64> {
        self.arena.get(id).and_then(|node| node.interrupt.requested())
    }

    pub fn live_task_count(&self) -> usize {
        self.arena.len()
    }

    pub fn main_thread_queue_len(&self) -> usize {
        self.main_thread_tasks.len()
    }

    pub fn threadable_queue_len(&self) -> usize {
        self.threadable_tasks.len()
    }

    pub fn idle_thread_count(&self) -> usize {
        self.idle_thread_count
    }

    pub fn pool_thread_count(&self) -> usize {
        self.workers.len()
    }

    pub fn worker_task(&self, index: usize) -> Option<TaskId> {
        self.workers.get(index).and_then(|slot| slot.current)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn may_have_main_thread_task(&self) -> bool {
        self.may_have_main_thread_task
    }

    pub fn ran_out_of_main_thread_tasks(&self) -> u64 {
        self.ran_out_of_main_thread_tasks
    }

    /// Tasks of the idle manager currently queued.
    pub fn idle_task_count(&self) -> usize {
        self.idle_manager
            .and_then(|id| self.managers.get(id))
            .map_or(0, |entry| entry.task_count)
    }

    pub fn idle_manager_suspended(&self) -> bool {
        self.idle_manager
            .is_some_and(|id| self.managers.is_suspended(id))
    }

    /// Whether everything left on the main-thread queue belongs to suspended
    /// managers while idle tasks are among it. Uses the cached suspension
    /// state of the last refresh.
    pub fn only_suspended_work_remains(&self) -> bool {
        self.idle_task_count() > 0
            && self.idle_manager_suspended()
            && self.main_thread_tasks.len() <= self.managers.suspended_task_count()
    }

    /// Refresh manager suspension for a non event-loop query and return the
    /// number of queued tasks owned by suspended managers.
    pub fn refresh_suspension(&mut self) -> usize {
        let (total_suspended, changed) = self.managers.refresh(IterationType::NotEventLoopTurn);
        debug_assert!(changed.is_empty(), "modifier changed outside an event loop turn");
        total_suspended
    }

    pub fn note_ran_out_of_main_thread_tasks(&mut self) {
        self.ran_out_of_main_thread_tasks += 1;
    }

    /// Force the main thread to look at its queue again.
    pub fn wake_main_thread(&mut self) {
        self.may_have_main_thread_task = true;
        self.commands.push(CoreCommand::WakeMainThread);
    }

    /// Check the one-location invariant over every live task.
    ///
    /// Panics with a description of the first violation found.
    pub fn assert_consistent(&self) {
        let mut located = 0usize;
        for id in self.arena.ids() {
            let Some(node) = self.arena.get(id) else {
                continue;
            };
            let queued = node.queue_key.is_some();
            let on_worker = self.workers.iter().any(|w| w.current == Some(id));
            let on_stack = self.current_tasks_mt.contains(&id);
            let places = usize::from(queued) + usize::from(on_worker) + usize::from(on_stack);
            assert_eq!(places, 1, "{id} ({}) is in {places} places", node.name);
            assert_eq!(node.in_progress, !queued, "{id} in_progress out of sync");
            located += 1;
        }
        assert_eq!(
            located,
            self.main_thread_tasks.len()
                + self.threadable_tasks.len()
                + self.workers.iter().filter(|w| w.current.is_some()).count()
                + self.current_tasks_mt.len(),
            "queue or slot references a completed task"
        );
        assert_eq!(
            self.idle_thread_count,
            self.workers.iter().filter(|w| w.current.is_none()).count(),
            "idle thread count out of sync"
        );
    }

    // ---------------------------------------------------------------------
    // Insertion & reprioritization
    // ---------------------------------------------------------------------

    /// Insert a task into the graph.
    ///
    /// # Panics
    ///
    /// - an off-main-thread task carries a manager;
    /// - a dependency is owned by a different manager than the task;
    /// - the ordering key is already taken (a task inserted twice).
    pub fn add_task(&mut self, spec: TaskSpec) -> TaskId {
        if spec.kind == TaskKind::OffMainThreadOnly {
            assert!(
                spec.manager.is_none(),
                "off-main-thread tasks cannot belong to a task manager"
            );
        }

        for dep in &spec.dependencies {
            debug_assert!(seq_was_issued(dep.seq), "dependency {dep} was never issued");
            if let Some(dep_node) = self.arena.get(*dep)
                && let Some(dep_manager) = &dep_node.manager
            {
                assert!(
                    spec.manager.as_ref() == Some(dep_manager),
                    "task '{}' depends on {dep} which belongs to another task manager ({})",
                    spec.body.name(),
                    dep_manager.name()
                );
            }
        }

        let modifier = spec
            .manager
            .as_ref()
            .map_or(0, |manager| self.managers.did_queue_task(manager));

        let seq = next_task_seq();
        let node = TaskNode::from_spec(spec, seq, modifier);
        let kind = node.kind;
        let key = node.ordering_key();
        let id = self.arena.insert(node);

        let inserted = self.queue_for(kind).insert(key, id);
        assert!(inserted, "task {id} inserted twice");
        if let Some(node) = self.arena.get_mut(id) {
            node.queue_key = Some(key);
            trace!(task = %id, name = %node.name, priority = node.priority, %kind, "task added");
        }

        self.maybe_interrupt_task(id);
        id
    }

    /// Change the nominal priority of a task.
    ///
    /// Queued tasks move to their new position and interruption is
    /// re-evaluated. A running task only has its priority updated; the change
    /// takes effect if the run ends incomplete. Stale handles are ignored.
    pub fn reprioritize_task(&mut self, id: TaskId, priority: u32) {
        let Some(node) = self.arena.get_mut(id) else {
            debug!(task = %id, "reprioritize of completed task ignored");
            return;
        };

        node.priority = priority;
        let Some(old_key) = node.queue_key else {
            trace!(task = %id, priority, "reprioritized running task");
            return;
        };
        let new_key = node.ordering_key();
        node.queue_key = Some(new_key);
        let kind = node.kind;

        let queue = self.queue_for(kind);
        queue.remove(&old_key);
        let inserted = queue.insert(new_key, id);
        assert!(inserted, "task {id} reinserted twice");
        trace!(task = %id, priority, "reprioritized queued task");

        self.maybe_interrupt_task(id);
    }

    fn queue_for(&mut self, kind: TaskKind) -> &mut TaskQueue {
        match kind {
            TaskKind::MainThreadOnly => &mut self.main_thread_tasks,
            TaskKind::OffMainThreadOnly => &mut self.threadable_tasks,
        }
    }

    fn link_into_queue(&mut self, id: TaskId) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        let key = node.ordering_key();
        node.queue_key = Some(key);
        let kind = node.kind;
        let inserted = self.queue_for(kind).insert(key, id);
        assert!(inserted, "task {id} requeued twice");
    }

    fn unlink_from_queue(&mut self, id: TaskId) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        let Some(key) = node.queue_key.take() else {
            return;
        };
        let kind = node.kind;
        self.queue_for(kind).remove(&key);
    }

    // ---------------------------------------------------------------------
    // Interruption
    // ---------------------------------------------------------------------

    /// Decide whether `id` (or the dependency it is waiting on) should wake a
    /// thread or ask a running task to yield.
    pub fn maybe_interrupt_task(&mut self, id: TaskId) {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        let priority = node.effective_priority();
        let kind = node.kind;

        // A pending first dependency of the same kind that is at least as
        // urgent is already placed ahead of this task.
        if let Some(first) = node.dependencies.first()
            && let Some(dep) = self.arena.get(*first)
            && dep.kind == kind
            && dep.effective_priority() <= priority
        {
            return;
        }

        let final_dep = self.arena.final_dependency(id);
        let Some(final_node) = self.arena.get(final_dep) else {
            return;
        };
        if final_node.in_progress {
            return;
        }
        let final_kind = final_node.kind;

        match kind {
            TaskKind::MainThreadOnly => {
                self.wake_main_thread();

                let Some(&running) = self.current_tasks_mt.last() else {
                    return;
                };
                if final_kind == TaskKind::OffMainThreadOnly {
                    return;
                }
                if let Some(running_node) = self.arena.get(running)
                    && running_node.effective_priority() > priority
                {
                    running_node.interrupt.request(priority);
                    debug!(
                        running = %running,
                        task = %id,
                        priority,
                        "requested interrupt of running main-thread task"
                    );
                }
            }
            TaskKind::OffMainThreadOnly => {
                if self.idle_thread_count != 0 {
                    self.dispatch_threadable_tasks();
                    return;
                }

                let mut least_urgent: Option<&WorkerSlot> = None;
                for slot in self.workers.iter().filter(|s| s.current.is_some()) {
                    if least_urgent.is_none_or(|l| slot.effective_priority > l.effective_priority) {
                        least_urgent = Some(slot);
                    }
                }

                if let Some(slot) = least_urgent
                    && slot.effective_priority > priority
                    && let Some(running) = slot.current
                    && let Some(running_node) = self.arena.get(running)
                {
                    running_node.interrupt.request(priority);
                    debug!(
                        running = %running,
                        task = %id,
                        priority,
                        "requested interrupt of pool task"
                    );
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Pool dispatch
    // ---------------------------------------------------------------------

    /// Hand queued off-main-thread work to idle pool threads.
    pub fn dispatch_threadable_tasks(&mut self) {
        while self.dispatch_one_threadable_task() {}
    }

    fn dispatch_one_threadable_task(&mut self) -> bool {
        if self.shutting_down || self.idle_thread_count == 0 || self.threadable_tasks.is_empty() {
            return false;
        }

        let mut chosen = None;
        for (root_key, root) in self.threadable_tasks.iter() {
            let candidate = self.arena.final_dependency(root);
            let Some(node) = self.arena.get(candidate) else {
                continue;
            };
            if node.kind == TaskKind::OffMainThreadOnly && !node.in_progress {
                chosen = Some((candidate, root_key.effective_priority));
                break;
            }
        }
        let Some((task, effective_priority)) = chosen else {
            return false;
        };

        self.unlink_from_queue(task);

        let index = self
            .workers
            .iter()
            .position(|slot| slot.current.is_none())
            .expect("idle thread count says a pool thread is free, but none is");

        self.workers[index] = WorkerSlot {
            current: Some(task),
            effective_priority,
        };
        self.idle_thread_count -= 1;
        if let Some(node) = self.arena.get_mut(task) {
            node.in_progress = true;
        }
        self.commands.push(CoreCommand::NotifyWorker(index));
        debug!(task = %task, worker = index, effective_priority, "dispatched to pool thread");
        true
    }

    /// Take the body of the task assigned to worker `index`.
    ///
    /// Returns `None` while the slot is empty.
    pub fn start_worker_run(&mut self, index: usize) -> Option<RunTicket> {
        let id = self.workers.get(index)?.current?;
        Some(self.take_ticket(id))
    }

    /// Record the outcome of a pool run and dispatch follow-up work.
    pub fn finish_worker_run(
        &mut self,
        index: usize,
        ticket: RunTicket,
        result: TaskResult,
    ) -> Option<Retired> {
        assert_eq!(
            self.workers[index].current,
            Some(ticket.id),
            "worker {index} finished a foreign task"
        );
        let id = ticket.id;

        let retired = match result {
            TaskResult::Incomplete => {
                self.restore_body(ticket);
                self.link_into_queue(id);
                trace!(task = %id, worker = index, "pool task incomplete, requeued");
                None
            }
            TaskResult::Complete => {
                let retired = self.retire(ticket);
                // A main-thread task may have been waiting on this one.
                self.wake_main_thread();
                if let Some((_, best)) = self.main_thread_tasks.first() {
                    self.maybe_interrupt_task(best);
                }
                retired
            }
        };

        self.workers[index].current = None;
        self.idle_thread_count += 1;
        debug_assert!(self.idle_thread_count <= self.workers.len());

        self.dispatch_threadable_tasks();
        retired
    }

    // ---------------------------------------------------------------------
    // Main thread
    // ---------------------------------------------------------------------

    /// Pick the next main-thread task for an event-loop turn.
    ///
    /// Refreshes the manager caches first (requeueing the main-thread tasks of
    /// managers whose priority modifier changed). Returns `None` and clears
    /// the "may have work" flag if nothing is runnable.
    pub fn start_main_thread_run(&mut self) -> Option<RunTicket> {
        let (total_suspended, changed) = self.managers.refresh(IterationType::EventLoopTurn);
        for manager in changed {
            self.process_updated_priority_modifier(manager);
        }
        debug_assert!(self.main_thread_tasks.len() >= total_suspended);

        if self.main_thread_tasks.len() > total_suspended {
            let mut chosen = None;
            for (_, root) in self.main_thread_tasks.iter() {
                let Some(root_node) = self.arena.get(root) else {
                    continue;
                };
                // Dependencies of a suspended task run at their own priority.
                if root_node
                    .manager
                    .as_ref()
                    .is_some_and(|m| self.managers.is_suspended(m.id()))
                {
                    continue;
                }

                let candidate = self.arena.final_dependency(root);
                let Some(node) = self.arena.get(candidate) else {
                    continue;
                };
                let suspended = node
                    .manager
                    .as_ref()
                    .is_some_and(|m| self.managers.is_suspended(m.id()));
                if node.kind == TaskKind::OffMainThreadOnly || node.in_progress || suspended {
                    continue;
                }
                chosen = Some(candidate);
                break;
            }

            if let Some(id) = chosen {
                self.unlink_from_queue(id);
                self.current_tasks_mt.push(id);
                let ticket = self.take_ticket(id);
                if let Some(manager) = &ticket.manager {
                    self.managers.will_run_task(manager.id());
                }
                return Some(ticket);
            }
        }

        self.may_have_main_thread_task = false;
        None
    }

    /// Record the outcome of a main-thread run.
    pub fn finish_main_thread_run(&mut self, ticket: RunTicket, result: TaskResult) -> Option<Retired> {
        let top = self.current_tasks_mt.pop();
        assert_eq!(top, Some(ticket.id), "main-thread running stack out of order");
        let id = ticket.id;
        let manager = ticket.manager.clone();

        match result {
            TaskResult::Incomplete => {
                self.restore_body(ticket);
                if let Some(manager) = &manager {
                    let modifier = self.managers.did_requeue_task(manager);
                    if let Some(node) = self.arena.get_mut(id) {
                        node.priority_modifier = modifier;
                    }
                }
                self.link_into_queue(id);
                trace!(task = %id, "main-thread task incomplete, requeued");
                None
            }
            TaskResult::Complete => {
                if let Some(manager) = &manager {
                    self.managers.unregister_if_idle(manager.id());
                }
                let retired = self.retire(ticket);
                self.dispatch_threadable_tasks();
                retired
            }
        }
    }

    fn process_updated_priority_modifier(&mut self, manager: ManagerId) {
        let Some(modifier) = self
            .managers
            .get(manager)
            .map(|entry| entry.current_priority_modifier)
        else {
            return;
        };

        let arena = &self.arena;
        let owned = self.main_thread_tasks.take_where(|id| {
            arena
                .get(id)
                .and_then(|node| node.manager.as_ref())
                .is_some_and(|m| m.id() == manager)
        });
        debug!(%manager, modifier, tasks = owned.len(), "priority modifier changed");

        for (_, id) in owned {
            if let Some(node) = self.arena.get_mut(id) {
                node.priority_modifier = modifier;
                node.queue_key = None;
            }
            self.link_into_queue(id);
        }
    }

    // ---------------------------------------------------------------------
    // Shared run plumbing
    // ---------------------------------------------------------------------

    fn take_ticket(&mut self, id: TaskId) -> RunTicket {
        let node = self
            .arena
            .get_mut(id)
            .expect("task handed to a thread is not in the graph");
        node.in_progress = true;
        node.interrupt.clear();
        let body = node.body.take().expect("task body is already running");

        RunTicket {
            id,
            name: node.name.clone(),
            priority: node.priority,
            kind: node.kind,
            manager: node.manager.clone(),
            interrupt: Arc::clone(&node.interrupt),
            body,
        }
    }

    fn restore_body(&mut self, ticket: RunTicket) {
        if let Some(node) = self.arena.get_mut(ticket.id) {
            node.in_progress = false;
            node.body = Some(ticket.body);
        }
    }

    fn retire(&mut self, ticket: RunTicket) -> Option<Retired> {
        let id = ticket.id;
        let mut node = self.arena.remove(id)?;
        node.in_progress = false;
        node.body = Some(ticket.body);
        trace!(task = %id, name = %node.name, "task completed");
        Some(Retired { node })
    }

    // ---------------------------------------------------------------------
    // Shutdown
    // ---------------------------------------------------------------------

    /// Stop dispatching and wake every thread so it can observe shutdown.
    pub fn begin_shutdown(&mut self) {
        self.shutting_down = true;
        for index in 0..self.workers.len() {
            self.commands.push(CoreCommand::NotifyWorker(index));
        }
        self.commands.push(CoreCommand::WakeMainThread);
    }

    /// Remove every task that is still queued. Tasks that are running stay
    /// where they are until their run finishes.
    pub fn drain_queued(&mut self) -> Vec<Retired> {
        let mut queued = self.main_thread_tasks.drain();
        queued.extend(self.threadable_tasks.drain());

        let retired: Vec<Retired> = queued
            .into_iter()
            .filter_map(|id| self.arena.remove(id))
            .map(|node| Retired { node })
            .collect();

        if !retired.is_empty() {
            warn!(count = retired.len(), "dropping tasks that never ran");
        }
        for id in self.managers.ids() {
            if let Some(entry) = self.managers.get_mut(id) {
                entry.task_count = 0;
            }
            self.managers.unregister_if_idle(id);
        }
        retired
    }
}

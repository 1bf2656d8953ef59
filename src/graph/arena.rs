// src/graph/arena.rs

//! Slab-backed storage for live tasks.
//!
//! A task lives in the arena from insertion until it completes. Handles carry
//! the task's sequence number, so a handle to a vacated (or reused) slot is
//! detected as stale and reads as "completed".

use slab::Slab;

use crate::graph::task::{TaskId, TaskNode};

#[derive(Debug, Default)]
pub struct TaskArena {
    slots: Slab<TaskNode>,
}

impl TaskArena {
    pub fn new() -> Self {
        Self { slots: Slab::new() }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn insert(&mut self, node: TaskNode) -> TaskId {
        let entry = self.slots.vacant_entry();
        let id = TaskId {
            key: entry.key(),
            seq: node.seq,
        };
        entry.insert(node);
        id
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<&TaskNode> {
        self.slots.get(id.key).filter(|node| node.seq == id.seq)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        self.slots.get_mut(id.key).filter(|node| node.seq == id.seq)
    }

    /// Whether `id` refers to a task that has not completed yet.
    pub fn is_live(&self, id: TaskId) -> bool {
        self.get(id).is_some()
    }

    /// Vacate the slot of a completed task.
    pub(crate) fn remove(&mut self, id: TaskId) -> Option<TaskNode> {
        if self.is_live(id) {
            Some(self.slots.remove(id.key))
        } else {
            None
        }
    }

    /// Live task handles, in slot order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.slots
            .iter()
            .map(|(key, node)| TaskId { key, seq: node.seq })
            .collect()
    }

    /// First dependency of `id` that is still pending. Completed entries in
    /// front of it are dropped from the dependency list.
    fn first_pending_dependency(&mut self, id: TaskId) -> Option<TaskId> {
        let node = self.get(id)?;
        let pending_at = node.dependencies.iter().position(|dep| self.is_live(*dep));

        let node = self.get_mut(id)?;
        match pending_at {
            Some(pos) => {
                node.dependencies.drain(..pos);
                node.dependencies.first().copied()
            }
            None => {
                node.dependencies.clear();
                None
            }
        }
    }

    /// Walk down from `id`, taking the first pending dependency at every
    /// level. Returns `None` when `id` itself is runnable.
    ///
    /// Not cycle safe; dependency cycles cannot be built through `TaskSpec`.
    pub fn highest_priority_dependency(&mut self, id: TaskId) -> Option<TaskId> {
        let mut current = id;
        while let Some(next) = self.first_pending_dependency(current) {
            current = next;
        }
        (current != id).then_some(current)
    }

    /// The task that actually has to run next for `id` to make progress.
    pub fn final_dependency(&mut self, id: TaskId) -> TaskId {
        self.highest_priority_dependency(id).unwrap_or(id)
    }
}

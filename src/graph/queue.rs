// src/graph/queue.rs

//! Priority-ordered task queue.

use std::collections::BTreeMap;

use crate::graph::task::TaskId;

/// Ordering key of a queued task.
///
/// Field order matters: the derived `Ord` compares the effective priority
/// first and the insertion sequence second, which gives a strict total order
/// (sequence numbers are unique).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueKey {
    pub effective_priority: i64,
    pub seq: u64,
}

impl QueueKey {
    pub fn new(priority: u32, priority_modifier: i32, seq: u64) -> Self {
        Self {
            effective_priority: i64::from(priority) + i64::from(priority_modifier),
            seq,
        }
    }
}

/// A sorted set of tasks, most urgent first.
#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: BTreeMap<QueueKey, TaskId>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Link a task under `key`. Returns `false` if the key was already taken.
    pub fn insert(&mut self, key: QueueKey, task: TaskId) -> bool {
        match self.entries.entry(key) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(task);
                true
            }
        }
    }

    pub fn remove(&mut self, key: &QueueKey) -> Option<TaskId> {
        self.entries.remove(key)
    }

    /// Most urgent queued task.
    pub fn first(&self) -> Option<(QueueKey, TaskId)> {
        self.entries.iter().next().map(|(k, t)| (*k, *t))
    }

    /// Queued tasks in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = (QueueKey, TaskId)> + '_ {
        self.entries.iter().map(|(k, t)| (*k, *t))
    }

    /// Unlink every task matching `pred`, returning them in queue order.
    pub fn take_where(&mut self, mut pred: impl FnMut(TaskId) -> bool) -> Vec<(QueueKey, TaskId)> {
        let keys: Vec<QueueKey> = self
            .entries
            .iter()
            .filter(|(_, t)| pred(**t))
            .map(|(k, _)| *k)
            .collect();

        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|t| (k, t)))
            .collect()
    }

    /// Drop every entry, returning the tasks that were queued.
    pub fn drain(&mut self) -> Vec<TaskId> {
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

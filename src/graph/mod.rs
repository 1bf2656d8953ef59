// src/graph/mod.rs

//! Task graph building blocks: task handles and nodes, the slab arena,
//! priority-ordered queues and task managers.

pub mod arena;
pub mod manager;
pub mod queue;
pub mod task;

pub use arena::TaskArena;
pub use manager::{
    IterationType, ManagerEntry, ManagerId, ManagerPolicy, ManagerRegistry, ManualPolicy,
    TaskManager,
};
pub use queue::{QueueKey, TaskQueue};
pub use task::{FnTask, InterruptFlag, TaskBody, TaskId, TaskSpec, TaskState, task_fn};

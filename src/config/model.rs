// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{PriorityLevel, TaskKind};

/// `[controller]` section: sizing and naming of the worker pool.
///
/// ```toml
/// [controller]
/// thread_count = 4
/// min_threads = 2
/// max_threads = 8
/// thread_name_prefix = "TaskController"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControllerConfig {
    /// Fixed pool size. If `None`, the pool is sized from the available
    /// parallelism minus one (the main thread).
    #[serde(default)]
    pub thread_count: Option<usize>,

    /// Lower clamp for the pool size.
    #[serde(default = "default_min_threads")]
    pub min_threads: usize,

    /// Upper clamp for the pool size.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Stack size of pool threads in bytes; platform default if unset.
    #[serde(default)]
    pub thread_stack_size: Option<usize>,

    /// Pool threads are named `"{prefix} #{index}"`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_min_threads() -> usize {
    2
}

fn default_max_threads() -> usize {
    8
}

fn default_thread_name_prefix() -> String {
    "TaskController".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            thread_count: None,
            min_threads: default_min_threads(),
            max_threads: default_max_threads(),
            thread_stack_size: None,
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

/// A file that only carries a `[controller]` section (`--controller PATH`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControllerConfigFile {
    #[serde(default)]
    pub controller: ControllerConfig,
}

/// Priority as written in a workload file: a number or a level name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PrioritySetting {
    Value(u32),
    Level(String),
}

impl Default for PrioritySetting {
    fn default() -> Self {
        PrioritySetting::Value(PriorityLevel::Normal.value())
    }
}

impl PrioritySetting {
    pub fn resolve(&self) -> Result<u32, String> {
        match self {
            PrioritySetting::Value(v) => Ok(*v),
            PrioritySetting::Level(name) => name.parse::<PriorityLevel>().map(u32::from),
        }
    }
}

/// `[manager.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManagerConfig {
    /// Start suspended. Suspended managers are resumed once every other task
    /// has finished, so their tasks still run.
    #[serde(default)]
    pub suspended: bool,

    /// Added to the priority of every task of this manager.
    #[serde(default)]
    pub priority_modifier: i32,
}

/// `[idle]` section. Tasks with `manager = "idle"` only run inside idle
/// periods opened by the workload runner.
#[derive(Debug, Clone, Deserialize)]
pub struct IdleConfig {
    /// Length of each idle period.
    #[serde(default = "default_idle_budget_ms")]
    pub budget_ms: u64,
}

fn default_idle_budget_ms() -> u64 {
    50
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            budget_ms: default_idle_budget_ms(),
        }
    }
}

/// Reserved manager name that refers to the idle manager.
pub const IDLE_MANAGER_NAME: &str = "idle";

/// `[task.<name>]` section as written.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadTaskConfig {
    #[serde(default)]
    pub priority: PrioritySetting,

    /// `"main"` or `"off-main"`.
    #[serde(default = "default_kind")]
    pub kind: TaskKind,

    /// Tasks that must complete before this one starts.
    #[serde(default)]
    pub after: Vec<String>,

    /// Name of a `[manager.<name>]` section, or `"idle"`.
    #[serde(default)]
    pub manager: Option<String>,

    /// Total simulated work.
    #[serde(default = "default_work_ms")]
    pub work_ms: u64,

    /// Granularity at which the simulated work checks for interruption.
    #[serde(default = "default_slice_ms")]
    pub slice_ms: u64,
}

fn default_kind() -> TaskKind {
    TaskKind::MainThreadOnly
}

fn default_work_ms() -> u64 {
    10
}

fn default_slice_ms() -> u64 {
    2
}

/// Workload file exactly as deserialized from TOML (no validation).
///
/// ```toml
/// [manager.background]
/// priority_modifier = 20
///
/// [task.parse]
/// priority = "input-high"
/// kind = "off-main"
///
/// [task.paint]
/// priority = 10
/// after = ["parse"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWorkloadFile {
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub manager: BTreeMap<String, ManagerConfig>,

    #[serde(default)]
    pub idle: Option<IdleConfig>,

    #[serde(default)]
    pub task: BTreeMap<String, WorkloadTaskConfig>,
}

/// A validated task definition with its priority resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDef {
    pub priority: u32,
    pub kind: TaskKind,
    pub after: Vec<String>,
    pub manager: Option<String>,
    pub work_ms: u64,
    pub slice_ms: u64,
}

/// Validated workload.
///
/// Constructed through `TryFrom<RawWorkloadFile>` (see `validate.rs`):
/// dependencies are known and acyclic, managers exist, and
/// `submission_order` lists every task after all of its dependencies.
#[derive(Debug, Clone)]
pub struct WorkloadFile {
    pub controller: ControllerConfig,
    pub manager: BTreeMap<String, ManagerConfig>,
    pub idle: Option<IdleConfig>,
    pub task: BTreeMap<String, TaskDef>,
    pub submission_order: Vec<String>,
}

impl WorkloadFile {
    /// Construct without validation. Only `validate.rs` should call this.
    pub(crate) fn new_unchecked(
        controller: ControllerConfig,
        manager: BTreeMap<String, ManagerConfig>,
        idle: Option<IdleConfig>,
        task: BTreeMap<String, TaskDef>,
        submission_order: Vec<String>,
    ) -> Self {
        Self {
            controller,
            manager,
            idle,
            task,
            submission_order,
        }
    }
}

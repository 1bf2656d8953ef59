#![allow(dead_code)]

use taskctl::config::{
    ControllerConfig, IdleConfig, ManagerConfig, PrioritySetting, RawWorkloadFile, WorkloadFile,
    WorkloadTaskConfig,
};
use taskctl::errors::Result;
use taskctl::types::TaskKind;

/// Builder for `WorkloadFile` to simplify test setup.
pub struct WorkloadBuilder {
    workload: RawWorkloadFile,
}

impl WorkloadBuilder {
    pub fn new() -> Self {
        Self {
            workload: RawWorkloadFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: WorkloadTaskConfig) -> Self {
        self.workload.task.insert(name.to_string(), task);
        self
    }

    pub fn with_manager(mut self, name: &str, suspended: bool, priority_modifier: i32) -> Self {
        self.workload.manager.insert(
            name.to_string(),
            ManagerConfig {
                suspended,
                priority_modifier,
            },
        );
        self
    }

    pub fn with_idle(mut self, budget_ms: u64) -> Self {
        self.workload.idle = Some(IdleConfig { budget_ms });
        self
    }

    pub fn with_controller(mut self, controller: ControllerConfig) -> Self {
        self.workload.controller = controller;
        self
    }

    pub fn raw(self) -> RawWorkloadFile {
        self.workload
    }

    pub fn try_build(self) -> Result<WorkloadFile> {
        WorkloadFile::try_from(self.workload)
    }

    pub fn build(self) -> WorkloadFile {
        self.try_build()
            .expect("Failed to build valid workload from builder")
    }
}

impl Default for WorkloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `WorkloadTaskConfig`.
pub struct TaskConfigBuilder {
    task: WorkloadTaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(kind: TaskKind, priority: u32) -> Self {
        Self {
            task: WorkloadTaskConfig {
                priority: PrioritySetting::Value(priority),
                kind,
                after: vec![],
                manager: None,
                work_ms: 1,
                slice_ms: 1,
            },
        }
    }

    pub fn main_thread(priority: u32) -> Self {
        Self::new(TaskKind::MainThreadOnly, priority)
    }

    pub fn off_main_thread(priority: u32) -> Self {
        Self::new(TaskKind::OffMainThreadOnly, priority)
    }

    pub fn level(mut self, level: &str) -> Self {
        self.task.priority = PrioritySetting::Level(level.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn manager(mut self, manager: &str) -> Self {
        self.task.manager = Some(manager.to_string());
        self
    }

    pub fn work_ms(mut self, work_ms: u64, slice_ms: u64) -> Self {
        self.task.work_ms = work_ms;
        self.task.slice_ms = slice_ms;
        self
    }

    pub fn build(self) -> WorkloadTaskConfig {
        self.task
    }
}

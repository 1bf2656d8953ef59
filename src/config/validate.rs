// src/config/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{
    ControllerConfig, IDLE_MANAGER_NAME, RawWorkloadFile, TaskDef, WorkloadFile,
};
use crate::errors::{Result, TaskctlError};
use crate::types::TaskKind;

impl TryFrom<RawWorkloadFile> for WorkloadFile {
    type Error = TaskctlError;

    fn try_from(raw: RawWorkloadFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        validate_controller_config(&raw.controller)?;
        validate_managers(&raw)?;
        validate_task_dependencies(&raw)?;
        let task = resolve_tasks(&raw)?;
        let submission_order = submission_order(&task)?;

        Ok(WorkloadFile::new_unchecked(
            raw.controller,
            raw.manager,
            raw.idle,
            task,
            submission_order,
        ))
    }
}

/// Check pool sizing bounds.
pub fn validate_controller_config(cfg: &ControllerConfig) -> Result<()> {
    if cfg.min_threads == 0 {
        return Err(TaskctlError::ConfigError(
            "[controller].min_threads must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.min_threads > cfg.max_threads {
        return Err(TaskctlError::ConfigError(format!(
            "[controller].min_threads ({}) must not exceed max_threads ({})",
            cfg.min_threads, cfg.max_threads
        )));
    }
    if cfg.thread_count == Some(0) {
        return Err(TaskctlError::ConfigError(
            "[controller].thread_count must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.thread_name_prefix.trim().is_empty() {
        return Err(TaskctlError::ConfigError(
            "[controller].thread_name_prefix must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn ensure_has_tasks(cfg: &RawWorkloadFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskctlError::ConfigError(
            "workload must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_managers(cfg: &RawWorkloadFile) -> Result<()> {
    if cfg.manager.contains_key(IDLE_MANAGER_NAME) {
        return Err(TaskctlError::ConfigError(format!(
            "manager name '{IDLE_MANAGER_NAME}' is reserved; configure it through [idle]"
        )));
    }

    for (name, task) in cfg.task.iter() {
        let Some(manager) = task.manager.as_deref() else {
            continue;
        };

        if task.kind == TaskKind::OffMainThreadOnly {
            return Err(TaskctlError::ConfigError(format!(
                "task '{name}' is off-main but has manager '{manager}'; \
                 only main-thread tasks can be managed"
            )));
        }

        let known = if manager == IDLE_MANAGER_NAME {
            cfg.idle.is_some()
        } else {
            cfg.manager.contains_key(manager)
        };
        if !known {
            return Err(TaskctlError::ConfigError(format!(
                "task '{name}' refers to unknown manager '{manager}'"
            )));
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawWorkloadFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            let Some(dep_task) = cfg.task.get(dep) else {
                return Err(TaskctlError::ConfigError(format!(
                    "task '{name}' has unknown dependency '{dep}' in `after`"
                )));
            };
            if dep == name {
                return Err(TaskctlError::ConfigError(format!(
                    "task '{name}' cannot depend on itself in `after`"
                )));
            }
            // The scheduler only supports dependencies inside one manager.
            if dep_task.manager.is_some() && dep_task.manager != task.manager {
                return Err(TaskctlError::ConfigError(format!(
                    "task '{name}' depends on '{dep}' which belongs to manager '{}'",
                    dep_task.manager.as_deref().unwrap_or_default()
                )));
            }
        }
    }
    Ok(())
}

fn resolve_tasks(cfg: &RawWorkloadFile) -> Result<BTreeMap<String, TaskDef>> {
    let mut out = BTreeMap::new();
    for (name, task) in cfg.task.iter() {
        let priority = task
            .priority
            .resolve()
            .map_err(|e| TaskctlError::ConfigError(format!("task '{name}': {e}")))?;

        if task.slice_ms == 0 {
            return Err(TaskctlError::ConfigError(format!(
                "task '{name}': slice_ms must be >= 1 (got 0)"
            )));
        }

        out.insert(
            name.clone(),
            TaskDef {
                priority,
                kind: task.kind,
                after: task.after.clone(),
                manager: task.manager.clone(),
                work_ms: task.work_ms,
                slice_ms: task.slice_ms,
            },
        );
    }
    Ok(out)
}

/// Order tasks so that every task comes after its dependencies.
///
/// Edge direction: dep -> task. For `[task.B] after = ["A"]` we add A -> B.
fn submission_order(tasks: &BTreeMap<String, TaskDef>) -> Result<Vec<String>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in tasks.keys() {
        graph.add_node(name.as_str());
    }
    for (name, task) in tasks.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(TaskctlError::DagCycle(format!(
            "cycle detected in workload involving task '{}'",
            cycle.node_id()
        ))),
    }
}

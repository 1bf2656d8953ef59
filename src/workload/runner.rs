// src/workload/runner.rs

//! Submit a validated workload to a controller and pump it to completion.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{IDLE_MANAGER_NAME, WorkloadFile};
use crate::controller::{ControllerHandle, IdlePeriodState};
use crate::errors::{Result, TaskctlError};
use crate::graph::manager::{ManagerPolicy, ManualPolicy, TaskManager};
use crate::graph::task::{TaskId, TaskSpec, TaskState};
use crate::workload::simulated::{ExecutionLog, ExecutionRecord, SimulatedWork};

const PUMP_WAIT: Duration = Duration::from_millis(5);

/// Outcome of a workload run.
#[derive(Debug, Clone)]
pub struct WorkloadReport {
    pub completion_order: Vec<String>,
    pub records: Vec<ExecutionRecord>,
    pub yields: usize,
    pub idle_periods: u64,
    pub ran_out_of_main_thread_tasks: u64,
    pub elapsed: Duration,
}

struct ConfiguredManager {
    manager: TaskManager,
    policy: Arc<ManualPolicy>,
}

/// Submit every task of `workload` and pump the main thread until all of
/// them completed. Must run on the controller's main thread.
///
/// Idle periods are opened whenever only idle work is runnable; suspended
/// managers are resumed once everything outside them has finished.
pub fn run_workload(workload: &WorkloadFile, controller: &ControllerHandle) -> Result<WorkloadReport> {
    let started = Instant::now();
    let log = ExecutionLog::new();

    let managers: BTreeMap<String, ConfiguredManager> = workload
        .manager
        .iter()
        .map(|(name, cfg)| {
            let policy = Arc::new(ManualPolicy::new());
            policy.set_suspended(cfg.suspended);
            policy.set_priority_modifier(cfg.priority_modifier);
            let manager = TaskManager::new(name.clone(), policy.clone());
            (name.clone(), ConfiguredManager { manager, policy })
        })
        .collect();

    let idle = match &workload.idle {
        Some(cfg) => {
            let state = Arc::new(IdlePeriodState::new());
            let manager = controller.install_idle_manager(state.clone())?;
            Some((state, manager, Duration::from_millis(cfg.budget_ms)))
        }
        None => None,
    };

    let mut ids: BTreeMap<String, TaskId> = BTreeMap::new();
    for name in &workload.submission_order {
        let def = workload
            .task
            .get(name)
            .ok_or_else(|| TaskctlError::TaskNotFound(name.clone()))?;

        let body = SimulatedWork::new(name.clone(), def.work_ms, def.slice_ms, log.clone());
        let mut spec = TaskSpec::new(def.kind, def.priority, body);

        for dep in &def.after {
            let dep_id = ids
                .get(dep)
                .ok_or_else(|| TaskctlError::TaskNotFound(dep.clone()))?;
            spec = spec.depends_on(*dep_id);
        }

        if let Some(manager_name) = &def.manager {
            let manager = if manager_name == IDLE_MANAGER_NAME {
                idle.as_ref().map(|(_, manager, _)| manager.clone())
            } else {
                managers.get(manager_name).map(|m| m.manager.clone())
            }
            .ok_or_else(|| TaskctlError::TaskNotFound(format!("manager '{manager_name}'")))?;
            spec = spec.with_manager(&manager);
        }

        let id = controller.add_task(spec);
        debug!(task = %name, %id, "submitted workload task");
        ids.insert(name.clone(), id);
    }
    info!(tasks = ids.len(), "workload submitted");

    let mut idle_periods = 0u64;
    loop {
        if ids.values().all(|id| controller.task_state(*id) == TaskState::Completed) {
            break;
        }
        if controller.execute_next_main_thread_task() {
            continue;
        }

        let queued = controller.pending_main_thread_task_count_including_suspended();
        if queued > 0 && !controller.has_main_thread_pending_tasks() {
            if let Some((state, _, budget)) = &idle
                && !state.in_idle_period()
            {
                state.begin_idle_period(Instant::now() + *budget);
                idle_periods += 1;
                debug!(budget_ms = budget.as_millis() as u64, "opened idle period");
                continue;
            }

            if resume_when_rest_done(workload, &managers, &ids, controller) {
                controller.wake_main_thread();
                continue;
            }
        }

        controller.wait_for_task_or_message(Some(PUMP_WAIT));
    }

    if let Some((state, _, _)) = &idle {
        state.end_idle_period();
    }

    Ok(WorkloadReport {
        completion_order: log.completion_order(),
        records: log.records(),
        yields: log.yield_count(),
        idle_periods,
        ran_out_of_main_thread_tasks: controller.ran_out_of_main_thread_tasks(),
        elapsed: started.elapsed(),
    })
}

/// Resume every suspended manager once all tasks outside suspended managers
/// have completed. Returns whether anything was resumed.
fn resume_when_rest_done(
    workload: &WorkloadFile,
    managers: &BTreeMap<String, ConfiguredManager>,
    ids: &BTreeMap<String, TaskId>,
    controller: &ControllerHandle,
) -> bool {
    let suspended: Vec<&String> = managers
        .iter()
        .filter(|(_, m)| m.policy.is_suspended())
        .map(|(name, _)| name)
        .collect();
    if suspended.is_empty() {
        return false;
    }

    let rest_done = ids.iter().all(|(name, id)| {
        let in_suspended = workload
            .task
            .get(name)
            .and_then(|def| def.manager.as_ref())
            .is_some_and(|m| suspended.contains(&m));
        in_suspended || controller.task_state(*id) == TaskState::Completed
    });
    if !rest_done {
        return false;
    }

    for name in suspended {
        if let Some(m) = managers.get(name) {
            info!(manager = %name, "resuming suspended manager");
            m.policy.set_suspended(false);
        }
    }
    true
}

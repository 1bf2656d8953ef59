// src/lib.rs

//! A priority task scheduler with a designated main thread, a worker pool,
//! dependency-aware dispatch, cooperative interruption and idle-time
//! integration.
//!
//! Producers build a [`TaskSpec`] and submit it through a
//! [`ControllerHandle`]; the host pumps the main thread with
//! [`ControllerHandle::execute_next_main_thread_task`] or
//! [`ControllerHandle::process_pending_main_thread_task`].

pub mod cli;
pub mod config;
pub mod controller;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod types;
pub mod workload;

use anyhow::Result;
use tracing::info;

pub use crate::controller::{
    ControllerBuilder, ControllerHandle, IdlePeriodState, IdleStateProvider, SchedulerCore,
    SchedulerObserver, TaskContext, TaskController, TaskInfo,
};
pub use crate::errors::TaskctlError;
pub use crate::graph::{
    ManagerPolicy, ManualPolicy, TaskBody, TaskId, TaskManager, TaskSpec, TaskState, task_fn,
};
pub use crate::types::{PriorityLevel, TaskKind, TaskResult};

use crate::cli::CliArgs;
use crate::config::{
    ControllerConfig, WorkloadFile, load_and_validate, load_controller_config,
    validate_controller_config,
};
use crate::workload::{WorkloadReport, run_workload};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workload and controller config loading
/// - the process-wide controller
/// - the workload runner pumping the main thread
pub fn run(args: CliArgs) -> Result<()> {
    let workload = load_and_validate(&args.workload)?;

    let mut controller_cfg = match &args.controller {
        Some(path) => load_controller_config(path)?,
        None => workload.controller.clone(),
    };
    if let Some(threads) = args.threads {
        controller_cfg.thread_count = Some(threads);
        validate_controller_config(&controller_cfg)?;
    }

    if args.dry_run {
        print_dry_run(&workload, &controller_cfg);
        return Ok(());
    }

    let controller = TaskController::initialize(controller_cfg)?;
    let report = run_workload(&workload, &controller)?;
    info!(
        tasks = report.completion_order.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "workload finished"
    );
    print_report(&report);

    controller.shutdown();
    Ok(())
}

/// Simple dry-run output: controller bounds, managers, then tasks in the
/// order they would be submitted.
fn print_dry_run(workload: &WorkloadFile, controller: &ControllerConfig) {
    println!("taskctl dry-run");
    match controller.thread_count {
        Some(n) => println!("  controller.thread_count = {n}"),
        None => println!("  controller.thread_count = auto"),
    }
    println!(
        "  controller.threads in [{}, {}]",
        controller.min_threads, controller.max_threads
    );
    println!();

    if !workload.manager.is_empty() {
        println!("managers ({}):", workload.manager.len());
        for (name, manager) in workload.manager.iter() {
            println!(
                "  - {name} (suspended: {}, priority_modifier: {})",
                manager.suspended, manager.priority_modifier
            );
        }
        println!();
    }
    if let Some(idle) = &workload.idle {
        println!("idle budget: {} ms", idle.budget_ms);
        println!();
    }

    println!("tasks ({}):", workload.task.len());
    for name in workload.submission_order.iter() {
        let Some(task) = workload.task.get(name) else {
            continue;
        };
        println!("  - {name}");
        println!("      priority: {}, kind: {}", task.priority, task.kind);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(manager) = &task.manager {
            println!("      manager: {manager}");
        }
        println!("      work: {} ms in {} ms slices", task.work_ms, task.slice_ms);
    }
}

fn print_report(report: &WorkloadReport) {
    println!("completed {} tasks in {:?}", report.completion_order.len(), report.elapsed);
    for (position, name) in report.completion_order.iter().enumerate() {
        println!("  {:>3}. {name}", position + 1);
    }
    println!("yields: {}", report.yields);
    if report.idle_periods > 0 {
        println!("idle periods: {}", report.idle_periods);
    }
}

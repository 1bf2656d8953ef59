// tests/workload_runner.rs

mod common;
use crate::common::controller_with_threads;

use taskctl::workload::{RunEvent, run_workload};
use taskctl_test_utils::builders::{TaskConfigBuilder, WorkloadBuilder};

#[test]
fn test_chain_across_threads_completes_in_dependency_order() {
    let workload = WorkloadBuilder::new()
        .with_task("a", TaskConfigBuilder::off_main_thread(10).build())
        .with_task("b", TaskConfigBuilder::main_thread(10).after("a").build())
        .with_task("c", TaskConfigBuilder::main_thread(10).after("b").build())
        .build();
    let controller = controller_with_threads(2);

    let report = run_workload(&workload, &controller).expect("workload runs");
    assert_eq!(report.completion_order, vec!["a", "b", "c"]);

    let a_thread = report
        .records
        .iter()
        .find(|r| r.task == "a" && r.event == RunEvent::Completed)
        .map(|r| r.thread.clone())
        .expect("a completed");
    assert!(a_thread.starts_with("TestPool #"), "a ran on {a_thread}");
}

#[test]
fn test_independent_main_thread_tasks_follow_priority() {
    let workload = WorkloadBuilder::new()
        .with_task("x", TaskConfigBuilder::main_thread(0).level("idle").build())
        .with_task("y", TaskConfigBuilder::main_thread(0).level("control").build())
        .with_task("z", TaskConfigBuilder::main_thread(50).build())
        .build();
    let controller = controller_with_threads(1);

    let report = run_workload(&workload, &controller).expect("workload runs");
    assert_eq!(report.completion_order, vec!["y", "z", "x"]);
    assert_eq!(report.yields, 0);
}

#[test]
fn test_suspended_manager_is_resumed_after_other_work() {
    let workload = WorkloadBuilder::new()
        .with_manager("background", true, 0)
        .with_task("late", TaskConfigBuilder::main_thread(0).manager("background").build())
        .with_task("early", TaskConfigBuilder::main_thread(50).build())
        .build();
    let controller = controller_with_threads(1);

    let report = run_workload(&workload, &controller).expect("workload runs");
    assert_eq!(report.completion_order, vec!["early", "late"]);
}

#[test]
fn test_idle_tasks_run_in_idle_periods() {
    let workload = WorkloadBuilder::new()
        .with_idle(20)
        .with_task("cleanup", TaskConfigBuilder::main_thread(0).manager("idle").build())
        .with_task("work", TaskConfigBuilder::main_thread(50).build())
        .build();
    let controller = controller_with_threads(1);

    let report = run_workload(&workload, &controller).expect("workload runs");
    assert_eq!(report.completion_order, vec!["work", "cleanup"]);
    assert!(report.idle_periods >= 1);
    assert!(controller.idle_manager().is_some());
}

#[test]
fn test_pool_completion_unblocks_urgent_main_thread_work() {
    let workload = WorkloadBuilder::new()
        .with_task("quick", TaskConfigBuilder::off_main_thread(10).work_ms(5, 1).build())
        .with_task("after_quick", TaskConfigBuilder::main_thread(0).after("quick").build())
        .with_task("long", TaskConfigBuilder::main_thread(50).work_ms(200, 1).build())
        .build();
    let controller = controller_with_threads(1);

    // `long` is either interrupted by `after_quick` or never gets ahead of it.
    let report = run_workload(&workload, &controller).expect("workload runs");
    assert_eq!(report.completion_order, vec!["quick", "after_quick", "long"]);
}

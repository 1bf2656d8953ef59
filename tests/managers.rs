// tests/managers.rs

mod common;
use crate::common::{RecordingTask, RunLog, YieldingTask, drain_main_thread, main_only_controller};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use taskctl::{ManagerPolicy, ManualPolicy, TaskManager, TaskResult, TaskSpec, TaskState, task_fn};

fn manual_manager(name: &str) -> (TaskManager, Arc<ManualPolicy>) {
    let policy = Arc::new(ManualPolicy::new());
    let manager = TaskManager::new(name, policy.clone());
    (manager, policy)
}

#[test]
fn test_suspended_manager_hides_its_tasks() {
    let controller = main_only_controller();
    let log = RunLog::new();
    let (manager, policy) = manual_manager("background");

    for i in 0..4 {
        controller.add_task(
            TaskSpec::main_thread(10, RecordingTask::new(&format!("bg{i}"), &log)).with_manager(&manager),
        );
    }
    policy.set_suspended(true);

    assert_eq!(controller.pending_main_thread_task_count_including_suspended(), 4);
    assert!(!controller.has_main_thread_pending_tasks());
    assert!(!controller.execute_next_main_thread_task());
    assert!(log.is_empty());

    policy.set_suspended(false);
    assert!(controller.has_main_thread_pending_tasks());
    assert_eq!(drain_main_thread(&controller), 4);
    assert_eq!(log.entries(), vec!["bg0", "bg1", "bg2", "bg3"]);
}

#[test]
fn test_unmanaged_work_runs_while_manager_is_suspended() {
    let controller = main_only_controller();
    let log = RunLog::new();
    let (manager, policy) = manual_manager("background");
    policy.set_suspended(true);

    controller.add_task(TaskSpec::main_thread(0, RecordingTask::new("managed", &log)).with_manager(&manager));
    controller.add_task(TaskSpec::main_thread(50, RecordingTask::new("plain", &log)));

    assert!(controller.has_main_thread_pending_tasks());
    assert_eq!(drain_main_thread(&controller), 1);
    assert_eq!(log.entries(), vec!["plain"]);

    policy.set_suspended(false);
    drain_main_thread(&controller);
    assert_eq!(log.entries(), vec!["plain", "managed"]);
}

#[test]
fn test_priority_modifier_shifts_managed_tasks() {
    let controller = main_only_controller();
    let log = RunLog::new();
    let (manager, policy) = manual_manager("background");

    controller.add_task(TaskSpec::main_thread(10, RecordingTask::new("managed", &log)).with_manager(&manager));
    controller.add_task(TaskSpec::main_thread(20, RecordingTask::new("plain", &log)));

    // Takes effect on the next event-loop turn, which requeues the task.
    policy.set_priority_modifier(15);
    drain_main_thread(&controller);
    assert_eq!(log.entries(), vec!["plain", "managed"]);
}

#[test]
fn test_negative_priority_modifier_promotes_managed_tasks() {
    let controller = main_only_controller();
    let log = RunLog::new();
    let (manager, policy) = manual_manager("urgent");
    policy.set_priority_modifier(-30);

    controller.add_task(TaskSpec::main_thread(10, RecordingTask::new("plain", &log)));
    // The manager's first task registers it; its modifier is picked up on
    // the first event-loop turn.
    controller.add_task(TaskSpec::main_thread(30, RecordingTask::new("managed", &log)).with_manager(&manager));

    drain_main_thread(&controller);
    assert_eq!(log.entries(), vec!["managed", "plain"]);
}

#[derive(Default)]
struct CountingPolicy {
    will_run: AtomicUsize,
    did_run: AtomicUsize,
}

impl ManagerPolicy for CountingPolicy {
    fn is_suspended(&self) -> bool {
        false
    }

    fn will_run_task(&self) {
        self.will_run.fetch_add(1, Ordering::SeqCst);
    }

    fn did_run_task(&self) {
        self.did_run.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_manager_hooks_bracket_each_run() {
    let controller = main_only_controller();
    let log = RunLog::new();
    let policy = Arc::new(CountingPolicy::default());
    let manager = TaskManager::new("counted", policy.clone());

    controller.add_task(TaskSpec::main_thread(10, RecordingTask::new("a", &log)).with_manager(&manager));
    controller.add_task(TaskSpec::main_thread(10, RecordingTask::new("b", &log)).with_manager(&manager));
    controller.add_task(TaskSpec::main_thread(10, RecordingTask::new("plain", &log)));

    assert_eq!(drain_main_thread(&controller), 3);
    assert_eq!(policy.will_run.load(Ordering::SeqCst), 2);
    assert_eq!(policy.did_run.load(Ordering::SeqCst), 2);
}

#[test]
fn test_dependency_inside_one_manager_is_allowed() {
    let controller = main_only_controller();
    let log = RunLog::new();
    let (manager, _policy) = manual_manager("background");

    let a = controller.add_task(TaskSpec::main_thread(30, RecordingTask::new("a", &log)).with_manager(&manager));
    let b = controller.add_task(
        TaskSpec::main_thread(10, RecordingTask::new("b", &log))
            .with_manager(&manager)
            .depends_on(a),
    );

    drain_main_thread(&controller);
    assert_eq!(log.entries(), vec!["a", "b"]);
    assert_eq!(controller.task_state(b), TaskState::Completed);
}

#[test]
#[should_panic(expected = "belongs to another task manager")]
fn test_dependency_across_managers_panics() {
    let controller = main_only_controller();
    let log = RunLog::new();
    let (first, _p1) = manual_manager("first");
    let (second, _p2) = manual_manager("second");

    let a = controller.add_task(TaskSpec::main_thread(10, RecordingTask::new("a", &log)).with_manager(&first));
    controller.add_task(
        TaskSpec::main_thread(10, RecordingTask::new("b", &log))
            .with_manager(&second)
            .depends_on(a),
    );
}

#[test]
#[should_panic(expected = "off-main-thread tasks cannot belong to a task manager")]
fn test_managed_off_main_task_panics() {
    let controller = main_only_controller();
    let log = RunLog::new();
    let (manager, _policy) = manual_manager("background");

    controller.add_task(TaskSpec::off_main_thread(10, RecordingTask::new("a", &log)).with_manager(&manager));
}

#[test]
fn test_requeued_managed_task_still_counts_as_suspended_work() {
    let controller = main_only_controller();
    let log = RunLog::new();
    let (manager, policy) = manual_manager("background");

    let t = controller.add_task(TaskSpec::main_thread(10, YieldingTask::new("t", 1, &log)).with_manager(&manager));
    assert!(controller.execute_next_main_thread_task());
    assert_eq!(controller.task_state(t), TaskState::Queued);

    policy.set_suspended(true);
    assert!(!controller.has_main_thread_pending_tasks());
    assert!(!controller.execute_next_main_thread_task());

    policy.set_suspended(false);
    assert!(controller.execute_next_main_thread_task());
    assert_eq!(log.entries(), vec!["yield:t", "t"]);
}

#[test]
fn test_yielded_task_stays_managed_after_nested_sibling_completes() {
    let controller = main_only_controller();
    let log = RunLog::new();
    let (manager, policy) = manual_manager("background");

    let body_log = log.clone();
    let mut runs = 0;
    let outer = controller.add_task(
        TaskSpec::main_thread(
            1,
            task_fn("outer", move |cx| {
                body_log.record(format!("outer:{runs}"));
                runs += 1;
                if runs == 1 {
                    // Completes "inner", the manager's only other task.
                    cx.controller().execute_next_main_thread_task();
                    return TaskResult::Incomplete;
                }
                TaskResult::Complete
            }),
        )
        .with_manager(&manager),
    );
    controller.add_task(TaskSpec::main_thread(2, RecordingTask::new("inner", &log)).with_manager(&manager));

    assert!(controller.execute_next_main_thread_task());
    assert_eq!(log.entries(), vec!["outer:0", "inner"]);
    assert_eq!(controller.task_state(outer), TaskState::Queued);

    policy.set_suspended(true);
    assert!(!controller.has_main_thread_pending_tasks());
    assert!(!controller.execute_next_main_thread_task());
    assert_eq!(controller.pending_main_thread_task_count_including_suspended(), 1);

    policy.set_suspended(false);
    assert!(controller.execute_next_main_thread_task());
    assert_eq!(log.entries(), vec!["outer:0", "inner", "outer:1"]);
    assert_eq!(controller.task_state(outer), TaskState::Completed);
}

/// Submit a managed task from inside a plain task at `plain_priority` and
/// record the interruption the plain task saw.
fn interrupt_seen_by_plain_task(
    modifier: i32,
    managed_priority: u32,
    plain_priority: u32,
) -> Vec<String> {
    let controller = main_only_controller();
    let log = RunLog::new();
    let (manager, policy) = manual_manager("tab");
    policy.set_priority_modifier(modifier);

    // Keeps the manager registered so the first turn caches its modifier.
    controller.add_task(TaskSpec::main_thread(500, RecordingTask::new("anchor", &log)).with_manager(&manager));

    let body_log = log.clone();
    let body_manager = manager.clone();
    controller.add_task(TaskSpec::main_thread(
        plain_priority,
        task_fn("plain", move |cx| {
            cx.controller().add_task(
                TaskSpec::main_thread(managed_priority, RecordingTask::new("managed", &body_log))
                    .with_manager(&body_manager),
            );
            body_log.record(format!("interrupt:{:?}", cx.interrupt_requested()));
            TaskResult::Complete
        }),
    ));

    drain_main_thread(&controller);
    log.entries()
}

#[test]
fn test_deprioritized_managed_task_does_not_interrupt_more_urgent_work() {
    // Nominal 5 is more urgent than 10, effective 25 is not.
    let entries = interrupt_seen_by_plain_task(20, 5, 10);
    assert_eq!(entries, vec!["interrupt:None", "managed", "anchor"]);
}

#[test]
fn test_promoted_managed_task_interrupts_at_its_effective_priority() {
    // Nominal 30 is less urgent than 10, effective 0 is more.
    let entries = interrupt_seen_by_plain_task(-30, 30, 10);
    assert_eq!(entries, vec!["interrupt:Some(0)", "managed", "anchor"]);
}

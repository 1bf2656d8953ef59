// tests/pool_dispatch.rs

mod common;
use crate::common::{
    Gate, GatedTask, RecordingTask, RunLog, TEST_TIMEOUT, YieldingTask, controller_with_threads,
    pool_config, wait_until,
};

use std::time::Duration;

use taskctl::config::ControllerConfig;
use taskctl::controller::compute_pool_size;
use taskctl::{TaskResult, TaskSpec, TaskState, task_fn};

#[test]
fn test_off_main_task_is_dispatched_to_an_idle_pool_thread() {
    let controller = controller_with_threads(2);
    let gate = Gate::new();
    let log = RunLog::new();

    assert_eq!(controller.pool_thread_count(), 0);

    let a = controller.add_task(TaskSpec::off_main_thread(10, GatedTask::new("a", &gate, &log)));
    assert_eq!(controller.pool_thread_count(), 2);
    assert_eq!(controller.idle_thread_count(), 1);
    assert_eq!(controller.worker_task(0), Some(a));
    assert_eq!(controller.task_state(a), TaskState::Running);

    gate.open();
    assert!(wait_until(TEST_TIMEOUT, || controller.task_state(a) == TaskState::Completed));
    assert!(wait_until(TEST_TIMEOUT, || controller.idle_thread_count() == 2));
    assert_eq!(log.entries(), vec!["start:a", "a"]);
}

#[test]
fn test_busy_pool_interrupts_least_urgent_worker_and_keeps_dependency_order() {
    let controller = controller_with_threads(2);
    let gate = Gate::new();
    let log = RunLog::new();

    let blocker1 = controller.add_task(TaskSpec::off_main_thread(
        20,
        GatedTask::new("blocker1", &gate, &log),
    ));
    let blocker2 = controller.add_task(TaskSpec::off_main_thread(
        20,
        GatedTask::new("blocker2", &gate, &log),
    ));
    // Both bodies must have started so their interrupt flags are not reset.
    assert!(gate.wait_entered(2, TEST_TIMEOUT));
    assert_eq!(controller.idle_thread_count(), 0);

    let a = controller.add_task(TaskSpec::off_main_thread(10, RecordingTask::new("a", &log)));
    let b = controller.add_task(
        TaskSpec::off_main_thread(5, RecordingTask::new("b", &log)).depends_on(a),
    );

    let interrupts = [
        controller.interrupt_requested(blocker1),
        controller.interrupt_requested(blocker2),
    ];
    assert!(interrupts.contains(&Some(5)), "interrupts: {interrupts:?}");
    assert_eq!(controller.task_state(a), TaskState::Queued);
    assert_eq!(controller.task_state(b), TaskState::Queued);

    gate.open();
    assert!(wait_until(TEST_TIMEOUT, || controller.task_state(b) == TaskState::Completed));
    assert_eq!(controller.task_state(a), TaskState::Completed);

    let a_pos = log.position("a").expect("a ran");
    let b_pos = log.position("b").expect("b ran");
    assert!(a_pos < b_pos, "log: {:?}", log.entries());
}

#[test]
fn test_equally_urgent_work_does_not_interrupt() {
    let controller = controller_with_threads(1);
    let gate = Gate::new();
    let log = RunLog::new();

    let blocker = controller.add_task(TaskSpec::off_main_thread(
        20,
        GatedTask::new("blocker", &gate, &log),
    ));
    assert!(gate.wait_entered(1, TEST_TIMEOUT));

    controller.add_task(TaskSpec::off_main_thread(20, RecordingTask::new("same", &log)));
    controller.add_task(TaskSpec::off_main_thread(30, RecordingTask::new("later", &log)));
    assert_eq!(controller.interrupt_requested(blocker), None);

    gate.open();
    assert!(wait_until(TEST_TIMEOUT, || log.len() == 4));
    assert_eq!(log.entries(), vec!["start:blocker", "blocker", "same", "later"]);
}

#[test]
fn test_off_main_task_waits_for_main_thread_dependency() {
    let controller = controller_with_threads(2);
    let log = RunLog::new();

    let m = controller.add_task(TaskSpec::main_thread(10, RecordingTask::new("m", &log)));
    let o = controller.add_task(TaskSpec::off_main_thread(10, RecordingTask::new("o", &log)).depends_on(m));

    assert_eq!(controller.idle_thread_count(), 2);
    assert_eq!(controller.worker_task(0), None);
    assert_eq!(controller.task_state(o), TaskState::Queued);

    assert!(controller.execute_next_main_thread_task());
    assert!(wait_until(TEST_TIMEOUT, || controller.task_state(o) == TaskState::Completed));
    assert_eq!(log.entries(), vec!["m", "o"]);
}

#[test]
fn test_main_thread_blocks_until_pool_dependency_completes() {
    let controller = controller_with_threads(2);
    let gate = Gate::new();
    let log = RunLog::new();

    let o = controller.add_task(TaskSpec::off_main_thread(10, GatedTask::new("o", &gate, &log)));
    let m = controller.add_task(TaskSpec::main_thread(10, RecordingTask::new("m", &log)).depends_on(o));

    assert!(!controller.execute_next_main_thread_task());
    assert_eq!(controller.task_state(m), TaskState::Queued);

    let opener = gate.clone();
    let waiter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        opener.open();
    });

    assert!(controller.process_pending_main_thread_task(true));
    waiter.join().expect("gate opener panicked");

    assert_eq!(controller.task_state(m), TaskState::Completed);
    assert_eq!(log.entries(), vec!["start:o", "o", "m"]);
}

#[test]
fn test_yielding_pool_task_is_requeued_until_complete() {
    let controller = controller_with_threads(1);
    let log = RunLog::new();

    let t = controller.add_task(TaskSpec::off_main_thread(10, YieldingTask::new("t", 2, &log)));
    assert!(wait_until(TEST_TIMEOUT, || controller.task_state(t) == TaskState::Completed));
    assert_eq!(log.entries(), vec!["yield:t", "yield:t", "t"]);
}

#[test]
fn test_pool_threads_are_named_from_prefix() {
    let controller = controller_with_threads(1);
    let log = RunLog::new();

    let body_log = log.clone();
    let t = controller.add_task(TaskSpec::off_main_thread(
        10,
        task_fn("name-check", move |_cx| {
            let name = std::thread::current().name().unwrap_or_default().to_string();
            body_log.record(name);
            TaskResult::Complete
        }),
    ));

    assert!(wait_until(TEST_TIMEOUT, || controller.task_state(t) == TaskState::Completed));
    assert_eq!(log.entries(), vec!["TestPool #0"]);
}

#[test]
fn test_pool_task_can_submit_main_thread_work() {
    let controller = controller_with_threads(1);
    let log = RunLog::new();

    let body_log = log.clone();
    controller.add_task(TaskSpec::off_main_thread(
        10,
        task_fn("producer", move |cx| {
            cx.controller()
                .add_task(TaskSpec::main_thread(10, RecordingTask::new("consumer", &body_log)));
            TaskResult::Complete
        }),
    ));

    assert!(controller.wait_for_task_or_message(Some(TEST_TIMEOUT)));
    assert!(controller.process_pending_main_thread_task(true));
    assert_eq!(log.entries(), vec!["consumer"]);
}

#[test]
fn test_wait_for_task_or_message_times_out_without_work() {
    let controller = controller_with_threads(1);
    assert!(!controller.wait_for_task_or_message(Some(Duration::from_millis(10))));
}

#[test]
fn test_pool_size_prefers_env_then_config_then_cores() {
    let config = pool_config(3);
    assert_eq!(compute_pool_size(&config, None, 16), 3);
    assert_eq!(compute_pool_size(&config, Some(6), 16), 6);

    let auto = ControllerConfig::default();
    assert_eq!(compute_pool_size(&auto, None, 5), 4);
}

#[test]
fn test_pool_size_is_clamped_to_bounds() {
    let auto = ControllerConfig::default();
    assert_eq!(compute_pool_size(&auto, None, 64), 8);
    assert_eq!(compute_pool_size(&auto, None, 1), 2);
    assert_eq!(compute_pool_size(&auto, Some(100), 4), 8);

    let inverted = ControllerConfig {
        min_threads: 4,
        max_threads: 2,
        ..ControllerConfig::default()
    };
    assert_eq!(compute_pool_size(&inverted, None, 64), 4);
}

#![allow(dead_code)]

pub use taskctl_test_utils::bodies::{Gate, GatedTask, DeadlineTask, RecordingTask, RunLog, YieldingTask};
pub use taskctl_test_utils::{TEST_TIMEOUT, init_tracing, wait_until};

use taskctl::TaskController;
use taskctl::config::ControllerConfig;

/// Controller config with a fixed pool size and recognisable thread names.
pub fn pool_config(threads: usize) -> ControllerConfig {
    ControllerConfig {
        thread_count: Some(threads),
        min_threads: 1,
        max_threads: 8,
        thread_name_prefix: "TestPool".to_string(),
        ..ControllerConfig::default()
    }
}

/// Standalone controller whose main thread is the calling test thread.
pub fn controller_with_threads(threads: usize) -> TaskController {
    init_tracing();
    TaskController::new(pool_config(threads))
}

/// Standalone controller for tests that never submit off-main work.
pub fn main_only_controller() -> TaskController {
    init_tracing();
    TaskController::new(ControllerConfig::default())
}

/// Run main-thread tasks until none is runnable. Returns how many ran.
pub fn drain_main_thread(controller: &TaskController) -> usize {
    let mut ran = 0;
    while controller.execute_next_main_thread_task() {
        ran += 1;
    }
    ran
}

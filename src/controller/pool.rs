// src/controller/pool.rs

//! Worker pool sizing, spawning and the per-thread run loop.

use std::thread::{self, JoinHandle};

use parking_lot::MutexGuard;
use tracing::debug;

use crate::config::ControllerConfig;
use crate::controller::ControllerHandle;

/// Environment variable overriding the computed pool size.
pub const THREAD_COUNT_ENV_VAR: &str = "TASKCTL_THREADCOUNT";

/// Pool size from `TASKCTL_THREADCOUNT`, if set to a positive number.
pub fn thread_count_override() -> Option<usize> {
    std::env::var(THREAD_COUNT_ENV_VAR)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
}

/// Number of pool threads to start.
///
/// The env override wins over the configured `thread_count`; without either
/// the pool gets one thread per available core minus one for the main
/// thread. The result is clamped to `[min_threads, max_threads]`.
pub fn compute_pool_size(
    config: &ControllerConfig,
    env_override: Option<usize>,
    available_parallelism: usize,
) -> usize {
    let requested = env_override
        .or(config.thread_count)
        .unwrap_or_else(|| available_parallelism.saturating_sub(1));
    let max = config.max_threads.max(config.min_threads);
    requested.clamp(config.min_threads, max)
}

pub(crate) fn available_parallelism() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

pub(crate) fn spawn_pool_threads(handle: &ControllerHandle, size: usize) -> Vec<JoinHandle<()>> {
    let config = handle.config();

    (0..size)
        .map(|index| {
            let mut builder =
                thread::Builder::new().name(format!("{} #{index}", config.thread_name_prefix));
            if let Some(stack_size) = config.thread_stack_size {
                builder = builder.stack_size(stack_size);
            }
            let worker = handle.clone();
            builder
                .spawn(move || run_pool_thread(worker, index))
                .expect("failed to spawn task controller pool thread")
        })
        .collect()
}

fn run_pool_thread(handle: ControllerHandle, index: usize) {
    let Some(pool) = handle.shared.pool.get() else {
        return;
    };
    let cv = &pool.cvs[index];
    debug!(worker = index, "pool thread started");

    let mut core = handle.shared.core.lock();
    while !core.is_shutting_down() {
        let Some(mut ticket) = core.start_worker_run(index) else {
            cv.wait(&mut core);
            continue;
        };

        let result = MutexGuard::unlocked(&mut core, || handle.run_ticket(&mut ticket, None));

        let retired = core.finish_worker_run(index, ticket, result);
        handle.apply_commands(&mut core);

        // Bodies may submit work when dropped.
        MutexGuard::unlocked(&mut core, || drop(retired));
    }

    debug!(worker = index, "pool thread exiting");
}

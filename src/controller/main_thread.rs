// src/controller/main_thread.rs

//! Main-thread pumping and the idle-manager glue around it.

use std::time::{Duration, Instant};

use parking_lot::MutexGuard;
use tracing::{trace, warn};

use crate::controller::core::SchedulerCore;
use crate::controller::{ControllerHandle, IdleHookup};
use crate::types::TaskResult;

impl ControllerHandle {
    fn idle_hookup(&self) -> Option<&IdleHookup> {
        self.shared.idle.get()
    }

    /// Run at most one main-thread task. Returns whether a task ran.
    ///
    /// # Panics
    ///
    /// When called off the main thread.
    pub fn execute_next_main_thread_task(&self) -> bool {
        self.assert_main_thread("execute_next_main_thread_task");
        let mut core = self.shared.core.lock();
        self.execute_next_locked(&mut core)
    }

    /// Run one main-thread task. With `may_wait`, block until one actually
    /// ran (or the controller shuts down); suspended work does not count.
    ///
    /// # Panics
    ///
    /// When called off the main thread.
    pub fn process_pending_main_thread_task(&self, may_wait: bool) -> bool {
        self.assert_main_thread("process_pending_main_thread_task");
        let mut core = self.shared.core.lock();

        let ran = loop {
            let ran = self.execute_next_locked(&mut core);
            if ran || !may_wait || core.is_shutting_down() {
                break ran;
            }
            // Work may have arrived while the lock was released above.
            if !core.may_have_main_thread_task() {
                self.shared.main_thread_cv.wait(&mut core);
            }
        };

        if core.may_have_main_thread_task() {
            core.wake_main_thread();
            self.apply_commands(&mut core);
        }
        ran
    }

    /// Block until the main thread may have work, shutdown starts, or
    /// `timeout` elapses. Returns `false` only on timeout.
    ///
    /// # Panics
    ///
    /// When called off the main thread.
    pub fn wait_for_task_or_message(&self, timeout: Option<Duration>) -> bool {
        self.assert_main_thread("wait_for_task_or_message");
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut core = self.shared.core.lock();

        while !core.may_have_main_thread_task() && !core.is_shutting_down() {
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .main_thread_cv
                        .wait_until(&mut core, deadline)
                        .timed_out()
                    {
                        return core.may_have_main_thread_task();
                    }
                }
                None => self.shared.main_thread_cv.wait(&mut core),
            }
        }
        true
    }

    /// Whether a main-thread task could run now.
    ///
    /// Counts queued tasks against those owned by suspended managers instead
    /// of scanning, which relies on no unsuspended task depending on a
    /// suspended one. If only idle tasks make the answer "yes", the idle
    /// provider is asked to guarantee them a run.
    pub fn has_main_thread_pending_tasks(&self) -> bool {
        let idle = self.idle_hookup();
        let result = self.has_main_thread_pending_tasks_inner();
        if let Some(idle) = idle {
            idle.provider.clear_cached_idle_deadline();
        }
        result
    }

    fn has_main_thread_pending_tasks_inner(&self) -> bool {
        let idle = self.idle_hookup();

        for consider_idle in [false, true] {
            if consider_idle {
                let Some(idle) = idle else {
                    continue;
                };
                idle.provider.forget_pending_task_guarantee();
                idle.provider.cache_peeked_idle_deadline();
            }

            let mut core = self.shared.core.lock();
            let queued = core.main_thread_queue_len();
            if queued == 0 {
                return false;
            }

            let total_suspended = core.refresh_suspension();
            if queued > total_suspended {
                let idle_count = core.idle_task_count();
                let idle_needed = idle_count > 0
                    && !core.idle_manager_suspended()
                    && queued - idle_count <= total_suspended;
                drop(core);

                if idle_needed && let Some(idle) = idle {
                    idle.provider.enforce_pending_task_guarantee();
                }
                return true;
            }
        }
        false
    }

    /// One main-thread pass with the lock held, including the idle retry.
    fn execute_next_locked(&self, core: &mut MutexGuard<'_, SchedulerCore>) -> bool {
        let idle = self.idle_hookup();
        let mut task_ran = self.run_one_main_thread_task(core);

        if task_ran {
            if let Some(idle) = idle
                && core.only_suspended_work_remains()
            {
                MutexGuard::unlocked(core, || idle.provider.request_idle_deadline_if_needed());
            }
        } else if let Some(idle) = idle {
            if core.idle_task_count() > 0 {
                // The idle manager may have looked suspended only because no
                // deadline was cached yet.
                MutexGuard::unlocked(core, || idle.provider.update_cached_idle_deadline());
            } else {
                MutexGuard::unlocked(core, || idle.provider.ran_out_of_tasks());
            }
            task_ran = self.run_one_main_thread_task(core);
        }

        if let Some(idle) = idle {
            idle.provider.forget_pending_task_guarantee();
        }

        if core.main_thread_queue_len() == 0 {
            core.note_ran_out_of_main_thread_tasks();
            if let Some(idle) = idle {
                MutexGuard::unlocked(core, || idle.provider.ran_out_of_tasks());
            }
        }

        task_ran
    }

    fn run_one_main_thread_task(&self, core: &mut MutexGuard<'_, SchedulerCore>) -> bool {
        let idle = self.idle_hookup();

        let Some(mut ticket) = core.start_main_thread_run() else {
            self.apply_commands(core);
            if let Some(idle) = idle {
                MutexGuard::unlocked(core, || idle.provider.clear_cached_idle_deadline());
            }
            return false;
        };
        self.apply_commands(core);
        trace!(task = %ticket.id, name = %ticket.name, "running main-thread task");

        let result = MutexGuard::unlocked(core, || {
            let mut idle_deadline = None;
            if let Some(manager) = &ticket.manager {
                manager.policy().will_run_task();
                if let Some(idle) = idle {
                    if *manager == idle.manager {
                        idle_deadline = idle.provider.cached_idle_deadline();
                        if idle_deadline.is_none() {
                            // Unsuspended by the pending-task guarantee alone.
                            idle.provider.update_cached_idle_deadline();
                            idle_deadline = idle.provider.cached_idle_deadline();
                        }
                        match idle_deadline {
                            Some(deadline) => ticket.body.set_idle_deadline(deadline),
                            None => warn!(
                                task = %ticket.id,
                                name = %ticket.name,
                                "running idle task without an idle deadline"
                            ),
                        }
                    } else {
                        idle.provider.flag_not_idle();
                    }
                }
            }
            // Cleared before the body runs: it may re-enter the pump.
            if let Some(idle) = idle {
                idle.provider.clear_cached_idle_deadline();
            }

            let result = self.run_ticket(&mut ticket, idle_deadline);

            if let Some(manager) = &ticket.manager {
                manager.policy().did_run_task();
            }
            result
        });

        if result == TaskResult::Incomplete {
            trace!(task = %ticket.id, "main-thread task yielded");
        }
        let retired = core.finish_main_thread_run(ticket, result);
        self.apply_commands(core);
        MutexGuard::unlocked(core, || drop(retired));
        true
    }
}

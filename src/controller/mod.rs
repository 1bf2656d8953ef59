// src/controller/mod.rs

//! The task controller: the threaded shell around [`SchedulerCore`].
//!
//! Layout:
//! - `core.rs`: pure scheduling state and algorithms, no threads or IO.
//! - `pool.rs`: worker pool sizing and the pool thread loop.
//! - `main_thread.rs`: main-thread pumping and idle glue.
//! - `idle.rs`: idle deadline providers and the idle manager policy.
//! - `observer.rs`: optional host/profiler hooks.
//! - `context.rs`: what a running task body can see.
//!
//! Everything shared lives in one `Shared` behind an `Arc`. The graph lock
//! (`Shared::core`) guards the whole [`SchedulerCore`]; task bodies, manager
//! run hooks, idle providers and body drops always run with it released.

pub mod context;
pub mod core;
pub mod idle;
mod main_thread;
pub mod observer;
pub mod pool;

use std::ops::Deref;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace_span, warn};

pub use self::context::TaskContext;
pub use self::core::{CoreCommand, Retired, RunTicket, SchedulerCore, WorkerSlot};
pub use self::idle::{IdlePeriodState, IdlePolicy, IdleStateProvider};
pub use self::observer::{SchedulerObserver, TaskInfo};
pub use self::pool::{THREAD_COUNT_ENV_VAR, compute_pool_size};

use crate::config::ControllerConfig;
use crate::errors::{Result, TaskctlError};
use crate::graph::manager::TaskManager;
use crate::graph::task::{TaskId, TaskSpec, TaskState, next_task_seq, task_fn};
use crate::types::{TaskKind, TaskResult};

/// Set while the process-wide instance created by
/// [`TaskController::initialize`] is alive.
static PROCESS_INSTANCE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Default)]
struct PoolState {
    initialized: bool,
    shutdown_started: bool,
}

struct Pool {
    cvs: Vec<Condvar>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

struct IdleHookup {
    manager: TaskManager,
    provider: Arc<dyn IdleStateProvider>,
}

pub(crate) struct Shared {
    core: Mutex<SchedulerCore>,
    main_thread_cv: Condvar,
    pool: OnceLock<Pool>,
    pool_state: Mutex<PoolState>,
    config: ControllerConfig,
    main_thread: ThreadId,
    observer: Option<Arc<dyn SchedulerObserver>>,
    idle: OnceLock<IdleHookup>,
    process_instance: bool,
}

/// Builder for [`TaskController`].
#[derive(Default)]
pub struct ControllerBuilder {
    config: ControllerConfig,
    observer: Option<Arc<dyn SchedulerObserver>>,
}

impl ControllerBuilder {
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for a fixed pool size.
    pub fn thread_count(mut self, count: usize) -> Self {
        self.config.thread_count = Some(count);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SchedulerObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build a standalone controller. The calling thread becomes its main
    /// thread.
    pub fn build(self) -> TaskController {
        TaskController::from_parts(self.config, self.observer, false)
    }

    /// Build the process-wide controller; see [`TaskController::initialize`].
    pub fn initialize(self) -> Result<TaskController> {
        if PROCESS_INSTANCE.swap(true, Ordering::AcqRel) {
            return Err(TaskctlError::AlreadyInitialized);
        }
        Ok(TaskController::from_parts(self.config, self.observer, true))
    }
}

/// Owner of a controller instance. Shuts the controller down when dropped.
///
/// Derefs to [`ControllerHandle`]; hand clones of [`TaskController::handle`]
/// to producers.
pub struct TaskController {
    handle: ControllerHandle,
}

impl TaskController {
    /// Create the process-wide controller.
    ///
    /// Only one may be alive at a time; a second call before the first one
    /// was shut down returns [`TaskctlError::AlreadyInitialized`].
    pub fn initialize(config: ControllerConfig) -> Result<Self> {
        Self::builder().config(config).initialize()
    }

    /// Create a standalone controller (for embedding and tests).
    pub fn new(config: ControllerConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::default()
    }

    fn from_parts(
        config: ControllerConfig,
        observer: Option<Arc<dyn SchedulerObserver>>,
        process_instance: bool,
    ) -> Self {
        let shared = Shared {
            core: Mutex::new(SchedulerCore::new()),
            main_thread_cv: Condvar::new(),
            pool: OnceLock::new(),
            pool_state: Mutex::new(PoolState::default()),
            config,
            main_thread: thread::current().id(),
            observer,
            idle: OnceLock::new(),
            process_instance,
        };
        debug!(process_instance, "task controller created");
        Self {
            handle: ControllerHandle {
                shared: Arc::new(shared),
            },
        }
    }

    /// A cloneable handle for producers and task bodies.
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }
}

impl Deref for TaskController {
    type Target = ControllerHandle;

    fn deref(&self) -> &ControllerHandle {
        &self.handle
    }
}

impl Drop for TaskController {
    fn drop(&mut self) {
        self.handle.shutdown_inner();
    }
}

/// Cloneable, thread-safe access to a controller.
#[derive(Clone)]
pub struct ControllerHandle {
    pub(crate) shared: Arc<Shared>,
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("main_thread", &self.shared.main_thread)
            .field("process_instance", &self.shared.process_instance)
            .finish_non_exhaustive()
    }
}

impl ControllerHandle {
    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.shared.main_thread
    }

    pub(crate) fn assert_main_thread(&self, operation: &str) {
        assert!(
            self.is_main_thread(),
            "{operation} must be called on the controller's main thread"
        );
    }

    /// Submit a task. Returns its handle.
    ///
    /// The first off-main-thread task starts the worker pool. Tasks submitted
    /// after shutdown started are dropped and their handle reads as
    /// completed.
    ///
    /// # Panics
    ///
    /// On programmer errors, see [`SchedulerCore::add_task`].
    pub fn add_task(&self, spec: TaskSpec) -> TaskId {
        if spec.kind() == TaskKind::OffMainThreadOnly {
            self.ensure_pool();
        }

        let mut core = self.shared.core.lock();
        if core.is_shutting_down() {
            drop(core);
            warn!(?spec, "task submitted after shutdown, dropping it");
            return TaskId {
                key: usize::MAX,
                seq: next_task_seq(),
            };
        }

        let id = core.add_task(spec);
        self.apply_commands(&mut core);
        id
    }

    /// Wrap a closure as a main-thread task and submit it.
    pub fn dispatch_fn<F>(
        &self,
        name: impl Into<String>,
        priority: u32,
        manager: Option<&TaskManager>,
        f: F,
    ) -> TaskId
    where
        F: FnOnce() + Send + 'static,
    {
        let mut f = Some(f);
        let body = task_fn(name, move |_cx| {
            if let Some(f) = f.take() {
                f();
            }
            TaskResult::Complete
        });

        let mut spec = TaskSpec::main_thread(priority, body);
        if let Some(manager) = manager {
            spec = spec.with_manager(manager);
        }
        self.add_task(spec)
    }

    pub fn reprioritize_task(&self, id: TaskId, priority: u32) {
        let mut core = self.shared.core.lock();
        core.reprioritize_task(id, priority);
        self.apply_commands(&mut core);
    }

    pub fn task_state(&self, id: TaskId) -> TaskState {
        self.shared.core.lock().task_state(id)
    }

    /// Interruption requested for a live task, if any.
    pub fn interrupt_requested(&self, id: TaskId) -> Option<i64> {
        self.shared.core.lock().interrupt_requested(id)
    }

    /// Queued main-thread tasks, suspended ones included.
    pub fn pending_main_thread_task_count_including_suspended(&self) -> usize {
        self.shared.core.lock().main_thread_queue_len()
    }

    pub fn idle_thread_count(&self) -> usize {
        self.shared.core.lock().idle_thread_count()
    }

    /// Size of the pool; 0 until the first off-main-thread task.
    pub fn pool_thread_count(&self) -> usize {
        self.shared.core.lock().pool_thread_count()
    }

    /// Task assigned to pool thread `index`.
    pub fn worker_task(&self, index: usize) -> Option<TaskId> {
        self.shared.core.lock().worker_task(index)
    }

    pub fn ran_out_of_main_thread_tasks(&self) -> u64 {
        self.shared.core.lock().ran_out_of_main_thread_tasks()
    }

    /// Make the main thread re-examine its queue, e.g. after a manager's
    /// policy changed.
    pub fn wake_main_thread(&self) {
        let mut core = self.shared.core.lock();
        core.wake_main_thread();
        self.apply_commands(&mut core);
    }

    /// Designate the idle manager, fed by `provider`.
    ///
    /// Returns the manager to attach idle tasks to. Only one idle manager can
    /// be installed per controller.
    pub fn install_idle_manager(&self, provider: Arc<dyn IdleStateProvider>) -> Result<TaskManager> {
        let manager = TaskManager::new("idle", Arc::new(IdlePolicy::new(Arc::clone(&provider))));
        let hookup = IdleHookup {
            manager: manager.clone(),
            provider,
        };
        if self.shared.idle.set(hookup).is_err() {
            return Err(TaskctlError::IdleManagerInstalled);
        }

        self.shared.core.lock().set_idle_manager(manager.id());
        debug!(manager = %manager.id(), "idle manager installed");
        Ok(manager)
    }

    pub fn idle_manager(&self) -> Option<TaskManager> {
        self.shared.idle.get().map(|idle| idle.manager.clone())
    }

    /// Stop the controller: wake and join every pool thread and drop the
    /// tasks that never ran. Idempotent. Main thread only.
    pub fn shutdown(&self) {
        self.assert_main_thread("shutdown");
        self.shutdown_inner();
    }

    fn shutdown_inner(&self) {
        {
            let mut state = self.shared.pool_state.lock();
            if state.shutdown_started {
                return;
            }
            state.shutdown_started = true;
        }

        let dropped = {
            let mut core = self.shared.core.lock();
            core.begin_shutdown();
            self.apply_commands(&mut core);
            core.drain_queued()
        };
        drop(dropped);

        if let Some(pool) = self.shared.pool.get() {
            let handles = std::mem::take(&mut *pool.handles.lock());
            for handle in handles {
                if handle.join().is_err() {
                    error!("pool thread panicked during shutdown");
                }
            }
        }

        // Work requeued by pool threads that finished after the first drain.
        let leftover = self.shared.core.lock().drain_queued();
        drop(leftover);

        if self.shared.process_instance {
            PROCESS_INSTANCE.store(false, Ordering::Release);
        }
        info!("task controller shut down");
    }

    fn ensure_pool(&self) {
        let mut state = self.shared.pool_state.lock();
        if state.initialized || state.shutdown_started {
            return;
        }
        state.initialized = true;

        let size = compute_pool_size(
            &self.shared.config,
            pool::thread_count_override(),
            pool::available_parallelism(),
        );
        let pool = Pool {
            cvs: (0..size).map(|_| Condvar::new()).collect(),
            handles: Mutex::new(Vec::with_capacity(size)),
        };
        if self.shared.pool.set(pool).is_err() {
            return;
        }

        {
            let mut core = self.shared.core.lock();
            core.attach_workers(size);
            self.apply_commands(&mut core);
        }

        let handles = pool::spawn_pool_threads(self, size);
        if let Some(pool) = self.shared.pool.get() {
            *pool.handles.lock() = handles;
        }
        info!(threads = size, "task controller pool started");
    }

    /// Apply the wakeups the core asked for. Called with the graph lock held.
    pub(crate) fn apply_commands(&self, core: &mut SchedulerCore) {
        for command in core.take_commands() {
            match command {
                CoreCommand::NotifyWorker(index) => {
                    if let Some(cv) = self.shared.pool.get().and_then(|pool| pool.cvs.get(index)) {
                        cv.notify_one();
                    }
                }
                CoreCommand::WakeMainThread => {
                    if let Some(observer) = &self.shared.observer {
                        observer.on_dispatched_event();
                    }
                    self.shared.main_thread_cv.notify_all();
                }
            }
        }
    }

    /// Run a task body. Called with the graph lock released.
    ///
    /// A panicking body leaves the graph in an unknown state, so it is logged
    /// and the process aborts.
    pub(crate) fn run_ticket(&self, ticket: &mut RunTicket, idle_deadline: Option<Instant>) -> TaskResult {
        let info = TaskInfo {
            id: ticket.id,
            name: &ticket.name,
            priority: ticket.priority,
            kind: ticket.kind,
        };
        let span = trace_span!(
            "task",
            id = %ticket.id,
            name = %ticket.name,
            priority = ticket.priority,
            kind = %ticket.kind
        );
        let _entered = span.enter();

        if let Some(observer) = &self.shared.observer {
            observer.on_task_started(&info);
        }

        let cx = TaskContext::new(
            self,
            ticket.id,
            ticket.priority,
            ticket.kind,
            &ticket.interrupt,
            idle_deadline,
        );
        let body = &mut ticket.body;
        let result = match catch_unwind(AssertUnwindSafe(|| body.run(&cx))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(task = %info.id, name = info.name, %message, "task body panicked, aborting");
                std::process::abort();
            }
        };

        if let Some(observer) = &self.shared.observer {
            observer.on_task_finished(&info, result);
        }
        result
    }
}

// src/controller/idle.rs

//! Idle-time integration.
//!
//! One task manager can be designated as the idle manager. Its tasks only
//! run while the host has declared an idle period (a deadline is cached) or
//! while the scheduler has promised a pending idle task to the host.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::trace;

use crate::graph::manager::ManagerPolicy;

/// Source of idle deadlines.
///
/// `cached_idle_deadline` and `has_pending_task_guarantee` are read through
/// the idle manager's policy with the graph lock held, and
/// `forget_pending_task_guarantee` is called with it held after every
/// main-thread pass; these must be cheap and must not call into the
/// controller. All other methods are called with the lock released.
pub trait IdleStateProvider: Send + Sync + 'static {
    /// Deadline cached for the current main-thread pass, if any.
    fn cached_idle_deadline(&self) -> Option<Instant>;

    /// Cache the current deadline for a "is there pending work" query.
    fn cache_peeked_idle_deadline(&self);

    /// Refresh the cached deadline before retrying a main-thread pass.
    fn update_cached_idle_deadline(&self);

    fn clear_cached_idle_deadline(&self);

    /// Only idle (or suspended) work is left after running a task.
    fn request_idle_deadline_if_needed(&self) {}

    /// A non-idle managed task is about to run.
    fn flag_not_idle(&self) {}

    /// The main thread found nothing to run.
    fn ran_out_of_tasks(&self) {}

    fn has_pending_task_guarantee(&self) -> bool;

    fn enforce_pending_task_guarantee(&self);

    fn forget_pending_task_guarantee(&self);
}

/// Policy of the idle manager.
pub struct IdlePolicy {
    provider: Arc<dyn IdleStateProvider>,
}

impl IdlePolicy {
    pub fn new(provider: Arc<dyn IdleStateProvider>) -> Self {
        Self { provider }
    }
}

impl ManagerPolicy for IdlePolicy {
    fn is_suspended(&self) -> bool {
        self.provider.cached_idle_deadline().is_none() && !self.provider.has_pending_task_guarantee()
    }
}

#[derive(Debug, Default)]
struct PeriodInner {
    period_deadline: Option<Instant>,
    cached_deadline: Option<Instant>,
    pending_task_guarantee: bool,
    ran_out_of_tasks: u64,
    deadline_requests: u64,
    not_idle_flags: u64,
}

/// Bundled provider driven by the host.
///
/// The host opens an idle period with [`begin_idle_period`] when it has spare
/// time until a deadline, and closes it with [`end_idle_period`].
///
/// [`begin_idle_period`]: IdlePeriodState::begin_idle_period
/// [`end_idle_period`]: IdlePeriodState::end_idle_period
#[derive(Debug, Default)]
pub struct IdlePeriodState {
    inner: Mutex<PeriodInner>,
}

impl IdlePeriodState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_idle_period(&self, deadline: Instant) {
        trace!(?deadline, "idle period started");
        self.inner.lock().period_deadline = Some(deadline);
    }

    pub fn end_idle_period(&self) {
        let mut inner = self.inner.lock();
        inner.period_deadline = None;
        inner.cached_deadline = None;
    }

    pub fn in_idle_period(&self) -> bool {
        self.live_deadline(&self.inner.lock()).is_some()
    }

    /// How often the scheduler reported running out of main-thread work.
    pub fn ran_out_of_tasks_count(&self) -> u64 {
        self.inner.lock().ran_out_of_tasks
    }

    /// How often the scheduler asked for a fresh deadline.
    pub fn deadline_request_count(&self) -> u64 {
        self.inner.lock().deadline_requests
    }

    pub fn not_idle_count(&self) -> u64 {
        self.inner.lock().not_idle_flags
    }

    fn live_deadline(&self, inner: &PeriodInner) -> Option<Instant> {
        inner.period_deadline.filter(|deadline| *deadline > Instant::now())
    }
}

impl IdleStateProvider for IdlePeriodState {
    fn cached_idle_deadline(&self) -> Option<Instant> {
        self.inner.lock().cached_deadline
    }

    fn cache_peeked_idle_deadline(&self) {
        let mut inner = self.inner.lock();
        inner.cached_deadline = self.live_deadline(&inner);
    }

    // Deadlines come straight from the host, so peeking and updating agree.
    fn update_cached_idle_deadline(&self) {
        self.cache_peeked_idle_deadline();
    }

    fn clear_cached_idle_deadline(&self) {
        self.inner.lock().cached_deadline = None;
    }

    fn request_idle_deadline_if_needed(&self) {
        self.inner.lock().deadline_requests += 1;
    }

    fn flag_not_idle(&self) {
        self.inner.lock().not_idle_flags += 1;
    }

    fn ran_out_of_tasks(&self) {
        self.inner.lock().ran_out_of_tasks += 1;
    }

    fn has_pending_task_guarantee(&self) -> bool {
        self.inner.lock().pending_task_guarantee
    }

    fn enforce_pending_task_guarantee(&self) {
        self.inner.lock().pending_task_guarantee = true;
    }

    fn forget_pending_task_guarantee(&self) {
        self.inner.lock().pending_task_guarantee = false;
    }
}

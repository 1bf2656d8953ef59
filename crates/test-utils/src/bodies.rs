//! Task bodies for tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use taskctl::{TaskBody, TaskContext, TaskResult};
use tracing::{trace, warn};

/// Ordered log of events written by test bodies.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Position of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }
}

/// Records its name and completes.
pub struct RecordingTask {
    name: String,
    log: RunLog,
}

impl RecordingTask {
    pub fn new(name: &str, log: &RunLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
        }
    }
}

impl TaskBody for RecordingTask {
    fn run(&mut self, _cx: &TaskContext<'_>) -> TaskResult {
        self.log.record(self.name.clone());
        TaskResult::Complete
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    entered: usize,
}

/// Blocks gated bodies until opened.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (state, cv) = &*self.inner;
        state.lock().open = true;
        cv.notify_all();
    }

    /// Number of bodies that reached the gate so far.
    pub fn entered(&self) -> usize {
        self.inner.0.lock().entered
    }

    /// Wait until `count` bodies reached the gate.
    pub fn wait_entered(&self, count: usize, timeout: Duration) -> bool {
        let (state, cv) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut guard = state.lock();
        while guard.entered < count {
            if cv.wait_until(&mut guard, deadline).timed_out() {
                return guard.entered >= count;
            }
        }
        true
    }

    fn pass(&self) {
        let (state, cv) = &*self.inner;
        let mut guard = state.lock();
        guard.entered += 1;
        cv.notify_all();

        // Bounded, so a broken test fails instead of hanging the pool.
        let deadline = Instant::now() + Duration::from_secs(10);
        while !guard.open {
            if cv.wait_until(&mut guard, deadline).timed_out() {
                warn!(entered = guard.entered, "gate never opened, releasing body");
                break;
            }
        }
    }
}

/// Logs `start:<name>`, waits for its gate, then logs `<name>` and completes.
pub struct GatedTask {
    name: String,
    gate: Gate,
    log: RunLog,
}

impl GatedTask {
    pub fn new(name: &str, gate: &Gate, log: &RunLog) -> Self {
        Self {
            name: name.to_string(),
            gate: gate.clone(),
            log: log.clone(),
        }
    }
}

impl TaskBody for GatedTask {
    fn run(&mut self, _cx: &TaskContext<'_>) -> TaskResult {
        self.log.record(format!("start:{}", self.name));
        self.gate.pass();
        self.log.record(self.name.clone());
        TaskResult::Complete
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Returns `Incomplete` for its first `yields` runs (logging `yield:<name>`),
/// then logs `<name>` and completes.
pub struct YieldingTask {
    name: String,
    yields: usize,
    log: RunLog,
}

impl YieldingTask {
    pub fn new(name: &str, yields: usize, log: &RunLog) -> Self {
        Self {
            name: name.to_string(),
            yields,
            log: log.clone(),
        }
    }
}

impl TaskBody for YieldingTask {
    fn run(&mut self, _cx: &TaskContext<'_>) -> TaskResult {
        if self.yields > 0 {
            self.yields -= 1;
            trace!(task = %self.name, remaining = self.yields, "test body yielding");
            self.log.record(format!("yield:{}", self.name));
            return TaskResult::Incomplete;
        }
        self.log.record(self.name.clone());
        TaskResult::Complete
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Logs the idle deadline it was handed (`deadline:<name>`) and completes.
pub struct DeadlineTask {
    name: String,
    log: RunLog,
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl DeadlineTask {
    pub fn new(name: &str, log: &RunLog) -> (Self, Arc<Mutex<Option<Instant>>>) {
        let deadline = Arc::new(Mutex::new(None));
        let task = Self {
            name: name.to_string(),
            log: log.clone(),
            deadline: deadline.clone(),
        };
        (task, deadline)
    }
}

impl TaskBody for DeadlineTask {
    fn run(&mut self, cx: &TaskContext<'_>) -> TaskResult {
        if cx.idle_deadline().is_some() {
            self.log.record(format!("deadline:{}", self.name));
        }
        self.log.record(self.name.clone());
        TaskResult::Complete
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_idle_deadline(&mut self, deadline: Instant) {
        *self.deadline.lock() = Some(deadline);
    }
}

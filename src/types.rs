use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Where a task is allowed to run.
///
/// The set is closed on purpose: every dispatch path matches on it
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum TaskKind {
    /// Only ever runs on the designated main thread.
    #[serde(rename = "main")]
    MainThreadOnly,
    /// Only ever runs on a pool thread.
    #[serde(rename = "off-main")]
    OffMainThreadOnly,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::MainThreadOnly => f.write_str("main"),
            TaskKind::OffMainThreadOnly => f.write_str("off-main"),
        }
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" | "main-thread" => Ok(TaskKind::MainThreadOnly),
            "off-main" | "off-main-thread" | "pool" => Ok(TaskKind::OffMainThreadOnly),
            other => Err(format!(
                "invalid task kind: {other} (expected \"main\" or \"off-main\")"
            )),
        }
    }
}

/// The only two outcomes a task body can report.
///
/// `Incomplete` means the body yielded early (usually because an interruption
/// was requested); the task is requeued with its dependencies intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    Complete,
    Incomplete,
}

/// Named priority levels, most urgent first.
///
/// Priorities are plain `u32` values where lower means more urgent; these
/// names only exist so that configs and call sites can say what they mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PriorityLevel {
    Control,
    RenderBlocking,
    Vsync,
    InputHigh,
    MediumHigh,
    Normal,
    InputLow,
    DeferredTimers,
    Idle,
}

impl PriorityLevel {
    /// Numeric value used for ordering. Gaps leave room for custom levels.
    pub fn value(self) -> u32 {
        match self {
            PriorityLevel::Control => 0,
            PriorityLevel::RenderBlocking => 10,
            PriorityLevel::Vsync => 20,
            PriorityLevel::InputHigh => 30,
            PriorityLevel::MediumHigh => 40,
            PriorityLevel::Normal => 50,
            PriorityLevel::InputLow => 60,
            PriorityLevel::DeferredTimers => 70,
            PriorityLevel::Idle => 80,
        }
    }
}

impl From<PriorityLevel> for u32 {
    fn from(level: PriorityLevel) -> Self {
        level.value()
    }
}

impl FromStr for PriorityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "control" => Ok(PriorityLevel::Control),
            "render-blocking" => Ok(PriorityLevel::RenderBlocking),
            "vsync" => Ok(PriorityLevel::Vsync),
            "input-high" => Ok(PriorityLevel::InputHigh),
            "medium-high" => Ok(PriorityLevel::MediumHigh),
            "normal" => Ok(PriorityLevel::Normal),
            "input-low" => Ok(PriorityLevel::InputLow),
            "deferred-timers" => Ok(PriorityLevel::DeferredTimers),
            "idle" => Ok(PriorityLevel::Idle),
            other => Err(format!("unknown priority level: {other}")),
        }
    }
}

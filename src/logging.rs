// src/logging.rs

//! Logging setup for `taskctl` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `TASKCTL_LOG` environment variable: a plain level ("info", "debug")
//!    or `EnvFilter` directives ("info,taskctl::controller=trace")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout only carries the run summary.

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{fmt, format::FmtSpan};

use crate::cli::LogLevel;

/// Environment variable consulted when no CLI level is given.
pub const LOG_ENV_VAR: &str = "TASKCTL_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup. Thread names are on so pool output can be
/// told apart. When tracing is enabled anywhere, every per-task span reports
/// its busy and idle time when the run ends.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let filter = build_filter(cli_level, env_value.as_deref())?;

    let span_events = if filter.max_level_hint() == Some(LevelFilter::TRACE) {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_span_events(span_events)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;

    Ok(())
}

/// Resolve the subscriber filter from the CLI level and the raw value of
/// `TASKCTL_LOG`.
pub fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> Result<EnvFilter> {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());

    if let Some(lvl) = cli_level {
        let level = LevelFilter::from_level(level_from_log_level(lvl));
        return Ok(EnvFilter::builder()
            .with_default_directive(level.into())
            .parse_lossy(""));
    }

    let Some(value) = env_value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(builder.parse_lossy(""));
    };

    if let Some(level) = parse_level_str(value) {
        return Ok(EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(level).into())
            .parse_lossy(""));
    }

    builder
        .parse(value)
        .with_context(|| format!("invalid {LOG_ENV_VAR} value '{value}'"))
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

/// Parse a plain level name as accepted by `TASKCTL_LOG`.
pub fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

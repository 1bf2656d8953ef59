// src/cli.rs

//! CLI argument parsing for the `taskctl` demo binary using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskctl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskctl",
    version,
    about = "Run a TOML-described task graph on the priority task controller.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workload file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Workload.toml")]
    pub workload: String,

    /// Optional file with a `[controller]` section. Overrides the workload's
    /// own `[controller]` section.
    #[arg(long, value_name = "PATH")]
    pub controller: Option<String>,

    /// Fixed pool size (still clamped to the configured bounds).
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKCTL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the workload in submission order, but don't
    /// run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

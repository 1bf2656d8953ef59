// src/workload/mod.rs

//! Demo workloads: TOML-described task graphs run as simulated work.

pub mod runner;
pub mod simulated;

pub use runner::{WorkloadReport, run_workload};
pub use simulated::{ExecutionLog, ExecutionRecord, RunEvent, SimulatedWork};

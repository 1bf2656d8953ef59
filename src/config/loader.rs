// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{ControllerConfig, ControllerConfigFile, RawWorkloadFile, WorkloadFile};
use crate::config::validate::validate_controller_config;
use crate::errors::Result;

/// Load a workload file from a given path and return the raw `RawWorkloadFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (dependency cycles, unknown managers, etc.). Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkloadFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let workload: RawWorkloadFile = toml::from_str(&contents)?;
    Ok(workload)
}

/// Load a workload file and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for unknown `after` references, cycles, unknown managers,
///   managed off-main tasks and pool bounds.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkloadFile> {
    let raw = load_from_path(&path)?;
    WorkloadFile::try_from(raw)
}

/// Load a standalone `[controller]` config file and validate its bounds.
pub fn load_controller_config(path: impl AsRef<Path>) -> Result<ControllerConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    let file: ControllerConfigFile = toml::from_str(&contents)?;
    validate_controller_config(&file.controller)?;
    Ok(file.controller)
}

// src/config/mod.rs

//! Configuration loading and validation for taskctl.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load controller and workload files from disk (`loader.rs`).
//! - Validate pool bounds and workload graphs (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_controller_config, load_from_path};
pub use model::{
    ControllerConfig, IDLE_MANAGER_NAME, IdleConfig, ManagerConfig, PrioritySetting,
    RawWorkloadFile, TaskDef, WorkloadFile, WorkloadTaskConfig,
};
pub use validate::validate_controller_config;

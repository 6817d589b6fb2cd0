// src/config/mod.rs

//! Settings loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Read settings files and directories and merge them into jobs and
//!   targets (`loader.rs`).
//! - Warn about unknown names and requirement cycles (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{build_job, collect_files, default_config_paths, load_file, load_settings};
pub use model::{DaemonSettings, RunDirective, Settings, SettingsFile, parse_duration};
pub use validate::{launch_order, validate_settings};

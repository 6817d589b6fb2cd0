// src/exec/environment.rs

//! Environment resolution for launches.

use std::path::{Path, PathBuf};
use std::process::Command;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::errors::{LaunchError, Result};

/// Variables exported by sourcing `path` with `sh`, excluding those the
/// daemon already has with the same value.
pub fn source_file_environment(path: &Path) -> Result<Vec<(String, String)>> {
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(r#"set -a; . "$1"; env -0"#)
        .arg("sh")
        .arg(path)
        .output()?;

    if !output.status.success() {
        return Err(LaunchError::Launch(format!(
            "sourcing {} failed: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let vars = parse_env0(&output.stdout)
        .into_iter()
        .filter(|(key, value)| std::env::var(key).ok().as_deref() != Some(value.as_str()))
        .collect::<Vec<_>>();
    debug!(path = %path.display(), count = vars.len(), "sourced environment file");
    Ok(vars)
}

/// Parse `env -0` output.
pub fn parse_env0(bytes: &[u8]) -> Vec<(String, String)> {
    bytes
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            let (key, value) = entry.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Source files first, explicit entries last. A file that fails to source
/// is skipped.
pub fn resolve_environment(
    source_files: &[PathBuf],
    explicit: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged: IndexMap<String, String> = IndexMap::new();
    for path in source_files {
        match source_file_environment(path) {
            Ok(vars) => merged.extend(vars),
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring environment file"),
        }
    }
    merged.extend(explicit.iter().cloned());
    merged.into_iter().collect()
}

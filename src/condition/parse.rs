// src/condition/parse.rs

//! Compile an `if = { ... }` settings table into a [`Condition`].
//!
//! A table is an implicit AND of its entries:
//!
//! ```toml
//! if = { safemode = false, file_exists = ["/boot/home"], or = [{ read_only = "/boot" }] }
//! ```

use std::path::PathBuf;

use toml::Value;

use super::Condition;
use crate::errors::{LaunchError, Result};

/// Build a condition from the value of an `if` key.
///
/// A single entry is returned as-is; several entries are wrapped in `And`.
pub fn condition_from_value(value: &Value) -> Result<Condition> {
    let mut entries = entries_of(value)?;
    if entries.len() == 1 {
        Ok(entries.remove(0))
    } else {
        Ok(Condition::And(entries))
    }
}

/// Combine an existing condition with `not safemode`.
pub fn add_not_safemode(condition: Option<Condition>) -> Condition {
    let not_safemode = Condition::Not(vec![Condition::Safemode]);
    match condition {
        None => not_safemode,
        Some(Condition::And(mut children)) => {
            children.push(not_safemode);
            Condition::And(children)
        }
        Some(other) => Condition::And(vec![other, not_safemode]),
    }
}

/// Flatten a table (or array of tables) into one condition per entry.
fn entries_of(value: &Value) -> Result<Vec<Condition>> {
    match value {
        Value::Table(table) => table
            .iter()
            .map(|(name, arg)| condition_entry(name, arg))
            .collect(),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(entries_of(item)?);
            }
            Ok(out)
        }
        other => Err(LaunchError::Config(format!(
            "condition must be a table or an array of tables, got {}",
            other.type_str()
        ))),
    }
}

fn condition_entry(name: &str, arg: &Value) -> Result<Condition> {
    match name {
        "and" => Ok(Condition::And(entries_of(arg)?)),
        "or" => Ok(Condition::Or(entries_of(arg)?)),
        "not" => Ok(Condition::Not(entries_of(arg)?)),
        "safemode" => match arg {
            Value::Boolean(true) => Ok(Condition::Safemode),
            Value::Boolean(false) => Ok(Condition::Not(vec![Condition::Safemode])),
            other => Err(bad_argument(name, other)),
        },
        "read_only" => match arg {
            Value::Boolean(true) => Ok(Condition::ReadOnly(None)),
            Value::String(path) if path.is_empty() => Ok(Condition::ReadOnly(None)),
            Value::String(path) => Ok(Condition::ReadOnly(Some(PathBuf::from(path)))),
            other => Err(bad_argument(name, other)),
        },
        "file_exists" => Ok(Condition::FileExists(paths_of(name, arg)?)),
        unknown => Err(LaunchError::Config(format!(
            "unknown condition '{unknown}'"
        ))),
    }
}

fn paths_of(name: &str, arg: &Value) -> Result<Vec<PathBuf>> {
    match arg {
        Value::String(path) => Ok(vec![PathBuf::from(path)]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(path) => Ok(PathBuf::from(path)),
                other => Err(bad_argument(name, other)),
            })
            .collect(),
        other => Err(bad_argument(name, other)),
    }
}

fn bad_argument(name: &str, value: &Value) -> LaunchError {
    LaunchError::Config(format!(
        "invalid argument for condition '{name}': {value}"
    ))
}

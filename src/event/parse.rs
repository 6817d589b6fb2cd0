// src/event/parse.rs

//! Compile an `on = { ... }` settings table into an [`EventTree`].
//!
//! A table is an implicit OR of its entries. Names that are not built in
//! refer to external events:
//!
//! ```toml
//! on = { network_available = true, hw_ready = ["usb"] }
//! ```

use std::path::PathBuf;

use toml::Value;

use super::{EventId, EventKind, EventTree};
use crate::errors::{LaunchError, Result};

/// Build an event tree whose root is an `Or` over the entries of `value`.
pub fn event_from_value(value: &Value) -> Result<EventTree> {
    let mut tree = EventTree::new(EventKind::Or);
    let root = tree.root();
    add_entries(&mut tree, root, value)?;
    Ok(tree)
}

fn add_entries(tree: &mut EventTree, parent: EventId, value: &Value) -> Result<()> {
    match value {
        Value::Table(table) => {
            for (name, arg) in table {
                add_entry(tree, parent, name, arg)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                add_entries(tree, parent, item)?;
            }
            Ok(())
        }
        other => Err(LaunchError::Config(format!(
            "event must be a table or an array of tables, got {}",
            other.type_str()
        ))),
    }
}

fn add_entry(tree: &mut EventTree, parent: EventId, name: &str, arg: &Value) -> Result<()> {
    match name {
        "or" | "and" => {
            let kind = if name == "or" {
                EventKind::Or
            } else {
                EventKind::And
            };
            let container = tree.add_child(parent, kind);
            add_entries(tree, container, arg)?;
            if tree.children(container).is_empty() {
                return Err(LaunchError::Config(format!("empty '{name}' event")));
            }
        }
        "demand" => {
            if flag(name, arg)? {
                tree.add_child(parent, EventKind::Demand);
            }
        }
        "volume_mounted" => {
            if flag(name, arg)? {
                tree.add_child(parent, EventKind::VolumeMounted);
            }
        }
        "network_available" => {
            if flag(name, arg)? {
                tree.add_child(parent, EventKind::NetworkAvailable);
            }
        }
        "file_created" => match arg {
            Value::String(path) => {
                tree.add_child(parent, EventKind::FileCreated(PathBuf::from(path)));
            }
            Value::Array(paths) => {
                for path in paths {
                    let Value::String(path) = path else {
                        return Err(bad_argument(name, path));
                    };
                    tree.add_child(parent, EventKind::FileCreated(PathBuf::from(path)));
                }
            }
            other => return Err(bad_argument(name, other)),
        },
        external => {
            let args = match arg {
                Value::Boolean(false) => return Ok(()),
                Value::Boolean(true) => Vec::new(),
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        other => Err(bad_argument(external, other)),
                    })
                    .collect::<Result<_>>()?,
                other => return Err(bad_argument(external, other)),
            };
            tree.add_child(
                parent,
                EventKind::External {
                    name: external.to_string(),
                    args,
                    resolved: None,
                },
            );
        }
    }
    Ok(())
}

fn flag(name: &str, arg: &Value) -> Result<bool> {
    match arg {
        Value::Boolean(b) => Ok(*b),
        other => Err(bad_argument(name, other)),
    }
}

fn bad_argument(name: &str, value: &Value) -> LaunchError {
    LaunchError::Config(format!("invalid argument for event '{name}': {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<EventTree> {
        let value: Value = toml::from_str(src)?;
        let on = value
            .get("on")
            .cloned()
            .ok_or_else(|| LaunchError::Config("missing on".into()))?;
        event_from_value(&on)
    }

    #[test]
    fn unknown_names_become_external_events() {
        let tree = parse(r#"on = { hw_ready = ["usb", "0"] }"#).unwrap();
        let child = tree.children(tree.root())[0];
        assert_eq!(
            tree.kind(child),
            &EventKind::External {
                name: "hw_ready".into(),
                args: vec!["usb".into(), "0".into()],
                resolved: None,
            }
        );
    }

    #[test]
    fn nested_and_is_built() {
        let tree = parse(
            r#"on = { and = [{ volume_mounted = true }, { network_available = true }] }"#,
        )
        .unwrap();
        let and = tree.children(tree.root())[0];
        assert_eq!(tree.kind(and), &EventKind::And);
        assert_eq!(tree.children(and).len(), 2);
    }

    #[test]
    fn empty_container_is_rejected() {
        assert!(parse("on = { or = [] }").is_err());
    }
}

// src/condition/mod.rs

//! Boolean launch conditions.
//!
//! A [`Condition`] is a small predicate tree evaluated against a
//! [`ConditionContext`]. Evaluation is pure: the context is a snapshot of the
//! facts read at startup (safe mode, boot volume state) plus side-effect free
//! filesystem queries.
//!
//! - [`context`] holds the context trait and the production implementation.
//! - [`parse`] compiles the generic settings tree into conditions.

pub mod context;
pub mod parse;

use std::fmt;
use std::path::PathBuf;

pub use context::{ConditionContext, SystemContext};
pub use parse::{add_not_safemode, condition_from_value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// True iff every child is true (vacuously true when empty).
    And(Vec<Condition>),
    /// True iff any child is true; an empty `Or` is also true.
    Or(Vec<Condition>),
    /// True iff none of the children are true.
    Not(Vec<Condition>),
    Safemode,
    /// `None` asks about the boot volume.
    ReadOnly(Option<PathBuf>),
    /// True only if all paths exist.
    FileExists(Vec<PathBuf>),
}

impl Condition {
    pub fn test(&self, context: &dyn ConditionContext) -> bool {
        match self {
            Condition::And(children) => children.iter().all(|c| c.test(context)),
            Condition::Or(children) => {
                children.is_empty() || children.iter().any(|c| c.test(context))
            }
            Condition::Not(children) => !children.iter().any(|c| c.test(context)),
            Condition::Safemode => context.is_safe_mode(),
            Condition::ReadOnly(None) => context.boot_volume_is_read_only(),
            Condition::ReadOnly(Some(path)) => context.is_read_only(path),
            Condition::FileExists(paths) => paths.iter().all(|p| context.file_exists(p)),
        }
    }

    /// Whether the result of [`Condition::test`] can never change for the
    /// lifetime of the given context.
    pub fn is_constant(&self, context: &dyn ConditionContext) -> bool {
        match self {
            Condition::And(children) => {
                children.iter().all(|c| c.is_constant(context))
                    || children
                        .iter()
                        .any(|c| c.is_constant(context) && !c.test(context))
            }
            Condition::Or(children) | Condition::Not(children) => {
                children.iter().all(|c| c.is_constant(context))
                    || children
                        .iter()
                        .any(|c| c.is_constant(context) && c.test(context))
            }
            Condition::Safemode | Condition::ReadOnly(_) => true,
            Condition::FileExists(_) => false,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Condition::And(_) | Condition::Or(_) | Condition::Not(_)
        )
    }

    pub fn children(&self) -> &[Condition] {
        match self {
            Condition::And(c) | Condition::Or(c) | Condition::Not(c) => c,
            _ => &[],
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    f.write_str("[")?;
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]")
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::And(c) => {
                f.write_str("and ")?;
                write_list(f, c)
            }
            Condition::Or(c) => {
                f.write_str("or ")?;
                write_list(f, c)
            }
            Condition::Not(c) => {
                f.write_str("not ")?;
                write_list(f, c)
            }
            Condition::Safemode => f.write_str("safemode"),
            Condition::ReadOnly(None) => f.write_str("read_only"),
            Condition::ReadOnly(Some(path)) => write!(f, "read_only {}", path.display()),
            Condition::FileExists(paths) => {
                let shown: Vec<_> = paths.iter().map(|p| p.display()).collect();
                f.write_str("file_exists ")?;
                write_list(f, &shown)
            }
        }
    }
}

// src/dag/base.rs

//! State shared by jobs and targets.

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::condition::{Condition, ConditionContext};
use crate::event::EventTree;
use crate::types::NameKey;

#[derive(Debug, Clone)]
pub struct BaseJob {
    pub name: NameKey,
    pub condition: Option<Condition>,
    pub event: Option<EventTree>,
    /// Explicit `KEY=VALUE` entries, in definition order.
    pub environment: IndexMap<String, String>,
    /// Shell scripts whose exported variables are added at launch time.
    pub source_files: Vec<PathBuf>,
    /// Jobs that could not be launched because this one was not ready yet.
    pub pending: Vec<NameKey>,
}

impl BaseJob {
    pub fn new(name: impl Into<NameKey>) -> Self {
        Self {
            name: name.into(),
            condition: None,
            event: None,
            environment: IndexMap::new(),
            source_files: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn check_condition(&self, context: &dyn ConditionContext) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|condition| condition.test(context))
    }

    /// A missing event counts as fired.
    pub fn event_triggered(&self) -> bool {
        self.event.as_ref().is_none_or(|event| event.triggered())
    }

    pub fn add_pending(&mut self, name: &NameKey) {
        if !self.pending.contains(name) {
            self.pending.push(name.clone());
        }
    }
}

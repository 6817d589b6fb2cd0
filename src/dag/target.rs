// src/dag/target.rs

use serde_json::{Map, Value};

use super::base::BaseJob;
use crate::types::NameKey;

/// Named group of jobs sharing a condition and an event gate.
#[derive(Debug, Clone)]
pub struct Target {
    pub base: BaseJob,
    launched: bool,
    /// Named sub-messages attached by `LaunchTarget`, handed to the jobs.
    pub data: Map<String, Value>,
}

impl Target {
    pub fn new(name: impl Into<NameKey>) -> Self {
        Self {
            base: BaseJob::new(name),
            launched: false,
            data: Map::new(),
        }
    }

    pub fn name(&self) -> &NameKey {
        &self.base.name
    }

    pub fn has_launched(&self) -> bool {
        self.launched
    }

    pub fn set_launched(&mut self, launched: bool) {
        self.launched = launched;
    }

    /// Merge launch-time data into the bag; later keys win.
    pub fn add_data(&mut self, data: Map<String, Value>) {
        self.data.extend(data);
    }

    /// Copy under a new name, with no launch state.
    pub fn derive(&self, name: NameKey) -> Target {
        let mut copy = self.clone();
        copy.base.name = name;
        copy.base.pending.clear();
        copy.launched = false;
        copy.data = Map::new();
        if let Some(event) = copy.base.event.as_mut() {
            event.unbind();
        }
        copy
    }
}

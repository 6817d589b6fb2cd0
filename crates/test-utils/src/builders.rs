#![allow(dead_code)]

use std::path::PathBuf;

use launch_daemon::condition::Condition;
use launch_daemon::config::{RunDirective, Settings, load_settings};
use launch_daemon::dag::{Job, PortSpec, Target};
use launch_daemon::event::events::add_on_demand;
use launch_daemon::event::{EventKind, EventTree};
use launch_daemon::fs::mock::MockFileSystem;
use launch_daemon::types::NameKey;

/// Builder for `Settings` to simplify test setup.
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
        }
    }

    pub fn with_job(mut self, job: Job) -> Self {
        self.settings.jobs.insert(job.name().clone(), job);
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.settings.targets.insert(target.name().clone(), target);
        self
    }

    /// Unconditional `[[run]]` of `target`.
    pub fn run(mut self, target: &str) -> Self {
        self.settings.run.push(RunDirective {
            condition: None,
            then: vec![NameKey::from(target)],
            otherwise: Vec::new(),
        });
        self
    }

    pub fn run_if(mut self, condition: Condition, then: &str, otherwise: &str) -> Self {
        self.settings.run.push(RunDirective {
            condition: Some(condition),
            then: vec![NameKey::from(then)],
            otherwise: vec![NameKey::from(otherwise)],
        });
        self
    }

    pub fn max_restarts(mut self, max_restarts: u32) -> Self {
        self.settings.daemon.restart.max_restarts = max_restarts;
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `Job`.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            job: Job::new(name),
        }
    }

    pub fn service(name: &str) -> Self {
        let mut job = Job::new(name);
        job.set_service(true);
        job.legacy = false;
        Self { job }
    }

    pub fn launch(mut self, args: &[&str]) -> Self {
        self.job.arguments = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn requires(mut self, name: &str) -> Self {
        self.job.requirements.push(NameKey::from(name));
        self
    }

    pub fn target(mut self, target: &str) -> Self {
        self.job.target = Some(NameKey::from(target));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.job.set_enabled(false);
        self
    }

    pub fn on_demand(mut self) -> Self {
        self.job.base.event = Some(add_on_demand(self.job.base.event.take()));
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.job.base.condition = Some(condition);
        self
    }

    pub fn event(mut self, event: EventTree) -> Self {
        self.job.base.event = Some(event);
        self
    }

    /// Single-leaf `Or` event.
    pub fn on(self, kind: EventKind) -> Self {
        self.event(single_event(kind))
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.job
            .base
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn source_file(mut self, path: &str) -> Self {
        self.job.base.source_files.push(PathBuf::from(path));
        self
    }

    pub fn port(mut self, name: &str) -> Self {
        self.job.ports.push(PortSpec {
            name: name.to_string(),
            capacity: 10,
        });
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for `Target`.
pub struct TargetBuilder {
    target: Target,
}

impl TargetBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            target: Target::new(name),
        }
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.target.base.condition = Some(condition);
        self
    }

    pub fn on(mut self, kind: EventKind) -> Self {
        self.target.base.event = Some(single_event(kind));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.target
            .base
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Target {
        self.target
    }
}

/// `Or` root with a single `kind` child.
pub fn single_event(kind: EventKind) -> EventTree {
    let mut tree = EventTree::new(EventKind::Or);
    let root = tree.root();
    tree.add_child(root, kind);
    tree
}

/// `External` event leaf called `name`.
pub fn external(name: &str) -> EventKind {
    EventKind::External {
        name: name.to_string(),
        args: Vec::new(),
        resolved: None,
    }
}

/// Parse a settings file through the real loader.
pub fn settings_from_toml(contents: &str) -> Settings {
    let fs = MockFileSystem::new();
    fs.add_file("/etc/launch_daemon/test.toml", contents);
    load_settings(&fs, &[PathBuf::from("/etc/launch_daemon/test.toml")])
}

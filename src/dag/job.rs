// src/dag/job.rs

//! Launchable jobs and their one-time dependency initialization.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::base::BaseJob;
use super::target::Target;
use crate::condition::ConditionContext;
use crate::errors::StatusCode;
use crate::types::NameKey;

/// Capacity of the implicit port non-legacy jobs get.
pub const DEFAULT_PORT_CAPACITY: u32 = 100;

/// Memoized result of [`init_job`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InitStatus {
    #[default]
    NotInitialized,
    Ok,
    Failed(StatusCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_capacity() -> u32 {
    DEFAULT_PORT_CAPACITY
}

#[derive(Debug, Clone)]
pub struct Job {
    pub base: BaseJob,
    enabled: bool,
    service: bool,
    /// Legacy jobs get no implicit port.
    pub legacy: bool,
    /// Executable and argv; empty means "launch by signature" (the job name).
    pub arguments: Vec<String>,
    pub requirements: Vec<NameKey>,
    /// Owning target, if any. Resolved by name through the daemon's arena.
    pub target: Option<NameKey>,
    pub ports: Vec<PortSpec>,
    init_status: InitStatus,

    launching: bool,
    pid: Option<u32>,
    /// A one-shot job whose process has come and gone.
    completed: bool,
    /// Port ids handed out for the current launch, by port name.
    port_ids: IndexMap<String, u32>,
    last_error: Option<String>,
}

impl Job {
    pub fn new(name: impl Into<NameKey>) -> Self {
        Self {
            base: BaseJob::new(name),
            enabled: true,
            service: false,
            legacy: true,
            arguments: Vec::new(),
            requirements: Vec::new(),
            target: None,
            ports: Vec::new(),
            init_status: InitStatus::NotInitialized,
            launching: false,
            pid: None,
            completed: false,
            port_ids: IndexMap::new(),
            last_error: None,
        }
    }

    pub fn name(&self) -> &NameKey {
        &self.base.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_service(&self) -> bool {
        self.service
    }

    pub fn set_service(&mut self, service: bool) {
        self.service = service;
    }

    pub fn is_launching(&self) -> bool {
        self.launching
    }

    pub fn set_launching(&mut self, launching: bool) {
        self.launching = launching;
        if launching {
            self.completed = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_completed(&self) -> bool {
        self.completed
    }

    /// Good enough for a dependent: running, on its way, or a one-shot that
    /// already ran.
    pub fn is_satisfied(&self) -> bool {
        self.is_running() || self.launching || self.completed
    }

    pub fn init_status(&self) -> &InitStatus {
        &self.init_status
    }

    pub fn port_ids(&self) -> &IndexMap<String, u32> {
        &self.port_ids
    }

    pub fn set_port_ids(&mut self, ids: IndexMap<String, u32>) {
        self.port_ids = ids;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Enabled, not mid-launch, and (one-shot or not currently running).
    pub fn can_be_launched(&self) -> bool {
        self.enabled && !self.launching && (!self.service || !self.is_running())
    }

    /// The owning target must have done its first launch pass before the
    /// job's own condition is consulted.
    pub fn check_condition(&self, context: &dyn ConditionContext, target: Option<&Target>) -> bool {
        if let Some(target) = target {
            if !target.has_launched() {
                return false;
            }
        }
        self.base.check_condition(context)
    }

    /// The launch finished; `pid` is now the job's process.
    pub fn set_team(&mut self, pid: u32) {
        self.launching = false;
        self.pid = Some(pid);
        self.last_error = None;
    }

    pub fn launch_failed(&mut self, error: String) {
        self.launching = false;
        self.pid = None;
        self.port_ids.clear();
        self.last_error = Some(error);
    }

    /// The job's process is gone. For a one-shot job that means it is done.
    pub fn team_deleted(&mut self) {
        self.pid = None;
        self.port_ids.clear();
        if !self.service {
            self.completed = true;
        }
    }

    /// Ports to create on launch, including the implicit default port.
    pub fn effective_ports(&self) -> Vec<PortSpec> {
        if self.ports.is_empty() && !self.legacy {
            return vec![PortSpec {
                name: String::new(),
                capacity: DEFAULT_PORT_CAPACITY,
            }];
        }
        self.ports.clone()
    }

    /// Copy of this job for a derived target, with fresh runtime state.
    pub fn derive(&self, name: NameKey, target: NameKey) -> Job {
        let mut copy = self.clone();
        copy.base.name = name;
        copy.base.pending.clear();
        copy.target = Some(target);
        copy.init_status = InitStatus::NotInitialized;
        copy.launching = false;
        copy.pid = None;
        copy.completed = false;
        copy.port_ids.clear();
        copy.last_error = None;
        if let Some(event) = copy.base.event.as_mut() {
            event.unbind();
        }
        copy
    }
}

/// Name lookup used during initialization.
pub trait JobFinder {
    fn job_mut(&mut self, name: &NameKey) -> Option<&mut Job>;
    fn has_target(&self, name: &NameKey) -> bool;
}

impl JobFinder for (&mut IndexMap<NameKey, Job>, &IndexMap<NameKey, Target>) {
    fn job_mut(&mut self, name: &NameKey) -> Option<&mut Job> {
        self.0.get_mut(name)
    }

    fn has_target(&self, name: &NameKey) -> bool {
        self.1.contains_key(name)
    }
}

/// Resolve the requirements of `name`, once.
///
/// `dependencies` holds the names on the current requirement chain; each
/// branch gets its own copy so siblings do not see each other. A name that
/// shows up again on the chain is a cycle.
pub fn init_job(
    finder: &mut dyn JobFinder,
    name: &NameKey,
    dependencies: &HashSet<NameKey>,
) -> Result<(), StatusCode> {
    let requirements = {
        let job = finder.job_mut(name).ok_or(StatusCode::NameNotFound)?;
        match job.init_status() {
            InitStatus::Ok => return Ok(()),
            InitStatus::Failed(status) => return Err(status.clone()),
            InitStatus::NotInitialized => {}
        }
        job.requirements.clone()
    };

    let mut chain = dependencies.clone();
    chain.insert(name.clone());

    let mut status = Ok(());
    for requirement in &requirements {
        if chain.contains(requirement) {
            status = Err(StatusCode::BadValue);
            break;
        }
        if finder.job_mut(requirement).is_some() {
            if let Err(err) = init_job(finder, requirement, &chain) {
                status = Err(err);
                break;
            }
        } else if !finder.has_target(requirement) {
            status = Err(StatusCode::NameNotFound);
            break;
        }
    }

    if let Some(job) = finder.job_mut(name) {
        job.init_status = match &status {
            Ok(()) => InitStatus::Ok,
            Err(err) => InitStatus::Failed(err.clone()),
        };
    }
    status
}

// src/engine/core.rs

//! Pure core daemon state machine.
//!
//! [`LaunchDaemon`] consumes [`DaemonEvent`]s and produces:
//! - an updated job/target state
//! - items pushed onto the shared [`JobQueue`]
//! - a list of [`DaemonCommand`]s describing what the IO shell should do
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - signalling processes, timers, OS watchers and session forwarding
//! - handling shutdown signals
//!
//! The core owns every job, target and event tree. It never blocks and never
//! touches a process, so it can be driven step by step in tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::condition::ConditionContext;
use crate::config::{RunDirective, Settings};
use crate::dag::{Job, Target};
use crate::engine::restart::RestartTracker;
use crate::engine::{DaemonCommand, DaemonEvent, ReplySender};
use crate::errors::StatusCode;
use crate::event::{EventBus, EventTree};
use crate::exec::JobQueue;
use crate::ipc::protocol::{JobInfo, TargetInfo};
use crate::log::Log;
use crate::session::{SessionBroker, SessionLink, SystemSessionBroker};
use crate::types::{DaemonMode, NameKey};

/// Decision returned by the core after handling a single [`DaemonEvent`].
#[derive(Debug)]
pub struct DaemonStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<DaemonCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

pub struct LaunchDaemon {
    pub(super) mode: DaemonMode,
    pub(super) jobs: IndexMap<NameKey, Job>,
    pub(super) targets: IndexMap<NameKey, Target>,
    pub(super) run: Vec<RunDirective>,
    pub(super) bus: EventBus,
    pub(super) queue: Arc<JobQueue>,
    pub(super) log: Arc<Log>,
    pub(super) context: Box<dyn ConditionContext + Send>,
    pub(super) restart: RestartTracker,
    pub(super) broker: Box<dyn SessionBroker>,
    pub(super) sessions: HashMap<u32, Arc<dyn SessionLink>>,
    /// Sessions asked for but not registered yet.
    pub(super) spawning: HashSet<u32>,
    /// Owners whose event tree is bound to the bus.
    pub(super) registered: HashSet<NameKey>,
    pub(super) pids: HashMap<u32, NameKey>,
    /// Exits reported before the matching launch result arrived.
    pub(super) early_exits: HashMap<u32, i32>,
    pub(super) pending_replies: HashMap<NameKey, Vec<ReplySender>>,
    pub(super) next_port: u32,
    pub(super) network_up: bool,
    pub(super) started: bool,
    pub(super) shutting_down: bool,
    /// Owners whose event tree fired during this step.
    pub(super) notifications: VecDeque<NameKey>,
    pub(super) commands: Vec<DaemonCommand>,
}

impl std::fmt::Debug for LaunchDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchDaemon")
            .field("mode", &self.mode)
            .field("jobs", &self.jobs.len())
            .field("targets", &self.targets.len())
            .field("shutting_down", &self.shutting_down)
            .finish_non_exhaustive()
    }
}

impl LaunchDaemon {
    pub fn new(
        settings: Settings,
        context: Box<dyn ConditionContext + Send>,
        queue: Arc<JobQueue>,
        log: Arc<Log>,
    ) -> Self {
        Self {
            mode: DaemonMode::System,
            jobs: settings.jobs,
            targets: settings.targets,
            run: settings.run,
            bus: EventBus::new(),
            queue,
            log,
            context,
            restart: RestartTracker::new(settings.daemon.restart),
            broker: Box::new(SystemSessionBroker),
            sessions: HashMap::new(),
            spawning: HashSet::new(),
            registered: HashSet::new(),
            pids: HashMap::new(),
            early_exits: HashMap::new(),
            pending_replies: HashMap::new(),
            next_port: 0,
            network_up: false,
            started: false,
            shutting_down: false,
            notifications: VecDeque::new(),
            commands: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: DaemonMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_session_broker(mut self, broker: Box<dyn SessionBroker>) -> Self {
        self.broker = broker;
        self
    }

    /// Initialize root jobs, register target events, launch the `run`
    /// targets and then every root job.
    pub fn start(&mut self) -> DaemonStep {
        if self.started {
            return self.finish_step(true);
        }
        self.started = true;
        info!(
            mode = ?self.mode,
            jobs = self.jobs.len(),
            targets = self.targets.len(),
            "launch daemon starting"
        );

        self.init_jobs(None);

        let target_names: Vec<NameKey> = self.targets.keys().cloned().collect();
        for name in &target_names {
            self.register_events(name);
        }

        for directive in std::mem::take(&mut self.run) {
            let holds = directive
                .condition
                .as_ref()
                .is_none_or(|c| c.test(self.context.as_ref()));
            let names = if holds {
                &directive.then
            } else {
                &directive.otherwise
            };
            for name in names {
                if self.targets.contains_key(name) {
                    debug!(target = %name, "run directive launches target");
                    self.launch_jobs(Some(name), true);
                } else {
                    tracing::warn!(target = %name, "run directive names unknown target");
                }
            }
        }

        self.launch_jobs(None, false);
        self.finish_step(true)
    }

    /// Handle a single event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: DaemonEvent) -> DaemonStep {
        match event {
            DaemonEvent::Request {
                caller,
                request,
                reply,
            } => self.handle_request(caller, request, reply),
            DaemonEvent::JobLaunched { job, result } => self.handle_job_launched(job, result),
            DaemonEvent::ProcessExited { pid, status } => self.handle_process_exited(pid, status),
            DaemonEvent::Watch(notification) => self.handle_watch(notification),
            DaemonEvent::RelaunchDue { job } => self.handle_relaunch_due(job),
            DaemonEvent::SessionSpawnFailed { uid } => self.handle_session_spawn_failed(uid),
            DaemonEvent::ShutdownRequested => {
                self.handle_shutdown();
                return self.finish_step(false);
            }
        }
        self.finish_step(true)
    }

    /// Launch owners whose event fired, then hand the collected commands
    /// over.
    pub(super) fn finish_step(&mut self, keep_running: bool) -> DaemonStep {
        while let Some(owner) = self.notifications.pop_front() {
            if self.shutting_down {
                self.notifications.clear();
                break;
            }
            if self.jobs.contains_key(&owner) {
                self.launch_job(&owner, crate::types::LaunchOptions::NONE);
            } else if self.targets.contains_key(&owner) {
                self.launch_jobs(Some(&owner), false);
            }
        }
        DaemonStep {
            commands: std::mem::take(&mut self.commands),
            keep_running,
        }
    }

    pub fn mode(&self) -> DaemonMode {
        self.mode
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(&NameKey::from(name))
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.get(&NameKey::from(name))
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn log(&self) -> &Arc<Log> {
        &self.log
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub(super) fn context(&self) -> &dyn ConditionContext {
        self.context.as_ref()
    }

    pub(super) fn job_info(&self, job: &Job) -> JobInfo {
        JobInfo {
            name: job.name().to_string(),
            service: job.is_service(),
            enabled: job.is_enabled(),
            launching: job.is_launching(),
            running: job.is_running(),
            pid: job.pid(),
            target: job.target.as_ref().map(NameKey::to_string),
            requires: job.requirements.iter().map(NameKey::to_string).collect(),
            launch: job.arguments.clone(),
            condition: job.base.condition.as_ref().map(ToString::to_string),
            event: job.base.event.as_ref().map(EventTree::to_string),
            environment: job.base.environment.clone(),
            ports: job.port_ids().clone(),
            pending: job.base.pending.iter().map(NameKey::to_string).collect(),
            last_error: job.last_error().map(str::to_string),
        }
    }

    pub(super) fn target_info(&self, target: &Target) -> TargetInfo {
        TargetInfo {
            name: target.name().to_string(),
            launched: target.has_launched(),
            condition: target.base.condition.as_ref().map(ToString::to_string),
            event: target.base.event.as_ref().map(EventTree::to_string),
            jobs: self
                .jobs_of(Some(target.name()))
                .iter()
                .map(NameKey::to_string)
                .collect(),
            data: target.data.clone(),
        }
    }

    /// Names of the jobs owned by `target` (root jobs for `None`), in
    /// configuration order.
    pub(super) fn jobs_of(&self, target: Option<&NameKey>) -> Vec<NameKey> {
        self.jobs
            .iter()
            .filter(|(_, job)| job.target.as_ref() == target)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Reply to everybody waiting for the launch data of `job`.
    pub(super) fn answer_pending(&mut self, job: &NameKey, reply: crate::ipc::protocol::Reply) {
        for sender in self.pending_replies.remove(job).unwrap_or_default() {
            let _ = sender.send(reply.clone());
        }
    }

    pub(super) fn fail_pending(&mut self, status: StatusCode) {
        for (_, senders) in self.pending_replies.drain() {
            for sender in senders {
                let _ = sender.send(Err(status.clone()));
            }
        }
    }
}

/// Event tree of the job or target called `owner`.
pub(super) fn owner_tree<'a>(
    jobs: &'a mut IndexMap<NameKey, Job>,
    targets: &'a mut IndexMap<NameKey, Target>,
    owner: &NameKey,
) -> Option<&'a mut EventTree> {
    match jobs.get_mut(owner) {
        Some(job) => job.base.event.as_mut(),
        None => targets
            .get_mut(owner)
            .and_then(|target| target.base.event.as_mut()),
    }
}

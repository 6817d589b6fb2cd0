// src/engine/launch.rs

//! The launch algorithm: initialization, eligibility, requirement checks and
//! the commit into the job queue.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, info, trace, warn};

use super::core::{LaunchDaemon, owner_tree};
use crate::dag::init_job;
use crate::errors::StatusCode;
use crate::event::events::trigger_demand;
use crate::event::{EventId, EventKind, EventRef};
use crate::exec::{Executable, LaunchRequest, PortAssignment, QueueItem};
use crate::log::LogKind;
use crate::types::{LaunchOptions, NameKey};

impl LaunchDaemon {
    /// Initialize the jobs of `target` (root jobs for `None`) and bind their
    /// events. Jobs that can never run are dropped.
    pub(super) fn init_jobs(&mut self, target: Option<&NameKey>) {
        for name in self.jobs_of(target) {
            let Some(job) = self.jobs.get(&name) else {
                continue;
            };

            let never = job.base.condition.as_ref().is_some_and(|condition| {
                condition.is_constant(self.context()) && !condition.test(self.context())
            });
            let status = if never {
                Err(StatusCode::NotAllowed)
            } else {
                self.init_job_named(&name)
            };

            match status {
                Ok(()) => self.register_events(&name),
                Err(status) => {
                    info!(job = %name, ?status, "job ignored");
                    self.log.add(LogKind::JobIgnored {
                        job: name.to_string(),
                        status,
                    });
                    self.jobs.shift_remove(&name);
                }
            }
        }
    }

    /// Run the memoized initialization of `name`, logging the first success.
    pub(super) fn init_job_named(&mut self, name: &NameKey) -> Result<(), StatusCode> {
        let first = self
            .jobs
            .get(name)
            .is_some_and(|job| *job.init_status() == crate::dag::InitStatus::NotInitialized);

        let mut finder = (&mut self.jobs, &self.targets);
        let result = init_job(&mut finder, name, &HashSet::new());

        if first {
            match &result {
                Ok(()) => {
                    debug!(job = %name, "job initialized");
                    self.log.add(LogKind::JobInitialized {
                        job: name.to_string(),
                    });
                }
                Err(status) => warn!(job = %name, ?status, "job initialization failed"),
            }
        }
        result
    }

    /// Bind the event tree of `owner` to the bus and fire whatever is
    /// already true.
    pub(super) fn register_events(&mut self, owner: &NameKey) {
        if self.registered.contains(owner) {
            return;
        }
        let Some(tree) = owner_tree(&mut self.jobs, &mut self.targets, owner) else {
            return;
        };

        let registration = self.bus.register(owner, tree);
        let mut fire = registration.triggers;
        for id in tree.leaves() {
            let ready = match tree.kind(id) {
                EventKind::FileCreated(path) => self.context.file_exists(path),
                EventKind::NetworkAvailable => self.network_up,
                _ => false,
            };
            if ready {
                fire.push(id);
            }
        }

        self.registered.insert(owner.clone());
        self.commands.extend(
            registration
                .start
                .into_iter()
                .map(crate::engine::DaemonCommand::StartWatch),
        );
        self.trigger_nodes(owner, &fire);
    }

    pub(super) fn unregister_events(&mut self, owner: &NameKey) {
        if !self.registered.remove(owner) {
            return;
        }
        let Some(tree) = owner_tree(&mut self.jobs, &mut self.targets, owner) else {
            return;
        };
        let stop = self.bus.unregister(owner, tree);
        self.commands
            .extend(stop.into_iter().map(crate::engine::DaemonCommand::StopWatch));
    }

    /// Fire nodes in the tree of `owner`; a root transition queues the owner
    /// for launching at the end of the step.
    pub(super) fn trigger_nodes(&mut self, owner: &NameKey, ids: &[EventId]) {
        let Some(tree) = owner_tree(&mut self.jobs, &mut self.targets, owner) else {
            return;
        };
        let mut fired = false;
        for id in ids {
            let event = tree.describe(*id);
            fired |= tree.trigger(*id);
            trace!(owner = %owner, %event, "event triggered");
            self.log.add(LogKind::EventTriggered {
                owner: owner.to_string(),
                event,
            });
        }
        if fired && !self.notifications.contains(owner) {
            self.notifications.push_back(owner.clone());
        }
    }

    pub(super) fn trigger_refs(&mut self, refs: Vec<EventRef>) {
        for event in refs {
            self.trigger_nodes(&event.owner, &[event.node]);
        }
    }

    /// Whether `name` may be launched with `options`. With `test_only` a
    /// demand event is only checked, not fired.
    pub(super) fn can_launch_job(
        &mut self,
        name: &NameKey,
        options: LaunchOptions,
        test_only: bool,
    ) -> bool {
        let Some(job) = self.jobs.get(name) else {
            return false;
        };
        if !job.can_be_launched() {
            return false;
        }
        if options.contains(LaunchOptions::FORCE_NOW) {
            return true;
        }

        let target = job.target.as_ref().and_then(|t| self.targets.get(t));
        if !job.check_condition(self.context.as_ref(), target) {
            return false;
        }
        if job.base.event_triggered() || options.contains(LaunchOptions::RELAUNCH) {
            return true;
        }
        if !options.contains(LaunchOptions::TRIGGER_DEMAND) {
            return false;
        }

        match self
            .jobs
            .get_mut(name)
            .and_then(|job| job.base.event.as_mut())
        {
            Some(event) => trigger_demand(event, test_only),
            None => true,
        }
    }

    /// Check, without launching anything, that every requirement of `name`
    /// is running or could be launched now. A blocking requirement gets
    /// `name` on its pending list.
    pub(super) fn can_launch_job_requirements(
        &mut self,
        name: &NameKey,
        options: LaunchOptions,
    ) -> bool {
        let requirements = match self.jobs.get(name) {
            Some(job) => job.requirements.clone(),
            None => return false,
        };

        for requirement in &requirements {
            if let Some(job) = self.jobs.get(requirement) {
                if job.is_satisfied() {
                    continue;
                }
                if !self.can_launch_job(requirement, options, true)
                    || !self.can_launch_job_requirements(requirement, options)
                {
                    trace!(job = %name, requirement = %requirement, "requirement not ready");
                    if let Some(job) = self.jobs.get_mut(requirement) {
                        job.base.add_pending(name);
                    }
                    return false;
                }
            } else if let Some(target) = self.targets.get_mut(requirement) {
                if target.has_launched() {
                    continue;
                }
                let ready = target.base.event_triggered()
                    && target.base.check_condition(self.context.as_ref());
                if !ready {
                    trace!(job = %name, target = %requirement, "target not ready");
                    target.base.add_pending(name);
                    return false;
                }
            } else {
                // Dropped after initialization.
                return false;
            }
        }
        true
    }

    /// Launch `name` and, first, whatever it requires.
    ///
    /// Returns `true` when the job is launching or running afterwards.
    /// A one-shot job that already ran is only started again on request or
    /// when its own event fires anew.
    pub(super) fn launch_job(&mut self, name: &NameKey, options: LaunchOptions) -> bool {
        match self.jobs.get(name) {
            Some(job) if job.is_launching() || job.is_running() => return true,
            Some(job) if job.has_completed() => {
                let requested = options.contains(LaunchOptions::FORCE_NOW)
                    || options.contains(LaunchOptions::TRIGGER_DEMAND);
                let refired = job.base.event.is_some() && job.base.event_triggered();
                if !requested && !refired {
                    trace!(job = %name, "one-shot job already ran");
                    return true;
                }
            }
            Some(_) => {}
            None => return false,
        }
        if self.shutting_down || self.init_job_named(name).is_err() {
            return false;
        }

        let requirement_options = LaunchOptions::TRIGGER_DEMAND;
        if !self.can_launch_job(name, options, false)
            || !self.can_launch_job_requirements(name, requirement_options)
        {
            return false;
        }

        let requirements = self
            .jobs
            .get(name)
            .map(|job| job.requirements.clone())
            .unwrap_or_default();
        for requirement in &requirements {
            if let Some(job) = self.jobs.get(requirement) {
                if job.has_completed() {
                    continue;
                }
                self.launch_job(requirement, requirement_options);
            } else if self
                .targets
                .get(requirement)
                .is_some_and(|target| !target.has_launched())
            {
                self.launch_jobs(Some(requirement), false);
            }
        }

        // Launching a requirement may already have retried this job.
        match self.jobs.get(name) {
            Some(job) if job.is_launching() || job.is_running() => return true,
            Some(_) => {}
            None => return false,
        }

        let Some(request) = self.build_launch_request(name) else {
            return false;
        };
        if let Some(job) = self.jobs.get_mut(name) {
            if let Some(event) = job.base.event.as_mut() {
                event.reset_trigger();
            }
            job.set_launching(true);
        }

        if let Err(err) = self.queue.push(QueueItem::Launch(request)) {
            warn!(job = %name, error = %err, "could not queue job");
            if let Some(job) = self.jobs.get_mut(name) {
                job.launch_failed(err.to_string());
            }
            return false;
        }
        debug!(job = %name, "job queued");

        self.retry_pending(name);
        true
    }

    /// Give the jobs that waited on `name` another chance.
    fn retry_pending(&mut self, name: &NameKey) {
        let pending = match self.jobs.get_mut(name) {
            Some(job) => std::mem::take(&mut job.base.pending),
            None => return,
        };
        let waiting = self.launch_pending(pending);
        if let Some(job) = self.jobs.get_mut(name) {
            for dependent in &waiting {
                job.base.add_pending(dependent);
            }
        }
    }

    /// Launch each name; return the ones that still cannot start.
    fn launch_pending(&mut self, pending: Vec<NameKey>) -> Vec<NameKey> {
        let mut waiting = Vec::new();
        for dependent in pending {
            if !self.jobs.contains_key(&dependent) {
                continue;
            }
            trace!(job = %dependent, "retrying pending job");
            if !self.launch_job(&dependent, LaunchOptions::NONE) {
                waiting.push(dependent);
            }
        }
        waiting
    }

    /// Launch the jobs of `target`, or every root job for `None`.
    ///
    /// Unless `force` is set, a target's event must have fired and its
    /// condition must hold. The first pass marks the target launched and
    /// initializes its jobs.
    pub(super) fn launch_jobs(&mut self, target: Option<&NameKey>, force: bool) {
        let Some(target_name) = target else {
            for name in self.jobs_of(None) {
                self.launch_job(&name, LaunchOptions::NONE);
            }
            return;
        };

        let Some(target) = self.targets.get_mut(target_name) else {
            return;
        };
        if !force
            && (!target.base.event_triggered()
                || !target.base.check_condition(self.context.as_ref()))
        {
            return;
        }

        if !target.has_launched() {
            target.set_launched(true);
            info!(target = %target_name, "target launched");
            self.log.add(LogKind::TargetLaunched {
                target: target_name.to_string(),
            });
            if let Err(err) = self.queue.push(QueueItem::Checkpoint(target_name.clone())) {
                warn!(target = %target_name, error = %err, "could not queue target checkpoint");
            }
            self.init_jobs(Some(target_name));
        }

        for name in self.jobs_of(Some(target_name)) {
            self.launch_job(&name, LaunchOptions::NONE);
        }

        let pending = match self.targets.get_mut(target_name) {
            Some(target) => std::mem::take(&mut target.base.pending),
            None => return,
        };
        let waiting = self.launch_pending(pending);
        if let Some(target) = self.targets.get_mut(target_name) {
            for dependent in &waiting {
                target.base.add_pending(dependent);
            }
        }
    }

    /// Assemble what a worker needs, handing out fresh port ids.
    pub(super) fn build_launch_request(&mut self, name: &NameKey) -> Option<LaunchRequest> {
        let job = self.jobs.get(name)?;
        let target = job.target.as_ref().and_then(|t| self.targets.get(t));

        let mut environment: Vec<(String, String)> = Vec::new();
        let mut source_files = Vec::new();
        if let Some(target) = target {
            environment.extend(
                target
                    .base
                    .environment
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            source_files.extend(target.base.source_files.iter().cloned());
        }
        environment.extend(
            job.base
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        source_files.extend(job.base.source_files.iter().cloned());

        let executable = if job.arguments.is_empty() {
            Executable::Signature(NameKey::leaf(job.name().as_str()).to_string())
        } else {
            Executable::Command(job.arguments.clone())
        };
        let target_data = target.map(|target| target.data.clone());

        let specs = job.effective_ports();
        let mut ports = Vec::with_capacity(specs.len());
        let mut ids = IndexMap::new();
        for spec in specs {
            self.next_port = self.next_port.wrapping_add(1);
            ids.insert(spec.name.clone(), self.next_port);
            ports.push(PortAssignment {
                name: spec.name,
                id: self.next_port,
                capacity: spec.capacity,
            });
        }
        if let Some(job) = self.jobs.get_mut(name) {
            job.set_port_ids(ids);
        }

        Some(LaunchRequest {
            job: name.clone(),
            executable,
            environment,
            source_files,
            ports,
            target_data,
        })
    }
}

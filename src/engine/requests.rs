// src/engine/requests.rs

//! The request surface of the daemon.
//!
//! Every request is answered through its reply sender, either right away or,
//! for launch data of a job that is still starting, once the worker reports
//! back. Requests that need a session daemon are turned into commands.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::core::{LaunchDaemon, owner_tree};
use super::{DaemonCommand, ReplySender, StopMethod};
use crate::errors::StatusCode;
use crate::event::EventFlags;
use crate::ipc::protocol::{Payload, Reply, Request};
use crate::log::{LogFilter, LogKind};
use crate::types::{Caller, DaemonMode, LaunchOptions, NameKey};

fn respond(reply: Option<ReplySender>, result: Reply) {
    if let Some(reply) = reply {
        // The client may have gone away.
        let _ = reply.send(result);
    }
}

impl LaunchDaemon {
    pub(super) fn handle_request(
        &mut self,
        caller: Caller,
        request: Request,
        reply: Option<ReplySender>,
    ) {
        debug!(uid = caller.uid, ?request, "request");

        if self.mode == DaemonMode::System && caller.is_root() && request.is_session_broadcast() {
            for link in self.sessions.values() {
                self.commands.push(DaemonCommand::Forward {
                    link: link.clone(),
                    request: request.clone(),
                    reply: None,
                });
            }
        }

        match request {
            Request::GetLaunchData { name } => self.get_launch_data(caller, name, reply),
            Request::LaunchTarget { name, base, data } => {
                respond(reply, self.launch_target(&name, base.as_deref(), data));
            }
            Request::StopLaunchTarget { name, force, data } => {
                respond(reply, self.stop_target(&name, force, data));
            }
            Request::LaunchJob { name } => respond(reply, self.force_launch_job(&name)),
            Request::EnableLaunchJob { name, enable } => {
                respond(reply, self.enable_job(&name, enable));
            }
            Request::StopLaunchJob { name, force } => respond(reply, self.stop_launch_job(&name, force)),
            Request::LaunchSession { login } => respond(reply, self.launch_session(caller, &login)),
            Request::RegisterSessionDaemon { socket } => {
                let result = if self.mode == DaemonMode::User {
                    Err(StatusCode::NotAllowed)
                } else {
                    info!(uid = caller.uid, socket = %socket.display(), "session daemon registered");
                    let link = self.broker.connect(&socket);
                    self.spawning.remove(&caller.uid);
                    self.sessions.insert(caller.uid, link);
                    Ok(Payload::Done)
                };
                respond(reply, result);
            }
            Request::RegisterExternalEvent { name, owner, flags } => {
                respond(reply, self.register_external_event(&name, &owner, flags));
            }
            Request::UnregisterExternalEvent { name } => {
                respond(reply, self.unregister_external_event(&name));
            }
            Request::NotifyExternalEvent { name } => {
                let result = match self.bus.fire_source(&name) {
                    Some(destinations) => {
                        debug!(event = %name, listeners = destinations.len(), "external event fired");
                        self.trigger_refs(destinations);
                        Ok(Payload::Done)
                    }
                    None => Err(StatusCode::NameNotFound),
                };
                respond(reply, result);
            }
            Request::ResetStickyExternalEvent { name } => {
                let result = match self.bus.reset_source(&name) {
                    Some(destinations) => {
                        for event in destinations {
                            if let Some(tree) =
                                owner_tree(&mut self.jobs, &mut self.targets, &event.owner)
                            {
                                tree.reset_sticky(event.node);
                            }
                        }
                        Ok(Payload::Done)
                    }
                    None => Err(StatusCode::NameNotFound),
                };
                respond(reply, result);
            }
            Request::GetLaunchTargets => {
                let names = self.targets.keys().map(NameKey::to_string).collect();
                respond(reply, Ok(Payload::Names { names }));
            }
            Request::GetLaunchTargetInfo { name } => {
                let result = match self.targets.get(&NameKey::from(name.as_str())) {
                    Some(target) => Ok(Payload::TargetInfo {
                        info: self.target_info(target),
                    }),
                    None => Err(StatusCode::NameNotFound),
                };
                respond(reply, result);
            }
            Request::GetLaunchJobs { target } => {
                let result = match target {
                    Some(target) => {
                        let key = NameKey::from(target.as_str());
                        if self.targets.contains_key(&key) {
                            let names = self.jobs_of(Some(&key)).iter().map(NameKey::to_string).collect();
                            Ok(Payload::Names { names })
                        } else {
                            Err(StatusCode::NameNotFound)
                        }
                    }
                    None => Ok(Payload::Names {
                        names: self.jobs.keys().map(NameKey::to_string).collect(),
                    }),
                };
                respond(reply, result);
            }
            Request::GetLaunchJobInfo { name } => {
                let result = match self.jobs.get(&NameKey::from(name.as_str())) {
                    Some(job) => Ok(Payload::JobInfo {
                        info: self.job_info(job),
                    }),
                    None => Err(StatusCode::NameNotFound),
                };
                respond(reply, result);
            }
            Request::GetLaunchLog { filter } => self.get_launch_log(caller, filter, reply),
        }
    }

    /// Pid and ports of a job, launching it on demand. The reply is parked
    /// until the launch completes.
    fn get_launch_data(&mut self, caller: Caller, name: String, reply: Option<ReplySender>) {
        let key = NameKey::from(name.as_str());
        if !self.jobs.contains_key(&key) {
            if self.mode == DaemonMode::System {
                if let Some(link) = self.sessions.get(&caller.uid) {
                    self.commands.push(DaemonCommand::Forward {
                        link: link.clone(),
                        request: Request::GetLaunchData { name },
                        reply,
                    });
                    return;
                }
            }
            respond(reply, Err(StatusCode::NameNotFound));
            return;
        }

        let idle = self
            .jobs
            .get(&key)
            .is_some_and(|job| !job.is_running() && !job.is_launching());
        if idle {
            if self.init_job_named(&key).is_err()
                || !self.can_launch_job(&key, LaunchOptions::TRIGGER_DEMAND, true)
            {
                respond(reply, Err(StatusCode::NoInit));
                return;
            }
            if !self.launch_job(&key, LaunchOptions::TRIGGER_DEMAND) && !self.is_pending(&key) {
                respond(reply, Err(StatusCode::NoInit));
                return;
            }
        }

        match self.jobs.get(&key) {
            Some(job) if job.is_running() => {
                let payload = Payload::LaunchData {
                    pid: job.pid().unwrap_or_default(),
                    ports: job.port_ids().clone(),
                };
                respond(reply, Ok(payload));
            }
            Some(_) => {
                if let Some(reply) = reply {
                    self.pending_replies.entry(key).or_default().push(reply);
                }
            }
            None => respond(reply, Err(StatusCode::NameNotFound)),
        }
    }

    /// Whether `name` waits on some job or target.
    fn is_pending(&self, name: &NameKey) -> bool {
        self.jobs.values().any(|job| job.base.pending.contains(name))
            || self
                .targets
                .values()
                .any(|target| target.base.pending.contains(name))
    }

    fn launch_target(
        &mut self,
        name: &str,
        base: Option<&str>,
        data: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Reply {
        let key = NameKey::from(name);
        if !self.targets.contains_key(&key) {
            let Some(base) = base else {
                return Err(StatusCode::NameNotFound);
            };
            let base = NameKey::from(base);
            if !self.targets.contains_key(&base) {
                return Err(StatusCode::NameNotFound);
            }
            self.derive_target(&base, &key);
        }

        if let Some(data) = data {
            if let Some(target) = self.targets.get_mut(&key) {
                target.add_data(data);
            }
        }
        self.register_events(&key);
        self.launch_jobs(Some(&key), true);
        Ok(Payload::Done)
    }

    /// Create `name` as a copy of `base` and of all of its jobs. Copies are
    /// called `<name>/<job>` and require each other instead of the originals.
    fn derive_target(&mut self, base: &NameKey, name: &NameKey) {
        let Some(target) = self.targets.get(base).map(|t| t.derive(name.clone())) else {
            return;
        };
        let members = self.jobs_of(Some(base));
        let mut renamed: HashMap<NameKey, NameKey> = members
            .iter()
            .map(|member| {
                let copy = NameKey::new(format!("{name}/{}", NameKey::leaf(member.as_str())));
                (member.clone(), copy)
            })
            .collect();
        renamed.insert(base.clone(), name.clone());

        for member in &members {
            let (Some(job), Some(copy_name)) = (self.jobs.get(member), renamed.get(member)) else {
                continue;
            };
            let mut copy = job.derive(copy_name.clone(), name.clone());
            copy.requirements = copy
                .requirements
                .iter()
                .map(|r| renamed.get(r).cloned().unwrap_or_else(|| r.clone()))
                .collect();
            self.jobs.insert(copy_name.clone(), copy);
        }

        info!(target = %name, base = %base, jobs = members.len(), "derived target created");
        self.targets.insert(name.clone(), target);
    }

    fn stop_target(
        &mut self,
        name: &str,
        force: bool,
        data: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Reply {
        let key = NameKey::from(name);
        if !self.targets.contains_key(&key) {
            return Err(StatusCode::NameNotFound);
        }
        let members = self.jobs_of(Some(&key));

        if !force {
            let outside_user = members.iter().any(|member| {
                self.dependents(member).iter().any(|dependent| {
                    self.jobs.get(dependent).is_some_and(|job| {
                        job.target.as_ref() != Some(&key) && (job.is_running() || job.is_launching())
                    })
                })
            });
            if outside_user {
                return Err(StatusCode::Busy);
            }
        }

        if let Some(data) = data {
            if let Some(target) = self.targets.get_mut(&key) {
                target.add_data(data);
            }
        }

        let mut visited = HashSet::new();
        for member in members.iter().rev() {
            self.stop_job(member, false, &mut visited);
        }

        if let Some(target) = self.targets.get_mut(&key) {
            target.set_launched(false);
            if let Some(event) = target.base.event.as_mut() {
                event.reset_trigger();
            }
        }
        info!(target = %key, "target stopped");
        self.log.add(LogKind::TargetStopped {
            target: key.to_string(),
        });
        Ok(Payload::Done)
    }

    fn force_launch_job(&mut self, name: &str) -> Reply {
        let key = NameKey::from(name);
        let Some(job) = self.jobs.get_mut(&key) else {
            return Err(StatusCode::NameNotFound);
        };
        job.set_enabled(true);
        self.restart.forget(&key);

        if self.init_job_named(&key).is_err() {
            return Err(StatusCode::NoInit);
        }
        if self.launch_job(&key, LaunchOptions::FORCE_NOW) || self.is_pending(&key) {
            Ok(Payload::Done)
        } else {
            Err(StatusCode::NotAllowed)
        }
    }

    fn enable_job(&mut self, name: &str, enable: bool) -> Reply {
        let key = NameKey::from(name);
        let Some(job) = self.jobs.get_mut(&key) else {
            return Err(StatusCode::NameNotFound);
        };
        job.set_enabled(enable);
        debug!(job = %key, enable, "job enabled state changed");
        self.log.add(LogKind::JobEnabled {
            job: key.to_string(),
            enabled: enable,
        });
        Ok(Payload::Done)
    }

    fn stop_launch_job(&mut self, name: &str, force: bool) -> Reply {
        let key = NameKey::from(name);
        if !self.jobs.contains_key(&key) {
            return Err(StatusCode::NameNotFound);
        }
        if !force {
            let busy = self.dependents(&key).iter().any(|dependent| {
                self.jobs
                    .get(dependent)
                    .is_some_and(|job| job.is_running() || job.is_launching())
            });
            if busy {
                return Err(StatusCode::Busy);
            }
        }

        self.stop_job(&key, true, &mut HashSet::new());
        info!(job = %key, force, "job stopped");
        self.log.add(LogKind::JobStopped {
            job: key.to_string(),
            force,
        });
        Ok(Payload::Done)
    }

    /// Jobs that list `name` as a requirement.
    fn dependents(&self, name: &NameKey) -> Vec<NameKey> {
        self.jobs
            .iter()
            .filter(|(_, job)| job.requirements.contains(name))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }

    /// Stop `name` and, first, every active job that depends on it.
    fn stop_job(&mut self, name: &NameKey, disable: bool, visited: &mut HashSet<NameKey>) {
        if !visited.insert(name.clone()) {
            return;
        }
        for dependent in self.dependents(name) {
            let active = self
                .jobs
                .get(&dependent)
                .is_some_and(|job| job.is_running() || job.is_launching());
            if active {
                self.stop_job(&dependent, disable, visited);
            }
        }

        let Some(job) = self.jobs.get_mut(name) else {
            return;
        };
        if disable {
            job.set_enabled(false);
        }
        if let Some(pid) = job.pid() {
            // Jobs with a port are asked to quit; the rest get an interrupt.
            let method = if job.port_ids().is_empty() {
                StopMethod::Interrupt
            } else {
                StopMethod::Quit
            };
            debug!(job = %name, pid, ?method, "stopping job");
            self.commands.push(DaemonCommand::StopProcess {
                job: name.clone(),
                pid,
                method,
            });
        }
    }

    fn launch_session(&mut self, caller: Caller, login: &str) -> Reply {
        if self.mode == DaemonMode::User {
            return Err(StatusCode::NotAllowed);
        }
        if !caller.is_root() {
            return Err(StatusCode::PermissionDenied);
        }
        let Some(user) = self.broker.lookup_user(login) else {
            return Err(StatusCode::NameNotFound);
        };
        if self.sessions.contains_key(&user.uid) || !self.spawning.insert(user.uid) {
            return Err(StatusCode::Busy);
        }

        info!(login, uid = user.uid, "launching session");
        self.commands.push(DaemonCommand::SpawnSession {
            login: login.to_string(),
            uid: user.uid,
            gid: user.gid,
            home: user.home,
        });
        Ok(Payload::Done)
    }

    fn register_external_event(&mut self, name: &str, owner: &str, flags: EventFlags) -> Reply {
        let Some(waiting) = self.bus.add_source(name, owner, flags) else {
            return Err(StatusCode::Busy);
        };

        let mut bound = 0;
        for event in waiting {
            let Some(tree) = owner_tree(&mut self.jobs, &mut self.targets, &event.owner) else {
                continue;
            };
            if tree.resolve(event.node, flags) {
                self.bus.bind(name, event);
                bound += 1;
            } else {
                warn!(event = name, owner = %event.owner, "event node already bound");
            }
        }

        debug!(event = name, owner, bound, "external event registered");
        self.log.add(LogKind::ExternalEventRegistered {
            name: name.to_string(),
            owner: owner.to_string(),
        });
        Ok(Payload::Done)
    }

    fn unregister_external_event(&mut self, name: &str) -> Reply {
        let Some(source) = self.bus.remove_source(name) else {
            return Err(StatusCode::NameNotFound);
        };

        for event in source.destinations {
            if let Some(tree) = owner_tree(&mut self.jobs, &mut self.targets, &event.owner) {
                tree.unresolve(event.node);
            }
            self.bus.park(name, event);
        }

        debug!(event = name, "external event unregistered");
        self.log.add(LogKind::ExternalEventUnregistered {
            name: name.to_string(),
        });
        Ok(Payload::Done)
    }

    fn get_launch_log(&mut self, caller: Caller, filter: LogFilter, reply: Option<ReplySender>) {
        let local = self.log.query(&filter);

        let link = match (self.mode, filter.system_only) {
            (DaemonMode::System, false) => self.sessions.get(&caller.uid).cloned(),
            _ => None,
        };
        match (link, reply) {
            (Some(link), Some(reply)) => {
                let session_filter = LogFilter {
                    system_only: false,
                    user_only: false,
                    ..filter
                };
                self.commands.push(DaemonCommand::MergeSessionLog {
                    link,
                    filter: session_filter,
                    local,
                    reply,
                });
            }
            (_, reply) => respond(reply, Ok(Payload::Log { entries: local })),
        }
    }
}

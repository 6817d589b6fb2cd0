// src/engine/event_handlers.rs

//! Event handling logic for the core runtime: launch results, process
//! deaths, watch notifications and shutdown.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::core::LaunchDaemon;
use super::restart::RestartDecision;
use super::{DaemonCommand, StopMethod, WatchNotification};
use crate::errors::StatusCode;
use crate::event::WatchKind;
use crate::ipc::protocol::Payload;
use crate::log::LogKind;
use crate::types::{LaunchOptions, NameKey};

impl LaunchDaemon {
    /// A worker finished starting `job`.
    pub(super) fn handle_job_launched(&mut self, job: NameKey, result: Result<u32, String>) {
        let Some(entry) = self.jobs.get_mut(&job) else {
            debug!(job = %job, "launch result for unknown job");
            return;
        };

        match result {
            Ok(pid) => {
                entry.set_team(pid);
                let ports = entry.port_ids().clone();
                self.pids.insert(pid, job.clone());
                debug!(job = %job, pid, "job running");

                if self.shutting_down {
                    self.commands.push(DaemonCommand::StopProcess {
                        job: job.clone(),
                        pid,
                        method: StopMethod::Interrupt,
                    });
                }
                self.answer_pending(&job, Ok(Payload::LaunchData { pid, ports }));

                if let Some(status) = self.early_exits.remove(&pid) {
                    self.handle_process_exited(pid, status);
                }
            }
            Err(error) => {
                warn!(job = %job, %error, "job launch failed");
                entry.launch_failed(error.clone());
                self.answer_pending(&job, Err(StatusCode::Error(error)));
            }
        }
    }

    /// A launched process terminated with `status`.
    pub(super) fn handle_process_exited(&mut self, pid: u32, status: i32) {
        let Some(name) = self.pids.remove(&pid) else {
            // The launch result is still on its way.
            self.early_exits.insert(pid, status);
            return;
        };

        self.log.add(LogKind::JobTerminated {
            job: name.to_string(),
            pid,
            status,
        });

        let Some(job) = self.jobs.get_mut(&name) else {
            return;
        };
        if job.pid() != Some(pid) {
            return;
        }
        job.team_deleted();
        info!(job = %name, pid, status, "job terminated");

        if !job.is_service() || !job.is_enabled() || self.shutting_down {
            return;
        }

        match self.restart.on_exit(&name, Utc::now()) {
            RestartDecision::Now => {
                debug!(job = %name, "relaunching service");
                self.launch_job(&name, LaunchOptions::RELAUNCH);
            }
            RestartDecision::After(delay) => {
                debug!(job = %name, ?delay, "service relaunch scheduled");
                self.commands
                    .push(DaemonCommand::ScheduleRelaunch { job: name, delay });
            }
            RestartDecision::GiveUp { restarts } => {
                warn!(job = %name, restarts, "service restarted too often, leaving it stopped");
                self.log.add(LogKind::RestartLimitReached {
                    job: name.to_string(),
                    restarts,
                });
            }
        }
    }

    pub(super) fn handle_relaunch_due(&mut self, job: NameKey) {
        if self.shutting_down {
            return;
        }
        let eligible = self
            .jobs
            .get(&job)
            .is_some_and(|j| j.is_service() && j.can_be_launched() && !j.is_running());
        if eligible {
            self.launch_job(&job, LaunchOptions::RELAUNCH);
        }
    }

    /// Forget the attempt so a later `LaunchSession` may try again.
    pub(super) fn handle_session_spawn_failed(&mut self, uid: u32) {
        if self.spawning.remove(&uid) {
            warn!(uid, "session daemon did not start");
        }
    }

    pub(super) fn handle_watch(&mut self, notification: WatchNotification) {
        match notification {
            WatchNotification::VolumeMounted => {
                let listeners = self.bus.listeners(&WatchKind::Volume);
                self.trigger_refs(listeners);
            }
            WatchNotification::VolumeUnmounted => {
                debug!("volume unmounted");
            }
            WatchNotification::NetworkChanged { available } => {
                self.network_up = available;
                let listeners = self.bus.listeners(&WatchKind::Network);
                if available {
                    self.trigger_refs(listeners);
                } else {
                    for event in listeners {
                        if let Some(tree) =
                            super::core::owner_tree(&mut self.jobs, &mut self.targets, &event.owner)
                        {
                            tree.reset_sticky(event.node);
                        }
                    }
                }
            }
            WatchNotification::FileCreated(path) => {
                let listeners = self.bus.listeners(&WatchKind::FileCreated(path));
                self.trigger_refs(listeners);
            }
        }
    }

    /// Stop every running job and wind the daemon down.
    pub(super) fn handle_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!("launch daemon shutting down");

        for (name, job) in &self.jobs {
            if let Some(pid) = job.pid() {
                let method = if job.port_ids().is_empty() {
                    StopMethod::Interrupt
                } else {
                    StopMethod::Quit
                };
                self.commands.push(DaemonCommand::StopProcess {
                    job: name.clone(),
                    pid,
                    method,
                });
            }
        }

        let dropped = self.queue.drain();
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "dropped queued launches");
        }
        self.queue.close();
        self.fail_pending(StatusCode::Error("shutting down".into()));

        let owners: Vec<NameKey> = self.registered.iter().cloned().collect();
        for owner in &owners {
            self.unregister_events(owner);
        }

        self.commands.push(DaemonCommand::RequestExit);
    }
}

// src/engine/runtime.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::exec::{Launcher, WorkerPool};
use crate::ipc::protocol::{Payload, Request};
use crate::log::merge_session_entries;
use crate::session::{session_socket_path, spawn_session};
use crate::watch::WatchManager;

use super::core::LaunchDaemon;
use super::{DaemonCommand, DaemonEvent, StopMethod};

/// Where session daemons listen and how they find their way back.
#[derive(Debug, Clone, Default)]
pub struct SessionPaths {
    pub runtime_dir: PathBuf,
    /// Socket of this (system) daemon, handed to spawned sessions.
    pub system_socket: Option<PathBuf>,
}

/// Drives the [`LaunchDaemon`] core in response to [`DaemonEvent`]s and
/// carries out the commands it returns.
///
/// This is a pure IO shell around the core, which contains all the
/// scheduling semantics. This struct handles async IO: reading events from
/// the channel, signalling processes, timers, watchers and session traffic.
pub struct Runtime {
    core: LaunchDaemon,
    event_rx: mpsc::Receiver<DaemonEvent>,
    event_tx: mpsc::Sender<DaemonEvent>,
    launcher: Arc<dyn Launcher>,
    watches: WatchManager,
    pool: Option<Arc<WorkerPool>>,
    sessions: SessionPaths,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("watches", &self.watches)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        core: LaunchDaemon,
        event_rx: mpsc::Receiver<DaemonEvent>,
        event_tx: mpsc::Sender<DaemonEvent>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let watches = WatchManager::new(event_tx.clone());
        Self {
            core,
            event_rx,
            event_tx,
            launcher,
            watches,
            pool: None,
            sessions: SessionPaths::default(),
        }
    }

    /// Shut this pool down when the loop ends.
    pub fn with_worker_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_session_paths(mut self, sessions: SessionPaths) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_watch_manager(mut self, watches: WatchManager) -> Self {
        self.watches = watches;
        self
    }

    /// Main event loop.
    ///
    /// - Starts the core (initial launch pass).
    /// - Consumes `DaemonEvent`s from `event_rx` and feeds them to the core.
    /// - Executes the commands returned by the core.
    ///
    /// Returns the core so callers can inspect the final state.
    pub async fn run(mut self) -> Result<LaunchDaemon> {
        info!(mode = ?self.core.mode(), "launch daemon runtime started");

        let step = self.core.start();
        for command in step.commands {
            self.execute_command(command);
        }

        loop {
            let Some(event) = self.event_rx.recv().await else {
                info!("runtime event channel closed; exiting");
                break;
            };
            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command);
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        self.watches.stop_all();
        self.event_rx.close();
        if let Some(pool) = self.pool.take() {
            if let Err(err) = tokio::task::spawn_blocking(move || pool.shutdown()).await {
                error!(error = %err, "worker pool shutdown failed");
            }
        }

        info!("runtime exiting");
        Ok(self.core)
    }

    /// Feed an event back into the loop without blocking it.
    fn report(&self, event: DaemonEvent) {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(event).await;
        });
    }

    /// Execute a single command from the core.
    fn execute_command(&mut self, command: DaemonCommand) {
        match command {
            DaemonCommand::StopProcess { job, pid, method } => {
                let result = match method {
                    StopMethod::Quit => self.launcher.request_quit(pid),
                    StopMethod::Interrupt => self.launcher.interrupt(pid),
                };
                if let Err(err) = result {
                    warn!(job = %job, pid, error = %err, "failed to stop job");
                }
            }
            DaemonCommand::ScheduleRelaunch { job, delay } => {
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(DaemonEvent::RelaunchDue { job }).await;
                });
            }
            DaemonCommand::Forward {
                link,
                request,
                reply,
            } => {
                tokio::spawn(async move {
                    let result = link.forward(request).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                });
            }
            DaemonCommand::MergeSessionLog {
                link,
                filter,
                local,
                reply,
            } => {
                tokio::spawn(async move {
                    let limit = filter.limit;
                    let session = match link.forward(Request::GetLaunchLog { filter }).await {
                        Ok(Payload::Log { entries }) => entries,
                        Ok(other) => {
                            warn!(?other, "unexpected session log reply");
                            Vec::new()
                        }
                        Err(status) => {
                            debug!(?status, "session log unavailable");
                            Vec::new()
                        }
                    };
                    let entries = merge_session_entries(local, session, limit);
                    let _ = reply.send(Ok(Payload::Log { entries }));
                });
            }
            DaemonCommand::SpawnSession {
                login,
                uid,
                gid,
                home,
            } => {
                let Some(system_socket) = self.sessions.system_socket.as_deref() else {
                    warn!(login = %login, "no system socket, cannot start a session");
                    self.report(DaemonEvent::SessionSpawnFailed { uid });
                    return;
                };
                let socket = session_socket_path(&self.sessions.runtime_dir, uid);
                if let Err(err) = spawn_session(&login, uid, gid, &home, &socket, system_socket) {
                    error!(login = %login, error = %err, "failed to start session daemon");
                    self.report(DaemonEvent::SessionSpawnFailed { uid });
                }
            }
            DaemonCommand::StartWatch(kind) => self.watches.start(kind),
            DaemonCommand::StopWatch(kind) => self.watches.stop(&kind),
            DaemonCommand::RequestExit => {
                info!("core issued RequestExit command");
            }
        }
    }
}

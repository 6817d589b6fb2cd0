// src/engine/mod.rs

//! Orchestration engine for the launch daemon.
//!
//! This module ties together:
//! - the job/target arenas and the launch algorithm
//! - the external event registry and OS watch bookkeeping
//! - the request surface (launch data, start/stop, introspection)
//! - the main runtime event loop that reacts to:
//!   - client requests
//!   - launch results reported by workers
//!   - process exits
//!   - watch notifications
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`] (split over [`launch`],
//! [`event_handlers`] and [`requests`]); the async/IO shell is implemented in
//! [`runtime`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::event::WatchKind;
use crate::ipc::protocol::{Reply, Request};
use crate::log::{LogEntry, LogFilter};
use crate::session::SessionLink;
use crate::types::{Caller, NameKey};

pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod launch;
pub mod requests;
pub mod restart;
pub mod runtime;

pub use core::{DaemonStep, LaunchDaemon};
pub use handle::DaemonHandle;
pub use restart::{BackoffConfig, RestartPolicy};
pub use runtime::{Runtime, SessionPaths};

pub type ReplySender = oneshot::Sender<Reply>;

/// Something the OS watchers observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchNotification {
    VolumeMounted,
    VolumeUnmounted,
    NetworkChanged { available: bool },
    FileCreated(PathBuf),
}

/// Events flowing into the daemon from clients, workers and watchers.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A client request. `reply` is `None` for fire-and-forget forwards.
    Request {
        caller: Caller,
        request: Request,
        reply: Option<ReplySender>,
    },
    /// A worker finished launching `job`.
    JobLaunched {
        job: NameKey,
        result: Result<u32, String>,
    },
    /// A launched process terminated.
    ProcessExited { pid: u32, status: i32 },
    Watch(WatchNotification),
    /// A delayed service relaunch is due.
    RelaunchDue { job: NameKey },
    /// The session daemon for `uid` could not be started.
    SessionSpawnFailed { uid: u32 },
    /// Graceful shutdown requested (e.g. SIGTERM or Ctrl-C).
    ShutdownRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMethod {
    /// Ask the process to quit through its own channel.
    Quit,
    /// SIGINT to the process group.
    Interrupt,
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug)]
pub enum DaemonCommand {
    StopProcess {
        job: NameKey,
        pid: u32,
        method: StopMethod,
    },
    /// Send `RelaunchDue { job }` after `delay`.
    ScheduleRelaunch { job: NameKey, delay: Duration },
    /// Hand a request to a session daemon and pass its reply on.
    Forward {
        link: Arc<dyn SessionLink>,
        request: Request,
        reply: Option<ReplySender>,
    },
    /// Ask a session daemon for its log and reply with it merged into
    /// `local`.
    MergeSessionLog {
        link: Arc<dyn SessionLink>,
        filter: LogFilter,
        local: Vec<LogEntry>,
        reply: ReplySender,
    },
    SpawnSession {
        login: String,
        uid: u32,
        gid: u32,
        home: PathBuf,
    },
    StartWatch(WatchKind),
    StopWatch(WatchKind),
    /// The core wants the process to exit.
    RequestExit,
}

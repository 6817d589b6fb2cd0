// src/watch/mod.rs

//! OS notification sources for event leaves.
//!
//! The daemon core only reference-counts what it needs watched and emits
//! `StartWatch`/`StopWatch` commands. [`WatchManager`] owns the actual
//! sources and turns OS state into `DaemonEvent::Watch` notifications:
//! - file creation through `notify` (polling as a fallback),
//! - volume mounts by polling `/proc/self/mountinfo`,
//! - network availability by polling `/sys/class/net/*/operstate`.

pub mod system;
pub mod watcher;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::DaemonEvent;
use crate::event::WatchKind;

pub use system::{network_available, parse_mount_points};
pub use watcher::{FileWatcherHandle, spawn_file_watcher};

#[derive(Debug)]
enum ActiveWatch {
    File(FileWatcherHandle),
    Task(JoinHandle<()>),
}

impl Drop for ActiveWatch {
    fn drop(&mut self) {
        if let ActiveWatch::Task(task) = self {
            task.abort();
        }
    }
}

#[derive(Debug)]
pub struct WatchManager {
    events: mpsc::Sender<DaemonEvent>,
    active: HashMap<WatchKind, ActiveWatch>,
    poll_interval: Duration,
    mountinfo: PathBuf,
    net_dir: PathBuf,
}

impl WatchManager {
    pub fn new(events: mpsc::Sender<DaemonEvent>) -> Self {
        Self {
            events,
            active: HashMap::new(),
            poll_interval: Duration::from_secs(2),
            mountinfo: PathBuf::from(system::MOUNTINFO_PATH),
            net_dir: PathBuf::from(system::NET_CLASS_PATH),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn start(&mut self, kind: WatchKind) {
        if self.active.contains_key(&kind) {
            return;
        }
        let events = self.events.clone();
        let watch = match &kind {
            WatchKind::FileCreated(path) => ActiveWatch::File(spawn_file_watcher(
                path.clone(),
                events,
                self.poll_interval,
            )),
            WatchKind::Volume => ActiveWatch::Task(system::spawn_volume_poller(
                self.mountinfo.clone(),
                events,
                self.poll_interval,
            )),
            WatchKind::Network => ActiveWatch::Task(system::spawn_network_poller(
                self.net_dir.clone(),
                events,
                self.poll_interval,
            )),
        };
        debug!(?kind, "watch started");
        self.active.insert(kind, watch);
    }

    pub fn stop(&mut self, kind: &WatchKind) {
        if self.active.remove(kind).is_some() {
            debug!(?kind, "watch stopped");
        }
    }

    pub fn stop_all(&mut self) {
        self.active.clear();
    }

    pub fn is_active(&self, kind: &WatchKind) -> bool {
        self.active.contains_key(kind)
    }
}

// src/watch/watcher.rs

//! Watch for a single file to be created.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{DaemonEvent, WatchNotification};

/// Keeps the underlying watcher alive; dropping it stops the watch.
pub enum FileWatcherHandle {
    Notify {
        _inner: RecommendedWatcher,
        forwarder: JoinHandle<()>,
    },
    /// Used when the parent directory cannot be watched (e.g. it does not
    /// exist yet).
    Poll(JoinHandle<()>),
}

impl std::fmt::Debug for FileWatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileWatcherHandle::Notify { .. } => f.write_str("FileWatcherHandle::Notify"),
            FileWatcherHandle::Poll(_) => f.write_str("FileWatcherHandle::Poll"),
        }
    }
}

impl Drop for FileWatcherHandle {
    fn drop(&mut self) {
        match self {
            FileWatcherHandle::Notify { forwarder, .. } => forwarder.abort(),
            FileWatcherHandle::Poll(task) => task.abort(),
        }
    }
}

/// Report `DaemonEvent::Watch(FileCreated(path))` whenever `path` shows up.
pub fn spawn_file_watcher(
    path: PathBuf,
    events: mpsc::Sender<DaemonEvent>,
    poll_interval: Duration,
) -> FileWatcherHandle {
    match notify_watcher(&path, events.clone()) {
        Ok(handle) => handle,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "falling back to polling for file creation");
            FileWatcherHandle::Poll(tokio::spawn(poll_for_file(path, events, poll_interval)))
        }
    }
}

fn notify_watcher(path: &Path, events: mpsc::Sender<DaemonEvent>) -> Result<FileWatcherHandle> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .context("path has no parent directory")?
        .to_path_buf();

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = event_tx.send(event);
            }
            Err(err) => eprintln!("launch_daemon: file watch error: {err}"),
        },
        Config::default(),
    )?;
    watcher.watch(&parent, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "watching for file creation");

    let target = path.to_path_buf();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let created = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                && event.paths.iter().any(|p| *p == target);
            if created && target.exists() {
                debug!(path = %target.display(), "watched file created");
                let notification = WatchNotification::FileCreated(target.clone());
                if events.send(DaemonEvent::Watch(notification)).await.is_err() {
                    break;
                }
            }
        }
        debug!("file watcher loop finished");
    });

    Ok(FileWatcherHandle::Notify {
        _inner: watcher,
        forwarder,
    })
}

async fn poll_for_file(path: PathBuf, events: mpsc::Sender<DaemonEvent>, interval: Duration) {
    let mut existed = path.exists();
    loop {
        tokio::time::sleep(interval).await;
        let exists = path.exists();
        if exists && !existed {
            let notification = WatchNotification::FileCreated(path.clone());
            if events.send(DaemonEvent::Watch(notification)).await.is_err() {
                return;
            }
        }
        existed = exists;
    }
}

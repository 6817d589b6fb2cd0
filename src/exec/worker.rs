// src/exec/worker.rs

//! Elastic pool of launch workers.
//!
//! The main worker waits on the queue forever. Whenever it picks up an item
//! while more work is queued, it spawns extra workers, up to
//! `max_workers`. Extra workers exit after `idle_timeout` without work.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::backend::{Launcher, QueueItem};
use super::environment::resolve_environment;
use super::queue::{JobQueue, Popped};
use crate::engine::DaemonEvent;
use crate::errors::Result;
use crate::log::{Log, LogKind};

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// `0` means the number of logical CPUs.
    pub max_workers: usize,
    pub idle_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_workers: 0,
            idle_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolOptions {
    pub fn effective_max_workers(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

#[derive(Debug)]
struct PoolShared {
    queue: Arc<JobQueue>,
    launcher: Arc<dyn Launcher>,
    events: mpsc::Sender<DaemonEvent>,
    log: Arc<Log>,
    max_workers: usize,
    idle_timeout: Duration,
    workers: AtomicUsize,
    next_id: AtomicUsize,
}

#[derive(Debug)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    main: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start the main worker.
    pub fn start(
        queue: Arc<JobQueue>,
        launcher: Arc<dyn Launcher>,
        events: mpsc::Sender<DaemonEvent>,
        log: Arc<Log>,
        options: PoolOptions,
    ) -> Result<Self> {
        let shared = Arc::new(PoolShared {
            queue,
            launcher,
            events,
            log,
            max_workers: options.effective_max_workers(),
            idle_timeout: options.idle_timeout,
            workers: AtomicUsize::new(1),
            next_id: AtomicUsize::new(1),
        });

        let main_shared = Arc::clone(&shared);
        let main = thread::Builder::new()
            .name("main worker".to_string())
            .spawn(move || main_worker(main_shared))?;

        info!(max_workers = shared.max_workers, "worker pool started");
        Ok(Self {
            shared,
            main: Mutex::new(Some(main)),
        })
    }

    /// Number of live workers, including the main one.
    pub fn worker_count(&self) -> usize {
        self.shared.workers.load(Ordering::SeqCst)
    }

    /// Close the queue and wait for the main worker to finish what is
    /// already queued.
    pub fn shutdown(&self) {
        self.shared.queue.close();
        if let Some(handle) = self.main.lock().take() {
            if handle.join().is_err() {
                error!("main worker panicked");
            }
        }
        debug!("worker pool stopped");
    }
}

fn main_worker(shared: Arc<PoolShared>) {
    loop {
        match shared.queue.pop(None) {
            Popped::Item(item) => {
                spawn_extra_workers(&shared);
                run_item(&shared, item);
            }
            Popped::TimedOut => continue,
            Popped::Closed => break,
        }
    }
    shared.workers.fetch_sub(1, Ordering::SeqCst);
}

fn extra_worker(shared: Arc<PoolShared>, id: usize) {
    debug!(worker = id, "worker started");
    loop {
        match shared.queue.pop(Some(shared.idle_timeout)) {
            Popped::Item(item) => run_item(&shared, item),
            Popped::TimedOut | Popped::Closed => break,
        }
    }
    shared.workers.fetch_sub(1, Ordering::SeqCst);
    debug!(worker = id, "worker idle; exiting");
}

fn spawn_extra_workers(shared: &Arc<PoolShared>) {
    let wanted = shared.queue.len().min(shared.max_workers);
    while shared.workers.load(Ordering::SeqCst) < wanted {
        let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
        let worker_shared = Arc::clone(shared);
        shared.workers.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("worker {id}"))
            .spawn(move || extra_worker(worker_shared, id));
        if let Err(err) = spawned {
            shared.workers.fetch_sub(1, Ordering::SeqCst);
            warn!(error = %err, "could not spawn worker");
            break;
        }
    }
}

fn run_item(shared: &PoolShared, item: QueueItem) {
    match item {
        QueueItem::Checkpoint(target) => {
            debug!(target = %target, "target checkpoint reached");
        }
        QueueItem::Launch(request) => {
            let environment = resolve_environment(&request.source_files, &request.environment);
            let result = shared
                .launcher
                .launch(&request, &environment)
                .map_err(|err| err.to_string());

            match &result {
                Ok(pid) => info!(job = %request.job, pid, "job launched"),
                Err(err) => warn!(job = %request.job, error = %err, "job launch failed"),
            }
            shared.log.add(LogKind::JobLaunched {
                job: request.job.to_string(),
                pid: result.as_ref().ok().copied(),
                error: result.as_ref().err().cloned(),
            });

            let event = DaemonEvent::JobLaunched {
                job: request.job,
                result,
            };
            if shared.events.blocking_send(event).is_err() {
                debug!("daemon event channel closed; dropping launch result");
            }
        }
    }
}

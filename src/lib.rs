// src/lib.rs

pub mod cli;
pub mod condition;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod event;
pub mod exec;
pub mod fs;
pub mod ipc;
pub mod log;
pub mod logging;
pub mod session;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::condition::SystemContext;
use crate::config::{Settings, default_config_paths, launch_order, load_settings, validate_settings};
use crate::engine::{DaemonEvent, DaemonHandle, LaunchDaemon, Runtime, SessionPaths};
use crate::exec::{JobQueue, Launcher, RealLauncher, WorkerPool};
use crate::fs::RealFileSystem;
use crate::ipc::{IpcClient, IpcServer, Request};
use crate::log::Log;
use crate::types::DaemonMode;

/// Capacity of the daemon event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings loading and validation
/// - the job queue, worker pool and launcher
/// - the daemon core and its runtime
/// - the request socket (and session registration in user mode)
/// - SIGTERM / Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mode = args.mode();
    let paths: Vec<PathBuf> = if args.config.is_empty() {
        default_config_paths(mode)
    } else {
        args.config.clone()
    };

    let settings = load_settings(&RealFileSystem, &paths);
    for warning in validate_settings(&settings) {
        warn!("{warning}");
    }

    if args.dry_run {
        print_dry_run(&settings);
        return Ok(());
    }

    let context = SystemContext::detect(args.safe_mode);
    let log = Arc::new(Log::with_capacity(settings.daemon.log_capacity));
    let queue = Arc::new(JobQueue::new());

    let (event_tx, event_rx) = mpsc::channel::<DaemonEvent>(EVENT_CHANNEL_CAPACITY);
    let launcher: Arc<dyn Launcher> = Arc::new(RealLauncher::new(event_tx.clone()));
    let pool = Arc::new(WorkerPool::start(
        Arc::clone(&queue),
        Arc::clone(&launcher),
        event_tx.clone(),
        Arc::clone(&log),
        settings.daemon.pool,
    )?);

    let core = LaunchDaemon::new(settings, Box::new(context), queue, log).with_mode(mode);
    let handle = DaemonHandle::new(event_tx.clone());

    let socket = match mode {
        DaemonMode::System => Some(args.socket.clone().unwrap_or_else(|| args.system_socket.clone())),
        DaemonMode::User => args.socket.clone(),
    };
    let server_task = match &socket {
        Some(path) => {
            let server = IpcServer::bind(path)?;
            Some(tokio::spawn(server.serve(handle.clone())))
        }
        None => None,
    };

    if let (DaemonMode::User, Some(socket)) = (mode, socket.clone()) {
        let system = IpcClient::new(&args.system_socket);
        tokio::spawn(async move {
            match system.request(&Request::RegisterSessionDaemon { socket }).await {
                Ok(_) => info!("registered with system daemon"),
                Err(status) => warn!(?status, "could not register with system daemon"),
            }
        });
    }

    spawn_signal_handlers(handle.clone())?;

    let session_paths = SessionPaths {
        runtime_dir: args.runtime_dir.clone(),
        system_socket: match mode {
            DaemonMode::System => socket.clone(),
            DaemonMode::User => None,
        },
    };
    let runtime = Runtime::new(core, event_rx, event_tx, launcher)
        .with_worker_pool(pool)
        .with_session_paths(session_paths);
    runtime.run().await?;

    if let Some(task) = server_task {
        task.abort();
    }
    Ok(())
}

/// SIGTERM and Ctrl-C → graceful shutdown.
fn spawn_signal_handlers(handle: DaemonHandle) -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
            }
            _ = terminate.recv() => {}
        }
        info!("shutdown signal received");
        handle.shutdown().await;
    });
    Ok(())
}

/// Simple dry-run output: print targets, jobs and a launch order.
fn print_dry_run(settings: &Settings) {
    println!("launch_daemon dry-run");
    println!("  daemon.log_capacity = {}", settings.daemon.log_capacity);
    println!(
        "  daemon.max_workers = {}",
        settings.daemon.pool.effective_max_workers()
    );
    println!();

    println!("targets ({}):", settings.targets.len());
    for target in settings.targets.values() {
        println!("  - {}", target.name());
        if let Some(condition) = &target.base.condition {
            println!("      if: {condition}");
        }
        if let Some(event) = &target.base.event {
            println!("      on: {event}");
        }
    }
    println!();

    println!("jobs ({}):", settings.jobs.len());
    for job in settings.jobs.values() {
        let kind = if job.is_service() { "service" } else { "job" };
        println!("  - {} ({kind})", job.name());
        if !job.arguments.is_empty() {
            println!("      launch: {:?}", job.arguments);
        }
        if let Some(target) = &job.target {
            println!("      target: {target}");
        }
        if !job.requirements.is_empty() {
            let requires: Vec<&str> = job.requirements.iter().map(|r| r.as_str()).collect();
            println!("      requires: {requires:?}");
        }
        if let Some(condition) = &job.base.condition {
            println!("      if: {condition}");
        }
        if let Some(event) = &job.base.event {
            println!("      on: {event}");
        }
        if !job.is_enabled() {
            println!("      disabled: true");
        }
    }
    println!();

    match launch_order(settings) {
        Ok(order) => println!("launch order: {}", order.join(" -> ")),
        Err(err) => println!("launch order: unavailable ({err})"),
    }

    debug!("dry-run complete (no execution)");
}

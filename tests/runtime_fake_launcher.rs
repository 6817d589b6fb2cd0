// tests/runtime_fake_launcher.rs

mod common;
use crate::common::builders::{JobBuilder, SettingsBuilder, settings_from_toml};
use crate::common::fakes::{FakeContext, FakeLauncher};
use crate::common::{init_tracing, launch_pid, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use launch_daemon::config::Settings;
use launch_daemon::engine::{DaemonEvent, DaemonHandle, LaunchDaemon, Runtime};
use launch_daemon::exec::{JobQueue, Launcher, PoolOptions, WorkerPool};
use launch_daemon::ipc::Request;
use launch_daemon::log::{Log, LogFilter, LogKind};
use launch_daemon::types::Caller;

type TestResult = Result<(), Box<dyn Error>>;

struct Running {
    handle: DaemonHandle,
    launcher: Arc<FakeLauncher>,
    task: JoinHandle<launch_daemon::errors::Result<LaunchDaemon>>,
}

/// Start a full runtime with a worker pool in front of a fake launcher.
fn spawn_runtime(settings: Settings) -> Result<Running, Box<dyn Error>> {
    let log = Arc::new(Log::with_capacity(settings.daemon.log_capacity));
    let queue = Arc::new(JobQueue::new());
    let (tx, rx) = mpsc::channel::<DaemonEvent>(64);

    let launcher = Arc::new(FakeLauncher::new());
    let dyn_launcher: Arc<dyn Launcher> = launcher.clone();
    let pool = Arc::new(WorkerPool::start(
        Arc::clone(&queue),
        Arc::clone(&dyn_launcher),
        tx.clone(),
        Arc::clone(&log),
        PoolOptions {
            max_workers: 2,
            idle_timeout: Duration::from_millis(100),
        },
    )?);

    let core = LaunchDaemon::new(settings, Box::new(FakeContext::new()), queue, log);
    let handle = DaemonHandle::new(tx.clone());
    let runtime = Runtime::new(core, rx, tx, dyn_launcher).with_worker_pool(pool);
    let task = tokio::spawn(runtime.run());

    Ok(Running {
        handle,
        launcher,
        task,
    })
}

#[tokio::test]
async fn launch_data_request_goes_through_workers() -> TestResult {
    init_tracing();

    let settings = settings_from_toml(
        r#"
        [[target]]
        name = "init"

        [[job]]
        name = "A"
        requires = ["init"]

        [[job]]
        name = "B"
        requires = ["A"]
        on_demand = true
        "#,
    );
    let running = spawn_runtime(settings)?;

    let reply = with_timeout(
        running
            .handle
            .request(Caller::ROOT, Request::GetLaunchData { name: "B".into() }),
    )
    .await;
    assert!(launch_pid(&reply).is_some(), "unexpected reply {reply:?}");

    let mut launched = running.launcher.launched_names();
    launched.sort();
    assert_eq!(launched, vec!["A", "B"]);

    running.handle.shutdown().await;
    let core = with_timeout(running.task).await??;
    assert!(core.is_shutting_down());

    // Both jobs were running and have no port, so they got interrupted.
    assert_eq!(running.launcher.interrupts().len(), 2);

    let launches = core
        .log()
        .query(&LogFilter::default())
        .into_iter()
        .filter(|entry| matches!(entry.kind, LogKind::JobLaunched { pid: Some(_), .. }))
        .count();
    assert_eq!(launches, 2);
    Ok(())
}

#[tokio::test]
async fn service_exit_is_relaunched_by_runtime() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_job(JobBuilder::service("registrar").build())
        .build();
    let running = spawn_runtime(settings)?;

    let first = with_timeout(running.handle.request(
        Caller::ROOT,
        Request::GetLaunchData {
            name: "registrar".into(),
        },
    ))
    .await;
    let first = launch_pid(&first).ok_or("registrar did not start")?;

    running
        .handle
        .sender()
        .send(DaemonEvent::ProcessExited {
            pid: first,
            status: 1,
        })
        .await?;

    let second = with_timeout(running.handle.request(
        Caller::ROOT,
        Request::GetLaunchData {
            name: "registrar".into(),
        },
    ))
    .await;
    let second = launch_pid(&second).ok_or("registrar did not restart")?;
    assert_ne!(first, second);

    running.handle.shutdown().await;
    with_timeout(running.task).await??;

    // A service gets an implicit port, so it is asked to quit.
    assert_eq!(running.launcher.quits(), vec![second]);
    Ok(())
}

#[tokio::test]
async fn pending_requests_fail_on_shutdown() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_job(
            JobBuilder::new("waiter")
                .requires("never")
                .build(),
        )
        .with_job(
            JobBuilder::new("never")
                .on(crate::common::builders::external("never_fires"))
                .build(),
        )
        .build();
    let running = spawn_runtime(settings)?;

    let handle = running.handle.clone();
    let pending = tokio::spawn(async move {
        handle
            .request(
                Caller::ROOT,
                Request::GetLaunchData {
                    name: "waiter".into(),
                },
            )
            .await
    });

    // Let the request reach the daemon before shutting down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    running.handle.shutdown().await;

    let reply = with_timeout(pending).await?;
    assert!(reply.is_err());
    with_timeout(running.task).await??;
    assert!(running.launcher.launched().is_empty());
    Ok(())
}

// tests/ipc_socket.rs

mod common;
use crate::common::builders::{JobBuilder, SettingsBuilder, TargetBuilder};
use crate::common::fakes::FakeContext;
use crate::common::{init_tracing, names, with_timeout};

use std::error::Error;
use std::sync::Arc;

use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use launch_daemon::engine::{DaemonEvent, DaemonHandle, LaunchDaemon};
use launch_daemon::errors::StatusCode;
use launch_daemon::exec::JobQueue;
use launch_daemon::ipc::{IpcClient, IpcServer, Payload, Request, WireReply};
use launch_daemon::log::Log;

type TestResult = Result<(), Box<dyn Error>>;

/// Core driven by a bare loop; nothing is ever launched.
fn spawn_core() -> DaemonHandle {
    let settings = SettingsBuilder::new()
        .with_target(TargetBuilder::new("desktop").build())
        .with_job(JobBuilder::new("tracker").target("desktop").build())
        .build();
    let mut core = LaunchDaemon::new(
        settings,
        Box::new(FakeContext::new()),
        Arc::new(JobQueue::new()),
        Arc::new(Log::default()),
    );
    let (tx, mut rx) = mpsc::channel::<DaemonEvent>(16);

    tokio::spawn(async move {
        core.start();
        while let Some(event) = rx.recv().await {
            if !core.step(event).keep_running {
                break;
            }
        }
    });
    DaemonHandle::new(tx)
}

#[tokio::test]
async fn client_talks_to_server_over_socket() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("run/daemon.sock");
    let server = IpcServer::bind(&path)?;
    assert!(path.exists());
    let serving = tokio::spawn(server.serve(spawn_core()));

    let client = IpcClient::new(&path);
    let targets = with_timeout(client.request(&Request::GetLaunchTargets)).await;
    assert_eq!(names(targets), vec!["desktop"]);

    let jobs = with_timeout(client.request(&Request::GetLaunchJobs {
        target: Some("desktop".into()),
    }))
    .await;
    assert_eq!(names(jobs), vec!["tracker"]);

    let missing = with_timeout(client.request(&Request::GetLaunchJobInfo {
        name: "ghost".into(),
    }))
    .await;
    assert_eq!(missing, Err(StatusCode::NameNotFound));

    serving.abort();
    Ok(())
}

#[tokio::test]
async fn malformed_line_gets_bad_value_and_connection_stays_open() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("daemon.sock");
    let server = IpcServer::bind(&path)?;
    let serving = tokio::spawn(server.serve(spawn_core()));

    let stream = UnixStream::connect(&path).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"{\"op\":\"no_such_op\"}\n").await?;
    let line = with_timeout(lines.next_line()).await?.ok_or("no reply")?;
    let reply: WireReply = serde_json::from_str(&line)?;
    assert_eq!(reply, WireReply::Err(StatusCode::BadValue));

    write_half
        .write_all(b"{\"op\":\"launch_target\",\"name\":\"desktop\"}\n")
        .await?;
    let line = with_timeout(lines.next_line()).await?.ok_or("no reply")?;
    let reply: WireReply = serde_json::from_str(&line)?;
    assert_eq!(reply, WireReply::Ok(Payload::Done));

    serving.abort();
    Ok(())
}

#[tokio::test]
async fn unreachable_socket_is_an_error_status() {
    let client = IpcClient::new("/definitely/not/here.sock");
    let reply = with_timeout(client.request(&Request::GetLaunchTargets)).await;
    assert!(matches!(reply, Err(StatusCode::Error(_))));
}

// tests/external_events.rs

mod common;
use crate::common::builders::{JobBuilder, SettingsBuilder, external};
use crate::common::fakes::{FakeSessionBroker, FakeSessionLink};
use crate::common::{TestDaemon, init_tracing};

use std::error::Error;
use std::sync::Arc;

use launch_daemon::engine::{DaemonCommand, DaemonEvent, WatchNotification};
use launch_daemon::errors::StatusCode;
use launch_daemon::event::{EventFlags, EventKind};
use launch_daemon::ipc::{Payload, Request};
use launch_daemon::types::Caller;

type TestResult = Result<(), Box<dyn Error>>;

fn register(name: &str, sticky: bool) -> Request {
    Request::RegisterExternalEvent {
        name: name.into(),
        owner: "tester".into(),
        flags: EventFlags { sticky },
    }
}

fn notify(name: &str) -> Request {
    Request::NotifyExternalEvent { name: name.into() }
}

fn event_triggered(daemon: &TestDaemon, job: &str) -> bool {
    daemon
        .core
        .job(job)
        .is_some_and(|j| j.base.event_triggered())
}

#[test]
fn notify_launches_listening_job() -> TestResult {
    init_tracing();

    let settings = SettingsBuilder::new()
        .with_job(JobBuilder::new("mounter").on(external("disk_added")).build())
        .build();
    let mut daemon = TestDaemon::new(settings);
    daemon.start();
    assert!(daemon.run_queue().is_empty());

    assert_eq!(daemon.call(notify("disk_added")), Err(StatusCode::NameNotFound));
    assert_eq!(daemon.call(register("disk_added", false)), Ok(Payload::Done));
    assert_eq!(daemon.call(register("disk_added", false)), Err(StatusCode::Busy));

    daemon.call(notify("disk_added"))?;
    assert_eq!(daemon.run_queue(), vec!["mounter"]);

    // The trigger was consumed by the launch.
    daemon.exit("mounter", 0);
    assert!(daemon.run_queue().is_empty());

    daemon.call(notify("disk_added"))?;
    assert_eq!(daemon.run_queue(), vec!["mounter"]);
    Ok(())
}

#[test]
fn source_registered_before_listener_binds_on_start() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_job(JobBuilder::new("late").on(external("ready")).build())
        .build();
    let mut daemon = TestDaemon::new(settings);

    daemon.call(register("ready", true))?;
    daemon.call(notify("ready"))?;

    // The sticky source already fired, so binding triggers right away.
    daemon.start();
    assert_eq!(daemon.run_queue(), vec!["late"]);
    Ok(())
}

#[test]
fn sticky_event_survives_launch_until_reset() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_job(JobBuilder::new("sync").on(external("online")).build())
        .build();
    let mut daemon = TestDaemon::new(settings);
    daemon.start();

    daemon.call(register("online", true))?;
    daemon.call(notify("online"))?;
    assert_eq!(daemon.run_queue(), vec!["sync"]);
    assert!(event_triggered(&daemon, "sync"));

    daemon.call(Request::ResetStickyExternalEvent {
        name: "online".into(),
    })?;
    assert!(!event_triggered(&daemon, "sync"));
    Ok(())
}

#[test]
fn unregistered_event_can_be_registered_again() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_job(JobBuilder::new("watcher").on(external("tick")).build())
        .build();
    let mut daemon = TestDaemon::new(settings);
    daemon.start();

    daemon.call(register("tick", false))?;
    assert_eq!(
        daemon.call(Request::UnregisterExternalEvent {
            name: "tick".into()
        }),
        Ok(Payload::Done)
    );
    assert_eq!(daemon.call(notify("tick")), Err(StatusCode::NameNotFound));
    assert_eq!(
        daemon.call(Request::UnregisterExternalEvent {
            name: "tick".into()
        }),
        Err(StatusCode::NameNotFound)
    );

    daemon.call(register("tick", false))?;
    daemon.call(notify("tick"))?;
    assert_eq!(daemon.run_queue(), vec!["watcher"]);
    Ok(())
}

#[test]
fn network_loss_resets_sticky_network_event() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_job(JobBuilder::new("ntp").on(EventKind::NetworkAvailable).build())
        .build();
    let mut daemon = TestDaemon::new(settings);
    daemon.start();

    daemon.step(DaemonEvent::Watch(WatchNotification::NetworkChanged {
        available: true,
    }));
    assert_eq!(daemon.run_queue(), vec!["ntp"]);
    assert!(event_triggered(&daemon, "ntp"));

    daemon.step(DaemonEvent::Watch(WatchNotification::NetworkChanged {
        available: false,
    }));
    assert!(!event_triggered(&daemon, "ntp"));
    Ok(())
}

#[test]
fn root_event_requests_fan_out_to_sessions() -> TestResult {
    let link = Arc::new(FakeSessionLink::new(Ok(Payload::Done)));
    let broker = FakeSessionBroker::new(Arc::clone(&link));
    let mut daemon = TestDaemon::new(SettingsBuilder::new().build()).broker(Box::new(broker));
    daemon.start();

    let mut rx = daemon.request_as(
        Caller { uid: 1000 },
        Request::RegisterSessionDaemon {
            socket: "/run/launch_daemon/session-1000.sock".into(),
        },
    );
    assert_eq!(rx.try_recv()?, Ok(Payload::Done));
    daemon.take_commands();

    daemon.call(register("media", false))?;
    let forwarded = daemon
        .take_commands()
        .into_iter()
        .filter(|cmd| {
            matches!(cmd, DaemonCommand::Forward { request: Request::RegisterExternalEvent { .. }, reply: None, .. })
        })
        .count();
    assert_eq!(forwarded, 1);

    // Non-root callers only affect this daemon.
    let mut rx = daemon.request_as(Caller { uid: 1000 }, notify("media"));
    assert_eq!(rx.try_recv()?, Ok(Payload::Done));
    assert!(daemon.take_commands().is_empty());
    Ok(())
}

#[test]
fn failed_session_spawn_allows_another_attempt() -> TestResult {
    let link = Arc::new(FakeSessionLink::new(Ok(Payload::Done)));
    let broker = FakeSessionBroker::new(link).with_user("baron", 1000);
    let mut daemon = TestDaemon::new(SettingsBuilder::new().build()).broker(Box::new(broker));
    daemon.start();

    let launch = || Request::LaunchSession {
        login: "baron".into(),
    };
    assert_eq!(daemon.call(launch()), Ok(Payload::Done));
    let spawns = daemon
        .take_commands()
        .into_iter()
        .filter(|cmd| matches!(cmd, DaemonCommand::SpawnSession { uid: 1000, .. }))
        .count();
    assert_eq!(spawns, 1);

    // Still starting up.
    assert_eq!(daemon.call(launch()), Err(StatusCode::Busy));

    daemon.step(DaemonEvent::SessionSpawnFailed { uid: 1000 });
    assert_eq!(daemon.call(launch()), Ok(Payload::Done));
    assert!(
        daemon
            .take_commands()
            .iter()
            .any(|cmd| matches!(cmd, DaemonCommand::SpawnSession { uid: 1000, .. }))
    );
    Ok(())
}

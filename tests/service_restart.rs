// tests/service_restart.rs

mod common;
use crate::common::builders::{JobBuilder, SettingsBuilder};
use crate::common::{TestDaemon, init_tracing};

use std::error::Error;
use std::time::Duration;

use launch_daemon::config::Settings;
use launch_daemon::engine::{BackoffConfig, DaemonCommand, DaemonEvent, StopMethod};
use launch_daemon::ipc::{Payload, Request};
use launch_daemon::log::{LogFilter, LogKind};

type TestResult = Result<(), Box<dyn Error>>;

fn service_and_one_shot() -> Settings {
    SettingsBuilder::new()
        .with_job(JobBuilder::service("net_server").build())
        .with_job(JobBuilder::new("cleanup").launch(&["/bin/cleanup"]).build())
        .build()
}

#[test]
fn one_shot_job_is_not_relaunched() -> TestResult {
    init_tracing();

    let mut daemon = TestDaemon::new(service_and_one_shot());
    daemon.start();
    assert_eq!(daemon.run_queue(), vec!["net_server", "cleanup"]);

    daemon.exit("cleanup", 0);
    assert!(!daemon.is_running("cleanup"));
    assert!(daemon.queued().is_empty());
    Ok(())
}

#[test]
fn finished_one_shot_requirement_is_not_rerun_for_service() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_job(JobBuilder::new("setup").launch(&["/bin/setup"]).build())
        .with_job(JobBuilder::service("net").requires("setup").build())
        .build();

    let mut daemon = TestDaemon::new(settings);
    daemon.start();
    assert_eq!(daemon.run_queue(), vec!["setup", "net"]);

    daemon.exit("setup", 0);
    daemon.exit("net", 1);
    assert_eq!(daemon.run_queue(), vec!["net"]);
    assert!(!daemon.is_running("setup"));

    // Asking for it explicitly still runs it again.
    assert_eq!(
        daemon.call(Request::LaunchJob {
            name: "setup".into()
        }),
        Ok(Payload::Done)
    );
    assert_eq!(daemon.run_queue(), vec!["setup"]);
    Ok(())
}

#[test]
fn service_is_relaunched_once_per_exit() -> TestResult {
    let mut daemon = TestDaemon::new(service_and_one_shot());
    daemon.start();
    daemon.run_queue();

    let first = daemon.pid_of("net_server").ok_or("net_server not running")?;
    daemon.exit("net_server", 1);
    assert!(daemon.is_launching("net_server"));

    // The same exit reported twice must not queue a second launch.
    daemon.step(DaemonEvent::ProcessExited {
        pid: first,
        status: 1,
    });
    assert_eq!(daemon.run_queue(), vec!["net_server"]);

    let second = daemon.pid_of("net_server").ok_or("net_server not relaunched")?;
    assert_ne!(first, second);
    Ok(())
}

#[test]
fn restart_limit_leaves_service_stopped() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_job(JobBuilder::service("flaky").build())
        .max_restarts(1)
        .build();

    let mut daemon = TestDaemon::new(settings);
    daemon.start();
    daemon.run_queue();

    daemon.exit("flaky", 1);
    assert_eq!(daemon.run_queue(), vec!["flaky"]);

    daemon.exit("flaky", 1);
    assert!(daemon.run_queue().is_empty());
    assert!(!daemon.is_running("flaky"));

    let gave_up = daemon
        .core
        .log()
        .query(&LogFilter::default())
        .into_iter()
        .any(|entry| matches!(entry.kind, LogKind::RestartLimitReached { ref job, restarts: 1 } if job == "flaky"));
    assert!(gave_up);

    // An explicit start clears the history.
    assert_eq!(
        daemon.call(Request::LaunchJob {
            name: "flaky".into()
        }),
        Ok(Payload::Done)
    );
    assert_eq!(daemon.run_queue(), vec!["flaky"]);
    Ok(())
}

#[test]
fn backoff_schedules_relaunch() -> TestResult {
    let mut settings = SettingsBuilder::new()
        .with_job(JobBuilder::service("slow").build())
        .build();
    settings.daemon.restart.backoff = BackoffConfig {
        initial: Duration::from_secs(2),
        max: Duration::from_secs(10),
        multiplier: 2.0,
    };

    let mut daemon = TestDaemon::new(settings);
    daemon.start();
    daemon.run_queue();
    daemon.take_commands();

    daemon.exit("slow", 1);
    assert!(daemon.queued().is_empty());
    let scheduled = daemon.take_commands().into_iter().find_map(|cmd| match cmd {
        DaemonCommand::ScheduleRelaunch { job, delay } => Some((job.to_string(), delay)),
        _ => None,
    });
    assert_eq!(scheduled, Some(("slow".to_string(), Duration::from_secs(2))));

    daemon.step(DaemonEvent::RelaunchDue { job: "slow".into() });
    assert_eq!(daemon.run_queue(), vec!["slow"]);
    Ok(())
}

#[test]
fn stopped_service_stays_down() -> TestResult {
    let mut daemon = TestDaemon::new(service_and_one_shot());
    daemon.start();
    daemon.run_queue();
    daemon.take_commands();

    let pid = daemon.pid_of("net_server").ok_or("net_server not running")?;
    assert_eq!(
        daemon.call(Request::StopLaunchJob {
            name: "net_server".into(),
            force: false
        }),
        Ok(Payload::Done)
    );

    let stops: Vec<_> = daemon
        .take_commands()
        .into_iter()
        .filter_map(|cmd| match cmd {
            DaemonCommand::StopProcess { pid, method, .. } => Some((pid, method)),
            _ => None,
        })
        .collect();
    assert_eq!(stops, vec![(pid, StopMethod::Quit)]);

    daemon.exit("net_server", 0);
    assert!(daemon.run_queue().is_empty());
    assert!(!daemon.core.job("net_server").is_some_and(|j| j.is_enabled()));
    Ok(())
}

#[test]
fn shutdown_stops_everything_and_relaunches_nothing() -> TestResult {
    let mut daemon = TestDaemon::new(service_and_one_shot());
    daemon.start();
    daemon.run_queue();
    daemon.take_commands();

    let keep_running = daemon.step(DaemonEvent::ShutdownRequested);
    assert!(!keep_running);
    assert!(daemon.core.is_shutting_down());

    let commands = daemon.take_commands();
    let stopped = commands
        .iter()
        .filter(|cmd| matches!(cmd, DaemonCommand::StopProcess { .. }))
        .count();
    assert_eq!(stopped, 2);
    assert!(matches!(commands.last(), Some(DaemonCommand::RequestExit)));

    daemon.exit("net_server", 0);
    assert!(daemon.run_queue().is_empty());
    assert!(daemon.core.queue().is_closed());
    Ok(())
}

// tests/boot_sequence.rs

mod common;
use crate::common::builders::{JobBuilder, SettingsBuilder, TargetBuilder, settings_from_toml};
use crate::common::fakes::FakeContext;
use crate::common::{TestDaemon, init_tracing, launch_pid};

use std::error::Error;

use launch_daemon::condition::Condition;
use launch_daemon::errors::StatusCode;
use launch_daemon::exec::Executable;
use launch_daemon::ipc::Request;
use launch_daemon::log::{LogFilter, LogKind};

type TestResult = Result<(), Box<dyn Error>>;

const BOOT: &str = r#"
[[target]]
name = "init"

[[job]]
name = "A"
launch = ["/bin/a"]
requires = ["init"]

[[job]]
name = "B"
launch = ["/bin/b"]
requires = ["A"]
on_demand = true
"#;

#[test]
fn on_demand_job_waits_for_launch_data_request() -> TestResult {
    init_tracing();

    let mut daemon = TestDaemon::new(settings_from_toml(BOOT));
    daemon.start();

    assert!(daemon.target_launched("init"), "init should launch for A");
    assert_eq!(daemon.run_queue(), vec!["A".to_string()]);
    assert!(daemon.is_running("A"));
    assert!(!daemon.is_running("B") && !daemon.is_launching("B"));

    let mut reply = daemon.request(Request::GetLaunchData { name: "B".into() });
    assert!(daemon.is_launching("B"));
    assert!(reply.try_recv().is_err(), "reply waits for the launch");

    assert_eq!(daemon.run_queue(), vec!["B".to_string()]);
    let reply = reply.try_recv()?;
    assert_eq!(launch_pid(&reply), daemon.pid_of("B"));
    assert!(daemon.is_running("B"));

    // Nothing else got launched along the way.
    assert_eq!(daemon.launcher.launched_names(), vec!["A", "B"]);
    Ok(())
}

#[test]
fn launch_data_of_running_job_is_answered_right_away() -> TestResult {
    let mut daemon = TestDaemon::new(settings_from_toml(BOOT));
    daemon.start();
    daemon.run_queue();

    let reply = daemon.call(Request::GetLaunchData { name: "a".into() });
    assert_eq!(launch_pid(&reply), daemon.pid_of("A"));
    Ok(())
}

#[test]
fn cyclic_jobs_are_dropped_while_siblings_start() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_job(JobBuilder::new("X").requires("Y").build())
        .with_job(JobBuilder::new("Y").requires("X").build())
        .with_job(JobBuilder::new("Z").build())
        .with_job(JobBuilder::new("W").requires("Z").build())
        .build();

    let mut daemon = TestDaemon::new(settings);
    daemon.start();

    assert!(daemon.core.job("X").is_none());
    assert!(daemon.core.job("Y").is_none());
    assert_eq!(daemon.run_queue(), vec!["Z".to_string(), "W".to_string()]);

    let ignored: Vec<String> = daemon
        .core
        .log()
        .query(&LogFilter::default())
        .into_iter()
        .filter_map(|entry| match entry.kind {
            LogKind::JobIgnored { job, status } => {
                assert_eq!(status, StatusCode::BadValue);
                Some(job)
            }
            _ => None,
        })
        .collect();
    assert!(ignored.contains(&"X".to_string()));
    Ok(())
}

#[test]
fn unknown_requirement_drops_the_job() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_job(JobBuilder::new("lonely").requires("nowhere").build())
        .build();

    let mut daemon = TestDaemon::new(settings);
    daemon.start();

    assert!(daemon.core.job("lonely").is_none());
    assert!(daemon.run_queue().is_empty());
    Ok(())
}

#[test]
fn run_directive_picks_branch_by_condition() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_target(TargetBuilder::new("desktop").build())
        .with_target(TargetBuilder::new("rescue").build())
        .with_job(JobBuilder::new("tracker").target("desktop").build())
        .with_job(JobBuilder::new("console").target("rescue").build())
        .run_if(Condition::Safemode, "rescue", "desktop")
        .build();

    let mut normal = TestDaemon::new(settings.clone());
    normal.start();
    assert_eq!(normal.run_queue(), vec!["tracker".to_string()]);
    assert!(!normal.target_launched("rescue"));

    let mut safe = TestDaemon::with_context(settings, FakeContext::new().safe_mode());
    safe.start();
    assert_eq!(safe.run_queue(), vec!["console".to_string()]);
    Ok(())
}

#[test]
fn never_true_condition_drops_job_at_init() -> TestResult {
    let settings = settings_from_toml(
        r#"
        [[job]]
        name = "normal_only"
        no_safemode = true

        [[job]]
        name = "always"
        "#,
    );

    let mut daemon = TestDaemon::with_context(settings, FakeContext::new().safe_mode());
    daemon.start();

    assert!(daemon.core.job("normal_only").is_none());
    assert_eq!(daemon.run_queue(), vec!["always".to_string()]);
    Ok(())
}

#[test]
fn launch_request_carries_target_environment_first() -> TestResult {
    let settings = settings_from_toml(
        r#"
        [[run]]
        target = "desktop"

        [[target]]
        name = "desktop"
        env = { DISPLAY = ":0", LANG = "C" }

            [[target.service]]
            name = "x-vendor/tracker"

                [target.service.env]
                LANG = "en_US.UTF-8"
        "#,
    );

    let mut daemon = TestDaemon::new(settings);
    daemon.start();
    daemon.run_queue();

    let launched = daemon.launcher.launched();
    assert_eq!(launched.len(), 1);
    let request = &launched[0];
    assert_eq!(request.executable, Executable::Signature("tracker".into()));
    assert_eq!(
        request.environment,
        vec![
            ("DISPLAY".to_string(), ":0".to_string()),
            ("LANG".to_string(), "C".to_string()),
            ("LANG".to_string(), "en_US.UTF-8".to_string()),
        ]
    );
    // Services get an implicit port.
    assert_eq!(request.ports.len(), 1);
    Ok(())
}

#[test]
fn target_job_waits_for_target_event() -> TestResult {
    let settings = SettingsBuilder::new()
        .with_target(
            TargetBuilder::new("network")
                .on(launch_daemon::event::EventKind::NetworkAvailable)
                .build(),
        )
        .with_job(JobBuilder::new("dhcp").target("network").build())
        .build();

    let mut daemon = TestDaemon::new(settings);
    daemon.start();
    assert!(daemon.run_queue().is_empty());
    assert!(!daemon.target_launched("network"));

    daemon.step(launch_daemon::engine::DaemonEvent::Watch(
        launch_daemon::engine::WatchNotification::NetworkChanged { available: true },
    ));
    assert!(daemon.target_launched("network"));
    assert_eq!(daemon.run_queue(), vec!["dhcp".to_string()]);
    Ok(())
}

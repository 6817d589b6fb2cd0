// tests/config_loading.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;
use std::time::Duration;

use tempfile::tempdir;

use launch_daemon::condition::Condition;
use launch_daemon::config::{launch_order, load_settings, validate_settings};
use launch_daemon::fs::RealFileSystem;
use launch_daemon::types::NameKey;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn directory_files_merge_in_name_order() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::write(
        dir.path().join("10-base.toml"),
        r#"
        [daemon]
        log_capacity = 64

        [daemon.restart]
        max_restarts = 3
        window = "30s"

        [[target]]
        name = "desktop"
        if = { safemode = false }

            [[target.service]]
            name = "tracker"
            launch = ["/system/tracker"]

            [[target.service]]
            name = "deskbar"
            requires = ["tracker"]

        [[service]]
        name = "net_server"
        port = [{ name = "control", capacity = 5 }]
        on = { network_available = true }
        "#,
    )?;
    fs::write(
        dir.path().join("20-override.toml"),
        r#"
        [[service]]
        name = "net_server"
        disabled = true

        [[run]]
        target = "desktop"
        "#,
    )?;
    fs::write(dir.path().join("notes.txt"), "not a settings file")?;

    let settings = load_settings(&RealFileSystem, &[dir.path().to_path_buf()]);

    assert_eq!(settings.daemon.log_capacity, 64);
    assert_eq!(settings.daemon.restart.max_restarts, 3);
    assert_eq!(settings.daemon.restart.window, Duration::from_secs(30));

    let desktop = settings.targets.get(&NameKey::from("desktop")).ok_or("no desktop")?;
    assert_eq!(
        desktop.base.condition,
        Some(Condition::Not(vec![Condition::Safemode]))
    );

    let tracker = settings.jobs.get(&NameKey::from("tracker")).ok_or("no tracker")?;
    assert!(tracker.is_service());
    assert_eq!(tracker.target.as_ref().map(|t| t.as_str()), Some("desktop"));

    // The later definition replaced the earlier one wholesale.
    let net = settings.jobs.get(&NameKey::from("net_server")).ok_or("no net_server")?;
    assert!(!net.is_enabled());
    assert!(net.ports.is_empty());
    assert!(net.base.event.is_none());

    assert_eq!(settings.run.len(), 1);
    assert!(validate_settings(&settings).is_empty());
    Ok(())
}

#[test]
fn broken_entries_are_skipped() -> TestResult {
    let dir = tempdir()?;
    fs::write(dir.path().join("a.toml"), "this is = = not toml")?;
    fs::write(
        dir.path().join("b.toml"),
        r#"
        [[job]]
        name = "good"

        [[job]]
        name = "bad_event"
        on = { and = [] }

        [[job]]
        name = ""
        "#,
    )?;

    let settings = load_settings(&RealFileSystem, &[dir.path().to_path_buf()]);

    let names: Vec<&str> = settings.jobs.keys().map(|k| k.as_str()).collect();
    assert_eq!(names, vec!["good"]);
    Ok(())
}

#[test]
fn reset_target_drops_earlier_jobs() -> TestResult {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("1.toml"),
        r#"
        [[target]]
        name = "login"

            [[target.job]]
            name = "old_greeter"
        "#,
    )?;
    fs::write(
        dir.path().join("2.toml"),
        r#"
        [[target]]
        name = "login"
        reset = true

            [[target.job]]
            name = "greeter"
        "#,
    )?;

    let settings = load_settings(&RealFileSystem, &[dir.path().to_path_buf()]);
    assert!(!settings.jobs.contains_key(&NameKey::from("old_greeter")));
    assert!(settings.jobs.contains_key(&NameKey::from("greeter")));
    Ok(())
}

#[test]
fn validation_reports_cycles_and_unknown_names() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("jobs.toml");
    fs::write(
        &path,
        r#"
        [[job]]
        name = "a"
        requires = ["b"]

        [[job]]
        name = "b"
        requires = ["a"]

        [[job]]
        name = "c"
        requires = ["ghost"]

        [[run]]
        target = "nowhere"
        "#,
    )?;

    let settings = load_settings(&RealFileSystem, &[path]);
    let warnings = validate_settings(&settings);

    assert!(warnings.iter().any(|w| w.contains("cycle")));
    assert!(warnings.iter().any(|w| w.contains("ghost")));
    assert!(warnings.iter().any(|w| w.contains("nowhere")));
    assert!(launch_order(&settings).is_err());
    Ok(())
}

#[test]
fn missing_path_yields_empty_settings() {
    let settings = load_settings(
        &RealFileSystem,
        &["/definitely/not/here/launch_daemon".into()],
    );
    assert!(settings.jobs.is_empty());
    assert!(settings.targets.is_empty());
}

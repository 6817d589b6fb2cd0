// src/config/model.rs

use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use toml::{Table, Value};

use crate::condition::Condition;
use crate::dag::{Job, PortSpec, Target};
use crate::engine::restart::{BackoffConfig, RestartPolicy};
use crate::errors::{LaunchError, Result};
use crate::exec::PoolOptions;
use crate::log::DEFAULT_LOG_CAPACITY;
use crate::types::NameKey;

/// One settings file as read from TOML.
///
/// ```toml
/// [daemon]
/// max_workers = 4
///
/// [[target]]
/// name = "desktop"
/// on = { network_available = true }
///
///   [[target.service]]
///   name = "tracker"
///   launch = ["/usr/bin/tracker"]
///
/// [[service]]
/// name = "net_server"
/// requires = ["mount_server"]
///
/// [[run]]
/// target = "desktop"
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SettingsFile {
    #[serde(default)]
    pub daemon: Option<DaemonSection>,
    #[serde(default)]
    pub target: Vec<TargetConfig>,
    #[serde(default)]
    pub job: Vec<JobConfig>,
    #[serde(default)]
    pub service: Vec<JobConfig>,
    #[serde(default)]
    pub run: Vec<RunConfig>,
}

/// `[daemon]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSection {
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// `0` uses the number of logical CPUs.
    #[serde(default)]
    pub max_workers: usize,

    /// Duration string (e.g. `"5s"`) after which an idle extra worker exits.
    #[serde(default = "default_idle_timeout")]
    pub worker_idle_timeout: String,

    #[serde(default)]
    pub restart: RestartSection,
}

fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

fn default_idle_timeout() -> String {
    "5s".to_string()
}

/// `[daemon.restart]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RestartSection {
    /// `0` means unlimited.
    #[serde(default)]
    pub max_restarts: u32,
    #[serde(default = "default_window")]
    pub window: String,
    #[serde(default)]
    pub backoff: BackoffSection,
}

fn default_window() -> String {
    "60s".to_string()
}

impl Default for RestartSection {
    fn default() -> Self {
        Self {
            max_restarts: 0,
            window: default_window(),
            backoff: BackoffSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackoffSection {
    #[serde(default = "zero")]
    pub initial: String,
    #[serde(default = "zero")]
    pub max: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn zero() -> String {
    "0s".to_string()
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial: zero(),
            max: zero(),
            multiplier: default_multiplier(),
        }
    }
}

/// `[[target]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,

    /// Discard the jobs earlier files declared for this target.
    #[serde(default)]
    pub reset: bool,

    #[serde(default)]
    pub no_safemode: bool,

    #[serde(default)]
    pub on: Option<Value>,

    #[serde(default, rename = "if")]
    pub condition: Option<Value>,

    #[serde(default)]
    pub env: Option<Table>,

    #[serde(default)]
    pub job: Vec<JobConfig>,

    #[serde(default)]
    pub service: Vec<JobConfig>,
}

/// `[[job]]` / `[[service]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub name: String,

    /// Executable and arguments. Empty launches by signature.
    #[serde(default)]
    pub launch: Vec<String>,

    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(default)]
    pub disabled: bool,

    /// Defaults to `true` for one-shot jobs and `false` for services.
    #[serde(default)]
    pub legacy: Option<bool>,

    #[serde(default)]
    pub on_demand: bool,

    #[serde(default)]
    pub no_safemode: bool,

    #[serde(default)]
    pub port: Vec<PortSpec>,

    #[serde(default)]
    pub on: Option<Value>,

    #[serde(default, rename = "if")]
    pub condition: Option<Value>,

    /// `KEY = "value"` entries plus an optional `from_script` list.
    #[serde(default)]
    pub env: Option<Table>,
}

/// `[[run]]` entry.
///
/// Either `target = "name"`, or `if`/`then`/`else` lists of target names.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RunConfig {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default, rename = "if")]
    pub condition: Option<Value>,
    #[serde(default)]
    pub then: Vec<String>,
    #[serde(default, rename = "else")]
    pub otherwise: Vec<String>,
}

/// Resolved `[daemon]` settings.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub log_capacity: usize,
    pub pool: PoolOptions,
    pub restart: RestartPolicy,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            pool: PoolOptions::default(),
            restart: RestartPolicy::default(),
        }
    }
}

impl TryFrom<&DaemonSection> for DaemonSettings {
    type Error = LaunchError;

    fn try_from(section: &DaemonSection) -> Result<Self> {
        if section.log_capacity == 0 {
            return Err(LaunchError::Config(
                "[daemon].log_capacity must be >= 1 (got 0)".to_string(),
            ));
        }
        let restart = &section.restart;
        if restart.backoff.multiplier < 1.0 {
            return Err(LaunchError::Config(format!(
                "[daemon.restart].backoff.multiplier must be >= 1.0 (got {})",
                restart.backoff.multiplier
            )));
        }

        Ok(Self {
            log_capacity: section.log_capacity,
            pool: PoolOptions {
                max_workers: section.max_workers,
                idle_timeout: duration_setting(&section.worker_idle_timeout)?,
            },
            restart: RestartPolicy {
                max_restarts: restart.max_restarts,
                window: duration_setting(&restart.window)?,
                backoff: BackoffConfig {
                    initial: duration_setting(&restart.backoff.initial)?,
                    max: duration_setting(&restart.backoff.max)?,
                    multiplier: restart.backoff.multiplier,
                },
            },
        })
    }
}

fn duration_setting(value: &str) -> Result<Duration> {
    parse_duration(value).map_err(LaunchError::Config)
}

/// `[[run]]` after compilation.
#[derive(Debug, Clone)]
pub struct RunDirective {
    pub condition: Option<Condition>,
    pub then: Vec<NameKey>,
    pub otherwise: Vec<NameKey>,
}

/// Everything the daemon starts from: the merge of all settings files.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub daemon: DaemonSettings,
    pub jobs: IndexMap<NameKey, Job>,
    pub targets: IndexMap<NameKey, Target>,
    pub run: Vec<RunDirective>,
}

/// Parse durations like `"500ms"`, `"3s"`, `"2m"`, `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Case-insensitive lookup key for job and target names.
///
/// The original spelling is kept for display; equality, hashing and ordering
/// only look at the lowercased form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct NameKey {
    display: String,
    folded: String,
}

impl NameKey {
    pub fn new(name: impl Into<String>) -> Self {
        let display = name.into();
        let folded = display.to_lowercase();
        Self { display, folded }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// `name` with everything up to the last `/` removed.
    pub fn leaf(name: &str) -> &str {
        name.rsplit('/').next().unwrap_or(name)
    }
}

impl PartialEq for NameKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for NameKey {}

impl std::hash::Hash for NameKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl PartialOrd for NameKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NameKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.folded.cmp(&other.folded)
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<&str> for NameKey {
    fn from(value: &str) -> Self {
        NameKey::new(value)
    }
}

impl From<&String> for NameKey {
    fn from(value: &String) -> Self {
        NameKey::new(value.as_str())
    }
}

impl From<String> for NameKey {
    fn from(value: String) -> Self {
        NameKey::new(value)
    }
}

impl From<NameKey> for String {
    fn from(value: NameKey) -> Self {
        value.display
    }
}

/// Options controlling how eagerly `launch_job` may start a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchOptions(u8);

impl LaunchOptions {
    pub const NONE: LaunchOptions = LaunchOptions(0);
    /// Ignore the event and condition gates (enabled is still required).
    pub const FORCE_NOW: LaunchOptions = LaunchOptions(1);
    /// Fire a reachable demand event if the job's event has not fired yet.
    pub const TRIGGER_DEMAND: LaunchOptions = LaunchOptions(1 << 1);
    /// Relaunch of a service after its process died; skips the event gate.
    pub const RELAUNCH: LaunchOptions = LaunchOptions(1 << 2);

    pub fn contains(self, other: LaunchOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LaunchOptions {
    type Output = LaunchOptions;

    fn bitor(self, rhs: Self) -> Self::Output {
        LaunchOptions(self.0 | rhs.0)
    }
}

/// Whether this daemon instance serves the whole system or a single user
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DaemonMode {
    #[default]
    System,
    User,
}

impl FromStr for DaemonMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(DaemonMode::System),
            "user" => Ok(DaemonMode::User),
            other => Err(format!(
                "invalid daemon mode: {other} (expected \"system\" or \"user\")"
            )),
        }
    }
}

/// Identity of whoever issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub uid: u32,
}

impl Caller {
    pub const ROOT: Caller = Caller { uid: 0 };

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

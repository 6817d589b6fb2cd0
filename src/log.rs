// src/log.rs

//! Introspection log.
//!
//! A bounded ring buffer of what the daemon did, queried through
//! `GetLaunchLog`. This is separate from `tracing` diagnostics: entries are
//! typed and survive for clients to inspect.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::StatusCode;

pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOrigin {
    #[default]
    System,
    /// Forwarded from a per-user session daemon.
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogKind {
    JobInitialized {
        job: String,
    },
    JobIgnored {
        job: String,
        status: StatusCode,
    },
    JobLaunched {
        job: String,
        pid: Option<u32>,
        error: Option<String>,
    },
    JobTerminated {
        job: String,
        pid: u32,
        status: i32,
    },
    JobEnabled {
        job: String,
        enabled: bool,
    },
    JobStopped {
        job: String,
        force: bool,
    },
    TargetLaunched {
        target: String,
    },
    TargetStopped {
        target: String,
    },
    EventTriggered {
        owner: String,
        event: String,
    },
    ExternalEventRegistered {
        name: String,
        owner: String,
    },
    ExternalEventUnregistered {
        name: String,
    },
    RestartLimitReached {
        job: String,
        restarts: u32,
    },
}

impl LogKind {
    /// Job or target the entry is about.
    pub fn job(&self) -> Option<&str> {
        match self {
            LogKind::JobInitialized { job }
            | LogKind::JobIgnored { job, .. }
            | LogKind::JobLaunched { job, .. }
            | LogKind::JobTerminated { job, .. }
            | LogKind::JobEnabled { job, .. }
            | LogKind::JobStopped { job, .. }
            | LogKind::RestartLimitReached { job, .. } => Some(job),
            LogKind::TargetLaunched { target } | LogKind::TargetStopped { target } => Some(target),
            LogKind::EventTriggered { owner, .. } => Some(owner),
            LogKind::ExternalEventRegistered { .. } | LogKind::ExternalEventUnregistered { .. } => {
                None
            }
        }
    }

    /// Event name the entry is about.
    pub fn event(&self) -> Option<&str> {
        match self {
            LogKind::EventTriggered { event, .. } => Some(event),
            LogKind::ExternalEventRegistered { name, .. }
            | LogKind::ExternalEventUnregistered { name } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub origin: LogOrigin,
    #[serde(flatten)]
    pub kind: LogKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Case-insensitive job or target name.
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    /// Keep only the newest `limit` matches.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub system_only: bool,
    #[serde(default)]
    pub user_only: bool,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.system_only && entry.origin != LogOrigin::System {
            return false;
        }
        if self.user_only && entry.origin != LogOrigin::User {
            return false;
        }
        if let Some(job) = &self.job {
            let Some(name) = entry.kind.job() else {
                return false;
            };
            if !name.eq_ignore_ascii_case(job) {
                return false;
            }
        }
        if let Some(event) = &self.event {
            let Some(name) = entry.kind.event() else {
                return false;
            };
            if !name.contains(event.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug)]
pub struct Log {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl Default for Log {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl Log {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add(&self, kind: LogKind) {
        self.add_entry(LogEntry {
            when: Utc::now(),
            origin: LogOrigin::System,
            kind,
        });
    }

    pub fn add_entry(&self, entry: LogEntry) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Matching entries, oldest first.
    pub fn query(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let entries = self.entries.lock();
        let mut matched: Vec<LogEntry> = entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }
}

/// Merge entries from a session daemon into local ones, tagging them as
/// user entries and ordering by time.
pub fn merge_session_entries(
    mut local: Vec<LogEntry>,
    session: Vec<LogEntry>,
    limit: Option<usize>,
) -> Vec<LogEntry> {
    local.extend(session.into_iter().map(|mut entry| {
        entry.origin = LogOrigin::User;
        entry
    }));
    local.sort_by_key(|entry| entry.when);
    if let Some(limit) = limit {
        let skip = local.len().saturating_sub(limit);
        local.drain(..skip);
    }
    local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_entries() {
        let log = Log::with_capacity(2);
        for name in ["a", "b", "c"] {
            log.add(LogKind::TargetLaunched {
                target: name.into(),
            });
        }

        let entries = log.query(&LogFilter::default());
        let names: Vec<_> = entries.iter().filter_map(|e| e.kind.job()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn filters_by_job_and_limit() {
        let log = Log::default();
        log.add(LogKind::JobInitialized { job: "Net".into() });
        log.add(LogKind::JobInitialized { job: "other".into() });
        log.add(LogKind::JobEnabled {
            job: "net".into(),
            enabled: false,
        });

        let filter = LogFilter {
            job: Some("NET".into()),
            limit: Some(1),
            ..Default::default()
        };
        let entries = log.query(&filter);
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0].kind, LogKind::JobEnabled { .. }));
    }
}

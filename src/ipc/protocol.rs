// src/ipc/protocol.rs

//! Request/reply types of the daemon's request surface.
//!
//! On the socket each message is one line of JSON:
//!
//! ```text
//! {"op":"get_launch_data","name":"net_server"}
//! {"ok":{"kind":"launch_data","pid":412,"ports":{"":7}}}
//! ```

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::StatusCode;
use crate::event::EventFlags;
use crate::log::{LogEntry, LogFilter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Pid and ports of a job, launching it on demand if needed.
    GetLaunchData { name: String },
    /// Launch a target, creating it from `base` if it does not exist yet.
    LaunchTarget {
        name: String,
        #[serde(default)]
        base: Option<String>,
        #[serde(default)]
        data: Option<Map<String, Value>>,
    },
    StopLaunchTarget {
        name: String,
        #[serde(default)]
        force: bool,
        #[serde(default)]
        data: Option<Map<String, Value>>,
    },
    /// Enable and force-launch a job.
    LaunchJob { name: String },
    EnableLaunchJob { name: String, enable: bool },
    StopLaunchJob {
        name: String,
        #[serde(default)]
        force: bool,
    },
    /// Start a per-user session daemon (root only).
    LaunchSession { login: String },
    /// A session daemon announces the socket it listens on.
    RegisterSessionDaemon { socket: PathBuf },
    RegisterExternalEvent {
        name: String,
        owner: String,
        #[serde(default)]
        flags: EventFlags,
    },
    UnregisterExternalEvent { name: String },
    NotifyExternalEvent { name: String },
    ResetStickyExternalEvent { name: String },
    GetLaunchTargets,
    GetLaunchTargetInfo { name: String },
    GetLaunchJobs {
        #[serde(default)]
        target: Option<String>,
    },
    GetLaunchJobInfo { name: String },
    GetLaunchLog {
        #[serde(default)]
        filter: LogFilter,
    },
}

impl Request {
    /// Requests a system daemon repeats to every session when root issues
    /// them.
    pub fn is_session_broadcast(&self) -> bool {
        matches!(
            self,
            Request::RegisterExternalEvent { .. }
                | Request::UnregisterExternalEvent { .. }
                | Request::NotifyExternalEvent { .. }
                | Request::ResetStickyExternalEvent { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    pub service: bool,
    pub enabled: bool,
    pub launching: bool,
    pub running: bool,
    pub pid: Option<u32>,
    pub target: Option<String>,
    pub requires: Vec<String>,
    pub launch: Vec<String>,
    pub condition: Option<String>,
    pub event: Option<String>,
    pub environment: IndexMap<String, String>,
    pub ports: IndexMap<String, u32>,
    pub pending: Vec<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub name: String,
    pub launched: bool,
    pub condition: Option<String>,
    pub event: Option<String>,
    pub jobs: Vec<String>,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Done,
    LaunchData {
        pid: u32,
        ports: IndexMap<String, u32>,
    },
    Names { names: Vec<String> },
    TargetInfo { info: TargetInfo },
    JobInfo { info: JobInfo },
    Log { entries: Vec<LogEntry> },
}

pub type Reply = Result<Payload, StatusCode>;

/// Wire form of a [`Reply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireReply {
    Ok(Payload),
    Err(StatusCode),
}

impl From<Reply> for WireReply {
    fn from(reply: Reply) -> Self {
        match reply {
            Ok(payload) => WireReply::Ok(payload),
            Err(status) => WireReply::Err(status),
        }
    }
}

impl From<WireReply> for Reply {
    fn from(reply: WireReply) -> Self {
        match reply {
            WireReply::Ok(payload) => Ok(payload),
            WireReply::Err(status) => Err(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format() {
        let request: Request =
            serde_json::from_str(r#"{"op":"stop_launch_job","name":"net"}"#).unwrap();
        assert_eq!(
            request,
            Request::StopLaunchJob {
                name: "net".into(),
                force: false
            }
        );
    }

    #[test]
    fn error_reply_wire_format() {
        let wire = WireReply::from(Reply::Err(StatusCode::NameNotFound));
        assert_eq!(
            serde_json::to_string(&wire).unwrap(),
            r#"{"err":"name_not_found"}"#
        );
    }
}

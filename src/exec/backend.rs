// src/exec/backend.rs

//! Pluggable launch backend.
//!
//! Workers hand every [`LaunchRequest`] to a [`Launcher`]. Production code
//! uses [`RealLauncher`](super::process::RealLauncher), which spawns OS
//! processes; tests provide a fake that only records the requests and hands
//! out made-up pids.

use std::fmt::Debug;
use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::errors::Result;
use crate::types::NameKey;

/// How to find the program of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executable {
    /// Explicit path (or PATH-relative name) and arguments.
    Command(Vec<String>),
    /// Launch by signature: the job name is resolved to a program.
    Signature(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortAssignment {
    pub name: String,
    pub id: u32,
    pub capacity: u32,
}

/// Everything a worker needs to start one job.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub job: NameKey,
    pub executable: Executable,
    /// Target entries first, then the job's own.
    pub environment: Vec<(String, String)>,
    /// Evaluated by the worker, before `environment` is applied.
    pub source_files: Vec<PathBuf>,
    pub ports: Vec<PortAssignment>,
    pub target_data: Option<Map<String, Value>>,
}

/// A unit of work on the job queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Launch(LaunchRequest),
    /// Target pass marker; executing it does nothing.
    Checkpoint(NameKey),
}

/// Abstracts process creation and signalling.
///
/// `launch` is called from worker threads and may block.
pub trait Launcher: Send + Sync + Debug {
    /// Start the job's process with the fully resolved environment and
    /// return its pid.
    fn launch(&self, request: &LaunchRequest, environment: &[(String, String)]) -> Result<u32>;

    /// Ask the process to quit through its own channel.
    fn request_quit(&self, pid: u32) -> Result<()>;

    /// Interrupt the whole process group.
    fn interrupt(&self, pid: u32) -> Result<()>;
}

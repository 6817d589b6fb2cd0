// src/exec/process.rs

//! Production launcher built on `std::process`.
//!
//! Every job gets its own process group so an interrupt reaches the whole
//! tree. A reaper thread per child waits for the exit and reports
//! [`DaemonEvent::ProcessExited`].

use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, Stdio};
use std::thread;

use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::backend::{Executable, LaunchRequest, Launcher};
use crate::engine::DaemonEvent;
use crate::errors::{LaunchError, Result};

/// Environment variables telling a job which ports it owns.
pub const PORTS_VARIABLE: &str = "LAUNCH_DAEMON_PORTS";
pub const TARGET_DATA_VARIABLE: &str = "LAUNCH_DAEMON_TARGET_DATA";

#[derive(Debug, Clone)]
pub struct RealLauncher {
    events: mpsc::Sender<DaemonEvent>,
}

impl RealLauncher {
    pub fn new(events: mpsc::Sender<DaemonEvent>) -> Self {
        Self { events }
    }
}

fn build_command(request: &LaunchRequest, environment: &[(String, String)]) -> Result<Command> {
    let mut command = match &request.executable {
        Executable::Command(args) => {
            let (program, rest) = args
                .split_first()
                .ok_or_else(|| LaunchError::Launch(format!("{}: empty launch line", request.job)))?;
            let mut command = Command::new(program);
            command.args(rest);
            command
        }
        Executable::Signature(signature) => Command::new(signature),
    };

    command
        .envs(environment.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .process_group(0);

    if !request.ports.is_empty() {
        let ports: Vec<String> = request
            .ports
            .iter()
            .map(|port| format!("{}={}", port.name, port.id))
            .collect();
        command.env(PORTS_VARIABLE, ports.join(","));
    }
    if let Some(data) = &request.target_data {
        command.env(
            TARGET_DATA_VARIABLE,
            serde_json::to_string(data).map_err(anyhow::Error::from)?,
        );
    }
    Ok(command)
}

impl Launcher for RealLauncher {
    fn launch(&self, request: &LaunchRequest, environment: &[(String, String)]) -> Result<u32> {
        let mut child = build_command(request, environment)?
            .spawn()
            .map_err(|err| LaunchError::Launch(format!("{}: {err}", request.job)))?;
        let pid = child.id();

        let events = self.events.clone();
        let job = request.job.clone();
        thread::Builder::new()
            .name(format!("reaper {pid}"))
            .spawn(move || {
                let status = match child.wait() {
                    Ok(status) => status
                        .code()
                        .or_else(|| status.signal().map(|signal| 128 + signal))
                        .unwrap_or(-1),
                    Err(err) => {
                        warn!(job = %job, pid, error = %err, "waiting for process failed");
                        -1
                    }
                };
                debug!(job = %job, pid, status, "process exited");
                let _ = events.blocking_send(DaemonEvent::ProcessExited { pid, status });
            })?;

        Ok(pid)
    }

    fn request_quit(&self, pid: u32) -> Result<()> {
        let pid = to_pid(pid)?;
        kill(pid, Signal::SIGTERM).map_err(|err| LaunchError::Launch(err.to_string()))
    }

    fn interrupt(&self, pid: u32) -> Result<()> {
        let pid = to_pid(pid)?;
        killpg(pid, Signal::SIGINT).map_err(|err| LaunchError::Launch(err.to_string()))
    }
}

fn to_pid(pid: u32) -> Result<Pid> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| LaunchError::Launch(format!("invalid pid {pid}")))
}

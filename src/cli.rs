// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::DaemonMode;

pub const DEFAULT_SYSTEM_SOCKET: &str = "/run/launch_daemon/system.sock";
pub const DEFAULT_RUNTIME_DIR: &str = "/run/launch_daemon";

/// Command-line arguments for `launch_daemon`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "launch_daemon",
    version,
    about = "Start and supervise jobs and targets from dependency-aware settings.",
    long_about = None
)]
pub struct CliArgs {
    /// Settings file or directory (TOML). May be given more than once.
    ///
    /// Default: `/etc/launch_daemon` (system) or
    /// `$HOME/.config/launch_daemon` (user).
    #[arg(long, value_name = "PATH")]
    pub config: Vec<PathBuf>,

    /// Run as a per-user session daemon.
    #[arg(long)]
    pub user: bool,

    /// Boot in safe mode.
    #[arg(long)]
    pub safe_mode: bool,

    /// Socket to listen on for requests.
    ///
    /// Default: the system socket in system mode; a session has no socket
    /// unless one is given.
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Socket of the system daemon.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SYSTEM_SOCKET)]
    pub system_socket: PathBuf,

    /// Directory session daemon sockets are created in.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_RUNTIME_DIR)]
    pub runtime_dir: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LAUNCH_DAEMON_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the settings, print them, but launch nothing.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn mode(&self) -> DaemonMode {
        if self.user {
            DaemonMode::User
        } else {
            DaemonMode::System
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_repeatable() {
        let args = CliArgs::parse_from([
            "launch_daemon",
            "--config",
            "/etc/launch_daemon",
            "--config",
            "extra.toml",
            "--user",
        ]);
        assert_eq!(args.config.len(), 2);
        assert_eq!(args.mode(), DaemonMode::User);
        assert_eq!(args.system_socket, PathBuf::from(DEFAULT_SYSTEM_SOCKET));
    }
}

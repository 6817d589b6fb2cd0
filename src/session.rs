// src/session.rs

//! Per-user session daemons.
//!
//! A system daemon forwards requests it cannot answer to the session daemon
//! of the calling user through a [`SessionLink`]. Sessions are started by
//! [`spawn_session`] as the target user.
//! [`SessionBroker`] keeps user lookups and connections out of the core.

use std::fmt::Debug;
use std::future::Future;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{Command, Stdio};
use std::sync::Arc;

use nix::unistd::User;
use tracing::{info, warn};

use crate::errors::{LaunchError, Result};
use crate::ipc::client::IpcClient;
use crate::ipc::protocol::{Reply, Request};

/// Connection to a session daemon.
pub trait SessionLink: Send + Sync + Debug {
    fn forward(&self, request: Request) -> Pin<Box<dyn Future<Output = Reply> + Send + '_>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// User database lookups and session connections, injected into the core.
pub trait SessionBroker: Send + Debug {
    fn lookup_user(&self, login: &str) -> Option<UserRecord>;
    fn connect(&self, socket: &Path) -> Arc<dyn SessionLink>;
}

/// Production broker: the system user database and socket clients.
#[derive(Debug, Clone, Default)]
pub struct SystemSessionBroker;

impl SessionBroker for SystemSessionBroker {
    fn lookup_user(&self, login: &str) -> Option<UserRecord> {
        match User::from_name(login) {
            Ok(Some(user)) => Some(UserRecord {
                uid: user.uid.as_raw(),
                gid: user.gid.as_raw(),
                home: user.dir,
            }),
            Ok(None) => None,
            Err(err) => {
                warn!(login, error = %err, "user lookup failed");
                None
            }
        }
    }

    fn connect(&self, socket: &Path) -> Arc<dyn SessionLink> {
        Arc::new(IpcClient::new(socket))
    }
}

/// Socket path a session daemon for `uid` listens on.
pub fn session_socket_path(runtime_dir: &Path, uid: u32) -> PathBuf {
    runtime_dir.join(format!("session-{uid}.sock"))
}

/// Start `launch_daemon --user` as `uid`. The child registers itself back
/// with `system_socket` once it listens.
pub fn spawn_session(
    login: &str,
    uid: u32,
    gid: u32,
    home: &Path,
    socket: &Path,
    system_socket: &Path,
) -> Result<u32> {
    let exe = std::env::current_exe()?;
    let mut child = Command::new(exe)
        .arg("--user")
        .arg("--socket")
        .arg(socket)
        .arg("--system-socket")
        .arg(system_socket)
        .env("HOME", home)
        .env("USER", login)
        .env("LOGNAME", login)
        .current_dir(home)
        .stdin(Stdio::null())
        .uid(uid)
        .gid(gid)
        .process_group(0)
        .spawn()
        .map_err(|err| LaunchError::Launch(format!("session for {login}: {err}")))?;

    let pid = child.id();
    info!(login, uid, pid, "session daemon started");

    let login = login.to_string();
    std::thread::Builder::new()
        .name(format!("session {uid}"))
        .spawn(move || match child.wait() {
            Ok(status) => warn!(login = %login, %status, "session daemon exited"),
            Err(err) => warn!(login = %login, error = %err, "waiting for session daemon failed"),
        })?;
    Ok(pid)
}

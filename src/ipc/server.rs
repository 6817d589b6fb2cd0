// src/ipc/server.rs

//! Unix socket front end of the request surface.
//!
//! Each connection carries newline-delimited JSON requests; every request
//! gets exactly one reply line. The caller identity comes from the peer
//! credentials of the socket, never from the message.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use super::protocol::{Reply, Request, WireReply};
use crate::engine::DaemonHandle;
use crate::errors::{Result, StatusCode};
use crate::types::Caller;

#[derive(Debug)]
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcServer {
    /// Bind `path`, replacing a stale socket file. The socket is
    /// world-connectable; permissions are enforced per request.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666))?;
        info!(socket = %path.display(), "listening for requests");
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until the task is dropped.
    pub async fn serve(self, handle: DaemonHandle) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, handle).await {
                            debug!(error = %err, "connection ended with error");
                        }
                    });
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                }
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn handle_connection(stream: UnixStream, handle: DaemonHandle) -> Result<()> {
    let caller = Caller {
        uid: stream.peer_cred()?.uid(),
    };
    debug!(uid = caller.uid, "client connected");

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply: Reply = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle.request(caller, request).await,
            Err(err) => {
                debug!(error = %err, "malformed request");
                Err(StatusCode::BadValue)
            }
        };

        let mut out = serde_json::to_string(&WireReply::from(reply)).map_err(anyhow::Error::from)?;
        out.push('\n');
        write_half.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

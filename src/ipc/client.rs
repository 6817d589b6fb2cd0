// src/ipc/client.rs

//! Socket client used to talk to another daemon (a session daemon from the
//! system daemon, or the system daemon from a session).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::protocol::{Reply, Request, WireReply};
use crate::errors::StatusCode;
use crate::session::SessionLink;

/// One connection per request; daemons keep no client state.
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket: PathBuf,
}

impl IpcClient {
    pub fn new(socket: impl AsRef<Path>) -> Self {
        Self {
            socket: socket.as_ref().to_path_buf(),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub async fn request(&self, request: &Request) -> Reply {
        match self.exchange(request).await {
            Ok(reply) => reply,
            Err(err) => {
                debug!(socket = %self.socket.display(), error = %err, "request failed");
                Err(StatusCode::Error(err.to_string()))
            }
        }
    }

    async fn exchange(&self, request: &Request) -> anyhow::Result<Reply> {
        let stream = UnixStream::connect(&self.socket).await?;
        let (read_half, mut write_half) = stream.into_split();

        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        write_half.write_all(line.as_bytes()).await?;
        write_half.shutdown().await?;

        let mut reply = String::new();
        BufReader::new(read_half).read_line(&mut reply).await?;
        if reply.trim().is_empty() {
            anyhow::bail!("connection closed without reply");
        }
        let wire: WireReply = serde_json::from_str(reply.trim_end())?;
        Ok(wire.into())
    }
}

impl SessionLink for IpcClient {
    fn forward(&self, request: Request) -> Pin<Box<dyn Future<Output = Reply> + Send + '_>> {
        Box::pin(async move { self.request(&request).await })
    }
}

// src/engine/handle.rs

use tokio::sync::{mpsc, oneshot};

use super::DaemonEvent;
use crate::errors::StatusCode;
use crate::ipc::protocol::{Reply, Request};
use crate::types::Caller;

/// Cloneable client side of a running daemon.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    tx: mpsc::Sender<DaemonEvent>,
}

impl DaemonHandle {
    pub fn new(tx: mpsc::Sender<DaemonEvent>) -> Self {
        Self { tx }
    }

    /// Send `request` on behalf of `caller` and wait for the answer.
    ///
    /// A daemon that is gone answers `NoInit`; one that dropped the reply
    /// (e.g. while shutting down) answers with an error status.
    pub async fn request(&self, caller: Caller, request: Request) -> Reply {
        let (reply_tx, reply_rx) = oneshot::channel();
        let event = DaemonEvent::Request {
            caller,
            request,
            reply: Some(reply_tx),
        };
        if self.tx.send(event).await.is_err() {
            return Err(StatusCode::NoInit);
        }
        reply_rx
            .await
            .unwrap_or_else(|_| Err(StatusCode::Error("request dropped".into())))
    }

    /// Fire-and-forget variant of [`DaemonHandle::request`].
    pub async fn notify(&self, caller: Caller, request: Request) -> bool {
        self.tx
            .send(DaemonEvent::Request {
                caller,
                request,
                reply: None,
            })
            .await
            .is_ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(DaemonEvent::ShutdownRequested).await;
    }

    pub fn sender(&self) -> mpsc::Sender<DaemonEvent> {
        self.tx.clone()
    }
}

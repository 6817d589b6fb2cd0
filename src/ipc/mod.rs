// src/ipc/mod.rs

//! Request transport: JSON lines over a Unix socket.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use protocol::{JobInfo, Payload, Reply, Request, TargetInfo, WireReply};
pub use server::IpcServer;

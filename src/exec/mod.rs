// src/exec/mod.rs

//! Launch execution layer.
//!
//! - [`backend`] defines launch requests, queue items and the `Launcher`
//!   trait that tests replace with a fake.
//! - [`queue`] is the blocking FIFO between the control thread and workers.
//! - [`worker`] runs the elastic pool of worker threads.
//! - [`environment`] resolves source files into environment variables.
//! - [`process`] is the production launcher (`std::process` + `nix`).

pub mod backend;
pub mod environment;
pub mod process;
pub mod queue;
pub mod worker;

pub use backend::{Executable, LaunchRequest, Launcher, PortAssignment, QueueItem};
pub use process::RealLauncher;
pub use queue::{JobQueue, Popped};
pub use worker::{PoolOptions, WorkerPool};

// src/dag/mod.rs

//! Jobs, targets and the requirement graph between them.
//!
//! - [`base`] holds the state shared by jobs and targets.
//! - [`job`] defines launchable jobs and the memoized `init_job` walk that
//!   detects requirement cycles.
//! - [`target`] defines targets (checkpoints grouping jobs).
//! - [`graph`] builds a `petgraph` view of the requirements for diagnostics.

pub mod base;
pub mod graph;
pub mod job;
pub mod target;

pub use base::BaseJob;
pub use graph::RequirementGraph;
pub use job::{DEFAULT_PORT_CAPACITY, InitStatus, Job, JobFinder, PortSpec, init_job};
pub use target::Target;

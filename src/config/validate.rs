// src/config/validate.rs

//! Early, non-fatal checks on merged settings.
//!
//! Nothing here rejects settings: the daemon drops broken jobs on its own
//! while initializing. These warnings surface problems at load time and
//! back `--dry-run`.

use crate::config::model::Settings;
use crate::dag::RequirementGraph;
use crate::errors::{LaunchError, Result};

/// Human-readable problems found in `settings`.
pub fn validate_settings(settings: &Settings) -> Vec<String> {
    let mut warnings = Vec::new();

    let graph = RequirementGraph::build(&settings.jobs, &settings.targets);
    for (job, requirement) in graph.unknown_requirements() {
        warnings.push(format!(
            "job '{job}' requires unknown job or target '{requirement}'"
        ));
    }
    for cycle in graph.cycles() {
        warnings.push(format!(
            "requirement cycle between {}; these jobs will be ignored",
            cycle.join(", ")
        ));
    }

    for job in settings.jobs.values() {
        if let Some(target) = &job.target {
            if !settings.targets.contains_key(target) {
                warnings.push(format!("job '{}' belongs to unknown target '{target}'", job.name()));
            }
        }
    }

    for run in &settings.run {
        for name in run.then.iter().chain(run.otherwise.iter()) {
            if !settings.targets.contains_key(name) {
                warnings.push(format!("run directive names unknown target '{name}'"));
            }
        }
    }

    warnings
}

/// Requirement-respecting order of all jobs and targets.
pub fn launch_order(settings: &Settings) -> Result<Vec<String>> {
    RequirementGraph::build(&settings.jobs, &settings.targets)
        .launch_order()
        .map_err(|node| LaunchError::DependencyCycle(format!("'{node}' is on a cycle")))
}

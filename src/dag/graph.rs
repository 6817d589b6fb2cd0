// src/dag/graph.rs

//! Static view of the requirement graph, used for diagnostics only.
//!
//! The authoritative cycle handling happens in [`init_job`](super::init_job),
//! which drops offending jobs one by one. This graph lets the loader warn
//! early and gives `--dry-run` a launch order to print.

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;

use indexmap::IndexMap;

use super::{Job, Target};
use crate::types::NameKey;

/// Edge direction: requirement -> dependent.
#[derive(Debug)]
pub struct RequirementGraph<'a> {
    graph: DiGraphMap<&'a str, ()>,
    names: IndexMap<NameKey, &'a str>,
    unknown: Vec<(NameKey, NameKey)>,
}

impl<'a> RequirementGraph<'a> {
    pub fn build(jobs: &'a IndexMap<NameKey, Job>, targets: &'a IndexMap<NameKey, Target>) -> Self {
        let mut graph = DiGraphMap::new();
        let mut names = IndexMap::new();

        for key in targets.keys().chain(jobs.keys()) {
            graph.add_node(key.as_str());
            names.insert(key.clone(), key.as_str());
        }

        let mut unknown = Vec::new();
        for (key, job) in jobs {
            // A job waits for the first launch pass of its target.
            if let Some(target) = &job.target {
                if let Some(target) = names.get(target) {
                    graph.add_edge(*target, key.as_str(), ());
                }
            }
            for requirement in &job.requirements {
                match names.get(requirement) {
                    Some(requirement) => {
                        graph.add_edge(*requirement, key.as_str(), ());
                    }
                    None => unknown.push((key.clone(), requirement.clone())),
                }
            }
        }

        Self {
            graph,
            names,
            unknown,
        }
    }

    /// `(dependent, requirement)` pairs whose requirement names nothing.
    pub fn unknown_requirements(&self) -> &[(NameKey, NameKey)] {
        &self.unknown
    }

    /// Every strongly connected component with more than one member, plus
    /// self-loops.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|node| self.graph.contains_edge(*node, *node))
            })
            .map(|component| component.into_iter().map(str::to_string).collect())
            .collect()
    }

    /// A launch order honouring every requirement, or the name of a node on
    /// a cycle.
    pub fn launch_order(&self) -> Result<Vec<String>, String> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(str::to_string).collect())
            .map_err(|cycle| cycle.node_id().to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// src/event/bus.rs

//! Routing of outside signals into event trees.
//!
//! The bus never owns a tree. It remembers which leaves of which owner
//! (job or target) listen to a source and hands those references back to the
//! daemon, which then triggers or resets the nodes in its own arena.

use std::collections::HashMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use tracing::debug;

use super::{EventFlags, EventId, EventKind, EventTree};
use crate::types::NameKey;

/// A single leaf in the tree owned by `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRef {
    pub owner: NameKey,
    pub node: EventId,
}

/// OS notification source a leaf can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchKind {
    Volume,
    Network,
    FileCreated(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ExternalEventSource {
    pub name: String,
    /// Whoever registered the source (a job name or a client id).
    pub owner: String,
    pub flags: EventFlags,
    /// Only remembered for sticky sources.
    pub triggered: bool,
    pub destinations: Vec<EventRef>,
}

/// What registering a tree changed.
#[derive(Debug, Default)]
pub struct Registration {
    /// Nodes to trigger right away (already-fired sticky sources).
    pub triggers: Vec<EventId>,
    /// Hubs that just got their first listener.
    pub start: Vec<WatchKind>,
}

#[derive(Debug, Default)]
pub struct EventBus {
    sources: IndexMap<String, ExternalEventSource>,
    unresolved: HashMap<String, Vec<EventRef>>,
    hubs: HashMap<WatchKind, Vec<EventRef>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every leaf of `tree` to its source.
    pub fn register(&mut self, owner: &NameKey, tree: &mut EventTree) -> Registration {
        let mut registration = Registration::default();
        let leaves: Vec<EventId> = tree.leaves().collect();

        for id in leaves {
            let event = EventRef {
                owner: owner.clone(),
                node: id,
            };
            match tree.kind(id).clone() {
                EventKind::External {
                    name,
                    resolved: None,
                    ..
                } => match self.sources.get_mut(&name) {
                    Some(source) if tree.resolve(id, source.flags) => {
                        if source.triggered {
                            registration.triggers.push(id);
                        }
                        source.destinations.push(event);
                    }
                    _ => self.unresolved.entry(name).or_default().push(event),
                },
                EventKind::FileCreated(path) => {
                    self.listen(WatchKind::FileCreated(path), event, &mut registration.start)
                }
                EventKind::VolumeMounted => {
                    self.listen(WatchKind::Volume, event, &mut registration.start)
                }
                EventKind::NetworkAvailable => {
                    self.listen(WatchKind::Network, event, &mut registration.start)
                }
                _ => {}
            }
        }

        debug!(owner = %owner, "registered event tree");
        registration
    }

    /// Drop every reference `owner` holds. Returns hubs left without
    /// listeners.
    pub fn unregister(&mut self, owner: &NameKey, tree: &mut EventTree) -> Vec<WatchKind> {
        for source in self.sources.values_mut() {
            source.destinations.retain(|r| r.owner != *owner);
        }
        for refs in self.unresolved.values_mut() {
            refs.retain(|r| r.owner != *owner);
        }
        self.unresolved.retain(|_, refs| !refs.is_empty());

        let mut stop = Vec::new();
        self.hubs.retain(|kind, refs| {
            let before = refs.len();
            refs.retain(|r| r.owner != *owner);
            if refs.is_empty() && before > 0 {
                stop.push(kind.clone());
                false
            } else {
                true
            }
        });

        let resolved: Vec<EventId> = tree
            .leaves()
            .filter(|id| {
                matches!(
                    tree.kind(*id),
                    EventKind::External {
                        resolved: Some(_),
                        ..
                    }
                )
            })
            .collect();
        for id in resolved {
            tree.unresolve(id);
        }

        debug!(owner = %owner, "unregistered event tree");
        stop
    }

    fn listen(&mut self, kind: WatchKind, event: EventRef, start: &mut Vec<WatchKind>) {
        let refs = self.hubs.entry(kind.clone()).or_default();
        if refs.is_empty() {
            start.push(kind);
        }
        refs.push(event);
    }

    pub fn listeners(&self, kind: &WatchKind) -> Vec<EventRef> {
        self.hubs.get(kind).cloned().unwrap_or_default()
    }

    pub fn watched_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.hubs.keys().filter_map(|kind| match kind {
            WatchKind::FileCreated(path) => Some(path),
            _ => None,
        })
    }

    /// Record a new source. Returns the unresolved references waiting for
    /// it, or `None` if a source with that name already exists.
    pub fn add_source(
        &mut self,
        name: &str,
        owner: &str,
        flags: EventFlags,
    ) -> Option<Vec<EventRef>> {
        if self.sources.contains_key(name) {
            return None;
        }
        self.sources.insert(
            name.to_string(),
            ExternalEventSource {
                name: name.to_string(),
                owner: owner.to_string(),
                flags,
                triggered: false,
                destinations: Vec::new(),
            },
        );
        Some(self.unresolved.remove(name).unwrap_or_default())
    }

    /// Attach an already resolved node to `name`.
    pub fn bind(&mut self, name: &str, event: EventRef) {
        if let Some(source) = self.sources.get_mut(name) {
            source.destinations.push(event);
        }
    }

    /// Put a reference back in the unresolved index.
    pub fn park(&mut self, name: &str, event: EventRef) {
        self.unresolved
            .entry(name.to_string())
            .or_default()
            .push(event);
    }

    /// Remove a source; its destinations must be reset and parked by the
    /// caller.
    pub fn remove_source(&mut self, name: &str) -> Option<ExternalEventSource> {
        self.sources.shift_remove(name)
    }

    /// Mark the source fired and return its destinations.
    pub fn fire_source(&mut self, name: &str) -> Option<Vec<EventRef>> {
        let source = self.sources.get_mut(name)?;
        if source.flags.sticky {
            source.triggered = true;
        }
        Some(source.destinations.clone())
    }

    /// Clear a sticky source and return its destinations.
    pub fn reset_source(&mut self, name: &str) -> Option<Vec<EventRef>> {
        let source = self.sources.get_mut(name)?;
        source.triggered = false;
        Some(source.destinations.clone())
    }

    pub fn source(&self, name: &str) -> Option<&ExternalEventSource> {
        self.sources.get(name)
    }

    pub fn sources(&self) -> impl Iterator<Item = &ExternalEventSource> {
        self.sources.values()
    }
}

// src/event/mod.rs

//! Launch events.
//!
//! An [`EventTree`] is owned by a single job or target. Nodes live in an arena
//! and point to their parent through a plain [`EventId`], so the tree never
//! holds an owning back-reference.
//!
//! - [`events`] has the tree-wide helpers (`add_on_demand`, `trigger_demand`,
//!   `resolve_external`).
//! - [`parse`] compiles an `on = { ... }` settings table.
//! - [`bus`] binds leaves to external event sources and OS watchers.

pub mod bus;
pub mod events;
pub mod parse;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use bus::{EventBus, EventRef, ExternalEventSource, WatchKind};
pub use parse::event_from_value;

/// Index of a node inside its [`EventTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(usize);

/// Flags an external event source is registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventFlags {
    /// The triggered state survives ordinary resets.
    #[serde(default)]
    pub sticky: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Triggered as soon as any child is.
    Or,
    /// Triggered once every child is (never when empty).
    And,
    /// Fired programmatically for on-demand launches.
    Demand,
    /// Named hook bound to a registered external event source.
    External {
        name: String,
        args: Vec<String>,
        resolved: Option<EventFlags>,
    },
    FileCreated(PathBuf),
    VolumeMounted,
    /// Sticky: represents "the network is up" rather than an edge.
    NetworkAvailable,
}

#[derive(Debug, Clone)]
struct EventNode {
    parent: Option<EventId>,
    children: Vec<EventId>,
    kind: EventKind,
    triggered: bool,
}

#[derive(Debug, Clone)]
pub struct EventTree {
    nodes: Vec<EventNode>,
    root: EventId,
}

impl EventTree {
    pub fn new(root: EventKind) -> Self {
        Self {
            nodes: vec![EventNode {
                parent: None,
                children: Vec::new(),
                kind: root,
                triggered: false,
            }],
            root: EventId(0),
        }
    }

    pub fn root(&self) -> EventId {
        self.root
    }

    /// Append a node under `parent`.
    pub fn add_child(&mut self, parent: EventId, kind: EventKind) -> EventId {
        let id = EventId(self.nodes.len());
        self.nodes.push(EventNode {
            parent: Some(parent),
            children: Vec::new(),
            kind,
            triggered: false,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Insert a new root of `kind` above the current root.
    pub(crate) fn wrap_root(&mut self, kind: EventKind) -> EventId {
        let old_root = self.root;
        let id = EventId(self.nodes.len());
        let triggered = self.nodes[old_root.0].triggered;
        self.nodes.push(EventNode {
            parent: None,
            children: vec![old_root],
            kind,
            triggered: false,
        });
        self.nodes[old_root.0].parent = Some(id);
        self.root = id;
        if triggered {
            self.recompute(id);
        }
        id
    }

    pub fn kind(&self, id: EventId) -> &EventKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: EventId) -> Option<EventId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: EventId) -> &[EventId] {
        &self.nodes[id.0].children
    }

    pub fn is_container(&self, id: EventId) -> bool {
        matches!(self.kind(id), EventKind::Or | EventKind::And)
    }

    pub fn is_sticky(&self, id: EventId) -> bool {
        match self.kind(id) {
            EventKind::NetworkAvailable => true,
            EventKind::External {
                resolved: Some(flags),
                ..
            } => flags.sticky,
            _ => false,
        }
    }

    /// Whether the tree as a whole has fired.
    pub fn triggered(&self) -> bool {
        self.nodes[self.root.0].triggered
    }

    pub fn is_triggered(&self, id: EventId) -> bool {
        self.nodes[id.0].triggered
    }

    /// All node ids in creation order. A wrapped root comes after its
    /// children.
    pub fn ids(&self) -> impl Iterator<Item = EventId> + '_ {
        (0..self.nodes.len()).map(EventId)
    }

    /// Leaf nodes, i.e. everything that can be bound to a source.
    pub fn leaves(&self) -> impl Iterator<Item = EventId> + '_ {
        self.ids().filter(|id| !self.is_container(*id))
    }

    /// Fire `id` and propagate up the parent chain.
    ///
    /// Returns `true` only when this call moved the root from untriggered to
    /// triggered, so the owner is notified once per distinct trigger.
    pub fn trigger(&mut self, id: EventId) -> bool {
        let was_triggered = self.triggered();
        self.nodes[id.0].triggered = true;
        self.recompute_ancestors(id);
        !was_triggered && self.triggered()
    }

    /// Clear every non-sticky leaf, then recompute containers bottom-up.
    pub fn reset_trigger(&mut self) {
        for index in 0..self.nodes.len() {
            let id = EventId(index);
            if !self.is_container(id) && !self.is_sticky(id) {
                self.nodes[index].triggered = false;
            }
        }
        self.recompute_subtree(self.root);
    }

    /// Clear a sticky node; a no-op for anything else.
    pub fn reset_sticky(&mut self, id: EventId) {
        if !self.is_sticky(id) {
            return;
        }
        self.nodes[id.0].triggered = false;
        self.recompute_ancestors(id);
    }

    /// Bind an external node to a source. One-time latch: a node that is
    /// already resolved rejects the second attempt.
    pub fn resolve(&mut self, id: EventId, flags: EventFlags) -> bool {
        match &mut self.nodes[id.0].kind {
            EventKind::External { resolved, .. } if resolved.is_none() => {
                *resolved = Some(flags);
                true
            }
            _ => false,
        }
    }

    /// Undo [`EventTree::resolve`] after the source went away.
    pub fn unresolve(&mut self, id: EventId) {
        if let EventKind::External { resolved, .. } = &mut self.nodes[id.0].kind {
            *resolved = None;
        }
        self.nodes[id.0].triggered = false;
        self.recompute_ancestors(id);
    }

    /// Forget every binding and trigger, leaving a tree ready to be
    /// registered by a new owner.
    pub fn unbind(&mut self) {
        for node in &mut self.nodes {
            if let EventKind::External { resolved, .. } = &mut node.kind {
                *resolved = None;
            }
            node.triggered = false;
        }
    }

    fn recompute_ancestors(&mut self, id: EventId) {
        let mut current = self.nodes[id.0].parent;
        while let Some(parent) = current {
            self.recompute(parent);
            current = self.nodes[parent.0].parent;
        }
    }

    /// Post-order walk; index order says nothing about depth once the root
    /// has been wrapped.
    fn recompute_subtree(&mut self, id: EventId) {
        if !self.is_container(id) {
            return;
        }
        for index in 0..self.nodes[id.0].children.len() {
            let child = self.nodes[id.0].children[index];
            self.recompute_subtree(child);
        }
        self.recompute(id);
    }

    fn recompute(&mut self, id: EventId) {
        let node = &self.nodes[id.0];
        let triggered = match node.kind {
            EventKind::Or => node.children.iter().any(|c| self.nodes[c.0].triggered),
            EventKind::And => {
                !node.children.is_empty()
                    && node.children.iter().all(|c| self.nodes[c.0].triggered)
            }
            _ => node.triggered,
        };
        self.nodes[id.0].triggered = triggered;
    }

    /// Human-readable description of a single node and its subtree.
    pub fn describe(&self, id: EventId) -> String {
        let node = &self.nodes[id.0];
        let head = match &node.kind {
            EventKind::Or => "or".to_string(),
            EventKind::And => "and".to_string(),
            EventKind::Demand => "demand".to_string(),
            EventKind::External { name, args, .. } if args.is_empty() => name.clone(),
            EventKind::External { name, args, .. } => format!("{name}({})", args.join(", ")),
            EventKind::FileCreated(path) => format!("file_created {}", path.display()),
            EventKind::VolumeMounted => "volume_mounted".to_string(),
            EventKind::NetworkAvailable => "network_available".to_string(),
        };
        let head = if node.triggered {
            format!("{head} (triggered)")
        } else {
            head
        };

        if node.children.is_empty() && !self.is_container(id) {
            return head;
        }
        let children: Vec<String> = node.children.iter().map(|c| self.describe(*c)).collect();
        format!("{head} [{}]", children.join(", "))
    }
}

impl fmt::Display for EventTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(self.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_needs_every_child() {
        let mut tree = EventTree::new(EventKind::And);
        assert!(!tree.triggered());

        let root = tree.root();
        let mounted = tree.add_child(root, EventKind::VolumeMounted);
        let network = tree.add_child(root, EventKind::NetworkAvailable);

        assert!(!tree.trigger(mounted));
        assert!(tree.trigger(network));
        // Already triggered, so no second notification.
        assert!(!tree.trigger(mounted));

        tree.reset_trigger();
        assert!(!tree.triggered());
        assert!(tree.is_triggered(network));
    }

    #[test]
    fn reset_clears_wrapped_root() {
        let tree = EventTree::new(EventKind::VolumeMounted);
        let mounted = tree.root();
        let mut tree = events::add_on_demand(Some(tree));
        assert_ne!(tree.root(), mounted);

        assert!(tree.trigger(mounted));
        tree.reset_trigger();
        assert!(!tree.is_triggered(mounted));
        assert!(!tree.triggered());

        // Sticky leaves keep a wrapped root triggered.
        let mut tree = events::add_on_demand(Some(EventTree::new(EventKind::NetworkAvailable)));
        let network = tree.children(tree.root())[0];
        tree.trigger(network);
        tree.reset_trigger();
        assert!(tree.triggered());
    }

    #[test]
    fn wrapping_keeps_triggered_state() {
        let mut tree = EventTree::new(EventKind::Or);
        let root = tree.root();
        let mounted = tree.add_child(root, EventKind::VolumeMounted);
        tree.trigger(mounted);

        let new_root = tree.wrap_root(EventKind::Or);
        assert_eq!(tree.parent(root), Some(new_root));
        assert!(tree.triggered());
    }

    #[test]
    fn unresolve_clears_sticky_external() {
        let mut tree = EventTree::new(EventKind::Or);
        let root = tree.root();
        let hook = tree.add_child(
            root,
            EventKind::External {
                name: "usb".into(),
                args: vec!["port1".into()],
                resolved: None,
            },
        );
        assert!(!tree.is_sticky(hook));
        assert!(tree.resolve(hook, EventFlags { sticky: true }));
        assert!(tree.is_sticky(hook));

        tree.trigger(hook);
        assert_eq!(tree.to_string(), "or (triggered) [usb(port1) (triggered)]");

        tree.unresolve(hook);
        assert!(!tree.triggered());
        assert!(!tree.is_sticky(hook));
    }
}

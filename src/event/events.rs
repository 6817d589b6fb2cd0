// src/event/events.rs

//! Tree-wide operations that do not belong to a single node.

use std::collections::VecDeque;

use super::{EventFlags, EventId, EventKind, EventTree};

/// Make `tree` also fire on explicit demand.
///
/// An existing `Or` root gets a `Demand` child; any other root is wrapped in
/// a new `Or` first. A missing tree becomes a lone `Demand` under an `Or`.
pub fn add_on_demand(tree: Option<EventTree>) -> EventTree {
    let mut tree = tree.unwrap_or_else(|| EventTree::new(EventKind::Or));
    if has_demand(&tree) {
        return tree;
    }

    let root = match tree.kind(tree.root()) {
        EventKind::Or => tree.root(),
        _ => tree.wrap_root(EventKind::Or),
    };
    tree.add_child(root, EventKind::Demand);
    tree
}

/// Fire the first `Demand` node reachable through containers, searched
/// breadth-first from the root.
///
/// Returns `false` if there is no such node or it already fired. With
/// `test_only` the tree is left untouched and only the answer is computed.
pub fn trigger_demand(tree: &mut EventTree, test_only: bool) -> bool {
    let Some(demand) = find_demand(tree) else {
        return false;
    };
    if tree.is_triggered(demand) {
        return false;
    }
    if !test_only {
        tree.trigger(demand);
    }
    true
}

/// Bind the first unresolved external node called `name`.
pub fn resolve_external(tree: &mut EventTree, name: &str, flags: EventFlags) -> Option<EventId> {
    let id = tree.ids().find(|id| {
        matches!(
            tree.kind(*id),
            EventKind::External { name: n, resolved: None, .. } if n == name
        )
    })?;
    tree.resolve(id, flags).then_some(id)
}

fn has_demand(tree: &EventTree) -> bool {
    find_demand(tree).is_some()
}

fn find_demand(tree: &EventTree) -> Option<EventId> {
    let mut queue = VecDeque::from([tree.root()]);
    while let Some(id) = queue.pop_front() {
        if matches!(tree.kind(id), EventKind::Demand) {
            return Some(id);
        }
        if tree.is_container(id) {
            queue.extend(tree.children(id).iter().copied());
        }
    }
    None
}

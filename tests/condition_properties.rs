// tests/condition_properties.rs

use proptest::prelude::*;

use launch_daemon::condition::Condition;
use launch_daemon::event::events::{add_on_demand, trigger_demand};
use launch_daemon::event::{EventKind, EventTree};
use launch_daemon_test_utils::fakes::FakeContext;

// Leaves only look at the fake context, so every tree has a known answer.
fn leaf_strategy() -> impl Strategy<Value = Condition> {
    prop_oneof![
        Just(Condition::Safemode),
        Just(Condition::ReadOnly(None)),
        Just(Condition::ReadOnly(Some("/boot".into()))),
        Just(Condition::FileExists(vec!["/boot/home".into()])),
        Just(Condition::FileExists(Vec::new())),
    ]
}

fn condition_strategy() -> impl Strategy<Value = Condition> {
    leaf_strategy().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Condition::And),
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Condition::Or),
            proptest::collection::vec(inner, 0..4).prop_map(Condition::Not),
        ]
    })
}

fn context_strategy() -> impl Strategy<Value = FakeContext> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(safe, boot_ro, ro, home)| {
            let mut context = FakeContext::new();
            context.safe_mode = safe;
            context.boot_read_only = boot_ro;
            if ro {
                context = context.with_read_only("/boot");
            }
            if home {
                context = context.with_file("/boot/home");
            }
            context
        },
    )
}

/// Straightforward evaluation used as the reference.
fn reference(condition: &Condition, context: &FakeContext) -> bool {
    match condition {
        Condition::And(children) => children.iter().all(|c| reference(c, context)),
        Condition::Or(children) => {
            children.is_empty() || children.iter().any(|c| reference(c, context))
        }
        Condition::Not(children) => children.iter().all(|c| !reference(c, context)),
        Condition::Safemode => context.safe_mode,
        Condition::ReadOnly(None) => context.boot_read_only,
        Condition::ReadOnly(Some(path)) => context.read_only.iter().any(|p| path.starts_with(p)),
        Condition::FileExists(paths) => paths.iter().all(|p| context.files.contains(p)),
    }
}

proptest! {
    #[test]
    fn test_is_pure(condition in condition_strategy(), context in context_strategy()) {
        let first = condition.test(&context);
        let second = condition.test(&context);
        prop_assert_eq!(first, second);
        prop_assert_eq!(first, reference(&condition, &context));
    }

    #[test]
    fn not_is_true_iff_no_child_is(
        children in proptest::collection::vec(condition_strategy(), 0..5),
        context in context_strategy(),
    ) {
        let any_true = children.iter().any(|c| c.test(&context));
        prop_assert_eq!(Condition::Not(children).test(&context), !any_true);
    }

    #[test]
    fn constant_conditions_ignore_files(condition in condition_strategy(), context in context_strategy()) {
        if condition.is_constant(&context) {
            let mut other = context.clone();
            other.files.clear();
            prop_assert_eq!(condition.test(&context), condition.test(&other));
        }
    }
}

#[test]
fn empty_containers_are_vacuously_true() {
    let context = FakeContext::new();
    assert!(Condition::And(Vec::new()).test(&context));
    assert!(Condition::Or(Vec::new()).test(&context));
    assert!(Condition::Not(Vec::new()).test(&context));
}

#[test]
fn not_with_one_and_many_children() {
    let context = FakeContext::new().safe_mode();
    assert!(!Condition::Not(vec![Condition::Safemode]).test(&context));
    assert!(Condition::Not(vec![Condition::ReadOnly(None)]).test(&context));
    assert!(
        !Condition::Not(vec![Condition::ReadOnly(None), Condition::Safemode]).test(&context)
    );
}

#[test]
fn demand_fires_once_until_reset() {
    let mut plain = EventTree::new(EventKind::Or);
    let root = plain.root();
    plain.add_child(root, EventKind::VolumeMounted);
    assert!(!trigger_demand(&mut plain, false));
    assert!(!plain.triggered());

    let mut tree = add_on_demand(Some(plain));
    assert!(trigger_demand(&mut tree, true));
    assert!(!tree.triggered(), "test-only must not fire");

    assert!(trigger_demand(&mut tree, false));
    assert!(tree.triggered());
    assert!(!trigger_demand(&mut tree, false));

    tree.reset_trigger();
    assert!(trigger_demand(&mut tree, false));
}

#[test]
fn sticky_network_event_survives_plain_reset() {
    let mut tree = EventTree::new(EventKind::Or);
    let root = tree.root();
    let network = tree.add_child(root, EventKind::NetworkAvailable);

    assert!(tree.trigger(network));
    tree.reset_trigger();
    assert!(tree.is_triggered(network));
    assert!(tree.triggered());

    tree.reset_sticky(network);
    assert!(!tree.is_triggered(network));
    assert!(!tree.triggered());
}

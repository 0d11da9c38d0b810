use std::sync::Arc;

use ecs_executor::engine::error::ConfigError;
use ecs_executor::engine::instance::SystemInstance;
use ecs_executor::engine::logging::{LogCategory, NullLogger};
use ecs_executor::engine::settings::SystemSignature;
use ecs_executor::engine::storage::{ComponentStorage, World};
use ecs_executor::engine::subscription::{SubscribedSet, SubscriptionChange};
use ecs_executor::engine::types::{build_bitset, matches, Bitset, BITSET_CAP};

mod common;
use common::*;

#[test]
fn bitset_subset_law() {
    let width = 8;
    let sets: Vec<Vec<u16>> = vec![vec![], vec![0], vec![1], vec![0, 1], vec![0, 3, 7], vec![3, 7]];

    for system in &sets {
        for entity in &sets {
            let s = build_bitset(width, system).unwrap();
            let e = build_bitset(width, entity).unwrap();
            let expected = system.iter().all(|bit| entity.contains(bit));
            assert_eq!(matches(&s, &e), expected, "system {s} entity {e}");
        }
    }
}

#[test]
fn empty_system_matches_every_entity() {
    let empty = Bitset::empty(4).unwrap();
    let full = build_bitset(4, &[0, 1, 2, 3]).unwrap();
    assert!(matches(&empty, &empty));
    assert!(matches(&empty, &full));
    assert!(!matches(&full, &empty));
}

#[test]
fn bitset_rejects_out_of_range_ids_and_oversized_widths() {
    assert_eq!(
        build_bitset(3, &[3]),
        Err(ConfigError::ComponentOutOfRange { component_id: 3, width: 3 })
    );
    assert!(matches!(Bitset::empty(BITSET_CAP + 1), Err(ConfigError::BitsetTooWide { .. })));

    let bitset = build_bitset(70, &[1, 64, 69]).unwrap();
    assert_eq!(bitset.iter().collect::<Vec<_>>(), vec![1, 64, 69]);
    assert_eq!(bitset.count(), 3);
}

#[test]
fn sparse_set_insert_remove() {
    let mut set = SubscribedSet::new();
    assert!(set.insert(5));
    assert!(set.insert(2));
    assert!(set.insert(9));
    assert!(!set.insert(2));
    assert_eq!(set.len(), 3);

    assert!(set.remove(5));
    assert!(!set.remove(5));
    assert!(!set.contains(5));
    assert!(set.contains(2));
    assert!(set.contains(9));
    assert_eq!(set.as_slice(), &[9, 2]);

    assert!(!set.contains(1_000));
    assert!(!set.remove(1_000));
}

#[test]
fn scenario_subscribes_only_superset_entities() {
    let settings = settings(1);
    let mut world = World::new(&settings).unwrap();

    let e1 = world.spawn();
    world.insert(e1, A(1)).unwrap();
    let e2 = world.spawn();
    world.insert(e2, A(2)).unwrap();
    world.insert(e2, B(2)).unwrap();
    let e3 = world.spawn();
    world.insert(e3, B(3)).unwrap();

    let signature = SystemSignature::new(0, "needs_a").require::<A>();
    let mut instance: SystemInstance<World> =
        SystemInstance::new(&settings, &signature, Arc::new(NullLogger)).unwrap();

    for entity in [e1, e2, e3] {
        let bitset = world.bitset_of(entity).unwrap();
        instance.refresh_subscription(entity, &bitset).unwrap();
    }

    let mut subscribed = instance.subscribed().to_vec();
    subscribed.sort_unstable();
    assert_eq!(subscribed, vec![e1, e2]);
    assert!(!instance.is_subscribed(e3));
}

#[test]
fn refresh_is_idempotent_and_tracks_component_changes() {
    let settings = settings(1);
    let mut world = World::new(&settings).unwrap();
    let entity = world.spawn();
    world.insert(entity, A(0)).unwrap();

    let signature = SystemSignature::new(0, "needs_a").read::<A>();
    let mut instance: SystemInstance<World> =
        SystemInstance::new(&settings, &signature, Arc::new(NullLogger)).unwrap();

    let bitset = world.bitset_of(entity).unwrap();
    assert_eq!(instance.refresh_subscription(entity, &bitset).unwrap(), SubscriptionChange::Subscribed);
    assert_eq!(instance.refresh_subscription(entity, &bitset).unwrap(), SubscriptionChange::Unchanged);
    assert_eq!(instance.subscribed_count(), 1);

    world.remove::<A>(entity).unwrap();
    let bitset = world.bitset_of(entity).unwrap();
    assert_eq!(instance.refresh_subscription(entity, &bitset).unwrap(), SubscriptionChange::Unsubscribed);
    assert_eq!(instance.refresh_subscription(entity, &bitset).unwrap(), SubscriptionChange::Unchanged);
    assert_eq!(instance.subscribed_count(), 0);

    assert!(!instance.unsubscribe(entity));
}

#[test]
fn refresh_rejects_bitsets_of_another_width() {
    let settings = settings(1);
    let signature = SystemSignature::new(0, "needs_a").require::<A>();
    let mut instance: SystemInstance<World> =
        SystemInstance::new(&settings, &signature, Arc::new(NullLogger)).unwrap();

    let foreign = build_bitset(settings.component_count() + 1, &[0]).unwrap();
    let error = instance.refresh_subscription(0, &foreign).unwrap_err();
    assert_eq!(
        error,
        ConfigError::BitsetWidthMismatch {
            expected: settings.component_count(),
            actual: settings.component_count() + 1,
        }
    );
    assert_eq!(instance.subscribed_count(), 0);
}

#[test]
fn subscription_changes_are_logged() {
    let settings = settings(1);
    let logger = RecordingLogger::new();
    let signature = SystemSignature::new(3, "logged").require::<B>();
    let mut instance: SystemInstance<World> =
        SystemInstance::new(&settings, &signature, logger.clone()).unwrap();
    assert_eq!(logger.count(LogCategory::SystemBitset), 1);

    let with_b = build_bitset(settings.component_count(), &[1]).unwrap();
    instance.refresh_subscription(7, &with_b).unwrap();
    instance.refresh_subscription(7, &with_b).unwrap();
    instance.unsubscribe(7);

    assert_eq!(logger.count(LogCategory::Subscription), 2);
}

#[test]
fn far_apart_ids_only_allocate_touched_pages() {
    let mut set = SubscribedSet::new();
    let far = u32::MAX - 1;

    assert!(set.insert(3));
    assert!(set.insert(far));
    assert!(set.insert(far - 1));
    assert_eq!(set.allocated_pages(), 2);
    assert!(set.contains(far));
    assert!(!set.contains(far - 2));

    assert!(set.remove(3));
    assert_eq!(set.as_slice(), &[far - 1, far]);
    assert!(set.contains(far - 1));

    set.clear();
    assert!(set.is_empty());
    assert!(!set.contains(far));
    assert!(set.insert(far));
}

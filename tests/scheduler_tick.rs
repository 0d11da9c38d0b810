use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ecs_executor::engine::error::{ConfigError, ECSError, ECSResult, ExecutionError};
use ecs_executor::engine::logging::{LogCategory, NullLogger};
use ecs_executor::engine::pool::WorkerPool;
use ecs_executor::engine::proxy::ExecutorProxy;
use ecs_executor::engine::scheduler::Scheduler;
use ecs_executor::engine::settings::SystemSignature;
use ecs_executor::engine::storage::{ComponentStorage, World};

mod common;
use common::*;

fn quiet() -> Scheduler<World> {
    Scheduler::with_logger(Arc::new(NullLogger))
}

#[test]
fn stages_group_non_conflicting_systems_by_id() {
    let settings = settings(2);
    let mut scheduler = quiet();

    scheduler.add_system(&settings, &SystemSignature::new(3, "write_pos").write::<Position>(), |_| Ok(())).unwrap();
    scheduler.add_system(&settings, &SystemSignature::new(1, "read_pos").read::<Position>(), |_| Ok(())).unwrap();
    scheduler.add_system(&settings, &SystemSignature::new(2, "write_hp").write::<Health>(), |_| Ok(())).unwrap();
    scheduler.add_system(&settings, &SystemSignature::new(4, "read_both").read::<Position>().read::<Health>(), |_| Ok(())).unwrap();

    let stages: Vec<Vec<u16>> = scheduler.stages().iter().map(|stage| stage.system_ids()).collect();
    assert_eq!(stages, vec![vec![1, 2], vec![3], vec![4]]);
    assert_eq!(scheduler.system_count(), 4);
}

#[test]
fn duplicate_system_ids_are_rejected() {
    let settings = settings(2);
    let mut scheduler = quiet();
    scheduler.add_system(&settings, &SystemSignature::new(1, "a"), |_| Ok(())).unwrap();
    let error = scheduler.add_system(&settings, &SystemSignature::new(1, "b"), |_| Ok(())).unwrap_err();
    assert_eq!(error, ConfigError::DuplicateSystem(1));
}

#[test]
fn tick_runs_systems_and_follows_population_changes() {
    init_tracing();
    let settings = settings(4);
    let (mut world, entities) = moving_world(&settings, 64);
    let pool = WorkerPool::from_settings(&settings).unwrap();
    let mut scheduler = Scheduler::<World>::new();

    scheduler
        .add_system(&settings, &SystemSignature::new(1, "movement").read::<Velocity>().write::<Position>(), |exec| {
            exec.dispatch(|data| {
                data.for_entities(|data, entity| {
                    let velocity = data.read::<Velocity>(entity)?.0;
                    data.write::<Position>(entity)?.0 += velocity;
                    Ok(())
                })
            })
        })
        .unwrap();

    scheduler.tick(&mut world, &pool).unwrap();
    assert_eq!(scheduler.instance(1).unwrap().subscribed_count(), 64);
    assert_eq!(world.read::<Position>(entities[5]).unwrap().0, 6.0);

    // Stopped entities leave the subscription before the next stage runs.
    world.remove::<Velocity>(entities[5]).unwrap();
    world.despawn(entities[6]);
    let fresh = world.spawn();
    world.insert(fresh, Position(100.0)).unwrap();
    world.insert(fresh, Velocity(2.0)).unwrap();

    scheduler.tick(&mut world, &pool).unwrap();
    let instance = scheduler.instance(1).unwrap();
    assert_eq!(instance.subscribed_count(), 63);
    assert!(!instance.is_subscribed(entities[5]));
    assert!(instance.is_subscribed(fresh));
    assert_eq!(world.read::<Position>(entities[5]).unwrap().0, 6.0);
    assert_eq!(world.read::<Position>(entities[7]).unwrap().0, 9.0);
    assert_eq!(world.read::<Position>(fresh).unwrap().0, 102.0);
}

#[test]
fn deferred_changes_are_visible_to_later_stages() {
    let settings = settings(4);
    let (mut world, entities) = moving_world(&settings, 10);
    let pool = WorkerPool::new(4).unwrap();
    let mut scheduler = quiet();

    // Stage 0: tag every entity with Health through deferred callbacks.
    scheduler
        .add_system(&settings, &SystemSignature::new(1, "spawn_health").write::<Velocity>(), |exec| {
            exec.dispatch(|data| {
                for &entity in data.entities() {
                    data.defer(move |world: &mut World| {
                        world.insert(entity, Health(1))?;
                        Ok(())
                    });
                }
                Ok(())
            })
        })
        .unwrap();

    // Stage 1: conflicts with system 1 and only matches tagged entities.
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    scheduler
        .add_system(&settings, &SystemSignature::new(2, "count_health").read::<Health>().write::<Velocity>(), move |exec| {
            let counter = Arc::clone(&counter);
            exec.dispatch(move |data| {
                counter.fetch_add(data.len(), Ordering::SeqCst);
                Ok(())
            })
        })
        .unwrap();
    assert_eq!(scheduler.stages().len(), 2);

    scheduler.tick(&mut world, &pool).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 10);
    assert!(entities.iter().all(|&entity| world.has::<Health>(entity)));
}

#[test]
fn first_error_by_system_id_stops_later_stages() {
    let settings = settings(2);
    let (mut world, _) = moving_world(&settings, 8);
    let pool = WorkerPool::new(2).unwrap();
    let mut scheduler = quiet();
    let ran = Arc::new(AtomicUsize::new(0));

    for id in [4u16, 2] {
        let ran = Arc::clone(&ran);
        scheduler
            .add_system(&settings, &SystemSignature::new(id, "fails").read::<Position>(), move |exec| {
                ran.fetch_add(1, Ordering::SeqCst);
                exec.dispatch(|_| Err(ECSError::user("broken")))
            })
            .unwrap();
    }
    let later = Arc::clone(&ran);
    scheduler
        .add_system(&settings, &SystemSignature::new(9, "later").write::<Position>(), move |_| {
            later.fetch_add(100, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let error = scheduler.tick(&mut world, &pool).unwrap_err();
    assert!(matches!(error, ECSError::Execution(ExecutionError::Slice { split_index: 0, .. })));
    assert_eq!(ran.load(Ordering::SeqCst), 2);
}

#[test]
fn outputs_are_readable_after_a_tick() {
    let settings = settings(4);
    let (mut world, _) = moving_world(&settings, 40);
    let pool = WorkerPool::new(4).unwrap();
    let mut scheduler: Scheduler<World, f32> = Scheduler::with_logger(Arc::new(NullLogger));

    scheduler
        .add_system(&settings, &SystemSignature::new(1, "sum").read::<Position>(), |exec| {
            exec.dispatch(|data| {
                let mut sum = 0.0;
                for &entity in data.entities() {
                    sum += data.read::<Position>(entity)?.0;
                }
                *data.output() = sum;
                Ok(())
            })
        })
        .unwrap();

    scheduler.tick(&mut world, &pool).unwrap();
    let instance = scheduler.instance_mut(1).unwrap();
    let total = instance.fold_outputs(0.0, |acc, sum| acc + sum);
    assert_eq!(total, (0..40).sum::<i32>() as f32);
}

#[test]
fn scheduler_logs_stage_changes() {
    let settings = settings(1);
    let logger = RecordingLogger::new();
    let mut scheduler: Scheduler<World> = Scheduler::with_logger(logger.clone());
    scheduler.add_system(&settings, &SystemSignature::new(1, "a"), |_| Ok(())).unwrap();

    assert_eq!(logger.count(LogCategory::Scheduler), 1);
    assert_eq!(logger.count(LogCategory::SystemBitset), 1);
}

fn movement_body(exec: &mut ExecutorProxy<'_, '_, World, ()>) -> ECSResult<()> {
    exec.dispatch(|data| {
        data.for_entities(|data, entity| {
            let velocity = data.read::<Velocity>(entity)?.0;
            data.write::<Position>(entity)?.0 += velocity;
            Ok(())
        })
    })
}

#[test]
fn despawn_before_adding_a_system_unsubscribes_existing_systems() {
    let settings = settings(2);
    let (mut world, entities) = moving_world(&settings, 6);
    let pool = WorkerPool::new(2).unwrap();
    let mut scheduler = quiet();

    scheduler
        .add_system(&settings, &SystemSignature::new(1, "movement").read::<Velocity>().write::<Position>(), movement_body)
        .unwrap();
    scheduler.tick(&mut world, &pool).unwrap();
    assert_eq!(scheduler.instance(1).unwrap().subscribed_count(), 6);

    world.despawn(entities[2]);
    scheduler.add_system(&settings, &SystemSignature::new(2, "observer").read::<Velocity>(), |_| Ok(())).unwrap();

    scheduler.tick(&mut world, &pool).unwrap();
    for id in [1, 2] {
        let instance = scheduler.instance(id).unwrap();
        assert!(!instance.is_subscribed(entities[2]), "system {id}");
        assert_eq!(instance.subscribed_count(), 5, "system {id}");
    }
    assert_eq!(world.read::<Position>(entities[3]).unwrap().0, 5.0);
}

#[test]
fn system_added_after_ticks_sees_current_population() {
    let settings = settings(2);
    let (mut world, entities) = moving_world(&settings, 4);
    let pool = WorkerPool::new(2).unwrap();
    let mut scheduler = quiet();

    scheduler
        .add_system(&settings, &SystemSignature::new(1, "movement").read::<Velocity>().write::<Position>(), movement_body)
        .unwrap();
    scheduler.tick(&mut world, &pool).unwrap();
    scheduler.tick(&mut world, &pool).unwrap();

    // Same window: a despawn whose id is reused, a component change, a new system.
    world.despawn(entities[0]);
    let reused = world.spawn();
    assert_eq!(reused, entities[0]);
    world.insert(reused, Health(3)).unwrap();
    world.insert(entities[1], Health(5)).unwrap();
    world.remove::<Velocity>(entities[3]).unwrap();

    scheduler.add_system(&settings, &SystemSignature::new(2, "healthy").read::<Health>(), |_| Ok(())).unwrap();
    scheduler.tick(&mut world, &pool).unwrap();

    let movement = scheduler.instance(1).unwrap();
    assert!(!movement.is_subscribed(reused));
    assert!(!movement.is_subscribed(entities[3]));
    assert_eq!(movement.subscribed_count(), 2);

    let healthy = scheduler.instance(2).unwrap();
    let mut subscribed = healthy.subscribed().to_vec();
    subscribed.sort_unstable();
    assert_eq!(subscribed, vec![reused, entities[1]]);
}

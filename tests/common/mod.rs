#![allow(dead_code)]

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Level;

use ecs_executor::engine::logging::{LogCategory, Logger};
use ecs_executor::engine::settings::{InlinePolicy, Settings, SettingsBuilder};
use ecs_executor::engine::storage::World;
use ecs_executor::engine::types::EntityId;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct A(pub u32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct B(pub u32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position(pub f32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Velocity(pub f32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Health(pub i32);

/// Installs a test-writer `tracing` subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Settings with `A, B, Position, Velocity, Health` registered in that order.
pub fn settings(threads: usize) -> Settings {
    settings_with(threads, true, InlinePolicy::OneInline)
}

pub fn settings_with(threads: usize, inner_parallelism: bool, inline_policy: InlinePolicy) -> Settings {
    let mut builder = SettingsBuilder::new();
    builder.component::<A>().unwrap();
    builder.component::<B>().unwrap();
    builder.component::<Position>().unwrap();
    builder.component::<Velocity>().unwrap();
    builder.component::<Health>().unwrap();
    builder
        .max_threads(threads)
        .inner_parallelism(inner_parallelism)
        .inline_policy(inline_policy)
        .build()
        .unwrap()
}

/// Spawns `count` entities carrying `Position(i)` and `Velocity(1.0)`.
pub fn moving_world(settings: &Settings, count: usize) -> (World, Vec<EntityId>) {
    let mut world = World::new(settings).unwrap();
    let entities = (0..count)
        .map(|i| {
            let entity = world.spawn();
            world.insert(entity, Position(i as f32)).unwrap();
            world.insert(entity, Velocity(1.0)).unwrap();
            entity
        })
        .collect();
    (world, entities)
}

/// Logger that keeps every record in memory.
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<(LogCategory, Level, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<(LogCategory, Level, String)> {
        self.records.lock().clone()
    }

    pub fn count(&self, category: LogCategory) -> usize {
        self.records.lock().iter().filter(|(c, _, _)| *c == category).count()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, category: LogCategory, level: Level, message: fmt::Arguments<'_>) {
        self.records.lock().push((category, level, message.to_string()));
    }
}

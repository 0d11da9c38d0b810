#![allow(dead_code)]

use ecs_executor::engine::settings::{Settings, SettingsBuilder};
use ecs_executor::engine::storage::World;
use ecs_executor::engine::types::EntityId;

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}

pub fn make_settings(threads: usize, inner_parallelism: bool) -> Settings {
    let mut builder = SettingsBuilder::new();
    builder.component::<Position>().unwrap();
    builder.component::<Velocity>().unwrap();
    builder.component::<Wealth>().unwrap();
    builder
        .max_threads(threads)
        .inner_parallelism(inner_parallelism)
        .build()
        .unwrap()
}

/// Every agent moves; every other agent also carries wealth.
pub fn populate(settings: &Settings, agents: usize) -> (World, Vec<EntityId>) {
    let mut world = World::new(settings).unwrap();
    let mut entities = Vec::with_capacity(agents);
    for i in 0..agents {
        let entity = world.spawn();
        world.insert(entity, Position { x: i as f32, y: 0.0 }).unwrap();
        world.insert(entity, Velocity { dx: 1.0, dy: 0.5 }).unwrap();
        if i % 2 == 0 {
            world.insert(entity, Wealth { value: 1.0 }).unwrap();
        }
        entities.push(entity);
    }
    (world, entities)
}

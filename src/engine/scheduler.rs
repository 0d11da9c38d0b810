//! Stage scheduling and the per-tick driver.
//!
//! This module is responsible for:
//! * grouping system instances into stages based on access compatibility,
//! * running the systems of a stage concurrently on rayon's global pool,
//! * flushing deferred callbacks and refreshing subscriptions between stages.
//!
//! ## Scheduling model
//!
//! Systems are assigned to **stages** such that systems within the same stage
//! do not conflict on declared component access. Stages run one after the
//! other; inside a stage each system may still split its own work into
//! slices on the [`WorkerPool`].
//!
//! ## Structural synchronization
//!
//! After every stage the deferred callbacks of its systems run against
//! `&mut W` in system-id order, then every subscription is refreshed from the
//! population's change stream. The next stage therefore sees a consistent
//! view.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::Level;

use crate::engine::context::Context;
use crate::engine::error::{ConfigError, ECSError, ECSResult};
use crate::engine::instance::SystemInstance;
use crate::engine::logging::{default_logger, log_event, LogCategory, Logger};
use crate::engine::pool::WorkerPool;
use crate::engine::proxy::ExecutorProxy;
use crate::engine::settings::{Settings, SystemSignature};
use crate::engine::storage::{ComponentStorage, EntityChange, EntityPopulation};
use crate::engine::types::{EntityId, SystemId};


/// User logic of a scheduled system, called once per tick.
pub type SystemFn<W, O> = Box<dyn for<'a, 'w> FnMut(&mut ExecutorProxy<'a, 'w, W, O>) -> ECSResult<()> + Send>;

/// A system instance together with its per-tick logic.
pub struct ScheduledSystem<W, O> {
    instance: SystemInstance<W, O>,
    body: SystemFn<W, O>,
}

impl<W, O> ScheduledSystem<W, O> {
    /// The underlying instance.
    pub fn instance(&self) -> &SystemInstance<W, O> {
        &self.instance
    }
}

/// A group of systems that can be executed concurrently.
///
/// ## Invariants
/// * No two systems within a `Stage` have conflicting access sets.
/// * Systems are stored in ascending id order.

pub struct Stage<W, O> {
    systems: Vec<ScheduledSystem<W, O>>,
}

impl<W, O> Stage<W, O> {
    /// Ids of the systems in this stage.
    pub fn system_ids(&self) -> Vec<SystemId> {
        self.systems.iter().map(|system| system.instance.id()).collect()
    }

    /// Number of systems in this stage.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if the stage holds no systems.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

/// Partitions systems into stages.
///
/// Systems are processed by ascending id and each is placed into the first
/// stage where it conflicts with nobody; otherwise a new stage is opened.
/// O(n²) in the worst case.

fn make_stages<W, O>(mut systems: Vec<ScheduledSystem<W, O>>) -> Vec<Stage<W, O>> {
    let mut stages: Vec<Stage<W, O>> = Vec::new();

    systems.sort_by_key(|system| system.instance.id());

    'next_system: for system in systems {
        for stage in stages.iter_mut() {
            let conflict = stage.systems.iter()
                .any(|other| system.instance.access().conflicts_with(other.instance.access()));
            if !conflict {
                stage.systems.push(system);
                continue 'next_system;
            }
        }
        stages.push(Stage { systems: vec![system] });
    }
    stages
}

/// Owns the system instances of a world and drives them tick by tick.

pub struct Scheduler<W, O = ()> {
    stages: Vec<Stage<W, O>>,
    logger: Arc<dyn Logger>,
    swept: bool,
}

impl<W, O> Default for Scheduler<W, O>
where
    W: ComponentStorage + EntityPopulation,
    O: Default + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<W, O> Scheduler<W, O>
where
    W: ComponentStorage + EntityPopulation,
    O: Default + Send,
{
    /// Empty scheduler logging through [`TracingLogger`](crate::engine::logging::TracingLogger).
    pub fn new() -> Self {
        Self::with_logger(default_logger())
    }

    /// Empty scheduler logging through `logger`. System instances share it.
    pub fn with_logger(logger: Arc<dyn Logger>) -> Self {
        Self { stages: Vec::new(), logger, swept: false }
    }

    /// Registers a system and regroups the stages.
    ///
    /// ## Errors
    /// [`ConfigError::DuplicateSystem`] if the id is taken; any error from
    /// building the instance.

    pub fn add_system(
        &mut self,
        settings: &Settings,
        signature: &SystemSignature,
        body: impl for<'a, 'w> FnMut(&mut ExecutorProxy<'a, 'w, W, O>) -> ECSResult<()> + Send + 'static,
    ) -> Result<SystemId, ConfigError> {
        if self.instance(signature.id()).is_some() {
            return Err(ConfigError::DuplicateSystem(signature.id()));
        }
        let instance = SystemInstance::new(settings, signature, Arc::clone(&self.logger))?;

        let mut systems: Vec<ScheduledSystem<W, O>> = self.stages
            .drain(..)
            .flat_map(|stage| stage.systems)
            .collect();
        systems.push(ScheduledSystem { instance, body: Box::new(body) });
        self.stages = make_stages(systems);

        log_event!(
            self.logger,
            LogCategory::Scheduler,
            Level::DEBUG,
            "added system ({}) {}: {} stages",
            signature.id(),
            signature.name(),
            self.stages.len()
        );
        // A new instance starts with no subscriptions.
        self.swept = false;
        Ok(signature.id())
    }

    /// Execution stages, in run order.
    pub fn stages(&self) -> &[Stage<W, O>] {
        &self.stages
    }

    /// Number of registered systems.
    pub fn system_count(&self) -> usize {
        self.stages.iter().map(Stage::len).sum()
    }

    /// Looks up a system instance by id.
    pub fn instance(&self, id: SystemId) -> Option<&SystemInstance<W, O>> {
        self.systems().find(|instance| instance.id() == id)
    }

    /// Mutable lookup, e.g. to read per-slice outputs after a tick.
    pub fn instance_mut(&mut self, id: SystemId) -> Option<&mut SystemInstance<W, O>> {
        self.stages
            .iter_mut()
            .flat_map(|stage| stage.systems.iter_mut())
            .map(|system| &mut system.instance)
            .find(|instance| instance.id() == id)
    }

    fn systems(&self) -> impl Iterator<Item = &SystemInstance<W, O>> {
        self.stages
            .iter()
            .flat_map(|stage| stage.systems.iter())
            .map(|system| &system.instance)
    }

    /// Runs one tick over `world`.
    ///
    /// Every system of a stage runs even if another one fails; after the
    /// stage is flushed the error of the lowest system id is returned and
    /// later stages are skipped.

    pub fn tick(&mut self, world: &mut W, pool: &WorkerPool) -> ECSResult<()> {
        self.refresh_subscriptions(world)?;

        for index in 0..self.stages.len() {
            let errors = run_stage(&mut self.stages[index], self.logger.as_ref(), index, world, pool);
            self.refresh_subscriptions(world)?;

            if let Some((id, error)) = errors.into_iter().min_by_key(|(id, _)| *id) {
                log_event!(
                    self.logger,
                    LogCategory::Scheduler,
                    Level::ERROR,
                    "stage {} failed in system {}: {}",
                    index,
                    id,
                    error
                );
                return Err(error);
            }
        }
        Ok(())
    }

    /// Brings every subscription up to date with `world`.
    ///
    /// The first call after a system was added sweeps every live entity;
    /// later calls only apply the population's pending changes. Destroyed
    /// entities are dropped from every subscription either way.

    pub fn refresh_subscriptions(&mut self, world: &mut W) -> ECSResult<()> {
        let changes = world.drain_changes();

        if !self.swept {
            // A sweep only visits live ids; dead ones must be unsubscribed here.
            for change in &changes {
                if let EntityChange::Destroyed(entity) = *change {
                    self.unsubscribe_everywhere(entity);
                }
            }
            let live = world.live_entities();
            log_event!(
                self.logger,
                LogCategory::Subscription,
                Level::DEBUG,
                "full sweep over {} entities",
                live.len()
            );
            for entity in live {
                self.refresh_entity(world, entity)?;
            }
            self.swept = true;
            return Ok(());
        }

        for change in changes {
            match change {
                EntityChange::Changed(entity) => self.refresh_entity(world, entity)?,
                EntityChange::Destroyed(entity) => self.unsubscribe_everywhere(entity),
            }
        }
        Ok(())
    }

    fn unsubscribe_everywhere(&mut self, entity: EntityId) {
        for system in self.stages.iter_mut().flat_map(|stage| stage.systems.iter_mut()) {
            system.instance.unsubscribe(entity);
        }
    }

    fn refresh_entity(&mut self, world: &W, entity: EntityId) -> Result<(), ConfigError> {
        let systems = self.stages.iter_mut().flat_map(|stage| stage.systems.iter_mut());
        match world.bitset_of(entity) {
            Some(bitset) => {
                for system in systems {
                    system.instance.refresh_subscription(entity, &bitset)?;
                }
            }
            None => {
                for system in systems {
                    system.instance.unsubscribe(entity);
                }
            }
        }
        Ok(())
    }
}

/// Runs one stage and flushes its deferred callbacks.
///
/// Returns every failure of the stage tagged with its system id.

fn run_stage<W, O>(
    stage: &mut Stage<W, O>,
    logger: &dyn Logger,
    index: usize,
    world: &mut W,
    pool: &WorkerPool,
) -> Vec<(SystemId, ECSError)>
where
    W: ComponentStorage,
    O: Default + Send,
{
    log_event!(
        logger,
        LogCategory::Scheduler,
        Level::TRACE,
        "stage {}: systems {:?}",
        index,
        stage.system_ids()
    );

    let mut errors: Vec<(SystemId, ECSError)> = {
        let ctx = Context::new(&*world, pool);
        stage.systems
            .par_iter_mut()
            .filter_map(|system| {
                let ScheduledSystem { instance, body } = system;
                let id = instance.id();
                instance.execute(&ctx, |proxy| body(proxy)).err().map(|error| (id, error))
            })
            .collect()
    };

    for system in stage.systems.iter_mut() {
        if let Err(error) = system.instance.execute_deferred_fns(world) {
            errors.push((system.instance.id(), error));
        }
    }
    errors
}

// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The simulation context: every allocator, pool and registry a running
//! simulation owns, plus its tick-boundary maintenance.

use crate::config::SimulationConfig;
use crate::editing::AnyCreateInfoHistory;
use crate::functionality::FunctionalityDescriptor;
use anyhow::Context;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tessera_agents::{LoadWorkerPool, ResourceGcAgent};
use tessera_core::event::EventBus;
use tessera_core::{
    CoreError, CoreResult, EntityId, IdGroup, InlineScheduler, LoadEvent, ResourceId,
    ResourceKind, TaskScheduler,
};
use tessera_data::ecs::{
    CommitSummary, Component, ComponentPool, ComponentPoolRegistry, EditorNameMap, GroupData,
    IdAllocator,
};
use tessera_data::resources::{ResourceHandle, ResourcePool};

/// What one [`SimulationContext::maintenance`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// The tick that just ended.
    pub tick: u64,
    /// Component values inserted and removed by the commit.
    pub committed: CommitSummary,
    /// Entity identifiers returned to their allocator.
    pub released_entities: usize,
    /// Resource identifiers returned to their allocator.
    pub released_resources: usize,
    /// Resource records reclaimed by the sweep.
    pub collected_records: usize,
}

/// A type-erased resource handle kept alive by the context.
pub(crate) type RetainedHandle = Box<dyn Any + Send + Sync>;

/// The state of one simulation.
pub struct SimulationContext {
    config: SimulationConfig,
    pub(crate) entity_ids: IdAllocator,
    pub(crate) resource_ids: IdAllocator,
    pub(crate) components: ComponentPoolRegistry,
    pub(crate) resources: ResourcePool,
    pub(crate) groups: GroupData,
    pub(crate) entity_names: Option<EditorNameMap>,
    pub(crate) resource_names: Option<EditorNameMap>,
    pub(crate) retained: HashMap<ResourceId, RetainedHandle>,
    pub(crate) create_info_histories: HashMap<TypeId, Box<dyn AnyCreateInfoHistory>>,
    workers: Option<Arc<LoadWorkerPool>>,
    load_events: EventBus<LoadEvent>,
    doomed_entities: HashSet<EntityId>,
    pub(crate) doomed_resources: Vec<ResourceId>,
    gc_agent: ResourceGcAgent,
    functionalities: Vec<FunctionalityDescriptor>,
    initialized: bool,
    tick: u64,
}

impl SimulationContext {
    /// Creates a context whose resource loads run on
    /// `config.worker_threads` loader threads, or inline when that is zero.
    pub fn new(config: SimulationConfig) -> anyhow::Result<Self> {
        if config.worker_threads == 0 {
            return Ok(Self::inline(config));
        }
        let workers = Arc::new(
            LoadWorkerPool::new(config.worker_threads)
                .context("failed to start the resource loader threads")?,
        );
        let scheduler: Arc<dyn TaskScheduler> = workers.clone();
        Ok(Self::build(config, scheduler, Some(workers)))
    }

    /// Creates a context that runs every resource load on the thread
    /// requesting it, whatever `config.worker_threads` says.
    #[must_use]
    pub fn inline(config: SimulationConfig) -> Self {
        Self::build(config, Arc::new(InlineScheduler), None)
    }

    fn build(
        config: SimulationConfig,
        scheduler: Arc<dyn TaskScheduler>,
        workers: Option<Arc<LoadWorkerPool>>,
    ) -> Self {
        let load_events = EventBus::new();
        let resources = ResourcePool::new(scheduler);
        resources.attach_events(load_events.sender());

        let (entity_names, resource_names) = if config.name_maps {
            (Some(EditorNameMap::new()), Some(EditorNameMap::new()))
        } else {
            (None, None)
        };
        let gc_agent = ResourceGcAgent::new().with_budget(config.gc_budget_per_tick);

        log::info!(
            "SimulationContext: Created with {} loader threads",
            workers.as_ref().map_or(0, |workers| workers.threads())
        );
        Self {
            config,
            entity_ids: IdAllocator::new(),
            resource_ids: IdAllocator::new(),
            components: ComponentPoolRegistry::new(),
            resources,
            groups: GroupData::new(),
            entity_names,
            resource_names,
            retained: HashMap::new(),
            create_info_histories: HashMap::new(),
            workers,
            load_events,
            doomed_entities: HashSet::new(),
            doomed_resources: Vec::new(),
            gc_agent,
            functionalities: Vec::new(),
            initialized: false,
            tick: 0,
        }
    }

    /// The settings this context was created with.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The entity identifier allocator.
    #[must_use]
    pub fn entity_ids(&self) -> &IdAllocator {
        &self.entity_ids
    }

    /// The resource identifier allocator.
    #[must_use]
    pub fn resource_ids(&self) -> &IdAllocator {
        &self.resource_ids
    }

    /// The component pools.
    #[must_use]
    pub fn components(&self) -> &ComponentPoolRegistry {
        &self.components
    }

    /// The resource pool.
    #[must_use]
    pub fn resources(&self) -> &ResourcePool {
        &self.resources
    }

    /// The named dynamic groups.
    #[must_use]
    pub fn groups(&self) -> &GroupData {
        &self.groups
    }

    /// Entity names, when name maps are enabled.
    #[must_use]
    pub fn entity_names(&self) -> Option<&EditorNameMap> {
        self.entity_names.as_ref()
    }

    /// Resource names, when name maps are enabled.
    #[must_use]
    pub fn resource_names(&self) -> Option<&EditorNameMap> {
        self.resource_names.as_ref()
    }

    /// The number of completed ticks.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    // --- Entities ---

    /// Creates the pool for `T`. See [`ComponentPoolRegistry::register`].
    pub fn register_component<T: Component>(&mut self) -> CoreResult<&ComponentPool<T>> {
        self.components.register::<T>()
    }

    /// Drops the pool for `T` and every value in it.
    pub fn unregister_component<T: Component>(&mut self) -> CoreResult<()> {
        self.components.unregister::<T>()
    }

    /// The pool for `T`.
    pub fn component_pool<T: Component>(&self) -> CoreResult<&ComponentPool<T>> {
        self.components.pool::<T>()
    }

    /// Allocates a new entity identifier in `group`.
    pub fn spawn_entity(&self, group: IdGroup) -> CoreResult<EntityId> {
        self.entity_ids.allocate(group)
    }

    /// Allocates a new entity and records `name` for it.
    pub fn spawn_named(&self, group: IdGroup, name: &str) -> CoreResult<EntityId> {
        let names = self
            .entity_names
            .as_ref()
            .ok_or_else(|| CoreError::NotFound("entity name maps are disabled".to_string()))?;
        let id = self.entity_ids.allocate(group)?;
        if let Err(e) = names.add(id, name) {
            self.entity_ids.release(id)?;
            return Err(e);
        }
        Ok(id)
    }

    /// Stages `value` for `id` in `T`'s pool.
    ///
    /// Fails with [`CoreError::InvalidHandle`] if `id` is not live or was
    /// destroyed this tick.
    pub fn insert_component<T: Component>(&self, id: EntityId, value: T) -> CoreResult<()> {
        if !self.entity_ids.is_live(id) || self.doomed_entities.contains(&id) {
            return Err(CoreError::InvalidHandle(id));
        }
        self.components.pool::<T>()?.insert(id, value)
    }

    /// Stages removal of `id`'s value from `T`'s pool.
    pub fn remove_component<T: Component>(&self, id: EntityId) -> CoreResult<()> {
        self.components.pool::<T>()?.remove(id)
    }

    /// Destroys an entity.
    ///
    /// Its components are removed at the next [`maintenance`](Self::maintenance),
    /// which also recycles the identifier. Fails with
    /// [`CoreError::InvalidHandle`] if `id` is not live or is already being
    /// destroyed.
    pub fn destroy_entity(&mut self, id: EntityId) -> CoreResult<()> {
        if !self.entity_ids.is_live(id) || self.doomed_entities.contains(&id) {
            return Err(CoreError::InvalidHandle(id));
        }
        self.doomed_entities.try_reserve(1)?;
        self.components.discard_pending(id);
        let removed = self.components.remove_entity(id);
        if let Some(names) = &self.entity_names {
            names.remove(id);
        }
        self.doomed_entities.insert(id);
        log::trace!("SimulationContext: Destroying {id}, staged {removed} removals");
        Ok(())
    }

    // --- Resources ---

    /// Allocates a resource identifier in `group` and creates its record
    /// with `create_info`.
    ///
    /// The returned handle is the only reference; drop it and the record is
    /// destroyed. Use [`retain_resource`](Self::retain_resource) to keep it
    /// alive in the context instead.
    pub fn create_resource<K: ResourceKind>(
        &self,
        group: IdGroup,
        create_info: K::CreateInfo,
    ) -> CoreResult<ResourceHandle<K>> {
        let id = self.resource_ids.allocate(group)?;
        match self.resources.create_with_info::<K>(id, create_info) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.resource_ids.release(id)?;
                Err(e)
            }
        }
    }

    /// Keeps a handle alive until [`destroy_resource`](Self::destroy_resource)
    /// is called for its id. Replaces any handle already retained for it.
    pub fn retain_resource<K: ResourceKind>(
        &mut self,
        handle: ResourceHandle<K>,
    ) -> CoreResult<()> {
        self.retained.try_reserve(1)?;
        self.retained.insert(handle.id(), Box::new(handle));
        Ok(())
    }

    /// A new handle to a retained or otherwise live resource.
    pub fn resource<K: ResourceKind>(&self, id: ResourceId) -> CoreResult<ResourceHandle<K>> {
        self.resources
            .find::<K>(id)?
            .ok_or(CoreError::InvalidHandle(id))
    }

    /// Drops the context's handle to `id` and schedules its identifier for
    /// recycling once the record is gone.
    pub fn destroy_resource(&mut self, id: ResourceId) -> CoreResult<()> {
        if !self.resource_ids.is_live(id) || self.doomed_resources.contains(&id) {
            return Err(CoreError::InvalidHandle(id));
        }
        self.doomed_resources.try_reserve(1)?;
        drop(self.retained.remove(&id));
        if let Some(names) = &self.resource_names {
            names.remove(id);
        }
        self.forget_create_info(id);
        self.doomed_resources.push(id);
        self.gc_agent.queue_candidate(id);
        Ok(())
    }

    /// Every load event published since the last call.
    #[must_use]
    pub fn drain_load_events(&self) -> Vec<LoadEvent> {
        self.load_events.drain()
    }

    /// Blocks until every scheduled resource load has finished. Returns
    /// immediately for inline contexts.
    pub fn wait_for_loads(&self) {
        if let Some(workers) = &self.workers {
            workers.wait_idle();
        }
    }

    // --- Tick boundary ---

    /// Applies the deferred work of the tick that just ended.
    ///
    /// Commits every component pool, recycles the identifiers of destroyed
    /// entities, sweeps unreferenced resource records within the
    /// configured budget, and recycles the identifiers of destroyed
    /// resources whose record is gone. Must not be called while the
    /// current thread iterates a component pool.
    pub fn maintenance(&mut self) -> MaintenanceReport {
        let committed = self.components.commit_all();

        let mut released_entities = 0;
        for id in self.doomed_entities.drain() {
            match self.entity_ids.release(id) {
                Ok(()) => released_entities += 1,
                Err(e) => log::warn!("SimulationContext: Could not recycle entity {id}: {e}"),
            }
        }

        let collected_records = self.gc_agent.run(&self.resources);

        let mut released_resources = 0;
        let resources = &self.resources;
        let resource_ids = &self.resource_ids;
        self.doomed_resources.retain(|&id| {
            if resources.contains(id) {
                // Someone still holds a handle; try again next tick.
                return true;
            }
            match resource_ids.release(id) {
                Ok(()) => released_resources += 1,
                Err(e) => log::warn!("SimulationContext: Could not recycle resource {id}: {e}"),
            }
            false
        });

        self.tick += 1;
        MaintenanceReport {
            tick: self.tick,
            committed,
            released_entities,
            released_resources,
            collected_records,
        }
    }

    // --- Functionality bookkeeping ---

    /// The functionalities this context was instantiated with, in creation
    /// order.
    #[must_use]
    pub fn functionalities(&self) -> &[FunctionalityDescriptor] {
        &self.functionalities
    }

    pub(crate) fn has_functionalities(&self) -> bool {
        !self.functionalities.is_empty()
    }

    pub(crate) fn set_functionalities(&mut self, functionalities: Vec<FunctionalityDescriptor>) {
        self.functionalities = functionalities;
    }

    pub(crate) fn take_functionalities(&mut self) -> Vec<FunctionalityDescriptor> {
        std::mem::take(&mut self.functionalities)
    }

    /// Returns `true` between a successful `initialize` and the matching
    /// `deinitialize`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }
}

impl Drop for SimulationContext {
    fn drop(&mut self) {
        if !self.functionalities.is_empty() {
            log::warn!(
                "SimulationContext: Dropped with {} functionalities still instantiated",
                self.functionalities.len()
            );
        }
        // Handles go before the pool so their records are destroyed through
        // the loader tables.
        self.retained.clear();
    }
}

impl std::fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationContext")
            .field("tick", &self.tick)
            .field("component_pools", &self.components.len())
            .field("resources", &self.resources.len())
            .field("functionalities", &self.functionalities.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{LoadFailure, LoadState, ResourceType};
    use tessera_data::resources::{LoadContext, ResourceLoader};

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(f32, f32);
    impl Component for Position {}

    struct Shape;
    impl ResourceKind for Shape {
        const TYPE: ResourceType = ResourceType::new(4, "collision_shape");
        type CreateInfo = f32;
        type Data = f32;
    }

    struct ShapeLoader;
    impl ResourceLoader<Shape> for ShapeLoader {
        fn load(&self, radius: &f32, _context: &LoadContext) -> Result<f32, LoadFailure> {
            Ok(radius * radius * std::f32::consts::PI)
        }
    }

    fn context() -> SimulationContext {
        SimulationContext::inline(SimulationConfig::default())
    }

    #[test]
    fn test_destroyed_entity_is_recycled_at_maintenance() {
        // --- 1. ARRANGE ---
        let mut context = context();
        context.register_component::<Position>().unwrap();
        let entity = context.spawn_entity(IdGroup::PERSISTENT).unwrap();
        context.insert_component(entity, Position(1.0, 2.0)).unwrap();
        context.maintenance();

        // --- 2. ACT ---
        context.destroy_entity(entity).unwrap();
        let second = context.destroy_entity(entity);
        let report = context.maintenance();

        // --- 3. ASSERT ---
        assert_eq!(second, Err(CoreError::InvalidHandle(entity)));
        assert_eq!(report.committed.removed, 1);
        assert_eq!(report.released_entities, 1);
        assert_eq!(report.tick, 2);
        assert!(!context.entity_ids().is_live(entity));
        assert!(context.component_pool::<Position>().unwrap().is_empty());
    }

    #[test]
    fn test_insert_after_destroy_does_not_leak_into_recycled_id() {
        // --- 1. ARRANGE ---
        let mut context = context();
        context.register_component::<Position>().unwrap();
        let entity = context.spawn_entity(IdGroup::PERSISTENT).unwrap();
        context.destroy_entity(entity).unwrap();

        // --- 2. ACT ---
        let late_insert = context.insert_component(entity, Position(9.0, 9.0));
        context.maintenance();
        let recycled = context.spawn_entity(IdGroup::PERSISTENT).unwrap();

        // --- 3. ASSERT ---
        assert_eq!(late_insert, Err(CoreError::InvalidHandle(entity)));
        assert_eq!(recycled, entity, "The lowest free index is reused");
        assert_eq!(
            context.component_pool::<Position>().unwrap().get(recycled),
            None,
            "A recycled id must start without components"
        );
        context.insert_component(recycled, Position(1.0, 1.0)).unwrap();
        context.maintenance();
        assert_eq!(
            context.component_pool::<Position>().unwrap().get(recycled).as_deref(),
            Some(&Position(1.0, 1.0))
        );
    }

    #[test]
    fn test_destroyed_resource_id_waits_for_outside_handles() {
        let mut context = context();
        context
            .resources()
            .register_loader::<Shape>(Arc::new(ShapeLoader))
            .unwrap();
        let handle = context
            .create_resource::<Shape>(IdGroup::PERSISTENT, 0.5)
            .unwrap();
        let id = handle.id();
        context.retain_resource(handle.clone()).unwrap();

        context.destroy_resource(id).unwrap();
        assert_eq!(context.maintenance().released_resources, 0);
        assert!(context.resource_ids().is_live(id), "An outside handle keeps the id");

        drop(handle);
        assert_eq!(context.maintenance().released_resources, 1);
        assert!(!context.resource_ids().is_live(id));
    }

    #[test]
    fn test_load_events_reach_the_context() {
        let context = context();
        context
            .resources()
            .register_loader::<Shape>(Arc::new(ShapeLoader))
            .unwrap();
        let handle = context
            .create_resource::<Shape>(IdGroup::TEMPORARY, 1.0)
            .unwrap();
        handle.request_load().unwrap();
        context.wait_for_loads();

        let events = context.drain_load_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, handle.id());
        assert_eq!(events[0].state, LoadState::Loaded);
    }

    #[test]
    fn test_spawn_named_rejects_taken_names() {
        let context = context();
        let first = context.spawn_named(IdGroup::PERSISTENT, "player").unwrap();
        let err = context.spawn_named(IdGroup::PERSISTENT, "player").unwrap_err();

        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(context.entity_ids().live_ids(IdGroup::PERSISTENT), vec![first]);
        assert_eq!(context.entity_names().unwrap().find_id("player"), Some(first));
    }
}

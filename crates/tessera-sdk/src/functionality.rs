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

//! The catalog of functionalities a simulation is built from.
//!
//! A functionality is a domain module (physics, transforms, a renderer
//! bridge) contributing a set of hooks that create and destroy its part of
//! a [`SimulationContext`]. Descriptors are registered on an explicit
//! [`FunctionalityRegistry`]; modules may also submit them statically with
//! [`inventory::submit!`] and have them picked up by
//! [`FunctionalityRegistry::with_static`].

use crate::simulation::SimulationContext;
use std::collections::HashMap;
use std::fmt;
use tessera_core::{CoreError, CoreResult};

/// The unique identifier of a functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionalityId(pub u32);

impl fmt::Display for FunctionalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A fallible hook run against a simulation.
pub type SetupHook = fn(&mut SimulationContext) -> CoreResult<()>;
/// An infallible hook undoing a [`SetupHook`].
pub type TeardownHook = fn(&mut SimulationContext);

/// The hooks of one functionality.
#[derive(Clone, Copy)]
pub struct FunctionalityDescriptor {
    /// Unique id within a registry.
    pub id: FunctionalityId,
    /// Human readable name, used in logs.
    pub name: &'static str,
    /// Creates the functionality's state in a new simulation.
    pub on_create: SetupHook,
    /// Destroys what `on_create` made.
    pub on_destroy: TeardownHook,
    /// Optional second phase run once every functionality was created.
    pub on_initialize: Option<SetupHook>,
    /// Undoes `on_initialize`.
    pub on_deinitialize: Option<TeardownHook>,
}

impl FunctionalityDescriptor {
    /// Creates a descriptor without initialization hooks.
    #[must_use]
    pub const fn new(
        id: FunctionalityId,
        name: &'static str,
        on_create: SetupHook,
        on_destroy: TeardownHook,
    ) -> Self {
        Self {
            id,
            name,
            on_create,
            on_destroy,
            on_initialize: None,
            on_deinitialize: None,
        }
    }

    /// Adds initialization hooks.
    #[must_use]
    pub const fn with_initialize(
        mut self,
        on_initialize: SetupHook,
        on_deinitialize: TeardownHook,
    ) -> Self {
        self.on_initialize = Some(on_initialize);
        self.on_deinitialize = Some(on_deinitialize);
        self
    }
}

impl fmt::Debug for FunctionalityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalityDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("has_initialize", &self.on_initialize.is_some())
            .finish()
    }
}

inventory::collect!(FunctionalityDescriptor);

/// The ordered catalog of functionalities.
///
/// Registration order is creation order; destruction runs in reverse.
#[derive(Debug, Default)]
pub struct FunctionalityRegistry {
    descriptors: Vec<FunctionalityDescriptor>,
    live_instances: HashMap<FunctionalityId, usize>,
}

impl FunctionalityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every descriptor submitted with
    /// `inventory::submit!`, ordered by id.
    ///
    /// Statically submitted descriptors sharing an id are a programming
    /// error; the first one seen wins and the rest are logged.
    #[must_use]
    pub fn with_static() -> Self {
        let mut submitted: Vec<&FunctionalityDescriptor> =
            inventory::iter::<FunctionalityDescriptor>.into_iter().collect();
        submitted.sort_by_key(|descriptor| descriptor.id);

        let mut registry = Self::new();
        for descriptor in submitted {
            if let Err(e) = registry.register(*descriptor) {
                log::error!("FunctionalityRegistry: Skipped static '{}': {e}", descriptor.name);
            }
        }
        registry
    }

    /// Adds `descriptor` to the catalog.
    ///
    /// Fails with [`CoreError::Conflict`] if its id is taken, leaving the
    /// registered descriptor intact.
    pub fn register(&mut self, descriptor: FunctionalityDescriptor) -> CoreResult<()> {
        if let Some(existing) = self.get(descriptor.id) {
            return Err(CoreError::Conflict(format!(
                "functionality {} is already registered as '{}'",
                descriptor.id, existing.name
            )));
        }
        self.descriptors.try_reserve(1)?;
        log::info!(
            "FunctionalityRegistry: Registered '{}' ({})",
            descriptor.name,
            descriptor.id
        );
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Removes a descriptor from the catalog.
    ///
    /// Simulations already built from it keep their copy of its hooks and
    /// are torn down normally; tearing them down remains the caller's job.
    pub fn deregister(&mut self, id: FunctionalityId) -> CoreResult<FunctionalityDescriptor> {
        let position = self
            .descriptors
            .iter()
            .position(|descriptor| descriptor.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("functionality {id} is not registered")))?;
        let descriptor = self.descriptors.remove(position);

        let live = self.live_instances.get(&id).copied().unwrap_or(0);
        if live > 0 {
            log::warn!(
                "FunctionalityRegistry: Deregistered '{}' while {live} simulations still use it",
                descriptor.name
            );
        } else {
            log::info!("FunctionalityRegistry: Deregistered '{}'", descriptor.name);
        }
        Ok(descriptor)
    }

    /// Looks a descriptor up by id.
    #[must_use]
    pub fn get(&self, id: FunctionalityId) -> Option<&FunctionalityDescriptor> {
        self.descriptors.iter().find(|descriptor| descriptor.id == id)
    }

    /// Every descriptor, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionalityDescriptor> + '_ {
        self.descriptors.iter()
    }

    /// Number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Number of simulations currently built from `id`.
    #[must_use]
    pub fn live_instances(&self, id: FunctionalityId) -> usize {
        self.live_instances.get(&id).copied().unwrap_or(0)
    }

    /// Runs every `on_create` hook against `context`, in registration order.
    ///
    /// If a hook fails, the functionalities already created are destroyed
    /// in reverse order and the error is returned; `context` is left
    /// without any functionality.
    pub fn instantiate(&mut self, context: &mut SimulationContext) -> CoreResult<()> {
        if context.has_functionalities() {
            return Err(CoreError::Conflict(
                "simulation is already instantiated".to_string(),
            ));
        }

        let mut created: Vec<FunctionalityDescriptor> = Vec::with_capacity(self.descriptors.len());
        for descriptor in &self.descriptors {
            if let Err(e) = (descriptor.on_create)(context) {
                log::error!(
                    "FunctionalityRegistry: '{}' failed to create: {e}",
                    descriptor.name
                );
                for done in created.iter().rev() {
                    (done.on_destroy)(context);
                }
                return Err(e);
            }
            created.push(*descriptor);
        }

        for descriptor in &created {
            *self.live_instances.entry(descriptor.id).or_insert(0) += 1;
        }
        log::debug!(
            "FunctionalityRegistry: Instantiated {} functionalities",
            created.len()
        );
        context.set_functionalities(created);
        Ok(())
    }

    /// Runs the `on_initialize` hooks of the functionalities `context` was
    /// built from. Does nothing if it is already initialized.
    ///
    /// On failure the hooks that already ran are undone in reverse order.
    pub fn initialize(&self, context: &mut SimulationContext) -> CoreResult<()> {
        if context.is_initialized() {
            return Ok(());
        }

        let functionalities = context.functionalities().to_vec();
        for (position, descriptor) in functionalities.iter().enumerate() {
            let Some(on_initialize) = descriptor.on_initialize else {
                continue;
            };
            if let Err(e) = on_initialize(context) {
                log::error!(
                    "FunctionalityRegistry: '{}' failed to initialize: {e}",
                    descriptor.name
                );
                Self::run_deinitialize(&functionalities[..position], context);
                return Err(e);
            }
        }
        context.set_initialized(true);
        Ok(())
    }

    /// Undoes [`initialize`](Self::initialize), in reverse order.
    pub fn deinitialize(&self, context: &mut SimulationContext) {
        if !context.is_initialized() {
            return;
        }
        let functionalities = context.functionalities().to_vec();
        Self::run_deinitialize(&functionalities, context);
        context.set_initialized(false);
    }

    fn run_deinitialize(descriptors: &[FunctionalityDescriptor], context: &mut SimulationContext) {
        for descriptor in descriptors.iter().rev() {
            if let Some(on_deinitialize) = descriptor.on_deinitialize {
                on_deinitialize(context);
            }
        }
    }

    /// Deinitializes `context` if needed, then destroys its functionalities
    /// in reverse creation order.
    pub fn teardown(&mut self, context: &mut SimulationContext) {
        self.deinitialize(context);
        let functionalities = context.take_functionalities();
        for descriptor in functionalities.iter().rev() {
            (descriptor.on_destroy)(context);
            if let Some(count) = self.live_instances.get_mut(&descriptor.id) {
                *count = count.saturating_sub(1);
            }
        }
        log::debug!(
            "FunctionalityRegistry: Tore down {} functionalities",
            functionalities.len()
        );
    }
}

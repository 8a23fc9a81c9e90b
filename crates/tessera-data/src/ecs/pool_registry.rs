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

//! A type-keyed registry of component pools.
//!
//! Domain modules register the pools for their component types when a
//! simulation is instantiated; systems fetch only the pools they need, and
//! the simulation commits all of them at the tick boundary.

use super::component::Component;
use super::component_pool::{AnyComponentPool, CommitSummary, ComponentPool};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use tessera_core::{CoreError, CoreResult, Id};

/// Component pools keyed by their component's [`TypeId`].
///
/// Pools are committed in registration order, which keeps tick results
/// reproducible.
#[derive(Default)]
pub struct ComponentPoolRegistry {
    pools: HashMap<TypeId, Box<dyn AnyComponentPool>>,
    order: Vec<TypeId>,
}

impl ComponentPoolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an empty pool for `T`.
    ///
    /// Fails with [`CoreError::Conflict`] if `T` already has one.
    pub fn register<T: Component>(&mut self) -> CoreResult<&ComponentPool<T>> {
        let key = TypeId::of::<T>();
        if self.pools.contains_key(&key) {
            return Err(CoreError::Conflict(format!(
                "component pool for {} is already registered",
                type_name::<T>()
            )));
        }
        self.pools.try_reserve(1)?;
        self.order.try_reserve(1)?;
        self.pools.insert(key, Box::new(ComponentPool::<T>::new()));
        self.order.push(key);
        log::debug!("ComponentPoolRegistry: Registered {}", type_name::<T>());
        self.get::<T>()
            .ok_or_else(|| CoreError::NotFound(type_name::<T>().to_string()))
    }

    /// Removes `T`'s pool and everything stored in it.
    pub fn unregister<T: Component>(&mut self) -> CoreResult<()> {
        let key = TypeId::of::<T>();
        if self.pools.remove(&key).is_none() {
            return Err(CoreError::NotFound(format!(
                "component pool for {}",
                type_name::<T>()
            )));
        }
        self.order.retain(|k| *k != key);
        log::debug!("ComponentPoolRegistry: Unregistered {}", type_name::<T>());
        Ok(())
    }

    /// The pool for `T`, if registered.
    #[must_use]
    pub fn get<T: Component>(&self) -> Option<&ComponentPool<T>> {
        self.pools
            .get(&TypeId::of::<T>())
            .and_then(|pool| pool.as_any().downcast_ref::<ComponentPool<T>>())
    }

    /// Like [`get`](Self::get), reporting a missing pool as an error.
    pub fn pool<T: Component>(&self) -> CoreResult<&ComponentPool<T>> {
        self.get::<T>().ok_or_else(|| {
            CoreError::NotFound(format!("component pool for {}", type_name::<T>()))
        })
    }

    /// Returns `true` if `T` has a pool.
    #[must_use]
    pub fn contains<T: Component>(&self) -> bool {
        self.pools.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns `true` if no pools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Iterates the pools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn AnyComponentPool> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.pools.get(key).map(|pool| pool.as_ref()))
    }

    /// Commits every pool, in registration order.
    pub fn commit_all(&self) -> CommitSummary {
        let mut total = CommitSummary::default();
        for pool in self.iter() {
            total += pool.commit_erased();
        }
        total
    }

    /// Stages removal of `id` from every pool holding it. Returns how many
    /// pools were affected.
    pub fn remove_entity(&self, id: Id) -> usize {
        self.iter().filter(|pool| pool.remove_entity(id)).count()
    }

    /// Drops staged mutations for `id` in every pool.
    pub fn discard_pending(&self, id: Id) {
        for pool in self.iter() {
            pool.discard_pending(id);
        }
    }
}

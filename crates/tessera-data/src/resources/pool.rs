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

//! The registry mapping resource identifiers to their records.

use super::handle::ResourceHandle;
use super::loader::ResourceLoader;
use super::record::{AnyRecord, ResourceRecord, UnloadRequest};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tessera_core::graph::dependency_order;
use tessera_core::{
    CoreError, CoreResult, Id, LoadEvent, LoadState, ResourceKind, ResourceType, TaskScheduler,
};

type Slots = HashMap<Id, Arc<dyn AnyRecord>>;

/// State shared by every clone of a [`ResourcePool`] and weakly referenced
/// by its records.
pub(crate) struct PoolShared {
    records: RwLock<Slots>,
    loaders: RwLock<HashMap<ResourceType, Box<dyn Any + Send + Sync>>>,
    dependencies: Mutex<HashMap<Id, Vec<Id>>>,
    scheduler: Arc<dyn TaskScheduler>,
    events: Mutex<Option<flume::Sender<LoadEvent>>>,
}

impl PoolShared {
    pub(crate) fn loader<K: ResourceKind>(&self) -> CoreResult<Arc<dyn ResourceLoader<K>>> {
        self.loaders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&K::TYPE)
            .and_then(|entry| entry.downcast_ref::<Arc<dyn ResourceLoader<K>>>())
            .cloned()
            .ok_or(CoreError::MissingLoader(K::TYPE))
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        let records: Vec<Arc<dyn AnyRecord>> = self
            .records
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, record)| record)
            .collect();
        if !records.is_empty() {
            log::debug!("ResourcePool: Tearing down {} records", records.len());
        }
        for record in records {
            record.destroy(self);
        }
    }
}

/// A point-in-time description of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    /// The resource identifier.
    pub id: Id,
    /// The resource type tag.
    pub resource_type: ResourceType,
    /// The load state when the entry was produced.
    pub state: LoadState,
    /// The handle count when the entry was produced.
    pub ref_count: usize,
}

impl RecordInfo {
    fn of(record: &dyn AnyRecord) -> Self {
        Self {
            id: record.id(),
            resource_type: record.resource_type(),
            state: record.state(),
            ref_count: record.ref_count(),
        }
    }
}

/// A pass over the records that were live when it was created, in
/// ascending id order. Each entry is read when it is reached.
pub struct RecordIter {
    inner: std::vec::IntoIter<Arc<dyn AnyRecord>>,
}

impl Iterator for RecordIter {
    type Item = RecordInfo;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|record| RecordInfo::of(record.as_ref()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Owns every resource record of a simulation.
///
/// Cloning a pool is cheap; all clones share the same slots, loader tables
/// and scheduler.
#[derive(Clone)]
pub struct ResourcePool {
    shared: Arc<PoolShared>,
}

impl ResourcePool {
    /// Creates an empty pool whose loads run on `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                records: RwLock::new(HashMap::new()),
                loaders: RwLock::new(HashMap::new()),
                dependencies: Mutex::new(HashMap::new()),
                scheduler,
                events: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<PoolShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn scheduler(&self) -> Arc<dyn TaskScheduler> {
        Arc::clone(&self.shared.scheduler)
    }

    fn lock_events(&self) -> MutexGuard<'_, Option<flume::Sender<LoadEvent>>> {
        self.shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_dependencies(&self) -> MutexGuard<'_, HashMap<Id, Vec<Id>>> {
        self.shared
            .dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends a [`LoadEvent`] to `sender` whenever a load settles.
    pub fn attach_events(&self, sender: flume::Sender<LoadEvent>) {
        *self.lock_events() = Some(sender);
    }

    pub(crate) fn publish(&self, event: LoadEvent) {
        if let Some(sender) = self.lock_events().as_ref() {
            if sender.send(event).is_err() {
                log::trace!("ResourcePool: load event dropped, receiver is gone");
            }
        }
    }

    // --- Loader tables ---

    /// Registers the loader table for `K`.
    ///
    /// Fails with [`CoreError::Conflict`] if `K` already has one.
    pub fn register_loader<K: ResourceKind>(
        &self,
        loader: Arc<dyn ResourceLoader<K>>,
    ) -> CoreResult<()> {
        let mut loaders = self
            .shared
            .loaders
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if loaders.contains_key(&K::TYPE) {
            return Err(CoreError::Conflict(format!(
                "a loader for '{}' is already registered",
                K::TYPE
            )));
        }
        loaders.try_reserve(1)?;
        loaders.insert(K::TYPE, Box::new(loader));
        log::info!("ResourcePool: Registered loader for '{}'", K::TYPE);
        Ok(())
    }

    /// Removes the loader table for `K`. Returns `false` if there was none.
    pub fn deregister_loader<K: ResourceKind>(&self) -> bool {
        let removed = self
            .shared
            .loaders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&K::TYPE)
            .is_some();
        if removed {
            log::info!("ResourcePool: Deregistered loader for '{}'", K::TYPE);
        }
        removed
    }

    /// Returns `true` if `K` has a loader table.
    #[must_use]
    pub fn has_loader<K: ResourceKind>(&self) -> bool {
        self.shared.loader::<K>().is_ok()
    }

    pub(crate) fn loader<K: ResourceKind>(&self) -> CoreResult<Arc<dyn ResourceLoader<K>>> {
        self.shared.loader::<K>()
    }

    // --- Slots ---

    fn typed<K: ResourceKind>(
        id: Id,
        record: &Arc<dyn AnyRecord>,
    ) -> CoreResult<Arc<ResourceRecord<K>>> {
        let found = record.resource_type();
        let mismatch = CoreError::TypeMismatch {
            id,
            expected: K::TYPE,
            found,
        };
        if found != K::TYPE {
            return Err(mismatch);
        }
        Arc::clone(record)
            .into_any()
            .downcast::<ResourceRecord<K>>()
            .map_err(|_| mismatch)
    }

    /// Returns a handle to `id`'s record, creating an empty
    /// [`LoadState::Unloaded`] record if there is none.
    ///
    /// Fails with [`CoreError::TypeMismatch`] if `id` holds a record of
    /// another type.
    pub fn get_or_create<K: ResourceKind>(&self, id: Id) -> CoreResult<ResourceHandle<K>> {
        if !id.is_valid() {
            return Err(CoreError::InvalidHandle(id));
        }
        if let Some(handle) = self.find::<K>(id)? {
            return Ok(handle);
        }

        let mut records = self
            .shared
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another thread may have created it between the two locks.
        if let Some(existing) = records.get(&id) {
            return Ok(ResourceHandle::acquire(Self::typed::<K>(id, existing)?));
        }
        records.try_reserve(1)?;
        let record = Arc::new(ResourceRecord::<K>::new(id, Arc::downgrade(&self.shared)));
        let erased: Arc<dyn AnyRecord> = record.clone();
        records.insert(id, erased);
        let handle = ResourceHandle::acquire(record);
        drop(records);

        log::trace!("ResourcePool: Created {} '{}'", id, K::TYPE);
        Ok(handle)
    }

    /// Creates (or fetches) `id`'s record and installs `create_info`.
    pub fn create_with_info<K: ResourceKind>(
        &self,
        id: Id,
        create_info: K::CreateInfo,
    ) -> CoreResult<ResourceHandle<K>> {
        let handle = self.get_or_create::<K>(id)?;
        handle.set_create_info(create_info)?;
        Ok(handle)
    }

    /// Looks `id` up without creating anything.
    pub fn find<K: ResourceKind>(&self, id: Id) -> CoreResult<Option<ResourceHandle<K>>> {
        let records = self
            .shared
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match records.get(&id) {
            Some(record) => Ok(Some(ResourceHandle::acquire(Self::typed::<K>(id, record)?))),
            None => Ok(None),
        }
    }

    /// Returns `true` if `id` has a record.
    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        self.shared
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Describes `id`'s record without taking a reference.
    #[must_use]
    pub fn info(&self, id: Id) -> Option<RecordInfo> {
        self.shared
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|record| RecordInfo::of(record.as_ref()))
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys `id`'s record if no handle refers to it and no load is in
    /// flight. Returns `true` if the record was destroyed by this call.
    pub fn destroy_if_unreferenced(&self, id: Id) -> bool {
        let removed = {
            let mut records = self
                .shared
                .records
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match records.get(&id) {
                Some(record)
                    if record.ref_count() == 0 && record.state() != LoadState::Loading =>
                {
                    records.remove(&id)
                }
                _ => None,
            }
        };

        // The slot lock is released first: destroy hooks may drop handles to
        // other records of this pool.
        match removed {
            Some(record) => {
                self.lock_dependencies().remove(&id);
                record.destroy(&self.shared);
                true
            }
            None => false,
        }
    }

    /// Starts a pass over every live record.
    ///
    /// Call again to restart; each pass reflects the records alive when it
    /// began.
    #[must_use]
    pub fn records(&self) -> RecordIter {
        let mut snapshot: Vec<Arc<dyn AnyRecord>> = self
            .shared
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        snapshot.sort_unstable_by_key(|record| record.id());
        RecordIter {
            inner: snapshot.into_iter(),
        }
    }

    /// Destroys up to `budget` unreferenced records whose destruction was
    /// deferred. Returns how many were destroyed.
    pub fn collect_garbage(&self, budget: usize) -> usize {
        let mut collected = 0;
        for info in self.records() {
            if collected >= budget {
                break;
            }
            if info.ref_count == 0
                && info.state != LoadState::Loading
                && self.destroy_if_unreferenced(info.id)
            {
                collected += 1;
            }
        }
        if collected > 0 {
            log::debug!("ResourcePool: Collected {collected} unreferenced records");
        }
        collected
    }

    /// Unloads every record. Returns the ids left loaded: those busy
    /// loading, and those in use whose unload was deferred.
    pub fn unload_all(&self) -> Vec<Id> {
        let snapshot: Vec<Arc<dyn AnyRecord>> = self
            .shared
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let busy: Vec<Id> = snapshot
            .iter()
            .filter(|record| {
                !matches!(
                    record.unload(),
                    Ok(UnloadRequest::Unloaded | UnloadRequest::AlreadyUnloaded)
                )
            })
            .map(|record| record.id())
            .collect();
        if !busy.is_empty() {
            log::warn!("ResourcePool: {} records were busy during unload_all", busy.len());
        }
        busy
    }

    // --- Dependencies ---

    /// Declares the resources `id` depends on, replacing any previous
    /// declaration.
    ///
    /// Fails with [`CoreError::Conflict`], leaving the graph unchanged, if
    /// the new edges close a cycle.
    pub fn register_dependencies(&self, id: Id, dependencies: Vec<Id>) -> CoreResult<()> {
        let mut graph = self.lock_dependencies();
        let previous = if dependencies.is_empty() {
            graph.remove(&id)
        } else {
            graph.try_reserve(1)?;
            graph.insert(id, dependencies)
        };

        if let Err(cycle) = dependency_order(&graph) {
            match previous {
                Some(previous) => graph.insert(id, previous),
                None => graph.remove(&id),
            };
            log::warn!(
                "ResourcePool: Rejected dependencies of {id}, {} resources would form a cycle",
                cycle.remaining.len()
            );
            return Err(CoreError::Conflict(format!(
                "dependencies of resource {id} form a cycle"
            )));
        }
        Ok(())
    }

    /// The dependencies declared for `id`.
    #[must_use]
    pub fn dependencies(&self, id: Id) -> Vec<Id> {
        self.lock_dependencies().get(&id).cloned().unwrap_or_default()
    }

    /// Every resource with declared dependencies, ordered so each one comes
    /// after what it depends on.
    pub fn load_order(&self) -> CoreResult<Vec<Id>> {
        dependency_order(&self.lock_dependencies())
            .map_err(|_| CoreError::Conflict("resource dependency graph has a cycle".to_string()))
    }
}

impl std::fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("records", &self.len())
            .finish()
    }
}

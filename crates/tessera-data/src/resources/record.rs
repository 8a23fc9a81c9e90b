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

//! A single resource slot and its load state machine.
//!
//! The load state and the reference count are the only fields written from
//! several threads at once. Both are atomics; the `Unloaded`/`Failed` to
//! `Loading` transition is a single compare-and-swap, and only the worker
//! running the load performs the transition out of `Loading`.
//!
//! A record also counts its *uses*: readers that hold the loaded data for
//! longer than a call. A normal unload waits for the use count to drop to
//! zero; an immediate unload does not.

use super::loader::{LoadContext, ResourceLoader};
use super::pool::{PoolShared, ResourcePool};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tessera_core::{
    CoreError, CoreResult, Id, LoadEvent, LoadFailure, LoadState, ResourceKind, ResourceType,
};

/// The outcome of asking a record to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRequest {
    /// A new load was scheduled.
    Started,
    /// A load was already in flight; the request joined it.
    AlreadyLoading,
    /// The data is already available.
    AlreadyLoaded,
}

/// The outcome of asking a record to unload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadRequest {
    /// The data was released, or a failure cleared.
    Unloaded,
    /// The data is in use; it is released when the last use ends.
    Deferred,
    /// There was nothing to unload.
    AlreadyUnloaded,
}

struct Slots<K: ResourceKind> {
    create_info: Option<Arc<K::CreateInfo>>,
    data: Option<Arc<K::Data>>,
    failure: Option<LoadFailure>,
    unload_pending: bool,
    destroyed: bool,
}

/// A typed resource slot owned by a [`ResourcePool`].
///
/// Records are only reachable through [`ResourceHandle`]s, which keep the
/// reference count.
///
/// [`ResourceHandle`]: super::ResourceHandle
pub struct ResourceRecord<K: ResourceKind> {
    id: Id,
    pool: Weak<PoolShared>,
    ref_count: AtomicUsize,
    use_count: AtomicUsize,
    state: AtomicU8,
    slots: Mutex<Slots<K>>,
    settled: Condvar,
}

impl<K: ResourceKind> ResourceRecord<K> {
    pub(crate) fn new(id: Id, pool: Weak<PoolShared>) -> Self {
        Self {
            id,
            pool,
            ref_count: AtomicUsize::new(0),
            use_count: AtomicUsize::new(0),
            state: AtomicU8::new(LoadState::Unloaded.as_u8()),
            slots: Mutex::new(Slots {
                create_info: None,
                data: None,
                failure: None,
                unload_pending: false,
                destroyed: false,
            }),
            settled: Condvar::new(),
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, Slots<K>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pool(&self) -> CoreResult<ResourcePool> {
        self.pool
            .upgrade()
            .map(ResourcePool::from_shared)
            .ok_or(CoreError::InvalidHandle(self.id))
    }

    /// The identifier of this resource.
    #[must_use]
    pub fn id(&self) -> Id {
        self.id
    }

    /// The type tag of this resource.
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        K::TYPE
    }

    /// The current load state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        LoadState::from_u8(self.state.load(Ordering::SeqCst)).unwrap_or(LoadState::Unloaded)
    }

    /// The number of live handles.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    /// The number of outstanding [`ResourceUse`](super::ResourceUse)s.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.use_count.load(Ordering::SeqCst)
    }

    /// Returns `true` while a normal unload waits for uses to end.
    #[must_use]
    pub fn unload_pending(&self) -> bool {
        self.lock_slots().unload_pending
    }

    /// The authoring payload, in any state.
    #[must_use]
    pub fn create_info(&self) -> Option<Arc<K::CreateInfo>> {
        self.lock_slots().create_info.clone()
    }

    /// The loaded data. Only present while [`LoadState::Loaded`].
    #[must_use]
    pub fn data(&self) -> Option<Arc<K::Data>> {
        self.lock_slots().data.clone()
    }

    /// The cause of the last failed load. Only present while
    /// [`LoadState::Failed`].
    #[must_use]
    pub fn failure(&self) -> Option<LoadFailure> {
        self.lock_slots().failure.clone()
    }

    /// Installs or replaces the create-info.
    ///
    /// The dependencies it declares are registered with the pool first; a
    /// dependency cycle fails with [`CoreError::Conflict`] and leaves the
    /// record untouched. Loads already in flight keep the create-info they
    /// started with.
    pub fn set_create_info(&self, create_info: K::CreateInfo) -> CoreResult<()> {
        self.set_shared_create_info(Arc::new(create_info))
    }

    /// Like [`set_create_info`](Self::set_create_info), for a create-info
    /// that is also kept elsewhere, such as an edit history. The loader's
    /// `destroy_create_info` still receives the replaced value.
    pub fn set_shared_create_info(&self, create_info: Arc<K::CreateInfo>) -> CoreResult<()> {
        let pool = self.pool()?;
        pool.register_dependencies(self.id, K::dependencies(&create_info))?;

        let previous = self.lock_slots().create_info.replace(create_info);
        if let Some(previous) = previous {
            if let Ok(loader) = pool.loader::<K>() {
                loader.destroy_create_info(previous);
            }
        }
        Ok(())
    }

    pub(crate) fn request_load(self: &Arc<Self>) -> CoreResult<LoadRequest> {
        self.start_load(false)
    }

    fn start_load(self: &Arc<Self>, refresh_create_info: bool) -> CoreResult<LoadRequest> {
        let pool = self.pool()?;
        let loader = pool.loader::<K>()?;
        if self.lock_slots().destroyed {
            return Err(CoreError::InvalidHandle(self.id));
        }

        let mut current = self.state();
        loop {
            match current {
                LoadState::Loaded => {
                    // Asking for the data again cancels a deferred unload.
                    self.lock_slots().unload_pending = false;
                    return Ok(LoadRequest::AlreadyLoaded);
                }
                LoadState::Loading => return Ok(LoadRequest::AlreadyLoading),
                LoadState::Unloaded | LoadState::Failed => {
                    match self.state.compare_exchange(
                        current.as_u8(),
                        LoadState::Loading.as_u8(),
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    ) {
                        Ok(_) => break,
                        Err(actual) => {
                            current = LoadState::from_u8(actual).unwrap_or(LoadState::Unloaded)
                        }
                    }
                }
            }
        }

        log::debug!("ResourceRecord: Loading {} '{}'", self.id, K::TYPE);
        let record = Arc::clone(self);
        let scheduler = pool.scheduler();
        scheduler.schedule(Box::new(move || {
            record.run_load(loader, pool, refresh_create_info)
        }));
        Ok(LoadRequest::Started)
    }

    pub(crate) fn request_reload(
        self: &Arc<Self>,
        refresh_create_info: bool,
    ) -> CoreResult<LoadRequest> {
        if self.use_count() > 0 {
            return Err(CoreError::Busy(self.id));
        }
        if self.unload_with(false)? == UnloadRequest::Deferred {
            return Err(CoreError::Busy(self.id));
        }
        self.start_load(refresh_create_info)
    }

    /// Drops the loaded data, or clears a failure, returning to
    /// [`LoadState::Unloaded`]. The create-info is kept.
    ///
    /// While the data is in use the unload is deferred until the last
    /// [`ResourceUse`](super::ResourceUse) ends. Fails with
    /// [`CoreError::Busy`] while a load is in flight.
    pub fn request_unload(&self) -> CoreResult<UnloadRequest> {
        self.unload_with(false)
    }

    /// Like [`request_unload`](Self::request_unload), but releases the
    /// data even while it is in use. Outstanding uses keep their own
    /// reference to it.
    pub fn request_unload_immediate(&self) -> CoreResult<UnloadRequest> {
        self.unload_with(true)
    }

    fn unload_with(&self, immediate: bool) -> CoreResult<UnloadRequest> {
        let data = {
            let mut slots = self.lock_slots();
            loop {
                let current = self.state();
                match current {
                    LoadState::Loading => return Err(CoreError::Busy(self.id)),
                    LoadState::Unloaded => return Ok(UnloadRequest::AlreadyUnloaded),
                    LoadState::Loaded | LoadState::Failed => {
                        if !immediate && current == LoadState::Loaded && self.use_count() > 0 {
                            if !slots.unload_pending {
                                slots.unload_pending = true;
                                log::debug!(
                                    "ResourceRecord: Deferred unload of {} '{}' ({} uses)",
                                    self.id,
                                    K::TYPE,
                                    self.use_count()
                                );
                            }
                            return Ok(UnloadRequest::Deferred);
                        }
                        if self
                            .state
                            .compare_exchange(
                                current.as_u8(),
                                LoadState::Unloaded.as_u8(),
                                Ordering::SeqCst,
                                Ordering::SeqCst,
                            )
                            .is_ok()
                        {
                            slots.failure = None;
                            slots.unload_pending = false;
                            break slots.data.take();
                        }
                    }
                }
            }
        };

        self.release_data(data);
        Ok(UnloadRequest::Unloaded)
    }

    fn release_data(&self, data: Option<Arc<K::Data>>) {
        if let Some(data) = data {
            match self.pool().and_then(|pool| pool.loader::<K>()) {
                Ok(loader) => loader.unload(data),
                Err(_) => drop(data),
            }
        }
        log::debug!("ResourceRecord: Unloaded {} '{}'", self.id, K::TYPE);
    }

    pub(crate) fn begin_use(&self) -> CoreResult<Arc<K::Data>> {
        let slots = self.lock_slots();
        if slots.unload_pending {
            return Err(CoreError::Busy(self.id));
        }
        let data = slots
            .data
            .clone()
            .ok_or_else(|| CoreError::NotFound(format!("resource {} is not loaded", self.id)))?;
        self.use_count.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    pub(crate) fn end_use(&self) {
        let data = {
            let mut slots = self.lock_slots();
            let previous = self.use_count.fetch_sub(1, Ordering::SeqCst);
            assert!(previous > 0, "ResourceRecord: use count underflow on {}", self.id);
            if previous > 1 || !slots.unload_pending {
                return;
            }
            slots.unload_pending = false;
            if self
                .state
                .compare_exchange(
                    LoadState::Loaded.as_u8(),
                    LoadState::Unloaded.as_u8(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_err()
            {
                return;
            }
            slots.data.take()
        };
        self.release_data(data);
    }

    /// Blocks until an in-flight load settles, then returns the data.
    ///
    /// Returns [`CoreError::LoadFailed`] for a failed load,
    /// [`CoreError::NotFound`] if the record is unloaded, and
    /// [`CoreError::Timeout`] if `timeout` elapses first.
    pub fn wait(&self, timeout: Duration) -> CoreResult<Arc<K::Data>> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.lock_slots();
        while self.state() == LoadState::Loading {
            let now = Instant::now();
            if now >= deadline {
                return Err(CoreError::Timeout(self.id));
            }
            let (guard, _) = self
                .settled
                .wait_timeout(slots, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slots = guard;
        }

        match self.state() {
            LoadState::Loaded => slots.data.clone().ok_or(CoreError::InvalidHandle(self.id)),
            LoadState::Failed => Err(CoreError::LoadFailed {
                id: self.id,
                cause: slots
                    .failure
                    .clone()
                    .unwrap_or_else(|| LoadFailure::new("unknown failure")),
            }),
            LoadState::Unloaded | LoadState::Loading => Err(CoreError::NotFound(format!(
                "resource {} is not loaded",
                self.id
            ))),
        }
    }

    fn run_load(
        self: Arc<Self>,
        loader: Arc<dyn ResourceLoader<K>>,
        pool: ResourcePool,
        refresh_create_info: bool,
    ) {
        let outcome = self
            .resolve_create_info(loader.as_ref(), &pool, refresh_create_info)
            .and_then(|create_info| {
                let context = LoadContext::new(self.id, pool.clone());
                panic::catch_unwind(AssertUnwindSafe(|| loader.load(&create_info, &context)))
                    .unwrap_or_else(|payload| Err(LoadFailure::from_panic(payload)))
            });
        self.settle(outcome, &pool);
    }

    fn resolve_create_info(
        &self,
        loader: &dyn ResourceLoader<K>,
        pool: &ResourcePool,
        refresh: bool,
    ) -> Result<Arc<K::CreateInfo>, LoadFailure> {
        let current = self.create_info();
        if let (Some(create_info), false) = (&current, refresh) {
            return Ok(Arc::clone(create_info));
        }

        let Some(imported) = loader.import_create_info(self.id) else {
            // A refresh with nothing to import keeps the create-info it had.
            return current.ok_or_else(|| LoadFailure::new("no create-info"));
        };
        pool.register_dependencies(self.id, K::dependencies(&imported))
            .map_err(|e| LoadFailure::new(e.to_string()))?;

        let imported = Arc::new(imported);
        let previous = self
            .lock_slots()
            .create_info
            .replace(Arc::clone(&imported));
        if let Some(previous) = previous {
            log::debug!(
                "ResourceRecord: Refreshed the create-info of {} '{}'",
                self.id,
                K::TYPE
            );
            loader.destroy_create_info(previous);
        }
        Ok(imported)
    }

    fn settle(&self, outcome: Result<K::Data, LoadFailure>, pool: &ResourcePool) {
        let event = {
            let mut slots = self.lock_slots();
            match outcome {
                Ok(data) => {
                    slots.data = Some(Arc::new(data));
                    slots.failure = None;
                    self.state.store(LoadState::Loaded.as_u8(), Ordering::SeqCst);
                    log::debug!("ResourceRecord: Loaded {} '{}'", self.id, K::TYPE);
                    LoadEvent {
                        id: self.id,
                        resource_type: K::TYPE,
                        state: LoadState::Loaded,
                        failure: None,
                    }
                }
                Err(failure) => {
                    log::warn!(
                        "ResourceRecord: {} '{}' failed to load: {failure}",
                        self.id,
                        K::TYPE
                    );
                    slots.failure = Some(failure.clone());
                    self.state.store(LoadState::Failed.as_u8(), Ordering::SeqCst);
                    LoadEvent {
                        id: self.id,
                        resource_type: K::TYPE,
                        state: LoadState::Failed,
                        failure: Some(failure),
                    }
                }
            }
        };
        self.settled.notify_all();
        pool.publish(event);

        // Every handle was dropped while the load ran.
        if self.ref_count() == 0 {
            pool.destroy_if_unreferenced(self.id);
        }
    }

    pub(crate) fn acquire(&self) {
        self.ref_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn release(&self) {
        if self.ref_count.fetch_sub(1, Ordering::SeqCst) == 1
            && self.state() != LoadState::Loading
        {
            if let Ok(pool) = self.pool() {
                pool.destroy_if_unreferenced(self.id);
            }
        }
    }
}

/// The type-erased view the pool keeps of every record.
pub(crate) trait AnyRecord: Send + Sync + 'static {
    fn id(&self) -> Id;
    fn resource_type(&self) -> ResourceType;
    fn state(&self) -> LoadState;
    fn ref_count(&self) -> usize;
    fn unload(&self) -> CoreResult<UnloadRequest>;
    /// Releases the payloads through the loader table. Called once, after
    /// the slot was removed from the pool.
    fn destroy(&self, pool: &PoolShared);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<K: ResourceKind> AnyRecord for ResourceRecord<K> {
    fn id(&self) -> Id {
        self.id
    }

    fn resource_type(&self) -> ResourceType {
        K::TYPE
    }

    fn state(&self) -> LoadState {
        ResourceRecord::state(self)
    }

    fn ref_count(&self) -> usize {
        ResourceRecord::ref_count(self)
    }

    fn unload(&self) -> CoreResult<UnloadRequest> {
        self.request_unload()
    }

    fn destroy(&self, pool: &PoolShared) {
        let (data, create_info) = {
            let mut slots = self.lock_slots();
            slots.destroyed = true;
            slots.failure = None;
            slots.unload_pending = false;
            (slots.data.take(), slots.create_info.take())
        };
        self.state
            .store(LoadState::Unloaded.as_u8(), Ordering::SeqCst);

        let loader = pool.loader::<K>().ok();
        if let Some(data) = data {
            match &loader {
                Some(loader) => loader.unload(data),
                None => drop(data),
            }
        }
        if let Some(create_info) = create_info {
            match &loader {
                Some(loader) => loader.destroy_create_info(create_info),
                None => drop(create_info),
            }
        }
        log::debug!("ResourceRecord: Destroyed {} '{}'", self.id, K::TYPE);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

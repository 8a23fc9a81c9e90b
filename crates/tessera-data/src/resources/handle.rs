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

use super::record::{LoadRequest, ResourceRecord};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tessera_core::{CoreResult, ResourceKind};

/// A counted reference to a resource record.
///
/// Cloning increments the record's reference count and dropping
/// decrements it. When the count reaches zero the pool destroys the
/// record, or defers that until an in-flight load completes.
pub struct ResourceHandle<K: ResourceKind> {
    record: Arc<ResourceRecord<K>>,
}

impl<K: ResourceKind> ResourceHandle<K> {
    /// Wraps a record, taking one reference. Callers must hold the pool's
    /// slot lock or already own a handle to the same record.
    pub(crate) fn acquire(record: Arc<ResourceRecord<K>>) -> Self {
        record.acquire();
        Self { record }
    }

    /// Schedules a load unless one is in flight or the data is loaded.
    ///
    /// Never blocks; observe completion through the record's state, the
    /// pool's event channel, or [`ResourceRecord::wait`].
    pub fn request_load(&self) -> CoreResult<LoadRequest> {
        self.record.request_load()
    }

    /// Unloads the data, if any, then schedules a fresh load.
    ///
    /// With `refresh_create_info` the load first asks the loader's
    /// `import_create_info` for the current authoring data and replaces the
    /// stored create-info with it. Fails with [`CoreError::Busy`] while the
    /// data is in use or a load is in flight.
    ///
    /// [`CoreError::Busy`]: tessera_core::CoreError::Busy
    pub fn request_reload(&self, refresh_create_info: bool) -> CoreResult<LoadRequest> {
        self.record.request_reload(refresh_create_info)
    }

    /// Borrows the loaded data, counting a use until the guard drops.
    ///
    /// A normal unload requested meanwhile waits for every use to end.
    /// Fails with [`CoreError::NotFound`] if the data is not loaded and
    /// with [`CoreError::Busy`] once an unload is waiting.
    ///
    /// [`CoreError::NotFound`]: tessera_core::CoreError::NotFound
    /// [`CoreError::Busy`]: tessera_core::CoreError::Busy
    pub fn begin_use(&self) -> CoreResult<ResourceUse<K>> {
        let data = self.record.begin_use()?;
        Ok(ResourceUse {
            handle: self.clone(),
            data,
        })
    }

    /// Returns `true` if both handles point at the same record.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl<K: ResourceKind> Clone for ResourceHandle<K> {
    fn clone(&self) -> Self {
        Self::acquire(Arc::clone(&self.record))
    }
}

impl<K: ResourceKind> Drop for ResourceHandle<K> {
    fn drop(&mut self) {
        self.record.release();
    }
}

impl<K: ResourceKind> Deref for ResourceHandle<K> {
    type Target = ResourceRecord<K>;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

/// A counted use of a resource's loaded data. See
/// [`ResourceHandle::begin_use`].
pub struct ResourceUse<K: ResourceKind> {
    handle: ResourceHandle<K>,
    data: Arc<K::Data>,
}

impl<K: ResourceKind> ResourceUse<K> {
    /// The handle this use keeps alive.
    #[must_use]
    pub fn handle(&self) -> &ResourceHandle<K> {
        &self.handle
    }
}

impl<K: ResourceKind> Deref for ResourceUse<K> {
    type Target = K::Data;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<K: ResourceKind> Drop for ResourceUse<K> {
    fn drop(&mut self) {
        self.handle.record.end_use();
    }
}

impl<K: ResourceKind> fmt::Debug for ResourceUse<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceUse")
            .field("id", &self.handle.id())
            .field("type", &K::TYPE)
            .finish()
    }
}

impl<K: ResourceKind> fmt::Debug for ResourceHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.record.id())
            .field("type", &K::TYPE)
            .field("state", &self.record.state())
            .field("ref_count", &self.record.ref_count())
            .field("use_count", &self.record.use_count())
            .finish()
    }
}

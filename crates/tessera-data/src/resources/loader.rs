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

use super::handle::ResourceHandle;
use super::pool::ResourcePool;
use std::sync::Arc;
use tessera_core::{CoreError, CoreResult, Id, LoadFailure, ResourceKind};

/// The loader function table of one resource type.
///
/// Loaders run on scheduler threads. They must not hold on to the
/// [`LoadContext`] past the call, and must not block on a resource that
/// depends on the one being loaded.
pub trait ResourceLoader<K: ResourceKind>: Send + Sync + 'static {
    /// Realizes the resource from its create-info.
    fn load(
        &self,
        create_info: &K::CreateInfo,
        context: &LoadContext,
    ) -> Result<K::Data, LoadFailure>;

    /// Releases loaded data when a record is unloaded or destroyed.
    fn unload(&self, data: Arc<K::Data>) {
        drop(data);
    }

    /// Releases buffers owned by a create-info. Called once when the record
    /// holding it is destroyed, and for every create-info it replaces.
    fn destroy_create_info(&self, create_info: Arc<K::CreateInfo>) {
        drop(create_info);
    }

    /// Supplies create-info for a record that was asked to load without
    /// any, for example by looking it up in an imported dataset.
    fn import_create_info(&self, _id: Id) -> Option<K::CreateInfo> {
        None
    }
}

/// What a loader may reach while a load runs.
pub struct LoadContext {
    id: Id,
    pool: ResourcePool,
}

impl LoadContext {
    pub(crate) fn new(id: Id, pool: ResourcePool) -> Self {
        Self { id, pool }
    }

    /// The resource being loaded.
    #[must_use]
    pub fn id(&self) -> Id {
        self.id
    }

    /// The pool owning the resource.
    #[must_use]
    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// A counted handle to a declared dependency.
    pub fn dependency<D: ResourceKind>(&self, id: Id) -> CoreResult<ResourceHandle<D>> {
        self.pool.find::<D>(id)?.ok_or(CoreError::InvalidHandle(id))
    }
}

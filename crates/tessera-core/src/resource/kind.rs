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

use crate::ecs::Id;
use std::fmt;

/// The runtime tag of a resource type.
///
/// Two tags are equal when both their numeric value and name match.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceType {
    value: u32,
    name: &'static str,
}

impl ResourceType {
    /// Creates a new tag.
    #[must_use]
    pub const fn new(value: u32, name: &'static str) -> Self {
        Self { value, name }
    }

    /// The numeric value of the tag.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// The human readable name of the tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceType({}:{})", self.value, self.name)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A resource type known to the substrate.
///
/// Implementors are usually zero-sized marker types owned by a domain
/// module:
///
/// ```rust
/// use tessera_core::{Id, ResourceKind, ResourceType};
///
/// struct Mesh;
///
/// struct MeshCreateInfo {
///     path: String,
///     material: Option<Id>,
/// }
///
/// impl ResourceKind for Mesh {
///     const TYPE: ResourceType = ResourceType::new(1, "mesh");
///     type CreateInfo = MeshCreateInfo;
///     type Data = Vec<[f32; 3]>;
///
///     fn dependencies(create_info: &MeshCreateInfo) -> Vec<Id> {
///         create_info.material.into_iter().collect()
///     }
/// }
/// ```
pub trait ResourceKind: Send + Sync + 'static {
    /// The tag stored in every record of this type.
    const TYPE: ResourceType;

    /// The authoring parameters the resource is built from.
    type CreateInfo: Send + Sync + 'static;

    /// The realized runtime form produced by the loader.
    type Data: Send + Sync + 'static;

    /// Resources that must be loadable before this one.
    ///
    /// The dependency graph must stay acyclic; registering a create-info
    /// that closes a cycle is rejected.
    fn dependencies(_create_info: &Self::CreateInfo) -> Vec<Id> {
        Vec::new()
    }
}

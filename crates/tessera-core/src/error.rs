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

//! The error taxonomy shared by every layer of the substrate.

use crate::ecs::Id;
use crate::resource::{LoadFailure, ResourceType};
use thiserror::Error;

/// A specialized `Result` type for substrate operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Every recoverable failure the identity and lifecycle layers report.
///
/// None of these are ever swallowed internally: they are returned to the
/// immediate caller, which decides whether to retry, roll back, or surface
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The identifier or record was never issued, or was already released.
    #[error("invalid handle {0}")]
    InvalidHandle(Id),

    /// A raw group value outside the 4-bit group range.
    #[error("invalid identifier group value {0}")]
    InvalidGroup(u8),

    /// A reservation, registration, or dependency edge collides with
    /// existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The identifier already denotes a resource of another type.
    #[error("resource {id} is a '{found}', not a '{expected}'")]
    TypeMismatch {
        /// The resource that was looked up.
        id: Id,
        /// The type the caller asked for.
        expected: ResourceType,
        /// The type actually stored under `id`.
        found: ResourceType,
    },

    /// A foreign identifier missing from a translation table.
    #[error("identifier {0} has no mapping in the translation table")]
    UnmappedIdentifier(Id),

    /// The resource has a load in flight.
    #[error("resource {0} is busy loading")]
    Busy(Id),

    /// A component value is already committed or pending for the entity.
    #[error("entity {0} already has a committed or pending component")]
    Duplicate(Id),

    /// The requested entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bookkeeping storage could not grow. Prior state is left intact.
    #[error("out of memory")]
    OutOfMemory,

    /// The loader reported a failure.
    #[error("loading resource {id} failed: {cause}")]
    LoadFailed {
        /// The resource whose load failed.
        id: Id,
        /// The cause reported by the loader.
        cause: LoadFailure,
    },

    /// No loader table is registered for the resource type.
    #[error("no loader registered for resource type '{0}'")]
    MissingLoader(ResourceType),

    /// An explicit wait elapsed before the load settled.
    #[error("timed out waiting for resource {0}")]
    Timeout(Id),
}

impl From<std::collections::TryReserveError> for CoreError {
    fn from(_: std::collections::TryReserveError) -> Self {
        CoreError::OutOfMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::IdGroup;

    const MESH: ResourceType = ResourceType::new(1, "mesh");
    const SHADER: ResourceType = ResourceType::new(2, "shader");

    #[test]
    fn test_messages_name_the_identifier() {
        let id = Id::new(IdGroup::PERSISTENT, 7);

        assert_eq!(
            CoreError::InvalidHandle(id).to_string(),
            "invalid handle 0xE0000007"
        );
        assert_eq!(
            CoreError::TypeMismatch {
                id,
                expected: MESH,
                found: SHADER,
            }
            .to_string(),
            "resource 0xE0000007 is a 'shader', not a 'mesh'"
        );
    }

    #[test]
    fn test_load_failure_carries_cause() {
        let err = CoreError::LoadFailed {
            id: Id::from_raw(1),
            cause: LoadFailure::new("file not found"),
        };
        assert_eq!(
            err.to_string(),
            "loading resource 0x00000001 failed: file not found"
        );
    }

    #[test]
    fn test_try_reserve_maps_to_out_of_memory() {
        let mut buffer: Vec<u64> = Vec::new();
        let err = buffer.try_reserve(usize::MAX).unwrap_err();
        assert_eq!(CoreError::from(err), CoreError::OutOfMemory);
    }
}

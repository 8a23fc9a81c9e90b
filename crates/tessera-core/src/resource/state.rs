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

use super::ResourceType;
use crate::ecs::Id;
use serde::Serialize;
use std::any::Any;
use std::fmt;

/// The position of a resource record in its load state machine.
///
/// `Unloaded -> Loading -> {Loaded, Failed}`, `Loaded -> Unloaded`,
/// `Failed -> Loading` for a retry and `Failed -> Unloaded` to clear it.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum LoadState {
    /// No loaded data. Create-info may or may not be present.
    Unloaded = 0,
    /// A load is in flight on the scheduler.
    Loading = 1,
    /// The loaded data is available.
    Loaded = 2,
    /// The last load failed. The create-info is kept for a retry.
    Failed = 3,
}

impl LoadState {
    /// Decodes a state stored in an atomic byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LoadState::Unloaded),
            1 => Some(LoadState::Loading),
            2 => Some(LoadState::Loaded),
            3 => Some(LoadState::Failed),
            _ => None,
        }
    }

    /// Encodes the state for storage in an atomic byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` for the two outcomes a load settles into.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::Failed)
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The cause reported by a loader when a load fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct LoadFailure {
    reason: String,
}

impl LoadFailure {
    /// Creates a failure with a human readable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Converts a panic payload caught around a loader into a failure.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::new(format!("loader panicked: {message}"))
    }

    /// The reason given by the loader.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Published once per settled load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadEvent {
    /// The resource whose load settled.
    pub id: Id,
    /// The type of the resource.
    pub resource_type: ResourceType,
    /// Either [`LoadState::Loaded`] or [`LoadState::Failed`].
    pub state: LoadState,
    /// The cause, when the load failed.
    pub failure: Option<LoadFailure>,
}

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

//! Names for the dynamic identifier groups of a simulation.

use std::sync::{PoisonError, RwLock};
use tessera_core::{CoreError, CoreResult, IdGroup};

const PERSISTENT_NAME: &str = "Persistent";
const TEMPORARY_NAME: &str = "Temporary";

/// Assigns the dynamic [`IdGroup`]s to named datasets.
///
/// The persistent and temporary groups are always present under their
/// reserved names.
#[derive(Debug, Default)]
pub struct GroupData {
    dynamic: RwLock<[Option<String>; IdGroup::DYNAMIC_COUNT as usize]>,
}

impl GroupData {
    /// Creates a table with every dynamic group free.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the lowest free dynamic group for `name`.
    pub fn add_dynamic_group(&self, name: &str) -> CoreResult<IdGroup> {
        if name == PERSISTENT_NAME || name == TEMPORARY_NAME {
            return Err(CoreError::Conflict(format!("group name '{name}' is reserved")));
        }
        let mut slots = self.dynamic.write().unwrap_or_else(PoisonError::into_inner);
        if slots.iter().flatten().any(|existing| existing == name) {
            return Err(CoreError::Conflict(format!("group '{name}' already exists")));
        }
        let (ordinal, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(CoreError::OutOfMemory)?;
        *slot = Some(name.to_string());

        let group = IdGroup::dynamic(ordinal as u8).ok_or(CoreError::OutOfMemory)?;
        log::info!("GroupData: Assigned {group} to '{name}'");
        Ok(group)
    }

    /// Frees a dynamic group so it can be reassigned.
    pub fn remove_dynamic_group(&self, group: IdGroup) -> CoreResult<String> {
        if !group.is_dynamic() {
            return Err(CoreError::Conflict(format!("{group} is not a dynamic group")));
        }
        let mut slots = self.dynamic.write().unwrap_or_else(PoisonError::into_inner);
        slots[group.value() as usize]
            .take()
            .ok_or_else(|| CoreError::NotFound(format!("dynamic group {group}")))
    }

    /// Resolves a group from its name, including the reserved ones.
    #[must_use]
    pub fn group_by_name(&self, name: &str) -> Option<IdGroup> {
        match name {
            PERSISTENT_NAME => Some(IdGroup::PERSISTENT),
            TEMPORARY_NAME => Some(IdGroup::TEMPORARY),
            _ => {
                let slots = self.dynamic.read().unwrap_or_else(PoisonError::into_inner);
                slots
                    .iter()
                    .position(|slot| slot.as_deref() == Some(name))
                    .and_then(|ordinal| IdGroup::dynamic(ordinal as u8))
            }
        }
    }

    /// The name a group is known by.
    #[must_use]
    pub fn name_of(&self, group: IdGroup) -> Option<String> {
        match group {
            IdGroup::PERSISTENT => Some(PERSISTENT_NAME.to_string()),
            IdGroup::TEMPORARY => Some(TEMPORARY_NAME.to_string()),
            _ => {
                let slots = self.dynamic.read().unwrap_or_else(PoisonError::into_inner);
                slots.get(group.value() as usize).cloned().flatten()
            }
        }
    }
}

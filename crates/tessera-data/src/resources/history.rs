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

use std::collections::HashMap;
use tessera_core::{CoreError, CoreResult, Id};

struct Versions<C> {
    entries: Vec<C>,
    cursor: usize,
}

/// Versioned create-info per resource, for editing tools.
///
/// Each resource keeps a linear list of versions and a cursor. Pushing a new
/// version discards everything after the cursor.
pub struct CreateInfoHistory<C> {
    resources: HashMap<Id, Versions<C>>,
}

impl<C> Default for CreateInfoHistory<C> {
    fn default() -> Self {
        Self {
            resources: HashMap::new(),
        }
    }
}

impl<C> CreateInfoHistory<C> {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `id` with `create_info` as its first version.
    pub fn add(&mut self, id: Id, create_info: C) -> CoreResult<()> {
        if self.resources.contains_key(&id) {
            return Err(CoreError::Conflict(format!(
                "resource {id} already has a create-info history"
            )));
        }
        self.resources.try_reserve(1)?;
        self.resources.insert(
            id,
            Versions {
                entries: vec![create_info],
                cursor: 0,
            },
        );
        Ok(())
    }

    /// Stops tracking `id`, returning its current version.
    pub fn remove(&mut self, id: Id) -> CoreResult<C> {
        let mut versions = self
            .resources
            .remove(&id)
            .ok_or_else(|| CoreError::NotFound(format!("no create-info history for {id}")))?;
        Ok(versions.entries.swap_remove(versions.cursor))
    }

    /// The version under the cursor.
    #[must_use]
    pub fn current(&self, id: Id) -> Option<&C> {
        self.resources
            .get(&id)
            .and_then(|versions| versions.entries.get(versions.cursor))
    }

    /// Records a new version of `id`, dropping any undone versions.
    pub fn push(&mut self, id: Id, create_info: C) -> CoreResult<()> {
        let versions = self
            .resources
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("no create-info history for {id}")))?;
        versions.entries.truncate(versions.cursor + 1);
        versions.entries.try_reserve(1)?;
        versions.entries.push(create_info);
        versions.cursor += 1;
        Ok(())
    }

    /// Steps back one version. Returns `false` at the oldest version or if
    /// `id` is untracked.
    pub fn undo(&mut self, id: Id) -> bool {
        match self.resources.get_mut(&id) {
            Some(versions) if versions.cursor > 0 => {
                versions.cursor -= 1;
                true
            }
            _ => false,
        }
    }

    /// Steps forward one version. Returns `false` at the newest version or
    /// if `id` is untracked.
    pub fn redo(&mut self, id: Id) -> bool {
        match self.resources.get_mut(&id) {
            Some(versions) if versions.cursor + 1 < versions.entries.len() => {
                versions.cursor += 1;
                true
            }
            _ => false,
        }
    }

    /// Number of tracked resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if no resource is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

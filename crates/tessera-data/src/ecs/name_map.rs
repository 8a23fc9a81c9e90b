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

//! Human readable names for identifiers, for tooling and diagnostics.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tessera_core::{CoreError, CoreResult, Id};

#[derive(Debug, Default)]
struct Names {
    by_id: HashMap<Id, String>,
    by_name: HashMap<String, Id>,
}

/// A bidirectional, thread-safe `Id` <-> name map.
///
/// Both directions are unique: an identifier has at most one name and a
/// name denotes at most one identifier.
#[derive(Debug, Default)]
pub struct EditorNameMap {
    names: RwLock<Names>,
}

impl EditorNameMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names `id`.
    pub fn add(&self, id: Id, name: &str) -> CoreResult<()> {
        if id == Id::INVALID {
            return Err(CoreError::InvalidHandle(id));
        }
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        if names.by_id.contains_key(&id) {
            return Err(CoreError::Conflict(format!("{id} is already named")));
        }
        if names.by_name.contains_key(name) {
            return Err(CoreError::Conflict(format!("name '{name}' is taken")));
        }
        names.by_id.try_reserve(1)?;
        names.by_name.try_reserve(1)?;
        names.by_id.insert(id, name.to_string());
        names.by_name.insert(name.to_string(), id);
        Ok(())
    }

    /// Renames `id`. Fails with [`CoreError::NotFound`] if it has no name,
    /// or [`CoreError::Conflict`] if `name` belongs to another identifier.
    pub fn update(&self, id: Id, name: &str) -> CoreResult<()> {
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        match names.by_name.get(name) {
            Some(&owner) if owner == id => return Ok(()),
            Some(_) => return Err(CoreError::Conflict(format!("name '{name}' is taken"))),
            None => {}
        }
        let previous = names
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("name for {id}")))?;
        names.by_name.remove(&previous);
        names.by_id.insert(id, name.to_string());
        names.by_name.insert(name.to_string(), id);
        Ok(())
    }

    /// Forgets `id`'s name, returning it.
    pub fn remove(&self, id: Id) -> Option<String> {
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        let name = names.by_id.remove(&id)?;
        names.by_name.remove(&name);
        Some(name)
    }

    /// The identifier named `name`.
    #[must_use]
    pub fn find_id(&self, name: &str) -> Option<Id> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        names.by_name.get(name).copied()
    }

    /// The name of `id`.
    #[must_use]
    pub fn find_name(&self, id: Id) -> Option<String> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        names.by_id.get(&id).cloned()
    }

    /// Number of named identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    /// Returns `true` if nothing is named.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::IdGroup;

    #[test]
    fn test_both_directions() {
        let map = EditorNameMap::new();
        let id = Id::new(IdGroup::PERSISTENT, 1);
        map.add(id, "player").unwrap();

        assert_eq!(map.find_id("player"), Some(id));
        assert_eq!(map.find_name(id).as_deref(), Some("player"));
    }

    #[test]
    fn test_uniqueness() {
        let map = EditorNameMap::new();
        let a = Id::new(IdGroup::PERSISTENT, 1);
        let b = Id::new(IdGroup::PERSISTENT, 2);
        map.add(a, "camera").unwrap();

        assert!(matches!(map.add(b, "camera"), Err(CoreError::Conflict(_))));
        assert!(matches!(map.add(a, "other"), Err(CoreError::Conflict(_))));
        assert_eq!(
            map.add(Id::INVALID, "ghost"),
            Err(CoreError::InvalidHandle(Id::INVALID))
        );
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_update_and_remove() {
        let map = EditorNameMap::new();
        let a = Id::new(IdGroup::TEMPORARY, 3);
        let b = Id::new(IdGroup::TEMPORARY, 4);
        map.add(a, "light").unwrap();
        map.add(b, "sun").unwrap();

        map.update(a, "lamp").unwrap();
        assert_eq!(map.find_id("light"), None);
        assert_eq!(map.find_id("lamp"), Some(a));
        assert!(matches!(map.update(a, "sun"), Err(CoreError::Conflict(_))));
        assert!(matches!(
            map.update(Id::new(IdGroup::TEMPORARY, 9), "x"),
            Err(CoreError::NotFound(_))
        ));
        assert_eq!(map.find_id("x"), None);

        assert_eq!(map.remove(a).as_deref(), Some("lamp"));
        assert!(map.find_id("lamp").is_none());
        assert!(map.remove(a).is_none());
    }
}

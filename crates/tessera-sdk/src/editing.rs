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

//! Versioned create-info edits for live resources.
//!
//! Editing tools change a resource's authoring data one version at a time.
//! Every edit is installed on the record right away; undo and redo move
//! through the recorded versions and reinstall the one they land on. A
//! reload picks the installed version up.

use crate::simulation::SimulationContext;
use std::any::{Any, TypeId};
use std::sync::Arc;
use tessera_core::{CoreError, CoreResult, Id, ResourceId, ResourceKind};
use tessera_data::resources::{CreateInfoHistory, ResourceHandle};

/// The type-erased view the context keeps of each resource type's history.
pub(crate) trait AnyCreateInfoHistory: Send + Sync {
    /// Drops every version of `id`. Returns `false` if it had none.
    fn forget(&mut self, id: Id) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Send + Sync + 'static> AnyCreateInfoHistory for CreateInfoHistory<C> {
    fn forget(&mut self, id: Id) -> bool {
        self.remove(id).is_ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type Versions<K> = CreateInfoHistory<Arc<<K as ResourceKind>::CreateInfo>>;

impl SimulationContext {
    /// Installs `create_info` on resource `id` and records it as a new
    /// version, dropping any undone versions.
    ///
    /// The first edit of a resource also records the create-info it had
    /// before, so it can be undone. Fails with [`CoreError::InvalidHandle`]
    /// if the resource does not exist, and with [`CoreError::Conflict`] if
    /// the new create-info closes a dependency cycle; the record and its
    /// history are unchanged then.
    pub fn edit_create_info<K: ResourceKind>(
        &mut self,
        id: ResourceId,
        create_info: K::CreateInfo,
    ) -> CoreResult<()> {
        let handle: ResourceHandle<K> = self.resource(id)?;
        let previous = handle.create_info();
        let create_info = Arc::new(create_info);
        handle.set_shared_create_info(Arc::clone(&create_info))?;

        let history = self.history_mut::<K>()?;
        if history.current(id).is_none() {
            match previous {
                Some(previous) => {
                    history.add(id, previous)?;
                    history.push(id, create_info)?;
                }
                None => history.add(id, create_info)?,
            }
        } else {
            history.push(id, create_info)?;
        }
        log::debug!("SimulationContext: Recorded a create-info edit of {id}");
        Ok(())
    }

    /// Reinstalls the previous version of `id`'s create-info. Returns
    /// `false` at the oldest version or if `id` was never edited.
    pub fn undo_create_info<K: ResourceKind>(&mut self, id: ResourceId) -> CoreResult<bool> {
        self.step_create_info::<K>(id, Step::Back)
    }

    /// Reinstalls the next version of `id`'s create-info. Returns `false`
    /// at the newest version or if `id` was never edited.
    pub fn redo_create_info<K: ResourceKind>(&mut self, id: ResourceId) -> CoreResult<bool> {
        self.step_create_info::<K>(id, Step::Forward)
    }

    /// The recorded version `id` currently sits on, if it was ever edited.
    #[must_use]
    pub fn edited_create_info<K: ResourceKind>(
        &self,
        id: ResourceId,
    ) -> Option<Arc<K::CreateInfo>> {
        self.create_info_histories
            .get(&TypeId::of::<K>())
            .and_then(|history| history.as_any().downcast_ref::<Versions<K>>())
            .and_then(|history| history.current(id))
            .cloned()
    }

    /// Drops the recorded versions of `id`, whatever its type.
    pub(crate) fn forget_create_info(&mut self, id: ResourceId) {
        for history in self.create_info_histories.values_mut() {
            if history.forget(id) {
                log::trace!("SimulationContext: Dropped the create-info history of {id}");
            }
        }
    }

    fn step_create_info<K: ResourceKind>(
        &mut self,
        id: ResourceId,
        step: Step,
    ) -> CoreResult<bool> {
        let handle: ResourceHandle<K> = self.resource(id)?;
        let history = self.history_mut::<K>()?;
        let moved = match step {
            Step::Back => history.undo(id),
            Step::Forward => history.redo(id),
        };
        let Some(current) = history.current(id).filter(|_| moved).cloned() else {
            return Ok(false);
        };

        if let Err(e) = handle.set_shared_create_info(current) {
            // Put the cursor back on the version the record still holds.
            match step {
                Step::Back => history.redo(id),
                Step::Forward => history.undo(id),
            };
            return Err(e);
        }
        Ok(true)
    }

    fn history_mut<K: ResourceKind>(&mut self) -> CoreResult<&mut Versions<K>> {
        self.create_info_histories
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Box::new(Versions::<K>::new()))
            .as_any_mut()
            .downcast_mut::<Versions<K>>()
            .ok_or_else(|| {
                CoreError::Conflict(format!(
                    "create-info history of '{}' has another type",
                    K::TYPE
                ))
            })
    }
}

#[derive(Clone, Copy)]
enum Step {
    Back,
    Forward,
}

#[cfg(test)]
mod tests {
    use crate::{SimulationConfig, SimulationContext};
    use std::sync::Arc;
    use tessera_core::{CoreError, Id, IdGroup, LoadFailure, ResourceKind, ResourceType};
    use tessera_data::resources::{LoadContext, ResourceLoader};

    struct Sprite;
    impl ResourceKind for Sprite {
        const TYPE: ResourceType = ResourceType::new(9, "sprite");
        type CreateInfo = String;
        type Data = usize;
    }

    struct SpriteLoader;
    impl ResourceLoader<Sprite> for SpriteLoader {
        fn load(&self, path: &String, _context: &LoadContext) -> Result<usize, LoadFailure> {
            Ok(path.len())
        }
    }

    fn context() -> SimulationContext {
        let context = SimulationContext::inline(SimulationConfig::default());
        context
            .resources()
            .register_loader::<Sprite>(Arc::new(SpriteLoader))
            .unwrap();
        context
    }

    #[test]
    fn test_edits_undo_and_redo_through_the_record() {
        // --- 1. ARRANGE ---
        let mut context = context();
        let handle = context
            .create_resource::<Sprite>(IdGroup::PERSISTENT, "hero.png".to_string())
            .unwrap();
        let id = handle.id();
        context.retain_resource(handle.clone()).unwrap();

        // --- 2. ACT ---
        context
            .edit_create_info::<Sprite>(id, "hero_v2.png".to_string())
            .unwrap();
        handle.request_reload(false).unwrap();
        let edited = handle.data();
        let undone = context.undo_create_info::<Sprite>(id).unwrap();

        // --- 3. ASSERT ---
        assert_eq!(edited.as_deref(), Some(&"hero_v2.png".len()));
        assert!(undone);
        assert_eq!(handle.create_info().as_deref(), Some(&"hero.png".to_string()));
        assert!(
            !context.undo_create_info::<Sprite>(id).unwrap(),
            "The original create-info is the oldest version"
        );
        assert!(context.redo_create_info::<Sprite>(id).unwrap());
        assert_eq!(handle.create_info().as_deref(), Some(&"hero_v2.png".to_string()));
        assert_eq!(
            context.edited_create_info::<Sprite>(id).as_deref(),
            Some(&"hero_v2.png".to_string())
        );
    }

    #[test]
    fn test_destroying_a_resource_drops_its_history() {
        let mut context = context();
        let handle = context
            .create_resource::<Sprite>(IdGroup::PERSISTENT, "tree.png".to_string())
            .unwrap();
        let id = handle.id();
        context.retain_resource(handle).unwrap();
        context
            .edit_create_info::<Sprite>(id, "pine.png".to_string())
            .unwrap();

        context.destroy_resource(id).unwrap();

        assert!(context.edited_create_info::<Sprite>(id).is_none());
        assert!(!context.resources().contains(id));
    }

    #[test]
    fn test_editing_an_unknown_resource_fails() {
        let mut context = context();
        let missing = Id::new(IdGroup::PERSISTENT, 40);

        assert_eq!(
            context.edit_create_info::<Sprite>(missing, "x.png".to_string()),
            Err(CoreError::InvalidHandle(missing))
        );
        assert!(context.edited_create_info::<Sprite>(missing).is_none());
    }
}

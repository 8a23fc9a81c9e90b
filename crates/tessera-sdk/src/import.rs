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

//! Merging foreign datasets into a simulation, and reading groups back out.
//!
//! An import allocates a named dynamic group, translates every identifier
//! the dataset references into it, then lets the [`Importer`] stage
//! components and define resources through an [`ImportScope`]. Either all
//! of it lands or none of it does.

use crate::simulation::{RetainedHandle, SimulationContext};
use std::collections::BTreeSet;
use std::sync::Arc;
use tessera_core::{CoreError, CoreResult, EntityId, Id, IdGroup, ResourceId, ResourceKind};
use tessera_data::ecs::{Component, GroupTranslator, IndexState, TranslationMode, TranslationTable};
use tessera_data::resources::{RecordInfo, ResourceHandle};

/// A source of foreign entities and resource definitions.
pub trait Importer {
    /// The name the imported group is registered under.
    fn dataset_name(&self) -> &str;

    /// The group every foreign identifier of the dataset belongs to.
    fn source_group(&self) -> IdGroup;

    /// Whether imported identifiers get fresh indices or keep their own.
    fn translation_mode(&self) -> TranslationMode {
        TranslationMode::Fresh
    }

    /// Every foreign entity identifier the dataset refers to.
    fn referenced_entities(&self) -> Vec<Id>;

    /// Every foreign resource identifier the dataset refers to.
    fn referenced_resources(&self) -> Vec<Id> {
        Vec::new()
    }

    /// Stages the dataset's content.
    fn import(&self, scope: &mut ImportScope<'_>) -> CoreResult<()>;
}

/// Summary of a successful import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    /// The group the dataset now lives in.
    pub group: IdGroup,
    /// Entities allocated.
    pub entities: usize,
    /// Resources defined.
    pub resources: usize,
    /// Component values staged. They become visible at the next
    /// maintenance.
    pub components: usize,
}

/// The staging area handed to an [`Importer`].
pub struct ImportScope<'a> {
    context: &'a SimulationContext,
    group: IdGroup,
    entities: TranslationTable,
    resources: TranslationTable,
    touched: BTreeSet<EntityId>,
    defined: Vec<(ResourceId, RetainedHandle)>,
    named_entities: Vec<EntityId>,
    named_resources: Vec<ResourceId>,
    components: usize,
}

impl ImportScope<'_> {
    /// The group the dataset is imported into.
    #[must_use]
    pub fn group(&self) -> IdGroup {
        self.group
    }

    /// The simulation being imported into.
    #[must_use]
    pub fn context(&self) -> &SimulationContext {
        self.context
    }

    /// The live identifier of a foreign entity.
    pub fn entity(&self, foreign: Id) -> CoreResult<EntityId> {
        self.entities.translate(foreign)
    }

    /// The live identifier of a foreign resource.
    pub fn resource(&self, foreign: Id) -> CoreResult<ResourceId> {
        self.resources.translate(foreign)
    }

    /// Stages a component value for a foreign entity.
    pub fn insert_component<T: Component>(&mut self, foreign: Id, value: T) -> CoreResult<()> {
        let id = self.entity(foreign)?;
        if id == Id::INVALID {
            return Err(CoreError::InvalidHandle(foreign));
        }
        self.context.components.pool::<T>()?.insert(id, value)?;
        self.touched.insert(id);
        self.components += 1;
        Ok(())
    }

    /// Creates the record of a foreign resource with its create-info. The
    /// context keeps it alive once the import succeeds.
    pub fn define_resource<K: ResourceKind>(
        &mut self,
        foreign: Id,
        create_info: K::CreateInfo,
    ) -> CoreResult<ResourceHandle<K>> {
        let id = self.resource(foreign)?;
        if id == Id::INVALID {
            return Err(CoreError::InvalidHandle(foreign));
        }
        self.defined.try_reserve(1)?;
        let handle = self.context.resources.create_with_info::<K>(id, create_info)?;
        self.defined.push((id, Box::new(handle.clone())));
        Ok(handle)
    }

    /// Names a foreign entity in the editor name map.
    pub fn name_entity(&mut self, foreign: Id, name: &str) -> CoreResult<()> {
        let id = self.entity(foreign)?;
        if let Some(names) = &self.context.entity_names {
            names.add(id, name)?;
            self.named_entities.push(id);
        }
        Ok(())
    }

    /// Names a foreign resource in the editor name map.
    pub fn name_resource(&mut self, foreign: Id, name: &str) -> CoreResult<()> {
        let id = self.resource(foreign)?;
        if let Some(names) = &self.context.resource_names {
            names.add(id, name)?;
            self.named_resources.push(id);
        }
        Ok(())
    }

    fn finish(self) -> (ImportReport, Vec<(ResourceId, RetainedHandle)>) {
        let report = ImportReport {
            group: self.group,
            entities: self.entities.len(),
            resources: self.resources.len(),
            components: self.components,
        };
        (report, self.defined)
    }

    /// Undoes everything staged. Returns resource ids whose records are
    /// still referenced elsewhere and so cannot be recycled yet.
    fn abort(mut self) -> Vec<ResourceId> {
        let context = self.context;
        for &id in &self.touched {
            context.components.discard_pending(id);
        }
        if let Some(names) = &context.entity_names {
            for &id in &self.named_entities {
                names.remove(id);
            }
        }
        if let Some(names) = &context.resource_names {
            for &id in &self.named_resources {
                names.remove(id);
            }
        }
        drop(std::mem::take(&mut self.defined));
        self.entities.rollback(&context.entity_ids);

        let mut lingering = Vec::new();
        for (_, id) in self.resources.iter() {
            if context.resources.contains(id) {
                lingering.push(id);
            } else if let Err(e) = context.resource_ids.release(id) {
                log::warn!("ImportScope: Could not recycle resource {id}: {e}");
            }
        }
        lingering
    }
}

/// A consumer of one group's content.
pub trait Exporter {
    /// Reads the group through `scope`.
    fn export(&mut self, scope: &ExportScope<'_>) -> CoreResult<()>;
}

/// Read access to one group of a simulation.
pub struct ExportScope<'a> {
    context: &'a SimulationContext,
    group: IdGroup,
}

impl ExportScope<'_> {
    /// The group being exported.
    #[must_use]
    pub fn group(&self) -> IdGroup {
        self.group
    }

    /// The group's registered name, if it is a named dynamic group.
    #[must_use]
    pub fn group_name(&self) -> Option<String> {
        self.context.groups.name_of(self.group)
    }

    /// The live entities of the group, ascending.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        self.context.entity_ids.live_ids(self.group)
    }

    /// The live resource identifiers of the group, ascending.
    #[must_use]
    pub fn resources(&self) -> Vec<ResourceId> {
        self.context.resource_ids.live_ids(self.group)
    }

    /// The committed `T` value of an entity.
    #[must_use]
    pub fn component<T: Component>(&self, id: EntityId) -> Option<Arc<T>> {
        self.context.components.get::<T>()?.get(id)
    }

    /// A handle to one of the group's resources.
    pub fn resource<K: ResourceKind>(&self, id: ResourceId) -> CoreResult<ResourceHandle<K>> {
        self.context.resource::<K>(id)
    }

    /// The state of one of the group's resources.
    #[must_use]
    pub fn resource_info(&self, id: ResourceId) -> Option<RecordInfo> {
        self.context.resources.info(id)
    }

    /// An entity's editor name.
    #[must_use]
    pub fn entity_name(&self, id: EntityId) -> Option<String> {
        self.context.entity_names.as_ref()?.find_name(id)
    }

    /// A resource's editor name.
    #[must_use]
    pub fn resource_name(&self, id: ResourceId) -> Option<String> {
        self.context.resource_names.as_ref()?.find_name(id)
    }

    /// The entity index bookkeeping of the group.
    #[must_use]
    pub fn entity_index_state(&self) -> IndexState {
        self.context.entity_ids.export_state(self.group)
    }

    /// The resource index bookkeeping of the group.
    #[must_use]
    pub fn resource_index_state(&self) -> IndexState {
        self.context.resource_ids.export_state(self.group)
    }
}

impl SimulationContext {
    /// Imports a dataset into a new dynamic group named after it.
    ///
    /// On failure the group is released, translated identifiers are
    /// recycled, staged components are discarded and defined resources are
    /// dropped.
    pub fn import(&mut self, importer: &dyn Importer) -> CoreResult<ImportReport> {
        let group = self.groups.add_dynamic_group(importer.dataset_name())?;
        let translator = GroupTranslator::new(importer.source_group(), group)
            .with_mode(importer.translation_mode());

        let mut entities =
            match translator.build(&self.entity_ids, importer.referenced_entities()) {
                Ok(table) => table,
                Err(e) => {
                    self.forget_group(group);
                    return Err(e);
                }
            };
        let resources =
            match translator.build(&self.resource_ids, importer.referenced_resources()) {
                Ok(table) => table,
                Err(e) => {
                    entities.rollback(&self.entity_ids);
                    self.forget_group(group);
                    return Err(e);
                }
            };

        let mut scope = ImportScope {
            context: self,
            group,
            entities,
            resources,
            touched: BTreeSet::new(),
            defined: Vec::new(),
            named_entities: Vec::new(),
            named_resources: Vec::new(),
            components: 0,
        };

        match importer.import(&mut scope) {
            Ok(()) => {
                let (report, defined) = scope.finish();
                self.retained.extend(defined);
                log::info!(
                    "SimulationContext: Imported '{}' into {group}: {} entities, {} resources",
                    importer.dataset_name(),
                    report.entities,
                    report.resources
                );
                Ok(report)
            }
            Err(e) => {
                let lingering = scope.abort();
                self.doomed_resources.extend(lingering);
                self.forget_group(group);
                log::warn!(
                    "SimulationContext: Import of '{}' rolled back: {e}",
                    importer.dataset_name()
                );
                Err(e)
            }
        }
    }

    fn forget_group(&self, group: IdGroup) {
        if let Err(e) = self.groups.remove_dynamic_group(group) {
            log::warn!("SimulationContext: Could not release group {group}: {e}");
        }
    }

    /// Runs `exporter` over the content of `group`.
    pub fn export(&self, group: IdGroup, exporter: &mut dyn Exporter) -> CoreResult<()> {
        exporter.export(&ExportScope {
            context: self,
            group,
        })
    }
}

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

use std::sync::Arc;

use tessera_sdk::prelude::*;

// --- DUMMY DATASET TYPES FOR THESE TESTS ---

#[derive(Debug, Clone, PartialEq)]
struct Name(String);
impl Component for Name {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Parent(EntityId);
impl Component for Parent {}

struct Mesh;
impl ResourceKind for Mesh {
    const TYPE: ResourceType = ResourceType::new(1, "mesh");
    type CreateInfo = String;
    type Data = usize;
}

struct MeshLoader;
impl ResourceLoader<Mesh> for MeshLoader {
    fn load(&self, path: &String, _context: &LoadContext) -> Result<usize, LoadFailure> {
        Ok(path.len())
    }
}

fn foreign_group() -> IdGroup {
    IdGroup::dynamic(5).unwrap()
}

fn foreign(index: u32) -> Id {
    Id::new(foreign_group(), index)
}

/// A two-entity scene: a root and a child holding a mesh.
struct SceneImporter {
    name: &'static str,
    fail_after_staging: bool,
}

impl Importer for SceneImporter {
    fn dataset_name(&self) -> &str {
        self.name
    }

    fn source_group(&self) -> IdGroup {
        foreign_group()
    }

    fn referenced_entities(&self) -> Vec<Id> {
        vec![foreign(1), foreign(2)]
    }

    fn referenced_resources(&self) -> Vec<Id> {
        vec![foreign(100)]
    }

    fn import(&self, scope: &mut ImportScope<'_>) -> CoreResult<()> {
        scope.insert_component(foreign(1), Name("root".into()))?;
        scope.insert_component(foreign(2), Name("child".into()))?;
        let parent = scope.entity(foreign(1))?;
        scope.insert_component(foreign(2), Parent(parent))?;
        scope.name_entity(foreign(1), &format!("{}/root", self.name))?;
        scope.define_resource::<Mesh>(foreign(100), "meshes/child.obj".into())?;

        if self.fail_after_staging {
            return Err(CoreError::NotFound("meshes/missing.obj".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct NameCollector {
    names: Vec<String>,
    resource_count: usize,
}

impl Exporter for NameCollector {
    fn export(&mut self, scope: &ExportScope<'_>) -> CoreResult<()> {
        for id in scope.entities() {
            if let Some(name) = scope.component::<Name>(id) {
                self.names.push(name.0.clone());
            }
        }
        self.resource_count = scope.resources().len();
        Ok(())
    }
}

fn context() -> SimulationContext {
    let mut context = SimulationContext::inline(SimulationConfig::default());
    context.register_component::<Name>().unwrap();
    context.register_component::<Parent>().unwrap();
    context
        .resources()
        .register_loader::<Mesh>(Arc::new(MeshLoader))
        .unwrap();
    context
}

// --- TESTS ---

#[test]
fn test_import_translates_references() {
    // --- 1. ARRANGE ---
    let mut context = context();
    let importer = SceneImporter {
        name: "level_01",
        fail_after_staging: false,
    };

    // --- 2. ACT ---
    let report = context.import(&importer).unwrap();
    context.maintenance();

    // --- 3. ASSERT ---
    assert_eq!(report.entities, 2);
    assert_eq!(report.resources, 1);
    assert_eq!(report.components, 3);
    assert_eq!(context.groups().group_by_name("level_01"), Some(report.group));

    let live = context.entity_ids().live_ids(report.group);
    assert_eq!(live.len(), 2);
    let root = context.entity_names().unwrap().find_id("level_01/root").unwrap();
    let child = live.into_iter().find(|id| *id != root).unwrap();
    let parent = context.component_pool::<Parent>().unwrap().get(child).unwrap();
    assert_eq!(parent.0, root, "References point at translated ids");

    let mesh_id = context.resource_ids().live_ids(report.group)[0];
    let mesh = context.resource::<Mesh>(mesh_id).unwrap();
    assert_eq!(mesh.ref_count(), 2, "The context retains imported definitions");
    mesh.request_load().unwrap();
    assert_eq!(*mesh.data().unwrap(), "meshes/child.obj".len());
}

#[test]
fn test_failed_import_rolls_everything_back() {
    // --- 1. ARRANGE ---
    let mut context = context();
    let importer = SceneImporter {
        name: "broken",
        fail_after_staging: true,
    };

    // --- 2. ACT ---
    let err = context.import(&importer).unwrap_err();
    let report = context.maintenance();

    // --- 3. ASSERT ---
    assert!(matches!(err, CoreError::NotFound(_)));
    assert_eq!(report.committed.inserted, 0, "Staged components were discarded");
    assert!(context.groups().group_by_name("broken").is_none());
    assert!(context.resources().is_empty(), "Defined records were dropped");
    assert!(context.entity_names().unwrap().is_empty());
    for ordinal in 0..IdGroup::DYNAMIC_COUNT {
        let group = IdGroup::dynamic(ordinal).unwrap();
        assert_eq!(context.entity_ids().live_count(group), 0);
        assert_eq!(context.resource_ids().live_count(group), 0);
    }
}

#[test]
fn test_duplicate_dataset_name_conflicts() {
    let mut context = context();
    let importer = SceneImporter {
        name: "level_01",
        fail_after_staging: false,
    };
    context.import(&importer).unwrap();

    assert!(matches!(
        context.import(&importer),
        Err(CoreError::Conflict(_))
    ));
}

#[test]
fn test_export_reads_committed_group() {
    let mut context = context();
    let report = context
        .import(&SceneImporter {
            name: "level_02",
            fail_after_staging: false,
        })
        .unwrap();

    let mut before = NameCollector::default();
    context.export(report.group, &mut before).unwrap();
    assert!(before.names.is_empty(), "Nothing is visible before maintenance");

    context.maintenance();
    let mut after = NameCollector::default();
    context.export(report.group, &mut after).unwrap();
    after.names.sort();
    assert_eq!(after.names, vec!["child".to_string(), "root".to_string()]);
    assert_eq!(after.resource_count, 1);
}

#[test]
fn test_destroying_imported_resource_recycles_its_id() {
    let mut context = context();
    let report = context
        .import(&SceneImporter {
            name: "level_03",
            fail_after_staging: false,
        })
        .unwrap();
    let mesh_id = context.resource_ids().live_ids(report.group)[0];

    context.destroy_resource(mesh_id).unwrap();
    let maintenance = context.maintenance();

    assert_eq!(maintenance.released_resources, 1);
    assert!(!context.resources().contains(mesh_id));
}

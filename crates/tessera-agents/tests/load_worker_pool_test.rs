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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tessera_agents::LoadWorkerPool;
use tessera_core::{Id, IdGroup, LoadFailure, LoadState, ResourceKind, ResourceType};
use tessera_data::resources::{LoadContext, LoadRequest, ResourceLoader, ResourcePool};

// --- DUMMY RESOURCE TYPES FOR THESE TESTS ---

struct Mesh;
impl ResourceKind for Mesh {
    const TYPE: ResourceType = ResourceType::new(1, "mesh");
    type CreateInfo = String;
    type Data = Vec<f32>;
}

struct Texture;
impl ResourceKind for Texture {
    const TYPE: ResourceType = ResourceType::new(2, "texture");
    type CreateInfo = (u32, u32);
    type Data = Vec<u8>;
}

struct Material;
impl ResourceKind for Material {
    const TYPE: ResourceType = ResourceType::new(3, "material");
    type CreateInfo = Id;
    type Data = usize;

    fn dependencies(texture: &Id) -> Vec<Id> {
        vec![*texture]
    }
}

/// Blocks every load until the test opens the gate.
struct GatedMeshLoader {
    gate: Receiver<()>,
    loads: AtomicUsize,
    unloads: AtomicUsize,
    destroyed_infos: AtomicUsize,
}

impl GatedMeshLoader {
    fn new(gate: Receiver<()>) -> Self {
        Self {
            gate,
            loads: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
            destroyed_infos: AtomicUsize::new(0),
        }
    }
}

impl ResourceLoader<Mesh> for GatedMeshLoader {
    fn load(&self, path: &String, _context: &LoadContext) -> Result<Vec<f32>, LoadFailure> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.gate
            .recv()
            .map_err(|_| LoadFailure::new("gate closed"))?;
        if path == "panic.obj" {
            panic!("corrupt header in {path}");
        }
        Ok(vec![1.0, 2.0, 3.0])
    }

    fn unload(&self, _data: Arc<Vec<f32>>) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy_create_info(&self, _path: Arc<String>) {
        self.destroyed_infos.fetch_add(1, Ordering::SeqCst);
    }
}

struct TextureLoader;
impl ResourceLoader<Texture> for TextureLoader {
    fn load(&self, &(w, h): &(u32, u32), _context: &LoadContext) -> Result<Vec<u8>, LoadFailure> {
        Ok(vec![0; (w * h) as usize])
    }
}

struct MaterialLoader;
impl ResourceLoader<Material> for MaterialLoader {
    fn load(&self, texture: &Id, context: &LoadContext) -> Result<usize, LoadFailure> {
        let texture = context
            .dependency::<Texture>(*texture)
            .map_err(|e| LoadFailure::new(e.to_string()))?;
        texture
            .request_load()
            .map_err(|e| LoadFailure::new(e.to_string()))?;
        let pixels = texture
            .wait(Duration::from_secs(5))
            .map_err(|e| LoadFailure::new(e.to_string()))?;
        Ok(pixels.len())
    }
}

fn rid(index: u32) -> Id {
    Id::new(IdGroup::PERSISTENT, index)
}

fn setup(threads: usize) -> (Arc<LoadWorkerPool>, ResourcePool) {
    let workers = Arc::new(LoadWorkerPool::new(threads).unwrap());
    let pool = ResourcePool::new(workers.clone());
    (workers, pool)
}

#[test]
fn test_concurrent_load_requests_collapse_into_one() {
    // --- 1. ARRANGE ---
    let (workers, pool) = setup(2);
    let (open, gate) = crossbeam_channel::unbounded();
    let loader = Arc::new(GatedMeshLoader::new(gate));
    pool.register_loader::<Mesh>(loader.clone()).unwrap();
    let handle = pool.create_with_info::<Mesh>(rid(1), "cube.obj".into()).unwrap();

    // --- 2. ACT ---
    let barrier = Barrier::new(8);
    let started = AtomicUsize::new(0);
    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let local = pool.get_or_create::<Mesh>(rid(1)).unwrap();
                barrier.wait();
                if local.request_load().unwrap() == LoadRequest::Started {
                    started.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });
    open.send(()).unwrap();
    workers.wait_idle();

    // --- 3. ASSERT ---
    assert_eq!(started.load(Ordering::SeqCst), 1, "Exactly one request starts the load");
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1, "The loader ran once");
    assert_eq!(handle.state(), LoadState::Loaded);
    assert_eq!(handle.wait(Duration::from_secs(1)).unwrap().len(), 3);
}

#[test]
fn test_dropping_last_handle_while_loading_defers_destruction() {
    // --- 1. ARRANGE ---
    let (workers, pool) = setup(1);
    let (open, gate) = crossbeam_channel::unbounded();
    let loader = Arc::new(GatedMeshLoader::new(gate));
    pool.register_loader::<Mesh>(loader.clone()).unwrap();

    let handle = pool.create_with_info::<Mesh>(rid(7), "rock.obj".into()).unwrap();
    handle.request_load().unwrap();

    // --- 2. ACT ---
    drop(handle);

    // --- 3. ASSERT ---
    let info = pool.info(rid(7)).expect("Record must outlive its handles while loading");
    assert_eq!(info.ref_count, 0);
    assert_eq!(info.state, LoadState::Loading);

    open.send(()).unwrap();
    workers.wait_idle();

    assert!(!pool.contains(rid(7)), "Record is destroyed once the load settles");
    assert_eq!(loader.unloads.load(Ordering::SeqCst), 1, "Loaded data is discarded");
    assert_eq!(loader.destroyed_infos.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unload_while_loading_is_busy() {
    let (workers, pool) = setup(1);
    let (open, gate) = crossbeam_channel::unbounded();
    pool.register_loader::<Mesh>(Arc::new(GatedMeshLoader::new(gate)))
        .unwrap();
    let handle = pool.create_with_info::<Mesh>(rid(2), "a.obj".into()).unwrap();
    handle.request_load().unwrap();

    assert_eq!(
        handle.request_unload().unwrap_err(),
        tessera_core::CoreError::Busy(rid(2))
    );
    assert_eq!(
        handle.wait(Duration::from_millis(10)).unwrap_err(),
        tessera_core::CoreError::Timeout(rid(2))
    );

    open.send(()).unwrap();
    workers.wait_idle();
    handle.request_unload().unwrap();
    assert_eq!(handle.state(), LoadState::Unloaded);
}

#[test]
fn test_loader_panic_becomes_failure() {
    let (workers, pool) = setup(1);
    let (open, gate) = crossbeam_channel::unbounded();
    pool.register_loader::<Mesh>(Arc::new(GatedMeshLoader::new(gate)))
        .unwrap();
    let handle = pool.create_with_info::<Mesh>(rid(3), "panic.obj".into()).unwrap();

    open.send(()).unwrap();
    handle.request_load().unwrap();
    workers.wait_idle();

    assert_eq!(handle.state(), LoadState::Failed);
    let failure = handle.failure().unwrap();
    assert!(
        failure.reason().contains("corrupt header"),
        "Unexpected failure: {failure}"
    );
}

#[test]
fn test_loader_resolves_dependencies() {
    // --- 1. ARRANGE ---
    let (workers, pool) = setup(2);
    pool.register_loader::<Texture>(Arc::new(TextureLoader)).unwrap();
    pool.register_loader::<Material>(Arc::new(MaterialLoader)).unwrap();
    let (events, received) = flume::unbounded();
    pool.attach_events(events);

    let texture = pool.create_with_info::<Texture>(rid(10), (4, 4)).unwrap();
    let material = pool.create_with_info::<Material>(rid(11), rid(10)).unwrap();

    // --- 2. ACT ---
    material.request_load().unwrap();
    let pixels = material.wait(Duration::from_secs(5)).unwrap();
    workers.wait_idle();

    // --- 3. ASSERT ---
    assert_eq!(*pixels, 16);
    assert_eq!(texture.state(), LoadState::Loaded);
    assert_eq!(pool.load_order().unwrap(), vec![rid(10), rid(11)]);

    let mut settled: Vec<Id> = received.try_iter().map(|event| event.id).collect();
    settled.sort();
    assert_eq!(settled, vec![rid(10), rid(11)], "Each load publishes one event");
}

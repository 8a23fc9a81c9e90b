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

use std::cell::RefCell;

use tessera_sdk::prelude::*;

// --- DUMMY FUNCTIONALITIES FOR THESE TESTS ---

thread_local! {
    static CALLS: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
}

fn record(call: &'static str) {
    CALLS.with(|calls| calls.borrow_mut().push(call));
}

fn take_calls() -> Vec<&'static str> {
    CALLS.with(|calls| std::mem::take(&mut *calls.borrow_mut()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform(f32);
impl Component for Transform {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RigidBody {
    mass: f32,
}
impl Component for RigidBody {}

fn create_transform(context: &mut SimulationContext) -> CoreResult<()> {
    record("create transform");
    context.register_component::<Transform>().map(|_| ())
}

fn destroy_transform(context: &mut SimulationContext) {
    record("destroy transform");
    let _ = context.unregister_component::<Transform>();
}

fn create_physics(context: &mut SimulationContext) -> CoreResult<()> {
    record("create physics");
    // Physics needs transforms to exist already.
    context.component_pool::<Transform>()?;
    context.register_component::<RigidBody>().map(|_| ())
}

fn destroy_physics(context: &mut SimulationContext) {
    record("destroy physics");
    let _ = context.unregister_component::<RigidBody>();
}

fn initialize_physics(_: &mut SimulationContext) -> CoreResult<()> {
    record("initialize physics");
    Ok(())
}

fn deinitialize_physics(_: &mut SimulationContext) {
    record("deinitialize physics");
}

fn create_broken(_: &mut SimulationContext) -> CoreResult<()> {
    record("create broken");
    Err(CoreError::NotFound("audio device".to_string()))
}

fn destroy_broken(_: &mut SimulationContext) {
    record("destroy broken");
}

fn create_static(_: &mut SimulationContext) -> CoreResult<()> {
    Ok(())
}

fn destroy_static(_: &mut SimulationContext) {}

tessera_sdk::inventory::submit! {
    FunctionalityDescriptor::new(FunctionalityId(7), "static_marker", create_static, destroy_static)
}

const TRANSFORM: FunctionalityDescriptor = FunctionalityDescriptor::new(
    FunctionalityId(3),
    "transform",
    create_transform,
    destroy_transform,
);

const PHYSICS: FunctionalityDescriptor = FunctionalityDescriptor::new(
    FunctionalityId(18),
    "physics",
    create_physics,
    destroy_physics,
)
.with_initialize(initialize_physics, deinitialize_physics);

fn context() -> SimulationContext {
    SimulationContext::inline(SimulationConfig::default())
}

// --- TESTS ---

#[test]
fn test_registering_physics_twice_conflicts() {
    // --- 1. ARRANGE ---
    let mut registry = FunctionalityRegistry::new();
    registry.register(PHYSICS).unwrap();

    // --- 2. ACT ---
    let result = registry.register(FunctionalityDescriptor::new(
        FunctionalityId(18),
        "physics_again",
        create_broken,
        destroy_broken,
    ));

    // --- 3. ASSERT ---
    assert!(matches!(result, Err(CoreError::Conflict(_))));
    let kept = registry.get(FunctionalityId(18)).unwrap();
    assert_eq!(kept.name, "physics", "The first registration stays intact");
    assert!(kept.on_initialize.is_some());
}

#[test]
fn test_full_lifecycle_runs_hooks_in_order() {
    // --- 1. ARRANGE ---
    take_calls();
    let mut registry = FunctionalityRegistry::new();
    registry.register(TRANSFORM).unwrap();
    registry.register(PHYSICS).unwrap();
    let mut context = context();

    // --- 2. ACT ---
    registry.instantiate(&mut context).unwrap();
    registry.initialize(&mut context).unwrap();
    assert!(context.is_initialized());
    assert!(context.component_pool::<RigidBody>().is_ok());
    registry.teardown(&mut context);

    // --- 3. ASSERT ---
    assert_eq!(
        take_calls(),
        vec![
            "create transform",
            "create physics",
            "initialize physics",
            "deinitialize physics",
            "destroy physics",
            "destroy transform",
        ]
    );
    assert!(!context.is_initialized());
    assert!(context.components().is_empty());
}

#[test]
fn test_failed_create_unwinds_in_reverse() {
    take_calls();
    let mut registry = FunctionalityRegistry::new();
    registry.register(TRANSFORM).unwrap();
    registry.register(PHYSICS).unwrap();
    registry
        .register(FunctionalityDescriptor::new(
            FunctionalityId(40),
            "audio",
            create_broken,
            destroy_broken,
        ))
        .unwrap();
    let mut context = context();

    let err = registry.instantiate(&mut context).unwrap_err();

    assert_eq!(err, CoreError::NotFound("audio device".to_string()));
    assert_eq!(
        take_calls(),
        vec![
            "create transform",
            "create physics",
            "create broken",
            "destroy physics",
            "destroy transform",
        ],
        "The failing functionality is not destroyed, the others are in reverse"
    );
    assert!(context.functionalities().is_empty());
    assert!(context.components().is_empty(), "No half-built context remains");
}

#[test]
fn test_registration_order_is_creation_order() {
    take_calls();
    let mut registry = FunctionalityRegistry::new();
    registry.register(PHYSICS).unwrap();
    registry.register(TRANSFORM).unwrap();
    let mut context = context();

    let result = registry.instantiate(&mut context);

    assert!(
        matches!(result, Err(CoreError::NotFound(_))),
        "Physics runs first and cannot find the transform pool"
    );
    assert_eq!(take_calls(), vec!["create physics"]);
}

#[test]
fn test_deregister_keeps_live_simulation_intact() {
    take_calls();
    let mut registry = FunctionalityRegistry::new();
    registry.register(TRANSFORM).unwrap();
    let mut context = context();
    registry.instantiate(&mut context).unwrap();

    let removed = registry.deregister(FunctionalityId(3)).unwrap();
    assert_eq!(removed.name, "transform");
    assert!(registry.is_empty());

    registry.teardown(&mut context);
    assert_eq!(take_calls(), vec!["create transform", "destroy transform"]);
}

#[test]
fn test_static_descriptors_are_collected() {
    let registry = FunctionalityRegistry::with_static();
    let descriptor = registry
        .get(FunctionalityId(7))
        .expect("Submitted descriptor should be registered");
    assert_eq!(descriptor.name, "static_marker");
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tessera_sdk::prelude::*;

// --- Components ---

#[derive(Component, Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

// --- Resources ---

struct Shape;
impl ResourceKind for Shape {
    const TYPE: ResourceType = ResourceType::new(1, "collision_shape");
    type CreateInfo = ShapeInfo;
    type Data = f32;
}

#[derive(Debug, Clone)]
enum ShapeInfo {
    Circle { radius: f32 },
    Box { width: f32, height: f32 },
    File(String),
}

struct ShapeLoader;
impl ResourceLoader<Shape> for ShapeLoader {
    fn load(&self, info: &ShapeInfo, context: &LoadContext) -> Result<f32, LoadFailure> {
        log::debug!("ShapeLoader: Computing area of {}", context.id());
        match info {
            ShapeInfo::Circle { radius } => Ok(std::f32::consts::PI * radius * radius),
            ShapeInfo::Box { width, height } => Ok(width * height),
            ShapeInfo::File(path) => Err(LoadFailure::new(format!("file not found: {path}"))),
        }
    }
}

// --- Functionalities ---

fn create_motion(context: &mut SimulationContext) -> CoreResult<()> {
    context.register_component::<Position>()?;
    context.register_component::<Velocity>()?;
    Ok(())
}

fn destroy_motion(context: &mut SimulationContext) {
    if let Err(e) = context.unregister_component::<Velocity>() {
        log::warn!("motion: Could not drop the velocity pool: {e}");
    }
    if let Err(e) = context.unregister_component::<Position>() {
        log::warn!("motion: Could not drop the position pool: {e}");
    }
}

fn create_shapes(context: &mut SimulationContext) -> CoreResult<()> {
    context
        .resources()
        .register_loader::<Shape>(Arc::new(ShapeLoader))
}

fn destroy_shapes(context: &mut SimulationContext) {
    if !context.resources().deregister_loader::<Shape>() {
        log::warn!("shapes: No shape loader was registered");
    }
}

tessera_sdk::inventory::submit! {
    FunctionalityDescriptor::new(FunctionalityId(1), "motion", create_motion, destroy_motion)
}

tessera_sdk::inventory::submit! {
    FunctionalityDescriptor::new(FunctionalityId(18), "shapes", create_shapes, destroy_shapes)
}

/// Moves every entity by its velocity, staging the new positions.
fn integrate(context: &SimulationContext, dt: f32) -> CoreResult<usize> {
    let positions = context.component_pool::<Position>()?;
    let velocities = context.component_pool::<Velocity>()?;

    let mut moved = 0;
    for (id, velocity) in &velocities.iterate() {
        let Some(position) = positions.get(id) else {
            continue;
        };
        positions.remove(id)?;
        positions.insert(
            id,
            Position {
                x: position.x + velocity.x * dt,
                y: position.y + velocity.y * dt,
            },
        )?;
        moved += 1;
    }
    Ok(moved)
}

fn main() -> Result<()> {
    let config = SimulationConfig::default();
    tessera_sdk::logging::init(&config.log_filter);

    let mut registry = FunctionalityRegistry::with_static();
    let mut context = SimulationContext::new(config)?;
    registry
        .instantiate(&mut context)
        .context("failed to build the simulation")?;
    registry.initialize(&mut context)?;

    // Spawn a few bodies.
    for i in 0..4 {
        let entity = context.spawn_named(IdGroup::PERSISTENT, &format!("body_{i}"))?;
        context.insert_component(entity, Position { x: i as f32, y: 0.0 })?;
        context.insert_component(entity, Velocity { x: 0.0, y: 1.0 })?;
    }
    context.maintenance();

    // Define a few shapes, one of which cannot load.
    let shapes = [
        ShapeInfo::Circle { radius: 0.5 },
        ShapeInfo::Box {
            width: 2.0,
            height: 1.0,
        },
        ShapeInfo::File("shapes/hull.bin".to_string()),
    ];
    let mut handles = Vec::new();
    for info in shapes {
        let handle = context.create_resource::<Shape>(IdGroup::PERSISTENT, info)?;
        handle.request_load()?;
        handles.push(handle);
    }

    for tick in 0..3 {
        let moved = integrate(&context, 1.0 / 60.0)?;
        let report = context.maintenance();
        log::info!(
            "Tick {tick}: moved {moved} bodies, committed +{} -{}",
            report.committed.inserted,
            report.committed.removed
        );
        for event in context.drain_load_events() {
            match event.failure {
                Some(failure) => log::warn!("Shape {} failed: {failure}", event.id),
                None => log::info!("Shape {} is {}", event.id, event.state),
            }
        }
    }

    for handle in &handles {
        match handle.wait(Duration::from_secs(1)) {
            Ok(area) => log::info!("Shape {} has area {area:.3}", handle.id()),
            Err(e) => log::warn!("Shape {} unavailable: {e}", handle.id()),
        }
    }

    // Grow the circle, reload it, then read the new area under a use.
    let circle = handles[0].id();
    context.edit_create_info::<Shape>(circle, ShapeInfo::Circle { radius: 1.0 })?;
    handles[0].request_reload(false)?;
    context.wait_for_loads();
    let area = handles[0].begin_use()?;
    log::info!("Shape {circle} grew to area {:.3}", *area);
    drop(area);

    drop(handles);
    context.wait_for_loads();
    for info in context.resources().records() {
        log::info!("Leftover record: {info:?}");
    }

    registry.teardown(&mut context);
    Ok(())
}

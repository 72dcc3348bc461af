// Copyright 2025 the chunked_ecs authors
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

//! Entity lifecycle: creation, destruction, id recycling, definitions.

use chunked_ecs::{EcsError, Result, World, DEFAULT_CHUNK};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[test]
fn test_fresh_entity_lives_in_default_chunk() {
    let mut world = World::new();
    let entity = world.create_entity();

    assert!(!entity.is_null());
    let location = world.location(entity).unwrap();
    assert_eq!(location.chunk, DEFAULT_CHUNK);
    assert!(world.definition(entity).unwrap().is_empty());
}

#[test]
fn test_same_composition_means_same_chunk() -> Result<()> {
    let mut world = World::new();
    let a = world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;
    let b = world.create_entity_with((Position { x: 5.0, y: 5.0 },))?;

    // Same chunk for identical compositions, and different construction
    // paths converge: create-then-add lands in the same chunk too
    let c = world.create_entity();
    world.add_component(c, Position { x: 9.0, y: 9.0 })?;

    let chunk = world.location(a).unwrap().chunk;
    assert_eq!(world.location(b).unwrap().chunk, chunk);
    assert_eq!(world.location(c).unwrap().chunk, chunk);
    Ok(())
}

#[test]
fn test_recycled_id_gets_new_generation() -> Result<()> {
    let mut world = World::new();
    let entity = world.create_entity();
    let generation = world.generation(entity).unwrap();

    world.destroy_entity(entity)?;
    let reused = world.create_entity();

    // LIFO free stack hands the same id back
    assert_eq!(reused, entity);
    assert_ne!(world.generation(reused).unwrap(), generation);
    Ok(())
}

#[test]
fn test_add_then_remove_restores_definition() -> Result<()> {
    let mut world = World::new();
    let entity = world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;
    let def = world.definition(entity)?;

    world.add_component(entity, Velocity { x: 1.0, y: 1.0 })?;
    world.remove_component::<Velocity>(entity)?;
    assert_eq!(world.definition(entity)?, def);
    Ok(())
}

#[test]
fn test_component_reads_after_overwrite_are_bytewise() -> Result<()> {
    let mut world = World::new();
    let entity = world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;

    let value = Position { x: f32::MIN_POSITIVE, y: -0.0 };
    world.add_component(entity, value)?;

    let read = *world.component::<Position>(entity)?;
    assert_eq!(read.x.to_bits(), value.x.to_bits());
    assert_eq!(read.y.to_bits(), value.y.to_bits());
    Ok(())
}

#[test]
fn test_operations_on_dead_entities_fail() -> Result<()> {
    let mut world = World::new();
    let entity = world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;
    world.destroy_entity(entity)?;

    assert_eq!(world.destroy_entity(entity), Err(EcsError::EntityNotFound));
    assert_eq!(
        world.add_component(entity, Velocity { x: 0.0, y: 0.0 }),
        Err(EcsError::EntityNotFound)
    );
    assert_eq!(world.component::<Position>(entity), Err(EcsError::EntityNotFound));
    assert!(world.location(entity).is_none());
    assert!(!world.has_component::<Position>(entity));
    Ok(())
}

#[test]
fn test_null_id_is_never_live() {
    let world = World::new();
    assert!(!world.is_alive(chunked_ecs::EntityId::NULL));
}

#[test]
fn test_entity_count_tracks_lifecycle() -> Result<()> {
    let mut world = World::new();
    assert_eq!(world.entity_count(), 0);

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(world.create_entity());
    }
    assert_eq!(world.entity_count(), 5);

    for id in &ids[..3] {
        world.destroy_entity(*id)?;
    }
    assert_eq!(world.entity_count(), 2);

    world.create_entity();
    assert_eq!(world.entity_count(), 3);
    Ok(())
}

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

//! Change listeners: payloads, ordering, and post-mutation delivery.

use std::cell::RefCell;

use chunked_ecs::{ChangeKind, DataKind, EntityId, Result, World};

thread_local! {
    static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn take_log() -> Vec<String> {
    LOG.with(|log| log.borrow_mut().drain(..).collect())
}

fn record_lifecycle(_world: &World, entity: EntityId, destroyed: bool, user_data: usize) {
    let what = if destroyed { "destroyed" } else { "created" };
    LOG.with(|log| log.borrow_mut().push(format!("{user_data}:{what}:{entity}")));
}

fn record_parent(_world: &World, entity: EntityId, old: EntityId, new: EntityId, user_data: usize) {
    LOG.with(|log| {
        log.borrow_mut()
            .push(format!("{user_data}:parent:{entity}:{old}->{new}"))
    });
}

fn record_data(world: &World, entity: EntityId, data: DataKind, kind: ChangeKind, user_data: usize) {
    // Delivery happens after the state change is fully applied
    if let (DataKind::Component(_), ChangeKind::Added) = (data, kind) {
        assert!(world.is_alive(entity));
    }
    LOG.with(|log| {
        log.borrow_mut()
            .push(format!("{user_data}:data:{entity}:{data:?}:{kind:?}"))
    });
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[test]
fn test_lifecycle_events_fire_in_registration_order() -> Result<()> {
    let mut world = World::new();
    world.on_entity_created_or_destroyed(record_lifecycle, 1);
    world.on_entity_created_or_destroyed(record_lifecycle, 2);

    let entity = world.create_entity();
    world.destroy_entity(entity)?;

    assert_eq!(
        take_log(),
        vec![
            format!("1:created:{entity}"),
            format!("2:created:{entity}"),
            format!("1:destroyed:{entity}"),
            format!("2:destroyed:{entity}"),
        ]
    );
    Ok(())
}

#[test]
fn test_data_events_carry_index_and_kind() -> Result<()> {
    let mut world = World::new();
    world.on_entity_data_changed(record_data, 0);

    let entity = world.create_entity();
    world.add_component(entity, Position { x: 0.0, y: 0.0 })?;
    world.add_component(entity, Position { x: 1.0, y: 1.0 })?; // overwrite
    world.remove_component::<Position>(entity)?;

    let log = take_log();
    assert_eq!(log.len(), 3);
    assert!(log[0].ends_with("Component(0):Added"));
    assert!(log[1].ends_with("Component(0):Written"));
    assert!(log[2].ends_with("Component(0):Removed"));
    Ok(())
}

#[test]
fn test_array_and_tag_events() -> Result<()> {
    let mut world = World::new();
    world.on_entity_data_changed(record_data, 0);

    struct Marker;

    let entity = world.create_entity();
    world.create_array::<u8>(entity, 2)?;
    world.resize_array::<u8>(entity, 4)?;
    world.destroy_array::<u8>(entity)?;
    world.add_tag::<Marker>(entity)?;
    world.remove_tag::<Marker>(entity)?;

    let log = take_log();
    assert!(log[0].ends_with("Array(0):Added"));
    assert!(log[1].ends_with("Array(0):Written"));
    assert!(log[2].ends_with("Array(0):Removed"));
    // Tag index 0 is reserved for Disabled; Marker gets index 1
    assert!(log[3].ends_with("Tag(1):Added"));
    assert!(log[4].ends_with("Tag(1):Removed"));
    Ok(())
}

#[test]
fn test_bundle_creation_reports_each_component_once() -> Result<()> {
    let mut world = World::new();
    world.on_entity_created_or_destroyed(record_lifecycle, 7);
    world.on_entity_data_changed(record_data, 7);

    #[derive(Clone, Copy)]
    struct Velocity {
        _x: f32,
    }

    let entity = world.create_entity_with((Position { x: 0.0, y: 0.0 }, Velocity { _x: 0.0 }))?;

    let log = take_log();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0], format!("7:created:{entity}"));
    assert!(log[1].contains("Added"));
    assert!(log[2].contains("Added"));
    Ok(())
}

#[test]
fn test_parent_events_carry_old_and_new() -> Result<()> {
    let mut world = World::new();
    world.on_entity_parent_changed(record_parent, 3);

    let parent = world.create_entity();
    let child = world.create_entity();
    world.set_parent(child, parent)?;
    world.set_parent(child, EntityId::NULL)?;

    assert_eq!(
        take_log(),
        vec![
            format!("3:parent:{child}:{}->{parent}", EntityId::NULL),
            format!("3:parent:{child}:{parent}->{}", EntityId::NULL),
        ]
    );
    Ok(())
}

#[test]
fn test_failed_operations_fire_nothing() -> Result<()> {
    let mut world = World::new();
    world.on_entity_data_changed(record_data, 0);
    world.on_entity_parent_changed(record_parent, 0);

    let entity = world.create_entity();
    world.add_component(entity, Position { x: 0.0, y: 0.0 })?;
    take_log();

    let _ = world.remove_component::<u64>(entity);
    let _ = world.set_parent(entity, entity);
    let _ = world.destroy_array::<u8>(entity);

    assert!(take_log().is_empty());
    Ok(())
}

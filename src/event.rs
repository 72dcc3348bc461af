//! Change-notification listeners.
//!
//! Three listener lists, each a plain function pointer plus an opaque word of
//! user data. Listeners fire synchronously in registration order, after the
//! state change is fully applied, and receive `&World` - the borrow checker
//! makes re-entrant mutation from inside a callback unrepresentable.

use crate::entity::EntityId;
use crate::world::World;

/// What happened to the entity's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Written,
}

/// Which kind of per-entity data changed, with its schema index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Component(u8),
    Array(u8),
    Tag(u8),
}

/// Fired after an entity is created (`destroyed == false`) or destroyed
/// (`destroyed == true`).
pub type CreatedOrDestroyedFn = fn(&World, EntityId, bool, usize);

/// Fired after a parent change: `(world, entity, old_parent, new_parent,
/// user_data)`. [`EntityId::NULL`] stands for "no parent".
pub type ParentChangedFn = fn(&World, EntityId, EntityId, EntityId, usize);

/// Fired after a component, array, or tag is added, removed, or written.
pub type DataChangedFn = fn(&World, EntityId, DataKind, ChangeKind, usize);

/// The three listener lists owned by a world.
#[derive(Default)]
pub(crate) struct Listeners {
    pub created_or_destroyed: Vec<(CreatedOrDestroyedFn, usize)>,
    pub parent_changed: Vec<(ParentChangedFn, usize)>,
    pub data_changed: Vec<(DataChangedFn, usize)>,
}

impl Listeners {
    pub(crate) fn notify_created_or_destroyed(
        &self,
        world: &World,
        entity: EntityId,
        destroyed: bool,
    ) {
        for &(callback, user_data) in &self.created_or_destroyed {
            callback(world, entity, destroyed, user_data);
        }
    }

    pub(crate) fn notify_parent_changed(
        &self,
        world: &World,
        entity: EntityId,
        old_parent: EntityId,
        new_parent: EntityId,
    ) {
        for &(callback, user_data) in &self.parent_changed {
            callback(world, entity, old_parent, new_parent, user_data);
        }
    }

    pub(crate) fn notify_data_changed(
        &self,
        world: &World,
        entity: EntityId,
        data: DataKind,
        kind: ChangeKind,
    ) {
        for &(callback, user_data) in &self.data_changed {
            callback(world, entity, data, kind, user_data);
        }
    }
}

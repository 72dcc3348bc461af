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

//! World: authoritative entity lifecycle over a slot table and chunk map.
//!
//! Every composition change is routed through a chunk move: allocate the
//! target row, copy the shared data, update the slot, swap-remove the source
//! row. Listeners fire after the state change is fully applied.

use std::mem;
use std::ptr::NonNull;

use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::chunk::Chunk;
use crate::chunk_map::{ChunkMap, DEFAULT_CHUNK};
use crate::component::{Bundle, Component, Disabled, Tag, MAX_BUNDLE_COMPONENTS};
use crate::definition::Definition;
use crate::entity::{EntityId, Location, Slot};
use crate::error::{EcsError, Result};
use crate::event::{
    ChangeKind, CreatedOrDestroyedFn, DataChangedFn, DataKind, Listeners, ParentChangedFn,
};
use crate::mask::BitMask;
use crate::query::{Query, QueryPart};
use crate::schema::Schema;

/// Central ECS world: slot table, free-id stack, chunk map, schema, and
/// change listeners. Single-owner; not internally synchronized.
pub struct World {
    schema: Schema,
    chunks: ChunkMap,
    /// Slot per allocated id; slot 0 is reserved for the null sentinel.
    slots: Vec<Slot>,
    /// Recycled ids, popped LIFO.
    free_ids: Vec<u32>,
    listeners: Listeners,
}

impl World {
    /// Create an empty world with a fresh schema.
    pub fn new() -> Self {
        Self::with_schema(Schema::new())
    }

    /// Create an empty world over a host-provided schema (e.g. one cloned
    /// across several worlds after registration).
    pub fn with_schema(schema: Schema) -> Self {
        let chunks = ChunkMap::new(&schema);
        World {
            schema,
            chunks,
            slots: vec![Slot::vacant()],
            free_ids: Vec::new(),
            listeners: Listeners::default(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn chunk_map(&self) -> &ChunkMap {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> u32 {
        (self.slots.len() - 1 - self.free_ids.len()) as u32
    }

    // ---- entity lifecycle ----

    /// Create an entity with no components; it resides in the default chunk.
    pub fn create_entity(&mut self) -> EntityId {
        let id = self.alloc_slot();
        let row = self.chunks.chunk_mut(DEFAULT_CHUNK).add_row(id);
        let slot = &mut self.slots[id.index()];
        slot.chunk = DEFAULT_CHUNK as u32;
        slot.row = row as u32;

        self.listeners.notify_created_or_destroyed(self, id, false);
        id
    }

    /// Create an entity carrying `bundle`'s components in a single step; no
    /// intermediate composition is ever observable.
    pub fn create_entity_with<B: Bundle>(&mut self, bundle: B) -> Result<EntityId> {
        let infos = B::type_infos();
        let mut mask = BitMask::EMPTY;
        let mut indices: SmallVec<[u8; MAX_BUNDLE_COMPONENTS]> = SmallVec::new();
        for info in &infos {
            let index = self.schema.register_component_info(*info)?;
            mask.set(index as usize);
            indices.push(index);
        }

        #[cfg(feature = "profiling")]
        let span = info_span!(
            "world.create_entity_with",
            components = indices.len(),
            chunk_count = self.chunks.len()
        );
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let definition = Definition::with_components(mask);
        let chunk_id = self.chunks.get_or_create(definition, &self.schema);
        let id = self.alloc_slot();
        let chunk = self.chunks.chunk_mut(chunk_id);
        let row = chunk.add_row(id);

        // Precompute destination pointers, then let the bundle write through
        // them in declaration order
        let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
        for (i, &index) in indices.iter().enumerate() {
            if let Some(ptr) = chunk.component_ptr(index, row) {
                ptrs[i] = ptr;
            }
        }
        // SAFETY: each pointer addresses that component's byte range in the
        // freshly allocated row.
        unsafe { bundle.write_components(&ptrs[..indices.len()]) };

        let slot = &mut self.slots[id.index()];
        slot.chunk = chunk_id as u32;
        slot.row = row as u32;

        self.listeners.notify_created_or_destroyed(self, id, false);
        for &index in &indices {
            self.listeners
                .notify_data_changed(self, id, DataKind::Component(index), ChangeKind::Added);
        }
        Ok(id)
    }

    /// Create many entities sharing one bundle composition. The chunk is
    /// resolved once; listeners fire after every row is in place.
    pub fn create_entity_batch<B, I>(&mut self, bundles: I) -> Result<Vec<EntityId>>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
    {
        let infos = B::type_infos();
        let mut mask = BitMask::EMPTY;
        let mut indices: SmallVec<[u8; MAX_BUNDLE_COMPONENTS]> = SmallVec::new();
        for info in &infos {
            let index = self.schema.register_component_info(*info)?;
            mask.set(index as usize);
            indices.push(index);
        }

        let definition = Definition::with_components(mask);
        let chunk_id = self.chunks.get_or_create(definition, &self.schema);

        let mut ids = Vec::new();
        for bundle in bundles {
            let id = self.alloc_slot();
            let chunk = self.chunks.chunk_mut(chunk_id);
            let row = chunk.add_row(id);

            let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
            for (i, &index) in indices.iter().enumerate() {
                if let Some(ptr) = chunk.component_ptr(index, row) {
                    ptrs[i] = ptr;
                }
            }
            // SAFETY: as in `create_entity_with`
            unsafe { bundle.write_components(&ptrs[..indices.len()]) };

            let slot = &mut self.slots[id.index()];
            slot.chunk = chunk_id as u32;
            slot.row = row as u32;
            ids.push(id);
        }

        for &id in &ids {
            self.listeners.notify_created_or_destroyed(self, id, false);
            for &index in &indices {
                self.listeners
                    .notify_data_changed(self, id, DataKind::Component(index), ChangeKind::Added);
            }
        }
        Ok(ids)
    }

    /// Destroy all entities and chunks, keeping the schema and listeners.
    /// No per-entity events fire; recycled-id generations are lost, and any
    /// outstanding [`QueryState`](crate::QueryState) caches must be rebuilt.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.slots.push(Slot::vacant());
        self.free_ids.clear();
        self.chunks = ChunkMap::new(&self.schema);
    }

    /// Destroy an entity: swap-remove its row, clear the slot, recycle the id.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<()> {
        let location = self.location_of(id)?;

        if let Some(swapped) = self.chunks.chunk_mut(location.chunk).swap_remove_row(location.row)
        {
            self.slots[swapped.index()].row = location.row as u32;
        }

        let slot = &mut self.slots[id.index()];
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        slot.parent = EntityId::NULL;
        slot.references.clear();
        self.free_ids.push(id.raw());

        self.listeners.notify_created_or_destroyed(self, id, true);
        Ok(())
    }

    /// Returns true if `id` names a currently live entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.slot(id).is_ok()
    }

    /// Current `(chunk, row)` of a live entity.
    pub fn location(&self, id: EntityId) -> Option<Location> {
        self.slot(id).ok().map(|slot| slot.location())
    }

    /// The entity's current definition.
    pub fn definition(&self, id: EntityId) -> Result<Definition> {
        let location = self.location_of(id)?;
        Ok(*self.chunks.chunk(location.chunk).definition())
    }

    /// Per-slot generation counter; differs after an id is recycled. Also
    /// readable for dead slots, so stale handles can be told apart.
    pub fn generation(&self, id: EntityId) -> Option<u32> {
        self.slots.get(id.index()).map(|slot| slot.generation)
    }

    // ---- components ----

    /// Add a component, moving the entity to its new chunk. If the entity
    /// already carries `T` the value is overwritten in place and the chunk
    /// version bumped.
    pub fn add_component<T: Component>(&mut self, id: EntityId, value: T) -> Result<()> {
        let location = self.location_of(id)?;
        let index = self.schema.register_component::<T>()?;
        let src_def = *self.chunks.chunk(location.chunk).definition();

        if src_def.components.contains(index as usize) {
            let chunk = self.chunks.chunk_mut(location.chunk);
            chunk.write(index, location.row, value);
            chunk.bump_version();
            self.listeners
                .notify_data_changed(self, id, DataKind::Component(index), ChangeKind::Written);
            return Ok(());
        }

        let dst_def = src_def.with_component(index);
        let dst_chunk = self.chunks.get_or_create(dst_def, &self.schema);
        let new_row = self.move_entity(id, location, dst_chunk);
        self.chunks.chunk_mut(dst_chunk).write(index, new_row, value);

        self.listeners
            .notify_data_changed(self, id, DataKind::Component(index), ChangeKind::Added);
        Ok(())
    }

    /// Remove a component, moving the entity to its new chunk.
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> Result<()> {
        let location = self.location_of(id)?;
        let index = self.schema.component_index::<T>()?;
        let src_def = *self.chunks.chunk(location.chunk).definition();
        if !src_def.components.contains(index as usize) {
            return Err(EcsError::ComponentMissing);
        }

        let dst_def = src_def.without_component(index);
        let dst_chunk = self.chunks.get_or_create(dst_def, &self.schema);
        self.move_entity(id, location, dst_chunk);

        self.listeners
            .notify_data_changed(self, id, DataKind::Component(index), ChangeKind::Removed);
        Ok(())
    }

    /// Borrow a component. The reference stays valid until the entity's next
    /// composition change or destruction.
    pub fn component<T: Component>(&self, id: EntityId) -> Result<&T> {
        let location = self.location_of(id)?;
        let index = self.schema.component_index::<T>()?;
        self.chunks
            .chunk(location.chunk)
            .component_ref(index, location.row)
            .ok_or(EcsError::ComponentMissing)
    }

    /// Mutably borrow a component. A plain in-place write does not bump the
    /// chunk version; use [`World::add_component`] to publish an overwrite.
    pub fn component_mut<T: Component>(&mut self, id: EntityId) -> Result<&mut T> {
        let location = self.location_of(id)?;
        let index = self.schema.component_index::<T>()?;
        self.chunks
            .chunk_mut(location.chunk)
            .component_mut(index, location.row)
            .ok_or(EcsError::ComponentMissing)
    }

    pub fn has_component<T: Component>(&self, id: EntityId) -> bool {
        if let (Ok(location), Ok(index)) = (self.location_of(id), self.schema.component_index::<T>())
        {
            self.chunks.chunk(location.chunk).has_component(index)
        } else {
            false
        }
    }

    // ---- tags ----

    /// Add a zero-sized tag. Idempotent: adding a present tag is a no-op.
    pub fn add_tag<T: Tag>(&mut self, id: EntityId) -> Result<()> {
        let location = self.location_of(id)?;
        let index = self.schema.register_tag::<T>()?;
        let src_def = *self.chunks.chunk(location.chunk).definition();
        if src_def.tags.contains(index as usize) {
            return Ok(());
        }

        let dst_def = src_def.with_tag(index);
        let dst_chunk = self.chunks.get_or_create(dst_def, &self.schema);
        self.move_entity(id, location, dst_chunk);

        self.listeners
            .notify_data_changed(self, id, DataKind::Tag(index), ChangeKind::Added);
        Ok(())
    }

    pub fn remove_tag<T: Tag>(&mut self, id: EntityId) -> Result<()> {
        let location = self.location_of(id)?;
        let index = self.schema.tag_index::<T>()?;
        let src_def = *self.chunks.chunk(location.chunk).definition();
        if !src_def.tags.contains(index as usize) {
            return Err(EcsError::TagMissing);
        }

        let dst_def = src_def.without_tag(index);
        let dst_chunk = self.chunks.get_or_create(dst_def, &self.schema);
        self.move_entity(id, location, dst_chunk);

        self.listeners
            .notify_data_changed(self, id, DataKind::Tag(index), ChangeKind::Removed);
        Ok(())
    }

    pub fn has_tag<T: Tag>(&self, id: EntityId) -> bool {
        if let (Ok(location), Ok(index)) = (self.location_of(id), self.schema.tag_index::<T>()) {
            self.chunks
                .chunk(location.chunk)
                .definition()
                .tags
                .contains(index as usize)
        } else {
            false
        }
    }

    /// Attach the reserved [`Disabled`] tag.
    pub fn disable(&mut self, id: EntityId) -> Result<()> {
        self.add_tag::<Disabled>(id)
    }

    /// Detach the reserved [`Disabled`] tag. Idempotent.
    pub fn enable(&mut self, id: EntityId) -> Result<()> {
        if self.has_tag::<Disabled>(id) {
            self.remove_tag::<Disabled>(id)
        } else {
            self.slot(id).map(|_| ())
        }
    }

    pub fn is_disabled(&self, id: EntityId) -> bool {
        self.has_tag::<Disabled>(id)
    }

    // ---- arrays ----

    /// Attach a dynamic array of `len` zero-initialized elements and return
    /// it. If the entity already carries this array type it is reinitialized
    /// (the uniform overwrite policy).
    pub fn create_array<T: Component>(&mut self, id: EntityId, len: usize) -> Result<&mut [T]> {
        let location = self.location_of(id)?;
        let index = self.schema.register_array::<T>()?;
        let src_def = *self.chunks.chunk(location.chunk).definition();
        let had = src_def.arrays.contains(index as usize);

        let (chunk_id, row) = if had {
            (location.chunk, location.row)
        } else {
            let dst_def = src_def.with_array(index);
            let dst_chunk = self.chunks.get_or_create(dst_def, &self.schema);
            let new_row = self.move_entity(id, location, dst_chunk);
            (dst_chunk, new_row)
        };

        {
            let chunk = self.chunks.chunk_mut(chunk_id);
            if had {
                chunk.resize_array(index, row, 0);
            }
            chunk.resize_array(index, row, len);
        }

        let kind = if had { ChangeKind::Written } else { ChangeKind::Added };
        self.listeners
            .notify_data_changed(self, id, DataKind::Array(index), kind);

        self.chunks
            .chunk_mut(chunk_id)
            .array_mut(index, row)
            .ok_or(EcsError::ArrayMissing)
    }

    /// Resize an array in place, preserving the prefix and zero-filling
    /// growth. Bumps the chunk version.
    pub fn resize_array<T: Component>(&mut self, id: EntityId, new_len: usize) -> Result<()> {
        let location = self.location_of(id)?;
        let index = self.schema.array_index::<T>()?;
        if !self
            .chunks
            .chunk_mut(location.chunk)
            .resize_array(index, location.row, new_len)
        {
            return Err(EcsError::ArrayMissing);
        }

        self.listeners
            .notify_data_changed(self, id, DataKind::Array(index), ChangeKind::Written);
        Ok(())
    }

    /// Detach an array type, moving the entity to its new chunk.
    pub fn destroy_array<T: Component>(&mut self, id: EntityId) -> Result<()> {
        let location = self.location_of(id)?;
        let index = self.schema.array_index::<T>()?;
        let src_def = *self.chunks.chunk(location.chunk).definition();
        if !src_def.arrays.contains(index as usize) {
            return Err(EcsError::ArrayMissing);
        }

        let dst_def = src_def.without_array(index);
        let dst_chunk = self.chunks.get_or_create(dst_def, &self.schema);
        self.move_entity(id, location, dst_chunk);

        self.listeners
            .notify_data_changed(self, id, DataKind::Array(index), ChangeKind::Removed);
        Ok(())
    }

    pub fn array<T: Component>(&self, id: EntityId) -> Result<&[T]> {
        let location = self.location_of(id)?;
        let index = self.schema.array_index::<T>()?;
        self.chunks
            .chunk(location.chunk)
            .array(index, location.row)
            .ok_or(EcsError::ArrayMissing)
    }

    pub fn array_mut<T: Component>(&mut self, id: EntityId) -> Result<&mut [T]> {
        let location = self.location_of(id)?;
        let index = self.schema.array_index::<T>()?;
        self.chunks
            .chunk_mut(location.chunk)
            .array_mut(index, location.row)
            .ok_or(EcsError::ArrayMissing)
    }

    pub fn has_array<T: Component>(&self, id: EntityId) -> bool {
        if let (Ok(location), Ok(index)) = (self.location_of(id), self.schema.array_index::<T>()) {
            self.chunks.chunk(location.chunk).has_array(index)
        } else {
            false
        }
    }

    pub fn array_len<T: Component>(&self, id: EntityId) -> Result<usize> {
        let location = self.location_of(id)?;
        let index = self.schema.array_index::<T>()?;
        self.chunks
            .chunk(location.chunk)
            .array_len(index, location.row)
            .ok_or(EcsError::ArrayMissing)
    }

    /// Copy one array element out; `IndexOutOfRange` past the current length.
    pub fn array_get<T: Component>(&self, id: EntityId, element: usize) -> Result<T> {
        let slice = self.array::<T>(id)?;
        slice.get(element).copied().ok_or(EcsError::IndexOutOfRange)
    }

    /// Overwrite one array element; `IndexOutOfRange` past the current
    /// length. In-place element writes do not bump the version.
    pub fn array_set<T: Component>(&mut self, id: EntityId, element: usize, value: T) -> Result<()> {
        let slice = self.array_mut::<T>(id)?;
        match slice.get_mut(element) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(EcsError::IndexOutOfRange),
        }
    }

    // ---- hierarchy ----

    /// Set (or clear, with [`EntityId::NULL`]) an entity's parent. Rejects
    /// self-parenting and any assignment that would create a cycle.
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) -> Result<()> {
        self.slot(child)?;
        if !parent.is_null() {
            self.slot(parent)?;
            let mut cursor = parent;
            while !cursor.is_null() {
                if cursor == child {
                    return Err(EcsError::CycleRejected);
                }
                cursor = self.slots[cursor.index()].parent;
            }
        }

        let old = mem::replace(&mut self.slots[child.index()].parent, parent);
        self.listeners.notify_parent_changed(self, child, old, parent);
        Ok(())
    }

    /// The entity's parent; [`EntityId::NULL`] when it has none.
    pub fn parent(&self, id: EntityId) -> Result<EntityId> {
        Ok(self.slot(id)?.parent)
    }

    // ---- references ----

    /// Append a weak reference from `source` to `target`. Returns a dense
    /// 1-based handle, stable for the source slot's lifetime. Destroying the
    /// target later does not null the reference; callers re-validate with
    /// [`World::is_alive`].
    pub fn add_reference(&mut self, source: EntityId, target: EntityId) -> Result<u32> {
        self.slot(target)?;
        let slot = self.slot_mut(source)?;
        slot.references.push(target);
        Ok(slot.references.len() as u32)
    }

    /// Resolve a reference handle to the stored entity id.
    pub fn reference(&self, source: EntityId, handle: u32) -> Result<EntityId> {
        let slot = self.slot(source)?;
        if handle == 0 || handle as usize > slot.references.len() {
            return Err(EcsError::IndexOutOfRange);
        }
        Ok(slot.references[handle as usize - 1])
    }

    pub fn reference_count(&self, source: EntityId) -> Result<usize> {
        Ok(self.slot(source)?.references.len())
    }

    // ---- listeners ----

    /// Register an entity created/destroyed listener. Listeners fire in
    /// registration order and must not be re-entrant.
    pub fn on_entity_created_or_destroyed(
        &mut self,
        callback: CreatedOrDestroyedFn,
        user_data: usize,
    ) {
        self.listeners.created_or_destroyed.push((callback, user_data));
    }

    /// Register a parent-changed listener.
    pub fn on_entity_parent_changed(&mut self, callback: ParentChangedFn, user_data: usize) {
        self.listeners.parent_changed.push((callback, user_data));
    }

    /// Register a data-changed listener.
    pub fn on_entity_data_changed(&mut self, callback: DataChangedFn, user_data: usize) {
        self.listeners.data_changed.push((callback, user_data));
    }

    // ---- queries ----

    /// Start building a query. The component types named by `Q` are added
    /// to the required mask automatically.
    pub fn query<Q: QueryPart>(&mut self) -> Query<'_, Q> {
        Query::new(self)
    }

    // ---- internals ----

    fn slot(&self, id: EntityId) -> Result<&Slot> {
        match self.slots.get(id.index()) {
            Some(slot) if slot.live => Ok(slot),
            _ => Err(EcsError::EntityNotFound),
        }
    }

    fn slot_mut(&mut self, id: EntityId) -> Result<&mut Slot> {
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.live => Ok(slot),
            _ => Err(EcsError::EntityNotFound),
        }
    }

    fn location_of(&self, id: EntityId) -> Result<Location> {
        self.slot(id).map(|slot| slot.location())
    }

    fn alloc_slot(&mut self) -> EntityId {
        if let Some(raw) = self.free_ids.pop() {
            let slot = &mut self.slots[raw as usize];
            debug_assert!(!slot.live);
            slot.live = true;
            return EntityId::new(raw);
        }

        // Panic on exhaustion - the id space is not recoverable
        if self.slots.len() >= u32::MAX as usize {
            panic!("entity id space exhausted: {} slots", self.slots.len());
        }
        let raw = self.slots.len() as u32;
        let mut slot = Slot::vacant();
        slot.live = true;
        self.slots.push(slot);
        EntityId::new(raw)
    }

    /// Move an entity's row between chunks: allocate and copy into the
    /// target, point the slot at it, then swap-remove the source row and fix
    /// the swapped entity's slot. No observer runs between those steps.
    fn move_entity(&mut self, id: EntityId, from: Location, dst_chunk: usize) -> usize {
        debug_assert_ne!(from.chunk, dst_chunk);

        #[cfg(feature = "profiling")]
        let span = info_span!("world.move_entity", from = from.chunk, to = dst_chunk);
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let (src, dst) = self.chunks.pair_mut(from.chunk, dst_chunk);
        let new_row = src.copy_row_into(from.row, dst);

        let slot = &mut self.slots[id.index()];
        slot.chunk = dst_chunk as u32;
        slot.row = new_row as u32;

        if let Some(swapped) = self.chunks.chunk_mut(from.chunk).swap_remove_row(from.row) {
            self.slots[swapped.index()].row = from.row as u32;
        }
        new_row
    }

    /// Captured chunk pointer for query iteration.
    ///
    /// # Safety
    /// The pointer is valid while the world is borrowed by the iterator;
    /// callers must not let it outlive that borrow.
    pub(crate) fn chunk_ptr(&mut self, id: usize) -> NonNull<Chunk> {
        NonNull::from(self.chunks.chunk_mut(id))
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

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

//! Chunk: dense storage for all entities sharing one definition.
//!
//! Storage is one interleaved byte row per entity (entity-id column kept
//! separately), with per-component offsets computed once at chunk creation
//! from the schema's global layout. Dynamic arrays live in per-type columns,
//! one byte buffer per row. Removal is swap-remove only; rows stay dense.

use std::mem;
use std::ptr;
use std::slice;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::component::Component;
use crate::definition::Definition;
use crate::entity::EntityId;
use crate::schema::{ComponentSlot, Schema};

/// Dynamic column for one array type: one independently sized byte buffer
/// per entity row.
struct ArrayColumn {
    elem_size: usize,
    rows: Vec<Vec<u8>>,
}

/// Column store for one archetype.
pub struct Chunk {
    definition: Definition,
    entities: Vec<EntityId>,
    /// Component index -> placement within a row. Fixed at creation.
    slots: FxHashMap<u8, ComponentSlot>,
    row_size: usize,
    /// `entities.len() * row_size` bytes of interleaved component data.
    rows: Vec<u8>,
    arrays: Vec<ArrayColumn>,
    /// Array index -> position in `arrays`. Fixed at creation.
    array_slots: FxHashMap<u8, usize>,
    version: u32,
}

impl Chunk {
    /// Create an empty chunk for `definition`, with the row layout resolved
    /// from the schema's global offsets. The definition is fixed for the
    /// chunk's lifetime.
    pub(crate) fn new(definition: Definition, schema: &Schema) -> Self {
        let layout = schema.chunk_layout(&definition.components);

        let mut arrays = Vec::new();
        let mut array_slots = FxHashMap::default();
        for index in definition.arrays.ones() {
            array_slots.insert(index as u8, arrays.len());
            arrays.push(ArrayColumn {
                elem_size: schema.array_elem_size(index as u8),
                rows: Vec::new(),
            });
        }

        Chunk {
            definition,
            entities: Vec::new(),
            slots: layout.slots,
            row_size: layout.row_size,
            rows: Vec::new(),
            arrays,
            array_slots,
            version: 0,
        }
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Entity ids in row order; `entities()[i]` occupies row `i`.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Bytes per row for this chunk's component mask.
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Monotonic counter bumped on every structural mutation.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Append a row for `entity`. Component bytes are zero-initialized and
    /// every array column gains an empty buffer.
    pub(crate) fn add_row(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        self.rows.resize(self.entities.len() * self.row_size, 0);
        for column in &mut self.arrays {
            column.rows.push(Vec::new());
        }
        self.bump_version();
        self.check_density();
        row
    }

    /// Swap-remove `row`: the last row's bytes and array buffers move into
    /// `row`. Returns the entity that now occupies `row`, if a swap happened;
    /// the caller must update that entity's slot.
    pub(crate) fn swap_remove_row(&mut self, row: usize) -> Option<EntityId> {
        debug_assert!(row < self.entities.len());
        let last = self.entities.len() - 1;

        if row < last && self.row_size > 0 {
            let src = last * self.row_size;
            let dst = row * self.row_size;
            self.rows.copy_within(src..src + self.row_size, dst);
        }
        self.entities.swap_remove(row);
        self.rows.truncate(self.entities.len() * self.row_size);
        for column in &mut self.arrays {
            column.rows.swap_remove(row);
        }

        self.bump_version();
        self.check_density();

        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Allocate a row in `dst` for the entity at `row` and copy everything
    /// both definitions share: component byte ranges in the mask
    /// intersection, array buffers moved (not cloned). The source row is left
    /// in place; the caller swap-removes it after updating the slot table.
    pub(crate) fn copy_row_into(&mut self, row: usize, dst: &mut Chunk) -> usize {
        debug_assert!(row < self.entities.len());
        let entity = self.entities[row];
        let dst_row = dst.add_row(entity);

        let src_base = self.rows.as_ptr();
        let dst_base = dst.rows.as_mut_ptr();
        for (&comp, dst_slot) in &dst.slots {
            if let Some(src_slot) = self.slots.get(&comp) {
                debug_assert_eq!(src_slot.size, dst_slot.size);
                // SAFETY: both offsets come from schema layouts for their
                // chunk's mask; rows are in bounds; buffers are distinct.
                unsafe {
                    ptr::copy_nonoverlapping(
                        src_base.add(row * self.row_size + src_slot.offset),
                        dst_base.add(dst_row * dst.row_size + dst_slot.offset),
                        dst_slot.size,
                    );
                }
            }
        }

        let moves: SmallVec<[(usize, usize); 8]> = dst
            .array_slots
            .iter()
            .filter_map(|(&arr, &dst_pos)| {
                self.array_slots.get(&arr).map(|&src_pos| (dst_pos, src_pos))
            })
            .collect();
        for (dst_pos, src_pos) in moves {
            dst.arrays[dst_pos].rows[dst_row] = mem::take(&mut self.arrays[src_pos].rows[row]);
        }

        dst_row
    }

    // ---- component access ----

    pub(crate) fn has_component(&self, comp: u8) -> bool {
        self.slots.contains_key(&comp)
    }

    /// Byte offset of a component within this chunk's rows.
    pub fn offset_of(&self, comp: u8) -> Option<usize> {
        self.slots.get(&comp).map(|slot| slot.offset)
    }

    /// Raw pointer to a component's bytes in `row`.
    pub(crate) fn component_ptr(&mut self, comp: u8, row: usize) -> Option<*mut u8> {
        let slot = *self.slots.get(&comp)?;
        if row >= self.entities.len() {
            return None;
        }
        Some(unsafe { self.rows.as_mut_ptr().add(row * self.row_size + slot.offset) })
    }

    pub fn component_ref<T: Component>(&self, comp: u8, row: usize) -> Option<&T> {
        let slot = *self.slots.get(&comp)?;
        if row >= self.entities.len() {
            return None;
        }
        debug_assert_eq!(slot.size, mem::size_of::<T>());
        // SAFETY: offset in bounds, size checked against the registered type.
        Some(unsafe { &*(self.rows.as_ptr().add(row * self.row_size + slot.offset) as *const T) })
    }

    pub fn component_mut<T: Component>(&mut self, comp: u8, row: usize) -> Option<&mut T> {
        let slot = *self.slots.get(&comp)?;
        if row >= self.entities.len() {
            return None;
        }
        debug_assert_eq!(slot.size, mem::size_of::<T>());
        // SAFETY: as `component_ref`, through the unique borrow.
        Some(unsafe {
            &mut *(self.rows.as_mut_ptr().add(row * self.row_size + slot.offset) as *mut T)
        })
    }

    /// Overwrite a component value. Does not bump the version; structural
    /// callers decide whether the write is published.
    pub(crate) fn write<T: Component>(&mut self, comp: u8, row: usize, value: T) -> bool {
        match self.component_ptr(comp, row) {
            Some(ptr) => {
                debug_assert_eq!(self.slots[&comp].size, mem::size_of::<T>());
                unsafe { ptr::write(ptr as *mut T, value) };
                true
            }
            None => false,
        }
    }

    // ---- array access ----

    pub(crate) fn has_array(&self, arr: u8) -> bool {
        self.array_slots.contains_key(&arr)
    }

    /// Element count of an array cell.
    pub fn array_len(&self, arr: u8, row: usize) -> Option<usize> {
        let &pos = self.array_slots.get(&arr)?;
        let column = &self.arrays[pos];
        column.rows.get(row).map(|bytes| bytes.len() / column.elem_size)
    }

    pub fn array<T: Component>(&self, arr: u8, row: usize) -> Option<&[T]> {
        let &pos = self.array_slots.get(&arr)?;
        let column = &self.arrays[pos];
        debug_assert_eq!(column.elem_size, mem::size_of::<T>());
        let bytes = column.rows.get(row)?;
        let len = bytes.len() / column.elem_size;
        // SAFETY: buffer length is always a multiple of the element size.
        Some(unsafe { slice::from_raw_parts(bytes.as_ptr() as *const T, len) })
    }

    pub fn array_mut<T: Component>(&mut self, arr: u8, row: usize) -> Option<&mut [T]> {
        let &pos = self.array_slots.get(&arr)?;
        let column = &mut self.arrays[pos];
        debug_assert_eq!(column.elem_size, mem::size_of::<T>());
        let bytes = column.rows.get_mut(row)?;
        let len = bytes.len() / column.elem_size;
        // SAFETY: as `array`, through the unique borrow.
        Some(unsafe { slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut T, len) })
    }

    /// Resize an array cell to `new_len` elements, preserving the prefix and
    /// zero-filling growth. Bumps the version.
    pub(crate) fn resize_array(&mut self, arr: u8, row: usize, new_len: usize) -> bool {
        let pos = match self.array_slots.get(&arr) {
            Some(&pos) => pos,
            None => return false,
        };
        let column = &mut self.arrays[pos];
        let bytes = match column.rows.get_mut(row) {
            Some(bytes) => bytes,
            None => return false,
        };
        bytes.resize(new_len * column.elem_size, 0);
        self.bump_version();
        true
    }

    /// Base pointer of the interleaved row buffer, for query cursors.
    pub(crate) fn rows_ptr(&self) -> *const u8 {
        self.rows.as_ptr()
    }

    pub(crate) fn rows_ptr_mut(&mut self) -> *mut u8 {
        self.rows.as_mut_ptr()
    }

    pub(crate) fn entities_ptr(&self) -> *const EntityId {
        self.entities.as_ptr()
    }

    #[inline]
    fn check_density(&self) {
        debug_assert_eq!(self.rows.len(), self.entities.len() * self.row_size);
        for column in &self.arrays {
            debug_assert_eq!(column.rows.len(), self.entities.len());
        }
    }
}

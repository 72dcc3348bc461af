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

//! Schema: type-index allocator and row-layout oracle.
//!
//! Components, arrays, and tags each get a separate index space in
//! `[0, 255]`. Indices and offsets are assigned in registration order and are
//! never reused or renumbered for the lifetime of the schema.

use std::any::TypeId;
use std::hash::{Hash, Hasher};
use std::mem;

use rustc_hash::{FxHashMap, FxHasher};

use crate::component::{Bundle, Component, Disabled, Tag};
use crate::definition::Definition;
use crate::error::{EcsError, Result, SchemaKind};
use crate::mask::{BitMask, MASK_BITS};

/// Reserved tag index for [`Disabled`].
pub const DISABLED_TAG: u8 = 0;

/// Stable hash of a Rust type's `TypeId`, used as the schema registry key.
pub fn type_key<T: 'static>() -> u64 {
    let mut hasher = FxHasher::default();
    TypeId::of::<T>().hash(&mut hasher);
    hasher.finish()
}

/// Type descriptor: a stable identity plus size and alignment.
///
/// The schema is indifferent to how the caller obtains the key; for Rust
/// types [`TypeInfo::of`] derives it from `TypeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    pub key: u64,
    pub name: &'static str,
    pub size: usize,
    pub align: usize,
}

impl TypeInfo {
    /// Descriptor for a component or array element type.
    pub fn of<T: 'static>() -> Self {
        TypeInfo {
            key: type_key::<T>(),
            name: std::any::type_name::<T>(),
            size: mem::size_of::<T>(),
            align: mem::align_of::<T>(),
        }
    }

    /// Descriptor for a tag marker. Tags contribute no bytes.
    pub fn tag_of<T: 'static>() -> Self {
        TypeInfo {
            key: type_key::<T>(),
            name: std::any::type_name::<T>(),
            size: 0,
            align: 1,
        }
    }
}

/// One index space: key -> index plus per-index descriptors.
#[derive(Clone, Default)]
struct Registry {
    by_key: FxHashMap<u64, u8>,
    infos: Vec<TypeInfo>,
}

impl Registry {
    fn register(&mut self, info: TypeInfo, kind: SchemaKind) -> Result<u8> {
        if let Some(&index) = self.by_key.get(&info.key) {
            return Ok(index);
        }
        if self.infos.len() >= MASK_BITS {
            return Err(EcsError::CapacityExceeded(kind));
        }
        let index = self.infos.len() as u8;
        self.by_key.insert(info.key, index);
        self.infos.push(info);
        Ok(index)
    }

    fn index(&self, key: u64) -> Option<u8> {
        self.by_key.get(&key).copied()
    }

    fn info(&self, index: u8) -> &TypeInfo {
        &self.infos[index as usize]
    }

    fn len(&self) -> usize {
        self.infos.len()
    }
}

/// Byte placement of one component within a chunk's row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ComponentSlot {
    pub offset: usize,
    pub size: usize,
}

/// Packed row layout for one component mask.
pub(crate) struct ChunkLayout {
    pub slots: FxHashMap<u8, ComponentSlot>,
    pub row_size: usize,
}

/// Type-index allocator and row-layout oracle for one world (or several, if
/// the host clones a pre-registered schema across worlds).
#[derive(Clone)]
pub struct Schema {
    components: Registry,
    arrays: Registry,
    tags: Registry,
    /// Global row offset per component index, in registration order.
    offsets: Vec<usize>,
    /// Size of a row carrying every registered component.
    row_size: usize,
}

impl Schema {
    /// Create a schema with the [`Disabled`] tag pre-registered at index 0.
    pub fn new() -> Self {
        let mut schema = Schema {
            components: Registry::default(),
            arrays: Registry::default(),
            tags: Registry::default(),
            offsets: Vec::new(),
            row_size: 0,
        };
        let disabled = schema
            .register_tag::<Disabled>()
            .expect("fresh tag registry cannot be full");
        debug_assert_eq!(disabled, DISABLED_TAG);
        schema
    }

    // ---- registration ----

    /// Register a component descriptor. Idempotent per key; fails with
    /// `CapacityExceeded` once 256 components exist.
    pub fn register_component_info(&mut self, info: TypeInfo) -> Result<u8> {
        let before = self.components.len();
        let index = self.components.register(info, SchemaKind::Component)?;
        if self.components.len() > before {
            let offset = align_up(self.row_size, info.align.max(1));
            self.offsets.push(offset);
            self.row_size = offset + info.size;
        }
        Ok(index)
    }

    /// Register a Rust component type.
    pub fn register_component<T: Component>(&mut self) -> Result<u8> {
        self.register_component_info(TypeInfo::of::<T>())
    }

    /// Register an array element descriptor. Separate index space.
    pub fn register_array_info(&mut self, info: TypeInfo) -> Result<u8> {
        debug_assert!(info.size > 0, "zero-sized array elements are not supported; use a tag");
        self.arrays.register(info, SchemaKind::Array)
    }

    /// Register a Rust array element type.
    pub fn register_array<T: Component>(&mut self) -> Result<u8> {
        self.register_array_info(TypeInfo::of::<T>())
    }

    /// Register a tag descriptor. Size is forced to zero.
    pub fn register_tag_info(&mut self, mut info: TypeInfo) -> Result<u8> {
        info.size = 0;
        info.align = 1;
        self.tags.register(info, SchemaKind::Tag)
    }

    /// Register a Rust tag marker type.
    pub fn register_tag<T: Tag>(&mut self) -> Result<u8> {
        debug_assert_eq!(mem::size_of::<T>(), 0, "tags must be zero-sized markers");
        self.register_tag_info(TypeInfo::tag_of::<T>())
    }

    // ---- lookups ----

    /// Component index for `T`, or `UnknownType`.
    pub fn component_index<T: Component>(&self) -> Result<u8> {
        self.components
            .index(type_key::<T>())
            .ok_or(EcsError::UnknownType(std::any::type_name::<T>()))
    }

    /// Array index for `T`, or `UnknownType`.
    pub fn array_index<T: Component>(&self) -> Result<u8> {
        self.arrays
            .index(type_key::<T>())
            .ok_or(EcsError::UnknownType(std::any::type_name::<T>()))
    }

    /// Tag index for `T`, or `UnknownType`.
    pub fn tag_index<T: Tag>(&self) -> Result<u8> {
        self.tags
            .index(type_key::<T>())
            .ok_or(EcsError::UnknownType(std::any::type_name::<T>()))
    }

    pub fn component_index_of(&self, key: u64) -> Option<u8> {
        self.components.index(key)
    }

    pub fn array_index_of(&self, key: u64) -> Option<u8> {
        self.arrays.index(key)
    }

    pub fn tag_index_of(&self, key: u64) -> Option<u8> {
        self.tags.index(key)
    }

    /// Offset of a component within the global (all-components) row layout.
    pub fn component_offset(&self, index: u8) -> usize {
        self.offsets[index as usize]
    }

    /// Registered byte size of a component.
    pub fn component_size(&self, index: u8) -> usize {
        self.components.info(index).size
    }

    /// Registered element size of an array type.
    pub fn array_elem_size(&self, index: u8) -> usize {
        self.arrays.info(index).size
    }

    /// Row size covering every registered component.
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn array_count(&self) -> usize {
        self.arrays.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Compose a definition from a bundle's component types. Lookup only;
    /// every type must already be registered.
    pub fn definition_of<B: Bundle>(&self) -> Result<Definition> {
        let mut components = BitMask::EMPTY;
        for info in B::type_infos() {
            let index = self
                .components
                .index(info.key)
                .ok_or(EcsError::UnknownType(info.name))?;
            components.set(index as usize);
        }
        Ok(Definition::with_components(components))
    }

    /// Packed layout for a chunk holding exactly `mask`: offsets assigned in
    /// ascending (registration) index order, each aligned to the component's
    /// natural alignment, row size rounded up to the strictest alignment.
    pub(crate) fn chunk_layout(&self, mask: &BitMask) -> ChunkLayout {
        let mut slots = FxHashMap::default();
        let mut offset = 0usize;
        let mut max_align = 1usize;

        for index in mask.ones() {
            let info = self.components.info(index as u8);
            let align = info.align.max(1);
            offset = align_up(offset, align);
            max_align = max_align.max(align);
            slots.insert(index as u8, ComponentSlot { offset, size: info.size });
            offset += info.size;
        }

        ChunkLayout {
            slots,
            row_size: align_up(offset, max_align),
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct Position {
        _x: f32,
        _y: f32,
    }

    #[derive(Clone, Copy)]
    struct Health(u8);

    fn forged(key: u64, size: usize) -> TypeInfo {
        TypeInfo {
            key,
            name: "forged",
            size,
            align: 1,
        }
    }

    #[test]
    fn registration_is_idempotent() -> Result<()> {
        let mut schema = Schema::new();
        let a = schema.register_component::<Position>()?;
        let b = schema.register_component::<Position>()?;
        assert_eq!(a, b);
        assert_eq!(schema.component_count(), 1);
        Ok(())
    }

    #[test]
    fn indices_and_offsets_follow_registration_order() -> Result<()> {
        let mut schema = Schema::new();
        let pos = schema.register_component::<Position>()?;
        let hp = schema.register_component::<Health>()?;

        assert_eq!(pos, 0);
        assert_eq!(hp, 1);
        assert_eq!(schema.component_offset(pos), 0);
        assert_eq!(schema.component_offset(hp), 8);
        assert_eq!(schema.component_size(pos), 8);
        assert_eq!(schema.component_size(hp), 1);
        Ok(())
    }

    #[test]
    fn capacity_exceeded_at_256() {
        let mut schema = Schema::new();
        for key in 0..256u64 {
            schema.register_component_info(forged(key, 4)).unwrap();
        }
        let err = schema.register_component_info(forged(999, 4)).unwrap_err();
        assert_eq!(err, EcsError::CapacityExceeded(SchemaKind::Component));

        // Re-registering an existing key still succeeds
        assert!(schema.register_component_info(forged(42, 4)).is_ok());
    }

    #[test]
    fn index_spaces_are_disjoint() -> Result<()> {
        let mut schema = Schema::new();
        let comp = schema.register_component::<Health>()?;
        let arr = schema.register_array::<Health>()?;
        assert_eq!(comp, 0);
        assert_eq!(arr, 0);
        Ok(())
    }

    #[test]
    fn disabled_tag_reserved_at_zero() {
        let schema = Schema::new();
        assert_eq!(schema.tag_index::<Disabled>().unwrap(), DISABLED_TAG);
        assert_eq!(schema.tag_count(), 1);
    }

    #[test]
    fn chunk_layout_packs_only_present_components() -> Result<()> {
        let mut schema = Schema::new();
        let pos = schema.register_component::<Position>()?;
        let hp = schema.register_component::<Health>()?;

        let layout = schema.chunk_layout(&BitMask::EMPTY.with(hp as usize));
        assert_eq!(layout.row_size, 1);
        assert_eq!(layout.slots[&hp].offset, 0);

        let both = schema.chunk_layout(&BitMask::EMPTY.with(pos as usize).with(hp as usize));
        assert_eq!(both.slots[&pos].offset, 0);
        assert_eq!(both.slots[&hp].offset, 8);
        assert_eq!(both.row_size, 12); // rounded up to f32 alignment
        Ok(())
    }

    #[test]
    fn unknown_type_lookup_fails() {
        let schema = Schema::new();
        assert!(matches!(
            schema.component_index::<Position>(),
            Err(EcsError::UnknownType(_))
        ));
    }
}

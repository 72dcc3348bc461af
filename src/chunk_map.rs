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

//! ChunkMap: definition -> chunk, with stable insertion order.
//!
//! Chunks live in an arena indexed by creation order; queries enumerate that
//! order, so iteration is deterministic for a fixed insertion history. The
//! hash index maps a definition to its arena slot (at most one chunk per
//! definition).

use ahash::AHashMap;

use crate::chunk::Chunk;
use crate::definition::Definition;
use crate::schema::Schema;

/// Arena index of the reserved default chunk (empty definition).
pub const DEFAULT_CHUNK: usize = 0;

pub struct ChunkMap {
    /// All chunks, in creation order. Index 0 is the default chunk.
    chunks: Vec<Chunk>,
    index: AHashMap<Definition, usize>,
}

impl ChunkMap {
    /// Create a map with the default chunk bootstrapped at index 0. Entities
    /// with no components, arrays, or tags live there.
    pub(crate) fn new(schema: &Schema) -> Self {
        let mut map = ChunkMap {
            chunks: Vec::with_capacity(64),
            index: AHashMap::with_capacity(64),
        };
        let id = map.get_or_create(Definition::EMPTY, schema);
        debug_assert_eq!(id, DEFAULT_CHUNK);
        map
    }

    /// Arena index for `definition`, creating the chunk on first sight.
    pub(crate) fn get_or_create(&mut self, definition: Definition, schema: &Schema) -> usize {
        if let Some(&id) = self.index.get(&definition) {
            return id;
        }

        // Push first so the index never refers to a missing chunk
        self.chunks.push(Chunk::new(definition, schema));
        let id = self.chunks.len() - 1;
        self.index.insert(definition, id);
        id
    }

    /// Arena index for `definition`, if a chunk exists.
    pub fn find(&self, definition: &Definition) -> Option<usize> {
        self.index.get(definition).copied()
    }

    pub fn chunk(&self, id: usize) -> &Chunk {
        &self.chunks[id]
    }

    pub(crate) fn chunk_mut(&mut self, id: usize) -> &mut Chunk {
        &mut self.chunks[id]
    }

    /// Disjoint mutable borrows of two chunks, for row moves.
    pub(crate) fn pair_mut(&mut self, a: usize, b: usize) -> (&mut Chunk, &mut Chunk) {
        debug_assert_ne!(a, b, "a move requires two distinct chunks");
        if a < b {
            let (left, right) = self.chunks.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.chunks.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Chunks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

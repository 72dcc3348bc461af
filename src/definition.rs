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

//! Definition: the identity key of an archetype.
//!
//! Two entities share a chunk iff their definitions are equal. The empty
//! definition is valid and designates the default chunk.

use std::hash::{Hash, Hasher};

use crate::mask::BitMask;

/// `(component_mask, array_mask, tag_mask)` triple identifying an archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Definition {
    pub components: BitMask,
    pub arrays: BitMask,
    pub tags: BitMask,
}

impl Definition {
    /// The empty definition: no components, arrays, or tags.
    pub const EMPTY: Self = Definition {
        components: BitMask::EMPTY,
        arrays: BitMask::EMPTY,
        tags: BitMask::EMPTY,
    };

    pub fn new(components: BitMask, arrays: BitMask, tags: BitMask) -> Self {
        Definition {
            components,
            arrays,
            tags,
        }
    }

    pub fn with_components(components: BitMask) -> Self {
        Definition {
            components,
            ..Self::EMPTY
        }
    }

    pub fn with_component(mut self, index: u8) -> Self {
        self.components.set(index as usize);
        self
    }

    pub fn without_component(mut self, index: u8) -> Self {
        self.components.clear(index as usize);
        self
    }

    pub fn with_array(mut self, index: u8) -> Self {
        self.arrays.set(index as usize);
        self
    }

    pub fn without_array(mut self, index: u8) -> Self {
        self.arrays.clear(index as usize);
        self
    }

    pub fn with_tag(mut self, index: u8) -> Self {
        self.tags.set(index as usize);
        self
    }

    pub fn without_tag(mut self, index: u8) -> Self {
        self.tags.clear(index as usize);
        self
    }

    /// True when this definition is a superset of `required` on all three
    /// masks.
    pub fn contains_all(&self, required: &Definition) -> bool {
        self.components.contains_all(&required.components)
            && self.arrays.contains_all(&required.arrays)
            && self.tags.contains_all(&required.tags)
    }

    /// True when this definition shares any bit with `other` on any mask.
    pub fn intersects(&self, other: &Definition) -> bool {
        self.components.contains_any(&other.components)
            || self.arrays.contains_any(&other.arrays)
            || self.tags.contains_any(&other.tags)
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.arrays.is_empty() && self.tags.is_empty()
    }

    /// Stable 64-bit hash chaining the three mask hashes.
    pub fn hash64(&self) -> u64 {
        let mut h = self.components.hash64();
        h = h.rotate_left(17) ^ self.arrays.hash64();
        h = h.rotate_left(17) ^ self.tags.hash64();
        h
    }
}

impl Hash for Definition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash64());
    }
}

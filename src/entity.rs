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

//! Entity identifiers and location metadata.

use std::fmt;

use smallvec::SmallVec;

/// Entity identifier: a 32-bit id unique within a [`World`](crate::World)
/// while the entity is alive. Id 0 is the reserved null sentinel; ids are
/// recycled LIFO after destruction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u32);

impl EntityId {
    /// The reserved null entity. Never live; used as the "no parent" sentinel.
    pub const NULL: EntityId = EntityId(0);

    pub(crate) fn new(raw: u32) -> Self {
        EntityId(raw)
    }

    /// Raw id value.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Returns true for the reserved null id.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Slot-table index.
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Entity location: chunk arena index plus row within the chunk.
///
/// Rows are stable only until a swap-remove moves another entity into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub chunk: usize,
    pub row: usize,
}

/// Slot-table entry. One per allocated id; slot 0 is reserved.
pub(crate) struct Slot {
    pub chunk: u32,
    pub row: u32,
    pub generation: u32,
    pub parent: EntityId,
    pub references: SmallVec<[EntityId; 4]>,
    pub live: bool,
}

impl Slot {
    pub(crate) fn vacant() -> Self {
        Slot {
            chunk: 0,
            row: 0,
            generation: 0,
            parent: EntityId::NULL,
            references: SmallVec::new(),
            live: false,
        }
    }

    pub(crate) fn location(&self) -> Location {
        Location {
            chunk: self.chunk as usize,
            row: self.row as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sentinel() {
        assert!(EntityId::NULL.is_null());
        assert_eq!(EntityId::NULL.raw(), 0);
        assert!(!EntityId::new(1).is_null());
    }
}

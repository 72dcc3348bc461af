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

//! Archetype ECS with schema-driven chunk storage.
//!
//! Entities are grouped by their exact composition of components, arrays,
//! and tags (their [`Definition`]); each composition is stored in one densely
//! packed [`Chunk`], and queries filter chunks with three fixed-width bit
//! masks before iterating rows through precomputed offsets.

pub mod chunk;
pub mod chunk_map;
pub mod component;
pub mod definition;
pub mod entity;
pub mod error;
pub mod event;
pub mod mask;
pub mod query;
pub mod schema;
pub mod world;

// Re-exports for convenience
pub use chunk::Chunk;
pub use chunk_map::{ChunkMap, DEFAULT_CHUNK};
pub use component::{Bundle, Component, Disabled, Tag, MAX_BUNDLE_COMPONENTS};
pub use definition::Definition;
pub use entity::{EntityId, Location};
pub use error::{EcsError, Result, SchemaKind};
pub use event::{ChangeKind, CreatedOrDestroyedFn, DataChangedFn, DataKind, ParentChangedFn};
pub use mask::BitMask;
pub use query::{Entity, Query, QueryFetch, QueryIter, QueryPart, QueryState};
pub use schema::{Schema, TypeInfo, DISABLED_TAG};
pub use world::World;

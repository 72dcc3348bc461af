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

//! Error types

use std::fmt;

/// The schema index space an operation ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Component,
    Array,
    Tag,
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaKind::Component => write!(f, "component"),
            SchemaKind::Array => write!(f, "array"),
            SchemaKind::Tag => write!(f, "tag"),
        }
    }
}

/// ECS error type
///
/// All recoverable failures are returned as values; no operation that returns
/// an error leaves the world in a modified state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A schema index space (components, arrays, or tags) reached 256
    CapacityExceeded(SchemaKind),

    /// Type referenced without prior registration
    UnknownType(&'static str),

    /// Entity not found (never created, or already destroyed)
    EntityNotFound,

    /// The entity does not currently carry the requested component
    ComponentMissing,

    /// The entity does not currently carry the requested array
    ArrayMissing,

    /// The entity does not currently carry the requested tag
    TagMissing,

    /// Reparenting would create a cycle
    CycleRejected,

    /// A query iterator observed a chunk version mismatch
    ConcurrentModification,

    /// Array element access past the current length, or an invalid handle
    IndexOutOfRange,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::CapacityExceeded(kind) => {
                write!(f, "{kind} index space exhausted (256 registrations)")
            }
            EcsError::UnknownType(name) => write!(f, "type not registered: {name}"),
            EcsError::EntityNotFound => write!(f, "entity not found"),
            EcsError::ComponentMissing => write!(f, "component not present on entity"),
            EcsError::ArrayMissing => write!(f, "array not present on entity"),
            EcsError::TagMissing => write!(f, "tag not present on entity"),
            EcsError::CycleRejected => write!(f, "parent change would create a cycle"),
            EcsError::ConcurrentModification => {
                write!(f, "chunk structurally modified during query iteration")
            }
            EcsError::IndexOutOfRange => write!(f, "index out of range"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

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

//! Query engine: filter chunks by definition masks, then iterate rows.
//!
//! A query carries a `(required, exclude)` definition pair. The component
//! types named by its type parameter are added to the required mask
//! automatically; builder methods extend either side with further
//! components, arrays, or tags. Iteration snapshots the matching chunks (in
//! chunk-map insertion order) together with their versions, resolves each
//! chunk's component offsets once, and yields items by offset arithmetic.

use std::marker::PhantomData;
use std::ptr::NonNull;

use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::chunk::Chunk;
use crate::component::{Component, Tag};
use crate::definition::Definition;
use crate::entity::EntityId;
use crate::schema::{type_key, Schema, TypeInfo, DISABLED_TAG};
use crate::world::World;

/// Maximum number of component types a query tuple can name.
pub const MAX_QUERY_COMPONENTS: usize = 8;

/// Type-level description of what one query element needs from a chunk.
pub trait QueryPart {
    /// Push the component descriptors this element requires.
    fn component_infos(out: &mut SmallVec<[TypeInfo; MAX_QUERY_COMPONENTS]>);
}

/// Fetches one query element's data out of a matched chunk.
///
/// # Safety
/// Implementations must ensure `fetch` is safe for any `row` below the
/// prepared chunk's length, for as long as the chunk is not structurally
/// mutated.
pub unsafe trait QueryFetch<'w>: QueryPart {
    /// The value yielded per row
    type Item;
    /// Per-chunk cursor (base pointer, stride, offset)
    type State;

    /// Resolve this element's cursor for one chunk, or `None` when the chunk
    /// cannot satisfy it.
    fn prepare(chunk: &mut Chunk, schema: &Schema) -> Option<Self::State>;

    /// Fetch the element at `row`.
    ///
    /// # Safety
    /// `row` must be within the prepared chunk's bounds.
    unsafe fn fetch(state: &mut Self::State, row: usize) -> Self::Item;
}

/// Cursor into a chunk's interleaved rows for shared access.
pub struct ReadCursor {
    base: *const u8,
    stride: usize,
    offset: usize,
}

/// Cursor into a chunk's interleaved rows for exclusive access.
pub struct WriteCursor {
    base: *mut u8,
    stride: usize,
    offset: usize,
}

impl<T: Component> QueryPart for &T {
    fn component_infos(out: &mut SmallVec<[TypeInfo; MAX_QUERY_COMPONENTS]>) {
        out.push(TypeInfo::of::<T>());
    }
}

unsafe impl<'w, T: Component> QueryFetch<'w> for &'w T {
    type Item = &'w T;
    type State = ReadCursor;

    fn prepare(chunk: &mut Chunk, schema: &Schema) -> Option<ReadCursor> {
        let index = schema.component_index_of(type_key::<T>())?;
        let offset = chunk.offset_of(index)?;
        Some(ReadCursor {
            base: chunk.rows_ptr(),
            stride: chunk.row_size(),
            offset,
        })
    }

    unsafe fn fetch(state: &mut ReadCursor, row: usize) -> &'w T {
        &*(state.base.add(row * state.stride + state.offset) as *const T)
    }
}

impl<T: Component> QueryPart for &mut T {
    fn component_infos(out: &mut SmallVec<[TypeInfo; MAX_QUERY_COMPONENTS]>) {
        out.push(TypeInfo::of::<T>());
    }
}

unsafe impl<'w, T: Component> QueryFetch<'w> for &'w mut T {
    type Item = &'w mut T;
    type State = WriteCursor;

    fn prepare(chunk: &mut Chunk, schema: &Schema) -> Option<WriteCursor> {
        let index = schema.component_index_of(type_key::<T>())?;
        let offset = chunk.offset_of(index)?;
        Some(WriteCursor {
            base: chunk.rows_ptr_mut(),
            stride: chunk.row_size(),
            offset,
        })
    }

    unsafe fn fetch(state: &mut WriteCursor, row: usize) -> &'w mut T {
        &mut *(state.base.add(row * state.stride + state.offset) as *mut T)
    }
}

/// Query element yielding the row's entity id.
pub struct Entity;

impl QueryPart for Entity {
    fn component_infos(_out: &mut SmallVec<[TypeInfo; MAX_QUERY_COMPONENTS]>) {}
}

unsafe impl<'w> QueryFetch<'w> for Entity {
    type Item = EntityId;
    type State = *const EntityId;

    fn prepare(chunk: &mut Chunk, _schema: &Schema) -> Option<*const EntityId> {
        Some(chunk.entities_ptr())
    }

    unsafe fn fetch(state: &mut *const EntityId, row: usize) -> EntityId {
        let base = *state;
        *base.add(row)
    }
}

// Tuple implementations. Each element resolves its own cursor; reborrows are
// sequential, so mixed (&A, &mut B) tuples work.
macro_rules! impl_query_tuple {
    ($(($T:ident, $idx:tt)),+) => {
        impl<$($T: QueryPart),+> QueryPart for ($($T,)+) {
            fn component_infos(out: &mut SmallVec<[TypeInfo; MAX_QUERY_COMPONENTS]>) {
                $($T::component_infos(out);)+
            }
        }

        unsafe impl<'w, $($T: QueryFetch<'w>),+> QueryFetch<'w> for ($($T,)+) {
            type Item = ($($T::Item,)+);
            type State = ($($T::State,)+);

            fn prepare(chunk: &mut Chunk, schema: &Schema) -> Option<Self::State> {
                Some(($($T::prepare(&mut *chunk, schema)?,)+))
            }

            unsafe fn fetch(state: &mut Self::State, row: usize) -> Self::Item {
                ($($T::fetch(&mut state.$idx, row),)+)
            }
        }
    };
}

impl_query_tuple!((A, 0));
impl_query_tuple!((A, 0), (B, 1));
impl_query_tuple!((A, 0), (B, 1), (C, 2));
impl_query_tuple!((A, 0), (B, 1), (C, 2), (D, 3));
impl_query_tuple!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_query_tuple!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
impl_query_tuple!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6));
impl_query_tuple!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7));

/// Builder over a `(required, exclude)` definition pair.
///
/// Builder methods are value-returning and idempotent. A type present in
/// both the required and exclude masks yields an empty iteration; that is
/// documented behavior, not an error.
pub struct Query<'w, Q> {
    world: &'w mut World,
    required: Definition,
    exclude: Definition,
    /// Set when an index space overflowed while resolving a filter type; no
    /// chunk can match such a query.
    unsatisfiable: bool,
    _phantom: PhantomData<Q>,
}

impl<'w, Q: QueryPart> Query<'w, Q> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        let mut infos: SmallVec<[TypeInfo; MAX_QUERY_COMPONENTS]> = SmallVec::new();
        Q::component_infos(&mut infos);

        let mut required = Definition::EMPTY;
        let mut unsatisfiable = false;
        for info in &infos {
            match world.schema_mut().register_component_info(*info) {
                Ok(index) => required.components.set(index as usize),
                Err(_) => unsatisfiable = true,
            }
        }

        Query {
            world,
            required,
            exclude: Definition::EMPTY,
            unsatisfiable,
            _phantom: PhantomData,
        }
    }

    /// Require a component beyond the ones named by `Q`.
    pub fn with_component<T: Component>(mut self) -> Self {
        match self.world.schema_mut().register_component::<T>() {
            Ok(index) => self.required.components.set(index as usize),
            Err(_) => self.unsatisfiable = true,
        }
        self
    }

    /// Require an array type.
    pub fn with_array<T: Component>(mut self) -> Self {
        match self.world.schema_mut().register_array::<T>() {
            Ok(index) => self.required.arrays.set(index as usize),
            Err(_) => self.unsatisfiable = true,
        }
        self
    }

    /// Require a tag.
    pub fn with_tag<T: Tag>(mut self) -> Self {
        match self.world.schema_mut().register_tag::<T>() {
            Ok(index) => self.required.tags.set(index as usize),
            Err(_) => self.unsatisfiable = true,
        }
        self
    }

    /// Skip chunks carrying this component.
    pub fn without_component<T: Component>(mut self) -> Self {
        if let Ok(index) = self.world.schema_mut().register_component::<T>() {
            self.exclude.components.set(index as usize);
        }
        self
    }

    /// Skip chunks carrying this array type.
    pub fn without_array<T: Component>(mut self) -> Self {
        if let Ok(index) = self.world.schema_mut().register_array::<T>() {
            self.exclude.arrays.set(index as usize);
        }
        self
    }

    /// Skip chunks carrying this tag.
    pub fn without_tag<T: Tag>(mut self) -> Self {
        if let Ok(index) = self.world.schema_mut().register_tag::<T>() {
            self.exclude.tags.set(index as usize);
        }
        self
    }

    /// Add (`true`) or remove (`false`) the reserved Disabled tag from the
    /// exclude mask.
    pub fn exclude_disabled(mut self, on: bool) -> Self {
        if on {
            self.exclude.tags.set(DISABLED_TAG as usize);
        } else {
            self.exclude.tags.clear(DISABLED_TAG as usize);
        }
        self
    }

    pub fn required(&self) -> &Definition {
        &self.required
    }

    pub fn excluded(&self) -> &Definition {
        &self.exclude
    }

    /// Number of entities the query would yield, without iterating rows.
    pub fn count(&self) -> usize {
        self.matched_chunks()
            .iter()
            .map(|&id| self.world.chunk_map().chunk(id).len())
            .sum()
    }

    fn matched_chunks(&self) -> Vec<usize> {
        if self.unsatisfiable {
            return Vec::new();
        }
        let mut matched = Vec::new();
        for (id, chunk) in self.world.chunk_map().iter().enumerate() {
            if !chunk.is_empty() && filter_matches(chunk.definition(), &self.required, &self.exclude)
            {
                matched.push(id);
            }
        }
        matched
    }

    /// Freeze the filter into a reusable [`QueryState`].
    pub fn into_state(self) -> QueryState<Q> {
        QueryState {
            required: self.required,
            exclude: self.exclude,
            matches: Vec::new(),
            seen_chunks: 0,
            unsatisfiable: self.unsatisfiable,
            _phantom: PhantomData,
        }
    }

    /// Snapshot the matching chunks and iterate their rows.
    pub fn iter(self) -> QueryIter<'w, Q>
    where
        Q: QueryFetch<'w>,
    {
        let matched = self.matched_chunks();

        #[cfg(feature = "profiling")]
        let span = info_span!("query.capture", chunks = matched.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let world = self.world;
        let mut chunks = Vec::with_capacity(matched.len());
        for id in matched {
            let ptr = world.chunk_ptr(id);
            // SAFETY: the pointer was just produced from the live chunk map
            let version = unsafe { ptr.as_ref() }.version();
            chunks.push(ChunkCapture { ptr, version });
        }
        let schema = NonNull::from(world.schema());

        QueryIter {
            chunks,
            schema,
            chunk_index: 0,
            row: 0,
            state: None,
            _phantom: PhantomData,
        }
    }
}

impl<'w, Q> IntoIterator for Query<'w, Q>
where
    Q: QueryPart + QueryFetch<'w>,
{
    type Item = <Q as QueryFetch<'w>>::Item;
    type IntoIter = QueryIter<'w, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn filter_matches(definition: &Definition, required: &Definition, exclude: &Definition) -> bool {
    definition.contains_all(required) && !definition.intersects(exclude)
}

/// Cached chunk matches for a fixed filter.
///
/// A chunk's definition never changes, so a chunk matched once matches
/// forever; refreshing the cache only scans chunks created since the last
/// use. Build one during setup and reuse it every frame instead of
/// re-filtering the whole chunk map per query.
///
/// ```ignore
/// struct MovementSystem {
///     state: QueryState<(&'static mut Position, &'static Velocity)>,
/// }
///
/// impl MovementSystem {
///     fn run(&mut self, world: &mut World) {
///         for (pos, vel) in self.state.iter(world) {
///             pos.x += vel.x;
///             pos.y += vel.y;
///         }
///     }
/// }
/// ```
pub struct QueryState<Q> {
    required: Definition,
    exclude: Definition,
    matches: Vec<usize>,
    seen_chunks: usize,
    unsatisfiable: bool,
    _phantom: PhantomData<Q>,
}

impl<Q: QueryPart> QueryState<Q> {
    /// Build a state from `Q`'s component types alone. Use
    /// [`Query::into_state`] to carry builder filters over.
    pub fn new(world: &mut World) -> Self {
        Query::<Q>::new(world).into_state()
    }

    /// Scan chunks created since the last refresh.
    fn refresh(&mut self, world: &World) {
        if self.unsatisfiable {
            return;
        }
        let total = world.chunk_map().len();
        for id in self.seen_chunks..total {
            let chunk = world.chunk_map().chunk(id);
            if filter_matches(chunk.definition(), &self.required, &self.exclude) {
                self.matches.push(id);
            }
        }
        self.seen_chunks = total;
    }

    /// Number of entities the filter currently matches.
    pub fn count(&mut self, world: &World) -> usize {
        self.refresh(world);
        self.matches
            .iter()
            .map(|&id| world.chunk_map().chunk(id).len())
            .sum()
    }

    /// Snapshot the cached matches and iterate their rows.
    pub fn iter<'w>(&mut self, world: &'w mut World) -> QueryIter<'w, Q>
    where
        Q: QueryFetch<'w>,
    {
        self.refresh(world);

        let mut chunks = Vec::with_capacity(self.matches.len());
        for &id in &self.matches {
            let ptr = world.chunk_ptr(id);
            // SAFETY: cached indices stay valid; chunks are never dropped
            let chunk = unsafe { ptr.as_ref() };
            if chunk.is_empty() {
                continue;
            }
            let version = chunk.version();
            chunks.push(ChunkCapture { ptr, version });
        }
        let schema = NonNull::from(world.schema());

        QueryIter {
            chunks,
            schema,
            chunk_index: 0,
            row: 0,
            state: None,
            _phantom: PhantomData,
        }
    }
}

struct ChunkCapture {
    ptr: NonNull<Chunk>,
    version: u32,
}

/// Row iterator over a query's chunk snapshot.
///
/// Holds the world borrow for its lifetime; dropping it mid-iteration is
/// safe and releases the snapshot. In debug builds every `next()` checks the
/// current chunk's version against the snapshot and panics on structural
/// modification; release builds skip the check, and mutating a captured
/// chunk through unsafe code while iterating is undefined.
pub struct QueryIter<'w, Q: QueryFetch<'w>> {
    chunks: Vec<ChunkCapture>,
    schema: NonNull<Schema>,
    chunk_index: usize,
    row: usize,
    state: Option<Q::State>,
    _phantom: PhantomData<&'w mut World>,
}

impl<'w, Q: QueryFetch<'w>> Iterator for QueryIter<'w, Q> {
    type Item = <Q as QueryFetch<'w>>::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Resolve cursors for the next captured chunk
            if self.state.is_none() {
                let capture = self.chunks.get(self.chunk_index)?;
                // SAFETY: captures point into the chunk map, which cannot
                // move or drop chunks while the world is borrowed here
                let chunk = unsafe { &mut *capture.ptr.as_ptr() };
                let schema = unsafe { self.schema.as_ref() };
                self.state = Q::prepare(chunk, schema);
                self.row = 0;

                if self.state.is_none() {
                    self.chunk_index += 1;
                    continue;
                }
            }

            let capture = &self.chunks[self.chunk_index];
            // SAFETY: as above
            let chunk = unsafe { capture.ptr.as_ref() };

            #[cfg(debug_assertions)]
            if chunk.version() != capture.version {
                panic!("{}", crate::error::EcsError::ConcurrentModification);
            }

            if self.row >= chunk.len() {
                self.state = None;
                self.chunk_index += 1;
                continue;
            }

            let row = self.row;
            self.row += 1;

            // SAFETY: row bounds checked against the unmodified chunk
            return Some(unsafe { Q::fetch(self.state.as_mut().unwrap(), row) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[test]
    fn query_yields_matching_rows_in_order() -> crate::Result<()> {
        let mut world = World::new();
        for i in 0..3 {
            world.create_entity_with((Position { x: i as f32, y: i as f32 },))?;
        }

        let xs: Vec<f32> = world.query::<&Position>().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
        Ok(())
    }

    #[test]
    fn mutable_iteration_writes_through() -> crate::Result<()> {
        let mut world = World::new();
        let entity = world.create_entity_with((
            Position { x: 0.0, y: 0.0 },
            Velocity { x: 2.0, y: 3.0 },
        ))?;

        for (pos, vel) in world.query::<(&mut Position, &Velocity)>().iter() {
            pos.x += vel.x;
            pos.y += vel.y;
        }

        assert_eq!(world.component::<Position>(entity)?, &Position { x: 2.0, y: 3.0 });
        Ok(())
    }

    #[test]
    fn entity_marker_yields_ids() -> crate::Result<()> {
        let mut world = World::new();
        let a = world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;
        let b = world.create_entity_with((Position { x: 1.0, y: 0.0 },))?;

        let ids: Vec<EntityId> = world
            .query::<(Entity, &Position)>()
            .iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![a, b]);
        Ok(())
    }

    #[test]
    fn exclude_mask_filters_chunks() -> crate::Result<()> {
        let mut world = World::new();
        world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;
        world.create_entity_with((Position { x: 1.0, y: 0.0 }, Velocity { x: 0.0, y: 0.0 }))?;

        let count = world.query::<&Position>().without_component::<Velocity>().count();
        assert_eq!(count, 1);
        Ok(())
    }

    #[test]
    fn required_and_excluded_same_type_is_empty() -> crate::Result<()> {
        let mut world = World::new();
        world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;

        let count = world.query::<&Position>().without_component::<Position>().count();
        assert_eq!(count, 0);
        Ok(())
    }

    #[test]
    fn empty_required_with_exclude_scans_all_chunks() -> crate::Result<()> {
        let mut world = World::new();
        let plain = world.create_entity();
        world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;

        let ids: Vec<EntityId> = world
            .query::<Entity>()
            .without_component::<Position>()
            .iter()
            .collect();
        assert_eq!(ids, vec![plain]);
        Ok(())
    }

    #[test]
    fn query_state_picks_up_new_chunks_incrementally() -> crate::Result<()> {
        let mut world = World::new();
        world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;

        let mut state = QueryState::<(Entity, &Position)>::new(&mut world);
        assert_eq!(state.count(&world), 1);

        // A new matching composition appears after the state was built
        let late = world.create_entity_with((
            Position { x: 1.0, y: 0.0 },
            Velocity { x: 0.0, y: 0.0 },
        ))?;

        let ids: Vec<EntityId> = state.iter(&mut world).map(|(id, _)| id).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], late);
        Ok(())
    }

    #[test]
    fn query_state_keeps_builder_filters() -> crate::Result<()> {
        let mut world = World::new();
        let kept = world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;
        let disabled = world.create_entity_with((Position { x: 1.0, y: 0.0 },))?;
        world.disable(disabled)?;

        let mut state = world
            .query::<(Entity, &Position)>()
            .exclude_disabled(true)
            .into_state();

        let ids: Vec<EntityId> = state.iter(&mut world).map(|(id, _)| id).collect();
        assert_eq!(ids, vec![kept]);

        // Skips chunks that have since drained to empty
        world.destroy_entity(kept)?;
        assert_eq!(state.count(&world), 0);
        Ok(())
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "structurally modified")]
    fn iteration_detects_structural_mutation() {
        let mut world = World::new();
        world
            .create_entity_with((Position { x: 0.0, y: 0.0 },))
            .unwrap();

        let world_ptr: *mut World = &mut world;
        let mut iter = world.query::<&Position>().iter();

        // Deliberately bypass the borrow that normally makes this
        // unrepresentable: grow the captured chunk mid-iteration
        unsafe {
            (*world_ptr)
                .create_entity_with((Position { x: 1.0, y: 0.0 },))
                .unwrap();
        }

        let _ = iter.next();
    }

    #[test]
    fn builder_is_idempotent() -> crate::Result<()> {
        let mut world = World::new();
        world.create_entity_with((Position { x: 0.0, y: 0.0 },))?;

        let query = world
            .query::<&Position>()
            .with_component::<Position>()
            .exclude_disabled(true)
            .exclude_disabled(true)
            .exclude_disabled(false);
        assert!(query.excluded().tags.is_empty());
        assert_eq!(query.count(), 1);
        Ok(())
    }
}

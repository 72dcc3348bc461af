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

//! Component, tag, and bundle contracts.
//!
//! Components and array elements are plain-old-data values: the store moves
//! them between chunks as raw bytes and never runs destructors. Tags are
//! zero-sized markers with their own index space.

use smallvec::{smallvec, SmallVec};

use crate::schema::TypeInfo;

/// Maximum number of components supported by Bundle implementations
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for component and array element types.
///
/// `Copy` is the plain-old-data contract: no drop glue, no owned
/// indirections, safe to relocate with a byte copy.
pub trait Component: Copy + Send + Sync + 'static {}

/// Automatically implement Component for all valid types
impl<T: Copy + Send + Sync + 'static> Component for T {}

/// Marker trait for tag types. Tags contribute no bytes to a row; the schema
/// asserts they are zero-sized at registration.
pub trait Tag: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Tag for T {}

/// The reserved tag at tag index 0. Queries skip entities carrying it when
/// built with `exclude_disabled(true)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disabled;

/// Bundle of components
///
/// Allows creating entities with multiple components in a single chunk move.
pub trait Bundle: Send + Sync + 'static {
    /// Type descriptors of all components in the bundle, in field order.
    fn type_infos() -> SmallVec<[TypeInfo; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Write components to raw pointers, one per descriptor in
    /// `type_infos()` order.
    ///
    /// # Safety
    /// Caller must ensure pointers are valid for their component's size and
    /// properly aligned.
    unsafe fn write_components(self, ptrs: &[*mut u8]);
}

// Tuple implementations: each field writes through the pointer at its own
// position, so `ptrs` and `type_infos()` stay index-aligned by construction.
macro_rules! impl_bundle {
    ($(($T:ident, $idx:tt)),+) => {
        impl<$($T: Component),+> Bundle for ($($T,)+) {
            fn type_infos() -> SmallVec<[TypeInfo; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(TypeInfo::of::<$T>()),+]
            }

            unsafe fn write_components(self, ptrs: &[*mut u8]) {
                $(std::ptr::write(ptrs[$idx] as *mut $T, self.$idx);)+
            }
        }
    };
}

impl_bundle!((A, 0));
impl_bundle!((A, 0), (B, 1));
impl_bundle!((A, 0), (B, 1), (C, 2));
impl_bundle!((A, 0), (B, 1), (C, 2), (D, 3));
impl_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
impl_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6));
impl_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::type_key;

    #[test]
    fn bundle_reports_infos_in_field_order() {
        #[derive(Debug, Clone, Copy)]
        struct Position {
            _x: f32,
            _y: f32,
        }

        #[derive(Debug, Clone, Copy)]
        struct Velocity {
            _x: f32,
        }

        let infos = <(Position, Velocity)>::type_infos();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].key, type_key::<Position>());
        assert_eq!(infos[1].key, type_key::<Velocity>());
        assert_eq!(infos[0].size, 8);
        assert_eq!(infos[1].size, 4);
    }

    #[test]
    fn write_components_places_values() {
        let mut a = 0u32;
        let mut b = 0u64;
        let ptrs = [&mut a as *mut u32 as *mut u8, &mut b as *mut u64 as *mut u8];
        unsafe { (7u32, 9u64).write_components(&ptrs) };
        assert_eq!(a, 7);
        assert_eq!(b, 9);
    }
}

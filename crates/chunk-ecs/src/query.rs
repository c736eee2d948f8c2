//! Archetype filters and chunk accessors.
//!
//! This module provides the surface an external scheduler or query layer
//! builds on. Filters are built at runtime from type indices, not type-level
//! generics:
//!
//! ```ignore
//! let filter = world.filter().with::<Position>().without::<Frozen>().build();
//!
//! for chunk in world.matching_chunks(&filter) {
//!     let mut accessor = world.chunk_accessor(chunk, &[
//!         ComponentAccess::read(pos),
//!         ComponentAccess::write(vel),
//!     ])?;
//!     let velocities = accessor.column_mut::<Velocity>()?;
//!     // ...
//! }
//! ```
//!
//! # Access Rules
//!
//! - A [`ChunkAccessor`] borrows the world immutably, so no structural change
//!   can run while it lives.
//! - It leases every declared `(chunk, type)` pair: any number of readers or
//!   one writer. Conflicting requests fail fast with `AccessViolation`.
//! - Columns are only handed out for declared types, writable ones only for
//!   `ReadWrite` declarations. Buffer columns are reached through
//!   [`ChunkAccessor::buffer`] handles carrying the accessor's lease.

use std::{fmt, slice};

use bytemuck::Pod;
use smallvec::SmallVec;

use crate::{
    World,
    archetype::{Archetype, ArchetypeId},
    buffer::DynamicBuffer,
    chunk::{Chunk, ChunkId},
    component::{Component, TypeIndex},
    entity::Entity,
    error::{AccessViolation, EcsError, EcsResult},
    safety::{AccessMode, ChunkSafety, LeaseId},
};

// ============================================================================
// Archetype Filters
// ============================================================================

/// Selects archetypes by required and excluded component types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchetypeFilter {
    all: SmallVec<[TypeIndex; 4]>,
    none: SmallVec<[TypeIndex; 4]>,
}

impl ArchetypeFilter {
    /// A filter matching every archetype.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a component type.
    #[must_use]
    pub fn with(mut self, type_index: TypeIndex) -> Self {
        if !self.all.contains(&type_index) {
            self.all.push(type_index);
        }
        self
    }

    /// Exclude a component type.
    #[must_use]
    pub fn without(mut self, type_index: TypeIndex) -> Self {
        if !self.none.contains(&type_index) {
            self.none.push(type_index);
        }
        self
    }

    /// Required types.
    #[must_use]
    pub fn all(&self) -> &[TypeIndex] {
        &self.all
    }

    /// Excluded types.
    #[must_use]
    pub fn none(&self) -> &[TypeIndex] {
        &self.none
    }

    /// Check whether an archetype passes the filter.
    #[must_use]
    pub fn matches(&self, archetype: &Archetype) -> bool {
        self.all.iter().all(|&t| archetype.contains(t))
            && !self.none.iter().any(|&t| archetype.contains(t))
    }
}

/// Builds an [`ArchetypeFilter`] from Rust component types.
pub struct FilterBuilder<'w> {
    world: &'w World,
    filter: ArchetypeFilter,
    error: Option<EcsError>,
}

impl<'w> FilterBuilder<'w> {
    /// Require component `T`.
    #[must_use]
    pub fn with<T: Component>(mut self) -> Self {
        match self.world.register::<T>() {
            Ok(type_index) => self.filter = self.filter.with(type_index),
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Exclude component `T`.
    #[must_use]
    pub fn without<T: Component>(mut self) -> Self {
        match self.world.register::<T>() {
            Ok(type_index) => self.filter = self.filter.without(type_index),
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Finish the filter. Fails if a type could not be registered.
    pub fn build(self) -> EcsResult<ArchetypeFilter> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.filter),
        }
    }
}

impl fmt::Debug for FilterBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterBuilder")
            .field("filter", &self.filter)
            .finish()
    }
}

// ============================================================================
// Chunk Accessor
// ============================================================================

/// One declared capability of a [`ChunkAccessor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentAccess {
    /// Component type.
    pub type_index: TypeIndex,
    /// Requested access.
    pub mode: AccessMode,
}

impl ComponentAccess {
    /// Shared read access to `type_index`.
    #[must_use]
    pub const fn read(type_index: TypeIndex) -> Self {
        Self {
            type_index,
            mode: AccessMode::ReadOnly,
        }
    }

    /// Exclusive write access to `type_index`.
    #[must_use]
    pub const fn write(type_index: TypeIndex) -> Self {
        Self {
            type_index,
            mode: AccessMode::ReadWrite,
        }
    }
}

/// Leased access to the columns of one chunk.
///
/// `Send`, so a scheduler can hand accessors for different chunks (or
/// non-conflicting types of one chunk) to worker threads.
pub struct ChunkAccessor<'w> {
    world: &'w World,
    chunk_id: ChunkId,
    chunk: &'w Chunk,
    safety: &'w ChunkSafety,
    access: SmallVec<[ComponentAccess; 4]>,
    lease: LeaseId,
}

impl<'w> ChunkAccessor<'w> {
    /// The chunk being accessed.
    #[must_use]
    pub const fn chunk_id(&self) -> ChunkId {
        self.chunk_id
    }

    /// Archetype of the chunk.
    #[must_use]
    pub const fn archetype(&self) -> ArchetypeId {
        self.chunk.archetype()
    }

    /// Number of entities in the chunk.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.chunk.count()
    }

    /// Whether the chunk holds no entities.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    /// The entity column. Always readable.
    #[must_use]
    pub fn entities(&self) -> &'w [Entity] {
        self.chunk.entities()
    }

    /// Declared capabilities, one per type.
    #[must_use]
    pub fn access(&self) -> &[ComponentAccess] {
        &self.access
    }

    /// Read a plain-data column.
    pub fn column<T: Component>(&self) -> EcsResult<&[T]> {
        let type_index = self.world.plain_type::<T>()?;
        self.declared(type_index)?;
        let ptr = self.column_ptr(type_index)?;
        // SAFETY: the column holds `count` initialized `T`s; our lease keeps
        // other writers out and `&'w World` keeps the rows in place.
        Ok(unsafe { slice::from_raw_parts(ptr.cast::<T>(), self.chunk.count()) })
    }

    /// Write a plain-data column declared `ReadWrite`.
    pub fn column_mut<T: Component>(&mut self) -> EcsResult<&mut [T]> {
        let type_index = self.world.plain_type::<T>()?;
        if self.declared(type_index)? != AccessMode::ReadWrite {
            return Err(EcsError::AccessViolation {
                type_index,
                violation: AccessViolation::ReadOnly,
            });
        }
        let ptr = self.column_ptr(type_index)?;
        // SAFETY: our write lease excludes every other reader and writer of
        // this column, and `&mut self` excludes aliasing through this accessor.
        Ok(unsafe { slice::from_raw_parts_mut(ptr.cast::<T>(), self.chunk.count()) })
    }

    /// Handle to the buffer of the entity in `slot`. Read-only unless the
    /// type was declared `ReadWrite`.
    pub fn buffer<T: Component + Pod>(&self, slot: usize) -> EcsResult<DynamicBuffer<T>> {
        let type_index = self.world.buffer_type::<T>()?;
        let mode = self.declared(type_index)?;
        self.world.buffer_in_chunk(
            self.chunk_id,
            slot,
            type_index,
            mode == AccessMode::ReadOnly,
            Some(self.lease),
        )
    }

    /// Copy of a chunk-level component.
    pub fn chunk_component<T: Component>(&self) -> EcsResult<T> {
        let type_index = self.world.chunk_data_type::<T>()?;
        self.declared(type_index)?;
        let ptr = self.world.chunk_data_ptr(self.chunk_id, type_index)?;
        // SAFETY: the slot stores a `T` and our lease keeps other writers out.
        Ok(unsafe { ptr.cast::<T>().read_unaligned() })
    }

    /// Overwrite a chunk-level component declared `ReadWrite`.
    pub fn set_chunk_component<T: Component>(&mut self, value: T) -> EcsResult<()> {
        let type_index = self.world.chunk_data_type::<T>()?;
        if self.declared(type_index)? != AccessMode::ReadWrite {
            return Err(EcsError::AccessViolation {
                type_index,
                violation: AccessViolation::ReadOnly,
            });
        }
        let ptr = self.world.chunk_data_ptr(self.chunk_id, type_index)?;
        // SAFETY: our write lease excludes every other access to the slot.
        unsafe { ptr.cast::<T>().write_unaligned(value) };
        Ok(())
    }

    fn declared(&self, type_index: TypeIndex) -> EcsResult<AccessMode> {
        self.access
            .iter()
            .find(|access| access.type_index == type_index)
            .map(|access| access.mode)
            .ok_or(EcsError::AccessViolation {
                type_index,
                violation: AccessViolation::Undeclared,
            })
    }

    fn column_ptr(&self, type_index: TypeIndex) -> EcsResult<*mut u8> {
        self.chunk.column_ptr(type_index).ok_or_else(|| {
            EcsError::InvalidOperation(format!("{:?} has no column {type_index:?}", self.chunk_id))
        })
    }
}

impl Drop for ChunkAccessor<'_> {
    fn drop(&mut self) {
        for access in &self.access {
            self.safety
                .release(access.type_index, access.mode, self.lease);
        }
    }
}

impl fmt::Debug for ChunkAccessor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkAccessor")
            .field("chunk", &self.chunk_id)
            .field("access", &self.access)
            .finish()
    }
}

// ============================================================================
// World Integration
// ============================================================================

impl World {
    // ==================== Query ====================

    /// Start building a filter from Rust component types.
    #[must_use]
    pub fn filter(&self) -> FilterBuilder<'_> {
        FilterBuilder {
            world: self,
            filter: ArchetypeFilter::new(),
            error: None,
        }
    }

    /// Archetypes passing `filter`, empty ones included.
    #[must_use]
    pub fn matching_archetypes(&self, filter: &ArchetypeFilter) -> Vec<ArchetypeId> {
        self.archetypes
            .iter()
            .filter(|archetype| filter.matches(archetype))
            .map(Archetype::id)
            .collect()
    }

    /// Live chunks of every archetype passing `filter`.
    #[must_use]
    pub fn matching_chunks(&self, filter: &ArchetypeFilter) -> Vec<ChunkId> {
        self.archetypes
            .iter()
            .filter(|archetype| filter.matches(archetype))
            .flat_map(|archetype| archetype.chunks().iter().copied())
            .collect()
    }

    /// Number of entities in archetypes passing `filter`.
    #[must_use]
    pub fn count_matching(&self, filter: &ArchetypeFilter) -> usize {
        self.archetypes
            .iter()
            .filter(|archetype| filter.matches(archetype))
            .map(Archetype::entity_count)
            .sum()
    }

    /// Lease `access` on `chunk`.
    ///
    /// Duplicate declarations of a type are merged, the stronger mode
    /// winning. Fails without holding anything if a type is absent from the
    /// chunk or a lease conflicts.
    pub fn chunk_accessor(
        &self,
        chunk: ChunkId,
        access: &[ComponentAccess],
    ) -> EcsResult<ChunkAccessor<'_>> {
        let chunk_ref = self.chunk_ref(chunk)?;
        let safety: &ChunkSafety = self.chunk_safety(chunk)?;
        let archetype = self.archetypes.try_get(chunk_ref.archetype())?;

        let mut merged: SmallVec<[ComponentAccess; 4]> = SmallVec::new();
        for &request in access {
            if !archetype.contains(request.type_index) {
                return Err(EcsError::InvalidOperation(format!(
                    "{chunk:?} has no component {:?}",
                    request.type_index
                )));
            }
            match merged
                .iter_mut()
                .find(|existing| existing.type_index == request.type_index)
            {
                Some(existing) => {
                    if request.mode == AccessMode::ReadWrite {
                        existing.mode = AccessMode::ReadWrite;
                    }
                }
                None => merged.push(request),
            }
        }

        let lease = LeaseId::next();
        for (i, request) in merged.iter().enumerate() {
            if let Err(err) = safety.acquire(request.type_index, request.mode, lease) {
                for acquired in &merged[..i] {
                    safety.release(acquired.type_index, acquired.mode, lease);
                }
                return Err(err);
            }
        }
        tracing::trace!("Leased {:?} for {} type(s)", chunk, merged.len());

        Ok(ChunkAccessor {
            world: self,
            chunk_id: chunk,
            chunk: chunk_ref,
            safety,
            access: merged,
            lease,
        })
    }
}

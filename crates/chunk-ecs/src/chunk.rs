//! Fixed-size chunks: the unit of entity storage.
//!
//! A chunk holds up to `capacity` entities of one archetype as parallel
//! columns inside a single [`CHUNK_SIZE`] block. The layout is
//!
//! ```text
//! [chunk-level data][pad][Entity × cap][pad][column A × cap][pad][column B × cap]...
//! ```
//!
//! Rows `[0, count)` are live. Removal swaps the last row into the hole so the
//! live range stays dense.

use std::{fmt, ptr, sync::Arc};

use crate::{
    archetype::ArchetypeId,
    buffer::BufferHeader,
    component::{ComponentCategory, TypeIndex, TypeInfo},
    entity::Entity,
    error::{EcsError, EcsResult},
    storage::ChunkMemory,
};

/// Total byte budget of a chunk, header included.
pub const CHUNK_SIZE: usize = 16 * 1024;
/// Bytes reserved for the chunk header.
pub const CHUNK_HEADER_SIZE: usize = 64;
/// Bytes available for chunk-level data and columns.
pub const CHUNK_BUFFER_SIZE: usize = CHUNK_SIZE - CHUNK_HEADER_SIZE;
/// Alignment of a chunk's data region; no column may need more.
pub const CHUNK_ALIGN: usize = 64;

/// Stable identifier of a chunk slot in the world's chunk arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(u32);

impl ChunkId {
    /// Create a chunk ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.0)
    }
}

/// Placement of one per-entity column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Component type stored in the column.
    pub type_index: TypeIndex,
    /// Byte offset of row 0 from the start of the data region.
    pub offset: usize,
    /// Bytes per row.
    pub stride: usize,
    /// Element size, for buffer columns.
    pub element_size: usize,
    /// Inline capacity, for buffer columns (0 otherwise).
    pub inline_capacity: usize,
    /// Whether rows hold buffer headers.
    pub is_buffer: bool,
}

/// Placement of one chunk-level value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkDataLayout {
    /// Component type stored.
    pub type_index: TypeIndex,
    /// Byte offset from the start of the data region.
    pub offset: usize,
    /// Value size.
    pub size: usize,
}

/// Byte layout shared by every chunk of an archetype.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkLayout {
    capacity: usize,
    /// Sorted by type index; the entity column is always first.
    columns: Vec<ColumnLayout>,
    chunk_data: Vec<ChunkDataLayout>,
}

impl ChunkLayout {
    /// Compute the layout for an archetype's types (sorted, entity first).
    ///
    /// Fails with `ArchetypeTooLarge` when not even one entity fits.
    pub fn compute(types: &[TypeInfo]) -> EcsResult<Self> {
        let mut cursor: usize = 0;
        let mut chunk_data = Vec::new();
        for info in types.iter().filter(|info| info.is_chunk_data()) {
            let offset = cursor.next_multiple_of(info.align());
            chunk_data.push(ChunkDataLayout {
                type_index: info.index(),
                offset,
                size: info.size(),
            });
            cursor = offset + info.size();
        }

        let per_entity: usize = types.iter().map(TypeInfo::column_size).sum();
        let padding: usize = types
            .iter()
            .filter(|info| info.has_column())
            .map(TypeInfo::column_align)
            .sum();
        let required = cursor + per_entity + padding;
        if per_entity == 0 || required > CHUNK_BUFFER_SIZE {
            return Err(EcsError::ArchetypeTooLarge {
                required,
                budget: CHUNK_BUFFER_SIZE,
            });
        }

        let capacity = (CHUNK_BUFFER_SIZE - cursor - padding) / per_entity;
        let mut columns = Vec::with_capacity(types.len());
        for info in types.iter().filter(|info| info.has_column()) {
            let offset = cursor.next_multiple_of(info.column_align());
            columns.push(ColumnLayout {
                type_index: info.index(),
                offset,
                stride: info.column_size(),
                element_size: info.element_size(),
                inline_capacity: info.inline_capacity(),
                is_buffer: info.category() == ComponentCategory::Buffer,
            });
            cursor = offset + info.column_size() * capacity;
        }
        debug_assert!(cursor <= CHUNK_BUFFER_SIZE);
        debug_assert_eq!(columns.first().map(|c| c.type_index), Some(TypeIndex::ENTITY));

        Ok(Self {
            capacity,
            columns,
            chunk_data,
        })
    }

    /// Layout of the archetype holding only the entity column.
    #[must_use]
    pub fn entity_only() -> Self {
        let stride = size_of::<Entity>();
        Self {
            capacity: (CHUNK_BUFFER_SIZE - align_of::<Entity>()) / stride,
            columns: vec![ColumnLayout {
                type_index: TypeIndex::ENTITY,
                offset: 0,
                stride,
                element_size: stride,
                inline_capacity: 0,
                is_buffer: false,
            }],
            chunk_data: Vec::new(),
        }
    }

    /// Maximum number of entities per chunk.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Per-entity columns, sorted by type index.
    #[must_use]
    pub fn columns(&self) -> &[ColumnLayout] {
        &self.columns
    }

    /// Chunk-level values.
    #[must_use]
    pub fn chunk_data(&self) -> &[ChunkDataLayout] {
        &self.chunk_data
    }

    /// Column of the given type, if it has one.
    #[must_use]
    pub fn column(&self, type_index: TypeIndex) -> Option<&ColumnLayout> {
        self.columns
            .binary_search_by_key(&type_index, |c| c.type_index)
            .ok()
            .map(|i| &self.columns[i])
    }

    /// Chunk-level slot of the given type, if present.
    #[must_use]
    pub fn chunk_data_slot(&self, type_index: TypeIndex) -> Option<&ChunkDataLayout> {
        self.chunk_data.iter().find(|c| c.type_index == type_index)
    }

    fn buffer_columns(&self) -> impl Iterator<Item = &ColumnLayout> {
        self.columns.iter().filter(|c| c.is_buffer)
    }
}

/// A block of entities belonging to one archetype.
pub struct Chunk {
    memory: ChunkMemory,
    layout: Arc<ChunkLayout>,
    archetype: ArchetypeId,
    count: usize,
}

impl Chunk {
    pub(crate) const fn new(
        memory: ChunkMemory,
        layout: Arc<ChunkLayout>,
        archetype: ArchetypeId,
    ) -> Self {
        Self {
            memory,
            layout,
            archetype,
            count: 0,
        }
    }

    /// Archetype owning this chunk.
    #[must_use]
    pub const fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    /// Number of live entities.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Maximum number of entities.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.layout.capacity()
    }

    /// Whether no entities are stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether no more entities fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count == self.layout.capacity()
    }

    /// The chunk's layout.
    #[must_use]
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// The dense entity column.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        let column = &self.layout.columns[0];
        // SAFETY: column 0 is the entity column; rows [0, count) are initialized
        // and the data region is aligned for `Entity`.
        unsafe {
            std::slice::from_raw_parts(
                self.memory.as_ptr().add(column.offset).cast::<Entity>(),
                self.count,
            )
        }
    }

    /// Pointer to a row of a column. `slot` may equal `count` for a new row.
    pub(crate) fn row_ptr(&self, type_index: TypeIndex, slot: usize) -> Option<*mut u8> {
        let column = self.layout.column(type_index)?;
        debug_assert!(slot < self.layout.capacity);
        // SAFETY: offset + slot * stride stays within the data region.
        Some(unsafe { self.memory.as_ptr().add(column.offset + slot * column.stride) })
    }

    /// Pointer to the first row of a column.
    pub(crate) fn column_ptr(&self, type_index: TypeIndex) -> Option<*mut u8> {
        self.row_ptr(type_index, 0)
    }

    /// Pointer to a chunk-level value.
    pub(crate) fn chunk_data_ptr(&self, type_index: TypeIndex) -> Option<*mut u8> {
        let slot = self.layout.chunk_data_slot(type_index)?;
        // SAFETY: chunk data sits at the start of the data region.
        Some(unsafe { self.memory.as_ptr().add(slot.offset) })
    }

    /// Append a zero-initialized row; returns its slot. The entity column
    /// holds [`Entity::NULL`] until [`Chunk::set_entity`] is called.
    pub(crate) fn push_zeroed(&mut self) -> usize {
        debug_assert!(!self.is_full());
        let slot = self.count;
        let base = self.memory.as_ptr();
        for column in &self.layout.columns {
            // SAFETY: slot < capacity, so the row lies inside the column.
            unsafe {
                let row = base.add(column.offset + slot * column.stride);
                ptr::write_bytes(row, 0, column.stride);
                if column.is_buffer {
                    BufferHeader::init(row.cast(), column.inline_capacity);
                }
            }
        }
        self.count += 1;
        slot
    }

    /// Write the entity stored in `slot`.
    pub(crate) fn set_entity(&mut self, slot: usize, entity: Entity) {
        debug_assert!(slot < self.count);
        // SAFETY: column 0 is the entity column and slot is in bounds.
        unsafe {
            self.memory
                .as_ptr()
                .add(self.layout.columns[0].offset)
                .cast::<Entity>()
                .add(slot)
                .write(entity);
        }
    }

    /// Remove a row by moving the last row into it.
    ///
    /// Heap blocks owned by the removed row are NOT released; callers either
    /// transferred them or release them first with [`Chunk::release_buffers`].
    /// Returns the entity that moved into `slot`, if any.
    pub(crate) fn swap_remove(&mut self, slot: usize) -> Option<Entity> {
        debug_assert!(slot < self.count);
        let last = self.count - 1;
        self.count = last;
        if slot == last {
            return None;
        }
        let base = self.memory.as_ptr();
        for column in &self.layout.columns {
            // SAFETY: both rows are in bounds and distinct.
            unsafe {
                ptr::copy_nonoverlapping(
                    base.add(column.offset + last * column.stride),
                    base.add(column.offset + slot * column.stride),
                    column.stride,
                );
            }
        }
        Some(self.entities()[slot])
    }

    /// Free heap blocks owned by buffers in `slot`.
    pub(crate) fn release_buffers(&mut self, slot: usize) {
        let base = self.memory.as_ptr();
        for column in self.layout.buffer_columns() {
            // SAFETY: the row holds an initialized buffer header.
            unsafe {
                let header = &mut *base
                    .add(column.offset + slot * column.stride)
                    .cast::<BufferHeader>();
                header.release(column.element_size, column.inline_capacity);
            }
        }
    }

    /// Free heap blocks owned by one buffer column in `slot`.
    pub(crate) fn release_buffer(&mut self, type_index: TypeIndex, slot: usize) {
        let Some(column) = self.layout.column(type_index).copied() else {
            return;
        };
        if !column.is_buffer {
            return;
        }
        // SAFETY: the row holds an initialized buffer header.
        unsafe {
            let header = &mut *self
                .memory
                .as_ptr()
                .add(column.offset + slot * column.stride)
                .cast::<BufferHeader>();
            header.release(column.element_size, column.inline_capacity);
        }
    }

    /// Copy the columns both chunks share from `src[src_slot]` into
    /// `self[dst_slot]`, entity column excluded. Heap ownership moves with
    /// the header bytes.
    pub(crate) fn copy_row_from(&mut self, dst_slot: usize, src: &Self, src_slot: usize) {
        // SAFETY: distinct chunks never overlap; both slots are in bounds.
        unsafe {
            copy_row(
                self.memory.as_ptr(),
                &self.layout,
                dst_slot,
                src.memory.as_ptr(),
                &src.layout,
                src_slot,
            );
        }
    }

    /// Clone `src[src_slot]` into `self[dst_slot]`, deep-copying heap blocks so
    /// both rows own their storage.
    pub(crate) fn clone_row_from(&mut self, dst_slot: usize, src: &Self, src_slot: usize) {
        self.copy_row_from(dst_slot, src, src_slot);
        self.detach_buffers(dst_slot);
    }

    /// Clone a row of this chunk into another row of the same chunk.
    pub(crate) fn clone_row_within(&mut self, dst_slot: usize, src_slot: usize) {
        debug_assert_ne!(dst_slot, src_slot);
        let base = self.memory.as_ptr();
        // SAFETY: distinct rows of one chunk never overlap.
        unsafe {
            copy_row(base, &self.layout, dst_slot, base, &self.layout, src_slot);
        }
        self.detach_buffers(dst_slot);
    }

    fn detach_buffers(&mut self, slot: usize) {
        let base = self.memory.as_ptr();
        for column in self.layout.buffer_columns() {
            // SAFETY: the row holds a header copied from a live row.
            unsafe {
                let header = &mut *base
                    .add(column.offset + slot * column.stride)
                    .cast::<BufferHeader>();
                header.detach_heap(column.element_size);
            }
        }
    }

    /// Copy a chunk-level value from another chunk if both carry the type.
    pub(crate) fn copy_chunk_data_from(&mut self, src: &Self) {
        let dst_base = self.memory.as_ptr();
        for slot in &self.layout.chunk_data {
            if let Some(source) = src.layout.chunk_data_slot(slot.type_index) {
                // SAFETY: both values are in bounds of distinct chunks.
                unsafe {
                    ptr::copy_nonoverlapping(
                        src.memory.as_ptr().add(source.offset),
                        dst_base.add(slot.offset),
                        slot.size,
                    );
                }
            }
        }
    }

    /// Release every owned heap block. Used on world teardown.
    pub(crate) fn release_all_buffers(&mut self) {
        for slot in 0..self.count {
            self.release_buffers(slot);
        }
    }

    pub(crate) fn into_memory(self) -> ChunkMemory {
        self.memory
    }
}

/// Copy every column present in both layouts, skipping the entity column.
///
/// # Safety
///
/// Both slots must be in bounds and the two rows must not overlap.
unsafe fn copy_row(
    dst_base: *mut u8,
    dst_layout: &ChunkLayout,
    dst_slot: usize,
    src_base: *const u8,
    src_layout: &ChunkLayout,
    src_slot: usize,
) {
    for column in dst_layout.columns.iter().skip(1) {
        let Some(source) = src_layout.column(column.type_index) else {
            continue;
        };
        debug_assert_eq!(source.stride, column.stride);
        // SAFETY: guaranteed by the caller.
        unsafe {
            ptr::copy_nonoverlapping(
                src_base.add(source.offset + src_slot * source.stride),
                dst_base.add(column.offset + dst_slot * column.stride),
                column.stride,
            );
        }
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("archetype", &self.archetype)
            .field("count", &self.count)
            .field("capacity", &self.layout.capacity)
            .finish()
    }
}

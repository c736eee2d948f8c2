//! Dynamic buffers: growable per-entity sequences stored inline in chunks.
//!
//! Each buffer column row is a [`BufferHeader`] followed by room for
//! `inline_capacity` elements. Once the length outgrows the inline storage the
//! elements move to a heap block owned by the header; `trim_excess` can bring
//! them back.
//!
//! Handles do not borrow the world. Instead they capture the chunk's
//! structural epoch and revalidate it on every call, so a handle used after
//! its entity moved fails with `StaleView` rather than touching freed memory.

use std::{alloc::Layout, fmt, marker::PhantomData, ptr, ptr::NonNull, sync::Arc};

use bytemuck::Pod;

use crate::{
    component::{Component, TypeIndex},
    entity::Entity,
    error::{AccessViolation, EcsError, EcsResult},
    safety::{AccessGuard, AccessMode, ChunkSafety, LeaseId},
    world::World,
};

/// Bytes occupied by a buffer header in a chunk row.
pub const BUFFER_HEADER_SIZE: usize = 16;
/// Alignment of heap blocks; element types may not need more.
pub const BUFFER_HEAP_ALIGN: usize = 16;

/// Per-entity buffer header, followed in the chunk by the inline elements.
#[repr(C, align(8))]
pub(crate) struct BufferHeader {
    /// Heap block, or null while the elements are inline.
    heap: *mut u8,
    length: u32,
    capacity: u32,
}

const _: () = assert!(size_of::<BufferHeader>() == BUFFER_HEADER_SIZE);

impl BufferHeader {
    /// Initialize an empty inline buffer.
    ///
    /// # Safety
    ///
    /// `header` must point to a writable buffer row.
    pub(crate) unsafe fn init(header: *mut Self, inline_capacity: usize) {
        // SAFETY: guaranteed by the caller.
        unsafe {
            header.write(Self {
                heap: ptr::null_mut(),
                length: 0,
                capacity: inline_capacity as u32,
            });
        }
    }

    /// Pointer to the elements, wherever they currently live.
    ///
    /// # Safety
    ///
    /// `header` must point to an initialized header inside its chunk row.
    unsafe fn data(header: *mut Self) -> *mut u8 {
        // SAFETY: inline storage directly follows the header in the row.
        unsafe {
            let heap = (*header).heap;
            if heap.is_null() {
                header.cast::<u8>().add(BUFFER_HEADER_SIZE)
            } else {
                heap
            }
        }
    }

    /// Free the heap block, if any, and reset to an empty inline buffer.
    pub(crate) fn release(&mut self, element_size: usize, inline_capacity: usize) {
        if !self.heap.is_null() {
            // SAFETY: the block was allocated by `alloc_heap` for this capacity.
            unsafe { free_heap(self.heap, self.capacity as usize, element_size) };
        }
        self.heap = ptr::null_mut();
        self.length = 0;
        self.capacity = inline_capacity as u32;
    }

    /// Replace a heap block shared with another header by a private copy.
    pub(crate) fn detach_heap(&mut self, element_size: usize) {
        if self.heap.is_null() {
            return;
        }
        let capacity = self.capacity as usize;
        // SAFETY: the layout was valid when the shared block was allocated.
        unsafe {
            let block = alloc_heap(heap_layout_unchecked(capacity, element_size));
            ptr::copy_nonoverlapping(self.heap, block, self.length as usize * element_size);
            self.heap = block;
        }
    }
}

fn heap_layout(capacity: usize, element_size: usize) -> EcsResult<Layout> {
    capacity
        .checked_mul(element_size)
        .and_then(|size| Layout::from_size_align(size, BUFFER_HEAP_ALIGN).ok())
        .ok_or_else(|| EcsError::InvalidOperation(format!("buffer capacity {capacity} overflows")))
}

/// # Safety
///
/// The same layout must have been accepted by [`heap_layout`] before.
unsafe fn heap_layout_unchecked(capacity: usize, element_size: usize) -> Layout {
    // SAFETY: guaranteed by the caller.
    unsafe { Layout::from_size_align_unchecked(capacity * element_size, BUFFER_HEAP_ALIGN) }
}

/// # Safety
///
/// `layout` must have non-zero size.
unsafe fn alloc_heap(layout: Layout) -> *mut u8 {
    // SAFETY: guaranteed by the caller.
    let block = unsafe { std::alloc::alloc(layout) };
    if block.is_null() {
        std::alloc::handle_alloc_error(layout);
    }
    block
}

/// # Safety
///
/// `block` must come from [`alloc_heap`] with the same capacity and element size.
unsafe fn free_heap(block: *mut u8, capacity: usize, element_size: usize) {
    // SAFETY: guaranteed by the caller.
    unsafe { std::alloc::dealloc(block, heap_layout_unchecked(capacity, element_size)) };
}

fn out_of_range(index: usize, count: usize, len: usize) -> EcsError {
    EcsError::IndexOutOfRange { index, count, len }
}

fn read_only(type_index: TypeIndex) -> EcsError {
    EcsError::AccessViolation {
        type_index,
        violation: AccessViolation::ReadOnly,
    }
}

/// Handle to one entity's dynamic buffer.
///
/// Cheap to clone, not `Send`. Every method revalidates the handle and fails
/// with `StaleView` once the owning chunk saw a structural change.
pub struct DynamicBuffer<T> {
    header: NonNull<BufferHeader>,
    safety: Arc<ChunkSafety>,
    epoch: u64,
    type_index: TypeIndex,
    inline_capacity: usize,
    read_only: bool,
    lease: Option<LeaseId>,
    _marker: PhantomData<*mut T>,
}

impl<T> Clone for DynamicBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            header: self.header,
            safety: Arc::clone(&self.safety),
            epoch: self.epoch,
            type_index: self.type_index,
            inline_capacity: self.inline_capacity,
            read_only: self.read_only,
            lease: self.lease,
            _marker: PhantomData,
        }
    }
}

impl<T: Pod> DynamicBuffer<T> {
    /// # Safety
    ///
    /// `header` must point to an initialized header of a `T` buffer in the
    /// chunk guarded by `safety`, valid until that chunk's structural epoch
    /// moves on.
    pub(crate) unsafe fn new(
        header: NonNull<BufferHeader>,
        safety: Arc<ChunkSafety>,
        type_index: TypeIndex,
        inline_capacity: usize,
        read_only: bool,
        lease: Option<LeaseId>,
    ) -> Self {
        let epoch = safety.structural_epoch();
        Self {
            header,
            safety,
            epoch,
            type_index,
            inline_capacity,
            read_only,
            lease,
            _marker: PhantomData,
        }
    }

    /// Whether writes through this handle are rejected.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Component type of the buffer.
    #[must_use]
    pub const fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    /// Declared inline capacity.
    #[must_use]
    pub const fn inline_capacity(&self) -> usize {
        self.inline_capacity
    }

    fn read(&self) -> EcsResult<AccessGuard<'_>> {
        let guard = self.safety.read_access(self.type_index, self.lease)?;
        self.safety.check_structural(self.epoch)?;
        Ok(guard)
    }

    fn write(&self) -> EcsResult<AccessGuard<'_>> {
        if self.read_only {
            return Err(read_only(self.type_index));
        }
        let guard = self.safety.write_access(self.type_index, self.lease)?;
        self.safety.check_structural(self.epoch)?;
        Ok(guard)
    }

    fn raw(&self) -> *mut BufferHeader {
        self.header.as_ptr()
    }

    // The helpers below require a live header and an access guard.

    unsafe fn raw_len(&self) -> usize {
        // SAFETY: guaranteed by the caller.
        unsafe { (*self.raw()).length as usize }
    }

    unsafe fn raw_capacity(&self) -> usize {
        // SAFETY: guaranteed by the caller.
        unsafe { (*self.raw()).capacity as usize }
    }

    unsafe fn set_len(&self, len: usize) {
        // SAFETY: guaranteed by the caller; len never exceeds the u32 capacity.
        unsafe { (*self.raw()).length = len as u32 };
    }

    unsafe fn data(&self) -> *mut T {
        // SAFETY: guaranteed by the caller.
        unsafe { BufferHeader::data(self.raw()).cast() }
    }

    /// Move the elements to a heap block of exactly `capacity` elements.
    unsafe fn reallocate(&self, capacity: usize) -> EcsResult<()> {
        let capacity_u32 = u32::try_from(capacity)
            .map_err(|_| EcsError::InvalidOperation(format!("buffer capacity {capacity} overflows")))?;
        let layout = heap_layout(capacity, size_of::<T>())?;
        // SAFETY: guaranteed by the caller; the new block holds at least `len`
        // elements and never overlaps the old storage.
        unsafe {
            let len = self.raw_len();
            debug_assert!(capacity >= len && capacity > 0);
            let block = alloc_heap(layout);
            ptr::copy_nonoverlapping(self.data().cast::<u8>(), block, len * size_of::<T>());
            let header = self.raw();
            if !(*header).heap.is_null() {
                free_heap((*header).heap, (*header).capacity as usize, size_of::<T>());
            }
            (*header).heap = block;
            (*header).capacity = capacity_u32;
        }
        self.safety.bump_content();
        Ok(())
    }

    /// Grow so that `required` elements fit: at least double the capacity.
    unsafe fn grow(&self, required: usize) -> EcsResult<()> {
        // SAFETY: guaranteed by the caller.
        let capacity = unsafe { self.raw_capacity() };
        if required <= capacity {
            return Ok(());
        }
        // SAFETY: guaranteed by the caller.
        unsafe { self.reallocate(required.max(capacity.saturating_mul(2))) }
    }

    /// Number of elements.
    pub fn len(&self) -> EcsResult<usize> {
        let _guard = self.read()?;
        // SAFETY: validated above.
        Ok(unsafe { self.raw_len() })
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> EcsResult<bool> {
        self.len().map(|len| len == 0)
    }

    /// Number of elements that fit without reallocating.
    pub fn capacity(&self) -> EcsResult<usize> {
        let _guard = self.read()?;
        // SAFETY: validated above.
        Ok(unsafe { self.raw_capacity() })
    }

    /// Whether the elements currently live on the heap.
    pub fn is_overflowed(&self) -> EcsResult<bool> {
        let _guard = self.read()?;
        // SAFETY: validated above.
        Ok(unsafe { !(*self.raw()).heap.is_null() })
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> EcsResult<T> {
        let _guard = self.read()?;
        // SAFETY: validated above; index checked against the length.
        unsafe {
            let len = self.raw_len();
            if index >= len {
                return Err(out_of_range(index, 1, len));
            }
            Ok(self.data().add(index).read())
        }
    }

    /// Overwrite the element at `index`. Exported arrays stay valid.
    pub fn set(&mut self, index: usize, value: T) -> EcsResult<()> {
        let _guard = self.write()?;
        // SAFETY: validated above; index checked against the length.
        unsafe {
            let len = self.raw_len();
            if index >= len {
                return Err(out_of_range(index, 1, len));
            }
            self.data().add(index).write(value);
        }
        Ok(())
    }

    /// Append an element.
    pub fn add(&mut self, value: T) -> EcsResult<usize> {
        let _guard = self.write()?;
        // SAFETY: validated above; capacity ensured before the write.
        unsafe {
            let len = self.raw_len();
            self.grow(len + 1)?;
            self.data().add(len).write(value);
            self.set_len(len + 1);
            self.safety.bump_content();
            Ok(len)
        }
    }

    /// Append every element of `values`.
    pub fn add_range(&mut self, values: &[T]) -> EcsResult<()> {
        let _guard = self.write()?;
        // SAFETY: validated above; capacity ensured before the copy, and the
        // source slice cannot alias chunk storage through a safe API.
        unsafe {
            let len = self.raw_len();
            self.grow(len + values.len())?;
            ptr::copy_nonoverlapping(values.as_ptr(), self.data().add(len), values.len());
            self.set_len(len + values.len());
        }
        self.safety.bump_content();
        Ok(())
    }

    /// Insert `value` at `index`, shifting later elements up.
    pub fn insert(&mut self, index: usize, value: T) -> EcsResult<()> {
        let _guard = self.write()?;
        // SAFETY: validated above; index <= len and capacity ensured.
        unsafe {
            let len = self.raw_len();
            if index > len {
                return Err(out_of_range(index, 1, len));
            }
            self.grow(len + 1)?;
            let data = self.data();
            ptr::copy(data.add(index), data.add(index + 1), len - index);
            data.add(index).write(value);
            self.set_len(len + 1);
        }
        self.safety.bump_content();
        Ok(())
    }

    /// Remove the element at `index`, shifting later elements down.
    pub fn remove_at(&mut self, index: usize) -> EcsResult<T> {
        let _guard = self.write()?;
        // SAFETY: validated above; index < len.
        let removed = unsafe {
            let len = self.raw_len();
            if index >= len {
                return Err(out_of_range(index, 1, len));
            }
            let data = self.data();
            let removed = data.add(index).read();
            ptr::copy(data.add(index + 1), data.add(index), len - index - 1);
            self.set_len(len - 1);
            removed
        };
        self.safety.bump_content();
        Ok(removed)
    }

    /// Remove the element at `index`, moving the last element into its place.
    pub fn remove_at_swap_back(&mut self, index: usize) -> EcsResult<T> {
        let _guard = self.write()?;
        // SAFETY: validated above; index < len.
        let removed = unsafe {
            let len = self.raw_len();
            if index >= len {
                return Err(out_of_range(index, 1, len));
            }
            let data = self.data();
            let removed = data.add(index).read();
            data.add(index).write(data.add(len - 1).read());
            self.set_len(len - 1);
            removed
        };
        self.safety.bump_content();
        Ok(removed)
    }

    /// Remove `count` elements starting at `start`, shifting the tail down.
    pub fn remove_range(&mut self, start: usize, count: usize) -> EcsResult<()> {
        let _guard = self.write()?;
        // SAFETY: validated above; range checked against the length.
        unsafe {
            let len = self.raw_len();
            let end = checked_range(start, count, len)?;
            if count == 0 {
                return Ok(());
            }
            let data = self.data();
            ptr::copy(data.add(end), data.add(start), len - end);
            self.set_len(len - count);
        }
        self.safety.bump_content();
        Ok(())
    }

    /// Remove `count` elements starting at `start`, filling the hole with
    /// elements taken from the end.
    pub fn remove_range_swap_back(&mut self, start: usize, count: usize) -> EcsResult<()> {
        let _guard = self.write()?;
        // SAFETY: validated above; source and destination ranges are disjoint
        // because the moved elements all lie after `end`.
        unsafe {
            let len = self.raw_len();
            let end = checked_range(start, count, len)?;
            if count == 0 {
                return Ok(());
            }
            let moved = count.min(len - end);
            let data = self.data();
            ptr::copy_nonoverlapping(data.add(len - moved), data.add(start), moved);
            self.set_len(len - count);
        }
        self.safety.bump_content();
        Ok(())
    }

    /// Replace the contents with `values`.
    pub fn copy_from(&mut self, values: &[T]) -> EcsResult<()> {
        let _guard = self.write()?;
        // SAFETY: validated above; capacity ensured before the copy.
        unsafe {
            self.grow(values.len())?;
            ptr::copy_nonoverlapping(values.as_ptr(), self.data(), values.len());
            self.set_len(values.len());
        }
        self.safety.bump_content();
        Ok(())
    }

    /// Remove every element. Capacity is kept.
    pub fn clear(&mut self) -> EcsResult<()> {
        let _guard = self.write()?;
        // SAFETY: validated above.
        unsafe { self.set_len(0) };
        self.safety.bump_content();
        Ok(())
    }

    /// Set the length, zero-filling new elements.
    pub fn resize(&mut self, len: usize) -> EcsResult<()> {
        let _guard = self.write()?;
        // SAFETY: validated above; capacity ensured before zeroing.
        unsafe {
            let old = self.raw_len();
            if len > old {
                self.grow(len)?;
                ptr::write_bytes(self.data().add(old), 0, len - old);
            }
            self.set_len(len);
        }
        self.safety.bump_content();
        Ok(())
    }

    /// Make room for at least `capacity` elements.
    pub fn ensure_capacity(&mut self, capacity: usize) -> EcsResult<()> {
        let _guard = self.write()?;
        // SAFETY: validated above.
        unsafe { self.grow(capacity) }
    }

    /// Release unused capacity. Moves back inline when the elements fit.
    pub fn trim_excess(&mut self) -> EcsResult<()> {
        let _guard = self.write()?;
        // SAFETY: validated above; inline storage holds `inline_capacity`
        // elements and does not overlap the heap block.
        unsafe {
            let header = self.raw();
            if (*header).heap.is_null() {
                return Ok(());
            }
            let len = self.raw_len();
            let capacity = self.raw_capacity();
            if len <= self.inline_capacity {
                let heap = (*header).heap;
                let inline = header.cast::<u8>().add(BUFFER_HEADER_SIZE);
                ptr::copy_nonoverlapping(heap, inline, len * size_of::<T>());
                free_heap(heap, capacity, size_of::<T>());
                (*header).heap = ptr::null_mut();
                (*header).capacity = self.inline_capacity as u32;
                self.safety.bump_content();
            } else if capacity > len {
                self.reallocate(len)?;
            }
        }
        Ok(())
    }

    /// Copy the elements out.
    pub fn to_vec(&self) -> EcsResult<Vec<T>> {
        let _guard = self.read()?;
        // SAFETY: validated above; [0, len) is initialized.
        unsafe { Ok(std::slice::from_raw_parts(self.data(), self.raw_len()).to_vec()) }
    }

    /// View the same buffer as elements of another type of equal size.
    pub fn reinterpret<U: Pod>(&self) -> EcsResult<DynamicBuffer<U>> {
        if size_of::<U>() != size_of::<T>() {
            return Err(EcsError::InvalidOperation(format!(
                "cannot reinterpret {}-byte elements as {}-byte elements",
                size_of::<T>(),
                size_of::<U>()
            )));
        }
        if align_of::<U>() > align_of::<T>().max(align_of::<u64>()) {
            return Err(EcsError::InvalidOperation(format!(
                "reinterpreted element alignment {} exceeds storage alignment",
                align_of::<U>()
            )));
        }
        drop(self.read()?);
        Ok(DynamicBuffer {
            header: self.header,
            safety: Arc::clone(&self.safety),
            epoch: self.epoch,
            type_index: self.type_index,
            inline_capacity: self.inline_capacity,
            read_only: self.read_only,
            lease: self.lease,
            _marker: PhantomData,
        })
    }

    /// Export the current elements as an array view.
    ///
    /// The array is invalidated by structural changes and by any length or
    /// storage change of a buffer in the same chunk; element writes keep it
    /// valid.
    pub fn as_array(&self) -> EcsResult<BufferArray<T>> {
        let _guard = self.read()?;
        // SAFETY: validated above.
        let (data, len) = unsafe { (self.data(), self.raw_len()) };
        Ok(BufferArray {
            data: NonNull::new(data).unwrap_or(NonNull::dangling()),
            len,
            safety: Arc::clone(&self.safety),
            structural: self.epoch,
            content: self.safety.content_epoch(),
            type_index: self.type_index,
            read_only: self.read_only,
            lease: self.lease,
            _marker: PhantomData,
        })
    }
}

fn checked_range(start: usize, count: usize, len: usize) -> EcsResult<usize> {
    start
        .checked_add(count)
        .filter(|&end| end <= len)
        .ok_or_else(|| out_of_range(start, count, len))
}

impl<T> fmt::Debug for DynamicBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicBuffer")
            .field("type_index", &self.type_index)
            .field("epoch", &self.epoch)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Snapshot view of a buffer's elements.
///
/// Fails with `StaleView` once the chunk sees a structural change or any
/// buffer in it changes length or storage.
pub struct BufferArray<T> {
    data: NonNull<T>,
    len: usize,
    safety: Arc<ChunkSafety>,
    structural: u64,
    content: u64,
    type_index: TypeIndex,
    read_only: bool,
    lease: Option<LeaseId>,
    _marker: PhantomData<*mut T>,
}

impl<T: Pod> BufferArray<T> {
    fn validate(&self) -> EcsResult<()> {
        self.safety.check_structural(self.structural)?;
        self.safety.check_content(self.content)
    }

    fn read(&self) -> EcsResult<AccessGuard<'_>> {
        let guard = self.safety.read_access(self.type_index, self.lease)?;
        self.validate()?;
        Ok(guard)
    }

    /// Number of elements when the array was exported.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the array is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether writes are rejected.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> EcsResult<T> {
        let _guard = self.read()?;
        if index >= self.len {
            return Err(out_of_range(index, 1, self.len));
        }
        // SAFETY: epochs unchanged, so the storage and length are as exported.
        Ok(unsafe { self.data.as_ptr().add(index).read() })
    }

    /// Overwrite the element at `index`.
    pub fn set(&mut self, index: usize, value: T) -> EcsResult<()> {
        if self.read_only {
            return Err(read_only(self.type_index));
        }
        let _guard = self.safety.write_access(self.type_index, self.lease)?;
        self.validate()?;
        if index >= self.len {
            return Err(out_of_range(index, 1, self.len));
        }
        // SAFETY: epochs unchanged, so the storage and length are as exported.
        unsafe { self.data.as_ptr().add(index).write(value) };
        Ok(())
    }

    /// Copy the elements out.
    pub fn to_vec(&self) -> EcsResult<Vec<T>> {
        let _guard = self.read()?;
        // SAFETY: epochs unchanged, so the storage and length are as exported.
        Ok(unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }.to_vec())
    }

    /// Lease the buffer's `(chunk, type)` for reading so the array can be
    /// handed to another thread. While pinned, buffer mutations and
    /// structural changes on the chunk fail with `AccessViolation`.
    pub fn pin(self) -> EcsResult<PinnedArray<T>> {
        let lease = LeaseId::next();
        self.safety
            .acquire(self.type_index, AccessMode::ReadOnly, lease)?;
        if let Err(err) = self.validate() {
            self.safety
                .release(self.type_index, AccessMode::ReadOnly, lease);
            return Err(err);
        }
        Ok(PinnedArray {
            data: self.data,
            len: self.len,
            safety: Arc::clone(&self.safety),
            structural: self.structural,
            type_index: self.type_index,
            lease,
            _marker: PhantomData,
        })
    }
}

impl<T> fmt::Debug for BufferArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferArray")
            .field("type_index", &self.type_index)
            .field("len", &self.len)
            .finish()
    }
}

/// A [`BufferArray`] holding a read lease; sendable to worker threads.
pub struct PinnedArray<T> {
    data: NonNull<T>,
    len: usize,
    safety: Arc<ChunkSafety>,
    structural: u64,
    type_index: TypeIndex,
    lease: LeaseId,
    _marker: PhantomData<T>,
}

// SAFETY: the read lease blocks every writer of the pinned storage, and a
// leased chunk is never freed.
unsafe impl<T: Send + Sync> Send for PinnedArray<T> {}
unsafe impl<T: Sync> Sync for PinnedArray<T> {}

impl<T: Pod> PinnedArray<T> {
    /// Borrow the elements. Fails once the world is gone.
    pub fn as_slice(&self) -> EcsResult<&[T]> {
        self.safety.check_structural(self.structural)?;
        // SAFETY: the lease keeps the storage unchanged; see the Send impl.
        Ok(unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) })
    }

    /// Number of elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the array is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Drop for PinnedArray<T> {
    fn drop(&mut self) {
        self.safety
            .release(self.type_index, AccessMode::ReadOnly, self.lease);
    }
}

impl<T> fmt::Debug for PinnedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedArray")
            .field("type_index", &self.type_index)
            .field("len", &self.len)
            .finish()
    }
}

/// Per-type buffer lookup by entity.
pub struct BufferLookup<'w, T> {
    world: &'w World,
    type_index: TypeIndex,
    read_only: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<'w, T: Component + Pod> BufferLookup<'w, T> {
    pub(crate) const fn new(world: &'w World, type_index: TypeIndex, read_only: bool) -> Self {
        Self {
            world,
            type_index,
            read_only,
            _marker: PhantomData,
        }
    }

    /// Whether `entity` exists and carries this buffer type.
    #[must_use]
    pub fn has_buffer(&self, entity: Entity) -> bool {
        self.world.has_component(entity, self.type_index)
    }

    /// Buffer of `entity`. Handles from a read-only lookup reject writes.
    pub fn get(&self, entity: Entity) -> EcsResult<DynamicBuffer<T>> {
        self.world
            .buffer_handle(entity, self.type_index, self.read_only, None)
    }

    /// Whether handles from this lookup reject writes.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl<T> fmt::Debug for BufferLookup<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferLookup")
            .field("type_index", &self.type_index)
            .field("read_only", &self.read_only)
            .finish()
    }
}

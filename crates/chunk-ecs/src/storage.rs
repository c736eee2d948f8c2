//! Chunk memory and the world's chunk arena.
//!
//! Every chunk's data region is one aligned, zeroed allocation of
//! [`CHUNK_BUFFER_SIZE`] bytes. Released blocks go back to a bounded pool and
//! are re-zeroed before reuse.

use std::{alloc::Layout, fmt, ptr::NonNull, sync::Arc};

use crate::{
    archetype::ArchetypeId,
    chunk::{CHUNK_ALIGN, CHUNK_BUFFER_SIZE, Chunk, ChunkId, ChunkLayout},
    safety::ChunkSafety,
};

/// One chunk's data region.
pub struct ChunkMemory {
    data: NonNull<u8>,
}

// SAFETY: ChunkMemory exclusively owns its allocation; access to the bytes is
// mediated by `&`/`&mut World` and the chunk's leases.
unsafe impl Send for ChunkMemory {}
unsafe impl Sync for ChunkMemory {}

impl ChunkMemory {
    const LAYOUT: Layout = match Layout::from_size_align(CHUNK_BUFFER_SIZE, CHUNK_ALIGN) {
        Ok(layout) => layout,
        Err(_) => panic!("invalid chunk layout"),
    };

    /// Allocate a zeroed block.
    #[must_use]
    pub fn new() -> Self {
        // SAFETY: the layout has non-zero size.
        let data = unsafe { std::alloc::alloc_zeroed(Self::LAYOUT) };
        let Some(data) = NonNull::new(data) else {
            std::alloc::handle_alloc_error(Self::LAYOUT);
        };
        Self { data }
    }

    /// Base pointer of the data region.
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// Zero the whole block.
    pub fn zero(&mut self) {
        // SAFETY: the block is CHUNK_BUFFER_SIZE bytes long.
        unsafe { std::ptr::write_bytes(self.data.as_ptr(), 0, CHUNK_BUFFER_SIZE) };
    }
}

impl Default for ChunkMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChunkMemory {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { std::alloc::dealloc(self.data.as_ptr(), Self::LAYOUT) };
    }
}

struct ChunkSlot {
    chunk: Option<Chunk>,
    safety: Arc<ChunkSafety>,
}

/// Arena of chunks addressed by [`ChunkId`].
///
/// Slots are recycled but their [`ChunkSafety`] is not, so a handle into a
/// released chunk stays stale even after the slot is reused.
pub struct ChunkStore {
    slots: Vec<ChunkSlot>,
    free_slots: Vec<ChunkId>,
    pool: Vec<ChunkMemory>,
    pool_limit: usize,
}

impl ChunkStore {
    /// Create an empty arena keeping at most `pool_limit` spare blocks.
    #[must_use]
    pub const fn new(pool_limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            pool: Vec::new(),
            pool_limit,
        }
    }

    /// Create a chunk for `archetype` and return its id.
    pub fn allocate(&mut self, archetype: ArchetypeId, layout: Arc<ChunkLayout>) -> ChunkId {
        let memory = match self.pool.pop() {
            Some(mut memory) => {
                memory.zero();
                memory
            }
            None => ChunkMemory::new(),
        };
        let chunk = Chunk::new(memory, layout, archetype);

        let id = if let Some(id) = self.free_slots.pop() {
            let slot = &mut self.slots[id.as_raw() as usize];
            slot.chunk = Some(chunk);
            slot.safety.bump_structural();
            id
        } else {
            let id = ChunkId::from_raw(self.slots.len() as u32);
            self.slots.push(ChunkSlot {
                chunk: Some(chunk),
                safety: Arc::new(ChunkSafety::new()),
            });
            id
        };
        tracing::debug!("Allocated {:?} for {:?}", id, archetype);
        id
    }

    /// Release an empty chunk; its memory returns to the pool.
    pub fn release(&mut self, id: ChunkId) {
        let Some(slot) = self.slots.get_mut(id.as_raw() as usize) else {
            return;
        };
        let Some(chunk) = slot.chunk.take() else {
            return;
        };
        debug_assert!(chunk.is_empty(), "released chunk still holds entities");
        slot.safety.invalidate();
        self.free_slots.push(id);

        if self.pool.len() < self.pool_limit {
            self.pool.push(chunk.into_memory());
        }
        tracing::debug!("Released {:?} (pool: {})", id, self.pool.len());
    }

    /// Get a chunk.
    #[must_use]
    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.slots.get(id.as_raw() as usize)?.chunk.as_ref()
    }

    /// Get a mutable chunk.
    #[must_use]
    pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.slots.get_mut(id.as_raw() as usize)?.chunk.as_mut()
    }

    /// Get two distinct chunks mutably.
    #[must_use]
    pub fn pair_mut(&mut self, a: ChunkId, b: ChunkId) -> Option<(&mut Chunk, &mut Chunk)> {
        let (a, b) = (a.as_raw() as usize, b.as_raw() as usize);
        if a == b || a.max(b) >= self.slots.len() {
            return None;
        }
        let (low, high) = self.slots.split_at_mut(a.max(b));
        let (first, second) = (&mut low[a.min(b)], &mut high[0]);
        let (first, second) = (first.chunk.as_mut()?, second.chunk.as_mut()?);
        Some(if a < b { (first, second) } else { (second, first) })
    }

    /// Safety state of a chunk slot, live or not.
    #[must_use]
    pub fn safety(&self, id: ChunkId) -> Option<&Arc<ChunkSafety>> {
        self.slots.get(id.as_raw() as usize).map(|slot| &slot.safety)
    }

    /// Number of live chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_slots.len()
    }

    /// Whether no chunk is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pooled blocks.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    /// Tear down every chunk. Leased chunks are leaked so outstanding pins
    /// keep pointing at valid memory.
    fn teardown(&mut self) {
        let mut leaked = 0_usize;
        for slot in &mut self.slots {
            let leased = slot.safety.invalidate();
            let Some(mut chunk) = slot.chunk.take() else {
                continue;
            };
            if leased {
                leaked += 1;
                std::mem::forget(chunk);
            } else {
                chunk.release_all_buffers();
            }
        }
        if leaked > 0 {
            tracing::warn!("Leaked {} chunk(s) still pinned at teardown", leaked);
        }
        self.slots.clear();
        self.free_slots.clear();
        self.pool.clear();
    }
}

impl Drop for ChunkStore {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStore")
            .field("live", &self.len())
            .field("pooled", &self.pool.len())
            .finish()
    }
}

//! Entity identifiers and the entity location table.
//!
//! Entities use a generational index pattern to safely reuse IDs
//! while detecting use-after-free scenarios. The [`EntityTable`] is the
//! single source of truth for where each live entity is stored.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::{archetype::ArchetypeId, chunk::ChunkId};

/// Generation counter to detect stale entity references.
/// Incremented each time an entity slot is recycled. Zero is never issued.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Generation(u32);

impl Generation {
    /// The first generation handed out for a fresh slot.
    pub const FIRST: Self = Self(1);

    /// Increment the generation counter, skipping zero on wrap-around.
    #[must_use]
    pub const fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            0 => Self(1),
            n => Self(n),
        }
    }

    /// Get the raw generation value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Raw entity index into the entity table.
pub type EntityId = u32;

/// A versioned reference to a row in some chunk.
///
/// - `index`: slot in the entity table, recycled after destruction
/// - `generation`: version of that slot; a mismatch means the reference is stale
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(C)]
pub struct Entity {
    index: EntityId,
    generation: Generation,
}

// SAFETY: two `u32`s with no padding; all-zero is `Entity::NULL`.
unsafe impl Zeroable for Entity {}
// SAFETY: see above, every bit pattern is a (possibly stale) entity.
unsafe impl Pod for Entity {}

impl Entity {
    /// Never refers to a live entity.
    pub const NULL: Entity = Entity {
        index: 0,
        generation: Generation(0),
    };

    /// Create an entity with the given index and generation.
    #[must_use]
    pub const fn new(index: EntityId, generation: Generation) -> Self {
        Self { index, generation }
    }

    /// The entity's table index.
    #[must_use]
    pub const fn index(self) -> EntityId {
        self.index
    }

    /// The entity's generation.
    #[must_use]
    pub const fn generation(self) -> Generation {
        self.generation
    }

    /// Pack entity into a single u64.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation.0 as u64) << 32) | (self.index as u64)
    }

    /// Unpack entity from a u64.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: Generation((bits >> 32) as u32),
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation.0)
    }
}

/// Where a live entity is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// The archetype containing this entity.
    pub archetype: ArchetypeId,
    /// The chunk holding the entity's row.
    pub chunk: ChunkId,
    /// Row index within the chunk.
    pub slot: usize,
}

#[derive(Clone, Copy, Debug)]
struct EntityEntry {
    generation: Generation,
    /// `None` while the slot is on the free list.
    location: Option<EntityLocation>,
}

/// Maps entity indices to their current generation and location.
///
/// Maintains a free list of recycled slots; destroying bumps the slot's
/// generation so every outstanding reference becomes stale.
pub struct EntityTable {
    entries: Vec<EntityEntry>,
    free_list: Vec<EntityId>,
    alive_count: u32,
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTable {
    /// Create an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            alive_count: 0,
        }
    }

    /// Create a table with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity / 4),
            alive_count: 0,
        }
    }

    /// Allocate an entity stored at `location`.
    pub fn allocate(&mut self, location: EntityLocation) -> Entity {
        self.alive_count += 1;

        if let Some(index) = self.free_list.pop() {
            let entry = &mut self.entries[index as usize];
            entry.location = Some(location);
            Entity::new(index, entry.generation)
        } else {
            let index = self.entries.len() as EntityId;
            self.entries.push(EntityEntry {
                generation: Generation::FIRST,
                location: Some(location),
            });
            Entity::new(index, Generation::FIRST)
        }
    }

    /// Free an entity's slot, invalidating every reference to it.
    ///
    /// Returns `false` if the entity was already stale.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.exists(entity) {
            return false;
        }

        let entry = &mut self.entries[entity.index() as usize];
        entry.generation = entry.generation.next();
        entry.location = None;
        self.free_list.push(entity.index());
        self.alive_count -= 1;
        true
    }

    /// Whether `entity` refers to a live entity.
    #[must_use]
    pub fn exists(&self, entity: Entity) -> bool {
        self.entries
            .get(entity.index() as usize)
            .is_some_and(|entry| entry.generation == entity.generation() && entry.location.is_some())
    }

    /// Location of a live entity.
    #[must_use]
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        let entry = self.entries.get(entity.index() as usize)?;
        if entry.generation == entity.generation() {
            entry.location
        } else {
            None
        }
    }

    /// Overwrite the location of a live entity index.
    pub(crate) fn set_location(&mut self, index: EntityId, location: EntityLocation) {
        let entry = &mut self.entries[index as usize];
        debug_assert!(entry.location.is_some(), "relocating a free entity slot");
        entry.location = Some(location);
    }

    /// Number of live entities.
    #[must_use]
    pub const fn alive_count(&self) -> u32 {
        self.alive_count
    }

    /// Number of slots ever allocated (live or recycled).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over live entities in index order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry
                .location
                .map(|_| Entity::new(index as EntityId, entry.generation))
        })
    }

    /// Report entities created and destroyed since the tracker last looked.
    pub fn changes_since(&self, tracker: &mut EntityChangeTracker) -> EntityChanges {
        let mut changes = EntityChanges::default();
        let known = &mut tracker.known;
        if known.len() < self.entries.len() {
            known.resize(self.entries.len(), None);
        }

        for (index, entry) in self.entries.iter().enumerate() {
            let now = entry.location.map(|_| entry.generation);
            let before = known[index];
            if now == before {
                continue;
            }
            if let Some(generation) = before {
                changes
                    .destroyed
                    .push(Entity::new(index as EntityId, generation));
            }
            if let Some(generation) = now {
                changes.created.push(Entity::new(index as EntityId, generation));
            }
            known[index] = now;
        }

        changes
    }
}

impl fmt::Debug for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityTable")
            .field("alive", &self.alive_count)
            .field("capacity", &self.entries.len())
            .field("free", &self.free_list.len())
            .finish()
    }
}

/// Snapshot of which entity versions were alive at the last diff.
#[derive(Debug, Default, Clone)]
pub struct EntityChangeTracker {
    known: Vec<Option<Generation>>,
}

impl EntityChangeTracker {
    /// Create a tracker that has seen nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Result of [`EntityTable::changes_since`], ordered by entity index.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntityChanges {
    /// Entities alive now that were not alive at the previous diff.
    pub created: Vec<Entity>,
    /// Entities alive at the previous diff that are gone now.
    pub destroyed: Vec<Entity>,
}

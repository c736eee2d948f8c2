//! Archetypes - interned component sets and their chunks.
//!
//! An archetype represents a unique combination of component types.
//! All entities with the same set of components are stored together in the
//! archetype's chunks, which share one precomputed [`ChunkLayout`].

use std::{fmt, sync::Arc};

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::{
    chunk::{ChunkId, ChunkLayout},
    component::{TypeIndex, TypeInfo, TypeRegistry},
    error::{EcsError, EcsResult},
};

/// Sorted, deduplicated component set. Always starts with [`TypeIndex::ENTITY`].
pub type TypeSet = SmallVec<[TypeIndex; 8]>;

/// Unique identifier for an archetype.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The archetype holding only the entity column.
    pub const EMPTY: Self = Self(0);

    /// Create an archetype ID from a raw value.
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

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

/// Whether a transition may strip system-state components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Removing a system-state component is an error.
    #[default]
    Strict,
    /// System-state components may be removed.
    AllowSystemState,
}

/// An archetype - the chunks storing entities with one component set.
pub struct Archetype {
    /// Unique identifier for this archetype.
    id: ArchetypeId,
    /// Sorted component set, entity column first.
    types: TypeSet,
    /// Layout shared by every chunk.
    layout: Arc<ChunkLayout>,
    /// Every chunk, in allocation order.
    chunks: Vec<ChunkId>,
    /// Chunks with at least one free slot, in allocation order.
    open_chunks: Vec<ChunkId>,
    /// Live entities across all chunks.
    entity_count: usize,
    /// Types that survive destruction.
    system_state: SmallVec<[TypeIndex; 2]>,
    /// Types dropped by instantiation.
    uncloneable: SmallVec<[TypeIndex; 2]>,
    /// Cached single-type transitions.
    add_edges: HashMap<TypeIndex, ArchetypeId, FxBuildHasher>,
    remove_edges: HashMap<TypeIndex, ArchetypeId, FxBuildHasher>,
}

impl Archetype {
    fn new(id: ArchetypeId, types: TypeSet, infos: &[TypeInfo], layout: ChunkLayout) -> Self {
        Self {
            id,
            types,
            layout: Arc::new(layout),
            chunks: Vec::new(),
            open_chunks: Vec::new(),
            entity_count: 0,
            system_state: infos
                .iter()
                .filter(|info| info.is_system_state())
                .map(TypeInfo::index)
                .collect(),
            uncloneable: infos
                .iter()
                .filter(|info| !info.is_cloneable() && info.index() != TypeIndex::ENTITY)
                .map(TypeInfo::index)
                .collect(),
            add_edges: HashMap::default(),
            remove_edges: HashMap::default(),
        }
    }

    /// Get the archetype ID.
    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Get the component types in this archetype (sorted, entity first).
    #[must_use]
    pub fn types(&self) -> &[TypeIndex] {
        &self.types
    }

    /// Check if this archetype contains a component type.
    #[must_use]
    pub fn contains(&self, type_index: TypeIndex) -> bool {
        self.types.binary_search(&type_index).is_ok()
    }

    /// Chunk layout shared by this archetype's chunks.
    #[must_use]
    pub fn layout(&self) -> &Arc<ChunkLayout> {
        &self.layout
    }

    /// Entities per chunk.
    #[must_use]
    pub fn chunk_capacity(&self) -> usize {
        self.layout.capacity()
    }

    /// Chunks owned by this archetype.
    #[must_use]
    pub fn chunks(&self) -> &[ChunkId] {
        &self.chunks
    }

    /// Number of chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of live entities.
    #[must_use]
    pub const fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// Whether the archetype has no entities.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entity_count == 0
    }

    /// System-state types in this archetype.
    #[must_use]
    pub fn system_state_types(&self) -> &[TypeIndex] {
        &self.system_state
    }

    /// Whether any system-state type is present.
    #[must_use]
    pub fn has_system_state(&self) -> bool {
        !self.system_state.is_empty()
    }

    /// Types instantiation does not copy.
    #[must_use]
    pub fn uncloneable_types(&self) -> &[TypeIndex] {
        &self.uncloneable
    }

    /// First chunk with a free slot.
    pub(crate) fn open_chunk(&self) -> Option<ChunkId> {
        self.open_chunks.first().copied()
    }

    /// Chunks with a free slot, in allocation order.
    pub(crate) fn open_chunks(&self) -> &[ChunkId] {
        &self.open_chunks
    }

    pub(crate) fn push_chunk(&mut self, chunk: ChunkId) {
        self.chunks.push(chunk);
        self.open_chunks.push(chunk);
    }

    /// Record an entity placed in `chunk`, which now holds `count` entities.
    pub(crate) fn on_insert(&mut self, chunk: ChunkId, count: usize) {
        self.entity_count += 1;
        if count == self.layout.capacity() {
            self.open_chunks.retain(|&id| id != chunk);
        }
    }

    /// Record an entity removed from `chunk`, which now holds `count` entities.
    ///
    /// Returns `true` when the chunk became empty and was detached.
    pub(crate) fn on_remove(&mut self, chunk: ChunkId, count: usize) -> bool {
        self.entity_count -= 1;
        if count == 0 {
            self.chunks.retain(|&id| id != chunk);
            self.open_chunks.retain(|&id| id != chunk);
            return true;
        }
        if count + 1 == self.layout.capacity() {
            // Was full: reopen, keeping allocation order for first-fit.
            self.open_chunks.push(chunk);
            let chunks = &self.chunks;
            self.open_chunks
                .sort_by_key(|open| chunks.iter().position(|id| id == open));
        }
        false
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("types", &self.types)
            .field("entity_count", &self.entity_count)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

/// Storage for all archetypes in a world.
pub struct ArchetypeStorage {
    /// All archetypes, indexed by id.
    archetypes: Vec<Archetype>,
    /// Map from component set to archetype ID.
    archetype_map: HashMap<TypeSet, ArchetypeId, FxBuildHasher>,
}

impl ArchetypeStorage {
    /// Create storage holding the empty archetype.
    #[must_use]
    pub fn new() -> Self {
        let key = Self::canonicalize(&[]);
        let empty = Archetype::new(
            ArchetypeId::EMPTY,
            key.clone(),
            &[],
            ChunkLayout::entity_only(),
        );
        let mut archetype_map = HashMap::default();
        archetype_map.insert(key, ArchetypeId::EMPTY);
        Self {
            archetypes: vec![empty],
            archetype_map,
        }
    }

    /// Canonical form of a component set: entity column added, sorted, deduplicated.
    #[must_use]
    pub fn canonicalize(types: &[TypeIndex]) -> TypeSet {
        let mut key: TypeSet = SmallVec::with_capacity(types.len() + 1);
        key.push(TypeIndex::ENTITY);
        key.extend_from_slice(types);
        key.sort_unstable();
        key.dedup();
        key
    }

    /// Get or create the archetype for a component set.
    pub fn get_or_create(
        &mut self,
        types: &[TypeIndex],
        registry: &TypeRegistry,
    ) -> EcsResult<ArchetypeId> {
        let key = Self::canonicalize(types);
        if let Some(&id) = self.archetype_map.get(&key) {
            return Ok(id);
        }

        let infos = key
            .iter()
            .map(|&type_index| registry.info(type_index).ok_or(EcsError::UnknownType(type_index)))
            .collect::<EcsResult<Vec<_>>>()?;
        let layout = ChunkLayout::compute(&infos)?;

        let id = ArchetypeId::from_raw(self.archetypes.len() as u32);
        tracing::debug!(
            "Created {:?} with {} types, {} entities per chunk",
            id,
            key.len(),
            layout.capacity()
        );
        self.archetypes
            .push(Archetype::new(id, key.clone(), &infos, layout));
        self.archetype_map.insert(key, id);
        Ok(id)
    }

    /// Get an archetype by ID.
    #[must_use]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.as_raw() as usize)
    }

    /// Get a mutable archetype by ID.
    #[must_use]
    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.as_raw() as usize)
    }

    /// Get an archetype or fail with `UnknownArchetype`.
    pub fn try_get(&self, id: ArchetypeId) -> EcsResult<&Archetype> {
        self.get(id).ok_or(EcsError::UnknownArchetype(id))
    }

    /// Number of archetypes, the empty archetype included.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Iterate over all archetypes.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Find the archetype for a component set, if it exists.
    #[must_use]
    pub fn find(&self, types: &[TypeIndex]) -> Option<ArchetypeId> {
        self.archetype_map.get(&Self::canonicalize(types)).copied()
    }

    /// The archetype reached by adding one type.
    pub fn with_component(
        &mut self,
        base: ArchetypeId,
        type_index: TypeIndex,
        registry: &TypeRegistry,
    ) -> EcsResult<ArchetypeId> {
        let base_arch = self.try_get(base)?;
        if base_arch.contains(type_index) {
            return Ok(base);
        }
        if let Some(&id) = base_arch.add_edges.get(&type_index) {
            return Ok(id);
        }

        let mut types = base_arch.types.clone();
        types.push(type_index);
        let id = self.get_or_create(&types, registry)?;
        self.archetypes[base.as_raw() as usize]
            .add_edges
            .insert(type_index, id);
        Ok(id)
    }

    /// The archetype reached by removing one type.
    pub fn without_component(
        &mut self,
        base: ArchetypeId,
        type_index: TypeIndex,
        policy: TransitionPolicy,
        registry: &TypeRegistry,
    ) -> EcsResult<ArchetypeId> {
        let base_arch = self.try_get(base)?;
        if !base_arch.contains(type_index) {
            return Ok(base);
        }
        Self::check_removal(base_arch, type_index, policy)?;
        if let Some(&id) = base_arch.remove_edges.get(&type_index) {
            return Ok(id);
        }

        let types: TypeSet = base_arch
            .types
            .iter()
            .copied()
            .filter(|&t| t != type_index)
            .collect();
        let id = self.get_or_create(&types, registry)?;
        self.archetypes[base.as_raw() as usize]
            .remove_edges
            .insert(type_index, id);
        Ok(id)
    }

    /// The archetype reached by adding and removing sets of types.
    pub fn transition(
        &mut self,
        base: ArchetypeId,
        add: &[TypeIndex],
        remove: &[TypeIndex],
        policy: TransitionPolicy,
        registry: &TypeRegistry,
    ) -> EcsResult<ArchetypeId> {
        let base_arch = self.try_get(base)?;
        for &type_index in remove {
            if base_arch.contains(type_index) {
                Self::check_removal(base_arch, type_index, policy)?;
            }
        }
        let types: TypeSet = base_arch
            .types
            .iter()
            .chain(add)
            .copied()
            .filter(|t| !remove.contains(t))
            .collect();
        self.get_or_create(&types, registry)
    }

    fn check_removal(
        base: &Archetype,
        type_index: TypeIndex,
        policy: TransitionPolicy,
    ) -> EcsResult<()> {
        if type_index == TypeIndex::ENTITY {
            return Err(EcsError::InvalidArgument(
                "the entity column cannot be removed".into(),
            ));
        }
        // Cleanup ends when the last system-state type goes, never by hand.
        if type_index == TypeIndex::CLEANUP {
            return Err(EcsError::InvalidTransition(type_index));
        }
        if policy == TransitionPolicy::Strict && base.system_state.contains(&type_index) {
            return Err(EcsError::InvalidTransition(type_index));
        }
        Ok(())
    }
}

impl Default for ArchetypeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArchetypeStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeStorage")
            .field("archetype_count", &self.archetypes.len())
            .finish()
    }
}

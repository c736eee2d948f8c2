//! World - the main container for all ECS data.
//!
//! The World owns the entity table, the interned archetypes and the chunk
//! arena. Every structural change (create, destroy, add/remove component,
//! instantiate) goes through here and follows the same steps:
//!
//! 1. validate every argument and resolve target archetypes,
//! 2. verify no lease is held on any chunk the change would touch,
//! 3. bump the structural epoch of each chunk, then move rows.
//!
//! Nothing is mutated until steps 1 and 2 pass for the whole operation, so
//! batch operations are all-or-nothing.

use std::{fmt, ptr::NonNull, sync::Arc};

use bytemuck::Pod;
use smallvec::SmallVec;

use crate::{
    archetype::{Archetype, ArchetypeId, ArchetypeStorage, TransitionPolicy},
    buffer::{BufferHeader, BufferLookup, DynamicBuffer},
    chunk::{Chunk, ChunkId},
    component::{Component, ComponentCategory, ComponentSet, TypeIndex, TypeInfo, TypeRegistry},
    entity::{Entity, EntityChangeTracker, EntityChanges, EntityLocation, EntityTable},
    error::{EcsError, EcsResult},
    safety::{ChunkSafety, LeaseId},
    storage::ChunkStore,
};

/// Spare chunk blocks kept for reuse when no limit is configured.
pub const DEFAULT_CHUNK_POOL_LIMIT: usize = 16;

/// Tunables for a [`World`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorldConfig {
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
    /// Maximum number of released chunk blocks kept for reuse.
    pub chunk_pool_limit: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 0,
            chunk_pool_limit: DEFAULT_CHUNK_POOL_LIMIT,
        }
    }
}

impl WorldConfig {
    /// Reserve room for `capacity` entities.
    #[must_use]
    pub const fn with_entity_capacity(mut self, capacity: usize) -> Self {
        self.entity_capacity = capacity;
        self
    }

    /// Keep at most `limit` released chunk blocks.
    #[must_use]
    pub const fn with_chunk_pool_limit(mut self, limit: usize) -> Self {
        self.chunk_pool_limit = limit;
        self
    }
}

/// The ECS world - container for all entities and components.
pub struct World {
    /// Shared component type registry.
    registry: Arc<TypeRegistry>,
    /// Entity generations and locations.
    pub(crate) entities: EntityTable,
    /// Interned archetypes.
    pub(crate) archetypes: ArchetypeStorage,
    /// Chunk arena.
    pub(crate) chunks: ChunkStore,
    config: WorldConfig,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create a world with a private type registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry_and_config(TypeRegistry::shared(), WorldConfig::default())
    }

    /// Create a world sharing `registry` with other worlds.
    #[must_use]
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        Self::with_registry_and_config(registry, WorldConfig::default())
    }

    /// Create a world with a private registry and custom tunables.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self::with_registry_and_config(TypeRegistry::shared(), config)
    }

    /// Create a world from an explicit registry and tunables.
    #[must_use]
    pub fn with_registry_and_config(registry: Arc<TypeRegistry>, config: WorldConfig) -> Self {
        Self {
            registry,
            entities: EntityTable::with_capacity(config.entity_capacity),
            archetypes: ArchetypeStorage::new(),
            chunks: ChunkStore::new(config.chunk_pool_limit),
            config,
        }
    }

    /// The type registry this world resolves components against.
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The tunables this world was created with.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    // ==================== Component Types ====================

    /// Register a Rust component type (idempotent).
    pub fn register<T: Component>(&self) -> EcsResult<TypeIndex> {
        Ok(self.registry.register_type::<T>()?.index())
    }

    /// Get the index of a Rust component type, if registered.
    #[must_use]
    pub fn type_index<T: Component>(&self) -> Option<TypeIndex> {
        self.registry.type_index::<T>()
    }

    /// Metadata of a registered type.
    pub fn type_info(&self, type_index: TypeIndex) -> EcsResult<TypeInfo> {
        self.registry
            .info(type_index)
            .ok_or(EcsError::UnknownType(type_index))
    }

    // ==================== Archetypes ====================

    /// Get or create the archetype for a component set.
    pub fn create_archetype(&mut self, types: &[TypeIndex]) -> EcsResult<ArchetypeId> {
        self.archetypes.get_or_create(types, &self.registry)
    }

    /// Get or create the archetype for a static component list.
    pub fn archetype_for<S: ComponentSet>(&mut self) -> EcsResult<ArchetypeId> {
        let types = S::type_indices(&self.registry)?;
        self.create_archetype(&types)
    }

    /// Get an archetype by ID.
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// Iterate over all archetypes.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Number of interned archetypes, the empty one included.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.archetype_count()
    }

    /// Archetype currently holding `entity`.
    pub fn archetype_of(&self, entity: Entity) -> EcsResult<ArchetypeId> {
        Ok(self.location(entity)?.archetype)
    }

    // ==================== Chunks ====================

    /// Get a live chunk.
    #[must_use]
    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    /// Chunk currently holding `entity`.
    pub fn chunk_of(&self, entity: Entity) -> EcsResult<ChunkId> {
        Ok(self.location(entity)?.chunk)
    }

    /// Number of live chunks across all archetypes.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of released chunk blocks waiting for reuse.
    #[must_use]
    pub fn pooled_chunks(&self) -> usize {
        self.chunks.pooled()
    }

    // ==================== Entity Operations ====================

    /// Create an entity in `archetype` with every component zeroed.
    pub fn create_entity(&mut self, archetype: ArchetypeId) -> EcsResult<Entity> {
        self.archetypes.try_get(archetype)?;
        self.check_unleased(&[], &[archetype])?;
        self.spawn_in(archetype)
    }

    /// Create `count` entities in `archetype`.
    pub fn create_entities(
        &mut self,
        archetype: ArchetypeId,
        count: usize,
    ) -> EcsResult<Vec<Entity>> {
        self.archetypes.try_get(archetype)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        self.check_unleased(&[], &[archetype])?;
        (0..count).map(|_| self.spawn_in(archetype)).collect()
    }

    /// Create an entity holding the types of `S`, zeroed.
    pub fn create_entity_with<S: ComponentSet>(&mut self) -> EcsResult<Entity> {
        let archetype = self.archetype_for::<S>()?;
        self.create_entity(archetype)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn exists(&self, entity: Entity) -> bool {
        self.entities.exists(entity)
    }

    /// Where an entity is stored.
    #[must_use]
    pub fn entity_location(&self, entity: Entity) -> Option<EntityLocation> {
        self.entities.location(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.alive_count() as usize
    }

    /// Every live entity, ordered by index.
    #[must_use]
    pub fn all_entities(&self) -> Vec<Entity> {
        self.entities.iter().collect()
    }

    /// Entities created and destroyed since `tracker` last looked.
    pub fn changed_entities(&self, tracker: &mut EntityChangeTracker) -> EntityChanges {
        self.entities.changes_since(tracker)
    }

    /// Destroy an entity. Destroying a missing entity is a no-op.
    ///
    /// An entity still carrying system-state components loses every other
    /// component, gains [`CleanupEntity`](crate::CleanupEntity), and lives on
    /// until its last system-state component is removed.
    pub fn destroy_entity(&mut self, entity: Entity) -> EcsResult<()> {
        let Some(loc) = self.entities.location(entity) else {
            return Ok(());
        };
        let cleanup = self.cleanup_target(loc.archetype)?;
        self.check_unleased(&[loc.chunk], cleanup.as_slice())?;
        self.destroy_at(entity, loc, cleanup)
    }

    /// Destroy several entities. Fails without destroying anything if one
    /// of them does not exist. Duplicates are allowed.
    pub fn destroy_entities(&mut self, entities: &[Entity]) -> EcsResult<()> {
        let mut chunks = Vec::with_capacity(entities.len());
        let mut targets = Vec::new();
        for &entity in entities {
            let loc = self.location(entity)?;
            chunks.push(loc.chunk);
            targets.extend(self.cleanup_target(loc.archetype)?);
        }
        self.check_unleased(&chunks, &targets)?;

        for &entity in entities {
            let Some(loc) = self.entities.location(entity) else {
                continue;
            };
            let cleanup = self.cleanup_target(loc.archetype)?;
            self.destroy_at(entity, loc, cleanup)?;
        }
        Ok(())
    }

    // ==================== Component Operations ====================

    /// Add a component, zeroed. Returns `false` if it was already present.
    pub fn add_component(&mut self, entity: Entity, type_index: TypeIndex) -> EcsResult<bool> {
        let moved = self.retarget(&[entity], |archetypes, registry, base| {
            archetypes.with_component(base, type_index, registry)
        })?;
        Ok(moved > 0)
    }

    /// Add a component to every entity in `entities`.
    ///
    /// Validates the whole batch first; entities that already carry the type
    /// are left alone.
    pub fn add_component_batch(
        &mut self,
        entities: &[Entity],
        type_index: TypeIndex,
    ) -> EcsResult<()> {
        self.retarget(entities, |archetypes, registry, base| {
            archetypes.with_component(base, type_index, registry)
        })
        .map(drop)
    }

    /// Add several components in one move. Returns `false` if all were present.
    pub fn add_components(&mut self, entity: Entity, types: &[TypeIndex]) -> EcsResult<bool> {
        let moved = self.retarget(&[entity], |archetypes, registry, base| {
            archetypes.transition(base, types, &[], TransitionPolicy::Strict, registry)
        })?;
        Ok(moved > 0)
    }

    /// Remove a component. Returns `false` if it was absent.
    ///
    /// System-state components are rejected with `InvalidTransition`; use
    /// [`World::remove_system_state`].
    pub fn remove_component(&mut self, entity: Entity, type_index: TypeIndex) -> EcsResult<bool> {
        let moved = self.retarget(&[entity], |archetypes, registry, base| {
            archetypes.without_component(base, type_index, TransitionPolicy::Strict, registry)
        })?;
        Ok(moved > 0)
    }

    /// Remove a component from every entity in `entities`.
    pub fn remove_component_batch(
        &mut self,
        entities: &[Entity],
        type_index: TypeIndex,
    ) -> EcsResult<()> {
        self.retarget(entities, |archetypes, registry, base| {
            archetypes.without_component(base, type_index, TransitionPolicy::Strict, registry)
        })
        .map(drop)
    }

    /// Remove several components in one move. Returns `false` if none were present.
    pub fn remove_components(&mut self, entity: Entity, types: &[TypeIndex]) -> EcsResult<bool> {
        let moved = self.retarget(&[entity], |archetypes, registry, base| {
            archetypes.transition(base, &[], types, TransitionPolicy::Strict, registry)
        })?;
        Ok(moved > 0)
    }

    /// Remove a component, system-state types included.
    ///
    /// Removing the last system-state component of a destroyed entity
    /// finishes its destruction.
    pub fn remove_system_state(
        &mut self,
        entity: Entity,
        type_index: TypeIndex,
    ) -> EcsResult<bool> {
        let moved = self.retarget(&[entity], |archetypes, registry, base| {
            archetypes.without_component(
                base,
                type_index,
                TransitionPolicy::AllowSystemState,
                registry,
            )
        })?;
        if moved == 0 {
            return Ok(false);
        }

        let loc = self.location(entity)?;
        let archetype = self.archetypes.try_get(loc.archetype)?;
        if archetype.contains(TypeIndex::CLEANUP) && !archetype.has_system_state() {
            self.despawn(entity, loc)?;
        }
        Ok(true)
    }

    /// Move an entity to an arbitrary archetype, keeping the components both
    /// share. Fails with `InvalidTransition` if a system-state component
    /// would be lost.
    pub fn set_archetype(&mut self, entity: Entity, archetype: ArchetypeId) -> EcsResult<()> {
        let loc = self.location(entity)?;
        let source = self.archetypes.try_get(loc.archetype)?;
        let target = self.archetypes.try_get(archetype)?;
        if let Some(&lost) = source
            .system_state_types()
            .iter()
            .find(|&&type_index| !target.contains(type_index))
        {
            return Err(EcsError::InvalidTransition(lost));
        }
        if source.contains(TypeIndex::CLEANUP) && !target.contains(TypeIndex::CLEANUP) {
            return Err(EcsError::InvalidTransition(TypeIndex::CLEANUP));
        }
        self.retarget(&[entity], |_, _, _| Ok(archetype)).map(drop)
    }

    /// Check if an entity has a component.
    #[must_use]
    pub fn has_component(&self, entity: Entity, type_index: TypeIndex) -> bool {
        self.entities
            .location(entity)
            .and_then(|loc| self.archetypes.get(loc.archetype))
            .is_some_and(|archetype| archetype.contains(type_index))
    }

    /// Check if an entity has a component of Rust type `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.type_index::<T>()
            .is_some_and(|type_index| self.has_component(entity, type_index))
    }

    /// Add `T` if missing, then store `value`. Returns `true` if `T` was added.
    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<bool> {
        let info = self.registry.register_type::<T>()?;
        match info.category() {
            ComponentCategory::PlainData => {
                let added = self.add_component(entity, info.index())?;
                self.set_component(entity, value)?;
                Ok(added)
            }
            ComponentCategory::Tag | ComponentCategory::SharedData => {
                self.add_component(entity, info.index())
            }
            category => Err(EcsError::InvalidOperation(format!(
                "{} ({category:?}) cannot be inserted by value",
                info.name()
            ))),
        }
    }

    /// Get a copy of a component.
    pub fn get_component<T: Component>(&self, entity: Entity) -> EcsResult<T> {
        let type_index = self.plain_type::<T>()?;
        let (loc, ptr) = self.component_ptr(entity, type_index)?;
        let _guard = self
            .chunk_safety(loc.chunk)?
            .read_access(type_index, None)?;
        // SAFETY: the column stores `T` values and the guard excludes leased writers.
        Ok(unsafe { ptr.cast::<T>().read() })
    }

    /// Get a mutable reference to a component.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        let type_index = self.plain_type::<T>()?;
        let (loc, ptr) = self.component_ptr(entity, type_index)?;
        drop(
            self.chunk_safety(loc.chunk)?
                .write_access(type_index, None)?,
        );
        // SAFETY: the column stores `T` values; `&mut self` excludes every
        // other borrow of the chunk for the returned lifetime.
        Ok(unsafe { &mut *ptr.cast::<T>() })
    }

    /// Overwrite a component.
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        *self.get_component_mut::<T>(entity)? = value;
        Ok(())
    }

    /// Get a copy of a chunk-level component.
    pub fn chunk_component<T: Component>(&self, chunk: ChunkId) -> EcsResult<T> {
        let type_index = self.chunk_data_type::<T>()?;
        let ptr = self.chunk_data_ptr(chunk, type_index)?;
        let _guard = self.chunk_safety(chunk)?.read_access(type_index, None)?;
        // SAFETY: the slot stores a `T` and the guard excludes leased writers.
        Ok(unsafe { ptr.cast::<T>().read_unaligned() })
    }

    /// Overwrite a chunk-level component.
    pub fn set_chunk_component<T: Component>(&mut self, chunk: ChunkId, value: T) -> EcsResult<()> {
        let type_index = self.chunk_data_type::<T>()?;
        let ptr = self.chunk_data_ptr(chunk, type_index)?;
        let _guard = self.chunk_safety(chunk)?.write_access(type_index, None)?;
        // SAFETY: the slot stores a `T`; `&mut self` excludes other borrows.
        unsafe { ptr.cast::<T>().write_unaligned(value) };
        Ok(())
    }

    // ==================== Buffers ====================

    /// Handle to an entity's buffer of `T` elements.
    pub fn get_buffer<T: Component + Pod>(&self, entity: Entity) -> EcsResult<DynamicBuffer<T>> {
        let type_index = self.buffer_type::<T>()?;
        self.buffer_handle(entity, type_index, false, None)
    }

    /// Read-only handle to an entity's buffer; writes fail with `AccessViolation`.
    pub fn get_buffer_read_only<T: Component + Pod>(
        &self,
        entity: Entity,
    ) -> EcsResult<DynamicBuffer<T>> {
        let type_index = self.buffer_type::<T>()?;
        self.buffer_handle(entity, type_index, true, None)
    }

    /// Per-type buffer lookup.
    pub fn buffer_lookup<T: Component + Pod>(
        &self,
        read_only: bool,
    ) -> EcsResult<BufferLookup<'_, T>> {
        let type_index = self.buffer_type::<T>()?;
        Ok(BufferLookup::new(self, type_index, read_only))
    }

    pub(crate) fn buffer_handle<T: Pod>(
        &self,
        entity: Entity,
        type_index: TypeIndex,
        read_only: bool,
        lease: Option<LeaseId>,
    ) -> EcsResult<DynamicBuffer<T>> {
        let loc = self.location(entity)?;
        let has_buffer = self
            .chunk_ref(loc.chunk)?
            .layout()
            .column(type_index)
            .is_some_and(|column| column.is_buffer);
        if !has_buffer {
            return Err(EcsError::MissingComponent { entity, type_index });
        }
        self.buffer_in_chunk(loc.chunk, loc.slot, type_index, read_only, lease)
    }

    pub(crate) fn buffer_in_chunk<T: Pod>(
        &self,
        chunk_id: ChunkId,
        slot: usize,
        type_index: TypeIndex,
        read_only: bool,
        lease: Option<LeaseId>,
    ) -> EcsResult<DynamicBuffer<T>> {
        let chunk = self.chunk_ref(chunk_id)?;
        let column = chunk
            .layout()
            .column(type_index)
            .filter(|column| column.is_buffer)
            .copied()
            .ok_or_else(|| {
                EcsError::InvalidOperation(format!("{chunk_id:?} has no buffer {type_index:?}"))
            })?;
        if column.element_size != size_of::<T>() {
            return Err(EcsError::InvalidOperation(format!(
                "buffer {type_index:?} holds {}-byte elements, not {}",
                column.element_size,
                size_of::<T>()
            )));
        }
        if slot >= chunk.count() {
            return Err(EcsError::IndexOutOfRange {
                index: slot,
                count: 1,
                len: chunk.count(),
            });
        }
        let header = chunk
            .row_ptr(type_index, slot)
            .and_then(|ptr| NonNull::new(ptr.cast::<BufferHeader>()))
            .ok_or_else(|| {
                EcsError::InvalidOperation(format!("{chunk_id:?} has no buffer {type_index:?}"))
            })?;
        let safety = Arc::clone(self.chunk_safety(chunk_id)?);
        // SAFETY: the row holds an initialized header of a buffer whose
        // elements are `size_of::<T>()` bytes, guarded by `safety`.
        Ok(unsafe {
            DynamicBuffer::new(
                header,
                safety,
                type_index,
                column.inline_capacity,
                read_only,
                lease,
            )
        })
    }

    // ==================== Cloning ====================

    /// Create a copy of `source`. System-state and non-cloneable components
    /// are dropped; buffers are deep-copied.
    pub fn instantiate(&mut self, source: Entity) -> EcsResult<Entity> {
        let target = self.instance_archetype(source)?;
        self.check_unleased(&[], &[target])?;
        self.clone_into(source, target)
    }

    /// Create `count` copies of `source`.
    pub fn instantiate_many(&mut self, source: Entity, count: usize) -> EcsResult<Vec<Entity>> {
        let target = self.instance_archetype(source)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        self.check_unleased(&[], &[target])?;
        (0..count).map(|_| self.clone_into(source, target)).collect()
    }

    // ==================== Internals ====================

    pub(crate) fn location(&self, entity: Entity) -> EcsResult<EntityLocation> {
        self.entities
            .location(entity)
            .ok_or(EcsError::EntityNotFound(entity))
    }

    pub(crate) fn chunk_ref(&self, id: ChunkId) -> EcsResult<&Chunk> {
        self.chunks.get(id).ok_or_else(|| unknown_chunk(id))
    }

    pub(crate) fn chunk_safety(&self, id: ChunkId) -> EcsResult<&Arc<ChunkSafety>> {
        self.chunks.safety(id).ok_or_else(|| unknown_chunk(id))
    }

    fn archetype_mut(&mut self, id: ArchetypeId) -> EcsResult<&mut Archetype> {
        self.archetypes
            .get_mut(id)
            .ok_or(EcsError::UnknownArchetype(id))
    }

    pub(crate) fn plain_type<T: Component>(&self) -> EcsResult<TypeIndex> {
        self.typed_index::<T>(ComponentCategory::PlainData)
    }

    pub(crate) fn chunk_data_type<T: Component>(&self) -> EcsResult<TypeIndex> {
        self.typed_index::<T>(ComponentCategory::ChunkData)
    }

    pub(crate) fn buffer_type<T: Component>(&self) -> EcsResult<TypeIndex> {
        self.typed_index::<T>(ComponentCategory::Buffer)
    }

    /// Index of an already registered `T`. Read paths never register.
    fn typed_index<T: Component>(&self, expected: ComponentCategory) -> EcsResult<TypeIndex> {
        let info = self
            .registry
            .type_index::<T>()
            .and_then(|type_index| self.registry.info(type_index))
            .ok_or_else(|| {
                EcsError::InvalidOperation(format!(
                    "{} is not registered",
                    std::any::type_name::<T>()
                ))
            })?;
        if info.category() == expected {
            Ok(info.index())
        } else {
            Err(EcsError::InvalidOperation(format!(
                "{} is {:?}, expected {expected:?}",
                info.name(),
                info.category()
            )))
        }
    }

    fn component_ptr(
        &self,
        entity: Entity,
        type_index: TypeIndex,
    ) -> EcsResult<(EntityLocation, *mut u8)> {
        let loc = self.location(entity)?;
        let ptr = self
            .chunk_ref(loc.chunk)?
            .row_ptr(type_index, loc.slot)
            .ok_or(EcsError::MissingComponent { entity, type_index })?;
        Ok((loc, ptr))
    }

    pub(crate) fn chunk_data_ptr(&self, chunk: ChunkId, type_index: TypeIndex) -> EcsResult<*mut u8> {
        self.chunk_ref(chunk)?
            .chunk_data_ptr(type_index)
            .ok_or_else(|| {
                EcsError::InvalidOperation(format!("{chunk:?} has no chunk component {type_index:?}"))
            })
    }

    /// Fail with `AccessViolation` if any chunk a structural change would
    /// touch is leased: the given chunks plus every open chunk of the given
    /// target archetypes.
    fn check_unleased(
        &self,
        chunks: &[ChunkId],
        targets: &[ArchetypeId],
    ) -> EcsResult<()> {
        for &chunk in chunks {
            self.chunk_safety(chunk)?.check_unleased()?;
        }
        for &target in targets {
            for &chunk in self.archetypes.try_get(target)?.open_chunks() {
                self.chunk_safety(chunk)?.check_unleased()?;
            }
        }
        Ok(())
    }

    /// Move each entity to the archetype `target_of` picks for its current
    /// one. Validates and lease-checks the whole batch before moving anything.
    /// Returns the number of entities moved.
    fn retarget(
        &mut self,
        entities: &[Entity],
        mut target_of: impl FnMut(
            &mut ArchetypeStorage,
            &TypeRegistry,
            ArchetypeId,
        ) -> EcsResult<ArchetypeId>,
    ) -> EcsResult<usize> {
        let mut chunks: SmallVec<[ChunkId; 8]> = SmallVec::new();
        let mut targets: SmallVec<[ArchetypeId; 8]> = SmallVec::new();
        for &entity in entities {
            let loc = self.location(entity)?;
            let target = target_of(&mut self.archetypes, &*self.registry, loc.archetype)?;
            if target != loc.archetype {
                chunks.push(loc.chunk);
                targets.push(target);
            }
        }
        if chunks.is_empty() {
            return Ok(0);
        }
        self.check_unleased(&chunks, &targets)?;

        let mut moved = 0;
        for &entity in entities {
            let loc = self.location(entity)?;
            let target = target_of(&mut self.archetypes, &*self.registry, loc.archetype)?;
            if target != loc.archetype {
                self.move_entity(entity, loc, target)?;
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Archetype an entity moves to when destroyed: its system-state types
    /// plus [`TypeIndex::CLEANUP`]. `None` when it has no system state.
    fn cleanup_target(&mut self, archetype: ArchetypeId) -> EcsResult<Option<ArchetypeId>> {
        let archetype = self.archetypes.try_get(archetype)?;
        if !archetype.has_system_state() {
            return Ok(None);
        }
        let mut types: SmallVec<[TypeIndex; 8]> =
            archetype.system_state_types().iter().copied().collect();
        types.push(TypeIndex::CLEANUP);
        self.archetypes
            .get_or_create(&types, &self.registry)
            .map(Some)
    }

    /// Archetype of `source` without its uncloneable types.
    fn instance_archetype(&mut self, source: Entity) -> EcsResult<ArchetypeId> {
        let loc = self.location(source)?;
        let archetype = self.archetypes.try_get(loc.archetype)?;
        if archetype.uncloneable_types().is_empty() {
            return Ok(loc.archetype);
        }
        let uncloneable = archetype.uncloneable_types();
        let kept: SmallVec<[TypeIndex; 8]> = archetype
            .types()
            .iter()
            .copied()
            .filter(|type_index| !uncloneable.contains(type_index))
            .collect();
        self.archetypes.get_or_create(&kept, &self.registry)
    }

    fn destroy_at(
        &mut self,
        entity: Entity,
        loc: EntityLocation,
        cleanup: Option<ArchetypeId>,
    ) -> EcsResult<()> {
        match cleanup {
            Some(target) => self.move_entity(entity, loc, target).map(drop),
            None => self.despawn(entity, loc),
        }
    }

    /// Reserve a zeroed row in `archetype`, first-fit.
    fn place(&mut self, archetype: ArchetypeId) -> EcsResult<(ChunkId, usize)> {
        let (open, layout) = {
            let archetype = self.archetypes.try_get(archetype)?;
            (archetype.open_chunk(), Arc::clone(archetype.layout()))
        };
        let chunk_id = match open {
            Some(id) => {
                self.chunk_safety(id)?.begin_structural()?;
                id
            }
            None => {
                let id = self.chunks.allocate(archetype, layout);
                self.archetype_mut(archetype)?.push_chunk(id);
                id
            }
        };

        let chunk = self
            .chunks
            .get_mut(chunk_id)
            .ok_or_else(|| unknown_chunk(chunk_id))?;
        let slot = chunk.push_zeroed();
        let count = chunk.count();
        self.archetype_mut(archetype)?.on_insert(chunk_id, count);
        Ok((chunk_id, slot))
    }

    /// Swap-remove the row at `loc`, fixing the moved entity's location and
    /// releasing the chunk if it empties. Heap blocks are not touched.
    fn remove_row(&mut self, loc: EntityLocation) -> EcsResult<()> {
        let chunk = self
            .chunks
            .get_mut(loc.chunk)
            .ok_or_else(|| unknown_chunk(loc.chunk))?;
        let moved = chunk.swap_remove(loc.slot);
        let count = chunk.count();
        if let Some(moved) = moved {
            self.entities.set_location(moved.index(), loc);
        }
        if self.archetype_mut(loc.archetype)?.on_remove(loc.chunk, count) {
            self.chunks.release(loc.chunk);
        }
        Ok(())
    }

    fn spawn_in(&mut self, archetype: ArchetypeId) -> EcsResult<Entity> {
        let (chunk, slot) = self.place(archetype)?;
        let entity = self.entities.allocate(EntityLocation {
            archetype,
            chunk,
            slot,
        });
        self.chunks
            .get_mut(chunk)
            .ok_or_else(|| unknown_chunk(chunk))?
            .set_entity(slot, entity);
        tracing::trace!("Created {} in {:?}", entity, archetype);
        Ok(entity)
    }

    fn despawn(&mut self, entity: Entity, loc: EntityLocation) -> EcsResult<()> {
        self.chunk_safety(loc.chunk)?.begin_structural()?;
        self.chunks
            .get_mut(loc.chunk)
            .ok_or_else(|| unknown_chunk(loc.chunk))?
            .release_buffers(loc.slot);
        self.remove_row(loc)?;
        self.entities.free(entity);
        tracing::trace!("Destroyed {}", entity);
        Ok(())
    }

    /// Move an entity's row to `target`, carrying over shared columns.
    /// Buffers the target lacks are released.
    fn move_entity(
        &mut self,
        entity: Entity,
        from: EntityLocation,
        target: ArchetypeId,
    ) -> EcsResult<EntityLocation> {
        if from.archetype == target {
            return Ok(from);
        }
        self.chunk_safety(from.chunk)?.begin_structural()?;
        let (chunk, slot) = self.place(target)?;

        let (dst, src) = self
            .chunks
            .pair_mut(chunk, from.chunk)
            .ok_or_else(|| unknown_chunk(from.chunk))?;
        dst.set_entity(slot, entity);
        dst.copy_row_from(slot, src, from.slot);
        if dst.count() == 1 {
            dst.copy_chunk_data_from(src);
        }
        let dropped: SmallVec<[TypeIndex; 4]> = src
            .layout()
            .columns()
            .iter()
            .filter(|column| column.is_buffer && dst.layout().column(column.type_index).is_none())
            .map(|column| column.type_index)
            .collect();
        for type_index in dropped {
            src.release_buffer(type_index, from.slot);
        }

        self.remove_row(from)?;
        let to = EntityLocation {
            archetype: target,
            chunk,
            slot,
        };
        self.entities.set_location(entity.index(), to);
        tracing::trace!("Moved {} from {:?} to {:?}", entity, from.archetype, target);
        Ok(to)
    }

    /// Clone `source` into a new entity of `target`.
    fn clone_into(&mut self, source: Entity, target: ArchetypeId) -> EcsResult<Entity> {
        let from = self.location(source)?;
        let (chunk, slot) = self.place(target)?;
        if chunk == from.chunk {
            self.chunks
                .get_mut(chunk)
                .ok_or_else(|| unknown_chunk(chunk))?
                .clone_row_within(slot, from.slot);
        } else {
            let (dst, src) = self
                .chunks
                .pair_mut(chunk, from.chunk)
                .ok_or_else(|| unknown_chunk(from.chunk))?;
            dst.clone_row_from(slot, src, from.slot);
            if dst.count() == 1 {
                dst.copy_chunk_data_from(src);
            }
        }

        let entity = self.entities.allocate(EntityLocation {
            archetype: target,
            chunk,
            slot,
        });
        self.chunks
            .get_mut(chunk)
            .ok_or_else(|| unknown_chunk(chunk))?
            .set_entity(slot, entity);
        tracing::trace!("Instantiated {} from {}", entity, source);
        Ok(entity)
    }
}

fn unknown_chunk(id: ChunkId) -> EcsError {
    EcsError::InvalidArgument(format!("unknown chunk {id:?}"))
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.entity_count())
            .field("archetype_count", &self.archetypes.archetype_count())
            .field("chunks", &self.chunks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::Zeroable;

    use super::*;
    use crate::{
        component::{CleanupEntity, TypeDescriptor, TypeFlags},
        error::{AccessViolation, ErrorKind},
    };

    #[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {}

    #[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
    #[repr(C)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    impl Component for Velocity {}

    #[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
    #[repr(C)]
    struct Health(u32);

    impl Component for Health {}

    #[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
    #[repr(C)]
    struct Tracked(u32);

    impl Component for Tracked {
        const FLAGS: TypeFlags = TypeFlags::SYSTEM_STATE;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
    #[repr(C)]
    struct Waypoint(i32);

    impl Component for Waypoint {
        const CATEGORY: ComponentCategory = ComponentCategory::Buffer;
        const INLINE_CAPACITY: Option<usize> = Some(4);
    }

    #[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
    #[repr(C)]
    struct Bounds {
        min: [f32; 2],
        max: [f32; 2],
    }

    impl Component for Bounds {
        const CATEGORY: ComponentCategory = ComponentCategory::ChunkData;
    }

    fn moving_world() -> (World, ArchetypeId, TypeIndex, TypeIndex) {
        let mut world = World::new();
        let pos = world.register::<Position>().unwrap();
        let vel = world.register::<Velocity>().unwrap();
        let archetype = world.create_archetype(&[pos]).unwrap();
        (world, archetype, pos, vel)
    }

    #[test]
    fn test_create_and_exists() {
        let (mut world, archetype, _, _) = moving_world();

        let entity = world.create_entity(archetype).unwrap();
        assert!(world.exists(entity));
        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.get_component::<Position>(entity).unwrap(), Position::zeroed());

        world.destroy_entity(entity).unwrap();
        assert!(!world.exists(entity));

        // The recycled index does not revive the stale handle.
        let recycled = world.create_entity(archetype).unwrap();
        assert_eq!(recycled.index(), entity.index());
        assert!(world.exists(recycled));
        assert!(!world.exists(entity));
        assert_eq!(world.get_component::<Position>(entity).unwrap_err().kind(), ErrorKind::Argument);
    }

    #[test]
    fn test_create_entities_edge_cases() {
        let (mut world, archetype, _, _) = moving_world();
        assert!(world.create_entities(archetype, 0).unwrap().is_empty());

        let err = world
            .create_entities(ArchetypeId::from_raw(77), 3)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_get_set_component() {
        let (mut world, archetype, _, _) = moving_world();
        let entity = world.create_entity(archetype).unwrap();

        world
            .set_component(entity, Position { x: 1.0, y: 2.0 })
            .unwrap();
        world.get_component_mut::<Position>(entity).unwrap().x += 10.0;
        assert_eq!(
            world.get_component::<Position>(entity).unwrap(),
            Position { x: 11.0, y: 2.0 }
        );

        let err = world.get_component::<Velocity>(entity).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_add_component_is_idempotent() {
        let (mut world, archetype, _, vel) = moving_world();
        let entity = world.create_entity(archetype).unwrap();
        world
            .set_component(entity, Position { x: 3.0, y: 4.0 })
            .unwrap();

        assert!(world.add_component(entity, vel).unwrap());
        world
            .set_component(entity, Velocity { x: 1.0, y: 1.0 })
            .unwrap();
        assert!(!world.add_component(entity, vel).unwrap());

        assert_eq!(
            world.get_component::<Position>(entity).unwrap(),
            Position { x: 3.0, y: 4.0 }
        );
        assert_eq!(
            world.get_component::<Velocity>(entity).unwrap(),
            Velocity { x: 1.0, y: 1.0 }
        );
    }

    #[test]
    fn test_added_column_is_zeroed() {
        let (mut world, archetype, _, vel) = moving_world();
        let first = world.create_entity(archetype).unwrap();
        world.add_component(first, vel).unwrap();
        world
            .set_component(first, Velocity { x: 9.0, y: 9.0 })
            .unwrap();
        world.destroy_entity(first).unwrap();

        // Reuses the released chunk memory.
        let second = world.create_entity(archetype).unwrap();
        world.add_component(second, vel).unwrap();
        assert_eq!(world.get_component::<Velocity>(second).unwrap(), Velocity::zeroed());
    }

    #[test]
    fn test_remove_component() {
        let (mut world, archetype, pos, vel) = moving_world();
        let entity = world.create_entity(archetype).unwrap();

        assert!(!world.remove_component(entity, vel).unwrap());
        assert!(world.add_component(entity, vel).unwrap());
        assert!(world.remove_component(entity, vel).unwrap());
        assert_eq!(world.archetype_of(entity).unwrap(), archetype);
        assert!(world.has_component(entity, pos));
        assert!(!world.has_component(entity, vel));

        let err = world
            .remove_component(entity, TypeIndex::ENTITY)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }

    #[test]
    fn test_destroy_keeps_rows_dense() {
        let (mut world, archetype, _, _) = moving_world();
        let entities = world.create_entities(archetype, 5).unwrap();
        for (i, &entity) in entities.iter().enumerate() {
            world
                .set_component(entity, Position { x: i as f32, y: 0.0 })
                .unwrap();
        }

        world.destroy_entity(entities[1]).unwrap();

        let chunk = world.chunk_of(entities[0]).unwrap();
        assert_eq!(world.chunk(chunk).unwrap().count(), 4);
        // The last entity filled the hole.
        let moved = world.entity_location(entities[4]).unwrap();
        assert_eq!(moved.slot, 1);
        assert_eq!(world.chunk(chunk).unwrap().entities()[1], entities[4]);
        assert_eq!(world.get_component::<Position>(entities[4]).unwrap().x, 4.0);

        // Destroying again is a no-op.
        world.destroy_entity(entities[1]).unwrap();
        assert_eq!(world.entity_count(), 4);
    }

    #[test]
    fn test_batch_add_validates_everything_first() {
        let (mut world, archetype, _, vel) = moving_world();
        let entities = world.create_entities(archetype, 10).unwrap();
        world.destroy_entity(entities[6]).unwrap();

        let err = world.add_component_batch(&entities, vel).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
        for &entity in entities.iter().filter(|&&e| e != entities[6]) {
            assert!(!world.has_component(entity, vel));
        }

        let live: Vec<Entity> = world.all_entities();
        let mut with_duplicates = live.clone();
        with_duplicates.push(live[0]);
        world.add_component_batch(&with_duplicates, vel).unwrap();
        assert!(live.iter().all(|&entity| world.has_component(entity, vel)));
    }

    #[test]
    fn test_system_state_lifecycle() {
        let mut world = World::new();
        let pos = world.register::<Position>().unwrap();
        let tracked = world.register::<Tracked>().unwrap();
        let archetype = world.create_archetype(&[pos, tracked]).unwrap();
        let entity = world.create_entity(archetype).unwrap();
        world.set_component(entity, Tracked(7)).unwrap();

        let err = world.remove_component(entity, tracked).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        world.destroy_entity(entity).unwrap();
        assert!(world.exists(entity));
        assert!(world.has::<CleanupEntity>(entity));
        assert!(!world.has_component(entity, pos));
        assert_eq!(world.get_component::<Tracked>(entity).unwrap(), Tracked(7));

        assert!(world.remove_system_state(entity, tracked).unwrap());
        assert!(!world.exists(entity));
    }

    #[test]
    fn test_instantiate_drops_system_state() {
        let mut world = World::new();
        let pos = world.register::<Position>().unwrap();
        let tracked = world.register::<Tracked>().unwrap();
        let archetype = world.create_archetype(&[pos, tracked]).unwrap();
        let source = world.create_entity(archetype).unwrap();
        world
            .set_component(source, Position { x: 5.0, y: 6.0 })
            .unwrap();

        let copies = world.instantiate_many(source, 3).unwrap();
        assert_eq!(copies.len(), 3);
        for &copy in &copies {
            assert!(!world.has_component(copy, tracked));
            assert_eq!(
                world.get_component::<Position>(copy).unwrap(),
                Position { x: 5.0, y: 6.0 }
            );
        }
        assert!(world.instantiate_many(source, 0).unwrap().is_empty());

        let stale = copies[0];
        world.destroy_entity(stale).unwrap();
        assert_eq!(world.instantiate(stale).unwrap_err().kind(), ErrorKind::Argument);
    }

    #[test]
    fn test_instantiate_same_archetype_shares_chunk() {
        let (mut world, archetype, _, _) = moving_world();
        let source = world.create_entity(archetype).unwrap();
        world
            .set_component(source, Position { x: 1.5, y: -1.5 })
            .unwrap();

        let copy = world.instantiate(source).unwrap();
        assert_eq!(world.chunk_of(copy).unwrap(), world.chunk_of(source).unwrap());
        assert_eq!(
            world.get_component::<Position>(copy).unwrap(),
            Position { x: 1.5, y: -1.5 }
        );
    }

    #[test]
    fn test_set_archetype() {
        let mut world = World::new();
        let pos = world.register::<Position>().unwrap();
        let vel = world.register::<Velocity>().unwrap();
        let tracked = world.register::<Tracked>().unwrap();
        let with_state = world.create_archetype(&[pos, tracked]).unwrap();
        let moving = world.create_archetype(&[pos, vel]).unwrap();
        let moving_state = world.create_archetype(&[vel, tracked]).unwrap();

        let entity = world.create_entity(with_state).unwrap();
        world.set_component(entity, Tracked(3)).unwrap();

        let err = world.set_archetype(entity, moving).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        world.set_archetype(entity, moving_state).unwrap();
        assert_eq!(world.archetype_of(entity).unwrap(), moving_state);
        assert_eq!(world.get_component::<Tracked>(entity).unwrap(), Tracked(3));
    }

    #[test]
    fn test_chunk_component() {
        let mut world = World::new();
        let pos = world.register::<Position>().unwrap();
        let bounds = world.register::<Bounds>().unwrap();
        let archetype = world.create_archetype(&[pos, bounds]).unwrap();
        let entity = world.create_entity(archetype).unwrap();
        let chunk = world.chunk_of(entity).unwrap();

        let value = Bounds {
            min: [0.0, 0.0],
            max: [8.0, 8.0],
        };
        world.set_chunk_component(chunk, value).unwrap();
        assert_eq!(world.chunk_component::<Bounds>(chunk).unwrap(), value);

        let err = world.get_component::<Bounds>(entity).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_buffer_category_is_checked() {
        let mut world = World::new();
        let waypoints = world.register::<Waypoint>().unwrap();
        let archetype = world.create_archetype(&[waypoints]).unwrap();
        let entity = world.create_entity(archetype).unwrap();

        let err = world.get_component::<Waypoint>(entity).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);

        let mut buffer = world.get_buffer::<Waypoint>(entity).unwrap();
        assert_eq!(buffer.capacity().unwrap(), 4);
        buffer.add(Waypoint(1)).unwrap();
        assert_eq!(buffer.to_vec().unwrap(), vec![Waypoint(1)]);
    }

    #[test]
    fn test_reads_do_not_register_types() {
        let mut world = World::new();
        let entity = world.create_entity_with::<Position>().unwrap();
        let chunk = world.chunk_of(entity).unwrap();
        let registered = world.registry().type_count();

        let err = world.get_component::<Health>(entity).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        let err = world.get_buffer_read_only::<Waypoint>(entity).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        let err = world.chunk_component::<Bounds>(chunk).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(world.buffer_lookup::<Waypoint>(true).is_err());
        assert!(!world.has::<Health>(entity));

        assert_eq!(world.registry().type_count(), registered);
        assert_eq!(world.type_index::<Health>(), None);
        assert_eq!(world.type_index::<Waypoint>(), None);
    }

    #[test]
    fn test_pinned_buffer_blocks_structural_changes() {
        let mut world = World::new();
        let waypoints = world.register::<Waypoint>().unwrap();
        let health = world.register::<Health>().unwrap();
        let archetype = world.create_archetype(&[waypoints]).unwrap();
        let entity = world.create_entity(archetype).unwrap();

        let pinned = world
            .get_buffer::<Waypoint>(entity)
            .unwrap()
            .as_array()
            .unwrap()
            .pin()
            .unwrap();

        let err = world.add_component(entity, health).unwrap_err();
        assert_eq!(
            err,
            EcsError::AccessViolation {
                type_index: waypoints,
                violation: AccessViolation::ChunkLeased
            }
        );
        // New rows would land in the pinned chunk too.
        assert!(world.create_entity(archetype).is_err());
        assert!(!world.has_component(entity, health));

        drop(pinned);
        assert!(world.add_component(entity, health).unwrap());
    }

    #[test]
    fn test_change_tracking() {
        let (mut world, archetype, _, _) = moving_world();
        let mut tracker = EntityChangeTracker::new();

        let entities = world.create_entities(archetype, 3).unwrap();
        let changes = world.changed_entities(&mut tracker);
        assert_eq!(changes.created, entities);
        assert!(changes.destroyed.is_empty());

        world.destroy_entity(entities[1]).unwrap();
        let changes = world.changed_entities(&mut tracker);
        assert!(changes.created.is_empty());
        assert_eq!(changes.destroyed, vec![entities[1]]);

        assert_eq!(world.changed_entities(&mut tracker), EntityChanges::default());
    }

    #[test]
    fn test_chunks_return_to_pool() {
        let mut world = World::with_config(WorldConfig::default().with_chunk_pool_limit(1));
        let pos = world.register::<Position>().unwrap();
        let archetype = world.create_archetype(&[pos]).unwrap();
        let capacity = world.archetype(archetype).unwrap().chunk_capacity();

        let entities = world.create_entities(archetype, capacity + 1).unwrap();
        assert_eq!(world.archetype(archetype).unwrap().chunk_count(), 2);
        assert_eq!(world.chunk_count(), 2);

        world.destroy_entities(&entities).unwrap();
        assert_eq!(world.chunk_count(), 0);
        assert_eq!(world.pooled_chunks(), 1);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_create_entity_with_component_set() {
        let mut world = World::new();
        let entity = world.create_entity_with::<(Position, Velocity)>().unwrap();
        let same = world.archetype_for::<(Velocity, Position)>().unwrap();
        assert_eq!(world.archetype_of(entity).unwrap(), same);
        assert!(world.has::<Position>(entity));
        assert!(world.has::<Velocity>(entity));

        let single = world.create_entity_with::<Health>().unwrap();
        assert!(world.insert(single, Position { x: 1.0, y: 1.0 }).unwrap());
        assert!(!world.insert(single, Position { x: 2.0, y: 2.0 }).unwrap());
        assert_eq!(world.get_component::<Position>(single).unwrap().x, 2.0);
    }

    #[test]
    fn test_shared_registry() {
        let registry = TypeRegistry::shared();
        let speed = registry
            .register(TypeDescriptor::dynamic("Speed", ComponentCategory::PlainData, 4, 4))
            .unwrap()
            .index();

        let mut a = World::with_registry(Arc::clone(&registry));
        let mut b = World::with_registry(registry);
        let in_a = a.create_archetype(&[speed]).unwrap();
        let in_b = b.create_archetype(&[speed]).unwrap();
        assert_eq!(
            a.archetype(in_a).unwrap().types(),
            b.archetype(in_b).unwrap().types()
        );
    }
}

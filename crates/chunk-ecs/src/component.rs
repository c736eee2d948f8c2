//! Component type registration and layout metadata.
//!
//! Every component type gets a stable [`TypeIndex`] and a [`TypeInfo`]
//! describing how it is laid out inside a chunk. Layout is resolved once, at
//! registration, from the type's [`ComponentCategory`]; nothing downstream
//! dispatches on the Rust type again.
//!
//! The registry is an explicit service: create one with [`TypeRegistry::shared`]
//! and hand it to every [`World`](crate::World) that must agree on numbering.

use std::{any::TypeId, borrow::Cow, fmt, sync::Arc};

use bitflags::bitflags;
use bytemuck::Zeroable;
use hashbrown::HashMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;
use smallvec::{SmallVec, smallvec};

use crate::{
    buffer::{BUFFER_HEADER_SIZE, BUFFER_HEAP_ALIGN},
    chunk::{CHUNK_ALIGN, CHUNK_BUFFER_SIZE},
    entity::Entity,
    error::{EcsError, EcsResult},
};

/// Inline capacity used by buffer types that do not declare one.
pub const DEFAULT_BUFFER_CAPACITY: usize = 32;

/// How a component type is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentCategory {
    /// One value per entity, stored in a chunk column.
    PlainData,
    /// Growable sequence per entity: inline header + storage, heap on overflow.
    Buffer,
    /// Value lives in an external shared store; only membership is tracked.
    SharedData,
    /// Zero-sized marker; membership only.
    Tag,
    /// One value per chunk.
    ChunkData,
    /// The built-in entity column.
    Entity,
}

bitflags! {
    /// Behavioural flags attached to a component type.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u8 {
        /// Survives destruction; must be removed explicitly. Never cloned.
        const SYSTEM_STATE = 1;
        /// Dropped when an entity is instantiated.
        const NON_CLONEABLE = 1 << 1;
    }
}

/// Types that can live in a chunk.
///
/// Chunk storage zero-initializes new slots and moves values bytewise, so a
/// component must be `Copy` and valid when all-zero. For
/// [`ComponentCategory::Buffer`], `Self` is the element type.
///
/// Usually implemented through `#[derive(Component)]`:
///
/// ```ignore
/// #[derive(Component, Clone, Copy, Zeroable, Pod)]
/// #[repr(C)]
/// #[component(buffer(capacity = 8))]
/// struct Waypoint(i32);
/// ```
pub trait Component: Copy + Zeroable + Send + Sync + 'static {
    /// Storage category.
    const CATEGORY: ComponentCategory = ComponentCategory::PlainData;
    /// Behavioural flags.
    const FLAGS: TypeFlags = TypeFlags::empty();
    /// Inline element capacity for buffer types.
    const INLINE_CAPACITY: Option<usize> = None;
}

impl Component for Entity {
    const CATEGORY: ComponentCategory = ComponentCategory::Entity;
}

/// Built-in tag added to an entity destroyed while it still carries
/// system-state components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupEntity;

// SAFETY: zero-sized.
unsafe impl Zeroable for CleanupEntity {}

impl Component for CleanupEntity {
    const CATEGORY: ComponentCategory = ComponentCategory::Tag;
    const FLAGS: TypeFlags = TypeFlags::NON_CLONEABLE;
}

/// A static list of component types, used to name an archetype by type.
///
/// Implemented for every [`Component`] and for tuples of up to eight.
pub trait ComponentSet {
    /// Register every member and return their indices.
    fn type_indices(registry: &TypeRegistry) -> EcsResult<SmallVec<[TypeIndex; 8]>>;
}

impl<C: Component> ComponentSet for C {
    fn type_indices(registry: &TypeRegistry) -> EcsResult<SmallVec<[TypeIndex; 8]>> {
        Ok(smallvec![registry.register_type::<C>()?.index()])
    }
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn type_indices(registry: &TypeRegistry) -> EcsResult<SmallVec<[TypeIndex; 8]>> {
                Ok(smallvec![$(registry.register_type::<$name>()?.index()),+])
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

/// Stable identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(u32);

impl TypeIndex {
    /// The built-in entity column.
    pub const ENTITY: Self = Self(0);
    /// The built-in [`CleanupEntity`] tag.
    pub const CLEANUP: Self = Self(1);

    /// Create a type index from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw index value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeIndex({})", self.0)
    }
}

/// Registration key: a Rust type, or a name for runtime-described types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// A concrete Rust type.
    Rust(TypeId),
    /// A type described only at runtime.
    Named(Cow<'static, str>),
}

/// Input to [`TypeRegistry::register`].
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    key: TypeKey,
    name: Cow<'static, str>,
    category: ComponentCategory,
    flags: TypeFlags,
    /// Value size; element size for buffers.
    size: usize,
    /// Value alignment; element alignment for buffers.
    align: usize,
    inline_capacity: Option<usize>,
}

impl TypeDescriptor {
    /// Describe a Rust component type.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            key: TypeKey::Rust(TypeId::of::<T>()),
            name: Cow::Borrowed(std::any::type_name::<T>()),
            category: T::CATEGORY,
            flags: T::FLAGS,
            size: size_of::<T>(),
            align: align_of::<T>(),
            inline_capacity: T::INLINE_CAPACITY,
        }
    }

    /// Describe a type known only at runtime. `size`/`align` are the element
    /// layout for buffers.
    #[must_use]
    pub fn dynamic(
        name: impl Into<Cow<'static, str>>,
        category: ComponentCategory,
        size: usize,
        align: usize,
    ) -> Self {
        let name = name.into();
        Self {
            key: TypeKey::Named(name.clone()),
            name,
            category,
            flags: TypeFlags::empty(),
            size,
            align,
            inline_capacity: None,
        }
    }

    /// Set behavioural flags.
    #[must_use]
    pub fn with_flags(mut self, flags: TypeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Override the inline capacity of a buffer type.
    #[must_use]
    pub fn with_inline_capacity(mut self, capacity: usize) -> Self {
        self.inline_capacity = Some(capacity);
        self
    }

    /// Registration key.
    #[must_use]
    pub const fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Resolve the descriptor into chunk layout metadata.
    fn resolve(&self, index: TypeIndex) -> EcsResult<TypeInfo> {
        let name = self.name.as_ref();
        if !self.align.is_power_of_two() {
            return Err(EcsError::invalid_type(name, "alignment must be a power of two"));
        }
        if self.align > CHUNK_ALIGN {
            return Err(EcsError::invalid_type(
                name,
                format!("alignment exceeds chunk alignment {CHUNK_ALIGN}"),
            ));
        }

        let mut category = self.category;
        if category == ComponentCategory::PlainData && self.size == 0 {
            category = ComponentCategory::Tag;
        }

        let (column_size, column_align, inline_capacity) = match category {
            ComponentCategory::Entity => {
                if index != TypeIndex::ENTITY {
                    return Err(EcsError::invalid_type(name, "the entity category is reserved"));
                }
                (self.size, self.align, 0)
            }
            ComponentCategory::PlainData => (self.size, self.align, 0),
            ComponentCategory::Tag => {
                if self.size != 0 {
                    return Err(EcsError::invalid_type(name, "tag types must be zero-sized"));
                }
                (0, 1, 0)
            }
            ComponentCategory::SharedData => (0, 1, 0),
            ComponentCategory::ChunkData => {
                if self.size == 0 {
                    return Err(EcsError::invalid_type(name, "chunk components must not be zero-sized"));
                }
                (0, 1, 0)
            }
            ComponentCategory::Buffer => {
                if self.size == 0 {
                    return Err(EcsError::invalid_type(name, "buffer element size is zero"));
                }
                if self.align > BUFFER_HEAP_ALIGN {
                    return Err(EcsError::invalid_type(
                        name,
                        format!("buffer element alignment exceeds {BUFFER_HEAP_ALIGN}"),
                    ));
                }
                let capacity = self.inline_capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY);
                let inline_bytes = capacity
                    .checked_mul(self.size)
                    .ok_or_else(|| EcsError::invalid_type(name, "inline capacity overflows"))?;
                let align = self.align.max(align_of::<u64>());
                let size = (BUFFER_HEADER_SIZE + inline_bytes).next_multiple_of(align);
                (size, align, capacity)
            }
        };

        // A lone entity of this type must fit next to its entity column.
        let alone = column_size
            + size_of::<Entity>()
            + if category == ComponentCategory::ChunkData {
                self.size + self.align
            } else {
                column_align
            };
        if alone > CHUNK_BUFFER_SIZE {
            return Err(EcsError::invalid_type(
                name,
                format!("needs {alone} bytes, chunk budget is {CHUNK_BUFFER_SIZE}"),
            ));
        }

        Ok(TypeInfo {
            index,
            name: Arc::from(name),
            category,
            flags: self.flags,
            size: self.size,
            align: self.align,
            column_size,
            column_align,
            inline_capacity,
            type_id: match self.key {
                TypeKey::Rust(id) => Some(id),
                TypeKey::Named(_) => None,
            },
        })
    }
}

/// Resolved metadata for a registered component type.
#[derive(Clone)]
pub struct TypeInfo {
    index: TypeIndex,
    name: Arc<str>,
    category: ComponentCategory,
    flags: TypeFlags,
    size: usize,
    align: usize,
    column_size: usize,
    column_align: usize,
    inline_capacity: usize,
    type_id: Option<TypeId>,
}

impl TypeInfo {
    /// Stable identity.
    #[must_use]
    pub const fn index(&self) -> TypeIndex {
        self.index
    }

    /// Type name for debugging.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage category.
    #[must_use]
    pub const fn category(&self) -> ComponentCategory {
        self.category
    }

    /// Behavioural flags.
    #[must_use]
    pub const fn flags(&self) -> TypeFlags {
        self.flags
    }

    /// Value size in bytes (element size for buffers).
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Value alignment (element alignment for buffers).
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Bytes each entity occupies in this type's chunk column.
    #[must_use]
    pub const fn column_size(&self) -> usize {
        self.column_size
    }

    /// Alignment of this type's chunk column.
    #[must_use]
    pub const fn column_align(&self) -> usize {
        self.column_align
    }

    /// Declared inline capacity (buffers only, 0 otherwise).
    #[must_use]
    pub const fn inline_capacity(&self) -> usize {
        self.inline_capacity
    }

    /// Element size for buffers (same as [`size`](Self::size)).
    #[must_use]
    pub const fn element_size(&self) -> usize {
        self.size
    }

    /// Whether this is a buffer type.
    #[must_use]
    pub fn is_buffer(&self) -> bool {
        self.category == ComponentCategory::Buffer
    }

    /// Whether this type has a per-entity column in chunks.
    #[must_use]
    pub const fn has_column(&self) -> bool {
        self.column_size > 0
    }

    /// Whether the value is stored once per chunk.
    #[must_use]
    pub fn is_chunk_data(&self) -> bool {
        self.category == ComponentCategory::ChunkData
    }

    /// Whether this type survives destruction and needs explicit removal.
    #[must_use]
    pub const fn is_system_state(&self) -> bool {
        self.flags.contains(TypeFlags::SYSTEM_STATE)
    }

    /// Whether instantiation copies this type.
    #[must_use]
    pub fn is_cloneable(&self) -> bool {
        !self
            .flags
            .intersects(TypeFlags::SYSTEM_STATE | TypeFlags::NON_CLONEABLE)
            && self.category != ComponentCategory::Entity
    }

    /// Check if this info is for the given Rust type.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == Some(TypeId::of::<T>())
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("flags", &self.flags)
            .field("size", &self.size)
            .field("column_size", &self.column_size)
            .finish()
    }
}

#[derive(Default)]
struct RegistryInner {
    by_key: HashMap<TypeKey, TypeIndex, FxBuildHasher>,
    infos: Vec<TypeInfo>,
}

/// Registry for component types.
///
/// Append-only: identities are never reused and layouts never change.
/// Thread-safe; typically populated at startup and shared between worlds.
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Create a registry holding only the built-in types.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            inner: RwLock::new(RegistryInner::default()),
        };
        let entity = registry.register_type::<Entity>();
        let cleanup = registry.register_type::<CleanupEntity>();
        debug_assert!(matches!(entity, Ok(ref info) if info.index() == TypeIndex::ENTITY));
        debug_assert!(matches!(cleanup, Ok(ref info) if info.index() == TypeIndex::CLEANUP));
        registry
    }

    /// Create a registry ready to be shared between worlds.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a type described at runtime.
    ///
    /// Idempotent per key. Re-registering a key with a different layout fails.
    pub fn register(&self, descriptor: TypeDescriptor) -> EcsResult<TypeInfo> {
        if let Some(info) = self.lookup_key(descriptor.key()) {
            return Self::check_same_layout(&info, &descriptor).map(|()| info);
        }

        let mut inner = self.inner.write();
        // Raced with another registration of the same key.
        if let Some(&index) = inner.by_key.get(descriptor.key()) {
            let info = inner.infos[index.as_raw() as usize].clone();
            return Self::check_same_layout(&info, &descriptor).map(|()| info);
        }

        let index = TypeIndex(inner.infos.len() as u32);
        let info = descriptor.resolve(index)?;
        tracing::debug!(
            "Registered component {} as {:?} ({:?}, {} bytes per entity)",
            info.name(),
            index,
            info.category(),
            info.column_size()
        );
        inner.by_key.insert(descriptor.key, index);
        inner.infos.push(info.clone());
        Ok(info)
    }

    /// Register a Rust component type.
    pub fn register_type<T: Component>(&self) -> EcsResult<TypeInfo> {
        if let Some(info) = self.lookup_key(&TypeKey::Rust(TypeId::of::<T>())) {
            return Ok(info);
        }
        self.register(TypeDescriptor::of::<T>())
    }

    /// Get the index of a Rust type, if registered.
    #[must_use]
    pub fn type_index<T: Component>(&self) -> Option<TypeIndex> {
        self.inner
            .read()
            .by_key
            .get(&TypeKey::Rust(TypeId::of::<T>()))
            .copied()
    }

    /// Get the index registered under a runtime name.
    #[must_use]
    pub fn type_index_by_name(&self, name: &str) -> Option<TypeIndex> {
        self.inner
            .read()
            .by_key
            .get(&TypeKey::Named(Cow::Owned(name.to_owned())))
            .copied()
    }

    /// Get type info by index.
    #[must_use]
    pub fn info(&self, index: TypeIndex) -> Option<TypeInfo> {
        self.inner.read().infos.get(index.as_raw() as usize).cloned()
    }

    /// Number of registered types, built-ins included.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.inner.read().infos.len()
    }

    /// Snapshot of every registered type.
    #[must_use]
    pub fn infos(&self) -> Vec<TypeInfo> {
        self.inner.read().infos.clone()
    }

    fn lookup_key(&self, key: &TypeKey) -> Option<TypeInfo> {
        let inner = self.inner.read();
        let index = inner.by_key.get(key)?;
        inner.infos.get(index.as_raw() as usize).cloned()
    }

    fn check_same_layout(info: &TypeInfo, descriptor: &TypeDescriptor) -> EcsResult<()> {
        let candidate = descriptor.resolve(info.index)?;
        let same = candidate.category == info.category
            && candidate.flags == info.flags
            && candidate.size == info.size
            && candidate.align == info.align
            && candidate.column_size == info.column_size
            && candidate.column_align == info.column_align
            && candidate.inline_capacity == info.inline_capacity;
        if same {
            Ok(())
        } else {
            Err(EcsError::invalid_type(
                info.name(),
                "re-registered with a different layout",
            ))
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TypeRegistry")
            .field("count", &inner.infos.len())
            .field("types", &inner.infos)
            .finish()
    }
}

//! Error types for the data store.
//!
//! Every fallible operation returns [`EcsResult`]. Errors are raised at the
//! point of misuse and never retried internally; callers inspect
//! [`EcsError::kind`] to branch on the broad category.

use thiserror::Error;

use crate::{archetype::ArchetypeId, component::TypeIndex, entity::Entity};

/// Broad error category, independent of the specific variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: unknown entity or archetype, bad descriptor.
    Argument,
    /// A type descriptor that can never be stored.
    InvalidType,
    /// Valid input, but not in the current state.
    InvalidOperation,
    /// Structural change that would strip a system-state type.
    InvalidTransition,
    /// Index or range outside `[0, len]`.
    IndexOutOfRange,
    /// A view whose storage changed after it was created.
    StaleView,
    /// Read-only violation or conflicting lease.
    AccessViolation,
    /// Not even one entity fits a chunk.
    ArchetypeTooLarge,
}

/// Why an access was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessViolation {
    /// Write through a read-only view.
    ReadOnly,
    /// Another lease holds the same (chunk, type) for writing.
    WriteLeased,
    /// Another lease holds the same (chunk, type) for reading.
    ReadLeased,
    /// A structural change touched a chunk that is currently leased.
    ChunkLeased,
    /// The type was not declared in the accessor's capability set.
    Undeclared,
}

/// Error type for all data store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The entity does not exist (destroyed, stale version, or never created).
    #[error("entity {0} does not exist")]
    EntityNotFound(Entity),

    /// The archetype id does not refer to an interned archetype.
    #[error("unknown archetype {0:?}")]
    UnknownArchetype(ArchetypeId),

    /// The type index was never registered.
    #[error("unknown component type {0:?}")]
    UnknownType(TypeIndex),

    /// Any other malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The descriptor can never be stored.
    #[error("invalid type `{name}`: {reason}")]
    InvalidType {
        /// Type name from the descriptor.
        name: String,
        /// Human readable reason.
        reason: String,
    },

    /// The type combination cannot fit a single entity in one chunk.
    #[error("archetype needs {required} bytes per entity, chunk budget is {budget}")]
    ArchetypeTooLarge {
        /// Bytes one entity needs, including chunk-level data.
        required: usize,
        /// Usable bytes in a chunk.
        budget: usize,
    },

    /// A transition would remove a system-state component.
    #[error("cannot remove system-state component {0:?} without explicit opt-in")]
    InvalidTransition(TypeIndex),

    /// The entity lacks the requested component.
    #[error("entity {entity} has no component {type_index:?}")]
    MissingComponent {
        /// Entity queried.
        entity: Entity,
        /// Requested type.
        type_index: TypeIndex,
    },

    /// The operation is not valid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Index or range outside the valid bounds.
    #[error("index {index} (count {count}) out of range for length {len}")]
    IndexOutOfRange {
        /// Start index.
        index: usize,
        /// Element count of the range (1 for single-index operations).
        count: usize,
        /// Current length.
        len: usize,
    },

    /// The view's storage changed after it was created.
    #[error("stale view: captured epoch {captured}, current epoch {current}")]
    StaleView {
        /// Epoch captured when the view was created.
        captured: u64,
        /// Epoch now.
        current: u64,
    },

    /// Access refused by the safety system.
    #[error("access violation on {type_index:?}: {violation:?}")]
    AccessViolation {
        /// Type being accessed.
        type_index: TypeIndex,
        /// What went wrong.
        violation: AccessViolation,
    },
}

impl EcsError {
    /// The broad category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EntityNotFound(_)
            | Self::UnknownArchetype(_)
            | Self::UnknownType(_)
            | Self::InvalidArgument(_) => ErrorKind::Argument,
            Self::InvalidType { .. } => ErrorKind::InvalidType,
            Self::ArchetypeTooLarge { .. } => ErrorKind::ArchetypeTooLarge,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::MissingComponent { .. } | Self::InvalidOperation(_) => {
                ErrorKind::InvalidOperation
            }
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::StaleView { .. } => ErrorKind::StaleView,
            Self::AccessViolation { .. } => ErrorKind::AccessViolation,
        }
    }

    pub(crate) fn invalid_type(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidType {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Result type for data store operations.
pub type EcsResult<T> = Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = EcsError::EntityNotFound(Entity::NULL);
        assert_eq!(err.kind(), ErrorKind::Argument);

        let err = EcsError::IndexOutOfRange {
            index: 5,
            count: 2,
            len: 4,
        };
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        assert_eq!(
            err.to_string(),
            "index 5 (count 2) out of range for length 4"
        );

        let err = EcsError::MissingComponent {
            entity: Entity::NULL,
            type_index: TypeIndex::ENTITY,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }
}

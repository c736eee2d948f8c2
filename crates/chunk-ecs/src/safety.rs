//! Per-chunk safety state: epochs and leases.
//!
//! Handles that outlive a borrow of the world (buffer handles, exported
//! arrays) capture epochs and revalidate on every use. Concurrent access is
//! arbitrated by leases on `(chunk, type)` pairs: any number of readers or
//! one writer. Conflicting requests fail immediately, nothing ever waits.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxBuildHasher;

use crate::{
    component::TypeIndex,
    error::{AccessViolation, EcsError, EcsResult},
};

/// Identity of a lease holder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LeaseId(u64);

impl LeaseId {
    /// Allocate a process-unique lease id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Requested access to a component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Shared read access.
    ReadOnly,
    /// Exclusive read-write access.
    ReadWrite,
}

#[derive(Debug, Default, Clone, Copy)]
struct BorrowState {
    readers: u32,
    writer: Option<LeaseId>,
}

impl BorrowState {
    const fn is_free(self) -> bool {
        self.readers == 0 && self.writer.is_none()
    }
}

type Borrows = HashMap<TypeIndex, BorrowState, FxBuildHasher>;

/// Safety state shared by a chunk slot and every handle into it.
///
/// Outlives the chunk memory: the arena keeps one per slot for the life of the
/// world, so epochs only ever increase.
#[derive(Debug, Default)]
pub struct ChunkSafety {
    structural: AtomicU64,
    content: AtomicU64,
    borrows: Mutex<Borrows>,
}

/// Proof that an access check passed; holds the borrow table locked while the
/// caller touches memory.
pub(crate) struct AccessGuard<'a> {
    _borrows: MutexGuard<'a, Borrows>,
}

impl ChunkSafety {
    /// Create fresh safety state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current structural epoch.
    #[must_use]
    pub fn structural_epoch(&self) -> u64 {
        self.structural.load(Ordering::Acquire)
    }

    /// Current content epoch.
    #[must_use]
    pub fn content_epoch(&self) -> u64 {
        self.content.load(Ordering::Acquire)
    }

    pub(crate) fn bump_structural(&self) {
        self.structural.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn bump_content(&self) {
        self.content.fetch_add(1, Ordering::AcqRel);
    }

    /// Fail with `StaleView` unless the structural epoch is still `captured`.
    pub fn check_structural(&self, captured: u64) -> EcsResult<()> {
        let current = self.structural_epoch();
        if current == captured {
            Ok(())
        } else {
            Err(EcsError::StaleView { captured, current })
        }
    }

    /// Fail with `StaleView` unless the content epoch is still `captured`.
    pub fn check_content(&self, captured: u64) -> EcsResult<()> {
        let current = self.content_epoch();
        if current == captured {
            Ok(())
        } else {
            Err(EcsError::StaleView { captured, current })
        }
    }

    /// Whether any lease is held on this chunk.
    #[must_use]
    pub fn is_leased(&self) -> bool {
        self.borrows.lock().values().any(|state| !state.is_free())
    }

    /// Fail with `ChunkLeased` if any lease is held, without side effects.
    pub(crate) fn check_unleased(&self) -> EcsResult<()> {
        let borrows = self.borrows.lock();
        match borrows.iter().find(|(_, state)| !state.is_free()) {
            Some((&type_index, _)) => Err(violation(type_index, AccessViolation::ChunkLeased)),
            None => Ok(()),
        }
    }

    /// Start a structural change: fail if any lease is held, otherwise bump
    /// the structural epoch. Runs under the borrow lock so no handle can be
    /// mid-access while the epoch moves.
    pub(crate) fn begin_structural(&self) -> EcsResult<()> {
        let borrows = self.borrows.lock();
        if let Some((&type_index, _)) = borrows.iter().find(|(_, state)| !state.is_free()) {
            return Err(violation(type_index, AccessViolation::ChunkLeased));
        }
        self.structural.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Invalidate every view of the chunk. Returns whether a lease is still
    /// held, in which case the memory must not be freed.
    pub(crate) fn invalidate(&self) -> bool {
        let borrows = self.borrows.lock();
        self.structural.fetch_add(1, Ordering::AcqRel);
        self.content.fetch_add(1, Ordering::AcqRel);
        borrows.values().any(|state| !state.is_free())
    }

    /// Record a lease on `type_index`.
    pub fn acquire(&self, type_index: TypeIndex, mode: AccessMode, lease: LeaseId) -> EcsResult<()> {
        let mut borrows = self.borrows.lock();
        let state = borrows.entry(type_index).or_default();
        if state.writer.is_some_and(|writer| writer != lease) {
            return Err(violation(type_index, AccessViolation::WriteLeased));
        }
        match mode {
            AccessMode::ReadOnly => state.readers += 1,
            AccessMode::ReadWrite => {
                if state.readers > 0 {
                    return Err(violation(type_index, AccessViolation::ReadLeased));
                }
                state.writer = Some(lease);
            }
        }
        Ok(())
    }

    /// Drop a lease recorded by [`ChunkSafety::acquire`].
    pub fn release(&self, type_index: TypeIndex, mode: AccessMode, lease: LeaseId) {
        let mut borrows = self.borrows.lock();
        let Some(state) = borrows.get_mut(&type_index) else {
            return;
        };
        match mode {
            AccessMode::ReadOnly => state.readers = state.readers.saturating_sub(1),
            AccessMode::ReadWrite => {
                if state.writer == Some(lease) {
                    state.writer = None;
                }
            }
        }
        if state.is_free() {
            borrows.remove(&type_index);
        }
    }

    /// Check read access for a holder of `lease` (or nobody) and lock the
    /// borrow table for the duration of the read.
    pub(crate) fn read_access(
        &self,
        type_index: TypeIndex,
        lease: Option<LeaseId>,
    ) -> EcsResult<AccessGuard<'_>> {
        let borrows = self.borrows.lock();
        let foreign_writer = borrows
            .get(&type_index)
            .and_then(|state| state.writer)
            .is_some_and(|writer| Some(writer) != lease);
        if foreign_writer {
            return Err(violation(type_index, AccessViolation::WriteLeased));
        }
        Ok(AccessGuard { _borrows: borrows })
    }

    /// Check write access for a holder of `lease` (or nobody) and lock the
    /// borrow table for the duration of the write.
    pub(crate) fn write_access(
        &self,
        type_index: TypeIndex,
        lease: Option<LeaseId>,
    ) -> EcsResult<AccessGuard<'_>> {
        let borrows = self.borrows.lock();
        if let Some(state) = borrows.get(&type_index) {
            if state.writer.is_some_and(|writer| Some(writer) != lease) {
                return Err(violation(type_index, AccessViolation::WriteLeased));
            }
            if state.readers > 0 {
                return Err(violation(type_index, AccessViolation::ReadLeased));
            }
        }
        Ok(AccessGuard { _borrows: borrows })
    }
}

const fn violation(type_index: TypeIndex, violation: AccessViolation) -> EcsError {
    EcsError::AccessViolation {
        type_index,
        violation,
    }
}

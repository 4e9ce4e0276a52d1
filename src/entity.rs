//! Entity handles.
//!
//! An [`Entity`] is a versioned handle identifying one logical object.
//! Allocation, generational recycling, and the free-list live in
//! [`crate::registry::EntityRegistry`], since the spec ties free-slot
//! bookkeeping directly to registry state rather than a standalone
//! allocator type.

use std::fmt;

/// A versioned entity handle: `(index, version)`.
///
/// Equality is bitwise. Total order is lexicographic by `index` then
/// `version` -- the field order below is load-bearing for the derived
/// `Ord`/`PartialOrd` impls to produce that ordering without a manual
/// implementation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity {
    pub(crate) index: i32,
    pub(crate) version: i32,
}

impl Entity {
    /// Construct a handle directly. Exposed mainly for tests and for
    /// reconstructing handles from stored `(index, version)` pairs.
    #[inline]
    pub fn new(index: i32, version: i32) -> Self {
        Self { index, version }
    }

    /// The slot index this handle refers to.
    #[inline]
    pub fn index(self) -> i32 {
        self.index
    }

    /// The version this handle was valid for.
    #[inline]
    pub fn version(self) -> i32 {
        self.version
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}, v{})", self.index, self.version)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.version)
    }
}

//! Interned archetype descriptors.
//!
//! An [`EntityArchetype`] is a canonical, sorted set of component types with
//! precomputed layout metadata. Archetypes are interned process-wide (see
//! the module-level note below on why interning is global rather than
//! per-[`crate::lookup::EntityTableLookup`]), so two archetypes built from
//! the same set of component kinds are the *same object*: `==` is a pointer
//! comparison on the interned record.
//!
//! Interning scope: the spec describes archetypes as "interned through an
//! EntityTableLookup" while also exposing `EntityArchetype::{create, add,
//! remove, ...}` as free functions taking no lookup argument, and requires
//! that two differently-constructed archetypes over the same component set
//! compare as the same object. Those three constraints are only jointly
//! satisfiable if archetype identity is global, mirroring the process-wide
//! `ComponentType` registry. Table storage for an archetype remains
//! per-registry, owned by `EntityTableLookup`/`EntityTableGrouping`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::component::{ComponentCategory, ComponentType};
use crate::entity::Entity;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Bitset32
// ---------------------------------------------------------------------------

const WORD_BITS: usize = 32;

/// A word-parallel bit-set over `ComponentType` indices.
///
/// Trailing all-zero words are always trimmed so that two representations
/// of the same set with differing word counts compare and hash identically
/// -- the canonical-hashing requirement the spec calls out for interning.
#[derive(Clone, Debug, Default)]
pub struct Bitset32 {
    words: Vec<u32>,
}

impl Bitset32 {
    /// An empty bit-set.
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Set the bit for `index`.
    pub fn set(&mut self, index: u32) {
        let word = index as usize / WORD_BITS;
        let bit = index as usize % WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    /// Whether the bit for `index` is set.
    pub fn get(&self, index: u32) -> bool {
        let word = index as usize / WORD_BITS;
        let bit = index as usize % WORD_BITS;
        self.words.get(word).map(|w| w & (1 << bit) != 0).unwrap_or(false)
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }

    /// `self ⊇ other` -- every bit set in `other` is set in `self`.
    pub fn contains_all(&self, other: &Bitset32) -> bool {
        other
            .words
            .iter()
            .enumerate()
            .all(|(i, &w)| w & !self.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// `self ∩ other ≠ ∅`.
    pub fn intersects(&self, other: &Bitset32) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(&a, &b)| a & b != 0)
    }

    /// `self ∩ other == ∅`.
    pub fn is_disjoint(&self, other: &Bitset32) -> bool {
        !self.intersects(other)
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}

impl PartialEq for Bitset32 {
    fn eq(&self, other: &Self) -> bool {
        // Both sides are always trimmed (trailing zero words stripped), so
        // a plain vector comparison already agrees across representations
        // with differing word counts.
        self.words == other.words
    }
}
impl Eq for Bitset32 {}

impl std::hash::Hash for Bitset32 {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.words.hash(state);
    }
}

// ---------------------------------------------------------------------------
// EntityArchetype
// ---------------------------------------------------------------------------

/// Globally unique identifier for an interned archetype, assigned in
/// interning order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ArchetypeId(pub(crate) u32);

struct ArchetypeRecord {
    id: ArchetypeId,
    component_types: Vec<ComponentType>,
    bits: Bitset32,
    /// Byte offset of each non-Tag component within a conceptual AoS row;
    /// maintained per spec for chunk-capacity computation even though the
    /// actual storage in `crate::table` is SoA (one column per component).
    offsets: Vec<(ComponentType, usize)>,
    managed_count: usize,
    unmanaged_count: usize,
    tag_count: usize,
    entity_size: usize,
}

/// An interned, sorted set of component kinds with precomputed layout
/// metadata. Cheap to clone (an `Arc` bump); equality is reference identity.
#[derive(Clone)]
pub struct EntityArchetype(Arc<ArchetypeRecord>);

impl EntityArchetype {
    /// The canonical archetype with no components.
    pub fn base() -> Self {
        interner().intern(Vec::new())
    }

    /// Build (or look up) the archetype for `types`.
    ///
    /// `None` fails [`EcsError::InvalidArgument`], modeling the host
    /// runtime's "null sequence" rejection in a language where a present
    /// slice can never itself be null. Duplicate component types within the
    /// slice are silently deduplicated before interning; an empty slice
    /// yields [`EntityArchetype::base`].
    pub fn create(types: Option<&[ComponentType]>) -> Result<Self, EcsError> {
        let types = types.ok_or(EcsError::InvalidArgument {
            message: "component type sequence must not be null".into(),
        })?;
        Ok(interner().intern(types.to_vec()))
    }

    /// Add `component`; a no-op returning `self` if already present.
    pub fn add(&self, component: ComponentType) -> Self {
        if self.contains(component) {
            return self.clone();
        }
        let mut types = self.0.component_types.clone();
        types.push(component);
        interner().intern(types)
    }

    /// Remove `component`; a no-op returning `self` if not present.
    pub fn remove(&self, component: ComponentType) -> Self {
        if !self.contains(component) {
            return self.clone();
        }
        let types: Vec<_> = self
            .0
            .component_types
            .iter()
            .copied()
            .filter(|&c| c != component)
            .collect();
        interner().intern(types)
    }

    /// Whether `component` is part of this archetype.
    pub fn contains(&self, component: ComponentType) -> bool {
        self.0.bits.get(component.index())
    }

    /// Position of `component` in [`component_types`](Self::component_types),
    /// or `None` if absent.
    pub fn index_of(&self, component: ComponentType) -> Option<usize> {
        self.0.component_types.iter().position(|&c| c == component)
    }

    /// The sorted component kinds making up this archetype.
    pub fn component_types(&self) -> &[ComponentType] {
        &self.0.component_types
    }

    /// Byte offsets of each non-Tag component within a conceptual AoS row.
    pub fn offsets(&self) -> &[(ComponentType, usize)] {
        &self.0.offsets
    }

    /// Number of `Managed` components.
    pub fn managed_count(&self) -> usize {
        self.0.managed_count
    }

    /// Number of `Unmanaged` components.
    pub fn unmanaged_count(&self) -> usize {
        self.0.unmanaged_count
    }

    /// Number of `Tag` components.
    pub fn tag_count(&self) -> usize {
        self.0.tag_count
    }

    /// Entity-handle size plus the sizes of all non-Tag components; used to
    /// choose a table's chunk capacity.
    pub fn entity_size(&self) -> usize {
        self.0.entity_size
    }

    pub(crate) fn id(&self) -> ArchetypeId {
        self.0.id
    }

    pub(crate) fn bits(&self) -> &Bitset32 {
        &self.0.bits
    }
}

impl PartialEq for EntityArchetype {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for EntityArchetype {}

impl fmt::Debug for EntityArchetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityArchetype")
            .field("id", &self.0.id)
            .field("component_types", &self.0.component_types)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Global interner
// ---------------------------------------------------------------------------

struct ArchetypeInterner {
    by_bits: HashMap<Bitset32, Arc<ArchetypeRecord>>,
    next_id: AtomicU32,
}

impl ArchetypeInterner {
    fn new() -> Self {
        Self {
            by_bits: HashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    fn intern(&mut self, mut types: Vec<ComponentType>) -> EntityArchetype {
        types.sort_by(|a, b| a.compare(*b));
        types.dedup();

        let mut bits = Bitset32::new();
        for &c in &types {
            bits.set(c.index());
        }
        // Bitset32 equality already ignores trailing-zero-word differences;
        // also fold the Bitset's own trim to keep the map key canonical.
        let mut canonical = bits.clone();
        canonical.trim();

        if let Some(existing) = self.by_bits.get(&canonical) {
            return EntityArchetype(existing.clone());
        }

        let entity_handle_size = std::mem::size_of::<Entity>();
        let mut offsets = Vec::new();
        let mut cursor = entity_handle_size;
        let mut managed_count = 0;
        let mut unmanaged_count = 0;
        let mut tag_count = 0;
        for &c in &types {
            match c.category() {
                ComponentCategory::Tag => {
                    tag_count += 1;
                    continue;
                }
                ComponentCategory::Managed => managed_count += 1,
                ComponentCategory::Unmanaged => unmanaged_count += 1,
            }
            let align = c.align().max(1);
            cursor = (cursor + align - 1) / align * align;
            offsets.push((c, cursor));
            cursor += c.size();
        }
        let entity_size = cursor;

        let id = ArchetypeId(self.next_id.fetch_add(1, AtomicOrdering::SeqCst));
        let record = Arc::new(ArchetypeRecord {
            id,
            component_types: types,
            bits: canonical.clone(),
            offsets,
            managed_count,
            unmanaged_count,
            tag_count,
            entity_size,
        });
        self.by_bits.insert(canonical, record.clone());
        tracing::debug!(archetype = id.0, "interned new archetype");
        EntityArchetype(record)
    }
}

fn interner() -> &'static Mutex<ArchetypeInterner> {
    static INTERNER: OnceLock<Mutex<ArchetypeInterner>> = OnceLock::new();
    INTERNER.get_or_init(|| Mutex::new(ArchetypeInterner::new()))
}

/// Number of distinct archetypes interned so far, process-wide.
pub fn interned_archetype_count() -> usize {
    interner().lock().unwrap_or_else(|e| e.into_inner()).by_bits.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_unmanaged_component;

    #[derive(Clone, Copy)]
    struct A;
    #[derive(Clone, Copy)]
    struct B;
    #[derive(Clone, Copy)]
    struct C;
    impl_unmanaged_component!(A, B, C);

    #[test]
    fn base_has_no_components() {
        let base = EntityArchetype::base();
        assert!(base.component_types().is_empty());
        assert_eq!(base.entity_size(), std::mem::size_of::<Entity>());
    }

    #[test]
    fn create_null_sequence_fails() {
        let err = EntityArchetype::create(None).unwrap_err();
        assert!(matches!(err, EcsError::InvalidArgument { .. }));
    }

    #[test]
    fn same_set_different_order_interns_to_same_object() {
        let a = ComponentType::of::<A>();
        let b = ComponentType::of::<B>();
        let x = EntityArchetype::create(Some(&[a, b])).unwrap();
        let y = EntityArchetype::create(Some(&[b, a])).unwrap();
        assert_eq!(x, y);
        assert_eq!(x.bits(), y.bits());
    }

    #[test]
    fn duplicates_are_deduplicated() {
        let a = ComponentType::of::<A>();
        let x = EntityArchetype::create(Some(&[a, a, a])).unwrap();
        assert_eq!(x.component_types().len(), 1);
    }

    #[test]
    fn add_existing_is_noop() {
        let a = ComponentType::of::<A>();
        let base = EntityArchetype::create(Some(&[a])).unwrap();
        assert_eq!(base.add(a), base);
    }

    #[test]
    fn remove_absent_is_noop() {
        let a = ComponentType::of::<A>();
        let b = ComponentType::of::<B>();
        let base = EntityArchetype::create(Some(&[a])).unwrap();
        assert_eq!(base.remove(b), base);
    }

    #[test]
    fn add_then_remove_returns_original() {
        let a = ComponentType::of::<A>();
        let c = ComponentType::of::<C>();
        let base = EntityArchetype::create(Some(&[a])).unwrap();
        assert_eq!(base.add(c).remove(c), base);
    }
}

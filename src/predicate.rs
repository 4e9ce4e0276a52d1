//! Archetype filtering.
//!
//! An [`EntityPredicate`] selects archetypes by a (required, included,
//! excluded) triple of component sets, tested via word-parallel bit-set
//! operations against an archetype's precomputed `component_bits`.

use crate::archetype::{Bitset32, EntityArchetype};
use crate::component::ComponentType;
use crate::EcsError;

/// A (required, included, excluded) filter over archetypes.
///
/// Equality is structural over the three normalized (sorted, deduplicated)
/// component lists.
#[derive(Clone, Debug)]
pub struct EntityPredicate {
    required: Vec<ComponentType>,
    included: Vec<ComponentType>,
    excluded: Vec<ComponentType>,
    required_bits: Bitset32,
    included_bits: Bitset32,
    excluded_bits: Bitset32,
}

fn normalize(mut types: Vec<ComponentType>) -> (Vec<ComponentType>, Bitset32) {
    types.sort();
    types.dedup();
    let mut bits = Bitset32::new();
    for &c in &types {
        bits.set(c.index());
    }
    (types, bits)
}

impl EntityPredicate {
    /// Build a predicate from the three component sets. Each is normalized
    /// (nulls dropped, deduplicated, sorted); passing `None` for a whole set
    /// fails [`EcsError::InvalidArgument`].
    pub fn create(
        required: Option<&[ComponentType]>,
        included: Option<&[ComponentType]>,
        excluded: Option<&[ComponentType]>,
    ) -> Result<Self, EcsError> {
        let required = required.ok_or(EcsError::InvalidArgument {
            message: "required component set must not be null".into(),
        })?;
        let included = included.ok_or(EcsError::InvalidArgument {
            message: "included component set must not be null".into(),
        })?;
        let excluded = excluded.ok_or(EcsError::InvalidArgument {
            message: "excluded component set must not be null".into(),
        })?;
        let (required, required_bits) = normalize(required.to_vec());
        let (included, included_bits) = normalize(included.to_vec());
        let (excluded, excluded_bits) = normalize(excluded.to_vec());
        Ok(Self {
            required,
            included,
            excluded,
            required_bits,
            included_bits,
            excluded_bits,
        })
    }

    /// The predicate matching every archetype (all three sets empty).
    pub fn universal() -> Self {
        Self::create(Some(&[]), Some(&[]), Some(&[])).expect("empty slices are never null")
    }

    /// Required component set.
    pub fn required(&self) -> &[ComponentType] {
        &self.required
    }

    /// Included ("any of") component set.
    pub fn included(&self) -> &[ComponentType] {
        &self.included
    }

    /// Excluded component set.
    pub fn excluded(&self) -> &[ComponentType] {
        &self.excluded
    }

    /// Whether `archetype` satisfies this predicate.
    pub fn matches(&self, archetype: &EntityArchetype) -> bool {
        let bits = archetype.bits();
        bits.contains_all(&self.required_bits)
            && (self.included_bits.is_empty() || bits.intersects(&self.included_bits))
            && bits.is_disjoint(&self.excluded_bits)
    }
}

impl PartialEq for EntityPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.required == other.required && self.included == other.included && self.excluded == other.excluded
    }
}
impl Eq for EntityPredicate {}

/// Incremental builder for [`EntityPredicate`].
#[derive(Default)]
pub struct EntityPredicateBuilder {
    required: Vec<ComponentType>,
    included: Vec<ComponentType>,
    excluded: Vec<ComponentType>,
}

impl EntityPredicateBuilder {
    /// Start an empty builder (equivalent to [`EntityPredicate::universal`]
    /// once built).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the required set.
    pub fn require(mut self, types: impl IntoIterator<Item = ComponentType>) -> Self {
        self.required.extend(types);
        self
    }

    /// Add to the included set.
    pub fn include(mut self, types: impl IntoIterator<Item = ComponentType>) -> Self {
        self.included.extend(types);
        self
    }

    /// Add to the excluded set.
    pub fn exclude(mut self, types: impl IntoIterator<Item = ComponentType>) -> Self {
        self.excluded.extend(types);
        self
    }

    /// Finalize into an [`EntityPredicate`].
    pub fn build(self) -> EntityPredicate {
        EntityPredicate::create(Some(&self.required), Some(&self.included), Some(&self.excluded))
            .expect("builder-provided slices are never null")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_unmanaged_component;
    use crate::impl_tag_component;

    #[derive(Clone, Copy)]
    struct P2;
    #[derive(Clone, Copy)]
    struct R2;
    #[derive(Clone, Copy)]
    struct S2;
    #[derive(Clone, Copy)]
    struct P3;
    #[derive(Clone, Copy)]
    struct R3;
    #[derive(Clone, Copy)]
    struct S3;
    impl_unmanaged_component!(P2, R2, S2, P3, R3, S3);
    struct Name;
    impl_tag_component!(Name);
    struct Disabled;
    impl_tag_component!(Disabled);

    #[test]
    fn universal_matches_everything() {
        let pred = EntityPredicate::universal();
        let arch = EntityArchetype::create(Some(&[ComponentType::of::<P2>()])).unwrap();
        assert!(pred.matches(&arch));
        assert!(pred.matches(&EntityArchetype::base()));
    }

    #[test]
    fn scenario_predicate_matching() {
        let p2 = ComponentType::of::<P2>();
        let r2 = ComponentType::of::<R2>();
        let s2 = ComponentType::of::<S2>();
        let p3 = ComponentType::of::<P3>();
        let r3 = ComponentType::of::<R3>();
        let s3 = ComponentType::of::<S3>();
        let name = ComponentType::of::<Name>();
        let disabled = ComponentType::of::<Disabled>();

        let pred = EntityPredicateBuilder::new()
            .require([p2, r2, s2])
            .include([name, disabled])
            .exclude([p3, r3, s3])
            .build();

        let matching = EntityArchetype::create(Some(&[p2, r2, s2, name])).unwrap();
        assert!(pred.matches(&matching));

        let no_include = EntityArchetype::create(Some(&[p2, r2, s2])).unwrap();
        assert!(!pred.matches(&no_include));

        let has_excluded = EntityArchetype::create(Some(&[p2, r2, s2, name, p3])).unwrap();
        assert!(!pred.matches(&has_excluded));

        assert!(!pred.matches(&EntityArchetype::base()));
    }

    #[test]
    fn matches_is_monotone_under_extra_neutral_components() {
        let p2 = ComponentType::of::<P2>();
        let r2 = ComponentType::of::<R2>();
        let pred = EntityPredicateBuilder::new().require([p2]).build();
        let b = EntityArchetype::create(Some(&[p2])).unwrap();
        let a = EntityArchetype::create(Some(&[p2, r2])).unwrap();
        assert_eq!(pred.matches(&a), pred.matches(&b));
    }
}

//! Archetype-to-table lookup and the transition cache.
//!
//! [`EntityTableLookup`] is the per-registry owner of table storage: it
//! resolves/intern archetypes through the process-wide archetype interner
//! (see [`crate::archetype`]) and owns one [`EntityTableGrouping`] per
//! archetype id, since storage must be registry-scoped even though
//! archetype identity is global.

use std::collections::HashMap;

use crate::archetype::{ArchetypeId, EntityArchetype};
use crate::component::ComponentType;
use crate::table::{AccessToken, EntityTable};
use crate::EcsError;

/// The tables belonging to one archetype, in append order. New tables are
/// appended as earlier ones fill up; the first non-full table is always the
/// insertion target.
pub struct EntityTableGrouping {
    archetype: EntityArchetype,
    tables: Vec<EntityTable>,
}

impl EntityTableGrouping {
    fn new(archetype: EntityArchetype) -> Self {
        Self {
            archetype,
            tables: Vec::new(),
        }
    }

    /// The archetype this grouping stores.
    pub fn archetype(&self) -> &EntityArchetype {
        &self.archetype
    }

    /// All tables in this grouping, in append order.
    pub fn tables(&self) -> &[EntityTable] {
        &self.tables
    }

    /// Mutable access to all tables, for query iteration that needs to
    /// write through a table it already holds the token for.
    pub fn tables_mut(&mut self) -> &mut [EntityTable] {
        &mut self.tables
    }

    /// Index of the first table with room for another row, allocating a new
    /// one (owned by `token`) if every existing table is full.
    fn insertion_target(&mut self, token: AccessToken) -> Result<usize, EcsError> {
        if let Some(idx) = self.tables.iter().position(|t| !t.is_full()) {
            return Ok(idx);
        }
        let table = EntityTable::new(self.archetype.clone(), None, token)?;
        self.tables.push(table);
        Ok(self.tables.len() - 1)
    }

    pub(crate) fn table(&self, index: usize) -> &EntityTable {
        &self.tables[index]
    }

    pub(crate) fn table_mut(&mut self, index: usize) -> &mut EntityTable {
        &mut self.tables[index]
    }
}

/// Per-registry source of archetype identity (delegated to the global
/// interner) and table storage, plus an adjacency cache for
/// `add(component)`/`remove(component)` transitions.
#[derive(Default)]
pub struct EntityTableLookup {
    groupings: HashMap<ArchetypeId, EntityTableGrouping>,
    /// `(archetype, component) -> archetype` adjacency, populated lazily as
    /// transitions are taken, to avoid re-interning on hot paths.
    add_edges: HashMap<(ArchetypeId, ComponentType), ArchetypeId>,
    remove_edges: HashMap<(ArchetypeId, ComponentType), ArchetypeId>,
}

impl EntityTableLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve (or create) the grouping for the archetype spanning `types`.
    /// Returns the *same* grouping object for equivalent inputs, since
    /// archetype interning is global and this lookup keys storage on the
    /// interned archetype's id.
    pub fn get_or_create(&mut self, types: &[ComponentType]) -> Result<&mut EntityTableGrouping, EcsError> {
        let archetype = EntityArchetype::create(Some(types))?;
        Ok(self.groupings.entry(archetype.id()).or_insert_with(|| EntityTableGrouping::new(archetype)))
    }

    /// Direct lookup by archetype, without creating one if absent.
    pub fn get(&self, archetype: &EntityArchetype) -> Option<&EntityTableGrouping> {
        self.groupings.get(&archetype.id())
    }

    pub fn get_mut(&mut self, archetype: &EntityArchetype) -> Option<&mut EntityTableGrouping> {
        self.groupings.get_mut(&archetype.id())
    }

    /// Ensure a grouping exists for `archetype` (used when a transition
    /// computes the destination archetype directly rather than from a type
    /// list).
    pub fn ensure(&mut self, archetype: &EntityArchetype) -> &mut EntityTableGrouping {
        self.groupings
            .entry(archetype.id())
            .or_insert_with(|| EntityTableGrouping::new(archetype.clone()))
    }

    /// Number of distinct archetypes with storage in this lookup.
    pub fn count(&self) -> usize {
        self.groupings.len()
    }

    /// All groupings, for query enumeration.
    pub fn groupings(&self) -> impl Iterator<Item = &EntityTableGrouping> {
        self.groupings.values()
    }

    /// Destination archetype for adding `component` to `archetype`, using
    /// (and populating) the transition-edge cache.
    pub fn transition_add(&mut self, archetype: &EntityArchetype, component: ComponentType) -> EntityArchetype {
        let key = (archetype.id(), component);
        if let Some(&dest_id) = self.add_edges.get(&key) {
            if let Some(grouping) = self.groupings.get(&dest_id) {
                return grouping.archetype().clone();
            }
        }
        let dest = archetype.add(component);
        self.add_edges.insert(key, dest.id());
        self.ensure(&dest);
        dest
    }

    /// Destination archetype for removing `component` from `archetype`.
    pub fn transition_remove(&mut self, archetype: &EntityArchetype, component: ComponentType) -> EntityArchetype {
        let key = (archetype.id(), component);
        if let Some(&dest_id) = self.remove_edges.get(&key) {
            if let Some(grouping) = self.groupings.get(&dest_id) {
                return grouping.archetype().clone();
            }
        }
        let dest = archetype.remove(component);
        self.remove_edges.insert(key, dest.id());
        self.ensure(&dest);
        dest
    }

    /// Find an insertion target `(archetype_id, table_index)` in the
    /// grouping for `archetype`, allocating a table if needed.
    pub(crate) fn insertion_target(
        &mut self,
        archetype: &EntityArchetype,
        token: AccessToken,
    ) -> Result<(ArchetypeId, usize), EcsError> {
        let grouping = self.ensure(archetype);
        let idx = grouping.insertion_target(token)?;
        Ok((archetype.id(), idx))
    }

    pub(crate) fn grouping_mut(&mut self, id: ArchetypeId) -> &mut EntityTableGrouping {
        self.groupings.get_mut(&id).expect("grouping must exist for a live archetype id")
    }

    pub(crate) fn grouping(&self, id: ArchetypeId) -> &EntityTableGrouping {
        self.groupings.get(&id).expect("grouping must exist for a live archetype id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_unmanaged_component;

    #[derive(Clone, Copy)]
    struct A;
    impl_unmanaged_component!(A);

    #[test]
    fn get_or_create_returns_same_grouping_for_equivalent_inputs() {
        let mut lookup = EntityTableLookup::new();
        let a = ComponentType::of::<A>();
        let g1 = lookup.get_or_create(&[a]).unwrap().archetype().clone();
        let g2 = lookup.get_or_create(&[a]).unwrap().archetype().clone();
        assert_eq!(g1, g2);
        assert_eq!(lookup.count(), 1);
    }

    #[test]
    fn transition_add_is_cached() {
        let mut lookup = EntityTableLookup::new();
        let a = ComponentType::of::<A>();
        let base = EntityArchetype::base();
        let first = lookup.transition_add(&base, a);
        let second = lookup.transition_add(&base, a);
        assert_eq!(first, second);
    }
}

//! The entity orchestrator.
//!
//! [`EntityRegistry`] owns one [`EntityTableLookup`] and a dense array of
//! per-entity-index slots. It allocates [`Entity`] identities with
//! generational versions, routes entities through archetype transitions when
//! components are added or removed, and is the only thing that moves rows
//! between tables -- generalized from the teacher's `World` (entity
//! allocator + `entity_locations` map + extract/insert migration pair) per
//! spec §4.6, with the free-list threaded directly through slot storage
//! instead of a separate queue.

use crate::archetype::{ArchetypeId, EntityArchetype};
use crate::component::{Component, ComponentType};
use crate::entity::Entity;
use crate::lookup::EntityTableLookup;
use crate::table::AccessToken;
use crate::EcsError;

/// Where one entity index currently lives: which archetype, which physical
/// table within that archetype's grouping, and which row within the table.
#[derive(Clone, Copy, Debug)]
struct Slot {
    /// Negative denotes a free slot. See module docs on the encoding.
    version: i32,
    archetype_id: ArchetypeId,
    table_idx: usize,
    row: usize,
    /// Valid only while the slot is free: index of the next free slot, or
    /// `-1` if this is the tail of the free-list.
    next_free: i32,
}

/// `(archetype, table, row)` for a live entity, as returned by
/// [`EntityRegistry::find`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub archetype_id: ArchetypeId,
    pub table_idx: usize,
    pub row: usize,
}

type CreateObserver = Box<dyn Fn(Entity) + Send + Sync>;
type DestroyObserver = Box<dyn Fn(Entity) + Send + Sync>;

/// The orchestrator: entity identity, archetype-transition routing, and the
/// single source of table storage queried by [`crate::query::EntityQuery`].
///
/// # Version encoding
///
/// A slot's `version` is non-negative while the slot is live. On
/// [`destroy`](Self::destroy), the slot's alive version `v` is retired as
/// `-(v + 1)` -- negative, and distinguishable from every future alive
/// version at that index. On [`create`](Self::create), popping a free slot
/// recovers `v + 1` from that encoding and hands out that as the new alive
/// version, so `Entity(i, 0)` destroyed and recreated becomes `Entity(i, 1)`
/// (spec §8 scenario 3), not `Entity(i, 2)`.
pub struct EntityRegistry {
    lookup: EntityTableLookup,
    token: AccessToken,
    slots: Vec<Slot>,
    free_head: i32,
    count: usize,
    on_create: Vec<CreateObserver>,
    on_destroy: Vec<DestroyObserver>,
}

impl EntityRegistry {
    /// A fresh, empty registry with its own write token and lookup.
    pub fn new() -> Self {
        Self {
            lookup: EntityTableLookup::new(),
            token: AccessToken::new(),
            slots: Vec::new(),
            free_head: -1,
            count: 0,
            on_create: Vec::new(),
            on_destroy: Vec::new(),
        }
    }

    /// Register a synchronous observer invoked after [`create`](Self::create)
    /// commits, once the registry's own invariants hold again. Observers run
    /// in registration order; a panic inside one propagates like any other
    /// Rust panic rather than being caught (see `DESIGN.md`).
    pub fn on_create(&mut self, observer: impl Fn(Entity) + Send + Sync + 'static) {
        self.on_create.push(Box::new(observer));
    }

    /// Register a synchronous observer invoked after [`destroy`](Self::destroy)
    /// commits.
    pub fn on_destroy(&mut self, observer: impl Fn(Entity) + Send + Sync + 'static) {
        self.on_destroy.push(Box::new(observer));
    }

    /// Number of currently live entities.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The lookup this registry routes archetype transitions and queries
    /// through.
    pub fn lookup(&self) -> &EntityTableLookup {
        &self.lookup
    }

    /// Intern (or reuse) the archetype spanning `types` in this registry's
    /// lookup, without creating any entity.
    pub fn create_archetype(&mut self, types: &[ComponentType]) -> Result<EntityArchetype, EcsError> {
        Ok(self.lookup.get_or_create(types)?.archetype().clone())
    }

    /// Allocate a new entity in `archetype` (defaults to [`EntityArchetype::base`]
    /// when `None`).
    pub fn create(&mut self, archetype: Option<EntityArchetype>) -> Entity {
        let archetype = archetype.unwrap_or_else(EntityArchetype::base);

        let index = if self.free_head >= 0 {
            let i = self.free_head as usize;
            self.free_head = self.slots[i].next_free;
            i
        } else {
            self.slots.push(Slot {
                version: 0,
                archetype_id: ArchetypeId(0),
                table_idx: 0,
                row: 0,
                next_free: -1,
            });
            self.slots.len() - 1
        };

        let new_version = if self.slots[index].version < 0 {
            // Popped from the free list: recover the retired version (see
            // module docs on the `-(v+1)` encoding) and bump it.
            (-self.slots[index].version - 1) + 1
        } else {
            // Freshly appended slot, never allocated before.
            self.slots[index].version
        };

        let (arch_id, table_idx) = self
            .lookup
            .insertion_target(&archetype, self.token)
            .expect("registry's own token always has write access to its own tables");
        let row = self
            .lookup
            .grouping_mut(arch_id)
            .table_mut(table_idx)
            .add(Entity::new(index as i32, new_version), self.token)
            .expect("insertion_target only ever returns a non-full table");

        self.slots[index] = Slot {
            version: new_version,
            archetype_id: arch_id,
            table_idx,
            row,
            next_free: -1,
        };
        self.count += 1;

        let entity = Entity::new(index as i32, new_version);
        tracing::debug!(?entity, archetype = arch_id.0, "entity created");
        for observer in &self.on_create {
            observer(entity);
        }
        entity
    }

    /// Whether `entity` refers to a currently live slot.
    pub fn contains(&self, entity: Entity) -> bool {
        self.find(entity).is_some()
    }

    /// `(archetype, table, row)` for a live entity, or `None` for a stale or
    /// never-allocated handle.
    pub fn find(&self, entity: Entity) -> Option<Location> {
        let slot = self.slots.get(entity.index() as usize)?;
        if slot.version < 0 || slot.version != entity.version() {
            return None;
        }
        Some(Location {
            archetype_id: slot.archetype_id,
            table_idx: slot.table_idx,
            row: slot.row,
        })
    }

    fn live_index(&self, entity: Entity) -> Result<usize, EcsError> {
        let index = entity.index() as usize;
        match self.slots.get(index) {
            Some(slot) if slot.version >= 0 && slot.version == entity.version() => Ok(index),
            _ => Err(EcsError::EntityNotFound { entity }),
        }
    }

    /// The archetype an entity currently belongs to, or `None` if stale.
    pub fn archetype_of(&self, entity: Entity) -> Option<EntityArchetype> {
        let loc = self.find(entity)?;
        Some(self.lookup.grouping(loc.archetype_id).archetype().clone())
    }

    /// Update the slot for `moved_entity` after a swap-remove relocated it to
    /// `new_row` within the same `(archetype_id, table_idx)`.
    fn fixup_after_swap(&mut self, archetype_id: ArchetypeId, table_idx: usize, new_row: usize, moved_entity: Entity) {
        let idx = moved_entity.index() as usize;
        self.slots[idx].archetype_id = archetype_id;
        self.slots[idx].table_idx = table_idx;
        self.slots[idx].row = new_row;
    }

    /// Destroy `entity`, recycling its index. Returns `false` for an already
    /// stale or unknown handle rather than failing, matching spec §4.6.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        let index = match self.live_index(entity) {
            Ok(i) => i,
            Err(_) => return false,
        };
        let slot = self.slots[index];
        let moved = self
            .lookup
            .grouping_mut(slot.archetype_id)
            .table_mut(slot.table_idx)
            .remove_at(slot.row, self.token)
            .expect("registry's own token always has write access to its own tables");
        if let Some(moved_entity) = moved {
            self.fixup_after_swap(slot.archetype_id, slot.table_idx, slot.row, moved_entity);
        }

        // Retire the version: `-(v + 1)`, see module docs.
        self.slots[index].version = -(slot.version + 1);
        self.slots[index].next_free = self.free_head;
        self.free_head = index as i32;
        self.count -= 1;

        tracing::debug!(?entity, "entity destroyed");
        for observer in &self.on_destroy {
            observer(entity);
        }
        true
    }

    /// Migrate `entity` from its current table into the first non-full table
    /// of `new_arch`'s grouping, carrying over every component present in
    /// both the old and new archetype. Components only in the old archetype
    /// are dropped (managed clear); components new to `new_arch` are left at
    /// their category default. Updates the entity's slot to the new
    /// location and returns the fresh row.
    fn migrate(&mut self, entity: Entity, old: Location, new_arch: &EntityArchetype) -> Result<usize, EcsError> {
        let (mut extracted, moved) = self
            .lookup
            .grouping_mut(old.archetype_id)
            .table_mut(old.table_idx)
            .extract_row(old.row, self.token)?;
        if let Some(moved_entity) = moved {
            self.fixup_after_swap(old.archetype_id, old.table_idx, old.row, moved_entity);
        }

        let (dest_arch_id, dest_table_idx) = self.lookup.insertion_target(new_arch, self.token)?;
        let dest_table = self.lookup.grouping_mut(dest_arch_id).table_mut(dest_table_idx);
        let new_row = dest_table.add_extracted(entity, &mut extracted, self.token)?;

        let idx = entity.index() as usize;
        self.slots[idx].archetype_id = dest_arch_id;
        self.slots[idx].table_idx = dest_table_idx;
        self.slots[idx].row = new_row;
        Ok(new_row)
    }

    /// Add `component_type` to `entity`'s archetype. A no-op (`Ok(false)`)
    /// if the entity already has it; the new component's slot is left at
    /// its category default until written via [`set_component`](Self::set_component).
    pub fn add_component(&mut self, entity: Entity, component_type: ComponentType) -> Result<bool, EcsError> {
        let loc = self.find(entity).ok_or(EcsError::EntityNotFound { entity })?;
        let old_arch = self.lookup.grouping(loc.archetype_id).archetype().clone();
        if old_arch.contains(component_type) {
            return Ok(false);
        }
        let new_arch = self.lookup.transition_add(&old_arch, component_type);
        self.migrate(entity, loc, &new_arch)?;
        tracing::debug!(?entity, component = component_type.type_name(), "component added");
        Ok(true)
    }

    /// Remove `component_type` from `entity`'s archetype. A no-op
    /// (`Ok(false)`) if the entity doesn't have it.
    pub fn remove_component(&mut self, entity: Entity, component_type: ComponentType) -> Result<bool, EcsError> {
        let loc = self.find(entity).ok_or(EcsError::EntityNotFound { entity })?;
        let old_arch = self.lookup.grouping(loc.archetype_id).archetype().clone();
        if !old_arch.contains(component_type) {
            return Ok(false);
        }
        let new_arch = self.lookup.transition_remove(&old_arch, component_type);
        self.migrate(entity, loc, &new_arch)?;
        tracing::debug!(?entity, component = component_type.type_name(), "component removed");
        Ok(true)
    }

    /// Write `value` into `entity`'s component slot for `K`, migrating the
    /// entity to include `K` first if it doesn't already have it.
    pub fn set_component<K: Component>(&mut self, entity: Entity, value: K) -> Result<(), EcsError> {
        let component_type = ComponentType::of::<K>();
        let loc = self.find(entity).ok_or(EcsError::EntityNotFound { entity })?;
        let old_arch = self.lookup.grouping(loc.archetype_id).archetype().clone();

        let loc = if old_arch.contains(component_type) {
            loc
        } else {
            let new_arch = self.lookup.transition_add(&old_arch, component_type);
            let row = self.migrate(entity, loc, &new_arch)?;
            self.find(entity)
                .map(|l| Location { row, ..l })
                .ok_or(EcsError::EntityNotFound { entity })?
        };

        let table = self.lookup.grouping_mut(loc.archetype_id).table_mut(loc.table_idx);
        unsafe { table.set_component_raw(loc.row, value, self.token) }
    }

    /// Whether `entity` currently carries a component of type `K`. Returns
    /// `false` (never fails) for an invalid entity.
    pub fn has_component<K: Component>(&self, entity: Entity) -> bool {
        match self.archetype_of(entity) {
            Some(archetype) => archetype.contains(ComponentType::of::<K>()),
            None => false,
        }
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

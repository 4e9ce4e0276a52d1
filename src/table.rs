//! Chunked struct-of-arrays storage for one archetype.
//!
//! An [`EntityTable`] holds the rows of entities sharing one
//! [`EntityArchetype`]: an entity column plus one type-erased [`Column`] per
//! non-`Tag` component, generalized from the source corpus's `Column`/
//! `ComponentVtable` pair (which hardcoded drop/clone behavior onto `Clone`)
//! so that slot behavior is selected by [`ComponentCategory`] instead.
//!
//! # Safety
//!
//! This module manages component storage as type-erased byte buffers
//! allocated with [`std::alloc`]. The safety invariants -- correct item size
//! and alignment per column, bounds-checked row indices, and a present-flag
//! gate around every drop of a `Managed` slot -- are maintained entirely
//! inside this module; nothing here is exposed in a way that lets a caller
//! violate them.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::archetype::EntityArchetype;
use crate::component::{Component, ComponentCategory, ComponentType};
use crate::entity::Entity;
use crate::EcsError;

/// Target byte budget per table chunk; used to pick a default row capacity
/// when none is given explicitly.
pub const DEFAULT_CHUNK_BYTES: usize = 16 * 1024;
/// Floor on the default row capacity, regardless of how large `entity_size`
/// makes a single row.
pub const MIN_CAPACITY: usize = 8;

// ---------------------------------------------------------------------------
// AccessToken
// ---------------------------------------------------------------------------

/// An opaque, process-wide-unique write permission for a table.
///
/// The spec requires write access to be *checkable*, not just enforced by
/// Rust's borrow checker -- a caller holding only a shared reference must be
/// able to ask "would I be allowed to mutate this" before acquiring a
/// mutable one elsewhere. `AccessToken` models that as an explicit value
/// rather than relying solely on `&mut EntityTable`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AccessToken(u64);

impl AccessToken {
    /// Mint a fresh, globally unique token.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, AtomicOrdering::SeqCst))
    }
}

impl Default for AccessToken {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Column -- type-erased, category-aware storage for one component
// ---------------------------------------------------------------------------

struct Column {
    data: *mut u8,
    capacity: usize,
    item_size: usize,
    item_align: usize,
    /// Present-flag per row, only allocated for `Managed` columns. Gates
    /// every drop of a slot so a logically-empty or moved-out slot is never
    /// passed to `clear_slot`.
    present: Option<Vec<bool>>,
    component: ComponentType,
}

unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    fn new(component: ComponentType, capacity: usize) -> Self {
        let item_size = component.size();
        let item_align = component.align().max(1);
        let data = if item_size == 0 || capacity == 0 {
            ptr::null_mut()
        } else {
            let layout = Layout::from_size_align(item_size * capacity, item_align)
                .expect("column layout overflow");
            let ptr = unsafe { alloc::alloc(layout) };
            assert!(!ptr.is_null(), "allocation failed");
            ptr
        };
        let present = match component.category() {
            ComponentCategory::Managed => Some(vec![false; capacity]),
            _ => None,
        };
        Self {
            data,
            capacity,
            item_size,
            item_align,
            present,
            component,
        }
    }

    #[inline]
    unsafe fn ptr_at(&self, row: usize) -> *mut u8 {
        debug_assert!(row < self.capacity);
        if self.item_size == 0 {
            return self.item_align as *mut u8;
        }
        unsafe { self.data.add(row * self.item_size) }
    }

    /// Initialize `row` to the category's empty/default state: zeroed bytes
    /// for `Unmanaged`, "not present" for `Managed`.
    fn clear_to_default(&mut self, row: usize) {
        if let Some(present) = &mut self.present {
            present[row] = false;
            return;
        }
        if self.item_size > 0 {
            unsafe { ptr::write_bytes(self.ptr_at(row), 0, self.item_size) };
        }
    }

    /// Write a real value into `row`, taking ownership of the bytes at
    /// `value_ptr` (the caller must not drop the source).
    unsafe fn write_value(&mut self, row: usize, value_ptr: *const u8) {
        if self.item_size > 0 {
            unsafe { ptr::copy_nonoverlapping(value_ptr, self.ptr_at(row), self.item_size) };
        }
        if let Some(present) = &mut self.present {
            present[row] = true;
        }
    }

    #[inline]
    unsafe fn read_ptr(&self, row: usize) -> *const u8 {
        unsafe { self.ptr_at(row) }
    }

    /// Drop the value at `row` if present, then mark it empty.
    fn drop_row(&mut self, row: usize) {
        if let Some(present) = &mut self.present {
            if present[row] {
                unsafe { (self.component.vtable().clear_slot)(self.ptr_at(row)) };
                present[row] = false;
            }
        } else if self.item_size > 0 {
            unsafe { ptr::write_bytes(self.ptr_at(row), 0, self.item_size) };
        }
    }

    /// Move the value at `src_row` into `dst_row` of the *same* column
    /// (swap-remove's "copy last row into gap"). A raw byte move, not a
    /// clone: ownership is relocated, never duplicated.
    fn move_row_within(&mut self, src_row: usize, dst_row: usize) {
        if src_row == dst_row {
            return;
        }
        if let Some(present) = &mut self.present {
            if present[src_row] {
                if self.item_size > 0 {
                    unsafe {
                        let src = self.ptr_at(src_row);
                        let dst = self.ptr_at(dst_row);
                        ptr::copy_nonoverlapping(src, dst, self.item_size);
                    }
                }
                present[dst_row] = true;
            } else {
                present[dst_row] = false;
            }
            present[src_row] = false;
        } else if self.item_size > 0 {
            unsafe {
                let src = self.ptr_at(src_row);
                let dst = self.ptr_at(dst_row);
                ptr::copy_nonoverlapping(src, dst, self.item_size);
            }
        }
    }

    /// Take ownership of the value at `row`, returning a newly allocated,
    /// properly aligned heap copy of its bytes and marking the source slot
    /// empty without running its destructor -- ownership moves out exactly
    /// like a Rust move (a bit-copy), never a clone. Returns `None` for a
    /// zero-sized item (the component had no column to begin with, so this
    /// is unreachable in practice since `Tag` components allocate no
    /// `Column` at all).
    fn take_row(&mut self, row: usize) -> Option<ExtractedComponent> {
        if self.item_size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(self.item_size, self.item_align)
            .expect("column item layout must be valid");
        let ptr = unsafe { alloc::alloc(layout) };
        assert!(!ptr.is_null(), "allocation failed");
        unsafe { ptr::copy_nonoverlapping(self.ptr_at(row), ptr, self.item_size) };
        if let Some(present) = &mut self.present {
            present[row] = false;
        }
        Some(ExtractedComponent {
            component: self.component,
            ptr,
            layout,
            consumed: false,
        })
    }

    /// Move the value at `src_row` into `dst_row` of `dst` (a column for the
    /// same component type in a different table), used during archetype
    /// transitions. Ownership moves; the source slot is left logically
    /// empty (not dropped).
    fn move_row_into(&mut self, src_row: usize, dst: &mut Column, dst_row: usize) {
        debug_assert_eq!(self.component, dst.component);
        if let Some(present) = &mut self.present {
            let was_present = present[src_row];
            if was_present && self.item_size > 0 {
                unsafe {
                    let src = self.ptr_at(src_row);
                    let dst_ptr = dst.ptr_at(dst_row);
                    ptr::copy_nonoverlapping(src, dst_ptr, self.item_size);
                }
            }
            if let Some(dst_present) = &mut dst.present {
                dst_present[dst_row] = was_present;
            }
            present[src_row] = false;
        } else if self.item_size > 0 {
            unsafe {
                let src = self.ptr_at(src_row);
                let dst_ptr = dst.ptr_at(dst_row);
                ptr::copy_nonoverlapping(src, dst_ptr, self.item_size);
            }
        }
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if let Some(present) = self.present.take() {
            for (row, &is_present) in present.iter().enumerate() {
                if is_present {
                    unsafe { (self.component.vtable().clear_slot)(self.ptr_at(row)) };
                }
            }
        }
        if self.item_size > 0 && self.capacity > 0 {
            let layout = Layout::from_size_align(self.item_size * self.capacity, self.item_align)
                .expect("layout must be valid");
            unsafe { alloc::dealloc(self.data, layout) };
        }
    }
}

// ---------------------------------------------------------------------------
// ExtractedComponent -- an owned, heap-allocated copy of one row's value,
// used as the intermediate hop in an archetype-transition migration.
// ---------------------------------------------------------------------------

/// An owned, properly aligned heap copy of one component value, taken out of
/// a table's row during an archetype transition. If never
/// [`consumed`](Self) by a destination table, `Drop` runs the value's
/// destructor (via the category's `clear_slot`) before freeing the buffer --
/// the Rust counterpart of the spec's "components present only in source are
/// dropped (with managed clear)."
pub(crate) struct ExtractedComponent {
    component: ComponentType,
    ptr: *mut u8,
    layout: Layout,
    consumed: bool,
}

impl ExtractedComponent {
    pub(crate) fn component(&self) -> ComponentType {
        self.component
    }
}

impl Drop for ExtractedComponent {
    fn drop(&mut self) {
        if !self.consumed {
            unsafe { (self.component.vtable().clear_slot)(self.ptr) };
        }
        unsafe { alloc::dealloc(self.ptr, self.layout) };
    }
}

// ---------------------------------------------------------------------------
// EntityTable
// ---------------------------------------------------------------------------

/// Columnar storage for the live rows of one archetype.
pub struct EntityTable {
    archetype: EntityArchetype,
    capacity: usize,
    count: usize,
    owner: Option<AccessToken>,
    entities: Vec<Entity>,
    columns: Vec<Column>,
}

impl EntityTable {
    /// Default row capacity for `archetype`: `max(MIN_CAPACITY,
    /// DEFAULT_CHUNK_BYTES / entity_size)`.
    pub fn default_capacity(archetype: &EntityArchetype) -> usize {
        let entity_size = archetype.entity_size().max(1);
        (DEFAULT_CHUNK_BYTES / entity_size).max(MIN_CAPACITY)
    }

    /// Allocate a table for `archetype`, owned by `owner`.
    ///
    /// `capacity = None` picks [`EntityTable::default_capacity`]; `Some(n)`
    /// with `n < 0` fails [`EcsError::InvalidArgument`] (modeling the
    /// host's signed-capacity-parameter rejection in Rust's unsigned
    /// `usize` world).
    pub fn new(
        archetype: EntityArchetype,
        capacity: Option<i64>,
        owner: AccessToken,
    ) -> Result<Self, EcsError> {
        let capacity = match capacity {
            None => Self::default_capacity(&archetype),
            Some(n) if n < 0 => {
                return Err(EcsError::InvalidArgument {
                    message: format!("table capacity must be non-negative, got {n}"),
                })
            }
            Some(n) => n as usize,
        };
        let columns = archetype
            .component_types()
            .iter()
            .filter(|c| c.category() != ComponentCategory::Tag)
            .map(|&c| Column::new(c, capacity))
            .collect();
        Ok(Self {
            archetype,
            capacity,
            count: 0,
            owner: Some(owner),
            entities: Vec::with_capacity(capacity),
            columns,
        })
    }

    fn check_write(&self, token: AccessToken) -> Result<(), EcsError> {
        if self.owner != Some(token) {
            return Err(EcsError::InvalidOperation {
                message: "caller does not hold the write token for this table".into(),
            });
        }
        Ok(())
    }

    fn column_index(&self, component: ComponentType) -> Option<usize> {
        self.columns.iter().position(|c| c.component == component)
    }

    /// The owning archetype.
    pub fn archetype(&self) -> &EntityArchetype {
        &self.archetype
    }

    /// Fixed row capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of live rows.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    /// Whether `token` is permitted to mutate this table.
    pub fn check_access(&self, token: AccessToken) -> bool {
        self.owner == Some(token)
    }

    /// Turn this table into a permanent read-only snapshot: clears the
    /// owner so no token will ever pass [`check_access`](Self::check_access)
    /// again.
    pub fn freeze(&mut self) {
        self.owner = None;
    }

    /// Append `entity` at `count`, with no component values written (every
    /// non-Tag column's new row starts at its category's default/empty
    /// state -- zeroed for `Unmanaged`, absent for `Managed`).
    pub fn add(&mut self, entity: Entity, token: AccessToken) -> Result<usize, EcsError> {
        self.check_write(token)?;
        if self.is_full() {
            return Err(EcsError::InvalidOperation {
                message: "table is full".into(),
            });
        }
        let row = self.count;
        self.entities.push(entity);
        for column in &mut self.columns {
            column.clear_to_default(row);
        }
        self.count += 1;
        Ok(row)
    }

    /// Append `entity` with an explicit initial value for every non-Tag
    /// component in the archetype. `values` must contain exactly one
    /// `(ComponentType, *const u8)` pair per non-Tag component.
    ///
    /// # Safety
    ///
    /// Every pointer in `values` must point to a valid, initialized value
    /// of the component type it is paired with; ownership moves into the
    /// table.
    pub unsafe fn add_with_values(
        &mut self,
        entity: Entity,
        values: &[(ComponentType, *const u8)],
        token: AccessToken,
    ) -> Result<usize, EcsError> {
        self.check_write(token)?;
        if self.is_full() {
            return Err(EcsError::InvalidOperation {
                message: "table is full".into(),
            });
        }
        let row = self.count;
        self.entities.push(entity);
        for column in &mut self.columns {
            match values.iter().find(|(c, _)| *c == column.component) {
                Some((_, ptr)) => unsafe { column.write_value(row, *ptr) },
                None => column.clear_to_default(row),
            }
        }
        self.count += 1;
        Ok(row)
    }

    /// Swap-remove `row`: copy the last live row into `row` (entity column
    /// plus every component column), clear the vacated last slot, and
    /// decrement `count`. Returns the entity that was moved into `row`, or
    /// `None` if `row` was already the last live row.
    pub fn remove_at(&mut self, row: usize, token: AccessToken) -> Result<Option<Entity>, EcsError> {
        self.check_write(token)?;
        if row >= self.count {
            return Err(EcsError::OutOfRange {
                index: row as i64,
                bound: self.count,
            });
        }
        let last = self.count - 1;
        for column in &mut self.columns {
            column.drop_row(row);
            if row != last {
                column.move_row_within(last, row);
            } else {
                column.clear_to_default(last);
            }
        }
        let moved = if row != last {
            self.entities[row] = self.entities[last];
            Some(self.entities[row])
        } else {
            None
        };
        self.entities.truncate(last);
        self.count -= 1;
        Ok(moved)
    }

    /// Scan the entity column for `entity` and, if found, `remove_at` it.
    pub fn remove(&mut self, entity: Entity, token: AccessToken) -> Result<bool, EcsError> {
        match self.entities.iter().position(|&e| e == entity) {
            Some(row) => {
                self.remove_at(row, token)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a contiguous range `[start, start+len)` via repeated
    /// swap-remove from the end -- `O(min(len, count - start))` copies
    /// rather than `len` individual calls.
    pub fn remove_range(&mut self, start: usize, len: usize, token: AccessToken) -> Result<(), EcsError> {
        self.check_write(token)?;
        if start > self.count || start + len > self.count {
            return Err(EcsError::OutOfRange {
                index: (start + len) as i64,
                bound: self.count,
            });
        }
        for _ in 0..len {
            self.remove_at(start, token)?;
        }
        Ok(())
    }

    /// Clear every live row (dropping Managed payloads), resetting `count`
    /// to 0. Fails on a frozen (read-only) table.
    pub fn clear(&mut self, token: AccessToken) -> Result<(), EcsError> {
        self.check_write(token)?;
        for row in 0..self.count {
            for column in &mut self.columns {
                column.drop_row(row);
            }
        }
        self.entities.clear();
        self.count = 0;
        Ok(())
    }

    /// Bulk-copy `n` rows starting at `src_start` from `src` into `self`,
    /// used by archetype transitions. Both tables must be writable under
    /// `token`/`src_token`. Components present in both archetypes are moved
    /// across (raw byte move, no clone); components new to `self` are left
    /// at their default; components only in `src` are dropped there.
    ///
    /// Returns, for each row removed from `src` (in the same back-to-front
    /// order they were removed), the entity that swap-remove moved into the
    /// vacated slot -- callers must use this to fix up that entity's
    /// recorded row, mirroring the single-row bookkeeping `remove_at` itself
    /// requires.
    pub fn add_range(
        &mut self,
        src: &mut EntityTable,
        src_start: usize,
        n: usize,
        token: AccessToken,
        src_token: AccessToken,
    ) -> Result<Vec<Option<Entity>>, EcsError> {
        self.check_write(token)?;
        src.check_write(src_token)?;
        if src_start + n > src.count {
            return Err(EcsError::OutOfRange {
                index: (src_start + n) as i64,
                bound: src.count,
            });
        }
        let mut swapped = Vec::with_capacity(n);
        for offset in 0..n {
            let src_row = src_start + n - 1 - offset; // remove from the end of the range back-to-front
            if self.is_full() {
                return Err(EcsError::InvalidOperation {
                    message: "destination table is full during add_range".into(),
                });
            }
            let entity = src.entities[src_row];
            let dst_row = self.count;
            self.entities.push(entity);
            for dst_col in &mut self.columns {
                match src.column_index(dst_col.component) {
                    Some(src_idx) => src.columns[src_idx].move_row_into(src_row, dst_col, dst_row),
                    None => dst_col.clear_to_default(dst_row),
                }
            }
            self.count += 1;
            swapped.push(src.remove_at(src_row, src_token)?);
        }
        Ok(swapped)
    }

    /// Extract row `row` into owned, heap-allocated buffers (one per non-Tag
    /// component), then remove the row from this table. Used by
    /// [`crate::registry::EntityRegistry`] to migrate an entity across an
    /// archetype transition without ever holding two tables borrowed
    /// mutably at once: extraction and the destination insertion are
    /// separate steps with an owned buffer in between, mirroring the
    /// teacher's extract/insert migration pair.
    ///
    /// Returns the extracted values and, if swap-remove moved a different
    /// row into `row`'s old slot, the entity that moved.
    pub(crate) fn extract_row(
        &mut self,
        row: usize,
        token: AccessToken,
    ) -> Result<(Vec<ExtractedComponent>, Option<Entity>), EcsError> {
        self.check_write(token)?;
        if row >= self.count {
            return Err(EcsError::OutOfRange {
                index: row as i64,
                bound: self.count,
            });
        }
        let mut extracted = Vec::with_capacity(self.columns.len());
        for column in &mut self.columns {
            if let Some(value) = column.take_row(row) {
                extracted.push(value);
            }
        }
        let moved = self.remove_at(row, token)?;
        Ok((extracted, moved))
    }

    /// Append `entity` with explicit initial values taken from extracted
    /// buffers, used by the registry's migration path. Identical in effect
    /// to [`add_with_values`](Self::add_with_values) but takes already-owned
    /// [`ExtractedComponent`] values and marks the ones it consumes so their
    /// `Drop` does not also try to free the now-duplicated payload.
    pub(crate) fn add_extracted(
        &mut self,
        entity: Entity,
        extracted: &mut [ExtractedComponent],
        token: AccessToken,
    ) -> Result<usize, EcsError> {
        self.check_write(token)?;
        if self.is_full() {
            return Err(EcsError::InvalidOperation {
                message: "table is full".into(),
            });
        }
        let row = self.count;
        self.entities.push(entity);
        for column in &mut self.columns {
            match extracted.iter_mut().find(|e| e.component == column.component) {
                Some(value) => {
                    unsafe { column.write_value(row, value.ptr) };
                    value.consumed = true;
                }
                None => column.clear_to_default(row),
            }
        }
        self.count += 1;
        Ok(row)
    }

    /// Typed read-write access to a component column.
    pub fn get_components<K: Component>(&self, token: AccessToken) -> Result<&[K], EcsError> {
        self.check_write(token)?;
        self.try_get_components_raw::<K>()
    }

    /// Fallible typed access that doesn't require a write token (read-only
    /// scans are always permitted).
    pub fn try_get_components<K: Component>(&self) -> Result<&[K], EcsError> {
        self.try_get_components_raw::<K>()
    }

    fn try_get_components_raw<K: Component>(&self) -> Result<&[K], EcsError> {
        let component = ComponentType::of::<K>();
        let idx = self
            .column_index(component)
            .ok_or(EcsError::ComponentNotFound {
                component: component.type_name(),
            })?;
        let column = &self.columns[idx];
        if column.item_size == 0 {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(column.data as *const K, self.count) })
    }

    /// Typed mutable access to a component column.
    pub fn get_components_mut<K: Component>(&mut self, token: AccessToken) -> Result<&mut [K], EcsError> {
        self.check_write(token)?;
        let component = ComponentType::of::<K>();
        let idx = self
            .column_index(component)
            .ok_or(EcsError::ComponentNotFound {
                component: component.type_name(),
            })?;
        let column = &mut self.columns[idx];
        if column.item_size == 0 {
            return Ok(&mut []);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(column.data as *mut K, self.count) })
    }

    /// Read-only slice of the live entity prefix.
    pub fn get_entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Write `value` into `row`'s slot for component `K`, returning the
    /// previous raw pointer's occupant is not exposed -- callers needing
    /// the old value should read it first via
    /// [`get_components`](Self::get_components).
    ///
    /// # Safety
    /// `row` must be `< count()` and `K` must be the archetype's actual
    /// component type at that slot.
    pub unsafe fn set_component_raw<K: Component>(
        &mut self,
        row: usize,
        value: K,
        token: AccessToken,
    ) -> Result<(), EcsError> {
        self.check_write(token)?;
        if row >= self.count {
            return Err(EcsError::OutOfRange {
                index: row as i64,
                bound: self.count,
            });
        }
        let component = ComponentType::of::<K>();
        let idx = self
            .column_index(component)
            .ok_or(EcsError::ComponentNotFound {
                component: component.type_name(),
            })?;
        let column = &mut self.columns[idx];
        column.drop_row(row);
        let value = std::mem::ManuallyDrop::new(value);
        unsafe { column.write_value(row, &*value as *const K as *const u8) };
        Ok(())
    }
}

impl Drop for EntityTable {
    fn drop(&mut self) {
        for row in 0..self.count {
            for column in &mut self.columns {
                column.drop_row(row);
            }
        }
    }
}

//! Read-side enumeration of tables matching a predicate.
//!
//! An [`EntityQuery`] pairs an [`EntityPredicate`] with whichever
//! [`EntityTableLookup`] it's asked to scan, per spec §4.7. It holds no
//! cached table list: each call to [`matches`](EntityQuery::matches)
//! re-walks the lookup's groupings, so a newly interned archetype that
//! satisfies the predicate is picked up on the very next call, with no
//! invalidation step required.

use std::ops::Range;

use crate::lookup::EntityTableLookup;
use crate::predicate::EntityPredicate;
use crate::table::EntityTable;

/// One matching table and the range of its live rows.
///
/// The range is always `0..table.count()`: an [`EntityTable`]'s own live
/// prefix is already contiguous, so there is never more than one range per
/// table -- but exposing it as a range (rather than just the table) keeps
/// the shape spec §4.7 describes ("`(table, range)` pairs") and gives
/// callers an explicit row-iteration bound without re-deriving it.
pub struct QueryMatch<'a> {
    pub table: &'a EntityTable,
    pub range: Range<usize>,
}

/// A predicate bound to no particular lookup; reusable across scans of
/// different [`EntityTableLookup`]s (e.g. once per frame against the same
/// registry, or against several registries sharing a component schema).
#[derive(Clone)]
pub struct EntityQuery {
    predicate: EntityPredicate,
}

impl EntityQuery {
    /// A query over `predicate`.
    pub fn new(predicate: EntityPredicate) -> Self {
        Self { predicate }
    }

    /// A query matching every archetype.
    pub fn universal() -> Self {
        Self::new(EntityPredicate::universal())
    }

    /// The predicate this query scans with.
    pub fn predicate(&self) -> &EntityPredicate {
        &self.predicate
    }

    /// All `(table, range)` pairs in `lookup` whose archetype satisfies this
    /// query's predicate, covering every live row. Order is unspecified
    /// (it follows the lookup's internal grouping order) but stable within
    /// one un-mutated lookup.
    pub fn matches<'a>(&self, lookup: &'a EntityTableLookup) -> Vec<QueryMatch<'a>> {
        lookup
            .groupings()
            .filter(|grouping| self.predicate.matches(grouping.archetype()))
            .flat_map(|grouping| {
                grouping.tables().iter().map(|table| QueryMatch {
                    table,
                    range: 0..table.count(),
                })
            })
            .collect()
    }

    /// Total number of live rows across every matching table.
    pub fn count_entities(&self, lookup: &EntityTableLookup) -> usize {
        self.matches(lookup).iter().map(|m| m.range.len()).sum()
    }
}

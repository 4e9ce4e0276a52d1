//! entihive -- an archetype-based entity-component registry.
//!
//! Entities are dynamic bags of component values, routed through
//! [`archetype`]-keyed [`table`] storage using a Structure-of-Arrays layout
//! for cache-friendly bulk iteration. Archetypes are interned process-wide so
//! that any two equivalent component sets are the same object; entity
//! identity is generational, so a stale handle is rejected rather than
//! silently reused.
//!
//! # Quick Start
//!
//! ```
//! use entihive::prelude::*;
//!
//! #[derive(Clone, Copy)]
//! struct Position { x: f32, y: f32 }
//! impl_unmanaged_component!(Position);
//!
//! #[derive(Clone, Copy)]
//! struct Velocity { dx: f32, dy: f32 }
//! impl_unmanaged_component!(Velocity);
//!
//! let mut registry = EntityRegistry::new();
//! let entity = registry.create(None);
//! registry.set_component(entity, Position { x: 0.0, y: 0.0 }).unwrap();
//! registry.set_component(entity, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
//!
//! let predicate = EntityPredicate::create(
//!     Some(&[ComponentType::of::<Position>(), ComponentType::of::<Velocity>()]),
//!     Some(&[]),
//!     Some(&[]),
//! ).unwrap();
//! let count = EntityQuery::new(predicate).count_entities(registry.lookup());
//! assert_eq!(count, 1);
//! ```

#[allow(unsafe_code)]
pub mod archetype;
pub mod component;
pub mod entity;
pub mod lookup;
pub mod predicate;
pub mod query;
pub mod registry;
#[allow(unsafe_code)]
pub mod table;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by registry, table, and archetype operations -- the only
/// failure channel surfaced anywhere in this crate.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// A required argument was missing or structurally invalid (a null
    /// component slice, a negative capacity).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A row or count index fell outside its legal bound.
    #[error("index {index} out of range (bound {bound})")]
    OutOfRange { index: i64, bound: usize },

    /// The requested mutation isn't permitted in the table's current state:
    /// no write access, or the table is full.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// The entity handle's version doesn't match its slot (stale or never
    /// allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    EntityNotFound { entity: entity::Entity },

    /// A typed column access named a component absent from the table's
    /// archetype.
    #[error("component '{component}' not present in this table's archetype")]
    ComponentNotFound { component: &'static str },

    /// A `ComponentType` comparison was attempted against a value declared
    /// for an unrelated Rust type.
    #[error("type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::EntityArchetype;
    pub use crate::component::{
        Component, ComponentCategory, ComponentType, ManagedComponent, TagComponent, UnmanagedComponent,
    };
    pub use crate::entity::Entity;
    pub use crate::lookup::EntityTableLookup;
    pub use crate::predicate::{EntityPredicate, EntityPredicateBuilder};
    pub use crate::query::{EntityQuery, QueryMatch};
    pub use crate::registry::{EntityRegistry, Location};
    pub use crate::table::{AccessToken, EntityTable};
    pub use crate::{impl_tag_component, impl_unmanaged_component};
    pub use crate::EcsError;
}

pub use crate::archetype::EntityArchetype;
pub use crate::component::{Component, ComponentCategory, ComponentType};
pub use crate::entity::Entity;
pub use crate::predicate::EntityPredicate;
pub use crate::query::EntityQuery;
pub use crate::registry::EntityRegistry;
pub use crate::table::EntityTable;

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------

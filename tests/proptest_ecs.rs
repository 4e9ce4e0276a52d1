//! Property tests for registry operations.
//!
//! These generate random sequences of registry operations and verify that
//! invariants hold after each step.

use entihive::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pos {
    x: f32,
    y: f32,
}
impl_unmanaged_component!(Pos);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vel {
    dx: f32,
    dy: f32,
}
impl_unmanaged_component!(Vel);

/// Operations we can perform on the registry.
#[derive(Debug, Clone)]
enum EcsOp {
    SpawnPos(f32, f32),
    SpawnPosVel(f32, f32, f32, f32),
    Destroy(usize),
    AddVel(usize, f32, f32),
    RemoveVel(usize),
    QueryPos,
    QueryPosVel,
}

/// Strategy that generates finite (non-NaN, non-Inf) f32 values.
fn finite_f32() -> impl Strategy<Value = f32> {
    (-1_000_000i32..1_000_000i32).prop_map(|v| v as f32 * 0.01)
}

fn ecs_op_strategy() -> impl Strategy<Value = EcsOp> {
    prop_oneof![
        (finite_f32(), finite_f32()).prop_map(|(x, y)| EcsOp::SpawnPos(x, y)),
        (finite_f32(), finite_f32(), finite_f32(), finite_f32())
            .prop_map(|(x, y, dx, dy)| EcsOp::SpawnPosVel(x, y, dx, dy)),
        (0..100usize).prop_map(EcsOp::Destroy),
        (0..100usize, finite_f32(), finite_f32()).prop_map(|(i, dx, dy)| EcsOp::AddVel(i, dx, dy)),
        (0..100usize).prop_map(EcsOp::RemoveVel),
        Just(EcsOp::QueryPos),
        Just(EcsOp::QueryPosVel),
    ]
}

fn predicate_of(types: &[ComponentType]) -> EntityPredicate {
    EntityPredicate::create(Some(types), Some(&[]), Some(&[])).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn random_ops_preserve_invariants(ops in prop::collection::vec(ecs_op_strategy(), 1..50)) {
        let mut registry = EntityRegistry::new();
        let mut alive: Vec<Entity> = Vec::new();

        for op in ops {
            match op {
                EcsOp::SpawnPos(x, y) => {
                    let e = registry.create(None);
                    registry.set_component(e, Pos { x, y }).unwrap();
                    alive.push(e);
                }
                EcsOp::SpawnPosVel(x, y, dx, dy) => {
                    let e = registry.create(None);
                    registry.set_component(e, Pos { x, y }).unwrap();
                    registry.set_component(e, Vel { dx, dy }).unwrap();
                    alive.push(e);
                }
                EcsOp::Destroy(idx) => {
                    if !alive.is_empty() {
                        let idx = idx % alive.len();
                        let e = alive.remove(idx);
                        registry.destroy(e);
                    }
                }
                EcsOp::AddVel(idx, dx, dy) => {
                    if !alive.is_empty() {
                        let idx = idx % alive.len();
                        let _ = registry.set_component(alive[idx], Vel { dx, dy });
                    }
                }
                EcsOp::RemoveVel(idx) => {
                    if !alive.is_empty() {
                        let idx = idx % alive.len();
                        let _ = registry.remove_component(alive[idx], ComponentType::of::<Vel>());
                    }
                }
                EcsOp::QueryPos => {
                    let predicate = predicate_of(&[ComponentType::of::<Pos>()]);
                    let count = EntityQuery::new(predicate).count_entities(registry.lookup());
                    prop_assert!(count <= alive.len());
                }
                EcsOp::QueryPosVel => {
                    let predicate = predicate_of(&[ComponentType::of::<Pos>(), ComponentType::of::<Vel>()]);
                    let count = EntityQuery::new(predicate).count_entities(registry.lookup());
                    prop_assert!(count <= alive.len());
                }
            }

            prop_assert_eq!(registry.count(), alive.len());
            for &e in &alive {
                prop_assert!(registry.contains(e));
            }
        }
    }

    /// Generational versions catch stale references immediately, even after
    /// an index has been recycled by a new `create`.
    #[test]
    fn stale_entities_detected_after_destroy_and_recycle(
        spawn_count in 1..20usize,
        destroy_indices in prop::collection::vec(0..20usize, 1..10),
    ) {
        let mut registry = EntityRegistry::new();

        let mut entities: Vec<Entity> = Vec::new();
        for i in 0..spawn_count {
            let e = registry.create(None);
            registry.set_component(e, Pos { x: i as f32, y: 0.0 }).unwrap();
            entities.push(e);
        }

        let mut stale: Vec<Entity> = Vec::new();
        for &idx in &destroy_indices {
            if !entities.is_empty() {
                let idx = idx % entities.len();
                let e = entities.remove(idx);
                registry.destroy(e);
                stale.push(e);
            }
        }

        for _ in 0..stale.len() {
            let e = registry.create(None);
            registry.set_component(e, Pos { x: 999.0, y: 999.0 }).unwrap();
            entities.push(e);
        }

        for &e in &stale {
            prop_assert!(!registry.contains(e));
            prop_assert!(!registry.has_component::<Pos>(e));
        }
        for &e in &entities {
            prop_assert!(registry.contains(e));
            prop_assert!(registry.has_component::<Pos>(e));
        }
    }

    /// Archetype migration on add/remove preserves every component value
    /// that survives the transition.
    #[test]
    fn archetype_migration_preserves_data(
        initial_x in finite_f32(),
        initial_y in finite_f32(),
        vel_dx in finite_f32(),
        vel_dy in finite_f32(),
        do_remove in proptest::bool::ANY,
    ) {
        let mut registry = EntityRegistry::new();
        let e = registry.create(None);
        registry.set_component(e, Pos { x: initial_x, y: initial_y }).unwrap();

        registry.set_component(e, Vel { dx: vel_dx, dy: vel_dy }).unwrap();

        let loc = registry.find(e).unwrap();
        let table = registry.lookup().grouping(loc.archetype_id).tables().first().unwrap();
        let pos = table.try_get_components::<Pos>().unwrap()[loc.row];
        prop_assert_eq!(pos.x, initial_x);
        prop_assert_eq!(pos.y, initial_y);
        let vel = table.try_get_components::<Vel>().unwrap()[loc.row];
        prop_assert_eq!(vel.dx, vel_dx);
        prop_assert_eq!(vel.dy, vel_dy);

        if do_remove {
            registry.remove_component(e, ComponentType::of::<Vel>()).unwrap();

            let loc = registry.find(e).unwrap();
            let table = registry.lookup().grouping(loc.archetype_id).tables().first().unwrap();
            let pos = table.try_get_components::<Pos>().unwrap()[loc.row];
            prop_assert_eq!(pos.x, initial_x);
            prop_assert_eq!(pos.y, initial_y);
            prop_assert!(!registry.has_component::<Vel>(e));
        }
    }

    /// Multiple entities sharing an archetype maintain independent data, and
    /// destroying one doesn't disturb the others.
    #[test]
    fn multiple_entities_independent_data(count in 2..50usize) {
        let mut registry = EntityRegistry::new();

        let mut entities = Vec::new();
        for i in 0..count {
            let e = registry.create(None);
            registry.set_component(e, Pos { x: i as f32, y: (i * 2) as f32 }).unwrap();
            entities.push(e);
        }

        for (i, &e) in entities.iter().enumerate() {
            let loc = registry.find(e).unwrap();
            let table = registry.lookup().grouping(loc.archetype_id).tables().first().unwrap();
            let pos = table.try_get_components::<Pos>().unwrap()[loc.row];
            prop_assert_eq!(pos.x, i as f32);
            prop_assert_eq!(pos.y, (i * 2) as f32);
        }

        if count > 2 {
            let mid = count / 2;
            let mid_e = entities.remove(mid);
            registry.destroy(mid_e);

            prop_assert_eq!(registry.count(), entities.len());
            for &e in &entities {
                prop_assert!(registry.contains(e));
                prop_assert!(registry.has_component::<Pos>(e));
            }
        }
    }
}

//! Constraint binding across recovery phases and catalog changes.

use ntest::timeout;

use tuple_constraint_core::func::FuncCache;
use tuple_constraint_core::{BindState, ConstraintError, RecoveryPhase, Space, SpaceCache};

use super::helpers::*;

fn is_even(data: &[u8]) -> bool {
    data.first().map_or(false, |byte| *byte < 0x80 && byte % 2 == 0)
}

fn state_of(space: &Space, name: &str) -> BindState {
    space.with_constraint(name, |constr| constr.state()).unwrap()
}

/// Loads spaces in snapshot order: the referencing space comes first.
fn load_out_of_order(cache: &mut SpaceCache) {
    let fk = decode_fkeys(&fkey_by_name("fk_user", USERS, "id"), false);
    let orders = cache
        .insert(
            Space::new(orders_def(fk, Some(false))).unwrap(),
            RecoveryPhase::InitialRecovery,
        )
        .unwrap();
    assert_eq!(state_of(&orders, "fk_user"), BindState::Pending);
    orders
        .insert(RecoveryPhase::InitialRecovery, tuple(&[u(1), u(7)]))
        .unwrap();
}

#[test]
#[timeout(1000)]
fn test_pending_foreign_key_resolved_after_load() {
    let mut cache = SpaceCache::new();
    load_out_of_order(&mut cache);
    let users = cache
        .insert(Space::new(users_def()).unwrap(), RecoveryPhase::InitialRecovery)
        .unwrap();
    users
        .insert(RecoveryPhase::InitialRecovery, tuple(&[u(7)]))
        .unwrap();
    assert!(!cache.is_pinned(USERS));

    cache.finish_recovery(RecoveryPhase::FinalRecovery).unwrap();
    let orders = cache.space_by_id(ORDERS).unwrap();
    assert_eq!(state_of(&orders, "fk_user"), BindState::Bound);
    assert_eq!(orders.pending_constraints(), 0);
    assert!(cache.is_pinned(USERS));

    // Write-ahead log replay does not check references either.
    orders
        .insert(RecoveryPhase::FinalRecovery, tuple(&[u(2), u(99)]))
        .unwrap();
    assert!(orders
        .insert(RecoveryPhase::Done, tuple(&[u(3), u(99)]))
        .is_err());
    assert!(matches!(
        users.delete(&cache, &[u(7)]),
        Err(ConstraintError::ForeignKeyIntegrity { .. })
    ));
}

#[test]
#[timeout(1000)]
fn test_pending_foreign_key_never_resolved() {
    let mut cache = SpaceCache::new();
    load_out_of_order(&mut cache);
    match cache.finish_recovery(RecoveryPhase::FinalRecovery) {
        Err(ConstraintError::CreateForeignKey {
            name,
            space,
            message,
        }) => {
            assert_eq!(name, "fk_user");
            assert_eq!(space, "orders");
            assert_eq!(message, "foreign space '10' was not found by id");
        }
        other => panic!("expected create error, got {:?}", other),
    }
}

#[test]
#[timeout(1000)]
fn test_pending_function_resolved_after_registration() {
    let mut cache = SpaceCache::new();
    let defs = decode_funcs(&func_map(&[("even", 3)]));
    let orders = cache
        .insert(
            Space::new(orders_def(defs, None)).unwrap(),
            RecoveryPhase::Initialized,
        )
        .unwrap();
    assert_eq!(state_of(&orders, "even"), BindState::Pending);

    cache.funcs_mut().register(3, "is_even", is_even).unwrap();
    cache.finish_recovery(RecoveryPhase::FinalRecovery).unwrap();
    assert_eq!(state_of(&orders, "even"), BindState::Bound);
    orders
        .with_constraint("even", |constr| {
            assert_eq!(constr.func().map(|func| func.name()), Some("is_even"));
        })
        .unwrap();

    orders
        .insert(RecoveryPhase::Done, tuple(&[u(1), u(4)]))
        .unwrap();
    let err = orders
        .insert(RecoveryPhase::Done, tuple(&[u(2), u(5)]))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Check constraint 'even' failed for field 'uid'"
    );
}

#[test]
#[timeout(1000)]
fn test_function_outlives_unregistration() {
    let mut funcs = FuncCache::new();
    funcs.register(3, "is_even", is_even).unwrap();
    let mut cache = SpaceCache::with_funcs(funcs);
    let defs = decode_funcs(&func_map(&[("even", 3)]));
    let orders = cache
        .insert(Space::new(orders_def(defs, None)).unwrap(), RecoveryPhase::Done)
        .unwrap();

    assert!(cache.funcs_mut().remove(3).is_some());
    assert!(cache.funcs().is_empty());
    assert!(orders
        .insert(RecoveryPhase::Done, tuple(&[u(1), u(5)]))
        .is_err());
}

#[test]
#[timeout(1000)]
fn test_replace_rebinds_own_constraints() {
    let mut cache = SpaceCache::new();
    cache
        .insert(Space::new(users_def()).unwrap(), RecoveryPhase::Done)
        .unwrap();
    let fk = decode_fkeys(&fkey_by_name("fk_user", USERS, "id"), false);
    let old = cache
        .insert(Space::new(orders_def(fk.clone(), None)).unwrap(), RecoveryPhase::Done)
        .unwrap();
    assert_eq!(cache.pin_count(USERS), 1);

    cache
        .replace(
            Space::new(orders_def(fk, Some(false))).unwrap(),
            RecoveryPhase::Done,
        )
        .unwrap();
    let new = cache.space_by_id(ORDERS).unwrap();
    assert_eq!(state_of(&old, "fk_user"), BindState::Released);
    assert_eq!(state_of(&new, "fk_user"), BindState::Bound);
    assert_eq!(cache.pin_count(USERS), 1);
    assert_eq!(
        new.with_constraint("fk_user", |constr| constr.fkey().unwrap().local_index()),
        Some(Some(1))
    );
}

#[test]
#[timeout(1000)]
fn test_failed_replace_keeps_old_space() {
    let mut cache = SpaceCache::new();
    let old = cache
        .insert(Space::new(orders_def(vec![], None)).unwrap(), RecoveryPhase::Done)
        .unwrap();
    old.insert(RecoveryPhase::Done, tuple(&[u(1), u(7)]))
        .unwrap();

    let fk = decode_fkeys(&fkey_by_name("fk_user", USERS, "id"), false);
    assert!(cache
        .replace(Space::new(orders_def(fk, None)).unwrap(), RecoveryPhase::Done)
        .is_err());
    let current = cache.space_by_id(ORDERS).unwrap();
    assert!(std::rc::Rc::ptr_eq(&current, &old));
    assert_eq!(current.len(), 1);
}

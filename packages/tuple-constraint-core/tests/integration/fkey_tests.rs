//! Foreign key resolution, checks and delete integrity.

use std::rc::Rc;

use ntest::timeout;

use tuple_constraint_core::space::{FieldDef, FieldType, IndexDef, KeyPart, SpaceDef};
use tuple_constraint_core::{BindState, ConstraintError, ErrorKind, RecoveryPhase, Space, SpaceCache};

use super::helpers::*;

fn setup(uid_index: Option<bool>) -> (SpaceCache, Rc<Space>, Rc<Space>) {
    let mut cache = SpaceCache::new();
    let users = cache
        .insert(Space::new(users_def()).unwrap(), RecoveryPhase::Done)
        .unwrap();
    let fk = decode_fkeys(&fkey_by_name("fk_user", USERS, "id"), false);
    let orders = cache
        .insert(
            Space::new(orders_def(fk, uid_index)).unwrap(),
            RecoveryPhase::Done,
        )
        .unwrap();
    (cache, users, orders)
}

#[test]
#[timeout(1000)]
fn test_insert_requires_foreign_tuple() {
    let (_cache, users, orders) = setup(None);
    users.insert(RecoveryPhase::Done, tuple(&[u(7)])).unwrap();

    orders
        .insert(RecoveryPhase::Done, tuple(&[u(1), u(7)]))
        .unwrap();
    let err = orders
        .insert(RecoveryPhase::Done, tuple(&[u(2), u(8)]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.reason(), Some("foreign tuple was not found"));
    assert_eq!(
        err.to_string(),
        "Foreign key constraint 'fk_user' failed for field 'uid': foreign tuple was not found"
    );
    assert_eq!(orders.len(), 1);
}

#[test]
#[timeout(1000)]
fn test_nil_reference_is_not_checked() {
    let (_cache, _users, orders) = setup(None);
    orders
        .insert(RecoveryPhase::Done, tuple_with_nil(1))
        .unwrap();
}

#[test]
#[timeout(1000)]
fn test_unresolved_foreign_field() {
    let mut cache = SpaceCache::new();
    cache
        .insert(Space::new(users_def()).unwrap(), RecoveryPhase::Done)
        .unwrap();
    // users has no field named "uid".
    let fk = decode_fkeys(&fkey_by_name("fk1", USERS, "uid"), false);
    let orders = cache
        .insert(Space::new(orders_def(fk, None)).unwrap(), RecoveryPhase::Done)
        .unwrap();

    orders
        .with_constraint("fk1", |constr| {
            assert_eq!(constr.state(), BindState::Bound);
            let binding = constr.fkey().unwrap();
            assert_eq!(binding.foreign_field_no(), None);
            assert_eq!(binding.foreign_index(), None);
        })
        .unwrap();

    let err = orders
        .insert(RecoveryPhase::Done, tuple(&[u(1), u(7)]))
        .unwrap_err();
    assert_eq!(err.reason(), Some("foreign index was not found"));
    // Checks are skipped until recovery is over.
    orders
        .insert(RecoveryPhase::FinalRecovery, tuple(&[u(1), u(7)]))
        .unwrap();
}

#[test]
#[timeout(1000)]
fn test_foreign_key_to_non_unique_field() {
    let mut cache = SpaceCache::new();
    let def = users_def()
        .field(FieldDef::new("email", FieldType::String))
        .index(IndexDef::new(
            "email",
            false,
            vec![KeyPart::new(1, FieldType::String)],
        ));
    cache
        .insert(Space::new(def).unwrap(), RecoveryPhase::Done)
        .unwrap();
    let fk = decode_fkeys(&fkey_by_name("fk", USERS, "email"), false);
    let orders = cache
        .insert(Space::new(orders_def(fk, None)).unwrap(), RecoveryPhase::Done)
        .unwrap();
    orders
        .with_constraint("fk", |constr| {
            let binding = constr.fkey().unwrap();
            assert_eq!(binding.foreign_field_no(), Some(1));
            assert_eq!(binding.foreign_index(), None);
        })
        .unwrap();
}

#[test]
#[timeout(1000)]
fn test_replace_re_resolves_foreign_index() {
    let mut cache = SpaceCache::new();
    cache
        .insert(Space::new(users_def()).unwrap(), RecoveryPhase::Done)
        .unwrap();
    let fk = decode_fkeys(&fkey_by_name("fk1", USERS, "uid"), false);
    let orders = cache
        .insert(Space::new(orders_def(fk, None)).unwrap(), RecoveryPhase::Done)
        .unwrap();

    let new_users = users_def()
        .field(FieldDef::new("uid", FieldType::Unsigned))
        .index(IndexDef::new(
            "uid",
            true,
            vec![KeyPart::new(1, FieldType::Unsigned)],
        ));
    let old = cache
        .replace(Space::new(new_users).unwrap(), RecoveryPhase::Done)
        .unwrap();
    let users = cache.space_by_id(USERS).unwrap();

    orders
        .with_constraint("fk1", |constr| {
            let binding = constr.fkey().unwrap();
            assert_eq!(binding.foreign_field_no(), Some(1));
            assert_eq!(binding.foreign_index(), Some(1));
            let foreign = binding.foreign_space().unwrap();
            assert!(Rc::ptr_eq(&foreign, &users));
            assert!(!Rc::ptr_eq(&foreign, &old));
        })
        .unwrap();

    users
        .insert(RecoveryPhase::Done, tuple(&[u(1), u(70)]))
        .unwrap();
    orders
        .insert(RecoveryPhase::Done, tuple(&[u(1), u(70)]))
        .unwrap();
    let err = orders
        .insert(RecoveryPhase::Done, tuple(&[u(2), u(1)]))
        .unwrap_err();
    assert_eq!(err.reason(), Some("foreign tuple was not found"));
}

#[test]
#[timeout(1000)]
fn test_tuple_foreign_key_with_mapping() {
    let mut cache = SpaceCache::new();
    let users = cache
        .insert(Space::new(users_def()).unwrap(), RecoveryPhase::Done)
        .unwrap();
    let fk = decode_fkeys(&fkey_mapping("fk_map", USERS, "uid", "id"), true);
    let orders = cache
        .insert(
            Space::new(orders_def(vec![], None).constraints(fk)).unwrap(),
            RecoveryPhase::Done,
        )
        .unwrap();
    orders
        .with_constraint("fk_map", |constr| {
            let binding = constr.fkey().unwrap();
            assert_eq!(binding.local_field_no(), Some(1));
            assert_eq!(binding.foreign_field_no(), Some(0));
        })
        .unwrap();

    match orders.insert(RecoveryPhase::Done, tuple(&[u(1), u(7)])) {
        Err(ConstraintError::TupleForeignKeyFailed { name, message }) => {
            assert_eq!(name, "fk_map");
            assert_eq!(message, "foreign tuple was not found");
        }
        other => panic!("expected tuple foreign key failure, got {:?}", other),
    }
    users.insert(RecoveryPhase::Done, tuple(&[u(7)])).unwrap();
    orders
        .insert(RecoveryPhase::Done, tuple(&[u(1), u(7)]))
        .unwrap();
    orders.insert(RecoveryPhase::Done, tuple_with_nil(2)).unwrap();
}

#[test]
#[timeout(1000)]
fn test_multi_field_mapping_is_rejected() {
    let mut cache = SpaceCache::new();
    cache
        .insert(Space::new(users_def()).unwrap(), RecoveryPhase::Done)
        .unwrap();

    let mut buf = Vec::new();
    rmp::encode::write_map_len(&mut buf, 1).unwrap();
    rmp::encode::write_str(&mut buf, "fk_pair").unwrap();
    rmp::encode::write_map_len(&mut buf, 2).unwrap();
    rmp::encode::write_str(&mut buf, "space").unwrap();
    rmp::encode::write_uint(&mut buf, USERS as u64).unwrap();
    rmp::encode::write_str(&mut buf, "field_mapping").unwrap();
    rmp::encode::write_map_len(&mut buf, 2).unwrap();
    for (local, foreign) in [("id", "id"), ("uid", "id")] {
        rmp::encode::write_str(&mut buf, local).unwrap();
        rmp::encode::write_str(&mut buf, foreign).unwrap();
    }
    let fk = decode_fkeys(&buf, true);
    let err = cache
        .insert(
            Space::new(orders_def(vec![], None).constraints(fk)).unwrap(),
            RecoveryPhase::Done,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.constraint_name(), Some("fk_pair"));
    assert!(cache.space_by_id(ORDERS).is_none());
}

#[test]
#[timeout(1000)]
fn test_delete_referenced_tuple() {
    for uid_index in [Some(false), Some(true)] {
        let (cache, users, orders) = setup(uid_index);
        users.insert(RecoveryPhase::Done, tuple(&[u(7)])).unwrap();
        users.insert(RecoveryPhase::Done, tuple(&[u(8)])).unwrap();
        orders
            .insert(RecoveryPhase::Done, tuple(&[u(1), u(7)]))
            .unwrap();

        match users.delete(&cache, &[u(7)]) {
            Err(ConstraintError::ForeignKeyIntegrity { name, message }) => {
                assert_eq!(name, "fk_user");
                assert_eq!(message, "tuple is referenced");
            }
            other => panic!("expected integrity failure, got {:?}", other),
        }
        assert_eq!(users.len(), 2);

        assert!(users.delete(&cache, &[u(8)]).unwrap().is_some());
        orders.delete(&cache, &[u(1)]).unwrap();
        assert!(users.delete(&cache, &[u(7)]).unwrap().is_some());
        assert!(users.is_empty());
    }
}

#[test]
#[timeout(1000)]
fn test_delete_allowed_once_referencing_space_dropped() {
    let (mut cache, users, orders) = setup(Some(false));
    users.insert(RecoveryPhase::Done, tuple(&[u(7)])).unwrap();
    orders
        .insert(RecoveryPhase::Done, tuple(&[u(1), u(7)]))
        .unwrap();
    assert!(users.delete(&cache, &[u(7)]).is_err());

    // Dropping orders releases its constraint and the pin with it.
    let dropped = cache.delete(ORDERS).unwrap();
    assert_eq!(dropped.len(), 1);
    assert_eq!(
        dropped.with_constraint("fk_user", |constr| constr.state()),
        Some(BindState::Released)
    );
    assert_eq!(cache.pin_count(USERS), 0);
    assert!(users.delete(&cache, &[u(7)]).unwrap().is_some());
}

#[test]
#[timeout(1000)]
fn test_delete_without_local_index() {
    let (cache, users, _orders) = setup(None);
    users.insert(RecoveryPhase::Done, tuple(&[u(7)])).unwrap();
    let err = users.delete(&cache, &[u(7)]).unwrap_err();
    assert_eq!(err.reason(), Some("index was not found"));
}

#[test]
#[timeout(1000)]
fn test_self_reference() {
    let mut cache = SpaceCache::new();
    let fk = decode_fkeys(&fkey_by_name("fk_parent", 30, "id"), false);
    let def = SpaceDef::new(30, "tree")
        .field(FieldDef::new("id", FieldType::Unsigned))
        .field(FieldDef::new("parent", FieldType::Unsigned).with_constraints(fk))
        .index(IndexDef::new(
            "pk",
            true,
            vec![KeyPart::new(0, FieldType::Unsigned)],
        ))
        .index(IndexDef::new(
            "parent",
            false,
            vec![KeyPart::new(1, FieldType::Unsigned)],
        ));
    let tree = cache
        .insert(Space::new(def).unwrap(), RecoveryPhase::Done)
        .unwrap();
    assert!(!cache.is_pinned(30));
    assert_eq!(cache.pin_count(30), 1);

    // The root is loaded during recovery, when references are not checked.
    tree.insert(RecoveryPhase::FinalRecovery, tuple(&[u(1), u(0)]))
        .unwrap();
    tree.insert(RecoveryPhase::Done, tuple(&[u(2), u(1)]))
        .unwrap();
    assert!(tree
        .insert(RecoveryPhase::Done, tuple(&[u(3), u(9)]))
        .is_err());

    let err = tree.delete(&cache, &[u(1)]).unwrap_err();
    assert_eq!(err.reason(), Some("tuple is referenced"));
    tree.delete(&cache, &[u(2)]).unwrap();
    tree.delete(&cache, &[u(1)]).unwrap();

    cache.delete(30).unwrap();
    assert_eq!(cache.pin_count(30), 0);
}

#[test]
#[timeout(1000)]
fn test_pinned_space_cannot_be_dropped() {
    let (mut cache, _users, _orders) = setup(None);
    match cache.delete(USERS) {
        Err(err @ ConstraintError::SpacePinned { .. }) => {
            assert_eq!(
                err.to_string(),
                "Can't drop space 'users': other objects depend on it"
            );
        }
        other => panic!("expected pinned space, got {:?}", other),
    }
    cache.delete(ORDERS).unwrap();
    cache.delete(USERS).unwrap();
    assert!(cache.is_empty());
}

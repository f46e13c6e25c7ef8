//! Decoding real-shaped definition maps and collocating the results.

use ntest::timeout;
use rand::{Rng, SeedableRng};

use tuple_constraint_core::constraint_def::{collocate, decode, decode_fkey, FkeyFields};
use tuple_constraint_core::murmur::MurmurHasher32;
use tuple_constraint_core::{ConstraintKind, DecodeError, Region, TupleConstraint};

use super::helpers::*;

fn hash_of(def: &tuple_constraint_core::ConstraintDef, ignore_name: bool) -> u32 {
    let mut hasher = MurmurHasher32::new(0);
    if ignore_name {
        def.hash_process_entity(&mut hasher);
    } else {
        def.hash_process(&mut hasher);
    }
    hasher.finish()
}

#[test]
#[timeout(1000)]
fn test_decode_both_forms_into_one_array() {
    let mut defs = Vec::new();
    let mut region = Region::new();

    let funcs = func_map(&[("check_a", 1), ("check_b", 2)]);
    decode(&mut &funcs[..], &mut defs, &mut region).unwrap();
    let fkeys = fkey_by_name("fk_user", USERS, "id");
    decode_fkey(&mut &fkeys[..], &mut defs, &mut region, false).unwrap();
    let mapping = fkey_mapping("fk_map", USERS, "uid", "id");
    decode_fkey(&mut &mapping[..], &mut defs, &mut region, true).unwrap();

    let kinds: Vec<_> = defs.iter().map(|def| def.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ConstraintKind::Func,
            ConstraintKind::Func,
            ConstraintKind::Fkey,
            ConstraintKind::Fkey
        ]
    );
    assert!(matches!(
        defs[3].as_fkey().map(|fkey| &fkey.fields),
        Some(FkeyFields::Mapping(pairs)) if pairs.len() == 1
    ));
    assert!(region.used() > 0);
}

#[test]
#[timeout(1000)]
fn test_equal_definitions_hash_equally() {
    let a = decode_fkeys(&fkey_by_name("fk", USERS, "id"), false);
    let b = decode_fkeys(&fkey_by_name("fk", USERS, "id"), false);
    let renamed = decode_fkeys(&fkey_by_name("other", USERS, "id"), false);

    assert_eq!(a[0], b[0]);
    assert_eq!(hash_of(&a[0], false), hash_of(&b[0], false));
    assert_ne!(a[0], renamed[0]);
    assert_eq!(a[0].compare(&renamed[0], true), std::cmp::Ordering::Equal);
    assert_eq!(hash_of(&a[0], true), hash_of(&renamed[0], true));
}

#[test]
#[timeout(1000)]
fn test_sort_orders_by_name_length_first() {
    let mut defs = decode_funcs(&func_map(&[("bbb", 1), ("a", 9), ("ab", 3), ("aa", 3)]));
    defs.sort();
    let names: Vec<_> = defs.iter().map(|def| def.name_str().into_owned()).collect();
    assert_eq!(names, vec!["a", "aa", "ab", "bbb"]);
}

#[test]
#[timeout(1000)]
fn test_collocate_survives_region_and_input() {
    let block = {
        let input = fkey_mapping("fk_map", USERS, "uid", "id");
        let defs = decode_fkeys(&input, true);
        collocate(&defs).unwrap()
    };
    assert_eq!(block.len(), 1);
    assert_eq!(block[0].name(), b"fk_map");
    assert!(block.owns(block[0].name()));
    // "fk_map", "uid", "id", each null-terminated.
    assert_eq!(block.layout().strings_size(), 7 + 4 + 3);
}

#[test]
#[timeout(1000)]
fn test_runtime_block_reserves_fkey_data() {
    let mut defs = decode_funcs(&func_map(&[("check", 1)]));
    defs.extend(decode_fkeys(&fkey_by_name("fk", USERS, "id"), false));
    let plain = collocate(&defs).unwrap();
    let runtime = TupleConstraint::collocate(&defs).unwrap();
    assert_eq!(plain.layout().additional_size(), 0);
    assert!(runtime.layout().additional_size() > 0);
    assert_eq!(plain.layout().strings_size(), runtime.layout().strings_size());
    for (def, constr) in defs.iter().zip(runtime.iter()) {
        assert_eq!(def, constr.def());
    }
}

#[test]
#[timeout(1000)]
fn test_region_limit_reports_size() {
    let input = func_map(&[("check", 1)]);
    let mut defs = Vec::new();
    let mut region = Region::with_limit(4);
    let err = decode(&mut &input[..], &mut defs, &mut region).unwrap_err();
    match &err {
        DecodeError::Alloc { size, what } => {
            assert_eq!(*what, "array of constraints");
            assert_eq!(err.status(), *size as i64);
        }
        other => panic!("expected allocation failure, got {:?}", other),
    }
    assert!(defs.is_empty());
}

#[test]
#[timeout(5000)]
fn test_random_input_never_panics() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let valid = fkey_mapping("fk_map", USERS, "uid", "id");
    for _ in 0..2000 {
        let mut input = valid.clone();
        let flips = rng.gen_range(1..4);
        for _ in 0..flips {
            let pos = rng.gen_range(0..input.len());
            input[pos] = rng.gen();
        }
        input.truncate(rng.gen_range(0..=input.len()));

        let mut defs = Vec::new();
        let mut region = Region::new();
        let is_complex = rng.gen_bool(0.5);
        if decode_fkey(&mut &input[..], &mut defs, &mut region, is_complex).is_err() {
            assert!(defs.is_empty());
        }
    }
}

//! Shared builders for integration tests.

use rmp::encode;

use tuple_constraint_core::constraint_def::{decode, decode_fkey, ConstraintDef};
use tuple_constraint_core::space::{
    FieldDef, FieldType, IndexDef, KeyPart, KeyValue, SpaceDef, Tuple,
};
use tuple_constraint_core::Region;

pub const USERS: u32 = 10;
pub const ORDERS: u32 = 20;

pub fn u(value: u64) -> KeyValue {
    KeyValue::Unsigned(value)
}

pub fn tuple(values: &[KeyValue]) -> Tuple {
    Tuple::from_values(values).unwrap()
}

/// `[id, nil]`
pub fn tuple_with_nil(id: u64) -> Tuple {
    let mut buf = Vec::new();
    encode::write_array_len(&mut buf, 2).unwrap();
    encode::write_uint(&mut buf, id).unwrap();
    encode::write_nil(&mut buf).unwrap();
    Tuple::new(buf).unwrap()
}

/// Encodes `{name: {space: id, field: name}}`.
pub fn fkey_by_name(name: &str, space_id: u32, field: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    encode::write_map_len(&mut buf, 1).unwrap();
    encode::write_str(&mut buf, name).unwrap();
    encode::write_map_len(&mut buf, 2).unwrap();
    encode::write_str(&mut buf, "space").unwrap();
    encode::write_uint(&mut buf, space_id as u64).unwrap();
    encode::write_str(&mut buf, "field").unwrap();
    encode::write_str(&mut buf, field).unwrap();
    buf
}

/// Encodes `{name: {space: id, field_mapping: {local: foreign}}}`.
pub fn fkey_mapping(name: &str, space_id: u32, local: &str, foreign: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    encode::write_map_len(&mut buf, 1).unwrap();
    encode::write_str(&mut buf, name).unwrap();
    encode::write_map_len(&mut buf, 2).unwrap();
    encode::write_str(&mut buf, "space").unwrap();
    encode::write_uint(&mut buf, space_id as u64).unwrap();
    encode::write_str(&mut buf, "field_mapping").unwrap();
    encode::write_map_len(&mut buf, 1).unwrap();
    encode::write_str(&mut buf, local).unwrap();
    encode::write_str(&mut buf, foreign).unwrap();
    buf
}

/// Encodes `{name: function_id, ...}`.
pub fn func_map(entries: &[(&str, u32)]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode::write_map_len(&mut buf, entries.len() as u32).unwrap();
    for (name, id) in entries {
        encode::write_str(&mut buf, name).unwrap();
        encode::write_uint(&mut buf, *id as u64).unwrap();
    }
    buf
}

pub fn decode_funcs(data: &[u8]) -> Vec<ConstraintDef> {
    let mut cursor = data;
    let mut defs = Vec::new();
    decode(&mut cursor, &mut defs, &mut Region::new()).unwrap();
    defs
}

pub fn decode_fkeys(data: &[u8], is_complex: bool) -> Vec<ConstraintDef> {
    let mut cursor = data;
    let mut defs = Vec::new();
    decode_fkey(&mut cursor, &mut defs, &mut Region::new(), is_complex).unwrap();
    defs
}

/// `users(id unsigned)` with a unique primary index on `id`.
pub fn users_def() -> SpaceDef {
    SpaceDef::new(USERS, "users")
        .field(FieldDef::new("id", FieldType::Unsigned))
        .index(IndexDef::new(
            "pk",
            true,
            vec![KeyPart::new(0, FieldType::Unsigned)],
        ))
}

/// `orders(id unsigned, uid unsigned)`, with `uid` carrying
/// `uid_constraints` and, if `uid_index` is set, a secondary index.
pub fn orders_def(uid_constraints: Vec<ConstraintDef>, uid_index: Option<bool>) -> SpaceDef {
    let def = SpaceDef::new(ORDERS, "orders")
        .field(FieldDef::new("id", FieldType::Unsigned))
        .field(FieldDef::new("uid", FieldType::Unsigned).with_constraints(uid_constraints))
        .index(IndexDef::new(
            "pk",
            true,
            vec![KeyPart::new(0, FieldType::Unsigned)],
        ));
    match uid_index {
        Some(is_unique) => def.index(IndexDef::new(
            "uid",
            is_unique,
            vec![KeyPart::new(1, FieldType::Unsigned)],
        )),
        None => def,
    }
}

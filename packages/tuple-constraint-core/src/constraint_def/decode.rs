//! Decoding of constraint definitions from MessagePack.
//!
//! Accepted shapes:
//!
//! ```text
//! {name: function_id, ...}
//! {name: {space: id, field: id_or_name}, ...}
//! {name: {space: id, field_mapping: {local: foreign, ...}}, ...}
//! ```
//!
//! Decoded definitions are appended to the caller's array; on error the array
//! is restored to its previous length.

use std::borrow::Cow;
use std::mem::size_of;

use bytes::Bytes;
use thiserror::Error;

use super::{ConstraintDef, ConstraintEntity, FieldPair, FieldRef, FkeyDef, FkeyFields, FuncDef};
use crate::region::Region;
use crate::wire::{self, WireError, WireType};

/// Decode failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input does not have the expected shape
    #[error("Wrong constraint format: {0}")]
    Format(Cow<'static, str>),

    /// The region could not provide `size` bytes for `what`
    #[error("Failed to allocate {size} bytes in region for {what}")]
    Alloc { size: usize, what: &'static str },
}

impl DecodeError {
    /// Integer status: positive byte count for allocation failures, -1 for
    /// format errors.
    pub fn status(&self) -> i64 {
        match self {
            DecodeError::Format(_) => -1,
            DecodeError::Alloc { size, .. } => *size as i64,
        }
    }

    fn format(message: impl Into<Cow<'static, str>>) -> Self {
        DecodeError::Format(message.into())
    }
}

impl From<WireError> for DecodeError {
    fn from(err: WireError) -> Self {
        DecodeError::format(err.to_string())
    }
}

/// Decodes the function form `{name: function_id, ...}` and appends the
/// definitions to `defs`.
pub fn decode(
    data: &mut &[u8],
    defs: &mut Vec<ConstraintDef>,
    region: &mut Region,
) -> Result<(), DecodeError> {
    with_rollback(defs, |defs| decode_func_map(data, defs, region))
}

/// Decodes the foreign key form and appends the definitions to `defs`.
/// `is_complex` selects `field_mapping` instead of `field`.
pub fn decode_fkey(
    data: &mut &[u8],
    defs: &mut Vec<ConstraintDef>,
    region: &mut Region,
    is_complex: bool,
) -> Result<(), DecodeError> {
    with_rollback(defs, |defs| decode_fkey_map(data, defs, region, is_complex))
}

fn with_rollback(
    defs: &mut Vec<ConstraintDef>,
    f: impl FnOnce(&mut Vec<ConstraintDef>) -> Result<(), DecodeError>,
) -> Result<(), DecodeError> {
    let start = defs.len();
    let result = f(defs);
    if result.is_err() {
        defs.truncate(start);
    }
    result
}

/// Reads the top-level map header and charges the region for `count` new
/// definitions.
fn decode_header(
    data: &mut &[u8],
    defs: &mut Vec<ConstraintDef>,
    region: &mut Region,
    not_a_map: &'static str,
) -> Result<u32, DecodeError> {
    if wire::peek_type(data) != Some(WireType::Map) {
        return Err(DecodeError::format(not_a_map));
    }
    let count = wire::decode_map_header(data)?;
    if count > 0 {
        region.reserve(
            count as usize * size_of::<ConstraintDef>(),
            "array of constraints",
        )?;
        // Every entry takes at least two bytes.
        defs.reserve((count as usize).min(data.len() / 2));
    }
    Ok(count)
}

fn decode_name(
    data: &mut &[u8],
    region: &mut Region,
    not_a_string: &'static str,
    what: &'static str,
) -> Result<Bytes, DecodeError> {
    if wire::peek_type(data) != Some(WireType::Str) {
        return Err(DecodeError::format(not_a_string));
    }
    let name = wire::decode_str(data)?;
    region.alloc_str(name, what)
}

fn decode_func_map(
    data: &mut &[u8],
    defs: &mut Vec<ConstraintDef>,
    region: &mut Region,
) -> Result<(), DecodeError> {
    let count = decode_header(data, defs, region, "constraint field is expected to be a MAP")?;
    for _ in 0..count {
        let name = decode_name(
            data,
            region,
            "constraint name is expected to be a string",
            "constraint name",
        )?;
        if wire::peek_type(data) != Some(WireType::Uint) {
            return Err(DecodeError::format(
                "constraint function ID is expected to be a number",
            ));
        }
        let id = u32::try_from(wire::decode_uint(data)?)
            .map_err(|_| DecodeError::format("constraint function ID is out of range"))?;
        defs.push(ConstraintDef::from_parts(
            name,
            ConstraintEntity::Func(FuncDef { id }),
        ));
    }
    Ok(())
}

fn decode_fkey_map(
    data: &mut &[u8],
    defs: &mut Vec<ConstraintDef>,
    region: &mut Region,
    is_complex: bool,
) -> Result<(), DecodeError> {
    let count = decode_header(data, defs, region, "foreign key field is expected to be a MAP")?;
    for _ in 0..count {
        let name = decode_name(
            data,
            region,
            "foreign key name is expected to be a string",
            "foreign key name",
        )?;
        let fkey = decode_fkey_value(data, region, is_complex)?;
        defs.push(ConstraintDef::from_parts(name, ConstraintEntity::Fkey(fkey)));
    }
    Ok(())
}

fn decode_fkey_value(
    data: &mut &[u8],
    region: &mut Region,
    is_complex: bool,
) -> Result<FkeyDef, DecodeError> {
    if wire::peek_type(data) != Some(WireType::Map) {
        return Err(DecodeError::format(
            "foreign key definition is expected to be a map",
        ));
    }
    let fields_key: &[u8] = if is_complex { b"field_mapping" } else { b"field" };
    let mut space_id = None;
    let mut fields = None;

    for _ in 0..wire::decode_map_header(data)? {
        if wire::peek_type(data) != Some(WireType::Str) {
            return Err(DecodeError::format(
                "foreign key definition is expected to be a string-keyed map",
            ));
        }
        let key = wire::decode_str(data)?;
        if key == b"space" {
            if space_id.is_some() {
                return Err(DecodeError::format("foreign key: space is specified twice"));
            }
            space_id = Some(decode_space_id(data)?);
        } else if key == fields_key {
            if fields.is_some() {
                return Err(DecodeError::format(format!(
                    "foreign key: {} is specified twice",
                    String::from_utf8_lossy(fields_key)
                )));
            }
            fields = Some(if is_complex {
                FkeyFields::Mapping(decode_field_mapping(data, region)?)
            } else {
                FkeyFields::Single(decode_field_ref(
                    data,
                    region,
                    "foreign key: field must be number or string",
                    "foreign key field name",
                )?)
            });
        } else {
            return Err(DecodeError::format(format!(
                "foreign key: unexpected parameter '{}'",
                String::from_utf8_lossy(key)
            )));
        }
    }

    let space_id =
        space_id.ok_or_else(|| DecodeError::format("foreign key: space must be specified"))?;
    let fields = fields.ok_or_else(|| {
        DecodeError::format(format!(
            "foreign key: {} must be specified",
            String::from_utf8_lossy(fields_key)
        ))
    })?;
    Ok(FkeyDef { space_id, fields })
}

fn decode_space_id(data: &mut &[u8]) -> Result<u32, DecodeError> {
    if wire::peek_type(data) != Some(WireType::Uint) {
        return Err(DecodeError::format("foreign key: space must be a number"));
    }
    u32::try_from(wire::decode_uint(data)?)
        .map_err(|_| DecodeError::format("foreign key: space ID is out of range"))
}

fn decode_field_ref(
    data: &mut &[u8],
    region: &mut Region,
    wrong_type: &'static str,
    what: &'static str,
) -> Result<FieldRef, DecodeError> {
    match wire::peek_type(data) {
        Some(WireType::Uint) => u32::try_from(wire::decode_uint(data)?)
            .map(FieldRef::Id)
            .map_err(|_| DecodeError::format("foreign key: field ID is out of range")),
        Some(WireType::Str) => {
            let name = wire::decode_str(data)?;
            if name.is_empty() {
                return Err(DecodeError::format("foreign key: field name must not be empty"));
            }
            region.alloc_str(name, what).map(FieldRef::Name)
        }
        _ => Err(DecodeError::format(wrong_type)),
    }
}

fn decode_field_mapping(
    data: &mut &[u8],
    region: &mut Region,
) -> Result<Box<[FieldPair]>, DecodeError> {
    if wire::peek_type(data) != Some(WireType::Map) {
        return Err(DecodeError::format(
            "foreign key: field_mapping is expected to be a map",
        ));
    }
    let count = wire::decode_map_header(data)?;
    if count == 0 {
        return Err(DecodeError::format(
            "foreign key: field_mapping must not be empty",
        ));
    }
    region.reserve(
        count as usize * size_of::<FieldPair>(),
        "foreign key field mapping",
    )?;
    let mut pairs = Vec::with_capacity((count as usize).min(data.len() / 2));
    for _ in 0..count {
        let local = decode_field_ref(
            data,
            region,
            "foreign key: local field must be number or string",
            "foreign key local field name",
        )?;
        let foreign = decode_field_ref(
            data,
            region,
            "foreign key: foreign field must be number or string",
            "foreign key foreign field name",
        )?;
        pairs.push(FieldPair { local, foreign });
    }
    Ok(pairs.into_boxed_slice())
}

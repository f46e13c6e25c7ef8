//! MessagePack primitives used by decoding, keys and tuples.
//!
//! Every function takes a cursor (`&mut &[u8]`) and advances it past the
//! consumed value.

use std::fmt;

use rmp::Marker;
use thiserror::Error;

/// Type of the next value in a MessagePack stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Nil,
    Bool,
    Uint,
    Int,
    Float,
    Str,
    Bin,
    Array,
    Map,
    Ext,
    Reserved,
}

impl WireType {
    fn of(marker: Marker) -> Self {
        match marker {
            Marker::Null => WireType::Nil,
            Marker::True | Marker::False => WireType::Bool,
            Marker::FixPos(_) | Marker::U8 | Marker::U16 | Marker::U32 | Marker::U64 => {
                WireType::Uint
            }
            Marker::FixNeg(_) | Marker::I8 | Marker::I16 | Marker::I32 | Marker::I64 => {
                WireType::Int
            }
            Marker::F32 | Marker::F64 => WireType::Float,
            Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => WireType::Str,
            Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => WireType::Bin,
            Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => WireType::Array,
            Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => WireType::Map,
            Marker::FixExt1
            | Marker::FixExt2
            | Marker::FixExt4
            | Marker::FixExt8
            | Marker::FixExt16
            | Marker::Ext8
            | Marker::Ext16
            | Marker::Ext32 => WireType::Ext,
            Marker::Reserved => WireType::Reserved,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Nil => "nil",
            WireType::Bool => "boolean",
            WireType::Uint => "unsigned",
            WireType::Int => "integer",
            WireType::Float => "number",
            WireType::Str => "string",
            WireType::Bin => "binary",
            WireType::Array => "array",
            WireType::Map => "map",
            WireType::Ext => "extension",
            WireType::Reserved => "reserved",
        };
        f.write_str(name)
    }
}

/// Binary format errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Data ends in the middle of a value
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// Value has a different type than expected
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: WireType,
        found: WireType,
    },

    /// Value is not valid MessagePack
    #[error("malformed data: {0}")]
    Malformed(String),
}

/// Returns the type of the next value without consuming it.
pub fn peek_type(data: &[u8]) -> Option<WireType> {
    data.first().map(|&byte| WireType::of(Marker::from_u8(byte)))
}

fn expect(data: &[u8], expected: WireType) -> Result<(), WireError> {
    match peek_type(data) {
        None => Err(WireError::UnexpectedEof),
        Some(found) if found != expected => Err(WireError::TypeMismatch { expected, found }),
        Some(_) => Ok(()),
    }
}

fn take<'a>(data: &mut &'a [u8], len: usize) -> Result<&'a [u8], WireError> {
    if data.len() < len {
        return Err(WireError::UnexpectedEof);
    }
    let (head, tail) = data.split_at(len);
    *data = tail;
    Ok(head)
}

fn take_be(data: &mut &[u8], width: usize) -> Result<u64, WireError> {
    Ok(take(data, width)?
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | byte as u64))
}

/// Decodes a map header and returns the number of key/value pairs.
pub fn decode_map_header(data: &mut &[u8]) -> Result<u32, WireError> {
    expect(data, WireType::Map)?;
    rmp::decode::read_map_len(data).map_err(|e| WireError::Malformed(e.to_string()))
}

/// Decodes an array header and returns the number of elements.
pub fn decode_array_header(data: &mut &[u8]) -> Result<u32, WireError> {
    expect(data, WireType::Array)?;
    rmp::decode::read_array_len(data).map_err(|e| WireError::Malformed(e.to_string()))
}

/// Decodes a string and returns its raw bytes.
pub fn decode_str<'a>(data: &mut &'a [u8]) -> Result<&'a [u8], WireError> {
    expect(data, WireType::Str)?;
    let len = rmp::decode::read_str_len(data).map_err(|e| WireError::Malformed(e.to_string()))?;
    take(data, len as usize)
}

/// Decodes a non-negative integer.
pub fn decode_uint(data: &mut &[u8]) -> Result<u64, WireError> {
    expect(data, WireType::Uint)?;
    rmp::decode::read_int::<u64, _>(data).map_err(|e| WireError::Malformed(e.to_string()))
}

/// Decodes a signed integer; non-negative encodings are accepted too.
pub fn decode_int(data: &mut &[u8]) -> Result<i64, WireError> {
    match peek_type(data) {
        None => Err(WireError::UnexpectedEof),
        Some(WireType::Uint) | Some(WireType::Int) => {
            rmp::decode::read_int::<i64, _>(data).map_err(|e| WireError::Malformed(e.to_string()))
        }
        Some(found) => Err(WireError::TypeMismatch {
            expected: WireType::Int,
            found,
        }),
    }
}

/// Decodes a boolean.
pub fn decode_bool(data: &mut &[u8]) -> Result<bool, WireError> {
    expect(data, WireType::Bool)?;
    rmp::decode::read_bool(data).map_err(|e| WireError::Malformed(e.to_string()))
}

/// Skips one complete value, including nested containers.
pub fn skip_value(data: &mut &[u8]) -> Result<(), WireError> {
    let mut pending: u64 = 1;
    while pending > 0 {
        pending -= 1;
        let marker = Marker::from_u8(take(data, 1)?[0]);
        let payload = match marker {
            Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => {
                0
            }
            Marker::U8 | Marker::I8 => 1,
            Marker::U16 | Marker::I16 => 2,
            Marker::U32 | Marker::I32 | Marker::F32 => 4,
            Marker::U64 | Marker::I64 | Marker::F64 => 8,
            Marker::FixStr(len) => len as u64,
            Marker::Str8 | Marker::Bin8 => take_be(data, 1)?,
            Marker::Str16 | Marker::Bin16 => take_be(data, 2)?,
            Marker::Str32 | Marker::Bin32 => take_be(data, 4)?,
            Marker::FixArray(len) => {
                pending += len as u64;
                0
            }
            Marker::Array16 => {
                pending += take_be(data, 2)?;
                0
            }
            Marker::Array32 => {
                pending += take_be(data, 4)?;
                0
            }
            Marker::FixMap(len) => {
                pending += 2 * len as u64;
                0
            }
            Marker::Map16 => {
                pending += 2 * take_be(data, 2)?;
                0
            }
            Marker::Map32 => {
                pending += 2 * take_be(data, 4)?;
                0
            }
            // Extension type byte followed by the payload.
            Marker::FixExt1 => 2,
            Marker::FixExt2 => 3,
            Marker::FixExt4 => 5,
            Marker::FixExt8 => 9,
            Marker::FixExt16 => 17,
            Marker::Ext8 => take_be(data, 1)? + 1,
            Marker::Ext16 => take_be(data, 2)? + 1,
            Marker::Ext32 => take_be(data, 4)? + 1,
            Marker::Reserved => {
                return Err(WireError::Malformed("reserved marker 0xc1".to_string()));
            }
        };
        let payload = usize::try_from(payload).map_err(|_| WireError::UnexpectedEof)?;
        take(data, payload)?;
    }
    Ok(())
}

/// Consumes one value and returns the bytes it occupied.
pub fn value_slice<'a>(data: &mut &'a [u8]) -> Result<&'a [u8], WireError> {
    let start = *data;
    skip_value(data)?;
    Ok(&start[..start.len() - data.len()])
}

/// Returns the encoded `field_no`-th element of an array, or `None` if the
/// array is shorter.
pub fn array_field(data: &[u8], field_no: u32) -> Result<Option<&[u8]>, WireError> {
    let mut cursor = data;
    let len = decode_array_header(&mut cursor)?;
    if field_no >= len {
        return Ok(None);
    }
    for _ in 0..field_no {
        skip_value(&mut cursor)?;
    }
    value_slice(&mut cursor).map(Some)
}

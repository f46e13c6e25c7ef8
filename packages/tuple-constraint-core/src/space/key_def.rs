//! Key definitions and key values.

use bytes::Bytes;

use crate::error::ConstraintError;
use crate::space::def::FieldType;
use crate::space::tuple::Tuple;
use crate::wire::{self, WireType};

/// Comparable scalar extracted from a key or a tuple field.
///
/// Integers are normalized: non-negative values are always `Unsigned`,
/// so a value compares equal whatever marker it was encoded with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Unsigned(u64),
    Integer(i64),
    String(Bytes),
    Boolean(bool),
}

/// Decoded key, one value per key part.
pub type Key = Vec<KeyValue>;

impl KeyValue {
    /// String value; the bytes are copied.
    pub fn string(value: &str) -> Self {
        KeyValue::String(Bytes::copy_from_slice(value.as_bytes()))
    }

    /// Appends the MessagePack encoding of the value to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), ConstraintError> {
        let result = match self {
            KeyValue::Unsigned(value) => rmp::encode::write_uint(buf, *value)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            KeyValue::Integer(value) => rmp::encode::write_sint(buf, *value)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            KeyValue::String(value) => rmp::encode::write_str_len(buf, value.len() as u32)
                .map(|_| buf.extend_from_slice(value))
                .map_err(|e| e.to_string()),
            KeyValue::Boolean(value) => {
                rmp::encode::write_bool(buf, *value).map_err(|e| e.to_string())
            }
        };
        result.map_err(ConstraintError::SerializationError)
    }

    /// Decodes one value and checks it against `field_type`. Returns `None`
    /// on a type mismatch.
    fn decode(data: &mut &[u8], field_type: FieldType) -> Result<Option<Self>, wire::WireError> {
        let value = match wire::peek_type(data) {
            Some(WireType::Uint) => KeyValue::Unsigned(wire::decode_uint(data)?),
            Some(WireType::Int) => match wire::decode_int(data)? {
                value if value >= 0 => KeyValue::Unsigned(value as u64),
                value => KeyValue::Integer(value),
            },
            Some(WireType::Str) => KeyValue::String(Bytes::copy_from_slice(wire::decode_str(data)?)),
            Some(WireType::Bool) => KeyValue::Boolean(wire::decode_bool(data)?),
            None => return Err(wire::WireError::UnexpectedEof),
            Some(_) => return Ok(None),
        };
        let matches = match field_type {
            FieldType::Any | FieldType::Scalar => true,
            FieldType::Unsigned => matches!(value, KeyValue::Unsigned(_)),
            FieldType::Integer => matches!(value, KeyValue::Unsigned(_) | KeyValue::Integer(_)),
            FieldType::String => matches!(value, KeyValue::String(_)),
            FieldType::Boolean => matches!(value, KeyValue::Boolean(_)),
        };
        Ok(matches.then_some(value))
    }
}

/// Whether the encoded value `data` is of `field_type`.
pub(crate) fn field_type_matches(data: &[u8], field_type: FieldType) -> bool {
    if field_type == FieldType::Any {
        return true;
    }
    let mut cursor = data;
    matches!(KeyValue::decode(&mut cursor, field_type), Ok(Some(_)))
}

/// Key part: a field number and the type the index expects there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPart {
    pub fieldno: u32,
    pub field_type: FieldType,
}

impl KeyPart {
    pub fn new(fieldno: u32, field_type: FieldType) -> Self {
        Self {
            fieldno,
            field_type,
        }
    }
}

/// Ordered list of key parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDef {
    parts: Vec<KeyPart>,
}

impl KeyDef {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    pub fn part_count(&self) -> u32 {
        self.parts.len() as u32
    }

    /// Validates `part_count` consecutive encoded values against the first
    /// key parts and returns them decoded. Without `allow_partial` the key
    /// must cover every part.
    pub fn validate_parts(
        &self,
        key: &[u8],
        part_count: u32,
        allow_partial: bool,
    ) -> Result<Key, ConstraintError> {
        if part_count > self.part_count() {
            return Err(ConstraintError::KeyValidation(format!(
                "Invalid key part count (expected [0..{}], got {})",
                self.part_count(),
                part_count
            )));
        }
        if !allow_partial && part_count < self.part_count() {
            return Err(ConstraintError::KeyValidation(format!(
                "Invalid key part count in an exact match (expected {}, got {})",
                self.part_count(),
                part_count
            )));
        }
        let mut cursor = key;
        self.parts[..part_count as usize]
            .iter()
            .enumerate()
            .map(|(i, part)| match KeyValue::decode(&mut cursor, part.field_type) {
                Ok(Some(value)) => Ok(value),
                Ok(None) => Err(ConstraintError::KeyValidation(format!(
                    "Supplied key type of part {} does not match index part type: expected {}",
                    i, part.field_type
                ))),
                Err(e) => Err(ConstraintError::KeyValidation(e.to_string())),
            })
            .collect()
    }

    /// Extracts the key of `tuple`.
    pub fn extract_key(&self, tuple: &Tuple) -> Result<Key, ConstraintError> {
        self.parts
            .iter()
            .map(|part| {
                let mut field = tuple.field(part.fieldno).ok_or_else(|| {
                    ConstraintError::TupleFormat(format!(
                        "Tuple field {} required by space format is missing",
                        part.fieldno + 1
                    ))
                })?;
                match KeyValue::decode(&mut field, part.field_type) {
                    Ok(Some(value)) => Ok(value),
                    _ => Err(ConstraintError::TupleFormat(format!(
                        "Tuple field {} type does not match one required by operation: expected {}",
                        part.fieldno + 1,
                        part.field_type
                    ))),
                }
            })
            .collect()
    }
}

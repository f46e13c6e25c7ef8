//! Tuples: MessagePack arrays with precomputed field offsets.

use std::ops::Range;

use bytes::Bytes;

use crate::error::ConstraintError;
use crate::space::key_def::KeyValue;
use crate::wire::{self, WireType};

/// Immutable tuple. Cloning is cheap, the data is shared.
#[derive(Debug, Clone)]
pub struct Tuple {
    data: Bytes,
    fields: Vec<Range<usize>>,
}

impl Tuple {
    /// Parses `data`, which must hold exactly one MessagePack array.
    pub fn new(data: impl Into<Bytes>) -> Result<Self, ConstraintError> {
        let data = data.into();
        let mut cursor = &data[..];
        let count = wire::decode_array_header(&mut cursor)
            .map_err(|e| ConstraintError::TupleFormat(format!("tuple must be an array: {}", e)))?;
        let mut fields = Vec::with_capacity((count as usize).min(cursor.len()));
        for _ in 0..count {
            let start = data.len() - cursor.len();
            wire::skip_value(&mut cursor)
                .map_err(|e| ConstraintError::TupleFormat(e.to_string()))?;
            fields.push(start..data.len() - cursor.len());
        }
        if !cursor.is_empty() {
            return Err(ConstraintError::TupleFormat(
                "junk after the end of the tuple".to_string(),
            ));
        }
        Ok(Self { data, fields })
    }

    /// Encodes `values` as a tuple.
    pub fn from_values(values: &[KeyValue]) -> Result<Self, ConstraintError> {
        let mut buf = Vec::new();
        rmp::encode::write_array_len(&mut buf, values.len() as u32)
            .map_err(|e| ConstraintError::SerializationError(e.to_string()))?;
        for value in values {
            value.encode(&mut buf)?;
        }
        Self::new(buf)
    }

    /// The whole encoded tuple.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn field_count(&self) -> u32 {
        self.fields.len() as u32
    }

    /// Encoded value of field `field_no`, if the tuple has it.
    pub fn field(&self, field_no: u32) -> Option<&[u8]> {
        self.fields
            .get(field_no as usize)
            .map(|range| &self.data[range.clone()])
    }

    /// Whether field `field_no` is absent or nil.
    pub fn field_is_null(&self, field_no: u32) -> bool {
        self.field(field_no)
            .map_or(true, |field| wire::peek_type(field) == Some(WireType::Nil))
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Tuple {}

//! Space, field and index definitions.

use std::fmt;

use crate::constraint_def::ConstraintDef;
use crate::space::key_def::{KeyDef, KeyPart};

/// Type of a tuple field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Any value, not checked
    Any,
    /// Non-negative integer
    Unsigned,
    /// Signed integer
    Integer,
    /// UTF-8 or binary string
    String,
    /// Boolean
    Boolean,
    /// Any of the above scalar types
    Scalar,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Any => "any",
            FieldType::Unsigned => "unsigned",
            FieldType::Integer => "integer",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Scalar => "scalar",
        };
        f.write_str(name)
    }
}

/// Field of a space format.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field name, unique within the space
    pub name: String,
    /// Declared type
    pub field_type: FieldType,
    /// Constraints checked against the value of this field
    pub constraints: Vec<ConstraintDef>,
}

impl FieldDef {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            constraints: Vec::new(),
        }
    }

    /// Attaches constraint definitions to the field.
    pub fn with_constraints(mut self, constraints: Vec<ConstraintDef>) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Index definition.
#[derive(Debug, Clone)]
pub struct IndexDef {
    pub name: String,
    pub is_unique: bool,
    pub key_def: KeyDef,
}

impl IndexDef {
    pub fn new(name: &str, is_unique: bool, parts: Vec<KeyPart>) -> Self {
        Self {
            name: name.to_string(),
            is_unique,
            key_def: KeyDef::new(parts),
        }
    }
}

/// Space definition. The first index is the primary one.
#[derive(Debug, Clone)]
pub struct SpaceDef {
    pub id: u32,
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub indexes: Vec<IndexDef>,
    /// Constraints checked against the whole tuple
    pub constraints: Vec<ConstraintDef>,
}

impl SpaceDef {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            fields: Vec::new(),
            indexes: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Appends a field to the format.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends an index.
    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Sets the tuple constraints.
    pub fn constraints(mut self, constraints: Vec<ConstraintDef>) -> Self {
        self.constraints = constraints;
        self
    }
}

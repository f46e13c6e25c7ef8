//! Constraint subsystem error types.

use thiserror::Error;

use crate::constraint_def::DecodeError;

/// Broad category of a failure, used by callers to pick a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed binary input; reject the request.
    Format,
    /// Transient arena exhausted; abort the enclosing operation.
    Allocation,
    /// Schema change refers to something that does not exist.
    Configuration,
    /// A tuple write violates a constraint.
    Validation,
    /// Storage collaborator failure.
    Storage,
}

/// Constraint and storage operation errors.
#[derive(Error, Debug, Clone)]
pub enum ConstraintError {
    /// Constraint definitions could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Foreign key constraint could not be created
    #[error("Failed to create foreign key constraint '{name}' in space '{space}': {message}")]
    CreateForeignKey {
        name: String,
        space: String,
        message: String,
    },

    /// Function constraint could not be created
    #[error("Failed to create constraint '{name}' in space '{space}': {message}")]
    CreateConstraint {
        name: String,
        space: String,
        message: String,
    },

    /// Foreign key check failed for a field of a tuple being written
    #[error("Foreign key constraint '{name}' failed for field '{field_path}': {message}")]
    FieldForeignKeyFailed {
        name: String,
        field_path: String,
        field_id: u32,
        message: &'static str,
    },

    /// Foreign key check failed for a tuple-level constraint
    #[error("Foreign key constraint '{name}' failed: {message}")]
    TupleForeignKeyFailed { name: String, message: &'static str },

    /// A referenced tuple cannot be removed
    #[error("Foreign key '{name}' integrity check failed: {message}")]
    ForeignKeyIntegrity { name: String, message: &'static str },

    /// Function constraint returned false for a field
    #[error("Check constraint '{name}' failed for field '{field_path}'")]
    FieldConstraintFailed {
        name: String,
        field_path: String,
        field_id: u32,
    },

    /// Function constraint returned false for a whole tuple
    #[error("Check constraint '{name}' failed for tuple")]
    TupleConstraintFailed { name: String },

    /// Space not found in the cache
    #[error("Space '{0}' does not exist")]
    NoSuchSpace(u32),

    /// Space already registered in the cache
    #[error("Space '{0}' already exists")]
    SpaceExists(u32),

    /// Space is referenced by a foreign key of another space
    #[error("Can't drop space '{space}': other objects depend on it")]
    SpacePinned { space: String },

    /// Function already registered
    #[error("Function '{0}' already exists")]
    FuncExists(u32),

    /// Space definition is inconsistent
    #[error("Invalid space '{space}': {message}")]
    InvalidSpace { space: String, message: String },

    /// Unique index already holds the key
    #[error("Duplicate key exists in unique index '{index}' in space '{space}'")]
    DuplicateKey { space: String, index: String },

    /// Key does not fit the key definition
    #[error("Invalid key: {0}")]
    KeyValidation(String),

    /// Tuple payload is malformed
    #[error("Invalid tuple: {0}")]
    TupleFormat(String),

    /// Index does not support the requested operation
    #[error("Index '{index}' does not support {operation}")]
    UnsupportedIndexOperation {
        index: String,
        operation: &'static str,
    },

    /// I/O error while reading configuration
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration could not be parsed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ConstraintError {
    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConstraintError::Decode(DecodeError::Format(_)) => ErrorKind::Format,
            ConstraintError::Decode(DecodeError::Alloc { .. }) => ErrorKind::Allocation,
            ConstraintError::CreateForeignKey { .. }
            | ConstraintError::CreateConstraint { .. }
            | ConstraintError::SerializationError(_) => ErrorKind::Configuration,
            ConstraintError::FieldForeignKeyFailed { .. }
            | ConstraintError::TupleForeignKeyFailed { .. }
            | ConstraintError::ForeignKeyIntegrity { .. }
            | ConstraintError::FieldConstraintFailed { .. }
            | ConstraintError::TupleConstraintFailed { .. } => ErrorKind::Validation,
            ConstraintError::NoSuchSpace(_)
            | ConstraintError::SpaceExists(_)
            | ConstraintError::SpacePinned { .. }
            | ConstraintError::FuncExists(_)
            | ConstraintError::InvalidSpace { .. }
            | ConstraintError::DuplicateKey { .. }
            | ConstraintError::KeyValidation(_)
            | ConstraintError::TupleFormat(_)
            | ConstraintError::UnsupportedIndexOperation { .. }
            | ConstraintError::IoError(_) => ErrorKind::Storage,
        }
    }

    /// Name of the constraint the error is about, if any.
    pub fn constraint_name(&self) -> Option<&str> {
        match self {
            ConstraintError::CreateForeignKey { name, .. }
            | ConstraintError::CreateConstraint { name, .. }
            | ConstraintError::FieldForeignKeyFailed { name, .. }
            | ConstraintError::TupleForeignKeyFailed { name, .. }
            | ConstraintError::ForeignKeyIntegrity { name, .. }
            | ConstraintError::FieldConstraintFailed { name, .. }
            | ConstraintError::TupleConstraintFailed { name } => Some(name),
            _ => None,
        }
    }

    /// Short machine-checkable reason of a validation failure.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            ConstraintError::FieldForeignKeyFailed { message, .. }
            | ConstraintError::TupleForeignKeyFailed { message, .. }
            | ConstraintError::ForeignKeyIntegrity { message, .. } => Some(*message),
            _ => None,
        }
    }
}

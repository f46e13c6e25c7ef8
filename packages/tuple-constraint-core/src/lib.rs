//! Tuple constraint subsystem.
//!
//! Provides constraint definitions (function checks and foreign keys), their
//! MessagePack decoding and collocation into single owned blocks, runtime
//! constraint objects bound to spaces, and foreign key resolution against a
//! catalog of spaces.

pub mod config;
pub mod constraint;
pub mod constraint_def;
pub mod data_bank;
pub mod error;
pub mod func;
pub mod murmur;
pub mod recovery;
pub mod region;
pub mod space;
pub mod wire;

pub use config::ConstraintConfig;
pub use constraint::{BindState, FkeyBinding, TupleConstraint};
pub use constraint_def::{ConstraintDef, ConstraintEntity, ConstraintKind, DecodeError};
pub use error::{ConstraintError, ErrorKind};
pub use recovery::RecoveryPhase;
pub use region::Region;
pub use space::{Space, SpaceCache};

//! Minimal in-memory storage the constraints are checked against: spaces,
//! hash indexes, tuples and the space catalog.

mod cache;
mod def;
mod index;
mod key_def;
#[allow(clippy::module_inception)]
mod space;
mod tuple;

pub use cache::{HolderKind, PinToken, SpaceCache, SpaceCacheHolder};
pub use def::{FieldDef, FieldType, IndexDef, SpaceDef};
pub use index::{Index, IteratorType};
pub use key_def::{Key, KeyDef, KeyPart, KeyValue};
pub use space::Space;
pub use tuple::Tuple;

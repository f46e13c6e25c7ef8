//! Catalog-independent constraint definitions.
//!
//! A definition is a name plus a kind-specific entity. Definitions are
//! decoded from MessagePack into a transient [`Region`](crate::region::Region)
//! and collocated into a single block before being attached to a schema
//! object. Strings are [`Bytes`] handles into the region or block they were
//! copied to.

mod collocate;
mod decode;

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::murmur::MurmurHasher32;

pub use collocate::{
    collocate, collocate_raw, BlockLayout, Collocated, RuntimeAlloc, RuntimeArea, RuntimeSlot,
};
pub use decode::{decode, decode_fkey, DecodeError};

/// Discriminant of a constraint entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    /// Check by a registered function
    Func = 0,
    /// Foreign key reference
    Fkey = 1,
}

/// Function constraint payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FuncDef {
    /// ID of the function
    pub id: u32,
}

/// Reference to a field either by number or by name.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FieldRef {
    Id(u32),
    Name(#[serde(serialize_with = "serialize_lossy")] Bytes),
}

impl FieldRef {
    /// Field reference by name; the name is copied.
    pub fn name(name: &str) -> Self {
        FieldRef::Name(Bytes::copy_from_slice(name.as_bytes()))
    }

    fn id_part(&self) -> u32 {
        match self {
            FieldRef::Id(id) => *id,
            FieldRef::Name(_) => 0,
        }
    }

    fn name_part(&self) -> &[u8] {
        match self {
            FieldRef::Id(_) => &[],
            FieldRef::Name(name) => name,
        }
    }

    fn for_each_str<'a>(&'a self, f: &mut impl FnMut(&'a [u8])) {
        if let FieldRef::Name(name) = self {
            f(name);
        }
    }

    fn map_strs(&self, f: &mut impl FnMut(&Bytes) -> Bytes) -> Self {
        match self {
            FieldRef::Id(id) => FieldRef::Id(*id),
            FieldRef::Name(name) => FieldRef::Name(f(name)),
        }
    }

    fn hash_process(&self, hasher: &mut MurmurHasher32) -> u32 {
        let name = self.name_part();
        hasher.process(&self.id_part().to_le_bytes());
        hasher.process(name);
        4 + name.len() as u32
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Id(id) => write!(f, "{}", id),
            FieldRef::Name(name) => f.write_str(&String::from_utf8_lossy(name)),
        }
    }
}

impl Ord for FieldRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id_part()
            .cmp(&other.id_part())
            .then_with(|| self.name_part().len().cmp(&other.name_part().len()))
            .then_with(|| self.name_part().cmp(other.name_part()))
    }
}

impl PartialOrd for FieldRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FieldRef {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldRef {}

/// A (local field, foreign field) pair of a composite foreign key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FieldPair {
    pub local: FieldRef,
    pub foreign: FieldRef,
}

/// Foreign fields of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FkeyFields {
    /// Foreign field referenced by the field the constraint is attached to
    #[serde(rename = "field")]
    Single(FieldRef),
    /// Explicit list of (local, foreign) pairs
    #[serde(rename = "field_mapping")]
    Mapping(Box<[FieldPair]>),
}

impl FkeyFields {
    /// Number of explicit pairs; zero for the single-field form.
    pub fn mapping_size(&self) -> u32 {
        match self {
            FkeyFields::Single(_) => 0,
            FkeyFields::Mapping(pairs) => pairs.len() as u32,
        }
    }
}

/// Foreign key constraint payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FkeyDef {
    /// ID of the foreign space
    pub space_id: u32,
    #[serde(flatten)]
    pub fields: FkeyFields,
}

impl FkeyDef {
    fn compare(&self, other: &Self) -> Ordering {
        self.space_id
            .cmp(&other.space_id)
            .then_with(|| {
                self.fields
                    .mapping_size()
                    .cmp(&other.fields.mapping_size())
            })
            .then_with(|| match (&self.fields, &other.fields) {
                (FkeyFields::Single(a), FkeyFields::Single(b)) => a.cmp(b),
                (FkeyFields::Mapping(a), FkeyFields::Mapping(b)) => a.iter().cmp(b.iter()),
                // Different mapping sizes were ordered above.
                (FkeyFields::Single(_), FkeyFields::Mapping(_)) => Ordering::Less,
                (FkeyFields::Mapping(_), FkeyFields::Single(_)) => Ordering::Greater,
            })
    }
}

/// Kind-specific part of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintEntity {
    Func(FuncDef),
    Fkey(FkeyDef),
}

impl ConstraintEntity {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            ConstraintEntity::Func(_) => ConstraintKind::Func,
            ConstraintEntity::Fkey(_) => ConstraintKind::Fkey,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ConstraintEntity::Func(a), ConstraintEntity::Func(b)) => a.id.cmp(&b.id),
            (ConstraintEntity::Fkey(a), ConstraintEntity::Fkey(b)) => a.compare(b),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

/// Generic constraint of a tuple or a tuple field.
#[derive(Debug, Clone, Serialize)]
pub struct ConstraintDef {
    #[serde(serialize_with = "serialize_lossy")]
    name: Bytes,
    #[serde(flatten)]
    entity: ConstraintEntity,
}

impl ConstraintDef {
    /// Builds a definition; the name is copied.
    pub fn new(name: &str, entity: ConstraintEntity) -> Self {
        Self {
            name: Bytes::copy_from_slice(name.as_bytes()),
            entity,
        }
    }

    pub(crate) fn from_parts(name: Bytes, entity: ConstraintEntity) -> Self {
        Self { name, entity }
    }

    /// Raw name bytes.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub(crate) fn name_bytes(&self) -> &Bytes {
        &self.name
    }

    /// Name for diagnostics.
    pub fn name_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn kind(&self) -> ConstraintKind {
        self.entity.kind()
    }

    pub fn entity(&self) -> &ConstraintEntity {
        &self.entity
    }

    pub fn as_func(&self) -> Option<&FuncDef> {
        match &self.entity {
            ConstraintEntity::Func(func) => Some(func),
            ConstraintEntity::Fkey(_) => None,
        }
    }

    pub fn as_fkey(&self) -> Option<&FkeyDef> {
        match &self.entity {
            ConstraintEntity::Fkey(fkey) => Some(fkey),
            ConstraintEntity::Func(_) => None,
        }
    }

    /// Orders definitions by name (unless `ignore_name`), kind and payload.
    /// Names order by length first, then bytewise.
    pub fn compare(&self, other: &Self, ignore_name: bool) -> Ordering {
        let by_name = if ignore_name {
            Ordering::Equal
        } else {
            self.name
                .len()
                .cmp(&other.name.len())
                .then_with(|| self.name.cmp(&other.name))
        };
        by_name.then_with(|| self.entity.compare(&other.entity))
    }

    /// Feeds name, kind and payload into `hasher`; returns the number of
    /// bytes processed. Consistent with `compare(.., false)`.
    pub fn hash_process(&self, hasher: &mut MurmurHasher32) -> u32 {
        hasher.process(&self.name);
        self.name.len() as u32 + self.hash_process_entity(hasher)
    }

    /// Same as [`Self::hash_process`] without the name. Consistent with
    /// `compare(.., true)`.
    pub fn hash_process_entity(&self, hasher: &mut MurmurHasher32) -> u32 {
        hasher.process(&(self.kind() as u32).to_le_bytes());
        let mut size = 4;
        match &self.entity {
            ConstraintEntity::Func(func) => {
                hasher.process(&func.id.to_le_bytes());
                size += 4;
            }
            ConstraintEntity::Fkey(fkey) => {
                hasher.process(&fkey.space_id.to_le_bytes());
                hasher.process(&fkey.fields.mapping_size().to_le_bytes());
                size += 8;
                match &fkey.fields {
                    FkeyFields::Single(field) => size += field.hash_process(hasher),
                    FkeyFields::Mapping(pairs) => {
                        for pair in pairs.iter() {
                            size += pair.local.hash_process(hasher);
                            size += pair.foreign.hash_process(hasher);
                        }
                    }
                }
            }
        }
        size
    }

    /// Visits every string of the definition in a fixed order.
    pub(crate) fn for_each_str<'a>(&'a self, mut f: impl FnMut(&'a [u8])) {
        f(&self.name);
        if let ConstraintEntity::Fkey(fkey) = &self.entity {
            match &fkey.fields {
                FkeyFields::Single(field) => field.for_each_str(&mut f),
                FkeyFields::Mapping(pairs) => {
                    for pair in pairs.iter() {
                        pair.local.for_each_str(&mut f);
                        pair.foreign.for_each_str(&mut f);
                    }
                }
            }
        }
    }

    /// Rebuilds the definition replacing every string, in the order of
    /// [`Self::for_each_str`].
    pub(crate) fn map_strs(&self, mut f: impl FnMut(&Bytes) -> Bytes) -> Self {
        let name = f(&self.name);
        let entity = match &self.entity {
            ConstraintEntity::Func(func) => ConstraintEntity::Func(*func),
            ConstraintEntity::Fkey(fkey) => {
                let fields = match &fkey.fields {
                    FkeyFields::Single(field) => FkeyFields::Single(field.map_strs(&mut f)),
                    FkeyFields::Mapping(pairs) => FkeyFields::Mapping(
                        pairs
                            .iter()
                            .map(|pair| FieldPair {
                                local: pair.local.map_strs(&mut f),
                                foreign: pair.foreign.map_strs(&mut f),
                            })
                            .collect(),
                    ),
                };
                ConstraintEntity::Fkey(FkeyDef {
                    space_id: fkey.space_id,
                    fields,
                })
            }
        };
        Self { name, entity }
    }
}

impl PartialEq for ConstraintDef {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other, false) == Ordering::Equal
    }
}

impl Eq for ConstraintDef {}

impl PartialOrd for ConstraintDef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConstraintDef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other, false)
    }
}

fn serialize_lossy<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

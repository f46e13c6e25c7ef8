//! Foreign key resolution and checks.
//!
//! A binding resolves its definition against two spaces: the local one,
//! owning the constraint, and the foreign one, found by ID in the catalog
//! and pinned there. Field numbers and index ordinals are resolved again
//! whenever the foreign space is replaced.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bytes::Bytes;

use super::{noop_check, noop_destroy, BindState, FieldInfo, TupleConstraint};
use crate::constraint_def::{FieldRef, FkeyDef, FkeyFields, RuntimeSlot};
use crate::error::ConstraintError;
use crate::recovery::RecoveryPhase;
use crate::space::{
    HolderKind, IteratorType, PinToken, Space, SpaceCache, SpaceCacheHolder, Tuple,
};
use crate::wire::{self, WireType};

/// Resolved (local, foreign) field numbers of one key pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FkeyFieldNo {
    pub local_field_no: Option<u32>,
    pub foreign_field_no: Option<u32>,
}

impl FkeyFieldNo {
    /// Bytes taken by one pair in a runtime slot.
    pub const ENCODED_SIZE: usize = 8;

    /// Reads a pair stored by [`Self::write`]. Zero means unresolved.
    fn read(bytes: &[u8]) -> Self {
        let word = |at: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[at..at + 4]);
            u32::from_le_bytes(raw).checked_sub(1)
        };
        Self {
            local_field_no: word(0),
            foreign_field_no: word(4),
        }
    }

    fn write(&self, bytes: &mut [u8]) {
        let encode = |field_no: Option<u32>| {
            field_no
                .and_then(|field_no| field_no.checked_add(1))
                .unwrap_or(0)
                .to_le_bytes()
        };
        bytes[..4].copy_from_slice(&encode(self.local_field_no));
        bytes[4..8].copy_from_slice(&encode(self.foreign_field_no));
    }
}

/// Index found by [`find_index_common`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMatch {
    /// Ordinal of the index in its space
    pub index: usize,
    /// For each key part, the position of its field in the searched list
    pub part_order: Vec<usize>,
}

/// Finds the first index of `space` whose key parts are exactly the fields
/// `field_nos`, in any order. With `unique_only`, non-unique indexes are
/// skipped.
pub fn find_index_common(space: &Space, field_nos: &[u32], unique_only: bool) -> Option<IndexMatch> {
    space
        .indexes()
        .iter()
        .enumerate()
        .find_map(|(index_no, index)| {
            let parts = index.key_def().parts();
            if parts.len() != field_nos.len() || (unique_only && !index.is_unique()) {
                return None;
            }
            if !field_nos
                .iter()
                .all(|field_no| parts.iter().any(|part| part.fieldno == *field_no))
            {
                return None;
            }
            let part_order = parts
                .iter()
                .map(|part| field_nos.iter().position(|field_no| *field_no == part.fieldno))
                .collect::<Option<Vec<_>>>()?;
            Some(IndexMatch {
                index: index_no,
                part_order,
            })
        })
}

fn resolve_field_no(space: &Space, field: &FieldRef) -> Option<u32> {
    match field {
        FieldRef::Id(id) => Some(*id),
        FieldRef::Name(name) => space.field_no_by_name(name),
    }
}

#[derive(Debug)]
struct FkeyState {
    local_index: Option<IndexMatch>,
    foreign_index: Option<IndexMatch>,
}

/// Runtime data of a foreign key constraint.
pub struct FkeyBinding {
    name: Bytes,
    def: FkeyDef,
    /// Space owning the constraint
    space: RefCell<Weak<Space>>,
    /// Space referred to, while pinned
    foreign: RefCell<Option<Rc<Space>>>,
    pin: Cell<Option<PinToken>>,
    /// Field number pairs, in the runtime area of the constraint block
    field_nos: RuntimeSlot,
    state: RefCell<FkeyState>,
}

impl FkeyBinding {
    /// Bytes reserved per foreign key in a collocated constraint block. One
    /// pair: composite keys are not resolved at runtime.
    pub const RUNTIME_SIZE: usize = FkeyFieldNo::ENCODED_SIZE;

    pub(super) fn new(name: Bytes, def: FkeyDef, field_nos: RuntimeSlot) -> Self {
        assert_eq!(
            field_nos.range().len(),
            Self::RUNTIME_SIZE,
            "foreign key runtime slot has a wrong size"
        );
        Self {
            name,
            def,
            space: RefCell::new(Weak::new()),
            foreign: RefCell::new(None),
            pin: Cell::new(None),
            field_nos,
            state: RefCell::new(FkeyState {
                local_index: None,
                foreign_index: None,
            }),
        }
    }

    fn field_no(&self) -> FkeyFieldNo {
        self.field_nos.read(FkeyFieldNo::read)
    }

    fn update_field_no(&self, f: impl FnOnce(&mut FkeyFieldNo)) {
        self.field_nos.write(|bytes| {
            let mut pair = FkeyFieldNo::read(bytes);
            f(&mut pair);
            pair.write(bytes);
        });
    }

    fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    pub fn def(&self) -> &FkeyDef {
        &self.def
    }

    pub fn field_count(&self) -> u32 {
        (self.field_nos.range().len() / FkeyFieldNo::ENCODED_SIZE) as u32
    }

    /// Slot of the field number pairs in the constraint block.
    pub fn runtime_slot(&self) -> &RuntimeSlot {
        &self.field_nos
    }

    /// Resolved field number pairs.
    pub fn pairs(&self) -> Vec<FkeyFieldNo> {
        vec![self.field_no()]
    }

    pub fn local_field_no(&self) -> Option<u32> {
        self.field_no().local_field_no
    }

    pub fn foreign_field_no(&self) -> Option<u32> {
        self.field_no().foreign_field_no
    }

    /// Ordinal of the local index over the local fields.
    pub fn local_index(&self) -> Option<usize> {
        self.state.borrow().local_index.as_ref().map(|found| found.index)
    }

    /// Ordinal of the unique foreign index over the foreign fields.
    pub fn foreign_index(&self) -> Option<usize> {
        self.state.borrow().foreign_index.as_ref().map(|found| found.index)
    }

    /// Part order of the foreign index relative to the key pairs.
    pub fn foreign_part_order(&self) -> Option<Vec<usize>> {
        self.state
            .borrow()
            .foreign_index
            .as_ref()
            .map(|found| found.part_order.clone())
    }

    pub fn foreign_space(&self) -> Option<Rc<Space>> {
        self.foreign.borrow().clone()
    }

    pub fn is_pinned(&self) -> bool {
        self.pin.get().is_some()
    }

    fn create_error(&self, space: &Space, message: String) -> ConstraintError {
        ConstraintError::CreateForeignKey {
            name: self.name_str(),
            space: space.name().to_string(),
            message,
        }
    }

    /// Resolves the local field and index.
    fn bind_local(&self, space: &Rc<Space>, field_no: Option<u32>) -> Result<(), ConstraintError> {
        let local_field_no = match (&self.def.fields, field_no) {
            (FkeyFields::Single(_), Some(field_no)) => field_no,
            (FkeyFields::Mapping(pairs), None) => {
                let pair = match &pairs[..] {
                    [pair] => pair,
                    [] => {
                        return Err(
                            self.create_error(space, "field_mapping must not be empty".to_string())
                        )
                    }
                    _ => {
                        return Err(self.create_error(
                            space,
                            "multi-field foreign keys are not supported yet".to_string(),
                        ))
                    }
                };
                resolve_field_no(space, &pair.local).ok_or_else(|| {
                    self.create_error(space, format!("local field '{}' was not found", pair.local))
                })?
            }
            (FkeyFields::Single(_), None) => {
                return Err(self.create_error(
                    space,
                    "a tuple foreign key must use field_mapping".to_string(),
                ))
            }
            (FkeyFields::Mapping(_), Some(_)) => {
                return Err(self.create_error(
                    space,
                    "field_mapping is allowed only in a tuple foreign key".to_string(),
                ))
            }
        };

        *self.space.borrow_mut() = Rc::downgrade(space);
        self.update_field_no(|pair| pair.local_field_no = Some(local_field_no));
        let mut state = self.state.borrow_mut();
        state.local_index = find_index_common(space, &[local_field_no], false);
        Ok(())
    }

    fn foreign_ref(&self) -> Option<&FieldRef> {
        match &self.def.fields {
            FkeyFields::Single(field) => Some(field),
            FkeyFields::Mapping(pairs) => pairs.first().map(|pair| &pair.foreign),
        }
    }

    /// Pins `foreign` and resolves the foreign side.
    fn attach(&self, foreign: Rc<Space>, token: PinToken) {
        *self.foreign.borrow_mut() = Some(foreign);
        self.pin.set(Some(token));
        self.update_foreign();
    }

    /// Resolves the foreign field number and the unique foreign index from
    /// scratch. Leaves the index unresolved if either is missing.
    fn update_foreign(&self) {
        let foreign = self.foreign.borrow();
        let Some(space) = foreign.as_ref() else {
            return;
        };
        let mut state = self.state.borrow_mut();
        state.foreign_index = None;
        let field_no = self
            .foreign_ref()
            .and_then(|field| resolve_field_no(space, field));
        self.update_field_no(|pair| pair.foreign_field_no = field_no);
        if let Some(field_no) = field_no {
            state.foreign_index = find_index_common(space, &[field_no], true);
        }
        if state.foreign_index.is_none() {
            tracing::warn!(
                "Foreign key '{}': no unique index over field '{}' in space '{}'",
                self.name_str(),
                self.foreign_ref().map(|field| field.to_string()).unwrap_or_default(),
                space.name()
            );
        }
    }

    /// Unpins the foreign space and forgets both spaces.
    fn release(&self, cache: &mut SpaceCache) {
        if let Some(token) = self.pin.take() {
            cache.unpin(token);
        }
        *self.foreign.borrow_mut() = None;
        *self.space.borrow_mut() = Weak::new();
    }

    /// Checks that a foreign tuple with key `key` exists. Returns the
    /// failure reason.
    fn check_key(&self, phase: RecoveryPhase, key: &[u8]) -> Result<(), &'static str> {
        if phase.skips_referential_checks() {
            return Ok(());
        }
        let state = self.state.borrow();
        let foreign = self.foreign.borrow();
        let index = state
            .foreign_index
            .as_ref()
            .and_then(|found| foreign.as_ref()?.index(found.index))
            .ok_or("foreign index was not found")?;
        let key = index
            .key_def()
            .validate_parts(key, self.field_count(), false)
            .map_err(|_| "wrong key type")?;
        match index.get(&key) {
            Err(_) => Err("index get failed"),
            Ok(None) => Err("foreign tuple was not found"),
            Ok(Some(_)) => Ok(()),
        }
    }

    /// Value of the local field in an encoded tuple, unless absent or nil.
    fn local_value<'a>(&self, tuple: &'a [u8]) -> Option<&'a [u8]> {
        let field_no = self.local_field_no()?;
        wire::array_field(tuple, field_no)
            .ok()
            .flatten()
            .filter(|value| wire::peek_type(value) != Some(WireType::Nil))
    }

    /// Checks that deleting `old_tuple` from the foreign space leaves no
    /// local tuple referring to it.
    pub fn check_delete(&self, old_tuple: &Tuple) -> Result<(), ConstraintError> {
        let fail = |message: &'static str| ConstraintError::ForeignKeyIntegrity {
            name: self.name_str(),
            message,
        };
        let state = self.state.borrow();
        let space = self.space.borrow().upgrade();
        let (Some(found), Some(space)) = (state.local_index.as_ref(), space) else {
            return Err(fail("index was not found"));
        };
        let Some(foreign_field_no) = self.foreign_field_no() else {
            return Err(fail("wrong foreign field name"));
        };
        let Some(key) = old_tuple.field(foreign_field_no) else {
            return Err(fail("field not found"));
        };
        let Some(index) = space.index(found.index) else {
            return Err(fail("index was not found"));
        };
        let key = index
            .key_def()
            .validate_parts(key, self.field_count(), false)
            .map_err(|_| fail("wrong key type"))?;
        if index.is_unique() {
            match index.get(&key) {
                Err(_) => Err(fail("index get failed")),
                Ok(Some(_)) => Err(fail("tuple is referenced")),
                Ok(None) => Ok(()),
            }
        } else {
            match index.count(IteratorType::Eq, &key) {
                Err(_) => Err(fail("index count failed")),
                Ok(0) => Ok(()),
                Ok(_) => Err(fail("tuple is referenced")),
            }
        }
    }
}

impl SpaceCacheHolder for FkeyBinding {
    fn on_space_replaced(&self, _old: &Rc<Space>, new: &Rc<Space>) {
        *self.foreign.borrow_mut() = Some(Rc::clone(new));
        self.update_foreign();
        tracing::debug!(
            "Foreign key '{}' re-resolved against space '{}'",
            self.name_str(),
            new.name()
        );
    }

    fn as_foreign_key(&self) -> Option<&FkeyBinding> {
        Some(self)
    }
}

impl fmt::Debug for FkeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FkeyBinding")
            .field("name", &self.name_str())
            .field("space_id", &self.def.space_id)
            .field("pinned", &self.is_pinned())
            .field("field_no", &self.field_no())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

fn fkey_check(
    constr: &TupleConstraint,
    phase: RecoveryPhase,
    data: &[u8],
    field: Option<FieldInfo<'_>>,
) -> Result<(), ConstraintError> {
    let Some(binding) = constr.fkey.as_deref() else {
        unreachable!("foreign key check on a constraint without a binding");
    };
    match field {
        Some(field) => {
            binding
                .check_key(phase, data)
                .map_err(|message| ConstraintError::FieldForeignKeyFailed {
                    name: constr.name().into_owned(),
                    field_path: field.path.to_string(),
                    field_id: field.id,
                    message,
                })
        }
        None => {
            let Some(key) = binding.local_value(data) else {
                return Ok(());
            };
            binding
                .check_key(phase, key)
                .map_err(|message| ConstraintError::TupleForeignKeyFailed {
                    name: constr.name().into_owned(),
                    message,
                })
        }
    }
}

fn fkey_unpin(constr: &mut TupleConstraint, cache: &mut SpaceCache) {
    if let Some(binding) = &constr.fkey {
        binding.release(cache);
    }
    constr.check = noop_check;
    constr.destroy = noop_destroy;
}

/// Binds a foreign key constraint: resolves the local side, then pins and
/// resolves the foreign space if it exists.
pub(super) fn init(
    constr: &mut TupleConstraint,
    cache: &mut SpaceCache,
    phase: RecoveryPhase,
    space: &Rc<Space>,
    field_no: Option<u32>,
) -> Result<(), ConstraintError> {
    let Some(binding) = constr.fkey.clone() else {
        unreachable!("foreign key constraint without a binding");
    };
    binding.bind_local(space, field_no)?;

    let foreign_id = binding.def.space_id;
    match cache.space_by_id(foreign_id) {
        Some(foreign) => {
            let weak = Rc::downgrade(&binding);
            let holder: Weak<dyn SpaceCacheHolder> = weak;
            let token = cache.pin(foreign_id, space.id(), holder, HolderKind::ForeignKey);
            binding.attach(foreign, token);
            constr.check = fkey_check;
            constr.destroy = fkey_unpin;
            constr.state = BindState::Bound;
            Ok(())
        }
        None if phase.allows_missing_objects() => {
            tracing::info!(
                "Foreign key '{}' of space '{}' waits for space {}",
                binding.name_str(),
                space.name(),
                foreign_id
            );
            constr.state = BindState::Pending;
            Ok(())
        }
        None => Err(binding.create_error(
            space,
            format!("foreign space '{}' was not found by id", foreign_id),
        )),
    }
}

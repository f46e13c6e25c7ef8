//! Constraint runtime objects.
//!
//! A [`TupleConstraint`] is a collocated definition plus the state needed to
//! check it against one space: a check function, a destructor and, for a
//! foreign key, an [`FkeyBinding`]. Until bound, a constraint accepts
//! everything.

mod fkey;

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::constraint_def::{
    collocate_raw, Collocated, ConstraintDef, ConstraintKind, RuntimeAlloc,
};
use crate::data_bank::DataBank;
use crate::error::ConstraintError;
use crate::func::Func;
use crate::murmur::MurmurHasher32;
use crate::recovery::RecoveryPhase;
use crate::space::{Space, SpaceCache};

pub use fkey::{find_index_common, FkeyBinding, FkeyFieldNo, IndexMatch};

/// Field a constraint is checked against.
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo<'a> {
    /// Field number
    pub id: u32,
    /// Field name for diagnostics
    pub path: &'a str,
}

/// Checks encoded data: a field value when `field` is set, the whole tuple
/// otherwise.
pub type CheckFn = fn(
    constr: &TupleConstraint,
    phase: RecoveryPhase,
    data: &[u8],
    field: Option<FieldInfo<'_>>,
) -> Result<(), ConstraintError>;

/// Releases whatever the constraint registered while binding.
pub type DestroyFn = fn(constr: &mut TupleConstraint, cache: &mut SpaceCache);

/// Binding state of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    /// Not initialized yet
    Unbound,
    /// Referenced object not loaded yet; retried when recovery finishes
    Pending,
    /// Referenced object found
    Bound,
    /// Destroyed
    Released,
}

fn noop_check(
    _constr: &TupleConstraint,
    _phase: RecoveryPhase,
    _data: &[u8],
    _field: Option<FieldInfo<'_>>,
) -> Result<(), ConstraintError> {
    Ok(())
}

fn noop_destroy(_constr: &mut TupleConstraint, _cache: &mut SpaceCache) {}

fn func_check(
    constr: &TupleConstraint,
    _phase: RecoveryPhase,
    data: &[u8],
    field: Option<FieldInfo<'_>>,
) -> Result<(), ConstraintError> {
    if constr.func.as_ref().map_or(true, |func| func.call(data)) {
        return Ok(());
    }
    let name = constr.name().into_owned();
    Err(match field {
        Some(field) => ConstraintError::FieldConstraintFailed {
            name,
            field_path: field.path.to_string(),
            field_id: field.id,
        },
        None => ConstraintError::TupleConstraintFailed { name },
    })
}

/// A constraint bound (or to be bound) to a space.
pub struct TupleConstraint {
    def: ConstraintDef,
    check: CheckFn,
    destroy: DestroyFn,
    fkey: Option<Rc<FkeyBinding>>,
    func: Option<Rc<Func>>,
    state: BindState,
}

impl TupleConstraint {
    fn new(def: ConstraintDef, runtime: &mut RuntimeAlloc<'_, '_>) -> Self {
        let fkey = def.as_fkey().map(|fkey| {
            Rc::new(FkeyBinding::new(
                def.name_bytes().clone(),
                fkey.clone(),
                runtime.alloc(FkeyBinding::RUNTIME_SIZE),
            ))
        });
        Self {
            def,
            check: noop_check,
            destroy: noop_destroy,
            fkey,
            func: None,
            state: BindState::Unbound,
        }
    }

    /// Collocates `defs` together with the runtime data of their foreign
    /// keys: each foreign key takes one field number pair of the block's
    /// extra area. Every constraint starts unbound. Returns `None` for an empty
    /// input.
    pub fn collocate(defs: &[ConstraintDef]) -> Option<Collocated<TupleConstraint>> {
        let mut bank = DataBank::new();
        for _ in defs.iter().filter(|def| def.kind() == ConstraintKind::Fkey) {
            bank.reserve_data(FkeyBinding::RUNTIME_SIZE);
        }
        collocate_raw(defs, bank.size(), TupleConstraint::new)
    }

    pub fn def(&self) -> &ConstraintDef {
        &self.def
    }

    pub fn name(&self) -> Cow<'_, str> {
        self.def.name_str()
    }

    pub fn state(&self) -> BindState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == BindState::Pending
    }

    /// Foreign key runtime data, for foreign key constraints.
    pub fn fkey(&self) -> Option<&FkeyBinding> {
        self.fkey.as_deref()
    }

    /// Bound check function, for function constraints.
    pub fn func(&self) -> Option<&Func> {
        self.func.as_deref()
    }

    /// See [`ConstraintDef::compare`].
    pub fn compare(&self, other: &Self, ignore_name: bool) -> Ordering {
        self.def.compare(&other.def, ignore_name)
    }

    /// See [`ConstraintDef::hash_process`].
    pub fn hash_process(&self, hasher: &mut MurmurHasher32) -> u32 {
        self.def.hash_process(hasher)
    }

    /// Binds the constraint to `space`. `field_no` is the field the
    /// constraint is attached to, `None` for a tuple constraint.
    ///
    /// A referenced function or space that does not exist is an error once
    /// final recovery has started; before that the constraint is left
    /// pending and accepts everything.
    pub fn init(
        &mut self,
        cache: &mut SpaceCache,
        phase: RecoveryPhase,
        space: &Rc<Space>,
        field_no: Option<u32>,
    ) -> Result<(), ConstraintError> {
        match self.def.as_func().map(|func| func.id) {
            Some(func_id) => self.init_func(cache, phase, space, func_id),
            None => fkey::init(self, cache, phase, space, field_no),
        }
    }

    fn init_func(
        &mut self,
        cache: &SpaceCache,
        phase: RecoveryPhase,
        space: &Space,
        func_id: u32,
    ) -> Result<(), ConstraintError> {
        match cache.funcs().get(func_id) {
            Some(func) => {
                self.func = Some(func);
                self.check = func_check;
                self.state = BindState::Bound;
                Ok(())
            }
            None if phase.allows_missing_objects() => {
                tracing::info!(
                    "Constraint '{}' of space '{}' waits for function {}",
                    self.name(),
                    space.name(),
                    func_id
                );
                self.state = BindState::Pending;
                Ok(())
            }
            None => Err(ConstraintError::CreateConstraint {
                name: self.name().into_owned(),
                space: space.name().to_string(),
                message: format!("function '{}' was not found by id", func_id),
            }),
        }
    }

    /// Retries binding a pending constraint; other states are left as is.
    pub fn resolve_pending(
        &mut self,
        cache: &mut SpaceCache,
        phase: RecoveryPhase,
        space: &Rc<Space>,
        field_no: Option<u32>,
    ) -> Result<(), ConstraintError> {
        if self.state != BindState::Pending {
            return Ok(());
        }
        self.init(cache, phase, space, field_no)
    }

    /// Checks `data`: the value of `field`, or the whole tuple when `field`
    /// is `None`.
    pub fn check(
        &self,
        phase: RecoveryPhase,
        data: &[u8],
        field: Option<FieldInfo<'_>>,
    ) -> Result<(), ConstraintError> {
        (self.check)(self, phase, data, field)
    }

    /// Releases the constraint. Further calls do nothing.
    pub fn destroy(&mut self, cache: &mut SpaceCache) {
        let destroy = self.destroy;
        destroy(self, cache);
        self.state = BindState::Released;
    }
}

impl fmt::Debug for TupleConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupleConstraint")
            .field("def", &self.def)
            .field("state", &self.state)
            .field("fkey", &self.fkey)
            .field("func", &self.func)
            .finish()
    }
}

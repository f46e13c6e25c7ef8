//! Space: format, indexes and constraints of one set of tuples.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;

use crate::constraint::{FieldInfo, TupleConstraint};
use crate::constraint_def::Collocated;
use crate::error::ConstraintError;
use crate::recovery::RecoveryPhase;
use crate::space::cache::SpaceCache;
use crate::space::def::SpaceDef;
use crate::space::index::Index;
use crate::space::key_def::{self, KeyValue};
use crate::space::tuple::Tuple;

/// Constraints of a space, one collocated block per field plus one for the
/// whole tuple.
#[derive(Debug, Default)]
struct SpaceConstraints {
    fields: Vec<Option<Collocated<TupleConstraint>>>,
    tuple: Option<Collocated<TupleConstraint>>,
}

impl SpaceConstraints {
    fn iter(&self) -> impl Iterator<Item = &TupleConstraint> {
        self.fields
            .iter()
            .flatten()
            .chain(self.tuple.iter())
            .flat_map(|block| block.iter())
    }

    /// Calls `f` with the field number (`None` for tuple constraints) and
    /// each constraint, stopping at the first error.
    fn try_for_each_mut(
        &mut self,
        mut f: impl FnMut(Option<u32>, &mut TupleConstraint) -> Result<(), ConstraintError>,
    ) -> Result<(), ConstraintError> {
        for (field_no, block) in self.fields.iter_mut().enumerate() {
            for constr in block.iter_mut().flat_map(|block| block.iter_mut()) {
                f(Some(field_no as u32), constr)?;
            }
        }
        for constr in self.tuple.iter_mut().flat_map(|block| block.iter_mut()) {
            f(None, constr)?;
        }
        Ok(())
    }
}

/// A space. Owned by the [`SpaceCache`] through `Rc`; constraints refer back
/// to it weakly.
#[derive(Debug)]
pub struct Space {
    def: SpaceDef,
    field_names: HashMap<Bytes, u32>,
    indexes: Vec<Index>,
    constraints: RefCell<SpaceConstraints>,
}

impl Space {
    /// Builds a space from its definition. Constraint definitions are
    /// collocated; they are bound when the space enters a [`SpaceCache`].
    pub fn new(def: SpaceDef) -> Result<Self, ConstraintError> {
        let invalid = |message: String| ConstraintError::InvalidSpace {
            space: def.name.clone(),
            message,
        };
        match def.indexes.first() {
            None => return Err(invalid("space must have a primary index".to_string())),
            Some(primary) if !primary.is_unique => {
                return Err(invalid(format!(
                    "primary index '{}' must be unique",
                    primary.name
                )))
            }
            Some(_) => {}
        }
        if let Some(index) = def.indexes.iter().find(|index| index.key_def.parts().is_empty()) {
            return Err(invalid(format!("index '{}' has no key parts", index.name)));
        }

        let mut field_names = HashMap::with_capacity(def.fields.len());
        for (field_no, field) in def.fields.iter().enumerate() {
            let name = Bytes::copy_from_slice(field.name.as_bytes());
            if field_names.insert(name, field_no as u32).is_some() {
                return Err(invalid(format!("duplicate field name '{}'", field.name)));
            }
        }

        let constraints = SpaceConstraints {
            fields: def
                .fields
                .iter()
                .map(|field| TupleConstraint::collocate(&field.constraints))
                .collect(),
            tuple: TupleConstraint::collocate(&def.constraints),
        };
        let indexes = def.indexes.iter().cloned().map(Index::new).collect();

        Ok(Self {
            def,
            field_names,
            indexes,
            constraints: RefCell::new(constraints),
        })
    }

    pub fn id(&self) -> u32 {
        self.def.id
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn def(&self) -> &SpaceDef {
        &self.def
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Index by ordinal.
    pub fn index(&self, index_no: usize) -> Option<&Index> {
        self.indexes.get(index_no)
    }

    pub fn primary(&self) -> &Index {
        &self.indexes[0]
    }

    /// Number of tuples in the space.
    pub fn len(&self) -> usize {
        self.primary().len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_empty()
    }

    /// Looks up a field of the format by name.
    pub fn field_no_by_name(&self, name: &[u8]) -> Option<u32> {
        self.field_names.get(name).copied()
    }

    /// Field name for diagnostics; `[N]` (1-based) for fields outside the
    /// format.
    pub fn field_path(&self, field_no: u32) -> String {
        match self.def.fields.get(field_no as usize) {
            Some(field) => field.name.clone(),
            None => format!("[{}]", field_no + 1),
        }
    }

    /// Looks up a tuple by primary key.
    pub fn get(&self, key: &[KeyValue]) -> Result<Option<Tuple>, ConstraintError> {
        self.primary().get(key)
    }

    /// Validates `tuple` against the format and every constraint, then
    /// stores it in all indexes.
    pub fn insert(&self, phase: RecoveryPhase, tuple: Tuple) -> Result<(), ConstraintError> {
        for (field_no, field) in self.def.fields.iter().enumerate() {
            let Some(data) = tuple.field(field_no as u32) else {
                continue;
            };
            if !tuple.field_is_null(field_no as u32)
                && !key_def::field_type_matches(data, field.field_type)
            {
                return Err(ConstraintError::TupleFormat(format!(
                    "Tuple field {} ({}) type does not match one required by operation: expected {}",
                    field_no + 1,
                    field.name,
                    field.field_type
                )));
            }
        }

        self.check_constraints(phase, &tuple)?;

        let keys = self
            .indexes
            .iter()
            .map(|index| index.key_def().extract_key(&tuple))
            .collect::<Result<Vec<_>, _>>()?;
        for (index, key) in self.indexes.iter().zip(&keys) {
            if index.is_unique() && index.contains(key) {
                return Err(ConstraintError::DuplicateKey {
                    space: self.def.name.clone(),
                    index: index.name().to_string(),
                });
            }
        }
        for (index, key) in self.indexes.iter().zip(keys) {
            index.insert(key, tuple.clone());
        }
        Ok(())
    }

    fn check_constraints(&self, phase: RecoveryPhase, tuple: &Tuple) -> Result<(), ConstraintError> {
        let constraints = self.constraints.borrow();
        for (field_no, block) in constraints.fields.iter().enumerate() {
            let field_no = field_no as u32;
            let Some(block) = block else {
                continue;
            };
            // Absent and nil fields are not checked.
            if tuple.field_is_null(field_no) {
                continue;
            }
            let Some(data) = tuple.field(field_no) else {
                continue;
            };
            let path = self.field_path(field_no);
            let field = FieldInfo {
                id: field_no,
                path: &path,
            };
            for constr in block.iter() {
                constr.check(phase, data, Some(field))?;
            }
        }
        if let Some(block) = &constraints.tuple {
            for constr in block.iter() {
                constr.check(phase, tuple.data(), None)?;
            }
        }
        Ok(())
    }

    /// Deletes the tuple with primary key `key`. Fails if a foreign key of
    /// any space still refers to it.
    pub fn delete(
        &self,
        cache: &SpaceCache,
        key: &[KeyValue],
    ) -> Result<Option<Tuple>, ConstraintError> {
        let Some(tuple) = self.primary().get(key)? else {
            return Ok(None);
        };
        for holder in cache.foreign_key_holders(self.id()) {
            if let Some(fkey) = holder.as_foreign_key() {
                fkey.check_delete(&tuple)?;
            }
        }
        for index in &self.indexes {
            let key = index.key_def().extract_key(&tuple)?;
            index.remove(&key, &tuple);
        }
        Ok(Some(tuple))
    }

    /// Runs `f` on the first constraint named `name`.
    pub fn with_constraint<R>(&self, name: &str, f: impl FnOnce(&TupleConstraint) -> R) -> Option<R> {
        let constraints = self.constraints.borrow();
        let found = constraints
            .iter()
            .find(|constr| constr.def().name() == name.as_bytes());
        found.map(f)
    }

    /// Number of constraints waiting for recovery to finish.
    pub fn pending_constraints(&self) -> usize {
        self.constraints
            .borrow()
            .iter()
            .filter(|constr| constr.is_pending())
            .count()
    }

    /// Binds every constraint of `space`.
    pub(crate) fn init_constraints(
        space: &Rc<Space>,
        cache: &mut SpaceCache,
        phase: RecoveryPhase,
    ) -> Result<(), ConstraintError> {
        space
            .constraints
            .borrow_mut()
            .try_for_each_mut(|field_no, constr| constr.init(cache, phase, space, field_no))
    }

    /// Retries constraints left pending during recovery.
    pub(crate) fn resolve_pending_constraints(
        space: &Rc<Space>,
        cache: &mut SpaceCache,
        phase: RecoveryPhase,
    ) -> Result<(), ConstraintError> {
        space
            .constraints
            .borrow_mut()
            .try_for_each_mut(|field_no, constr| {
                constr.resolve_pending(cache, phase, space, field_no)
            })
    }

    /// Releases every constraint, unpinning foreign spaces.
    pub(crate) fn destroy_constraints(&self, cache: &mut SpaceCache) {
        let mut constraints = self.constraints.borrow_mut();
        // Destroying never fails.
        let _ = constraints.try_for_each_mut(|_, constr| {
            constr.destroy(cache);
            Ok(())
        });
    }

    /// Loads every tuple of `other` without running constraint checks.
    pub(crate) fn copy_tuples_from(&self, other: &Space) -> Result<(), ConstraintError> {
        for tuple in other.primary().tuples() {
            for index in &self.indexes {
                let key = index.key_def().extract_key(&tuple)?;
                if index.is_unique() && index.contains(&key) {
                    return Err(ConstraintError::DuplicateKey {
                        space: self.def.name.clone(),
                        index: index.name().to_string(),
                    });
                }
                index.insert(key, tuple.clone());
            }
        }
        Ok(())
    }
}

//! In-memory hash index.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::ConstraintError;
use crate::space::def::IndexDef;
use crate::space::key_def::{Key, KeyDef, KeyValue};
use crate::space::tuple::Tuple;

/// Iteration mode of [`Index::count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorType {
    /// Tuples whose key starts with the given parts
    Eq,
    /// Every tuple
    All,
}

/// Hash index over the tuples of one space.
#[derive(Debug)]
pub struct Index {
    def: IndexDef,
    rows: RefCell<HashMap<Key, Vec<Tuple>>>,
}

impl Index {
    pub(crate) fn new(def: IndexDef) -> Self {
        Self {
            def,
            rows: RefCell::new(HashMap::new()),
        }
    }

    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn is_unique(&self) -> bool {
        self.def.is_unique
    }

    pub fn key_def(&self) -> &KeyDef {
        &self.def.key_def
    }

    /// Number of tuples in the index.
    pub fn len(&self) -> usize {
        self.rows.borrow().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.borrow().is_empty()
    }

    /// Looks up the tuple with exactly `key`. Only unique indexes support
    /// point lookups.
    pub fn get(&self, key: &[KeyValue]) -> Result<Option<Tuple>, ConstraintError> {
        if !self.def.is_unique {
            return Err(ConstraintError::UnsupportedIndexOperation {
                index: self.def.name.clone(),
                operation: "get on a non-unique index",
            });
        }
        let part_count = self.def.key_def.part_count() as usize;
        if key.len() != part_count {
            return Err(ConstraintError::KeyValidation(format!(
                "Invalid key part count in an exact match (expected {}, got {})",
                part_count,
                key.len()
            )));
        }
        Ok(self
            .rows
            .borrow()
            .get(key)
            .and_then(|tuples| tuples.first().cloned()))
    }

    /// Counts tuples matching `key` under `iterator`. A key shorter than the
    /// key definition matches by prefix.
    pub fn count(&self, iterator: IteratorType, key: &[KeyValue]) -> Result<usize, ConstraintError> {
        let part_count = self.def.key_def.part_count() as usize;
        if key.len() > part_count {
            return Err(ConstraintError::KeyValidation(format!(
                "Invalid key part count (expected [0..{}], got {})",
                part_count,
                key.len()
            )));
        }
        let rows = self.rows.borrow();
        let count = match iterator {
            IteratorType::All => rows.values().map(Vec::len).sum(),
            IteratorType::Eq if key.len() == part_count => rows.get(key).map_or(0, Vec::len),
            IteratorType::Eq => rows
                .iter()
                .filter(|(k, _)| k.starts_with(key))
                .map(|(_, tuples)| tuples.len())
                .sum(),
        };
        Ok(count)
    }

    /// Whether a tuple with exactly `key` is stored.
    pub(crate) fn contains(&self, key: &[KeyValue]) -> bool {
        self.rows.borrow().contains_key(key)
    }

    pub(crate) fn insert(&self, key: Key, tuple: Tuple) {
        self.rows.borrow_mut().entry(key).or_default().push(tuple);
    }

    pub(crate) fn remove(&self, key: &[KeyValue], tuple: &Tuple) {
        let mut rows = self.rows.borrow_mut();
        if let Some(tuples) = rows.get_mut(key) {
            tuples.retain(|t| t != tuple);
            if tuples.is_empty() {
                rows.remove(key);
            }
        }
    }

    /// Snapshot of every stored tuple.
    pub(crate) fn tuples(&self) -> Vec<Tuple> {
        self.rows.borrow().values().flatten().cloned().collect()
    }
}

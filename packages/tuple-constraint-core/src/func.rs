//! Registry of functions usable as check constraints.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::ConstraintError;

/// Check function. Receives the encoded field, or the whole tuple for a
/// tuple constraint, and returns whether the value is acceptable.
pub type CheckFunction = fn(data: &[u8]) -> bool;

/// Registered check function.
#[derive(Clone)]
pub struct Func {
    id: u32,
    name: String,
    body: CheckFunction,
}

impl Func {
    pub fn new(id: u32, name: &str, body: CheckFunction) -> Self {
        Self {
            id,
            name: name.to_string(),
            body,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the function on `data`.
    pub fn call(&self, data: &[u8]) -> bool {
        (self.body)(data)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Functions by ID.
#[derive(Debug, Default)]
pub struct FuncCache {
    funcs: HashMap<u32, Rc<Func>>,
}

impl FuncCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function under `id`.
    pub fn register(
        &mut self,
        id: u32,
        name: &str,
        body: CheckFunction,
    ) -> Result<(), ConstraintError> {
        if self.funcs.contains_key(&id) {
            return Err(ConstraintError::FuncExists(id));
        }
        self.funcs.insert(id, Rc::new(Func::new(id, name, body)));
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<Rc<Func>> {
        self.funcs.get(&id).cloned()
    }

    /// Unregisters a function. Constraints already bound to it keep their
    /// reference.
    pub fn remove(&mut self, id: u32) -> Option<Rc<Func>> {
        self.funcs.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

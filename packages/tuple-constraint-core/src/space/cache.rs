//! Catalog of spaces by ID, with a registry of pins.
//!
//! A pin is held by an object that depends on a space (a foreign key of
//! another space). Pinned spaces cannot be dropped, and every holder is
//! notified synchronously when its space is replaced.

use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::constraint::FkeyBinding;
use crate::error::ConstraintError;
use crate::func::FuncCache;
use crate::recovery::RecoveryPhase;
use crate::space::space::Space;

/// Object that pins a space.
pub trait SpaceCacheHolder {
    /// Called after the pinned space `old` was replaced by `new`.
    fn on_space_replaced(&self, old: &Rc<Space>, new: &Rc<Space>);

    /// The holder as a foreign key, if it is one.
    fn as_foreign_key(&self) -> Option<&FkeyBinding> {
        None
    }
}

/// What kind of object holds a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderKind {
    ForeignKey,
}

impl fmt::Display for HolderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HolderKind::ForeignKey => f.write_str("foreign key"),
        }
    }
}

/// Handle returned by [`SpaceCache::pin`], needed to unpin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinToken(u64);

struct PinSlot {
    token: PinToken,
    /// Space whose object holds the pin
    owner: u32,
    kind: HolderKind,
    holder: Weak<dyn SpaceCacheHolder>,
}

impl fmt::Debug for PinSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinSlot")
            .field("token", &self.token)
            .field("owner", &self.owner)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Space catalog.
#[derive(Debug, Default)]
pub struct SpaceCache {
    spaces: HashMap<u32, Rc<Space>>,
    /// Pins by pinned space ID
    pins: HashMap<u32, Vec<PinSlot>>,
    next_token: u64,
    funcs: FuncCache,
}

impl SpaceCache {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty catalog with the given function registry.
    pub fn with_funcs(funcs: FuncCache) -> Self {
        Self {
            funcs,
            ..Self::default()
        }
    }

    pub fn funcs(&self) -> &FuncCache {
        &self.funcs
    }

    pub fn funcs_mut(&mut self) -> &mut FuncCache {
        &mut self.funcs
    }

    pub fn space_by_id(&self, id: u32) -> Option<Rc<Space>> {
        self.spaces.get(&id).cloned()
    }

    /// Number of spaces.
    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Adds a new space and binds its constraints. On failure the catalog is
    /// left unchanged.
    pub fn insert(
        &mut self,
        space: Space,
        phase: RecoveryPhase,
    ) -> Result<Rc<Space>, ConstraintError> {
        let id = space.id();
        if self.spaces.contains_key(&id) {
            return Err(ConstraintError::SpaceExists(id));
        }
        let space = Rc::new(space);
        // Registered first so that a foreign key may refer to its own space.
        self.spaces.insert(id, Rc::clone(&space));
        if let Err(e) = Space::init_constraints(&space, self, phase) {
            space.destroy_constraints(self);
            self.spaces.remove(&id);
            return Err(e);
        }
        tracing::debug!("Space {} '{}' created", id, space.name());
        Ok(space)
    }

    /// Replaces a space with a new object of the same ID, moving its tuples
    /// over. Holders pinning the space are notified. Returns the old object.
    pub fn replace(
        &mut self,
        space: Space,
        phase: RecoveryPhase,
    ) -> Result<Rc<Space>, ConstraintError> {
        let id = space.id();
        let old = self
            .space_by_id(id)
            .ok_or(ConstraintError::NoSuchSpace(id))?;
        let new = Rc::new(space);
        new.copy_tuples_from(&old)?;

        self.spaces.insert(id, Rc::clone(&new));
        if let Err(e) = Space::init_constraints(&new, self, phase) {
            new.destroy_constraints(self);
            self.spaces.insert(id, Rc::clone(&old));
            return Err(e);
        }
        old.destroy_constraints(self);

        let holders: Vec<Rc<dyn SpaceCacheHolder>> = self
            .pins
            .get(&id)
            .map(|slots| slots.iter().filter_map(|slot| slot.holder.upgrade()).collect())
            .unwrap_or_default();
        tracing::debug!(
            "Space {} '{}' replaced, notifying {} holders",
            id,
            new.name(),
            holders.len()
        );
        for holder in holders {
            holder.on_space_replaced(&old, &new);
        }
        Ok(old)
    }

    /// Drops a space. Refused while another space pins it.
    pub fn delete(&mut self, id: u32) -> Result<Rc<Space>, ConstraintError> {
        let space = self
            .space_by_id(id)
            .ok_or(ConstraintError::NoSuchSpace(id))?;
        if let Some(kind) = self.pinned_by_others(id) {
            tracing::debug!("Space {} is pinned by a {}", id, kind);
            return Err(ConstraintError::SpacePinned {
                space: space.name().to_string(),
            });
        }
        space.destroy_constraints(self);
        self.spaces.remove(&id);
        tracing::debug!("Space {} '{}' dropped", id, space.name());
        Ok(space)
    }

    /// Registers `holder`, owned by space `owner`, as depending on space
    /// `space_id`.
    pub fn pin(
        &mut self,
        space_id: u32,
        owner: u32,
        holder: Weak<dyn SpaceCacheHolder>,
        kind: HolderKind,
    ) -> PinToken {
        let token = PinToken(self.next_token);
        self.next_token += 1;
        self.pins.entry(space_id).or_default().push(PinSlot {
            token,
            owner,
            kind,
            holder,
        });
        tracing::debug!("Space {} pinned by space {} ({})", space_id, owner, kind);
        token
    }

    /// Removes a pin.
    ///
    /// # Panics
    /// Panics if the token is not registered, i.e. on double unpin.
    pub fn unpin(&mut self, token: PinToken) {
        let found = self.pins.iter_mut().find_map(|(space_id, slots)| {
            slots
                .iter()
                .position(|slot| slot.token == token)
                .map(|pos| (*space_id, pos))
        });
        let (space_id, pos) = match found {
            Some(found) => found,
            None => panic!("unpin of unknown pin {:?}", token),
        };
        if let Some(slots) = self.pins.get_mut(&space_id) {
            slots.remove(pos);
            if slots.is_empty() {
                self.pins.remove(&space_id);
            }
        }
        tracing::debug!("Space {} unpinned", space_id);
    }

    /// Whether a space other than `space_id` itself pins it.
    pub fn is_pinned(&self, space_id: u32) -> bool {
        self.pinned_by_others(space_id).is_some()
    }

    /// Number of pins on a space, including its own.
    pub fn pin_count(&self, space_id: u32) -> usize {
        self.pins.get(&space_id).map_or(0, Vec::len)
    }

    fn pinned_by_others(&self, space_id: u32) -> Option<HolderKind> {
        self.pins
            .get(&space_id)?
            .iter()
            .find(|slot| slot.owner != space_id)
            .map(|slot| slot.kind)
    }

    /// Foreign keys referring to `space_id`.
    pub fn foreign_key_holders(&self, space_id: u32) -> Vec<Rc<dyn SpaceCacheHolder>> {
        self.pins
            .get(&space_id)
            .into_iter()
            .flatten()
            .filter(|slot| slot.kind == HolderKind::ForeignKey)
            .filter_map(|slot| slot.holder.upgrade())
            .collect()
    }

    /// Binds constraints left pending during recovery. Must be called once
    /// every space is loaded; a reference that still cannot be resolved is
    /// an error.
    pub fn finish_recovery(&mut self, phase: RecoveryPhase) -> Result<(), ConstraintError> {
        let mut spaces: Vec<Rc<Space>> = self.spaces.values().cloned().collect();
        spaces.sort_by_key(|space| space.id());
        let pending: usize = spaces.iter().map(|space| space.pending_constraints()).sum();
        tracing::info!("Resolving {} pending constraints", pending);
        for space in &spaces {
            Space::resolve_pending_constraints(space, self, phase)?;
        }
        Ok(())
    }
}

//! Entity registry: the arena every open entity lives in.
//!
//! Each entity is stored exactly once, indexed by its kind and canonical
//! path. Other entities refer to it through [`EntityId`] handles kept in
//! [`RefList`]s. A slot counts two kinds of holds:
//!
//! - caller holds, one per handle returned by an `open_*` call
//! - list holds, one per membership in an owning [`RefList`]
//!
//! Borrowed list memberships hold nothing. When both counts reach zero the
//! slot is released: its directory is dropped, one list hold is dropped on
//! every member of its owning lists, and its id is scrubbed from every
//! borrowed list. Owning edges never form a cycle, so release terminates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusty_sysfs_filesystem::SysfsError;
use tracing::{debug, trace};

use crate::entity::{EntityId, EntityKind, EntityType, RefList, SysfsEntity};

/// Allocation counters for one registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Entities inserted since the registry was created.
    pub opened: u64,
    /// Entities released since the registry was created.
    pub released: u64,
}

impl RegistryStats {
    /// Entities currently alive.
    pub fn live(&self) -> u64 {
        self.opened - self.released
    }
}

struct Slot {
    entity: Box<dyn SysfsEntity>,
    caller_holds: u32,
    list_holds: u32,
}

impl Slot {
    fn total_holds(&self) -> u32 {
        self.caller_holds + self.list_holds
    }
}

/// Owns every open entity and tracks who holds it.
pub struct Registry {
    /// Next handle to allocate.
    next_id: u64,
    /// All entities by handle.
    slots: HashMap<EntityId, Slot>,
    /// (kind, canonical path) to handle index.
    path_index: HashMap<(EntityKind, PathBuf), EntityId>,
    stats: RegistryStats,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            slots: HashMap::new(),
            path_index: HashMap::new(),
            stats: RegistryStats::default(),
        }
    }

    /// Allocate a new handle.
    fn allocate_id(&mut self) -> EntityId {
        let id: EntityId = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert a new entity with one caller hold.
    ///
    /// # Arguments
    /// * `entity` - Fully built entity
    ///
    /// # Returns
    /// The new handle.
    ///
    /// # Errors
    /// `InvalidArgument` if an entity of the same kind is already open at
    /// the same path.
    pub fn insert(&mut self, entity: Box<dyn SysfsEntity>) -> Result<EntityId, SysfsError> {
        let key: (EntityKind, PathBuf) = (entity.kind(), entity.path().to_path_buf());
        if self.path_index.contains_key(&key) {
            return Err(SysfsError::invalid(format!(
                "{} already open at {}",
                key.0,
                key.1.display()
            )));
        }

        let id: EntityId = self.allocate_id();
        trace!("insert {} {} as {}", key.0, key.1.display(), id);
        self.path_index.insert(key, id);
        self.slots.insert(
            id,
            Slot {
                entity,
                caller_holds: 1,
                list_holds: 0,
            },
        );
        self.stats.opened += 1;
        Ok(id)
    }

    /// Find an open entity by kind and canonical path.
    ///
    /// # Arguments
    /// * `kind` - Entity kind
    /// * `path` - Canonical absolute path
    ///
    /// # Returns
    /// The handle if an entity is open there.
    pub fn lookup(&self, kind: EntityKind, path: &Path) -> Option<EntityId> {
        self.path_index.get(&(kind, path.to_path_buf())).copied()
    }

    /// Check whether `id` refers to an open entity.
    pub fn contains(&self, id: EntityId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Get an entity by handle.
    pub fn get(&self, id: EntityId) -> Option<&dyn SysfsEntity> {
        self.slots.get(&id).map(|slot| slot.entity.as_ref())
    }

    /// Get an entity by handle, mutably.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut dyn SysfsEntity> {
        match self.slots.get_mut(&id) {
            Some(slot) => Some(slot.entity.as_mut()),
            None => None,
        }
    }

    /// Get an entity as a concrete type using downcasting.
    ///
    /// # Errors
    /// - `UnknownEntity` if `id` is not open
    /// - `WrongEntityKind` if the entity is not a `T`
    pub fn get_as<T: EntityType>(&self, id: EntityId) -> Result<&T, SysfsError> {
        let entity: &dyn SysfsEntity = self
            .get(id)
            .ok_or(SysfsError::UnknownEntity { id: id.raw() })?;
        entity
            .as_any()
            .downcast_ref::<T>()
            .ok_or(SysfsError::WrongEntityKind {
                id: id.raw(),
                expected: T::KIND.as_str(),
            })
    }

    /// Get an entity as a concrete type, mutably.
    ///
    /// # Errors
    /// Same as [`get_as`](Self::get_as).
    pub fn get_as_mut<T: EntityType>(&mut self, id: EntityId) -> Result<&mut T, SysfsError> {
        let entity: &mut dyn SysfsEntity = self
            .get_mut(id)
            .ok_or(SysfsError::UnknownEntity { id: id.raw() })?;
        entity
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(SysfsError::WrongEntityKind {
                id: id.raw(),
                expected: T::KIND.as_str(),
            })
    }

    /// Current (caller, list) hold counts of an entity.
    pub fn holds(&self, id: EntityId) -> Option<(u32, u32)> {
        self.slots
            .get(&id)
            .map(|slot| (slot.caller_holds, slot.list_holds))
    }

    /// Handles of every open entity of `kind`, in allocation order.
    pub fn ids_of_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.entity.kind() == kind)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Allocation counters.
    pub fn stats(&self) -> RegistryStats {
        self.stats
    }

    /// Number of open entities.
    pub fn live(&self) -> usize {
        self.slots.len()
    }

    /// Number of open entities of `kind`.
    pub fn live_of_kind(&self, kind: EntityKind) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.entity.kind() == kind)
            .count()
    }

    /// Add a caller hold to an open entity.
    ///
    /// # Errors
    /// `UnknownEntity` if `id` is not open.
    pub fn acquire(&mut self, id: EntityId) -> Result<(), SysfsError> {
        let slot: &mut Slot = self.slot_mut(id)?;
        slot.caller_holds += 1;
        Ok(())
    }

    /// Turn one caller hold on `id` into a list hold.
    ///
    /// Called when a freshly opened handle is stored in an owning list.
    ///
    /// # Errors
    /// - `UnknownEntity` if `id` is not open
    /// - `InvalidArgument` if `id` has no caller hold to transfer
    pub fn adopt(&mut self, id: EntityId) -> Result<(), SysfsError> {
        let slot: &mut Slot = self.slot_mut(id)?;
        if slot.caller_holds == 0 {
            return Err(SysfsError::invalid(format!(
                "entity {id} has no caller handle to adopt"
            )));
        }
        slot.caller_holds -= 1;
        slot.list_holds += 1;
        Ok(())
    }

    /// Drop one caller hold, releasing the entity if nothing else holds it.
    ///
    /// # Errors
    /// - `UnknownEntity` if `id` is not open
    /// - `InvalidArgument` if the caller holds no handle to `id`
    pub fn close(&mut self, id: EntityId) -> Result<(), SysfsError> {
        if self.drop_caller_hold(id)? == 0 {
            self.release_cascade(vec![id]);
        }
        Ok(())
    }

    /// Drop one caller hold without cascading into owning lists.
    ///
    /// If the entity is released, the members of its owning lists are
    /// detached and each membership becomes a caller hold. If the entity
    /// stays alive because something else holds it, nothing is detached.
    ///
    /// # Returns
    /// The detached members, now owned by the caller.
    ///
    /// # Errors
    /// Same as [`close`](Self::close).
    pub fn close_shallow(&mut self, id: EntityId) -> Result<Vec<EntityId>, SysfsError> {
        if self.drop_caller_hold(id)? > 0 {
            return Ok(Vec::new());
        }

        let mut detached: Vec<EntityId> = Vec::new();
        if let Some(slot) = self.slots.get_mut(&id) {
            for list in slot.entity.ref_lists_mut() {
                if list.is_owning() {
                    detached.extend(list.take());
                }
            }
        }
        for member in &detached {
            if let Some(slot) = self.slots.get_mut(member) {
                slot.list_holds -= 1;
                slot.caller_holds += 1;
            }
        }

        self.release_cascade(vec![id]);
        Ok(detached)
    }

    fn slot_mut(&mut self, id: EntityId) -> Result<&mut Slot, SysfsError> {
        self.slots
            .get_mut(&id)
            .ok_or(SysfsError::UnknownEntity { id: id.raw() })
    }

    /// Decrement the caller hold count, returning the remaining total.
    fn drop_caller_hold(&mut self, id: EntityId) -> Result<u32, SysfsError> {
        let slot: &mut Slot = self.slot_mut(id)?;
        if slot.caller_holds == 0 {
            return Err(SysfsError::invalid(format!(
                "entity {id} is not held by the caller"
            )));
        }
        slot.caller_holds -= 1;
        Ok(slot.total_holds())
    }

    /// Release every entity in `pending` and whatever becomes unheld as a result.
    fn release_cascade(&mut self, mut pending: Vec<EntityId>) {
        while let Some(id) = pending.pop() {
            let Some(mut slot) = self.slots.remove(&id) else {
                continue;
            };
            let kind: EntityKind = slot.entity.kind();
            self.path_index
                .remove(&(kind, slot.entity.path().to_path_buf()));
            self.scrub_borrowed(id);

            for list in slot.entity.ref_lists_mut() {
                if !list.is_owning() {
                    continue;
                }
                for member in list.take() {
                    if let Some(member_slot) = self.slots.get_mut(&member) {
                        member_slot.list_holds -= 1;
                        if member_slot.total_holds() == 0 {
                            pending.push(member);
                        }
                    }
                }
            }

            debug!("released {} {}", kind, slot.entity.path().display());
            self.stats.released += 1;
        }
    }

    /// Remove `id` from every borrowed list of every open entity.
    fn scrub_borrowed(&mut self, id: EntityId) {
        for slot in self.slots.values_mut() {
            for list in slot.entity.ref_lists_mut() {
                if !list.is_owning() {
                    list.remove(id);
                }
            }
        }
    }

    /// Append `member` to an owning list, transferring one caller hold.
    ///
    /// # Arguments
    /// * `list` - Owning list of an entity that is not yet inserted
    /// * `member` - Freshly opened handle
    pub(crate) fn adopt_into(
        &mut self,
        list: &mut RefList,
        member: EntityId,
    ) -> Result<(), SysfsError> {
        if !list.is_owning() {
            return Err(SysfsError::invalid("cannot adopt into a borrowed list"));
        }
        if list.push(member) {
            self.adopt(member)
        } else {
            // Already a member: the extra caller handle is not needed.
            self.close(member)
        }
    }
}

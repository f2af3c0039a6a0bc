//! Core entity types and traits.

use std::any::Any;
use std::fmt;
use std::path::Path;

use rusty_sysfs_filesystem::DirectoryNode;

/// Handle to an entity held by a [`Registry`](crate::Registry).
///
/// Handles are never reused within one registry, so a stale handle fails
/// lookups instead of aliasing a newer entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) u64);

impl EntityId {
    /// Raw handle value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A bus under `bus/`.
    Bus,
    /// A driver under `bus/<bus>/drivers/`.
    Driver,
    /// A device under `devices/`.
    Device,
    /// A class under `class/`.
    Class,
    /// One member of a class.
    ClassDevice,
    /// A block device under `block/`.
    BlockDevice,
}

impl EntityKind {
    /// Lowercase name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bus => "bus",
            Self::Driver => "driver",
            Self::Device => "device",
            Self::Class => "class",
            Self::ClassDevice => "class device",
            Self::BlockDevice => "block device",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether membership in a [`RefList`] keeps the member alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Each member holds one reference; releasing the owner drops it.
    Owning,
    /// Membership only; the member is kept alive elsewhere.
    Borrowed,
}

/// An ordered list of entity handles tagged with its ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefList {
    ownership: Ownership,
    ids: Vec<EntityId>,
}

impl RefList {
    /// Create an empty owning list.
    pub fn owning() -> Self {
        Self {
            ownership: Ownership::Owning,
            ids: Vec::new(),
        }
    }

    /// Create an empty borrowed list.
    pub fn borrowed() -> Self {
        Self {
            ownership: Ownership::Borrowed,
            ids: Vec::new(),
        }
    }

    /// Ownership tag of this list.
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Whether members are owned by this list.
    pub fn is_owning(&self) -> bool {
        self.ownership == Ownership::Owning
    }

    /// Members in insertion order.
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// First member, for single-slot lists.
    pub fn first(&self) -> Option<EntityId> {
        self.ids.first().copied()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the list has no members.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Check membership.
    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.contains(&id)
    }

    /// Append `id` unless it is already a member.
    ///
    /// # Returns
    /// `true` if the id was added.
    pub(crate) fn push(&mut self, id: EntityId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Remove `id` if present.
    pub(crate) fn remove(&mut self, id: EntityId) -> bool {
        let before: usize = self.ids.len();
        self.ids.retain(|member| *member != id);
        self.ids.len() != before
    }

    /// Remove and return every member.
    pub(crate) fn take(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.ids)
    }
}

/// Common trait for all entity types.
pub trait SysfsEntity: Send + fmt::Debug {
    /// Get the entity kind.
    fn kind(&self) -> EntityKind;

    /// Get the entity name.
    fn name(&self) -> &str;

    /// Get the canonical absolute path.
    fn path(&self) -> &Path;

    /// Get the entity's own directory.
    fn directory(&self) -> &DirectoryNode;

    /// Get the entity's own directory mutably.
    fn directory_mut(&mut self) -> &mut DirectoryNode;

    /// Get every reference list the entity carries.
    fn ref_lists(&self) -> Vec<&RefList>;

    /// Get every reference list the entity carries, mutably.
    fn ref_lists_mut(&mut self) -> Vec<&mut RefList>;

    /// Downcast to Any for type-safe downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Downcast to Any for type-safe mutable downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An entity type with a fixed kind, used for typed lookups.
pub trait EntityType: SysfsEntity + 'static {
    /// Kind shared by every value of this type.
    const KIND: EntityKind;
}

/// Implement [`SysfsEntity`] and [`EntityType`] for a struct with
/// `name`, `path` and `directory` fields and the listed reference lists.
macro_rules! impl_entity {
    ($ty:ty, $kind:expr, [$($list:ident),*]) => {
        impl $crate::entity::SysfsEntity for $ty {
            fn kind(&self) -> $crate::entity::EntityKind {
                $kind
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn path(&self) -> &std::path::Path {
                &self.path
            }

            fn directory(&self) -> &rusty_sysfs_filesystem::DirectoryNode {
                &self.directory
            }

            fn directory_mut(&mut self) -> &mut rusty_sysfs_filesystem::DirectoryNode {
                &mut self.directory
            }

            fn ref_lists(&self) -> Vec<&$crate::entity::RefList> {
                vec![$(&self.$list),*]
            }

            fn ref_lists_mut(&mut self) -> Vec<&mut $crate::entity::RefList> {
                vec![$(&mut self.$list),*]
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }

        impl $crate::entity::EntityType for $ty {
            const KIND: $crate::entity::EntityKind = $kind;
        }
    };
}

pub(crate) use impl_entity;

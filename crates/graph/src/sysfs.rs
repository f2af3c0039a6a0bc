//! The `Sysfs` session: resolved root, options and entity registry.

use std::path::{Path, PathBuf};

use rusty_sysfs_filesystem::{
    list_link_names, list_subdirectory_names, resolve_path_links, AttributeNode, MountResolver,
    SysfsError, SysfsOptions,
};
use tracing::{debug, info};

use crate::entity::{EntityId, EntityKind, EntityType, RefList, SysfsEntity};
use crate::registry::{Registry, RegistryStats};

/// Directory holding one subdirectory per bus.
pub const BUS_DIR: &str = "bus";
/// Directory holding one subdirectory per class.
pub const CLASS_DIR: &str = "class";
/// Root of the canonical device tree.
pub const DEVICES_DIR: &str = "devices";
/// Directory holding block devices.
pub const BLOCK_DIR: &str = "block";
/// Per-bus directory holding the bus's drivers.
pub const DRIVERS_DIR: &str = "drivers";

/// An open view of one sysfs tree.
///
/// Every entity opened through a session lives in the session's
/// [`Registry`]. Handles returned by `open_*` methods are owned by the
/// caller and must be given back through [`close`](Self::close) (or
/// [`close_shallow`](Self::close_shallow)). Handles read out of another
/// entity's lists are borrowed and must not be closed.
///
/// A session is single-threaded; wrap it in a lock to share it.
pub struct Sysfs {
    root: PathBuf,
    options: SysfsOptions,
    registry: Registry,
}

impl Sysfs {
    /// Open a session, resolving the root as described by `options`.
    ///
    /// # Errors
    /// Propagates [`MountResolver::resolve`] failures.
    pub fn open(options: SysfsOptions) -> Result<Self, SysfsError> {
        let root: PathBuf = MountResolver::resolve(&options)?;
        info!("using sysfs root {}", root.display());
        Ok(Self {
            root,
            options,
            registry: Registry::new(),
        })
    }

    /// Open a session over a fixed root directory with default options.
    ///
    /// # Arguments
    /// * `root` - Directory holding a sysfs tree
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self, SysfsError> {
        Self::open(SysfsOptions::fixed_root(root))
    }

    /// Sysfs root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Session options.
    pub fn options(&self) -> &SysfsOptions {
        &self.options
    }

    /// Entity registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Allocation counters of the registry.
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub(crate) fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// `<root>/bus/<name>`.
    pub fn bus_path(&self, name: &str) -> PathBuf {
        self.root.join(BUS_DIR).join(name)
    }

    /// `<root>/class/<name>`.
    pub fn class_path(&self, name: &str) -> PathBuf {
        self.root.join(CLASS_DIR).join(name)
    }

    /// `<root>/devices`.
    pub fn devices_root(&self) -> PathBuf {
        self.root.join(DEVICES_DIR)
    }

    /// `<root>/block/<name>`.
    pub fn block_path(&self, name: &str) -> PathBuf {
        self.root.join(BLOCK_DIR).join(name)
    }

    /// Give back a caller-owned handle.
    ///
    /// The entity is released once nothing else holds it, together with
    /// every entity reachable only through its owning lists.
    ///
    /// # Errors
    /// - `UnknownEntity` if `id` is not open
    /// - `InvalidArgument` if `id` is not caller-owned
    pub fn close(&mut self, id: EntityId) -> Result<(), SysfsError> {
        self.registry.close(id)
    }

    /// Give back a caller-owned handle without closing its owning lists.
    ///
    /// # Returns
    /// Entities detached from the released entity's owning lists. Each is
    /// now a caller-owned handle.
    ///
    /// # Errors
    /// Same as [`close`](Self::close).
    pub fn close_shallow(&mut self, id: EntityId) -> Result<Vec<EntityId>, SysfsError> {
        self.registry.close_shallow(id)
    }

    /// Get any open entity.
    ///
    /// # Errors
    /// `UnknownEntity` if `id` is not open.
    pub fn entity(&self, id: EntityId) -> Result<&dyn SysfsEntity, SysfsError> {
        self.registry
            .get(id)
            .ok_or(SysfsError::UnknownEntity { id: id.raw() })
    }

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut dyn SysfsEntity, SysfsError> {
        self.registry
            .get_mut(id)
            .ok_or(SysfsError::UnknownEntity { id: id.raw() })
    }

    /// Get an attribute of an entity, reading its value on first access.
    ///
    /// Store-only attributes are returned without a value.
    ///
    /// # Arguments
    /// * `id` - Any open entity
    /// * `name` - Attribute file name
    ///
    /// # Returns
    /// `None` if the entity's directory has no such attribute.
    ///
    /// # Errors
    /// `UnknownEntity`, or the read failure.
    pub fn attribute(
        &mut self,
        id: EntityId,
        name: &str,
    ) -> Result<Option<&AttributeNode>, SysfsError> {
        let entity: &mut dyn SysfsEntity = self.entity_mut(id)?;
        let Some(attribute) = entity.directory_mut().attribute_mut(name) else {
            return Ok(None);
        };
        if !attribute.is_loaded() && attribute.method().can_show() {
            attribute.read_value()?;
        }
        Ok(Some(&*attribute))
    }

    /// Write an attribute of an entity.
    ///
    /// # Errors
    /// - `NotFound` if the entity has no such attribute
    /// - `PermissionDenied` if the attribute is not writable
    /// - `Io` on write failure
    pub fn write_attribute(
        &mut self,
        id: EntityId,
        name: &str,
        data: &[u8],
    ) -> Result<(), SysfsError> {
        let entity: &mut dyn SysfsEntity = self.entity_mut(id)?;
        let missing: PathBuf = entity.path().join(name);
        let attribute: &mut AttributeNode = entity
            .directory_mut()
            .attribute_mut(name)
            .ok_or_else(|| SysfsError::not_found(missing))?;
        attribute.write_value(data)
    }

    /// Re-read every attribute value of an entity that was read before.
    pub fn refresh_attributes(&mut self, id: EntityId) -> Result<(), SysfsError> {
        self.entity_mut(id)?.directory_mut().refresh_attributes()
    }

    /// Read every readable attribute of an entity.
    ///
    /// # Returns
    /// Attributes that failed to read, with their errors.
    pub fn read_attributes(
        &mut self,
        id: EntityId,
    ) -> Result<Vec<(String, SysfsError)>, SysfsError> {
        Ok(self.entity_mut(id)?.directory_mut().read_attribute_values())
    }

    /// Read the immediate subdirectories of an entity and their attribute
    /// values.
    ///
    /// # Returns
    /// Attributes that failed to read, named `<subdir>/<attribute>`.
    ///
    /// # Errors
    /// `UnknownEntity`, or a subdirectory that cannot be listed.
    pub fn read_subdir_attributes(
        &mut self,
        id: EntityId,
    ) -> Result<Vec<(String, SysfsError)>, SysfsError> {
        let options: &SysfsOptions = &self.options;
        let entity: &mut dyn SysfsEntity = self
            .registry
            .get_mut(id)
            .ok_or(SysfsError::UnknownEntity { id: id.raw() })?;

        let mut failures: Vec<(String, SysfsError)> = Vec::new();
        for subdir in entity.directory_mut().subdirs_mut() {
            if !subdir.is_populated() {
                subdir.read(options)?;
            }
            let prefix: String = subdir.name().to_string();
            failures.extend(
                subdir
                    .read_attribute_values()
                    .into_iter()
                    .map(|(name, e)| (format!("{prefix}/{name}"), e)),
            );
        }
        Ok(failures)
    }

    /// Names of all buses.
    pub fn list_buses(&self) -> Result<Vec<String>, SysfsError> {
        list_subdirectory_names(&self.root.join(BUS_DIR))
    }

    /// Names of all classes.
    pub fn list_classes(&self) -> Result<Vec<String>, SysfsError> {
        list_subdirectory_names(&self.root.join(CLASS_DIR))
    }

    /// Names of the top-level directories of the device tree.
    pub fn list_root_devices(&self) -> Result<Vec<String>, SysfsError> {
        list_subdirectory_names(&self.devices_root())
    }

    /// Bus ids of the devices on `bus`.
    pub fn list_bus_devices(&self, bus: &str) -> Result<Vec<String>, SysfsError> {
        list_link_names(&self.bus_path(bus).join(DEVICES_DIR))
    }

    /// Names of the drivers on `bus`.
    pub fn list_bus_drivers(&self, bus: &str) -> Result<Vec<String>, SysfsError> {
        list_subdirectory_names(&self.bus_path(bus).join(DRIVERS_DIR))
    }

    /// Names of the members of `class`, whether links or directories.
    pub fn list_class_devices(&self, class: &str) -> Result<Vec<String>, SysfsError> {
        let path: PathBuf = self.class_path(class);
        let mut names: Vec<String> = list_subdirectory_names(&path)?;
        names.extend(list_link_names(&path)?);
        names.sort();
        Ok(names)
    }

    /// Canonical form of `path`: every link component below the root
    /// resolved, trailing slashes dropped.
    pub(crate) fn canonical(&self, path: &Path) -> Result<PathBuf, SysfsError> {
        resolve_path_links(&self.root, path)
    }

    /// Return an existing handle for (kind, path) with a new caller hold.
    pub(crate) fn reuse(
        &mut self,
        kind: EntityKind,
        path: &Path,
    ) -> Result<Option<EntityId>, SysfsError> {
        match self.registry.lookup(kind, path) {
            Some(id) => {
                self.registry.acquire(id)?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Open every path with `open`, giving back what was opened on failure.
    ///
    /// # Returns
    /// Caller-owned handles in the order of `paths`.
    pub(crate) fn open_each<F>(
        &mut self,
        paths: &[PathBuf],
        mut open: F,
    ) -> Result<Vec<EntityId>, SysfsError>
    where
        F: FnMut(&mut Self, &Path) -> Result<EntityId, SysfsError>,
    {
        let mut opened: Vec<EntityId> = Vec::with_capacity(paths.len());
        for path in paths {
            match open(self, path) {
                Ok(id) => opened.push(id),
                Err(e) => {
                    debug!("failed to open {}: {}", path.display(), e);
                    self.release_handles(&opened);
                    return Err(e);
                }
            }
        }
        Ok(opened)
    }

    /// Close caller-owned handles, logging failures.
    pub(crate) fn release_handles(&mut self, ids: &[EntityId]) {
        for id in ids.iter().rev() {
            if let Err(e) = self.registry.close(*id) {
                debug!("failed to close {}: {}", id, e);
            }
        }
    }

    /// Move caller-owned handles into a new owning list.
    pub(crate) fn adopt_all(&mut self, ids: Vec<EntityId>) -> Result<RefList, SysfsError> {
        let mut list: RefList = RefList::owning();
        for id in ids {
            self.registry.adopt_into(&mut list, id)?;
        }
        Ok(list)
    }

    /// Store a caller-owned `member` in an owning list of `owner`.
    pub(crate) fn attach_owned<T, F>(
        &mut self,
        owner: EntityId,
        member: EntityId,
        list: F,
    ) -> Result<(), SysfsError>
    where
        T: EntityType,
        F: FnOnce(&mut T) -> &mut RefList,
    {
        let owner: &mut T = self.registry.get_as_mut::<T>(owner)?;
        if list(owner).push(member) {
            self.registry.adopt(member)
        } else {
            self.registry.close(member)
        }
    }

    /// Record `member` in a borrowed list of `owner`.
    pub(crate) fn attach_borrowed<T, F>(
        &mut self,
        owner: EntityId,
        member: EntityId,
        list: F,
    ) -> Result<(), SysfsError>
    where
        T: EntityType,
        F: FnOnce(&mut T) -> &mut RefList,
    {
        let owner: &mut T = self.registry.get_as_mut::<T>(owner)?;
        list(owner).push(member);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_sysfs_filesystem::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_with_root_requires_directory() {
        let dir: TempDir = TempDir::new().unwrap();
        assert!(Sysfs::with_root(dir.path()).is_ok());
        let err: SysfsError = match Sysfs::with_root(dir.path().join("missing")) {
            Ok(_) => panic!("expected failure"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_subsystem_paths() {
        let dir: TempDir = TempDir::new().unwrap();
        let sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();
        assert_eq!(sysfs.bus_path("usb"), dir.path().join("bus/usb"));
        assert_eq!(sysfs.class_path("net"), dir.path().join("class/net"));
        assert_eq!(sysfs.devices_root(), dir.path().join("devices"));
        assert_eq!(sysfs.block_path("sda"), dir.path().join("block/sda"));
    }

    #[cfg(unix)]
    #[test]
    fn test_list_helpers() {
        let dir: TempDir = TempDir::new().unwrap();
        let root: &Path = dir.path();
        std::fs::create_dir_all(root.join("bus/usb/devices")).unwrap();
        std::fs::create_dir_all(root.join("bus/usb/drivers/usbhid")).unwrap();
        std::fs::create_dir_all(root.join("bus/pci/devices")).unwrap();
        std::fs::create_dir_all(root.join("devices/usb1/1-1")).unwrap();
        std::fs::create_dir_all(root.join("class/net")).unwrap();
        std::fs::create_dir_all(root.join("class/tty/ttyS0")).unwrap();
        std::os::unix::fs::symlink(
            "../../../devices/usb1/1-1",
            root.join("bus/usb/devices/1-1"),
        )
        .unwrap();
        std::os::unix::fs::symlink("../../devices/usb1", root.join("class/tty/console"))
            .unwrap();

        let sysfs: Sysfs = Sysfs::with_root(root).unwrap();
        assert_eq!(sysfs.list_buses().unwrap(), vec!["pci", "usb"]);
        assert_eq!(sysfs.list_classes().unwrap(), vec!["net", "tty"]);
        assert_eq!(sysfs.list_root_devices().unwrap(), vec!["usb1"]);
        assert_eq!(sysfs.list_bus_devices("usb").unwrap(), vec!["1-1"]);
        assert_eq!(sysfs.list_bus_drivers("usb").unwrap(), vec!["usbhid"]);
        assert_eq!(
            sysfs.list_class_devices("tty").unwrap(),
            vec!["console", "ttyS0"]
        );
        assert_eq!(
            sysfs.list_bus_devices("scsi").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_read_subdir_attributes() {
        let dir: TempDir = TempDir::new().unwrap();
        let sda: PathBuf = dir.path().join("block/sda");
        std::fs::create_dir_all(sda.join("queue")).unwrap();
        std::fs::write(sda.join("dev"), b"8:0\n").unwrap();
        std::fs::write(sda.join("queue/nr_requests"), b"128\n").unwrap();
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let id: EntityId = sysfs.open_block_device("sda").unwrap();
        let failures: Vec<(String, SysfsError)> = sysfs.read_subdir_attributes(id).unwrap();
        assert!(failures.is_empty());

        let queue = sysfs.entity(id).unwrap().directory().subdir("queue").unwrap();
        assert!(queue.is_populated());
        let value = queue.attribute("nr_requests").unwrap().text();
        assert_eq!(value.as_deref(), Some("128"));
        assert!(sysfs.read_subdir_attributes(EntityId(999)).is_err());
    }
}

//! Devices and device trees.
//!
//! A device is identified by its canonical path under `<root>/devices`.
//! Bus, driver and class views reach it through links, which are resolved
//! before the registry is consulted, so every view shares one entity.

use std::path::{Path, PathBuf};

use rusty_sysfs_filesystem::{
    path_is_dir, path_is_file, path_is_link, path_name, DirectoryNode, SysfsError,
};
use tracing::{debug, trace};

use crate::entity::{impl_entity, EntityId, EntityKind, RefList, SysfsEntity};
use crate::sysfs::{Sysfs, BUS_DIR, DEVICES_DIR};

/// A device in the canonical device tree.
#[derive(Debug)]
pub struct Device {
    name: String,
    path: PathBuf,
    bus: Option<String>,
    driver_name: Option<String>,
    driver_path: Option<PathBuf>,
    directory: DirectoryNode,
    /// Owning, at most one member.
    parent: RefList,
    /// Borrowed; each child owns its link to this device.
    children: RefList,
    /// Borrowed, at most one member; set while the bound driver is open.
    driver: RefList,
}

impl_entity!(Device, EntityKind::Device, [parent, children, driver]);

impl Device {
    /// Bus id: the device directory name (e.g. `1-1`, `0000:00:1d.0`).
    pub fn bus_id(&self) -> &str {
        &self.name
    }

    /// Name of the bus the device sits on, if known.
    pub fn bus(&self) -> Option<&str> {
        self.bus.as_deref()
    }

    /// Name of the bound driver, from the device's `driver` link.
    pub fn driver_name(&self) -> Option<&str> {
        self.driver_name.as_deref()
    }

    /// Canonical path of the bound driver.
    pub fn driver_path(&self) -> Option<&Path> {
        self.driver_path.as_deref()
    }

    /// Parent device, owned by this device.
    pub fn parent(&self) -> Option<EntityId> {
        self.parent.first()
    }

    /// Open child devices.
    pub fn children(&self) -> &[EntityId] {
        self.children.ids()
    }

    /// Bound driver, if it is currently open.
    pub fn linked_driver(&self) -> Option<EntityId> {
        self.driver.first()
    }

    pub(crate) fn set_bus_if_unknown(&mut self, bus: &str) {
        if self.bus.is_none() {
            self.bus = Some(bus.to_string());
        }
    }
}

/// A device together with every descendant device opened below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTree {
    /// Device the tree was opened at.
    pub root: EntityId,
    /// Descendants in depth-first order.
    pub members: Vec<EntityId>,
}

/// Whether the directory at `path` describes a device.
fn is_device_dir(path: &Path) -> bool {
    path_is_file(&path.join("uevent")) || path_is_link(&path.join("subsystem"))
}

impl Sysfs {
    /// Open the device at `path`.
    ///
    /// `path` may be the device directory or any link to it. Parent
    /// devices are opened up to the device tree root and held by the
    /// device. The bound driver is recorded from the `driver` link and
    /// linked if that driver is already open.
    ///
    /// # Returns
    /// A caller-owned handle.
    ///
    /// # Errors
    /// - `NotFound` if the device directory does not exist
    /// - `Io` if the device directory cannot be listed
    pub fn open_device(&mut self, path: &Path) -> Result<EntityId, SysfsError> {
        let path: PathBuf = self.canonical(path)?;
        if let Some(id) = self.reuse(EntityKind::Device, &path)? {
            return Ok(id);
        }

        let mut directory: DirectoryNode = DirectoryNode::open(&path)?;
        directory.read(self.options())?;

        let bus_root: PathBuf = self.root().join(BUS_DIR);
        let bus: Option<String> = ["subsystem", "bus"]
            .iter()
            .filter_map(|name| directory.link(name))
            .find(|link| link.target().parent() == Some(bus_root.as_path()))
            .and_then(|link| path_name(link.target()).ok());
        let driver_path: Option<PathBuf> =
            directory.link("driver").map(|l| l.target().to_path_buf());
        let driver_name: Option<String> = match &driver_path {
            Some(p) => Some(path_name(p)?),
            None => None,
        };

        let parent_ids: Vec<EntityId> = match self.parent_device_path(&path) {
            Some(parent_path) => vec![self.open_device(&parent_path)?],
            None => Vec::new(),
        };
        let parent: RefList = self.adopt_all(parent_ids)?;
        let parent_id: Option<EntityId> = parent.first();

        let device: Device = Device {
            name: path_name(&path)?,
            path,
            bus,
            driver_name,
            driver_path: driver_path.clone(),
            directory,
            parent,
            children: RefList::borrowed(),
            driver: RefList::borrowed(),
        };
        trace!("opened device {}", device.path.display());
        let id: EntityId = self.registry_mut().insert(Box::new(device))?;

        if let Some(parent_id) = parent_id {
            self.attach_borrowed(parent_id, id, |d: &mut Device| &mut d.children)?;
        }
        if let Some(driver_path) = driver_path {
            if let Some(driver) = self.registry().lookup(EntityKind::Driver, &driver_path) {
                self.attach_borrowed(id, driver, |d: &mut Device| &mut d.driver)?;
            }
        }
        Ok(id)
    }

    /// Open a device by bus id through `<root>/bus/<bus>/devices/<bus_id>`.
    ///
    /// # Errors
    /// `NotFound` if the bus has no such device; otherwise as
    /// [`open_device`](Self::open_device).
    pub fn open_device_by_id(&mut self, bus_id: &str, bus: &str) -> Result<EntityId, SysfsError> {
        let path: PathBuf = self.bus_path(bus).join(DEVICES_DIR).join(bus_id);
        if !path_is_link(&path) && !path_is_dir(&path) {
            return Err(SysfsError::not_found(path));
        }
        self.open_device(&path)
    }

    /// Open a device by bus id, searching every bus for it.
    ///
    /// # Errors
    /// `NotFound` if no bus lists the device.
    pub fn open_device_by_name(&mut self, bus_id: &str) -> Result<EntityId, SysfsError> {
        match self.find_device_bus(bus_id)? {
            Some(bus) => self.open_device_by_id(bus_id, &bus),
            None => Err(SysfsError::not_found(self.devices_root().join(bus_id))),
        }
    }

    /// Get an open device.
    ///
    /// # Errors
    /// `UnknownEntity` or `WrongEntityKind`.
    pub fn device(&self, id: EntityId) -> Result<&Device, SysfsError> {
        self.registry().get_as::<Device>(id)
    }

    /// Parent of a device. The handle is borrowed from the device.
    pub fn device_parent(&self, id: EntityId) -> Result<Option<EntityId>, SysfsError> {
        Ok(self.device(id)?.parent())
    }

    /// Open children of a device. The handles are borrowed.
    pub fn device_children(&self, id: EntityId) -> Result<Vec<EntityId>, SysfsError> {
        Ok(self.device(id)?.children().to_vec())
    }

    /// Open the driver bound to a device.
    ///
    /// If the driver is already open it is shared; otherwise it is opened
    /// from the device's `driver` link and linked to the device.
    ///
    /// # Returns
    /// A caller-owned driver handle, or `None` if no driver is bound or the
    /// `driver` link leads nowhere.
    pub fn device_driver(&mut self, id: EntityId) -> Result<Option<EntityId>, SysfsError> {
        let device: &Device = self.device(id)?;
        if let Some(driver) = device.linked_driver() {
            self.registry_mut().acquire(driver)?;
            return Ok(Some(driver));
        }
        let Some(driver_path) = device.driver_path.clone() else {
            return Ok(None);
        };
        if !path_is_dir(&driver_path) {
            debug!("driver {} of {} is missing", driver_path.display(), id);
            return Ok(None);
        }
        self.open_driver(&driver_path).map(Some)
    }

    /// Open a device and every device below it.
    ///
    /// A subdirectory is a device when it carries a `uevent` attribute or
    /// a `subsystem` link. Descent stops at subdirectories that are not
    /// devices.
    ///
    /// # Errors
    /// The first failure; everything opened so far is closed.
    pub fn open_device_tree(&mut self, path: &Path) -> Result<DeviceTree, SysfsError> {
        let root: EntityId = self.open_device(path)?;
        let mut members: Vec<EntityId> = Vec::new();
        if let Err(e) = self.open_descendants(root, &mut members) {
            self.release_handles(&members);
            self.release_handles(&[root]);
            return Err(e);
        }
        debug!(
            "opened device tree at {} with {} descendants",
            self.device(root)?.path().display(),
            members.len()
        );
        Ok(DeviceTree { root, members })
    }

    fn open_descendants(
        &mut self,
        id: EntityId,
        members: &mut Vec<EntityId>,
    ) -> Result<(), SysfsError> {
        let subdirs: Vec<PathBuf> = self
            .device(id)?
            .directory()
            .subdirs()
            .iter()
            .map(|d| d.path().to_path_buf())
            .filter(|p| is_device_dir(p))
            .collect();

        for subdir in subdirs {
            let child: EntityId = self.open_device(&subdir)?;
            members.push(child);
            self.open_descendants(child, members)?;
        }
        Ok(())
    }

    /// Close every handle of a device tree, deepest first.
    ///
    /// # Errors
    /// The first close failure; the remaining handles are still closed.
    pub fn close_device_tree(&mut self, tree: DeviceTree) -> Result<(), SysfsError> {
        let mut first_error: Option<SysfsError> = None;
        for id in tree.members.iter().rev().chain(std::iter::once(&tree.root)) {
            if let Err(e) = self.close(*id) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Parent directory of a device, if it lies inside the device tree.
    fn parent_device_path(&self, path: &Path) -> Option<PathBuf> {
        let devices_root: PathBuf = self.devices_root();
        let parent: &Path = path.parent()?;
        if parent != devices_root && parent.starts_with(&devices_root) {
            Some(parent.to_path_buf())
        } else {
            None
        }
    }

    /// Link every open device bound to the driver at `driver_path`.
    pub(crate) fn link_driver_devices(
        &mut self,
        driver: EntityId,
        driver_path: &Path,
    ) -> Result<(), SysfsError> {
        let bound: Vec<EntityId> = self
            .registry()
            .ids_of_kind(EntityKind::Device)
            .into_iter()
            .filter(|id| {
                self.device(*id)
                    .map(|d| d.driver_path() == Some(driver_path))
                    .unwrap_or(false)
            })
            .collect();
        for device in bound {
            self.attach_borrowed(device, driver, |d: &mut Device| &mut d.driver)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_sysfs_filesystem::ErrorKind;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn make_device(root: &Path, rel: &str) -> PathBuf {
        let path: PathBuf = root.join(rel);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("uevent"), b"").unwrap();
        path
    }

    #[test]
    fn test_open_device_opens_parent_chain() {
        let dir: TempDir = TempDir::new().unwrap();
        make_device(dir.path(), "devices/pci0000:00/0000:00:1d.0/usb2");
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let usb2: EntityId = sysfs
            .open_device(&dir.path().join("devices/pci0000:00/0000:00:1d.0/usb2"))
            .unwrap();
        let pci: EntityId = sysfs.device_parent(usb2).unwrap().unwrap();
        let host: EntityId = sysfs.device_parent(pci).unwrap().unwrap();

        assert_eq!(sysfs.device(pci).unwrap().bus_id(), "0000:00:1d.0");
        assert_eq!(sysfs.device(host).unwrap().bus_id(), "pci0000:00");
        assert_eq!(sysfs.device_parent(host).unwrap(), None);
        assert_eq!(sysfs.device_children(pci).unwrap(), vec![usb2]);
        assert_eq!(sysfs.registry().live_of_kind(EntityKind::Device), 3);

        sysfs.close(usb2).unwrap();
        assert_eq!(sysfs.registry().live(), 0);
    }

    #[test]
    fn test_open_device_through_link_shares_entity() {
        let dir: TempDir = TempDir::new().unwrap();
        make_device(dir.path(), "devices/usb1/1-1");
        std::fs::create_dir_all(dir.path().join("bus/usb/devices")).unwrap();
        symlink(
            "../../../devices/usb1/1-1",
            dir.path().join("bus/usb/devices/1-1"),
        )
        .unwrap();
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let direct: EntityId = sysfs
            .open_device(&dir.path().join("devices/usb1/1-1/"))
            .unwrap();
        let by_id: EntityId = sysfs.open_device_by_id("1-1", "usb").unwrap();
        assert_eq!(direct, by_id);
        assert_eq!(sysfs.registry().holds(direct), Some((2, 0)));

        sysfs.close(direct).unwrap();
        sysfs.close(by_id).unwrap();
        assert_eq!(sysfs.registry().live(), 0);
    }

    #[test]
    fn test_open_missing_device() {
        let dir: TempDir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("devices")).unwrap();
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let err: SysfsError = sysfs
            .open_device(&dir.path().join("devices/nope"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err: SysfsError = sysfs.open_device_by_id("1-1", "usb").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(sysfs.stats().opened, 0);
    }

    #[test]
    fn test_device_bus_from_subsystem_link() {
        let dir: TempDir = TempDir::new().unwrap();
        let dev: PathBuf = make_device(dir.path(), "devices/platform/serial8250");
        std::fs::create_dir_all(dir.path().join("bus/platform")).unwrap();
        symlink("../../../bus/platform", dev.join("subsystem")).unwrap();
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let id: EntityId = sysfs.open_device(&dev).unwrap();
        assert_eq!(sysfs.device(id).unwrap().bus(), Some("platform"));
        assert_eq!(sysfs.device(id).unwrap().driver_name(), None);
        assert_eq!(sysfs.device_driver(id).unwrap(), None);
    }

    #[test]
    fn test_device_tree_round_trip() {
        let dir: TempDir = TempDir::new().unwrap();
        make_device(dir.path(), "devices/pci0000:00");
        make_device(dir.path(), "devices/pci0000:00/0000:00:1d.0");
        make_device(dir.path(), "devices/pci0000:00/0000:00:1d.0/usb2");
        make_device(dir.path(), "devices/pci0000:00/0000:00:1f.2");
        std::fs::create_dir_all(dir.path().join("devices/pci0000:00/power")).unwrap();
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let tree: DeviceTree = sysfs
            .open_device_tree(&dir.path().join("devices/pci0000:00"))
            .unwrap();
        assert_eq!(tree.members.len(), 3);
        assert_eq!(sysfs.device_children(tree.root).unwrap().len(), 2);
        assert_eq!(sysfs.registry().live_of_kind(EntityKind::Device), 4);

        sysfs.close_device_tree(tree).unwrap();
        assert_eq!(sysfs.registry().live(), 0);
        assert_eq!(sysfs.stats().released, 4);
    }
}

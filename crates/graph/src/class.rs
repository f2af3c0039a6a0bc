//! Classes and class devices.
//!
//! A class device is either a directory inside `<root>/class/<class>` or a
//! link from there into the device tree. Its underlying device, driver and
//! parent class device are opened lazily on first access and then owned by
//! the class device.

use std::path::{Path, PathBuf};

use rusty_sysfs_filesystem::{
    path_is_dir, path_is_file, path_is_link, path_name, read_directory, DirectoryNode,
    SysfsError,
};
use tracing::{debug, trace};

use crate::bus::{check_name, existing_target};
use crate::entity::{impl_entity, EntityId, EntityKind, RefList};
use crate::sysfs::{Sysfs, CLASS_DIR};

/// A class under `<root>/class`.
#[derive(Debug)]
pub struct Class {
    name: String,
    path: PathBuf,
    directory: DirectoryNode,
    /// Owning: every member of the class.
    devices: RefList,
}

impl_entity!(Class, EntityKind::Class, [devices]);

impl Class {
    /// Class devices, sorted by name.
    pub fn devices(&self) -> &[EntityId] {
        self.devices.ids()
    }
}

/// One member of a class.
#[derive(Debug)]
pub struct ClassDevice {
    name: String,
    path: PathBuf,
    class_name: String,
    device_path: Option<PathBuf>,
    driver_path: Option<PathBuf>,
    directory: DirectoryNode,
    /// Owning, at most one member, filled on first access.
    device: RefList,
    /// Owning, at most one member, filled on first access.
    driver: RefList,
    /// Owning, at most one member, filled on first access.
    parent: RefList,
}

impl_entity!(ClassDevice, EntityKind::ClassDevice, [device, driver, parent]);

impl ClassDevice {
    /// Name of the class this device belongs to.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Target of the `device` link, if any.
    pub fn device_path(&self) -> Option<&Path> {
        self.device_path.as_deref()
    }

    /// Underlying device, if it has been opened.
    pub fn device(&self) -> Option<EntityId> {
        self.device.first()
    }

    /// Driver, if it has been opened.
    pub fn driver(&self) -> Option<EntityId> {
        self.driver.first()
    }

    /// Parent class device, if it has been opened.
    pub fn parent(&self) -> Option<EntityId> {
        self.parent.first()
    }
}

impl Sysfs {
    /// Open a class with all of its members.
    ///
    /// # Returns
    /// A caller-owned handle.
    ///
    /// # Errors
    /// - `InvalidArgument` if `name` is not a single path component
    /// - `NotFound` if the class does not exist
    /// - any member open failure, after closing the members opened so far
    pub fn open_class(&mut self, name: &str) -> Result<EntityId, SysfsError> {
        check_name(name, "class")?;
        let path: PathBuf = self.class_path(name);
        if let Some(id) = self.reuse(EntityKind::Class, &path)? {
            return Ok(id);
        }

        let mut directory: DirectoryNode = DirectoryNode::open(&path)?;
        directory.read(self.options())?;

        let member_paths: Vec<PathBuf> = class_members(&directory)
            .into_iter()
            .map(|(_, p)| p)
            .collect();

        let class_name: String = name.to_string();
        let ids: Vec<EntityId> = self.open_each(&member_paths, |sysfs, p| {
            sysfs.open_class_device_at(p.to_path_buf(), class_name.clone())
        })?;
        let devices: RefList = self.adopt_all(ids)?;
        debug!("opened class {} with {} devices", name, devices.len());

        let class: Class = Class {
            name: class_name,
            path,
            directory,
            devices,
        };
        self.registry_mut().insert(Box::new(class))
    }

    /// Get an open class.
    ///
    /// # Errors
    /// `UnknownEntity` or `WrongEntityKind`.
    pub fn class(&self, id: EntityId) -> Result<&Class, SysfsError> {
        self.registry().get_as::<Class>(id)
    }

    /// Find a member of an open class by name. The handle is borrowed.
    pub fn find_class_device(
        &self,
        id: EntityId,
        name: &str,
    ) -> Result<Option<EntityId>, SysfsError> {
        Ok(self.find_named(self.class(id)?.devices(), name))
    }

    /// Open `<root>/class/<class>/<name>`.
    ///
    /// # Returns
    /// A caller-owned handle.
    ///
    /// # Errors
    /// - `InvalidArgument` if either name is not a single path component
    /// - `NotFound` if the class has no such member
    pub fn open_class_device(&mut self, class: &str, name: &str) -> Result<EntityId, SysfsError> {
        check_name(class, "class")?;
        check_name(name, "class device")?;
        let entry: PathBuf = self.class_path(class).join(name);
        if !path_is_link(&entry) && !path_is_dir(&entry) {
            return Err(SysfsError::not_found(entry));
        }
        let path: PathBuf = self.canonical(&entry)?;
        self.open_class_device_at(path, class.to_string())
    }

    /// Open the class device at `path`, which may be a link.
    ///
    /// The class name is taken from the `subsystem` link when present, then
    /// from the path's position under `<root>/class`, then from the parent
    /// directory name.
    ///
    /// # Returns
    /// A caller-owned handle.
    pub fn open_class_device_path(&mut self, path: &Path) -> Result<EntityId, SysfsError> {
        let path: PathBuf = self.canonical(path)?;
        let subsystem: PathBuf = path.join("subsystem");
        let class_name: String = if path_is_link(&subsystem) {
            let raw: PathBuf =
                std::fs::read_link(&subsystem).map_err(|e| SysfsError::io(&subsystem, e))?;
            path_name(&raw)?
        } else {
            self.class_name_of(&path)?
        };
        self.open_class_device_at(path, class_name)
    }

    /// Open a class device at a canonical path.
    pub(crate) fn open_class_device_at(
        &mut self,
        path: PathBuf,
        class_name: String,
    ) -> Result<EntityId, SysfsError> {
        if let Some(id) = self.reuse(EntityKind::ClassDevice, &path)? {
            return Ok(id);
        }

        let mut directory: DirectoryNode = DirectoryNode::open(&path)?;
        directory.read(self.options())?;
        let device_path: Option<PathBuf> = directory
            .link("device")
            .filter(|l| existing_target(l))
            .map(|l| l.target().to_path_buf());
        let driver_path: Option<PathBuf> = directory
            .link("driver")
            .filter(|l| existing_target(l))
            .map(|l| l.target().to_path_buf());

        let class_device: ClassDevice = ClassDevice {
            name: path_name(&path)?,
            path,
            class_name,
            device_path,
            driver_path,
            directory,
            device: RefList::owning(),
            driver: RefList::owning(),
            parent: RefList::owning(),
        };
        trace!("opened class device {}", class_device.path.display());
        self.registry_mut().insert(Box::new(class_device))
    }

    /// Get an open class device.
    ///
    /// # Errors
    /// `UnknownEntity` or `WrongEntityKind`.
    pub fn class_device(&self, id: EntityId) -> Result<&ClassDevice, SysfsError> {
        self.registry().get_as::<ClassDevice>(id)
    }

    /// Underlying device of a class device, opened on first access.
    ///
    /// # Returns
    /// A handle borrowed from the class device, or `None` if the class
    /// device has no `device` link.
    pub fn class_device_device(&mut self, id: EntityId) -> Result<Option<EntityId>, SysfsError> {
        let class_device: &ClassDevice = self.class_device(id)?;
        if let Some(device) = class_device.device() {
            return Ok(Some(device));
        }
        let Some(device_path) = class_device.device_path.clone() else {
            return Ok(None);
        };

        let device: EntityId = self.open_device(&device_path)?;
        self.attach_owned(id, device, |c: &mut ClassDevice| &mut c.device)?;
        Ok(Some(device))
    }

    /// Driver of a class device, opened on first access.
    ///
    /// The class device's own `driver` link is used when present, then
    /// the `driver` link of its underlying device.
    ///
    /// # Returns
    /// A handle borrowed from the class device, or `None` if no driver is
    /// bound.
    pub fn class_device_driver(&mut self, id: EntityId) -> Result<Option<EntityId>, SysfsError> {
        let class_device: &ClassDevice = self.class_device(id)?;
        if let Some(driver) = class_device.driver() {
            return Ok(Some(driver));
        }

        let driver_path: Option<PathBuf> = match class_device.driver_path.clone() {
            Some(path) => Some(path),
            None => match self.class_device_device(id)? {
                Some(device) => self.device(device)?.driver_path().map(Path::to_path_buf),
                None => None,
            },
        };
        let Some(driver_path) = driver_path.filter(|p| path_is_dir(p)) else {
            return Ok(None);
        };

        let driver: EntityId = self.open_driver(&driver_path)?;
        self.attach_owned(id, driver, |c: &mut ClassDevice| &mut c.driver)?;
        Ok(Some(driver))
    }

    /// Parent class device, opened on first access.
    ///
    /// The parent directory is a class device when it carries a `dev`
    /// attribute, as a disk does for its partitions.
    ///
    /// # Returns
    /// A handle borrowed from the class device, or `None`.
    pub fn class_device_parent(&mut self, id: EntityId) -> Result<Option<EntityId>, SysfsError> {
        let class_device: &ClassDevice = self.class_device(id)?;
        if let Some(parent) = class_device.parent() {
            return Ok(Some(parent));
        }
        let Some(parent_path) = class_device.path.parent().map(Path::to_path_buf) else {
            return Ok(None);
        };
        if !path_is_file(&parent_path.join("dev")) {
            return Ok(None);
        }
        let class_name: String = class_device.class_name.clone();

        let parent: EntityId = self.open_class_device_at(parent_path, class_name)?;
        self.attach_owned(id, parent, |c: &mut ClassDevice| &mut c.parent)?;
        Ok(Some(parent))
    }

    /// Members of `<root>/class/<class>` as (name, canonical path) pairs.
    pub(crate) fn class_entries(&self, class: &str) -> Result<Vec<(String, PathBuf)>, SysfsError> {
        let node: DirectoryNode = read_directory(&self.class_path(class), self.options())?;
        Ok(class_members(&node))
    }

    /// Class name of a class device path that has no `subsystem` link.
    fn class_name_of(&self, path: &Path) -> Result<String, SysfsError> {
        let class_root: PathBuf = self.root().join(CLASS_DIR);
        if let Ok(relative) = path.strip_prefix(&class_root) {
            if let Some(first) = relative.components().next() {
                return Ok(first.as_os_str().to_string_lossy().into_owned());
            }
        }
        let parent: &Path = path
            .parent()
            .ok_or_else(|| SysfsError::invalid(format!("no parent for {}", path.display())))?;
        path_name(parent)
    }
}

/// Subdirectories and resolved links of a read class directory, by name.
fn class_members(directory: &DirectoryNode) -> Vec<(String, PathBuf)> {
    let mut members: Vec<(String, PathBuf)> = directory
        .subdirs()
        .iter()
        .map(|d| (d.name().to_string(), d.path().to_path_buf()))
        .chain(
            directory
                .links()
                .iter()
                .filter(|l| existing_target(l))
                .map(|l| (l.name().to_string(), l.target().to_path_buf())),
        )
        .collect();
    members.sort();
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::SysfsEntity;
    use rusty_sysfs_filesystem::ErrorKind;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    /// Modern layout: `class/net/eth0` links into the device tree.
    fn build_net(root: &Path) {
        let pci: PathBuf = root.join("devices/pci0000:00/0000:00:19.0");
        let eth0: PathBuf = pci.join("net/eth0");
        std::fs::create_dir_all(&eth0).unwrap();
        std::fs::write(eth0.join("mtu"), b"1500\n").unwrap();
        std::fs::create_dir_all(root.join("class/net")).unwrap();
        std::fs::create_dir_all(root.join("bus/pci/drivers/e1000e")).unwrap();
        symlink(
            "../../devices/pci0000:00/0000:00:19.0/net/eth0",
            root.join("class/net/eth0"),
        )
        .unwrap();
        symlink("../../../0000:00:19.0", eth0.join("device")).unwrap();
        symlink("../../../../../class/net", eth0.join("subsystem")).unwrap();
        symlink("../../../bus/pci/drivers/e1000e", pci.join("driver")).unwrap();
    }

    #[test]
    fn test_open_class_with_linked_members() {
        let dir: TempDir = TempDir::new().unwrap();
        build_net(dir.path());
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let net: EntityId = sysfs.open_class("net").unwrap();
        let eth0: EntityId = sysfs.find_class_device(net, "eth0").unwrap().unwrap();
        let class_device: &ClassDevice = sysfs.class_device(eth0).unwrap();
        assert_eq!(class_device.class_name(), "net");
        assert_eq!(
            class_device.path(),
            dir.path().join("devices/pci0000:00/0000:00:19.0/net/eth0")
        );
        assert_eq!(class_device.device(), None);

        let device: EntityId = sysfs.class_device_device(eth0).unwrap().unwrap();
        assert_eq!(sysfs.device(device).unwrap().bus_id(), "0000:00:19.0");
        assert_eq!(sysfs.class_device_device(eth0).unwrap(), Some(device));

        let driver: EntityId = sysfs.class_device_driver(eth0).unwrap().unwrap();
        assert_eq!(sysfs.driver(driver).unwrap().name(), "e1000e");

        sysfs.close(net).unwrap();
        assert_eq!(sysfs.registry().live(), 0);
    }

    #[test]
    fn test_open_class_device_by_path() {
        let dir: TempDir = TempDir::new().unwrap();
        build_net(dir.path());
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let by_path: EntityId = sysfs
            .open_class_device_path(&dir.path().join("class/net/eth0"))
            .unwrap();
        let by_name: EntityId = sysfs.open_class_device("net", "eth0").unwrap();
        assert_eq!(by_path, by_name);
        assert_eq!(sysfs.class_device(by_path).unwrap().class_name(), "net");
        assert_eq!(
            sysfs.attribute(by_path, "mtu").unwrap().unwrap().text().as_deref(),
            Some("1500")
        );

        sysfs.close(by_path).unwrap();
        sysfs.close(by_name).unwrap();
        assert_eq!(sysfs.registry().live(), 0);
    }

    #[test]
    fn test_class_device_parent_partition() {
        let dir: TempDir = TempDir::new().unwrap();
        let sda1: PathBuf = dir.path().join("class/block/sda/sda1");
        std::fs::create_dir_all(&sda1).unwrap();
        std::fs::write(dir.path().join("class/block/sda/dev"), b"8:0\n").unwrap();
        std::fs::write(sda1.join("dev"), b"8:1\n").unwrap();
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let part: EntityId = sysfs.open_class_device_path(&sda1).unwrap();
        assert_eq!(sysfs.class_device(part).unwrap().class_name(), "block");
        let disk: EntityId = sysfs.class_device_parent(part).unwrap().unwrap();
        assert_eq!(sysfs.entity(disk).unwrap().name(), "sda");
        assert_eq!(sysfs.class_device_parent(disk).unwrap(), None);
        assert_eq!(sysfs.class_device_device(part).unwrap(), None);

        sysfs.close(part).unwrap();
        assert_eq!(sysfs.registry().live(), 0);
    }

    #[test]
    fn test_missing_class() {
        let dir: TempDir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("class/net")).unwrap();
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        assert_eq!(sysfs.open_class("tty").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            sysfs.open_class_device("net", "eth9").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(sysfs.registry().live(), 0);
    }
}

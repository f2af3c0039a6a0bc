//! Buses.

use std::path::{Path, PathBuf};

use rusty_sysfs_filesystem::{path_is_dir, read_directory, DirectoryNode, LinkNode, SysfsError};
use tracing::debug;

use crate::device::Device;
use crate::entity::{impl_entity, EntityId, EntityKind, RefList};
use crate::sysfs::{Sysfs, DEVICES_DIR, DRIVERS_DIR};

/// A bus under `<root>/bus`.
#[derive(Debug)]
pub struct Bus {
    name: String,
    path: PathBuf,
    directory: DirectoryNode,
    /// Owning: devices listed in `<bus>/devices`.
    devices: RefList,
    /// Owning: drivers in `<bus>/drivers`.
    drivers: RefList,
}

impl_entity!(Bus, EntityKind::Bus, [devices, drivers]);

impl Bus {
    /// Devices on the bus.
    pub fn devices(&self) -> &[EntityId] {
        self.devices.ids()
    }

    /// Drivers on the bus.
    pub fn drivers(&self) -> &[EntityId] {
        self.drivers.ids()
    }
}

/// Whether a member link leads somewhere; dangling members are skipped.
pub(crate) fn existing_target(link: &LinkNode) -> bool {
    if link.target_exists() {
        return true;
    }
    debug!(
        "skipping {}: target {} is missing",
        link.path().display(),
        link.target().display()
    );
    false
}

/// Validate a single path component supplied by a caller.
pub(crate) fn check_name(name: &str, what: &str) -> Result<(), SysfsError> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(SysfsError::invalid(format!("invalid {what} name {name:?}")));
    }
    Ok(())
}

impl Sysfs {
    /// Open a bus with all of its devices and drivers.
    ///
    /// Devices are opened through the links in `<bus>/devices` and drivers
    /// from the subdirectories of `<bus>/drivers`; a missing `devices` or
    /// `drivers` directory yields an empty list. Devices and drivers are
    /// linked to each other through the devices' `driver` links.
    ///
    /// # Returns
    /// A caller-owned handle.
    ///
    /// # Errors
    /// - `InvalidArgument` if `name` is not a single path component
    /// - `NotFound` if the bus does not exist
    /// - any device or driver open failure, after closing what was opened
    pub fn open_bus(&mut self, name: &str) -> Result<EntityId, SysfsError> {
        check_name(name, "bus")?;
        let path: PathBuf = self.bus_path(name);
        if let Some(id) = self.reuse(EntityKind::Bus, &path)? {
            return Ok(id);
        }

        let mut directory: DirectoryNode = DirectoryNode::open(&path)?;
        directory.read(self.options())?;

        let device_paths: Vec<PathBuf> = self.member_paths(&path.join(DEVICES_DIR), true)?;
        let driver_paths: Vec<PathBuf> = self.member_paths(&path.join(DRIVERS_DIR), false)?;

        let device_ids: Vec<EntityId> =
            self.open_each(&device_paths, |sysfs, p| sysfs.open_device(p))?;
        let driver_ids: Vec<EntityId> =
            match self.open_each(&driver_paths, |sysfs, p| sysfs.open_driver(p)) {
                Ok(ids) => ids,
                Err(e) => {
                    self.release_handles(&device_ids);
                    return Err(e);
                }
            };

        for device in &device_ids {
            self.registry_mut()
                .get_as_mut::<Device>(*device)?
                .set_bus_if_unknown(name);
        }

        let devices: RefList = self.adopt_all(device_ids)?;
        let drivers: RefList = self.adopt_all(driver_ids)?;
        debug!(
            "opened bus {} with {} devices and {} drivers",
            name,
            devices.len(),
            drivers.len()
        );

        let bus: Bus = Bus {
            name: name.to_string(),
            path,
            directory,
            devices,
            drivers,
        };
        self.registry_mut().insert(Box::new(bus))
    }

    /// Get an open bus.
    ///
    /// # Errors
    /// `UnknownEntity` or `WrongEntityKind`.
    pub fn bus(&self, id: EntityId) -> Result<&Bus, SysfsError> {
        self.registry().get_as::<Bus>(id)
    }

    /// Find a device on an open bus by bus id. The handle is borrowed.
    pub fn bus_device(&self, id: EntityId, bus_id: &str) -> Result<Option<EntityId>, SysfsError> {
        Ok(self.find_named(self.bus(id)?.devices(), bus_id))
    }

    /// Find a driver on an open bus by name. The handle is borrowed.
    pub fn bus_driver(&self, id: EntityId, name: &str) -> Result<Option<EntityId>, SysfsError> {
        Ok(self.find_named(self.bus(id)?.drivers(), name))
    }

    pub(crate) fn find_named(&self, ids: &[EntityId], name: &str) -> Option<EntityId> {
        ids.iter().copied().find(|id| {
            self.entity(*id)
                .map(|entity| entity.name() == name)
                .unwrap_or(false)
        })
    }

    /// Resolved link targets (`links`) or subdirectory paths of `dir`.
    ///
    /// A missing directory has no members.
    fn member_paths(&self, dir: &Path, links: bool) -> Result<Vec<PathBuf>, SysfsError> {
        if !path_is_dir(dir) {
            return Ok(Vec::new());
        }
        let node: DirectoryNode = read_directory(dir, self.options())?;
        let paths: Vec<PathBuf> = if links {
            node.links()
                .iter()
                .filter(|l| existing_target(l))
                .map(|l| l.target().to_path_buf())
                .collect()
        } else {
            node.subdirs().iter().map(|d| d.path().to_path_buf()).collect()
        };
        Ok(paths)
    }
}

//! Drivers.

use std::path::{Path, PathBuf};

use rusty_sysfs_filesystem::{path_name, DirectoryNode, SysfsError};
use tracing::trace;

use crate::bus::{check_name, existing_target};
use crate::entity::{impl_entity, EntityId, EntityKind, RefList};
use crate::sysfs::{Sysfs, BUS_DIR, DRIVERS_DIR};

/// A driver under `<root>/bus/<bus>/drivers`.
#[derive(Debug)]
pub struct Driver {
    name: String,
    path: PathBuf,
    bus: Option<String>,
    directory: DirectoryNode,
    /// Owning: devices bound to the driver.
    devices: RefList,
}

impl_entity!(Driver, EntityKind::Driver, [devices]);

impl Driver {
    /// Name of the bus the driver belongs to.
    pub fn bus(&self) -> Option<&str> {
        self.bus.as_deref()
    }

    /// Bound devices.
    pub fn devices(&self) -> &[EntityId] {
        self.devices.ids()
    }
}

impl Sysfs {
    /// Open the driver directory at `path`.
    ///
    /// Every link in the directory that leads into the device tree is a
    /// bound device; each is opened and owned by the driver.
    ///
    /// # Returns
    /// A caller-owned handle.
    ///
    /// # Errors
    /// - `NotFound` if the driver directory does not exist
    /// - any device open failure, after closing the devices opened so far
    pub fn open_driver(&mut self, path: &Path) -> Result<EntityId, SysfsError> {
        let path: PathBuf = self.canonical(path)?;
        if let Some(id) = self.reuse(EntityKind::Driver, &path)? {
            return Ok(id);
        }

        let mut directory: DirectoryNode = DirectoryNode::open(&path)?;
        directory.read(self.options())?;

        let devices_root: PathBuf = self.devices_root();
        let device_paths: Vec<PathBuf> = directory
            .links()
            .iter()
            .filter(|link| existing_target(link))
            .map(|link| link.target().to_path_buf())
            .filter(|target| target.starts_with(&devices_root))
            .collect();
        let device_ids: Vec<EntityId> =
            self.open_each(&device_paths, |sysfs, p| sysfs.open_device(p))?;
        let devices: RefList = self.adopt_all(device_ids)?;

        let driver: Driver = Driver {
            name: path_name(&path)?,
            bus: self.bus_of_driver_path(&path),
            path: path.clone(),
            directory,
            devices,
        };
        trace!("opened driver {} with {} devices", path.display(), driver.devices.len());
        let id: EntityId = self.registry_mut().insert(Box::new(driver))?;
        self.link_driver_devices(id, &path)?;
        Ok(id)
    }

    /// Open a driver by name on a known bus.
    ///
    /// # Errors
    /// - `InvalidArgument` if either name is not a single path component
    /// - `NotFound` if `<root>/bus/<bus>/drivers/<name>` does not exist
    pub fn open_driver_by_name(&mut self, name: &str, bus: &str) -> Result<EntityId, SysfsError> {
        check_name(name, "driver")?;
        check_name(bus, "bus")?;
        let path: PathBuf = self.bus_path(bus).join(DRIVERS_DIR).join(name);
        self.open_driver(&path)
    }

    /// Get an open driver.
    ///
    /// # Errors
    /// `UnknownEntity` or `WrongEntityKind`.
    pub fn driver(&self, id: EntityId) -> Result<&Driver, SysfsError> {
        self.registry().get_as::<Driver>(id)
    }

    /// Find a bound device of a driver by bus id. The handle is borrowed.
    pub fn driver_device(
        &self,
        id: EntityId,
        bus_id: &str,
    ) -> Result<Option<EntityId>, SysfsError> {
        let driver: &Driver = self.driver(id)?;
        Ok(driver.devices().iter().copied().find(|device| {
            self.entity(*device)
                .map(|d| d.name() == bus_id)
                .unwrap_or(false)
        }))
    }

    /// Bus name from a `<root>/bus/<bus>/drivers/<name>` path.
    fn bus_of_driver_path(&self, path: &Path) -> Option<String> {
        let drivers_dir: &Path = path.parent()?;
        if drivers_dir.file_name()? != DRIVERS_DIR {
            return None;
        }
        let bus_dir: &Path = drivers_dir.parent()?;
        if bus_dir.parent()? != self.root().join(BUS_DIR) {
            return None;
        }
        path_name(bus_dir).ok()
    }
}

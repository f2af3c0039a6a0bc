//! Linear scans that locate the bus or class of a named entity.
//!
//! Each scan walks the subsystem directories directly and stops at the
//! first match; nothing is opened in the registry.

use std::path::{Path, PathBuf};

use rusty_sysfs_filesystem::{path_is_dir, path_is_link, path_name, resolve_symlink, SysfsError};
use tracing::debug;

use crate::bus::check_name;
use crate::sysfs::{Sysfs, DEVICES_DIR, DRIVERS_DIR};

impl Sysfs {
    /// Find the bus that has a driver called `driver`.
    ///
    /// # Returns
    /// The first bus, in name order, whose `drivers` directory contains
    /// `driver`.
    pub fn find_driver_bus(&self, driver: &str) -> Result<Option<String>, SysfsError> {
        check_name(driver, "driver")?;
        Ok(self
            .list_buses()?
            .into_iter()
            .find(|bus| path_is_dir(&self.bus_path(bus).join(DRIVERS_DIR).join(driver))))
    }

    /// Find the bus that lists a device with bus id `bus_id`.
    pub fn find_device_bus(&self, bus_id: &str) -> Result<Option<String>, SysfsError> {
        if bus_id.is_empty() {
            return Err(SysfsError::invalid("empty bus id"));
        }
        Ok(self.list_buses()?.into_iter().find(|bus| {
            let entry: PathBuf = self.bus_path(bus).join(DEVICES_DIR).join(bus_id);
            path_is_link(&entry) || path_is_dir(&entry)
        }))
    }

    /// Find the class device whose `device` link leads to a device with
    /// bus id `bus_id`.
    ///
    /// # Returns
    /// `(class, class device)` names of the first match.
    pub fn find_device_class(&self, bus_id: &str) -> Result<Option<(String, String)>, SysfsError> {
        if bus_id.is_empty() {
            return Err(SysfsError::invalid("empty bus id"));
        }
        for class in self.list_classes()? {
            for (name, path) in self.class_entries(&class)? {
                if device_link_matches(&path, bus_id) {
                    return Ok(Some((class, name)));
                }
            }
        }
        Ok(None)
    }
}

fn device_link_matches(class_device: &Path, bus_id: &str) -> bool {
    let link: PathBuf = class_device.join("device");
    if !path_is_link(&link) {
        return false;
    }
    match resolve_symlink(&link).and_then(|target| path_name(&target)) {
        Ok(name) => name == bus_id,
        Err(e) => {
            debug!("skipping {}: {}", link.display(), e);
            false
        }
    }
}

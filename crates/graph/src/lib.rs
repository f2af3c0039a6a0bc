//! Cross-referenced object graph of a sysfs tree.
//!
//! Buses, drivers, devices, classes, class devices and block devices are
//! opened through a [`Sysfs`] session and stored once in its [`Registry`],
//! keyed by kind and canonical path. Entities refer to each other through
//! [`EntityId`] handles kept in [`RefList`]s, each tagged [`Ownership::Owning`]
//! or [`Ownership::Borrowed`]:
//!
//! ```text
//! Bus          owns     Device, Driver
//! Driver       owns     Device
//! Device       owns     parent Device
//! Device       borrows  child Devices, Driver
//! Class        owns     ClassDevice
//! ClassDevice  owns     Device, Driver, parent ClassDevice
//! BlockDevice  owns     Device
//! ```
//!
//! A device reachable from a bus, a driver and a class is one entity with
//! one hold per owner, and is released when the last owner lets go.
//!
//! # Example
//!
//! ```ignore
//! use rusty_sysfs_graph::{Sysfs, SysfsEntity};
//!
//! let mut sysfs = Sysfs::open(Default::default())?;
//! let usb = sysfs.open_bus("usb")?;
//! for device in sysfs.bus(usb)?.devices().to_vec() {
//!     let driver = sysfs.device(device)?.driver_name().unwrap_or("-").to_string();
//!     println!("{} {}", sysfs.entity(device)?.name(), driver);
//! }
//! sysfs.close(usb)?;
//! ```

pub mod block;
pub mod bus;
pub mod class;
pub mod device;
pub mod driver;
pub mod entity;
pub mod find;
pub mod registry;
pub mod sysfs;

pub use block::{BlockDevice, IOSCHED_DIR, QUEUE_DIR};
pub use bus::Bus;
pub use class::{Class, ClassDevice};
pub use device::{Device, DeviceTree};
pub use driver::Driver;
pub use entity::{EntityId, EntityKind, EntityType, Ownership, RefList, SysfsEntity};
pub use registry::{Registry, RegistryStats};
pub use sysfs::{Sysfs, BLOCK_DIR, BUS_DIR, CLASS_DIR, DEVICES_DIR, DRIVERS_DIR};

pub use rusty_sysfs_filesystem::{
    AccessMethod, AttributeNode, DirectoryNode, ErrorKind, LinkNode, RereadPolicy, RootSource,
    SysfsError, SysfsOptions,
};

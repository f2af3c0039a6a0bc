//! The listing commands: load what the options ask for, then render.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rusty_sysfs_graph::{DeviceTree, EntityId, Sysfs, SysfsEntity, SysfsError};
use tracing::debug;

use crate::options::ShowOptions;
use crate::pci_names::PciNames;
use crate::render::Printer;

/// Print one bus with its devices and drivers.
///
/// # Arguments
/// * `sysfs` - Session to open the bus in; everything opened is closed again
/// * `name` - Bus name, e.g. `usb`
/// * `options` - What to print
/// * `pci_names` - Names for devices on the `pci` bus
/// * `out` - Destination of the text
///
/// # Errors
/// The bus cannot be opened or the output cannot be written.
pub fn show_bus<W: Write>(
    sysfs: &mut Sysfs,
    name: &str,
    options: &ShowOptions,
    pci_names: Option<&PciNames>,
    out: W,
) -> Result<()> {
    let bus: EntityId = sysfs
        .open_bus(name)
        .with_context(|| format!("error opening bus {name}"))?;
    let result: Result<()> = load_bus(sysfs, bus, options, pci_names.is_some()).and_then(|()| {
        Printer::new(sysfs, options, out)
            .with_pci_names(pci_names)
            .bus(bus)
    });
    sysfs.close(bus)?;
    result
}

fn load_bus(sysfs: &mut Sysfs, bus: EntityId, options: &ShowOptions, pci: bool) -> Result<()> {
    if options.devices {
        let devices: Vec<EntityId> = sysfs.bus(bus)?.devices().to_vec();
        for device in devices {
            if options.selects(sysfs.device(device)?.bus_id()) {
                load_values(sysfs, device, options)?;
                if pci {
                    load_pci_ids(sysfs, device);
                }
            }
        }
    }
    if options.drivers {
        let drivers: Vec<EntityId> = sysfs.bus(bus)?.drivers().to_vec();
        for driver in drivers {
            load_values(sysfs, driver, options)?;
        }
    }
    Ok(())
}

/// Print one class with its class devices.
///
/// The device and driver behind each printed class device are opened when
/// the options ask for devices or drivers.
///
/// # Errors
/// The class cannot be opened or the output cannot be written.
pub fn show_class<W: Write>(
    sysfs: &mut Sysfs,
    name: &str,
    options: &ShowOptions,
    pci_names: Option<&PciNames>,
    out: W,
) -> Result<()> {
    let class: EntityId = sysfs
        .open_class(name)
        .with_context(|| format!("error opening class {name}"))?;
    let result: Result<()> = load_class(sysfs, class, options, pci_names.is_some())
        .and_then(|()| {
            Printer::new(sysfs, options, out)
                .with_pci_names(pci_names)
                .class(class)
        });
    sysfs.close(class)?;
    result
}

fn load_class(sysfs: &mut Sysfs, class: EntityId, options: &ShowOptions, pci: bool) -> Result<()> {
    let members: Vec<EntityId> = sysfs.class(class)?.devices().to_vec();
    for member in members {
        if !options.selects(sysfs.class_device(member)?.name()) {
            continue;
        }
        load_values(sysfs, member, options)?;
        if options.wants_attributes() {
            log_failures(sysfs.read_subdir_attributes(member)?);
        }
        if options.devices {
            if let Some(device) = sysfs.class_device_device(member)? {
                load_values(sysfs, device, options)?;
                if pci {
                    load_pci_ids(sysfs, device);
                }
            }
        }
        if options.drivers {
            if let Some(driver) = sysfs.class_device_driver(member)? {
                load_values(sysfs, driver, options)?;
            }
        }
    }
    Ok(())
}

/// Print the device tree rooted at `<root>/devices/<name>`.
///
/// # Errors
/// The tree cannot be opened or the output cannot be written.
pub fn show_root<W: Write>(
    sysfs: &mut Sysfs,
    name: &str,
    options: &ShowOptions,
    pci_names: Option<&PciNames>,
    mut out: W,
) -> Result<()> {
    let path: PathBuf = sysfs.devices_root().join(name);
    let tree: DeviceTree = sysfs
        .open_device_tree(&path)
        .with_context(|| format!("error opening root device {name}"))?;

    let result: Result<()> = load_tree(sysfs, &tree, options, pci_names.is_some()).and_then(|()| {
        writeln!(out, "Root Device Tree: {name}")?;
        Printer::new(sysfs, options, out)
            .with_pci_names(pci_names)
            .device_tree(tree.root, 2)
    });
    sysfs.close_device_tree(tree)?;
    result
}

fn load_tree(sysfs: &mut Sysfs, tree: &DeviceTree, options: &ShowOptions, pci: bool) -> Result<()> {
    for device in std::iter::once(&tree.root).chain(&tree.members) {
        if options.selects(sysfs.device(*device)?.bus_id()) {
            load_values(sysfs, *device, options)?;
            if pci {
                load_pci_ids(sysfs, *device);
            }
        }
    }
    Ok(())
}

/// Print the buses, classes and root devices the tree supports.
///
/// # Errors
/// One of the three directories cannot be listed or the output cannot be
/// written.
pub fn show_default_info<W: Write>(sysfs: &Sysfs, out: W) -> Result<()> {
    let options: ShowOptions = ShowOptions::default();
    let mut printer: Printer<'_, W> = Printer::new(sysfs, &options, out);
    let sections: [(&str, fn(&Sysfs) -> Result<Vec<String>, SysfsError>); 3] = [
        ("Supported sysfs buses:", Sysfs::list_buses),
        ("Supported sysfs classes:", Sysfs::list_classes),
        ("Supported sysfs root devices:", Sysfs::list_root_devices),
    ];
    for (title, list) in sections {
        let names: Vec<String> = list(sysfs).with_context(|| format!("error listing {title}"))?;
        printer.name_list(title, &names, 4)?;
    }
    Ok(())
}

/// Read the attribute values `options` will print.
fn load_values(sysfs: &mut Sysfs, id: EntityId, options: &ShowOptions) -> Result<()> {
    if options.all_values {
        log_failures(sysfs.read_attributes(id)?);
    } else if let Some(name) = options.attribute.as_deref() {
        if let Err(e) = sysfs.attribute(id, name) {
            debug!("failed to read {name} of {id}: {e}");
        }
    }
    Ok(())
}

fn load_pci_ids(sysfs: &mut Sysfs, device: EntityId) {
    for name in ["vendor", "device"] {
        if let Err(e) = sysfs.attribute(device, name) {
            debug!("failed to read {name} of {device}: {e}");
        }
    }
}

fn log_failures(failures: Vec<(String, SysfsError)>) {
    for (name, e) in failures {
        debug!("failed to read {name}: {e}");
    }
}

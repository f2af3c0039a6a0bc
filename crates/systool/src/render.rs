//! Text rendering of opened entities.
//!
//! Rendering never touches the filesystem: attribute values that were not
//! read during the load phase print as empty.

use std::io::Write;

use anyhow::Result;
use rusty_sysfs_graph::{AttributeNode, DirectoryNode, EntityId, Sysfs, SysfsEntity};

use crate::options::ShowOptions;
use crate::pci_names::{parse_id, PciNames};

/// Bytes per hex dump row.
const HEX_ROW: usize = 16;
/// Bytes after which a hex dump row gets an extra gap.
const HEX_GROUP: usize = 8;

/// Writes entities of one session as indented text.
pub struct Printer<'a, W: Write> {
    sysfs: &'a Sysfs,
    options: &'a ShowOptions,
    pci_names: Option<&'a PciNames>,
    out: W,
}

impl<'a, W: Write> Printer<'a, W> {
    /// Create a printer writing to `out`.
    pub fn new(sysfs: &'a Sysfs, options: &'a ShowOptions, out: W) -> Self {
        Self {
            sysfs,
            options,
            pci_names: None,
            out,
        }
    }

    /// Decorate PCI devices with names from `names`.
    pub fn with_pci_names(mut self, names: Option<&'a PciNames>) -> Self {
        self.pci_names = names;
        self
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write a line of text at column zero.
    pub fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{text}")?;
        Ok(())
    }

    /// Write `names` one per line under `title`.
    pub fn name_list(&mut self, title: &str, names: &[String], level: usize) -> Result<()> {
        self.line(title)?;
        for name in names {
            self.indent(level)?;
            writeln!(self.out, "{name}")?;
        }
        Ok(())
    }

    /// Lines start `level + 1` spaces in.
    fn indent(&mut self, level: usize) -> Result<()> {
        write!(self.out, "{:width$}", "", width = level + 1)?;
        Ok(())
    }

    /// Write the value part of an attribute line.
    fn attribute_value(&mut self, attribute: &AttributeNode, level: usize) -> Result<()> {
        if !attribute.method().can_show() {
            writeln!(self.out, "\t: store method only")?;
            return Ok(());
        }
        if attribute.is_binary() {
            if let Some(bytes) = attribute.bytes() {
                write!(self.out, "\t: ")?;
                for (i, byte) in bytes.iter().enumerate() {
                    if i % HEX_ROW == 0 {
                        writeln!(self.out)?;
                        self.indent(level + 8)?;
                    } else if i % HEX_GROUP == 0 {
                        write!(self.out, " ")?;
                    }
                    write!(self.out, "{byte:02x} ")?;
                }
                writeln!(self.out)?;
                return Ok(());
            }
        }
        match attribute.text() {
            Some(text) if !text.is_empty() => writeln!(self.out, "\t: {text}")?,
            _ => writeln!(self.out)?,
        }
        Ok(())
    }

    fn attribute(&mut self, attribute: &AttributeNode, level: usize) -> Result<()> {
        let name: &str = attribute.name();
        if !self.options.shows_name(name) {
            return Ok(());
        }
        self.indent(level)?;
        write!(self.out, "{name}")?;
        if self.options.shows_value(name) && (attribute.is_loaded() || self.options.all_values) {
            self.attribute_value(attribute, level)
        } else {
            writeln!(self.out)?;
            Ok(())
        }
    }

    fn attribute_lines(&mut self, directory: &DirectoryNode, level: usize) -> Result<()> {
        for attribute in directory.attributes() {
            self.attribute(attribute, level)?;
        }
        Ok(())
    }

    /// `Attributes:` section of a directory.
    fn attributes(&mut self, directory: &DirectoryNode, level: usize) -> Result<()> {
        if directory.attributes().is_empty() {
            return Ok(());
        }
        self.indent(level)?;
        writeln!(self.out, "Attributes:")?;
        self.attribute_lines(directory, level + 4)
    }

    fn children(&mut self, directory: &DirectoryNode, level: usize) -> Result<()> {
        self.indent(level)?;
        writeln!(self.out, "Children:")?;
        for subdir in directory.subdirs() {
            self.indent(level + 4)?;
            writeln!(self.out, "{}", subdir.name())?;
        }
        for link in directory.links() {
            self.indent(level + 4)?;
            writeln!(self.out, "{}", link.name())?;
        }
        Ok(())
    }

    /// Header line of a device: bus id, then the PCI name when known.
    fn device_header(&mut self, id: EntityId, level: usize) -> Result<()> {
        let device = self.sysfs.device(id)?;
        self.indent(level)?;
        match self.pci_description(id)? {
            Some(description) => writeln!(self.out, "{} {}", device.bus_id(), description)?,
            None => writeln!(self.out, "{}", device.bus_id())?,
        }
        Ok(())
    }

    fn pci_description(&self, id: EntityId) -> Result<Option<String>> {
        let Some(names) = self.pci_names else {
            return Ok(None);
        };
        let device = self.sysfs.device(id)?;
        if device.bus() != Some("pci") {
            return Ok(None);
        }
        let id_of = |name: &str| -> Option<u16> {
            device
                .directory()
                .attribute(name)
                .and_then(AttributeNode::text)
                .and_then(|text| parse_id(&text))
        };
        Ok(match (id_of("vendor"), id_of("device")) {
            (Some(vendor), Some(device)) => Some(names.describe(vendor, device)),
            _ => None,
        })
    }

    /// A device with its children, attributes and driver.
    pub fn device(&mut self, id: EntityId, level: usize) -> Result<()> {
        self.device_header(id, level)?;
        let device = self.sysfs.device(id)?;
        let directory: &DirectoryNode = device.directory();
        if !directory.subdirs().is_empty() || !directory.links().is_empty() {
            self.children(directory, level + 4)?;
        }
        if self.options.wants_attributes() {
            self.attributes(directory, level + 4)?;
        }
        if let Some(driver) = device.driver_name() {
            self.indent(level + 4)?;
            writeln!(self.out, "Driver: {driver}")?;
        }
        Ok(())
    }

    /// A device as listed in a device tree: header and attributes.
    pub fn root_device(&mut self, id: EntityId, level: usize) -> Result<()> {
        self.device_header(id, level)?;
        if self.options.wants_attributes() {
            let directory: &DirectoryNode = self.sysfs.device(id)?.directory();
            self.attributes(directory, level + 4)?;
        }
        Ok(())
    }

    /// A device and its open descendants, each level six columns deeper.
    pub fn device_tree(&mut self, id: EntityId, level: usize) -> Result<()> {
        let device = self.sysfs.device(id)?;
        if self.options.selects(device.bus_id()) {
            self.root_device(id, level)?;
        }
        for child in device.children() {
            self.device_tree(*child, level + 6)?;
        }
        Ok(())
    }

    /// A driver with its bound devices and attributes.
    pub fn driver(&mut self, id: EntityId, level: usize) -> Result<()> {
        let driver = self.sysfs.driver(id)?;
        let directory: &DirectoryNode = driver.directory();
        self.indent(level)?;
        writeln!(self.out, "{}", driver.name())?;

        if !directory.links().is_empty() {
            self.indent(level + 4)?;
            writeln!(self.out, "Devices:")?;
            for link in directory.links() {
                self.indent(level + 8)?;
                writeln!(self.out, "{}", link.name())?;
            }
        }
        if self.options.wants_attributes() && !directory.attributes().is_empty() {
            self.indent(level + 4)?;
            writeln!(self.out, "{} Attributes:", driver.name())?;
            self.attribute_lines(directory, level + 8)?;
        }
        Ok(())
    }

    /// A bus with its devices and drivers.
    pub fn bus(&mut self, id: EntityId) -> Result<()> {
        let bus = self.sysfs.bus(id)?;
        writeln!(self.out, "Bus: {}", bus.name())?;

        if self.options.devices && !bus.devices().is_empty() {
            if self.options.device.is_none() {
                writeln!(self.out, "Devices:")?;
            }
            for device in bus.devices() {
                if self.options.selects(self.sysfs.device(*device)?.bus_id()) {
                    self.device(*device, 2)?;
                }
            }
        }
        if self.options.drivers && !bus.drivers().is_empty() {
            writeln!(self.out, "Drivers:")?;
            for driver in bus.drivers() {
                self.driver(*driver, 2)?;
            }
        }
        Ok(())
    }

    /// A class device with its attributes, subdirectories and, when they
    /// were opened, its device and driver.
    pub fn class_device(&mut self, id: EntityId, level: usize) -> Result<()> {
        let class_device = self.sysfs.class_device(id)?;
        self.indent(level)?;
        writeln!(self.out, "{}", class_device.name())?;

        if self.options.wants_attributes() {
            let directory: &DirectoryNode = class_device.directory();
            self.attributes(directory, level + 4)?;
            for subdir in directory.subdirs() {
                self.indent(level + 4)?;
                writeln!(self.out, "{}", subdir.name())?;
                self.attributes(subdir, level + 4)?;
            }
        }
        if self.options.devices {
            if let Some(device) = class_device.device() {
                self.device(device, level + 4)?;
            }
        }
        if self.options.drivers {
            if let Some(driver) = class_device.driver() {
                self.driver(driver, level + 4)?;
            }
        }
        Ok(())
    }

    /// A class with its selected members.
    pub fn class(&mut self, id: EntityId) -> Result<()> {
        let class = self.sysfs.class(id)?;
        writeln!(self.out, "Class: {}", class.name())?;
        if class.devices().is_empty() {
            return Ok(());
        }
        if self.options.device.is_none() {
            writeln!(self.out, "Class Devices:")?;
        }
        for member in class.devices() {
            if self.options.selects(self.sysfs.class_device(*member)?.name()) {
                self.class_device(*member, 2)?;
            }
        }
        Ok(())
    }
}

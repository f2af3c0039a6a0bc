//! PCI vendor and device names from a `pci.ids` database.
//!
//! Only the vendor section is used: vendor lines start at column zero,
//! device lines are indented by one tab. Subsystem lines (two tabs) are
//! skipped and parsing stops at the device class section (`C `).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Where distributions usually install the database.
pub const DEFAULT_PCI_IDS: &str = "/usr/share/hwdata/pci.ids";

#[derive(Debug, Default)]
struct PciVendor {
    name: String,
    devices: HashMap<u16, String>,
}

/// Vendor and device names keyed by their numeric ids.
#[derive(Debug, Default)]
pub struct PciNames {
    vendors: HashMap<u16, PciVendor>,
}

impl PciNames {
    /// Load and parse a `pci.ids` file.
    ///
    /// # Errors
    /// The file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let text: String = std::fs::read_to_string(path)
            .with_context(|| format!("read pci ids {}", path.display()))?;
        let names: Self = Self::parse(&text);
        debug!("loaded {} pci vendors from {}", names.vendors.len(), path.display());
        Ok(names)
    }

    /// Parse the text of a `pci.ids` file. Malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut vendors: HashMap<u16, PciVendor> = HashMap::new();
        let mut current: Option<u16> = None;

        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') || line.starts_with("\t\t") {
                continue;
            }
            if line.starts_with("C ") {
                break;
            }
            if let Some(rest) = line.strip_prefix('\t') {
                let (Some(vendor), Some((id, name))) = (current, split_entry(rest)) else {
                    continue;
                };
                if let Some(entry) = vendors.get_mut(&vendor) {
                    entry.devices.insert(id, name.to_string());
                }
            } else if let Some((id, name)) = split_entry(line) {
                vendors.insert(
                    id,
                    PciVendor {
                        name: name.to_string(),
                        devices: HashMap::new(),
                    },
                );
                current = Some(id);
            } else {
                current = None;
            }
        }
        Self { vendors }
    }

    /// Name of a vendor.
    pub fn vendor(&self, vendor: u16) -> Option<&str> {
        self.vendors.get(&vendor).map(|v| v.name.as_str())
    }

    /// Name of a device of a vendor.
    pub fn device(&self, vendor: u16, device: u16) -> Option<&str> {
        self.vendors
            .get(&vendor)
            .and_then(|v| v.devices.get(&device))
            .map(String::as_str)
    }

    /// `vendor device` description, falling back to the numeric ids for
    /// whatever is unknown.
    pub fn describe(&self, vendor: u16, device: u16) -> String {
        match (self.vendor(vendor), self.device(vendor, device)) {
            (Some(v), Some(d)) => format!("{v} {d}"),
            (Some(v), None) => format!("{v} Device {device:04x}"),
            _ => format!("{vendor:04x}:{device:04x}"),
        }
    }
}

/// Split `"8086  Intel Corporation"` into id and name.
fn split_entry(line: &str) -> Option<(u16, &str)> {
    let (id, name) = line.split_once(char::is_whitespace)?;
    let id: u16 = u16::from_str_radix(id, 16).ok()?;
    Some((id, name.trim()))
}

/// Parse an id attribute such as `"0x8086\n"`.
pub fn parse_id(value: &str) -> Option<u16> {
    let value: &str = value.trim();
    let digits: &str = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16).ok()
}

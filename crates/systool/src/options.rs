//! Display options shared by every command.

/// What to print and how much of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowOptions {
    /// List attribute names.
    pub attributes: bool,
    /// Print the value of this attribute only.
    pub attribute: Option<String>,
    /// Print every attribute together with its value.
    pub all_values: bool,
    /// Show devices.
    pub devices: bool,
    /// Show drivers.
    pub drivers: bool,
    /// Restrict listings to this bus id or class device name.
    pub device: Option<String>,
}

impl ShowOptions {
    /// Fill in the defaults: devices are shown unless drivers were asked
    /// for, and a device filter implies showing devices.
    pub fn with_defaults(mut self) -> Self {
        if self.device.is_some() || !self.drivers {
            self.devices = true;
        }
        self
    }

    /// Whether any attribute section is printed.
    pub fn wants_attributes(&self) -> bool {
        self.attributes || self.all_values || self.attribute.is_some()
    }

    /// Whether any attribute value is printed.
    pub fn wants_values(&self) -> bool {
        self.all_values || self.attribute.is_some()
    }

    /// Whether any flag beyond the target selection was given.
    pub fn has_display_flags(&self) -> bool {
        self.wants_attributes() || self.devices || self.drivers || self.device.is_some()
    }

    /// Whether the entity called `name` passes the device filter.
    pub fn selects(&self, name: &str) -> bool {
        self.device.as_deref().map_or(true, |d| d == name)
    }

    pub(crate) fn shows_name(&self, attribute: &str) -> bool {
        self.attributes || self.all_values || self.shows_value(attribute)
    }

    pub(crate) fn shows_value(&self, attribute: &str) -> bool {
        self.all_values || self.attribute.as_deref() == Some(attribute)
    }
}

//! Listing front end for sysfs buses, classes and device trees.
//!
//! Every `show_*` command runs in two phases. The load phase opens the
//! entities it needs through a [`Sysfs`](rusty_sysfs_graph::Sysfs) session
//! and reads the attribute values asked for by [`ShowOptions`]. The render
//! phase then walks the session read-only and writes text to any
//! [`std::io::Write`].
//!
//! ```text
//! Bus: usb
//! Devices:
//!    1-1
//!        Children:
//!            1-1:1.0
//!        Driver: usbhid
//! ```

pub mod commands;
pub mod options;
pub mod pci_names;
pub mod render;

pub use commands::{show_bus, show_class, show_default_info, show_root};
pub use options::ShowOptions;
pub use pci_names::{PciNames, DEFAULT_PCI_IDS};
pub use render::Printer;

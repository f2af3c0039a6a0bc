//! `systool`: list sysfs buses, classes and devices.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rusty_sysfs_graph::{Sysfs, SysfsOptions};
use rusty_sysfs_systool::{
    show_bus, show_class, show_default_info, show_root, PciNames, ShowOptions, DEFAULT_PCI_IDS,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "systool",
    version,
    about = "List sysfs buses, classes and devices",
    override_usage = "systool [OPTIONS] [DEVICE]"
)]
struct Cli {
    /// Show attributes.
    #[arg(short = 'a')]
    attributes: bool,
    /// Show the value of one attribute.
    #[arg(short = 'A', value_name = "ATTRIBUTE_NAME")]
    attribute: Option<String>,
    /// Show a specific bus.
    #[arg(short = 'b', value_name = "BUS_NAME")]
    bus: Option<String>,
    /// Show a specific class.
    #[arg(short = 'c', value_name = "CLASS_NAME")]
    class: Option<String>,
    /// Show a specific root device tree.
    #[arg(short = 'r', value_name = "ROOT_DEVICE")]
    root: Option<String>,
    /// Show only devices.
    #[arg(short = 'd')]
    devices: bool,
    /// Show only drivers.
    #[arg(short = 'D')]
    drivers: bool,
    /// Show all attributes with values.
    #[arg(short = 'v')]
    all_values: bool,
    /// Read this directory instead of the mounted sysfs.
    #[arg(long, value_name = "DIR")]
    sysfs_root: Option<PathBuf>,
    /// PCI id database used to name PCI devices.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_PCI_IDS)]
    pci_ids: PathBuf,
    /// Only show this device.
    device: Option<String>,
}

impl Cli {
    fn show_options(&self) -> ShowOptions {
        ShowOptions {
            attributes: self.attributes,
            attribute: self.attribute.clone(),
            all_values: self.all_values,
            devices: self.devices,
            drivers: self.drivers,
            device: self.device.clone(),
        }
    }

    fn has_target(&self) -> bool {
        self.bus.is_some() || self.class.is_some() || self.root.is_some()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli: Cli = Cli::parse();
    let stdout = std::io::stdout();
    run(&cli, stdout.lock())
}

fn run<W: Write>(cli: &Cli, mut out: W) -> Result<()> {
    let options: ShowOptions = cli.show_options();
    if !cli.has_target() && options.has_display_flags() {
        bail!("please specify a bus, class, or root device");
    }
    let options: ShowOptions = options.with_defaults();

    let sysfs_options: SysfsOptions = match &cli.sysfs_root {
        Some(root) => SysfsOptions::fixed_root(root),
        None => SysfsOptions::default(),
    };
    let mut sysfs: Sysfs = Sysfs::open(sysfs_options).context("error getting sysfs mount point")?;

    if !cli.has_target() {
        return show_default_info(&sysfs, out);
    }

    let pci_names: Option<PciNames> = match PciNames::load(&cli.pci_ids) {
        Ok(names) => Some(names),
        Err(e) => {
            debug!("pci names unavailable: {e:#}");
            None
        }
    };

    if let Some(bus) = &cli.bus {
        show_bus(&mut sysfs, bus, &options, pci_names.as_ref(), &mut out)?;
    }
    if let Some(class) = &cli.class {
        show_class(&mut sysfs, class, &options, pci_names.as_ref(), &mut out)?;
    }
    if let Some(root) = &cli.root {
        show_root(&mut sysfs, root, &options, pci_names.as_ref(), &mut out)?;
    }
    Ok(())
}

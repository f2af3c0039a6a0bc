//! Synthetic sysfs trees for integration tests.
#![allow(dead_code)]

use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use rusty_sysfs_graph::Sysfs;
use tempfile::TempDir;

/// A sysfs-shaped tree in a temporary directory.
pub struct SysfsFixture {
    dir: TempDir,
}

impl SysfsFixture {
    /// Create an empty tree with the top-level subsystem directories.
    pub fn new() -> Self {
        let dir: TempDir = TempDir::new().unwrap();
        for top in ["bus", "class", "devices", "block"] {
            std::fs::create_dir_all(dir.path().join(top)).unwrap();
        }
        Self { dir }
    }

    /// The USB tree:
    ///
    /// ```text
    /// bus/usb/devices/1-1 -> ../../../devices/usb1/1-1
    /// bus/usb/drivers/usbhid/1-1 -> ../../../../devices/usb1/1-1
    /// devices/usb1/1-1/driver -> ../../../bus/usb/drivers/usbhid
    /// devices/usb1/1-1/config       (binary)
    /// devices/usb1/1-1/descriptor   "0x1234\n"
    /// ```
    pub fn usb() -> Self {
        let fixture: Self = Self::new();
        fixture.device("devices/usb1");
        fixture.device("devices/usb1/1-1");
        fixture.write("devices/usb1/1-1/config", &[0x09, 0x02, 0x22, 0x00, 0x01, 0x01]);
        fixture.write("devices/usb1/1-1/descriptor", b"0x1234\n");
        fixture.link("devices/usb1/1-1/driver", "../../../bus/usb/drivers/usbhid");
        fixture.mkdir("bus/usb/devices");
        fixture.mkdir("bus/usb/drivers/usbhid");
        fixture.write("bus/usb/drivers/usbhid/bind", b"");
        fixture.link("bus/usb/devices/1-1", "../../../devices/usb1/1-1");
        fixture.link("bus/usb/drivers/usbhid/1-1", "../../../../devices/usb1/1-1");
        fixture
    }

    /// Root of the tree.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `rel`.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Open a session over the tree.
    pub fn open(&self) -> Sysfs {
        match Sysfs::with_root(self.root()) {
            Ok(sysfs) => sysfs,
            Err(e) => panic!("failed to open fixture: {e}"),
        }
    }

    /// Create a directory and its parents.
    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path: PathBuf = self.path(rel);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    /// Create a device directory carrying a `uevent` attribute.
    pub fn device(&self, rel: &str) -> PathBuf {
        let path: PathBuf = self.mkdir(rel);
        std::fs::write(path.join("uevent"), b"").unwrap();
        path
    }

    /// Write an attribute file, creating parent directories.
    pub fn write(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path: PathBuf = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Set the permission bits of `rel`.
    pub fn chmod(&self, rel: &str, mode: u32) {
        std::fs::set_permissions(self.path(rel), std::fs::Permissions::from_mode(mode)).unwrap();
    }

    /// Create a symlink at `rel` pointing to `target`.
    pub fn link(&self, rel: &str, target: &str) {
        let path: PathBuf = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        symlink(target, path).unwrap();
    }
}

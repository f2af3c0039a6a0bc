//! Sysfs mount point discovery.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SysfsError;
use crate::options::{RootSource, SysfsOptions, DEFAULT_MOUNT_PATH, SYSFS_FSTYPE, SYSFS_PATH_ENV};
use crate::path::trimmed;

/// One entry of a `/proc/mounts`-style table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mounted device or pseudo source.
    pub source: String,
    /// Mount point.
    pub dir: PathBuf,
    /// Filesystem type.
    pub fstype: String,
}

/// Resolves the sysfs root directory.
pub struct MountResolver;

impl MountResolver {
    /// Resolve the sysfs root described by `options`.
    ///
    /// `RootSource::Fixed` roots are only checked for being a directory.
    /// `RootSource::Discover` takes `$SYSFS_PATH` (trailing slashes
    /// trimmed) or `/sys` and requires a matching `sysfs` entry in the
    /// mount table.
    ///
    /// # Errors
    /// - `NotFound` if a fixed root is not a directory
    /// - `NotMounted` if no sysfs mount exists at the candidate path
    /// - `Io` if the mount table cannot be read
    pub fn resolve(options: &SysfsOptions) -> Result<PathBuf, SysfsError> {
        match &options.root {
            RootSource::Fixed(root) => {
                let root: PathBuf = trimmed(root);
                if !root.is_dir() {
                    return Err(SysfsError::not_found(&root));
                }
                Ok(root)
            }
            RootSource::Discover => {
                let candidate: PathBuf = match std::env::var_os(SYSFS_PATH_ENV) {
                    Some(value) if !value.is_empty() => trimmed(Path::new(&value)),
                    _ => PathBuf::from(DEFAULT_MOUNT_PATH),
                };
                Self::verify_mounted(&candidate, &options.mounts_file)?;
                Ok(candidate)
            }
        }
    }

    /// Check that `mount_path` appears in `mounts_file` with fstype `sysfs`.
    ///
    /// # Arguments
    /// * `mount_path` - Expected mount point
    /// * `mounts_file` - Mount table to search
    pub fn verify_mounted(mount_path: &Path, mounts_file: &Path) -> Result<(), SysfsError> {
        let table: String =
            std::fs::read_to_string(mounts_file).map_err(|e| SysfsError::io(mounts_file, e))?;

        let mounted: bool = parse_mount_table(&table)
            .iter()
            .any(|entry| entry.fstype == SYSFS_FSTYPE && entry.dir == mount_path);

        if mounted {
            Ok(())
        } else {
            debug!("no sysfs mount at {}", mount_path.display());
            Err(SysfsError::NotMounted {
                path: mount_path.to_path_buf(),
            })
        }
    }
}

/// Parse the whitespace-separated mount table format.
///
/// Octal escapes (`\040` for space and friends) in the source and mount
/// point fields are decoded. Malformed lines are skipped.
pub fn parse_mount_table(table: &str) -> Vec<MountEntry> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source: &str = fields.next()?;
            let dir: &str = fields.next()?;
            let fstype: &str = fields.next()?;
            Some(MountEntry {
                source: unescape_octal(source),
                dir: PathBuf::from(unescape_octal(dir)),
                fstype: fstype.to_string(),
            })
        })
        .collect()
}

/// Decode `\NNN` octal escapes as written by the kernel in mount tables.
fn unescape_octal(field: &str) -> String {
    let bytes: &[u8] = field.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i: usize = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits: &[u8] = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value: u32 = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

//! Configuration options for reading a sysfs tree.

use std::path::PathBuf;

/// Environment variable that overrides the sysfs mount point.
pub const SYSFS_PATH_ENV: &str = "SYSFS_PATH";

/// Default sysfs mount point.
pub const DEFAULT_MOUNT_PATH: &str = "/sys";

/// Mount table consulted to validate the mount point.
pub const DEFAULT_MOUNTS_FILE: &str = "/proc/mounts";

/// Filesystem type sysfs is mounted with.
pub const SYSFS_FSTYPE: &str = "sysfs";

/// Default upper bound on the bytes read from one attribute (one page).
pub const DEFAULT_MAX_ATTRIBUTE_LEN: usize = 4096;

/// Attribute names whose content is binary and must never be treated as text.
pub const DEFAULT_BINARY_ATTRIBUTES: &[&str] = &["config", "data"];

/// Where the sysfs root comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RootSource {
    /// `$SYSFS_PATH` if set, otherwise `/sys`, validated against the mount table.
    #[default]
    Discover,
    /// Use this directory as-is without consulting the mount table.
    Fixed(PathBuf),
}

/// What happens when a directory that was already read is read again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RereadPolicy {
    /// Replace the subdirectory, link and attribute collections.
    #[default]
    Refresh,
    /// Fail with `AlreadyPopulated`.
    Reject,
}

/// Options controlling mount discovery and directory/attribute reads.
#[derive(Debug, Clone)]
pub struct SysfsOptions {
    /// Source of the sysfs root directory.
    pub root: RootSource,
    /// Mount table to validate a discovered root against.
    pub mounts_file: PathBuf,
    /// Maximum number of bytes read from one attribute.
    pub max_attribute_len: usize,
    /// Attribute names classified as binary.
    pub binary_attributes: Vec<String>,
    /// Behavior of a second `read_directory` on the same node.
    pub reread_policy: RereadPolicy,
}

impl Default for SysfsOptions {
    fn default() -> Self {
        Self {
            root: RootSource::default(),
            mounts_file: PathBuf::from(DEFAULT_MOUNTS_FILE),
            max_attribute_len: DEFAULT_MAX_ATTRIBUTE_LEN,
            binary_attributes: DEFAULT_BINARY_ATTRIBUTES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reread_policy: RereadPolicy::default(),
        }
    }
}

impl SysfsOptions {
    /// Create options that treat `root` as the sysfs root.
    ///
    /// # Arguments
    /// * `root` - Directory holding a sysfs tree (or a copy of one)
    pub fn fixed_root(root: impl Into<PathBuf>) -> Self {
        Self::default().with_root(RootSource::Fixed(root.into()))
    }

    /// Set the root source.
    ///
    /// # Arguments
    /// * `root` - Root source to use
    pub fn with_root(mut self, root: RootSource) -> Self {
        self.root = root;
        self
    }

    /// Set the mount table used for validation.
    ///
    /// # Arguments
    /// * `mounts_file` - Path to a `/proc/mounts`-style file
    pub fn with_mounts_file(mut self, mounts_file: impl Into<PathBuf>) -> Self {
        self.mounts_file = mounts_file.into();
        self
    }

    /// Set the attribute read limit.
    ///
    /// # Arguments
    /// * `max` - Maximum bytes read per attribute (clamped to at least 1)
    pub fn with_max_attribute_len(mut self, max: usize) -> Self {
        self.max_attribute_len = max.max(1);
        self
    }

    /// Replace the binary attribute registry.
    ///
    /// # Arguments
    /// * `names` - Attribute names to classify as binary
    pub fn with_binary_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.binary_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the re-read policy.
    ///
    /// # Arguments
    /// * `policy` - Behavior of repeated directory reads
    pub fn with_reread_policy(mut self, policy: RereadPolicy) -> Self {
        self.reread_policy = policy;
        self
    }

    /// Check whether an attribute name is in the binary registry.
    pub fn is_binary_attribute(&self, name: &str) -> bool {
        self.binary_attributes.iter().any(|b| b == name)
    }
}

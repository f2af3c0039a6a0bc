//! Low-level access to a mounted sysfs tree.
//!
//! This crate turns sysfs paths into typed nodes without building any
//! cross-references between them:
//!
//! ```text
//! Layer 3: Attribute access (AttributeNode read/write)
//! Layer 2: Directory reading (DirectoryNode, LinkNode)
//! Layer 1: Path utilities (trim, last component, symlink resolution, mount discovery)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use rusty_sysfs_filesystem::{read_directory, MountResolver, SysfsOptions};
//!
//! let options = SysfsOptions::default();
//! let root = MountResolver::resolve(&options)?;
//! let mut node = read_directory(&root.join("class/net/lo"), &options)?;
//! if let Some(mtu) = node.attribute_mut("mtu") {
//!     println!("{:?}", mtu.read_value()?);
//! }
//! ```

pub mod attribute;
pub mod directory;
pub mod error;
pub mod mount;
pub mod options;
pub mod path;
pub mod symlink;

pub use attribute::{write_attribute_value, AccessMethod, AttributeNode};
pub use directory::{
    close_directory, list_link_names, list_subdirectory_names, read_directory, DirectoryNode,
    LinkNode,
};
pub use error::{ErrorKind, SysfsError};
pub use mount::{parse_mount_table, MountEntry, MountResolver};
pub use options::{
    RereadPolicy, RootSource, SysfsOptions, DEFAULT_BINARY_ATTRIBUTES, DEFAULT_MAX_ATTRIBUTE_LEN,
    DEFAULT_MOUNT_PATH, SYSFS_PATH_ENV,
};
pub use path::{
    last_component, path_is_dir, path_is_file, path_is_link, path_name, trim_trailing_slashes,
    trimmed, SYSFS_PATH_MAX,
};
pub use symlink::{
    read_symlink, read_symlink_unchecked, resolve_path_links, resolve_symlink,
    resolve_symlink_bounded, SymlinkInfo,
};

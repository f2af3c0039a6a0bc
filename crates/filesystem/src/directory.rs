//! Directory reading.
//!
//! A [`DirectoryNode`] is created unpopulated by [`DirectoryNode::open`].
//! [`DirectoryNode::read`] enumerates its entries once into three ordered
//! collections: subdirectories (themselves unpopulated), links (resolved
//! immediately) and attributes (values not yet read). A link whose target
//! is missing is kept with the target it names. Dropping a node releases
//! everything it owns.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::attribute::AttributeNode;
use crate::error::SysfsError;
use crate::options::{RereadPolicy, SysfsOptions};
use crate::path::{path_name, trimmed};
use crate::symlink::{read_symlink, read_symlink_unchecked, SymlinkInfo};

/// A symbolic link found in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkNode {
    name: String,
    path: PathBuf,
    target: PathBuf,
}

impl LinkNode {
    /// Read and resolve the link at `path`.
    ///
    /// # Errors
    /// Propagates [`read_symlink`] failures.
    pub fn open(path: &Path) -> Result<Self, SysfsError> {
        Self::from_info(read_symlink(path)?)
    }

    /// Read and resolve the link at `path`, allowing a missing target.
    ///
    /// # Errors
    /// Propagates [`read_symlink_unchecked`] failures.
    pub fn open_unchecked(path: &Path) -> Result<Self, SysfsError> {
        Self::from_info(read_symlink_unchecked(path)?)
    }

    fn from_info(info: SymlinkInfo) -> Result<Self, SysfsError> {
        Ok(Self {
            name: path_name(&info.path)?,
            path: info.path,
            target: info.resolved_target,
        })
    }

    /// Link name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the link itself.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolved absolute target.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Whether something exists at the target.
    pub fn target_exists(&self) -> bool {
        self.target.symlink_metadata().is_ok()
    }
}

/// One sysfs directory and, once read, its entries.
#[derive(Debug, Clone)]
pub struct DirectoryNode {
    name: String,
    path: PathBuf,
    populated: bool,
    subdirs: Vec<DirectoryNode>,
    links: Vec<LinkNode>,
    attributes: Vec<AttributeNode>,
}

impl DirectoryNode {
    /// Open the directory at `path` without enumerating it.
    ///
    /// # Errors
    /// - `InvalidArgument` if `path` is empty, relative, or not a directory
    /// - `NotFound` if nothing exists at `path`
    pub fn open(path: &Path) -> Result<Self, SysfsError> {
        if path.as_os_str().is_empty() || !path.is_absolute() {
            return Err(SysfsError::invalid(format!(
                "directory path must be absolute: {:?}",
                path
            )));
        }
        let path: PathBuf = trimmed(path);
        let metadata: std::fs::Metadata = match path.symlink_metadata() {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SysfsError::not_found(&path))
            }
            Err(e) => return Err(SysfsError::io(&path, e)),
        };
        if !metadata.is_dir() {
            return Err(SysfsError::invalid(format!(
                "not a directory: {}",
                path.display()
            )));
        }
        Self::unpopulated(path)
    }

    fn unpopulated(path: PathBuf) -> Result<Self, SysfsError> {
        Ok(Self {
            name: path_name(&path)?,
            path,
            populated: false,
            subdirs: Vec::new(),
            links: Vec::new(),
            attributes: Vec::new(),
        })
    }

    /// Directory name (last path component).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether [`read`](Self::read) has completed on this node.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Subdirectories, sorted by name.
    pub fn subdirs(&self) -> &[DirectoryNode] {
        &self.subdirs
    }

    /// Mutable subdirectories.
    pub fn subdirs_mut(&mut self) -> &mut [DirectoryNode] {
        &mut self.subdirs
    }

    /// Links, sorted by name.
    pub fn links(&self) -> &[LinkNode] {
        &self.links
    }

    /// Attributes, sorted by name.
    pub fn attributes(&self) -> &[AttributeNode] {
        &self.attributes
    }

    /// Mutable attributes.
    pub fn attributes_mut(&mut self) -> &mut [AttributeNode] {
        &mut self.attributes
    }

    /// Find a subdirectory by name.
    pub fn subdir(&self, name: &str) -> Option<&DirectoryNode> {
        self.subdirs.iter().find(|d| d.name == name)
    }

    /// Find a subdirectory by name, mutably.
    pub fn subdir_mut(&mut self, name: &str) -> Option<&mut DirectoryNode> {
        self.subdirs.iter_mut().find(|d| d.name == name)
    }

    /// Find a link by name.
    pub fn link(&self, name: &str) -> Option<&LinkNode> {
        self.links.iter().find(|l| l.name == name)
    }

    /// Find an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeNode> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Find an attribute by name, mutably.
    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut AttributeNode> {
        self.attributes.iter_mut().find(|a| a.name() == name)
    }

    /// Enumerate the directory's entries.
    ///
    /// Subdirectories are opened but not read, links are resolved, and
    /// attributes are opened without reading their values. Dangling links
    /// are kept; links that cannot be read at all are skipped. On a node that
    /// was already read, [`RereadPolicy::Refresh`] replaces the three
    /// collections and [`RereadPolicy::Reject`] fails.
    ///
    /// # Errors
    /// - `AlreadyPopulated` on a re-read under `RereadPolicy::Reject`
    /// - `Io` if the directory cannot be listed
    pub fn read(&mut self, options: &SysfsOptions) -> Result<(), SysfsError> {
        if self.populated && options.reread_policy == RereadPolicy::Reject {
            return Err(SysfsError::AlreadyPopulated {
                path: self.path.clone(),
            });
        }
        self.refresh(options)
    }

    /// Re-enumerate the directory regardless of the re-read policy.
    ///
    /// The collections are only replaced once enumeration succeeded.
    pub fn refresh(&mut self, options: &SysfsOptions) -> Result<(), SysfsError> {
        let mut subdirs: Vec<DirectoryNode> = Vec::new();
        let mut links: Vec<LinkNode> = Vec::new();
        let mut attributes: Vec<AttributeNode> = Vec::new();

        let walker = WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry: walkdir::DirEntry = entry.map_err(|e| {
                let path: PathBuf = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.path.clone());
                SysfsError::io(path, e.into())
            })?;

            let path: &Path = entry.path();
            let file_type: std::fs::FileType = entry.file_type();

            if file_type.is_dir() {
                subdirs.push(Self::unpopulated(path.to_path_buf())?);
            } else if file_type.is_symlink() {
                match LinkNode::open_unchecked(path) {
                    Ok(link) => {
                        if !link.target_exists() {
                            debug!(
                                "dangling link {} -> {}",
                                path.display(),
                                link.target().display()
                            );
                        }
                        links.push(link);
                    }
                    Err(e) => debug!("skipping link {}: {}", path.display(), e),
                }
            } else if file_type.is_file() {
                let metadata: std::fs::Metadata =
                    entry.metadata().map_err(|e| SysfsError::io(path, e.into()))?;
                attributes.push(AttributeNode::from_metadata(path, &metadata, options)?);
            } else {
                trace!("skipping special file {}", path.display());
            }
        }

        debug!(
            "read {}: {} subdirs, {} links, {} attributes",
            self.path.display(),
            subdirs.len(),
            links.len(),
            attributes.len()
        );

        self.subdirs = subdirs;
        self.links = links;
        self.attributes = attributes;
        self.populated = true;
        Ok(())
    }

    /// Read this directory (if needed) and every subdirectory below it.
    ///
    /// Already-populated nodes are left as they are.
    pub fn read_all_subdirs(&mut self, options: &SysfsOptions) -> Result<(), SysfsError> {
        if !self.populated {
            self.read(options)?;
        }
        for subdir in &mut self.subdirs {
            subdir.read_all_subdirs(options)?;
        }
        Ok(())
    }

    /// Read the value of every readable attribute in this directory.
    ///
    /// Individual failures do not stop the pass; they are returned so the
    /// caller can decide whether a missing value matters.
    ///
    /// # Returns
    /// The attribute names that failed together with their errors.
    pub fn read_attribute_values(&mut self) -> Vec<(String, SysfsError)> {
        let mut failures: Vec<(String, SysfsError)> = Vec::new();
        for attribute in self.attributes.iter_mut().filter(|a| a.method().can_show()) {
            if let Err(e) = attribute.read_value() {
                debug!("failed to read {}: {}", attribute.path().display(), e);
                failures.push((attribute.name().to_string(), e));
            }
        }
        failures
    }

    /// Re-read every attribute whose value was read before.
    ///
    /// # Errors
    /// The first failing read; attributes after it keep their old values.
    pub fn refresh_attributes(&mut self) -> Result<(), SysfsError> {
        for attribute in self.attributes.iter_mut().filter(|a| a.is_loaded()) {
            attribute.read_value()?;
        }
        Ok(())
    }

    /// Total number of directory nodes owned by this node, itself included.
    pub fn node_count(&self) -> usize {
        1 + self.subdirs.iter().map(DirectoryNode::node_count).sum::<usize>()
    }

    /// Release the node and everything it owns.
    pub fn close(self) {
        trace!("closing directory {}", self.path.display());
    }
}

/// Open and read the directory at `path`.
///
/// # Errors
/// See [`DirectoryNode::open`] and [`DirectoryNode::read`].
pub fn read_directory(path: &Path, options: &SysfsOptions) -> Result<DirectoryNode, SysfsError> {
    let mut node: DirectoryNode = DirectoryNode::open(path)?;
    node.read(options)?;
    Ok(node)
}

/// Close a directory node if there is one.
pub fn close_directory(node: Option<DirectoryNode>) {
    if let Some(node) = node {
        node.close();
    }
}

/// Names of the subdirectories directly under `path`, sorted.
///
/// # Errors
/// See [`read_directory`].
pub fn list_subdirectory_names(path: &Path) -> Result<Vec<String>, SysfsError> {
    let node: DirectoryNode = read_directory(path, &SysfsOptions::default())?;
    Ok(node.subdirs.iter().map(|d| d.name.clone()).collect())
}

/// Names of the links directly under `path`, sorted.
///
/// # Errors
/// See [`read_directory`].
pub fn list_link_names(path: &Path) -> Result<Vec<String>, SysfsError> {
    let node: DirectoryNode = read_directory(path, &SysfsOptions::default())?;
    Ok(node.links.iter().map(|l| l.name.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn build_tree(root: &Path) {
        std::fs::create_dir_all(root.join("devices/usb1/1-1/power")).unwrap();
        std::fs::write(root.join("devices/usb1/1-1/descriptor"), b"0x1234\n").unwrap();
        std::fs::write(root.join("devices/usb1/1-1/power/control"), b"auto\n").unwrap();
        std::os::unix::fs::symlink("../../usb1", root.join("devices/usb1/1-1/parent_link"))
            .unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_open_does_not_populate() {
        let dir: TempDir = TempDir::new().unwrap();
        build_tree(dir.path());

        let node: DirectoryNode =
            DirectoryNode::open(&dir.path().join("devices/usb1/1-1/")).unwrap();
        assert_eq!(node.name(), "1-1");
        assert_eq!(node.path(), dir.path().join("devices/usb1/1-1"));
        assert!(!node.is_populated());
        assert!(node.subdirs().is_empty());
        assert!(node.attributes().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_classifies_entries() {
        let dir: TempDir = TempDir::new().unwrap();
        build_tree(dir.path());

        let node: DirectoryNode =
            read_directory(&dir.path().join("devices/usb1/1-1"), &SysfsOptions::default()).unwrap();

        assert_eq!(node.subdirs().len(), 1);
        assert_eq!(node.subdirs()[0].name(), "power");
        assert!(!node.subdirs()[0].is_populated());
        assert_eq!(node.links().len(), 1);
        assert_eq!(node.links()[0].target(), dir.path().join("devices/usb1"));
        assert_eq!(node.attributes().len(), 1);
        assert!(!node.attribute("descriptor").unwrap().is_loaded());
    }

    #[cfg(unix)]
    #[test]
    fn test_reread_policies() {
        let dir: TempDir = TempDir::new().unwrap();
        build_tree(dir.path());
        let path: PathBuf = dir.path().join("devices/usb1/1-1");

        let mut node: DirectoryNode = read_directory(&path, &SysfsOptions::default()).unwrap();
        node.read(&SysfsOptions::default()).unwrap();
        assert_eq!(node.attributes().len(), 1);
        assert_eq!(node.subdirs().len(), 1);

        let strict: SysfsOptions = SysfsOptions::default().with_reread_policy(RereadPolicy::Reject);
        let err: SysfsError = node.read(&strict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyPopulated);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_all_subdirs() {
        let dir: TempDir = TempDir::new().unwrap();
        build_tree(dir.path());

        let mut node: DirectoryNode = DirectoryNode::open(&dir.path().join("devices")).unwrap();
        node.read_all_subdirs(&SysfsOptions::default()).unwrap();

        let power: &DirectoryNode = node
            .subdir("usb1")
            .and_then(|d| d.subdir("1-1"))
            .and_then(|d| d.subdir("power"))
            .unwrap();
        assert!(power.is_populated());
        assert!(power.attribute("control").is_some());
        assert_eq!(node.node_count(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_keeps_dangling_link() {
        let dir: TempDir = TempDir::new().unwrap();
        build_tree(dir.path());
        let device: PathBuf = dir.path().join("devices/usb1/1-1");
        std::os::unix::fs::symlink("../../../bus/usb/drivers/usbhid", device.join("driver"))
            .unwrap();

        let node: DirectoryNode = read_directory(&device, &SysfsOptions::default()).unwrap();
        let driver: &LinkNode = node.link("driver").unwrap();
        assert_eq!(driver.target(), dir.path().join("bus/usb/drivers/usbhid"));
        assert!(!driver.target_exists());
        assert!(node.link("parent_link").unwrap().target_exists());
        assert!(LinkNode::open(&device.join("driver")).is_err());
    }

    #[test]
    fn test_open_errors() {
        let dir: TempDir = TempDir::new().unwrap();
        let file: PathBuf = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        assert_eq!(
            DirectoryNode::open(&dir.path().join("missing")).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DirectoryNode::open(&file).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            DirectoryNode::open(Path::new("relative/dir")).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_list_names() {
        let dir: TempDir = TempDir::new().unwrap();
        build_tree(dir.path());

        assert_eq!(
            list_subdirectory_names(&dir.path().join("devices")).unwrap(),
            vec!["usb1".to_string()]
        );
        assert_eq!(
            list_link_names(&dir.path().join("devices/usb1/1-1")).unwrap(),
            vec!["parent_link".to_string()]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_read_attribute_values() {
        let dir: TempDir = TempDir::new().unwrap();
        build_tree(dir.path());

        let mut node: DirectoryNode =
            read_directory(&dir.path().join("devices/usb1/1-1"), &SysfsOptions::default()).unwrap();
        let failures: Vec<(String, SysfsError)> = node.read_attribute_values();
        assert!(failures.is_empty());
        assert_eq!(
            node.attribute("descriptor").unwrap().text().as_deref(),
            Some("0x1234")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_refresh_attributes_only_touches_loaded() {
        let dir: TempDir = TempDir::new().unwrap();
        build_tree(dir.path());
        let dev: PathBuf = dir.path().join("devices/usb1/1-1");
        std::fs::write(dev.join("speed"), b"12\n").unwrap();

        let mut node: DirectoryNode = read_directory(&dev, &SysfsOptions::default()).unwrap();
        node.attribute_mut("descriptor").unwrap().read_value().unwrap();

        std::fs::write(dev.join("descriptor"), b"0x5678\n").unwrap();
        node.refresh_attributes().unwrap();

        assert_eq!(
            node.attribute("descriptor").unwrap().text().as_deref(),
            Some("0x5678")
        );
        assert!(!node.attribute("speed").unwrap().is_loaded());
    }
}

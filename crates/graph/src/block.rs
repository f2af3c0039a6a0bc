//! Block devices.
//!
//! A block device directory is read in full: besides its own attributes it
//! carries a `queue` subtree (with the I/O scheduler settings in
//! `queue/iosched`) and one subdirectory per partition.

use std::path::PathBuf;

use rusty_sysfs_filesystem::{path_is_dir, path_is_link, AttributeNode, DirectoryNode, SysfsError};
use tracing::debug;

use crate::bus::{check_name, existing_target};
use crate::entity::{impl_entity, EntityId, EntityKind, RefList, SysfsEntity};
use crate::sysfs::Sysfs;

/// Name of the request queue subdirectory.
pub const QUEUE_DIR: &str = "queue";
/// Name of the scheduler subdirectory inside the queue.
pub const IOSCHED_DIR: &str = "iosched";

/// A block device under `<root>/block`.
#[derive(Debug)]
pub struct BlockDevice {
    name: String,
    path: PathBuf,
    directory: DirectoryNode,
    /// Owning, at most one member: the device behind the `device` link.
    device: RefList,
}

impl_entity!(BlockDevice, EntityKind::BlockDevice, [device]);

impl BlockDevice {
    /// Underlying device, if the block device has a `device` link.
    pub fn device(&self) -> Option<EntityId> {
        self.device.first()
    }

    /// Partition directories: every subdirectory other than `queue` that
    /// carries a `dev` attribute.
    pub fn partitions(&self) -> Vec<&DirectoryNode> {
        self.directory
            .subdirs()
            .iter()
            .filter(|d| d.name() != QUEUE_DIR && d.attribute("dev").is_some())
            .collect()
    }

    /// Find a partition by name.
    pub fn partition(&self, name: &str) -> Option<&DirectoryNode> {
        self.partitions().into_iter().find(|d| d.name() == name)
    }

    /// The `queue` directory.
    pub fn queue(&self) -> Option<&DirectoryNode> {
        self.directory.subdir(QUEUE_DIR)
    }

    /// The `queue/iosched` directory.
    pub fn iosched(&self) -> Option<&DirectoryNode> {
        self.queue().and_then(|q| q.subdir(IOSCHED_DIR))
    }
}

impl Sysfs {
    /// Open `<root>/block/<name>` with its whole subtree.
    ///
    /// # Returns
    /// A caller-owned handle.
    ///
    /// # Errors
    /// - `InvalidArgument` if `name` is not a single path component
    /// - `NotFound` if the block device does not exist
    pub fn open_block_device(&mut self, name: &str) -> Result<EntityId, SysfsError> {
        check_name(name, "block device")?;
        let entry: PathBuf = self.block_path(name);
        if !path_is_link(&entry) && !path_is_dir(&entry) {
            return Err(SysfsError::not_found(entry));
        }
        let path: PathBuf = self.canonical(&entry)?;
        if let Some(id) = self.reuse(EntityKind::BlockDevice, &path)? {
            return Ok(id);
        }

        let mut directory: DirectoryNode = DirectoryNode::open(&path)?;
        directory.read_all_subdirs(self.options())?;

        let device_link: Option<PathBuf> = directory
            .link("device")
            .filter(|l| existing_target(l))
            .map(|l| l.target().to_path_buf());
        let device_ids: Vec<EntityId> = match device_link {
            Some(link) => vec![self.open_device(&link)?],
            None => Vec::new(),
        };
        let device: RefList = self.adopt_all(device_ids)?;

        let block: BlockDevice = BlockDevice {
            name: name.to_string(),
            path,
            directory,
            device,
        };
        debug!(
            "opened block device {} with {} partitions",
            name,
            block.partitions().len()
        );
        self.registry_mut().insert(Box::new(block))
    }

    /// Get an open block device.
    ///
    /// # Errors
    /// `UnknownEntity` or `WrongEntityKind`.
    pub fn block_device(&self, id: EntityId) -> Result<&BlockDevice, SysfsError> {
        self.registry().get_as::<BlockDevice>(id)
    }

    /// Attribute of a partition, read on first access.
    pub fn block_partition_attribute(
        &mut self,
        id: EntityId,
        partition: &str,
        name: &str,
    ) -> Result<Option<&AttributeNode>, SysfsError> {
        if self.block_device(id)?.partition(partition).is_none() {
            return Ok(None);
        }
        self.nested_attribute(id, &[partition], name)
    }

    /// Attribute of the request queue, read on first access.
    pub fn block_queue_attribute(
        &mut self,
        id: EntityId,
        name: &str,
    ) -> Result<Option<&AttributeNode>, SysfsError> {
        self.nested_attribute(id, &[QUEUE_DIR], name)
    }

    /// Attribute of the I/O scheduler, read on first access.
    pub fn block_iosched_attribute(
        &mut self,
        id: EntityId,
        name: &str,
    ) -> Result<Option<&AttributeNode>, SysfsError> {
        self.nested_attribute(id, &[QUEUE_DIR, IOSCHED_DIR], name)
    }

    fn nested_attribute(
        &mut self,
        id: EntityId,
        subdirs: &[&str],
        name: &str,
    ) -> Result<Option<&AttributeNode>, SysfsError> {
        let block: &mut BlockDevice = self.registry_mut().get_as_mut::<BlockDevice>(id)?;
        let mut dir: &mut DirectoryNode = block.directory_mut();
        for subdir in subdirs {
            match dir.subdir_mut(subdir) {
                Some(next) => dir = next,
                None => return Ok(None),
            }
        }
        let Some(attribute) = dir.attribute_mut(name) else {
            return Ok(None);
        };
        if !attribute.is_loaded() && attribute.method().can_show() {
            attribute.read_value()?;
        }
        Ok(Some(&*attribute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::SysfsEntity;
    use rusty_sysfs_filesystem::ErrorKind;
    use std::os::unix::fs::symlink;
    use std::path::Path;
    use tempfile::TempDir;

    /// `block/sda -> ../devices/pci0000:00/host0/block/sda` with two
    /// partitions, a queue and a scheduler.
    fn build_block(root: &Path) -> PathBuf {
        let host: PathBuf = root.join("devices/pci0000:00/host0");
        let sda: PathBuf = host.join("block/sda");
        std::fs::create_dir_all(sda.join("queue/iosched")).unwrap();
        std::fs::create_dir_all(sda.join("sda1")).unwrap();
        std::fs::create_dir_all(sda.join("sda2")).unwrap();
        std::fs::create_dir_all(sda.join("holders")).unwrap();
        std::fs::write(sda.join("dev"), b"8:0\n").unwrap();
        std::fs::write(sda.join("size"), b"1024\n").unwrap();
        std::fs::write(sda.join("sda1/dev"), b"8:1\n").unwrap();
        std::fs::write(sda.join("sda1/start"), b"2048\n").unwrap();
        std::fs::write(sda.join("sda2/dev"), b"8:2\n").unwrap();
        std::fs::write(sda.join("queue/scheduler"), b"[mq-deadline] none\n").unwrap();
        std::fs::write(sda.join("queue/iosched/fifo_batch"), b"16\n").unwrap();
        symlink("../../../host0", sda.join("device")).unwrap();
        std::fs::create_dir_all(root.join("block")).unwrap();
        symlink("../devices/pci0000:00/host0/block/sda", root.join("block/sda")).unwrap();
        sda
    }

    #[test]
    fn test_open_block_device() {
        let dir: TempDir = TempDir::new().unwrap();
        let sda: PathBuf = build_block(dir.path());
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let id: EntityId = sysfs.open_block_device("sda").unwrap();
        let block: &BlockDevice = sysfs.block_device(id).unwrap();
        assert_eq!(block.path(), sda);
        let names: Vec<&str> = block.partitions().into_iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["sda1", "sda2"]);
        assert!(block.iosched().is_some());

        let device: EntityId = block.device().unwrap();
        assert_eq!(sysfs.device(device).unwrap().bus_id(), "host0");

        assert_eq!(
            sysfs
                .block_partition_attribute(id, "sda1", "start")
                .unwrap()
                .unwrap()
                .text()
                .as_deref(),
            Some("2048")
        );
        assert_eq!(
            sysfs
                .block_queue_attribute(id, "scheduler")
                .unwrap()
                .unwrap()
                .text()
                .as_deref(),
            Some("[mq-deadline] none")
        );
        assert_eq!(
            sysfs
                .block_iosched_attribute(id, "fifo_batch")
                .unwrap()
                .unwrap()
                .text()
                .as_deref(),
            Some("16")
        );
        assert!(sysfs
            .block_partition_attribute(id, "holders", "dev")
            .unwrap()
            .is_none());

        sysfs.close(id).unwrap();
        assert_eq!(sysfs.registry().live(), 0);
    }

    #[test]
    fn test_open_missing_block_device() {
        let dir: TempDir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("block")).unwrap();
        let mut sysfs: Sysfs = Sysfs::with_root(dir.path()).unwrap();

        let err: SysfsError = sysfs.open_block_device("sdz").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

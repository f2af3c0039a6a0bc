//! Attribute file access.
//!
//! An attribute is one regular file under a sysfs directory. Its value is
//! read on demand and cached until the next explicit read or write.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SysfsError;
use crate::options::SysfsOptions;
use crate::path::path_name;

/// Access methods an attribute supports, derived from its owner permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMethod {
    /// Readable only (`show`).
    ReadOnly,
    /// Writable only (`store`).
    WriteOnly,
    /// Readable and writable.
    ReadWrite,
    /// Neither; kernel attributes with mode 0 exist.
    None,
}

impl AccessMethod {
    /// Derive the access method from POSIX mode bits (owner read/write).
    pub fn from_mode(mode: u32) -> Self {
        match (mode & 0o400 != 0, mode & 0o200 != 0) {
            (true, true) => Self::ReadWrite,
            (true, false) => Self::ReadOnly,
            (false, true) => Self::WriteOnly,
            (false, false) => Self::None,
        }
    }

    /// Whether the attribute can be read.
    pub fn can_show(&self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Whether the attribute can be written.
    pub fn can_store(&self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// One attribute file and its cached value.
#[derive(Debug, Clone)]
pub struct AttributeNode {
    name: String,
    path: PathBuf,
    method: AccessMethod,
    is_binary: bool,
    max_len: usize,
    value: Option<Vec<u8>>,
}

impl AttributeNode {
    /// Open the attribute at `path` without reading its value.
    ///
    /// # Arguments
    /// * `path` - Path to the attribute file
    /// * `options` - Supplies the binary registry and read limit
    ///
    /// # Errors
    /// - `NotFound` if `path` does not exist
    /// - `InvalidArgument` if `path` is not a regular file
    pub fn open(path: &Path, options: &SysfsOptions) -> Result<Self, SysfsError> {
        let metadata: std::fs::Metadata = match path.metadata() {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SysfsError::not_found(path))
            }
            Err(e) => return Err(SysfsError::io(path, e)),
        };
        if !metadata.is_file() {
            return Err(SysfsError::invalid(format!(
                "not an attribute file: {}",
                path.display()
            )));
        }
        Self::from_metadata(path, &metadata, options)
    }

    /// Build a node from metadata already obtained by the directory reader.
    pub(crate) fn from_metadata(
        path: &Path,
        metadata: &std::fs::Metadata,
        options: &SysfsOptions,
    ) -> Result<Self, SysfsError> {
        let name: String = path_name(path)?;

        #[cfg(unix)]
        let method: AccessMethod = {
            use std::os::unix::fs::PermissionsExt;
            AccessMethod::from_mode(metadata.permissions().mode())
        };
        #[cfg(not(unix))]
        let method: AccessMethod = if metadata.permissions().readonly() {
            AccessMethod::ReadOnly
        } else {
            AccessMethod::ReadWrite
        };

        Ok(Self {
            is_binary: options.is_binary_attribute(&name),
            max_len: options.max_attribute_len,
            name,
            path: path.to_path_buf(),
            method,
            value: None,
        })
    }

    /// Attribute name (file name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the attribute file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Supported access method.
    pub fn method(&self) -> AccessMethod {
        self.method
    }

    /// Whether the attribute name is in the binary registry.
    pub fn is_binary(&self) -> bool {
        self.is_binary
    }

    /// Whether a value has been read successfully.
    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    /// Raw cached value, if one has been read.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Length of the cached value (0 before the first read).
    pub fn len(&self) -> usize {
        self.value.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Whether the cached value is empty or absent.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached value as text with one trailing newline removed.
    ///
    /// Returns `None` for binary attributes and before the first read.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        if self.is_binary {
            return None;
        }
        let raw: &[u8] = self.value.as_deref()?;
        let raw: &[u8] = raw.strip_suffix(b"\n").unwrap_or(raw);
        Some(String::from_utf8_lossy(raw))
    }

    /// Read the attribute file and cache its content.
    ///
    /// At most the configured maximum number of bytes is read.
    ///
    /// # Errors
    /// - `PermissionDenied` if the attribute is not readable
    /// - `Io` if opening or reading fails
    pub fn read_value(&mut self) -> Result<&[u8], SysfsError> {
        if !self.method.can_show() {
            return Err(SysfsError::PermissionDenied {
                path: self.path.clone(),
                operation: "read",
            });
        }

        let file: File = File::open(&self.path).map_err(|e| self.map_io(e, "read"))?;
        let mut buf: Vec<u8> = Vec::new();
        file.take(self.max_len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| self.map_io(e, "read"))?;

        Ok(self.value.insert(buf).as_slice())
    }

    /// Write `data` to the attribute and refresh the cached value.
    ///
    /// A failed or short write leaves the cached value as it was. After a
    /// successful write the value is dropped and re-read if the attribute
    /// is readable.
    ///
    /// # Errors
    /// - `PermissionDenied` if the attribute is not writable
    /// - `Io` on open/write failure, a short write, or a failed re-read
    pub fn write_value(&mut self, data: &[u8]) -> Result<(), SysfsError> {
        if !self.method.can_store() {
            return Err(SysfsError::PermissionDenied {
                path: self.path.clone(),
                operation: "write",
            });
        }

        write_attribute_value(&self.path, data).map_err(|e| match e {
            SysfsError::Io { source, .. } => self.map_io(source, "write"),
            other => other,
        })?;

        self.value = None;
        if self.method.can_show() {
            self.read_value()?;
        }
        Ok(())
    }

    fn map_io(&self, e: std::io::Error, operation: &'static str) -> SysfsError {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            SysfsError::PermissionDenied {
                path: self.path.clone(),
                operation,
            }
        } else {
            SysfsError::io(&self.path, e)
        }
    }
}

/// Write `data` to the attribute file at `path` in a single write call.
///
/// # Errors
/// `Io` if the file cannot be opened, the write fails, or fewer than
/// `data.len()` bytes were accepted.
pub fn write_attribute_value(path: &Path, data: &[u8]) -> Result<(), SysfsError> {
    let mut file: File = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| SysfsError::io(path, e))?;

    let written: usize = file.write(data).map_err(|e| SysfsError::io(path, e))?;
    if written != data.len() {
        debug!(
            "short write to {}: {} of {} bytes",
            path.display(),
            written,
            data.len()
        );
        return Err(SysfsError::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("partial write: {written} of {} bytes", data.len()),
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn set_mode(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_access_method_from_mode() {
        assert_eq!(AccessMethod::from_mode(0o644), AccessMethod::ReadWrite);
        assert_eq!(AccessMethod::from_mode(0o444), AccessMethod::ReadOnly);
        assert_eq!(AccessMethod::from_mode(0o200), AccessMethod::WriteOnly);
        assert_eq!(AccessMethod::from_mode(0o000), AccessMethod::None);
        assert!(AccessMethod::ReadWrite.can_show());
        assert!(!AccessMethod::WriteOnly.can_show());
        assert!(!AccessMethod::ReadOnly.can_store());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_text_strips_newline() {
        let dir: TempDir = TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("descriptor");
        std::fs::write(&path, b"0x1234\n").unwrap();
        set_mode(&path, 0o444);

        let mut attr: AttributeNode = AttributeNode::open(&path, &SysfsOptions::default()).unwrap();
        assert!(!attr.is_loaded());
        assert_eq!(attr.text(), None);

        attr.read_value().unwrap();
        assert_eq!(attr.bytes(), Some(&b"0x1234\n"[..]));
        assert_eq!(attr.len(), 7);
        assert_eq!(attr.text().as_deref(), Some("0x1234"));
    }

    #[cfg(unix)]
    #[test]
    fn test_binary_attribute_never_text() {
        let dir: TempDir = TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("config");
        std::fs::write(&path, [0x86u8, 0x80, 0x0a]).unwrap();
        set_mode(&path, 0o644);

        let mut attr: AttributeNode = AttributeNode::open(&path, &SysfsOptions::default()).unwrap();
        assert!(attr.is_binary());
        attr.read_value().unwrap();
        assert_eq!(attr.bytes(), Some(&[0x86u8, 0x80, 0x0a][..]));
        assert_eq!(attr.text(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_respects_limit() {
        let dir: TempDir = TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("big");
        std::fs::write(&path, vec![b'x'; 100]).unwrap();
        set_mode(&path, 0o444);

        let options: SysfsOptions = SysfsOptions::default().with_max_attribute_len(10);
        let mut attr: AttributeNode = AttributeNode::open(&path, &options).unwrap();
        assert_eq!(attr.read_value().unwrap().len(), 10);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_then_read_back() {
        let dir: TempDir = TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("control");
        std::fs::write(&path, b"auto\n").unwrap();
        set_mode(&path, 0o644);

        let mut attr: AttributeNode = AttributeNode::open(&path, &SysfsOptions::default()).unwrap();
        attr.read_value().unwrap();
        attr.write_value(b"on\n").unwrap();
        assert_eq!(attr.text().as_deref(), Some("on"));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_read_only_denied_keeps_value() {
        let dir: TempDir = TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("vendor");
        std::fs::write(&path, b"0x8086\n").unwrap();
        set_mode(&path, 0o444);

        let mut attr: AttributeNode = AttributeNode::open(&path, &SysfsOptions::default()).unwrap();
        attr.read_value().unwrap();

        let err: SysfsError = attr.write_value(b"0x1022").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(attr.text().as_deref(), Some("0x8086"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_keeps_value() {
        let dir: TempDir = TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("control");
        std::fs::write(&path, b"auto\n").unwrap();
        set_mode(&path, 0o644);

        let mut attr: AttributeNode = AttributeNode::open(&path, &SysfsOptions::default()).unwrap();
        attr.read_value().unwrap();

        // The backing file turns into something that cannot be written.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        let err: SysfsError = attr.write_value(b"on\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(attr.is_loaded());
        assert_eq!(attr.text().as_deref(), Some("auto"));
    }

    #[cfg(unix)]
    #[test]
    fn test_store_only_attribute() {
        let dir: TempDir = TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("bind");
        std::fs::write(&path, b"").unwrap();
        set_mode(&path, 0o200);

        let mut attr: AttributeNode = AttributeNode::open(&path, &SysfsOptions::default()).unwrap();
        assert_eq!(attr.method(), AccessMethod::WriteOnly);
        assert_eq!(
            attr.read_value().unwrap_err().kind(),
            ErrorKind::PermissionDenied
        );
        attr.write_value(b"1-1").unwrap();
        assert!(!attr.is_loaded());
        set_mode(&path, 0o600);
        assert_eq!(std::fs::read(&path).unwrap(), b"1-1");
    }

    #[test]
    fn test_open_missing() {
        let dir: TempDir = TempDir::new().unwrap();
        let err: SysfsError =
            AttributeNode::open(&dir.path().join("missing"), &SysfsOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_open_directory_rejected() {
        let dir: TempDir = TempDir::new().unwrap();
        let err: SysfsError =
            AttributeNode::open(dir.path(), &SysfsOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

//! Canonical path helpers and lstat-based path predicates.

use std::path::{Path, PathBuf};

use crate::error::SysfsError;

/// Upper bound on a resolved sysfs path (`PATH_MAX`).
pub const SYSFS_PATH_MAX: usize = 4096;

/// Remove every trailing `/` from `path` in place.
///
/// An empty string is left untouched. Note that `"/"` trims to `""`.
pub fn trim_trailing_slashes(path: &mut String) {
    let len: usize = path.trim_end_matches('/').len();
    path.truncate(len);
}

/// Return `path` without trailing separators.
///
/// # Arguments
/// * `path` - Path to trim
///
/// # Returns
/// A copy of `path` with trailing `/` characters removed.
pub fn trimmed(path: &Path) -> PathBuf {
    let mut s: String = path.to_string_lossy().into_owned();
    trim_trailing_slashes(&mut s);
    PathBuf::from(s)
}

/// Return the last `/`-delimited segment of `path`.
///
/// A trailing `/` is skipped, so `"/a/b/"` and `"/a/b"` both yield `"b"`.
///
/// # Errors
/// `InvalidArgument` if the path contains no `/` before its last segment.
pub fn last_component(path: &str) -> Result<&str, SysfsError> {
    if path.is_empty() {
        return Err(SysfsError::invalid("empty path"));
    }
    let trimmed: &str = path.trim_end_matches('/');
    let pos: usize = trimmed
        .rfind('/')
        .ok_or_else(|| SysfsError::invalid(format!("no '/' in path {path:?}")))?;
    Ok(&trimmed[pos + 1..])
}

/// [`last_component`] for `Path` values.
pub fn path_name(path: &Path) -> Result<String, SysfsError> {
    let s: std::borrow::Cow<'_, str> = path.to_string_lossy();
    last_component(&s).map(str::to_string)
}

/// Check if `path` is a directory, without following a final symlink.
pub fn path_is_dir(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_dir())
        .unwrap_or(false)
}

/// Check if `path` is a symbolic link.
pub fn path_is_link(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Check if `path` is a regular file, following symlinks.
pub fn path_is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_trim_trailing_slashes() {
        let mut path: String = "/sys/bus/usb///".to_string();
        trim_trailing_slashes(&mut path);
        assert_eq!(path, "/sys/bus/usb");

        let mut empty: String = String::new();
        trim_trailing_slashes(&mut empty);
        assert_eq!(empty, "");

        let mut root: String = "/".to_string();
        trim_trailing_slashes(&mut root);
        assert_eq!(root, "");
    }

    #[test]
    fn test_last_component() {
        assert_eq!(last_component("/a/b/").unwrap(), "b");
        assert_eq!(last_component("/a/b").unwrap(), "b");
        assert_eq!(last_component("/sys").unwrap(), "sys");
    }

    #[test]
    fn test_last_component_without_slash() {
        assert!(last_component("noslash").is_err());
        assert!(last_component("noslash/").is_err());
        assert!(last_component("").is_err());
        assert!(last_component("/").is_err());
    }

    #[test]
    fn test_path_name() {
        assert_eq!(path_name(Path::new("/sys/class/net/")).unwrap(), "net");
    }

    #[cfg(unix)]
    #[test]
    fn test_predicates() {
        let dir: TempDir = TempDir::new().unwrap();
        let file: PathBuf = dir.path().join("uevent");
        let link: PathBuf = dir.path().join("subsystem");
        std::fs::write(&file, b"").unwrap();
        std::os::unix::fs::symlink(dir.path(), &link).unwrap();

        assert!(path_is_dir(dir.path()));
        assert!(!path_is_dir(&link));
        assert!(path_is_link(&link));
        assert!(!path_is_link(&file));
        assert!(path_is_file(&file));
        assert!(!path_is_file(dir.path()));
        assert!(!path_is_file(&dir.path().join("missing")));
    }
}

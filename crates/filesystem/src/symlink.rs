//! Symlink target resolution.
//!
//! Sysfs links are almost always relative (`../../../devices/pci0000:00/...`)
//! and routinely climb out of directories that are themselves reached
//! through links (`/sys/class/net/eth0` is a link into `/sys/devices`).
//! Popping `..` lexically from such a base lands in the wrong subtree, so
//! every pop first replaces a symlinked base with its own resolved target.

use std::path::{Component, Path, PathBuf};

use tracing::trace;

use crate::error::SysfsError;
use crate::path::{path_is_link, trimmed, SYSFS_PATH_MAX};

/// Maximum number of nested link resolutions before giving up.
pub const MAX_LINK_DEPTH: usize = 40;

/// Information about a resolved symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkInfo {
    /// Path to the symlink itself.
    pub path: PathBuf,
    /// Target exactly as stored in the link.
    pub raw_target: PathBuf,
    /// Absolute target with `..` segments and intermediate links resolved.
    pub resolved_target: PathBuf,
}

/// Resolve the symlink at `path` to an absolute target path.
///
/// Equivalent to [`resolve_symlink_bounded`] with [`SYSFS_PATH_MAX`].
pub fn resolve_symlink(path: &Path) -> Result<PathBuf, SysfsError> {
    resolve_symlink_bounded(path, SYSFS_PATH_MAX)
}

/// Resolve the symlink at `path`, failing if the result exceeds `max_len` bytes.
///
/// Absolute targets are returned as stored (minus trailing slashes).
/// Relative targets are resolved against the directory containing `path`.
///
/// # Arguments
/// * `path` - Absolute path of the symlink
/// * `max_len` - Maximum length of the resolved path in bytes
///
/// # Errors
/// - `InvalidArgument` if `path` is empty or relative
/// - `PathTooLong` if the resolved path exceeds `max_len`
/// - `Io` if the link (or an intermediate link) cannot be read, or the
///   resolved target does not exist
/// - `SymlinkLoop` if resolution recurses deeper than [`MAX_LINK_DEPTH`]
pub fn resolve_symlink_bounded(path: &Path, max_len: usize) -> Result<PathBuf, SysfsError> {
    let info: SymlinkInfo = read_symlink(path)?;
    let len: usize = info.resolved_target.as_os_str().len();
    if len > max_len {
        return Err(SysfsError::PathTooLong { len, max: max_len });
    }
    Ok(info.resolved_target)
}

/// Read and resolve the symlink at `path`, keeping the raw target.
///
/// # Errors
/// Same as [`resolve_symlink_bounded`], except for the length check.
pub fn read_symlink(path: &Path) -> Result<SymlinkInfo, SysfsError> {
    let info: SymlinkInfo = read_symlink_unchecked(path)?;

    // A dangling link is a resolution failure, not a valid target.
    if let Err(e) = info.resolved_target.symlink_metadata() {
        return Err(SysfsError::io(&info.resolved_target, e));
    }
    Ok(info)
}

/// Read and resolve the symlink at `path` without requiring the target to exist.
///
/// The `..` segments of a dangling target are still popped through any
/// intermediate links, so the result names where the link points.
///
/// # Errors
/// Same as [`read_symlink`], except that a missing target is not an error.
pub fn read_symlink_unchecked(path: &Path) -> Result<SymlinkInfo, SysfsError> {
    if path.as_os_str().is_empty() {
        return Err(SysfsError::invalid("empty symlink path"));
    }
    if !path.is_absolute() {
        return Err(SysfsError::invalid(format!(
            "symlink path must be absolute: {}",
            path.display()
        )));
    }

    let path: PathBuf = trimmed(path);
    let raw_target: PathBuf = std::fs::read_link(&path).map_err(|e| SysfsError::io(&path, e))?;
    let resolved_target: PathBuf = resolve_at_depth(&path, &raw_target, 0)?;

    trace!(
        "resolved {} -> {}",
        path.display(),
        resolved_target.display()
    );

    Ok(SymlinkInfo {
        path,
        raw_target,
        resolved_target,
    })
}

/// Resolve every link component of the absolute path `path`.
///
/// Components below `base` are walked one at a time and each one that is
/// a link is replaced by its resolved target before the next is appended.
/// The `base` prefix itself is kept as given, so results stay comparable
/// with other paths built from it. Paths outside `base` are walked from
/// the filesystem root. Trailing slashes are ignored.
///
/// # Arguments
/// * `base` - Directory whose own path is taken as already canonical
/// * `path` - Absolute path to canonicalize
///
/// # Errors
/// - `InvalidArgument` if `path` is empty or relative
/// - `SymlinkLoop` if one component keeps resolving to links
/// - any [`resolve_symlink`] failure of a link component
pub fn resolve_path_links(base: &Path, path: &Path) -> Result<PathBuf, SysfsError> {
    if path.as_os_str().is_empty() || !path.is_absolute() {
        return Err(SysfsError::invalid(format!(
            "path must be absolute: {:?}",
            path
        )));
    }
    let path: PathBuf = trimmed(path);
    let base: PathBuf = trimmed(base);
    let (mut result, rest): (PathBuf, &Path) = match path.strip_prefix(&base) {
        Ok(rest) if !base.as_os_str().is_empty() => (base.clone(), rest),
        _ => (PathBuf::new(), path.as_path()),
    };

    for component in rest.components() {
        match component {
            Component::Normal(name) => {
                result.push(name);
                let mut depth: usize = 0;
                while path_is_link(&result) {
                    if depth >= MAX_LINK_DEPTH {
                        return Err(SysfsError::SymlinkLoop { path: result });
                    }
                    result = resolve_symlink(&result)?;
                    depth += 1;
                }
            }
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => result.push(component.as_os_str()),
        }
    }

    trace!("canonical {} -> {}", path.display(), result.display());
    Ok(result)
}

/// Resolve `raw_target` (read from the link at `link`) at the given nesting depth.
fn resolve_at_depth(link: &Path, raw_target: &Path, depth: usize) -> Result<PathBuf, SysfsError> {
    if depth >= MAX_LINK_DEPTH {
        return Err(SysfsError::SymlinkLoop {
            path: link.to_path_buf(),
        });
    }
    if raw_target.is_absolute() {
        return Ok(trimmed(raw_target));
    }

    let base: &Path = link
        .parent()
        .ok_or_else(|| SysfsError::invalid(format!("no parent for {}", link.display())))?;
    resolve_relative(base, raw_target, depth)
}

/// Resolve a relative path from a base directory.
///
/// Each `..` pops one level from `base`. When the level about to be popped
/// is itself a symlink, it is first replaced by its resolved target, so the
/// pop climbs the real directory tree rather than the link's location.
///
/// # Arguments
/// * `base` - Absolute directory the relative path starts from
/// * `relative` - Relative path to resolve
/// * `depth` - Current link nesting depth
///
/// # Returns
/// Resolved absolute path.
fn resolve_relative(base: &Path, relative: &Path, depth: usize) -> Result<PathBuf, SysfsError> {
    let mut result: PathBuf = base.to_path_buf();

    for component in relative.components() {
        match component {
            Component::ParentDir => {
                while path_is_link(&result) {
                    let raw: PathBuf =
                        std::fs::read_link(&result).map_err(|e| SysfsError::io(&result, e))?;
                    result = resolve_at_depth(&result, &raw, depth + 1)?;
                }
                result.pop();
            }
            Component::CurDir => {}
            Component::Normal(name) => {
                result.push(name);
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SysfsError::invalid(format!(
                    "unexpected root in relative target {}",
                    relative.display()
                )));
            }
        }
    }

    Ok(result)
}

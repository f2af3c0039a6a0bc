//! Sysfs error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Coarse classification of a [`SysfsError`].
///
/// Callers that only care about the category of a failure (and not the
/// offending path) match on this instead of the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty, oversized or malformed input.
    InvalidArgument,
    /// Path or entity does not exist.
    NotFound,
    /// The attribute access method forbids the operation.
    PermissionDenied,
    /// Underlying read, write or readlink failure.
    IoError,
    /// Re-read requested on a node that enforces single population.
    AlreadyPopulated,
}

/// Errors that can occur while reading or writing a sysfs tree.
#[derive(Debug, Error)]
pub enum SysfsError {
    /// Input rejected before touching the filesystem.
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Why the input was rejected.
        reason: String,
    },

    /// A resolved path does not fit the caller's length limit.
    #[error("Path too long: {len} bytes exceeds limit of {max}")]
    PathTooLong {
        /// Length of the resolved path.
        len: usize,
        /// Maximum length allowed by the caller.
        max: usize,
    },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Entity handle is not (or no longer) open.
    #[error("Unknown entity handle: {id}")]
    UnknownEntity {
        /// Raw handle value.
        id: u64,
    },

    /// Entity handle refers to a different kind of entity.
    #[error("Entity {id} is not a {expected}")]
    WrongEntityKind {
        /// Raw handle value.
        id: u64,
        /// Kind the caller asked for.
        expected: &'static str,
    },

    /// Attribute access method forbids the operation.
    #[error("Permission denied: cannot {operation} {path}")]
    PermissionDenied {
        /// The attribute path.
        path: PathBuf,
        /// The refused operation ("read" or "write").
        operation: &'static str,
    },

    /// Sysfs is not mounted at the expected location.
    #[error("Sysfs not mounted at {path}")]
    NotMounted {
        /// Mount point that was checked.
        path: PathBuf,
    },

    /// Directory was already read and the reader is configured to reject re-reads.
    #[error("Directory already populated: {path}")]
    AlreadyPopulated {
        /// The directory path.
        path: PathBuf,
    },

    /// Symlink chain too deep to resolve.
    #[error("Too many levels of symbolic links: {path}")]
    SymlinkLoop {
        /// The link being resolved when the limit was hit.
        path: PathBuf,
    },

    /// IO error.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path where error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl SysfsError {
    /// Create an `Io` error from `std::io::Error`.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `source` - The underlying IO error
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an `InvalidArgument` error.
    ///
    /// # Arguments
    /// * `reason` - Why the input was rejected
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a `NotFound` error.
    pub fn not_found(path: impl AsRef<Path>) -> Self {
        Self::NotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Classify this error into one of the coarse [`ErrorKind`]s.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::PathTooLong { .. } => ErrorKind::InvalidArgument,
            Self::WrongEntityKind { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } | Self::UnknownEntity { .. } | Self::NotMounted { .. } => {
                ErrorKind::NotFound
            }
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::AlreadyPopulated { .. } => ErrorKind::AlreadyPopulated,
            Self::SymlinkLoop { .. } | Self::Io { .. } => ErrorKind::IoError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(SysfsError::invalid("x").kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            SysfsError::PathTooLong { len: 10, max: 5 }.kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(SysfsError::not_found("/sys/bus/nope").kind(), ErrorKind::NotFound);
        assert_eq!(
            SysfsError::io("/sys", std::io::Error::from(std::io::ErrorKind::Other)).kind(),
            ErrorKind::IoError
        );
        assert_eq!(
            SysfsError::AlreadyPopulated {
                path: PathBuf::from("/sys")
            }
            .kind(),
            ErrorKind::AlreadyPopulated
        );
    }

    #[test]
    fn test_display_includes_path() {
        let err: SysfsError = SysfsError::PermissionDenied {
            path: PathBuf::from("/sys/devices/foo/power"),
            operation: "write",
        };
        assert_eq!(
            err.to_string(),
            "Permission denied: cannot write /sys/devices/foo/power"
        );
    }
}

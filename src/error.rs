//! Error taxonomy for the crate.
//!
//! Every syscall failure keeps its raw `errno`; the structured fields are the
//! source of truth for programmatic dispatch, the `Display` strings are for
//! logs. All enums implement `PartialEq`/`Eq` so tests can match by kind.

use crate::path::FsPath;
use thiserror::Error;

/// Failures when validating a whole path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    /// Any byte below 0x20, NUL included.
    #[error("path contains control characters")]
    ContainsControlCharacters,
}

/// Failures when validating a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentError {
    #[error("component is empty")]
    Empty,
    #[error("component contains a path separator")]
    ContainsPathSeparator,
    #[error("component contains control characters")]
    ContainsControlCharacters,
}

/// Failures from descriptor and handle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("no such file or directory: {0}")]
    PathNotFound(FsPath),
    #[error("permission denied: {0}")]
    PermissionDenied(FsPath),
    #[error("already exists: {0}")]
    AlreadyExists(FsPath),
    #[error("not a directory: {0}")]
    NotADirectory(FsPath),
    #[error("is a directory: {0}")]
    IsADirectory(FsPath),
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("open failed (errno {errno})")]
    OpenFailed { errno: i32 },
    #[error("close failed (errno {errno})")]
    CloseFailed { errno: i32 },
    #[error("duplicate failed (errno {errno})")]
    DupFailed { errno: i32 },
    #[error("read failed (errno {errno})")]
    ReadFailed { errno: i32 },
    #[error("write failed after {written} of {expected} bytes (errno {errno})")]
    WriteFailed {
        written: usize,
        expected: usize,
        errno: i32,
    },
    #[error("seek failed (errno {errno})")]
    SeekFailed { errno: i32 },
}

/// Failures from metadata queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatError {
    #[error("no such file or directory: {0}")]
    PathNotFound(FsPath),
    #[error("permission denied: {0}")]
    PermissionDenied(FsPath),
    #[error("stat failed (errno {errno})")]
    StatFailed { errno: i32 },
}

/// The metadata-preservation step that failed during an atomic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOp {
    Permissions,
    Ownership,
    Timestamps,
    ExtendedAttributes,
    Acls,
}

impl core::fmt::Display for MetadataOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Permissions => write!(f, "permissions"),
            Self::Ownership => write!(f, "ownership"),
            Self::Timestamps => write!(f, "timestamps"),
            Self::ExtendedAttributes => write!(f, "extended attributes"),
            Self::Acls => write!(f, "ACLs"),
        }
    }
}

/// Failures from the crash-safe replace protocol.
///
/// Any error raised after the temporary file exists implies the temporary has
/// already been unlinked; the original cause is surfaced, never the cleanup
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtomicWriteError {
    #[error("destination parent does not exist: {0}")]
    ParentNotFound(FsPath),
    #[error("destination parent is not accessible: {0}")]
    ParentAccessDenied(FsPath),
    #[error("destination parent is not a directory: {0}")]
    ParentNotDirectory(FsPath),
    #[error("temporary file creation failed (errno {errno})")]
    TempFileCreationFailed { errno: i32 },
    #[error("write failed after {bytes_written} of {bytes_expected} bytes (errno {errno})")]
    WriteFailed {
        bytes_written: usize,
        bytes_expected: usize,
        errno: i32,
    },
    #[error("sync failed (errno {errno})")]
    SyncFailed { errno: i32 },
    #[error("close failed (errno {errno})")]
    CloseFailed { errno: i32 },
    #[error("failed to preserve {operation} (errno {errno})")]
    MetadataPreservationFailed { operation: MetadataOp, errno: i32 },
    #[error("destination already exists: {0}")]
    DestinationExists(FsPath),
    #[error("rename {from} -> {to} failed (errno {errno})")]
    RenameFailed {
        from: FsPath,
        to: FsPath,
        errno: i32,
    },
    #[error("directory sync failed for {path} (errno {errno})")]
    DirectorySyncFailed { path: FsPath, errno: i32 },
}

/// Failures from directory enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirError {
    #[error("no such directory: {0}")]
    PathNotFound(FsPath),
    #[error("permission denied: {0}")]
    PermissionDenied(FsPath),
    #[error("not a directory: {0}")]
    NotADirectory(FsPath),
    #[error("directory read failed (errno {errno})")]
    ReadFailed { errno: i32 },
    #[error("already exists: {0}")]
    AlreadyExists(FsPath),
    /// Only surfaced on the async stream path.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Failures from the blocking-syscall executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The executor has been shut down; no further jobs are accepted.
    #[error("executor has been shut down")]
    ShutDown,
}

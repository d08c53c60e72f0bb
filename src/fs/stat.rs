//! Metadata queries over `stat(2)` / `lstat(2)`.

use crate::error::StatError;
use crate::fs::types::{FileKind, Permissions, StatInfo};
use crate::path::FsPath;
use crate::util::{errno, to_cstring};
use core::mem::MaybeUninit;

/// Raw stat on a path. `follow` picks `stat` vs `lstat`.
pub(crate) fn stat_raw(path: &FsPath, follow: bool) -> Result<libc::stat, i32> {
    let cpath = to_cstring(path.as_bytes());
    let mut out = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: cpath is NUL-terminated, out is a valid stat-sized buffer
    let rc = unsafe {
        if follow {
            libc::stat(cpath.as_ptr(), out.as_mut_ptr())
        } else {
            libc::lstat(cpath.as_ptr(), out.as_mut_ptr())
        }
    };
    if rc != 0 {
        return Err(errno());
    }
    // SAFETY: the syscall succeeded, so the buffer is fully written
    Ok(unsafe { out.assume_init() })
}

/// True iff `path` resolves to anything at all (symlinks followed).
/// Absence and permission denial both come back `false`, never an error.
#[must_use]
pub fn exists(path: &FsPath) -> bool {
    stat_raw(path, true).is_ok()
}

/// True iff `path` resolves to a regular file.
#[must_use]
pub fn is_file(path: &FsPath) -> bool {
    stat_raw(path, true)
        .map(|st| FileKind::from_mode(st.st_mode) == FileKind::Regular)
        .unwrap_or(false)
}

/// True iff `path` resolves to a directory.
#[must_use]
pub fn is_directory(path: &FsPath) -> bool {
    stat_raw(path, true)
        .map(|st| FileKind::from_mode(st.st_mode) == FileKind::Directory)
        .unwrap_or(false)
}

/// True iff `path` itself is a symlink (not followed).
#[must_use]
pub fn is_symlink(path: &FsPath) -> bool {
    stat_raw(path, false)
        .map(|st| FileKind::from_mode(st.st_mode) == FileKind::Symlink)
        .unwrap_or(false)
}

fn map_stat_errno(err: i32, path: &FsPath) -> StatError {
    match err {
        libc::ENOENT | libc::ENOTDIR => StatError::PathNotFound(path.clone()),
        libc::EACCES => StatError::PermissionDenied(path.clone()),
        errno => StatError::StatFailed { errno },
    }
}

const fn info_from(st: &libc::stat) -> StatInfo {
    StatInfo {
        size: st.st_size as i64,
        kind: FileKind::from_mode(st.st_mode),
        permissions: Permissions::from_mode(st.st_mode),
    }
}

/// Size, kind and permission bits of whatever `path` resolves to
/// (symlinks followed).
pub fn info(path: &FsPath) -> Result<StatInfo, StatError> {
    stat_raw(path, true)
        .map(|st| info_from(&st))
        .map_err(|err| map_stat_errno(err, path))
}

/// Like [`info`], but on the link itself when `path` is a symlink.
pub fn info_no_follow(path: &FsPath) -> Result<StatInfo, StatError> {
    stat_raw(path, false)
        .map(|st| info_from(&st))
        .map_err(|err| map_stat_errno(err, path))
}

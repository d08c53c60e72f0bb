//! Lazy directory enumeration over POSIX `opendir`/`readdir`.

use crate::error::DirError;
use crate::fs::types::FileKind;
use crate::macros::access_dirent;
use crate::path::{Component, FsPath};
use crate::util::{clear_errno, dirent_name, errno, readdir_native, to_cstring};
use core::ptr::NonNull;
use libc::DIR;

/// One directory entry: where it lives, what it is called, and what the
/// stream says it is.
///
/// The parent path is shared (refcounted), so yielding an entry allocates
/// only the name. `kind` comes from `d_type`; filesystems that do not fill
/// it in produce [`FileKind::Other`] and the caller may lstat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    parent: FsPath,
    name: Component,
    kind: FileKind,
}

impl Entry {
    #[inline]
    #[must_use]
    pub(crate) const fn new(parent: FsPath, name: Component, kind: FileKind) -> Self {
        Self { parent, name, kind }
    }

    /// The directory this entry was read from.
    #[inline]
    #[must_use]
    pub const fn parent(&self) -> &FsPath {
        &self.parent
    }

    /// The entry's filename.
    #[inline]
    #[must_use]
    pub const fn file_name(&self) -> &Component {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> FileKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self.kind, FileKind::Directory)
    }

    #[inline]
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        matches!(self.kind, FileKind::Symlink)
    }

    /// The full path, built on demand (this is the one allocation callers
    /// opt into).
    #[inline]
    #[must_use]
    pub fn path(&self) -> FsPath {
        self.parent.append(&self.name)
    }
}

/// A cursor over an open `DIR` stream.
///
/// Implements `Iterator<Item = Entry>`; `.` and `..` are filtered out. A
/// mid-stream read failure ends iteration and is parked out-of-band in
/// [`take_error`](Self::take_error), keeping the hot loop free of `Result`
/// unwrapping.
///
/// Closing is explicit and idempotent via [`close`](Self::close); `Drop`
/// closes too, so the cursor cannot leak its stream whichever way the scope
/// exits.
#[derive(Debug)]
pub struct DirCursor {
    /// Stream pointer from `opendir`; null is never stored.
    dir: Option<NonNull<DIR>>,
    /// The directory being read, shared into every yielded entry.
    path: FsPath,
    /// Parked read failure, surfaced after iteration ends.
    last_error: Option<DirError>,
}

// SAFETY: the cursor is used by at most one thread at a time (moving it is
// fine, aliasing it is not, and the API takes &mut for every read). A DIR
// stream has no thread affinity; the batched async iterator relies on this
// to resume the cursor on whichever worker picks the job up.
unsafe impl Send for DirCursor {}

impl DirCursor {
    /// Opens a directory stream on `path`.
    ///
    /// # Errors
    /// `ENOENT` → [`DirError::PathNotFound`], `EACCES` →
    /// [`DirError::PermissionDenied`], `ENOTDIR` → [`DirError::NotADirectory`],
    /// anything else → [`DirError::ReadFailed`].
    pub fn open(path: &FsPath) -> Result<Self, DirError> {
        let cpath = to_cstring(path.as_bytes());
        // SAFETY: cpath is NUL-terminated and outlives the call
        let dir = unsafe { libc::opendir(cpath.as_ptr()) };
        match NonNull::new(dir) {
            Some(dir) => Ok(Self {
                dir: Some(dir),
                path: path.clone(),
                last_error: None,
            }),
            None => Err(match errno() {
                libc::ENOENT => DirError::PathNotFound(path.clone()),
                libc::EACCES => DirError::PermissionDenied(path.clone()),
                libc::ENOTDIR => DirError::NotADirectory(path.clone()),
                err => DirError::ReadFailed { errno: err },
            }),
        }
    }

    /// The directory this cursor reads.
    #[inline]
    #[must_use]
    pub const fn path(&self) -> &FsPath {
        &self.path
    }

    /// A read failure that ended iteration, if one happened. Taking it
    /// resets the cursor's error state.
    #[inline]
    pub fn take_error(&mut self) -> Option<DirError> {
        self.last_error.take()
    }

    /// Releases the stream. Idempotent: closing twice (or iterating after a
    /// close) is a no-op. closedir can only fail on a stale pointer, which
    /// ownership of the `NonNull` rules out, so any error is just logged.
    pub fn close(&mut self) {
        if let Some(dir) = self.dir.take() {
            // SAFETY: the pointer came from opendir and is closed exactly once
            let rc = unsafe { libc::closedir(dir.as_ptr()) };
            if rc != 0 {
                tracing::warn!(path = %self.path, errno = errno(), "closedir failed");
            }
        }
    }
}

impl Iterator for DirCursor {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        let dir = self.dir?;
        loop {
            // readdir reports both exhaustion and failure as null; errno is
            // the only way to tell them apart
            clear_errno();
            // SAFETY: the stream is open until `close` takes the pointer
            let entry = unsafe { readdir_native(dir.as_ptr()) };
            let Some(entry) = NonNull::new(entry) else {
                let err = errno();
                if err != 0 {
                    self.last_error = Some(DirError::ReadFailed { errno: err });
                }
                return None;
            };
            // SAFETY: the entry stays valid until the next readdir call; the
            // name is copied out before that
            let name = unsafe { dirent_name(entry.as_ptr()) };
            if name == b"." || name == b".." {
                continue;
            }
            // SAFETY: kernel names are non-empty with no separators or NULs
            let component = unsafe { Component::new_unchecked(name) };
            // SAFETY: entry pointer is live (checked non-null above)
            let dtype = unsafe { access_dirent!(entry.as_ptr(), d_type) };
            return Some(Entry::new(
                self.path.clone(),
                component,
                FileKind::from_dtype(dtype),
            ));
        }
    }
}

impl Drop for DirCursor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::handle::write_all;
    use std::collections::BTreeSet;

    fn scratch() -> (tempfile::TempDir, FsPath) {
        let dir = tempfile::tempdir().unwrap();
        let path = FsPath::try_from(dir.path()).unwrap();
        (dir, path)
    }

    fn comp(s: &str) -> Component {
        Component::new(s).unwrap()
    }

    #[test]
    fn yields_exactly_the_entries_written() {
        let (_guard, dir) = scratch();
        let mut expected = BTreeSet::new();
        for i in 0..40 {
            let name = format!("file_{i}.txt");
            write_all(&dir.append(&comp(&name)), b"x").unwrap();
            expected.insert(name.into_bytes());
        }

        let cursor = DirCursor::open(&dir).unwrap();
        let got: BTreeSet<Vec<u8>> = cursor
            .map(|e| e.file_name().as_bytes().to_vec())
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn dot_entries_are_filtered() {
        let (_guard, dir) = scratch();
        write_all(&dir.append(&comp("visible")), b"x").unwrap();
        let names: Vec<Vec<u8>> = DirCursor::open(&dir)
            .unwrap()
            .map(|e| e.file_name().as_bytes().to_vec())
            .collect();
        assert!(!names.contains(&b".".to_vec()));
        assert!(!names.contains(&b"..".to_vec()));
        assert_eq!(names, vec![b"visible".to_vec()]);
    }

    #[test]
    fn kinds_come_from_the_stream() {
        let (_guard, dir) = scratch();
        write_all(&dir.append(&comp("f")), b"x").unwrap();
        std::fs::create_dir(dir.append(&comp("d")).as_std_path()).unwrap();
        std::os::unix::fs::symlink("f", dir.append(&comp("l")).as_std_path()).unwrap();

        let mut kinds = std::collections::BTreeMap::new();
        for entry in DirCursor::open(&dir).unwrap() {
            kinds.insert(entry.file_name().as_bytes().to_vec(), entry.kind());
        }
        // tmpfs and friends fill d_type in; Other would also be legal per the
        // contract, but on the filesystems tests run on we can be exact
        assert_eq!(kinds[&b"f".to_vec()], FileKind::Regular);
        assert_eq!(kinds[&b"d".to_vec()], FileKind::Directory);
        assert_eq!(kinds[&b"l".to_vec()], FileKind::Symlink);
    }

    #[test]
    fn open_failures_map_to_kinds() {
        let missing = FsPath::new("/no/such/dir/here").unwrap();
        assert_eq!(
            DirCursor::open(&missing).unwrap_err(),
            DirError::PathNotFound(missing)
        );

        let (_guard, dir) = scratch();
        let file = dir.append(&comp("plain"));
        write_all(&file, b"x").unwrap();
        assert_eq!(
            DirCursor::open(&file).unwrap_err(),
            DirError::NotADirectory(file)
        );
    }

    #[test]
    fn close_is_idempotent_and_ends_iteration() {
        let (_guard, dir) = scratch();
        write_all(&dir.append(&comp("a")), b"x").unwrap();
        let mut cursor = DirCursor::open(&dir).unwrap();
        cursor.close();
        cursor.close();
        assert_eq!(cursor.next(), None);
        assert!(cursor.take_error().is_none());
    }

    #[test]
    fn entry_path_is_parent_plus_name() {
        let (_guard, dir) = scratch();
        write_all(&dir.append(&comp("leaf")), b"x").unwrap();
        let entry = DirCursor::open(&dir).unwrap().next().unwrap();
        assert_eq!(entry.parent(), &dir);
        assert_eq!(entry.path(), dir.append(&comp("leaf")));
    }
}

//! Owning wrapper around a kernel file descriptor.

use crate::error::DescriptorError;
use crate::fs::types::{OpenMode, OpenOptions};
use crate::path::FsPath;
use crate::util::{errno, to_cstring};

/// Default creation mode for `O_CREAT`: rw for owner, read for group/other,
/// still subject to the process umask.
const DEFAULT_CREATE_MODE: libc::mode_t = 0o644;

/// An exclusively-owned open file descriptor.
///
/// The wrapper owns the integer from the moment [`open`](Self::open) returns
/// until [`close`](Self::close) runs. Closing twice is deliberately a no-op
/// reporting success; the flag below is what makes that safe. Dropping a
/// still-open descriptor closes it, so a panic inside
/// [`with_open`](Self::with_open) cannot leak the fd.
#[derive(Debug)]
pub struct Descriptor {
    pub(crate) fd: i32,
    open: bool,
}

/// Maps an `open(2)`/`opendir(3)` errno onto the descriptor taxonomy.
pub(crate) fn map_open_errno(err: i32, path: &FsPath) -> DescriptorError {
    match err {
        libc::ENOENT => DescriptorError::PathNotFound(path.clone()),
        libc::EACCES => DescriptorError::PermissionDenied(path.clone()),
        libc::EEXIST => DescriptorError::AlreadyExists(path.clone()),
        libc::ENOTDIR => DescriptorError::NotADirectory(path.clone()),
        libc::EISDIR => DescriptorError::IsADirectory(path.clone()),
        libc::EMFILE | libc::ENFILE => DescriptorError::TooManyOpenFiles,
        errno => DescriptorError::OpenFailed { errno },
    }
}

impl Descriptor {
    /// Opens `path` with the given access mode and flags.
    ///
    /// # Errors
    /// Errno is mapped per the taxonomy: `ENOENT` → `PathNotFound`, `EACCES`
    /// → `PermissionDenied`, `EEXIST` → `AlreadyExists`, `ENOTDIR`/`EISDIR`
    /// → the directory mismatches, `EMFILE`/`ENFILE` → `TooManyOpenFiles`,
    /// anything else → `OpenFailed{errno}`.
    pub fn open(
        path: &FsPath,
        mode: OpenMode,
        options: OpenOptions,
    ) -> Result<Self, DescriptorError> {
        let cpath = to_cstring(path.as_bytes());
        let flags = options.to_flags(mode);
        // SAFETY: cpath is NUL-terminated and outlives the call
        let fd = unsafe { libc::open(cpath.as_ptr(), flags, libc::c_uint::from(DEFAULT_CREATE_MODE)) };
        if fd < 0 {
            return Err(map_open_errno(errno(), path));
        }
        Ok(Self { fd, open: true })
    }

    /// Wraps an fd the caller already owns. Takes over the close obligation.
    #[inline]
    #[must_use]
    pub(crate) const fn from_raw(fd: i32) -> Self {
        Self { fd, open: true }
    }

    /// The raw fd number. Only meaningful while [`is_valid`](Self::is_valid).
    #[inline]
    #[must_use]
    pub const fn raw_fd(&self) -> i32 {
        self.fd
    }

    /// True until the first successful or attempted close.
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.open
    }

    /// Closes the descriptor. Idempotent: a second call returns `Ok` without
    /// a syscall. After a failed close the fd is still considered gone
    /// (retrying a close is how other threads' descriptors get clobbered).
    pub fn close(&mut self) -> Result<(), DescriptorError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        // SAFETY: we owned the fd and nobody else closes it
        let rc = unsafe { libc::close(self.fd) };
        if rc < 0 {
            return Err(DescriptorError::CloseFailed { errno: errno() });
        }
        Ok(())
    }

    /// A second, independent descriptor for the same open file description.
    ///
    /// The two share the kernel file offset (dup semantics); closing one
    /// leaves the other open.
    pub fn duplicate(&self) -> Result<Self, DescriptorError> {
        // SAFETY: self.fd is open while self.open holds
        let fd = unsafe { libc::fcntl(self.fd, libc::F_DUPFD_CLOEXEC, 0) };
        if fd < 0 {
            return Err(DescriptorError::DupFailed { errno: errno() });
        }
        Ok(Self { fd, open: true })
    }

    /// Scoped open: runs `body` on a fresh descriptor and closes it on every
    /// exit path: return, error, or panic (the panic path rides on `Drop`).
    ///
    /// A close failure is surfaced only when `body` succeeded; if `body`
    /// already failed, its error wins and the close result is discarded.
    pub fn with_open<T, E, F>(
        path: &FsPath,
        mode: OpenMode,
        options: OpenOptions,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DescriptorError>,
    {
        let mut desc = Self::open(path, mode, options).map_err(E::from)?;
        match body(&mut desc) {
            Ok(value) => {
                desc.close().map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                let _ = desc.close();
                Err(err)
            }
        }
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        if self.open {
            tracing::debug!(fd = self.fd, "descriptor dropped while open, closing");
            // SAFETY: still owned, not yet closed
            unsafe { libc::close(self.fd) };
            self.open = false;
        }
    }
}

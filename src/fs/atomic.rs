//! Crash-safe replace-file protocol.
//!
//! The write lands in a hidden temporary inside the destination's parent,
//! is flushed to the durability level asked for, and is renamed over the
//! destination in one step. Readers of the destination see either the old
//! bytes or the new bytes, never a mixture; every failure path unlinks the
//! temporary before surfacing the original error.

use crate::error::{AtomicWriteError, MetadataOp};
use crate::fs::descriptor::Descriptor;
use crate::fs::handle::write_full;
use crate::fs::stat::stat_raw;
use crate::fs::types::FileKind;
use crate::path::{Component, FsPath};
use crate::util::{errno, to_cstring};
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of the random part of a temp-file name. Sixteen alphanumerics is
/// enough that a collision means the generator is broken, not unlucky.
const TEMP_SUFFIX_LEN: usize = 16;

/// Attempts before giving up on `O_EXCL` collisions.
const TEMP_CREATE_ATTEMPTS: u32 = 4;

/// Temp files start locked down; preserved or default permissions are
/// applied before the rename makes the file visible under its real name.
const TEMP_INITIAL_MODE: libc::mode_t = 0o600;

/// What happens when the destination already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Replace it atomically (the default).
    #[default]
    ReplaceExisting,
    /// Fail with `DestinationExists`, even against racing writers.
    NoClobber,
}

/// How much of the write must have reached stable storage before success is
/// reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Durability {
    /// No syncing at all; the rename is still atomic but a crash may lose
    /// the whole write.
    None,
    /// `fdatasync` on the temp file, plus an fsync of the parent directory.
    DataOnly,
    /// `fsync` on the temp file, plus an fsync of the parent directory
    /// (the default).
    #[default]
    Full,
}

/// Options for [`write_atomic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicWriteOptions {
    pub strategy: WriteStrategy,
    pub durability: Durability,
    /// Copy the old destination's permission bits onto the replacement.
    pub preserve_permissions: bool,
    /// Copy uid+gid. Usually needs privileges, hence off by default.
    pub preserve_ownership: bool,
    /// Make an ownership-preservation failure fatal instead of ignored.
    pub strict_ownership: bool,
    /// Copy atime+mtime.
    pub preserve_timestamps: bool,
    /// Copy extended attributes (Linux only).
    pub preserve_extended_attributes: bool,
    /// Copy POSIX ACLs (Linux only).
    pub preserve_acls: bool,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self {
        Self {
            strategy: WriteStrategy::ReplaceExisting,
            durability: Durability::Full,
            preserve_permissions: true,
            preserve_ownership: false,
            strict_ownership: false,
            preserve_timestamps: false,
            preserve_extended_attributes: false,
            preserve_acls: false,
        }
    }
}

impl AtomicWriteOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strategy(mut self, strategy: WriteStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    #[must_use]
    pub fn preserve_permissions(mut self, yes: bool) -> Self {
        self.preserve_permissions = yes;
        self
    }

    #[must_use]
    pub fn preserve_ownership(mut self, yes: bool) -> Self {
        self.preserve_ownership = yes;
        self
    }

    #[must_use]
    pub fn strict_ownership(mut self, yes: bool) -> Self {
        self.strict_ownership = yes;
        self
    }

    #[must_use]
    pub fn preserve_timestamps(mut self, yes: bool) -> Self {
        self.preserve_timestamps = yes;
        self
    }

    #[must_use]
    pub fn preserve_extended_attributes(mut self, yes: bool) -> Self {
        self.preserve_extended_attributes = yes;
        self
    }

    #[must_use]
    pub fn preserve_acls(mut self, yes: bool) -> Self {
        self.preserve_acls = yes;
        self
    }
}

/// Unlinks the temp file unless the rename consumed it. Runs on every exit
/// path, panics included; a failed unlink is logged and swallowed so the
/// original error stays visible.
struct TempGuard {
    path: FsPath,
    armed: bool,
}

impl TempGuard {
    const fn new(path: FsPath) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let cpath = to_cstring(self.path.as_bytes());
        // SAFETY: plain unlink on a NUL-terminated path
        let rc = unsafe { libc::unlink(cpath.as_ptr()) };
        if rc != 0 && errno() != libc::ENOENT {
            tracing::warn!(path = %self.path, errno = errno(), "failed to unlink temp file");
        }
    }
}

/// Atomically replaces the file at `to` with `bytes`.
///
/// On success the destination holds exactly `bytes`, durable to the level in
/// `options`. On failure the filesystem holds neither a partial destination
/// nor a leaked temporary: the old file (if any) is byte-for-byte untouched.
///
/// Two racing writers to the same destination are both safe; the survivor is
/// whichever rename landed last, and [`WriteStrategy::NoClobber`] turns the
/// race into at-most-one-creates.
pub fn write_atomic(
    bytes: &[u8],
    to: &FsPath,
    options: &AtomicWriteOptions,
) -> Result<(), AtomicWriteError> {
    // step 1: resolve and validate the parent directory
    let basename = to
        .last_component()
        .ok_or_else(|| AtomicWriteError::ParentNotDirectory(to.clone()))?;
    let parent = to
        .parent()
        .unwrap_or_else(|| FsPath::new_unchecked(&b"."[..]));
    let parent_stat = match stat_raw(&parent, true) {
        Ok(st) => st,
        Err(libc::ENOENT) => return Err(AtomicWriteError::ParentNotFound(parent)),
        Err(libc::EACCES) => return Err(AtomicWriteError::ParentAccessDenied(parent)),
        Err(err) => {
            // ELOOP, ENAMETOOLONG and friends: the parent cannot be resolved
            tracing::debug!(errno = err, parent = %parent, "parent resolution failed");
            return Err(AtomicWriteError::ParentNotFound(parent));
        }
    };
    if FileKind::from_mode(parent_stat.st_mode) != FileKind::Directory {
        return Err(AtomicWriteError::ParentNotDirectory(parent));
    }

    let existing = stat_raw(to, true).ok();
    if options.strategy == WriteStrategy::NoClobber && existing.is_some() {
        return Err(AtomicWriteError::DestinationExists(to.clone()));
    }

    // step 2: exclusive temp file next to the destination
    let (mut temp_fd, temp_path) = create_temp(&parent, &basename)?;
    let mut guard = TempGuard::new(temp_path.clone());

    // steps 3..6 in a closure so every failure flows through the guard
    let staged = (|| {
        // step 3: full write
        #[cfg(test)]
        if let Some(err) = fault::take(fault::Step::Write, bytes.len()) {
            return Err(err);
        }
        write_full(&temp_fd, bytes).map_err(|(written, err)| AtomicWriteError::WriteFailed {
            bytes_written: written,
            bytes_expected: bytes.len(),
            errno: err,
        })?;

        // step 4: metadata from the file being replaced
        if let Some(old) = existing.as_ref() {
            #[cfg(test)]
            if let Some(err) = fault::take(fault::Step::Metadata, bytes.len()) {
                return Err(err);
            }
            preserve_metadata(&temp_fd, to, old, options)?;
        }

        // step 5: flush file contents
        #[cfg(test)]
        if let Some(err) = fault::take(fault::Step::Sync, bytes.len()) {
            return Err(err);
        }
        sync_file(&temp_fd, options.durability)?;

        // step 6: close before rename so the data the rename publishes is
        // exactly what was flushed
        #[cfg(test)]
        if let Some(err) = fault::take(fault::Step::Close, bytes.len()) {
            return Err(err);
        }
        temp_fd
            .close()
            .map_err(|_| AtomicWriteError::CloseFailed { errno: errno() })
    })();
    staged?;

    // step 7: publish
    let consumed = rename_into_place(&temp_path, to, options.strategy)?;
    if consumed {
        guard.disarm();
    }
    drop(guard);

    // step 8: make the directory entry itself durable. The file is already
    // in place, so a failure here is surfaced without any cleanup.
    if options.durability >= Durability::DataOnly {
        sync_directory(&parent)?;
    }
    Ok(())
}

fn create_temp(
    parent: &FsPath,
    basename: &Component,
) -> Result<(Descriptor, FsPath), AtomicWriteError> {
    for _ in 0..TEMP_CREATE_ATTEMPTS {
        let mut name = Vec::with_capacity(basename.as_bytes().len() + TEMP_SUFFIX_LEN + 6);
        name.push(b'.');
        name.extend_from_slice(basename.as_bytes());
        name.push(b'.');
        name.extend(
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(TEMP_SUFFIX_LEN),
        );
        name.extend_from_slice(b".tmp");
        // SAFETY: built from a validated component plus alphanumerics
        let temp_path = parent.append(&unsafe { Component::new_unchecked(&name) });

        let cpath = to_cstring(temp_path.as_bytes());
        let flags = libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL | libc::O_CLOEXEC;
        // SAFETY: cpath is NUL-terminated and outlives the call
        let fd = unsafe { libc::open(cpath.as_ptr(), flags, libc::c_uint::from(TEMP_INITIAL_MODE)) };
        if fd >= 0 {
            return Ok((Descriptor::from_raw(fd), temp_path));
        }
        let err = errno();
        if err != libc::EEXIST {
            return Err(AtomicWriteError::TempFileCreationFailed { errno: err });
        }
        // name collision: roll new randomness
    }
    Err(AtomicWriteError::TempFileCreationFailed { errno: libc::EEXIST })
}

fn preserve_metadata(
    temp: &Descriptor,
    old_path: &FsPath,
    old: &libc::stat,
    options: &AtomicWriteOptions,
) -> Result<(), AtomicWriteError> {
    if options.preserve_permissions {
        // SAFETY: fd is open, mode bits come straight from the old stat
        let rc = unsafe { libc::fchmod(temp.raw_fd(), old.st_mode & 0o7777) };
        if rc != 0 {
            return Err(AtomicWriteError::MetadataPreservationFailed {
                operation: MetadataOp::Permissions,
                errno: errno(),
            });
        }
    }

    if options.preserve_ownership {
        // SAFETY: fd is open; uid/gid from the old stat
        let rc = unsafe { libc::fchown(temp.raw_fd(), old.st_uid, old.st_gid) };
        if rc != 0 {
            let err = errno();
            if options.strict_ownership {
                return Err(AtomicWriteError::MetadataPreservationFailed {
                    operation: MetadataOp::Ownership,
                    errno: err,
                });
            }
            // unprivileged chown is expected to fail; accepted silently
            tracing::debug!(errno = err, "ownership preservation skipped");
        }
    }

    if options.preserve_timestamps {
        let times = [
            libc::timespec {
                tv_sec: old.st_atime,
                tv_nsec: old.st_atime_nsec,
            },
            libc::timespec {
                tv_sec: old.st_mtime,
                tv_nsec: old.st_mtime_nsec,
            },
        ];
        // SAFETY: fd is open, times is a valid [timespec; 2]
        let rc = unsafe { libc::futimens(temp.raw_fd(), times.as_ptr()) };
        if rc != 0 {
            return Err(AtomicWriteError::MetadataPreservationFailed {
                operation: MetadataOp::Timestamps,
                errno: errno(),
            });
        }
    }

    if options.preserve_extended_attributes {
        copy_xattrs(temp, old_path, XattrSet::AllButAcls)?;
    }
    if options.preserve_acls {
        copy_xattrs(temp, old_path, XattrSet::AclsOnly)?;
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum XattrSet {
    AllButAcls,
    AclsOnly,
}

/// POSIX ACLs live in these attributes on Linux.
#[cfg(any(target_os = "linux", target_os = "android"))]
const ACL_XATTRS: [&[u8]; 2] = [b"system.posix_acl_access", b"system.posix_acl_default"];

#[cfg(any(target_os = "linux", target_os = "android"))]
fn copy_xattrs(
    temp: &Descriptor,
    old_path: &FsPath,
    which: XattrSet,
) -> Result<(), AtomicWriteError> {
    let operation = match which {
        XattrSet::AllButAcls => MetadataOp::ExtendedAttributes,
        XattrSet::AclsOnly => MetadataOp::Acls,
    };
    let fail = |err: i32| AtomicWriteError::MetadataPreservationFailed {
        operation,
        errno: err,
    };
    let cpath = to_cstring(old_path.as_bytes());

    // two-call listxattr dance: size first, then the names
    // SAFETY: cpath is NUL-terminated; a null buffer requests the size
    let size = unsafe { libc::listxattr(cpath.as_ptr(), core::ptr::null_mut(), 0) };
    if size < 0 {
        return Err(fail(errno()));
    }
    let mut names = vec![0_u8; size as usize];
    // SAFETY: names has exactly the capacity the kernel just quoted
    let size = unsafe { libc::listxattr(cpath.as_ptr(), names.as_mut_ptr().cast(), names.len()) };
    if size < 0 {
        return Err(fail(errno()));
    }
    names.truncate(size as usize);

    for name in names.split(|&b| b == 0).filter(|n| !n.is_empty()) {
        let is_acl = ACL_XATTRS.contains(&name);
        if (which == XattrSet::AclsOnly) != is_acl {
            continue;
        }
        let cname = to_cstring(name);
        // SAFETY: size query, then read with the quoted capacity
        let vsize = unsafe { libc::getxattr(cpath.as_ptr(), cname.as_ptr(), core::ptr::null_mut(), 0) };
        if vsize < 0 {
            let err = errno();
            if err == libc::ENODATA {
                continue; // attribute vanished between list and get
            }
            return Err(fail(err));
        }
        let mut value = vec![0_u8; vsize as usize];
        // SAFETY: value buffer sized by the preceding query
        let vsize = unsafe {
            libc::getxattr(
                cpath.as_ptr(),
                cname.as_ptr(),
                value.as_mut_ptr().cast(),
                value.len(),
            )
        };
        if vsize < 0 {
            return Err(fail(errno()));
        }
        // SAFETY: fd is open; name and value are valid for their lengths
        let rc = unsafe {
            libc::fsetxattr(
                temp.raw_fd(),
                cname.as_ptr(),
                value.as_ptr().cast(),
                vsize as usize,
                0,
            )
        };
        if rc != 0 {
            return Err(fail(errno()));
        }
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn copy_xattrs(
    _temp: &Descriptor,
    _old_path: &FsPath,
    which: XattrSet,
) -> Result<(), AtomicWriteError> {
    // only wired up where the xattr syscall family is portable enough
    Err(AtomicWriteError::MetadataPreservationFailed {
        operation: match which {
            XattrSet::AllButAcls => MetadataOp::ExtendedAttributes,
            XattrSet::AclsOnly => MetadataOp::Acls,
        },
        errno: libc::ENOTSUP,
    })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[inline]
fn fdatasync_compat(fd: i32) -> i32 {
    // SAFETY: the caller holds the fd open
    unsafe { libc::fdatasync(fd) }
}

/// fsync is the superset where fdatasync is missing or unreliable.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
#[inline]
fn fdatasync_compat(fd: i32) -> i32 {
    // SAFETY: the caller holds the fd open
    unsafe { libc::fsync(fd) }
}

fn sync_file(temp: &Descriptor, durability: Durability) -> Result<(), AtomicWriteError> {
    let rc = match durability {
        Durability::None => return Ok(()),
        Durability::DataOnly => fdatasync_compat(temp.raw_fd()),
        // SAFETY: fd is open
        Durability::Full => unsafe { libc::fsync(temp.raw_fd()) },
    };
    if rc != 0 {
        return Err(AtomicWriteError::SyncFailed { errno: errno() });
    }
    Ok(())
}

/// Returns whether the temp file was consumed (true for a successful
/// `rename`, false when the link-based fallback leaves it to be unlinked).
fn rename_into_place(
    from: &FsPath,
    to: &FsPath,
    strategy: WriteStrategy,
) -> Result<bool, AtomicWriteError> {
    let cfrom = to_cstring(from.as_bytes());
    let cto = to_cstring(to.as_bytes());
    match strategy {
        WriteStrategy::ReplaceExisting => {
            // SAFETY: both paths NUL-terminated; rename is atomic
            let rc = unsafe { libc::rename(cfrom.as_ptr(), cto.as_ptr()) };
            if rc != 0 {
                return Err(AtomicWriteError::RenameFailed {
                    from: from.clone(),
                    to: to.clone(),
                    errno: errno(),
                });
            }
            Ok(true)
        }
        WriteStrategy::NoClobber => no_clobber_publish(from, to, &cfrom, &cto),
    }
}

/// `renameat2(RENAME_NOREPLACE)` where the kernel offers it, so a racing
/// creation between the existence check and here reports `DestinationExists`
/// instead of silently winning.
#[cfg(target_os = "linux")]
fn no_clobber_publish(
    from: &FsPath,
    to: &FsPath,
    cfrom: &std::ffi::CString,
    cto: &std::ffi::CString,
) -> Result<bool, AtomicWriteError> {
    // SAFETY: both paths NUL-terminated
    let rc = unsafe {
        libc::renameat2(
            libc::AT_FDCWD,
            cfrom.as_ptr(),
            libc::AT_FDCWD,
            cto.as_ptr(),
            libc::RENAME_NOREPLACE,
        )
    };
    if rc == 0 {
        return Ok(true);
    }
    match errno() {
        libc::EEXIST => Err(AtomicWriteError::DestinationExists(to.clone())),
        // older kernels and some filesystems reject the flag
        libc::EINVAL | libc::ENOSYS => link_publish(from, to, cfrom, cto),
        err => Err(AtomicWriteError::RenameFailed {
            from: from.clone(),
            to: to.clone(),
            errno: err,
        }),
    }
}

#[cfg(not(target_os = "linux"))]
fn no_clobber_publish(
    from: &FsPath,
    to: &FsPath,
    cfrom: &std::ffi::CString,
    cto: &std::ffi::CString,
) -> Result<bool, AtomicWriteError> {
    link_publish(from, to, cfrom, cto)
}

/// `link` + leave-temp-for-guard: link fails `EEXIST` when someone got there
/// first, which is exactly the no-clobber contract.
fn link_publish(
    from: &FsPath,
    to: &FsPath,
    cfrom: &std::ffi::CString,
    cto: &std::ffi::CString,
) -> Result<bool, AtomicWriteError> {
    // SAFETY: both paths NUL-terminated
    let rc = unsafe { libc::link(cfrom.as_ptr(), cto.as_ptr()) };
    if rc != 0 {
        let err = errno();
        if err == libc::EEXIST {
            return Err(AtomicWriteError::DestinationExists(to.clone()));
        }
        return Err(AtomicWriteError::RenameFailed {
            from: from.clone(),
            to: to.clone(),
            errno: err,
        });
    }
    // the destination now exists under both names; the guard unlinks `from`
    Ok(false)
}

fn sync_directory(parent: &FsPath) -> Result<(), AtomicWriteError> {
    let fail = |err: i32| AtomicWriteError::DirectorySyncFailed {
        path: parent.clone(),
        errno: err,
    };
    let cpath = to_cstring(parent.as_bytes());
    // SAFETY: cpath is NUL-terminated
    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(fail(errno()));
    }
    let mut dir = Descriptor::from_raw(fd);
    // SAFETY: fd just opened
    let rc = unsafe { libc::fsync(dir.raw_fd()) };
    let sync_err = (rc != 0).then(errno);
    let _ = dir.close();
    match sync_err {
        Some(err) => Err(fail(err)),
        None => Ok(()),
    }
}

/// Test-only fault points for the mid-protocol failures that cannot be
/// provoked from outside: a failing write, metadata copy, fsync or close
/// needs a dying disk. Thread-local, so concurrent tests cannot trip each
/// other; an armed fault fires once and disarms itself.
#[cfg(test)]
pub(crate) mod fault {
    use super::AtomicWriteError;
    use crate::error::MetadataOp;
    use std::cell::Cell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Step {
        Write,
        Metadata,
        Sync,
        Close,
    }

    thread_local! {
        static ARMED: Cell<Option<Step>> = const { Cell::new(None) };
    }

    pub(crate) fn arm(step: Step) {
        ARMED.with(|armed| armed.set(Some(step)));
    }

    /// The error the protocol would have surfaced had the kernel failed at
    /// `step`, if that step is armed on this thread.
    pub(crate) fn take(step: Step, bytes_expected: usize) -> Option<AtomicWriteError> {
        ARMED.with(|armed| {
            if armed.get() != Some(step) {
                return None;
            }
            armed.set(None);
            Some(match step {
                Step::Write => AtomicWriteError::WriteFailed {
                    bytes_written: 0,
                    bytes_expected,
                    errno: libc::EIO,
                },
                Step::Metadata => AtomicWriteError::MetadataPreservationFailed {
                    operation: MetadataOp::ExtendedAttributes,
                    errno: libc::ENOTSUP,
                },
                Step::Sync => AtomicWriteError::SyncFailed { errno: libc::EIO },
                Step::Close => AtomicWriteError::CloseFailed { errno: libc::EIO },
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::handle::{read_all, write_all};
    use crate::fs::stat;
    use crate::path::Component;

    fn scratch() -> (tempfile::TempDir, FsPath) {
        let dir = tempfile::tempdir().unwrap();
        let path = FsPath::try_from(dir.path()).unwrap();
        (dir, path)
    }

    fn entry_names(dir: &FsPath) -> Vec<Vec<u8>> {
        std::fs::read_dir(dir.as_std_path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_encoded_bytes())
            .collect()
    }

    fn assert_no_temp_residue(dir: &FsPath) {
        for name in entry_names(dir) {
            assert!(
                !name.ends_with(b".tmp"),
                "temp file leaked: {}",
                String::from_utf8_lossy(&name)
            );
        }
    }

    #[test]
    fn replaces_and_reads_back() {
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("out.bin").unwrap());
        write_atomic(b"Hello", &dest, &AtomicWriteOptions::default()).unwrap();
        assert_eq!(read_all(&dest).unwrap(), b"Hello");
        let info = stat::info(&dest).unwrap();
        assert_eq!(info.size, 5);
        assert_eq!(info.kind, FileKind::Regular);
        assert_no_temp_residue(&dir);
    }

    #[test]
    fn replaces_existing_contents() {
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("swap").unwrap());
        write_all(&dest, b"old contents").unwrap();
        write_atomic(b"new", &dest, &AtomicWriteOptions::default()).unwrap();
        assert_eq!(read_all(&dest).unwrap(), b"new");
        assert_no_temp_residue(&dir);
    }

    #[test]
    fn no_clobber_refuses_and_preserves() {
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("exists").unwrap());
        let opts = AtomicWriteOptions::new().strategy(WriteStrategy::NoClobber);
        write_atomic(&[1, 2, 3], &dest, &opts).unwrap();
        let err = write_atomic(&[4, 5, 6], &dest, &opts).unwrap_err();
        assert_eq!(err, AtomicWriteError::DestinationExists(dest.clone()));
        assert_eq!(read_all(&dest).unwrap(), &[1, 2, 3]);
        assert_no_temp_residue(&dir);
    }

    #[test]
    fn missing_parent() {
        let (_guard, dir) = scratch();
        let dest = dir
            .append(&Component::new("nope").unwrap())
            .append(&Component::new("out").unwrap());
        let err = write_atomic(b"x", &dest, &AtomicWriteOptions::default()).unwrap_err();
        assert_eq!(err, AtomicWriteError::ParentNotFound(dest.parent().unwrap()));
    }

    #[test]
    fn parent_not_a_directory() {
        let (_guard, dir) = scratch();
        let file = dir.append(&Component::new("plain").unwrap());
        write_all(&file, b"x").unwrap();
        let dest = file.append(&Component::new("child").unwrap());
        let err = write_atomic(b"x", &dest, &AtomicWriteOptions::default()).unwrap_err();
        assert_eq!(err, AtomicWriteError::ParentNotDirectory(file));
    }

    #[test]
    fn unwritable_parent_fails_at_temp_creation() {
        // permission checks do not apply to root, so the scenario cannot be
        // provoked there
        // SAFETY: geteuid has no failure modes
        if unsafe { libc::geteuid() } == 0 {
            return;
        }
        let (_guard, dir) = scratch();
        let sub = dir.append(&Component::new("ro").unwrap());
        std::fs::create_dir(sub.as_std_path()).unwrap();
        let mut perms = std::fs::metadata(sub.as_std_path()).unwrap().permissions();
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o555);
        std::fs::set_permissions(sub.as_std_path(), perms).unwrap();

        let dest = sub.append(&Component::new("out").unwrap());
        let err = write_atomic(b"x", &dest, &AtomicWriteOptions::default()).unwrap_err();
        assert_eq!(
            err,
            AtomicWriteError::TempFileCreationFailed { errno: libc::EACCES }
        );
        assert!(!stat::exists(&dest));
    }

    /// Arms a fault at one protocol step, attempts a replace, and checks the
    /// cleanup contract: the reported error matches, the pre-call bytes
    /// survive, and no temp file is left behind.
    fn assert_step_failure_cleans_up(
        step: fault::Step,
        options: AtomicWriteOptions,
        check: impl FnOnce(&AtomicWriteError),
    ) {
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("staged").unwrap());
        write_all(&dest, b"pre-call bytes").unwrap();

        fault::arm(step);
        let err = write_atomic(b"replacement", &dest, &options).unwrap_err();
        check(&err);
        assert_eq!(read_all(&dest).unwrap(), b"pre-call bytes");
        assert_no_temp_residue(&dir);
    }

    #[test]
    fn injected_write_failure_cleans_up() {
        assert_step_failure_cleans_up(
            fault::Step::Write,
            AtomicWriteOptions::default(),
            |err| {
                assert!(
                    matches!(
                        err,
                        AtomicWriteError::WriteFailed { errno: libc::EIO, .. }
                    ),
                    "unexpected error: {err:?}"
                );
            },
        );
    }

    #[test]
    fn injected_metadata_failure_cleans_up() {
        let opts = AtomicWriteOptions::new().preserve_extended_attributes(true);
        assert_step_failure_cleans_up(fault::Step::Metadata, opts, |err| {
            assert_eq!(
                err,
                &AtomicWriteError::MetadataPreservationFailed {
                    operation: MetadataOp::ExtendedAttributes,
                    errno: libc::ENOTSUP,
                }
            );
        });
    }

    #[test]
    fn injected_sync_failure_cleans_up() {
        assert_step_failure_cleans_up(
            fault::Step::Sync,
            AtomicWriteOptions::default(),
            |err| {
                assert_eq!(err, &AtomicWriteError::SyncFailed { errno: libc::EIO });
            },
        );
    }

    #[test]
    fn injected_close_failure_cleans_up() {
        assert_step_failure_cleans_up(
            fault::Step::Close,
            AtomicWriteOptions::default(),
            |err| {
                assert_eq!(err, &AtomicWriteError::CloseFailed { errno: libc::EIO });
            },
        );
    }

    /// Requesting xattr/ACL preservation on a platform where the copy is not
    /// wired up must fail loudly, not silently degrade.
    #[test]
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn xattr_preservation_unsupported_off_linux() {
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("attrs").unwrap());
        write_all(&dest, b"v1").unwrap();

        let opts = AtomicWriteOptions::new().preserve_extended_attributes(true);
        let err = write_atomic(b"v2", &dest, &opts).unwrap_err();
        assert_eq!(
            err,
            AtomicWriteError::MetadataPreservationFailed {
                operation: MetadataOp::ExtendedAttributes,
                errno: libc::ENOTSUP,
            }
        );

        let acl_opts = AtomicWriteOptions::new().preserve_acls(true);
        let err = write_atomic(b"v2", &dest, &acl_opts).unwrap_err();
        assert_eq!(
            err,
            AtomicWriteError::MetadataPreservationFailed {
                operation: MetadataOp::Acls,
                errno: libc::ENOTSUP,
            }
        );

        assert_eq!(read_all(&dest).unwrap(), b"v1");
        assert_no_temp_residue(&dir);
    }

    #[test]
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn xattr_preservation_copies_user_attributes() {
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("attrs").unwrap());
        write_all(&dest, b"v1").unwrap();

        let cpath = to_cstring(dest.as_bytes());
        let name = c"user.fsio.marker";
        // SAFETY: NUL-terminated path and name; value valid for its length
        let rc = unsafe {
            libc::setxattr(cpath.as_ptr(), name.as_ptr(), b"tagged".as_ptr().cast(), 6, 0)
        };
        if rc != 0 {
            // filesystem without user xattrs; nothing to verify here
            return;
        }

        let opts = AtomicWriteOptions::new().preserve_extended_attributes(true);
        write_atomic(b"v2", &dest, &opts).unwrap();
        assert_eq!(read_all(&dest).unwrap(), b"v2");

        let mut value = [0_u8; 16];
        // SAFETY: buffer valid for its length
        let len = unsafe {
            libc::getxattr(
                cpath.as_ptr(),
                name.as_ptr(),
                value.as_mut_ptr().cast(),
                value.len(),
            )
        };
        assert_eq!(len, 6, "xattr did not survive the replace");
        assert_eq!(&value[..6], b"tagged");
        assert_no_temp_residue(&dir);
    }

    #[test]
    fn failed_rename_cleans_up_temp() {
        let (_guard, dir) = scratch();
        // a non-empty directory at the destination makes the rename fail
        let dest = dir.append(&Component::new("blocked").unwrap());
        std::fs::create_dir(dest.as_std_path()).unwrap();
        write_all(&dest.append(&Component::new("inner").unwrap()), b"x").unwrap();

        let err = write_atomic(b"x", &dest, &AtomicWriteOptions::default()).unwrap_err();
        assert!(matches!(err, AtomicWriteError::RenameFailed { .. }));
        assert_no_temp_residue(&dir);
    }

    #[test]
    fn preserves_permission_bits() {
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("modes").unwrap());
        write_all(&dest, b"v1").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(
            dest.as_std_path(),
            std::fs::Permissions::from_mode(0o640),
        )
        .unwrap();

        write_atomic(b"v2", &dest, &AtomicWriteOptions::default()).unwrap();
        assert_eq!(stat::info(&dest).unwrap().permissions.bits(), 0o640);
    }

    #[test]
    fn fresh_file_gets_restrictive_mode() {
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("fresh").unwrap());
        write_atomic(b"v", &dest, &AtomicWriteOptions::default()).unwrap();
        // nothing to preserve: the temp's 0600 carries over
        assert_eq!(stat::info(&dest).unwrap().permissions.bits(), 0o600);
    }

    #[test]
    fn preserves_timestamps_on_request() {
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("stamped").unwrap());
        write_all(&dest, b"v1").unwrap();
        let past = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_times(dest.as_std_path(), past, past).unwrap();

        let opts = AtomicWriteOptions::new().preserve_timestamps(true);
        write_atomic(b"v2", &dest, &opts).unwrap();
        let meta = std::fs::metadata(dest.as_std_path()).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), past);
    }

    #[test]
    fn ownership_preservation_succeeds_for_own_files() {
        // chown to the caller's own uid/gid is always permitted, so both the
        // lax and strict paths must succeed here
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("owned").unwrap());
        write_all(&dest, b"v1").unwrap();

        let lax = AtomicWriteOptions::new().preserve_ownership(true);
        write_atomic(b"v2", &dest, &lax).unwrap();
        let strict = lax.strict_ownership(true);
        write_atomic(b"v3", &dest, &strict).unwrap();
        assert_eq!(read_all(&dest).unwrap(), b"v3");
    }

    #[test]
    fn durability_levels_all_succeed() {
        let (_guard, dir) = scratch();
        for (i, durability) in [Durability::None, Durability::DataOnly, Durability::Full]
            .into_iter()
            .enumerate()
        {
            let dest = dir.append(&Component::new(format!("d{i}").as_str()).unwrap());
            let opts = AtomicWriteOptions::new().durability(durability);
            write_atomic(b"payload", &dest, &opts).unwrap();
            assert_eq!(read_all(&dest).unwrap(), b"payload");
        }
        assert_no_temp_residue(&dir);
    }

    #[test]
    fn concurrent_writers_leave_one_winner_and_no_junk() {
        let (_guard, dir) = scratch();
        let dest = dir.append(&Component::new("contended").unwrap());
        let threads: Vec<_> = (0..8_u8)
            .map(|i| {
                let dest = dest.clone();
                std::thread::spawn(move || {
                    let payload = vec![i; 512];
                    write_atomic(&payload, &dest, &AtomicWriteOptions::default()).unwrap();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let winner = read_all(&dest).unwrap();
        assert_eq!(winner.len(), 512);
        assert!(winner.windows(2).all(|w| w[0] == w[1]), "mixed write");
        assert_no_temp_residue(&dir);
    }
}

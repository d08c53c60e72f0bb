//! Small syscall plumbing shared across the crate.

use std::ffi::CString;

/// The platform's native directory-entry struct and readdir flavour.
/// Linux/Android get the explicit 64-bit variants; everywhere else the plain
/// names already are 64-bit.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) use libc::{dirent64 as dirent_t, readdir64 as readdir_native};
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(crate) use libc::{dirent as dirent_t, readdir as readdir_native};

/// The errno left behind by the last failed syscall on this thread.
#[inline]
pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Zeroes the thread's errno. `readdir` signals both end-of-stream and
/// failure with a null return, so errno must be cleared before the call to
/// tell them apart.
#[inline]
pub(crate) fn clear_errno() {
    // SAFETY: writing the thread-local errno slot is always valid
    #[cfg(any(target_os = "linux", target_os = "emscripten"))]
    unsafe {
        *libc::__errno_location() = 0;
    }
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "dragonfly"
    ))]
    unsafe {
        *libc::__error() = 0;
    }
    #[cfg(any(target_os = "android", target_os = "openbsd", target_os = "netbsd"))]
    unsafe {
        *libc::__errno() = 0;
    }
}

/// Builds the NUL-terminated path the C API wants.
///
/// Validated paths contain no byte below 0x20, so a NUL can never appear and
/// the unchecked constructor is sound.
#[inline]
pub(crate) fn to_cstring(bytes: &[u8]) -> CString {
    debug_assert!(!bytes.contains(&0), "validated path contains NUL");
    // SAFETY: the invariant above, no interior NUL
    unsafe { CString::from_vec_unchecked(bytes.to_vec()) }
}

/// Reads the name out of a directory entry as a byte slice (no NUL).
///
/// # Safety
/// `entry` must be non-null and point at a live entry owned by an open
/// directory stream; the returned slice borrows from that entry and must not
/// outlive the next read on the stream.
#[inline]
pub(crate) unsafe fn dirent_name<'stream>(entry: *const dirent_t) -> &'stream [u8] {
    debug_assert!(!entry.is_null(), "dirent pointer is null");
    // SAFETY: caller guarantees a live, NUL-terminated entry
    unsafe {
        let name = crate::macros::access_dirent!(entry, d_name);
        core::slice::from_raw_parts(name, libc::strlen(name.cast()))
    }
}

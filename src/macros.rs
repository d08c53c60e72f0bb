/// Field access on a `dirent`-type struct pointer, papering over the
/// platform differences (`dirent64` on Linux/Android, `dirent` elsewhere,
/// `d_type` missing on illumos/Solaris).
///
/// # Safety
/// The pointer must be non-null and point at a live entry returned by the
/// directory stream. `d_name` is returned as a `*const u8` rather than by
/// value: the kernel is allowed to back it with less (or more) memory than
/// the declared array, so it must never be copied as a whole field.
macro_rules! access_dirent {
    ($entry_ptr:expr, d_name) => {
        (&raw const (*$entry_ptr).d_name).cast::<u8>()
    };
    ($entry_ptr:expr, d_type) => {{
        #[cfg(any(target_os = "solaris", target_os = "illumos"))]
        {
            // these platforms carry no type in the entry at all
            libc::DT_UNKNOWN
        }
        #[cfg(not(any(target_os = "solaris", target_os = "illumos")))]
        {
            (*$entry_ptr).d_type
        }
    }};
}

pub(crate) use access_dirent;

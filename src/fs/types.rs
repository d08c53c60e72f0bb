use libc::{S_IFDIR, S_IFLNK, S_IFMT, S_IFREG, mode_t};

/// What a directory entry or a stat result says an object is.
///
/// Anything that is not a regular file, directory or symlink (sockets, FIFOs,
/// devices, and entries whose type the filesystem refuses to reveal) is
/// `Other`; callers that care can lstat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Other,
}

impl FileKind {
    /// Maps a `d_type` byte from the directory stream.
    /// `DT_UNKNOWN` (and every exotic type) lands on `Other`.
    #[must_use]
    #[inline]
    pub const fn from_dtype(d_type: u8) -> Self {
        match d_type {
            libc::DT_REG => Self::Regular,
            libc::DT_DIR => Self::Directory,
            libc::DT_LNK => Self::Symlink,
            _ => Self::Other,
        }
    }

    /// Maps the `st_mode` type bits of a stat result.
    #[must_use]
    #[inline]
    pub const fn from_mode(mode: mode_t) -> Self {
        match mode & S_IFMT {
            S_IFREG => Self::Regular,
            S_IFDIR => Self::Directory,
            S_IFLNK => Self::Symlink,
            _ => Self::Other,
        }
    }
}

impl core::fmt::Display for FileKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Regular => write!(f, "regular file"),
            Self::Directory => write!(f, "directory"),
            Self::Symlink => write!(f, "symlink"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// The permission bits of a file, as a plain bitset (`st_mode & 07777`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Permissions(u32);

impl Permissions {
    pub const MASK: u32 = 0o7777;

    #[must_use]
    #[inline]
    pub const fn from_mode(mode: mode_t) -> Self {
        Self(mode as u32 & Self::MASK)
    }

    #[must_use]
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for Permissions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// Metadata returned by [`crate::fs::stat::info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatInfo {
    pub size: i64,
    pub kind: FileKind,
    pub permissions: Permissions,
}

/// Access direction requested when opening a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

/// Creation and positioning flags for an open.
///
/// The builder mirrors the `O_*` flags it translates to; `exclusive` only has
/// an effect together with `create` (as with the kernel's `O_EXCL`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
    pub exclusive: bool,
}

impl OpenOptions {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            create: false,
            truncate: false,
            append: false,
            exclusive: false,
        }
    }

    #[must_use]
    #[inline]
    pub const fn create(mut self, yes: bool) -> Self {
        self.create = yes;
        self
    }

    #[must_use]
    #[inline]
    pub const fn truncate(mut self, yes: bool) -> Self {
        self.truncate = yes;
        self
    }

    #[must_use]
    #[inline]
    pub const fn append(mut self, yes: bool) -> Self {
        self.append = yes;
        self
    }

    #[must_use]
    #[inline]
    pub const fn exclusive(mut self, yes: bool) -> Self {
        self.exclusive = yes;
        self
    }

    /// Translates mode + options into the flag word `open(2)` expects.
    /// `O_CLOEXEC` is always set; leaked descriptors across exec are never
    /// what a library caller wants.
    #[must_use]
    #[inline]
    pub(crate) const fn to_flags(self, mode: OpenMode) -> i32 {
        let mut flags = match mode {
            OpenMode::Read => libc::O_RDONLY,
            OpenMode::Write => libc::O_WRONLY,
            OpenMode::ReadWrite => libc::O_RDWR,
        } | libc::O_CLOEXEC;
        if self.create {
            flags |= libc::O_CREAT;
        }
        if self.truncate {
            flags |= libc::O_TRUNC;
        }
        if self.append {
            flags |= libc::O_APPEND;
        }
        if self.exclusive {
            flags |= libc::O_EXCL;
        }
        flags
    }
}

/// Where a seek is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start(i64),
    Current(i64),
    End(i64),
}

impl SeekFrom {
    #[inline]
    pub(crate) const fn to_whence_offset(self) -> (i32, i64) {
        match self {
            Self::Start(o) => (libc::SEEK_SET, o),
            Self::Current(o) => (libc::SEEK_CUR, o),
            Self::End(o) => (libc::SEEK_END, o),
        }
    }
}

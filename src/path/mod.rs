//! Validated, immutable path values.
//!
//! An [`FsPath`] is a plain byte string that has been checked once at
//! construction and never mutated afterwards. No normalisation is performed:
//! `/a//b`, `/a/./b` and `/a/b` are three distinct values and equality is
//! byte-wise. Everything here is cheap component arithmetic over the bytes;
//! nothing touches the filesystem.

mod component;

pub use component::Component;
use component::split_extension;

use crate::error::PathError;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;

/// An immutable, validated filesystem path.
///
/// Invariants: non-empty, no byte below 0x20 (NUL included). The original
/// separator structure is retained verbatim.
///
/// Backed by `Arc<[u8]>` so clones are a refcount bump; directory iteration
/// hands the same parent path to every entry without re-allocating it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FsPath {
    bytes: Arc<[u8]>,
}

impl FsPath {
    /// Validates `bytes` in a single scan.
    ///
    /// # Errors
    /// [`PathError::Empty`] on an empty input,
    /// [`PathError::ContainsControlCharacters`] on any byte below 0x20.
    #[inline]
    pub fn new<B: AsRef<[u8]>>(bytes: B) -> Result<Self, PathError> {
        let bytes = bytes.as_ref();
        if bytes.is_empty() {
            return Err(PathError::Empty);
        }
        if bytes.iter().any(|&b| b < 0x20) {
            return Err(PathError::ContainsControlCharacters);
        }
        Ok(Self {
            bytes: bytes.into(),
        })
    }

    /// Skips validation; callers guarantee the invariants hold.
    #[inline]
    #[must_use]
    pub(crate) fn new_unchecked<B: Into<Arc<[u8]>>>(bytes: B) -> Self {
        let bytes = bytes.into();
        debug_assert!(
            !bytes.is_empty() && !bytes.iter().any(|&b| b < 0x20),
            "invalid path bytes"
        );
        Self { bytes }
    }

    /// The raw bytes of the path.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The path as an `OsStr` (unix: a zero-cost view of the bytes).
    #[inline]
    #[must_use]
    pub fn as_os_str(&self) -> &OsStr {
        OsStr::from_bytes(&self.bytes)
    }

    /// The path as a `std::path::Path`, for interop with std-based callers.
    #[inline]
    #[must_use]
    pub fn as_std_path(&self) -> &std::path::Path {
        std::path::Path::new(self.as_os_str())
    }

    /// True iff the first byte is `/`.
    #[inline]
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.bytes[0] == b'/'
    }

    /// The path truncated to its second-to-last component boundary.
    ///
    /// `None` for the root and for a single-component relative path.
    /// Trailing separators on the remainder are dropped, so
    /// `/a//b -> /a` and `/a -> /`.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let b = &self.bytes;
        // strip trailing separators to find the end of the last component
        let mut end = b.len();
        while end > 0 && b[end - 1] == b'/' {
            end -= 1;
        }
        if end == 0 {
            // all separators: the root (a relative path cannot be all slashes)
            return None;
        }
        let comp_start = match b[..end].iter().rposition(|&c| c == b'/') {
            Some(i) => i + 1,
            None => return None, // single relative component
        };
        let mut keep = comp_start;
        while keep > 1 && b[keep - 1] == b'/' {
            keep -= 1;
        }
        Some(Self::new_unchecked(&b[..keep]))
    }

    /// The last named component, if the path has one (the root does not).
    #[inline]
    #[must_use]
    pub fn last_component(&self) -> Option<Component> {
        // SAFETY: a component split off a validated path is itself valid
        self.last_component_bytes()
            .map(|c| unsafe { Component::new_unchecked(c) })
    }

    #[inline]
    fn last_component_bytes(&self) -> Option<&[u8]> {
        self.last_component_span().map(|(s, e)| &self.bytes[s..e])
    }

    /// Byte range of the last named component; trailing separators sit after
    /// `end`.
    #[inline]
    fn last_component_span(&self) -> Option<(usize, usize)> {
        let b = &self.bytes;
        let mut end = b.len();
        while end > 0 && b[end - 1] == b'/' {
            end -= 1;
        }
        if end == 0 {
            return None;
        }
        let start = b[..end]
            .iter()
            .rposition(|&c| c == b'/')
            .map_or(0, |i| i + 1);
        Some((start, end))
    }

    /// Iterates the named components in order. Empty segments (doubled or
    /// trailing separators, the root) are excluded.
    #[inline]
    pub fn components(&self) -> impl Iterator<Item = &[u8]> {
        self.bytes.split(|&b| b == b'/').filter(|s| !s.is_empty())
    }

    /// Bytes after the rightmost `.` (not at index 0) of the last component.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> Option<&[u8]> {
        self.last_component_bytes()
            .and_then(|c| split_extension(c).1)
    }

    /// The last component minus its extension.
    #[inline]
    #[must_use]
    pub fn stem(&self) -> Option<&[u8]> {
        self.last_component_bytes().map(|c| split_extension(c).0)
    }

    /// A new path with `component` appended after a separator.
    #[must_use]
    pub fn append(&self, component: &Component) -> Self {
        let mut out = Vec::with_capacity(self.bytes.len() + 1 + component.as_bytes().len());
        out.extend_from_slice(&self.bytes);
        if *out.last().unwrap_or(&b'/') != b'/' {
            out.push(b'/');
        }
        out.extend_from_slice(component.as_bytes());
        Self::new_unchecked(out)
    }

    /// A new path with every named component of `rhs` appended in order.
    /// Separator structure of `rhs` is not retained.
    #[must_use]
    pub fn join(&self, rhs: &Self) -> Self {
        let mut out = Vec::with_capacity(self.bytes.len() + rhs.bytes.len() + 1);
        out.extend_from_slice(&self.bytes);
        for comp in rhs.components() {
            if *out.last().unwrap_or(&b'/') != b'/' {
                out.push(b'/');
            }
            out.extend_from_slice(comp);
        }
        Self::new_unchecked(out)
    }

    /// True iff `other`'s component sequence is a (possibly equal) prefix of
    /// this path's, and both are absolute or both relative.
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        if self.is_absolute() != other.is_absolute() {
            return false;
        }
        let mut mine = self.components();
        other.components().all(|theirs| mine.next() == Some(theirs))
    }

    /// The components remaining after a strict prefix `base`.
    ///
    /// `None` when `base` is not a prefix, differs in absoluteness, or equals
    /// this path. The result is always a relative path.
    #[must_use]
    pub fn relative_to(&self, base: &Self) -> Option<Self> {
        if !self.starts_with(base) {
            return None;
        }
        let skip = base.components().count();
        let mut out: Vec<u8> = Vec::new();
        for comp in self.components().skip(skip) {
            if !out.is_empty() {
                out.push(b'/');
            }
            out.extend_from_slice(comp);
        }
        if out.is_empty() {
            return None; // equal paths: not a strict prefix
        }
        Some(Self::new_unchecked(out))
    }

    /// Replaces the extension of the last component (adding one if absent).
    ///
    /// `None` when the path has no components, or when `ext` would break the
    /// path invariants (separators or control bytes).
    #[must_use]
    pub fn with_extension<B: AsRef<[u8]>>(&self, ext: B) -> Option<Self> {
        let ext = ext.as_ref();
        if ext.iter().any(|&b| b == b'/' || b < 0x20) {
            return None;
        }
        let (start, end) = self.last_component_span()?;
        let comp = &self.bytes[start..end];
        let stem_end = start + split_extension(comp).0.len();
        let mut out = Vec::with_capacity(stem_end + 1 + ext.len() + (self.bytes.len() - end));
        out.extend_from_slice(&self.bytes[..stem_end]);
        out.push(b'.');
        out.extend_from_slice(ext);
        out.extend_from_slice(&self.bytes[end..]);
        Some(Self::new_unchecked(out))
    }

    /// Replaces the last component with `name`. On the root the result is
    /// the root plus `name`; on a single relative component the result is
    /// just `name`.
    #[must_use]
    pub fn with_last_component(&self, name: &Component) -> Self {
        match self.parent() {
            Some(parent) => parent.append(name),
            None if self.is_absolute() => {
                // the root: "/name"
                let mut out = Vec::with_capacity(1 + name.as_bytes().len());
                out.push(b'/');
                out.extend_from_slice(name.as_bytes());
                Self::new_unchecked(out)
            }
            None => Self::new_unchecked(name.as_bytes()),
        }
    }

    /// Drops the extension (and its dot) from the last component.
    ///
    /// `None` when the path has no components. A path without an extension is
    /// returned unchanged.
    #[must_use]
    pub fn without_extension(&self) -> Option<Self> {
        let (start, end) = self.last_component_span()?;
        let comp = &self.bytes[start..end];
        let (stem, ext) = split_extension(comp);
        if ext.is_none() {
            return Some(self.clone());
        }
        let stem_end = start + stem.len();
        let mut out = Vec::with_capacity(stem_end + (self.bytes.len() - end));
        out.extend_from_slice(&self.bytes[..stem_end]);
        out.extend_from_slice(&self.bytes[end..]);
        Some(Self::new_unchecked(out))
    }

    /// Drops the last component. Identical to [`parent`](Self::parent); kept
    /// for symmetry with [`with_last_component`](Self::with_last_component).
    #[inline]
    #[must_use]
    pub fn without_last_component(&self) -> Option<Self> {
        self.parent()
    }
}

impl AsRef<[u8]> for FsPath {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<std::path::Path> for FsPath {
    #[inline]
    fn as_ref(&self) -> &std::path::Path {
        self.as_std_path()
    }
}

impl TryFrom<&str> for FsPath {
    type Error = PathError;

    #[inline]
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s.as_bytes())
    }
}

impl TryFrom<&OsStr> for FsPath {
    type Error = PathError;

    #[inline]
    fn try_from(s: &OsStr) -> Result<Self, Self::Error> {
        Self::new(s.as_bytes())
    }
}

impl TryFrom<&std::path::Path> for FsPath {
    type Error = PathError;

    #[inline]
    fn try_from(p: &std::path::Path) -> Result<Self, Self::Error> {
        Self::new(p.as_os_str().as_bytes())
    }
}

impl core::fmt::Display for FsPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

impl core::fmt::Debug for FsPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "FsPath({})", String::from_utf8_lossy(&self.bytes))
    }
}

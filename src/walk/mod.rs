//! Depth-first directory traversal over the sync iterator.
//!
//! Pre-order: a directory entry is yielded before its contents. Traversal
//! state is a stack of open cursors, so memory scales with tree depth, not
//! tree size.

use crate::error::DirError;
use crate::fs::stat;
use crate::fs::{DirCursor, Entry, FileKind};
use crate::path::FsPath;

/// Traversal policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOptions {
    /// Deepest entries to yield; `None` is unbounded. Immediate children of
    /// the root are depth 1 (the root itself is depth 0 and not yielded).
    pub max_depth: Option<usize>,
    /// Enter directories reached through symlinks. Off by default; loop
    /// avoidance is the caller's problem once this is on.
    pub follow_symlinks: bool,
    /// Skip entries whose name starts with a dot (and never descend into
    /// them).
    pub skip_hidden: bool,
}

impl WalkOptions {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            max_depth: None,
            follow_symlinks: false,
            skip_hidden: false,
        }
    }

    #[must_use]
    #[inline]
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    #[must_use]
    #[inline]
    pub const fn follow_symlinks(mut self, yes: bool) -> Self {
        self.follow_symlinks = yes;
        self
    }

    #[must_use]
    #[inline]
    pub const fn skip_hidden(mut self, yes: bool) -> Self {
        self.skip_hidden = yes;
        self
    }
}

/// An [`Entry`] plus how far below the traversal root it sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    entry: Entry,
    depth: usize,
}

impl WalkEntry {
    #[inline]
    #[must_use]
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// 1 for immediate children of the root.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Consumes the wrapper, keeping the entry.
    #[inline]
    #[must_use]
    pub fn into_entry(self) -> Entry {
        self.entry
    }
}

/// Depth-first traversal iterator; yields `Result` per entry, walkdir-style,
/// so one unreadable subdirectory does not kill the whole walk.
#[derive(Debug)]
pub struct Walk {
    stack: Vec<DirCursor>,
    options: WalkOptions,
    /// A descent failure parked while its directory entry is yielded first.
    pending: Option<DirError>,
}

impl Walk {
    /// Opens a traversal rooted at `path`.
    ///
    /// # Errors
    /// Same mapping as [`DirCursor::open`] for the root itself.
    pub fn new(path: &FsPath, options: WalkOptions) -> Result<Self, DirError> {
        let root = DirCursor::open(path)?;
        Ok(Self {
            stack: vec![root],
            options,
            pending: None,
        })
    }

    /// Whether `entry` names a directory we should walk into.
    fn should_descend(&self, entry: &Entry, depth: usize) -> bool {
        if let Some(max) = self.options.max_depth {
            if depth >= max {
                return false;
            }
        }
        match entry.kind() {
            FileKind::Directory => true,
            // symlinked directories are yielded but only entered on request
            FileKind::Symlink => {
                self.options.follow_symlinks && stat::is_directory(&entry.path())
            }
            // no d_type from the filesystem: one lstat decides
            FileKind::Other => stat::info_no_follow(&entry.path())
                .map(|info| info.kind == FileKind::Directory)
                .unwrap_or(false),
            FileKind::Regular => false,
        }
    }
}

impl Iterator for Walk {
    type Item = Result<WalkEntry, DirError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }
        loop {
            let depth = self.stack.len();
            let cursor = self.stack.last_mut()?;
            match cursor.next() {
                Some(entry) => {
                    if self.options.skip_hidden && entry.file_name().as_bytes()[0] == b'.' {
                        continue;
                    }
                    if self.should_descend(&entry, depth) {
                        match DirCursor::open(&entry.path()) {
                            Ok(child) => self.stack.push(child),
                            // yield the directory itself now, its error next
                            Err(err) => self.pending = Some(err),
                        }
                    }
                    return Some(Ok(WalkEntry { entry, depth }));
                }
                None => {
                    let mut done = self.stack.pop()?;
                    if let Some(err) = done.take_error() {
                        return Some(Err(err));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::write_all;
    use crate::path::Component;
    use std::collections::BTreeSet;

    fn scratch() -> (tempfile::TempDir, FsPath) {
        let dir = tempfile::tempdir().unwrap();
        let path = FsPath::try_from(dir.path()).unwrap();
        (dir, path)
    }

    fn comp(s: &str) -> Component {
        Component::new(s).unwrap()
    }

    /// root/{top.txt, sub/{mid.txt, deep/{leaf.txt}}, .hidden/{h.txt}}
    fn build_tree(root: &FsPath) {
        let sub = root.append(&comp("sub"));
        let deep = sub.append(&comp("deep"));
        let hidden = root.append(&comp(".hidden"));
        std::fs::create_dir_all(deep.as_std_path()).unwrap();
        std::fs::create_dir(hidden.as_std_path()).unwrap();
        write_all(&root.append(&comp("top.txt")), b"x").unwrap();
        write_all(&sub.append(&comp("mid.txt")), b"x").unwrap();
        write_all(&deep.append(&comp("leaf.txt")), b"x").unwrap();
        write_all(&hidden.append(&comp("h.txt")), b"x").unwrap();
    }

    fn collect(walk: Walk) -> Vec<(Vec<u8>, usize)> {
        walk.map(|r| {
            let we = r.unwrap();
            (we.entry().file_name().as_bytes().to_vec(), we.depth())
        })
        .collect()
    }

    #[test]
    fn full_walk_sees_everything_with_depths() {
        let (_guard, root) = scratch();
        build_tree(&root);
        let got: BTreeSet<(Vec<u8>, usize)> =
            collect(Walk::new(&root, WalkOptions::new()).unwrap())
                .into_iter()
                .collect();
        let expected: BTreeSet<(Vec<u8>, usize)> = [
            (b"top.txt".to_vec(), 1),
            (b"sub".to_vec(), 1),
            (b".hidden".to_vec(), 1),
            (b"h.txt".to_vec(), 2),
            (b"mid.txt".to_vec(), 2),
            (b"deep".to_vec(), 2),
            (b"leaf.txt".to_vec(), 3),
        ]
        .into_iter()
        .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn directories_come_before_their_contents() {
        let (_guard, root) = scratch();
        build_tree(&root);
        let order = collect(Walk::new(&root, WalkOptions::new()).unwrap());
        let pos = |name: &[u8]| order.iter().position(|(n, _)| n == name).unwrap();
        assert!(pos(b"sub") < pos(b"mid.txt"));
        assert!(pos(b"sub") < pos(b"deep"));
        assert!(pos(b"deep") < pos(b"leaf.txt"));
    }

    #[test]
    fn max_depth_cuts_descent() {
        let (_guard, root) = scratch();
        build_tree(&root);
        let got = collect(Walk::new(&root, WalkOptions::new().max_depth(1)).unwrap());
        assert!(got.iter().all(|(_, d)| *d == 1));
        assert!(got.iter().any(|(n, _)| n == b"sub"));
        assert!(!got.iter().any(|(n, _)| n == b"mid.txt"));
    }

    #[test]
    fn skip_hidden_prunes_subtrees() {
        let (_guard, root) = scratch();
        build_tree(&root);
        let got = collect(Walk::new(&root, WalkOptions::new().skip_hidden(true)).unwrap());
        assert!(!got.iter().any(|(n, _)| n == b".hidden"));
        assert!(!got.iter().any(|(n, _)| n == b"h.txt"));
        assert!(got.iter().any(|(n, _)| n == b"top.txt"));
    }

    #[test]
    fn symlinked_dirs_yielded_not_entered_by_default() {
        let (_guard, root) = scratch();
        let real = root.append(&comp("real"));
        std::fs::create_dir(real.as_std_path()).unwrap();
        write_all(&real.append(&comp("inside.txt")), b"x").unwrap();
        let link = root.append(&comp("alias"));
        std::os::unix::fs::symlink(real.as_std_path(), link.as_std_path()).unwrap();

        let got = collect(Walk::new(&root, WalkOptions::new()).unwrap());
        assert!(got.iter().any(|(n, _)| n == b"alias"));
        // inside.txt appears exactly once: via `real`, not via the alias
        assert_eq!(got.iter().filter(|(n, _)| n == b"inside.txt").count(), 1);

        let followed = collect(Walk::new(&root, WalkOptions::new().follow_symlinks(true)).unwrap());
        assert_eq!(
            followed.iter().filter(|(n, _)| n == b"inside.txt").count(),
            2
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let missing = FsPath::new("/no/walk/root").unwrap();
        assert_eq!(
            Walk::new(&missing, WalkOptions::new()).unwrap_err(),
            DirError::PathNotFound(missing)
        );
    }
}

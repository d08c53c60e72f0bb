#![cfg(unix)]
#![deny(unsafe_op_in_unsafe_fn)]

//! Safe, ergonomic and fast access to POSIX filesystems.
//!
//! Four tightly coupled pieces make up the crate:
//!
//! - [`path::FsPath`] / [`path::Component`]: validated, immutable path
//!   values with component-level arithmetic and no normalisation surprises.
//! - [`fs`]: descriptors, positioned handles, stat queries, and
//!   [`fs::write_atomic`], the create-temp / write / fsync / rename /
//!   fsync-parent protocol with selectable durability and metadata
//!   preservation.
//! - [`fs::DirCursor`] and [`walk::Walk`]: allocation-lean directory
//!   enumeration over raw `readdir`, lazy, with `.`/`..` filtered.
//! - [`exec::IoExecutor`] and [`exec::DirStream`]: a worker pool that runs
//!   the blocking syscalls off the caller's task, with one suspension point
//!   per operation, graceful shutdown, and batched async enumeration on top.
//!
//! Sync APIs block the calling thread and never touch the executor; async
//! APIs dispatch the same cores to a worker and suspend exactly once.
//! Neither layer is implemented in terms of the other.
//!
//! ```no_run
//! use fsio::fs::{self, AtomicWriteOptions};
//! use fsio::path::FsPath;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dest = FsPath::new("/tmp/demo/config.json")?;
//!     fs::write_atomic(br#"{"ok":true}"#, &dest, &AtomicWriteOptions::default())?;
//!     assert_eq!(fs::read_all(&dest)?, br#"{"ok":true}"#);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod exec;
pub mod fs;
pub mod path;
pub mod walk;

pub(crate) mod macros;
pub(crate) mod util;

pub use error::{
    AtomicWriteError, ComponentError, DescriptorError, DirError, ExecutorError, MetadataOp,
    PathError, StatError,
};
pub use exec::{DirStream, ExecutorConfig, IoExecutor};
pub use fs::{
    AtomicWriteOptions, Descriptor, DirCursor, Durability, Entry, FileKind, Handle, OpenMode,
    OpenOptions, Permissions, SeekFrom, StatInfo, WriteStrategy, write_atomic,
};
pub use path::{Component, FsPath};
pub use walk::{Walk, WalkEntry, WalkOptions};

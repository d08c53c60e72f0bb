mod atomic;
mod descriptor;
mod handle;
mod iter;
pub mod stat;
mod types;

pub use atomic::{AtomicWriteOptions, Durability, WriteStrategy, write_atomic};
pub use descriptor::Descriptor;
pub use handle::{Handle, read_all, write_all};
pub use iter::{DirCursor, Entry};
pub use types::{FileKind, OpenMode, OpenOptions, Permissions, SeekFrom, StatInfo};

//! Pull-based async directory enumeration, batched across the executor.

use crate::error::DirError;
use crate::exec::IoExecutor;
use crate::fs::{DirCursor, Entry};
use crate::path::FsPath;

/// Entries fetched per executor hop. Big enough that the per-batch dispatch
/// cost disappears against the readdir work, small enough not to sit on
/// memory for huge directories.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// What a fetch job hands back: the entries it drained, the cursor if the
/// stream still has more, and any read failure that ended it.
struct Batch {
    entries: Vec<Entry>,
    cursor: Option<DirCursor>,
    error: Option<DirError>,
}

enum State {
    /// Nothing fetched yet; the open happens inside the first job.
    Unopened(FsPath),
    /// Cursor parked between pulls.
    Parked(DirCursor),
    Finished,
}

/// Asynchronous directory iterator.
///
/// Each pull ships the cursor to an executor worker, drains up to
/// `batch_size` entries there, and hands the cursor back; the caller then
/// iterates the batch without suspending. Entry order is exactly the sync
/// iterator's order, whatever the batch size.
///
/// If the stream (or an in-flight pull) is dropped, the worker job still
/// runs to completion and the cursor inside its discarded result is closed
/// by drop, so the underlying `DIR` stream is never leaked.
pub struct DirStream {
    executor: IoExecutor,
    batch_size: usize,
    state: State,
    batch: std::vec::IntoIter<Entry>,
    /// Read failure delivered after the entries that preceded it.
    pending_error: Option<DirError>,
}

impl DirStream {
    /// Creates a stream over `path` with the default batch size.
    #[must_use]
    pub fn open(executor: &IoExecutor, path: &FsPath) -> Self {
        Self::with_batch_size(executor, path, DEFAULT_BATCH_SIZE)
    }

    /// Creates a stream fetching `batch_size` entries per executor hop.
    #[must_use]
    pub fn with_batch_size(executor: &IoExecutor, path: &FsPath, batch_size: usize) -> Self {
        Self {
            executor: executor.clone(),
            batch_size: batch_size.max(1),
            state: State::Unopened(path.clone()),
            batch: Vec::new().into_iter(),
            pending_error: None,
        }
    }

    /// The next entry, fetching a fresh batch when the current one is spent.
    ///
    /// Directory open/read failures come through as `Some(Err(..))` (after
    /// any entries read before the failure) and end the stream; so does an
    /// executor shutdown, as [`DirError::Executor`].
    pub async fn next(&mut self) -> Option<Result<Entry, DirError>> {
        loop {
            if let Some(entry) = self.batch.next() {
                return Some(Ok(entry));
            }
            if let Some(err) = self.pending_error.take() {
                self.state = State::Finished;
                return Some(Err(err));
            }
            let batch_size = self.batch_size;
            let fetched = match core::mem::replace(&mut self.state, State::Finished) {
                State::Finished => return None,
                State::Unopened(path) => {
                    self.executor
                        .submit(move || match DirCursor::open(&path) {
                            Ok(cursor) => drain_batch(cursor, batch_size),
                            Err(err) => Batch {
                                entries: Vec::new(),
                                cursor: None,
                                error: Some(err),
                            },
                        })
                        .await
                }
                State::Parked(cursor) => {
                    self.executor
                        .submit(move || drain_batch(cursor, batch_size))
                        .await
                }
            };
            match fetched {
                Ok(batch) => {
                    self.batch = batch.entries.into_iter();
                    self.pending_error = batch.error;
                    self.state = match batch.cursor {
                        Some(cursor) => State::Parked(cursor),
                        None => State::Finished,
                    };
                }
                Err(exec_err) => {
                    // state is already Finished; the cursor (if any) was
                    // closed inside the discarded job result
                    return Some(Err(DirError::Executor(exec_err)));
                }
            }
        }
    }

    /// Drains the whole stream into a vector, stopping at the first error.
    pub async fn collect_entries(mut self) -> Result<Vec<Entry>, DirError> {
        let mut out = Vec::new();
        while let Some(next) = self.next().await {
            out.push(next?);
        }
        Ok(out)
    }
}

/// Runs on a worker: pulls up to `batch_size` entries, then parks or
/// finishes the cursor. The final short (possibly empty) batch carries
/// `cursor: None`, which ends the stream; dropping the cursor here is what
/// closes the `DIR` stream.
fn drain_batch(mut cursor: DirCursor, batch_size: usize) -> Batch {
    let mut entries = Vec::with_capacity(batch_size);
    while entries.len() < batch_size {
        match cursor.next() {
            Some(entry) => entries.push(entry),
            None => {
                return Batch {
                    entries,
                    error: cursor.take_error(),
                    cursor: None,
                };
            }
        }
    }
    Batch {
        entries,
        cursor: Some(cursor),
        error: None,
    }
}

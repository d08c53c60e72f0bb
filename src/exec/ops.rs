//! Async forms of the blocking operations, dispatched via the executor.
//!
//! Each function suspends once (plus queue backpressure) while a worker runs
//! the sync core; the sync and async forms share that core rather than being
//! layered on one another.

use crate::error::{AtomicWriteError, DescriptorError, ExecutorError, StatError};
use crate::exec::IoExecutor;
use crate::fs::{self, AtomicWriteOptions, StatInfo};
use crate::path::FsPath;
use thiserror::Error;

/// Either the operation's own failure or the executor refusing the job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsyncOpError<E: core::fmt::Display> {
    #[error("{0}")]
    Op(E),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

fn flatten<T, E: core::fmt::Display>(
    outer: Result<Result<T, E>, ExecutorError>,
) -> Result<T, AsyncOpError<E>> {
    match outer {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(op)) => Err(AsyncOpError::Op(op)),
        Err(exec) => Err(AsyncOpError::Executor(exec)),
    }
}

/// Async [`fs::read_all`].
pub async fn read_file(
    executor: &IoExecutor,
    path: &FsPath,
) -> Result<Vec<u8>, AsyncOpError<DescriptorError>> {
    let path = path.clone();
    flatten(executor.submit(move || fs::read_all(&path)).await)
}

/// Async [`fs::write_all`]. Not crash-safe; see [`write_atomic`].
pub async fn write_file(
    executor: &IoExecutor,
    path: &FsPath,
    bytes: Vec<u8>,
) -> Result<(), AsyncOpError<DescriptorError>> {
    let path = path.clone();
    flatten(executor.submit(move || fs::write_all(&path, &bytes)).await)
}

/// Async [`fs::write_atomic`]. The whole protocol runs inside one worker
/// job, so cancelling the await leaves the filesystem in one of the two
/// valid states: old bytes or new bytes, never a partial file.
pub async fn write_atomic(
    executor: &IoExecutor,
    bytes: Vec<u8>,
    to: &FsPath,
    options: AtomicWriteOptions,
) -> Result<(), AsyncOpError<AtomicWriteError>> {
    let to = to.clone();
    flatten(
        executor
            .submit(move || fs::write_atomic(&bytes, &to, &options))
            .await,
    )
}

/// Async [`fs::stat::info`].
pub async fn info(
    executor: &IoExecutor,
    path: &FsPath,
) -> Result<StatInfo, AsyncOpError<StatError>> {
    let path = path.clone();
    flatten(executor.submit(move || fs::stat::info(&path)).await)
}

/// Async [`fs::stat::exists`].
pub async fn exists(executor: &IoExecutor, path: &FsPath) -> Result<bool, ExecutorError> {
    let path = path.clone();
    executor.submit(move || fs::stat::exists(&path)).await
}

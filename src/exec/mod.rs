//! Worker pool that runs blocking filesystem syscalls off the caller's task.
//!
//! A fixed set of OS threads pulls opaque jobs from a bounded MPMC queue;
//! each submission hands back a oneshot the caller awaits. From the async
//! side an operation suspends at exactly two well-defined points: the queue
//! send (only when the queue is full) and the completion await. The job body
//! itself never suspends; it runs start-to-finish on a worker thread, which
//! is what makes cancellation tractable: dropping the await abandons the
//! result, never the syscall.

mod ops;
mod stream;

pub use ops::{AsyncOpError, exists, info, read_file, write_atomic, write_file};
pub use stream::{DEFAULT_BATCH_SIZE, DirStream};

use crate::error::ExecutorError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;

/// An enqueued unit of blocking work.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Sizing for [`IoExecutor::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Worker threads. One is enough to serialise a device's syscalls;
    /// more buys parallelism across independent files.
    pub workers: usize,
    /// Queue slots. Large enough that bursts enqueue without suspending;
    /// when full, `submit` waits for a slot rather than growing unbounded.
    pub queue_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 1024,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub const fn queue_capacity(mut self, slots: usize) -> Self {
        self.queue_capacity = slots;
        self
    }
}

struct Inner {
    queue: async_channel::Sender<Job>,
    /// Closed (all senders gone) exactly when every worker has exited, which
    /// is what lets `shutdown` be awaited from any number of callers.
    workers_done: async_channel::Receiver<()>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

/// Handle to a worker pool. Cheap to clone; all clones share the pool, and
/// shutdown through any of them stops the lot.
#[derive(Clone)]
pub struct IoExecutor {
    inner: Arc<Inner>,
}

impl IoExecutor {
    /// Spawns the workers and returns a handle.
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        let workers = config.workers.max(1);
        let (job_tx, job_rx) = async_channel::bounded::<Job>(config.queue_capacity.max(1));
        let (done_tx, done_rx) = async_channel::bounded::<()>(workers);

        let handles = (0..workers)
            .map(|index| {
                let jobs = job_rx.clone();
                let done = done_tx.clone();
                thread::Builder::new()
                    .name(format!("fsio-worker-{index}"))
                    .spawn(move || {
                        tracing::debug!(worker = index, "io worker started");
                        // runs until the queue is closed AND drained: queued
                        // jobs are always completed, even during shutdown
                        while let Ok(job) = jobs.recv_blocking() {
                            job();
                        }
                        tracing::debug!(worker = index, "io worker exiting");
                        let _ = done.send_blocking(());
                    })
                    .expect("spawning an executor worker thread")
            })
            .collect();

        Self {
            inner: Arc::new(Inner {
                queue: job_tx,
                workers_done: done_rx,
                handles: Mutex::new(handles),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Runs `job` on a worker and resolves with its return value.
    ///
    /// Dropping the returned future after the job was enqueued cancels only
    /// the wait: the job still runs to completion on its worker and the
    /// result is discarded. Filesystem syscalls are not interruptible
    /// mid-flight, and a half-applied write would break the atomic-write
    /// contract.
    ///
    /// # Errors
    /// [`ExecutorError::ShutDown`] once [`shutdown`](Self::shutdown) has
    /// begun.
    pub async fn submit<T, F>(&self, job: F) -> Result<T, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(ExecutorError::ShutDown);
        }
        let (result_tx, result_rx) = oneshot::channel::<T>();
        let boxed: Job = Box::new(move || {
            // a closed receiver means the awaiter cancelled; the work is
            // done either way and the result just gets dropped
            let _ = result_tx.send(job());
        });
        self.inner
            .queue
            .send(boxed)
            .await
            .map_err(|_| ExecutorError::ShutDown)?;
        result_rx.await.map_err(|_| ExecutorError::ShutDown)
    }

    /// Drains the queue, stops the workers and joins them. Idempotent, and
    /// safe to race from several tasks: everyone resolves once the last
    /// worker is gone. Jobs already queued are completed; new submissions
    /// fail with [`ExecutorError::ShutDown`].
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        self.inner.queue.close();
        // recv fails only when every worker has dropped its sender clone,
        // i.e. exited its loop
        while self.inner.workers_done.recv().await.is_ok() {}
        let handles = {
            let mut guard = self
                .inner
                .handles
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            // the workers already signalled exit, so this cannot block long
            if handle.join().is_err() {
                tracing::error!("io worker panicked");
            }
        }
        tracing::debug!("executor shut down");
    }

    /// True once shutdown has begun (useful for tests and diagnostics).
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.shutting_down.load(Ordering::Acquire) {
            // leaked executor: close the queue so workers drain and exit on
            // their own; they are not joined, and process exit will not wait
            tracing::warn!("executor dropped without shutdown; detaching workers");
            self.queue.close();
        }
    }
}

impl core::fmt::Debug for IoExecutor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IoExecutor")
            .field("shutting_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

//! Bounded worker pool with submit/settle semantics
//!
//! Record, restore and export all fan out one small task per file and then
//! wait for the whole batch. [`WorkerPool`] wraps a rayon thread pool with
//! exactly that shape: [`WorkerPool::backlog`] enqueues a fallible unit of
//! work, [`WorkerPool::sync`] blocks until everything submitted so far has
//! settled and surfaces the first error. The pool is reusable across phases;
//! a failed batch does not poison later ones.

use crate::error::{HolotreeError, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Process-wide default worker count (number of CPUs)
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

struct PoolState {
    pending: Mutex<usize>,
    settled: Condvar,
    first_error: Mutex<Option<HolotreeError>>,
    dropped_errors: AtomicUsize,
}

/// Fixed-size pool executing fallible per-file tasks
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    state: Arc<PoolState>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.pool.current_num_threads())
            .field("pending", &*self.state.pending.lock())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool with `workers` threads (0 = number of CPUs)
    pub fn new(workers: usize) -> Result<Self> {
        let workers = if workers == 0 {
            default_workers()
        } else {
            workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("holotree-worker-{index}"))
            .build()
            .map_err(|err| HolotreeError::internal(format!("worker pool: {err}")))?;
        Ok(Self {
            pool,
            state: Arc::new(PoolState {
                pending: Mutex::new(0),
                settled: Condvar::new(),
                first_error: Mutex::new(None),
                dropped_errors: AtomicUsize::new(0),
            }),
        })
    }

    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Enqueue one unit of work
    ///
    /// Tasks run in submission order across `workers` threads with no
    /// ordering guarantee between them. Errors are kept for the next
    /// [`WorkerPool::sync`]; only the first one is surfaced, the rest are
    /// counted.
    pub fn backlog<F>(&self, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        *self.state.pending.lock() += 1;
        let state = Arc::clone(&self.state);
        self.pool.spawn(move || {
            let outcome = task();
            if let Err(err) = outcome {
                let mut slot = state.first_error.lock();
                if slot.is_none() {
                    *slot = Some(err);
                } else {
                    state.dropped_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            let mut pending = state.pending.lock();
            *pending -= 1;
            if *pending == 0 {
                state.settled.notify_all();
            }
        });
    }

    /// Block until all pending tasks settle; surface the first error
    ///
    /// Additional errors from the same batch are dropped after being
    /// counted and logged. The pool is ready for the next phase afterwards.
    pub fn sync(&self) -> Result<()> {
        let mut pending = self.state.pending.lock();
        while *pending > 0 {
            self.state.settled.wait(&mut pending);
        }
        drop(pending);

        let dropped = self.state.dropped_errors.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!("{} additional task errors dropped", dropped);
        }
        match self.state.first_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_backlog_and_sync_runs_everything() {
        let pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.backlog(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        }
        pool.sync().unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_sync_surfaces_first_error_only() {
        let pool = WorkerPool::new(2).unwrap();
        for index in 0..10 {
            pool.backlog(move || {
                if index % 2 == 0 {
                    Err(HolotreeError::internal(format!("task {index}")))
                } else {
                    Ok(())
                }
            });
        }
        let err = pool.sync().unwrap_err();
        assert!(matches!(err, HolotreeError::Internal(_)));

        // the pool is reusable after a failed batch
        pool.backlog(|| Ok(()));
        pool.sync().unwrap();
    }

    #[test]
    fn test_sync_with_no_tasks_is_noop() {
        let pool = WorkerPool::new(1).unwrap();
        pool.sync().unwrap();
    }
}

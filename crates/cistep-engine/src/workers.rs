//! Bounded fan-out over independent filesystem entries.

use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use rayon::ThreadPool;

use cistep_util::{CancelToken, LogSink};

use crate::error::EngineError;

/// A bounded worker pool together with the sink and cancellation token every
/// task of a run shares.
///
/// Every fan-out blocks until all of its tasks finish.
pub struct Workers<'a> {
    pool: ThreadPool,
    sink: &'a dyn LogSink,
    cancel: CancelToken,
}

impl<'a> Workers<'a> {
    /// Create a pool of at most `max_parallelism` threads; `None` or `0` uses
    /// one thread per available CPU.
    ///
    /// # Errors
    /// Returns an error if the thread pool cannot be built.
    pub fn new(
        max_parallelism: Option<usize>,
        sink: &'a dyn LogSink,
        cancel: CancelToken,
    ) -> Result<Self, EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_parallelism.unwrap_or(0))
            .thread_name(|i| format!("cistep-worker-{i}"))
            .build()
            .map_err(|e| EngineError::WorkerPool {
                message: e.to_string(),
            })?;
        Ok(Self { pool, sink, cancel })
    }

    pub fn sink(&self) -> &'a dyn LogSink {
        self.sink
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    /// Number of threads in the pool.
    pub fn parallelism(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Fail with `Interrupted` if the run was cancelled or timed out.
    ///
    /// # Errors
    /// Returns an error naming `operation` when the token has fired.
    pub fn check(&self, operation: &str) -> Result<(), EngineError> {
        match self.cancel.interruption() {
            Some(reason) => Err(EngineError::Interrupted {
                operation: operation.to_owned(),
                reason: reason.to_owned(),
            }),
            None => Ok(()),
        }
    }

    /// Apply `op` to every item concurrently, stopping at the first error.
    ///
    /// # Errors
    /// Returns the first error any task produced, or `Interrupted` if the
    /// token fires before a task starts.
    pub fn try_map<T, R, F>(&self, operation: &str, items: &[T], op: F) -> Result<Vec<R>, EngineError>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R, EngineError> + Sync + Send,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    self.check(operation)?;
                    op(item)
                })
                .collect()
        })
    }

    /// Apply `op` to every item concurrently and return every result, so one
    /// failing task never prevents its siblings from running.
    pub fn map_all<T, R, F>(&self, items: &[T], op: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(op).collect())
    }
}

//! Distribution of local batch computations over a fixed pool of worker threads.

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::trace;

use crate::error::PrepError;

/// Batches smaller than this are computed on the calling thread.
const MIN_PARALLEL_BATCH: usize = 1024;

/// A fixed-size pool of worker threads for the local (non-interactive) parts of preprocessing.
///
/// Workers never communicate: every job writes to a disjoint range of the output, and
/// [`Workers::distribute`] only returns once all ranges are done.
#[derive(Debug)]
pub struct Workers {
    pool: Option<ThreadPool>,
    threads: usize,
}

impl Workers {
    /// Creates a pool with `threads` workers. With at most one thread, all work runs inline.
    pub fn new(threads: usize) -> Result<Self, PrepError> {
        let pool = if threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("prep-worker-{i}"))
                .build()
                .map_err(|e| PrepError::Configuration(format!("worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(Workers {
            pool,
            threads: threads.max(1),
        })
    }

    /// The number of workers.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Fills `out` by running `job(begin, end, &mut out[begin..end])` on contiguous ranges.
    ///
    /// The ranges cover `0..out.len()` exactly once. The call returns after every worker has
    /// finished its range.
    pub fn distribute<T, F>(&self, out: &mut [T], job: F)
    where
        T: Send,
        F: Fn(usize, usize, &mut [T]) + Sync,
    {
        let len = out.len();
        let pool = match &self.pool {
            Some(pool) if len >= MIN_PARALLEL_BATCH => pool,
            _ => {
                job(0, len, out);
                return;
            }
        };
        let chunk = len.div_ceil(self.threads);
        trace!(len, chunk, threads = self.threads, "distributing batch");
        let job = &job;
        pool.scope(|s| {
            for (k, range) in out.chunks_mut(chunk).enumerate() {
                let begin = k * chunk;
                let end = begin + range.len();
                s.spawn(move |_| job(begin, end, range));
            }
        });
    }

    /// Maps every element of `input` to the element at the same index of the result, in parallel.
    pub fn map<I, T, F>(&self, input: &[I], f: F) -> Vec<T>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> T + Sync,
    {
        let mut out: Vec<Option<T>> = (0..input.len()).map(|_| None).collect();
        self.distribute(&mut out, |begin, end, slots| {
            for (slot, x) in slots.iter_mut().zip(&input[begin..end]) {
                *slot = Some(f(x));
            }
        });
        out.into_iter().flatten().collect()
    }
}

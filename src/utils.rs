//! Parallelism helpers shared by the ingest passes.

use std::ops::Range;

use rayon::prelude::*;

/// Whether parallel execution is allowed.
///
/// Components don't manage thread pools; the pool is set up at the API level
/// via `num_threads` and components just respect this flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics: `0` = auto, `1` = sequential, `n > 1` = exactly
/// `n` threads.
#[inline]
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    let parallelism = Parallelism::from_threads(n_threads);

    match parallelism {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .expect("Failed to create thread pool");
            pool.install(|| f(Parallelism::Parallel))
        }
    }
}

/// Rows per accumulation shard. Fixed so that the shard boundaries, and with
/// them every floating-point summation order, do not depend on thread count.
pub(crate) const INGEST_CHUNK_ROWS: usize = 1024;

/// Split `0..num_rows` into fixed-size chunks of [`INGEST_CHUNK_ROWS`].
pub(crate) fn row_chunks(num_rows: usize) -> Vec<Range<usize>> {
    let mut chunks = Vec::with_capacity(num_rows.div_ceil(INGEST_CHUNK_ROWS));
    let mut start = 0;
    while start < num_rows {
        let end = (start + INGEST_CHUNK_ROWS).min(num_rows);
        chunks.push(start..end);
        start = end;
    }
    chunks
}

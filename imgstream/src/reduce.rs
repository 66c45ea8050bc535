//! Cancellable parallel reductions.
//!
//! Statistics kernels split their input into independent work units and fold
//! the per-unit results. The reducer checks every supplied
//! [`SessionContext`] before starting a unit, so once a context is cancelled
//! no new unit starts; units already running finish and their results are
//! kept in the partial result.
//!
//! # Example
//!
//! ```
//! use imgstream::reduce::{ParallelReducer, Reduction};
//! use imgstream::session::SessionContext;
//!
//! let reducer = ParallelReducer::new(2).unwrap();
//! let context = SessionContext::new();
//!
//! let result = reducer.reduce(100, &[&context], || 0u64, |unit| unit as u64, |a, b| a + b);
//! assert_eq!(result, Reduction::Complete(4950));
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tracing::debug;

use crate::session::SessionContext;

/// Samples per histogram work unit.
pub const HISTOGRAM_CHUNK: usize = 4096;

/// Outcome of a reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduction<T> {
    /// Every unit ran.
    Complete(T),
    /// A context was cancelled; `partial` folds the units that ran.
    Cancelled { partial: T, completed_units: usize },
}

impl<T> Reduction<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Reduction::Complete(_))
    }

    /// The full result, or `None` if the reduction was cancelled.
    pub fn complete(self) -> Option<T> {
        match self {
            Reduction::Complete(value) => Some(value),
            Reduction::Cancelled { .. } => None,
        }
    }
}

/// Rayon thread pool dedicated to reductions.
///
/// Kept separate from the event worker pool so a long reduction cannot take
/// all request workers.
pub struct ParallelReducer {
    pool: ThreadPool,
}

impl ParallelReducer {
    /// Build a pool with `threads` threads (0 = one per CPU).
    pub fn new(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("imgstream-reduce-{}", i))
            .build()?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Map units `0..units` in parallel and fold the results.
    ///
    /// `fold` must be associative and `identity` its neutral element; the
    /// grouping of units is unspecified.
    pub fn reduce<T, I, M, F>(
        &self,
        units: usize,
        contexts: &[&SessionContext],
        identity: I,
        map: M,
        fold: F,
    ) -> Reduction<T>
    where
        T: Send,
        I: Fn() -> T + Sync + Send,
        M: Fn(usize) -> T + Sync + Send,
        F: Fn(T, T) -> T + Sync + Send,
    {
        let completed = AtomicUsize::new(0);
        let cancelled = || contexts.iter().any(|c| c.is_cancelled());

        let value = self.pool.install(|| {
            (0..units)
                .into_par_iter()
                .fold(&identity, |acc, unit| {
                    if cancelled() {
                        return acc;
                    }
                    let result = map(unit);
                    completed.fetch_add(1, Ordering::Relaxed);
                    fold(acc, result)
                })
                .reduce(&identity, &fold)
        });

        let completed_units = completed.into_inner();
        if completed_units == units {
            Reduction::Complete(value)
        } else {
            debug!(units, completed_units, "Reduction cancelled");
            Reduction::Cancelled {
                partial: value,
                completed_units,
            }
        }
    }
}

impl std::fmt::Debug for ParallelReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelReducer")
            .field("threads", &self.threads())
            .finish()
    }
}

/// Fixed-width histogram over `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub min: f32,
    pub max: f32,
    pub bins: Vec<u64>,
}

impl Histogram {
    /// An empty histogram with `num_bins` bins.
    pub fn empty(num_bins: usize, min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            bins: vec![0; num_bins],
        }
    }

    pub fn bin_width(&self) -> f32 {
        if self.bins.is_empty() {
            0.0
        } else {
            (self.max - self.min) / self.bins.len() as f32
        }
    }

    /// Total samples counted.
    pub fn total(&self) -> u64 {
        self.bins.iter().sum()
    }

    fn add(&mut self, value: f32) {
        if !value.is_finite() || value < self.min || value > self.max || self.bins.is_empty() {
            return;
        }
        let last = self.bins.len() - 1;
        let width = self.bin_width();
        let index = if width > 0.0 {
            (((value - self.min) / width) as usize).min(last)
        } else {
            0
        };
        self.bins[index] += 1;
    }

    fn merge(mut self, other: Histogram) -> Histogram {
        for (bin, count) in self.bins.iter_mut().zip(other.bins) {
            *bin += count;
        }
        self
    }

    /// Bin the finite samples of `data` in parallel work units of
    /// [`HISTOGRAM_CHUNK`] samples.
    pub fn compute(
        reducer: &ParallelReducer,
        data: &[f32],
        num_bins: usize,
        min: f32,
        max: f32,
        contexts: &[&SessionContext],
    ) -> Reduction<Histogram> {
        let units = data.len().div_ceil(HISTOGRAM_CHUNK);
        reducer.reduce(
            units,
            contexts,
            || Histogram::empty(num_bins, min, max),
            |unit| {
                let start = unit * HISTOGRAM_CHUNK;
                let end = (start + HISTOGRAM_CHUNK).min(data.len());
                let mut histogram = Histogram::empty(num_bins, min, max);
                for &value in &data[start..end] {
                    histogram.add(value);
                }
                histogram
            },
            Histogram::merge,
        )
    }
}

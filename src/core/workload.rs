//! Timed units of work and the worker pool they run on

use std::hint::black_box;
use std::num::NonZeroUsize;
use std::thread;

use crate::error::BenchError;

/// Something the harness brackets with one start/stop pair.
pub trait Workload {
    /// Probe label the work is recorded under.
    fn label(&self) -> String;

    /// Run the work once, synchronously.
    fn execute(&mut self) -> Result<(), BenchError>;
}

/// Process-wide worker count setting.
pub trait WorkerPool {
    fn set_global_default_threads(&mut self, threads: usize);
    fn threads(&self) -> usize;
}

/// Apply a requested worker count. Zero or negative leaves the default alone.
pub fn apply_worker_count(pool: &mut impl WorkerPool, requested: i32) -> bool {
    match usize::try_from(requested) {
        Ok(threads) if threads > 0 => {
            pool.set_global_default_threads(threads);
            true
        }
        _ => false,
    }
}

/// Fans tasks out over scoped OS threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedWorkerPool {
    threads: usize,
}

impl Default for ScopedWorkerPool {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

impl WorkerPool for ScopedWorkerPool {
    fn set_global_default_threads(&mut self, threads: usize) {
        self.threads = threads.max(1);
    }

    fn threads(&self) -> usize {
        self.threads
    }
}

impl ScopedWorkerPool {
    pub fn with_threads(threads: usize) -> Self {
        let mut pool = Self::default();
        pool.set_global_default_threads(threads);
        pool
    }

    /// Run `task(worker_index)` on every worker and sum the results.
    pub fn run<F>(&self, task: F) -> Result<u64, BenchError>
    where
        F: Fn(usize) -> u64 + Sync,
    {
        let task = &task;
        thread::scope(|scope| {
            let handles: Vec<_> = (0..self.threads)
                .map(|worker| scope.spawn(move || task(worker)))
                .collect();
            // Join everything before inspecting results so no panic escapes the scope.
            let results: Vec<_> = handles.into_iter().map(|handle| handle.join()).collect();
            results.into_iter().try_fold(0u64, |sum, result| {
                result
                    .map(|value| sum.wrapping_add(value))
                    .map_err(|_| BenchError::Worker("worker thread panicked".to_owned()))
            })
        })
    }
}

/// Fixed amount of integer arithmetic split evenly over the pool.
#[derive(Debug, Clone)]
pub struct SpinWorkload {
    units: u64,
    pool: ScopedWorkerPool,
}

impl SpinWorkload {
    pub fn new(units: u64, pool: ScopedWorkerPool) -> Self {
        Self { units, pool }
    }
}

impl Workload for SpinWorkload {
    fn label(&self) -> String {
        "Spin".to_owned()
    }

    fn execute(&mut self) -> Result<(), BenchError> {
        let threads = self.pool.threads() as u64;
        let share = self.units / threads;
        let remainder = self.units % threads;
        let checksum = self.pool.run(|worker| {
            let units = share + u64::from((worker as u64) < remainder);
            (0..units).fold(0u64, |acc, i| black_box(acc.wrapping_mul(31).wrapping_add(i)))
        })?;
        black_box(checksum);
        Ok(())
    }
}

/// One trivial operation per worker, so the time is almost all thread dispatch.
#[derive(Debug, Clone)]
pub struct ThreadFanOutWorkload {
    pool: ScopedWorkerPool,
}

impl ThreadFanOutWorkload {
    pub fn new(pool: ScopedWorkerPool) -> Self {
        Self { pool }
    }
}

impl Workload for ThreadFanOutWorkload {
    fn label(&self) -> String {
        format!("FanOutWithThreads-{}", self.pool.threads())
    }

    fn execute(&mut self) -> Result<(), BenchError> {
        let checksum = self.pool.run(|worker| black_box(worker as u64 + 1))?;
        black_box(checksum);
        Ok(())
    }
}

/// Per-thread dispatch cost from the fastest single-thread and multi-thread runs.
pub fn thread_overhead(single_min: f64, multi_min: f64, threads: usize) -> Option<f64> {
    (threads > 1).then(|| (multi_min - single_min) / (threads as f64 - 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_worker_count_keeps_default() {
        let mut pool = ScopedWorkerPool::default();
        let default = pool.threads();
        assert!(!apply_worker_count(&mut pool, 0));
        assert!(!apply_worker_count(&mut pool, -4));
        assert_eq!(pool.threads(), default);
        assert!(apply_worker_count(&mut pool, 3));
        assert_eq!(pool.threads(), 3);
    }

    #[test]
    fn pool_runs_every_worker() {
        let pool = ScopedWorkerPool::with_threads(4);
        assert_eq!(pool.run(|_| 1).unwrap(), 4);
    }

    #[test]
    fn panicking_worker_is_an_error() {
        let pool = ScopedWorkerPool::with_threads(2);
        let result = pool.run(|worker| {
            if worker == 1 {
                panic!("boom");
            }
            0
        });
        assert!(matches!(result, Err(BenchError::Worker(_))));
    }

    #[test]
    fn fan_out_label_names_thread_count() {
        let workload = ThreadFanOutWorkload::new(ScopedWorkerPool::with_threads(8));
        assert_eq!(workload.label(), "FanOutWithThreads-8");
    }

    #[test]
    fn overhead_needs_more_than_one_thread() {
        assert_eq!(thread_overhead(1.0, 5.0, 1), None);
        assert_eq!(thread_overhead(1.0, 5.0, 5), Some(1.0));
    }
}

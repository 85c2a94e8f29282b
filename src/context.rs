//! The execution context: a rayon thread pool every pass is dispatched on. One context
//! is created by the host and handed (as an `Arc`) to each component that dispatches work.
//!
//! Each pass is a single `install` call; the pass returns only once every work item has
//! completed, which gives us the full barrier required between passes.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::ComputeError;

pub struct ComputeContext {
    pool: ThreadPool,
    profiling: AtomicBool,
}

impl ComputeContext {
    /// `num_threads` of `None` lets rayon pick (one per logical core).
    pub fn new(num_threads: Option<usize>) -> Result<Self, ComputeError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("pbf-worker-{i}"));

        if let Some(n) = num_threads {
            if n == 0 {
                return Err(ComputeError::NoThreads);
            }
            builder = builder.num_threads(n);
        }

        Ok(Self {
            pool: builder.build()?,
            profiling: AtomicBool::new(false),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn enable_profiling(&self, enable: bool) {
        self.profiling.store(enable, Ordering::Relaxed);
    }

    pub fn is_profiling(&self) -> bool {
        self.profiling.load(Ordering::Relaxed)
    }

    /// Run one pass to completion on the pool.
    pub fn run_pass<R, F>(&self, name: &str, pass: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        if !self.is_profiling() {
            return self.pool.install(pass);
        }

        let start = Instant::now();
        let result = self.pool.install(pass);
        debug!("Pass `{name}`: {}μs", start.elapsed().as_micros());

        result
    }
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;

    use super::*;

    #[test]
    fn zero_threads_rejected() {
        assert!(matches!(
            ComputeContext::new(Some(0)),
            Err(ComputeError::NoThreads)
        ));
    }

    #[test]
    fn passes_run_on_pool() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        assert_eq!(ctx.num_threads(), 2);

        ctx.enable_profiling(true);
        let sum: u64 = ctx.run_pass("sum", || (0..1_000u64).into_par_iter().sum());
        assert_eq!(sum, 499_500);
        assert!(ctx.is_profiling());
    }
}

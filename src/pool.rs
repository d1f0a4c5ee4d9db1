use crate::error::Result;
use log::info;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Bounded worker pool for per-item work.
///
/// Every stage funnels its parallel work through here so the number of
/// concurrent raster readers/writers never exceeds the configured size.
pub struct TaskPool {
    pool: ThreadPool,
}

impl TaskPool {
    /// Pool with `threads` workers, or one per available core when `None`.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new();
        if let Some(n_threads) = threads {
            builder = builder.num_threads(n_threads);
        }
        let pool = builder.build()?;

        match threads {
            Some(n_threads) => info!("Using {} threads", n_threads),
            None => info!("Using all available threads ({})", pool.current_num_threads()),
        }

        Ok(Self { pool })
    }

    /// Apply `f` to every input; outputs come back in input order.
    ///
    /// Fails with one of the errors if any call fails; which one is unspecified.
    pub fn map_ordered<I, O, F>(&self, inputs: &[I], f: F) -> Result<Vec<O>>
    where
        I: Sync,
        O: Send,
        F: Fn(&I) -> Result<O> + Sync + Send,
    {
        self.pool
            .install(|| inputs.par_iter().map(|input| f(input)).collect())
    }

    /// Run `f` on every input with no ordering guarantee.
    ///
    /// Stops scheduling new work after the first failure and returns it.
    pub fn try_for_each_unordered<I, F>(&self, inputs: Vec<I>, f: F) -> Result<()>
    where
        I: Send,
        F: Fn(I) -> Result<()> + Sync + Send,
    {
        self.pool
            .install(|| inputs.into_par_iter().try_for_each(|input| f(input)))
    }
}

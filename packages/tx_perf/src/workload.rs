use std::fmt::Debug;
use std::sync::Arc;

/// The unit of work measured by a run.
///
/// A workload is shared by all workers of a run. Each worker attaches to it once, on its own
/// thread and before the start barrier, obtaining a [`WorkloadThread`] context that it then
/// calls repeatedly until its time budget is spent. Any per-thread resources the workload
/// needs (random number generators, transaction descriptors, retry counters) live in that
/// context, so workers never share mutable state through the harness.
pub trait Workload: Debug + Send + Sync + 'static {
    /// A short human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Creates the per-thread context for the worker with the given rank.
    fn attach(&self, rank: usize) -> Box<dyn WorkloadThread>;
}

/// The per-thread side of a [`Workload`].
pub trait WorkloadThread: Send {
    /// Performs one unit of work, returning the number of internal retries it took.
    ///
    /// The harness sums the returned values, so the reported retry count of a worker is
    /// non-decreasing over the run and zero if this was never called.
    fn call(&mut self, rank: usize, load_count: u64, store_count: u64) -> u64;

    /// Releases any external resources held by this context.
    ///
    /// The worker calls this exactly once on every exit path, including early termination
    /// because of a timing fault, cancellation or a panic in [`call()`][Self::call].
    fn release(&mut self) {}
}

/// Wraps a closure as a [`Workload`].
///
/// The closure receives the rank, load count and store count of each call and returns the
/// number of retries the call took.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use tx_perf::{RunConfig, Runner, workload_fn};
///
/// let config = RunConfig::builder()
///     .thread_count(NonZero::new(2).unwrap())
///     .duration_ms(5)
///     .workload(workload_fn("spin", |_rank, loads, stores| {
///         std::hint::black_box(loads.wrapping_add(stores));
///         0
///     }))
///     .build()
///     .unwrap();
///
/// let result = Runner::new(config).run().unwrap();
/// assert_eq!(result.len(), 2);
/// ```
pub fn workload_fn<F>(name: &'static str, f: F) -> impl Workload
where
    F: Fn(usize, u64, u64) -> u64 + Send + Sync + 'static,
{
    FnWorkload {
        name,
        f: Arc::new(f),
    }
}

struct FnWorkload<F> {
    name: &'static str,
    f: Arc<F>,
}

impl<F> Debug for FnWorkload<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnWorkload")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Workload for FnWorkload<F>
where
    F: Fn(usize, u64, u64) -> u64 + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn attach(&self, _rank: usize) -> Box<dyn WorkloadThread> {
        Box::new(FnWorkloadThread {
            f: Arc::clone(&self.f),
        })
    }
}

struct FnWorkloadThread<F> {
    f: Arc<F>,
}

impl<F> WorkloadThread for FnWorkloadThread<F>
where
    F: Fn(usize, u64, u64) -> u64 + Send + Sync + 'static,
{
    fn call(&mut self, rank: usize, load_count: u64, store_count: u64) -> u64 {
        (self.f)(rank, load_count, store_count)
    }
}

/// A workload that returns immediately without retries, measuring pure harness overhead.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopWorkload;

impl Workload for NoopWorkload {
    fn name(&self) -> &str {
        "noop"
    }

    fn attach(&self, _rank: usize) -> Box<dyn WorkloadThread> {
        Box::new(NoopWorkload)
    }
}

impl WorkloadThread for NoopWorkload {
    fn call(&mut self, _rank: usize, _load_count: u64, _store_count: u64) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(NoopWorkload: Workload, WorkloadThread);

    #[test]
    fn fn_workload_forwards_arguments_and_retries() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let workload = workload_fn("recording", {
            let seen = Arc::clone(&seen);
            move |rank, loads, stores| {
                seen.lock().unwrap().push((rank, loads, stores));
                3
            }
        });

        assert_eq!(workload.name(), "recording");

        let mut thread = workload.attach(2);
        assert_eq!(thread.call(2, 10, 5), 3);
        assert_eq!(thread.call(2, 1, 0), 3);

        assert_eq!(*seen.lock().unwrap(), vec![(2, 10, 5), (2, 1, 0)]);
    }

    #[test]
    fn noop_never_retries() {
        let mut thread = NoopWorkload.attach(0);

        assert_eq!(thread.call(0, 100, 100), 0);
        thread.release();
    }
}

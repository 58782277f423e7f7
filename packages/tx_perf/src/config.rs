use std::num::NonZero;
use std::sync::Arc;
use std::time::Duration;

use crate::{ConfigError, Workload};

/// The immutable parameters of one benchmark run.
///
/// Use [`RunConfig::builder()`] to create one. The defaults match the command line tool: one
/// thread, a zero duration, and no loads or stores; only the workload has to be provided.
#[derive(Clone, Debug)]
pub struct RunConfig {
    thread_count: NonZero<usize>,
    duration_ms: u64,
    load_count: u64,
    store_count: u64,
    workload: Arc<dyn Workload>,
}

impl RunConfig {
    /// Starts configuring a run.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZero;
    ///
    /// use tx_perf::{NoopWorkload, RunConfig};
    ///
    /// let config = RunConfig::builder()
    ///     .thread_count(NonZero::new(4).unwrap())
    ///     .duration_ms(100)
    ///     .load_count(10)
    ///     .store_count(2)
    ///     .workload(NoopWorkload)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(config.thread_count().get(), 4);
    /// ```
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::new()
    }

    /// The number of workers, one thread each.
    #[must_use]
    pub fn thread_count(&self) -> NonZero<usize> {
        self.thread_count
    }

    /// The time budget of each worker, in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// The time budget of each worker.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// The number of loads the workload performs per call.
    #[must_use]
    pub fn load_count(&self) -> u64 {
        self.load_count
    }

    /// The number of stores the workload performs per call.
    #[must_use]
    pub fn store_count(&self) -> u64 {
        self.store_count
    }

    /// The workload under test.
    #[must_use]
    pub fn workload(&self) -> &Arc<dyn Workload> {
        &self.workload
    }
}

/// Builder for [`RunConfig`].
#[derive(Debug)]
#[must_use]
pub struct RunConfigBuilder {
    thread_count: NonZero<usize>,
    duration_ms: u64,
    load_count: u64,
    store_count: u64,
    workload: Option<Arc<dyn Workload>>,
}

impl RunConfigBuilder {
    fn new() -> Self {
        Self {
            thread_count: NonZero::<usize>::MIN,
            duration_ms: 0,
            load_count: 0,
            store_count: 0,
            workload: None,
        }
    }

    /// Sets the number of concurrent workers.
    pub fn thread_count(mut self, thread_count: NonZero<usize>) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Sets how long each worker keeps calling the workload, in milliseconds.
    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Sets the number of loads per workload call.
    pub fn load_count(mut self, load_count: u64) -> Self {
        self.load_count = load_count;
        self
    }

    /// Sets the number of stores per workload call.
    pub fn store_count(mut self, store_count: u64) -> Self {
        self.store_count = store_count;
        self
    }

    /// Sets the workload to measure.
    pub fn workload(self, workload: impl Workload) -> Self {
        self.shared_workload(Arc::new(workload))
    }

    /// Sets the workload to measure, sharing it with the caller.
    pub fn shared_workload(self, workload: Arc<dyn Workload>) -> Self {
        Self {
            workload: Some(workload),
            ..self
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingWorkload`] if no workload was set.
    pub fn build(self) -> Result<RunConfig, ConfigError> {
        let workload = self.workload.ok_or(ConfigError::MissingWorkload)?;

        Ok(RunConfig {
            thread_count: self.thread_count,
            duration_ms: self.duration_ms,
            load_count: self.load_count,
            store_count: self.store_count,
            workload,
        })
    }
}

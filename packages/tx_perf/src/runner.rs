use std::any::Any;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, error, warn};

use crate::pal::{Platform, PlatformFacade};
use crate::worker::{CancelFlag, Worker};
use crate::{
    Barrier, JoinError, RunConfig, RunError, RunErrorKind, SetupError, SyncError, WorkerState,
};

/// Position of a [`Runner`] in its state machine.
///
/// A runner moves `NotStarted -> Starting -> Running -> Joining -> Done`. `Failed` is absorbing
/// and can be entered from any phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum RunPhase {
    /// [`Runner::run()`] has not been called yet.
    NotStarted,

    /// Worker threads are being started, one at a time in rank order.
    Starting,

    /// All workers have been started and are executing.
    Running,

    /// Workers are being joined in rank order.
    Joining,

    /// All workers have been joined and the barrier has been torn down.
    Done,

    /// The run was aborted or reported an error.
    Failed,
}

/// Drives one benchmark run: starts one thread per worker, lets them rendezvous at a shared
/// barrier, joins them and collects their metrics in rank order.
///
/// No worker thread outlives [`run()`][Self::run]. If starting or joining a worker fails, the
/// remaining workers are cancelled and still joined before the error is returned.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use tx_perf::{NoopWorkload, RunConfig, Runner};
///
/// let config = RunConfig::builder()
///     .thread_count(NonZero::new(2).unwrap())
///     .duration_ms(10)
///     .workload(NoopWorkload)
///     .build()
///     .unwrap();
///
/// let result = Runner::new(config).run().unwrap();
///
/// for worker in result.iter() {
///     assert!(worker.is_completed());
///     assert!(worker.elapsed_ms() >= 10);
/// }
/// ```
#[derive(Debug)]
pub struct Runner {
    config: RunConfig,
    platform: PlatformFacade,
    phase: RunPhase,
}

impl Runner {
    /// Creates a runner for the given configuration, using native threads.
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self::with_platform(config, PlatformFacade::target())
    }

    pub(crate) fn with_platform(config: RunConfig, platform: PlatformFacade) -> Self {
        Self {
            config,
            platform,
            phase: RunPhase::NotStarted,
        }
    }

    /// The configuration this runner executes.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The current phase of the run.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Executes the run, blocking until every worker has finished or been cancelled.
    ///
    /// # Errors
    ///
    /// * [`SetupError`] if the barrier or the worker state cannot be created, or a worker
    ///   thread cannot be started. Workers started before the failure are cancelled and joined.
    /// * [`JoinError`] if a worker thread panicked. The other workers are still joined and the
    ///   error carries their results.
    /// * A teardown error if the barrier cannot be closed. The error carries the full results.
    ///   All workers are joined before the barrier is closed, so this only happens if the
    ///   barrier's own bookkeeping is broken.
    ///
    /// A runner executes at most once; later calls fail with [`SetupError::AlreadyRun`].
    pub fn run(&mut self) -> Result<RunResult, RunError> {
        if self.phase != RunPhase::NotStarted {
            return Err(RunError::new(SetupError::AlreadyRun, None));
        }

        let thread_count = self.config.thread_count().get();

        debug!(
            thread_count,
            duration_ms = self.config.duration_ms(),
            load_count = self.config.load_count(),
            store_count = self.config.store_count(),
            workload = self.config.workload().name(),
            "starting run"
        );

        let barrier = match Barrier::new(thread_count) {
            Ok(barrier) => Arc::new(barrier),
            Err(setup_error) => return Err(self.abort(setup_error.into(), None)),
        };

        let mut slots = Vec::new();
        if slots.try_reserve_exact(thread_count).is_err() {
            return Err(self.abort(SetupError::OutOfMemory { thread_count }.into(), None));
        }

        self.enter(RunPhase::Starting);

        for rank in 0..thread_count {
            let cancel = CancelFlag::default();

            let worker = Worker::new(
                rank,
                self.config.clone(),
                Arc::clone(&barrier),
                cancel.clone(),
                self.platform.new_time_source(),
            );

            match self
                .platform
                .spawn_worker(rank, Box::new(move || worker.run()))
            {
                Ok(handle) => slots.push(WorkerSlot { cancel, handle }),
                Err(source) => {
                    error!(rank, %source, "failed to start worker thread");

                    // The barrier can no longer fill up, so everyone already started would wait
                    // at it forever.
                    barrier.cancel();
                    cancel_all(&slots);

                    // Nothing a worker collected before cancellation is worth reporting, but
                    // the threads must still be joined so that none outlives the run.
                    drop(join_in_order(slots, &barrier));

                    return Err(self.abort(SetupError::SpawnWorker { rank, source }.into(), None));
                }
            }
        }

        self.enter(RunPhase::Running);
        self.enter(RunPhase::Joining);

        let (result, join_error) = join_in_order(slots, &barrier);

        let result = match conclude(result, join_error, barrier.close()) {
            Ok(result) => result,
            Err(run_error) => return Err(self.abort_with(run_error)),
        };

        self.enter(RunPhase::Done);
        debug!(completed = result.completed().count(), "run finished");

        Ok(result)
    }

    fn enter(&mut self, next: RunPhase) {
        debug!(from = ?self.phase, to = ?next, "runner phase transition");
        self.phase = next;
    }

    fn abort(&mut self, kind: RunErrorKind, partial: Option<RunResult>) -> RunError {
        self.abort_with(RunError::new(kind, partial))
    }

    fn abort_with(&mut self, run_error: RunError) -> RunError {
        error!(%run_error, phase = ?self.phase, "run failed");
        self.enter(RunPhase::Failed);
        run_error
    }
}

/// Combines the outcome of joining the workers with the outcome of closing the barrier.
///
/// Every worker has been joined by the time the barrier is closed, so no thread can still be
/// parked in it and a teardown failure indicates a bookkeeping defect. A join failure takes
/// precedence over a teardown failure.
fn conclude(
    result: RunResult,
    join_error: Option<JoinError>,
    teardown: Result<(), SyncError>,
) -> Result<RunResult, RunError> {
    if let Err(teardown_error) = teardown {
        error!(%teardown_error, "failed to tear down barrier");

        if join_error.is_none() {
            return Err(RunError::teardown(teardown_error, result));
        }
    }

    match join_error {
        Some(join_error) => Err(RunError::new(join_error, Some(result))),
        None => Ok(result),
    }
}

#[derive(Debug)]
struct WorkerSlot {
    cancel: CancelFlag,
    handle: JoinHandle<WorkerState>,
}

fn cancel_all(slots: &[WorkerSlot]) {
    for slot in slots {
        slot.cancel.cancel();
    }
}

/// Joins every worker in rank order, returning their states and the first join failure.
///
/// After the first failure, every worker not yet joined is cancelled but still joined, so the
/// caller never leaves a thread behind.
fn join_in_order(slots: Vec<WorkerSlot>, barrier: &Barrier) -> (RunResult, Option<JoinError>) {
    let (cancels, handles): (Vec<_>, Vec<_>) = slots
        .into_iter()
        .map(|slot| (slot.cancel, slot.handle))
        .unzip();

    let mut states = Vec::with_capacity(handles.len());
    let mut first_error = None;

    for (rank, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(state) => states.push(state),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(rank, %message, "worker thread panicked");

                states.push(WorkerState::panicked(rank));

                if first_error.is_none() {
                    warn!(rank, "cancelling workers that have not been joined yet");

                    barrier.cancel();
                    for cancel in cancels.iter().skip(rank.saturating_add(1)) {
                        cancel.cancel();
                    }

                    first_error = Some(JoinError::Panicked { rank, message });
                }
            }
        }
    }

    (RunResult::new(states), first_error)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// The per-worker outcome of a run, in rank order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunResult {
    workers: Box<[WorkerState]>,
}

impl RunResult {
    pub(crate) fn new(workers: Vec<WorkerState>) -> Self {
        debug_assert!(
            workers
                .iter()
                .enumerate()
                .all(|(index, worker)| worker.rank() == index),
            "worker states must be stored in rank order"
        );

        Self {
            workers: workers.into_boxed_slice(),
        }
    }

    /// The number of workers in the run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the result describes no workers at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// The state of the worker with the given rank.
    #[must_use]
    pub fn get(&self, rank: usize) -> Option<&WorkerState> {
        self.workers.get(rank)
    }

    /// Iterates over all workers in ascending rank order.
    pub fn iter(&self) -> impl Iterator<Item = &WorkerState> {
        self.workers.iter()
    }

    /// Iterates over the workers that spent their whole time budget, in ascending rank order.
    pub fn completed(&self) -> impl Iterator<Item = &WorkerState> {
        self.workers.iter().filter(|worker| worker.is_completed())
    }

    /// Whether every worker completed normally.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.workers.iter().all(WorkerState::is_completed)
    }
}

impl<'a> IntoIterator for &'a RunResult {
    type Item = &'a WorkerState;
    type IntoIter = std::slice::Iter<'a, WorkerState>;

    fn into_iter(self) -> Self::IntoIter {
        self.workers.iter()
    }
}

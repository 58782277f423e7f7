use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use scopeguard::ScopeGuard;
use tracing::{debug, trace, warn};

use crate::pal::{TimeSource, TimeSourceFacade};
use crate::{Barrier, RunConfig, SyncError, TimingError};

/// Where a worker is in its life.
///
/// A worker moves through `Created`, `WaitingAtBarrier` and `Running` and ends in exactly one of
/// the terminal states `Completed` or `Failed`. The runner only ever hands out terminal states.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Lifecycle {
    /// The worker exists but its thread has not reached the start barrier.
    Created,

    /// The worker is parked at the start barrier.
    WaitingAtBarrier,

    /// The worker is executing its measurement loop.
    Running,

    /// The worker spent its whole time budget and stopped normally.
    Completed,

    /// The worker stopped early. Any metrics it carries are partial.
    Failed(FailureReason),
}

impl Lifecycle {
    /// Whether this is `Completed` or `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// Why a worker ended in [`Lifecycle::Failed`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum FailureReason {
    /// The start barrier failed for a reason other than cancellation.
    Sync(SyncError),

    /// The worker's clock failed.
    Timing(TimingError),

    /// The runner cancelled the worker before it finished.
    Cancelled,

    /// The worker thread panicked, so no metrics survived.
    Panicked,
}

/// The metrics and final lifecycle state of one worker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerState {
    rank: usize,
    iterations: u64,
    elapsed_ms: u64,
    retries: u64,
    lifecycle: Lifecycle,
}

impl WorkerState {
    pub(crate) fn new(rank: usize) -> Self {
        Self {
            rank,
            iterations: 0,
            elapsed_ms: 0,
            retries: 0,
            lifecycle: Lifecycle::Created,
        }
    }

    pub(crate) fn panicked(rank: usize) -> Self {
        Self {
            lifecycle: Lifecycle::Failed(FailureReason::Panicked),
            ..Self::new(rank)
        }
    }

    /// The 0-based identity of the worker among its peers.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// How many times the worker called the workload.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Milliseconds between the start of the measurement loop and the last clock reading.
    ///
    /// The deadline is only checked between workload calls, so this may exceed the configured
    /// duration by up to the cost of one call.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// The total number of retries the workload reported.
    #[must_use]
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// The state the worker ended in.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether the worker spent its whole time budget.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.lifecycle == Lifecycle::Completed
    }

    #[cfg(test)]
    pub(crate) fn set_metrics_for_test(
        &mut self,
        elapsed_ms: u64,
        iterations: u64,
        retries: u64,
        lifecycle: Lifecycle,
    ) {
        self.elapsed_ms = elapsed_ms;
        self.iterations = iterations;
        self.retries = retries;
        self.lifecycle = lifecycle;
    }

    fn transition(&mut self, next: Lifecycle) {
        trace!(rank = self.rank, from = ?self.lifecycle, to = ?next, "worker lifecycle transition");
        self.lifecycle = next;
    }

    fn fail(&mut self, reason: FailureReason) {
        warn!(
            rank = self.rank,
            ?reason,
            iterations = self.iterations,
            elapsed_ms = self.elapsed_ms,
            "worker stopped early"
        );
        self.transition(Lifecycle::Failed(reason));
    }
}

/// Advisory request for one worker to stop, observed at its next deadline check.
#[derive(Clone, Debug, Default)]
pub(crate) struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Everything one worker thread needs to execute its part of a run.
#[derive(derive_more::Debug)]
pub(crate) struct Worker {
    rank: usize,
    #[debug(ignore)]
    config: RunConfig,
    barrier: Arc<Barrier>,
    cancel: CancelFlag,
    clock: TimeSourceFacade,
}

impl Worker {
    pub(crate) fn new(
        rank: usize,
        config: RunConfig,
        barrier: Arc<Barrier>,
        cancel: CancelFlag,
        clock: TimeSourceFacade,
    ) -> Self {
        Self {
            rank,
            config,
            barrier,
            cancel,
            clock,
        }
    }

    /// Executes the worker on the current thread, returning its final state.
    ///
    /// The returned state is always terminal. A panic from the workload propagates after the
    /// workload context has been released.
    pub(crate) fn run(mut self) -> WorkerState {
        let rank = self.rank;
        let mut state = WorkerState::new(rank);

        // Until we have arrived, an unwind would leave our siblings waiting for us forever.
        let arrival_guard = scopeguard::guard(Arc::clone(&self.barrier), |barrier| {
            barrier.cancel();
        });

        let workload = Arc::clone(self.config.workload());
        debug!(rank, workload = workload.name(), "worker attaching to workload");

        let mut context = scopeguard::guard(workload.attach(rank), |mut context| {
            trace!(rank, "releasing workload context");
            context.release();
        });

        state.transition(Lifecycle::WaitingAtBarrier);
        let arrival = self.barrier.arrive_and_wait();
        let barrier = ScopeGuard::into_inner(arrival_guard);

        match arrival {
            Ok(_) => {}
            Err(SyncError::Cancelled) => {
                state.fail(FailureReason::Cancelled);
                return state;
            }
            Err(error) => {
                // Our siblings can no longer be released normally.
                barrier.cancel();
                state.fail(FailureReason::Sync(error));
                return state;
            }
        }

        let start_ms = match self.clock.now_ms() {
            Ok(now) => now,
            Err(error) => {
                state.fail(FailureReason::Timing(error));
                return state;
            }
        };

        state.transition(Lifecycle::Running);

        let budget_ms = self.config.duration_ms();
        let load_count = self.config.load_count();
        let store_count = self.config.store_count();

        let mut current_ms = start_ms;

        loop {
            let Some(elapsed_ms) = current_ms.checked_sub(start_ms) else {
                state.fail(FailureReason::Timing(TimingError::WentBackwards {
                    previous_ms: start_ms,
                    current_ms,
                }));
                return state;
            };

            state.elapsed_ms = elapsed_ms;

            if elapsed_ms >= budget_ms {
                break;
            }

            if self.cancel.is_cancelled() {
                state.fail(FailureReason::Cancelled);
                return state;
            }

            let retries = context.call(rank, load_count, store_count);

            current_ms = match self.clock.now_ms() {
                Ok(now) => now,
                Err(error) => {
                    state.fail(FailureReason::Timing(error));
                    return state;
                }
            };

            state.iterations = state.iterations.saturating_add(1);
            state.retries = state.retries.saturating_add(retries);
        }

        state.transition(Lifecycle::Completed);

        debug!(
            rank,
            iterations = state.iterations,
            elapsed_ms = state.elapsed_ms,
            retries = state.retries,
            "worker completed"
        );

        state
    }
}

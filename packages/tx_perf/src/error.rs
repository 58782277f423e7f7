use std::io;

use thiserror::Error;

use crate::RunResult;

/// Failure to prepare a run before any worker executes the workload.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SetupError {
    /// A barrier needs at least one participant.
    #[error("cannot create a barrier for zero participants")]
    ZeroCapacity,

    /// The per-worker bookkeeping could not be allocated.
    #[error("failed to allocate state for {thread_count} workers")]
    OutOfMemory {
        /// The number of workers the run was configured for.
        thread_count: usize,
    },

    /// The operating system refused to start a worker thread.
    #[error("failed to start worker thread for rank {rank}: {source}")]
    SpawnWorker {
        /// The rank of the worker that could not be started.
        rank: usize,

        /// The underlying failure reported by the platform.
        #[source]
        source: io::Error,
    },

    /// A runner executes at most once.
    #[error("the runner has already executed its run")]
    AlreadyRun,
}

/// Failure of the barrier that synchronizes worker startup.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum SyncError {
    /// The barrier was cancelled before every participant arrived.
    #[error("barrier wait was cancelled before all participants arrived")]
    Cancelled,

    /// A thread panicked while holding the barrier lock.
    #[error("barrier lock was poisoned by a panicking thread")]
    Poisoned,

    /// More threads arrived than the barrier was sized for.
    #[error("barrier received more than {capacity} arrivals")]
    Overfilled {
        /// The number of participants the barrier was created for.
        capacity: usize,
    },

    /// The barrier was closed while threads were still parked in it.
    #[error("barrier closed while {waiting} threads were still waiting")]
    Busy {
        /// The number of threads still parked in the barrier.
        waiting: usize,
    },
}

/// Failure of a worker's time source.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum TimingError {
    /// The elapsed time does not fit into the millisecond counter.
    #[error("monotonic clock reading does not fit into a 64-bit millisecond counter")]
    Overflow,

    /// The time source reported a reading earlier than a previous one.
    #[error("monotonic clock went backwards from {previous_ms} ms to {current_ms} ms")]
    WentBackwards {
        /// The earlier reading.
        previous_ms: u64,

        /// The later, smaller reading.
        current_ms: u64,
    },

    /// The time source is not available.
    #[error("time source unavailable: {reason}")]
    Unavailable {
        /// A human-readable description of the problem.
        reason: &'static str,
    },
}

/// Failure to collect the result of a worker thread.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JoinError {
    /// The worker thread panicked instead of returning its state.
    #[error("worker thread for rank {rank} panicked: {message}")]
    Panicked {
        /// The rank of the worker that panicked.
        rank: usize,

        /// The panic message, if it could be extracted from the payload.
        message: String,
    },
}

/// Configuration that cannot describe a run.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// Every run needs a workload to measure.
    #[error("no workload was configured for the run")]
    MissingWorkload,
}

/// The category of a runner-level failure, wrapping the underlying error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunErrorKind {
    /// The run could not be set up or its workers could not be started.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// At least one worker could not be joined normally.
    #[error(transparent)]
    Join(#[from] JoinError),

    /// The barrier could not be torn down after the run.
    #[error("barrier teardown failed: {0}")]
    Teardown(#[source] SyncError),
}

/// A runner-level failure, carrying whatever per-worker results were collected
/// before the failure was detected.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct RunError {
    kind: RunErrorKind,
    partial: Option<RunResult>,
}

impl RunError {
    pub(crate) fn new(kind: impl Into<RunErrorKind>, partial: Option<RunResult>) -> Self {
        Self {
            kind: kind.into(),
            partial,
        }
    }

    pub(crate) fn teardown(error: SyncError, partial: RunResult) -> Self {
        Self {
            kind: RunErrorKind::Teardown(error),
            partial: Some(partial),
        }
    }

    /// The category of the failure.
    #[must_use]
    pub fn kind(&self) -> &RunErrorKind {
        &self.kind
    }

    /// The per-worker results collected before the failure, if the run got far enough
    /// to join its workers.
    #[must_use]
    pub fn partial_result(&self) -> Option<&RunResult> {
        self.partial.as_ref()
    }

    /// Consumes the error, returning the partial results collected before the failure.
    #[must_use]
    pub fn into_partial_result(self) -> Option<RunResult> {
        self.partial
    }
}

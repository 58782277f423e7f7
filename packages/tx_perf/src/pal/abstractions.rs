use std::fmt::Debug;
use std::io;
use std::thread::JoinHandle;

use crate::pal::TimeSourceFacade;
use crate::{TimingError, WorkerState};

/// The code a worker thread executes, producing the worker's final state.
pub(crate) type WorkerBody = Box<dyn FnOnce() -> WorkerState + Send + 'static>;

/// Operating system services the runner depends on.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Starts a dedicated thread for the worker with the given rank.
    fn spawn_worker(&self, rank: usize, body: WorkerBody) -> io::Result<JoinHandle<WorkerState>>;

    /// Creates an independent time source for one worker.
    fn new_time_source(&self) -> TimeSourceFacade;
}

/// A monotonic millisecond clock owned by a single worker.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait TimeSource: Debug + Send + 'static {
    /// Milliseconds elapsed since an arbitrary origin fixed at creation of the time source.
    fn now_ms(&mut self) -> Result<u64, TimingError>;
}

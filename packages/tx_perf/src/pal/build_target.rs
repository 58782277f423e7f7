use std::io;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::pal::{Platform, TimeSource, TimeSourceFacade, WorkerBody};
use crate::{TimingError, WorkerState};

/// The platform of the build target: native OS threads and the standard monotonic clock.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetPlatform;

// Trivial forwarders to std - not worth testing.
#[cfg_attr(test, mutants::skip)]
impl Platform for BuildTargetPlatform {
    fn spawn_worker(&self, rank: usize, body: WorkerBody) -> io::Result<JoinHandle<WorkerState>> {
        thread::Builder::new()
            .name(format!("tx_perf-worker-{rank}"))
            .spawn(body)
    }

    fn new_time_source(&self) -> TimeSourceFacade {
        TimeSourceFacade::target()
    }
}

#[derive(Debug)]
pub(crate) struct MonotonicTimeSource {
    origin: Instant,
}

impl MonotonicTimeSource {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now_ms(&mut self) -> Result<u64, TimingError> {
        u64::try_from(self.origin.elapsed().as_millis()).map_err(|_overflow| TimingError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn time_source_starts_near_zero() {
        let mut source = MonotonicTimeSource::new();

        assert!(source.now_ms().unwrap() < 100);
    }

    #[test]
    fn time_source_advances_with_wall_clock() {
        let mut source = MonotonicTimeSource::new();

        let before = source.now_ms().unwrap();
        thread::sleep(Duration::from_millis(20));
        let after = source.now_ms().unwrap();

        assert!(after >= before.saturating_add(20));
    }

    #[test]
    fn spawned_worker_thread_is_named_after_rank() {
        let platform = BuildTargetPlatform;

        let handle = platform
            .spawn_worker(
                7,
                Box::new(|| {
                    assert_eq!(thread::current().name(), Some("tx_perf-worker-7"));
                    WorkerState::new(7)
                }),
            )
            .unwrap();

        assert_eq!(handle.join().unwrap().rank(), 7);
    }
}

use std::io;
#[cfg(test)]
use std::sync::Arc;
use std::thread::JoinHandle;

#[cfg(test)]
use crate::pal::{MockPlatform, MockTimeSource};
use crate::pal::{BuildTargetPlatform, MonotonicTimeSource, Platform, TimeSource, WorkerBody};
use crate::{TimingError, WorkerState};

static BUILD_TARGET_PLATFORM: BuildTargetPlatform = BuildTargetPlatform;

/// Dispatches to the real platform or, in test builds, to a mock.
#[derive(Clone, Debug)]
pub(crate) enum PlatformFacade {
    Target(&'static BuildTargetPlatform),

    #[cfg(test)]
    Mock(Arc<MockPlatform>),
}

// Facade types are trivial pass-through layers - not worth testing.
#[cfg_attr(test, mutants::skip)]
impl PlatformFacade {
    pub(crate) const fn target() -> Self {
        Self::Target(&BUILD_TARGET_PLATFORM)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockPlatform) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

#[cfg_attr(test, mutants::skip)]
impl Platform for PlatformFacade {
    fn spawn_worker(&self, rank: usize, body: WorkerBody) -> io::Result<JoinHandle<WorkerState>> {
        match self {
            Self::Target(platform) => platform.spawn_worker(rank, body),
            #[cfg(test)]
            Self::Mock(mock) => mock.spawn_worker(rank, body),
        }
    }

    fn new_time_source(&self) -> TimeSourceFacade {
        match self {
            Self::Target(platform) => platform.new_time_source(),
            #[cfg(test)]
            Self::Mock(mock) => mock.new_time_source(),
        }
    }
}

#[cfg_attr(test, mutants::skip)]
impl Default for PlatformFacade {
    fn default() -> Self {
        Self::target()
    }
}

/// Dispatches to the real time source or, in test builds, to a mock.
#[derive(Debug)]
pub(crate) enum TimeSourceFacade {
    Target(MonotonicTimeSource),

    #[cfg(test)]
    Mock(MockTimeSource),
}

#[cfg_attr(test, mutants::skip)]
impl TimeSourceFacade {
    pub(crate) fn target() -> Self {
        Self::Target(MonotonicTimeSource::new())
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockTimeSource) -> Self {
        Self::Mock(mock)
    }
}

#[cfg_attr(test, mutants::skip)]
impl TimeSource for TimeSourceFacade {
    fn now_ms(&mut self) -> Result<u64, TimingError> {
        match self {
            Self::Target(source) => source.now_ms(),
            #[cfg(test)]
            Self::Mock(mock) => mock.now_ms(),
        }
    }
}

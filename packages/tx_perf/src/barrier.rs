use std::sync::{Condvar, Mutex, PoisonError};

use crate::{SetupError, SyncError};

/// A single-use rendezvous point for a fixed number of worker threads.
///
/// Every participant calls [`arrive_and_wait()`][Self::arrive_and_wait] and blocks until the
/// last participant has arrived, at which point all of them are released together. Unlike
/// [`std::sync::Barrier`], this barrier can be cancelled so that a failure in one participant
/// (or in the thread that is starting the participants) never strands the others.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use tx_perf::Barrier;
///
/// let barrier = Arc::new(Barrier::new(2).unwrap());
///
/// let other = thread::spawn({
///     let barrier = Arc::clone(&barrier);
///     move || barrier.arrive_and_wait().unwrap()
/// });
///
/// let this = barrier.arrive_and_wait().unwrap();
/// let other = other.join().unwrap();
///
/// // Exactly one participant observes itself as the one that released the others.
/// assert!(this.is_leader() != other.is_leader());
/// ```
#[derive(Debug)]
pub struct Barrier {
    capacity: usize,
    state: Mutex<BarrierState>,
    wakeup: Condvar,
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    // Threads currently parked on the condition variable.
    waiting: usize,
    released: bool,
    cancelled: bool,
}

impl Barrier {
    /// Creates a barrier that releases its participants once `capacity` of them have arrived.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::ZeroCapacity`] if `capacity` is zero, as such a barrier could
    /// never be arrived at.
    pub fn new(capacity: usize) -> Result<Self, SetupError> {
        if capacity == 0 {
            return Err(SetupError::ZeroCapacity);
        }

        Ok(Self {
            capacity,
            state: Mutex::new(BarrierState::default()),
            wakeup: Condvar::new(),
        })
    }

    /// The number of participants that must arrive before the barrier releases.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Arrives at the barrier and blocks until every participant has arrived.
    ///
    /// The barrier releases exactly once. The participant whose arrival completes the set is
    /// the leader and returns without blocking.
    ///
    /// # Errors
    ///
    /// * [`SyncError::Cancelled`] if the barrier was cancelled before it released, either
    ///   before this call or while this thread was waiting.
    /// * [`SyncError::Overfilled`] if all participants have already arrived.
    /// * [`SyncError::Poisoned`] if a thread panicked while holding the barrier lock.
    pub fn arrive_and_wait(&self) -> Result<BarrierWaitResult, SyncError> {
        let mut state = self.state.lock().map_err(|_poisoned| SyncError::Poisoned)?;

        if state.cancelled {
            return Err(SyncError::Cancelled);
        }

        if state.released || state.arrived >= self.capacity {
            return Err(SyncError::Overfilled {
                capacity: self.capacity,
            });
        }

        state.arrived = state.arrived.saturating_add(1);

        if state.arrived == self.capacity {
            state.released = true;
            drop(state);

            self.wakeup.notify_all();
            return Ok(BarrierWaitResult { is_leader: true });
        }

        state.waiting = state.waiting.saturating_add(1);

        let mut state = match self
            .wakeup
            .wait_while(state, |state| !state.released && !state.cancelled)
        {
            Ok(state) => state,
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                state.waiting = state.waiting.saturating_sub(1);
                return Err(SyncError::Poisoned);
            }
        };

        state.waiting = state.waiting.saturating_sub(1);

        // A release that happened before the cancellation still counts as a release.
        if state.released {
            Ok(BarrierWaitResult { is_leader: false })
        } else {
            Err(SyncError::Cancelled)
        }
    }

    /// Cancels the barrier, waking every waiting participant with [`SyncError::Cancelled`].
    ///
    /// Cancellation has no effect on participants that were already released. Any participant
    /// that arrives after cancellation fails immediately.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if !state.released && !state.cancelled {
            tracing::warn!(
                arrived = state.arrived,
                capacity = self.capacity,
                "cancelling barrier before release"
            );
        }

        state.cancelled = true;
        drop(state);

        self.wakeup.notify_all();
    }

    /// Whether the barrier has released its participants.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .released
    }

    /// Tears down the barrier after the run.
    ///
    /// After a successful close, any further arrival fails with [`SyncError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Busy`] if threads are still parked in the barrier, in which case the
    /// barrier is left open so they can still be released or cancelled.
    pub fn close(&self) -> Result<(), SyncError> {
        let mut state = self.state.lock().map_err(|_poisoned| SyncError::Poisoned)?;

        if state.waiting > 0 {
            return Err(SyncError::Busy {
                waiting: state.waiting,
            });
        }

        state.cancelled = true;
        Ok(())
    }
}

/// The outcome of a successful [`Barrier::arrive_and_wait()`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BarrierWaitResult {
    is_leader: bool,
}

impl BarrierWaitResult {
    /// Whether this participant's arrival released the barrier.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

#[cfg(test)]
#[cfg(not(miri))] // Miri is too slow for the thread-heavy tests.
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::test_utils::with_watchdog;

    assert_impl_all!(Barrier: Send, Sync);

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(Barrier::new(0), Err(SetupError::ZeroCapacity)));
    }

    #[test]
    fn single_participant_is_leader_immediately() {
        let barrier = Barrier::new(1).unwrap();

        let result = barrier.arrive_and_wait().unwrap();

        assert!(result.is_leader());
        assert!(barrier.is_released());
    }

    #[test]
    fn release_happens_after_last_arrival() {
        with_watchdog(|| {
            const PARTICIPANTS: usize = 4;

            let barrier = Arc::new(Barrier::new(PARTICIPANTS).unwrap());

            let handles = (0..PARTICIPANTS)
                .map(|index| {
                    let barrier = Arc::clone(&barrier);

                    thread::spawn(move || {
                        // Stagger arrivals so that a premature release would be visible.
                        thread::sleep(Duration::from_millis(
                            u64::try_from(index).unwrap().saturating_mul(10),
                        ));

                        let arrived_at = Instant::now();
                        let result = barrier.arrive_and_wait().unwrap();
                        let released_at = Instant::now();

                        (arrived_at, released_at, result.is_leader())
                    })
                })
                .collect::<Vec<_>>();

            let probes = handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>();

            let last_arrival = probes.iter().map(|(arrived, _, _)| *arrived).max().unwrap();

            for (_, released_at, _) in &probes {
                assert!(*released_at >= last_arrival);
            }

            assert_eq!(probes.iter().filter(|(_, _, leader)| *leader).count(), 1);
        });
    }

    #[test]
    fn cancel_wakes_waiting_participants() {
        with_watchdog(|| {
            let barrier = Arc::new(Barrier::new(3).unwrap());

            let waiter = thread::spawn({
                let barrier = Arc::clone(&barrier);
                move || barrier.arrive_and_wait()
            });

            // Wait until the waiter is parked so that we are testing the wakeup path.
            while barrier.state.lock().unwrap().waiting == 0 {
                thread::yield_now();
            }

            barrier.cancel();

            assert_eq!(waiter.join().unwrap(), Err(SyncError::Cancelled));
            assert!(!barrier.is_released());
            barrier.close().unwrap();
        });
    }

    #[test]
    fn arrival_after_cancel_fails() {
        let barrier = Barrier::new(2).unwrap();
        barrier.cancel();

        assert_eq!(barrier.arrive_and_wait(), Err(SyncError::Cancelled));
    }

    #[test]
    fn cancel_after_release_does_not_affect_released() {
        let barrier = Barrier::new(1).unwrap();
        barrier.arrive_and_wait().unwrap();

        barrier.cancel();

        assert!(barrier.is_released());
    }

    #[test]
    fn extra_arrival_is_overfilled() {
        let barrier = Barrier::new(1).unwrap();
        barrier.arrive_and_wait().unwrap();

        assert_eq!(
            barrier.arrive_and_wait(),
            Err(SyncError::Overfilled { capacity: 1 })
        );
    }

    #[test]
    fn close_with_parked_thread_is_busy() {
        with_watchdog(|| {
            let barrier = Arc::new(Barrier::new(2).unwrap());

            let waiter = thread::spawn({
                let barrier = Arc::clone(&barrier);
                move || barrier.arrive_and_wait()
            });

            while barrier.state.lock().unwrap().waiting == 0 {
                thread::yield_now();
            }

            assert_eq!(barrier.close(), Err(SyncError::Busy { waiting: 1 }));

            // The failed close must leave the barrier usable.
            barrier.arrive_and_wait().unwrap();
            assert!(waiter.join().unwrap().is_ok());

            barrier.close().unwrap();
            assert_eq!(barrier.arrive_and_wait(), Err(SyncError::Cancelled));
        });
    }
}

//! Helpers shared by the unit tests of this package.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

// Generous enough for the timed runs in the runner tests, short enough to fail a stuck
// barrier or join well before the test harness would.
const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a test body on a separate thread and fails the test if it does not finish within
/// [`WATCHDOG_TIMEOUT`].
///
/// Worker startup and teardown logic can deadlock when it regresses, so tests that exercise it
/// go through this helper instead of hanging the whole test run.
pub(crate) fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        // Mutants that hang are detected by the mutation tool's own timeout.
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        drop(tx.send(result));
    });

    match rx.recv_timeout(WATCHDOG_TIMEOUT) {
        Ok(result) => {
            test_handle.join().expect("test thread sent its result, so it did not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {WATCHDOG_TIMEOUT:?} - a worker is probably stuck");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread exited without sending a result"),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}

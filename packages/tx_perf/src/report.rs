use std::fmt;
use std::io::{self, Write};

use crate::{RunError, RunResult, WorkerState};

/// Writes per-worker results as plain text lines for offline analysis.
///
/// Every worker becomes one line `<rank> <elapsed_ms> <iterations> <retries>`, where the rank is
/// 1-based. Lines are written in the order the workers are given, which for a [`RunResult`] is
/// ascending rank order. Nothing is filtered or aggregated.
///
/// # Examples
///
/// ```
/// use tx_perf::{NoopWorkload, RunConfig, Reporter, Runner};
///
/// let config = RunConfig::builder().workload(NoopWorkload).build().unwrap();
/// let result = Runner::new(config).run().unwrap();
///
/// let mut output = Vec::new();
/// Reporter::new(&mut output).write_result(&result).unwrap();
///
/// assert_eq!(String::from_utf8(output).unwrap(), "1 0 0 0\n");
/// ```
#[derive(Debug)]
pub struct Reporter<W> {
    out: W,
}

impl<W: Write> Reporter<W> {
    /// Creates a reporter writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Writes one line per worker of the result, in rank order.
    ///
    /// # Errors
    ///
    /// Returns any error reported by the underlying writer.
    pub fn write_result(&mut self, result: &RunResult) -> io::Result<()> {
        self.write_workers(result.iter())
    }

    /// Writes one line for each of the given workers, in the order given.
    ///
    /// # Errors
    ///
    /// Returns any error reported by the underlying writer.
    pub fn write_workers<'a>(
        &mut self,
        workers: impl IntoIterator<Item = &'a WorkerState>,
    ) -> io::Result<()> {
        for worker in workers {
            writeln!(self.out, "{}", ReportLine(worker))?;
        }

        self.out.flush()
    }

    /// Writes one line for each worker of a failed run that spent its whole time budget.
    ///
    /// Workers that failed or were cancelled are skipped, as their metrics are partial. Nothing
    /// is written if the run failed before its workers could be joined.
    ///
    /// # Errors
    ///
    /// Returns any error reported by the underlying writer.
    pub fn write_completed_from(&mut self, error: &RunError) -> io::Result<()> {
        match error.partial_result() {
            Some(partial) => self.write_workers(partial.completed()),
            None => Ok(()),
        }
    }

    /// Consumes the reporter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Formats one worker in the report layout.
#[derive(Clone, Copy, Debug)]
pub struct ReportLine<'a>(pub &'a WorkerState);

impl fmt::Display for ReportLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let worker = self.0;

        write!(
            f,
            "{} {} {} {}",
            worker.rank().saturating_add(1),
            worker.elapsed_ms(),
            worker.iterations(),
            worker.retries()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailureReason, JoinError, Lifecycle, SetupError};

    fn worker(rank: usize, elapsed_ms: u64, iterations: u64, retries: u64) -> WorkerState {
        let mut state = WorkerState::new(rank);
        state.set_metrics_for_test(elapsed_ms, iterations, retries, Lifecycle::Completed);
        state
    }

    #[test]
    fn line_uses_one_based_rank() {
        let state = worker(0, 100, 12_345, 7);

        assert_eq!(ReportLine(&state).to_string(), "1 100 12345 7");
    }

    #[test]
    fn result_is_written_in_rank_order() {
        let result = RunResult::new(vec![
            worker(0, 101, 10, 0),
            worker(1, 100, 20, 1),
            worker(2, 102, 30, 2),
        ]);

        let mut reporter = Reporter::new(Vec::new());
        reporter.write_result(&result).unwrap();

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(output, "1 101 10 0\n2 100 20 1\n3 102 30 2\n");
    }

    #[test]
    fn failed_workers_are_not_filtered() {
        let mut failed = WorkerState::new(1);
        failed.set_metrics_for_test(
            3,
            4,
            0,
            Lifecycle::Failed(FailureReason::Cancelled),
        );

        let result = RunResult::new(vec![worker(0, 10, 1, 0), failed]);

        let mut output = Vec::new();
        Reporter::new(&mut output).write_result(&result).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), "1 10 1 0\n2 3 4 0\n");
    }

    #[test]
    fn failed_run_reports_only_completed_workers() {
        let mut cancelled = WorkerState::new(2);
        cancelled.set_metrics_for_test(7, 70, 1, Lifecycle::Failed(FailureReason::Cancelled));

        let partial = RunResult::new(vec![
            WorkerState::panicked(0),
            worker(1, 100, 50, 3),
            cancelled,
        ]);
        let error = RunError::new(
            JoinError::Panicked {
                rank: 0,
                message: "workload crashed".to_string(),
            },
            Some(partial),
        );

        let mut output = Vec::new();
        Reporter::new(&mut output)
            .write_completed_from(&error)
            .unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), "2 100 50 3\n");
    }

    #[test]
    fn failed_run_without_partial_result_writes_nothing() {
        let error = RunError::new(SetupError::AlreadyRun, None);

        let mut output = Vec::new();
        Reporter::new(&mut output)
            .write_completed_from(&error)
            .unwrap();

        assert!(output.is_empty());
    }

    #[test]
    fn empty_result_writes_nothing() {
        let mut output = Vec::new();
        Reporter::new(&mut output)
            .write_result(&RunResult::default())
            .unwrap();

        assert!(output.is_empty());
    }
}

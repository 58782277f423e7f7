//! Runs a short benchmark of the no-op workload and prints the per-worker report.
//!
//! The numbers measure the overhead of the harness itself: with a workload that does nothing,
//! the iteration count of each worker is bounded only by how fast it can read its clock.

use std::io;
use std::num::NonZero;

use tx_perf::{NoopWorkload, RunConfig, Reporter, Runner};

fn main() {
    let config = RunConfig::builder()
        .thread_count(NonZero::new(4).expect("4 is not zero"))
        .duration_ms(100)
        .workload(NoopWorkload)
        .build()
        .expect("a workload is configured");

    let result = Runner::new(config)
        .run()
        .expect("a no-op run has nothing that could fail");

    println!("rank elapsed_ms iterations retries");

    Reporter::new(io::stdout().lock())
        .write_result(&result)
        .expect("writing to stdout must succeed");
}

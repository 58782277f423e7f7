//! Concurrent micro-benchmark harness for measuring workload throughput and contention.
//!
//! A run spawns a fixed number of worker threads. Each worker attaches to the workload on its
//! own thread, then waits at a shared start barrier so that no worker begins measuring before
//! every worker is ready. Once released, each worker repeatedly calls the workload until its
//! time budget is spent, counting completed calls and the retries the workload reports. The
//! harness then joins the workers in rank order, tears down the barrier and hands back one
//! [`WorkerState`] per worker.
//!
//! The main types are:
//! - [`RunConfig`] - The immutable parameters of a run, created through a builder.
//! - [`Runner`] - Executes a run once and tracks its [`RunPhase`].
//! - [`RunResult`] - The per-worker outcomes of a run, in rank order.
//! - [`Reporter`] - Writes a result as `<rank> <elapsed_ms> <iterations> <retries>` lines.
//! - [`Workload`] - The unit of work being measured, with [`WorkloadThread`] as its per-thread
//!   context.
//!
//! Two transactional memory workloads are included, [`RandomReadWrite`] and
//! [`SequentialReadWrite`], both operating on a [`TxMemory`]. They can be selected by
//! [`IoPattern`].
//!
//! # Failure handling
//!
//! A worker that cannot synchronize, cannot read its clock or is cancelled ends up in
//! [`Lifecycle::Failed`] without bringing down its siblings. If spawning or joining a worker
//! fails, the runner cancels every worker that is still running, joins all of them and returns a
//! [`RunError`] that carries whatever partial result could be collected. No worker is left
//! blocked at the barrier on any path.
//!
//! # Example
//!
//! ```
//! use std::num::NonZero;
//!
//! use tx_perf::{IoPattern, RunConfig, Reporter, Runner};
//!
//! let config = RunConfig::builder()
//!     .thread_count(NonZero::new(2).unwrap())
//!     .duration_ms(10)
//!     .load_count(4)
//!     .store_count(1)
//!     .shared_workload(IoPattern::Random.workload())
//!     .build()
//!     .unwrap();
//!
//! let result = Runner::new(config).run().unwrap();
//! assert!(result.is_clean());
//!
//! let mut output = Vec::new();
//! Reporter::new(&mut output).write_result(&result).unwrap();
//! assert_eq!(String::from_utf8(output).unwrap().lines().count(), 2);
//! ```

mod barrier;
mod config;
mod error;
mod pal;
mod report;
mod runner;
mod tx_memory;
mod worker;
mod workload;
mod workloads;

#[cfg(test)]
mod test_utils;

pub use barrier::*;
pub use config::*;
pub use error::*;
pub use report::*;
pub use runner::*;
pub use tx_memory::*;
pub use worker::*;
pub use workload::*;
pub use workloads::*;

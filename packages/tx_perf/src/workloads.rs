//! Built-in transactional memory workloads.
//!
//! Both workloads run one transaction per call against a shared [`TxMemory`]. A transaction
//! first loads `load_count` slots and then stores the worker's rank into `store_count` slots.
//! They differ only in which slots they touch.

use std::fmt;
use std::hint::black_box;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::trace;

use crate::{Conflict, Transaction, TxMemory, Workload, WorkloadThread};

/// Touches pseudo-random slots.
///
/// The generator is seeded from the rank at the start of every transaction attempt, so a worker
/// touches the same slots on every call and different workers touch different slots.
#[derive(Debug, Default)]
pub struct RandomReadWrite {
    memory: Arc<TxMemory>,
}

impl RandomReadWrite {
    /// Creates the workload over a fresh memory buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_memory(Arc::new(TxMemory::new()))
    }

    /// Creates the workload over an existing memory buffer.
    #[must_use]
    pub fn with_memory(memory: Arc<TxMemory>) -> Self {
        Self { memory }
    }
}

impl Workload for RandomReadWrite {
    fn name(&self) -> &str {
        "random"
    }

    fn attach(&self, rank: usize) -> Box<dyn WorkloadThread> {
        Box::new(RandomReadWriteThread {
            thread: TxThread::new(Arc::clone(&self.memory), rank),
        })
    }
}

#[derive(Debug)]
struct RandomReadWriteThread {
    thread: TxThread,
}

impl WorkloadThread for RandomReadWriteThread {
    fn call(&mut self, rank: usize, load_count: u64, store_count: u64) -> u64 {
        let seed = rank_word(rank);
        let value = rank_word(rank);

        self.thread.run(|memory, tx| {
            let mut rng = SmallRng::seed_from_u64(seed);

            for _ in 0..load_count {
                black_box(tx.load(rng.random_range(0..memory.len()))?);
            }

            for _ in 0..store_count {
                tx.store(rng.random_range(0..memory.len()), value);
            }

            Ok(())
        })
    }

    fn release(&mut self) {
        self.thread.release();
    }
}

/// Touches consecutive slots, wrapping at the end of the buffer.
///
/// Each worker starts at a slot chosen pseudo-randomly from its rank. A transaction loads
/// `load_count` consecutive slots from there and stores into the `store_count` slots that
/// follow them.
#[derive(Debug, Default)]
pub struct SequentialReadWrite {
    memory: Arc<TxMemory>,
}

impl SequentialReadWrite {
    /// Creates the workload over a fresh memory buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_memory(Arc::new(TxMemory::new()))
    }

    /// Creates the workload over an existing memory buffer.
    #[must_use]
    pub fn with_memory(memory: Arc<TxMemory>) -> Self {
        Self { memory }
    }
}

impl Workload for SequentialReadWrite {
    fn name(&self) -> &str {
        "sequential"
    }

    fn attach(&self, rank: usize) -> Box<dyn WorkloadThread> {
        let start = SmallRng::seed_from_u64(rank_word(rank)).random_range(0..self.memory.len());

        Box::new(SequentialReadWriteThread {
            thread: TxThread::new(Arc::clone(&self.memory), rank),
            start,
        })
    }
}

#[derive(Debug)]
struct SequentialReadWriteThread {
    thread: TxThread,
    start: usize,
}

impl WorkloadThread for SequentialReadWriteThread {
    fn call(&mut self, rank: usize, load_count: u64, store_count: u64) -> u64 {
        let start = self.start;
        let value = rank_word(rank);

        self.thread.run(|_, tx| {
            let mut index = start;
            for _ in 0..load_count {
                black_box(tx.load(index)?);
                index = index.wrapping_add(1);
            }

            // Stores continue after the last loaded slot.
            for _ in 0..store_count {
                tx.store(index, value);
                index = index.wrapping_add(1);
            }

            Ok(())
        })
    }

    fn release(&mut self) {
        self.thread.release();
    }
}

/// Per-thread transaction state shared by the built-in workloads.
#[derive(Debug)]
struct TxThread {
    memory: Arc<TxMemory>,
    rank: usize,
    commits: u64,
    restarts: u64,
}

impl TxThread {
    fn new(memory: Arc<TxMemory>, rank: usize) -> Self {
        Self {
            memory,
            rank,
            commits: 0,
            restarts: 0,
        }
    }

    fn run(
        &mut self,
        body: impl Fn(&TxMemory, &mut Transaction<'_>) -> Result<(), Conflict>,
    ) -> u64 {
        let memory = &*self.memory;
        let ((), retries) = memory.atomically(|tx| body(memory, tx));

        self.commits = self.commits.saturating_add(1);
        self.restarts = self.restarts.saturating_add(retries);

        retries
    }

    fn release(&mut self) {
        trace!(
            rank = self.rank,
            commits = self.commits,
            restarts = self.restarts,
            "transaction thread released"
        );
    }
}

// Ranks become both seeds and stored values.
fn rank_word(rank: usize) -> u64 {
    u64::try_from(rank).unwrap_or(u64::MAX)
}

/// Selects one of the built-in workloads by its access pattern.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum IoPattern {
    /// [`RandomReadWrite`].
    #[default]
    Random,

    /// [`SequentialReadWrite`].
    Sequential,
}

impl IoPattern {
    /// Creates the selected workload over a fresh memory buffer.
    #[must_use]
    pub fn workload(self) -> Arc<dyn Workload> {
        match self {
            Self::Random => Arc::new(RandomReadWrite::new()),
            Self::Sequential => Arc::new(SequentialReadWrite::new()),
        }
    }
}

impl fmt::Display for IoPattern {
    #[cfg_attr(test, mutants::skip)] // Only used for diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => f.write_str("random"),
            Self::Sequential => f.write_str("sequential"),
        }
    }
}

/// The name given for an [`IoPattern`] is not recognized.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("unknown I/O pattern '{0}', expected 'random' or 'sequential'")]
pub struct UnknownIoPattern(pub String);

impl FromStr for IoPattern {
    type Err = UnknownIoPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" | "r" => Ok(Self::Random),
            "sequential" | "s" => Ok(Self::Sequential),
            _ => Err(UnknownIoPattern(s.to_owned())),
        }
    }
}

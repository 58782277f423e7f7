//! A small word-based software transactional memory used by the built-in workloads.
//!
//! Every slot carries a version word that doubles as a lock: an even version means the slot is
//! unlocked, an odd one means a committing transaction owns it. Transactions record the version
//! of every slot they read and buffer their writes. On commit, the write set is locked in slot
//! order, the read set is validated against the current versions and the buffered values are
//! published with a bumped version. Any inconsistency aborts the attempt with [`Conflict`] and
//! [`TxMemory::atomically()`] starts over.

use std::hint;
use std::num::NonZero;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// The number of slots in the memory buffer the built-in workloads operate on.
pub const MEMORY_SLOTS: NonZero<usize> = NonZero::new(1024).expect("1024 is not zero");

const LOCK_BIT: u64 = 1;
const VERSION_STEP: u64 = 2;

// Retries beyond this no longer increase the spin before the next attempt.
const MAX_BACKOFF_SHIFT: u64 = 8;

/// A transaction attempt observed a concurrent commit and must be retried.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("transaction conflicted with a concurrent commit")]
pub struct Conflict;

/// A fixed-size buffer of 64-bit slots that is accessed through transactions.
///
/// Slot indexes wrap around, so any `usize` is a valid index.
///
/// # Examples
///
/// ```
/// use tx_perf::TxMemory;
///
/// let memory = TxMemory::new();
///
/// let ((), retries) = memory.atomically(|tx| {
///     let value = tx.load(3)?;
///     tx.store(3, value + 1);
///     Ok(())
/// });
///
/// assert_eq!(retries, 0);
/// assert_eq!(memory.read_committed(3), 1);
/// ```
#[derive(Debug)]
pub struct TxMemory {
    slots: Box<[Slot]>,
}

#[derive(Debug, Default)]
struct Slot {
    version: AtomicU64,
    value: AtomicU64,
}

impl TxMemory {
    /// Creates a zeroed memory of [`MEMORY_SLOTS`] slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_slots(MEMORY_SLOTS)
    }

    /// Creates a zeroed memory with the given number of slots.
    #[must_use]
    pub fn with_slots(slot_count: NonZero<usize>) -> Self {
        Self {
            slots: (0..slot_count.get()).map(|_| Slot::default()).collect(),
        }
    }

    /// The number of slots.
    #[must_use]
    #[expect(clippy::len_without_is_empty, reason = "memory is never empty")]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Executes `body` as a transaction, retrying until it commits.
    ///
    /// Returns the value produced by the committed attempt and the number of attempts that were
    /// aborted because of conflicts. `body` must propagate the [`Conflict`] errors it receives
    /// from [`Transaction::load()`] and may be executed any number of times.
    pub fn atomically<T>(
        &self,
        mut body: impl FnMut(&mut Transaction<'_>) -> Result<T, Conflict>,
    ) -> (T, u64) {
        let mut retries: u64 = 0;

        loop {
            let mut tx = Transaction::new(self);

            match body(&mut tx).and_then(|value| tx.commit().map(|()| value)) {
                Ok(value) => return (value, retries),
                Err(Conflict) => {
                    retries = retries.saturating_add(1);
                    backoff(retries);
                }
            }
        }
    }

    /// Reads the committed value of a slot.
    #[must_use]
    pub fn read_committed(&self, index: usize) -> u64 {
        self.atomically(|tx| tx.load(index)).0
    }

    fn slot(&self, index: usize) -> (usize, &Slot) {
        let index = index.checked_rem(self.slots.len()).unwrap_or_default();

        let slot = self
            .slots
            .get(index)
            .expect("index was wrapped to the slot count, which is never zero");

        (index, slot)
    }
}

impl Default for TxMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn backoff(retries: u64) {
    let spins = 1_u64 << retries.min(MAX_BACKOFF_SHIFT);

    for _ in 0..spins {
        hint::spin_loop();
    }
}

/// One attempt of a transaction on a [`TxMemory`].
#[derive(Debug)]
pub struct Transaction<'m> {
    memory: &'m TxMemory,

    // (slot index, version observed at first read)
    reads: Vec<(usize, u64)>,

    // (slot index, buffered value); at most one entry per slot.
    writes: Vec<(usize, u64)>,
}

impl<'m> Transaction<'m> {
    fn new(memory: &'m TxMemory) -> Self {
        Self {
            memory,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Reads a slot, observing this transaction's own buffered writes.
    ///
    /// # Errors
    ///
    /// Returns [`Conflict`] if the slot is being committed by another transaction or changed
    /// since this transaction first read it.
    pub fn load(&mut self, index: usize) -> Result<u64, Conflict> {
        let (index, slot) = self.memory.slot(index);

        if let Some(&(_, value)) = self.writes.iter().find(|(written, _)| *written == index) {
            return Ok(value);
        }

        let before = slot.version.load(Ordering::Acquire);
        if before & LOCK_BIT != 0 {
            return Err(Conflict);
        }

        let value = slot.value.load(Ordering::Acquire);

        if slot.version.load(Ordering::Acquire) != before {
            return Err(Conflict);
        }

        match self.reads.iter().find(|(read, _)| *read == index) {
            Some(&(_, seen)) if seen != before => return Err(Conflict),
            Some(_) => {}
            None => self.reads.push((index, before)),
        }

        Ok(value)
    }

    /// Buffers a write to a slot, to be published when the transaction commits.
    pub fn store(&mut self, index: usize, value: u64) {
        let (index, _) = self.memory.slot(index);

        match self.writes.iter_mut().find(|(written, _)| *written == index) {
            Some(entry) => entry.1 = value,
            None => self.writes.push((index, value)),
        }
    }

    fn commit(mut self) -> Result<(), Conflict> {
        if self.writes.is_empty() {
            // Every read was consistent when it was made and a read-only transaction publishes
            // nothing, so the snapshot only needs to be re-validated.
            return self.validate_reads(&[]);
        }

        self.writes.sort_unstable_by_key(|(index, _)| *index);

        // (slot index, version before locking)
        let mut locked = Vec::with_capacity(self.writes.len());

        for &(index, _) in &self.writes {
            let (_, slot) = self.memory.slot(index);
            let current = slot.version.load(Ordering::Relaxed);

            if current & LOCK_BIT != 0
                || slot
                    .version
                    .compare_exchange(
                        current,
                        current | LOCK_BIT,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_err()
            {
                self.unlock(&locked);
                return Err(Conflict);
            }

            locked.push((index, current));
        }

        if let Err(conflict) = self.validate_reads(&locked) {
            self.unlock(&locked);
            return Err(conflict);
        }

        for (&(index, value), &(_, version)) in self.writes.iter().zip(&locked) {
            let (_, slot) = self.memory.slot(index);

            slot.value.store(value, Ordering::Release);
            slot.version
                .store(version.wrapping_add(VERSION_STEP), Ordering::Release);
        }

        Ok(())
    }

    fn validate_reads(&self, locked: &[(usize, u64)]) -> Result<(), Conflict> {
        for &(index, seen) in &self.reads {
            let (_, slot) = self.memory.slot(index);
            let current = slot.version.load(Ordering::Acquire);

            let unchanged = current == seen
                || locked
                    .iter()
                    .any(|&(owned, version)| owned == index && version == seen);

            if !unchanged {
                return Err(Conflict);
            }
        }

        Ok(())
    }

    fn unlock(&self, locked: &[(usize, u64)]) {
        for &(index, version) in locked {
            let (_, slot) = self.memory.slot(index);
            slot.version.store(version, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(TxMemory: Send, Sync);

    #[test]
    fn fresh_memory_is_zeroed() {
        let memory = TxMemory::new();

        assert_eq!(memory.len(), 1024);
        assert_eq!(memory.read_committed(0), 0);
        assert_eq!(memory.read_committed(1023), 0);
    }

    #[test]
    fn indexes_wrap_around() {
        let memory = TxMemory::with_slots(NonZero::new(4).unwrap());

        memory.atomically(|tx| {
            tx.store(5, 42);
            Ok(())
        });

        assert_eq!(memory.read_committed(1), 42);
    }

    #[test]
    fn transaction_reads_its_own_writes() {
        let memory = TxMemory::new();

        let (value, retries) = memory.atomically(|tx| {
            tx.store(7, 11);
            tx.store(7, 12);
            tx.load(7)
        });

        assert_eq!(value, 12);
        assert_eq!(retries, 0);
        assert_eq!(memory.read_committed(7), 12);
    }

    #[test]
    fn stale_read_set_fails_commit() {
        let memory = TxMemory::new();

        let mut first = Transaction::new(&memory);
        assert_eq!(first.load(0).unwrap(), 0);
        first.store(1, 1);

        let mut second = Transaction::new(&memory);
        second.store(0, 99);
        second.commit().unwrap();

        assert_eq!(first.commit(), Err(Conflict));

        // The failed commit must not have published anything or left slots locked.
        assert_eq!(memory.read_committed(1), 0);
        assert_eq!(memory.read_committed(0), 99);
    }

    #[test]
    fn locked_slot_fails_load() {
        let memory = TxMemory::new();
        let (_, slot) = memory.slot(2);
        slot.version.store(LOCK_BIT, Ordering::Release);

        let mut tx = Transaction::new(&memory);

        assert_eq!(tx.load(2), Err(Conflict));
    }

    #[test]
    fn changed_slot_fails_repeated_load() {
        let memory = TxMemory::new();

        let mut reader = Transaction::new(&memory);
        reader.load(3).unwrap();

        let mut writer = Transaction::new(&memory);
        writer.store(3, 5);
        writer.commit().unwrap();

        assert_eq!(reader.load(3), Err(Conflict));
    }

    #[test]
    #[cfg_attr(miri, ignore = "too slow under Miri")]
    fn concurrent_increments_are_serializable() {
        const THREADS: u64 = 4;
        const INCREMENTS: u64 = 2_000;

        let memory = Arc::new(TxMemory::new());

        let handles = (0..THREADS)
            .map(|_| {
                let memory = Arc::clone(&memory);

                thread::spawn(move || {
                    for _ in 0..INCREMENTS {
                        memory.atomically(|tx| {
                            let value = tx.load(0)?;
                            tx.store(0, value + 1);
                            Ok(())
                        });
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(memory.read_committed(0), THREADS * INCREMENTS);
    }
}

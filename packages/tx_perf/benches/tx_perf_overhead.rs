//! Measures the fixed costs of the harness: barrier rendezvous and a minimal run.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::num::NonZero;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use criterion::{Criterion, criterion_group, criterion_main};
use tx_perf::{Barrier, IoPattern, NoopWorkload, RunConfig, Runner, TxMemory};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const RENDEZVOUS_THREADS: usize = 4;
const PARK_DELAY: Duration = Duration::from_millis(1);

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("tx_perf_overhead");

    group.bench_function("barrier_rendezvous", |b| {
        b.iter_custom(measure_rendezvous);
    });

    group.bench_function("run_noop_zero_duration", |b| {
        b.iter(|| {
            let config = RunConfig::builder()
                .thread_count(NonZero::new(RENDEZVOUS_THREADS).unwrap())
                .workload(NoopWorkload)
                .build()
                .unwrap();

            black_box(Runner::new(config).run().unwrap())
        });
    });

    group.bench_function("transaction_random_8_loads_2_stores", |b| {
        let workload = IoPattern::Random.workload();
        let mut thread = workload.attach(1);

        b.iter(|| black_box(thread.call(1, 8, 2)));

        thread.release();
    });

    group.bench_function("transaction_increment", |b| {
        let memory = TxMemory::new();

        b.iter(|| {
            black_box(memory.atomically(|tx| {
                let value = tx.load(0)?;
                tx.store(0, value.wrapping_add(1));
                Ok(())
            }))
        });
    });

    group.finish();
}

/// Times `iterations` rendezvous of a fresh barrier each, as seen by the last arriving thread.
fn measure_rendezvous(iterations: u64) -> Duration {
    let mut total = Duration::ZERO;

    for _ in 0..iterations {
        let barrier = Arc::new(Barrier::new(RENDEZVOUS_THREADS).unwrap());

        let others = (1..RENDEZVOUS_THREADS)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || barrier.arrive_and_wait().unwrap())
            })
            .collect::<Vec<_>>();

        // Let the other threads park so that we measure the release, not thread startup.
        thread::sleep(PARK_DELAY);

        let start = Instant::now();
        black_box(barrier.arrive_and_wait().unwrap());
        total += start.elapsed();

        for handle in others {
            handle.join().unwrap();
        }
    }

    total
}

//! Criterion micro-benchmarks for dispenser acquire/release.

use std::hint::black_box;
use std::sync::{Arc, Barrier};
use std::thread;

use criterion::{criterion_group, criterion_main, Criterion};
use lifeline_engine::{CancelFlag, Dispenser};
use lifeline_test_utils::vitals_at;

/// Single thread, no waiters: the lock round trip plus bookkeeping.
fn bench_uncontended(c: &mut Criterion) {
    let dispenser = Dispenser::new();
    let vitals = vitals_at(1, 20);
    let cancel = CancelFlag::new();

    c.bench_function("acquire_release_uncontended", |b| {
        b.iter(|| {
            let hold = dispenser.acquire(&vitals, None, &cancel).unwrap();
            black_box(hold.release()).unwrap();
        });
    });
}

/// `threads` astronauts at mixed priorities each doing `rounds` cycles.
fn contended_run(threads: u32, rounds: usize) {
    let dispenser = Arc::new(Dispenser::new());
    let barrier = Arc::new(Barrier::new(threads as usize));
    let handles: Vec<_> = (1..=threads)
        .map(|id| {
            let d = Arc::clone(&dispenser);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let vitals = vitals_at(id, (id * 13 % 100) as u8 + 1);
                let cancel = CancelFlag::new();
                barrier.wait();
                for _ in 0..rounds {
                    let hold = d.acquire(&vitals, None, &cancel).unwrap();
                    hold.release().unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    black_box(dispenser.metrics());
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire_release_contended");
    group.sample_size(20);
    for threads in [2u32, 4, 8] {
        group.bench_function(format!("{threads}_threads_x100"), |b| {
            b.iter(|| contended_run(threads, 100));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended);
criterion_main!(benches);

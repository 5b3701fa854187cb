use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lithium_runtime::ThreadPool;
use std::hint::black_box;

fn checksum(len: usize) -> u64 {
    (0..len as u64).fold(0u64, |acc, x| acc.wrapping_mul(31).wrapping_add(x))
}

fn bench_enqueue_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_pool");

    for threads in [1usize, 4] {
        let pool = ThreadPool::new(threads).expect("pool");
        group.bench_with_input(BenchmarkId::new("enqueue_join_64", threads), &threads, |b, _| {
            b.iter(|| {
                let handles: Vec<_> = (0..64)
                    .map(|_| pool.enqueue(|| checksum(black_box(512))).expect("enqueue"))
                    .collect();
                for handle in handles {
                    black_box(handle.join().expect("join"));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_enqueue_join);
criterion_main!(benches);

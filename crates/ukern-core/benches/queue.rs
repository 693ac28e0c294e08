//! Queue throughput benchmarks
//!
//! Single-threaded enqueue/dequeue cycles for both access protocols; the
//! multi-threaded picture comes from `cmd/benchmark`.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use ukern_core::{Heap, Queue, SystemHeap};

fn bench_queue(c: &mut Criterion) {
    let heap: Arc<dyn Heap> = Arc::new(SystemHeap::new());
    let q = Queue::new(heap, 1024).unwrap();

    c.bench_function("mpmc_enqueue_dequeue", |b| {
        b.iter(|| {
            assert!(q.enqueue(black_box(1)));
            black_box(q.dequeue());
        })
    });

    c.bench_function("spsc_enqueue_dequeue", |b| {
        b.iter(|| {
            assert!(q.enqueue_single(black_box(1)));
            black_box(q.dequeue_single());
        })
    });

    c.bench_function("peek", |b| {
        assert!(q.enqueue(7));
        b.iter(|| black_box(q.peek()));
        q.dequeue();
    });
}

criterion_group!(benches, bench_queue);
criterion_main!(benches);

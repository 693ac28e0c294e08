//! Queue throughput benchmark
//!
//! Measures items/sec through the queue for the SPSC fast path and for
//! the MPMC protocol at several thread counts. Criterion micro-benchmarks
//! for the uncontended paths live in `crates/ukern-core/benches`.
//!
//! # Environment Variables
//!
//! - `UKN_BENCH_ITEMS` - items per producer (default 1_000_000)
//! - `UKN_BENCH_CAPACITY` - queue capacity (default 1024)

use std::sync::Arc;
use std::thread;
use std::time::Instant;
use ukern::{env_get, Heap, Queue, SystemHeap};

fn spsc_bench(heap: &Arc<dyn Heap>, capacity: usize, items: u64) {
    let q = Arc::new(Queue::new(Arc::clone(heap), capacity).expect("queue allocation"));
    let start = Instant::now();

    let producer = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            for i in 0..items {
                while !q.enqueue_single(i) {
                    std::hint::spin_loop();
                }
            }
        })
    };

    let mut received = 0u64;
    while received < items {
        if q.dequeue_single().is_some() {
            received += 1;
        } else {
            std::hint::spin_loop();
        }
    }
    producer.join().unwrap();

    let elapsed = start.elapsed();
    println!(
        "SPSC 1p/1c:          {:>12.0} items/sec  ({:?})",
        items as f64 / elapsed.as_secs_f64(),
        elapsed
    );
}

fn mpmc_bench(heap: &Arc<dyn Heap>, capacity: usize, items: u64, pairs: usize) {
    let q = Arc::new(Queue::new(Arc::clone(heap), capacity).expect("queue allocation"));
    let total = items * pairs as u64;
    let start = Instant::now();

    let producers: Vec<_> = (0..pairs)
        .map(|_| {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..items {
                    while !q.enqueue(i) {
                        std::hint::spin_loop();
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..pairs)
        .map(|_| {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut received = 0u64;
                while received < items {
                    if q.dequeue().is_some() {
                        received += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            })
        })
        .collect();

    for h in producers {
        h.join().unwrap();
    }
    for h in consumers {
        h.join().unwrap();
    }

    let elapsed = start.elapsed();
    println!(
        "MPMC {}p/{}c:          {:>12.0} items/sec  ({:?})",
        pairs,
        pairs,
        total as f64 / elapsed.as_secs_f64(),
        elapsed
    );
}

fn main() {
    println!("=== ukern Queue Benchmark ===\n");

    let items: u64 = env_get("UKN_BENCH_ITEMS", 1_000_000);
    let capacity: usize = env_get("UKN_BENCH_CAPACITY", 1024);
    let heap: Arc<dyn Heap> = Arc::new(SystemHeap::new());

    println!("items per producer: {}, capacity: {}\n", items, capacity);

    spsc_bench(&heap, capacity, items);
    for pairs in [1, 2, 4] {
        mpmc_bench(&heap, capacity, items, pairs);
    }

    println!("\n=== Benchmark Complete ===");
}

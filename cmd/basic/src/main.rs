//! Basic queue example
//!
//! Demonstrates the MPMC surface single-threaded, then an SPSC handoff
//! between two threads.
//!
//! # Environment Variables
//!
//! - `UKN_LOG_LEVEL=debug` - set log level (off, error, warn, info, debug, trace)
//! - `UKN_LOG_FLUSH=1` - flush debug output immediately

use std::sync::Arc;
use std::thread;
use ukern::{env_get, kdebug, kinfo, Heap, Queue, SystemHeap};

fn main() {
    println!("=== ukern Queue Basic Example ===\n");

    let capacity: usize = env_get("UKN_QUEUE_CAPACITY", 8);
    let heap: Arc<dyn Heap> = Arc::new(SystemHeap::new());
    let q = Queue::new(Arc::clone(&heap), capacity).expect("queue allocation");

    kinfo!("created queue, capacity {}", q.capacity());

    // Fill to the brim
    let mut v = 0u64;
    while q.enqueue(v) {
        kdebug!("enqueued {}", v);
        v += 1;
    }
    println!(
        "full after {} enqueues: is_full={}, len={}",
        v,
        q.is_full(),
        q.len()
    );
    println!("peek: {:?}", q.peek());

    // Drain in order
    while let Some(x) = q.dequeue() {
        kdebug!("dequeued {}", x);
    }
    println!("drained: is_empty={}, len={}\n", q.is_empty(), q.len());

    // SPSC handoff: one producer thread, one consumer thread
    let q = Arc::new(Queue::new(heap, 64).expect("queue allocation"));
    const ITEMS: u64 = 1_000_000;

    let producer = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            for i in 0..ITEMS {
                while !q.enqueue_single(i) {
                    std::hint::spin_loop();
                }
            }
        })
    };

    let consumer = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let mut sum = 0u64;
            let mut received = 0u64;
            while received < ITEMS {
                if let Some(v) = q.dequeue_single() {
                    sum += v;
                    received += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
            sum
        })
    };

    producer.join().unwrap();
    let sum = consumer.join().unwrap();
    println!("SPSC handoff: {} items, sum {}", ITEMS, sum);
    assert_eq!(sum, ITEMS * (ITEMS - 1) / 2);

    println!("\n=== Done ===");
}

//! Lock-free bounded queue for work handoff
//!
//! Fixed-capacity ring of machine-word slots with monotonic head/tail
//! counters, used to hand values between threads (including interrupt-like
//! contexts). Two access protocols share the same object:
//!
//! - `enqueue`/`dequeue`: many-producer/many-consumer, CAS claim loops
//! - `enqueue_single`/`dequeue_single`: one producer and one consumer for
//!   the queue's lifetime of use, no CAS
//!
//! No operation blocks, parks, or yields. A full enqueue returns `false`
//! and an empty dequeue returns `None` immediately; retry policy belongs
//! to the caller. Backing storage comes from a [`Heap`] handle in a single
//! allocation and goes back to the same heap on drop.

use core::fmt;
use core::mem;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{KernError, KernResult, MemoryError};
use crate::heap::Heap;

/// One ring slot: a sequence tag plus the payload word
///
/// For global position `p` (slot index `p & mask`), the tag encodes the
/// slot's phase:
///
/// - `p`            - empty, writable for position `p`
/// - `p + 1`        - published, readable for position `p`
/// - `p + capacity` - drained, i.e. empty for position `p + capacity`
///
/// The payload is atomic as well, so a peek racing a writer reads a stale
/// word rather than tearing.
#[repr(C)]
struct Slot {
    seq: AtomicU64,
    value: AtomicU64,
}

/// Monotonic position counter, alone on its cache line so producers and
/// consumers do not false-share
#[repr(align(64))]
struct Counter(AtomicU64);

/// Lock-free bounded MPMC/SPSC queue of `u64` words
///
/// Capacity is rounded up to a power of two at construction and fixed for
/// the queue's lifetime. Head and tail only ever increase; the ring index
/// is their value masked by `capacity - 1`, which keeps the empty and full
/// conditions unambiguous when the counters collide modulo capacity.
pub struct Queue {
    heap: Arc<dyn Heap>,
    slots: NonNull<Slot>,
    capacity: usize,
    mask: u64,

    /// Next position a consumer claims
    head: Counter,

    /// Next position a producer claims
    tail: Counter,
}

// Safety: all shared state is atomic; slot payload transfer is ordered by
// the sequence tags and counters
unsafe impl Send for Queue {}
unsafe impl Sync for Queue {}

impl Queue {
    /// Create a queue with storage for `capacity` words from `heap`
    ///
    /// `capacity` is rounded up to the next power of two. Performs exactly
    /// one heap allocation; on failure no partial queue escapes.
    pub fn new(heap: Arc<dyn Heap>, capacity: usize) -> KernResult<Queue> {
        if capacity == 0 {
            return Err(KernError::InvalidCapacity(capacity));
        }
        let capacity = capacity
            .checked_next_power_of_two()
            .ok_or(KernError::InvalidCapacity(capacity))?;
        let size = capacity
            .checked_mul(mem::size_of::<Slot>())
            .ok_or(MemoryError::SizeOverflow)?;

        let slots = heap
            .allocate(size)
            .ok_or(MemoryError::AllocationFailed)?
            .cast::<Slot>();

        for i in 0..capacity {
            // Safety: freshly allocated block of `capacity` slots
            unsafe {
                slots.as_ptr().add(i).write(Slot {
                    seq: AtomicU64::new(i as u64),
                    value: AtomicU64::new(0),
                });
            }
        }

        Ok(Queue {
            heap,
            slots,
            capacity,
            mask: (capacity - 1) as u64,
            head: Counter(AtomicU64::new(0)),
            tail: Counter(AtomicU64::new(0)),
        })
    }

    #[inline]
    fn slot(&self, pos: u64) -> &Slot {
        // Safety: pos & mask < capacity; slots live as long as self
        unsafe { &*self.slots.as_ptr().add((pos & self.mask) as usize) }
    }

    /// Enqueue a word, racing against other producers and consumers
    ///
    /// Returns `false` without mutating state if the queue is full.
    /// Lock-free but not wait-free: a producer that keeps losing the tail
    /// claim retries unboundedly.
    pub fn enqueue(&self, value: u64) -> bool {
        let mut tail = self.tail.0.load(Ordering::Acquire);
        loop {
            let head = self.head.0.load(Ordering::Acquire);
            if tail.wrapping_sub(head) >= self.capacity as u64 {
                return false;
            }
            match self.tail.0.compare_exchange_weak(
                tail,
                tail.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => tail = current,
            }
        }

        // The claim bound (tail - head < capacity) means the previous-lap
        // consumer has claimed this slot, but it may not have drained it yet
        let slot = self.slot(tail);
        while slot.seq.load(Ordering::Acquire) != tail {
            core::hint::spin_loop();
        }

        slot.value.store(value, Ordering::Relaxed);
        slot.seq.store(tail.wrapping_add(1), Ordering::Release);
        true
    }

    /// Dequeue a word, racing against other consumers and producers
    ///
    /// Returns `None` without mutating state if the queue is observed
    /// empty. After claiming a position this spins until the producer's
    /// publish store lands; the spin is bounded by that one store, not by
    /// an iteration count.
    pub fn dequeue(&self) -> Option<u64> {
        let mut head = self.head.0.load(Ordering::Acquire);
        loop {
            let tail = self.tail.0.load(Ordering::Acquire);
            if head == tail {
                return None;
            }
            match self.head.0.compare_exchange_weak(
                head,
                head.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }

        let slot = self.slot(head);
        while slot.seq.load(Ordering::Acquire) != head.wrapping_add(1) {
            core::hint::spin_loop();
        }

        let value = slot.value.load(Ordering::Relaxed);
        slot.seq
            .store(head.wrapping_add(self.capacity as u64), Ordering::Release);
        Some(value)
    }

    /// Enqueue with the single-producer fast path
    ///
    /// Contract: exactly one thread may use the `_single` enqueue for this
    /// queue's lifetime of use, paired with exactly one `_single` consumer.
    /// Violating that yields wrong values, though never a torn read. Same
    /// full semantics as [`enqueue`](Queue::enqueue).
    pub fn enqueue_single(&self, value: u64) -> bool {
        let tail = self.tail.0.load(Ordering::Relaxed);
        let head = self.head.0.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= self.capacity as u64 {
            return false;
        }

        let slot = self.slot(tail);
        slot.value.store(value, Ordering::Relaxed);
        slot.seq.store(tail.wrapping_add(1), Ordering::Release);
        // Publishing the counter makes the write visible to the consumer
        self.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        true
    }

    /// Dequeue with the single-consumer fast path
    ///
    /// Same contract and empty semantics as
    /// [`enqueue_single`](Queue::enqueue_single).
    pub fn dequeue_single(&self) -> Option<u64> {
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Acquire);
        if head == tail {
            return None;
        }

        let slot = self.slot(head);
        let value = slot.value.load(Ordering::Relaxed);
        slot.seq
            .store(head.wrapping_add(self.capacity as u64), Ordering::Release);
        self.head.0.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Read the word at the head without removing it
    ///
    /// Exact only when there is a single consumer; with racing consumers
    /// the observed word may be removed concurrently (peek itself never
    /// removes anything). Returns `None` if the head slot holds no
    /// published value at the time of the read.
    pub fn peek(&self) -> Option<u64> {
        let head = self.head.0.load(Ordering::Acquire);
        let slot = self.slot(head);
        if slot.seq.load(Ordering::Acquire) == head.wrapping_add(1) {
            Some(slot.value.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Current occupancy
    ///
    /// A best-effort snapshot under concurrent mutation; exact when the
    /// caller knows no mutator is active.
    pub fn len(&self) -> usize {
        // Head first: tail read afterwards can only be >= the matching head
        let head = self.head.0.load(Ordering::Acquire);
        let tail = self.tail.0.load(Ordering::Acquire);
        (tail.wrapping_sub(head) as usize).min(self.capacity)
    }

    /// Whether the queue holds no values (snapshot, see [`len`](Queue::len))
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue is at capacity (snapshot, see [`len`](Queue::len))
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Fixed capacity (always a power of two)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        let size = self.capacity * mem::size_of::<Slot>();
        // Safety: slots/size match the single allocation in new();
        // &mut self guarantees no accessor is active
        unsafe { self.heap.deallocate(self.slots.cast(), size) };
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::SystemHeap;
    use core::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    fn system_heap() -> Arc<dyn Heap> {
        Arc::new(SystemHeap::new())
    }

    /// LCG in the style of the work-stealing victim picker; test-grade only
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(1103515245).wrapping_add(12345);
            self.0 >> 16
        }
    }

    /// Heap wrapper counting allocate/deallocate calls and sizes
    struct CountingHeap {
        inner: SystemHeap,
        allocs: AtomicUsize,
        deallocs: AtomicUsize,
        last_alloc_size: AtomicUsize,
        last_dealloc_size: AtomicUsize,
    }

    impl CountingHeap {
        fn new() -> Self {
            CountingHeap {
                inner: SystemHeap::new(),
                allocs: AtomicUsize::new(0),
                deallocs: AtomicUsize::new(0),
                last_alloc_size: AtomicUsize::new(0),
                last_dealloc_size: AtomicUsize::new(0),
            }
        }
    }

    impl Heap for CountingHeap {
        fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
            self.allocs.fetch_add(1, Ordering::SeqCst);
            self.last_alloc_size.store(size, Ordering::SeqCst);
            self.inner.allocate(size)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
            self.deallocs.fetch_add(1, Ordering::SeqCst);
            self.last_dealloc_size.store(size, Ordering::SeqCst);
            self.inner.deallocate(ptr, size)
        }

        fn allocated(&self) -> usize {
            self.inner.allocated()
        }
    }

    #[test]
    fn test_create_destroy_one_alloc_one_dealloc() {
        let heap = Arc::new(CountingHeap::new());
        {
            let q = Queue::new(Arc::clone(&heap) as Arc<dyn Heap>, 64).unwrap();
            assert_eq!(q.capacity(), 64);
            assert_eq!(heap.allocs.load(Ordering::SeqCst), 1);
            assert_eq!(heap.deallocs.load(Ordering::SeqCst), 0);
        }
        assert_eq!(heap.allocs.load(Ordering::SeqCst), 1);
        assert_eq!(heap.deallocs.load(Ordering::SeqCst), 1);
        assert_eq!(
            heap.last_alloc_size.load(Ordering::SeqCst),
            heap.last_dealloc_size.load(Ordering::SeqCst)
        );
        assert_eq!(heap.allocated(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = Queue::new(system_heap(), 0).unwrap_err();
        assert_eq!(err, KernError::InvalidCapacity(0));
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        let q = Queue::new(system_heap(), 1000).unwrap();
        assert_eq!(q.capacity(), 1024);
        let q = Queue::new(system_heap(), 1).unwrap();
        assert_eq!(q.capacity(), 1);
        assert!(q.enqueue(5));
        assert!(q.is_full());
        assert!(!q.enqueue(6));
        assert_eq!(q.dequeue(), Some(5));
    }

    #[test]
    fn test_allocation_failure_surfaces() {
        struct NoHeap;
        impl Heap for NoHeap {
            fn allocate(&self, _size: usize) -> Option<NonNull<u8>> {
                None
            }
            unsafe fn deallocate(&self, _ptr: NonNull<u8>, _size: usize) {}
            fn allocated(&self) -> usize {
                0
            }
        }
        let err = Queue::new(Arc::new(NoHeap), 16).unwrap_err();
        assert_eq!(err, KernError::Memory(MemoryError::AllocationFailed));
    }

    fn fill_drain(multi: bool) {
        const N: u64 = 1024;
        let q = Queue::new(system_heap(), N as usize).unwrap();
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);

        let push = |v: u64| if multi { q.enqueue(v) } else { q.enqueue_single(v) };
        for i in 0..N {
            assert!(push(i));
            assert_eq!(q.len(), (i + 1) as usize);
        }
        assert!(q.is_full());
        assert_eq!(q.len(), N as usize);

        // One more enqueue fails and changes nothing
        assert!(!push(0));
        assert!(q.is_full());
        assert_eq!(q.len(), N as usize);

        // Drain in slot order
        for i in 0..N {
            assert_eq!(q.peek(), Some(i));
            let got = if multi { q.dequeue() } else { q.dequeue_single() };
            assert_eq!(got, Some(i));
        }

        let got = if multi { q.dequeue() } else { q.dequeue_single() };
        assert_eq!(got, None);
        assert_eq!(q.peek(), None);
        assert!(q.is_empty());
        assert!(!q.is_full());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_fill_drain_single() {
        fill_drain(false);
    }

    #[test]
    fn test_fill_drain_multi() {
        fill_drain(true);
    }

    /// Many partial fill/drain cycles so the counters lap the ring repeatedly
    fn wraparound(multi: bool) {
        const N: usize = 64;
        const PASSES: usize = 512;

        let q = Queue::new(system_heap(), N).unwrap();
        let mut outside: Vec<u64> = (0..N as u64).collect();
        let mut rng = Lcg(0x5eed);

        for pass in 0..PASSES {
            let n_enqueue = (rng.next() as usize) % (outside.len() + 1);
            for _ in 0..n_enqueue {
                let v = outside.pop().unwrap();
                let ok = if multi { q.enqueue(v) } else { q.enqueue_single(v) };
                assert!(ok);
            }
            assert_eq!(q.len(), N - outside.len());

            let n_dequeue = if pass < PASSES - 1 {
                (rng.next() as usize) % (q.len() + 1)
            } else {
                q.len()
            };
            for _ in 0..n_dequeue {
                let v = if multi { q.dequeue() } else { q.dequeue_single() };
                let v = v.unwrap();
                assert!((v as usize) < N);
                assert!(!outside.contains(&v), "token {} delivered twice", v);
                outside.push(v);
            }
        }

        assert_eq!(outside.len(), N);
        assert!(q.is_empty());
        let v = if multi { q.dequeue() } else { q.dequeue_single() };
        assert_eq!(v, None);
    }

    #[test]
    fn test_wraparound_single() {
        wraparound(false);
    }

    #[test]
    fn test_wraparound_multi() {
        wraparound(true);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let q = Queue::new(system_heap(), 8).unwrap();
        assert_eq!(q.peek(), None);
        assert!(q.enqueue(42));
        assert_eq!(q.peek(), Some(42));
        assert_eq!(q.peek(), Some(42));
        assert_eq!(q.len(), 1);
        assert_eq!(q.dequeue(), Some(42));
        assert_eq!(q.peek(), None);
    }

    #[test]
    fn test_interleaved_modes_single_threaded() {
        // Mode discipline is per concurrent use; a single thread may mix
        let q = Queue::new(system_heap(), 4).unwrap();
        assert!(q.enqueue_single(1));
        assert!(q.enqueue(2));
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue_single(), Some(2));
        assert!(q.is_empty());
    }

    #[test]
    fn test_spsc_two_threads() {
        const N: u64 = 100_000;
        let q = Arc::new(Queue::new(system_heap(), 256).unwrap());

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..N {
                    while !q.enqueue_single(i) {
                        thread::yield_now();
                    }
                }
            })
        };

        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut expected = 0u64;
                while expected < N {
                    match q.dequeue_single() {
                        Some(v) => {
                            assert_eq!(v, expected);
                            expected += 1;
                        }
                        None => thread::yield_now(),
                    }
                }
            })
        };

        producer.join().unwrap();
        consumer.join().unwrap();
        assert!(q.is_empty());
    }

    /// Port of the classic token-conservation stress: tokens live either in
    /// the queue or in the shared `results` table, never both, never twice.
    #[test]
    fn test_mpmc_no_loss_no_duplication() {
        const N: usize = 256;
        const THREADS: usize = 8;
        const ROUNDS: usize = 400;
        const MAX_BATCH: usize = N / (THREADS * 2);

        let q = Arc::new(Queue::new(system_heap(), N).unwrap());
        let results: Arc<Vec<AtomicU64>> =
            Arc::new((0..N).map(|_| AtomicU64::new(0)).collect());
        // Tokens currently outside the queue
        let free_count = Arc::new(AtomicU64::new(N as u64));

        // Claim a free token id, or None if all are in flight
        fn find_free(results: &[AtomicU64], free_count: &AtomicU64, start: usize) -> Option<u64> {
            let n = results.len();
            let mut i = start % n;
            loop {
                if results[i].swap(1, Ordering::Acquire) != 1 {
                    let o = free_count.fetch_sub(1, Ordering::SeqCst);
                    assert!(o > 0);
                    return Some(i as u64);
                }
                i = (i + 1) % n;
                if i == start % n {
                    return None;
                }
            }
        }

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let q = Arc::clone(&q);
                let results = Arc::clone(&results);
                let free_count = Arc::clone(&free_count);
                thread::spawn(move || {
                    let mut rng = Lcg(0x9e3779b9u64.wrapping_add(t as u64));
                    for _ in 0..ROUNDS {
                        let n_enqueue = (rng.next() as usize) % MAX_BATCH;
                        for _ in 0..n_enqueue {
                            let start = rng.next() as usize;
                            // Full-condition checks are racy by nature, so
                            // enqueue failure is tolerated, as is exhaustion
                            match find_free(&results, &free_count, start) {
                                Some(n) => {
                                    if !q.enqueue(n) {
                                        let v = results[n as usize].swap(0, Ordering::Release);
                                        assert_eq!(v, 1);
                                        free_count.fetch_add(1, Ordering::SeqCst);
                                        break;
                                    }
                                }
                                None => break,
                            }
                        }

                        let n_dequeue = (rng.next() as usize) % MAX_BATCH;
                        for _ in 0..n_dequeue {
                            match q.dequeue() {
                                Some(n) => {
                                    assert!((n as usize) < N);
                                    let v = results[n as usize].swap(0, Ordering::Release);
                                    assert_eq!(v, 1, "dequeued token {} twice", n);
                                    let o = free_count.fetch_add(1, Ordering::SeqCst);
                                    assert!(o < N as u64);
                                }
                                None => break,
                            }
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        // Drain the stragglers; every token must come back exactly once
        while let Some(n) = q.dequeue() {
            let v = results[n as usize].swap(0, Ordering::Release);
            assert_eq!(v, 1);
            free_count.fetch_add(1, Ordering::SeqCst);
        }
        assert_eq!(free_count.load(Ordering::SeqCst), N as u64);
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_mpmc_contended_fill() {
        // All producers race to fill, then all consumers race to drain;
        // the union of dequeued values must be exactly the enqueued set
        const N: usize = 1024;
        const THREADS: usize = 4;

        let q = Arc::new(Queue::new(system_heap(), N).unwrap());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..(N / THREADS) as u64 {
                        let v = (t as u64) << 32 | i;
                        while !q.enqueue(v) {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(q.is_full());
        assert_eq!(q.len(), N);
        assert!(!q.enqueue(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Some(v) = q.dequeue() {
                        got.push(v);
                    }
                    got
                })
            })
            .collect();
        let mut all: Vec<u64> = Vec::new();
        for h in handles {
            all.extend(h.join().unwrap());
        }

        assert_eq!(all.len(), N);
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), N, "duplicate delivery detected");
        assert!(q.is_empty());
    }
}

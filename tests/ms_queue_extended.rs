use std::sync::Arc;
use std::thread;
use tagq::MsQueue;

#[test]
fn test_empty_dequeue() {
    let q: MsQueue<i32> = MsQueue::new();
    assert_eq!(q.dequeue(), None);
    // The empty check must not disturb later operations.
    assert_eq!(q.dequeue(), None);
    q.enqueue(7);
    assert_eq!(q.dequeue(), Some(7));
    assert_eq!(q.dequeue(), None);
}

#[test]
fn test_fifo_ordering() {
    let q = MsQueue::new();
    for i in 0..100 {
        q.enqueue(i);
    }
    for i in 0..100 {
        assert_eq!(q.dequeue(), Some(i));
    }
    assert_eq!(q.dequeue(), None);
}

#[test]
fn test_many_items() {
    let q = MsQueue::new();
    let n = 50_000;
    for i in 0..n {
        q.enqueue(i);
    }
    for i in 0..n {
        assert_eq!(q.dequeue(), Some(i));
    }
    assert_eq!(q.dequeue(), None);
}

#[test]
fn test_enqueue_dequeue_interleaved() {
    let q = MsQueue::new();
    for round in 0..100 {
        for i in 0..10 {
            q.enqueue(round * 10 + i);
        }
        for i in 0..10 {
            assert_eq!(q.dequeue(), Some(round * 10 + i));
        }
    }
    assert_eq!(q.dequeue(), None);
}

/// Repeated drain-and-refill cycles run almost entirely on recycled nodes;
/// ordering must hold across node reuse exactly as for fresh allocations.
#[test]
fn test_node_reuse_keeps_fifo() {
    let q = MsQueue::new();
    for cycle in 0..1000u64 {
        q.enqueue(cycle * 2);
        q.enqueue(cycle * 2 + 1);
        assert_eq!(q.dequeue(), Some(cycle * 2));
        assert_eq!(q.dequeue(), Some(cycle * 2 + 1));
        assert_eq!(q.dequeue(), None);
    }
}

#[test]
fn test_single_item() {
    let q = MsQueue::new();
    q.enqueue(42);
    assert_eq!(q.dequeue(), Some(42));
    assert_eq!(q.dequeue(), None);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_mpmc_sum() {
    let q = Arc::new(MsQueue::new());
    let total = 4000u64;
    let producers = 4;
    let consumers = 4;

    let mut handles = vec![];
    for p in 0..producers {
        let q = q.clone();
        handles.push(thread::spawn(move || {
            for i in 0..(total / producers) {
                q.enqueue(p * (total / producers) + i);
            }
        }));
    }

    let sum = Arc::new(std::sync::atomic::AtomicU64::new(0));
    for _ in 0..consumers {
        let q = q.clone();
        let sum = sum.clone();
        handles.push(thread::spawn(move || {
            let mut local = 0u64;
            for _ in 0..(total / consumers) {
                loop {
                    if let Some(v) = q.dequeue() {
                        local += v;
                        break;
                    }
                    thread::yield_now();
                }
            }
            sum.fetch_add(local, std::sync::atomic::Ordering::Relaxed);
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let expected: u64 = (0..total).sum();
    assert_eq!(sum.load(std::sync::atomic::Ordering::SeqCst), expected);
    assert!(q.dequeue().is_none());
}

/// Dropping a queue that still holds elements, after enough churn to have
/// populated the free list, must not double-free or leak-crash.
#[test]
fn test_drop_with_leftovers() {
    let q = MsQueue::new();
    for i in 0..100 {
        q.enqueue(i);
    }
    for _ in 0..50 {
        q.dequeue();
    }
    // 50 values still queued, 50 retired sentinels pooled.
    drop(q);
}

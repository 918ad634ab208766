//! Simple demo: many threads race to enqueue and dequeue on a shared queue
//!
//! Each worker pushes values from a shared counter into `q` and periodically
//! drains into `results`; the interleaving of the printed results shows the
//! cross-thread racing while each thread's own values stay in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tagq::MsQueue;

const THREAD_COUNT: usize = 10;
const RESULT_COUNT: usize = 100;

fn main() {
    let q = Arc::new(MsQueue::new());
    let results = Arc::new(MsQueue::new());
    let counter = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for _ in 0..THREAD_COUNT {
        let q = q.clone();
        let results = results.clone();
        let counter = counter.clone();

        handles.push(thread::spawn(move || loop {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            if n >= RESULT_COUNT {
                break;
            }
            q.enqueue(n);

            if n % 2 != 0 {
                while let Some(v) = q.dequeue() {
                    results.enqueue(v);
                    // The sleeps are only here to mix up the interleaving.
                    thread::sleep(Duration::from_micros(10));
                }
            }
            thread::sleep(Duration::from_micros(10));
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    while let Some(v) = results.dequeue() {
        println!("{}", v);
    }

    println!("leftovers from the race:");
    while let Some(v) = q.dequeue() {
        println!("{}", v);
    }
}

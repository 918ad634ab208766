//! Lock-free MPMC FIFO queue built on tagged-pointer CAS.
//!
//! `tagq` implements the Michael-Scott queue: an unbounded multi-producer
//! multi-consumer FIFO where every mutation is a single double-width
//! compare-and-swap on a pointer paired with a generation counter. No
//! operation takes a lock or blocks; contended operations retry, and any
//! thread can finish another thread's half-done tail advance (helping), so
//! the structure stays lock-free even if a thread stalls mid-operation.
//!
//! ## Features
//!
//! - `MsQueue`: unbounded MPMC FIFO queue.
//! - `TaggedPtr` / `AtomicTagged`: ABA-safe atomic tagged pointers.
//!
//! ## Usage
//!
//! ```rust
//! use tagq::MsQueue;
//!
//! let q = MsQueue::new();
//! q.enqueue(1);
//! q.enqueue(2);
//! assert_eq!(q.dequeue(), Some(1));
//! assert_eq!(q.dequeue(), Some(2));
//! assert_eq!(q.dequeue(), None);
//! ```

pub mod ms_queue;
pub mod tagged;
pub mod utils;

pub use ms_queue::MsQueue;
pub use tagged::{AtomicTagged, TaggedPtr};

//! Unbounded lock-free MPMC FIFO queue (Michael-Scott).
//!
//! The queue is a singly linked list headed by a sentinel node. `head`
//! always points at the sentinel; the front element lives in the node after
//! it. `tail` points at the last node or the one before it (it may lag by at
//! most one link behind the true end, never run ahead). All mutation goes
//! through double-width CAS on tagged pointers; there are no locks and no
//! blocking, only snapshot-and-retry loops with cooperative helping.
//!
//! Retired sentinels are not freed while the queue is live. They go onto a
//! lock-free free list and are reused by later enqueues; a stale reader that
//! still holds a snapshot of a recycled node only ever touches live memory,
//! and its CAS fails on the generation tag. Physical deallocation happens in
//! `Drop`, where exclusive access rules out in-flight snapshots.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::Ordering;

use crossbeam_utils::Backoff;

use crate::tagged::{AtomicTagged, TaggedPtr};
use crate::utils::CacheAligned;

struct Node<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    next: AtomicTagged<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Node<T> {
        Node {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: AtomicTagged::null(),
        }
    }

    fn new(value: T) -> Node<T> {
        Node {
            value: UnsafeCell::new(MaybeUninit::new(value)),
            next: AtomicTagged::null(),
        }
    }
}

/// Free list of retired nodes: a Treiber stack linked through the nodes'
/// `next` fields, with a tagged top pointer.
///
/// Nodes on the list stay mapped for the lifetime of the queue, which is
/// what makes stale queue snapshots safe to dereference. Reuse of an address
/// is harmless because every slot update bumps the generation tag.
struct NodePool<T> {
    top: CacheAligned<AtomicTagged<Node<T>>>,
}

impl<T> NodePool<T> {
    fn new() -> NodePool<T> {
        NodePool {
            top: CacheAligned::new(AtomicTagged::null()),
        }
    }

    /// Hands out a node holding `value`, reusing a retired one if available.
    fn acquire(&self, value: T) -> *mut Node<T> {
        match self.pop() {
            Some(node) => unsafe {
                (*node).value.get().write(MaybeUninit::new(value));
                // Reset the link to null at a later generation so any CAS
                // against a snapshot from the node's previous life fails.
                let link = (*node).next.load(Ordering::Relaxed);
                (*node)
                    .next
                    .store(link.advance(ptr::null_mut()), Ordering::Release);
                node
            },
            None => Box::into_raw(Box::new(Node::new(value))),
        }
    }

    /// Retires a node. It becomes eligible for reuse immediately and for
    /// deallocation only once the pool is dropped.
    fn release(&self, node: *mut Node<T>) {
        let backoff = Backoff::new();
        loop {
            let top = self.top.load(Ordering::Acquire);
            let link = unsafe { &(*node).next };
            let cur = link.load(Ordering::Relaxed);
            link.store(cur.advance(top.as_raw()), Ordering::Release);

            if self
                .top
                .compare_exchange(top, top.advance(node), Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            backoff.spin();
        }
    }

    fn pop(&self) -> Option<*mut Node<T>> {
        let backoff = Backoff::new();
        loop {
            let top = self.top.load(Ordering::Acquire);
            if top.is_null() {
                return None;
            }
            // `top` may be concurrently popped and recycled, but its memory
            // stays mapped; a stale read here just loses the CAS on the tag.
            let next = unsafe { &(*top.as_raw()).next }.load(Ordering::Acquire);

            if self
                .top
                .compare_exchange(
                    top,
                    top.advance(next.as_raw()),
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return Some(top.as_raw());
            }
            backoff.spin();
        }
    }
}

impl<T> Drop for NodePool<T> {
    fn drop(&mut self) {
        let mut cur = self.top.load(Ordering::Relaxed).as_raw();
        while !cur.is_null() {
            unsafe {
                let next = (*cur).next.load(Ordering::Relaxed).as_raw();
                drop(Box::from_raw(cur));
                cur = next;
            }
        }
    }
}

/// An unbounded multi-producer multi-consumer FIFO queue.
///
/// Values enqueued by a single thread are dequeued in that thread's call
/// order; across threads, order is decided by which CAS wins. Neither
/// operation ever blocks on a lock.
///
/// `T` must be `Copy`: a dequeuer copies the value out *before* it claims
/// the node, so a thread that loses the race holds a copy it must be able to
/// discard without running a destructor.
pub struct MsQueue<T> {
    head: CacheAligned<AtomicTagged<Node<T>>>,
    tail: CacheAligned<AtomicTagged<Node<T>>>,
    pool: NodePool<T>,
}

unsafe impl<T: Send> Send for MsQueue<T> {}
unsafe impl<T: Send> Sync for MsQueue<T> {}

impl<T: Copy> Default for MsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> MsQueue<T> {
    /// Creates an empty queue.
    ///
    /// Allocates the sentinel node; `head` and `tail` both start out
    /// pointing at it.
    pub fn new() -> MsQueue<T> {
        let sentinel = Box::into_raw(Box::new(Node::sentinel()));
        MsQueue {
            head: CacheAligned::new(AtomicTagged::new(TaggedPtr::new(sentinel, 0))),
            tail: CacheAligned::new(AtomicTagged::new(TaggedPtr::new(sentinel, 0))),
            pool: NodePool::new(),
        }
    }

    /// Appends a value at the back of the queue.
    ///
    /// Never fails and never blocks; under contention the linking CAS is
    /// retried until it wins.
    pub fn enqueue(&self, value: T) {
        let node = self.pool.acquire(value);
        let backoff = Backoff::new();
        let mut tail;

        loop {
            tail = self.tail.load(Ordering::Acquire);
            // The sentinel invariant keeps tail non-null for the queue's
            // whole lifetime.
            let next = unsafe { &(*tail.as_raw()).next }.load(Ordering::Acquire);

            // Operate only on a coherent snapshot.
            if tail != self.tail.load(Ordering::Acquire) {
                continue;
            }

            if next.is_null() {
                // tail really is the last node; try to link ours after it.
                if unsafe { &(*tail.as_raw()).next }
                    .compare_exchange(
                        next,
                        next.advance(node),
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    break;
                }
            } else {
                // tail is lagging behind a node someone else linked; help
                // swing it forward, then retry.
                let _ = self.tail.compare_exchange(
                    tail,
                    tail.advance(next.as_raw()),
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                );
            }
            backoff.snooze();
        }

        // Best effort: if this fails, another thread's helping step has
        // already advanced tail past our node.
        let _ = self.tail.compare_exchange(
            tail,
            tail.advance(node),
            Ordering::SeqCst,
            Ordering::Relaxed,
        );
    }

    /// Removes and returns the value at the front of the queue.
    ///
    /// Returns `None` when the queue was empty at the moment of the check;
    /// that path performs loads only, no mutation.
    pub fn dequeue(&self) -> Option<T> {
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let next = unsafe { &(*head.as_raw()).next }.load(Ordering::Acquire);

            if head != self.head.load(Ordering::Acquire) {
                continue;
            }

            if head.as_raw() == tail.as_raw() {
                if next.is_null() {
                    // Sentinel is the only node: genuinely empty.
                    return None;
                }
                // An enqueuer linked a node but has not advanced tail yet;
                // help it along so head can move past tail's position.
                let _ = self.tail.compare_exchange(
                    tail,
                    tail.advance(next.as_raw()),
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                );
            } else {
                // Copy the value out before claiming the node. Once head
                // moves, another dequeuer may retire and recycle `next`
                // under us; a copy lost to a failed CAS is just discarded.
                let value = unsafe { (*(*next.as_raw()).value.get()).assume_init() };

                if self
                    .head
                    .compare_exchange(
                        head,
                        head.advance(next.as_raw()),
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // We own the old sentinel now; `next` is the new one.
                    self.pool.release(head.as_raw());
                    return Some(value);
                }
            }
            backoff.snooze();
        }
    }
}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: no snapshots are in flight, so the list can be
        // walked and freed directly. Values are Copy and need no dropping;
        // the pool frees the retired nodes itself.
        let mut cur = self.head.load(Ordering::Relaxed).as_raw();
        while !cur.is_null() {
            unsafe {
                let next = (*cur).next.load(Ordering::Relaxed).as_raw();
                drop(Box::from_raw(cur));
                cur = next;
            }
        }
    }
}

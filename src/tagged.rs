//! Tagged pointers with atomic double-width operations
//!
//! This module provides `TaggedPtr<T>` and `AtomicTagged<T>`, the unit every
//! atomic field of the queue operates on. A tagged pointer pairs a raw
//! pointer with a 64-bit generation counter; the counter is bumped on every
//! successful CAS of a slot, so a stale snapshot can never be mistaken for
//! the current value even if the pointed-to memory has been recycled at the
//! same address (the ABA problem).

use core::fmt;
use core::marker::PhantomData;
use core::ptr;

use portable_atomic::{AtomicU128, Ordering};

/// A raw pointer paired with a generation counter.
///
/// Equality is value equality on `(raw, tag)`: two tagged pointers to the
/// same address with different generations compare unequal, which is what
/// defeats ABA on compare-exchange.
pub struct TaggedPtr<T> {
    raw: *mut T,
    tag: u64,
}

impl<T> TaggedPtr<T> {
    /// Creates a tagged pointer from its parts.
    #[inline]
    pub fn new(raw: *mut T, tag: u64) -> Self {
        Self { raw, tag }
    }

    /// A null pointer at generation zero.
    #[inline]
    pub fn null() -> Self {
        Self::new(ptr::null_mut(), 0)
    }

    /// Returns the raw pointer.
    #[inline]
    pub fn as_raw(&self) -> *mut T {
        self.raw
    }

    /// Returns the generation counter.
    #[inline]
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Returns true if the pointer part is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    /// The successor value for a slot currently holding `self`: the new
    /// pointer with the generation bumped by one. Every CAS installing a new
    /// value into a slot must go through this, so that per-slot generations
    /// are strictly increasing (wrapping at counter width).
    #[inline]
    pub fn advance(&self, raw: *mut T) -> Self {
        Self::new(raw, self.tag.wrapping_add(1))
    }

    #[inline]
    fn pack(self) -> u128 {
        ((self.tag as u128) << 64) | (self.raw as usize as u128)
    }

    #[inline]
    fn unpack(bits: u128) -> Self {
        Self {
            raw: bits as u64 as usize as *mut T,
            tag: (bits >> 64) as u64,
        }
    }
}

impl<T> Clone for TaggedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TaggedPtr<T> {}

impl<T> PartialEq for TaggedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw && self.tag == other.tag
    }
}

impl<T> Eq for TaggedPtr<T> {}

impl<T> fmt::Debug for TaggedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaggedPtr({:p}, gen {})", self.raw, self.tag)
    }
}

/// An atomic cell holding one `TaggedPtr<T>`.
///
/// Pointer and tag live in a single 128-bit word and are loaded, stored, and
/// compare-exchanged together, so no observer can ever see a pointer from one
/// generation combined with the tag of another.
pub struct AtomicTagged<T> {
    data: AtomicU128,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send + Sync> Send for AtomicTagged<T> {}
unsafe impl<T: Send + Sync> Sync for AtomicTagged<T> {}

impl<T> AtomicTagged<T> {
    /// Creates a new atomic tagged pointer.
    #[inline]
    pub fn new(ptr: TaggedPtr<T>) -> Self {
        Self {
            data: AtomicU128::new(ptr.pack()),
            _marker: PhantomData,
        }
    }

    /// Creates a null atomic tagged pointer at generation zero.
    #[inline]
    pub fn null() -> Self {
        Self::new(TaggedPtr::null())
    }

    /// Loads the current tagged pointer.
    #[inline]
    pub fn load(&self, order: Ordering) -> TaggedPtr<T> {
        TaggedPtr::unpack(self.data.load(order))
    }

    /// Stores a tagged pointer unconditionally.
    ///
    /// Callers that share the slot with concurrent CAS loops must bump the
    /// generation themselves (via [`TaggedPtr::advance`]) so in-flight
    /// snapshots are invalidated.
    #[inline]
    pub fn store(&self, ptr: TaggedPtr<T>, order: Ordering) {
        self.data.store(ptr.pack(), order);
    }

    /// Compares and exchanges the tagged pointer.
    ///
    /// Fails if either the pointer or the generation differs from `current`.
    /// On failure the value actually observed is returned.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: TaggedPtr<T>,
        new: TaggedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T>, TaggedPtr<T>> {
        match self
            .data
            .compare_exchange(current.pack(), new.pack(), success, failure)
        {
            Ok(prev) => Ok(TaggedPtr::unpack(prev)),
            Err(prev) => Err(TaggedPtr::unpack(prev)),
        }
    }
}

impl<T> Default for AtomicTagged<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicTagged<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtomicTagged({:?})", self.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_address_different_generation_is_unequal() {
        let x = Box::into_raw(Box::new(7u32));
        let a = TaggedPtr::new(x, 3);
        let b = a.advance(x);
        assert_ne!(a, b);
        assert_eq!(b.tag(), 4);
        assert_eq!(a.as_raw(), b.as_raw());
        unsafe { drop(Box::from_raw(x)) };
    }

    #[test]
    fn cas_rejects_stale_generation() {
        let cell: AtomicTagged<u32> = AtomicTagged::null();
        let snap = cell.load(Ordering::Acquire);

        let x = Box::into_raw(Box::new(1u32));
        cell.compare_exchange(snap, snap.advance(x), Ordering::SeqCst, Ordering::Relaxed)
            .unwrap();
        // Slot went back to null, but at a later generation: the stale
        // snapshot must not win a second time.
        let cur = cell.load(Ordering::Acquire);
        cell.compare_exchange(
            cur,
            cur.advance(core::ptr::null_mut()),
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .unwrap();
        assert!(cell
            .compare_exchange(snap, snap.advance(x), Ordering::SeqCst, Ordering::Relaxed)
            .is_err());
        unsafe { drop(Box::from_raw(x)) };
    }
}

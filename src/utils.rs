use std::ops::{Deref, DerefMut};

// Pad hot atomics out to a cache line so head, tail, and the pool top never
// share one. Line sizes: x86_64 64B, aarch64 128B (Apple M-series /
// Neoverse), s390x 256B; 64B otherwise.

#[cfg(target_arch = "s390x")]
#[repr(align(256))]
#[derive(Debug)]
pub struct CacheAligned<T> {
    pub data: T,
}

#[cfg(target_arch = "aarch64")]
#[repr(align(128))]
#[derive(Debug)]
pub struct CacheAligned<T> {
    pub data: T,
}

#[cfg(not(any(target_arch = "s390x", target_arch = "aarch64")))]
#[repr(align(64))]
#[derive(Debug)]
pub struct CacheAligned<T> {
    pub data: T,
}

impl<T> CacheAligned<T> {
    pub fn new(t: T) -> Self {
        Self { data: t }
    }
}

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for CacheAligned<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

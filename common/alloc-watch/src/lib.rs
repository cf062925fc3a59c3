/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! This crate provides a counting wrapper around a global allocator. It is
//! meant to be installed as the `#[global_allocator]` of stress binaries so
//! that the heap they actually hold can be observed from inside the process.
//!
//! Every allocation and deallocation that passes through [`CountingAlloc`]
//! updates a handful of atomic counters: bytes currently live, the peak of
//! that value, and the number of allocate and free calls. A [`snapshot`] of
//! these counters is cheap and can be taken from any thread.
//!
//! The counters use relaxed ordering. They are independent of each other, so
//! a snapshot taken while other threads allocate may show a live byte count
//! and an allocation count from slightly different instants.
//!
//! [`snapshot`]: CountingAlloc::snapshot

use std::alloc::GlobalAlloc;
use std::alloc::Layout;
use std::alloc::System;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::*;

/// A `GlobalAlloc` that forwards to `A` and keeps track of what it handed out.
pub struct CountingAlloc<A = System> {
    inner: A,
    /// Bytes handed out and not yet returned.
    live: AtomicU64,
    /// High-water mark of `live`.
    peak: AtomicU64,
    allocs: AtomicU64,
    frees: AtomicU64,
}

/// A point-in-time copy of the counters of a [`CountingAlloc`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub live_bytes: u64,
    pub peak_bytes: u64,
    pub allocations: u64,
    pub deallocations: u64,
}

impl AllocStats {
    /// Number of allocations that have not been freed yet.
    pub fn outstanding(&self) -> u64 {
        self.allocations.saturating_sub(self.deallocations)
    }
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "live={}B peak={}B allocs={} frees={}",
            self.live_bytes, self.peak_bytes, self.allocations, self.deallocations
        )
    }
}

impl CountingAlloc<System> {
    /// Wraps the system allocator.
    pub const fn system() -> Self {
        Self::new(System)
    }
}

impl<A> CountingAlloc<A> {
    /// Wraps `inner`. Counters start at zero.
    pub const fn new(inner: A) -> Self {
        Self {
            inner,
            live: AtomicU64::new(0),
            peak: AtomicU64::new(0),
            allocs: AtomicU64::new(0),
            frees: AtomicU64::new(0),
        }
    }

    /// Read all counters.
    pub fn snapshot(&self) -> AllocStats {
        AllocStats {
            live_bytes: self.live.load(Relaxed),
            peak_bytes: self.peak.load(Relaxed),
            allocations: self.allocs.load(Relaxed),
            deallocations: self.frees.load(Relaxed),
        }
    }

    #[inline(always)]
    fn grow(&self, size: usize) {
        let now = self.live.fetch_add(size as u64, Relaxed) + size as u64;
        self.peak.fetch_max(now, Relaxed);
    }

    #[inline(always)]
    fn shrink(&self, size: usize) {
        self.live.fetch_sub(size as u64, Relaxed);
    }
}

// SAFETY: every method forwards to `inner` with the caller's arguments
// unchanged and only touches atomics on the side. No allocation happens while
// counting, so installing this as the global allocator cannot recurse.
unsafe impl<A: GlobalAlloc> GlobalAlloc for CountingAlloc<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc(layout) };
        if !ptr.is_null() {
            self.allocs.fetch_add(1, Relaxed);
            self.grow(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.inner.dealloc(ptr, layout) };
        self.frees.fetch_add(1, Relaxed);
        self.shrink(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.allocs.fetch_add(1, Relaxed);
            self.grow(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new = unsafe { self.inner.realloc(ptr, layout, new_size) };
        // On failure the old block is untouched and still live.
        if !new.is_null() {
            if new_size >= layout.size() {
                self.grow(new_size - layout.size());
            } else {
                self.shrink(layout.size() - new_size);
            }
        }
        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn counts_alloc_and_free() {
        let alloc = CountingAlloc::system();
        let a = unsafe { alloc.alloc(layout(100)) };
        let b = unsafe { alloc.alloc_zeroed(layout(28)) };
        assert!(!a.is_null() && !b.is_null());

        let stats = alloc.snapshot();
        assert_eq!(stats.live_bytes, 128);
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.outstanding(), 2);

        unsafe { alloc.dealloc(a, layout(100)) };
        let stats = alloc.snapshot();
        assert_eq!(stats.live_bytes, 28);
        assert_eq!(stats.peak_bytes, 128);
        assert_eq!(stats.deallocations, 1);

        unsafe { alloc.dealloc(b, layout(28)) };
        assert_eq!(alloc.snapshot().live_bytes, 0);
        assert_eq!(alloc.snapshot().outstanding(), 0);
    }

    #[test]
    fn realloc_adjusts_live_bytes() {
        let alloc = CountingAlloc::system();
        let p = unsafe { alloc.alloc(layout(64)) };
        let p = unsafe { alloc.realloc(p, layout(64), 1024) };
        assert!(!p.is_null());
        assert_eq!(alloc.snapshot().live_bytes, 1024);
        assert_eq!(alloc.snapshot().peak_bytes, 1024);

        let p = unsafe { alloc.realloc(p, layout(1024), 16) };
        assert!(!p.is_null());
        assert_eq!(alloc.snapshot().live_bytes, 16);
        // A realloc is neither a new allocation nor a free.
        assert_eq!(alloc.snapshot().allocations, 1);
        assert_eq!(alloc.snapshot().deallocations, 0);

        unsafe { alloc.dealloc(p, layout(16)) };
        assert_eq!(alloc.snapshot().live_bytes, 0);
    }

    #[test]
    fn display_stats() {
        let stats = AllocStats {
            live_bytes: 10,
            peak_bytes: 20,
            allocations: 3,
            deallocations: 1,
        };
        assert_eq!(stats.to_string(), "live=10B peak=20B allocs=3 frees=1");
    }
}

/*
 * tracking.rs
 *
 * Instrumented wrapper: counts what goes in and out of another allocator,
 * remembers the last tagged call site, and checks for leaks when the
 * registry shuts it down.
 *
 * Counters are Relaxed atomics - they're statistics, not synchronization.
 * A snapshot taken while other threads allocate can be momentarily
 * inconsistent (frees seen before the matching allocs). Read them when the
 * process is quiet.
 *
 * The aligned pair is not forwarded to the inner allocator. The generic
 * header algorithm runs on top of the counted alloc/free, so one aligned
 * alloc shows up as exactly one alloc.
 */

use core::panic::Location;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::allocator::Allocator;
use crate::diagln;

/// What `on_shutdown` does when allocations are still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakPolicy {
    /// Say nothing.
    Ignore,
    /// Write a report to stderr.
    Report,
    /// Write the report, then panic.
    Panic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingConfig {
    pub leak_policy: LeakPolicy,
}

impl TrackingConfig {
    #[must_use]
    pub const fn new(leak_policy: LeakPolicy) -> Self {
        Self { leak_policy }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self::new(LeakPolicy::Report)
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackingStats {
    /// Successful allocations, including `realloc(null, n)`.
    pub allocs: usize,
    /// Frees of non-null pointers.
    pub frees: usize,
    /// Successful resizes of an existing block.
    pub reallocs: usize,
    /// Requests the inner allocator could not satisfy.
    pub failures: usize,
    /// Times the registry called `on_shutdown`.
    pub shutdowns: usize,
}

impl TrackingStats {
    /// Blocks handed out and not yet returned.
    #[must_use]
    pub fn live(&self) -> usize {
        self.allocs.saturating_sub(self.frees)
    }

    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.allocs == self.frees
    }
}

pub struct TrackingAllocator<A> {
    inner: A,
    config: TrackingConfig,
    allocs: AtomicUsize,
    frees: AtomicUsize,
    reallocs: AtomicUsize,
    failures: AtomicUsize,
    shutdowns: AtomicUsize,
    last_origin: AtomicPtr<Location<'static>>,
}

impl<A> TrackingAllocator<A> {
    #[must_use]
    pub const fn new(inner: A, config: TrackingConfig) -> Self {
        Self {
            inner,
            config,
            allocs: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
            reallocs: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            last_origin: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn config(&self) -> TrackingConfig {
        self.config
    }

    #[must_use]
    pub fn stats(&self) -> TrackingStats {
        TrackingStats {
            allocs: self.allocs.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            reallocs: self.reallocs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            shutdowns: self.shutdowns.load(Ordering::Relaxed),
        }
    }

    /// Call site of the most recent `alloc_debug`, if any.
    #[must_use]
    pub fn last_origin(&self) -> Option<&'static Location<'static>> {
        let p = self.last_origin.load(Ordering::Relaxed);
        // SAFETY: only ever stores null or a pointer from a
        // &'static Location<'static>, which never dangles.
        unsafe { p.as_ref() }
    }

    #[inline]
    fn record_alloc(&self, result: Option<NonNull<u8>>) -> Option<NonNull<u8>> {
        let counter = if result.is_some() { &self.allocs } else { &self.failures };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }

    /* never allocates: formatting goes straight to fd 2 */
    fn report_leaks(&self, stats: &TrackingStats) {
        diagln!(
            "{} allocation(s) still live at shutdown (allocs={}, frees={})",
            stats.live(),
            stats.allocs,
            stats.frees
        );
        if let Some(origin) = self.last_origin() {
            diagln!("last tagged allocation at {origin}");
        }
    }
}

impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.record_alloc(self.inner.alloc(size))
    }

    fn alloc_debug(&self, size: usize, origin: &'static Location<'static>) -> Option<NonNull<u8>> {
        self.last_origin
            .store(ptr::from_ref(origin).cast_mut(), Ordering::Relaxed);
        self.record_alloc(self.inner.alloc_debug(size, origin))
    }

    unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
        // SAFETY: forwarded caller contract, ptr belongs to inner.
        let result = unsafe { self.inner.realloc(ptr, new_size) };
        if ptr.is_null() {
            return self.record_alloc(result);
        }
        let counter = if result.is_some() { &self.reallocs } else { &self.failures };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }

    unsafe fn free(&self, ptr: *mut u8) {
        if !ptr.is_null() {
            self.frees.fetch_add(1, Ordering::Relaxed);
        }
        // SAFETY: forwarded caller contract, ptr belongs to inner.
        unsafe { self.inner.free(ptr) }
    }

    fn on_shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::Relaxed);
        let stats = self.stats();
        if !stats.is_balanced() {
            match self.config.leak_policy {
                LeakPolicy::Ignore => {}
                LeakPolicy::Report => self.report_leaks(&stats),
                LeakPolicy::Panic => {
                    self.report_leaks(&stats);
                    panic!("{} allocation(s) leaked at shutdown", stats.live());
                }
            }
        }
        self.inner.on_shutdown();
    }
}

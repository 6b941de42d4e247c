/*
 * global.rs
 *
 * GlobalAlloc adapter over the registry, so Rust's own heap (Box, Vec,
 * String) goes through whatever allocator is installed:
 *
 *     #[global_allocator]
 *     static GLOBAL: allocswap::RegistryAlloc = allocswap::RegistryAlloc;
 *
 * Caveat: std allocates before main runs, and with this adapter those blocks
 * come from the lazily installed default. Swapping in an allocator later is
 * only sound if it can free what the previous one handed out (a wrapper
 * around the same malloc, with the same aligned strategy). The registry
 * can't check that for you.
 */

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use crate::allocator::MIN_ALIGN;
use crate::registry;

/// Zero-sized handle that forwards to [`registry::current`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryAlloc;

#[inline]
fn to_raw(p: Option<NonNull<u8>>) -> *mut u8 {
    p.map_or(ptr::null_mut(), NonNull::as_ptr)
}

// SAFETY: every method forwards to the installed Allocator, which is Sync and
// upholds the same contract: aligned, non-overlapping memory or null. The
// plain/aligned choice is made from layout.align() on both the allocating and
// releasing side, so each block goes back to the matching free function.
unsafe impl GlobalAlloc for RegistryAlloc {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let a = registry::current();
        if layout.align() <= MIN_ALIGN {
            to_raw(a.alloc(layout.size()))
        } else {
            to_raw(a.alloc_aligned(layout.size(), layout.align()))
        }
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let a = registry::current();
        if layout.align() <= MIN_ALIGN {
            // SAFETY: ptr came from alloc/realloc above with the same layout,
            // which took the plain path.
            unsafe { a.free(ptr) }
        } else {
            // SAFETY: same layout, so it took the aligned path.
            unsafe { a.free_aligned(ptr) }
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let a = registry::current();
        if layout.align() <= MIN_ALIGN {
            // SAFETY: ptr came from the plain path; the allocator's realloc
            // keeps MIN_ALIGN and leaves ptr intact on failure.
            return to_raw(unsafe { a.realloc(ptr, new_size) });
        }

        /* no aligned realloc primitive: allocate, copy, release */
        let Some(new) = a.alloc_aligned(new_size, layout.align()) else {
            return ptr::null_mut();
        };
        // SAFETY: both blocks are live, distinct, and valid for the smaller
        // of the two sizes.
        unsafe { ptr::copy_nonoverlapping(ptr, new.as_ptr(), layout.size().min(new_size)) };
        // SAFETY: ptr took the aligned path and is released once.
        unsafe { a.free_aligned(ptr) };
        new.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry_test_lock;

    #[test]
    fn test_plain_layout_round_trip() {
        let _guard = registry_test_lock();
        let layout = Layout::from_size_align(40, 8).unwrap();
        // SAFETY: layout has nonzero size.
        let p = unsafe { RegistryAlloc.alloc(layout) };
        assert!(!p.is_null());
        // SAFETY: p came from RegistryAlloc.alloc(layout).
        unsafe { RegistryAlloc.dealloc(p, layout) };
    }

    #[test]
    fn test_overaligned_realloc_keeps_prefix_and_alignment() {
        let _guard = registry_test_lock();
        let layout = Layout::from_size_align(32, 256).unwrap();
        // SAFETY: layout has nonzero size.
        let p = unsafe { RegistryAlloc.alloc(layout) };
        assert!(!p.is_null());
        assert_eq!(p as usize % 256, 0);
        // SAFETY: p is valid for 32 bytes.
        unsafe { ptr::write_bytes(p, 0x5A, 32) };

        // SAFETY: p came from alloc(layout); 1024 is a valid size for align 256.
        let q = unsafe { RegistryAlloc.realloc(p, layout, 1024) };
        assert!(!q.is_null());
        assert_eq!(q as usize % 256, 0);
        for i in 0..32 {
            // SAFETY: q is valid for 1024 bytes, the first 32 were copied.
            assert_eq!(unsafe { q.add(i).read() }, 0x5A);
        }
        let grown = Layout::from_size_align(1024, 256).unwrap();
        // SAFETY: q is the live block for the grown layout.
        unsafe { RegistryAlloc.dealloc(q, grown) };
    }

    #[test]
    fn test_plain_realloc_shrink() {
        let _guard = registry_test_lock();
        let layout = Layout::from_size_align(512, 16).unwrap();
        // SAFETY: layout has nonzero size.
        let p = unsafe { RegistryAlloc.alloc(layout) };
        assert!(!p.is_null());
        // SAFETY: p came from alloc(layout), shrinking.
        let q = unsafe { RegistryAlloc.realloc(p, layout, 8) };
        assert!(!q.is_null(), "shrink must not fail");
        // SAFETY: q is the live block for the shrunk layout.
        unsafe { RegistryAlloc.dealloc(q, Layout::from_size_align(8, 16).unwrap()) };
    }
}

/*
 * default.rs
 *
 * The allocator the registry falls back to when the application installs
 * none. Thin wrapper around malloc/realloc/free, nothing cached, no state.
 *
 * Size 0 is bumped to 1 so every successful call yields a distinct, freeable
 * pointer - malloc(0) is allowed to return null, we are not.
 */

use core::mem::size_of;
use core::ptr::NonNull;

use crate::allocator::{Allocator, MIN_ALIGN};

/// System allocator - delegates to libc.
///
/// # Thread safety
///
/// Whatever libc's malloc provides: concurrent calls are fine, racing a
/// `free`/`realloc` of the same pointer is not.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAllocator {
    _private: (),
}

impl DefaultAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Allocator for DefaultAllocator {
    #[inline]
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        // SAFETY: malloc is safe to call with any nonzero size and returns
        // MIN_ALIGN-aligned memory or null.
        let p = unsafe { libc::malloc(size.max(1)) };
        NonNull::new(p.cast())
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
        // SAFETY: caller guarantees ptr is null or came from malloc/realloc
        // here. realloc(null, n) acts as malloc(n). new_size is never 0, so
        // the block stays live. On null return libc leaves the old block alone.
        let p = unsafe { libc::realloc(ptr.cast(), new_size.max(1)) };
        NonNull::new(p.cast())
    }

    #[inline]
    unsafe fn free(&self, ptr: *mut u8) {
        // SAFETY: caller guarantees ptr is null or a live block from this
        // allocator. free(null) is a no-op.
        unsafe { libc::free(ptr.cast()) }
    }

    /*
     * native path: malloc already gives MIN_ALIGN, posix_memalign covers the
     * rest. both are released with free(), so free_aligned needs no header
     * and no way of telling the two apart.
     */
    fn alloc_aligned(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        debug_assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
        if align <= MIN_ALIGN {
            return self.alloc(size);
        }
        let mut out: *mut libc::c_void = core::ptr::null_mut();
        // SAFETY: out is a valid place to store the result. align is a power
        // of two and at least MIN_ALIGN, hence a multiple of sizeof(void*) as
        // posix_memalign requires.
        let rc = unsafe {
            libc::posix_memalign(&raw mut out, align.max(size_of::<*mut u8>()), size.max(1))
        };
        if rc == 0 { NonNull::new(out.cast()) } else { None }
    }

    #[inline]
    unsafe fn free_aligned(&self, ptr: *mut u8) {
        // SAFETY: alloc_aligned above only hands out malloc/posix_memalign
        // blocks, both of which free() releases. Null is a no-op.
        unsafe { libc::free(ptr.cast()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_free_sizes() {
        let a = DefaultAllocator::new();
        for size in [0usize, 1, 7, 16, 100, 4096, 1 << 20] {
            let p = a.alloc(size).expect("alloc should succeed");
            assert_eq!(p.as_ptr() as usize % MIN_ALIGN, 0);
            // SAFETY: p came from a.alloc, freed once.
            unsafe { a.free(p.as_ptr()) };
        }
    }

    #[test]
    fn test_zero_size_allocations_are_distinct() {
        let a = DefaultAllocator::new();
        let ptrs: Vec<_> = (0..32).map(|_| a.alloc(0).expect("alloc(0) must not fail")).collect();
        for (i, p) in ptrs.iter().enumerate() {
            for q in &ptrs[i + 1..] {
                assert_ne!(p, q, "live zero-size blocks must not alias");
            }
        }
        for p in ptrs {
            // SAFETY: each p came from a.alloc, freed once.
            unsafe { a.free(p.as_ptr()) };
        }
    }

    #[test]
    fn test_realloc_null_allocates() {
        let a = DefaultAllocator::new();
        // SAFETY: null is accepted by realloc.
        let p = unsafe { a.realloc(core::ptr::null_mut(), 24) }.expect("realloc(null) should allocate");
        // SAFETY: p came from a.realloc, freed once.
        unsafe { a.free(p.as_ptr()) };
    }

    #[test]
    fn test_realloc_to_zero_keeps_block_live() {
        let a = DefaultAllocator::new();
        let p = a.alloc(64).expect("alloc should succeed");
        // SAFETY: p is live from a.alloc.
        let q = unsafe { a.realloc(p.as_ptr(), 0) }.expect("shrink to zero must not fail");
        // SAFETY: q is the live block after realloc, freed once.
        unsafe { a.free(q.as_ptr()) };
    }

    #[test]
    fn test_realloc_grow_preserves_prefix() {
        let a = DefaultAllocator::new();
        let p = a.alloc(16).expect("alloc should succeed");
        // SAFETY: p is valid for 16 bytes.
        unsafe {
            for i in 0..16 {
                p.as_ptr().add(i).write(i as u8);
            }
        }
        // SAFETY: p is live from a.alloc.
        let q = unsafe { a.realloc(p.as_ptr(), 4096) }.expect("grow should succeed");
        for i in 0..16 {
            // SAFETY: q is valid for 4096 bytes, first 16 were preserved.
            assert_eq!(unsafe { q.as_ptr().add(i).read() }, i as u8);
        }
        // SAFETY: q is the live block, freed once.
        unsafe { a.free(q.as_ptr()) };
    }

    #[test]
    fn test_native_aligned_path() {
        let a = DefaultAllocator::new();
        for align in [1usize, 8, 16, 32, 64, 4096] {
            let p = a.alloc_aligned(200, align).expect("aligned alloc should succeed");
            assert_eq!(p.as_ptr() as usize % align, 0, "align {align}");
            // SAFETY: p came from a.alloc_aligned, freed once with free_aligned.
            unsafe { a.free_aligned(p.as_ptr()) };
        }
    }

    #[test]
    fn test_free_null_is_noop() {
        let a = DefaultAllocator::new();
        // SAFETY: null is always accepted.
        unsafe { a.free(core::ptr::null_mut()) };
        // SAFETY: null is always accepted.
        unsafe { a.free_aligned(core::ptr::null_mut()) };
    }
}

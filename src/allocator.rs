/*
 * allocator.rs
 *
 * The capability set every installable allocator provides.
 *
 * Implementors write alloc/realloc/free. The aligned pair has a working
 * default built on top of alloc/free (see aligned.rs), so an allocator that
 * knows nothing about alignment still serves aligned requests correctly.
 * Override it only when the host has a native aligned primitive.
 */

use core::panic::Location;
use core::ptr::NonNull;

use crate::aligned;

/// Alignment every plain `alloc` result satisfies.
///
/// Matches what malloc guarantees on the supported targets: two words.
#[cfg(target_pointer_width = "64")]
pub const MIN_ALIGN: usize = 16;
#[cfg(not(target_pointer_width = "64"))]
pub const MIN_ALIGN: usize = 8;

/// Installable memory allocator.
///
/// One instance at a time is installed in the registry (see
/// [`crate::registry`]), but any number can exist and be used directly.
///
/// # Contract
///
/// - `alloc(0)` returns a valid, distinct, freeable pointer.
/// - Failure is reported as `None`, only when the host is out of memory.
///   Nothing here retries, logs, or unwinds.
/// - Pointers from `alloc`/`alloc_debug`/`realloc` go back through `free`.
///   Pointers from `alloc_aligned` go back through `free_aligned`. Mixing
///   the two is undefined behavior.
///
/// `Send + Sync` because an installed allocator is reachable from every
/// thread in the process.
pub trait Allocator: Send + Sync {
    /// Allocate `size` bytes at [`MIN_ALIGN`].
    fn alloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Same as `alloc`, tagged with the call site.
    ///
    /// The origin is advisory (leak tracking, diagnostics) and never changes
    /// the returned memory. The default discards it.
    fn alloc_debug(&self, size: usize, origin: &'static Location<'static>) -> Option<NonNull<u8>> {
        let _ = origin;
        self.alloc(size)
    }

    /// Resize a block, keeping the leading `min(old, new)` bytes.
    ///
    /// - null `ptr` behaves as `alloc(new_size)`
    /// - `new_size == 0` shrinks to a minimal live block that still needs `free`
    /// - shrinking never fails
    /// - on `None` the original block is untouched and still owned by the caller
    /// - on success the old pointer is invalid unless it equals the new one
    ///
    /// # Safety
    ///
    /// `ptr` is null or a live pointer obtained from this allocator's
    /// `alloc`/`alloc_debug`/`realloc`.
    unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>>;

    /// Release a block. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` is null or a live pointer obtained from this allocator's
    /// `alloc`/`alloc_debug`/`realloc`, not yet freed.
    unsafe fn free(&self, ptr: *mut u8);

    /// Allocate `size` bytes aligned to `align` (a power of two).
    ///
    /// Default: the header-based algorithm over `alloc`, see
    /// [`aligned::alloc_aligned`].
    fn alloc_aligned(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        aligned::alloc_aligned(self, size, align)
    }

    /// Release a block from `alloc_aligned`. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` is null or a live pointer obtained from this allocator's
    /// `alloc_aligned`, not yet freed.
    unsafe fn free_aligned(&self, ptr: *mut u8) {
        // SAFETY: forwarded caller contract - ptr came from our alloc_aligned,
        // which (unless overridden together with this method) is the header
        // algorithm that free_aligned reverses.
        unsafe { aligned::free_aligned(self, ptr) }
    }

    /// Called by [`crate::registry::shutdown`] just before this allocator is
    /// uninstalled. Everything it handed out should be freed by now; the hook
    /// may check that. Advisory only.
    fn on_shutdown(&self) {}
}

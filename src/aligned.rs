/*
 * aligned.rs
 *
 * Aligned allocation synthesized from an allocator that only knows plain
 * alloc/free. The Allocator contract promises MIN_ALIGN from alloc, but the
 * algorithm does not rely on it: it still produces aligned blocks on top of
 * an allocator that breaks that promise and hands out odd addresses.
 *
 * layout of one aligned block:
 *
 *   raw                          user (multiple of align)
 *   |<-- padding -->|<- header ->|<-------- size -------->|
 *                   | raw ptr    |
 *
 * total = size + align - 1 + HEADER_SIZE, so some address in
 * [raw + HEADER_SIZE, raw + HEADER_SIZE + align - 1] is aligned and the
 * block still fits. free_aligned reads raw back from the word just before
 * user and hands it to free.
 *
 * every block from here carries a header, whatever the alignment. that keeps
 * free_aligned unconditional - it never has to guess whether a header exists.
 */

use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use crate::allocator::Allocator;
use crate::error::{AllocError, Result};

/// Bytes reserved in front of every aligned block for the back-reference.
pub const HEADER_SIZE: usize = size_of::<*mut u8>();

/// Power of two, nothing else.
#[inline]
#[must_use]
pub const fn is_valid_alignment(align: usize) -> bool {
    align.is_power_of_two()
}

/* the header word must itself be aligned, so never go below a pointer */
#[inline]
const fn effective_align(align: usize) -> usize {
    if align < align_of::<*mut u8>() {
        align_of::<*mut u8>()
    } else {
        align
    }
}

/// Bytes the aligned path asks the underlying `alloc` for.
///
/// `None` when the arithmetic overflows. `align` must be a power of two.
#[inline]
#[must_use]
pub fn aligned_request_size(size: usize, align: usize) -> Option<usize> {
    let align = effective_align(align);
    size.checked_add(align - 1)?.checked_add(HEADER_SIZE)
}

/// Checked front door: validates `align` and computes the raw request size.
pub fn check_request(size: usize, align: usize) -> Result<usize> {
    if !is_valid_alignment(align) {
        return Err(AllocError::InvalidAlignment(align));
    }
    aligned_request_size(size, align).ok_or(AllocError::SizeOverflow { size, align })
}

/* offset from raw to the first aligned address that leaves room for the header */
#[inline]
fn user_offset(raw_addr: usize, align: usize) -> usize {
    let start = raw_addr + HEADER_SIZE;
    let aligned = (start + (align - 1)) & !(align - 1);
    aligned - raw_addr
}

/// Allocate `size` bytes aligned to `align` using only `a.alloc`.
///
/// Returns `None` if `a.alloc` fails or the request size overflows.
/// Free the result with [`free_aligned`] on the same allocator, never with
/// `free`.
///
/// `align` must be a power of two. That is a caller contract, checked only
/// in debug builds.
pub fn alloc_aligned<A: Allocator + ?Sized>(a: &A, size: usize, align: usize) -> Option<NonNull<u8>> {
    debug_assert!(
        is_valid_alignment(align),
        "alignment {align} is not a power of two"
    );
    let align = effective_align(align);
    let total = aligned_request_size(size, align)?;
    let raw = a.alloc(total)?;

    // SAFETY: raw is a fresh block of `total` bytes, which is enough for the
    // header plus worst-case padding plus `size` (see module comment).
    Some(unsafe { header::place(raw, align) })
}

/// Release a block obtained from [`alloc_aligned`]. Null is a no-op.
///
/// # Safety
///
/// `ptr` is null or a live pointer returned by `alloc_aligned(a, ..)` for
/// this same allocator `a`, not yet freed.
pub unsafe fn free_aligned<A: Allocator + ?Sized>(a: &A, ptr: *mut u8) {
    let Some(user) = NonNull::new(ptr) else {
        return;
    };
    // SAFETY: caller guarantees user came from alloc_aligned, so the word in
    // front of it is the header written by header::place.
    let raw = unsafe { header::recover(user) };
    // SAFETY: raw is the exact pointer a.alloc returned; freed once, here.
    unsafe { a.free(raw.as_ptr()) };
}

/*
 * header encoding. nothing outside this module reads or writes it.
 */
mod header {
    use core::ptr::NonNull;

    use super::user_offset;

    /// Write the back-reference and return the aligned user pointer.
    ///
    /// # Safety
    ///
    /// `raw` is valid for `aligned_request_size(size, align)` bytes and
    /// `align` is an effective alignment (power of two, >= pointer align).
    pub(super) unsafe fn place(raw: NonNull<u8>, align: usize) -> NonNull<u8> {
        let offset = user_offset(raw.as_ptr() as usize, align);
        // SAFETY: offset <= HEADER_SIZE + align - 1, inside the block.
        let user = unsafe { raw.add(offset) };
        // SAFETY: offset >= HEADER_SIZE, so the slot is inside the block, and
        // user is aligned to >= align_of::<*mut u8>() so the slot is too.
        let slot = unsafe { user.cast::<*mut u8>().sub(1) };
        // SAFETY: slot is in bounds, aligned, and owned by us.
        unsafe { slot.write(raw.as_ptr()) };
        user
    }

    /// Read back the pointer `place` stored in front of `user`.
    ///
    /// # Safety
    ///
    /// `user` was returned by `place` and its block is still live.
    pub(super) unsafe fn recover(user: NonNull<u8>) -> NonNull<u8> {
        // SAFETY: same slot place wrote to.
        let slot = unsafe { user.cast::<*mut u8>().sub(1) };
        // SAFETY: slot holds the initialized raw pointer.
        let raw = unsafe { slot.read() };
        // SAFETY: raw came from a successful alloc, never null.
        unsafe { NonNull::new_unchecked(raw) }
    }
}


/* -------------------------------------------------------------------------- */
/*                              kani proofs                                   */
/* -------------------------------------------------------------------------- */

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /*
     * verify the aligned user address always lands inside the raw block with
     * room for the header in front and `size` bytes behind.
     */
    #[kani::proof]
    fn verify_user_offset_in_bounds() {
        let raw: usize = kani::any();
        let shift: u32 = kani::any();
        kani::assume(shift >= 3 && shift <= 12);
        let align = 1usize << shift;
        kani::assume(raw <= usize::MAX - HEADER_SIZE - align);

        let off = user_offset(raw, align);

        kani::assert(off >= HEADER_SIZE, "header must fit before user pointer");
        kani::assert(
            off <= HEADER_SIZE + align - 1,
            "padding never exceeds align - 1",
        );
        kani::assert((raw + off) % align == 0, "user pointer must be aligned");
    }

    /*
     * verify aligned_request_size never wraps: it returns None or a value
     * strictly larger than size.
     */
    #[kani::proof]
    fn verify_request_size_no_wrap() {
        let size: usize = kani::any();
        let shift: u32 = kani::any();
        kani::assume(shift < 16);
        let align = 1usize << shift;

        if let Some(total) = aligned_request_size(size, align) {
            kani::assert(total > size, "request must exceed the user size");
            kani::assert(total - size >= HEADER_SIZE, "request must cover the header");
        }
    }
}

/*
 * boxed.rs
 *
 * AllocBox<T>: a typed owner for one value living in allocator memory.
 *
 * Call sites that want "new T" get it here instead of through a hijacked
 * global operator: allocate from an allocator, construct in place, and on
 * drop destruct then free. The box remembers which allocator it came from,
 * so swapping the registry later doesn't send the free to the wrong place.
 *
 * Types aligned above MIN_ALIGN go through alloc_aligned/free_aligned, the
 * rest through plain alloc/free. The choice depends only on T, so both ends
 * always agree.
 */

use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, align_of, size_of};
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use crate::allocator::{Allocator, MIN_ALIGN};
use crate::construct::{construct_with, destruct};
use crate::error::{AllocError, Result};
use crate::registry;

#[inline]
const fn needs_aligned_path<T>() -> bool {
    align_of::<T>() > MIN_ALIGN
}

pub struct AllocBox<T> {
    ptr: NonNull<T>,
    allocator: &'static dyn Allocator,
    _owns: PhantomData<T>,
}

// SAFETY: AllocBox owns its T exclusively, like Box. The allocator reference
// is &dyn Allocator where Allocator: Sync, so sending it is fine.
unsafe impl<T: Send> Send for AllocBox<T> {}

// SAFETY: &AllocBox<T> only exposes &T.
unsafe impl<T: Sync> Sync for AllocBox<T> {}

impl<T> AllocBox<T> {
    /// Put `value` in memory from the registry's current allocator.
    pub fn try_new(value: T) -> Result<Self> {
        Self::try_new_in(value, registry::current())
    }

    /// Put `value` in memory from `allocator`.
    ///
    /// On out-of-memory `value` is dropped and the error carries the size
    /// and alignment that failed.
    pub fn try_new_in(value: T, allocator: &'static dyn Allocator) -> Result<Self> {
        let (size, align) = (size_of::<T>(), align_of::<T>());
        let raw = if needs_aligned_path::<T>() {
            allocator.alloc_aligned(size, align)
        } else {
            allocator.alloc(size)
        };
        let raw = raw.ok_or(AllocError::OutOfMemory { size, align })?;

        // SAFETY: raw is a fresh block of at least size_of::<T>() bytes,
        // aligned to align_of::<T>() by whichever path produced it.
        let ptr = unsafe { construct_with(raw, || value) };
        Ok(Self {
            ptr,
            allocator,
            _owns: PhantomData,
        })
    }

    /// The allocator that owns this box's memory.
    #[must_use]
    pub fn allocator(this: &Self) -> &'static dyn Allocator {
        this.allocator
    }

    /// Move the value out and give the memory back.
    pub fn into_inner(this: Self) -> T {
        // SAFETY: ptr holds a live T; we read it exactly once and then
        // release the memory without dropping the moved-out value.
        let value = unsafe { this.ptr.read() };
        // SAFETY: the block came from this.allocator and is released once;
        // forget below keeps Drop from releasing it again.
        unsafe { release::<T>(this.allocator, this.ptr) };
        mem::forget(this);
        value
    }
}

/* free with the function matching the one try_new_in allocated with */
unsafe fn release<T>(allocator: &dyn Allocator, ptr: NonNull<T>) {
    let raw = ptr.cast::<u8>().as_ptr();
    if needs_aligned_path::<T>() {
        // SAFETY: T took the aligned path in try_new_in.
        unsafe { allocator.free_aligned(raw) }
    } else {
        // SAFETY: T took the plain path in try_new_in.
        unsafe { allocator.free(raw) }
    }
}

impl<T> Drop for AllocBox<T> {
    fn drop(&mut self) {
        // SAFETY: ptr holds a live T owned by us; dropped once, here.
        unsafe { destruct(self.ptr) };
        // SAFETY: the block came from self.allocator, released once.
        unsafe { release::<T>(self.allocator, self.ptr) };
    }
}

impl<T> Deref for AllocBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: ptr holds a live T for as long as self exists.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for AllocBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: ptr holds a live T and &mut self gives exclusive access.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: fmt::Debug> fmt::Debug for AllocBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

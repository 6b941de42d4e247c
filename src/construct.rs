/*
 * construct.rs
 *
 * Typed object lifetime on top of raw memory. Allocators hand out bytes;
 * these turn bytes into values and values back into bytes. None of them
 * allocate or free - the memory's owner does that separately.
 *
 * The array forms don't roll back. If an initializer panics halfway, the
 * elements before it stay constructed and are never dropped. Callers who
 * care must catch that and destruct the prefix themselves.
 */

use core::ptr::{self, NonNull};

#[inline]
fn check_placement<T>(raw: NonNull<u8>) {
    debug_assert!(
        raw.as_ptr().cast::<T>().is_aligned(),
        "memory at {:p} is not aligned for {}",
        raw,
        core::any::type_name::<T>()
    );
}

/// Move the result of `init` into `raw`, return it typed.
///
/// # Safety
///
/// `raw` is valid for writes of `size_of::<T>()` bytes, aligned for `T`,
/// and holds no live value that still needs dropping.
#[inline]
pub unsafe fn construct_with<T, F>(raw: NonNull<u8>, init: F) -> NonNull<T>
where
    F: FnOnce() -> T,
{
    check_placement::<T>(raw);
    let obj = raw.cast::<T>();
    // SAFETY: caller guarantees obj is valid, aligned and uninhabited.
    unsafe { obj.write(init()) };
    obj
}

/// Default-initialize a `T` in place.
///
/// # Safety
///
/// Same as [`construct_with`].
#[inline]
pub unsafe fn construct<T: Default>(raw: NonNull<u8>) -> NonNull<T> {
    // SAFETY: forwarded caller contract.
    unsafe { construct_with(raw, T::default) }
}

/// Initialize a `T` in place as a copy of `source`.
///
/// # Safety
///
/// Same as [`construct_with`].
#[inline]
pub unsafe fn construct_from<T: Clone>(raw: NonNull<u8>, source: &T) -> NonNull<T> {
    // SAFETY: forwarded caller contract.
    unsafe { construct_with(raw, || source.clone()) }
}

/// Initialize a `T` in place from a value of a related type.
///
/// # Safety
///
/// Same as [`construct_with`].
#[inline]
pub unsafe fn construct_alt<T, S>(raw: NonNull<u8>, source: S) -> NonNull<T>
where
    T: From<S>,
{
    // SAFETY: forwarded caller contract.
    unsafe { construct_with(raw, || T::from(source)) }
}

/// Two-argument form of [`construct_alt`]; `T` builds from the pair.
///
/// # Safety
///
/// Same as [`construct_with`].
#[inline]
pub unsafe fn construct_alt2<T, S1, S2>(raw: NonNull<u8>, first: S1, second: S2) -> NonNull<T>
where
    T: From<(S1, S2)>,
{
    // SAFETY: forwarded caller contract.
    unsafe { construct_with(raw, || T::from((first, second))) }
}

/* shared loop for the array forms, elements written front to back */
unsafe fn construct_each<T>(raw: NonNull<u8>, count: usize, mut init: impl FnMut() -> T) -> NonNull<T> {
    check_placement::<T>(raw);
    let base = raw.cast::<T>();
    for i in 0..count {
        // SAFETY: caller guarantees room for count elements; i < count.
        let slot = unsafe { base.add(i) };
        // SAFETY: slot is in bounds, aligned and holds no live value.
        unsafe { slot.write(init()) };
    }
    base
}

/// Default-initialize `count` contiguous `T`s.
///
/// # Safety
///
/// `raw` is valid for writes of `count * size_of::<T>()` bytes, aligned for
/// `T`, holding no live values.
pub unsafe fn construct_array<T: Default>(raw: NonNull<u8>, count: usize) -> NonNull<T> {
    // SAFETY: forwarded caller contract.
    unsafe { construct_each(raw, count, T::default) }
}

/// Initialize `count` contiguous `T`s, each a copy of `source`.
///
/// # Safety
///
/// Same as [`construct_array`].
pub unsafe fn construct_array_from<T: Clone>(raw: NonNull<u8>, count: usize, source: &T) -> NonNull<T> {
    // SAFETY: forwarded caller contract.
    unsafe { construct_each(raw, count, || source.clone()) }
}

/// Run `T`'s destructor in place. The memory stays allocated.
///
/// # Safety
///
/// `obj` points at a live, initialized `T` that nothing else will drop or use.
#[inline]
pub unsafe fn destruct<T>(obj: NonNull<T>) {
    // SAFETY: caller guarantees a live value with no other owner.
    unsafe { ptr::drop_in_place(obj.as_ptr()) }
}

/// Run the destructors of `count` contiguous `T`s, front to back.
///
/// # Safety
///
/// `obj` points at `count` live, initialized `T`s that nothing else will
/// drop or use.
#[inline]
pub unsafe fn destruct_array<T>(obj: NonNull<T>, count: usize) {
    let slice = ptr::slice_from_raw_parts_mut(obj.as_ptr(), count);
    // SAFETY: caller guarantees count live values with no other owner.
    unsafe { ptr::drop_in_place(slice) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Allocator;
    use crate::default::DefaultAllocator;
    use crate::tracking::{LeakPolicy, TrackingAllocator, TrackingConfig};
    use core::mem::size_of;
    use std::cell::Cell;

    std::thread_local! {
        static BUILT: Cell<usize> = const { Cell::new(0) };
        static DROPPED: Cell<usize> = const { Cell::new(0) };
    }

    fn built() -> usize {
        BUILT.with(Cell::get)
    }

    fn dropped() -> usize {
        DROPPED.with(Cell::get)
    }

    #[derive(Debug, PartialEq)]
    struct Probe {
        tag: u32,
    }

    impl Default for Probe {
        fn default() -> Self {
            BUILT.with(|c| c.set(c.get() + 1));
            Self { tag: 7 }
        }
    }

    impl Clone for Probe {
        fn clone(&self) -> Self {
            BUILT.with(|c| c.set(c.get() + 1));
            Self { tag: self.tag }
        }
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            DROPPED.with(|c| c.set(c.get() + 1));
        }
    }

    impl From<u32> for Probe {
        fn from(tag: u32) -> Self {
            BUILT.with(|c| c.set(c.get() + 1));
            Self { tag }
        }
    }

    impl From<(u16, u16)> for Probe {
        fn from((hi, lo): (u16, u16)) -> Self {
            BUILT.with(|c| c.set(c.get() + 1));
            Self { tag: (u32::from(hi) << 16) | u32::from(lo) }
        }
    }

    #[test]
    fn test_construct_destruct_one_each_no_free() {
        let t = TrackingAllocator::new(DefaultAllocator::new(), TrackingConfig::new(LeakPolicy::Ignore));
        let raw = t.alloc(size_of::<Probe>()).expect("alloc should succeed");

        // SAFETY: raw is fresh, MIN_ALIGN-aligned, large enough for a Probe.
        let obj = unsafe { construct::<Probe>(raw) };
        // SAFETY: obj was just constructed.
        assert_eq!(unsafe { obj.as_ref() }.tag, 7);
        // SAFETY: obj is live and dropped only here.
        unsafe { destruct(obj) };

        assert_eq!((built(), dropped()), (1, 1));
        assert_eq!(t.stats().frees, 0, "destruct must not release memory");

        // SAFETY: raw came from t.alloc.
        unsafe { t.free(raw.as_ptr()) };
        assert!(t.stats().is_balanced());
    }

    #[test]
    fn test_construct_from_copies() {
        let a = DefaultAllocator::new();
        let raw = a.alloc(size_of::<Probe>()).expect("alloc should succeed");
        let source = Probe { tag: 99 };

        // SAFETY: raw is fresh and suitably sized/aligned.
        let obj = unsafe { construct_from(raw, &source) };
        // SAFETY: obj is live.
        assert_eq!(unsafe { obj.as_ref() }, &source);
        // SAFETY: obj is live and dropped only here.
        unsafe { destruct(obj) };
        // SAFETY: raw came from a.alloc.
        unsafe { a.free(raw.as_ptr()) };
    }

    #[test]
    fn test_construct_alt_variants() {
        let a = DefaultAllocator::new();
        let raw = a.alloc(size_of::<Probe>()).expect("alloc should succeed");

        // SAFETY: raw is fresh and suitably sized/aligned.
        let obj: NonNull<Probe> = unsafe { construct_alt(raw, 1234u32) };
        // SAFETY: obj is live.
        assert_eq!(unsafe { obj.as_ref() }.tag, 1234);
        // SAFETY: obj is live and dropped only here; raw is then reusable.
        unsafe { destruct(obj) };

        // SAFETY: raw holds no live value again.
        let obj: NonNull<Probe> = unsafe { construct_alt2(raw, 0x0001u16, 0x0002u16) };
        // SAFETY: obj is live.
        assert_eq!(unsafe { obj.as_ref() }.tag, 0x0001_0002);
        // SAFETY: obj is live and dropped only here.
        unsafe { destruct(obj) };

        assert_eq!((built(), dropped()), (2, 2));
        // SAFETY: raw came from a.alloc.
        unsafe { a.free(raw.as_ptr()) };
    }

    #[test]
    fn test_array_round_trip() {
        let a = DefaultAllocator::new();
        let count = 10;
        let raw = a.alloc(count * size_of::<Probe>()).expect("alloc should succeed");

        // SAFETY: raw is valid for count Probes.
        let arr = unsafe { construct_array::<Probe>(raw, count) };
        // SAFETY: count Probes were just constructed.
        let view = unsafe { core::slice::from_raw_parts(arr.as_ptr(), count) };
        assert!(view.iter().all(|p| p.tag == 7));
        // SAFETY: all count are live and dropped only here.
        unsafe { destruct_array(arr, count) };

        let source = Probe { tag: 3 };
        // SAFETY: raw holds no live values again.
        let arr = unsafe { construct_array_from(raw, count, &source) };
        // SAFETY: count Probes were just constructed.
        let view = unsafe { core::slice::from_raw_parts(arr.as_ptr(), count) };
        assert!(view.iter().all(|p| p.tag == 3));
        // SAFETY: all count are live and dropped only here.
        unsafe { destruct_array(arr, count) };

        assert_eq!((built(), dropped()), (2 * count, 2 * count));
        // SAFETY: raw came from a.alloc.
        unsafe { a.free(raw.as_ptr()) };
    }

    #[test]
    fn test_array_no_rollback_on_panic() {
        struct Fragile;
        std::thread_local! {
            static MADE: Cell<usize> = const { Cell::new(0) };
        }
        impl Default for Fragile {
            fn default() -> Self {
                let n = MADE.with(|c| {
                    c.set(c.get() + 1);
                    c.get()
                });
                assert!(n < 3, "third element refuses to build");
                Fragile
            }
        }
        impl Drop for Fragile {
            fn drop(&mut self) {
                DROPPED.with(|c| c.set(c.get() + 1));
            }
        }

        let a = DefaultAllocator::new();
        let raw = a.alloc(5 * size_of::<u64>()).expect("alloc should succeed");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            // SAFETY: raw is large enough for 5 ZST Fragiles.
            unsafe { construct_array::<Fragile>(raw, 5) };
        }));
        assert!(result.is_err());
        assert_eq!(MADE.with(Cell::get), 3);
        assert_eq!(dropped(), 0, "constructed prefix is left alone");

        // SAFETY: raw came from a.alloc.
        unsafe { a.free(raw.as_ptr()) };
    }

    #[test]
    fn test_zero_count_is_noop() {
        let a = DefaultAllocator::new();
        let raw = a.alloc(0).expect("alloc(0) must succeed");
        // SAFETY: zero elements need zero bytes.
        let arr = unsafe { construct_array::<Probe>(raw, 0) };
        // SAFETY: zero elements to drop.
        unsafe { destruct_array(arr, 0) };
        assert_eq!((built(), dropped()), (0, 0));
        // SAFETY: raw came from a.alloc.
        unsafe { a.free(raw.as_ptr()) };
    }
}

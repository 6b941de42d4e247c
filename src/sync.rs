/*
 * sync.rs
 *
 * Lock-free one-time initialization for the lazy default allocator.
 *
 * Can't use std::sync::OnceLock (no_std) and can't use anything that might
 * allocate or park on a heap-backed wait queue: this runs on the very first
 * allocation of the process, possibly from inside the global allocator.
 * So: one atomic state byte and a spin wait for the loser of the race.
 */

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

/* state machine: EMPTY -> BUILDING -> READY, never backwards */
const EMPTY: u8 = 0;
const BUILDING: u8 = 1;
const READY: u8 = 2;

/// A value built at most once, on first request, visible to every thread.
///
/// # Safety Invariants
///
/// - `EMPTY`: value is None, the thread that wins EMPTY -> BUILDING may write
/// - `BUILDING`: exactly one thread is writing, everyone else spins
/// - `READY`: value is Some and never written again
///
/// Memory ordering:
/// - the builder stores `READY` with `Release` after writing the value
/// - readers load the state with `Acquire` before touching the value
pub struct AtomicOnce<T> {
    state: AtomicU8,
    value: UnsafeCell<Option<T>>,
}

// SAFETY: the value is only written by the single thread that won the
// EMPTY -> BUILDING CAS and only read after an Acquire load observes READY,
// which pairs with the builder's Release store. After READY it is immutable,
// so shared &T across threads needs T: Sync, and building on one thread and
// reading on another needs T: Send.
unsafe impl<T: Send + Sync> Sync for AtomicOnce<T> {}

// SAFETY: moving the cell moves the Option<T>, fine when T: Send.
unsafe impl<T: Send> Send for AtomicOnce<T> {}

impl<T> AtomicOnce<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(None),
        }
    }

    /// The value, if some thread already finished building it.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // SAFETY: READY observed with Acquire, which synchronizes with
            // the builder's Release store; the value is immutable from here on.
            unsafe { (*self.value.get()).as_ref() }
        } else {
            None
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Return the value, building it with `f` if nobody has yet.
    ///
    /// Under concurrent first use exactly one caller runs `f`; the others
    /// wait for it and all get the same `&T`.
    #[inline]
    pub fn get_or_init<F>(&self, f: F) -> &T
    where
        F: FnOnce() -> T,
    {
        if let Some(v) = self.get() {
            return v;
        }
        self.build_slow(f)
    }

    #[cold]
    fn build_slow<F>(&self, f: F) -> &T
    where
        F: FnOnce() -> T,
    {
        match self
            .state
            .compare_exchange(EMPTY, BUILDING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                let value = f();
                // SAFETY: we won the CAS, so we are the only writer and no
                // reader looks at the value until READY is published below.
                unsafe {
                    *self.value.get() = Some(value);
                }
                self.state.store(READY, Ordering::Release);
            }
            Err(BUILDING) => {
                while self.state.load(Ordering::Acquire) == BUILDING {
                    core::hint::spin_loop();
                }
            }
            Err(_) => { /* READY - lost the race to a finished builder */ }
        }

        // SAFETY: state is READY here (we published it, or spun until the
        // winner did, with Acquire). READY implies Some and immutability.
        #[allow(clippy::multiple_unsafe_ops_per_block)]
        let value = unsafe { (*self.value.get()).as_ref().unwrap_unchecked() };
        value
    }
}

impl<T> Default for AtomicOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}


/* -------------------------------------------------------------------------- */
/*                              kani proofs                                   */
/* -------------------------------------------------------------------------- */

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /*
     * verify a fresh cell is EMPTY and get_or_init leaves it READY with the
     * built value.
     */
    #[kani::proof]
    fn verify_build_publishes_value() {
        let cell: AtomicOnce<u32> = AtomicOnce::new();
        let value: u32 = kani::any();

        kani::assert(cell.state.load(Ordering::Acquire) == EMPTY, "new cell should be EMPTY");
        let got = *cell.get_or_init(|| value);
        kani::assert(got == value, "get_or_init should return the built value");
        kani::assert(
            cell.state.load(Ordering::Acquire) == READY,
            "state should be READY after build",
        );
    }

    /*
     * verify a second get_or_init returns the first value and never runs its
     * closure, whatever the two candidate values are.
     */
    #[kani::proof]
    fn verify_second_init_never_runs() {
        let cell: AtomicOnce<u32> = AtomicOnce::new();
        let first: u32 = kani::any();
        let second: u32 = kani::any();
        let mut second_ran = false;

        let a = *cell.get_or_init(|| first);
        let b = *cell.get_or_init(|| {
            second_ran = true;
            second
        });

        kani::assert(!second_ran, "second closure must not run");
        kani::assert(a == first && b == first, "both calls see the first value");
        kani::assert(cell.get() == Some(&first), "get agrees with get_or_init");
    }
}

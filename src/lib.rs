/*
 * lib.rs
 *
 * One installable allocator per process, a libc default behind it, and
 * aligned allocation that works on top of any allocator.
 *
 * no_std: this sits underneath everything else, including (optionally) the
 * Rust global allocator, so it can't lean on std or on alloc.
 */

//! # allocswap
//!
//! A process-wide, replaceable memory allocator.
//!
//! - [`Allocator`]: the capability set (alloc, realloc, free, aligned pair)
//! - [`DefaultAllocator`]: libc malloc, used when nothing else is installed
//! - [`registry`]: install/uninstall and the lazy default
//! - [`construct`]: typed values in raw memory
//! - [`AllocBox`]: owning box over any installed or local allocator
//! - [`RegistryAlloc`]: `GlobalAlloc` adapter over the registry
//!
//! ## Quick Start
//!
//! ```rust
//! use allocswap::registry;
//!
//! // nothing installed: the default allocator is set up on first use
//! let p = registry::alloc(64).expect("out of memory");
//! unsafe { registry::free(p.as_ptr()) };
//!
//! let q = registry::alloc_aligned(100, 64).expect("out of memory");
//! assert_eq!(q.as_ptr() as usize % 64, 0);
//! unsafe { registry::free_aligned(q.as_ptr()) };
//! ```

#![cfg_attr(not(test), no_std)]

pub mod aligned;
pub mod allocator;
pub mod boxed;
pub mod construct;
pub mod default;
pub mod error;
pub mod global;
pub mod io;
pub mod registry;
pub mod sync;
pub mod tracking;

pub use allocator::{Allocator, MIN_ALIGN};
pub use boxed::AllocBox;
pub use default::DefaultAllocator;
pub use error::{AllocError, Result};
pub use global::RegistryAlloc;
pub use registry::Registration;
pub use tracking::{LeakPolicy, TrackingAllocator, TrackingConfig, TrackingStats};

/* unit tests that touch the process-wide slot take turns */
#[cfg(test)]
static REGISTRY_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
pub(crate) fn registry_test_lock() -> std::sync::MutexGuard<'static, ()> {
    REGISTRY_TEST_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

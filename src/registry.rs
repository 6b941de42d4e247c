/*
 * registry.rs
 *
 * The process-wide slot holding the installed allocator.
 *
 * Two states: Empty (null) and Installed (points at a 'static Registration).
 * The slot is a single AtomicPtr, so lookups are one Acquire load and never
 * block. A Registration is a thin 'static wrapper around &dyn Allocator -
 * trait object references are two words and can't live in an AtomicPtr.
 *
 * Install once at startup, before other code allocates. Uninstall (or
 * shutdown) once at the end. Anything allocated through the registry must be
 * freed before the allocator that produced it is swapped out.
 *
 * If nobody installs anything, the first lookup installs the default
 * allocator. That default is built exactly once per process, even if a
 * hundred threads hit the lazy path at the same time.
 */

use core::panic::Location;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::allocator::Allocator;
use crate::default::DefaultAllocator;
use crate::error::{AllocError, Result};
use crate::sync::AtomicOnce;

/// A `'static` handle the registry can point at.
///
/// ```
/// use allocswap::registry::{self, Registration};
/// use allocswap::DefaultAllocator;
///
/// static MINE: DefaultAllocator = DefaultAllocator::new();
/// static MINE_REG: Registration = Registration::new(&MINE);
///
/// registry::install(&MINE_REG);
/// let p = registry::alloc(100).expect("alloc");
/// unsafe { registry::free(p.as_ptr()) };
/// registry::uninstall();
/// ```
pub struct Registration {
    allocator: &'static dyn Allocator,
}

impl Registration {
    #[must_use]
    pub const fn new(allocator: &'static dyn Allocator) -> Self {
        Self { allocator }
    }

    #[inline]
    #[must_use]
    pub fn allocator(&self) -> &'static dyn Allocator {
        self.allocator
    }
}

/* Empty = null, Installed = &'static Registration */
static INSTALLED: AtomicPtr<Registration> = AtomicPtr::new(ptr::null_mut());

static DEFAULT_ALLOCATOR: AtomicOnce<DefaultAllocator> = AtomicOnce::new();
static DEFAULT_REGISTRATION: AtomicOnce<Registration> = AtomicOnce::new();
static DEFAULT_BUILDS: AtomicUsize = AtomicUsize::new(0);

#[inline]
fn as_slot(reg: &'static Registration) -> *mut Registration {
    ptr::from_ref(reg).cast_mut()
}

#[inline]
fn load() -> Option<&'static Registration> {
    let p = INSTALLED.load(Ordering::Acquire);
    // SAFETY: the slot only ever holds null or a pointer derived from a
    // &'static Registration (see as_slot). 'static data never dangles and we
    // never write through it.
    unsafe { p.as_ref() }
}

fn default_registration() -> &'static Registration {
    DEFAULT_REGISTRATION.get_or_init(|| Registration::new(default_allocator()))
}

/// Install `reg` as the process allocator. Empty -> Installed.
///
/// Re-installing the registration that is already installed is a no-op.
///
/// # Panics
///
/// If a different allocator is installed. Uninstall it first.
#[track_caller]
pub fn install(reg: &'static Registration) {
    if let Err(err) = try_install(reg) {
        panic!("{err}");
    }
}

/// [`install`] that reports a conflict instead of panicking.
pub fn try_install(reg: &'static Registration) -> Result<()> {
    match INSTALLED.compare_exchange(
        ptr::null_mut(),
        as_slot(reg),
        Ordering::AcqRel,
        Ordering::Acquire,
    ) {
        Ok(_) => Ok(()),
        Err(current) if ptr::eq(current, reg) => Ok(()),
        Err(_) => Err(AllocError::AlreadyInstalled),
    }
}

/// Installed -> Empty. Returns what was installed, if anything.
///
/// The next [`current`] call falls back to the default allocator.
pub fn uninstall() -> Option<&'static Registration> {
    let prev = INSTALLED.swap(ptr::null_mut(), Ordering::AcqRel);
    // SAFETY: same invariant as load(): null or a &'static Registration.
    unsafe { prev.as_ref() }
}

/// Install `Some(reg)` or uninstall on `None`.
#[track_caller]
pub fn set_instance(reg: Option<&'static Registration>) {
    match reg {
        Some(reg) => install(reg),
        None => {
            uninstall();
        }
    }
}

/// Orderly teardown: uninstall the current allocator, then notify it.
///
/// Returns the registration that was shut down, if any. The slot is cleared
/// first, so the allocator notified is always the one that was removed.
///
/// No allocation through the registry is allowed after this. A later
/// [`current`] would quietly install the default allocator again.
pub fn shutdown() -> Option<&'static Registration> {
    let reg = uninstall()?;
    reg.allocator.on_shutdown();
    Some(reg)
}

/// The installed allocator, without the lazy default fallback.
#[inline]
#[must_use]
pub fn installed() -> Option<&'static dyn Allocator> {
    load().map(Registration::allocator)
}

/// The current allocator. Installs the default one if the slot is empty.
#[inline]
#[must_use]
pub fn current() -> &'static dyn Allocator {
    match load() {
        Some(reg) => reg.allocator,
        None => install_default(),
    }
}

#[cold]
fn install_default() -> &'static dyn Allocator {
    let reg = default_registration();
    match INSTALLED.compare_exchange(
        ptr::null_mut(),
        as_slot(reg),
        Ordering::AcqRel,
        Ordering::Acquire,
    ) {
        Ok(_) => reg.allocator,
        Err(winner) => {
            /* someone installed first (another lazy caller or the app) - use theirs */
            // SAFETY: non-null slot values are always &'static Registration.
            unsafe { &*winner }.allocator
        }
    }
}

/// The default allocator instance, built on first call. Does not install it.
#[must_use]
pub fn default_allocator() -> &'static DefaultAllocator {
    DEFAULT_ALLOCATOR.get_or_init(|| {
        DEFAULT_BUILDS.fetch_add(1, Ordering::Relaxed);
        DefaultAllocator::new()
    })
}

/// How many times the default allocator has been constructed. At most 1.
#[must_use]
pub fn default_init_count() -> usize {
    DEFAULT_BUILDS.load(Ordering::Relaxed)
}

/// Identity check for allocator references (same instance, not same type).
#[inline]
#[must_use]
pub fn same_allocator(a: &dyn Allocator, b: &dyn Allocator) -> bool {
    ptr::addr_eq(a, b)
}

/* -------------------------------------------------------------------------- */
/*                 entry points routed through current()                      */
/* -------------------------------------------------------------------------- */

/// Allocate through the current allocator.
///
/// Debug builds tag the request with the caller's location via
/// `alloc_debug`; release builds call `alloc` directly.
#[inline]
#[track_caller]
pub fn alloc(size: usize) -> Option<NonNull<u8>> {
    #[cfg(debug_assertions)]
    {
        current().alloc_debug(size, Location::caller())
    }
    #[cfg(not(debug_assertions))]
    {
        current().alloc(size)
    }
}

/// Allocate through the current allocator with an explicit origin.
#[inline]
pub fn alloc_debug(size: usize, origin: &'static Location<'static>) -> Option<NonNull<u8>> {
    current().alloc_debug(size, origin)
}

/// # Safety
///
/// `ptr` is null or a live block from this module's `alloc`/`alloc_debug`/
/// `realloc`, and the same allocator is still installed.
#[inline]
pub unsafe fn realloc(ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
    // SAFETY: forwarded caller contract.
    unsafe { current().realloc(ptr, new_size) }
}

/// # Safety
///
/// `ptr` is null or a live block from this module's `alloc`/`alloc_debug`/
/// `realloc`, and the same allocator is still installed.
#[inline]
pub unsafe fn free(ptr: *mut u8) {
    // SAFETY: forwarded caller contract.
    unsafe { current().free(ptr) }
}

#[inline]
pub fn alloc_aligned(size: usize, align: usize) -> Option<NonNull<u8>> {
    current().alloc_aligned(size, align)
}

/// # Safety
///
/// `ptr` is null or a live block from this module's `alloc_aligned`, and the
/// same allocator is still installed.
#[inline]
pub unsafe fn free_aligned(ptr: *mut u8) {
    // SAFETY: forwarded caller contract.
    unsafe { current().free_aligned(ptr) }
}

/*
 * error.rs
 *
 * The raw allocator surface reports failure as None, never as an error.
 * These are for the checked entry points only: try_install, check_request,
 * AllocBox::try_new. Contract violations are bugs and panic instead.
 */

use core::fmt;

/* everything a checked entry point can report */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    OutOfMemory { size: usize, align: usize },
    InvalidAlignment(usize), // not a power of two
    SizeOverflow { size: usize, align: usize },
    AlreadyInstalled, // a different allocator holds the registry slot
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { size, align } => {
                write!(f, "out of memory: {size} bytes (align {align})")
            }
            Self::InvalidAlignment(align) => {
                write!(f, "invalid alignment: {align} is not a power of two")
            }
            Self::SizeOverflow { size, align } => {
                write!(f, "allocation size overflow: {size} bytes (align {align})")
            }
            Self::AlreadyInstalled => {
                write!(f, "another allocator is already installed; uninstall it first")
            }
        }
    }
}

impl AllocError {
    /* only OutOfMemory is environmental; the rest are caller bugs */
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

pub type Result<T> = core::result::Result<T, AllocError>;

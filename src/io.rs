/*
 * io.rs
 *
 * Diagnostics to stderr via libc::write.
 *
 * Allocator code can't use std's eprintln: it may lock, it may allocate, and
 * the thing it would allocate from is us. Formatting happens through
 * core::fmt straight into write(2), one syscall per fragment, no buffer.
 */

use core::fmt::{self, Write};

const STDERR: libc::c_int = 2;

/// Write bytes to stderr. Short writes and errors are ignored.
#[inline]
pub fn write_stderr(s: &[u8]) {
    // SAFETY: s is a valid byte slice for s.len() bytes; fd 2 may be closed,
    // in which case write just fails with EBADF.
    unsafe {
        libc::write(STDERR, s.as_ptr().cast(), s.len());
    }
}

#[inline]
pub fn eprint_str(s: &str) {
    write_stderr(s.as_bytes());
}

/// `core::fmt::Write` sink for stderr, for use with `write!`.
pub struct StderrWriter;

impl Write for StderrWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_stderr(s.as_bytes());
        Ok(())
    }
}

/// Diagnostic fragment to stderr, no prefix and no newline.
#[macro_export]
macro_rules! diag {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::io::StderrWriter, $($arg)*);
    }};
}

/// Diagnostic line to stderr, prefixed with the crate name.
#[macro_export]
macro_rules! diagln {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        $crate::io::eprint_str("allocswap: ");
        let _ = write!($crate::io::StderrWriter, $($arg)*);
        $crate::io::write_stderr(b"\n");
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_stderr() {
        /* just verify it doesn't crash */
        write_stderr(b"test stderr write\n");
    }

    #[test]
    fn test_writer_fmt() {
        let mut w = StderrWriter;
        assert!(writeln!(w, "formatted: {} + {} = {}", 1, 2, 3).is_ok());
    }

    #[test]
    fn test_diag_macro() {
        crate::diag!("partial {}", 1);
        crate::diag!(" and rest\n");
    }

    #[test]
    fn test_diagln_macro() {
        crate::diagln!("diagnostic {} of {}", 1, 2);
    }
}

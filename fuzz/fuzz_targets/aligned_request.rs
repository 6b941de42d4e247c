/*
 * fuzz_targets/aligned_request.rs
 *
 * fuzz target for the aligned-request arithmetic. check_request must never
 * panic or wrap, whatever size/align pair it gets, and agree with
 * aligned_request_size on every valid alignment.
 *
 * edge cases: align 0, non-powers of two, size near usize::MAX
 */

#![no_main]

use allocswap::AllocError;
use allocswap::aligned::{HEADER_SIZE, aligned_request_size, check_request, is_valid_alignment};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (usize, usize)| {
    let (size, align) = input;
    match check_request(size, align) {
        Ok(total) => {
            assert!(is_valid_alignment(align));
            assert_eq!(Some(total), aligned_request_size(size, align));
            assert!(total >= size + HEADER_SIZE);
        }
        Err(AllocError::InvalidAlignment(a)) => {
            assert_eq!(a, align);
            assert!(!is_valid_alignment(align));
        }
        Err(AllocError::SizeOverflow { .. }) => {
            assert!(is_valid_alignment(align));
            assert!(aligned_request_size(size, align).is_none());
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
});

/*
 * fuzz_targets/alloc_sequence.rs
 *
 * fuzz target for alloc/realloc/free/aligned sequences on a tracking
 * allocator. each live block is filled with a per-block byte and checked
 * before it is resized or freed, so corruption from a bad header or a wrong
 * realloc copy shows up as a panic. at the end the counters must balance.
 *
 * input: 4-byte chunks [op, size_lo, size_hi, arg]
 */

#![no_main]

use core::ptr::NonNull;

use allocswap::{Allocator, DefaultAllocator, LeakPolicy, TrackingAllocator, TrackingConfig};
use libfuzzer_sys::fuzz_target;

struct Block {
    ptr: NonNull<u8>,
    len: usize,
    tag: u8,
    aligned: bool,
}

fn stamp(b: &Block) {
    // SAFETY: b.ptr is valid for b.len bytes.
    unsafe { core::ptr::write_bytes(b.ptr.as_ptr(), b.tag, b.len) };
}

fn verify(b: &Block, len: usize) {
    for i in 0..len.min(b.len) {
        // SAFETY: i < b.len, inside the block.
        let v = unsafe { b.ptr.as_ptr().add(i).read() };
        assert_eq!(v, b.tag, "block contents corrupted");
    }
}

fn release(t: &TrackingAllocator<DefaultAllocator>, b: Block) {
    verify(&b, b.len);
    if b.aligned {
        // SAFETY: aligned blocks came from t.alloc_aligned.
        unsafe { t.free_aligned(b.ptr.as_ptr()) };
    } else {
        // SAFETY: plain blocks came from t.alloc/t.realloc.
        unsafe { t.free(b.ptr.as_ptr()) };
    }
}

fuzz_target!(|data: &[u8]| {
    let t = TrackingAllocator::new(DefaultAllocator::new(), TrackingConfig::new(LeakPolicy::Ignore));
    let mut live: Vec<Block> = Vec::new();

    for chunk in data.chunks_exact(4) {
        let size = usize::from(u16::from_le_bytes([chunk[1], chunk[2]]));
        let arg = chunk[3];

        match chunk[0] % 4 {
            0 => {
                if let Some(ptr) = t.alloc(size) {
                    let b = Block { ptr, len: size, tag: arg, aligned: false };
                    stamp(&b);
                    live.push(b);
                }
            }
            1 => {
                let align = 1usize << (arg % 13);
                if let Some(ptr) = t.alloc_aligned(size, align) {
                    assert_eq!(ptr.as_ptr() as usize % align, 0, "misaligned block");
                    let b = Block { ptr, len: size, tag: arg, aligned: true };
                    stamp(&b);
                    live.push(b);
                }
            }
            2 => {
                if live.is_empty() {
                    continue;
                }
                let idx = usize::from(arg) % live.len();
                if live[idx].aligned {
                    continue;
                }
                verify(&live[idx], live[idx].len);
                /* on failure the old block stays valid and stays in `live` */
                // SAFETY: live[idx] is a plain block owned by us.
                if let Some(ptr) = unsafe { t.realloc(live[idx].ptr.as_ptr(), size) } {
                    let old = &live[idx];
                    let b = Block { ptr, len: size, tag: old.tag, aligned: false };
                    verify(&b, old.len);
                    stamp(&b);
                    live[idx] = b;
                }
            }
            _ => {
                if !live.is_empty() {
                    let b = live.swap_remove(usize::from(arg) % live.len());
                    release(&t, b);
                }
            }
        }
    }

    for b in live {
        release(&t, b);
    }
    assert!(t.stats().is_balanced(), "allocations leaked");
});

//! Non-temporal aligned block copy (§4.1 "Block copy (the inner kernel)").
//!
//! Ported from `custom_memcpy.h`'s `avx2_stream_copy_zero`: sixteen 256-bit
//! `vmovntdqa` loads paired with sixteen `vmovntdq` stores per 512-byte
//! iteration. The source and destination must both be 4 KiB-aligned and
//! `len` a multiple of 512 bytes — both hold by construction, since period
//! sizes in [`super::sizing`] are always powers of two at least that large.
//! Platforms without AVX2 fall back to an ordinary aligned copy; per §4.1
//! this trades throughput for correctness, not bit-identical output —
//! non-temporal vs. temporal stores are observationally identical once
//! the buffer lands in RAM.

use std::arch::x86_64::{__m256i, _mm256_stream_load_si256, _mm256_stream_si256, _mm_sfence};

const CHUNK_BYTES: usize = 512;
const LANES_PER_CHUNK: usize = CHUNK_BYTES / 32; // 16 lanes of 32 bytes (ymm)

/// Copy `len` bytes from `src` to `dst`, both assumed 4 KiB-aligned, using
/// non-temporal stores when AVX2 is available at runtime.
///
/// # Safety
/// `src` and `dst` must each be valid for `len` bytes, non-overlapping, and
/// 32-byte aligned (4 KiB in practice, per the streamer's allocation).
pub unsafe fn copy_period(dst: *mut u8, src: *const u8, len: usize) {
    debug_assert_eq!(len % CHUNK_BYTES, 0, "period length must be a 512-byte multiple");
    debug_assert_eq!(dst as usize % 32, 0, "destination must be 32-byte aligned");
    debug_assert_eq!(src as usize % 32, 0, "source must be 32-byte aligned");

    if is_x86_feature_detected!("avx2") {
        copy_avx2(dst, src, len);
    } else {
        copy_fallback(dst, src, len);
    }
}

/// A single store fence, issued once before the initial two-period commit
/// (§5 "Ordering guarantees") — not required between iterations within or
/// across periods afterward.
#[inline]
pub fn store_fence() {
    unsafe { _mm_sfence() };
}

#[target_feature(enable = "avx2")]
unsafe fn copy_avx2(dst: *mut u8, src: *const u8, len: usize) {
    let mut s = src as *const __m256i;
    let mut d = dst as *mut __m256i;
    let chunks = len / CHUNK_BYTES;

    for _ in 0..chunks {
        let mut lanes: [__m256i; LANES_PER_CHUNK] = std::mem::zeroed();
        for (i, lane) in lanes.iter_mut().enumerate() {
            *lane = _mm256_stream_load_si256(s.add(i));
        }
        for (i, lane) in lanes.iter().enumerate() {
            _mm256_stream_si256(d.add(i), *lane);
        }
        s = s.add(LANES_PER_CHUNK);
        d = d.add(LANES_PER_CHUNK);
    }
}

unsafe fn copy_fallback(dst: *mut u8, src: *const u8, len: usize) {
    std::ptr::copy_nonoverlapping(src, dst, len);
}

#[cfg(test)]
mod test {
    use super::*;

    #[repr(align(32))]
    struct Aligned([u8; 1024]);

    #[test]
    fn copies_full_period_correctly() {
        let mut src = Aligned([0u8; 1024]);
        for (i, b) in src.0.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let mut dst = Aligned([0u8; 1024]);

        unsafe { copy_period(dst.0.as_mut_ptr(), src.0.as_ptr(), 1024) };
        assert_eq!(src.0, dst.0);
    }

    #[test]
    fn fallback_path_matches_source() {
        let mut src = Aligned([0u8; 512]);
        for (i, b) in src.0.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut dst = Aligned([0u8; 512]);
        unsafe { copy_fallback(dst.0.as_mut_ptr(), src.0.as_ptr(), 512) };
        assert_eq!(src.0, dst.0);
    }
}

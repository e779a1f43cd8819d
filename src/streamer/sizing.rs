//! Period/buffer sizing formula (§4.1 "Chosen operating point").
//!
//! A base 524 288-byte buffer, halved at 16-bit depth and doubled at
//! sample rates ≥ 88 000 Hz, split into exactly two periods. This departs
//! from the original's fixed `RING_BUFFER_SIZE_VAL`/`PERIOD_SIZE_VAL`
//! constants (4096*4 frames regardless of format), tying sizing to the
//! target format instead of hardcoding one operating point.

const BASE_BUFFER_BYTES: u64 = 524_288;
const HIGH_RATE_THRESHOLD: u32 = 88_000;

#[derive(Debug, Clone, Copy)]
pub struct Sizes {
    pub frame_bytes: u32,
    pub period_frames: u64,
    pub buffer_frames: u64,
}

impl Sizes {
    pub fn period_bytes(&self) -> u64 {
        self.period_frames * self.frame_bytes as u64
    }
}

/// Derive period/buffer sizing for exactly 2 channels at `bit_depth`
/// (16 or 32) and `sample_rate`.
pub fn compute(bit_depth: u16, sample_rate: u32) -> Sizes {
    let mut buffer_bytes = BASE_BUFFER_BYTES;
    if bit_depth == 16 {
        buffer_bytes /= 2;
    }
    if sample_rate >= HIGH_RATE_THRESHOLD {
        buffer_bytes *= 2;
    }

    let frame_bytes = 2 * (bit_depth as u32 / 8);
    let period_bytes = buffer_bytes / 2;
    let period_frames = period_bytes / frame_bytes as u64;

    Sizes { frame_bytes, period_frames, buffer_frames: period_frames * 2 }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn base_point_32bit_low_rate() {
        let s = compute(32, 48_000);
        assert_eq!(s.frame_bytes, 8);
        assert_eq!(s.period_bytes(), 524_288 / 2);
        assert_eq!(s.buffer_frames, s.period_frames * 2);
    }

    #[test]
    fn sixteen_bit_halves_the_buffer() {
        let s32 = compute(32, 48_000);
        let s16 = compute(16, 48_000);
        assert_eq!(s16.period_bytes() * 2, s32.period_bytes());
    }

    #[test]
    fn high_rate_doubles_the_buffer() {
        let low = compute(32, 48_000);
        let high = compute(32, 96_000);
        assert_eq!(high.period_bytes(), low.period_bytes() * 2);
    }
}

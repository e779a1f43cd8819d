//! Sample-rate conversion (§4.2 D) via `rubato`'s sinc resampler — the
//! in-process equivalent of `qua_post_process`'s `sox ... rate -v` pass,
//! `-v` there meaning sox's own high-quality ("very") filter, which is why
//! we reach for a windowed-sinc resampler rather than linear interpolation.
//!
//! Operates on whole buffers (the post-processor already has the entire
//! decoded file in memory), so a single one-shot `process` call replaces
//! rodio's streaming `RubatoResample` iterator.

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::error::{Error, Result};

/// Resample interleaved `samples` (`channels` per frame, native `bits`-depth
/// integers) from `from_rate` to `to_rate`. A no-op when the rates match.
pub fn resample(
    samples: &[i32],
    channels: u16,
    from_rate: u32,
    to_rate: u32,
    bits_per_sample: u16,
) -> Result<Vec<i32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let channels = channels as usize;
    let frames = samples.len() / channels;
    let scale = (1i64 << (bits_per_sample.saturating_sub(1))) as f64;

    let mut deinterleaved: Vec<Vec<f64>> = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (c, &s) in frame.iter().enumerate() {
            deinterleaved[c].push(s as f64 / scale);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f64>::new(ratio, 2.0, params, frames, channels)
        .map_err(|e| Error::Runtime(format!("resampler init failed: {e}")))?;

    let output = resampler
        .process(&deinterleaved, None)
        .map_err(|e| Error::Runtime(format!("resample failed: {e}")))?;

    let out_frames = output.first().map_or(0, Vec::len);
    let mut interleaved = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        for chan in &output {
            let v = (chan[i] * scale).round().clamp(i32::MIN as f64, i32::MAX as f64);
            interleaved.push(v as i32);
        }
    }
    Ok(interleaved)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_rate_is_identity() {
        let samples = vec![1, 2, 3, 4];
        assert_eq!(resample(&samples, 2, 48_000, 48_000, 16).unwrap(), samples);
    }

    #[test]
    fn upsampling_roughly_preserves_duration_ratio() {
        let frames = 4_800usize;
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let v = ((i as f64 / frames as f64 * std::f64::consts::TAU).sin() * 10_000.0) as i32;
            samples.push(v);
            samples.push(v);
        }
        let out = resample(&samples, 2, 48_000, 96_000, 16).unwrap();
        let out_frames = out.len() / 2;
        // sinc resamplers carry filter-delay padding, so allow generous slack
        assert!(out_frames > frames, "expected roughly double the frames, got {out_frames}");
    }
}

//! Post-processing: channel remap, resample, bit-depth requantization
//! (§4.2 D), grounded in `qua-post-processing.c`'s `qua_post_process` but
//! done in-process rather than by shelling out to `sox`, since the decoder
//! already hands us raw samples (or a WAV we can read straight back) and
//! `rubato` covers the one piece `sox` was doing that stdlib can't.
//!
//! Channel-remap coefficients are ported byte-for-byte from the same file's
//! `remix 1,3v0.707,5v0.707` / `2,3v0.707,6v0.707` sox arguments.

pub mod channels;
pub mod requantize;
pub mod resample;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::config::TargetPolicy;
use crate::decoder::wav_header::{self, WavInfo};
use crate::error::{Error, Result};

/// Whether the post-processor needs to touch this stream at all, per §4.2 D.
pub fn needs_processing(channels: u16, bits_per_sample: u16, sample_rate: u32, target_bit_depth: u32, target_sample_rate: u32) -> bool {
    channels != 2 || bits_per_sample as u32 != target_bit_depth || sample_rate != target_sample_rate
}

/// Post-process the PCM WAV at `path` in place against `target`: remap
/// channels, resample, requantize bit depth, then rename the result over
/// `path` (§9 mandates write-temp-then-rename, not overwrite).
///
/// No-op when the file already satisfies the target policy and is stereo
/// (the "identity post-processing" case in §8 — the cache file stays
/// byte-identical to what the decoder produced).
pub fn process_in_place(path: &Path, target: &TargetPolicy) -> Result<()> {
    let (info, samples) = read_pcm(path)?;

    let target_bit_depth = target.target_bit_depth(info.bits_per_sample as u32);
    let target_sample_rate = target.target_sample_rate(info.sample_rate);

    if !needs_processing(info.channels, info.bits_per_sample, info.sample_rate, target_bit_depth, target_sample_rate) {
        return Ok(());
    }

    let (remapped, out_channels) = channels::remap(&samples, info.channels);

    let resampled = resample::resample(
        &remapped,
        out_channels,
        info.sample_rate,
        target_sample_rate,
        info.bits_per_sample,
    )?;

    let requantized = requantize::requantize(&resampled, info.bits_per_sample, target_bit_depth as u16);

    write_temp_then_rename(path, out_channels, target_sample_rate, target_bit_depth as u16, &requantized)
}

fn read_pcm(path: &Path) -> Result<(WavInfo, Vec<i32>)> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let info = wav_header::read_header(&mut reader)?;

    let frame_bytes = info.frame_bytes();
    if frame_bytes == 0 {
        return Err(Error::Format(format!("{}: zero frame size", path.display())));
    }
    let frame_count = info.data_len / frame_bytes;
    let total_samples = frame_count as usize * info.channels as usize;

    let samples = match info.bits_per_sample {
        16 => {
            let mut raw = vec![0u8; total_samples * 2];
            reader.read_exact(&mut raw).map_err(|e| Error::io(path, e))?;
            raw.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]]) as i32).collect()
        }
        24 => {
            let mut raw = vec![0u8; total_samples * 3];
            reader.read_exact(&mut raw).map_err(|e| Error::io(path, e))?;
            raw.chunks_exact(3)
                .map(|c| sign_extend_24(c[0], c[1], c[2]))
                .collect()
        }
        32 => {
            let mut raw = vec![0u8; total_samples * 4];
            reader.read_exact(&mut raw).map_err(|e| Error::io(path, e))?;
            raw.chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }
        other => {
            return Err(Error::Format(format!(
                "{}: unsupported source bit depth {other}",
                path.display()
            )))
        }
    };

    Ok((info, samples))
}

/// Widen a little-endian 24-bit sample (3 bytes) to a sign-extended `i32`,
/// the same normalization `decoder/wavpack.rs`'s `SampleBuffer<i32>` path
/// already gets from Symphonia for free.
fn sign_extend_24(b0: u8, b1: u8, b2: u8) -> i32 {
    let unsigned = (b0 as i32) | ((b1 as i32) << 8) | ((b2 as i32) << 16);
    (unsigned << 8) >> 8
}

fn write_temp_then_rename(
    path: &Path,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    samples: &[i32],
) -> Result<()> {
    let tmp_path = path.with_extension("wav.post-tmp");
    let result = (|| -> Result<()> {
        let file = File::create(&tmp_path).map_err(|e| Error::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        let bytes_per_sample = (bits_per_sample / 8) as u32;
        let data_len = samples.len() as u32 * bytes_per_sample;

        wav_header::write_canonical_header(&mut writer, channels, sample_rate, bits_per_sample, data_len)
            .map_err(|e| Error::io(&tmp_path, e))?;

        match bits_per_sample {
            16 => {
                for &s in samples {
                    writer
                        .write_all(&(s as i16).to_le_bytes())
                        .map_err(|e| Error::io(&tmp_path, e))?;
                }
            }
            24 => {
                for &s in samples {
                    let b = s.to_le_bytes();
                    writer.write_all(&b[..3]).map_err(|e| Error::io(&tmp_path, e))?;
                }
            }
            32 => {
                for &s in samples {
                    writer.write_all(&s.to_le_bytes()).map_err(|e| Error::io(&tmp_path, e))?;
                }
            }
            other => return Err(Error::Format(format!("unsupported target bit depth {other}"))),
        }
        writer.flush().map_err(|e| Error::io(&tmp_path, e))
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
        return result;
    }

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        Error::io(path, e)
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoder::wav_header::write_canonical_header;

    fn write_stereo_wav(path: &Path, sample_rate: u32, bits: u16, frames: &[(i32, i32)]) {
        let file = File::create(path).unwrap();
        let mut w = BufWriter::new(file);
        let data_len = frames.len() as u32 * 2 * (bits as u32 / 8);
        write_canonical_header(&mut w, 2, sample_rate, bits, data_len).unwrap();
        for &(l, r) in frames {
            if bits == 16 {
                w.write_all(&(l as i16).to_le_bytes()).unwrap();
                w.write_all(&(r as i16).to_le_bytes()).unwrap();
            } else {
                w.write_all(&l.to_le_bytes()).unwrap();
                w.write_all(&r.to_le_bytes()).unwrap();
            }
        }
    }

    #[test]
    fn identity_when_already_matching_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.wav");
        write_stereo_wav(&path, 96_000, 32, &[(100, -100), (200, -200)]);
        let before = std::fs::read(&path).unwrap();

        let target = TargetPolicy::default();
        process_in_place(&path, &target).unwrap();

        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn requantizes_16_to_32_when_target_forces_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.wav");
        write_stereo_wav(&path, 96_000, 16, &[(1000, -1000), (2000, -2000)]);

        let target = TargetPolicy { bit_depth_override: Some(32), sample_rate_override: Some(96_000) };
        process_in_place(&path, &target).unwrap();

        let mut reader = BufReader::new(File::open(&path).unwrap());
        let info = wav_header::read_header(&mut reader).unwrap();
        assert_eq!(info.bits_per_sample, 32);
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 96_000);
    }
}

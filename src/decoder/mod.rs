//! Source decoding: format-specific byte-in, samples-out (§4.2 C).
//!
//! Dispatch is a tagged match on the source extension's first character
//! then full match, a direct port of `is_audio`'s switch in `qua-socket.c`
//! generalized from "is this recognized" to "which decoder handles this".
//! FLAC and WavPack are decoded in-process; every other recognized
//! extension is decoded by invoking the canonical external converter
//! ([`external`]) and waiting for its exit status, matching `qua-decode.c`'s
//! `convert_audio` dispatch table. The decoder never publishes to the
//! cache directly — it writes to a caller-supplied path.

mod external;
mod flac;
mod wavpack;
pub mod wav_header;

use std::path::Path;

use crate::error::{Error, Result};

/// Decoded PCM audio plus the format the decoder detected.
pub struct DecodedAudio {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Interleaved samples at the stream's native bit depth (never
    /// pre-scaled to full `i32` range — the post-processor requantizes).
    pub samples: Vec<i32>,
}

impl DecodedAudio {
    /// Write this decoded buffer to `path` as a canonical PCM WAV, the step
    /// that gives an in-process decode the same on-disk shape an
    /// externally-converted one already has before either reaches the
    /// post-processor.
    pub fn write_wav(&self, path: &std::path::Path) -> Result<()> {
        use std::io::{BufWriter, Write};

        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        let bytes_per_sample = (self.bits_per_sample / 8) as u32;
        let data_len = self.samples.len() as u32 * bytes_per_sample;

        wav_header::write_canonical_header(
            &mut writer,
            self.channels,
            self.sample_rate,
            self.bits_per_sample,
            data_len,
        )
        .map_err(|e| Error::io(path, e))?;

        match self.bits_per_sample {
            16 => {
                for &s in &self.samples {
                    writer.write_all(&(s as i16).to_le_bytes()).map_err(|e| Error::io(path, e))?;
                }
            }
            24 => {
                for &s in &self.samples {
                    let b = s.to_le_bytes();
                    writer.write_all(&b[..3]).map_err(|e| Error::io(path, e))?;
                }
            }
            32 => {
                for &s in &self.samples {
                    writer.write_all(&s.to_le_bytes()).map_err(|e| Error::io(path, e))?;
                }
            }
            other => return Err(Error::Format(format!("unsupported decoded bit depth {other}"))),
        }
        writer.flush().map_err(|e| Error::io(path, e))
    }
}

/// Decode `source` (a file with a recognized extension) to a temporary
/// in-process buffer ([`DecodedAudio`]), or, for formats without an
/// in-process decoder, to `external_output_path` via an external tool.
///
/// Returns the decoded audio when available in-process; for
/// externally-decoded formats the caller must instead read
/// `external_output_path` (a WAV file) and parse its header, since the
/// external converter already emits a PCM WAV rather than a raw sample
/// buffer. This mirrors `qua-decode.c`'s split between `decode_flac` /
/// `decode_wavpack` (populate an in-memory buffer) and `convert_audio`
/// (spawn `ffmpeg`/a format-specific CLI tool and let it write the WAV).
pub enum DecodeOutcome {
    InProcess(DecodedAudio),
    External { detected: (u16, u32, u16) },
}

/// Decode `source` to `external_output_path`, dispatching on extension.
/// `external_output_path` is only used (and only needs to exist as a
/// writable location) for formats without an in-process decoder.
pub fn decode(source: &Path, external_output_path: &Path) -> Result<DecodeOutcome> {
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| Error::Precondition(format!("{}: no file extension", source.display())))?;

    match ext.as_str() {
        "flac" => Ok(DecodeOutcome::InProcess(flac::decode(source)?)),
        "wv" => Ok(DecodeOutcome::InProcess(wavpack::decode(source)?)),
        "ape" | "aiff" | "aif" | "mp3" | "m4a" | "opus" | "ogg" | "wav" => {
            let detected = external::convert(source, external_output_path, &ext)?;
            Ok(DecodeOutcome::External { detected })
        }
        other => Err(Error::Precondition(format!(
            "{}: unrecognized extension {other:?}",
            source.display()
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_extension_is_rejected_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("song.xyz");
        std::fs::write(&src, b"nope").unwrap();
        let out = dir.path().join("out.wav");
        assert!(decode(&src, &out).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn no_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("song");
        std::fs::write(&src, b"nope").unwrap();
        let out = dir.path().join("out.wav");
        assert!(decode(&src, &out).is_err());
    }
}

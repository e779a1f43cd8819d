//! In-process FLAC decoding via `claxon`.
//!
//! Mirrors `decode_flac_to_memory` in `qua-decode.c` (libFLAC streaming
//! decoder collecting interleaved samples into a flat buffer), but uses
//! claxon's safe `FlacReader` instead of linking libFLAC. Samples are left
//! as raw signed integers at the stream's native bit depth — no
//! normalization to float, since the post-processor and streamer both
//! operate on exact integer PCM.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use claxon::FlacReader;

use super::DecodedAudio;
use crate::error::{Error, Result};

pub fn decode(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = FlacReader::new(BufReader::new(file))
        .map_err(|e| Error::Format(format!("{}: not a valid FLAC stream: {e}", path.display())))?;

    let info = reader.streaminfo();
    let channels = info.channels as u16;
    let sample_rate = info.sample_rate;
    let bits_per_sample = info.bits_per_sample as u16;

    if channels == 0 || sample_rate == 0 {
        return Err(Error::Format(format!(
            "{}: FLAC STREAMINFO missing channels or sample rate",
            path.display()
        )));
    }

    let mut samples = Vec::with_capacity(info.samples.unwrap_or(0) as usize * channels as usize);
    for sample in reader.samples() {
        let sample = sample
            .map_err(|e| Error::Format(format!("{}: FLAC decode error: {e}", path.display())))?;
        samples.push(sample);
    }

    if samples.is_empty() {
        return Err(Error::Format(format!("{}: decoded zero samples", path.display())));
    }

    Ok(DecodedAudio {
        channels,
        sample_rate,
        bits_per_sample,
        samples,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_non_flac_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-flac.flac");
        std::fs::write(&path, b"not a flac stream at all").unwrap();
        assert!(decode(&path).is_err());
    }
}

//! In-process WavPack decoding via `symphonia`'s native wavpack codec.
//!
//! Grounded in `SymphoniaDecoder::init`'s probe-then-packet-loop shape
//! (rodio's `decoder::symphonia`), trimmed to a one-shot "decode the whole
//! file into a flat buffer" form since the post-processor works on whole
//! buffers rather than a streaming `Source`.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::DecodedAudio;
use crate::error::{Error, Result};

pub fn decode(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wv");

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Format(format!("{}: not a valid WavPack stream: {e}", path.display())))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Format(format!("{}: no decodable track", path.display())))?;
    let track_id = track.id;

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| Error::Format(format!("{}: missing channel count", path.display())))?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Format(format!("{}: missing sample rate", path.display())))?;
    // WavPack carries 16- or 32-bit integer samples; symphonia widens
    // anything above 16 bits to a full-scale i32, so collapse the reported
    // depth to match whichever sample buffer width we actually read into
    // (mirrors the native, unscaled integers `flac::decode` hands back).
    let detected_bits = track.codec_params.bits_per_sample.unwrap_or(16);
    let bits_per_sample: u16 = if detected_bits <= 16 { 16 } else { 32 };

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Format(format!("{}: unsupported codec: {e}", path.display())))?;

    let mut samples = Vec::new();
    let mut sample_buf_16: Option<SampleBuffer<i16>> = None;
    let mut sample_buf_32: Option<SampleBuffer<i32>> = None;
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(Error::Format(format!("{}: {e}", path.display()))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                if bits_per_sample == 16 {
                    let buf = sample_buf_16.get_or_insert_with(|| {
                        SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
                    });
                    buf.copy_interleaved_ref(decoded);
                    samples.extend(buf.samples().iter().map(|&s| s as i32));
                } else {
                    let buf = sample_buf_32.get_or_insert_with(|| {
                        SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
                    });
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(Error::Format(format!("{}: {e}", path.display()))),
        }
    }

    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(Error::Format(format!("{}: empty WavPack decode", path.display())));
    }

    Ok(DecodedAudio { channels, sample_rate, bits_per_sample, samples })
}

//! Decoding by invoking the canonical external converter for a format.
//!
//! A direct port of the non-FLAC/WavPack arms of `convert_audio`
//! (`qua-decode.c`): each recognized extension maps to one external tool
//! invoked with fixed arguments, its exit status awaited, and its output
//! WAV's header parsed for the detected `(bit_depth, sample_rate,
//! channels)`. The external tool writes straight to `output_path`; we skip
//! the original's extra temp-file-then-copy hop since our caller already
//! supplies a scratch path.

use std::path::Path;
use std::process::Command;

use super::wav_header;
use crate::error::{Error, Result};

/// Run the external converter appropriate for `ext`, writing a PCM WAV to
/// `output_path`. Returns the detected `(bits_per_sample, sample_rate,
/// channels)` read back from that WAV's header.
pub fn convert(source: &Path, output_path: &Path, ext: &str) -> Result<(u16, u32, u16)> {
    let status = command_for(source, output_path, ext)?
        .status()
        .map_err(|e| Error::Runtime(format!("failed to spawn converter for {ext}: {e}")))?;

    if !status.success() {
        return Err(Error::Runtime(format!(
            "{}: converter for .{ext} exited with {status}",
            source.display()
        )));
    }

    let file = std::fs::File::open(output_path).map_err(|e| Error::io(output_path, e))?;
    let mut reader = std::io::BufReader::new(file);
    let info = wav_header::read_header(&mut reader)?;
    Ok((info.bits_per_sample, info.sample_rate, info.channels))
}

fn command_for(source: &Path, output_path: &Path, ext: &str) -> Result<Command> {
    let mut cmd = match ext {
        "wav" | "aiff" | "aif" | "m4a" => {
            let mut c = Command::new("ffmpeg");
            c.args(["-v", "quiet", "-i"]).arg(source).args(["-f", "wav"]).arg(output_path);
            c
        }
        "ape" => {
            let mut c = Command::new("mac");
            c.arg(source).arg("-d").arg(output_path);
            c
        }
        "mp3" => {
            let mut c = Command::new("mpg123");
            c.arg("-w").arg(output_path).arg(source);
            c
        }
        "opus" => {
            let mut c = Command::new("opusdec");
            c.arg("--force-wav").arg(source).arg(output_path);
            c
        }
        "ogg" => {
            let mut c = Command::new("oggdec");
            c.arg(source).arg("-o").arg(output_path);
            c
        }
        other => {
            return Err(Error::Precondition(format!("no external converter for .{other}")));
        }
    };
    cmd.stdin(std::process::Stdio::null());
    Ok(cmd)
}

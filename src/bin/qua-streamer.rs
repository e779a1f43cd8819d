//! `play <track.wav> <device-id>` (§6): stream one WAV file to one ALSA
//! device, blocking until the stream has drained.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

/// Real-time PCM streamer.
#[derive(Parser)]
#[command(name = "qua-streamer")]
struct Cli {
    /// Stereo little-endian PCM WAV, bit depth 16 or 32.
    track: PathBuf,
    /// ALSA device identifier, e.g. `hw:0,0`.
    device_id: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match qua::streamer::run(&cli.track, &cli.device_id) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "playback failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

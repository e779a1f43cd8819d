//! `launcher <cpu> <exe> <args…>` (§4.3, §6): prepare the real-time
//! execution environment, then exec `exe` with `args`. Never returns on
//! success — the process image is replaced.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

#[derive(Parser)]
#[command(name = "qua-launcher")]
struct Cli {
    /// CPU core to pin this process (and its exec'd image) to.
    cpu_id: usize,
    /// Player binary to exec.
    player_path: PathBuf,
    /// Arguments forwarded to the player (`<track.wav> <device_id>`).
    args: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    // On success this never returns — the process image is replaced.
    let err = qua::launcher::launch(cli.cpu_id, &cli.player_path, &cli.args).unwrap_err();
    error!(error = %err, "launch failed");
    ExitCode::from(err.exit_code() as u8)
}

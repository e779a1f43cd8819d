//! The media-bus adapter process (§4.5 J). Registers
//! `org.mpris.MediaPlayer2.qua` on the session bus and blocks forever.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use qua::control::mpris::{self, AdapterConfig};

#[derive(Parser)]
#[command(name = "qua-mprisd")]
struct Cli {
    /// Orchestrator binary spawned for Play/Pause and the Next/Previous
    /// fallback when the signal daemon is unreachable.
    #[arg(long)]
    orchestrator_bin: Option<PathBuf>,
    /// Pid file the signal daemon writes, used to prefer the signal route
    /// for Next/Previous.
    #[arg(long)]
    signal_daemon_pid_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AdapterConfig {
        orchestrator_bin: cli.orchestrator_bin.unwrap_or_else(|| sibling_binary("qua-play")),
        signal_daemon_pid_file: cli
            .signal_daemon_pid_file
            .unwrap_or_else(|| qua::config::state_dir().join("qua-signald.pid")),
    };

    match mpris::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "qua-mprisd failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn sibling_binary(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|dir| dir.join(name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

//! `play [-n N] [-p N] [path]`, `stop`, `show` (§6): the orchestrator CLI.
//! Offsets from `-n`/`-p` sum into one net navigation step, per §6.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use qua::config::TargetPolicy;
use qua::error::Error;
use qua::orchestrate::Orchestrator;

#[derive(Parser)]
#[command(name = "qua-play")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// ALSA device identifier handed to the streamer.
    #[arg(long, global = true, default_value = "default")]
    device: String,
    /// CPU core the launcher pins the streamer to.
    #[arg(long, global = true, default_value_t = 0)]
    cpu: usize,
    /// Launcher binary; defaults to `qua-launcher` beside this executable.
    #[arg(long, global = true)]
    launcher_path: Option<PathBuf>,
    /// Player (streamer) binary; defaults to `qua-streamer` beside this executable.
    #[arg(long, global = true)]
    player_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Play `path`, or resume the last/most recent extant track.
    Play {
        path: Option<PathBuf>,
        /// Step forward this many tracks from the current one.
        #[arg(short = 'n', long)]
        next: Option<i64>,
        /// Step backward this many tracks from the current one.
        #[arg(short = 'p', long)]
        prev: Option<i64>,
    },
    /// Kill the currently playing streamer, if any.
    Stop,
    /// Print the last played track's path.
    Show,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let orchestrator = match build_orchestrator(&cli) {
        Ok(o) => o,
        Err(e) => {
            error!(error = %e, "failed to build orchestrator");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    let result = match cli.command {
        Command::Play { path, next, prev } => {
            let offset = next.unwrap_or(0) - prev.unwrap_or(0);
            if offset != 0 {
                orchestrator.play_offset(offset)
            } else {
                orchestrator.play(path)
            }
        }
        Command::Stop => orchestrator.stop(),
        Command::Show => {
            match orchestrator.show() {
                Some(path) => println!("{}", path.display()),
                None => println!("(nothing played yet)"),
            }
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn build_orchestrator(cli: &Cli) -> Result<Orchestrator, Error> {
    let launcher_path = cli.launcher_path.clone().unwrap_or_else(|| sibling_binary("qua-launcher"));
    let player_path = cli.player_path.clone().unwrap_or_else(|| sibling_binary("qua-streamer"));

    Orchestrator::new(
        qua::config::default_cache_dir(),
        qua::config::current_song_path(),
        qua::config::history_path(),
        TargetPolicy::from_env(),
        launcher_path,
        player_path,
        cli.device.clone(),
        cli.cpu,
        qua::config::state_dir().join("streamer.pid"),
    )
}

/// Resolve `name` relative to this executable's own directory, the way a
/// PGO build tree ships every binary side by side.
fn sibling_binary(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|dir| dir.join(name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

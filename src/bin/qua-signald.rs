//! The signal daemon process (§4.5 I). Registers for `USR1`/`USR2`/`CONT`
//! and blocks forever, translating each into an orchestrator command.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use qua::config::TargetPolicy;
use qua::control::signal::SignalDaemon;
use qua::error::Error;
use qua::orchestrate::Orchestrator;

#[derive(Parser)]
#[command(name = "qua-signald")]
struct Cli {
    #[arg(long, default_value = "default")]
    device: String,
    #[arg(long, default_value_t = 0)]
    cpu: usize,
    #[arg(long)]
    launcher_path: Option<PathBuf>,
    #[arg(long)]
    player_path: Option<PathBuf>,
    /// Where this process's own pid is recorded, so the media-bus adapter
    /// can prefer signalling it over spawning the orchestrator directly.
    #[arg(long)]
    pid_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(never) => never,
        Err(e) => {
            error!(error = %e, "qua-signald failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Error> {
    let launcher_path = cli.launcher_path.unwrap_or_else(|| sibling_binary("qua-launcher"));
    let player_path = cli.player_path.unwrap_or_else(|| sibling_binary("qua-streamer"));
    let pid_file = cli.pid_file.unwrap_or_else(|| qua::config::state_dir().join("qua-signald.pid"));
    if let Some(parent) = pid_file.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&pid_file, std::process::id().to_string());

    let orchestrator = Orchestrator::new(
        qua::config::default_cache_dir(),
        qua::config::current_song_path(),
        qua::config::history_path(),
        TargetPolicy::from_env(),
        launcher_path,
        player_path,
        cli.device,
        cli.cpu,
        qua::config::state_dir().join("streamer.pid"),
    )?;

    let daemon = SignalDaemon::new()?;
    daemon.run(&orchestrator)
}

fn sibling_binary(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|dir| dir.join(name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

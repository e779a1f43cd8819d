//! The control socket daemon process (§4.5 H). Binds the well-known socket
//! and blocks forever, dispatching each accepted frame into the
//! orchestrator.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use qua::config::TargetPolicy;
use qua::control::socket::SocketDaemon;
use qua::error::Error;
use qua::orchestrate::Orchestrator;

#[derive(Parser)]
#[command(name = "qua-socketd")]
struct Cli {
    #[arg(long, default_value = "default")]
    device: String,
    #[arg(long, default_value_t = 0)]
    cpu: usize,
    #[arg(long)]
    launcher_path: Option<PathBuf>,
    #[arg(long)]
    player_path: Option<PathBuf>,
    #[arg(long)]
    socket_path: Option<PathBuf>,
    #[arg(long)]
    lock_path: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!(error = %e, "qua-socketd failed");
        return ExitCode::from(e.exit_code() as u8);
    }
    ExitCode::SUCCESS
}

fn run(cli: Cli) -> Result<(), Error> {
    let launcher_path = cli.launcher_path.unwrap_or_else(|| sibling_binary("qua-launcher"));
    let player_path = cli.player_path.unwrap_or_else(|| sibling_binary("qua-streamer"));
    let socket_path = cli.socket_path.unwrap_or_else(qua::control::socket::default_socket_path);
    let lock_path = cli.lock_path.unwrap_or_else(qua::control::socket::default_lock_path);

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

    let daemon = SocketDaemon::bind(&socket_path, &lock_path)?;
    daemon.run(&orchestrator)
}

fn sibling_binary(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|dir| dir.join(name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

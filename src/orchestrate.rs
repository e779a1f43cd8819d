//! The play orchestrator (§2 component G): glues the decoder, post-processor,
//! cache, navigator, and launcher together for one play request, and is the
//! single place `play`/`play-next`/`play-prev`/`stop`/`show` funnel through
//! from every control entry (§4.5, §9 "Duplicated logic across daemons").
//!
//! Ported from `qua-play.c`'s `play_audio`: decode races a conflicting-daemon
//! cleanup on one thread pair (§5 "Two short-lived concurrent tasks"),
//! post-processes only if needed, stops conflicting daemons again, rewrites
//! the state record, then hands off to the launcher.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid as NixPid;
use tracing::{info, warn};

use crate::cache::CacheManager;
use crate::config::TargetPolicy;
use crate::decoder::{self, wav_header, DecodeOutcome};
use crate::error::{Error, Result};
use crate::history::StateRecord;
use crate::navigator;
use crate::postprocess;

/// systemd user units the original stops around a decode, so a conflicting
/// audio daemon never holds the device open underneath the streamer.
pub const CONFLICTING_UNITS: &[&str] = &["pipewire.service", "pipewire-pulse.service", "wireplumber.service"];

/// Process names killed outright alongside the unit stops, mirroring
/// `cleanup_services` in the original.
const CONFLICTING_PROCESSES: &[&str] = &["qua-streamer", "picom"];

pub struct Orchestrator {
    cache: CacheManager,
    state: StateRecord,
    target_policy: TargetPolicy,
    launcher_path: PathBuf,
    player_path: PathBuf,
    device_id: String,
    cpu_id: usize,
    pid_file: PathBuf,
}

impl Orchestrator {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        state_path: impl Into<PathBuf>,
        history_path: impl Into<PathBuf>,
        target_policy: TargetPolicy,
        launcher_path: impl Into<PathBuf>,
        player_path: impl Into<PathBuf>,
        device_id: impl Into<String>,
        cpu_id: usize,
        pid_file: impl Into<PathBuf>,
    ) -> Result<Self> {
        Ok(Orchestrator {
            cache: CacheManager::new(cache_dir)?,
            state: StateRecord::new(state_path, history_path),
            target_policy,
            launcher_path: launcher_path.into(),
            player_path: player_path.into(),
            device_id: device_id.into(),
            cpu_id,
            pid_file: pid_file.into(),
        })
    }

    /// `play [path]` (§4.5): play `requested` if given, else resume the
    /// last played track, else the most recent still-extant history entry.
    pub fn play(&self, requested: Option<PathBuf>) -> Result<()> {
        let source = requested
            .or_else(|| self.state.last_played())
            .or_else(|| self.state.most_recent_extant())
            .ok_or_else(|| Error::Precondition("no track given and no prior play history".into()))?;

        self.play_track(&source)
    }

    /// `play-next` / `play-prev` (§4.5): navigate by `offset` from the last
    /// played track.
    pub fn play_offset(&self, offset: i64) -> Result<()> {
        let current = self
            .state
            .last_played()
            .ok_or_else(|| Error::Precondition("no current track to navigate from".into()))?;
        let next = navigator::navigate(&current, offset)?;
        self.play_track(&next)
    }

    fn play_track(&self, source: &Path) -> Result<()> {
        if !source.exists() {
            return Err(Error::Precondition(format!("{} does not exist", source.display())));
        }

        let cache_path = self.ensure_cached(source)?;

        // §4.2 step 4: stop conflicting daemons again, idempotently, right
        // before handoff to the launcher.
        stop_conflicting_daemons();

        self.state.record_play(source)?;
        self.spawn_launcher(&cache_path)?;
        info!(source = %source.display(), cache = %cache_path.display(), "play dispatched");
        Ok(())
    }

    /// `stop` (§4.5): kill whatever streamer process the last `spawn_launcher`
    /// recorded. Best-effort — a stale or missing pid file is not an error,
    /// matching the "streamer does not cooperate" non-graceful contract.
    pub fn stop(&self) -> Result<()> {
        let Ok(contents) = std::fs::read_to_string(&self.pid_file) else {
            return Ok(());
        };
        let Ok(pid) = contents.trim().parse::<i32>() else {
            return Ok(());
        };
        match signal::kill(NixPid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) => info!(pid, "sent SIGKILL to streamer"),
            Err(e) => warn!(pid, error = %e, "failed to signal streamer (likely already exited)"),
        }
        Ok(())
    }

    /// `show` (§4.5): the last played path, if any.
    pub fn show(&self) -> Option<PathBuf> {
        self.state.last_played()
    }

    /// Resolve `source`'s cache entry, decoding and post-processing on a
    /// miss. Cache hits never spawn a decoder (§8 scenario 2).
    fn ensure_cached(&self, source: &Path) -> Result<PathBuf> {
        if let Some(path) = self.cache.lookup(source)? {
            return Ok(path);
        }

        self.cache.manage_size()?;
        let flight = self.cache.begin_write(source)?;
        if flight.already_present() {
            return Ok(flight.target().to_path_buf());
        }
        let temp = flight.temp_path().expect("temp path set for a fresh write").to_path_buf();

        // Two independent concurrent tasks (§5): decode the source, and
        // clean up conflicting daemons, joined before post-processing.
        let source_owned = source.to_path_buf();
        let temp_owned = temp.clone();
        let decode_handle = thread::Builder::new()
            .name("qua-decode".into())
            .spawn(move || decoder::decode(&source_owned, &temp_owned))
            .expect("failed to spawn decode thread");
        let cleanup_handle = thread::Builder::new()
            .name("qua-cleanup".into())
            .spawn(stop_conflicting_daemons)
            .expect("failed to spawn cleanup thread");

        let decode_result = decode_handle.join().expect("decode thread panicked");
        let _ = cleanup_handle.join();

        let outcome = decode_result?;
        if let DecodeOutcome::InProcess(audio) = outcome {
            audio.write_wav(&temp)?;
        }
        // DecodeOutcome::External already wrote `temp` via the spawned converter.

        postprocess::process_in_place(&temp, &self.target_policy)?;

        flight.commit()
    }

    /// Spawn the launcher on `cache_path`, preferring a profile-guided
    /// binary matched to the cache entry's declared format when one is on
    /// `$PATH`, and record its pid so a later `stop` can find it.
    fn spawn_launcher(&self, cache_path: &Path) -> Result<()> {
        let player = self.resolve_player_binary(cache_path).unwrap_or_else(|| self.player_path.clone());

        let child: Child = Command::new(&self.launcher_path)
            .arg(self.cpu_id.to_string())
            .arg(&player)
            .arg(cache_path)
            .arg(&self.device_id)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| Error::Runtime(format!("failed to spawn launcher {}: {e}", self.launcher_path.display())))?;

        if let Some(parent) = self.pid_file.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&self.pid_file, child.id().to_string());
        Ok(())
    }

    fn resolve_player_binary(&self, cache_path: &Path) -> Option<PathBuf> {
        let file = std::fs::File::open(cache_path).ok()?;
        let mut reader = std::io::BufReader::new(file);
        let info = wav_header::read_header(&mut reader).ok()?;
        let variant_name = format!("qua-player-{}-{}.pgo8", info.bits_per_sample, info.sample_rate);
        which(&variant_name)
    }
}

/// Probe `$PATH` for `name`, the same way the original shells out to
/// `which` before falling back to the generic binary.
fn which(name: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(name).stderr(Stdio::null()).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8(output.stdout).ok()?;
    let trimmed = path.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

/// Idempotent cleanup of conflicting audio daemons (§4.2 pipeline steps 3
/// and 4): stop the fixed list of user units, then kill any leftover
/// processes by name. Best-effort throughout — a unit that is not running,
/// or a tool that is not installed, is not an error.
fn stop_conflicting_daemons() {
    for unit in CONFLICTING_UNITS {
        let _ = Command::new("systemctl")
            .args(["--user", "stop", unit])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    for proc_name in CONFLICTING_PROCESSES {
        let _ = Command::new("pkill")
            .args(["-x", proc_name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn orchestrator(dir: &Path) -> Orchestrator {
        Orchestrator::new(
            dir.join("cache"),
            dir.join("current-song"),
            dir.join("history"),
            TargetPolicy::default(),
            dir.join("qua-launcher"),
            dir.join("qua-streamer"),
            "hw:0,0",
            0,
            dir.join("streamer.pid"),
        )
        .unwrap()
    }

    #[test]
    fn play_with_no_argument_and_no_history_is_a_precondition_error() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let err = orch.play(None).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn play_nonexistent_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        let missing = dir.path().join("does-not-exist.flac");
        let err = orch.play(Some(missing)).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn stop_without_a_pid_file_is_a_harmless_noop() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        assert!(orch.stop().is_ok());
    }

    #[test]
    fn show_with_no_history_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path());
        assert_eq!(orch.show(), None);
    }
}

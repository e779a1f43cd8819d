//! The media-bus adapter (§4.5 J): a thin MPRIS2 (`org.mpris.MediaPlayer2`)
//! wrapper over the same command set every other control entry dispatches,
//! via `zbus`'s blocking API (no async runtime needed — this daemon is
//! single-threaded, same as `qua-socketd`).
//!
//! State (`is_playing`, the currently announced track metadata) lives in an
//! explicit [`PlayerState`] rather than process-wide globals (§9 "Global
//! process-wide state... carry it in an explicit context value"). `Pause`
//! maps to `stop` rather than a true pause — §9 documents this as a
//! deliberate simplification, since the source does the same.
//!
//! Metadata is resolved synchronously from the same pure functions the
//! orchestrator itself dispatches through ([`crate::navigator::navigate`],
//! [`crate::history::StateRecord`]) rather than waiting on the spawned
//! orchestrator process to report back — there is no IPC channel back from
//! a spawned `qua-play` to this daemon, so metadata is computed ahead of
//! the dispatch instead of after it. `PropertiesChanged` is then emitted
//! immediately, matching §8 scenario 6.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};
use zbus::blocking::connection::Builder;
use zbus::blocking::Connection;
use zbus::{interface, zvariant::Value};

use crate::cache::{CacheManager, Fingerprint};
use crate::config;
use crate::decoder::wav_header;
use crate::error::{Error, Result};
use crate::history::StateRecord;
use crate::navigator;

pub const BUS_NAME: &str = "org.mpris.MediaPlayer2.qua";
pub const OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";

/// Track metadata and playback flag, answered from local state (§4.5:
/// "Properties `PlaybackStatus` and `Metadata`... are answered from locally
/// tracked state").
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub is_playing: bool,
    pub title: String,
    pub artist: String,
    pub trackid: String,
    pub length_us: i64,
}

/// Paths this adapter needs to reach the rest of the system: the
/// orchestrator CLI binary (for the Play/Pause spawn fallback) and the
/// signal daemon's pid file (for the Next/Previous signal route).
pub struct AdapterConfig {
    pub orchestrator_bin: std::path::PathBuf,
    pub signal_daemon_pid_file: std::path::PathBuf,
}

struct RootInterface;

#[interface(name = "org.mpris.MediaPlayer2")]
impl RootInterface {
    fn quit(&self) {}
    fn raise(&self) {}

    #[zbus(property)]
    fn identity(&self) -> String {
        "qua".to_string()
    }
    #[zbus(property)]
    fn can_quit(&self) -> bool {
        false
    }
    #[zbus(property)]
    fn can_raise(&self) -> bool {
        false
    }
    #[zbus(property)]
    fn has_track_list(&self) -> bool {
        false
    }
    #[zbus(property)]
    fn supported_uri_schemes(&self) -> Vec<String> {
        Vec::new()
    }
    #[zbus(property)]
    fn supported_mime_types(&self) -> Vec<String> {
        Vec::new()
    }
}

struct PlayerInterface {
    state: Arc<Mutex<PlayerState>>,
    config: Arc<AdapterConfig>,
    /// Woken after any method that may have changed `is_playing` or
    /// metadata, so `run`'s emitter loop can fetch a fresh `InterfaceRef`
    /// and fire `PropertiesChanged` without the interface impl itself
    /// needing to hold a connection handle.
    notify: Sender<()>,
}

#[interface(name = "org.mpris.MediaPlayer2.Player")]
impl PlayerInterface {
    fn play(&mut self) {
        self.refresh_metadata_for_play();
        spawn_orchestrator(&self.config, &["play"]);
        self.set_playing(true);
    }

    /// Deliberate simplification (§9 open question): maps to `stop`.
    fn pause(&mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        spawn_orchestrator(&self.config, &["stop"]);
        self.set_playing(false);
    }

    fn play_pause(&mut self) {
        let playing = self.state.lock().expect("state mutex poisoned").is_playing;
        if playing {
            self.stop();
        } else {
            self.play();
        }
    }

    fn next(&mut self) {
        self.refresh_metadata_for_offset(1);
        if !signal_daemon(&self.config, Signal::SIGUSR1) {
            spawn_orchestrator(&self.config, &["play", "-n", "1"]);
        }
        self.set_playing(true);
    }

    fn previous(&mut self) {
        self.refresh_metadata_for_offset(-1);
        if !signal_daemon(&self.config, Signal::SIGUSR2) {
            spawn_orchestrator(&self.config, &["play", "-p", "1"]);
        }
        self.set_playing(true);
    }

    #[zbus(property)]
    fn playback_status(&self) -> String {
        if self.state.lock().expect("state mutex poisoned").is_playing {
            "Playing".to_string()
        } else {
            "Stopped".to_string()
        }
    }

    #[zbus(property)]
    fn metadata(&self) -> HashMap<String, Value<'static>> {
        let s = self.state.lock().expect("state mutex poisoned");
        let mut map = HashMap::new();
        map.insert("xesam:title".to_string(), Value::from(s.title.clone()));
        map.insert("xesam:artist".to_string(), Value::from(vec![s.artist.clone()]));
        map.insert("mpris:trackid".to_string(), Value::from(s.trackid.clone()));
        map.insert("mpris:length".to_string(), Value::from(s.length_us));
        map
    }

    #[zbus(property)]
    fn can_go_next(&self) -> bool {
        true
    }
    #[zbus(property)]
    fn can_go_previous(&self) -> bool {
        true
    }
    #[zbus(property)]
    fn can_play(&self) -> bool {
        true
    }
    #[zbus(property)]
    fn can_pause(&self) -> bool {
        true
    }
}

impl PlayerInterface {
    fn state_record(&self) -> StateRecord {
        StateRecord::new(config::current_song_path(), config::history_path())
    }

    fn set_playing(&mut self, playing: bool) {
        let mut s = self.state.lock().expect("state mutex poisoned");
        let changed = s.is_playing != playing;
        s.is_playing = playing;
        drop(s);
        if changed {
            info!(playing, "mpris playback status changed");
        }
        let _ = self.notify.send(());
    }

    /// Resolve the track a bare `Play` would resume — the same fallback
    /// order the orchestrator applies: last played, else most recent extant
    /// history entry (§4.5 command table, `play` with no path).
    fn refresh_metadata_for_play(&mut self) {
        let record = self.state_record();
        let target = record.last_played().or_else(|| record.most_recent_extant());
        if let Some(path) = target {
            self.apply_track_metadata(&path);
        }
    }

    /// Resolve the track `Next`/`Previous` would land on, using the same
    /// navigator the orchestrator dispatches through, applied to the
    /// current state record (§4.4).
    fn refresh_metadata_for_offset(&mut self, offset: i64) {
        let record = self.state_record();
        let Some(current) = record.last_played() else {
            return;
        };
        match navigator::navigate(&current, offset) {
            Ok(target) => self.apply_track_metadata(&target),
            Err(e) => warn!(error = %e, "failed to resolve navigator target for mpris metadata"),
        }
    }

    fn apply_track_metadata(&mut self, path: &Path) {
        let (title, artist, trackid, length_us) = track_metadata(path);
        let mut s = self.state.lock().expect("state mutex poisoned");
        s.title = title;
        s.artist = artist;
        s.trackid = trackid;
        s.length_us = length_us;
    }
}

/// Derive the metadata fields MPRIS reports for `path`: title from the file
/// stem, artist from the containing directory's name (best-effort — there
/// is no tag reader in this pipeline), a stable `mpris:trackid` derived from
/// the source fingerprint when available, and `mpris:length` in
/// microseconds read back from the cache entry's WAV header when one
/// already exists (0 on a cache miss — the streamer hasn't decoded it yet).
fn track_metadata(path: &Path) -> (String, String, String, i64) {
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let artist = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let trackid = match Fingerprint::of(path) {
        Ok(fp) => format!("{OBJECT_PATH}/trackid/{:x}_{:x}", fp.inode, fp.mtime),
        Err(_) => format!("{OBJECT_PATH}/trackid/0"),
    };

    let length_us = cache_entry_length_us(path).unwrap_or(0);

    (title, artist, trackid, length_us)
}

fn cache_entry_length_us(source: &Path) -> Option<i64> {
    let cache = CacheManager::new(config::default_cache_dir()).ok()?;
    let entry = cache.lookup(source).ok()??;
    let file = std::fs::File::open(&entry).ok()?;
    let mut reader = std::io::BufReader::new(file);
    let info = wav_header::read_header(&mut reader).ok()?;
    let frame_bytes = info.frame_bytes();
    if frame_bytes == 0 || info.sample_rate == 0 {
        return None;
    }
    let frames = info.data_len as u64 / frame_bytes as u64;
    Some((frames * 1_000_000 / info.sample_rate as u64) as i64)
}

/// Send `sig` to the signal daemon if its pid file resolves to a live
/// process; returns `false` if no signal daemon is reachable so the caller
/// can fall back to spawning the orchestrator directly (§4.5 "Dispatch uses
/// the inter-process signal route when possible").
fn signal_daemon(config: &AdapterConfig, sig: Signal) -> bool {
    let Ok(contents) = std::fs::read_to_string(&config.signal_daemon_pid_file) else {
        return false;
    };
    let Ok(pid) = contents.trim().parse::<i32>() else {
        return false;
    };
    match signal::kill(Pid::from_raw(pid), sig) {
        Ok(()) => true,
        Err(e) => {
            warn!(pid, error = %e, "failed to signal signal daemon, falling back to spawn");
            false
        }
    }
}

fn spawn_orchestrator(config: &AdapterConfig, args: &[&str]) {
    if let Err(e) = Command::new(&config.orchestrator_bin)
        .args(args)
        .stdin(Stdio::null())
        .spawn()
    {
        warn!(error = %e, "failed to spawn orchestrator from mpris adapter");
    }
}

/// Build and run the media-bus adapter, blocking forever once the well-
/// known name is registered. The `Connection` owns a background executor
/// thread that services incoming method calls; this thread's job, after
/// registration, is to wait for [`PlayerInterface`] to signal a state
/// change and then emit `PropertiesChanged` for `PlaybackStatus` and
/// `Metadata` via the interface's `InterfaceRef` (§4.5 J, §6: emitted "on
/// `is_playing` transitions and on metadata updates").
pub fn run(config: AdapterConfig) -> Result<()> {
    let state = Arc::new(Mutex::new(PlayerState::default()));
    let config = Arc::new(config);
    let (notify_tx, notify_rx) = mpsc::channel::<()>();

    let root = RootInterface;
    let player = PlayerInterface {
        state,
        config,
        notify: notify_tx,
    };

    let connection: Connection = Builder::session()
        .map_err(|e| Error::Resource(format!("failed to connect to session bus: {e}")))?
        .name(BUS_NAME)
        .map_err(|e| Error::Resource(format!("failed to acquire bus name {BUS_NAME}: {e}")))?
        .serve_at(OBJECT_PATH, root)
        .map_err(|e| Error::Resource(format!("failed to serve root interface: {e}")))?
        .serve_at(OBJECT_PATH, player)
        .map_err(|e| Error::Resource(format!("failed to serve player interface: {e}")))?
        .build()
        .map_err(|e| Error::Resource(format!("failed to build session bus connection: {e}")))?;

    let iface_ref = connection
        .object_server()
        .interface::<_, PlayerInterface>(OBJECT_PATH)
        .map_err(|e| Error::Resource(format!("failed to fetch player interface ref: {e}")))?;

    info!(name = BUS_NAME, path = OBJECT_PATH, "mpris adapter registered");

    for () in notify_rx {
        let emitter = iface_ref.signal_emitter();
        let iface = iface_ref.get();
        if let Err(e) = iface.playback_status_changed(emitter) {
            warn!(error = %e, "failed to emit PlaybackStatus PropertiesChanged");
        }
        if let Err(e) = iface.metadata_changed(emitter) {
            warn!(error = %e, "failed to emit Metadata PropertiesChanged");
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn track_metadata_falls_back_to_file_stem_and_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("Some Album");
        std::fs::create_dir(&album).unwrap();
        let track = album.join("03 - Title.flac");
        std::fs::write(&track, b"not real audio").unwrap();

        let (title, artist, trackid, length_us) = track_metadata(&track);
        assert_eq!(title, "03 - Title");
        assert_eq!(artist, "Some Album");
        assert!(trackid.starts_with(OBJECT_PATH));
        assert_eq!(length_us, 0); // no cache entry exists for this source
    }
}

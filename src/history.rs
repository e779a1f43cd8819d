//! Playback state record and play history (§3, §6).
//!
//! The state record is a single text file holding the last played absolute
//! path, rewritten atomically on every successful play. The history is an
//! append-only log of `YYYY-MM-DD HH:MM:SS <absolute-path>` lines, used to
//! resolve a bare `play` with no current track by walking the log in
//! reverse for the most recent entry that still exists on disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct StateRecord {
    state_path: PathBuf,
    history_path: PathBuf,
}

impl StateRecord {
    pub fn new(state_path: impl Into<PathBuf>, history_path: impl Into<PathBuf>) -> Self {
        StateRecord {
            state_path: state_path.into(),
            history_path: history_path.into(),
        }
    }

    /// Last played absolute path, if a state record exists.
    pub fn last_played(&self) -> Option<PathBuf> {
        let contents = fs::read_to_string(&self.state_path).ok()?;
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }

    /// Most recent extant file from the history log, walked in reverse.
    /// Used to resolve `play` with no argument and no current track.
    pub fn most_recent_extant(&self) -> Option<PathBuf> {
        let contents = fs::read_to_string(&self.history_path).ok()?;
        for line in contents.lines().rev() {
            if let Some(path) = parse_history_line(line) {
                if path.exists() {
                    return Some(path);
                }
            }
        }
        None
    }

    /// Atomically rewrite the state record (write-temp, rename) and append
    /// one line to the history log.
    pub fn record_play(&self, path: &Path) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let tmp = self.state_path.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
            writeln!(f, "{}", path.display()).map_err(|e| Error::io(&tmp, e))?;
        }
        fs::rename(&tmp, &self.state_path).map_err(|e| Error::io(&self.state_path, e))?;

        let mut history = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .map_err(|e| Error::io(&self.history_path, e))?;
        writeln!(history, "{} {}", now_timestamp(), path.display())
            .map_err(|e| Error::io(&self.history_path, e))?;
        Ok(())
    }
}

fn parse_history_line(line: &str) -> Option<PathBuf> {
    // "YYYY-MM-DD HH:MM:SS <path>" — the timestamp is two space-separated
    // tokens, the rest of the line is the path (paths may not contain
    // further meaningful spaces for our purposes since the log is
    // self-delimited by construction on the write side).
    let mut parts = line.splitn(3, ' ');
    let _date = parts.next()?;
    let _time = parts.next()?;
    let path = parts.next()?;
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let rec = StateRecord::new(dir.path().join("current-song"), dir.path().join("history"));
        let track = dir.path().join("a.flac");
        std::fs::File::create(&track).unwrap();

        rec.record_play(&track).unwrap();
        assert_eq!(rec.last_played().unwrap(), track);

        let history = std::fs::read_to_string(dir.path().join("history")).unwrap();
        assert_eq!(history.lines().count(), 1);
        assert!(history.contains(&track.display().to_string()));
    }

    #[test]
    fn most_recent_extant_skips_deleted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let rec = StateRecord::new(dir.path().join("current-song"), dir.path().join("history"));

        let gone = dir.path().join("gone.flac");
        let still_here = dir.path().join("still-here.flac");
        std::fs::File::create(&gone).unwrap();
        std::fs::File::create(&still_here).unwrap();

        rec.record_play(&gone).unwrap();
        rec.record_play(&still_here).unwrap();
        std::fs::remove_file(&gone).unwrap();

        // still_here was recorded after gone, so it is the most recent;
        // remove it too and confirm the walk steps back further.
        assert_eq!(rec.most_recent_extant().unwrap(), still_here);

        std::fs::remove_file(&still_here).unwrap();
        assert_eq!(rec.most_recent_extant(), None);
    }

    #[test]
    fn no_state_record_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let rec = StateRecord::new(dir.path().join("current-song"), dir.path().join("history"));
        assert_eq!(rec.last_played(), None);
    }
}

//! Directory-ordered next/previous navigation (§4.4 F).
//!
//! A direct generalization of `qua-next.c`: list the current track's
//! sibling files matching the recognized-audio predicate, sort them
//! byte-wise, find the current index (or 0 if not found), and step by
//! `offset` with mathematical modulo so negative offsets wrap.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Extensions recognized as audio source files (§3).
pub const RECOGNIZED_EXTENSIONS: &[&str] =
    &["flac", "wv", "ape", "aiff", "aif", "mp3", "m4a", "opus", "ogg", "wav"];

pub fn is_recognized_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| RECOGNIZED_EXTENSIONS.iter().any(|r| r.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Mathematical modulo: result always in `[0, m)`, unlike Rust's `%` which
/// preserves the dividend's sign.
fn rem_euclid_usize(n: i64, m: i64) -> usize {
    n.rem_euclid(m) as usize
}

/// Step from `current` by `offset` positions through the lexicographically
/// sorted, recognized-audio siblings of `current`'s containing directory.
///
/// Returns an error if the directory contains no recognized entries.
pub fn navigate(current: &Path, offset: i64) -> Result<PathBuf> {
    let dir = current.parent().ok_or_else(|| {
        Error::Precondition(format!("{} has no parent directory", current.display()))
    })?;

    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map_err(|e| Error::io(dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| is_recognized_audio(p))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();

    if names.is_empty() {
        return Err(Error::Precondition(format!(
            "no recognized audio files in {}",
            dir.display()
        )));
    }

    names.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    let current_name = current.file_name().map(|n| n.to_string_lossy().into_owned());
    let index = current_name
        .and_then(|name| names.iter().position(|n| *n == name))
        .unwrap_or(0);

    let n = names.len() as i64;
    let new_index = rem_euclid_usize(index as i64 + offset, n);
    Ok(dir.join(&names[new_index]))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::File;

    fn setup(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            File::create(dir.path().join(name)).unwrap();
        }
        dir
    }

    #[test]
    fn wraps_forward_past_end() {
        let dir = setup(&["01.flac", "02.flac", "03.flac"]);
        let current = dir.path().join("03.flac");
        let next = navigate(&current, 1).unwrap();
        assert_eq!(next, dir.path().join("01.flac"));
    }

    #[test]
    fn wraps_backward_past_start() {
        let dir = setup(&["01.flac", "02.flac", "03.flac"]);
        let current = dir.path().join("01.flac");
        let prev = navigate(&current, -1).unwrap();
        assert_eq!(prev, dir.path().join("03.flac"));
    }

    #[test]
    fn missing_current_defaults_to_index_zero() {
        let dir = setup(&["a.flac", "b.flac"]);
        let missing = dir.path().join("does-not-exist.flac");
        let next = navigate(&missing, 1).unwrap();
        assert_eq!(next, dir.path().join("b.flac"));
    }

    #[test]
    fn no_recognized_entries_is_an_error() {
        let dir = setup(&["readme.txt"]);
        let current = dir.path().join("readme.txt");
        assert!(navigate(&current, 1).is_err());
    }

    #[test]
    fn arbitrary_offset_wraps_with_math_modulo() {
        let dir = setup(&["a.flac", "b.flac", "c.flac", "d.flac"]);
        let current = dir.path().join("a.flac");
        // offset -5 on n=4: (0 - 5) mod 4 = 3 -> "d.flac"
        let got = navigate(&current, -5).unwrap();
        assert_eq!(got, dir.path().join("d.flac"));
    }

    #[test]
    fn ignores_non_audio_siblings() {
        let dir = setup(&["a.flac", "cover.jpg", "b.flac"]);
        let current = dir.path().join("a.flac");
        let next = navigate(&current, 1).unwrap();
        assert_eq!(next, dir.path().join("b.flac"));
    }
}

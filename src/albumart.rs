//! Album-art finder (§4.6 K).
//!
//! Direct generalization of `qua-album-art-finder-biggest.c`: walk the
//! source track's containing directory (plus one level into a sibling
//! `scan`/`scans` directory) looking for regular, non-hidden files whose
//! name starts with `c` or `f`, or contains "cover" or "front"
//! (case-insensitive), and has a recognized image extension. Among all
//! matches, the largest file wins.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff"];

fn is_image_extension(name: &OsStr) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|r| r.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn is_candidate_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with('c') || lower.starts_with('f') || lower.contains("cover") || lower.contains("front")
}

struct Winner {
    path: PathBuf,
    size: u64,
}

fn search_directory(dir: &Path, depth: u32, winner: &mut Option<Winner>) {
    let read_dir = match fs::read_dir(dir) {
        Ok(r) => r,
        Err(_) => return,
    };

    for entry in read_dir.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let name_str = match name.to_str() {
            Some(s) => s,
            None => continue,
        };
        if name_str.starts_with('.') {
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(_) => continue,
        };

        if file_type.is_file() {
            if is_candidate_name(name_str) && is_image_extension(&name) {
                let path = entry.path();
                if let Ok(meta) = entry.metadata() {
                    let size = meta.len();
                    let better = match winner {
                        Some(w) => size > w.size,
                        None => true,
                    };
                    if better {
                        *winner = Some(Winner { path, size });
                    }
                }
            }
        } else if file_type.is_dir() && depth == 0 {
            let lower = name_str.to_ascii_lowercase();
            if lower == "scans" || lower == "scan" {
                search_directory(&entry.path(), 1, winner);
            }
        }
    }
}

/// Find the largest candidate cover-art image for `source` (a track path,
/// resolved to its containing directory before searching). Returns `None`
/// if no candidate image was found.
pub fn find_album_art(source: &Path) -> Option<PathBuf> {
    let base = if source.is_file() {
        source.parent()?.to_path_buf()
    } else {
        source.to_path_buf()
    };

    let mut winner = None;
    search_directory(&base, 0, &mut winner);
    winner.map(|w| w.path)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;

    fn write_sized(path: &Path, size: usize) {
        let mut f = File::create(path).unwrap();
        f.write_all(&vec![0u8; size]).unwrap();
    }

    #[test]
    fn finds_largest_cover_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("01 - song.flac");
        write_sized(&track, 10);
        write_sized(&dir.path().join("cover-small.jpg"), 100);
        write_sized(&dir.path().join("front.png"), 5000);
        write_sized(&dir.path().join("booklet.jpg"), 20_000); // doesn't start with c/f, no keyword

        let found = find_album_art(&track).unwrap();
        assert_eq!(found, dir.path().join("front.png"));
    }

    #[test]
    fn descends_into_scans_directory_at_depth_zero_only() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("album.flac");
        write_sized(&track, 10);
        fs::create_dir(dir.path().join("Scans")).unwrap();
        write_sized(&dir.path().join("Scans").join("cover-huge.png"), 1_000_000);
        fs::create_dir(dir.path().join("Scans").join("inner")).unwrap();
        write_sized(
            &dir.path().join("Scans").join("inner").join("cover-deeper.png"),
            5_000_000,
        );

        let found = find_album_art(&track).unwrap();
        assert_eq!(found, dir.path().join("Scans").join("cover-huge.png"));
    }

    #[test]
    fn ignores_non_image_and_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("song.flac");
        write_sized(&track, 10);
        write_sized(&dir.path().join(".cover.jpg"), 100_000);
        write_sized(&dir.path().join("cover.txt"), 100_000);

        assert_eq!(find_album_art(&track), None);
    }

    #[test]
    fn no_candidates_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("song.flac");
        write_sized(&track, 10);
        write_sized(&dir.path().join("random.jpg"), 100);

        assert_eq!(find_album_art(&track), None);
    }
}

//! Content-addressed PCM cache (§3, §4.2 E).
//!
//! Cache entries are plain files named after a fingerprint of their source:
//! the pair `(inode, mtime)`, rendered as `qua-<ino>-<mtime>.wav`. This
//! directly ports `qua_cache_generate_path` from `qua-cache.c`, which
//! `snprintf`s the same `"%s/qua-%lx-%lx.wav"` pattern from `st_ino` and
//! `st_mtime`.

mod manager;

pub use manager::CacheManager;

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Stable identifier of a source file on this host: `(inode, mtime)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub inode: u64,
    pub mtime: i64,
}

impl Fingerprint {
    /// Compute the fingerprint of `source` from its `stat(2)` metadata.
    pub fn of(source: &Path) -> Result<Self> {
        let meta = std::fs::metadata(source).map_err(|e| Error::io(source, e))?;
        Ok(Fingerprint {
            inode: meta.ino(),
            mtime: meta.mtime(),
        })
    }

    /// File name this fingerprint maps to: `qua-<ino>-<mtime>.wav`.
    pub fn file_name(&self) -> String {
        format!("qua-{:x}-{:x}.wav", self.inode, self.mtime)
    }
}

/// Resolve the cache path a source file's PCM entry would live at, without
/// touching the cache directory.
pub fn path_for(cache_dir: &Path, source: &Path) -> Result<PathBuf> {
    let fp = Fingerprint::of(source)?;
    Ok(cache_dir.join(fp.file_name()))
}

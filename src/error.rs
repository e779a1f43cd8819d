//! Error kinds shared across the playback core.
//!
//! Mirrors the five failure kinds the system distinguishes: a bad
//! precondition (argument, missing file, unsupported format), a resource
//! failure (huge page, mmap, scheduling grant), a device refusal or
//! underrun, a malformed container, and a child-process/runtime failure.

use std::path::PathBuf;

/// Unified error type for the playback core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad argument, missing file, or unsupported format.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Huge-page allocation, mmap, or scheduling grant failure.
    #[error("resource unavailable: {0}")]
    Resource(String),

    /// Sound-card refusal, parameter mismatch, or underrun that could not
    /// be recovered.
    #[error("device error: {0}")]
    Device(String),

    /// A WAV container was malformed or did not match the expected dialect.
    #[error("malformed format: {0}")]
    Format(String),

    /// A decoder child process exited with a nonzero status, or crashed.
    #[error("runtime failure: {0}")]
    Runtime(String),

    /// Wraps a lower-level I/O error with the path it concerned.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code policy (§6): 0 success, 1 any precondition
    /// failure, >=2 reserved for other kinds.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Precondition(_) => 1,
            Error::Io { .. } => 1,
            Error::Resource(_) => 2,
            Error::Device(_) => 3,
            Error::Format(_) => 4,
            Error::Runtime(_) => 5,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

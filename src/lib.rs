//! `qua` — a low-latency, bit-perfect audio player for Linux.
//!
//! This crate is the playback core: decode-and-normalize into a
//! content-addressed cache (§4.2), a real-time PCM streamer over a
//! memory-mapped ALSA ring buffer (§4.1), a directory-ordered navigator
//! (§4.4), and the small control surface that drives them (§4.5). The
//! binaries under `src/bin/` are thin wrappers around this library.

pub mod albumart;
pub mod cache;
pub mod config;
pub mod control;
pub mod decoder;
pub mod error;
pub mod history;
pub mod launcher;
pub mod navigator;
pub mod orchestrate;
pub mod postprocess;
pub mod streamer;

pub use error::{Error, Result};

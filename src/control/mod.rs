//! The control plane (§4.5): one command vocabulary, dispatched into the
//! orchestrator from three entry points — the socket daemon ([`socket`]),
//! the signal daemon ([`signal`]), and the media-bus adapter ([`mpris`]).
//!
//! `Command` and [`dispatch`] are the single module every entry point calls
//! into (§9 "Duplicated logic across daemons... factors into a single
//! orchestrator module that each control entry calls into").

pub mod signal;
pub mod socket;

#[cfg(feature = "mpris")]
pub mod mpris;

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::orchestrate::Orchestrator;

/// The command set (§4.5) every control entry accepts some subset of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(Option<PathBuf>),
    PlayNext,
    PlayPrev,
    Stop,
    Show,
}

impl Command {
    /// Parse a NUL-separated `action\0data\0` frame (§4.5, §6 "Control
    /// socket"). `data` is only meaningful for `play`; empty otherwise.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let mut parts = frame.splitn(2, |&b| b == 0);
        let action = parts
            .next()
            .and_then(|b| std::str::from_utf8(b).ok())
            .ok_or_else(|| Error::Precondition("malformed control frame: missing action".into()))?;
        let data = parts
            .next()
            .and_then(|b| std::str::from_utf8(b).ok())
            .map(|s| s.trim_end_matches('\0'))
            .unwrap_or("");

        match action {
            "play" => {
                let path = if data.is_empty() { None } else { Some(PathBuf::from(data)) };
                Ok(Command::Play(path))
            }
            "play-next" => Ok(Command::PlayNext),
            "play-prev" => Ok(Command::PlayPrev),
            "stop" => Ok(Command::Stop),
            "show" => Ok(Command::Show),
            other => Err(Error::Precondition(format!("unrecognized command {other:?}"))),
        }
    }
}

/// Run `command` against `orchestrator`, returning the short human-readable
/// reply line (§6 "Control socket": "one short human-readable line per
/// request"; `show` omits the trailing newline, which the caller of
/// `dispatch` is responsible for).
pub fn dispatch(orchestrator: &Orchestrator, command: Command) -> Result<String> {
    match command {
        Command::Play(path) => {
            orchestrator.play(path)?;
            Ok("Playing".to_string())
        }
        Command::PlayNext => {
            orchestrator.play_offset(1)?;
            Ok("Playing".to_string())
        }
        Command::PlayPrev => {
            orchestrator.play_offset(-1)?;
            Ok("Playing".to_string())
        }
        Command::Stop => {
            orchestrator.stop()?;
            Ok("Stopped".to_string())
        }
        Command::Show => Ok(orchestrator
            .show()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(nothing played yet)".to_string())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_play_with_path() {
        let frame = b"play\0/music/a.flac\0";
        assert_eq!(Command::parse(frame).unwrap(), Command::Play(Some(PathBuf::from("/music/a.flac"))));
    }

    #[test]
    fn parses_play_with_no_path() {
        let frame = b"play\0\0";
        assert_eq!(Command::parse(frame).unwrap(), Command::Play(None));
    }

    #[test]
    fn parses_stop_and_show() {
        assert_eq!(Command::parse(b"stop\0\0").unwrap(), Command::Stop);
        assert_eq!(Command::parse(b"show\0\0").unwrap(), Command::Show);
    }

    #[test]
    fn rejects_unrecognized_action() {
        assert!(Command::parse(b"dance\0\0").is_err());
    }
}

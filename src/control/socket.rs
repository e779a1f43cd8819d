//! The control socket daemon (§4.5 H): accepts one `action\0data\0` frame
//! per connection on a local stream socket, dispatches it through
//! [`super::dispatch`], and writes back a short reply line.
//!
//! Single-instance enforcement, stale-socket cleanup, `SIGCHLD` reaping, and
//! ignoring `SIGPIPE` are ported from `qua-socket.c`'s daemon setup; the
//! per-connection frame parsing is `handle_client`'s `read()`-then-`strtok`
//! generalized to [`super::Command::parse`].

use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use nix::sys::signal::{signal, SigHandler, Signal};
use tracing::{error, info, warn};

use super::{dispatch, Command};
use crate::error::{Error, Result};
use crate::orchestrate::Orchestrator;

/// A request frame is bounded to this many bytes; the daemon never blocks
/// indefinitely trying to fill a larger buffer from a slow or hostile
/// client (§4.5 "reads are bounded by a fixed buffer").
const MAX_FRAME_BYTES: usize = 4096;

pub struct SocketDaemon {
    listener: UnixListener,
    _lock_file: File,
}

impl SocketDaemon {
    /// Bind the daemon at `socket_path`, enforcing single-instance via an
    /// exclusive advisory lock on `lock_path`, and removing a stale socket
    /// file left behind by a crashed prior instance.
    pub fn bind(socket_path: &Path, lock_path: &Path) -> Result<Self> {
        let lock_file = File::create(lock_path).map_err(|e| Error::io(lock_path, e))?;
        try_lock_exclusive(&lock_file, lock_path)?;

        if socket_path.exists() {
            std::fs::remove_file(socket_path).map_err(|e| Error::io(socket_path, e))?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let listener = UnixListener::bind(socket_path).map_err(|e| Error::io(socket_path, e))?;

        install_signal_dispositions()?;

        info!(socket = %socket_path.display(), "control socket daemon listening");
        Ok(SocketDaemon { listener, _lock_file: lock_file })
    }

    /// Accept connections forever, dispatching each frame against
    /// `orchestrator`. A single malformed or failing request closes that
    /// connection with an error reply; it never brings the daemon down.
    pub fn run(&self, orchestrator: &Orchestrator) -> ! {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => handle_client(stream, orchestrator),
                Err(e) => warn!(error = %e, "accept() failed, continuing"),
            }
        }
    }
}

fn handle_client(mut stream: UnixStream, orchestrator: &Orchestrator) {
    let mut buf = [0u8; MAX_FRAME_BYTES];
    let n = match stream.read(&mut buf) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "failed to read request frame");
            return;
        }
    };

    let reply = match Command::parse(&buf[..n]) {
        Ok(command) => {
            let is_show = matches!(command, Command::Show);
            match dispatch(orchestrator, command) {
                Ok(line) if is_show => line,
                Ok(line) => format!("{line}\n"),
                Err(e) => {
                    error!(error = %e, "command dispatch failed");
                    format!("Error: {e}\n")
                }
            }
        }
        Err(e) => format!("Error: {e}\n"),
    };

    if let Err(e) = stream.write_all(reply.as_bytes()) {
        warn!(error = %e, "failed to write reply");
    }
}

/// Reap spawned children automatically and never die from a client that
/// closed its end of the socket mid-write (§4.5 "Reaps spawned children via
/// signal disposition; ignores broken-pipe signal").
fn install_signal_dispositions() -> Result<()> {
    unsafe {
        signal(Signal::SIGCHLD, SigHandler::SigIgn)
            .map_err(|e| Error::Resource(format!("failed to ignore SIGCHLD: {e}")))?;
        signal(Signal::SIGPIPE, SigHandler::SigIgn)
            .map_err(|e| Error::Resource(format!("failed to ignore SIGPIPE: {e}")))?;
    }
    Ok(())
}

fn try_lock_exclusive(file: &File, path: &Path) -> Result<()> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(Error::Precondition(format!(
            "another qua-socketd instance already holds the lock at {}",
            path.display()
        )));
    }
    Ok(())
}

/// Default control socket path, used by the `qua-socketd` binary.
pub fn default_socket_path() -> PathBuf {
    crate::config::state_dir().join("control.sock")
}

pub fn default_lock_path() -> PathBuf {
    crate::config::state_dir().join("qua-socketd.lock")
}

#[cfg(test)]
mod test {
    use super::*;
    use std::os::unix::net::UnixStream as ClientStream;

    #[test]
    fn parses_and_reports_stop_reply_over_a_real_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("control.sock");
        let lock_path = dir.path().join("lock");

        let daemon = SocketDaemon::bind(&socket_path, &lock_path).unwrap();

        let orch = crate::orchestrate::Orchestrator::new(
            dir.path().join("cache"),
            dir.path().join("current-song"),
            dir.path().join("history"),
            crate::config::TargetPolicy::default(),
            dir.path().join("qua-launcher"),
            dir.path().join("qua-streamer"),
            "hw:0,0",
            0,
            dir.path().join("streamer.pid"),
        )
        .unwrap();

        let listener_thread = std::thread::spawn(move || {
            let (stream, _) = daemon.listener.accept().unwrap();
            handle_client(stream, &orch);
        });

        let mut client = ClientStream::connect(&socket_path).unwrap();
        client.write_all(b"stop\0\0").unwrap();
        client.shutdown(std::net::Shutdown::Write).unwrap();

        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        assert_eq!(reply, "Stopped\n");

        listener_thread.join().unwrap();
    }

    #[test]
    fn second_bind_on_the_same_lock_fails() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("control.sock");
        let lock_path = dir.path().join("lock");

        let _first = SocketDaemon::bind(&socket_path, &lock_path).unwrap();
        let second = SocketDaemon::bind(&socket_path, &lock_path);
        assert!(second.is_err());
    }
}

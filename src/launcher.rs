//! The launcher (§4.3 A): a tiny wrapper that prepares a deterministic
//! real-time execution environment, then execs the player binary.
//!
//! Ported from `qua-launcher.c`'s `main`: pin to a CPU, grab the top
//! fixed-priority real-time scheduling class, minimize the OOM score,
//! disable ASLR for the child image, close every fd but the one used to
//! enumerate them, start a new session, then `execve` the player. Order
//! matters — a missing player path must be caught before any privilege
//! change takes effect (§4.3 "A missing or nonexistent player path is
//! fatal before any privilege changes take effect").

use std::ffi::CString;
use std::path::Path;

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::{setsid, Pid};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Real-time fixed-priority scheduling class, top priority within it
/// (§4.3 step 2). `SCHED_FIFO` at the maximum priority the caller's
/// `RLIMIT_RTPRIO` allows.
const SCHED_FIFO: i32 = libc::SCHED_FIFO;

/// Lowest possible OOM score (§4.3 step 3): never the kill target.
const OOM_SCORE_ADJ_MIN: i32 = -1000;

/// Apply the real-time hygiene steps (§4.1 "Realtime hygiene expected of
/// the surrounding process") and then exec `player_path` with `args`,
/// never returning on success.
pub fn launch(cpu_id: usize, player_path: &Path, args: &[String]) -> Result<()> {
    if !player_path.exists() {
        return Err(Error::Precondition(format!(
            "player path {} does not exist",
            player_path.display()
        )));
    }

    pin_to_cpu(cpu_id)?;
    set_realtime_priority()?;
    set_oom_score_min()?;
    disable_aslr()?;
    close_other_fds()?;
    setsid().map_err(|e| Error::Resource(format!("setsid failed: {e}")))?;

    info!(cpu_id, player = %player_path.display(), "launching player");
    exec_player(player_path, args)
}

fn pin_to_cpu(cpu_id: usize) -> Result<()> {
    let mut set = CpuSet::new();
    set.set(cpu_id).map_err(|e| Error::Precondition(format!("invalid cpu id {cpu_id}: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &set)
        .map_err(|e| Error::Resource(format!("sched_setaffinity({cpu_id}) failed: {e}")))
}

fn set_realtime_priority() -> Result<()> {
    let max_priority = unsafe { libc::sched_get_priority_max(SCHED_FIFO) };
    if max_priority < 0 {
        return Err(Error::Resource("sched_get_priority_max(SCHED_FIFO) failed".into()));
    }
    let param = libc::sched_param { sched_priority: max_priority };
    let rc = unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(Error::Resource(format!(
            "sched_setscheduler(SCHED_FIFO, {max_priority}) failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

fn set_oom_score_min() -> Result<()> {
    std::fs::write("/proc/self/oom_score_adj", OOM_SCORE_ADJ_MIN.to_string())
        .map_err(|e| Error::Resource(format!("failed to set oom_score_adj: {e}")))
}

/// Disable ASLR for the image the subsequent `exec` loads (§4.3 step 4):
/// required so a profile-guided binary's addresses land identically across
/// runs.
fn disable_aslr() -> Result<()> {
    let rc = unsafe { libc::personality(libc::ADDR_NO_RANDOMIZE as libc::c_ulong) };
    if rc < 0 {
        return Err(Error::Resource(format!(
            "personality(ADDR_NO_RANDOMIZE) failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Close every file descriptor except the one used to enumerate
/// `/proc/self/fd` itself (§4.3 step 5), including stdin/stdout/stderr, so
/// the player inherits a clean fd table. Ported directly from
/// `qua-bare-launcher.c`'s fd-closing loop: `opendir("/proc/self/fd")`,
/// walk entries via `readdir`, close every parsed fd except `dirfd(dir)`.
/// Uses raw `libc::opendir`/`readdir`/`dirfd` rather than
/// `std::fs::read_dir` because the dir handle's own fd must be known and
/// excluded by number, not just skipped by convention.
fn close_other_fds() -> Result<()> {
    use std::ffi::CString;

    let path = CString::new("/proc/self/fd").unwrap();
    let dir = unsafe { libc::opendir(path.as_ptr()) };
    if dir.is_null() {
        warn!(
            error = %std::io::Error::last_os_error(),
            "failed to open /proc/self/fd, skipping fd hygiene"
        );
        return Ok(());
    }
    let dir_fd = unsafe { libc::dirfd(dir) };

    let mut to_close = Vec::new();
    loop {
        let entry = unsafe { libc::readdir(dir) };
        if entry.is_null() {
            break;
        }
        let name = unsafe { std::ffi::CStr::from_ptr((*entry).d_name.as_ptr()) };
        if let Ok(s) = name.to_str() {
            if let Ok(fd) = s.parse::<i32>() {
                if fd != dir_fd {
                    to_close.push(fd);
                }
            }
        }
    }
    unsafe {
        libc::closedir(dir);
    }

    for fd in to_close {
        unsafe {
            libc::close(fd);
        }
    }
    Ok(())
}

/// Replace this process image with `player_path`, passing `args` as
/// `argv[1..]` (§4.3 step 7). Never returns on success.
fn exec_player(player_path: &Path, args: &[String]) -> Result<()> {
    let path_c = path_to_cstring(player_path)?;
    let mut argv: Vec<CString> = vec![path_c.clone()];
    for a in args {
        argv.push(CString::new(a.as_str()).map_err(|_| Error::Precondition(format!("argument {a:?} contains a NUL byte")))?);
    }
    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|c| c.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    unsafe {
        libc::execv(path_c.as_ptr(), argv_ptrs.as_ptr());
    }
    // execv only returns on failure.
    Err(Error::Resource(format!(
        "execv({}) failed: {}",
        player_path.display(),
        std::io::Error::last_os_error()
    )))
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::Precondition(format!("path {} contains a NUL byte", path.display())))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_player_path_is_rejected_before_privilege_changes() {
        let missing = Path::new("/nonexistent/qua-streamer-does-not-exist");
        let err = launch(0, missing, &[]).unwrap_err();
        match err {
            Error::Precondition(_) => {}
            other => panic!("expected Precondition, got {other:?}"),
        }
    }
}

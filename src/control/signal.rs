//! The signal daemon (§4.5 I): maps three process signals onto the command
//! set, via an async-signal-safe self-pipe (`signal_hook`'s blocking
//! iterator) rather than doing any work inside the actual signal handler
//! (§9 "Signal-handler-to-main communication").
//!
//! `USR1` → `play-next`, `USR2` → `play-prev`, `CONT` → `play` (§6). `CHLD`
//! is ignored so spawned children (the orchestrator's launcher spawns) are
//! auto-reaped without an explicit `waitpid` loop.

use signal_hook::consts::{SIGCONT, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use nix::sys::signal::{signal, SigHandler, Signal};
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::orchestrate::Orchestrator;

pub struct SignalDaemon {
    signals: Signals,
}

impl SignalDaemon {
    pub fn new() -> Result<Self> {
        ignore_sigchld()?;
        let signals = Signals::new([SIGUSR1, SIGUSR2, SIGCONT])
            .map_err(|e| Error::Resource(format!("failed to register signal handlers: {e}")))?;
        info!("signal daemon listening for USR1/USR2/CONT");
        Ok(SignalDaemon { signals })
    }

    /// Block forever, translating each received signal into the equivalent
    /// orchestrator command. The handler itself does no work — `forever()`
    /// only yields a signal number once we are back on ordinary (non-signal-
    /// handler) stack, so any orchestrator call here is safe.
    pub fn run(mut self, orchestrator: &Orchestrator) -> ! {
        loop {
            for sig in self.signals.forever() {
                dispatch_signal(sig, orchestrator);
            }
        }
    }
}

fn dispatch_signal(sig: i32, orchestrator: &Orchestrator) {
    let result = match sig {
        SIGUSR1 => orchestrator.play_offset(1),
        SIGUSR2 => orchestrator.play_offset(-1),
        SIGCONT => orchestrator.play(None),
        other => {
            error!(signal = other, "received unexpected signal");
            return;
        }
    };
    if let Err(e) = result {
        error!(signal = sig, error = %e, "command dispatch failed");
    }
}

fn ignore_sigchld() -> Result<()> {
    unsafe { signal(Signal::SIGCHLD, SigHandler::SigIgn) }
        .map_err(|e| Error::Resource(format!("failed to ignore SIGCHLD: {e}")))?;
    Ok(())
}

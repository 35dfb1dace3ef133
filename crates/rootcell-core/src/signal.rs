//! Terminal signal dispositions around a foreground child.
//!
//! The terminal sends `SIGINT` and `SIGQUIT` to the whole foreground
//! process group. A process that waits on a container must ignore both
//! while it waits, and the container process must get the default
//! dispositions back before `execve(2)`, since ignored signals stay
//! ignored across it.

use std::io;

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

/// Signals the terminal delivers to the foreground process group.
pub const TERMINAL_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGQUIT];

/// Ignores the terminal signals until dropped, then restores the
/// dispositions that were in place before.
#[derive(Debug)]
#[must_use = "the previous dispositions are restored when the guard is dropped"]
pub struct TerminalSignals {
    previous: [SigAction; 2],
}

impl TerminalSignals {
    /// Starts ignoring `SIGINT` and `SIGQUIT` in the calling process.
    ///
    /// Never allocates, so a freshly forked child may call it.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `sigaction(2)`. Nothing is changed on
    /// failure.
    pub fn ignore() -> io::Result<Self> {
        let ignore = action(SigHandler::SigIgn);
        let [int, quit] = TERMINAL_SIGNALS;
        let previous_int = swap(int, &ignore)?;
        let previous_quit = match swap(quit, &ignore) {
            Ok(previous) => previous,
            Err(e) => {
                let _ = swap(int, &previous_int);
                return Err(e);
            }
        };
        Ok(Self {
            previous: [previous_int, previous_quit],
        })
    }

    /// Sets the default disposition for the terminal signals.
    ///
    /// Async-signal-safe; meant for the window between `fork(2)` and
    /// `execve(2)`.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `sigaction(2)`.
    pub fn reset_to_default() -> io::Result<()> {
        let default = action(SigHandler::SigDfl);
        for signal in TERMINAL_SIGNALS {
            let _ = swap(signal, &default)?;
        }
        Ok(())
    }
}

impl Drop for TerminalSignals {
    fn drop(&mut self) {
        for (signal, previous) in TERMINAL_SIGNALS.iter().zip(&self.previous) {
            if let Err(e) = swap(*signal, previous) {
                tracing::warn!(%signal, error = %e, "cannot restore signal disposition");
            }
        }
    }
}

fn action(handler: SigHandler) -> SigAction {
    SigAction::new(handler, SaFlags::empty(), SigSet::empty())
}

/// Installs `action` for `signal` and returns the one it replaced.
#[allow(unsafe_code)]
fn swap(signal: Signal, action: &SigAction) -> io::Result<SigAction> {
    // SAFETY: `action` is either SIG_IGN, SIG_DFL or a disposition that
    // sigaction(2) returned earlier for the same signal, so no handler is
    // installed that was not already installed before.
    unsafe { sigaction(signal, action) }.map_err(io::Error::from)
}

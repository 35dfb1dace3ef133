//! Self re-execution dispatch.
//!
//! The launcher starts a child by executing this very binary again with an
//! internal token as its first argument. `main` consults the dispatch
//! table before any argument parsing; when the token matches, the
//! registered entry point runs instead of the CLI.

use std::ffi::{OsStr, OsString};
use std::process::Command;

use rootcell_common::constants::INIT_FAILURE_EXIT_CODE;
use rootcell_common::error::Result;

/// Token that runs the namespace entry point.
pub const INIT_TOKEN: &str = "__rootcell_init";

/// Path that always names the running executable.
pub const SELF_EXE: &str = "/proc/self/exe";

/// An entry point reachable through re-execution.
///
/// Receives the arguments following the token and returns the process
/// exit code.
pub type EntryPoint = fn(&[OsString]) -> Result<i32>;

/// Table of internal tokens and the entry points they select.
#[derive(Debug, Default, Clone)]
pub struct Dispatcher {
    entries: Vec<(&'static str, EntryPoint)>,
}

impl Dispatcher {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `entry` under `token`.
    #[must_use]
    pub fn register(mut self, token: &'static str, entry: EntryPoint) -> Self {
        self.entries.push((token, entry));
        self
    }

    /// Reports whether `args` name a registered token.
    #[must_use]
    pub fn selects(&self, args: &[OsString]) -> bool {
        args.get(1).is_some_and(|token| self.lookup(token).is_some())
    }

    /// Runs the entry point selected by the first argument after the
    /// program name.
    ///
    /// Returns `None` when the process was not started with a registered
    /// token, so normal CLI handling should proceed. An entry point that
    /// fails is logged and yields the init failure exit code.
    pub fn dispatch<I>(&self, args: I) -> Option<i32>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut args = args.into_iter().skip(1);
        let token = args.next()?;
        let (name, entry) = self.lookup(&token)?;
        let rest: Vec<OsString> = args.collect();
        tracing::debug!(token = name, args = rest.len(), "dispatching re-executed entry point");
        match entry(&rest) {
            Ok(code) => Some(code),
            Err(e) => {
                tracing::error!(stage = e.stage_name(), error = %e, "container init failed");
                Some(INIT_FAILURE_EXIT_CODE)
            }
        }
    }

    fn lookup(&self, token: &OsStr) -> Option<(&'static str, EntryPoint)> {
        self.entries
            .iter()
            .find(|(name, _)| OsStr::new(name) == token)
            .copied()
    }
}

/// The dispatch table of the rootcell binary.
#[must_use]
pub fn dispatcher() -> Dispatcher {
    Dispatcher::new().register(INIT_TOKEN, crate::entry::run)
}

/// Builds a command that re-executes `executable` with `token`.
#[must_use]
pub fn command(executable: &OsStr, token: &str) -> Command {
    let mut command = Command::new(executable);
    let _ = command.arg(token);
    command
}

#[cfg(test)]
mod tests {
    use rootcell_common::error::RootcellError;

    use super::*;

    fn answer(args: &[OsString]) -> Result<i32> {
        Ok(i32::try_from(args.len()).unwrap() + 40)
    }

    fn broken(_args: &[OsString]) -> Result<i32> {
        Err(RootcellError::Config {
            message: "no rootfs".into(),
        })
    }

    fn argv(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn registered_token_runs_entry_with_remaining_args() {
        let table = Dispatcher::new().register("__answer", answer);
        assert_eq!(table.dispatch(argv(&["rootcell", "__answer", "a", "b"])), Some(42));
    }

    #[test]
    fn normal_invocation_is_not_dispatched() {
        let table = dispatcher();
        assert_eq!(table.dispatch(argv(&["rootcell"])), None);
        assert_eq!(table.dispatch(argv(&["rootcell", "--archive", "x.tar"])), None);
    }

    #[test]
    fn token_must_be_first_argument() {
        let table = Dispatcher::new().register("__answer", answer);
        assert!(table.selects(&argv(&["rootcell", "__answer"])));
        assert!(!table.selects(&argv(&["rootcell", "-v", "__answer"])));
        assert_eq!(table.dispatch(argv(&["rootcell", "-v", "__answer"])), None);
    }

    #[test]
    fn failing_entry_exits_with_init_failure_code() {
        let table = Dispatcher::new().register("__broken", broken);
        assert_eq!(
            table.dispatch(argv(&["rootcell", "__broken"])),
            Some(INIT_FAILURE_EXIT_CODE)
        );
    }

    #[test]
    fn command_passes_token_first() {
        let command = command(OsStr::new(SELF_EXE), INIT_TOKEN);
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, [OsStr::new(INIT_TOKEN)]);
        assert_eq!(command.get_program(), OsStr::new("/proc/self/exe"));
    }
}

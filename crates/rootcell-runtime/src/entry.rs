//! Namespace entry point.
//!
//! Runs inside the re-executed child, which already lives in the new
//! namespaces. It names the host, pivots into the staged root and then
//! runs an interactive shell as its own child, returning the shell's exit
//! status as its own. A failure before the shell starts is sent to the
//! launcher over the report pipe.

use std::ffi::OsString;
use std::os::fd::RawFd;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};

use rootcell_common::constants::PROMPT_ENV;
use rootcell_common::error::{Result, RootcellError};
use rootcell_core::filesystem::pivot_root;
use rootcell_core::namespace::uts;
use rootcell_core::signal::TerminalSignals;

use crate::report::Reporter;

/// How the container shell is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSettings {
    /// Shell executable, resolved inside the new root.
    pub shell: PathBuf,
    /// Hostname for the UTS namespace.
    pub hostname: String,
    /// Interactive prompt.
    pub prompt: String,
}

/// Arguments passed from the launcher to the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitArgs {
    /// Staged directory that becomes the new root.
    pub rootfs: PathBuf,
    /// Shell to hand off to.
    pub settings: ShellSettings,
    /// Inherited write end of the report pipe.
    pub report_fd: RawFd,
}

impl InitArgs {
    /// Serialises the arguments for the re-exec command line.
    #[must_use]
    pub fn to_args(&self) -> Vec<OsString> {
        vec![
            self.rootfs.clone().into_os_string(),
            self.settings.shell.clone().into_os_string(),
            OsString::from(&self.settings.hostname),
            OsString::from(&self.settings.prompt),
            OsString::from(self.report_fd.to_string()),
        ]
    }

    /// Parses the arguments produced by [`InitArgs::to_args`].
    ///
    /// # Errors
    ///
    /// Returns [`RootcellError::Config`] if an argument is missing, the
    /// hostname or prompt is not UTF-8, or the report descriptor is not a
    /// number.
    pub fn from_args(args: &[OsString]) -> Result<Self> {
        let [rootfs, shell, hostname, prompt, report_fd] = args else {
            return Err(RootcellError::Config {
                message: format!("entry point expects 5 arguments, got {}", args.len()),
            });
        };
        let text = |value: &OsString, what: &str| {
            value.to_str().map(str::to_owned).ok_or_else(|| RootcellError::Config {
                message: format!("{what} is not valid UTF-8"),
            })
        };
        Ok(Self {
            rootfs: PathBuf::from(rootfs),
            settings: ShellSettings {
                shell: PathBuf::from(shell),
                hostname: text(hostname, "hostname")?,
                prompt: text(prompt, "prompt")?,
            },
            report_fd: text(report_fd, "report descriptor")?
                .parse()
                .map_err(|e| RootcellError::Config {
                    message: format!("report descriptor is not a number: {e}"),
                })?,
        })
    }
}

/// Entry point registered under [`crate::reexec::INIT_TOKEN`].
///
/// # Errors
///
/// Returns an error if the arguments are malformed, the hostname cannot be
/// set, the pivot fails, or the shell cannot be started or waited on.
pub fn run(args: &[OsString]) -> Result<i32> {
    let init = InitArgs::from_args(args)?;
    let reporter = Reporter::adopt(init.report_fd)?;
    tracing::debug!(pid = std::process::id(), rootfs = %init.rootfs.display(), "entered namespaces");

    let _signals = TerminalSignals::ignore()
        .inspect_err(|e| tracing::warn!(error = %e, "cannot ignore terminal signals"))
        .ok();
    let shell = match enter_and_start(&init) {
        Ok(shell) => shell,
        Err(e) => {
            reporter.send(&e);
            return Err(e);
        }
    };
    drop(reporter);
    wait_for_shell(shell)
}

fn enter_and_start(init: &InitArgs) -> Result<Child> {
    uts::set_hostname(&init.settings.hostname)?;
    pivot_root::pivot(&init.rootfs)?;
    start_shell(&init.settings.shell, &init.settings.prompt)
}

/// Starts the shell on the inherited standard streams.
///
/// The shell sees only the prompt variable from the environment and gets
/// the default terminal signal dispositions back.
fn start_shell(shell: &Path, prompt: &str) -> Result<Child> {
    tracing::info!(shell = %shell.display(), "starting container shell");
    let mut command = Command::new(shell);
    let _ = command.env_clear().env(PROMPT_ENV, prompt);
    // SAFETY: the hook only calls sigaction(2).
    let _ = unsafe { command.pre_exec(TerminalSignals::reset_to_default) };
    command.spawn().map_err(|source| RootcellError::Spawn {
        message: format!("cannot start shell {}", shell.display()),
        source,
    })
}

fn wait_for_shell(mut shell: Child) -> Result<i32> {
    let status = shell.wait().map_err(|source| RootcellError::Spawn {
        message: "cannot wait for the container shell".into(),
        source,
    })?;
    tracing::debug!(%status, "container shell exited");
    Ok(exit_code(status))
}

/// Shell-style exit code for a finished process.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

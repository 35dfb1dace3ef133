//! Process spawning inside isolated namespaces.
//!
//! Re-executes the current binary with the init token. Between `fork(2)`
//! and `execve(2)` the child unshares every requested namespace and writes
//! its own UID/GID map, so the re-executed image starts as root inside a
//! fresh user namespace. Standard streams are inherited untouched to keep
//! the shell interactive. The child also gets the default terminal signal
//! dispositions back and the write end of the report pipe.

use std::ffi::OsString;
use std::os::fd::AsRawFd;
use std::os::unix::process::CommandExt;
use std::process::{ExitStatus, Stdio};

use rootcell_common::error::{Result, RootcellError};
use rootcell_common::types::StagedFilesystem;
use rootcell_core::namespace::NamespaceRequest;
use rootcell_core::signal::TerminalSignals;

use crate::entry::{InitArgs, ShellSettings};
use crate::reexec::{self, INIT_TOKEN, SELF_EXE};
use crate::report;

/// Starts the namespaced child and waits for it.
#[derive(Debug)]
pub struct Launcher {
    request: NamespaceRequest,
    executable: OsString,
}

impl Launcher {
    /// Creates a launcher that re-executes the running binary.
    #[must_use]
    pub fn new(request: NamespaceRequest) -> Self {
        Self {
            request,
            executable: OsString::from(SELF_EXE),
        }
    }

    /// Overrides the executable that is re-executed.
    #[must_use]
    pub fn with_executable(mut self, executable: impl Into<OsString>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Launches the entry point for `staged` and blocks until it exits.
    ///
    /// There is no timeout; the call lasts as long as the interactive
    /// shell does.
    ///
    /// # Errors
    ///
    /// Returns [`RootcellError::Spawn`] if the namespaces cannot be created,
    /// the identity mapping is refused, or the child cannot be executed or
    /// waited on. Returns [`RootcellError::Init`] if the entry point reported
    /// a failure before the shell started.
    pub fn launch(self, staged: &StagedFilesystem, settings: &ShellSettings) -> Result<ExitStatus> {
        let (reports, report_writer) = report::channel().map_err(|source| RootcellError::Spawn {
            message: "cannot open the init report pipe".into(),
            source,
        })?;
        let report_fd = report_writer.as_raw_fd();
        let init = InitArgs {
            rootfs: staged.path().to_path_buf(),
            settings: settings.clone(),
            report_fd,
        };
        let prepared = self.request.prepare();

        let mut command = reexec::command(&self.executable, INIT_TOKEN);
        let _ = command
            .args(init.to_args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        // SAFETY: the hook only issues sigaction(2), fcntl(2), unshare(2),
        // open(2), write(2) and close(2) on buffers built before the fork;
        // it never allocates.
        let _ = unsafe {
            command.pre_exec(move || {
                TerminalSignals::reset_to_default()?;
                report::inherit(report_fd)?;
                prepared.enter()
            })
        };

        let spawned = command.spawn();
        drop(report_writer);
        let mut child = spawned.map_err(|source| RootcellError::Spawn {
            message: format!("cannot start namespaced {INIT_TOKEN} process"),
            source,
        })?;
        tracing::info!(pid = child.id(), rootfs = %staged.path().display(), "container process started");

        let status = child.wait().map_err(|source| RootcellError::Spawn {
            message: "cannot wait for the container process".into(),
            source,
        })?;
        tracing::info!(%status, "container process exited");

        if let Some(failure) = reports.read()? {
            return Err(failure);
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::process::ExitStatusExt;
    use std::path::PathBuf;
    use std::process::Command;

    use super::*;

    const GROUP_INTERRUPT_DIR: &str = "ROOTCELL_GROUP_INTERRUPT_DIR";

    fn settings() -> ShellSettings {
        ShellSettings {
            shell: "/bin/sh".into(),
            hostname: "rootcell".into(),
            prompt: "# ".into(),
        }
    }

    #[test]
    fn new_launcher_reexecutes_itself() {
        let launcher = Launcher::new(NamespaceRequest::isolate_all(1000, 1000));
        assert_eq!(launcher.executable, OsString::from("/proc/self/exe"));
    }

    #[test]
    fn missing_executable_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedFilesystem::new(dir.path(), "alpine.tar");
        let err = Launcher::new(NamespaceRequest::for_current_user())
            .with_executable("/nonexistent/rootcell")
            .launch(&staged, &settings())
            .unwrap_err();
        assert!(matches!(err, RootcellError::Spawn { .. }));
        assert_eq!(err.stage_name(), "spawn");
    }

    /// Does the launcher's half of a run with a container process that
    /// interrupts its whole process group, and records how the launch ended.
    /// Only does something when started by `launcher_survives_group_interrupt`.
    #[test]
    #[ignore = "started in its own process group by launcher_survives_group_interrupt"]
    fn group_interrupt_launch() {
        let Some(dir) = std::env::var_os(GROUP_INTERRUPT_DIR).map(PathBuf::from) else {
            return;
        };
        let staged = StagedFilesystem::new(&dir, "alpine.tar");
        let signals = TerminalSignals::ignore().unwrap();
        let outcome = match Launcher::new(NamespaceRequest::for_current_user())
            .with_executable(dir.join("interrupt-group.sh"))
            .launch(&staged, &settings())
        {
            Ok(status) => format!("signal {:?}", status.signal()),
            Err(RootcellError::Spawn { .. }) => "unsupported".to_owned(),
            Err(e) => format!("error {e}"),
        };
        drop(signals);
        fs::write(dir.join("outcome"), outcome).unwrap();
    }

    #[test]
    fn launcher_survives_group_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("interrupt-group.sh");
        fs::write(&script, "#!/bin/sh\nkill -INT 0\nsleep 5\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let status = Command::new(std::env::current_exe().unwrap())
            .args([
                "--exact",
                "launcher::tests::group_interrupt_launch",
                "--ignored",
                "--test-threads=1",
            ])
            .env(GROUP_INTERRUPT_DIR, dir.path())
            .process_group(0)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();

        let outcome = fs::read_to_string(dir.path().join("outcome")).unwrap_or_default();
        if outcome == "unsupported" {
            return;
        }
        assert!(status.success(), "launching process died: {status}");
        assert_eq!(outcome, "signal Some(2)");
    }
}

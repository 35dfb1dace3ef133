//! Runtime engine that orchestrates one container invocation.
//!
//! stage → spawn and wait → cleanup, strictly in sequence. Cleanup runs on
//! every path out of the pipeline, and the first fatal error is the one
//! reported. Terminal interrupts are ignored for the whole run so that they
//! reach the container without killing the process that must clean up.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;

use rootcell_common::config::RootcellConfig;
use rootcell_common::error::{Result, RootcellError};
use rootcell_common::types::ChildStatus;
use rootcell_core::namespace::NamespaceRequest;
use rootcell_core::signal::TerminalSignals;
use rootcell_image::stage::Stager;

use crate::cleanup::StagingGuard;
use crate::entry::ShellSettings;
use crate::launcher::Launcher;

/// Everything one invocation needs, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Root filesystem archive.
    pub archive: PathBuf,
    /// Well-known staging directory.
    pub staging_dir: PathBuf,
    /// Shell started inside the container.
    pub shell: ShellSettings,
}

impl LaunchConfig {
    /// Builds the launch value from a loaded configuration, staging into
    /// the host's well-known staging directory.
    #[must_use]
    pub fn from_config(config: &RootcellConfig) -> Self {
        Self {
            archive: config.archive.clone(),
            staging_dir: rootcell_common::constants::staging_dir(),
            shell: ShellSettings {
                shell: config.shell.clone(),
                hostname: config.hostname.clone(),
                prompt: config.prompt.clone(),
            },
        }
    }
}

/// The runtime engine that coordinates a single container run.
#[derive(Debug)]
pub struct Engine {
    config: LaunchConfig,
}

impl Engine {
    /// Creates an engine for the given launch configuration.
    #[must_use]
    pub const fn new(config: LaunchConfig) -> Self {
        Self { config }
    }

    /// Returns the launch configuration.
    #[must_use]
    pub const fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Runs the full pipeline and removes the staging directory afterwards.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: staging, spawning, an abnormal shell
    /// exit, or cleanup. A cleanup failure after an earlier error is logged
    /// and the earlier error is returned.
    pub fn run(&self) -> Result<()> {
        let _signals = TerminalSignals::ignore()
            .inspect_err(|e| tracing::warn!(error = %e, "cannot ignore terminal signals"))
            .ok();
        let guard = StagingGuard::new(&self.config.staging_dir);
        let outcome = self.stage_and_launch();
        let cleanup = guard.release();

        match (outcome, cleanup) {
            (Ok(()), cleanup) => cleanup,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                tracing::error!(error = %cleanup_err, "cleanup also failed");
                Err(e)
            }
        }
    }

    fn stage_and_launch(&self) -> Result<()> {
        let staged = Stager::new(&self.config.staging_dir).stage(&self.config.archive)?;
        let status = Launcher::new(NamespaceRequest::for_current_user())
            .launch(&staged, &self.config.shell)?;
        check_exit(status)
    }
}

/// Turns an abnormal child exit into [`RootcellError::ChildExit`].
fn check_exit(status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    let status = match (status.code(), status.signal()) {
        (Some(code), _) => ChildStatus::Code(code),
        (None, Some(signal)) => ChildStatus::Signal(signal),
        (None, None) => ChildStatus::Code(1),
    };
    Err(RootcellError::ChildExit { status })
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::path::Path;

    use super::*;

    fn config(dir: &Path, archive: &str) -> LaunchConfig {
        LaunchConfig {
            archive: dir.join(archive),
            staging_dir: dir.join("staging"),
            shell: ShellSettings {
                shell: "/bin/sh".into(),
                hostname: "rootcell".into(),
                prompt: "# ".into(),
            },
        }
    }

    #[test]
    fn from_config_uses_well_known_staging_dir() {
        let launch = LaunchConfig::from_config(&RootcellConfig::default());
        assert!(launch.staging_dir.ends_with("rootcell"));
        assert_eq!(launch.archive, PathBuf::from("alpine.tar"));
        assert_eq!(launch.shell.shell, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn missing_archive_fails_in_stage_without_staging_dir() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(config(dir.path(), "missing.tar"));

        let err = engine.run().unwrap_err();
        assert_eq!(err.stage_name(), "stage");
        assert!(!engine.config().staging_dir.exists());
    }

    #[test]
    fn unsupported_entry_cleans_up_partial_stage() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("rootfs.tar");
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        builder
            .append_data(&mut header, "etc/", std::io::empty())
            .unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Char);
        header.set_mode(0o666);
        header.set_size(0);
        builder
            .append_data(&mut header, "dev/null", std::io::empty())
            .unwrap();
        builder.finish().unwrap();

        let engine = Engine::new(config(dir.path(), "rootfs.tar"));
        let err = engine.run().unwrap_err();
        assert!(matches!(err, RootcellError::Stage(_)));
        assert!(!engine.config().staging_dir.exists());
    }

    #[test]
    fn check_exit_maps_codes_and_signals() {
        assert!(check_exit(ExitStatus::from_raw(0)).is_ok());

        let err = check_exit(ExitStatus::from_raw(2 << 8)).unwrap_err();
        assert!(matches!(
            err,
            RootcellError::ChildExit {
                status: ChildStatus::Code(2)
            }
        ));

        let err = check_exit(ExitStatus::from_raw(15)).unwrap_err();
        assert_eq!(err.exit_code(), 143);
        assert_eq!(err.stage_name(), "shell");
    }
}

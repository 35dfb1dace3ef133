//! Launch settings and the run itself.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Args;
use rootcell_common::config::RootcellConfig;
use rootcell_common::error::Result;
use rootcell_runtime::engine::{Engine, LaunchConfig};

use crate::output;

/// Overrides for the launch settings.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Root filesystem archive (.tar).
    #[arg(long, env = "ROOTCELL_ARCHIVE")]
    pub archive: Option<PathBuf>,

    /// Shell to run inside the container.
    #[arg(long, env = "ROOTCELL_SHELL")]
    pub shell: Option<PathBuf>,

    /// Hostname inside the container.
    #[arg(long, env = "ROOTCELL_HOSTNAME")]
    pub hostname: Option<String>,
}

impl RunArgs {
    /// Folds the given overrides into `config`.
    pub fn apply(self, config: &mut RootcellConfig) {
        if let Some(archive) = self.archive {
            config.archive = archive;
        }
        if let Some(shell) = self.shell {
            config.shell = shell;
        }
        if let Some(hostname) = self.hostname {
            config.hostname = hostname;
        }
    }
}

/// Runs one container invocation.
///
/// # Errors
///
/// Returns the first fatal error of the launch pipeline.
pub fn execute(config: &RootcellConfig) -> Result<()> {
    let launch = LaunchConfig::from_config(config);
    if std::io::stderr().is_terminal() {
        output::print_banner(&launch.archive);
    }
    tracing::debug!(
        archive = %launch.archive.display(),
        staging = %launch.staging_dir.display(),
        "launching"
    );
    Engine::new(launch).run()
}

//! CLI definition and configuration resolution.

pub mod run;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rootcell_common::config::RootcellConfig;
use rootcell_common::constants::BIN_NAME;

/// rootcell: run a shell inside an isolated root filesystem.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: $HOME/.rootcell.yaml when present).
    #[arg(long, env = "ROOTCELL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Launch settings overriding the configuration file.
    #[command(flatten)]
    pub run: run::RunArgs,
}

/// Resolves configuration, installs logging and runs the launcher.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the launch
/// pipeline fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config_path = RootcellConfig::locate(cli.config.as_deref());
    let mut config = match &config_path {
        Some(path) => RootcellConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RootcellConfig::default(),
    };
    cli.run.apply(&mut config);

    crate::init_tracing(&config.log_level);
    if let Some(path) = &config_path {
        tracing::info!(path = %path.display(), "using config file");
    }

    run::execute(&config)?;
    Ok(())
}

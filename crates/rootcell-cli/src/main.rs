//! # rootcell
//!
//! Stages a root filesystem archive, enters fresh namespaces and hands the
//! terminal to a shell running inside it.

mod commands;
mod output;

use std::ffi::OsString;
use std::process::ExitCode;

use clap::Parser;
use rootcell_common::constants::{DEFAULT_LOG_LEVEL, INIT_FAILURE_EXIT_CODE};
use rootcell_common::error::RootcellError;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> ExitCode {
    let args: Vec<OsString> = std::env::args_os().collect();
    let dispatcher = rootcell_runtime::reexec::dispatcher();
    if dispatcher.selects(&args) {
        init_tracing(DEFAULT_LOG_LEVEL);
        let code = dispatcher.dispatch(args).unwrap_or(INIT_FAILURE_EXIT_CODE);
        return exit_code(code);
    }

    let cli = Cli::parse_from(args);
    match commands::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let known = e.downcast_ref::<RootcellError>();
            // A shell that exits non-zero is not a launcher failure.
            if known.is_none_or(|err| !matches!(err.stage_name(), "shell")) {
                output::report_failure(&e);
            }
            exit_code(known.map_or(1, RootcellError::exit_code))
        }
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `default_filter`.
pub(crate) fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

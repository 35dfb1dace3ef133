//! Terminal output for the CLI: banner and the failure report.
//!
//! Everything goes to stderr; stdout belongs to the container shell.

use std::io::IsTerminal;
use std::path::Path;

use rootcell_common::constants::APP_NAME;
use rootcell_common::error::RootcellError;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Prints the one-line startup banner.
pub fn print_banner(archive: &Path) {
    let size = std::fs::metadata(archive)
        .map(|meta| format!(" {DIM}({}){RESET}", archive_size(meta.len())))
        .unwrap_or_default();
    eprintln!(
        "  {BOLD}{APP_NAME}{RESET} {DIM}v{}{RESET}  launching {}{size}",
        env!("CARGO_PKG_VERSION"),
        archive.display()
    );
}

/// Reports a fatal error with the stage it belongs to.
pub fn report_failure(error: &anyhow::Error) {
    let line = failure_line(error);
    if std::io::stderr().is_terminal() {
        eprintln!("{RED}{BOLD}error{RESET}{line}");
    } else {
        eprintln!("error{line}");
    }
}

fn failure_line(error: &anyhow::Error) -> String {
    let stage = error
        .downcast_ref::<RootcellError>()
        .map_or("cli", RootcellError::stage_name);
    format!(" [{stage}]: {error:#}")
}

/// Archive size in MiB, the unit root filesystem tarballs come in.
#[allow(clippy::cast_precision_loss)]
fn archive_size(bytes: u64) -> String {
    format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use rootcell_common::error::StageError;

    use super::*;

    #[test]
    fn archive_size_is_in_mib() {
        assert_eq!(archive_size(3_040_870), "2.9 MiB");
        assert_eq!(archive_size(0), "0.0 MiB");
    }

    #[test]
    fn failure_line_names_the_stage() {
        let error = anyhow::Error::new(RootcellError::from(StageError::UnsafePath {
            path: "../etc".into(),
        }));
        let line = failure_line(&error);
        assert!(line.starts_with(" [stage]: "));
        assert!(line.contains("../etc"));
    }

    #[test]
    fn context_keeps_the_stage_visible() {
        let error = anyhow::Error::new(RootcellError::Config {
            message: "unknown field".into(),
        })
        .context("loading configuration from rootcell.yaml");
        let line = failure_line(&error);
        assert!(line.starts_with(" [config]: loading configuration"));
        assert!(line.contains("unknown field"));
    }
}

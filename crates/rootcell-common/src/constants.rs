//! System-wide constants and default paths.

use std::path::PathBuf;

/// Application name shown in the CLI banner.
pub const APP_NAME: &str = "rootcell";

/// Binary name used by the CLI parser and its help output.
pub const BIN_NAME: &str = "rootcell";

/// Name of the staging directory under the platform temporary directory.
///
/// Every invocation stages into the same path, so only one container may
/// be active on a host at a time.
pub const STAGING_DIR_NAME: &str = "rootcell";

/// The only archive extension the stager accepts.
pub const ARCHIVE_EXTENSION: &str = "tar";

/// Archive looked up in the current working directory when none is given.
pub const DEFAULT_ARCHIVE: &str = "alpine.tar";

/// Shell launched inside the container.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Hostname set inside the container's UTS namespace.
pub const DEFAULT_HOSTNAME: &str = "rootcell";

/// Interactive prompt exported to the container shell as `PS1`.
pub const DEFAULT_PROMPT: &str = "-[rootcell]- # ";

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Directory, relative to the new root, where the old root is parked
/// during `pivot_root(2)`.
pub const PUT_OLD_DIR_NAME: &str = ".pivot_root";

/// Per-user configuration file looked up in `$HOME`.
pub const CONFIG_FILE_NAME: &str = ".rootcell.yaml";

/// Environment variable carrying the container shell prompt.
pub const PROMPT_ENV: &str = "PS1";

/// Exit status of the namespace entry point when it fails before the
/// shell starts, and of the launcher for such a failure.
///
/// A shell can exit with the same status, so the launcher does not infer
/// an init failure from it: the entry point reports the failure over its
/// report pipe, and only that report makes the run an init failure.
pub const INIT_FAILURE_EXIT_CODE: i32 = 125;

/// Returns the well-known staging directory for this host.
#[must_use]
pub fn staging_dir() -> PathBuf {
    std::env::temp_dir().join(STAGING_DIR_NAME)
}

/// Returns the per-user configuration file path, if `$HOME` is set.
#[must_use]
pub fn user_config_file() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
}

//! UTS namespace isolation.
//!
//! Allows the container to have its own hostname.

use rootcell_common::error::{Result, RootcellError};

/// Sets the hostname inside the UTS namespace.
///
/// Must run after the UTS namespace was created, or it renames the host.
///
/// # Errors
///
/// Returns an error if `sethostname(2)` fails.
pub fn set_hostname(hostname: &str) -> Result<()> {
    if hostname.is_empty() {
        return Err(RootcellError::Config {
            message: "hostname must not be empty".into(),
        });
    }
    nix::unistd::sethostname(hostname).map_err(|e| RootcellError::Namespace {
        operation: "sethostname",
        source: e.into(),
    })?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}

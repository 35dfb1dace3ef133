//! Staging directory teardown.
//!
//! [`StagingGuard`] owns the staging directory for the length of one
//! invocation. [`StagingGuard::release`] removes it and reports failure;
//! if the guard is dropped without being released, removal still happens
//! and a failure is logged.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use rootcell_common::error::{Result, RootcellError};

/// Guarantees removal of the staging directory.
#[derive(Debug)]
pub struct StagingGuard {
    path: PathBuf,
    released: bool,
}

impl StagingGuard {
    /// Takes ownership of the staging directory at `path`.
    ///
    /// The directory does not need to exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            released: false,
        }
    }

    /// Staging directory owned by this guard.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the staging directory tree.
    ///
    /// # Errors
    ///
    /// Returns [`RootcellError::Cleanup`] if the tree cannot be removed.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_staging_dir(&self.path)
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_staging_dir(&self.path) {
            tracing::error!(error = %e, "staging directory left behind");
        }
    }
}

/// Removes `path` recursively. An absent directory is not an error.
///
/// Read-only directories staged from the archive are made owner-writable
/// and removal is retried once.
///
/// # Errors
///
/// Returns [`RootcellError::Cleanup`] if the tree cannot be removed.
pub fn remove_staging_dir(path: &Path) -> Result<()> {
    let cleanup_error = |source| RootcellError::Cleanup {
        path: path.to_path_buf(),
        source,
    };
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no staging directory to remove");
            return Ok(());
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            tracing::debug!(path = %path.display(), "restoring write access before removal");
            restore_owner_access(path).map_err(cleanup_error)?;
            fs::remove_dir_all(path).map_err(cleanup_error)?;
        }
        Err(e) => return Err(cleanup_error(e)),
    }
    tracing::info!(path = %path.display(), "staging directory removed");
    Ok(())
}

/// Grants the owner `rwx` on every directory under `path`.
fn restore_owner_access(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(());
    }
    let mut permissions = meta.permissions();
    permissions.set_mode(permissions.mode() | 0o700);
    fs::set_permissions(path, permissions)?;
    for entry in fs::read_dir(path)? {
        restore_owner_access(&entry?.path())?;
    }
    Ok(())
}

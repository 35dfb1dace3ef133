//! Mount utilities for container filesystem setup.
//!
//! Thin wrappers over `mount(2)` and `umount2(2)` returning `io::Error`
//! so callers can attach them to their own error variants.

use std::io;
use std::path::Path;

use nix::mount::{MntFlags, MsFlags, mount, umount2};

/// Marks every mount in the current mount namespace as private.
///
/// Nothing mounted or unmounted afterwards propagates to the host.
///
/// # Errors
///
/// Returns the OS error if the remount fails.
pub fn make_mount_tree_private() -> io::Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )?;
    tracing::debug!("mount tree made private");
    Ok(())
}

/// Creates a recursive bind mount from source to target.
///
/// # Errors
///
/// Returns the OS error if the `mount(2)` syscall fails.
pub fn bind_mount(source: &Path, target: &Path) -> io::Result<()> {
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )?;
    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        "created bind mount"
    );
    Ok(())
}

/// Lazily detaches the mount at `target`, even if it is still busy.
///
/// # Errors
///
/// Returns the OS error if the `umount2(2)` syscall fails.
pub fn detach(target: &Path) -> io::Result<()> {
    umount2(target, MntFlags::MNT_DETACH)?;
    tracing::debug!(target = %target.display(), "mount detached");
    Ok(())
}

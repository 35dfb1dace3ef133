//! Secure root filesystem switching via `pivot_root(2)`.
//!
//! More secure than `chroot` because it actually changes the root mount
//! point rather than just the process's view of `/`, and the old root is
//! detached afterwards so nothing of the host stays reachable.

use std::path::{Path, PathBuf};

use rootcell_common::constants::PUT_OLD_DIR_NAME;
use rootcell_common::error::PivotError;

use super::mount;

/// How far a root switch has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PivotPhase {
    /// Nothing done yet.
    Prepared,
    /// Mount tree is private.
    Private,
    /// New root is bind mounted onto itself.
    Bound,
    /// Put-old directory exists under the new root.
    PutOldReady,
    /// Root switched; the old root sits on the put-old path.
    Switched,
    /// Working directory is the new `/`.
    Entered,
    /// Old root is unmounted.
    Detached,
    /// Put-old directory removed; the switch is complete.
    Complete,
}

/// An in-progress switch of the process root to a staged directory.
///
/// Only [`PivotPhase::Complete`] is a success. Any other phase at the
/// end of [`PivotTransaction::commit`] aborts the invocation.
#[derive(Debug)]
pub struct PivotTransaction {
    new_root: PathBuf,
    put_old: PathBuf,
    phase: PivotPhase,
}

impl PivotTransaction {
    /// Starts a transaction that will make `new_root` the process root.
    #[must_use]
    pub fn new(new_root: impl Into<PathBuf>) -> Self {
        let new_root = new_root.into();
        let put_old = new_root.join(PUT_OLD_DIR_NAME);
        Self {
            new_root,
            put_old,
            phase: PivotPhase::Prepared,
        }
    }

    /// Directory that becomes `/`.
    #[must_use]
    pub fn new_root(&self) -> &Path {
        &self.new_root
    }

    /// Where the old root is parked, as seen before the switch.
    #[must_use]
    pub fn put_old(&self) -> &Path {
        &self.put_old
    }

    /// Where the old root is parked, as seen after the switch.
    #[must_use]
    pub fn put_old_after_switch() -> PathBuf {
        Path::new("/").join(PUT_OLD_DIR_NAME)
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> PivotPhase {
        self.phase
    }

    /// Runs every remaining step in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns a pre-switch [`PivotError`] if the host was left untouched,
    /// or a post-switch one if the root changed but the old root could not
    /// be fully detached.
    pub fn commit(mut self) -> Result<(), PivotError> {
        tracing::info!(new_root = %self.new_root.display(), "performing pivot_root");
        let result = self.run_steps();
        if let Err(e) = &result {
            if e.is_post_switch() {
                tracing::error!(phase = ?self.phase, error = %e, "pivot left stale state behind");
            } else {
                tracing::error!(phase = ?self.phase, error = %e, "pivot aborted before the switch");
            }
        }
        result
    }

    fn run_steps(&mut self) -> Result<(), PivotError> {
        mount::make_mount_tree_private().map_err(|source| PivotError::MakePrivate { source })?;
        self.phase = PivotPhase::Private;

        // pivot_root(2) refuses a new root that is not a mount point.
        mount::bind_mount(&self.new_root, &self.new_root).map_err(|source| {
            PivotError::BindMount {
                path: self.new_root.clone(),
                source,
            }
        })?;
        self.phase = PivotPhase::Bound;

        match std::fs::create_dir(&self.put_old) {
            Ok(()) => {}
            Err(e)
                if e.kind() == std::io::ErrorKind::AlreadyExists
                    && std::fs::symlink_metadata(&self.put_old).is_ok_and(|m| m.is_dir()) => {}
            Err(source) => {
                return Err(PivotError::CreatePutOld {
                    path: self.put_old.clone(),
                    source,
                });
            }
        }
        self.phase = PivotPhase::PutOldReady;

        nix::unistd::pivot_root(&self.new_root, &self.put_old).map_err(|e| {
            PivotError::PivotRoot {
                new_root: self.new_root.clone(),
                source: e.into(),
            }
        })?;
        self.phase = PivotPhase::Switched;

        nix::unistd::chdir("/").map_err(|e| PivotError::Chdir { source: e.into() })?;
        self.phase = PivotPhase::Entered;

        let put_old = Self::put_old_after_switch();
        mount::detach(&put_old).map_err(|source| PivotError::UnmountPutOld {
            path: put_old.clone(),
            source,
        })?;
        self.phase = PivotPhase::Detached;

        std::fs::remove_dir(&put_old).map_err(|source| PivotError::RemovePutOld {
            path: put_old.clone(),
            source,
        })?;
        self.phase = PivotPhase::Complete;

        tracing::info!("root filesystem switched");
        Ok(())
    }
}

/// Makes `new_root` the root filesystem of the calling process.
///
/// The caller must already be alone in a fresh mount namespace.
///
/// # Errors
///
/// See [`PivotTransaction::commit`].
pub fn pivot(new_root: &Path) -> Result<(), PivotError> {
    PivotTransaction::new(new_root).commit()
}

#[cfg(test)]
mod tests {
    use nix::sched::{CloneFlags, unshare};
    use nix::sys::wait::{WaitStatus, waitpid};
    use nix::unistd::{ForkResult, fork};

    use super::*;

    const EXPECTED_FAILURE: i32 = 0;
    const UNEXPECTED_OUTCOME: i32 = 1;
    const NO_USER_NAMESPACES: i32 = 77;

    /// Runs `check` on `new_root` in a forked child that owns fresh user and
    /// mount namespaces. Returns `None` when the host refuses to create them.
    #[allow(unsafe_code)]
    fn pivot_in_private_namespaces(
        new_root: &Path,
        check: fn(Result<(), PivotError>) -> bool,
    ) -> Option<bool> {
        // SAFETY: the forked child is single-threaded; it unshares, runs
        // the pivot and leaves through _exit without returning to the harness.
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                let flags = CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNS;
                let code = if unshare(flags).is_err() {
                    NO_USER_NAMESPACES
                } else if check(pivot(new_root)) {
                    EXPECTED_FAILURE
                } else {
                    UNEXPECTED_OUTCOME
                };
                // SAFETY: ends the forked child immediately.
                unsafe { libc::_exit(code) }
            }
            ForkResult::Parent { child } => match waitpid(child, None).unwrap() {
                WaitStatus::Exited(_, NO_USER_NAMESPACES) => None,
                WaitStatus::Exited(_, code) => Some(code == EXPECTED_FAILURE),
                other => panic!("pivot child ended with {other:?}"),
            },
        }
    }

    #[test]
    fn missing_new_root_fails_before_the_switch() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never-staged");

        let outcome = pivot_in_private_namespaces(&missing, |result| {
            matches!(&result, Err(e @ PivotError::BindMount { .. }) if !e.is_post_switch())
        });
        if let Some(ok) = outcome {
            assert!(ok, "pivot into a missing root did not fail with BindMount");
        }
        assert!(!missing.exists());
    }

    #[test]
    fn put_old_blocked_by_a_file_fails_before_the_switch() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("rootfs");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join(PUT_OLD_DIR_NAME), b"not a directory").unwrap();

        let outcome = pivot_in_private_namespaces(&root, |result| {
            matches!(&result, Err(e @ PivotError::CreatePutOld { .. }) if !e.is_post_switch())
        });
        if let Some(ok) = outcome {
            assert!(ok, "a file on the put-old path did not fail with CreatePutOld");
        }
        assert!(root.join(PUT_OLD_DIR_NAME).is_file());
    }

    #[test]
    fn put_old_lives_inside_new_root() {
        let tx = PivotTransaction::new("/tmp/rootcell");
        assert_eq!(tx.new_root(), Path::new("/tmp/rootcell"));
        assert_eq!(tx.put_old(), Path::new("/tmp/rootcell/.pivot_root"));
        assert!(tx.put_old().starts_with(tx.new_root()));
    }

    #[test]
    fn put_old_after_switch_is_rooted() {
        assert_eq!(
            PivotTransaction::put_old_after_switch(),
            PathBuf::from("/.pivot_root")
        );
    }

    #[test]
    fn new_transaction_has_done_nothing() {
        let tx = PivotTransaction::new("/tmp/rootcell");
        assert_eq!(tx.phase(), PivotPhase::Prepared);
    }

    #[test]
    fn phases_are_ordered() {
        assert!(PivotPhase::Bound < PivotPhase::Switched);
        assert!(PivotPhase::Switched < PivotPhase::Detached);
        assert!(PivotPhase::Detached < PivotPhase::Complete);
    }
}

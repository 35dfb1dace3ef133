//! Unified error types for the rootcell workspace.
//!
//! Every failure in the launch pipeline is terminal to the invocation.
//! The variants of [`RootcellError`] line up with the pipeline stages so
//! the single top-level handler can say which stage failed.

use std::path::PathBuf;

use thiserror::Error;

use crate::constants::INIT_FAILURE_EXIT_CODE;
use crate::types::ChildStatus;

/// Failure while unpacking an archive into the staging directory.
#[derive(Debug, Error)]
pub enum StageError {
    /// The archive does not carry the supported extension.
    #[error("unsupported archive format for {path}: expected .tar, got {extension:?}")]
    UnsupportedFormat {
        /// Path of the rejected archive.
        path: PathBuf,
        /// Extension found on the path, if any.
        extension: Option<String>,
    },

    /// The archive file could not be opened.
    #[error("cannot open archive {path}: {source}")]
    Open {
        /// Path of the archive.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The archive stream is corrupt or unreadable.
    #[error("cannot read archive {path}: {source}")]
    ArchiveRead {
        /// Path of the archive.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A regular-file payload ended before the size recorded in its header.
    #[error("truncated payload for {path}: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Entry path inside the archive.
        path: PathBuf,
        /// Size recorded in the entry header.
        expected: u64,
        /// Bytes actually copied.
        actual: u64,
    },

    /// The archive contains an entry type the stager does not create.
    #[error("unsupported entry type {kind} for {path}")]
    UnsupportedEntryType {
        /// Entry path inside the archive.
        path: PathBuf,
        /// Debug name of the entry type.
        kind: String,
    },

    /// An entry name would resolve outside the staging directory.
    #[error("entry path escapes the staging directory: {path}")]
    UnsafePath {
        /// Offending entry path.
        path: PathBuf,
    },

    /// Creating a node or restoring its metadata failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Failure while switching the root filesystem.
///
/// Pre-switch variants leave the host untouched. Post-switch variants mean
/// the process already runs under the new root but a stale mount or
/// directory was left behind.
#[derive(Debug, Error)]
pub enum PivotError {
    /// Remounting the mount tree as private failed.
    #[error("cannot make mount tree private: {source}")]
    MakePrivate {
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The recursive self bind mount of the new root failed.
    #[error("cannot bind mount {path} onto itself: {source}")]
    BindMount {
        /// New root path.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The put-old directory could not be created.
    #[error("cannot create put-old directory {path}: {source}")]
    CreatePutOld {
        /// Put-old path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `pivot_root(2)` itself failed.
    #[error("pivot_root into {new_root} failed: {source}")]
    PivotRoot {
        /// New root path.
        new_root: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Changing into the new root failed.
    #[error("cannot chdir to new root: {source}")]
    Chdir {
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The old root could not be detached.
    #[error("cannot unmount old root at {path}: {source}")]
    UnmountPutOld {
        /// Put-old path inside the new root.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The put-old directory could not be removed.
    #[error("cannot remove put-old directory {path}: {source}")]
    RemovePutOld {
        /// Put-old path inside the new root.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl PivotError {
    /// Returns `true` when the root was already switched when this error hit.
    #[must_use]
    pub const fn is_post_switch(&self) -> bool {
        matches!(
            self,
            Self::Chdir { .. } | Self::UnmountPutOld { .. } | Self::RemovePutOld { .. }
        )
    }
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum RootcellError {
    /// Staging the root filesystem failed.
    #[error("stage failed: {0}")]
    Stage(#[from] StageError),

    /// The namespaced child could not be created.
    #[error("spawn failed: {message}: {source}")]
    Spawn {
        /// What was being attempted.
        message: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Switching the root filesystem failed.
    #[error("pivot failed: {0}")]
    Pivot(#[from] PivotError),

    /// A namespace-scoped operation other than the pivot failed.
    #[error("{operation} failed: {source}")]
    Namespace {
        /// Name of the failed operation.
        operation: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The namespace entry point reported a failure before the shell ran.
    #[error("container init failed: {message}")]
    Init {
        /// Stage the entry point was in when it failed.
        stage: &'static str,
        /// The entry point's error message.
        message: String,
    },

    /// The namespaced shell terminated abnormally.
    #[error("container shell {status}")]
    ChildExit {
        /// How the child terminated.
        status: ChildStatus,
    },

    /// Removing the staging directory failed.
    #[error("cleanup of {path} failed: {source}")]
    Cleanup {
        /// Staging directory path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

impl RootcellError {
    /// Name of the pipeline stage this error belongs to.
    #[must_use]
    pub const fn stage_name(&self) -> &'static str {
        match self {
            Self::Stage(_) => "stage",
            Self::Spawn { .. } => "spawn",
            Self::Pivot(_) | Self::Namespace { .. } => "pivot",
            Self::Init { stage, .. } => *stage,
            Self::ChildExit { .. } => "shell",
            Self::Cleanup { .. } => "cleanup",
            Self::Config { .. } => "config",
        }
    }

    /// Process exit code reported for this error.
    ///
    /// A child's own exit code is propagated and an init failure exits
    /// [`INIT_FAILURE_EXIT_CODE`]; everything else exits `1`.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ChildExit { status } => status.exit_code(),
            Self::Init { .. } => INIT_FAILURE_EXIT_CODE,
            _ => 1,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RootcellError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err() -> std::io::Error {
        std::io::Error::from(std::io::ErrorKind::PermissionDenied)
    }

    #[test]
    fn pivot_errors_split_at_the_switch() {
        assert!(!PivotError::MakePrivate { source: io_err() }.is_post_switch());
        assert!(
            !PivotError::PivotRoot {
                new_root: "/tmp/rootcell".into(),
                source: io_err(),
            }
            .is_post_switch()
        );
        assert!(PivotError::Chdir { source: io_err() }.is_post_switch());
        assert!(
            PivotError::UnmountPutOld {
                path: "/.pivot_root".into(),
                source: io_err(),
            }
            .is_post_switch()
        );
    }

    #[test]
    fn stage_names_identify_the_failing_stage() {
        let stage = RootcellError::from(StageError::UnsafePath {
            path: "../etc".into(),
        });
        assert_eq!(stage.stage_name(), "stage");

        let shell = RootcellError::ChildExit {
            status: ChildStatus::Code(3),
        };
        assert_eq!(shell.stage_name(), "shell");

        let shell_exit_125 = RootcellError::ChildExit {
            status: ChildStatus::Code(INIT_FAILURE_EXIT_CODE),
        };
        assert_eq!(shell_exit_125.stage_name(), "shell");

        let init = RootcellError::Init {
            stage: "pivot",
            message: "cannot bind mount /tmp/rootcell onto itself".into(),
        };
        assert_eq!(init.stage_name(), "pivot");
        assert_eq!(init.exit_code(), INIT_FAILURE_EXIT_CODE);
    }

    #[test]
    fn exit_code_propagates_child_status() {
        let err = RootcellError::ChildExit {
            status: ChildStatus::Code(42),
        };
        assert_eq!(err.exit_code(), 42);

        let err = RootcellError::ChildExit {
            status: ChildStatus::Signal(9),
        };
        assert_eq!(err.exit_code(), 137);

        let err = RootcellError::Cleanup {
            path: "/tmp/rootcell".into(),
            source: io_err(),
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn display_names_the_archive() {
        let err = StageError::UnsupportedFormat {
            path: "rootfs.zip".into(),
            extension: Some("zip".into()),
        };
        let text = err.to_string();
        assert!(text.contains("rootfs.zip"));
        assert!(text.contains("zip"));
    }
}

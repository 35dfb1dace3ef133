//! Domain primitive types used across the rootcell workspace.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// A root filesystem unpacked onto local storage.
///
/// Owned by the invocation that created it. It lives from the moment the
/// stager creates the directory until the cleanup guard removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFilesystem {
    path: PathBuf,
    archive: PathBuf,
    created_at: DateTime<Utc>,
}

impl StagedFilesystem {
    /// Records a staged filesystem created now.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, archive: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            archive: archive.into(),
            created_at: Utc::now(),
        }
    }

    /// Absolute path of the staging directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive the filesystem was unpacked from.
    #[must_use]
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// When staging started.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// How a namespaced child terminated abnormally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    /// Exited with a non-zero code.
    Code(i32),
    /// Killed by a signal.
    Signal(i32),
}

impl ChildStatus {
    /// Shell-style exit code: the code itself, or `128 + signal`.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Code(code) => code,
            Self::Signal(signal) => 128 + signal,
        }
    }
}

impl fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exited with status {code}"),
            Self::Signal(signal) => write!(f, "was killed by signal {signal}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_filesystem_keeps_paths() {
        let staged = StagedFilesystem::new("/tmp/rootcell", "alpine.tar");
        assert_eq!(staged.path(), Path::new("/tmp/rootcell"));
        assert_eq!(staged.archive(), Path::new("alpine.tar"));
        assert!(staged.created_at() <= Utc::now());
    }

    #[test]
    fn child_status_display() {
        assert_eq!(ChildStatus::Code(2).to_string(), "exited with status 2");
        assert_eq!(ChildStatus::Signal(15).to_string(), "was killed by signal 15");
        assert_eq!(ChildStatus::Code(125).to_string(), "exited with status 125");
    }
}

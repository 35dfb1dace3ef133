//! Root filesystem staging.
//!
//! Unpacks an uncompressed tar archive into the staging directory,
//! reproducing each directory, regular file and symlink with its recorded
//! permission bits and timestamps. Any entry failure aborts the whole
//! stage; the partial tree is left for the cleanup guard to remove.

use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};

use rootcell_common::constants::ARCHIVE_EXTENSION;
use rootcell_common::error::StageError;
use rootcell_common::types::StagedFilesystem;

use crate::metadata::NodeMetadata;

/// Unpacks archives into a fixed staging directory.
#[derive(Debug, Clone)]
pub struct Stager {
    staging_dir: PathBuf,
}

impl Stager {
    /// Creates a stager writing into `staging_dir`.
    #[must_use]
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    /// Directory archives are unpacked into.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Unpacks `archive` into the staging directory.
    ///
    /// The archive is validated and opened before the staging directory is
    /// created, so a missing or misnamed archive leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] for an unsupported or unreadable archive,
    /// an unsupported or unsafe entry, or any filesystem failure.
    pub fn stage(&self, archive: &Path) -> Result<StagedFilesystem, StageError> {
        tracing::info!(
            archive = %archive.display(),
            target = %self.staging_dir.display(),
            "staging root filesystem"
        );
        check_format(archive)?;
        let file = File::open(archive).map_err(|source| StageError::Open {
            path: archive.to_path_buf(),
            source,
        })?;

        self.create_staging_dir()?;
        let staged = StagedFilesystem::new(&self.staging_dir, archive);

        let root = fs::canonicalize(&self.staging_dir).map_err(|source| StageError::Io {
            path: self.staging_dir.clone(),
            source,
        })?;
        let count = Unpacker::new(archive, &root).unpack(file)?;

        tracing::info!(entries = count, path = %root.display(), "root filesystem staged");
        Ok(staged)
    }

    fn create_staging_dir(&self) -> Result<(), StageError> {
        match fs::create_dir(&self.staging_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && self.staging_dir.is_dir() => {
                tracing::warn!(
                    path = %self.staging_dir.display(),
                    "staging directory already exists, reusing it"
                );
                Ok(())
            }
            Err(source) => Err(StageError::Io {
                path: self.staging_dir.clone(),
                source,
            }),
        }
    }
}

/// Rejects archives that are not plain `.tar` files.
fn check_format(archive: &Path) -> Result<(), StageError> {
    let extension = archive.extension().and_then(|e| e.to_str());
    if extension == Some(ARCHIVE_EXTENSION) {
        Ok(())
    } else {
        Err(StageError::UnsupportedFormat {
            path: archive.to_path_buf(),
            extension: extension.map(str::to_owned),
        })
    }
}

/// Maps an archive entry name onto a path under `root`.
///
/// Leading `/` and `.` components are dropped; `..` is refused.
fn entry_target(root: &Path, name: &Path) -> Result<PathBuf, StageError> {
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(StageError::UnsafePath {
                    path: name.to_path_buf(),
                });
            }
        }
    }
    Ok(root.join(relative))
}

/// One pass over an archive stream.
struct Unpacker<'a> {
    archive: &'a Path,
    root: &'a Path,
    deferred_dirs: Vec<(PathBuf, NodeMetadata)>,
}

impl<'a> Unpacker<'a> {
    const fn new(archive: &'a Path, root: &'a Path) -> Self {
        Self {
            archive,
            root,
            deferred_dirs: Vec::new(),
        }
    }

    fn read_error(&self, source: io::Error) -> StageError {
        StageError::ArchiveRead {
            path: self.archive.to_path_buf(),
            source,
        }
    }

    fn unpack<R: Read>(mut self, reader: R) -> Result<usize, StageError> {
        let mut archive = tar::Archive::new(reader);
        let mut count = 0;
        for entry in archive.entries().map_err(|e| self.read_error(e))? {
            let mut entry = entry.map_err(|e| self.read_error(e))?;
            if self.unpack_entry(&mut entry)? {
                count += 1;
            }
        }
        self.finish_dirs()?;
        Ok(count)
    }

    /// Creates the node for one entry. Returns `false` for metadata-only
    /// records that produce no node.
    fn unpack_entry<R: Read>(&mut self, entry: &mut tar::Entry<'_, R>) -> Result<bool, StageError> {
        let name = entry.path().map_err(|e| self.read_error(e))?.into_owned();
        let target = entry_target(self.root, &name)?;
        let meta = NodeMetadata::from_entry(entry).map_err(|e| self.read_error(e))?;
        let kind = entry.header().entry_type();

        match kind {
            tar::EntryType::Directory => {
                self.create_dir(&target)?;
                self.deferred_dirs.push((target, meta));
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                self.prepare_node(&target)?;
                let expected = entry.size();
                let mut file = File::create(&target).map_err(|e| io_error(&target, e))?;
                let actual = io::copy(entry, &mut file).map_err(|e| io_error(&target, e))?;
                drop(file);
                if actual != expected {
                    return Err(StageError::Truncated {
                        path: name,
                        expected,
                        actual,
                    });
                }
                meta.apply(&target).map_err(|e| io_error(&target, e))?;
            }
            tar::EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .map_err(|e| self.read_error(e))?
                    .ok_or_else(|| {
                        self.read_error(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("symlink {} has no target", name.display()),
                        ))
                    })?
                    .into_owned();
                self.prepare_node(&target)?;
                std::os::unix::fs::symlink(&link, &target).map_err(|e| io_error(&target, e))?;
                meta.apply_times(&target).map_err(|e| io_error(&target, e))?;
            }
            tar::EntryType::XGlobalHeader => {
                tracing::debug!(entry = %name.display(), "skipping global pax header");
                return Ok(false);
            }
            other => {
                return Err(StageError::UnsupportedEntryType {
                    path: name,
                    kind: format!("{other:?}"),
                });
            }
        }
        tracing::trace!(entry = %name.display(), ?kind, "staged entry");
        Ok(true)
    }

    /// Creates a directory, owner-writable until [`Self::finish_dirs`].
    fn create_dir(&self, target: &Path) -> Result<(), StageError> {
        self.ensure_within_root(target)?;
        if let Ok(existing) = fs::symlink_metadata(target) {
            if existing.is_dir() {
                return Ok(());
            }
            fs::remove_file(target).map_err(|e| io_error(target, e))?;
        }
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(target)
            .map_err(|e| io_error(target, e))
    }

    /// Makes room for a file or symlink at `target`.
    fn prepare_node(&self, target: &Path) -> Result<(), StageError> {
        self.ensure_within_root(target)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        match fs::symlink_metadata(target) {
            Ok(existing) if !existing.is_dir() => {
                fs::remove_file(target).map_err(|e| io_error(target, e))
            }
            _ => Ok(()),
        }
    }

    /// Refuses targets whose nearest existing ancestor resolves outside the
    /// staging root, e.g. through a symlink staged earlier.
    fn ensure_within_root(&self, target: &Path) -> Result<(), StageError> {
        if target == self.root {
            return Ok(());
        }
        let mut ancestor = target.parent();
        while let Some(dir) = ancestor {
            if fs::symlink_metadata(dir).is_ok() {
                let resolved = fs::canonicalize(dir).map_err(|e| io_error(dir, e))?;
                if resolved.starts_with(self.root) {
                    return Ok(());
                }
                break;
            }
            ancestor = dir.parent();
        }
        Err(StageError::UnsafePath {
            path: target.to_path_buf(),
        })
    }

    /// Applies directory modes and times once their contents exist,
    /// deepest first.
    fn finish_dirs(&mut self) -> Result<(), StageError> {
        for (path, meta) in self.deferred_dirs.drain(..).rev() {
            meta.apply(&path).map_err(|e| io_error(&path, e))?;
        }
        Ok(())
    }
}

fn io_error(path: &Path, source: io::Error) -> StageError {
    StageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

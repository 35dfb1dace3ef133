//! Permission and timestamp restoration for staged nodes.
//!
//! Content is written first, then permission bits, then timestamps,
//! since writing content updates the modification time.

use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::sys::time::TimeVal;

/// Mode and times recorded in an archive entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMetadata {
    mode: u32,
    atime: libc::time_t,
    mtime: libc::time_t,
}

impl NodeMetadata {
    /// Builds metadata from explicit values.
    #[must_use]
    pub const fn new(mode: u32, atime: libc::time_t, mtime: libc::time_t) -> Self {
        Self {
            mode: mode & 0o7777,
            atime,
            mtime,
        }
    }

    /// Reads mode and times from a tar entry.
    ///
    /// The access time comes from the PAX `atime` record, else the GNU
    /// header, else falls back to the modification time.
    ///
    /// # Errors
    ///
    /// Returns an error if a header field cannot be parsed.
    pub fn from_entry<R: Read>(entry: &mut tar::Entry<'_, R>) -> io::Result<Self> {
        let pax_atime = pax_atime(entry)?;
        let header = entry.header();
        let mode = header.mode()?;
        let mtime = to_time(header.mtime()?);
        let gnu_atime = header
            .as_gnu()
            .and_then(|gnu| gnu.atime().ok())
            .filter(|&t| t != 0)
            .map(to_time);
        let atime = pax_atime.or(gnu_atime).unwrap_or(mtime);
        Ok(Self::new(mode, atime, mtime))
    }

    /// Permission bits, including setuid, setgid and sticky.
    #[must_use]
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    /// Access time in seconds since the epoch.
    #[must_use]
    pub const fn atime(&self) -> libc::time_t {
        self.atime
    }

    /// Modification time in seconds since the epoch.
    #[must_use]
    pub const fn mtime(&self) -> libc::time_t {
        self.mtime
    }

    /// Applies the permission bits to `path`, following symlinks.
    ///
    /// # Errors
    ///
    /// Returns the error from `chmod(2)`.
    pub fn apply_mode(&self, path: &Path) -> io::Result<()> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(self.mode))
    }

    /// Applies access and modification times to `path` itself.
    ///
    /// Symlinks are not followed, so this also stamps the link node.
    ///
    /// # Errors
    ///
    /// Returns the error from `lutimes(3)`.
    pub fn apply_times(&self, path: &Path) -> io::Result<()> {
        nix::sys::stat::lutimes(
            path,
            &TimeVal::new(self.atime, 0),
            &TimeVal::new(self.mtime, 0),
        )?;
        Ok(())
    }

    /// Applies the mode and then the times.
    ///
    /// # Errors
    ///
    /// Returns the first failing syscall's error.
    pub fn apply(&self, path: &Path) -> io::Result<()> {
        self.apply_mode(path)?;
        self.apply_times(path)
    }
}

fn pax_atime<R: Read>(entry: &mut tar::Entry<'_, R>) -> io::Result<Option<libc::time_t>> {
    let Some(extensions) = entry.pax_extensions()? else {
        return Ok(None);
    };
    for extension in extensions {
        let extension = extension?;
        if extension.key() == Ok("atime") {
            return Ok(extension.value().ok().and_then(parse_pax_time));
        }
    }
    Ok(None)
}

/// Parses a PAX time value such as `1700000000.25`, dropping the fraction.
fn parse_pax_time(value: &str) -> Option<libc::time_t> {
    let seconds = value.split_once('.').map_or(value, |(secs, _)| secs);
    seconds.parse::<i64>().ok().map(to_time_signed)
}

fn to_time(seconds: u64) -> libc::time_t {
    libc::time_t::try_from(seconds).unwrap_or(libc::time_t::MAX)
}

#[allow(clippy::useless_conversion)]
fn to_time_signed(seconds: i64) -> libc::time_t {
    libc::time_t::try_from(seconds).unwrap_or(libc::time_t::MAX)
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::MetadataExt;

    use super::*;

    #[test]
    fn new_masks_file_type_bits() {
        let meta = NodeMetadata::new(0o100_755, 1, 2);
        assert_eq!(meta.mode(), 0o755);
    }

    #[test]
    fn pax_time_drops_fraction() {
        assert_eq!(parse_pax_time("1700000000.75"), Some(1_700_000_000));
        assert_eq!(parse_pax_time("42"), Some(42));
        assert_eq!(parse_pax_time("soon"), None);
    }

    #[test]
    fn apply_sets_mode_then_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        std::fs::write(&path, b"data").unwrap();

        NodeMetadata::new(0o640, 1_000_000, 2_000_000)
            .apply(&path)
            .unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.mode() & 0o7777, 0o640);
        assert_eq!(meta.atime(), 1_000_000);
        assert_eq!(meta.mtime(), 2_000_000);
    }

    #[test]
    fn apply_times_stamps_the_link_not_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        std::fs::write(&target, b"x").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let before = std::fs::metadata(&target).unwrap().mtime();

        NodeMetadata::new(0o777, 500, 600).apply_times(&link).unwrap();

        assert_eq!(std::fs::symlink_metadata(&link).unwrap().mtime(), 600);
        assert_eq!(std::fs::metadata(&target).unwrap().mtime(), before);
    }
}

//! User namespace isolation.
//!
//! Maps exactly one host identity to root inside the container. The map
//! files are written by the process that just unshared its user namespace,
//! which the kernel allows without privileges for a single-line mapping of
//! the writer's own effective ID.

use std::ffi::CStr;
use std::fmt;
use std::io;

/// A single UID or GID mapping entry.
///
/// The count is always 1: only the invoking user's identity is mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapping {
    container_id: u32,
    host_id: u32,
}

impl IdMapping {
    /// Maps `host_id` to root inside the namespace.
    #[must_use]
    pub const fn root_to(host_id: u32) -> Self {
        Self {
            container_id: 0,
            host_id,
        }
    }

    /// ID as seen inside the namespace.
    #[must_use]
    pub const fn container_id(self) -> u32 {
        self.container_id
    }

    /// ID as seen on the host.
    #[must_use]
    pub const fn host_id(self) -> u32 {
        self.host_id
    }

    /// Length of the mapped range.
    #[must_use]
    pub const fn count(self) -> u32 {
        1
    }
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.container_id, self.host_id, self.count())
    }
}

/// A write to a `/proc/self` control file, prepared ahead of `fork(2)`.
#[derive(Debug, Clone)]
pub struct ProcWrite {
    path: &'static CStr,
    data: Vec<u8>,
    optional: bool,
}

impl ProcWrite {
    /// Control file being written.
    #[must_use]
    pub const fn path(&self) -> &'static CStr {
        self.path
    }

    /// Bytes written to the file.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Writes the prepared bytes with raw syscalls.
    ///
    /// An optional file that does not exist is skipped.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `open(2)` or `write(2)`, or `EIO` on a
    /// short write.
    pub fn apply(&self) -> io::Result<()> {
        match write_control_file(self.path, &self.data) {
            Err(e) if self.optional && e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Builds the control-file writes for the given mappings.
///
/// `setgroups` must be denied before an unprivileged process may write
/// its `gid_map`; kernels older than 3.19 have no such file.
#[must_use]
pub fn id_map_writes(uid_map: IdMapping, gid_map: IdMapping) -> Vec<ProcWrite> {
    vec![
        ProcWrite {
            path: c"/proc/self/setgroups",
            data: b"deny".to_vec(),
            optional: true,
        },
        ProcWrite {
            path: c"/proc/self/uid_map",
            data: format!("{uid_map}\n").into_bytes(),
            optional: false,
        },
        ProcWrite {
            path: c"/proc/self/gid_map",
            data: format!("{gid_map}\n").into_bytes(),
            optional: false,
        },
    ]
}

/// Opens, writes and closes a control file without allocating.
#[allow(unsafe_code)]
fn write_control_file(path: &CStr, data: &[u8]) -> io::Result<()> {
    // SAFETY: `path` is a NUL-terminated string that outlives the call.
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `fd` is open and `data` points to `data.len()` readable bytes.
    let written = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) };
    let result = match usize::try_from(written) {
        Ok(n) if n == data.len() => Ok(()),
        Ok(_) => Err(io::Error::from_raw_os_error(libc::EIO)),
        Err(_) => Err(io::Error::last_os_error()),
    };
    // SAFETY: `fd` was opened above and is closed exactly once.
    let _ = unsafe { libc::close(fd) };
    result
}

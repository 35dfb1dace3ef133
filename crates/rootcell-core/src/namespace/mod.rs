//! Linux namespace management for container isolation.
//!
//! A [`NamespaceRequest`] names the namespaces to create and the identity
//! mapping for the new user namespace. It is turned into a
//! [`PreparedNamespaces`] before the child is forked, so that everything
//! the forked child runs before `execve(2)` is a plain syscall.

pub mod user;
pub mod uts;

use std::fmt;
use std::io;

use nix::sched::{CloneFlags, unshare};

pub use user::{IdMapping, ProcWrite};

/// Kinds of namespace a container can be isolated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// Private mount table.
    Mount,
    /// Private hostname and domain name.
    Uts,
    /// Private System V IPC objects and POSIX message queues.
    Ipc,
    /// Private process ID space; the first child becomes PID 1.
    Pid,
    /// Private network stack.
    Network,
    /// Private user and group identities.
    User,
}

impl NamespaceKind {
    /// Every namespace kind, in the order they are listed in logs.
    pub const ALL: [Self; 6] = [
        Self::Mount,
        Self::Uts,
        Self::Ipc,
        Self::Pid,
        Self::Network,
        Self::User,
    ];

    /// The `clone(2)`/`unshare(2)` flag for this kind.
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Network => CloneFlags::CLONE_NEWNET,
            Self::User => CloneFlags::CLONE_NEWUSER,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mount => "mnt",
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::Pid => "pid",
            Self::Network => "net",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// Namespaces to create for one container, with its identity mapping.
///
/// Built once per invocation and consumed when the child is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceRequest {
    kinds: Vec<NamespaceKind>,
    uid_map: IdMapping,
    gid_map: IdMapping,
}

impl NamespaceRequest {
    /// Requests every namespace kind, mapping the given host identity to
    /// root inside the container.
    #[must_use]
    pub fn isolate_all(host_uid: u32, host_gid: u32) -> Self {
        Self {
            kinds: NamespaceKind::ALL.to_vec(),
            uid_map: IdMapping::root_to(host_uid),
            gid_map: IdMapping::root_to(host_gid),
        }
    }

    /// Requests every namespace kind for the calling user's effective
    /// UID and GID.
    #[must_use]
    pub fn for_current_user() -> Self {
        Self::isolate_all(
            nix::unistd::geteuid().as_raw(),
            nix::unistd::getegid().as_raw(),
        )
    }

    /// Namespace kinds in this request.
    #[must_use]
    pub fn kinds(&self) -> &[NamespaceKind] {
        &self.kinds
    }

    /// The UID mapping entry.
    #[must_use]
    pub const fn uid_map(&self) -> IdMapping {
        self.uid_map
    }

    /// The GID mapping entry.
    #[must_use]
    pub const fn gid_map(&self) -> IdMapping {
        self.gid_map
    }

    /// Union of the clone flags of all requested kinds.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        self.kinds
            .iter()
            .fold(CloneFlags::empty(), |flags, kind| flags | kind.clone_flag())
    }

    /// Consumes the request and precomputes everything the forked child
    /// needs, so that [`PreparedNamespaces::enter`] never allocates.
    #[must_use]
    pub fn prepare(self) -> PreparedNamespaces {
        let writes = if self.kinds.contains(&NamespaceKind::User) {
            user::id_map_writes(self.uid_map, self.gid_map)
        } else {
            Vec::new()
        };
        tracing::debug!(
            namespaces = %self.kinds.iter().map(ToString::to_string).collect::<Vec<_>>().join(","),
            uid_map = %self.uid_map,
            gid_map = %self.gid_map,
            "namespace request prepared"
        );
        PreparedNamespaces {
            flags: self.clone_flags(),
            writes,
        }
    }
}

/// A namespace request ready to be entered from a freshly forked child.
#[derive(Debug, Clone)]
pub struct PreparedNamespaces {
    flags: CloneFlags,
    writes: Vec<ProcWrite>,
}

impl PreparedNamespaces {
    /// Flags passed to `unshare(2)`.
    #[must_use]
    pub const fn flags(&self) -> CloneFlags {
        self.flags
    }

    /// Proc files written after unsharing, in order.
    #[must_use]
    pub fn writes(&self) -> &[ProcWrite] {
        &self.writes
    }

    /// Unshares all requested namespaces and installs the identity mapping
    /// for the calling process.
    ///
    /// Only async-signal-safe syscalls run here, so this is safe to call
    /// between `fork(2)` and `execve(2)`. The PID namespace applies to the
    /// children of the caller, not the caller itself.
    ///
    /// # Errors
    ///
    /// Returns the OS error of the first failing syscall.
    pub fn enter(&self) -> io::Result<()> {
        unshare(self.flags).map_err(io::Error::from)?;
        for write in &self.writes {
            write.apply()?;
        }
        Ok(())
    }
}

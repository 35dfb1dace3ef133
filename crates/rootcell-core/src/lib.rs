//! # rootcell-core
//!
//! Low-level Linux isolation primitives for the rootcell launcher.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: the mount, UTS, IPC, PID, network and user namespace
//!   request, plus the single-entry UID/GID mapping.
//! - **Filesystem**: private propagation, self bind mounts and the
//!   `pivot_root(2)` transaction that confines a process to a staged root.
//! - **Signals**: ignoring terminal signals while a container runs in the
//!   foreground.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

#[cfg(not(target_os = "linux"))]
compile_error!("rootcell-core only supports Linux");

pub mod filesystem;
pub mod namespace;
pub mod signal;

//! Filesystem management for container isolation.
//!
//! Provides mount helpers and the `pivot_root` transaction used to switch
//! the container onto its staged root filesystem.

pub mod mount;
pub mod pivot_root;

//! # rootcell-image
//!
//! Root filesystem staging for the rootcell launcher.
//!
//! Handles:
//! - **Staging**: unpacking an uncompressed tar archive into the
//!   well-known staging directory.
//! - **Metadata**: restoring permission bits and access/modification
//!   times exactly as recorded in the archive.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod metadata;
pub mod stage;

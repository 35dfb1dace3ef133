//! Launch pipeline for the rootcell container launcher.
//!
//! The pipeline runs strictly in sequence: stage the archive, re-execute
//! this binary inside fresh namespaces, pivot into the staged root, hand
//! off to a shell, wait, then remove the staging directory.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cleanup;
pub mod engine;
pub mod entry;
pub mod launcher;
pub mod reexec;
pub mod report;

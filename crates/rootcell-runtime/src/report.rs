//! Failure report from the namespace entry point to the launcher.
//!
//! The launcher opens a pipe and lets the child inherit its write end.
//! If the entry point fails before the shell runs it writes one
//! `<stage>\t<message>` line there. The shell never sees the descriptor,
//! so whatever status it exits with, a report means an init failure and
//! no report means the shell ran.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use nix::fcntl::OFlag;
use rootcell_common::error::{Result, RootcellError};

/// Read end kept by the launcher.
#[derive(Debug)]
pub struct ReportReader {
    file: File,
}

/// Opens the report pipe. Both ends are close-on-exec; the launcher hands
/// the write end over with [`inherit`] in the forked child.
///
/// # Errors
///
/// Returns the OS error from `pipe2(2)`.
pub fn channel() -> io::Result<(ReportReader, OwnedFd)> {
    let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;
    Ok((
        ReportReader {
            file: File::from(read),
        },
        write,
    ))
}

/// Clears close-on-exec on `fd` so the re-executed image inherits it.
///
/// Async-signal-safe; runs between `fork(2)` and `execve(2)`.
///
/// # Errors
///
/// Returns the OS error from `fcntl(2)`.
pub fn inherit(fd: RawFd) -> io::Result<()> {
    set_fd_flags(fd, 0)
}

fn set_fd_flags(fd: RawFd, flags: libc::c_int) -> io::Result<()> {
    // SAFETY: F_SETFD only changes descriptor flags; an invalid `fd` makes
    // the call fail with EBADF.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl ReportReader {
    /// Reads the report after the child exited.
    ///
    /// Returns `None` when the entry point reached the shell.
    ///
    /// # Errors
    ///
    /// Returns [`RootcellError::Spawn`] if the pipe cannot be read.
    pub fn read(mut self) -> Result<Option<RootcellError>> {
        let mut text = String::new();
        let _ = self
            .file
            .read_to_string(&mut text)
            .map_err(|source| RootcellError::Spawn {
                message: "cannot read the container init report".into(),
                source,
            })?;
        Ok(parse(&text))
    }
}

fn parse(text: &str) -> Option<RootcellError> {
    let line = text.lines().next().filter(|line| !line.is_empty())?;
    let (stage, message) = line.split_once('\t').unwrap_or(("pivot", line));
    Some(RootcellError::Init {
        stage: known_stage(stage),
        message: message.to_owned(),
    })
}

fn known_stage(stage: &str) -> &'static str {
    match stage {
        "spawn" => "spawn",
        "config" => "config",
        _ => "pivot",
    }
}

/// Write end adopted by the entry point.
#[derive(Debug)]
pub struct Reporter {
    file: File,
}

impl Reporter {
    /// Takes ownership of the inherited descriptor and marks it
    /// close-on-exec so the shell does not inherit it.
    ///
    /// # Errors
    ///
    /// Returns [`RootcellError::Config`] if `fd` is not an open descriptor.
    pub fn adopt(fd: RawFd) -> Result<Self> {
        set_fd_flags(fd, libc::FD_CLOEXEC).map_err(|e| RootcellError::Config {
            message: format!("report descriptor {fd} is unusable: {e}"),
        })?;
        // SAFETY: the launcher passed this descriptor for the entry point
        // alone and it was just checked to be open.
        let file = unsafe { File::from_raw_fd(fd) };
        Ok(Self { file })
    }

    /// Sends `error` to the launcher.
    ///
    /// A failed write is logged; the entry point still exits with the init
    /// failure status.
    pub fn send(mut self, error: &RootcellError) {
        let line = format!("{}\t{}\n", error.stage_name(), single_line(&error.to_string()));
        if let Err(e) = self.file.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "cannot report init failure to the launcher");
        }
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\n', '\t'], " ")
}

#[cfg(test)]
mod tests {
    use std::os::fd::IntoRawFd;

    use super::*;

    #[test]
    fn empty_report_means_the_shell_ran() {
        assert!(parse("").is_none());
    }

    #[test]
    fn report_keeps_stage_and_message() {
        let err = parse("pivot\tpivot failed: cannot bind mount /tmp/rootcell onto itself\n")
            .unwrap();
        assert_eq!(err.stage_name(), "pivot");
        assert!(err.to_string().contains("cannot bind mount"));

        let err = parse("spawn\tspawn failed: cannot start shell /bin/sh\n").unwrap();
        assert_eq!(err.stage_name(), "spawn");
    }

    #[test]
    fn unknown_stage_is_reported_as_pivot() {
        let err = parse("sethostname failed").unwrap();
        assert_eq!(err.stage_name(), "pivot");
    }

    #[test]
    fn report_crosses_the_pipe() {
        let (reader, writer) = channel().unwrap();
        let reporter = Reporter::adopt(writer.into_raw_fd()).unwrap();
        reporter.send(&RootcellError::Namespace {
            operation: "sethostname",
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        });

        let err = reader.read().unwrap().unwrap();
        assert_eq!(err.stage_name(), "pivot");
        assert!(err.to_string().contains("sethostname failed"));
    }

    #[test]
    fn closed_writer_without_report_reads_none() {
        let (reader, writer) = channel().unwrap();
        drop(writer);
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn adopting_an_invalid_descriptor_fails() {
        let err = Reporter::adopt(-1).unwrap_err();
        assert!(matches!(err, RootcellError::Config { .. }));
    }
}

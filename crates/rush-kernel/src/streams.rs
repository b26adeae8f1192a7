//! Standard-stream plumbing.
//!
//! A [`Stream`] is one slot of a command's stdin/stdout/stderr triple:
//! either the shell's own inherited descriptor or an open file (which is
//! also how pipe ends travel). Cloning is cheap; a `File` stream closes its
//! descriptor when the last clone drops, which is what makes the pipeline
//! "parent closes its ends after both peers start" rule fall out of
//! ownership.

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::process::Stdio;
use std::sync::Arc;

/// One stream slot.
#[derive(Debug, Clone)]
pub enum Stream {
    /// The shell process's stdin.
    Stdin,
    /// The shell process's stdout.
    Stdout,
    /// The shell process's stderr.
    Stderr,
    /// An open file or pipe end, shared by reference count.
    File(Arc<File>),
}

impl Stream {
    /// Write a shell diagnostic to this stream. Used with the stderr slot
    /// for errors that are consumed mid-tree and would otherwise never
    /// reach the driver.
    pub fn report(&self, msg: impl std::fmt::Display) {
        use std::io::Write;
        let line = format!("rush: {msg}\n");
        let _ = match self {
            Stream::File(f) => (&**f).write_all(line.as_bytes()),
            Stream::Stdout => io::stdout().write_all(line.as_bytes()),
            _ => io::stderr().write_all(line.as_bytes()),
        };
    }

    /// Duplicate the underlying descriptor for handing to a child process.
    pub fn to_stdio(&self) -> io::Result<Stdio> {
        let fd: OwnedFd = match self {
            Stream::Stdin => io::stdin().as_fd().try_clone_to_owned()?,
            Stream::Stdout => io::stdout().as_fd().try_clone_to_owned()?,
            Stream::Stderr => io::stderr().as_fd().try_clone_to_owned()?,
            Stream::File(f) => f.as_fd().try_clone_to_owned()?,
        };
        Ok(Stdio::from(fd))
    }
}

/// The stdin/stdout/stderr triple a command starts with.
#[derive(Debug, Clone)]
pub struct Streams {
    pub stdin: Stream,
    pub stdout: Stream,
    pub stderr: Stream,
}

impl Streams {
    /// The shell's own streams, the triple every top-level command gets.
    pub fn inherited() -> Self {
        Self {
            stdin: Stream::Stdin,
            stdout: Stream::Stdout,
            stderr: Stream::Stderr,
        }
    }

    pub fn get(&self, fd: u32) -> Option<&Stream> {
        match fd {
            0 => Some(&self.stdin),
            1 => Some(&self.stdout),
            2 => Some(&self.stderr),
            _ => None,
        }
    }

    /// Replace one slot. Returns false for descriptors outside 0..=2.
    pub fn set(&mut self, fd: u32, stream: Stream) -> bool {
        match fd {
            0 => self.stdin = stream,
            1 => self.stdout = stream,
            2 => self.stderr = stream,
            _ => return false,
        }
        true
    }
}

/// An anonymous pipe, both ends as plain files.
pub fn os_pipe() -> io::Result<(File, File)> {
    let (r, w) = io::pipe()?;
    Ok((File::from(OwnedFd::from(r)), File::from(OwnedFd::from(w))))
}

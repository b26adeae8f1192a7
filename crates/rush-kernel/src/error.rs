//! Error types shared across the kernel.

use std::io;

use thiserror::Error;

/// Everything that can go wrong between reading source text and reaping a
/// child process.
///
/// `Incomplete` is special: it means the input ended in the middle of a
/// construct (an open quote, an unterminated `if`, a trailing `|`). The REPL
/// reacts by reading another line instead of reporting an error.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("syntax error: {0}")]
    Parse(String),

    #[error("unexpected end of input")]
    Incomplete,

    #[error("{0}")]
    Expansion(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{name}: command not found")]
    NotFound { name: String },

    #[error("{name}: permission denied")]
    NotExecutable { name: String },

    #[error("{0}")]
    BuiltinUsage(String),

    #[error("{name}: {source}")]
    Process { name: String, source: io::Error },
}

impl ShellError {
    /// True when the parser ran out of input mid-construct and the caller
    /// should supply another line.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ShellError::Incomplete)
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;

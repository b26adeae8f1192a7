//! The rush execution engine.
//!
//! rush is a command interpreter in the POSIX shell tradition. This crate
//! is everything below the prompt: source text goes through the
//! [`lexer`] and [`parser`] into an immutable command tree
//! ([`ast::CommandNode`]), and [`exec::start`] evaluates that tree against
//! a [`Shell`] and a [`Streams`] triple, yielding a [`RunningJob`] whose
//! `wait()` produces exactly one [`JobOutcome`].
//!
//! # A complete round trip
//!
//! ```no_run
//! use rush_kernel::{exec, parser, JobOutcome, Shell, Streams};
//!
//! # async fn demo() -> Result<(), rush_kernel::ShellError> {
//! let shell = Shell::new("rush", vec![])?;
//! if let Some(tree) = parser::parse("echo hello | tr a-z A-Z")? {
//!     let mut job = exec::start(tree, shell.clone(), Streams::inherited()).await?;
//!     let JobOutcome { code, .. } = job.wait().await;
//!     shell.set_last_exit_code(code);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Concurrency model: external children run as real processes; everything
//! that must outlive `start()` (sequence scheduling, loop iteration,
//! function unwinding, subshell bookkeeping) runs on tokio tasks that
//! report through one-shot channels.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod exec;
pub mod glob;
pub mod job;
pub mod lexer;
pub mod parser;
pub mod paths;
pub mod shell;
pub mod streams;
mod value;

pub use error::ShellError;
pub use job::{JobOutcome, RunningJob};
pub use shell::Shell;
pub use streams::{Stream, Streams};

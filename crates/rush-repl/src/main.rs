//! rush CLI entry point.
//!
//! Usage:
//!   rush                       # Interactive REPL (stdin is a terminal)
//!   rush < script              # Run a script from stdin
//!   rush script.sh [args...]   # Run a script file with positional args
//!
//! `DEBUG=1` turns on verbose parser logging; otherwise `RUST_LOG` is
//! honored as usual.

use std::io::{IsTerminal, Read};
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rush_kernel::Shell;

fn main() -> ExitCode {
    let filter = if std::env::var("DEBUG").is_ok_and(|v| v == "1") {
        EnvFilter::new("rush_kernel=debug,rush_repl=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run() {
        Ok(code) => ExitCode::from((code & 0xff) as u8),
        Err(e) => {
            eprintln!("rush: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<i32> {
    let mut argv = std::env::args();
    let program = argv.next().unwrap_or_else(|| "rush".to_string());

    match argv.next() {
        Some(path) => {
            let args: Vec<String> = argv.collect();
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read script {path}"))?;
            let shell = Shell::new(path, args)?;
            rush_repl::run_script(shell, &source)
        }
        None if std::io::stdin().is_terminal() => {
            let shell = Shell::new(program, vec![])?;
            rush_repl::run_interactive(shell)
        }
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("failed to read script from stdin")?;
            let shell = Shell::new(program, vec![])?;
            rush_repl::run_script(shell, &source)
        }
    }
}

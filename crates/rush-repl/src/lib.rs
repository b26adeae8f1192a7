//! The rush driver.
//!
//! Two front doors: [`run_interactive`] reads lines with rustyline,
//! re-prompting with `> ` while the parser reports the input as
//! incomplete, and [`run_script`] runs a whole source text as one
//! submission. Both poll the shell's exit flag after each submission and
//! surface its code as the process exit status.

use std::sync::Arc;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tokio::runtime::Runtime;

use rush_kernel::ast::CommandNode;
use rush_kernel::{exec, parser, Shell, Streams};

/// Read-eval-print until end of input or `exit`.
pub fn run_interactive(shell: Shell) -> Result<i32> {
    let runtime = Runtime::new().context("failed to create async runtime")?;
    let mut editor: Editor<(), DefaultHistory> =
        Editor::new().context("failed to initialize line editor")?;
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() {
            format!("{}$ ", shell.cwd().display())
        } else {
            "> ".to_string()
        };
        match editor.readline(&prompt) {
            Ok(line) => {
                pending.push_str(&line);
                pending.push('\n');
                match parser::parse(&pending) {
                    // Mid-construct: keep the buffer and read another line.
                    Err(e) if e.is_incomplete() => continue,
                    Err(e) => {
                        eprintln!("rush: {e}");
                        pending.clear();
                    }
                    Ok(None) => pending.clear(),
                    Ok(Some(tree)) => {
                        let _ = editor.add_history_entry(pending.trim_end());
                        pending.clear();
                        runtime.block_on(submit(&shell, tree));
                        if let Some(code) = shell.exit_status() {
                            return Ok(code);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                pending.clear();
            }
            Err(ReadlineError::Eof) => {
                return Ok(shell.exit_status().unwrap_or_else(|| shell.last_exit_code()));
            }
            Err(e) => return Err(e).context("line input failed"),
        }
    }
}

/// Run a script source as one submission.
///
/// The final status is the shell's `exit` code if `exit` was ever called,
/// otherwise the last top-level command's code.
pub fn run_script(shell: Shell, source: &str) -> Result<i32> {
    let runtime = Runtime::new().context("failed to create async runtime")?;
    let source = strip_shebang(source);
    let code = match parser::parse(source) {
        Err(e) if e.is_incomplete() => {
            eprintln!("rush: unexpected end of file");
            1
        }
        Err(e) => {
            eprintln!("rush: {e}");
            1
        }
        Ok(None) => 0,
        Ok(Some(tree)) => runtime.block_on(submit(&shell, tree)),
    };
    Ok(shell.exit_status().unwrap_or(code))
}

fn strip_shebang(source: &str) -> &str {
    if source.starts_with("#!") {
        source.split_once('\n').map_or("", |(_, rest)| rest)
    } else {
        source
    }
}

async fn submit(shell: &Shell, tree: Arc<CommandNode>) -> i32 {
    match exec::start(tree, shell.clone(), Streams::inherited()).await {
        Ok(mut job) => {
            let outcome = job.wait().await;
            shell.set_last_exit_code(outcome.code);
            if let Some(err) = outcome.err {
                eprintln!("rush: {err}");
            }
            outcome.code
        }
        Err(e) => {
            eprintln!("rush: {e}");
            shell.set_last_exit_code(1);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shebang_lines_are_skipped() {
        assert_eq!(strip_shebang("#!/bin/rush\necho hi\n"), "echo hi\n");
        assert_eq!(strip_shebang("echo hi\n"), "echo hi\n");
        assert_eq!(strip_shebang("#!/bin/rush"), "");
    }

    #[test]
    fn script_reports_the_last_command() {
        let shell = Shell::new("rush", vec![]).unwrap();
        let code = run_script(shell, "true\nfalse\n").unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn script_exit_wins_over_the_last_command() {
        let shell = Shell::new("rush", vec![]).unwrap();
        let code = run_script(shell, "exit 9\ntrue\n").unwrap();
        assert_eq!(code, 9);
    }
}

//! Run-time expansion of [`ValueExpr`]s.
//!
//! Two entry points, matching the two places a value can appear:
//! [`ValueExpr::value`] produces the single string needed by assignments,
//! redirect targets, and string chunks; [`ValueExpr::values`] produces the
//! possibly-many strings an argument position can expand to (via pathname
//! expansion or `$@`). Composite values never field-split: expanding a
//! variable inside a word keeps the word whole.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::ast::{CommandNode, SpecialParam, ValueExpr};
use crate::error::{Result, ShellError};
use crate::exec;
use crate::glob;
use crate::shell::Shell;
use crate::streams::{os_pipe, Stream, Streams};

impl ValueExpr {
    /// Expand to a single string.
    pub fn value<'a>(
        &'a self,
        shell: &'a Shell,
        streams: &'a Streams,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            match self {
                ValueExpr::Literal { text, .. } => Ok(text.clone()),
                ValueExpr::Var { name, default } => {
                    let value = shell.get_var(name);
                    if value.is_empty() {
                        if let Some(fallback) = default {
                            return fallback.value(shell, streams).await;
                        }
                    }
                    Ok(value)
                }
                ValueExpr::Arg { n, default } => {
                    let value = shell.get_arg(*n);
                    if value.is_empty() {
                        if let Some(fallback) = default {
                            return fallback.value(shell, streams).await;
                        }
                    }
                    Ok(value)
                }
                ValueExpr::Special(sp) => Ok(expand_special(*sp, shell)),
                ValueExpr::CommandSubst(body) => capture_output(body, shell, streams).await,
                ValueExpr::Composite(parts) => {
                    let mut joined = String::new();
                    for part in parts {
                        joined.push_str(&part.value(shell, streams).await?);
                    }
                    Ok(joined)
                }
            }
        })
    }

    /// Expand in argument position, where one value may become several
    /// strings: `$@` contributes each positional separately, and an
    /// unquoted word with pattern characters consults the filesystem.
    pub fn values<'a>(
        &'a self,
        shell: &'a Shell,
        streams: &'a Streams,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            match self {
                ValueExpr::Literal { text, glob: true } if glob::has_magic(text) => {
                    let matches = glob::expand(text, &shell.cwd());
                    if matches.is_empty() {
                        // No match leaves the pattern as written.
                        Ok(vec![text.clone()])
                    } else {
                        Ok(matches)
                    }
                }
                ValueExpr::Special(SpecialParam::AllArgs) => Ok(shell.args()),
                _ => Ok(vec![self.value(shell, streams).await?]),
            }
        })
    }
}

fn expand_special(sp: SpecialParam, shell: &Shell) -> String {
    match sp {
        SpecialParam::Status => shell.last_exit_code().to_string(),
        SpecialParam::Count => shell.arg_count().to_string(),
        SpecialParam::AllArgs => shell.args().join(" "),
        SpecialParam::Pid => std::process::id().to_string(),
    }
}

/// Run `body` with stdout captured, returning its output with exactly one
/// trailing newline removed.
async fn capture_output(
    body: &Arc<CommandNode>,
    shell: &Shell,
    streams: &Streams,
) -> Result<String> {
    let (reader, writer) = os_pipe()?;
    let mut inner = streams.clone();
    inner.stdout = Stream::File(Arc::new(writer));

    let mut job = exec::start(body.clone(), shell.clone(), inner).await?;

    // Drain the pipe while the job runs; waiting first could deadlock on a
    // full pipe buffer.
    let drain = tokio::task::spawn_blocking(move || {
        use std::io::Read;
        let mut reader = reader;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).map(|_| buf)
    });

    let outcome = job.wait().await;
    let buf = drain
        .await
        .map_err(|e| ShellError::Expansion(format!("command substitution read failed: {e}")))??;

    if outcome.code != 0 {
        return Err(ShellError::Expansion(match outcome.err {
            Some(err) => format!("command substitution failed: {err}"),
            None => format!("command substitution exited with status {}", outcome.code),
        }));
    }

    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

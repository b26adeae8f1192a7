//! The command evaluator: turns a [`CommandNode`] plus a stream triple into
//! a [`RunningJob`].
//!
//! `start()` returns promptly for every variant. Where a node needs to make
//! decisions after an inner job finishes (sequences, conditionals, loops,
//! function calls, subshells), a coordinator task is spawned that waits,
//! decides, and reports through a one-shot channel. The cooperative stop
//! flag ([`Shell::should_stop`]) is consulted before the right side of a
//! sequence, before either branch of an `if`, and at the top of every loop
//! iteration, which is what makes `exit` and `return` cut evaluation short
//! without cancelling anything already running.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::ast::{Assign, CommandNode, RedirMode, SeqKind, ValueExpr};
use crate::builtins;
use crate::error::{Result, ShellError};
use crate::job::{JobOutcome, RunningJob};
use crate::paths;
use crate::shell::Shell;
use crate::streams::{os_pipe, Stream, Streams};

/// Start evaluating a command tree.
///
/// Expansion, redirection-target opening, and process spawning all happen
/// here; an error from any of them aborts this node before a job exists.
pub fn start(
    node: Arc<CommandNode>,
    shell: Shell,
    streams: Streams,
) -> BoxFuture<'static, Result<RunningJob>> {
    Box::pin(async move {
        match &*node {
            CommandNode::Simple {
                name,
                args,
                assigns,
            } => start_simple(name, args, assigns, shell, streams).await,
            CommandNode::SetVars { assigns } => start_set_vars(assigns, shell, streams).await,
            CommandNode::Pipeline { left, right } => {
                start_pipeline(left.clone(), right.clone(), shell, streams).await
            }
            CommandNode::Seq { left, right, kind } => {
                start_seq(left.clone(), right.clone(), *kind, shell, streams).await
            }
            CommandNode::Background { inner } => {
                let mut job = start(inner.clone(), shell, streams).await?;
                // Detach: reap the job off to the side, report success now.
                tokio::spawn(async move {
                    job.wait().await;
                });
                Ok(RunningJob::completed(JobOutcome::success()))
            }
            CommandNode::Subshell { body } => start_subshell(body.clone(), shell, streams).await,
            CommandNode::Group { body } => start(body.clone(), shell, streams).await,
            CommandNode::Redirect {
                inner,
                fd,
                target,
                mode,
                by_ref,
            } => start_redirect(inner.clone(), *fd, target, *mode, *by_ref, shell, streams).await,
            CommandNode::If {
                cond,
                then_branch,
                else_branch,
            } => {
                start_if(
                    cond.clone(),
                    then_branch.clone(),
                    else_branch.clone(),
                    shell,
                    streams,
                )
                .await
            }
            CommandNode::While { cond, body } => {
                start_while(cond.clone(), body.clone(), shell, streams).await
            }
            CommandNode::FunctionDef { name, body } => {
                let fname = name.value(&shell, &streams).await?;
                shell.define_function(&fname, body.clone());
                Ok(RunningJob::completed(JobOutcome::success()))
            }
        }
    })
}

async fn start_simple(
    name: &ValueExpr,
    args: &[ValueExpr],
    assigns: &[Assign],
    shell: Shell,
    streams: Streams,
) -> Result<RunningJob> {
    let cmd_name = name.value(&shell, &streams).await?;
    let mut argv = Vec::new();
    for arg in args {
        argv.extend(arg.values(&shell, &streams).await?);
    }
    let mut transient = Vec::with_capacity(assigns.len());
    for assign in assigns {
        transient.push((
            assign.name.clone(),
            assign.value.value(&shell, &streams).await?,
        ));
    }

    if let Some(body) = shell.function(&cmd_name) {
        return start_function_call(cmd_name, body, argv, shell, streams).await;
    }

    if let Some(builtin) = builtins::lookup(&cmd_name) {
        let outcome = builtin.run(&shell, &argv).await?;
        return Ok(RunningJob::completed(outcome));
    }

    let path_var = shell.get_var("PATH");
    let cwd = shell.cwd();
    let program = paths::look_path(&path_var, &cwd, &cmd_name)?;

    let mut env: HashMap<String, String> = std::env::vars().collect();
    env.extend(shell.exported_vars());
    env.extend(transient);

    let mut command = tokio::process::Command::new(&program);
    command
        .args(&argv)
        .env_clear()
        .envs(&env)
        .current_dir(&cwd)
        .stdin(streams.stdin.to_stdio()?)
        .stdout(streams.stdout.to_stdio()?)
        .stderr(streams.stderr.to_stdio()?);
    let child = command.spawn().map_err(|e| ShellError::Process {
        name: cmd_name,
        source: e,
    })?;
    drop(streams);
    Ok(RunningJob::from_child(child))
}

/// Call a user-defined function: the frame goes up before the body starts
/// and comes down once it has been waited, yielding the `return` code when
/// one was set.
async fn start_function_call(
    name: String,
    body: Arc<CommandNode>,
    args: Vec<String>,
    shell: Shell,
    streams: Streams,
) -> Result<RunningJob> {
    shell.push_frame(name, args);
    let mut inner = match start(body, shell.clone(), streams).await {
        Ok(job) => job,
        Err(e) => {
            shell.pop_frame();
            return Err(e);
        }
    };
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let body_outcome = inner.wait().await;
        let (code, returned) = shell.pop_frame();
        let outcome = if returned {
            JobOutcome::exit(code)
        } else {
            body_outcome
        };
        let _ = tx.send(outcome);
    });
    Ok(RunningJob::from_channel(rx))
}

async fn start_set_vars(
    assigns: &[Assign],
    shell: Shell,
    streams: Streams,
) -> Result<RunningJob> {
    for assign in assigns {
        let value = assign.value.value(&shell, &streams).await?;
        shell.set_var(&assign.name, value);
    }
    Ok(RunningJob::completed(JobOutcome::success()))
}

async fn start_pipeline(
    left: Arc<CommandNode>,
    right: Arc<CommandNode>,
    shell: Shell,
    streams: Streams,
) -> Result<RunningJob> {
    let (read_end, write_end) = os_pipe()?;
    let stderr = streams.stderr.clone();
    let mut left_streams = streams.clone();
    left_streams.stdout = Stream::File(Arc::new(write_end));
    let mut right_streams = streams;
    right_streams.stdin = Stream::File(Arc::new(read_end));

    // Both peers start before either is waited. Our clones of the pipe ends
    // die with the stream triples, so once both sides have started the only
    // holders are the children and any still-running coordinators.
    //
    // A peer that fails to start becomes an already-failed job: the other
    // peer still runs, and the pipe end the failure dropped reads as EOF.
    let left_job = match start(left, shell.clone(), left_streams).await {
        Ok(job) => job,
        Err(e) => {
            // Only the right side's outcome is reported by a pipeline, so
            // this error would vanish silently without a diagnostic.
            stderr.report(&e);
            RunningJob::completed(JobOutcome::exit(1))
        }
    };
    let right_job = match start(right, shell, right_streams).await {
        Ok(job) => job,
        Err(e) => RunningJob::completed(JobOutcome::from_error(e)),
    };
    Ok(RunningJob::pipeline(left_job, right_job))
}

async fn start_seq(
    left: Arc<CommandNode>,
    right: Arc<CommandNode>,
    kind: SeqKind,
    shell: Shell,
    streams: Streams,
) -> Result<RunningJob> {
    // A left side that cannot start is an already-failed job, so the
    // decision below still runs and `bad; good` reaches `good`.
    let mut left_job = match start(left, shell.clone(), streams.clone()).await {
        Ok(job) => job,
        Err(e) => RunningJob::completed(JobOutcome::from_error(e)),
    };
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let left_outcome = left_job.wait().await;
        shell.set_last_exit_code(left_outcome.code);
        let run_right = !shell.should_stop()
            && match kind {
                SeqKind::Uncond => true,
                SeqKind::And => left_outcome.ok(),
                SeqKind::Or => !left_outcome.ok(),
            };
        let outcome = if run_right {
            // The right side's outcome replaces the left's; surface an
            // error message that is about to be dropped.
            if let Some(err) = &left_outcome.err {
                streams.stderr.report(err);
            }
            match start(right, shell, streams).await {
                Ok(mut job) => job.wait().await,
                Err(e) => JobOutcome::from_error(e),
            }
        } else {
            drop(streams);
            left_outcome
        };
        let _ = tx.send(outcome);
    });
    Ok(RunningJob::from_channel(rx))
}

async fn start_subshell(
    body: Arc<CommandNode>,
    shell: Shell,
    streams: Streams,
) -> Result<RunningJob> {
    let sub = shell.subshell();
    let mut body_job = start(body, sub.clone(), streams).await?;
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let outcome = body_job.wait().await;
        // An explicit `exit` inside the subshell wins; this call is a no-op
        // then, because exiting is idempotent.
        sub.exit(outcome.code);
        let code = sub.exit_status().unwrap_or(outcome.code);
        let _ = tx.send(JobOutcome {
            code,
            err: outcome.err,
        });
    });
    Ok(RunningJob::from_channel(rx))
}

async fn start_redirect(
    inner: Arc<CommandNode>,
    fd: u32,
    target: &ValueExpr,
    mode: RedirMode,
    by_ref: bool,
    shell: Shell,
    streams: Streams,
) -> Result<RunningJob> {
    let target = target.value(&shell, &streams).await?;
    let mut inner_streams = streams;
    let opened = if by_ref {
        let source = match target.as_str() {
            "0" => inner_streams.stdin.clone(),
            "1" => inner_streams.stdout.clone(),
            "2" => inner_streams.stderr.clone(),
            other => return Err(bad_fd(other)),
        };
        if !inner_streams.set(fd, source) {
            return Err(bad_fd(&fd.to_string()));
        }
        None
    } else {
        let path = shell.resolve_path(&target);
        let file = open_redirect(&path, mode).map_err(|e| {
            ShellError::Io(std::io::Error::new(e.kind(), format!("{target}: {e}")))
        })?;
        let file = Arc::new(file);
        if !inner_streams.set(fd, Stream::File(file.clone())) {
            return Err(bad_fd(&fd.to_string()));
        }
        Some(file)
    };
    let inner_job = start(inner, shell, inner_streams).await?;
    Ok(RunningJob::redirected(inner_job, opened))
}

fn bad_fd(what: &str) -> ShellError {
    ShellError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("{what}: bad file descriptor"),
    ))
}

fn open_redirect(path: &Path, mode: RedirMode) -> std::io::Result<File> {
    match mode {
        RedirMode::Read => File::open(path),
        RedirMode::Truncate => File::create(path),
        RedirMode::Append => OpenOptions::new().create(true).append(true).open(path),
        RedirMode::ReadWrite => OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path),
    }
}

async fn start_if(
    cond: Arc<CommandNode>,
    then_branch: Arc<CommandNode>,
    else_branch: Option<Arc<CommandNode>>,
    shell: Shell,
    streams: Streams,
) -> Result<RunningJob> {
    let mut cond_job = start(cond, shell.clone(), streams.clone()).await?;
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let cond_outcome = cond_job.wait().await;
        shell.set_last_exit_code(cond_outcome.code);
        if shell.should_stop() {
            drop(streams);
            let _ = tx.send(cond_outcome);
            return;
        }
        // Only the condition's code survives past this point.
        if let Some(err) = &cond_outcome.err {
            streams.stderr.report(err);
        }
        let branch = if cond_outcome.ok() {
            Some(then_branch)
        } else {
            else_branch
        };
        let outcome = match branch {
            Some(node) => match start(node, shell, streams).await {
                Ok(mut job) => job.wait().await,
                Err(e) => JobOutcome::from_error(e),
            },
            None => {
                drop(streams);
                JobOutcome::success()
            }
        };
        let _ = tx.send(outcome);
    });
    Ok(RunningJob::from_channel(rx))
}

async fn start_while(
    cond: Arc<CommandNode>,
    body: Arc<CommandNode>,
    shell: Shell,
    streams: Streams,
) -> Result<RunningJob> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut last = JobOutcome::success();
        loop {
            if shell.should_stop() {
                break;
            }
            let cond_outcome = match start(cond.clone(), shell.clone(), streams.clone()).await {
                Ok(mut job) => job.wait().await,
                Err(e) => {
                    last = JobOutcome::from_error(e);
                    break;
                }
            };
            shell.set_last_exit_code(cond_outcome.code);
            if let Some(err) = &cond_outcome.err {
                streams.stderr.report(err);
            }
            if !cond_outcome.ok() {
                last = JobOutcome::success();
                break;
            }
            match start(body.clone(), shell.clone(), streams.clone()).await {
                Ok(mut job) => {
                    // The body's status never ends the loop by itself, and
                    // its outcome is overwritten next iteration, so report
                    // any error message now.
                    last = job.wait().await;
                    shell.set_last_exit_code(last.code);
                    if let Some(err) = last.err.take() {
                        streams.stderr.report(&err);
                    }
                }
                Err(e) => {
                    last = JobOutcome::from_error(e);
                    break;
                }
            }
        }
        drop(streams);
        let _ = tx.send(last);
    });
    Ok(RunningJob::from_channel(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::time::Instant;

    fn sh() -> Shell {
        Shell::new("rush", vec![]).unwrap()
    }

    /// Run one source line against the shell, capturing stdout.
    async fn run_capture(shell: &Shell, src: &str) -> (JobOutcome, String) {
        let node = parse(src).expect("parse").expect("non-empty input");
        let (reader, writer) = os_pipe().unwrap();
        let mut streams = Streams::inherited();
        streams.stdout = Stream::File(Arc::new(writer));
        let mut job = start(node, shell.clone(), streams).await.expect("start");
        let drain = tokio::task::spawn_blocking(move || {
            use std::io::Read;
            let mut reader = reader;
            let mut out = String::new();
            reader.read_to_string(&mut out).unwrap();
            out
        });
        let outcome = job.wait().await;
        let output = drain.await.unwrap();
        (outcome, output)
    }

    #[tokio::test]
    async fn pipeline_connects_stdout_to_stdin() {
        let shell = sh();
        let (outcome, out) = run_capture(&shell, "echo hello | tr a-z A-Z").await;
        assert_eq!(out, "HELLO\n");
        assert_eq!(outcome.code, 0);
    }

    #[tokio::test]
    async fn pipeline_reports_the_right_side() {
        let shell = sh();
        let (outcome, _) = run_capture(&shell, "false | true").await;
        assert_eq!(outcome.code, 0);
        let (outcome, _) = run_capture(&shell, "true | false").await;
        assert_eq!(outcome.code, 1);
    }

    #[tokio::test]
    async fn and_or_gate_the_right_side() {
        let tmp = tempfile::tempdir().unwrap();
        let shell = sh();
        let d = tmp.path().display();

        run_capture(&shell, &format!("false && touch {d}/and_skipped")).await;
        run_capture(&shell, &format!("true || touch {d}/or_skipped")).await;
        run_capture(&shell, &format!("true && touch {d}/and_ran")).await;
        run_capture(&shell, &format!("false || touch {d}/or_ran")).await;

        assert!(!tmp.path().join("and_skipped").exists());
        assert!(!tmp.path().join("or_skipped").exists());
        assert!(tmp.path().join("and_ran").exists());
        assert!(tmp.path().join("or_ran").exists());
    }

    #[tokio::test]
    async fn failed_and_still_reaches_the_next_item() {
        let shell = sh();
        let (outcome, out) = run_capture(&shell, "false && echo nope ; echo ok").await;
        assert_eq!(out, "ok\n");
        assert_eq!(outcome.code, 0);
    }

    #[tokio::test]
    async fn group_shares_the_enclosing_scope() {
        let shell = sh();
        let (_, out) = run_capture(&shell, "X=1; { X=2; echo $X; }; echo $X").await;
        assert_eq!(out, "2\n2\n");
    }

    #[tokio::test]
    async fn subshell_isolates_assignments() {
        let shell = sh();
        let (_, out) = run_capture(&shell, "(X=1; echo $X); echo ${X:-unset}").await;
        assert_eq!(out, "1\nunset\n");
    }

    #[tokio::test]
    async fn subshell_exit_code_reaches_the_parent_status() {
        let shell = sh();
        let (outcome, out) = run_capture(&shell, "(exit 5); echo $?").await;
        assert_eq!(out, "5\n");
        assert_eq!(outcome.code, 0);
        assert!(shell.exit_status().is_none(), "parent must keep running");
    }

    #[tokio::test]
    async fn function_call_binds_args_and_returns() {
        let shell = sh();
        let (outcome, out) =
            run_capture(&shell, "function f() { echo $1; return 3; }; f hi; echo $?").await;
        assert_eq!(out, "hi\n3\n");
        assert_eq!(outcome.code, 0);
    }

    #[tokio::test]
    async fn return_after_which_the_body_stops() {
        let shell = sh();
        let (_, out) =
            run_capture(&shell, "function f() { return 7; echo unreachable; }; f; echo $?").await;
        assert_eq!(out, "7\n");
    }

    #[tokio::test]
    async fn return_at_top_level_is_a_usage_error() {
        let shell = sh();
        let node = parse("return 1").unwrap().unwrap();
        let result = start(node, shell, Streams::inherited()).await;
        assert!(matches!(result, Err(ShellError::BuiltinUsage(_))));
    }

    #[tokio::test]
    async fn unknown_command_fails_to_start() {
        let shell = sh();
        let node = parse("definitely-not-a-command-437").unwrap().unwrap();
        let result = start(node, shell, Streams::inherited()).await;
        assert!(matches!(result, Err(ShellError::NotFound { .. })));
    }

    #[tokio::test]
    async fn a_failed_start_does_not_kill_the_sequence() {
        let shell = sh();
        let (outcome, out) =
            run_capture(&shell, "definitely-not-a-command-437; echo after").await;
        assert_eq!(out, "after\n");
        assert_eq!(outcome.code, 0);

        // ...but && still refuses to continue past it.
        let (outcome, out) =
            run_capture(&shell, "definitely-not-a-command-437 && echo after").await;
        assert_eq!(out, "");
        assert_eq!(outcome.code, 1);
    }

    #[tokio::test]
    async fn a_failed_pipeline_peer_reports_the_right_side() {
        let shell = sh();
        let (outcome, out) = run_capture(&shell, "echo hi | definitely-not-a-command-437").await;
        assert_eq!(out, "");
        assert_eq!(outcome.code, 1);
        assert!(outcome.err.is_some());
    }

    #[tokio::test]
    async fn exit_skips_the_rest_of_the_batch() {
        let shell = sh();
        let (outcome, out) = run_capture(&shell, "exit 7; echo no").await;
        assert_eq!(out, "");
        assert_eq!(outcome.code, 7);
        assert_eq!(shell.exit_status(), Some(7));
    }

    #[tokio::test]
    async fn transient_assignments_only_touch_the_child() {
        let shell = sh();
        let (outcome, out) = run_capture(&shell, "RUSH_T9=bar printenv RUSH_T9").await;
        assert_eq!(out, "bar\n");
        assert_eq!(outcome.code, 0);
        assert_eq!(shell.get_var("RUSH_T9"), "");
        let (outcome, out) = run_capture(&shell, "printenv RUSH_T9").await;
        assert_eq!(out, "");
        assert_ne!(outcome.code, 0);
    }

    #[tokio::test]
    async fn exported_globals_reach_children() {
        let shell = sh();
        let (_, out) = run_capture(&shell, "RUSH_T10=on; export RUSH_T10; printenv RUSH_T10").await;
        assert_eq!(out, "on\n");
        let (outcome, _) = run_capture(&shell, "RUSH_T11=off; printenv RUSH_T11").await;
        assert_ne!(outcome.code, 0, "unexported globals stay private");
    }

    #[tokio::test]
    async fn redirects_truncate_and_append() {
        let tmp = tempfile::tempdir().unwrap();
        let shell = sh();
        let p = tmp.path().join("out").display().to_string();

        run_capture(&shell, &format!("echo a > {p}")).await;
        assert_eq!(std::fs::read_to_string(tmp.path().join("out")).unwrap(), "a\n");

        run_capture(&shell, &format!("echo b >> {p}")).await;
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("out")).unwrap(),
            "a\nb\n"
        );

        run_capture(&shell, &format!("echo c > {p}")).await;
        assert_eq!(std::fs::read_to_string(tmp.path().join("out")).unwrap(), "c\n");
    }

    #[tokio::test]
    async fn stdin_redirect_feeds_the_command() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("in"), "data\n").unwrap();
        let shell = sh();
        let (outcome, out) =
            run_capture(&shell, &format!("cat < {}/in", tmp.path().display())).await;
        assert_eq!(out, "data\n");
        assert_eq!(outcome.code, 0);
    }

    #[tokio::test]
    async fn the_last_redirect_of_an_fd_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let shell = sh();
        let d = tmp.path().display();
        run_capture(&shell, &format!("echo x > {d}/first > {d}/second")).await;
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("second")).unwrap(),
            "x\n"
        );
        // The earlier target is still opened (and truncated), just unused.
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("first")).unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn dup_redirect_reuses_an_open_stream() {
        let shell = sh();
        let (_, out) = run_capture(&shell, "sh -c 'echo oops >&2' 2>&1").await;
        assert_eq!(out, "oops\n");
    }

    #[tokio::test]
    async fn relative_redirects_follow_the_shell_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        let shell = sh();
        shell.set_cwd(tmp.path().to_path_buf());
        run_capture(&shell, "echo here > rel.txt").await;
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("rel.txt")).unwrap(),
            "here\n"
        );
    }

    #[tokio::test]
    async fn if_selects_branches_by_status() {
        let shell = sh();
        let (_, out) = run_capture(&shell, "if true; then echo yes; else echo no; fi").await;
        assert_eq!(out, "yes\n");
        let (_, out) = run_capture(&shell, "if false; then echo yes; else echo no; fi").await;
        assert_eq!(out, "no\n");
        let (outcome, out) = run_capture(&shell, "if false; then echo yes; fi").await;
        assert_eq!(out, "");
        assert_eq!(outcome.code, 0);
    }

    #[tokio::test]
    async fn while_condition_sees_body_mutations() {
        let shell = sh();
        let (outcome, out) = run_capture(
            &shell,
            "i=; while test -z \"$i\"; do echo tick; i=done; done; echo $i",
        )
        .await;
        assert_eq!(out, "tick\ndone\n");
        assert_eq!(outcome.code, 0);
    }

    #[tokio::test]
    async fn background_jobs_detach() {
        let shell = sh();
        let started = Instant::now();
        let node = parse("sleep 0.5 &").unwrap().unwrap();
        let mut job = start(node, shell, Streams::inherited()).await.unwrap();
        let outcome = job.wait().await;
        assert_eq!(outcome.code, 0);
        assert!(
            started.elapsed().as_millis() < 400,
            "background wait must not block"
        );
    }

    #[tokio::test]
    async fn last_exit_code_tracks_each_awaited_segment() {
        let shell = sh();
        let (_, out) = run_capture(&shell, "false; echo $?").await;
        assert_eq!(out, "1\n");
    }

    #[tokio::test]
    async fn rewaiting_a_finished_tree_repeats_the_outcome() {
        let shell = sh();
        let node = parse("false").unwrap().unwrap();
        let mut job = start(node, shell, Streams::inherited()).await.unwrap();
        let first = job.wait().await;
        assert_eq!(first.code, 1);
        assert_eq!(job.wait().await, first);
    }

    #[cfg(target_os = "linux")]
    fn open_fd_count() -> usize {
        std::fs::read_dir("/proc/self/fd").unwrap().count()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn pipes_and_redirect_files_are_released() {
        let tmp = tempfile::tempdir().unwrap();
        let shell = sh();
        let d = tmp.path().display().to_string();

        // First runs bring up lazily-created runtime plumbing (child
        // reaping, blocking threads) so the baseline is stable.
        run_capture(&shell, &format!("echo warm | cat > {d}/warm")).await;
        run_capture(&shell, &format!("echo warm | cat > {d}/warm")).await;

        let before = open_fd_count();
        for _ in 0..3 {
            let (outcome, out) =
                run_capture(&shell, &format!("echo fd < /dev/null | tr a-z A-Z > {d}/fd")).await;
            assert_eq!(outcome.code, 0);
            assert_eq!(out, "");
        }
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("fd")).unwrap(),
            "FD\n"
        );
        assert_eq!(open_fd_count(), before, "descriptors leaked");
    }
}

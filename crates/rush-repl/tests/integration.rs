//! End-to-end scenarios against the built binary.
//!
//! Each test feeds a script over stdin (or as a file with arguments) and
//! checks what any user of a shell would check: stdout, stderr, and the
//! exit status.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn rush_stdin(script: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_rush"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run rush");
    child
        .stdin
        .as_mut()
        .expect("stdin piped")
        .write_all(script.as_bytes())
        .expect("write script");
    child.wait_with_output().expect("wait for rush")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn pipeline_uppercases() {
    let out = rush_stdin("echo hello | tr a-z A-Z\n");
    assert_eq!(stdout_of(&out), "HELLO\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn short_circuit_and_then_sequence() {
    let out = rush_stdin("false && echo nope ; echo ok\n");
    assert_eq!(stdout_of(&out), "ok\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn group_shares_state() {
    let out = rush_stdin("X=1; { X=2; echo $X; }; echo $X\n");
    assert_eq!(stdout_of(&out), "2\n2\n");
}

#[test]
fn subshell_is_isolated() {
    let out = rush_stdin("(X=1; echo $X); echo ${X:-unset}\n");
    assert_eq!(stdout_of(&out), "1\nunset\n");
}

#[test]
fn function_call_and_return_code() {
    let out = rush_stdin("function f() { echo $1; return 3; }; f hi; echo $?\n");
    assert_eq!(stdout_of(&out), "hi\n3\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn while_loop_driven_by_an_external_condition() {
    let out = rush_stdin("i=; while test -z \"$i\"; do echo tick; i=done; done; echo $i\n");
    assert_eq!(stdout_of(&out), "tick\ndone\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn redirects_truncate_then_append() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("out").display().to_string();

    let out = rush_stdin(&format!("echo a > {path}; cat {path}\n"));
    assert_eq!(stdout_of(&out), "a\n");
    assert_eq!(std::fs::read_to_string(tmp.path().join("out")).unwrap(), "a\n");

    let out = rush_stdin(&format!("echo b >> {path}; cat {path}\n"));
    assert_eq!(stdout_of(&out), "a\nb\n");

    let out = rush_stdin(&format!("echo c > {path}; cat {path}\n"));
    assert_eq!(stdout_of(&out), "c\n");
}

#[test]
fn exit_code_propagates_and_stops_the_batch() {
    let out = rush_stdin("exit 7\necho never\n");
    assert_eq!(stdout_of(&out), "");
    assert_eq!(out.status.code(), Some(7));
}

#[test]
fn exit_inside_a_function_ends_the_shell() {
    let out = rush_stdin("function f() { exit 5; }; f; echo never\n");
    assert_eq!(stdout_of(&out), "");
    assert_eq!(out.status.code(), Some(5));
}

#[test]
fn status_without_exit_is_the_last_command() {
    let out = rush_stdin("true\nfalse\n");
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn a_failed_command_does_not_stop_the_script() {
    let out = rush_stdin("no-such-command-around-here\necho still here\n");
    assert_eq!(stdout_of(&out), "still here\n");
    assert!(stderr_of(&out).contains("command not found"));
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn unknown_commands_report_and_fail() {
    let out = rush_stdin("no-such-command-around-here\n");
    assert_eq!(out.status.code(), Some(1));
    assert!(
        stderr_of(&out).contains("command not found"),
        "stderr was: {}",
        stderr_of(&out)
    );
}

#[test]
fn quoted_expansion_stays_one_argument() {
    let out = rush_stdin("A='hello   world'; echo \"$A\"\n");
    assert_eq!(stdout_of(&out), "hello   world\n");
}

#[test]
fn command_substitution_round_trip() {
    let out = rush_stdin("echo \"$(echo x)\"\n");
    assert_eq!(stdout_of(&out), "x\n");
}

#[test]
fn script_file_receives_positional_arguments() {
    let tmp = tempfile::tempdir().unwrap();
    let script = tmp.path().join("args.sh");
    std::fs::write(&script, "#!/usr/bin/env rush\necho $# args, first $1\nshift\necho then $1\n")
        .unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_rush"))
        .arg(&script)
        .args(["alpha", "beta"])
        .output()
        .expect("run script");
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "2 args, first alpha\nthen beta\n"
    );
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn shift_past_the_end_is_a_reported_error() {
    let out = rush_stdin("shift 4\n");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr_of(&out).contains("shift"));
}

#[test]
fn multi_line_constructs_parse_as_one_script() {
    let out = rush_stdin("if true\nthen\n  echo yes\nfi\n");
    assert_eq!(stdout_of(&out), "yes\n");
}

#[test]
fn background_job_does_not_block_the_script() {
    let started = std::time::Instant::now();
    // The sleeper's streams point at /dev/null so it cannot hold the
    // test's capture pipes open while it lingers.
    let out = rush_stdin("sleep 2 > /dev/null 2> /dev/null &\necho done\n");
    assert_eq!(stdout_of(&out), "done\n");
    assert!(
        started.elapsed().as_secs() < 2,
        "the background sleep must not be awaited"
    );
}

#[test]
fn both_streams_redirect() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("both").display().to_string();
    let out = rush_stdin(&format!("sh -c 'echo out; echo err >&2' &> {path}\ncat {path}\n"));
    let text = stdout_of(&out);
    assert!(text.contains("out\n"), "stdout half missing: {text:?}");
    assert!(text.contains("err\n"), "stderr half missing: {text:?}");
}

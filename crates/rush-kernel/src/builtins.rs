//! Built-in commands.
//!
//! Built-ins run inside the shell process and complete immediately; the
//! evaluator wraps their outcome in an already-finished job. Usage mistakes
//! (bad counts, unparsable numbers) surface as [`ShellError::BuiltinUsage`].

use async_trait::async_trait;

use crate::error::{Result, ShellError};
use crate::job::JobOutcome;
use crate::paths;
use crate::shell::Shell;

#[async_trait]
pub trait Builtin: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, shell: &Shell, args: &[String]) -> Result<JobOutcome>;
}

/// Find a built-in by (already expanded) command name.
pub fn lookup(name: &str) -> Option<&'static dyn Builtin> {
    match name {
        "cd" => Some(&Cd),
        "exit" => Some(&Exit),
        "return" => Some(&Return),
        "shift" => Some(&Shift),
        "export" => Some(&Export),
        _ => None,
    }
}

fn parse_code(builtin: &str, arg: &str) -> Result<i32> {
    arg.parse().map_err(|_| {
        ShellError::BuiltinUsage(format!("{builtin}: {arg}: numeric argument required"))
    })
}

/// `cd [dir]` — no argument means the user's home directory.
struct Cd;

#[async_trait]
impl Builtin for Cd {
    fn name(&self) -> &'static str {
        "cd"
    }

    async fn run(&self, shell: &Shell, args: &[String]) -> Result<JobOutcome> {
        let dir = match args {
            [] => paths::home_dir()
                .ok_or_else(|| ShellError::BuiltinUsage("cd: HOME not set".into()))?,
            [target] => paths::look_dir(&shell.cwd(), target)?,
            _ => {
                return Err(ShellError::BuiltinUsage(
                    "cd: wrong number of arguments".into(),
                ))
            }
        };
        shell.set_cwd(dir);
        Ok(JobOutcome::success())
    }
}

/// `exit [code]` — defaults to the last command's status.
struct Exit;

#[async_trait]
impl Builtin for Exit {
    fn name(&self) -> &'static str {
        "exit"
    }

    async fn run(&self, shell: &Shell, args: &[String]) -> Result<JobOutcome> {
        let code = match args {
            [] => shell.last_exit_code(),
            [arg] => parse_code("exit", arg)?,
            _ => {
                return Err(ShellError::BuiltinUsage(
                    "exit: wrong number of arguments".into(),
                ))
            }
        };
        shell.exit(code);
        Ok(JobOutcome::exit(code))
    }
}

/// `return [code]` — unwind the innermost function call.
struct Return;

#[async_trait]
impl Builtin for Return {
    fn name(&self) -> &'static str {
        "return"
    }

    async fn run(&self, shell: &Shell, args: &[String]) -> Result<JobOutcome> {
        let code = match args {
            [] => shell.last_exit_code(),
            [arg] => parse_code("return", arg)?,
            _ => {
                return Err(ShellError::BuiltinUsage(
                    "return: wrong number of arguments".into(),
                ))
            }
        };
        shell.set_return(code)?;
        Ok(JobOutcome::exit(code))
    }
}

/// `shift [n]` — drop leading positional arguments.
struct Shift;

#[async_trait]
impl Builtin for Shift {
    fn name(&self) -> &'static str {
        "shift"
    }

    async fn run(&self, shell: &Shell, args: &[String]) -> Result<JobOutcome> {
        let n = match args {
            [] => 1,
            [arg] => arg.parse().map_err(|_| {
                ShellError::BuiltinUsage(format!("shift: {arg}: numeric argument required"))
            })?,
            _ => {
                return Err(ShellError::BuiltinUsage(
                    "shift: wrong number of arguments".into(),
                ))
            }
        };
        shell.shift(n)?;
        Ok(JobOutcome::success())
    }
}

/// `export NAME[=value]...` — mark globals for child environments.
struct Export;

#[async_trait]
impl Builtin for Export {
    fn name(&self) -> &'static str {
        "export"
    }

    async fn run(&self, shell: &Shell, args: &[String]) -> Result<JobOutcome> {
        if args.is_empty() {
            return Err(ShellError::BuiltinUsage(
                "export: expected NAME or NAME=value".into(),
            ));
        }
        for arg in args {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg.as_str(), None),
            };
            if !valid_name(name) {
                return Err(ShellError::BuiltinUsage(format!(
                    "export: not a valid name: {name}"
                )));
            }
            if let Some(value) = value {
                shell.set_var(name, value);
            }
            shell.export(name);
        }
        Ok(JobOutcome::success())
    }
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

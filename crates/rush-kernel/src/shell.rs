//! Shell state: variables, call frames, functions, working directory, and
//! the exit/return machinery.
//!
//! A [`Shell`] is a cheaply cloneable handle onto shared state. Coordinator
//! tasks clone it freely; a subshell gets a brand-new `Shell` seeded from a
//! snapshot of its parent. The `exited` flag is written under the same lock
//! as everything else, and [`Shell::exit`] additionally completes a
//! set-once watch channel that the driver can observe.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::ast::CommandNode;
use crate::error::ShellError;

/// Activation record of a function call. Frames scope positional
/// arguments and `return`; variable writes inside a function land in the
/// globals, as they do in POSIX shells without a `local` declaration.
#[derive(Debug, Default)]
struct Frame {
    name: String,
    args: Vec<String>,
    returned: bool,
    return_code: i32,
}

#[derive(Debug)]
struct State {
    globals: HashMap<String, String>,
    exported: BTreeSet<String>,
    functions: HashMap<String, Arc<CommandNode>>,
    frames: Vec<Frame>,
    cwd: PathBuf,
    exited: bool,
    exit_code: i32,
    last_exit_code: i32,
    program_name: String,
    top_args: Vec<String>,
}

struct Inner {
    state: Mutex<State>,
    done: watch::Sender<Option<i32>>,
}

/// Handle onto one shell instance's state.
#[derive(Clone)]
pub struct Shell {
    inner: Arc<Inner>,
}

impl Shell {
    /// A fresh shell rooted at the process's current directory.
    pub fn new(program_name: impl Into<String>, args: Vec<String>) -> io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::with_state(State {
            globals: HashMap::new(),
            exported: BTreeSet::new(),
            functions: HashMap::new(),
            frames: Vec::new(),
            cwd,
            exited: false,
            exit_code: 0,
            last_exit_code: 0,
            program_name: program_name.into(),
            top_args: args,
        }))
    }

    fn with_state(state: State) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                done,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock means a panic elsewhere already sank the session.
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── variables ──────────────────────────────────────────────────────

    /// Look a name up: globals first, then the process environment. Unset
    /// names read as empty.
    pub fn get_var(&self, name: &str) -> String {
        let state = self.lock();
        if let Some(v) = state.globals.get(name) {
            return v.clone();
        }
        drop(state);
        std::env::var(name).unwrap_or_default()
    }

    /// Write a global, shadowing any environment value of the same name.
    pub fn set_var(&self, name: &str, value: impl Into<String>) {
        self.lock().globals.insert(name.to_string(), value.into());
    }

    /// Mark a global for export into child-process environments.
    pub fn export(&self, name: &str) {
        self.lock().exported.insert(name.to_string());
    }

    pub fn exported_names(&self) -> Vec<String> {
        self.lock().exported.iter().cloned().collect()
    }

    /// Exported names together with their current values. Names marked for
    /// export but never assigned are omitted.
    pub fn exported_vars(&self) -> Vec<(String, String)> {
        let state = self.lock();
        state
            .exported
            .iter()
            .filter_map(|name| {
                state
                    .globals
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }

    // ── positional arguments ───────────────────────────────────────────

    /// `$0` is the frame (or program) name; `$N` past the end is empty.
    pub fn get_arg(&self, n: usize) -> String {
        let state = self.lock();
        let (name, args) = match state.frames.last() {
            Some(frame) => (&frame.name, &frame.args),
            None => (&state.program_name, &state.top_args),
        };
        if n == 0 {
            name.clone()
        } else {
            args.get(n - 1).cloned().unwrap_or_default()
        }
    }

    pub fn args(&self) -> Vec<String> {
        let state = self.lock();
        match state.frames.last() {
            Some(frame) => frame.args.clone(),
            None => state.top_args.clone(),
        }
    }

    pub fn arg_count(&self) -> usize {
        let state = self.lock();
        match state.frames.last() {
            Some(frame) => frame.args.len(),
            None => state.top_args.len(),
        }
    }

    /// Drop the first `n` positional arguments of the active scope.
    pub fn shift(&self, n: usize) -> Result<(), ShellError> {
        let mut state = self.lock();
        let args = match state.frames.last_mut() {
            Some(frame) => &mut frame.args,
            None => &mut state.top_args,
        };
        if n > args.len() {
            return Err(ShellError::BuiltinUsage(format!(
                "shift: cannot shift by {n}, only {} arguments",
                args.len()
            )));
        }
        args.drain(..n);
        Ok(())
    }

    // ── call frames ────────────────────────────────────────────────────

    pub fn push_frame(&self, name: impl Into<String>, args: Vec<String>) {
        self.lock().frames.push(Frame {
            name: name.into(),
            args,
            ..Frame::default()
        });
    }

    /// Pop the innermost frame, yielding its return code and whether
    /// `return` was actually executed.
    pub fn pop_frame(&self) -> (i32, bool) {
        let frame = self
            .lock()
            .frames
            .pop()
            .expect("pop_frame without a matching push");
        (frame.return_code, frame.returned)
    }

    /// Arrange for the innermost function call to unwind. Fails at the top
    /// level, where there is nothing to return from.
    pub fn set_return(&self, code: i32) -> Result<(), ShellError> {
        let mut state = self.lock();
        match state.frames.last_mut() {
            Some(frame) => {
                frame.returned = true;
                frame.return_code = code;
                Ok(())
            }
            None => Err(ShellError::BuiltinUsage(
                "return: can only be used in a function".into(),
            )),
        }
    }

    // ── exit machinery ─────────────────────────────────────────────────

    /// Record the shell's exit. Idempotent: the first code wins, and the
    /// done signal fires exactly once.
    pub fn exit(&self, code: i32) {
        let mut state = self.lock();
        if state.exited {
            return;
        }
        state.exited = true;
        state.exit_code = code;
        drop(state);
        self.inner.done.send_replace(Some(code));
    }

    pub fn exit_status(&self) -> Option<i32> {
        let state = self.lock();
        state.exited.then_some(state.exit_code)
    }

    /// A channel that yields the exit code once `exit` has been called,
    /// from any task or subshell coordinator.
    pub fn done_signal(&self) -> watch::Receiver<Option<i32>> {
        self.inner.done.subscribe()
    }

    /// True once further scheduling should cease: the shell has exited or
    /// the active function frame has returned.
    pub fn should_stop(&self) -> bool {
        let state = self.lock();
        state.exited || state.frames.last().is_some_and(|f| f.returned)
    }

    pub fn last_exit_code(&self) -> i32 {
        self.lock().last_exit_code
    }

    pub fn set_last_exit_code(&self, code: i32) {
        self.lock().last_exit_code = code;
    }

    // ── working directory ──────────────────────────────────────────────

    pub fn cwd(&self) -> PathBuf {
        self.lock().cwd.clone()
    }

    pub fn set_cwd(&self, dir: PathBuf) {
        self.lock().cwd = dir;
    }

    /// Interpret a path the way commands see it: relative names hang off
    /// the shell's working directory, not the process's.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd().join(p)
        }
    }

    // ── functions ──────────────────────────────────────────────────────

    pub fn define_function(&self, name: &str, body: Arc<CommandNode>) {
        self.lock().functions.insert(name.to_string(), body);
    }

    pub fn function(&self, name: &str) -> Option<Arc<CommandNode>> {
        self.lock().functions.get(name).cloned()
    }

    // ── subshells ──────────────────────────────────────────────────────

    /// An isolated shell seeded from this one: globals, exports, cwd, and
    /// the current positional arguments are copied; functions and call
    /// frames are not.
    pub fn subshell(&self) -> Shell {
        let state = self.lock();
        let (name, args) = match state.frames.last() {
            Some(frame) => (frame.name.clone(), frame.args.clone()),
            None => (state.program_name.clone(), state.top_args.clone()),
        };
        Shell::with_state(State {
            globals: state.globals.clone(),
            exported: state.exported.clone(),
            functions: HashMap::new(),
            frames: Vec::new(),
            cwd: state.cwd.clone(),
            exited: false,
            exit_code: 0,
            last_exit_code: state.last_exit_code,
            program_name: name,
            top_args: args,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> Shell {
        Shell::new("rush", vec![]).unwrap()
    }

    #[test]
    fn lookup_prefers_globals_over_the_environment() {
        let sh = shell();
        std::env::set_var("RUSH_TEST_PRECEDENCE", "from-env");
        assert_eq!(sh.get_var("RUSH_TEST_PRECEDENCE"), "from-env");

        sh.set_var("RUSH_TEST_PRECEDENCE", "from-global");
        assert_eq!(sh.get_var("RUSH_TEST_PRECEDENCE"), "from-global");

        assert_eq!(sh.get_var("RUSH_TEST_UNSET"), "");
    }

    #[test]
    fn writes_inside_a_frame_update_the_globals() {
        let sh = shell();
        sh.push_frame("f", vec![]);
        sh.set_var("G", "global-from-frame");
        assert_eq!(sh.get_var("G"), "global-from-frame");
        sh.pop_frame();
        // Function calls have no variable scope of their own.
        assert_eq!(sh.get_var("G"), "global-from-frame");
    }

    #[test]
    fn positional_arguments_track_the_active_frame() {
        let sh = Shell::new("prog", vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(sh.get_arg(0), "prog");
        assert_eq!(sh.get_arg(1), "a");
        assert_eq!(sh.get_arg(3), "");
        assert_eq!(sh.arg_count(), 2);

        sh.push_frame("f", vec!["x".into()]);
        assert_eq!(sh.get_arg(0), "f");
        assert_eq!(sh.get_arg(1), "x");
        assert_eq!(sh.arg_count(), 1);
        sh.pop_frame();
    }

    #[test]
    fn shift_past_the_end_fails_and_changes_nothing() {
        let sh = Shell::new("prog", vec!["a".into(), "b".into()]).unwrap();
        assert!(matches!(
            sh.shift(3),
            Err(ShellError::BuiltinUsage(_))
        ));
        assert_eq!(sh.args(), vec!["a".to_string(), "b".to_string()]);
        sh.shift(1).unwrap();
        assert_eq!(sh.args(), vec!["b".to_string()]);
    }

    #[test]
    fn exit_is_idempotent_and_signals_once() {
        let sh = shell();
        let rx = sh.done_signal();
        assert!(sh.exit_status().is_none());
        sh.exit(7);
        sh.exit(9);
        assert_eq!(sh.exit_status(), Some(7));
        assert_eq!(*rx.borrow(), Some(7));
        assert!(sh.should_stop());
    }

    #[test]
    fn return_needs_a_frame() {
        let sh = shell();
        assert!(matches!(
            sh.set_return(3),
            Err(ShellError::BuiltinUsage(_))
        ));
        sh.push_frame("f", vec![]);
        sh.set_return(3).unwrap();
        assert!(sh.should_stop());
        assert_eq!(sh.pop_frame(), (3, true));
        assert!(!sh.should_stop());
    }

    #[test]
    fn subshell_copies_globals_but_not_functions() {
        let sh = shell();
        sh.set_var("X", "1");
        sh.export("X");
        sh.define_function(
            "f",
            Arc::new(CommandNode::SetVars { assigns: vec![] }),
        );

        let sub = sh.subshell();
        assert_eq!(sub.get_var("X"), "1");
        assert_eq!(sub.exported_names(), vec!["X".to_string()]);
        assert!(sub.function("f").is_none());

        sub.set_var("X", "2");
        assert_eq!(sh.get_var("X"), "1");

        sub.exit(5);
        assert!(sh.exit_status().is_none());
    }
}

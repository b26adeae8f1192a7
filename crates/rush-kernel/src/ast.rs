//! Command-tree and value-expression definitions.
//!
//! A parsed line is a tree of [`CommandNode`]s. Leaves are simple commands
//! whose words are [`ValueExpr`]s, expanded lazily when the command starts.
//! Child links are `Arc` so that the evaluator's coordinator tasks can own
//! the subtrees they schedule.

use std::fmt;
use std::sync::Arc;

/// A value that expands at run time to a string (or, as a command argument,
/// to a list of strings).
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    /// Fixed text. `glob` is true for unquoted words, which are candidates
    /// for pathname expansion when used as arguments.
    Literal { text: String, glob: bool },
    /// `$NAME` or `${NAME}`, with an optional `${NAME:-default}` fallback.
    Var {
        name: String,
        default: Option<Box<ValueExpr>>,
    },
    /// Positional parameter `$N` or `${N}`.
    Arg {
        n: usize,
        default: Option<Box<ValueExpr>>,
    },
    /// `$?`, `$#`, `$@`, `$$`.
    Special(SpecialParam),
    /// `$(...)`: run the tree, capture stdout.
    CommandSubst(Arc<CommandNode>),
    /// Adjacent pieces concatenated into one word, e.g. `a"b"$C`.
    Composite(Vec<ValueExpr>),
}

impl ValueExpr {
    pub fn literal(text: impl Into<String>) -> Self {
        ValueExpr::Literal {
            text: text.into(),
            glob: false,
        }
    }

    pub fn word(text: impl Into<String>) -> Self {
        ValueExpr::Literal {
            text: text.into(),
            glob: true,
        }
    }
}

/// The special parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialParam {
    /// `$?`: exit code of the most recently awaited command.
    Status,
    /// `$#`: number of positional arguments.
    Count,
    /// `$@`: all positional arguments.
    AllArgs,
    /// `$$`: the shell's process id.
    Pid,
}

/// One `NAME=value` pair, either a transient prefix of a simple command or
/// part of an assignment-only command.
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub name: String,
    pub value: ValueExpr,
}

/// How the two sides of a sequence relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqKind {
    /// `;` or newline: always run the right side.
    Uncond,
    /// `&&`: run the right side only on success.
    And,
    /// `||`: run the right side only on failure.
    Or,
}

/// How a redirection target file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirMode {
    Read,
    Truncate,
    Append,
    ReadWrite,
}

/// A node of the parsed command tree. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandNode {
    /// `name args...`, possibly with `VAR=x` prefixes that only seed the
    /// child environment.
    Simple {
        name: ValueExpr,
        args: Vec<ValueExpr>,
        assigns: Vec<Assign>,
    },
    /// Assignments with no command word: mutate the current scope.
    SetVars { assigns: Vec<Assign> },
    /// `left | right`.
    Pipeline {
        left: Arc<CommandNode>,
        right: Arc<CommandNode>,
    },
    /// `left ; right`, `left && right`, `left || right`.
    Seq {
        left: Arc<CommandNode>,
        right: Arc<CommandNode>,
        kind: SeqKind,
    },
    /// `inner &`.
    Background { inner: Arc<CommandNode> },
    /// `( body )`: isolated state.
    Subshell { body: Arc<CommandNode> },
    /// `{ body }`: same state, just grouping.
    Group { body: Arc<CommandNode> },
    /// One redirection applied around `inner`. `by_ref` marks `N>&M` style
    /// duplication of an already-open stream.
    Redirect {
        inner: Arc<CommandNode>,
        fd: u32,
        target: ValueExpr,
        mode: RedirMode,
        by_ref: bool,
    },
    If {
        cond: Arc<CommandNode>,
        then_branch: Arc<CommandNode>,
        else_branch: Option<Arc<CommandNode>>,
    },
    While {
        cond: Arc<CommandNode>,
        body: Arc<CommandNode>,
    },
    /// `function name() body`.
    FunctionDef {
        name: ValueExpr,
        body: Arc<CommandNode>,
    },
}

impl fmt::Display for SeqKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeqKind::Uncond => write!(f, ";"),
            SeqKind::And => write!(f, "&&"),
            SeqKind::Or => write!(f, "||"),
        }
    }
}

impl SpecialParam {
    pub fn symbol(&self) -> char {
        match self {
            SpecialParam::Status => '?',
            SpecialParam::Count => '#',
            SpecialParam::AllArgs => '@',
            SpecialParam::Pid => '$',
        }
    }
}

fn default_text(value: &ValueExpr) -> &str {
    match value {
        ValueExpr::Literal { text, .. } => text,
        _ => "",
    }
}

/// Renders a value back to source form. Together with the parser this is
/// a round trip for redirect-free input: rendering a parsed tree and
/// parsing the result reproduces the tree.
impl fmt::Display for ValueExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpr::Literal { text, glob: true } => write!(f, "{text}"),
            ValueExpr::Literal { text, glob: false } => write!(f, "'{text}'"),
            ValueExpr::Var {
                name,
                default: None,
            } => write!(f, "${{{name}}}"),
            ValueExpr::Var {
                name,
                default: Some(d),
            } => write!(f, "${{{name}:-{}}}", default_text(d)),
            ValueExpr::Arg { n, default: None } => write!(f, "${{{n}}}"),
            ValueExpr::Arg {
                n,
                default: Some(d),
            } => write!(f, "${{{n}:-{}}}", default_text(d)),
            ValueExpr::Special(sp) => write!(f, "${}", sp.symbol()),
            ValueExpr::CommandSubst(tree) => write!(f, "$({tree})"),
            ValueExpr::Composite(parts) => {
                for part in parts {
                    write!(f, "{part}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandNode::Simple {
                name,
                args,
                assigns,
            } => {
                for assign in assigns {
                    write!(f, "{}={} ", assign.name, assign.value)?;
                }
                write!(f, "{name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            CommandNode::SetVars { assigns } => {
                for (i, assign) in assigns.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}={}", assign.name, assign.value)?;
                }
                Ok(())
            }
            CommandNode::Pipeline { left, right } => write!(f, "{left} | {right}"),
            CommandNode::Seq { left, right, kind } => match kind {
                SeqKind::Uncond => write!(f, "{left}; {right}"),
                SeqKind::And => write!(f, "{left} && {right}"),
                SeqKind::Or => write!(f, "{left} || {right}"),
            },
            CommandNode::Background { inner } => write!(f, "{inner} &"),
            CommandNode::Subshell { body } => write!(f, "({body})"),
            CommandNode::Group { body } => write!(f, "{{ {body}; }}"),
            CommandNode::Redirect {
                inner,
                fd,
                target,
                mode,
                by_ref,
            } => {
                let op = match (mode, by_ref) {
                    (RedirMode::Read, false) => "<",
                    (RedirMode::Truncate, false) => ">",
                    (RedirMode::Append, false) => ">>",
                    (RedirMode::ReadWrite, false) => "<>",
                    (RedirMode::Read, true) => "<&",
                    (_, true) => ">&",
                };
                let default_fd = if op.starts_with('<') { 0 } else { 1 };
                write!(f, "{inner} ")?;
                if *fd != default_fd {
                    write!(f, "{fd}")?;
                }
                write!(f, "{op}{target}")
            }
            CommandNode::If {
                cond,
                then_branch,
                else_branch,
            } => {
                write!(f, "if {cond}; then {then_branch}; ")?;
                if let Some(els) = else_branch {
                    write!(f, "else {els}; ")?;
                }
                write!(f, "fi")
            }
            CommandNode::While { cond, body } => {
                write!(f, "while {cond}; do {body}; done")
            }
            CommandNode::FunctionDef { name, body } => {
                write!(f, "function {name}() {body}")
            }
        }
    }
}

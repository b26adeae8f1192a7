//! Recursive-descent parser: token stream in, command tree out.
//!
//! The grammar, condensed:
//!
//! ```text
//! Line        := CmdList? EOF
//! CmdList     := (CmdLogical Term?)+          Term: ';' '&' newline
//! CmdLogical  := Pipeline (('&&'|'||') Pipeline)*
//! Pipeline    := PipelineItem ('|' PipelineItem)*
//! PipelineItem:= SimpleCmd | '{' CmdList '}' | '(' CmdList ')'
//!              | If | While | FunctionDef
//! SimpleCmd   := Assignment* (Value | Redirect)+
//! Value       := SingleValue+                 adjacency makes a composite
//! ```
//!
//! `}`, `)`, EOF, and the closing keywords (`then`, `fi`, `done`, ...)
//! terminate a CmdList without being consumed. A `&` terminator wraps the
//! preceding CmdLogical in a background node.
//!
//! Running out of tokens in the middle of a construct yields
//! [`ShellError::Incomplete`], which the REPL answers with a continuation
//! prompt rather than an error message.

use std::sync::Arc;

use crate::ast::{Assign, CommandNode, RedirMode, SeqKind, ValueExpr};
use crate::error::{Result, ShellError};
use crate::lexer::{tokenize, Keyword, RedirKind, RedirectOp, Tok};

/// Parse one logical unit of source text into a command tree.
///
/// Returns `Ok(None)` for blank input.
pub fn parse(src: &str) -> Result<Option<Arc<CommandNode>>> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let tree = parser.line()?;
    if let Some(node) = &tree {
        tracing::debug!(tree = ?node, "parsed command list");
    }
    Ok(tree)
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Space => "whitespace".into(),
        Tok::Term('\n') => "newline".into(),
        Tok::Term(c) => format!("'{c}'"),
        Tok::AndIf => "'&&'".into(),
        Tok::OrIf => "'||'".into(),
        Tok::Pipe => "'|'".into(),
        Tok::OpenParen => "'('".into(),
        Tok::CloseParen => "')'".into(),
        Tok::OpenBrace => "'{'".into(),
        Tok::CloseBrace => "'}'".into(),
        Tok::Redirect(_) => "redirection".into(),
        Tok::Var(n) => format!("'${n}'"),
        Tok::ArgRef(n) => format!("'${n}'"),
        Tok::Special(_) => "special parameter".into(),
        Tok::DollarParen => "'$('".into(),
        Tok::DollarBrace => "'${'".into(),
        Tok::Assign(n) => format!("'{n}='"),
        Tok::Word(w) => format!("'{w}'"),
        Tok::Keyword(k) => format!("'{}'", k.as_str()),
        Tok::StartQuote | Tok::EndQuote => "'\"'".into(),
        Tok::Chunk(_) => "string text".into(),
        Tok::RawStr(_) => "quoted string".into(),
        Tok::Name(n) => format!("'{n}'"),
        Tok::Default(_) => "default value".into(),
        Tok::Eof => "end of input".into(),
    }
}

/// Keywords that close an enclosing construct and so terminate a CmdList.
fn is_closing_keyword(k: Keyword) -> bool {
    matches!(
        k,
        Keyword::Then | Keyword::Elif | Keyword::Else | Keyword::Fi | Keyword::Do | Keyword::Done
    )
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).unwrap_or(&Tok::Eof)
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        self.pos += 1;
        tok
    }

    fn skip_space(&mut self) {
        while matches!(self.peek(), Tok::Space) {
            self.pos += 1;
        }
    }

    /// Skip whitespace and stray terminators, e.g. blank lines in a script.
    fn skip_blanks(&mut self) {
        while matches!(self.peek(), Tok::Space | Tok::Term(_)) {
            self.pos += 1;
        }
    }

    fn at_list_end(&self) -> bool {
        match self.peek() {
            Tok::Eof | Tok::CloseParen | Tok::CloseBrace => true,
            Tok::Keyword(k) => is_closing_keyword(*k),
            _ => false,
        }
    }

    fn line(&mut self) -> Result<Option<Arc<CommandNode>>> {
        let list = self.cmd_list()?;
        match self.peek() {
            Tok::Eof => Ok(list),
            other => Err(ShellError::Parse(format!(
                "unexpected {}",
                describe(other)
            ))),
        }
    }

    fn cmd_list(&mut self) -> Result<Option<Arc<CommandNode>>> {
        let mut acc: Option<Arc<CommandNode>> = None;
        loop {
            self.skip_blanks();
            if self.at_list_end() {
                break;
            }
            let mut item = self.cmd_logical()?;
            self.skip_space();
            match self.peek() {
                Tok::Term('&') => {
                    self.bump();
                    item = Arc::new(CommandNode::Background { inner: item });
                }
                Tok::Term(_) => {
                    self.bump();
                }
                tok if matches!(tok, Tok::Eof | Tok::CloseParen | Tok::CloseBrace)
                    || matches!(tok, Tok::Keyword(k) if is_closing_keyword(*k)) => {}
                other => {
                    return Err(ShellError::Parse(format!(
                        "expected ';', '&' or newline before {}",
                        describe(other)
                    )))
                }
            }
            acc = Some(match acc.take() {
                None => item,
                Some(left) => Arc::new(CommandNode::Seq {
                    left,
                    right: item,
                    kind: SeqKind::Uncond,
                }),
            });
        }
        Ok(acc)
    }

    /// A CmdList that must not be empty, e.g. the condition of an `if`.
    fn required_list(&mut self, what: &str) -> Result<Arc<CommandNode>> {
        match self.cmd_list()? {
            Some(node) => Ok(node),
            None if matches!(self.peek(), Tok::Eof) => Err(ShellError::Incomplete),
            None => Err(ShellError::Parse(format!(
                "expected commands {what}, found {}",
                describe(self.peek())
            ))),
        }
    }

    fn cmd_logical(&mut self) -> Result<Arc<CommandNode>> {
        let mut left = self.pipeline()?;
        loop {
            self.skip_space();
            let kind = match self.peek() {
                Tok::AndIf => SeqKind::And,
                Tok::OrIf => SeqKind::Or,
                _ => break,
            };
            self.bump();
            let right = self.pipeline()?;
            left = Arc::new(CommandNode::Seq { left, right, kind });
        }
        Ok(left)
    }

    fn pipeline(&mut self) -> Result<Arc<CommandNode>> {
        let mut left = self.pipeline_item()?;
        loop {
            self.skip_space();
            if !matches!(self.peek(), Tok::Pipe) {
                break;
            }
            self.bump();
            let right = self.pipeline_item()?;
            left = Arc::new(CommandNode::Pipeline { left, right });
        }
        Ok(left)
    }

    fn pipeline_item(&mut self) -> Result<Arc<CommandNode>> {
        self.skip_space();
        match self.peek() {
            Tok::Keyword(Keyword::If) => {
                self.bump();
                self.if_body()
            }
            Tok::Keyword(Keyword::While) => {
                self.bump();
                self.while_body()
            }
            Tok::Keyword(Keyword::Function) => {
                self.bump();
                self.function_def()
            }
            Tok::Keyword(k) if is_closing_keyword(*k) => Err(ShellError::Parse(format!(
                "unexpected keyword '{}'",
                k.as_str()
            ))),
            Tok::OpenBrace => self.group(),
            Tok::OpenParen => self.subshell(),
            Tok::Eof => Err(ShellError::Incomplete),
            _ => self.simple_cmd(),
        }
    }

    fn group(&mut self) -> Result<Arc<CommandNode>> {
        self.bump();
        let body = self.cmd_list()?;
        match self.peek() {
            Tok::CloseBrace => {
                self.bump();
            }
            Tok::Eof => return Err(ShellError::Incomplete),
            other => {
                return Err(ShellError::Parse(format!(
                    "expected '}}', found {}",
                    describe(other)
                )))
            }
        }
        let body = body.ok_or_else(|| ShellError::Parse("empty group".into()))?;
        Ok(Arc::new(CommandNode::Group { body }))
    }

    fn subshell(&mut self) -> Result<Arc<CommandNode>> {
        self.bump();
        let body = self.cmd_list()?;
        match self.peek() {
            Tok::CloseParen => {
                self.bump();
            }
            Tok::Eof => return Err(ShellError::Incomplete),
            other => {
                return Err(ShellError::Parse(format!(
                    "expected ')', found {}",
                    describe(other)
                )))
            }
        }
        let body = body.ok_or_else(|| ShellError::Parse("empty subshell".into()))?;
        Ok(Arc::new(CommandNode::Subshell { body }))
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<()> {
        match self.peek() {
            Tok::Keyword(k) if *k == kw => {
                self.bump();
                Ok(())
            }
            Tok::Eof => Err(ShellError::Incomplete),
            other => Err(ShellError::Parse(format!(
                "expected '{}', found {}",
                kw.as_str(),
                describe(other)
            ))),
        }
    }

    /// Body of an `if`, entered with the `if` (or `elif`) already consumed.
    fn if_body(&mut self) -> Result<Arc<CommandNode>> {
        let cond = self.required_list("after 'if'")?;
        self.expect_keyword(Keyword::Then)?;
        let then_branch = self.required_list("after 'then'")?;
        let else_branch = match self.peek() {
            Tok::Keyword(Keyword::Elif) => {
                self.bump();
                // The nested if consumes the shared closing `fi`.
                return Ok(Arc::new(CommandNode::If {
                    cond,
                    then_branch,
                    else_branch: Some(self.if_body()?),
                }));
            }
            Tok::Keyword(Keyword::Else) => {
                self.bump();
                let els = self.required_list("after 'else'")?;
                Some(els)
            }
            _ => None,
        };
        self.expect_keyword(Keyword::Fi)?;
        Ok(Arc::new(CommandNode::If {
            cond,
            then_branch,
            else_branch,
        }))
    }

    fn while_body(&mut self) -> Result<Arc<CommandNode>> {
        let cond = self.required_list("after 'while'")?;
        self.expect_keyword(Keyword::Do)?;
        let body = self.required_list("after 'do'")?;
        self.expect_keyword(Keyword::Done)?;
        Ok(Arc::new(CommandNode::While { cond, body }))
    }

    fn function_def(&mut self) -> Result<Arc<CommandNode>> {
        self.skip_space();
        if matches!(self.peek(), Tok::Eof) {
            return Err(ShellError::Incomplete);
        }
        let name = self.value()?;
        self.skip_space();
        match self.peek() {
            Tok::OpenParen => {
                self.bump();
            }
            Tok::Eof => return Err(ShellError::Incomplete),
            other => {
                return Err(ShellError::Parse(format!(
                    "expected '()' after function name, found {}",
                    describe(other)
                )))
            }
        }
        match self.peek() {
            Tok::CloseParen => {
                self.bump();
            }
            Tok::Eof => return Err(ShellError::Incomplete),
            other => {
                return Err(ShellError::Parse(format!(
                    "expected ')' after function name, found {}",
                    describe(other)
                )))
            }
        }
        self.skip_space();
        let body = self.pipeline_item()?;
        Ok(Arc::new(CommandNode::FunctionDef { name, body }))
    }

    fn starts_value(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Word(_)
                | Tok::RawStr(_)
                | Tok::Assign(_)
                | Tok::Keyword(_)
                | Tok::Var(_)
                | Tok::ArgRef(_)
                | Tok::Special(_)
                | Tok::StartQuote
                | Tok::DollarParen
                | Tok::DollarBrace
        )
    }

    fn simple_cmd(&mut self) -> Result<Arc<CommandNode>> {
        let mut assigns: Vec<Assign> = Vec::new();
        let mut values: Vec<ValueExpr> = Vec::new();
        let mut redirects: Vec<(RedirectOp, ValueExpr)> = Vec::new();
        loop {
            self.skip_space();
            match self.peek().clone() {
                Tok::Assign(name) if values.is_empty() && redirects.is_empty() => {
                    self.bump();
                    let value = if self.starts_value() {
                        self.value()?
                    } else {
                        ValueExpr::literal("")
                    };
                    assigns.push(Assign { name, value });
                }
                Tok::Redirect(op) => {
                    self.bump();
                    self.skip_space();
                    if !self.starts_value() {
                        return Err(ShellError::Parse(format!(
                            "expected redirection target, found {}",
                            describe(self.peek())
                        )));
                    }
                    redirects.push((op, self.value()?));
                }
                _ if self.starts_value() => values.push(self.value()?),
                _ => break,
            }
        }
        if assigns.is_empty() && values.is_empty() && redirects.is_empty() {
            return Err(ShellError::Parse(format!(
                "expected a command, found {}",
                describe(self.peek())
            )));
        }
        let mut node = Arc::new(if values.is_empty() {
            CommandNode::SetVars { assigns }
        } else {
            let mut words = values.into_iter();
            CommandNode::Simple {
                name: words.next().expect("values is non-empty"),
                args: words.collect(),
                assigns,
            }
        });
        // Wrap in source order, innermost last, so that when the evaluator
        // walks outermost-first the last redirection of an fd wins.
        for (op, target) in redirects.into_iter().rev() {
            node = wrap_redirect(op, target, node);
        }
        Ok(node)
    }

    /// One (possibly composite) word: adjacent pieces glue together.
    fn value(&mut self) -> Result<ValueExpr> {
        let mut parts: Vec<ValueExpr> = Vec::new();
        loop {
            match self.peek().clone() {
                Tok::Word(text) => {
                    self.bump();
                    parts.push(ValueExpr::Literal { text, glob: true });
                }
                Tok::RawStr(text) => {
                    self.bump();
                    parts.push(ValueExpr::literal(text));
                }
                Tok::Assign(name) => {
                    self.bump();
                    parts.push(ValueExpr::literal(format!("{name}=")));
                }
                Tok::Keyword(k) => {
                    self.bump();
                    parts.push(ValueExpr::literal(k.as_str()));
                }
                Tok::Var(name) => {
                    self.bump();
                    parts.push(ValueExpr::Var {
                        name,
                        default: None,
                    });
                }
                Tok::ArgRef(n) => {
                    self.bump();
                    parts.push(ValueExpr::Arg { n, default: None });
                }
                Tok::Special(sp) => {
                    self.bump();
                    parts.push(ValueExpr::Special(sp));
                }
                Tok::StartQuote => {
                    self.bump();
                    parts.push(self.quoted_string()?);
                }
                Tok::DollarParen => {
                    self.bump();
                    parts.push(self.command_subst()?);
                }
                Tok::DollarBrace => {
                    self.bump();
                    parts.push(self.param()?);
                }
                _ => break,
            }
        }
        match parts.len() {
            0 => Err(ShellError::Parse(format!(
                "expected a word, found {}",
                describe(self.peek())
            ))),
            1 => Ok(parts.pop().expect("one part")),
            _ => Ok(ValueExpr::Composite(parts)),
        }
    }

    fn quoted_string(&mut self) -> Result<ValueExpr> {
        let mut parts: Vec<ValueExpr> = Vec::new();
        loop {
            match self.peek().clone() {
                Tok::Chunk(text) => {
                    self.bump();
                    parts.push(ValueExpr::literal(text));
                }
                Tok::Var(name) => {
                    self.bump();
                    parts.push(ValueExpr::Var {
                        name,
                        default: None,
                    });
                }
                Tok::ArgRef(n) => {
                    self.bump();
                    parts.push(ValueExpr::Arg { n, default: None });
                }
                Tok::Special(sp) => {
                    self.bump();
                    parts.push(ValueExpr::Special(sp));
                }
                Tok::DollarParen => {
                    self.bump();
                    parts.push(self.command_subst()?);
                }
                Tok::DollarBrace => {
                    self.bump();
                    parts.push(self.param()?);
                }
                Tok::EndQuote => {
                    self.bump();
                    break;
                }
                Tok::Eof => return Err(ShellError::Incomplete),
                other => {
                    return Err(ShellError::Parse(format!(
                        "unexpected {} in string",
                        describe(&other)
                    )))
                }
            }
        }
        Ok(match parts.len() {
            0 => ValueExpr::literal(""),
            1 => parts.pop().expect("one part"),
            _ => ValueExpr::Composite(parts),
        })
    }

    fn command_subst(&mut self) -> Result<ValueExpr> {
        let body = self.cmd_list()?;
        match self.peek() {
            Tok::CloseParen => {
                self.bump();
            }
            Tok::Eof => return Err(ShellError::Incomplete),
            other => {
                return Err(ShellError::Parse(format!(
                    "expected ')', found {}",
                    describe(other)
                )))
            }
        }
        // `$()` expands to nothing; an empty assignment list is a no-op
        // command with empty output.
        let body = body.unwrap_or_else(|| Arc::new(CommandNode::SetVars { assigns: vec![] }));
        Ok(ValueExpr::CommandSubst(body))
    }

    fn param(&mut self) -> Result<ValueExpr> {
        let expr = match self.bump() {
            Tok::Name(name) => ValueExpr::Var {
                name,
                default: self.opt_default(),
            },
            Tok::ArgRef(n) => ValueExpr::Arg {
                n,
                default: self.opt_default(),
            },
            Tok::Special(sp) => ValueExpr::Special(sp),
            Tok::CloseBrace => return Err(ShellError::Parse("empty parameter expansion".into())),
            Tok::Eof => return Err(ShellError::Incomplete),
            other => {
                return Err(ShellError::Parse(format!(
                    "bad parameter expansion: {}",
                    describe(&other)
                )))
            }
        };
        match self.peek() {
            Tok::CloseBrace => {
                self.bump();
                Ok(expr)
            }
            Tok::Eof => Err(ShellError::Incomplete),
            other => Err(ShellError::Parse(format!(
                "expected '}}', found {}",
                describe(other)
            ))),
        }
    }

    fn opt_default(&mut self) -> Option<Box<ValueExpr>> {
        if let Tok::Default(text) = self.peek().clone() {
            self.bump();
            Some(Box::new(ValueExpr::literal(text)))
        } else {
            None
        }
    }
}

fn wrap_redirect(op: RedirectOp, target: ValueExpr, inner: Arc<CommandNode>) -> Arc<CommandNode> {
    let (fd, mode, by_ref) = match op.kind {
        RedirKind::In => (op.fd.unwrap_or(0), RedirMode::Read, false),
        RedirKind::Out => (op.fd.unwrap_or(1), RedirMode::Truncate, false),
        RedirKind::OutAppend => (op.fd.unwrap_or(1), RedirMode::Append, false),
        RedirKind::InOut => (op.fd.unwrap_or(0), RedirMode::ReadWrite, false),
        RedirKind::DupIn => (op.fd.unwrap_or(0), RedirMode::Read, true),
        RedirKind::DupOut => (op.fd.unwrap_or(1), RedirMode::Truncate, true),
        RedirKind::Both | RedirKind::BothAppend => {
            // `&> f` is `> f 2>&1`: stderr duplicates whatever fd 1 has
            // become, so the dup sits inside the file redirect.
            let mode = if op.kind == RedirKind::BothAppend {
                RedirMode::Append
            } else {
                RedirMode::Truncate
            };
            let inner = Arc::new(CommandNode::Redirect {
                inner,
                fd: 2,
                target: ValueExpr::literal("1"),
                mode: RedirMode::Truncate,
                by_ref: true,
            });
            return Arc::new(CommandNode::Redirect {
                inner,
                fd: 1,
                target,
                mode,
                by_ref: false,
            });
        }
    };
    Arc::new(CommandNode::Redirect {
        inner,
        fd,
        target,
        mode,
        by_ref,
    })
}

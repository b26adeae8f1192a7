//! Mode-switching tokenizer.
//!
//! Shell syntax cannot be lexed with a single token set: `"..."` interiors,
//! `${...}` interiors, and ordinary command text all have different rules,
//! and `$(...)` re-enters command syntax from inside a string. Each mode is
//! its own [`logos`] lexer; a small driver owns a mode stack and splices the
//! three token sets into one [`Tok`] stream:
//!
//! - `cmd` (default): words, operators, quotes, `$NAME`, `$(`, `${`
//! - `str` (inside `"..."`): literal chunks, escapes, `$NAME`, `$(`, `${`
//! - `param` (inside `${...}`): a name, argument number, or special char,
//!   with an optional `:-` default
//!
//! `$(` and `(` push `cmd`, `${` pushes `param`, `"` pushes `str`; the
//! matching `)`, `}`, `"` pop. Input that ends with the stack still pushed
//! is reported as [`ShellError::Incomplete`] so the REPL can keep reading.

use logos::Logos;

use crate::ast::SpecialParam;
use crate::error::ShellError;

/// Reserved words. Only honored by the parser where a new command may
/// start; anywhere else they are downgraded to ordinary words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Then,
    Elif,
    Else,
    Fi,
    While,
    Do,
    Done,
    Function,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Then => "then",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::Fi => "fi",
            Keyword::While => "while",
            Keyword::Do => "do",
            Keyword::Done => "done",
            Keyword::Function => "function",
        }
    }
}

/// Redirection operator shapes as lexed, before fd defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirKind {
    /// `<`
    In,
    /// `>`
    Out,
    /// `>>`
    OutAppend,
    /// `<>`
    InOut,
    /// `<&M`
    DupIn,
    /// `>&M`
    DupOut,
    /// `&>`
    Both,
    /// `&>>`
    BothAppend,
}

/// A redirection operator with its optional leading descriptor digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectOp {
    pub fd: Option<u32>,
    pub kind: RedirKind,
}

/// The unified token stream handed to the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Whitespace separating words inside a simple command.
    Space,
    /// `;`, `&`, or newline; the char says which.
    Term(char),
    /// `&&`.
    AndIf,
    /// `||`.
    OrIf,
    Pipe,
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Redirect(RedirectOp),
    /// `$NAME`.
    Var(String),
    /// `$N` (single digit bare, any number of digits in `${N}`).
    ArgRef(usize),
    /// `$?`, `$#`, `$@`, `$$`.
    Special(SpecialParam),
    /// `$(`.
    DollarParen,
    /// `${`.
    DollarBrace,
    /// `NAME=` starting an assignment; the name is stored without the `=`.
    Assign(String),
    /// An unquoted word, escapes already resolved.
    Word(String),
    Keyword(Keyword),
    StartQuote,
    EndQuote,
    /// A run of literal text inside `"..."`, escapes already resolved.
    Chunk(String),
    /// A single-quoted string, taken verbatim.
    RawStr(String),
    /// A name inside `${...}`.
    Name(String),
    /// The default text of `${NAME:-default}`.
    Default(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexError {
    #[default]
    UnexpectedCharacter,
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(error = LexError)]
enum CmdToken {
    #[regex(r"[ \t]+")]
    Space,

    #[regex(r"\\\n[ \t]*", priority = 10)]
    LineJoin,

    #[regex(r"&&[ \t\n]*")]
    AndIf,

    #[regex(r"\|\|[ \t\n]*")]
    OrIf,

    #[regex(r"[;&\n][ \t\n]*")]
    Term,

    #[regex(r"\|[ \t\n]*")]
    Pipe,

    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_-]*")]
    Var,

    #[regex(r"\$[0-9]")]
    ArgRef,

    #[regex(r"\$[?#@$]")]
    Special,

    #[token("$(")]
    DollarParen,

    #[token("${")]
    DollarBrace,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_-]*=")]
    Assign,

    #[regex(r"\([ \t\n]*")]
    OpenParen,

    #[token(")")]
    CloseParen,

    #[regex(r"\{[ \t\n]*", priority = 10)]
    OpenBrace,

    #[token("}", priority = 10)]
    CloseBrace,

    #[regex(r"[0-9]?(?:>>|>&|<&|<>|>|<)|&>>|&>")]
    Redirect,

    #[token("\"")]
    StartQuote,

    #[regex(r"'[^']*'")]
    RawStr,

    #[token("=")]
    Eq,

    #[token("if", priority = 10)]
    If,
    #[token("then", priority = 10)]
    Then,
    #[token("elif", priority = 10)]
    Elif,
    #[token("else", priority = 10)]
    Else,
    #[token("fi", priority = 10)]
    Fi,
    #[token("while", priority = 10)]
    While,
    #[token("do", priority = 10)]
    Do,
    #[token("done", priority = 10)]
    Done,
    #[token("function", priority = 10)]
    Function,

    #[regex(r#"(?:[^ \t\n();&|<>$'"=\\]|\\[\s\S])+"#)]
    Word,
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(error = LexError)]
enum StrToken {
    #[token("\"")]
    EndQuote,

    #[regex(r"\\[0-9][0-9]?[0-9]?|\\[xX][0-9a-fA-F][0-9a-fA-F]|\\[uU]\{[0-9a-fA-F]+\}|\\[\s\S]")]
    Escaped,

    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_-]*")]
    Var,

    #[regex(r"\$[0-9]")]
    ArgRef,

    #[regex(r"\$[?#@$]")]
    Special,

    #[token("$(")]
    DollarParen,

    #[token("${")]
    DollarBrace,

    #[regex(r#"[^\\$"]+"#)]
    Lit,
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(error = LexError)]
enum ParamToken {
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_-]*")]
    Name,

    #[regex(r"[0-9]+")]
    ArgNum,

    #[regex(r"[?#@$]")]
    Special,

    #[regex(r":-[^}]*")]
    Default,

    #[token("}")]
    CloseBrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Cmd,
    Str,
    Param,
}

fn special_param(c: char) -> SpecialParam {
    match c {
        '?' => SpecialParam::Status,
        '#' => SpecialParam::Count,
        '@' => SpecialParam::AllArgs,
        '$' => SpecialParam::Pid,
        _ => unreachable!("lexer only matches ?#@$"),
    }
}

fn unexpected(src: &str, at: usize) -> ShellError {
    let tail: String = src[at..].chars().take(12).collect();
    ShellError::Parse(format!("unexpected character near {tail:?}"))
}

/// Resolve backslash escapes in an unquoted word: the backslash is dropped,
/// and an escaped newline disappears entirely.
fn unescape_word(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\n') | None => {}
            Some(next) => out.push(next),
        }
    }
    out
}

/// Decode one escape sequence from a double-quoted string.
///
/// Unrecognized escapes keep both characters.
fn decode_escape(esc: &str) -> Result<String, ShellError> {
    let body = &esc[1..];
    let first = body.chars().next().unwrap_or('\\');
    let s = match first {
        'a' => "\u{07}".to_string(),
        'b' => "\u{08}".to_string(),
        't' => "\t".to_string(),
        'n' => "\n".to_string(),
        'v' => "\u{0B}".to_string(),
        'f' => "\u{0C}".to_string(),
        'r' => "\r".to_string(),
        '\\' => "\\".to_string(),
        'x' | 'X' => {
            let n = u32::from_str_radix(&body[1..], 16)
                .map_err(|_| ShellError::Expansion(format!("bad escape sequence {esc:?}")))?;
            char::from_u32(n)
                .ok_or_else(|| ShellError::Expansion(format!("bad escape sequence {esc:?}")))?
                .to_string()
        }
        '0'..='9' => {
            let n: u32 = body
                .parse()
                .map_err(|_| ShellError::Expansion(format!("bad escape sequence {esc:?}")))?;
            if n > 255 {
                return Err(ShellError::Expansion(format!(
                    "decimal escape out of range: {esc}"
                )));
            }
            char::from_u32(n).unwrap().to_string()
        }
        'u' | 'U' => {
            let hex = body
                .strip_prefix(['u', 'U'])
                .and_then(|b| b.strip_prefix('{'))
                .and_then(|b| b.strip_suffix('}'))
                .unwrap_or("");
            let n = u32::from_str_radix(hex, 16)
                .map_err(|_| ShellError::Expansion(format!("bad escape sequence {esc:?}")))?;
            if n > 0x10FFFF {
                return Err(ShellError::Expansion(format!(
                    "unicode escape out of range: {esc}"
                )));
            }
            char::from_u32(n)
                .ok_or_else(|| ShellError::Expansion(format!("bad escape sequence {esc:?}")))?
                .to_string()
        }
        _ => esc.to_string(),
    };
    Ok(s)
}

/// Tokenize one logical unit of source text.
///
/// Returns [`ShellError::Incomplete`] when the text ends inside a string,
/// a `$(...)`, a `${...}`, or a parenthesized group.
pub fn tokenize(src: &str) -> Result<Vec<Tok>, ShellError> {
    let mut out = Vec::new();
    let mut stack = vec![Mode::Cmd];
    let mut pos = 0;

    'outer: loop {
        match *stack.last().expect("mode stack never empties") {
            Mode::Cmd => {
                let mut lx = CmdToken::lexer(&src[pos..]);
                loop {
                    let Some(tok) = lx.next() else {
                        break 'outer;
                    };
                    let tok = tok.map_err(|_| unexpected(src, pos + lx.span().start))?;
                    let slice = lx.slice();
                    let mut switched = true;
                    match tok {
                        CmdToken::StartQuote => {
                            out.push(Tok::StartQuote);
                            stack.push(Mode::Str);
                        }
                        CmdToken::DollarParen => {
                            out.push(Tok::DollarParen);
                            stack.push(Mode::Cmd);
                        }
                        CmdToken::OpenParen => {
                            out.push(Tok::OpenParen);
                            stack.push(Mode::Cmd);
                        }
                        CmdToken::DollarBrace => {
                            out.push(Tok::DollarBrace);
                            stack.push(Mode::Param);
                        }
                        CmdToken::CloseParen => {
                            out.push(Tok::CloseParen);
                            if stack.len() > 1 {
                                stack.pop();
                            }
                        }
                        other => {
                            switched = false;
                            push_cmd_token(&mut out, other, slice);
                        }
                    }
                    if switched {
                        pos += lx.span().end;
                        continue 'outer;
                    }
                }
            }
            Mode::Str => {
                let mut lx = StrToken::lexer(&src[pos..]);
                let mut buf = String::new();
                loop {
                    let Some(tok) = lx.next() else {
                        break 'outer;
                    };
                    let tok = tok.map_err(|_| unexpected(src, pos + lx.span().start))?;
                    let slice = lx.slice();
                    match tok {
                        StrToken::Lit => {
                            buf.push_str(slice);
                            continue;
                        }
                        StrToken::Escaped => {
                            buf.push_str(&decode_escape(slice)?);
                            continue;
                        }
                        _ => {}
                    }
                    if !buf.is_empty() {
                        out.push(Tok::Chunk(std::mem::take(&mut buf)));
                    }
                    match tok {
                        StrToken::EndQuote => {
                            out.push(Tok::EndQuote);
                            stack.pop();
                        }
                        StrToken::Var => out.push(Tok::Var(slice[1..].to_string())),
                        StrToken::ArgRef => {
                            out.push(Tok::ArgRef(slice[1..].parse().unwrap_or(0)))
                        }
                        StrToken::Special => {
                            out.push(Tok::Special(special_param(slice.chars().nth(1).unwrap())))
                        }
                        StrToken::DollarParen => {
                            out.push(Tok::DollarParen);
                            stack.push(Mode::Cmd);
                        }
                        StrToken::DollarBrace => {
                            out.push(Tok::DollarBrace);
                            stack.push(Mode::Param);
                        }
                        StrToken::Lit | StrToken::Escaped => unreachable!(),
                    }
                    pos += lx.span().end;
                    continue 'outer;
                }
            }
            Mode::Param => {
                let mut lx = ParamToken::lexer(&src[pos..]);
                loop {
                    let Some(tok) = lx.next() else {
                        break 'outer;
                    };
                    let tok = tok.map_err(|_| unexpected(src, pos + lx.span().start))?;
                    let slice = lx.slice();
                    let mut switched = false;
                    match tok {
                        ParamToken::Name => out.push(Tok::Name(slice.to_string())),
                        ParamToken::ArgNum => {
                            let n: usize = slice.parse().map_err(|_| {
                                ShellError::Parse(format!("positional index too large: {slice}"))
                            })?;
                            out.push(Tok::ArgRef(n));
                        }
                        ParamToken::Special => {
                            out.push(Tok::Special(special_param(slice.chars().next().unwrap())))
                        }
                        ParamToken::Default => out.push(Tok::Default(slice[2..].to_string())),
                        ParamToken::CloseBrace => {
                            out.push(Tok::CloseBrace);
                            stack.pop();
                            switched = true;
                        }
                    }
                    if switched {
                        pos += lx.span().end;
                        continue 'outer;
                    }
                }
            }
        }
    }

    if stack.len() > 1 {
        return Err(ShellError::Incomplete);
    }
    out.push(Tok::Eof);
    Ok(out)
}

fn push_cmd_token(out: &mut Vec<Tok>, tok: CmdToken, slice: &str) {
    match tok {
        CmdToken::Space => out.push(Tok::Space),
        CmdToken::LineJoin => {}
        CmdToken::AndIf => out.push(Tok::AndIf),
        CmdToken::OrIf => out.push(Tok::OrIf),
        CmdToken::Term => out.push(Tok::Term(slice.chars().next().unwrap())),
        CmdToken::Pipe => out.push(Tok::Pipe),
        CmdToken::Var => out.push(Tok::Var(slice[1..].to_string())),
        CmdToken::ArgRef => out.push(Tok::ArgRef(slice[1..].parse().unwrap_or(0))),
        CmdToken::Special => out.push(Tok::Special(special_param(slice.chars().nth(1).unwrap()))),
        CmdToken::Assign => out.push(Tok::Assign(slice[..slice.len() - 1].to_string())),
        CmdToken::OpenBrace => out.push(Tok::OpenBrace),
        CmdToken::CloseBrace => out.push(Tok::CloseBrace),
        CmdToken::Redirect => out.push(Tok::Redirect(decode_redirect(slice))),
        CmdToken::RawStr => out.push(Tok::RawStr(slice[1..slice.len() - 1].to_string())),
        CmdToken::Eq => out.push(Tok::Word("=".to_string())),
        CmdToken::If => out.push(Tok::Keyword(Keyword::If)),
        CmdToken::Then => out.push(Tok::Keyword(Keyword::Then)),
        CmdToken::Elif => out.push(Tok::Keyword(Keyword::Elif)),
        CmdToken::Else => out.push(Tok::Keyword(Keyword::Else)),
        CmdToken::Fi => out.push(Tok::Keyword(Keyword::Fi)),
        CmdToken::While => out.push(Tok::Keyword(Keyword::While)),
        CmdToken::Do => out.push(Tok::Keyword(Keyword::Do)),
        CmdToken::Done => out.push(Tok::Keyword(Keyword::Done)),
        CmdToken::Function => out.push(Tok::Keyword(Keyword::Function)),
        CmdToken::Word => out.push(Tok::Word(unescape_word(slice))),
        CmdToken::StartQuote
        | CmdToken::DollarParen
        | CmdToken::DollarBrace
        | CmdToken::OpenParen
        | CmdToken::CloseParen => unreachable!("handled by the mode driver"),
    }
}

fn decode_redirect(slice: &str) -> RedirectOp {
    let (fd, op) = match slice.as_bytes()[0] {
        b @ b'0'..=b'9' => (Some((b - b'0') as u32), &slice[1..]),
        _ => (None, slice),
    };
    let kind = match op {
        "<" => RedirKind::In,
        ">" => RedirKind::Out,
        ">>" => RedirKind::OutAppend,
        "<>" => RedirKind::InOut,
        "<&" => RedirKind::DupIn,
        ">&" => RedirKind::DupOut,
        "&>" => RedirKind::Both,
        "&>>" => RedirKind::BothAppend,
        _ => unreachable!("redirect pattern admits no other shape"),
    };
    RedirectOp { fd, kind }
}

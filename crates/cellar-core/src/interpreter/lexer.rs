//! Tokenizer for the built-in snippet language.

use std::ops::Range;

use logos::{Lexer, Logos};

use super::ExecutionFault;

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum LexError {
    #[default]
    #[error("invalid token")]
    Invalid,
    #[error("integer literal too large")]
    IntegerTooLarge,
    #[error("malformed number")]
    MalformedNumber,
    #[error("invalid escape sequence '\\{0}'")]
    BadEscape(char),
}

fn read_int(lexer: &mut Lexer<Token>) -> Result<i64, LexError> {
    lexer
        .slice()
        .parse()
        .map_err(|_| LexError::IntegerTooLarge)
}

fn read_float(lexer: &mut Lexer<Token>) -> Result<f64, LexError> {
    lexer
        .slice()
        .parse()
        .map_err(|_| LexError::MalformedNumber)
}

fn read_string(lexer: &mut Lexer<Token>) -> Result<String, LexError> {
    let slice = lexer.slice();
    // Strip the opening and closing quote
    let body = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(chr) = chars.next() {
        if chr != '\\' {
            out.push(chr);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '"' | '\'')) => out.push(c),
            Some(c) => return Err(LexError::BadEscape(c)),
            None => return Err(LexError::Invalid),
        }
    }
    Ok(out)
}

/// Tokens of the snippet language.
#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\f\r]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    #[token("\n")]
    Newline,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    Power,
    #[token("/")]
    Slash,
    #[token("//")]
    FloorDiv,
    #[token("%")]
    Percent,

    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,

    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("True", |_| true)]
    #[token("False", |_| false)]
    Bool(bool),
    #[token("None")]
    NoneLit,

    #[regex("[0-9]+", read_int)]
    Int(i64),
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", read_float)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", read_float)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", read_float)]
    Float(f64),
    #[regex(r#""([^"\\\n]|\\.)*""#, read_string)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, read_string)]
    Str(String),
    /// A plain or dotted (`math.sqrt`) identifier.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*", |l| l.slice().to_string())]
    Name(String),
}

impl Token {
    /// Short human-readable form used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            Token::Newline => "end of line".to_string(),
            Token::Int(i) => format!("number {i}"),
            Token::Float(f) => format!("number {f}"),
            Token::Str(_) => "string literal".to_string(),
            Token::Name(name) => format!("name '{name}'"),
            Token::Bool(b) => format!("'{}'", if *b { "True" } else { "False" }),
            other => format!("{other:?}"),
        }
    }
}

/// A token and its byte range in the source.
pub type Spanned = (Token, Range<usize>);

/// Tokenize a complete source text.
///
/// Newlines inside brackets are dropped so expressions may span lines.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExecutionFault> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;

    for (result, span) in Token::lexer(source).spanned() {
        let token = result.map_err(|err| {
            ExecutionFault::syntax(format!(
                "{err} at line {}: {:?}",
                line_of(source, span.start),
                &source[span.clone()]
            ))
        })?;
        match token {
            Token::LParen | Token::LBracket => depth += 1,
            Token::RParen | Token::RBracket => depth = depth.saturating_sub(1),
            Token::Newline if depth > 0 => continue,
            _ => {}
        }
        tokens.push((token, span));
    }

    Ok(tokens)
}

/// 1-based line number of a byte offset.
pub fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())]
        .bytes()
        .filter(|b| *b == b'\n')
        .count()
        + 1
}

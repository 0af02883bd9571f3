//! Reader and writer for literal token sequences such as
//! `['zucchero', "farina di frumento"]`.
//!
//! The classifier replies and the ingredient snapshot files use this notation:
//! square-bracketed (or parenthesized) sequences of single- or double-quoted
//! strings, possibly nested. JSON arrays of strings are a subset of it.

use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected character '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("trailing input at offset {0}")]
    TrailingInput(usize),

    #[error("expected a sequence of strings")]
    NotStringSequence,

    #[error("expected a sequence of string sequences")]
    NotNestedSequence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Str(String),
    Seq(Vec<Literal>),
}

pub fn parse(input: &str) -> Result<Literal, LiteralError> {
    let mut parser = Parser {
        chars: input.char_indices().peekable(),
    };
    let value = parser.value()?;
    parser.skip_whitespace();
    match parser.chars.next() {
        None => Ok(value),
        Some((offset, _)) => Err(LiteralError::TrailingInput(offset)),
    }
}

/// Parses a flat sequence of strings.
pub fn parse_tokens(input: &str) -> Result<Vec<String>, LiteralError> {
    match parse(input.trim())? {
        Literal::Seq(items) => items
            .into_iter()
            .map(|item| match item {
                Literal::Str(s) => Ok(s),
                Literal::Seq(_) => Err(LiteralError::NotStringSequence),
            })
            .collect(),
        Literal::Str(_) => Err(LiteralError::NotStringSequence),
    }
}

/// Parses a sequence of string sequences.
pub fn parse_token_lists(input: &str) -> Result<Vec<Vec<String>>, LiteralError> {
    match parse(input.trim())? {
        Literal::Seq(items) => items
            .into_iter()
            .map(|item| match item {
                Literal::Seq(inner) => inner
                    .into_iter()
                    .map(|s| match s {
                        Literal::Str(s) => Ok(s),
                        Literal::Seq(_) => Err(LiteralError::NotNestedSequence),
                    })
                    .collect(),
                Literal::Str(_) => Err(LiteralError::NotNestedSequence),
            })
            .collect(),
        Literal::Str(_) => Err(LiteralError::NotNestedSequence),
    }
}

pub fn render_tokens(tokens: &[String]) -> String {
    let items: Vec<String> = tokens.iter().map(|t| quote(t)).collect();
    format!("[{}]", items.join(", "))
}

pub fn render_token_lists(lists: &[Vec<String>]) -> String {
    let items: Vec<String> = lists.iter().map(|l| render_tokens(l)).collect();
    format!("[{}]", items.join(", "))
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

struct Parser<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn value(&mut self) -> Result<Literal, LiteralError> {
        self.skip_whitespace();
        match self.chars.next() {
            Some((_, '[')) => self.sequence(']'),
            Some((_, '(')) => self.sequence(')'),
            Some((_, q @ ('\'' | '"'))) => self.string(q).map(Literal::Str),
            Some((offset, found)) => Err(LiteralError::Unexpected { found, offset }),
            None => Err(LiteralError::UnexpectedEnd),
        }
    }

    fn sequence(&mut self, close: char) -> Result<Literal, LiteralError> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.chars.next_if(|(_, c)| *c == close).is_some() {
                return Ok(Literal::Seq(items));
            }

            items.push(self.value()?);

            self.skip_whitespace();
            match self.chars.next() {
                Some((_, ',')) => continue,
                Some((_, c)) if c == close => return Ok(Literal::Seq(items)),
                Some((offset, found)) => return Err(LiteralError::Unexpected { found, offset }),
                None => return Err(LiteralError::UnexpectedEnd),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, LiteralError> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => return Ok(out),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, c @ ('\\' | '\'' | '"'))) => out.push(c),
                    Some((_, c)) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err(LiteralError::UnexpectedEnd),
                },
                Some((_, c)) => out.push(c),
                None => return Err(LiteralError::UnexpectedEnd),
            }
        }
    }
}

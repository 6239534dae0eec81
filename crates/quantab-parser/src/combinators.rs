//! Common parser combinators for the expression language

use once_cell::sync::Lazy;
use std::collections::HashSet;
use winnow::combinator::fail;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::stream::{Stateful, Stream};
use winnow::token::take_while;

/// Maximum nesting depth accepted while parsing (stack-safety guard)
pub const MAX_DEPTH: usize = 64;

/// Parser state carried through the input: the current nesting depth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserState {
    /// Current recursion depth of the guarded entry points
    pub depth: usize,
    /// Set when the depth guard tripped, so the caller can report the
    /// rejection as "too deep" rather than a generic syntax error
    pub depth_exceeded: bool,
}

/// Parser input: source text plus the depth counter
pub type Input<'a> = Stateful<&'a str, ParserState>;

/// Parser result type
pub type PResult<T> = ModalResult<T>;

/// Wrap source text into a fresh parser input
pub fn new_input(source: &str) -> Input<'_> {
    Stateful {
        input: source,
        state: ParserState::default(),
    }
}

/// Reserved words that can never be identifiers
static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "and", "or", "not", "if", "else", "for", "in", "True", "False", "None",
    ]
    .into_iter()
    .collect()
});

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Skip whitespace (the grammar has no comments)
pub fn ws(input: &mut Input<'_>) -> PResult<()> {
    take_while(0.., |c: char| c.is_whitespace())
        .void()
        .parse_next(input)
}

/// Match an exact token
pub fn lit<'a>(mut token: &'static str) -> impl Parser<Input<'a>, &'a str, ErrMode<ContextError>> {
    move |input: &mut Input<'a>| token.parse_next(input)
}

/// Match a keyword with a word boundary after it
pub fn keyword<'a>(kw: &'static str) -> impl Parser<Input<'a>, (), ErrMode<ContextError>> {
    move |input: &mut Input<'a>| {
        if input.input.starts_with(kw)
            && !input.input[kw.len()..]
                .chars()
                .next()
                .is_some_and(is_ident_char)
        {
            input.input = &input.input[kw.len()..];
            Ok(())
        } else {
            fail.parse_next(input)
        }
    }
}

/// Match a keyword surrounded by optional whitespace
pub fn padded_keyword<'a>(kw: &'static str) -> impl Parser<Input<'a>, (), ErrMode<ContextError>> {
    move |input: &mut Input<'a>| {
        let checkpoint = input.checkpoint();
        ws(input)?;
        match keyword(kw).parse_next(input) {
            Ok(()) => ws(input),
            Err(e) => {
                input.reset(&checkpoint);
                Err(e)
            }
        }
    }
}

/// Parse an identifier (not a reserved word)
pub fn identifier(input: &mut Input<'_>) -> PResult<String> {
    let checkpoint = input.checkpoint();
    let ident = (
        take_while(1, is_ident_start),
        take_while(0.., is_ident_char),
    )
        .take()
        .parse_next(input)?;
    if KEYWORDS.contains(ident) {
        input.reset(&checkpoint);
        return fail.parse_next(input);
    }
    Ok(ident.to_string())
}

/// Parse an integer literal
pub fn integer(input: &mut Input<'_>) -> PResult<i64> {
    take_while(1.., |c: char| c.is_ascii_digit())
        .try_map(str::parse::<i64>)
        .parse_next(input)
}

/// Parse a string literal (single or double quoted, with `\` escapes)
pub fn string_literal(input: &mut Input<'_>) -> PResult<String> {
    let quote = match input.input.chars().next() {
        Some(c @ ('\'' | '"')) => c,
        _ => return fail.parse_next(input),
    };

    let mut out = String::new();
    let mut chars = input.input[1..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => {
                // i is relative to the byte after the opening quote
                input.input = &input.input[1 + i + c.len_utf8()..];
                return Ok(out);
            }
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '\'')) => out.push('\''),
                Some((_, '"')) => out.push('"'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            c => out.push(c),
        }
    }

    // Unterminated string: do not backtrack into other alternatives
    Err(ErrMode::Cut(ContextError::new()))
}

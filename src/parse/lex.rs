//! Lexical primitives for URCL source.
//!
//! This module holds the character classes and span measurements the parser
//! uses to walk through a source line, as well as the numeric literal engine.
//!
//! Unlike a conventional tokenizer, URCL is scanned token-by-token by the parser itself
//! (since the kind of an operand depends on which parser accepts it),
//! so everything here works on a `&str` starting at the parser's cursor
//! and reports how many bytes of it a given construct spans.
//!
//! The numeric literal engine is the [`Literal`] lexer, which parses a
//! digit-prefixed operand token into an unsigned 64-bit value.

use logos::{Lexer, Logos};

/// Checks whether a character is whitespace in URCL source.
///
/// This covers ASCII control whitespace, space, and the Unicode space separators.
pub fn is_whitespace(c: char) -> bool {
    matches!(c,
        '\u{0009}'..='\u{000D}'
        | '\u{0020}'
        | '\u{0085}'
        | '\u{00A0}'
        | '\u{1680}'
        | '\u{2000}'..='\u{200A}'
        | '\u{2028}'
        | '\u{2029}'
        | '\u{202F}'
        | '\u{205F}'
        | '\u{3000}'
    )
}

/// Checks whether a character is a decimal digit (`0`-`9`).
pub fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

/// Byte index of the first char in `s` that fails `pred` (or `s.len()` if all pass).
fn span_while(s: &str, mut pred: impl FnMut(char) -> bool) -> usize {
    s.char_indices()
        .find(|&(_, c)| !pred(c))
        .map_or(s.len(), |(i, _)| i)
}

/// Measures the run of whitespace at the start of `s`.
///
/// If `include_newline` is false, a new line ends the run
/// (this is what keeps the parser from crossing line boundaries).
pub fn whitespace_len(s: &str, include_newline: bool) -> usize {
    span_while(s, |c| is_whitespace(c) && (include_newline || c != '\n'))
}

/// Measures the operand token at the start of `s`.
///
/// An operand token runs until whitespace or a comma.
pub fn operand_len(s: &str) -> usize {
    span_while(s, |c| !is_whitespace(c) && c != ',')
}

/// Measures the line at the start of `s`, excluding its new line.
///
/// New lines inside of a `/* ... */` comment do not end the line.
pub fn line_len(s: &str) -> usize {
    let mut len = 0;
    while let Some(c) = s[len..].chars().next() {
        match comment_len(&s[len..]) {
            0 if c == '\n' => break,
            0 => len += c.len_utf8(),
            n => len += n,
        }
    }
    len
}

/// Measures the comment at the start of `s`.
///
/// This recognizes line comments (`// ...`, which end before the new line)
/// and block comments (`/* ... */`, which end after the `*/`).
///
/// This returns 0 if `s` does not start with a comment
/// or if it starts with a block comment that is never closed.
pub fn comment_len(s: &str) -> usize {
    if s.starts_with("//") {
        s.find('\n').unwrap_or(s.len())
    } else if let Some(body) = s.strip_prefix("/*") {
        body.find("*/").map_or(0, |end| end + 4)
    } else {
        0
    }
}

/// A numeric literal.
///
/// This lexer is only ever run over a single operand token which starts with a digit,
/// so every pattern spans to the end of its input.
/// The invalid characters are collected into the match and rejected by the callback,
/// which records the offset of the offending character in the lexer's extras.
#[derive(Debug, Logos, PartialEq, Eq)]
#[logos(extras = usize, error = LexErr)]
pub enum Literal {
    // Note, `0x` is not matched by the hex regex since it has no digits
    // and therefore falls to the decimal regex (and fails at the `x`).
    // This is intended.

    /// An unsigned literal (e.g., `255`, `0xFF`, `0o377`, `0b11111111`).
    #[regex(r"[0-9].*", lex_dec)]
    #[regex(r"0[xX].+", |lx| lex_pow2(lx, 4))]
    #[regex(r"0[oO].+", |lx| lex_pow2(lx, 3))]
    #[regex(r"0[bB].+", |lx| lex_pow2(lx, 1))]
    #[regex(r"0[^0-9xXoObB].+", lex_unknown_base)]
    Unsigned(u64)
}

/// Any errors raised in attempting to lex a numeric literal.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum LexErr {
    /// A character in a hexadecimal value was not within `0-9`, `A-F`, `a-f`.
    UnexpectedHexChar,
    /// A character in an octal value was not within `0-7`.
    UnexpectedOctChar,
    /// A character in a binary value was not `0` or `1`.
    UnexpectedBinChar,
    /// A character in a decimal value was not within `0-9`.
    UnexpectedDecChar,
    /// A literal started with `0` and a letter which does not select a base.
    UnknownBasePrefix,
    /// The token did not start with a digit.
    #[default]
    NotNumeric
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::UnexpectedHexChar => f.write_str("unexpected character in hexadecimal value"),
            LexErr::UnexpectedOctChar => f.write_str("unexpected character in octal value"),
            LexErr::UnexpectedBinChar => f.write_str("unexpected character in binary value"),
            LexErr::UnexpectedDecChar => f.write_str("unexpected character in decimal value"),
            LexErr::UnknownBasePrefix => f.write_str("unknown immediate type prefix"),
            LexErr::NotNumeric        => f.write_str("expected numeric literal"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::UnexpectedHexChar => Some("a hex literal starts with 0x and consists of 0-9, A-F".into()),
            LexErr::UnexpectedOctChar => Some("an octal literal starts with 0o and consists of 0-7".into()),
            LexErr::UnexpectedBinChar => Some("a binary literal starts with 0b and consists of 0 and 1".into()),
            LexErr::UnexpectedDecChar => Some("a decimal literal only consists of digits 0-9".into()),
            LexErr::UnknownBasePrefix => Some("the valid base prefixes are 0x (hex), 0o (octal), and 0b (binary)".into()),
            LexErr::NotNumeric        => None,
        }
    }
}

/// Folds a power-of-two radix literal (after its 2 character prefix),
/// shifting each digit in by `shift` bits.
///
/// Overflowing bits are discarded.
fn lex_pow2(lx: &mut Lexer<'_, Literal>, shift: u32) -> Result<u64, LexErr> {
    let (radix, err) = match shift {
        4 => (16, LexErr::UnexpectedHexChar),
        3 => (8, LexErr::UnexpectedOctChar),
        _ => (2, LexErr::UnexpectedBinChar),
    };

    let mut value = 0u64;
    for (i, c) in lx.slice().char_indices().skip(2) {
        match c.to_digit(radix) {
            Some(d) => value = (value << shift) | u64::from(d),
            None => {
                lx.extras = i;
                return Err(err);
            }
        }
    }
    Ok(value)
}
/// Folds a decimal literal.
///
/// Overflow wraps around.
fn lex_dec(lx: &mut Lexer<'_, Literal>) -> Result<u64, LexErr> {
    let mut value = 0u64;
    for (i, c) in lx.slice().char_indices() {
        match c.to_digit(10) {
            Some(d) => value = value.wrapping_mul(10).wrapping_add(u64::from(d)),
            None => {
                lx.extras = i;
                return Err(LexErr::UnexpectedDecChar);
            }
        }
    }
    Ok(value)
}
fn lex_unknown_base(lx: &mut Lexer<'_, Literal>) -> Result<u64, LexErr> {
    // the selector character:
    lx.extras = 1;
    Err(LexErr::UnknownBasePrefix)
}

/// Lexes a full operand token as an unsigned literal.
///
/// On failure, this returns the error along with
/// the byte offset of the offending character in `token`.
pub fn lex_unsigned(token: &str) -> Result<u64, (LexErr, usize)> {
    let mut lx = Literal::lexer(token);
    match lx.next() {
        Some(Ok(Literal::Unsigned(n))) if lx.span().end == token.len() => Ok(n),
        Some(Ok(_)) => Err((LexErr::NotNumeric, lx.span().end)),
        Some(Err(e)) => Err((e, lx.extras)),
        None => Err((LexErr::NotNumeric, 0)),
    }
}

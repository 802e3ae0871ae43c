//! Operand parsing.
//!
//! Every operand kind has a parser which either accepts a token,
//! reports that the token does not have the kind's prefix ([`TryErr::Mismatch`]),
//! or commits to the kind and reports the token as malformed ([`TryErr::Fatal`]).
//!
//! [`parse_operand`] tries each of these parsers in order
//! and only continues to the next parser on a mismatch.

use std::ops::Range;

use tracing::trace;

use crate::ast::{Operand, OperandKind, SpecialReg};

use super::lex::{is_digit, lex_unsigned};
use super::{Context, Cursor, ParseErr, ParseErrKind};

/// The error of a single operand kind's parser.
#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) enum TryErr {
    /// The token is not of this kind and another kind should be tried.
    ///
    /// This holds the error to report if no other kind matches.
    Mismatch(ParseErr),
    /// The token is of this kind, but is malformed.
    Fatal(ParseErr)
}
impl From<ParseErr> for TryErr {
    fn from(value: ParseErr) -> Self {
        TryErr::Fatal(value)
    }
}
pub(crate) type TryResult<T> = Result<T, TryErr>;

/// An operand token, alongside its position in source.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) struct Token<'s> {
    pub(crate) text: &'s str,
    pub(crate) start: usize
}
impl<'s> Token<'s> {
    pub(crate) fn new(text: &'s str, start: usize) -> Self {
        Self { text, start }
    }

    pub(crate) fn len(&self) -> usize {
        self.text.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub(crate) fn span(&self) -> Range<usize> {
        self.start .. self.start + self.len()
    }

    /// The part of this token after the first `n` bytes.
    fn tail(&self, n: usize) -> Token<'s> {
        Token::new(&self.text[n..], self.start + n)
    }

    /// The span of the character at byte offset `offset` in the token.
    ///
    /// If the offset is at the end of the token, this is an empty span.
    fn char_span(&self, offset: usize) -> Range<usize> {
        let len = self.text[offset..].chars().next().map_or(0, char::len_utf8);
        let start = self.start + offset;
        start .. start + len
    }
}

fn mismatch<T>(kind: ParseErrKind, span: Range<usize>) -> TryResult<T> {
    Err(TryErr::Mismatch(ParseErr::new(kind, span)))
}
fn fatal<T>(kind: ParseErrKind, span: Range<usize>) -> TryResult<T> {
    Err(TryErr::Fatal(ParseErr::new(kind, span)))
}

/// Checks the token starts with one of the given prefix characters.
fn expect_prefix(tok: Token<'_>, prefix: impl FnMut(char) -> bool) -> TryResult<()> {
    match tok.text.starts_with(prefix) {
        true  => Ok(()),
        false => mismatch(ParseErrKind::MissingOperandPrefix, tok.char_span(0)),
    }
}

/// Parses a label reference (`.name`). The name keeps its `.` prefix.
pub(crate) fn label(tok: Token<'_>) -> TryResult<String> {
    expect_prefix(tok, |c| c == '.')?;
    Ok(tok.text.to_string())
}

/// Parses a port (`%name`). The name keeps its `%` prefix.
pub(crate) fn port(tok: Token<'_>) -> TryResult<String> {
    expect_prefix(tok, |c| c == '%')?;
    Ok(tok.text.to_string())
}

/// Parses an unsigned numeric literal.
pub(crate) fn immediate(tok: Token<'_>) -> TryResult<u64> {
    expect_prefix(tok, is_digit)?;
    lex_unsigned(tok.text)
        .map_err(|(e, offset)| TryErr::Fatal(ParseErr::wrap(e, tok.char_span(offset))))
}

/// Parses a relative offset (`~5`, `~+5`, `~-5`).
pub(crate) fn relative(tok: Token<'_>) -> TryResult<i64> {
    expect_prefix(tok, |c| c == '~')?;

    let body = tok.tail(1);
    let mut chars = body.text.chars();
    let (negative, digits) = match (chars.next(), chars.next()) {
        (None, _) => return fatal(ParseErrKind::InvalidRelativeValue, body.span()),
        // a single character after `~` must be a digit
        (Some(c), None) if !is_digit(c) => return fatal(ParseErrKind::InvalidRelativeValue, body.char_span(0)),
        (Some('-'), _) => (true, body.tail(1)),
        (Some('+'), _) => (false, body.tail(1)),
        (Some(c), _) if is_digit(c) => (false, body),
        (Some(_), _) => return fatal(ParseErrKind::UnexpectedRelativeChar, body.char_span(0)),
    };

    let magnitude = immediate(digits)?;
    let Ok(magnitude) = i64::try_from(magnitude) else {
        return fatal(ParseErrKind::RelativeValueTooLarge, digits.span());
    };
    Ok(if negative { -magnitude } else { magnitude })
}

/// Parses a memory address (`M12`, `m12`, `#12`).
pub(crate) fn memory(tok: Token<'_>) -> TryResult<u64> {
    expect_prefix(tok, |c| matches!(c, 'M' | 'm' | '#'))?;

    let addr = tok.tail(1);
    if addr.is_empty() {
        return fatal(ParseErrKind::InvalidMemoryAddress, addr.span());
    }
    immediate(addr)
}

/// Parses a register (`R1`, `r1`, `$1`, `SP`, `PC`).
pub(crate) fn register(tok: Token<'_>) -> TryResult<OperandKind> {
    if tok.text.starts_with(['R', 'r', '$']) {
        let index = tok.tail(1);
        if index.is_empty() {
            return fatal(ParseErrKind::InvalidRegisterIndex, index.span());
        }
        return immediate(index).map(OperandKind::IndexedRegister);
    }

    match SpecialReg::from_name(tok.text) {
        Some(reg) => Ok(OperandKind::SpecialRegister(reg)),
        None => mismatch(ParseErrKind::UnknownRegister, tok.span()),
    }
}

/// Parses the name of a macro (`@NAME`). The name does not include the `@` sigil.
pub(crate) fn macro_name<'s>(tok: Token<'s>) -> TryResult<&'s str> {
    expect_prefix(tok, |c| c == '@')?;
    Ok(&tok.text[1..])
}

/// Expands a macro operand and parses the first operand of its expansion.
fn macro_operand(cx: &Context<'_>, tok: Token<'_>) -> TryResult<OperandKind> {
    let name = macro_name(tok)?;
    let text = cx.expand(name, tok.span())?;

    let mut cur = Cursor::new(&text);
    cur.skip_trivia();
    parse_operand(&cx.nested(), &mut cur)
        .map(|op| op.kind)
        .map_err(|e| TryErr::Fatal(e.respan(tok.span())))
}

/// Parses an operand of any kind at the cursor,
/// consuming the operand and any whitespace around it.
///
/// The operand kinds are tried in the following order:
/// label, port, immediate, relative, memory address, macro, register.
/// If all of these mismatch, the token is accepted verbatim as [`OperandKind::Any`].
pub(crate) fn parse_operand(cx: &Context<'_>, cur: &mut Cursor<'_>) -> Result<Operand, ParseErr> {
    cur.skip_whitespace();
    if cur.at_line_end() {
        return Err(ParseErr::new(ParseErrKind::ExpectedOperand, cur.index()..cur.index()));
    }

    let tok = cur.token();
    let stages: [&dyn Fn(Token<'_>) -> TryResult<OperandKind>; 7] = [
        &|t: Token<'_>| label(t).map(OperandKind::Label),
        &|t: Token<'_>| port(t).map(OperandKind::Port),
        &|t: Token<'_>| immediate(t).map(OperandKind::Immediate),
        &|t: Token<'_>| relative(t).map(OperandKind::Relative),
        &|t: Token<'_>| memory(t).map(OperandKind::MemoryAddress),
        &|t: Token<'_>| macro_operand(cx, t),
        &register,
    ];

    for stage in stages {
        match stage(tok) {
            Ok(kind) => {
                cur.advance(tok.len());
                cur.skip_whitespace();
                return Ok(Operand::new(kind, tok.span()));
            },
            Err(TryErr::Mismatch(e)) => trace!(token = tok.text, reason = %e, "operand kind mismatch"),
            Err(TryErr::Fatal(e)) => return Err(e),
        }
    }

    if tok.is_empty() {
        return Err(ParseErr::new(ParseErrKind::ExpectedOperand, tok.span()));
    }
    cur.advance(tok.len());
    cur.skip_whitespace();
    Ok(Operand::new(OperandKind::Any(tok.text.to_string()), tok.span()))
}

#[cfg(test)]
mod tests {
    use crate::ast::{OperandKind, SpecialReg};
    use crate::parse::lex::LexErr;
    use crate::parse::{ParseErrKind, Parser};

    use super::{immediate, relative, Token, TryErr};

    fn kind_of(src: &str) -> OperandKind {
        match Parser::new().parse_operand(src) {
            Ok(op) => op.kind,
            Err(e) => panic!("failed to parse operand {src:?}: {e:?}"),
        }
    }
    fn assert_operand_fail(src: &str, kind: ParseErrKind, span: std::ops::Range<usize>) {
        match Parser::new().parse_operand(src) {
            Ok(op) => panic!("operand {src:?} unexpectedly parsed: {op:?}"),
            Err(e) => {
                assert_eq!(e.kind(), &kind, "operand {src:?}");
                assert_eq!(e.span(), span, "operand {src:?}");
            }
        }
    }

    #[test]
    fn test_prefix_classes() {
        assert_eq!(kind_of(".loop"), OperandKind::Label(".loop".to_string()));
        assert_eq!(kind_of("."), OperandKind::Label(".".to_string()));
        assert_eq!(kind_of("%TEXT"), OperandKind::Port("%TEXT".to_string()));
        assert_eq!(kind_of("0xFF"), OperandKind::Immediate(255));
        assert_eq!(kind_of("0o377"), OperandKind::Immediate(255));
        assert_eq!(kind_of("0b11111111"), OperandKind::Immediate(255));
        assert_eq!(kind_of("255"), OperandKind::Immediate(255));
        assert_eq!(kind_of("~5"), OperandKind::Relative(5));
        assert_eq!(kind_of("~+5"), OperandKind::Relative(5));
        assert_eq!(kind_of("~-5"), OperandKind::Relative(-5));
        assert_eq!(kind_of("M12"), OperandKind::MemoryAddress(12));
        assert_eq!(kind_of("m12"), OperandKind::MemoryAddress(12));
        assert_eq!(kind_of("#0x10"), OperandKind::MemoryAddress(16));
        assert_eq!(kind_of("R3"), OperandKind::IndexedRegister(3));
        assert_eq!(kind_of("r3"), OperandKind::IndexedRegister(3));
        assert_eq!(kind_of("$3"), OperandKind::IndexedRegister(3));
        assert_eq!(kind_of("SP"), OperandKind::SpecialRegister(SpecialReg::SP));
        assert_eq!(kind_of("sp"), OperandKind::SpecialRegister(SpecialReg::SP));
        assert_eq!(kind_of("Pc"), OperandKind::SpecialRegister(SpecialReg::PC));
    }

    #[test]
    fn test_any_fallback() {
        assert_eq!(kind_of("ROM"), OperandKind::Any("ROM".to_string()));
        assert_eq!(kind_of("'A'"), OperandKind::Any("'A'".to_string()));
        assert_eq!(kind_of("=="), OperandKind::Any("==".to_string()));

        // prefixed, but the tail is not numeric:
        assert_eq!(kind_of("RAM"), OperandKind::Any("RAM".to_string()));
        assert_eq!(kind_of("MAX"), OperandKind::Any("MAX".to_string()));
        assert_eq!(kind_of("~+-1"), OperandKind::Any("~+-1".to_string()));
    }

    #[test]
    fn test_padding() {
        let parser = Parser::new();

        let op = parser.parse_operand("  R1  ").unwrap();
        assert_eq!(op.kind, OperandKind::IndexedRegister(1));
        assert_eq!(op.span, 2..4);

        let op = parser.parse_operand("\u{3000}0x10").unwrap();
        assert_eq!(op.kind, OperandKind::Immediate(16));
        assert_eq!(op.span, 3..7);
    }

    #[test]
    fn test_committed_failures() {
        assert_operand_fail("0xZZ", ParseErrKind::Lex(LexErr::UnexpectedHexChar), 2..3);
        assert_operand_fail("0o9", ParseErrKind::Lex(LexErr::UnexpectedOctChar), 2..3);
        assert_operand_fail("0b2", ParseErrKind::Lex(LexErr::UnexpectedBinChar), 2..3);
        assert_operand_fail("12z", ParseErrKind::Lex(LexErr::UnexpectedDecChar), 2..3);
        assert_operand_fail("0q12", ParseErrKind::Lex(LexErr::UnknownBasePrefix), 1..2);
        assert_operand_fail("0x", ParseErrKind::Lex(LexErr::UnexpectedDecChar), 1..2);

        assert_operand_fail("R", ParseErrKind::InvalidRegisterIndex, 1..1);
        assert_operand_fail("$", ParseErrKind::InvalidRegisterIndex, 1..1);
        assert_operand_fail("R1x", ParseErrKind::Lex(LexErr::UnexpectedDecChar), 2..3);
        assert_operand_fail("M", ParseErrKind::InvalidMemoryAddress, 1..1);
        assert_operand_fail("#", ParseErrKind::InvalidMemoryAddress, 1..1);

        assert_operand_fail("~", ParseErrKind::InvalidRelativeValue, 1..1);
        assert_operand_fail("~-", ParseErrKind::InvalidRelativeValue, 1..2);
        assert_operand_fail("~+", ParseErrKind::InvalidRelativeValue, 1..2);
        assert_operand_fail("~x", ParseErrKind::InvalidRelativeValue, 1..2);
        assert_operand_fail("~é", ParseErrKind::InvalidRelativeValue, 1..3);
        assert_operand_fail("~x1", ParseErrKind::UnexpectedRelativeChar, 1..2);
        assert_operand_fail("~xy", ParseErrKind::UnexpectedRelativeChar, 1..2);
        assert_operand_fail("~9223372036854775808", ParseErrKind::RelativeValueTooLarge, 1..20);

        assert_operand_fail("@NOPE", ParseErrKind::UnknownMacro, 0..5);
        assert_operand_fail("", ParseErrKind::ExpectedOperand, 0..0);
        assert_operand_fail("   ", ParseErrKind::ExpectedOperand, 3..3);
        assert_operand_fail(", R1", ParseErrKind::ExpectedOperand, 0..0);
    }

    #[test]
    fn test_relative_bounds() {
        let tok = |s| Token::new(s, 0);
        assert_eq!(relative(tok("~9223372036854775807")), Ok(i64::MAX));
        assert_eq!(relative(tok("~-9223372036854775807")), Ok(-i64::MAX));
        assert!(matches!(relative(tok("5")), Err(TryErr::Mismatch(_))));
        assert!(matches!(immediate(tok("x5")), Err(TryErr::Mismatch(_))));
    }

    #[test]
    fn test_macros() {
        let mut parser = Parser::new();
        parser.set_target_bits(8).unwrap();
        assert_eq!(parser.parse_operand("@MAX").unwrap().kind, OperandKind::Immediate(0xFF));
        assert_eq!(parser.parse_operand("@msb").unwrap().kind, OperandKind::Immediate(0x80));
        assert_eq!(parser.parse_operand("@BITS").unwrap().kind, OperandKind::Immediate(8));

        // operand keeps the span of the macro
        let op = parser.parse_operand(" @SMAX").unwrap();
        assert_eq!(op.kind, OperandKind::Immediate(0x7F));
        assert_eq!(op.span, 1..6);

        parser.clear_macro_handler();
        assert_operand_fail_with(&parser, "@MAX", ParseErrKind::UnknownMacro, 0..4);

        // errors in the expansion are attributed to the macro
        parser.set_macro_handler(|name: &str, _: u32| (name == "BAD").then(|| "0xZZ".to_string()));
        assert_operand_fail_with(&parser, "  @BAD", ParseErrKind::Lex(LexErr::UnexpectedHexChar), 2..6);

        // nested macros expand, but runaway nesting is stopped
        parser.set_macro_handler(|name: &str, _: u32| match name {
            "A" => Some("@B".to_string()),
            "B" => Some("R7".to_string()),
            "LOOP" => Some("@LOOP".to_string()),
            _ => None
        });
        assert_eq!(parser.parse_operand("@A").unwrap().kind, OperandKind::IndexedRegister(7));
        assert_operand_fail_with(&parser, "@LOOP", ParseErrKind::MacroRecursion, 0..5);
    }

    fn assert_operand_fail_with(parser: &Parser, src: &str, kind: ParseErrKind, span: std::ops::Range<usize>) {
        match parser.parse_operand(src) {
            Ok(op) => panic!("operand {src:?} unexpectedly parsed: {op:?}"),
            Err(e) => {
                assert_eq!(e.kind(), &kind, "operand {src:?}");
                assert_eq!(e.span(), span, "operand {src:?}");
            }
        }
    }
}

//! Parsing URCL source into records.
//!
//! The entry point of this module is the [`Parser`],
//! which holds the configuration of parsing (target word width, macro handler, allocation limit)
//! and converts source text into an [`Ast`].
//!
//! A source is parsed line by line. Each line is one of:
//! - a label (`.name`),
//! - an instruction (an operation followed by up to three operands, optionally separated by commas),
//! - a macro instruction (`@NAME`, which expands to an instruction),
//! - or blank (whitespace and comments only).
//!
//! Comments (`// line` and `/* block */`) may appear between any two tokens.
//!
//! Parsing is all-or-nothing:
//! either the whole source parses, or a single [`ParseErr`] pointing into the source is returned.

pub mod lex;
pub mod macros;
mod operand;

use std::borrow::Cow;
use std::ops::Range;

use tracing::{debug, trace};

use crate::ast::{Ast, Instruction, Label, Operand, MAX_OPERANDS};

use self::lex::{comment_len, line_len, operand_len, whitespace_len, LexErr};
use self::macros::{MacroHandler, Macros, MAX_MACRO_DEPTH};
use self::operand::{Token, TryErr, TryResult};

/// Parses a URCL source string into an [`Ast`] with the default configuration.
///
/// This is a shortcut for [`Parser::new`] followed by [`Parser::parse`].
///
/// # Example
/// ```
/// use urcl_parser::ast::OperandKind;
/// use urcl_parser::parse::parse_ast;
///
/// let ast = parse_ast("
///     BITS 16
/// .start
///     IMM R1, 0xFF // load
///     BRZ .start R1
/// ").unwrap();
///
/// assert_eq!(ast.headers.len(), 1);
/// assert_eq!(ast.labels[0].name, ".start");
/// assert_eq!(ast.labels[0].address, 0);
/// assert_eq!(ast.instructions[0].operand(1).unwrap().kind, OperandKind::Immediate(255));
/// assert_eq!(ast.instructions[1].to_string(), "BRZ .start R1");
/// ```
pub fn parse_ast(src: &str) -> Result<Ast, ParseErr> {
    Parser::new().parse(src)
}

/// The kinds of errors which can occur while parsing.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ParseErrKind {
    /// The output records could not be allocated.
    OutOfMemory,
    /// An operand did not have the prefix of the kind it was parsed as.
    ///
    /// This is only reported when an operand could not be parsed as any kind.
    MissingOperandPrefix,
    /// A numeric literal was malformed.
    Lex(LexErr),
    /// A relative value had a character other than `+`, `-`, or a digit after its `~`.
    UnexpectedRelativeChar,
    /// A relative value had no value after its `~` (or its sign).
    InvalidRelativeValue,
    /// A relative value did not fit in a signed 64-bit integer.
    RelativeValueTooLarge,
    /// A memory address had no value after its prefix.
    InvalidMemoryAddress,
    /// A register had no index after its prefix.
    InvalidRegisterIndex,
    /// A register name was not recognized.
    UnknownRegister,
    /// The macro handler did not recognize a macro.
    UnknownMacro,
    /// Macros expanded into further macros too many times.
    MacroRecursion,
    /// An operand was expected but not found.
    ExpectedOperand,
    /// An operation was expected but not found.
    ExpectedOperation,
    /// Additional text was found after a complete label or instruction.
    ExpectedLineEnd
}
impl From<LexErr> for ParseErrKind {
    fn from(value: LexErr) -> Self {
        Self::Lex(value)
    }
}
impl std::fmt::Display for ParseErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErrKind::OutOfMemory            => f.write_str("out of memory"),
            ParseErrKind::MissingOperandPrefix   => f.write_str("missing operand prefix"),
            ParseErrKind::Lex(e)                 => e.fmt(f),
            ParseErrKind::UnexpectedRelativeChar => f.write_str("unexpected character in relative value"),
            ParseErrKind::InvalidRelativeValue   => f.write_str("invalid relative value"),
            ParseErrKind::RelativeValueTooLarge  => f.write_str("relative value is too large"),
            ParseErrKind::InvalidMemoryAddress   => f.write_str("invalid memory address"),
            ParseErrKind::InvalidRegisterIndex   => f.write_str("invalid register index"),
            ParseErrKind::UnknownRegister        => f.write_str("unknown register"),
            ParseErrKind::UnknownMacro           => f.write_str("unknown macro"),
            ParseErrKind::MacroRecursion         => f.write_str("macro expansion is nested too deeply"),
            ParseErrKind::ExpectedOperand        => f.write_str("expected operand"),
            ParseErrKind::ExpectedOperation      => f.write_str("expected operation"),
            ParseErrKind::ExpectedLineEnd        => f.write_str("expected end of line"),
        }
    }
}

/// Any error that occurs while parsing a source.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ParseErr {
    /// The brief cause of this error.
    kind: ParseErrKind,
    /// The location of this error.
    span: Range<usize>
}
impl ParseErr {
    pub(crate) fn new(kind: ParseErrKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    pub(crate) fn wrap<E: Into<ParseErrKind>>(err: E, span: Range<usize>) -> Self {
        Self::new(err.into(), span)
    }

    /// Moves this error to another span.
    pub(crate) fn respan(self, span: Range<usize>) -> Self {
        Self { span, ..self }
    }

    /// The kind of this error.
    pub fn kind(&self) -> &ParseErrKind {
        &self.kind
    }

    /// The byte range in source where this error occurred.
    ///
    /// This range may be empty (e.g., when something was expected at the end of a line).
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for ParseErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ParseErrKind::Lex(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for ParseErr {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        Some(crate::err::ErrSpan::from(self.span.clone()))
    }

    fn help(&self) -> Option<Cow<str>> {
        match &self.kind {
            ParseErrKind::OutOfMemory            => None,
            ParseErrKind::MissingOperandPrefix   => None,
            ParseErrKind::Lex(e)                 => crate::err::Error::help(e),
            ParseErrKind::UnexpectedRelativeChar => Some("a relative value is written as ~N, ~+N, or ~-N".into()),
            ParseErrKind::InvalidRelativeValue   => Some("a relative value is written as ~N, ~+N, or ~-N".into()),
            ParseErrKind::RelativeValueTooLarge  => Some(format!("the magnitude of a relative value cannot exceed {}", i64::MAX).into()),
            ParseErrKind::InvalidMemoryAddress   => Some("a memory address is written as M followed by a number (e.g., M12)".into()),
            ParseErrKind::InvalidRegisterIndex   => Some("a register is written as R followed by a number (e.g., R1)".into()),
            ParseErrKind::UnknownRegister        => Some("the named registers are SP and PC".into()),
            ParseErrKind::UnknownMacro           => None,
            ParseErrKind::MacroRecursion         => Some(format!("macros can only be nested {MAX_MACRO_DEPTH} times").into()),
            ParseErrKind::ExpectedOperand        => Some("a comma must be followed by another operand".into()),
            ParseErrKind::ExpectedOperation      => None,
            ParseErrKind::ExpectedLineEnd        => Some(format!("an instruction can have at most {MAX_OPERANDS} operands and a label must be on its own line").into()),
        }
    }
}

/// Error from attempting to configure an unsupported target word width.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct BitsErr(pub u32);
impl std::fmt::Display for BitsErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot target a word width of {} bits", self.0)
    }
}
impl std::error::Error for BitsErr {}
impl crate::err::Error for BitsErr {
    fn help(&self) -> Option<Cow<str>> {
        Some(format!("the word width must be between 1 and {MAX_TARGET_BITS} bits").into())
    }
}

/// The widest word width a parser can target.
///
/// A width is accepted as long as its whole bytes fit into a 64-bit integer.
pub const MAX_TARGET_BITS: u32 = (u64::BITS / 8 + 1) * 8 - 1;

/// The default word width of a parser.
pub const DEFAULT_TARGET_BITS: u32 = 64;

/// A cursor over a source string.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'s> {
    src: &'s str,
    index: usize
}
impl<'s> Cursor<'s> {
    pub(crate) fn new(src: &'s str) -> Self {
        Self { src, index: 0 }
    }

    /// The remaining source.
    fn rest(&self) -> &'s str {
        &self.src[self.index..]
    }

    /// The byte index of the cursor in the source.
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    fn is_empty(&self) -> bool {
        self.index >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.index = (self.index + n).min(self.src.len());
    }

    /// Whether the cursor is at the end of a line (or the end of the source).
    pub(crate) fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some('\n'))
    }

    /// Skips whitespace on the current line.
    pub(crate) fn skip_whitespace(&mut self) {
        self.advance(whitespace_len(self.rest(), false));
    }

    /// Skips any whitespace and comments.
    ///
    /// Block comments can span lines, so this may move the cursor to a later line.
    pub(crate) fn skip_trivia(&mut self) {
        loop {
            self.skip_whitespace();
            match comment_len(self.rest()) {
                0 => break,
                n => self.advance(n),
            }
        }
    }

    /// Skips the remainder of the current line, excluding its new line.
    fn skip_line(&mut self) {
        self.advance(line_len(self.rest()));
    }

    /// The operand token at the cursor (which may be empty).
    pub(crate) fn token(&self) -> Token<'s> {
        let rest = self.rest();
        Token::new(&rest[..operand_len(rest)], self.index)
    }

    /// Fails if the cursor is not at the end of a line.
    fn expect_line_end(&self) -> Result<(), ParseErr> {
        match self.at_line_end() {
            true  => Ok(()),
            false => {
                let rest = self.rest();
                let len = rest.find('\n').unwrap_or(rest.len());
                Err(ParseErr::new(ParseErrKind::ExpectedLineEnd, self.index .. self.index + len))
            }
        }
    }
}

/// The state shared through one parse.
pub(crate) struct Context<'p> {
    parser: &'p Parser,
    /// How many macro expansions deep the parse currently is.
    depth: usize
}
impl<'p> Context<'p> {
    fn new(parser: &'p Parser) -> Self {
        Self { parser, depth: 0 }
    }

    /// The context for parsing a macro's expansion.
    pub(crate) fn nested(&self) -> Self {
        Self { parser: self.parser, depth: self.depth + 1 }
    }

    /// Expands a macro (whose token is located at `span`).
    pub(crate) fn expand(&self, name: &str, span: Range<usize>) -> Result<String, ParseErr> {
        if self.depth >= MAX_MACRO_DEPTH {
            return Err(ParseErr::new(ParseErrKind::MacroRecursion, span));
        }

        match self.parser.macros.expand(name, self.parser.target_bits) {
            Some(text) => {
                trace!(name, expansion = %text, "expanded macro");
                Ok(text)
            },
            None => Err(ParseErr::new(ParseErrKind::UnknownMacro, span))
        }
    }
}

/// Parses a label line.
///
/// This mismatches if the line does not start with a label.
fn label_line(cur: &mut Cursor<'_>, address: u64) -> TryResult<Label> {
    let mut c = *cur;
    c.skip_trivia();

    let tok = c.token();
    let name = operand::label(tok)?;
    c.advance(tok.len());
    c.skip_trivia();
    c.expect_line_end()?;

    *cur = c;
    Ok(Label::new(name, address, tok.span()))
}

/// Parses a macro instruction line.
///
/// This mismatches if the line does not start with a macro.
fn macro_instruction(cx: &Context<'_>, cur: &mut Cursor<'_>) -> TryResult<Instruction> {
    let mut c = *cur;
    c.skip_trivia();

    let tok = c.token();
    let name = operand::macro_name(tok)?;
    let text = cx.expand(name, tok.span())?;

    let mut inner = Cursor::new(&text);
    let mut instr = any_instruction(&cx.nested(), &mut inner)
        .map_err(|e| e.respan(tok.span()))?;
    instr.respan(tok.span());

    c.advance(tok.len());
    c.skip_trivia();
    c.expect_line_end()?;

    *cur = c;
    Ok(instr)
}

/// Parses an instruction line.
fn instruction(cx: &Context<'_>, cur: &mut Cursor<'_>) -> Result<Instruction, ParseErr> {
    let mut c = *cur;
    c.skip_trivia();

    let op = c.token();
    if op.is_empty() {
        return Err(ParseErr::new(ParseErrKind::ExpectedOperation, c.index()..c.index()));
    }
    c.advance(op.len());

    let mut instr = Instruction::new(op.text, op.span());
    loop {
        c.skip_trivia();
        if c.at_line_end() { break; }
        // no slot left for this operand
        if instr.operand_count() >= MAX_OPERANDS {
            c.expect_line_end()?;
        }

        let operand = operand::parse_operand(cx, &mut c)?;
        instr.span.end = operand.span.end;
        instr.push_operand(operand)
            .map_err(|op: Operand| ParseErr::new(ParseErrKind::ExpectedLineEnd, op.span))?;

        c.skip_trivia();
        if c.peek() == Some(',') {
            c.advance(1);
            c.skip_trivia();
            if c.at_line_end() {
                return Err(ParseErr::new(ParseErrKind::ExpectedOperand, c.index()..c.index()));
            }
        }
    }

    *cur = c;
    Ok(instr)
}

/// Parses an instruction line, which may be a macro instruction.
fn any_instruction(cx: &Context<'_>, cur: &mut Cursor<'_>) -> Result<Instruction, ParseErr> {
    match macro_instruction(cx, cur) {
        Ok(instr) => Ok(instr),
        Err(TryErr::Fatal(e)) => Err(e),
        Err(TryErr::Mismatch(_)) => instruction(cx, cur),
    }
}

/// Reserves space for one more element in a record buffer, doubling its capacity if it is full.
///
/// `others` is the capacity held by the other buffers, which counts toward `limit`.
fn reserve_one<T>(buf: &mut Vec<T>, others: usize, limit: Option<usize>) -> bool {
    if buf.len() < buf.capacity() {
        return true;
    }

    let additional = buf.capacity().max(1);
    if limit.is_some_and(|limit| others + buf.capacity() + additional > limit) {
        return false;
    }
    if buf.try_reserve_exact(additional).is_err() {
        return false;
    }
    trace!(capacity = buf.capacity(), "grew record buffer");
    true
}

/// The records collected by a parse.
struct Records {
    ast: Ast,
    limit: Option<usize>
}
impl Records {
    fn new(limit: Option<usize>) -> Result<Self, ParseErr> {
        let mut records = Self { ast: Ast::default(), limit };

        let Ast { instructions, labels, headers } = &mut records.ast;
        let ok = reserve_one(instructions, 0, limit)
            && reserve_one(labels, instructions.capacity(), limit)
            && reserve_one(headers, instructions.capacity() + labels.capacity(), limit);

        match ok {
            true  => Ok(records),
            false => Err(ParseErr::new(ParseErrKind::OutOfMemory, 0..0)),
        }
    }

    fn push_instruction(&mut self, instr: Instruction) -> Result<(), ParseErr> {
        let Ast { instructions, labels, headers } = &mut self.ast;
        if !reserve_one(instructions, labels.capacity() + headers.capacity(), self.limit) {
            return Err(ParseErr::new(ParseErrKind::OutOfMemory, instr.span));
        }
        instructions.push(instr);
        Ok(())
    }

    fn push_header(&mut self, header: Instruction) -> Result<(), ParseErr> {
        let Ast { instructions, labels, headers } = &mut self.ast;
        if !reserve_one(headers, instructions.capacity() + labels.capacity(), self.limit) {
            return Err(ParseErr::new(ParseErrKind::OutOfMemory, header.span));
        }
        trace!(name = %header.operation, "recorded header");
        headers.push(header);
        Ok(())
    }

    fn push_label(&mut self, label: Label) -> Result<(), ParseErr> {
        let Ast { instructions, labels, headers } = &mut self.ast;
        if !reserve_one(labels, instructions.capacity() + headers.capacity(), self.limit) {
            return Err(ParseErr::new(ParseErrKind::OutOfMemory, label.span()));
        }
        trace!(name = %label.name, address = label.address, "recorded label");
        labels.push(label);
        Ok(())
    }

    /// The address of the next instruction.
    fn next_address(&self) -> u64 {
        self.ast.instructions.len() as u64
    }

    fn finish(mut self) -> Ast {
        self.ast.instructions.shrink_to_fit();
        self.ast.labels.shrink_to_fit();
        self.ast.headers.shrink_to_fit();
        self.ast
    }
}

/// The URCL parser, which holds the configuration used to parse source.
///
/// A parser is not modified by parsing,
/// so one parser can be used to parse many sources (including concurrently).
///
/// # Example
/// ```
/// use urcl_parser::ast::OperandKind;
/// use urcl_parser::parse::Parser;
///
/// let mut parser = Parser::new();
/// parser.set_target_bits(16).unwrap();
///
/// let ast = parser.parse("IMM R1 @MAX\nHLT").unwrap();
/// assert_eq!(ast.instructions.len(), 2);
/// assert_eq!(ast.instructions[0].operand(1).unwrap().kind, OperandKind::Immediate(0xFFFF));
/// ```
#[derive(Debug)]
pub struct Parser {
    /// The word width of the target, used to compute the built-in macros.
    ///
    /// This is 64 by default.
    target_bits: u32,

    /// The handler used to expand macros.
    ///
    /// By default, this is [`BasicMacros`](macros::BasicMacros).
    macros: Macros,

    /// The maximum number of records the output may reserve space for
    /// (across instructions, labels, and headers).
    ///
    /// When this is exceeded, parsing fails with [`ParseErrKind::OutOfMemory`].
    /// This is unlimited by default.
    capacity_limit: Option<usize>
}
impl Default for Parser {
    fn default() -> Self {
        Self {
            target_bits: DEFAULT_TARGET_BITS,
            macros: Macros::default(),
            capacity_limit: None,
        }
    }
}
impl Parser {
    /// Creates a parser with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// The word width of the target.
    pub fn target_bits(&self) -> u32 {
        self.target_bits
    }

    /// Sets the word width of the target.
    ///
    /// This fails if the width is 0 or larger than [`MAX_TARGET_BITS`].
    pub fn set_target_bits(&mut self, bits: u32) -> Result<(), BitsErr> {
        if bits == 0 || bits > MAX_TARGET_BITS {
            return Err(BitsErr(bits));
        }
        self.target_bits = bits;
        Ok(())
    }

    /// Replaces the macro handler with a custom handler.
    pub fn set_macro_handler(&mut self, handler: impl MacroHandler + 'static) {
        self.macros = Macros::Custom(Box::new(handler));
    }

    /// Replaces the macro handler with the built-in macros ([`BasicMacros`](macros::BasicMacros)).
    pub fn use_basic_macros(&mut self) {
        self.macros = Macros::Basic;
    }

    /// Disables macros. Any macro will fail to parse with [`ParseErrKind::UnknownMacro`].
    pub fn clear_macro_handler(&mut self) {
        self.macros = Macros::Disabled;
    }

    /// The maximum number of records the output of a parse may reserve space for.
    pub fn capacity_limit(&self) -> Option<usize> {
        self.capacity_limit
    }

    /// Sets the maximum number of records the output of a parse may reserve space for
    /// (or `None` for no limit).
    pub fn set_capacity_limit(&mut self, limit: Option<usize>) {
        self.capacity_limit = limit;
    }

    /// Parses a full source.
    pub fn parse(&self, src: &str) -> Result<Ast, ParseErr> {
        debug!(len = src.len(), "parsing source");
        self.parse_records(src)
            .map(|ast| {
                debug!(
                    instructions = ast.instructions.len(),
                    labels = ast.labels.len(),
                    headers = ast.headers.len(),
                    "parsed source"
                );
                ast
            })
            .map_err(|e| {
                debug!(kind = %e.kind(), span = ?e.span(), "parse aborted");
                e
            })
    }

    fn parse_records(&self, src: &str) -> Result<Ast, ParseErr> {
        let cx = Context::new(self);
        let mut records = Records::new(self.capacity_limit)?;
        let mut cur = Cursor::new(src);

        while !cur.is_empty() {
            match label_line(&mut cur, records.next_address()) {
                Ok(label) => records.push_label(label)?,
                Err(TryErr::Fatal(e)) => return Err(e),
                Err(TryErr::Mismatch(_)) => match any_instruction(&cx, &mut cur) {
                    Ok(instr) if instr.is_header() => records.push_header(instr)?,
                    Ok(instr) => records.push_instruction(instr)?,
                    Err(e) if *e.kind() == ParseErrKind::ExpectedOperation && is_blank_at(src, e.span().start) => {
                        let start = cur.index();
                        cur.skip_line();
                        trace!(line = ?(start..cur.index()), "skipped blank line");
                    },
                    Err(e) => return Err(e),
                }
            }

            if cur.peek() == Some('\n') {
                cur.advance(1);
            }
        }

        Ok(records.finish())
    }

    /// Parses a source given as UTF-16 code units.
    ///
    /// Unpaired surrogates are replaced with `U+FFFD`.
    /// The span of any error is given in code units.
    pub fn parse_utf16(&self, src: &[u16]) -> Result<Ast, ParseErr> {
        let text: String = char::decode_utf16(src.iter().copied())
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();

        self.parse(&text).map_err(|e| {
            let units = |i: usize| text[..i].encode_utf16().count();
            let Range { start, end } = e.span();
            e.respan(units(start)..units(end))
        })
    }

    /// Parses a single operand.
    ///
    /// The operand may be padded with whitespace and followed by a comment.
    pub fn parse_operand(&self, src: &str) -> Result<Operand, ParseErr> {
        let cx = Context::new(self);
        let mut cur = Cursor::new(src);

        let operand = operand::parse_operand(&cx, &mut cur)?;
        cur.skip_trivia();
        cur.expect_line_end()?;
        expect_source_end(cur)?;
        Ok(operand)
    }

    /// Parses a single instruction (or header) line.
    pub fn parse_instruction(&self, src: &str) -> Result<Instruction, ParseErr> {
        let cx = Context::new(self);
        let mut cur = Cursor::new(src);

        let instr = any_instruction(&cx, &mut cur)?;
        expect_source_end(cur)?;
        Ok(instr)
    }
}

/// Whether the source is at the end of a line at the given index.
fn is_blank_at(src: &str, index: usize) -> bool {
    matches!(src[index..].chars().next(), None | Some('\n'))
}

/// Fails if anything other than a final new line remains after the cursor.
fn expect_source_end(mut cur: Cursor<'_>) -> Result<(), ParseErr> {
    if cur.peek() == Some('\n') {
        cur.advance(1);
    }
    match cur.is_empty() {
        true  => Ok(()),
        false => Err(ParseErr::new(ParseErrKind::ExpectedLineEnd, cur.index()..cur.src.len())),
    }
}

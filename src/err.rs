//! Error interface for this crate.
//!
//! Every error raised by this crate implements [`Error`],
//! which extends [`std::error::Error`] with source span and help information.
//! These can be rendered against their source with [`report`].
//!
//! This module also re-exports every error type in the crate.

use std::borrow::Cow;
use std::ops::Range;

pub use crate::parse::lex::LexErr;
pub use crate::parse::{BitsErr, ParseErr, ParseErrKind};
pub use crate::program::ProgramErr;

/// Unified error interface for all errors in this crate.
///
/// Note that the [`std::fmt::Display`] implementation is used for the brief message of the error.
pub trait Error: std::error::Error {
    /// The range where this error occurs in source.
    ///
    /// If this is not known, this can be set to `None`.
    fn span(&self) -> Option<ErrSpan> {
        None
    }

    /// A clarifying message to help aid someone in how to fix the message.
    ///
    /// If there is none to add, this can be set to `None`.
    fn help(&self) -> Option<Cow<str>>;
}

/// The possible source ranges for an error.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ErrSpan {
    /// One contiguous range.
    One(Range<usize>),
    /// Two contiguous ranges.
    Two([Range<usize>; 2]),
    /// Three or more contiguous ranges.
    Many(Vec<Range<usize>>)
}
impl ErrSpan {
    /// Gets the first range of this span.
    pub fn first(&self) -> Range<usize> {
        match self {
            ErrSpan::One(r) => r.clone(),
            ErrSpan::Two([r, _]) => r.clone(),
            ErrSpan::Many(r) => r.first().cloned().unwrap_or(0..0),
        }
    }

    /// Gets an iterator over all of the ranges of this span.
    pub fn iter(&self) -> impl Iterator<Item=&Range<usize>> + '_ {
        let slice: &[_] = match self {
            ErrSpan::One(r) => std::slice::from_ref(r),
            ErrSpan::Two(r) => r,
            ErrSpan::Many(r) => r,
        };
        slice.iter()
    }
}
impl From<Range<usize>> for ErrSpan {
    fn from(value: Range<usize>) -> Self {
        ErrSpan::One(value)
    }
}
impl From<[Range<usize>; 2]> for ErrSpan {
    fn from(value: [Range<usize>; 2]) -> Self {
        ErrSpan::Two(value)
    }
}
impl From<Vec<Range<usize>>> for ErrSpan {
    fn from(value: Vec<Range<usize>>) -> Self {
        match <[_; 2]>::try_from(value) {
            Ok(two) => ErrSpan::Two(two),
            Err(mut v) if v.len() == 1 => ErrSpan::One(v.remove(0)),
            Err(v) => ErrSpan::Many(v),
        }
    }
}

/// Struct holding a source string and its line indices,
/// which is used to translate byte offsets in the source into lines and columns.
#[derive(PartialEq, Eq, Clone)]
pub struct SourceInfo<'s> {
    /// The source code.
    src: &'s str,
    /// The index of each new line in source code.
    nl_indices: Vec<usize>
}
impl std::fmt::Debug for SourceInfo<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceInfo")
            .field("nl_indices", &self.nl_indices)
            .finish_non_exhaustive()
    }
}
impl<'s> SourceInfo<'s> {
    /// Computes the source info from a given string.
    pub fn new(src: &'s str) -> Self {
        // Index where each new line appears.
        let nl_indices: Vec<_> = src
            .match_indices('\n')
            .map(|(i, _)| i)
            .chain([src.len()])
            .collect();

        Self { src, nl_indices }
    }

    /// Counts the number of lines in the source string.
    pub fn count_lines(&self) -> usize {
        self.nl_indices.len()
    }

    /// Gets the byte range for the provided line, excluding the new line.
    ///
    /// This returns None if line is not in the interval `[0, number of lines)`.
    pub fn line_span(&self, line: usize) -> Option<Range<usize>> {
        let end = *self.nl_indices.get(line)?;
        let start = match line {
            0 => 0,
            _ => self.nl_indices[line - 1] + 1
        };

        Some(start..end)
    }

    /// Reads a line from source (without its new line or carriage return).
    ///
    /// This returns None if line is not in the interval `[0, number of lines)`.
    pub fn read_line(&self, line: usize) -> Option<&'s str> {
        self.line_span(line).map(|r| self.src[r].trim_end_matches('\r'))
    }

    /// Gets the line number of the given byte index.
    pub fn get_line(&self, index: usize) -> usize {
        self.nl_indices.partition_point(|&nl| nl < index)
    }

    /// Calculates the line and column number (both zero-indexed) for a given byte index.
    ///
    /// The column is counted in characters.
    /// If the index exceeds the length of the string,
    /// the position is given relative to the last line.
    pub fn get_pos_pair(&self, index: usize) -> (usize, usize) {
        let lno = self.get_line(index).min(self.count_lines() - 1);
        let start = self.line_span(lno).map_or(0, |r| r.start);

        let index = index.clamp(start, self.src.len());
        let cno = match self.src.get(start..index) {
            Some(s) => s.chars().count(),
            None => index - start,
        };
        (lno, cno)
    }
}

/// Renders an error as a diagnostic message against the source it was raised for.
///
/// The output consists of the one-indexed `line:column` of the error's span,
/// the error message, the offending source line with the span underlined,
/// and the help message (if present).
///
/// # Example
/// ```
/// use urcl_parser::parse::parse_ast;
/// use urcl_parser::err::report;
///
/// let src = "IMM R1 0xZZ";
/// let err = parse_ast(src).unwrap_err();
/// let msg = report(&err, src);
/// assert!(msg.starts_with("1:10: unexpected character in hexadecimal value"));
/// ```
pub fn report(err: &dyn Error, src: &str) -> String {
    use std::fmt::Write;

    let info = SourceInfo::new(src);
    let mut out = String::new();

    match err.span() {
        Some(span) => {
            let Range { start, end } = span.first();
            let (lno, cno) = info.get_pos_pair(start);
            let _ = writeln!(out, "{}:{}: {err}", lno + 1, cno + 1);

            if let Some(line) = info.read_line(lno) {
                let width = src.get(start..end.max(start))
                    .map_or(1, |s| s.chars().count())
                    .max(1);
                let _ = writeln!(out, "  | {line}");
                let _ = writeln!(out, "  | {}{}", " ".repeat(cno), "^".repeat(width));
            }
        },
        None => {
            let _ = writeln!(out, "{err}");
        }
    }

    if let Some(help) = err.help() {
        let _ = writeln!(out, "help: {help}");
    }

    out
}

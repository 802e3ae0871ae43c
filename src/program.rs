//! Building programs out of parsed sources.
//!
//! A [`Program`] accumulates the records of any number of sources
//! (and of statements built programmatically) into one program,
//! where labels are shared entities referred to by [`LabelId`]
//! and label addresses are absolute within the program.
//!
//! # Example
//! ```
//! use urcl_parser::parse::Parser;
//! use urcl_parser::program::{Program, Value};
//!
//! let parser = Parser::new();
//! let mut program = Program::new();
//! program.add_source(&parser, ".main\nIMM R1 5\nHLT").unwrap();
//! program.add_source(&parser, ".sub\nADD R1 R1 R1\nJMP .main").unwrap();
//!
//! let sub = program.find_label(".sub").unwrap();
//! assert_eq!(program.label(sub).address, 2);
//!
//! let main = program.find_label(".main").unwrap();
//! assert_eq!(program.stmts()[3].operands, [Value::Label(main)]);
//! ```

use std::borrow::Cow;
use std::fmt::Write as _;
use std::ops::Range;

use tracing::debug;

use crate::ast::{Ast, HeaderKind, Operand, OperandKind, SpecialReg};
use crate::parse::{ParseErr, Parser};

/// An index into the label table of a [`Program`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct LabelId(usize);
impl LabelId {
    /// The index of this label in the program's label table.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A label of a program.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct LabelDef {
    /// The name of the label (including its `.` prefix).
    pub name: String,
    /// The address of the label, as an index into the program's statements.
    pub address: u64
}

/// An operand of a program statement.
///
/// This is an [`OperandKind`] where label references are resolved to labels of the program.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Value {
    /// A general-purpose register, by index.
    IndexedRegister(u64),
    /// A special-purpose register.
    SpecialRegister(SpecialReg),
    /// An immediate value.
    Immediate(u64),
    /// A memory address.
    MemoryAddress(u64),
    /// A label of the program.
    Label(LabelId),
    /// An offset relative to the current statement.
    Relative(i64),
    /// A named port (including its `%` prefix, in upper case).
    Port(String),
    /// Any other token, kept verbatim.
    Any(String)
}

/// An instruction of a program.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Stmt {
    /// The operation, in upper case.
    pub operation: String,
    /// The operands of the statement.
    pub operands: Vec<Value>
}

/// A header of a program.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Header {
    /// The name of the header, in upper case.
    pub name: String,
    /// The value of the header (if present).
    pub value: Option<Value>
}
impl Header {
    /// The kind of this header, or `None` if this is not a recognized header.
    pub fn kind(&self) -> Option<HeaderKind> {
        HeaderKind::from_name(&self.name)
    }
}

/// Errors from adding a source to a program.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ProgramErr {
    /// The source failed to parse.
    Parse(ParseErr),
    /// An operand referred to a label which is not in the program.
    UnknownLabel {
        /// The name of the label.
        name: String,
        /// The span of the operand in source.
        span: Range<usize>
    }
}
impl From<ParseErr> for ProgramErr {
    fn from(value: ParseErr) -> Self {
        ProgramErr::Parse(value)
    }
}
impl std::fmt::Display for ProgramErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgramErr::Parse(e) => e.fmt(f),
            ProgramErr::UnknownLabel { name, .. } => write!(f, "no label found with the name {name:?}"),
        }
    }
}
impl std::error::Error for ProgramErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProgramErr::Parse(e) => Some(e),
            ProgramErr::UnknownLabel { .. } => None,
        }
    }
}
impl crate::err::Error for ProgramErr {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        match self {
            ProgramErr::Parse(e) => crate::err::Error::span(e),
            ProgramErr::UnknownLabel { span, .. } => Some(span.clone().into()),
        }
    }

    fn help(&self) -> Option<Cow<str>> {
        match self {
            ProgramErr::Parse(e) => crate::err::Error::help(e),
            ProgramErr::UnknownLabel { .. } => Some("labels used by headers must be defined in an earlier source".into()),
        }
    }
}

/// A destination a [`Program`] can be exported to.
pub trait ExportTarget {
    /// Accepts the next statement of the program.
    fn emit(&mut self, program: &Program, stmt: &Stmt);
    /// Accepts a label of the program.
    fn add_label(&mut self, label: &LabelDef);
}

/// A program: headers, labels, and statements.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Program {
    headers: Vec<Header>,
    labels: Vec<LabelDef>,
    stmts: Vec<Stmt>
}
impl Program {
    /// Creates an empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// The headers of the program.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// The labels of the program.
    pub fn labels(&self) -> &[LabelDef] {
        &self.labels
    }

    /// The statements of the program.
    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    /// Gets a label of the program.
    ///
    /// # Panics
    /// This panics if the ID was not created by this program
    /// (or the program was cleared since the ID was created).
    pub fn label(&self, id: LabelId) -> &LabelDef {
        &self.labels[id.0]
    }

    /// Finds the first label with the given name.
    pub fn find_label(&self, name: &str) -> Option<LabelId> {
        self.labels.iter()
            .position(|l| l.name == name)
            .map(LabelId)
    }

    /// Parses a source and adds its records to the program.
    ///
    /// Labels of the source are offset by the number of statements already in the program.
    /// Label references in instructions resolve to the first label of the program with that name,
    /// while label references in headers resolve only against labels of earlier sources.
    ///
    /// If this fails, the program is left unchanged.
    pub fn add_source(&mut self, parser: &Parser, src: &str) -> Result<(), ProgramErr> {
        let ast = parser.parse(src)?;
        self.add_ast(ast)
    }

    /// Adds the records of an already parsed source to the program.
    ///
    /// See [`Program::add_source`].
    pub fn add_ast(&mut self, ast: Ast) -> Result<(), ProgramErr> {
        let lens = (self.headers.len(), self.labels.len(), self.stmts.len());

        let result = self.merge(ast);
        if result.is_err() {
            let (headers, labels, stmts) = lens;
            self.headers.truncate(headers);
            self.labels.truncate(labels);
            self.stmts.truncate(stmts);
        }
        result
    }

    fn merge(&mut self, ast: Ast) -> Result<(), ProgramErr> {
        let offset = self.stmts.len() as u64;
        debug!(
            offset,
            instructions = ast.instructions.len(),
            labels = ast.labels.len(),
            headers = ast.headers.len(),
            "merging source"
        );

        for header in ast.headers {
            let value = header.operands().next()
                .cloned()
                .map(|op| self.resolve(op))
                .transpose()?;
            self.add_header(header.operation, value);
        }

        for label in ast.labels {
            self.add_label(label.name, label.address + offset);
        }

        for instr in ast.instructions {
            let operands = instr.operands()
                .cloned()
                .map(|op| self.resolve(op))
                .collect::<Result<_, _>>()?;
            self.emit(instr.operation, operands);
        }

        Ok(())
    }

    /// Converts a parsed operand into a value of this program.
    fn resolve(&self, operand: Operand) -> Result<Value, ProgramErr> {
        let value = match operand.kind {
            OperandKind::IndexedRegister(r) => Value::IndexedRegister(r),
            OperandKind::SpecialRegister(r) => Value::SpecialRegister(r),
            OperandKind::Immediate(n)       => Value::Immediate(n),
            OperandKind::MemoryAddress(m)   => Value::MemoryAddress(m),
            OperandKind::Relative(o)        => Value::Relative(o),
            OperandKind::Port(p)            => Value::Port(p.to_ascii_uppercase()),
            OperandKind::Any(s)             => Value::Any(s),
            OperandKind::Label(name) => match self.find_label(&name) {
                Some(id) => Value::Label(id),
                None => return Err(ProgramErr::UnknownLabel { name, span: operand.span }),
            },
        };
        Ok(value)
    }

    /// Appends a statement to the program, returning its address.
    pub fn emit(&mut self, operation: impl Into<String>, operands: Vec<Value>) -> u64 {
        let addr = self.stmts.len() as u64;
        self.stmts.push(Stmt {
            operation: operation.into().to_ascii_uppercase(),
            operands
        });
        addr
    }

    /// Adds a label at the address of the next statement.
    pub fn mark_label(&mut self, name: impl Into<String>) -> LabelId {
        let addr = self.stmts.len() as u64;
        self.add_label(name, addr)
    }

    /// Adds a label at the given address.
    pub fn add_label(&mut self, name: impl Into<String>, address: u64) -> LabelId {
        let id = LabelId(self.labels.len());
        self.labels.push(LabelDef { name: name.into(), address });
        id
    }

    /// Adds a header.
    pub fn add_header(&mut self, name: impl Into<String>, value: Option<Value>) {
        self.headers.push(Header {
            name: name.into().to_ascii_uppercase(),
            value
        });
    }

    /// Removes all headers, labels, and statements.
    pub fn clear(&mut self) {
        self.headers.clear();
        self.labels.clear();
        self.stmts.clear();
    }

    /// Exports the statements and labels of this program to a target.
    ///
    /// If `labels_first` is set, all labels are exported before the statements,
    /// otherwise they are exported after.
    pub fn export(&self, target: &mut impl ExportTarget, labels_first: bool) {
        if labels_first {
            self.labels.iter().for_each(|l| target.add_label(l));
        }
        for stmt in &self.stmts {
            target.emit(self, stmt);
        }
        if !labels_first {
            self.labels.iter().for_each(|l| target.add_label(l));
        }
    }

    /// Writes a value as URCL text.
    pub fn value_text<'a>(&'a self, value: &'a Value) -> Cow<'a, str> {
        match value {
            Value::IndexedRegister(r) => Cow::Owned(format!("R{r}")),
            Value::SpecialRegister(r) => Cow::Borrowed(r.name()),
            Value::Immediate(n)       => Cow::Owned(n.to_string()),
            Value::MemoryAddress(m)   => Cow::Owned(format!("M{m}")),
            Value::Label(id)          => Cow::Borrowed(&self.label(*id).name),
            Value::Relative(o)        => Cow::Owned(format!("~{o}")),
            Value::Port(p)            => Cow::Borrowed(p),
            Value::Any(s)             => Cow::Borrowed(s),
        }
    }

    /// Writes a statement as a line of URCL text (without a new line).
    pub fn stmt_text(&self, stmt: &Stmt) -> String {
        let mut line = stmt.operation.clone();
        for value in &stmt.operands {
            line.push(' ');
            line.push_str(&self.value_text(value));
        }
        line
    }

    /// Writes the program as URCL source.
    ///
    /// Parsing the result into a new program
    /// results in a program equal to this one
    /// (as long as headers do not refer to labels and labels are in address order).
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for header in &self.headers {
            out.push_str(&header.name);
            if let Some(value) = &header.value {
                out.push(' ');
                out.push_str(&self.value_text(value));
            }
            out.push('\n');
        }

        let mut text = TextExport::new();
        self.export(&mut text, true);
        out.push_str(&text.finish());
        out
    }
}

/// An [`ExportTarget`] which writes the statements and labels of a program as URCL text.
#[derive(Debug, Default)]
pub struct TextExport {
    lines: Vec<String>,
    labels: Vec<(u64, String)>
}
impl TextExport {
    /// Creates an empty text export.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes all exported statements, each preceded by the labels at its address.
    pub fn finish(mut self) -> String {
        self.labels.sort_by_key(|&(addr, _)| addr);

        let mut out = String::new();
        let mut labels = self.labels.iter().peekable();
        for (addr, line) in (0..).zip(&self.lines) {
            while let Some((_, name)) = labels.next_if(|&&(a, _)| a <= addr) {
                let _ = writeln!(out, "{name}");
            }
            let _ = writeln!(out, "    {line}");
        }
        for (_, name) in labels {
            let _ = writeln!(out, "{name}");
        }
        out
    }
}
impl ExportTarget for TextExport {
    fn emit(&mut self, program: &Program, stmt: &Stmt) {
        self.lines.push(program.stmt_text(stmt));
    }

    fn add_label(&mut self, label: &LabelDef) {
        self.labels.push((label.address, label.name.clone()));
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{HeaderKind, SpecialReg};
    use crate::parse::{ParseErrKind, Parser};

    use super::{ExportTarget, LabelDef, Program, ProgramErr, Stmt, Value};

    #[test]
    fn test_merge_sources() {
        let parser = Parser::new();
        let mut program = Program::new();

        program.add_source(&parser, "bits 16\n.a\nimm r1 5\nout %text r1").unwrap();
        program.add_source(&parser, ".b\nJMP .a\n.c\nHLT").unwrap();

        let labels: Vec<_> = program.labels().iter()
            .map(|l| (l.name.as_str(), l.address))
            .collect();
        assert_eq!(labels, [(".a", 0), (".b", 2), (".c", 3)]);

        assert_eq!(program.headers()[0].name, "BITS");
        assert_eq!(program.headers()[0].kind(), Some(HeaderKind::Bits));
        assert_eq!(program.headers()[0].value, Some(Value::Immediate(16)));

        let stmts = program.stmts();
        assert_eq!(stmts[0], Stmt { operation: "IMM".to_string(), operands: vec![Value::IndexedRegister(1), Value::Immediate(5)] });
        assert_eq!(stmts[1].operands[0], Value::Port("%TEXT".to_string()));
        assert_eq!(stmts[2].operands, [Value::Label(program.find_label(".a").unwrap())]);
    }

    #[test]
    fn test_label_resolution() {
        let parser = Parser::new();
        let mut program = Program::new();

        // forward references resolve within a source
        program.add_source(&parser, "JMP .end\n.end\nHLT").unwrap();
        let end = program.find_label(".end").unwrap();
        assert_eq!(program.stmts()[0].operands, [Value::Label(end)]);

        // duplicates resolve to the first label
        program.add_source(&parser, ".end\nJMP .end").unwrap();
        assert_eq!(program.labels().len(), 2);
        assert_eq!(program.stmts()[2].operands, [Value::Label(end)]);
    }

    #[test]
    fn test_failed_source() {
        let parser = Parser::new();
        let mut program = Program::new();
        program.add_source(&parser, "BITS 8\n.a\nHLT").unwrap();
        let before = program.clone();

        let err = program.add_source(&parser, "MINREG 8\n.b\nJMP .nope").unwrap_err();
        assert_eq!(err, ProgramErr::UnknownLabel { name: ".nope".to_string(), span: 16..21 });
        assert_eq!(program, before);

        // headers can only see labels of earlier sources
        let err = program.add_source(&parser, "RUN .c\n.c\nHLT").unwrap_err();
        assert!(matches!(err, ProgramErr::UnknownLabel { ref name, .. } if name == ".c"));
        program.add_source(&parser, "RUN .a").unwrap();
        assert_eq!(program.headers()[1].value, program.find_label(".a").map(Value::Label));

        let err = program.add_source(&parser, "IMM R1 0b12").unwrap_err();
        assert!(matches!(err, ProgramErr::Parse(ref e) if matches!(e.kind(), ParseErrKind::Lex(_))));
    }

    #[test]
    fn test_programmatic() {
        let mut program = Program::new();
        program.add_header("minstack", Some(Value::Immediate(16)));
        let start = program.mark_label(".start");
        program.emit("psh", vec![Value::SpecialRegister(SpecialReg::PC)]);
        program.emit("jmp", vec![Value::Label(start)]);
        let end = program.add_label(".end", 2);

        assert_eq!(program.label(start).address, 0);
        assert_eq!(program.label(end).address, 2);
        assert_eq!(program.to_source(), "MINSTACK 16\n.start\n    PSH PC\n    JMP .start\n.end\n");

        program.clear();
        assert!(program.stmts().is_empty());
        assert!(program.labels().is_empty());
        assert!(program.headers().is_empty());
    }

    #[derive(Default)]
    struct Recorder(Vec<String>);
    impl ExportTarget for Recorder {
        fn emit(&mut self, program: &Program, stmt: &Stmt) {
            self.0.push(program.stmt_text(stmt));
        }
        fn add_label(&mut self, label: &LabelDef) {
            self.0.push(label.name.clone());
        }
    }

    #[test]
    fn test_export_order() {
        let mut program = Program::new();
        program.add_source(&Parser::new(), ".a\nHLT\n.b\nNOP").unwrap();

        let mut rec = Recorder::default();
        program.export(&mut rec, true);
        assert_eq!(rec.0, [".a", ".b", "HLT", "NOP"]);

        let mut rec = Recorder::default();
        program.export(&mut rec, false);
        assert_eq!(rec.0, ["HLT", "NOP", ".a", ".b"]);
    }

    #[test]
    fn test_value_text() {
        let mut program = Program::new();
        program.add_source(&Parser::new(), ".a\nOUT %text ==\nJMP .a").unwrap();

        // borrows from both the program (labels) and the statement (ports, any)
        let texts: Vec<_> = program.stmts().iter()
            .flat_map(|s| &s.operands)
            .map(|v| program.value_text(v))
            .collect();
        assert_eq!(texts, ["%TEXT", "==", ".a"]);

        let local = Value::Any("'x'".to_string());
        assert_eq!(program.value_text(&local), "'x'");
        assert_eq!(program.value_text(&Value::Relative(-2)), "~-2");
    }

    #[test]
    fn test_round_trip() {
        let src = "
            BITS 32
            MINHEAP 0x100
            RUN RAM
        .start
            IMM R1, @MAX
            LOD R2 M12
            BRZ ~+2 R2
        .loop
        .loop2
            OUT %NUMB R1
            PSH SP
            JMP .loop
        .end
            HLT
        ";
        let parser = Parser::new();
        let mut program = Program::new();
        program.add_source(&parser, src).unwrap();

        let mut reparsed = Program::new();
        reparsed.add_source(&parser, &program.to_source()).unwrap();
        assert_eq!(reparsed, program);
    }
}

//! Components relating to the records parsed out of URCL source.
//!
//! A parsed source ([`Ast`]) consists of three streams:
//! - [`Instruction`]s (an operation and up to [`MAX_OPERANDS`] [`Operand`]s),
//! - [`Label`]s (a name and the address of the instruction they precede),
//! - and headers (which are instructions whose name is a [`HeaderKind`]).
//!
//! Every component implements [`std::fmt::Display`], which writes the component
//! back into URCL source that parses to the same value.

use std::fmt::Write as _;
use std::ops::Range;

/// The maximum number of operands an instruction can have.
pub const MAX_OPERANDS: usize = 3;

/// A special-purpose register, addressed by name rather than by index.
///
/// ## Examples
///
/// ```text
/// PSH SP
///     ~~
/// MOV R1 PC
///        ~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SpecialReg {
    /// The stack pointer.
    SP,
    /// The program counter.
    PC
}
impl SpecialReg {
    /// Matches a special register by its name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("SP") {
            Some(SpecialReg::SP)
        } else if name.eq_ignore_ascii_case("PC") {
            Some(SpecialReg::PC)
        } else {
            None
        }
    }

    /// The fixed index of this register (`SP` is 0, `PC` is 1).
    pub fn index(self) -> u64 {
        match self {
            SpecialReg::SP => 0,
            SpecialReg::PC => 1,
        }
    }

    /// The canonical (uppercase) name of this register.
    pub fn name(self) -> &'static str {
        match self {
            SpecialReg::SP => "SP",
            SpecialReg::PC => "PC",
        }
    }
}
impl std::fmt::Display for SpecialReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The value of an operand, tagged by the kind of operand it was parsed as.
///
/// | kind                | prefix          | example       |
/// |---------------------|-----------------|---------------|
/// | `Label`             | `.`             | `.loop`       |
/// | `Port`              | `%`             | `%TEXT`       |
/// | `Immediate`         | `0`-`9`         | `0xFF`        |
/// | `Relative`          | `~`             | `~-2`         |
/// | `MemoryAddress`     | `M`, `m`, `#`   | `M12`         |
/// | `IndexedRegister`   | `R`, `r`, `$`   | `R3`          |
/// | `SpecialRegister`   | none            | `SP`, `PC`    |
/// | `Any`               | none            | `'A'`, `ROM`  |
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum OperandKind {
    /// A general-purpose register, by index.
    IndexedRegister(u64),
    /// A special-purpose register.
    SpecialRegister(SpecialReg),
    /// An immediate value.
    Immediate(u64),
    /// A memory address.
    MemoryAddress(u64),
    /// A label reference. The name includes its `.` prefix.
    Label(String),
    /// An offset relative to the current instruction.
    Relative(i64),
    /// A named port. The name includes its `%` prefix.
    Port(String),
    /// A token which matched no other operand kind, kept verbatim.
    Any(String)
}
impl std::fmt::Display for OperandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperandKind::IndexedRegister(r) => write!(f, "R{r}"),
            OperandKind::SpecialRegister(r) => r.fmt(f),
            OperandKind::Immediate(n)       => n.fmt(f),
            OperandKind::MemoryAddress(m)   => write!(f, "M{m}"),
            OperandKind::Label(s)           => f.write_str(s),
            OperandKind::Relative(o)        => write!(f, "~{o}"),
            OperandKind::Port(s)            => f.write_str(s),
            OperandKind::Any(s)             => f.write_str(s),
        }
    }
}

/// An operand, alongside where it was found in source.
///
/// For operands produced by a macro, the span is the span of the macro token.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Operand {
    /// The value of the operand.
    pub kind: OperandKind,
    /// The span of the operand's token in source (excluding padding).
    pub span: Range<usize>
}
impl Operand {
    /// Creates a new operand.
    pub fn new(kind: OperandKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }
}
impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}

/// A header directive.
///
/// Headers are written exactly like instructions,
/// but configure the target machine instead of describing behavior.
///
/// ## Examples
/// ```text
/// BITS 16
/// MINREG 8
/// MINHEAP 64
/// MINSTACK 16
/// RUN ROM
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum HeaderKind {
    /// `BITS`: the word width of the target.
    Bits,
    /// `MINREG`: the minimum number of general-purpose registers.
    MinReg,
    /// `MINHEAP`: the minimum number of heap words.
    MinHeap,
    /// `MINSTACK`: the minimum number of stack words.
    MinStack,
    /// `RUN`: whether instructions are stored in ROM or RAM.
    Run
}
impl HeaderKind {
    const ALL: [HeaderKind; 5] = [
        HeaderKind::Bits, HeaderKind::MinReg, HeaderKind::MinHeap,
        HeaderKind::MinStack, HeaderKind::Run
    ];

    /// Matches a header by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter()
            .find(|h| h.name().eq_ignore_ascii_case(name))
    }

    /// The name of this header.
    pub fn name(self) -> &'static str {
        match self {
            HeaderKind::Bits     => "BITS",
            HeaderKind::MinReg   => "MINREG",
            HeaderKind::MinHeap  => "MINHEAP",
            HeaderKind::MinStack => "MINSTACK",
            HeaderKind::Run      => "RUN",
        }
    }
}
impl std::fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An instruction (or header) parsed from source.
///
/// # Examples
/// ```text
/// ADD R1 R2 R3
/// BRZ .end, R1
/// HLT
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Instruction {
    /// The operation, as written in source.
    pub operation: String,
    /// The operand slots. Only a prefix of these slots is ever occupied.
    operands: [Option<Operand>; MAX_OPERANDS],
    /// The span of the instruction in source (from the operation to its last operand).
    pub span: Range<usize>
}
impl Instruction {
    /// Creates a new instruction with no operands.
    pub fn new(operation: impl Into<String>, span: Range<usize>) -> Self {
        Self { operation: operation.into(), operands: Default::default(), span }
    }

    /// Appends an operand into the next free slot.
    ///
    /// If all slots are occupied, the operand is handed back.
    pub fn push_operand(&mut self, operand: Operand) -> Result<(), Operand> {
        match self.operands.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                slot.replace(operand);
                Ok(())
            },
            None => Err(operand)
        }
    }

    /// Gets the operand in the given slot.
    pub fn operand(&self, index: usize) -> Option<&Operand> {
        self.operands.get(index)?.as_ref()
    }

    /// Iterates over the occupied operand slots.
    pub fn operands(&self) -> impl Iterator<Item=&Operand> + '_ {
        self.operands.iter().map_while(Option::as_ref)
    }

    /// The number of operands in this instruction.
    pub fn operand_count(&self) -> usize {
        self.operands().count()
    }

    /// If this instruction is a header, gets its kind.
    pub fn header_kind(&self) -> Option<HeaderKind> {
        HeaderKind::from_name(&self.operation)
    }

    /// Whether this instruction is a header.
    pub fn is_header(&self) -> bool {
        self.header_kind().is_some()
    }

    /// Moves this instruction (and all its operands) to the given span.
    ///
    /// This is used for instructions which were produced from a macro.
    pub(crate) fn respan(&mut self, span: Range<usize>) {
        for op in self.operands.iter_mut().flatten() {
            op.span = span.clone();
        }
        self.span = span;
    }
}
impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.operation)?;
        for op in self.operands() {
            f.write_char(' ')?;
            op.fmt(f)?;
        }
        Ok(())
    }
}

/// A label definition.
///
/// This struct stores the name of the label (including its `.` prefix),
/// the address it refers to, and where it is located in source.
///
/// The address of a label is the index of the instruction following it
/// (headers do not count as instructions).
///
/// # Examples
/// ```text
/// .start
/// ~~~~~~
///     IMM R1 5
/// .loop
/// ~~~~~
///     DEC R1 R1
///     BNZ .loop R1
///     HLT
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Label {
    /// The label's identifier.
    pub name: String,

    /// The address of the label.
    pub address: u64,

    /// The start of the label in source.
    ///
    /// The name stores the length of the label.
    start: usize
}
impl Label {
    /// Creates a new label.
    pub fn new(name: String, address: u64, span: Range<usize>) -> Self {
        debug_assert_eq!(span.start + name.len(), span.end, "span should have the same length as name");
        Label { name, address, start: span.start }
    }
    /// Returns the span of the label in source.
    pub fn span(&self) -> Range<usize> {
        self.start .. (self.start + self.name.len())
    }
}
impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name.fmt(f)
    }
}

/// The records parsed from one URCL source.
///
/// Label addresses are relative to the `instructions` of this source.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Ast {
    /// The instructions, in source order.
    pub instructions: Vec<Instruction>,
    /// The labels, in source order.
    pub labels: Vec<Label>,
    /// The headers, in source order.
    pub headers: Vec<Instruction>
}
impl std::fmt::Display for Ast {
    /// Writes the headers, then the instructions with their labels interleaved.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for header in &self.headers {
            writeln!(f, "{header}")?;
        }

        let mut labels = self.labels.iter().peekable();
        for (addr, instr) in (0..).zip(&self.instructions) {
            while let Some(label) = labels.next_if(|l| l.address <= addr) {
                writeln!(f, "{label}")?;
            }
            writeln!(f, "    {instr}")?;
        }
        for label in labels {
            writeln!(f, "{label}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{HeaderKind, Instruction, Operand, OperandKind, SpecialReg};

    fn op(kind: OperandKind) -> Operand {
        Operand::new(kind, 0..0)
    }

    #[test]
    fn test_header_names() {
        assert_eq!(HeaderKind::from_name("BITS"), Some(HeaderKind::Bits));
        assert_eq!(HeaderKind::from_name("bits"), Some(HeaderKind::Bits));
        assert_eq!(HeaderKind::from_name("MinReg"), Some(HeaderKind::MinReg));
        assert_eq!(HeaderKind::from_name("minheap"), Some(HeaderKind::MinHeap));
        assert_eq!(HeaderKind::from_name("MINSTACK"), Some(HeaderKind::MinStack));
        assert_eq!(HeaderKind::from_name("run"), Some(HeaderKind::Run));
        assert_eq!(HeaderKind::from_name("BIT"), None);
        assert_eq!(HeaderKind::from_name("ADD"), None);
    }

    #[test]
    fn test_special_regs() {
        assert_eq!(SpecialReg::from_name("sp"), Some(SpecialReg::SP));
        assert_eq!(SpecialReg::from_name("Pc"), Some(SpecialReg::PC));
        assert_eq!(SpecialReg::from_name("SPX"), None);
        assert_eq!(SpecialReg::SP.index(), 0);
        assert_eq!(SpecialReg::PC.index(), 1);
    }

    #[test]
    fn test_operand_slots() {
        let mut instr = Instruction::new("ADD", 0..3);
        assert_eq!(instr.operand_count(), 0);
        assert!(!instr.is_header());

        assert!(instr.push_operand(op(OperandKind::IndexedRegister(1))).is_ok());
        assert!(instr.push_operand(op(OperandKind::IndexedRegister(2))).is_ok());
        assert!(instr.push_operand(op(OperandKind::Immediate(3))).is_ok());
        assert_eq!(
            instr.push_operand(op(OperandKind::Immediate(4))),
            Err(op(OperandKind::Immediate(4)))
        );
        assert_eq!(instr.operand_count(), 3);
        assert_eq!(instr.operand(2), Some(&op(OperandKind::Immediate(3))));
        assert_eq!(instr.operand(3), None);
    }

    #[test]
    fn test_display() {
        let mut instr = Instruction::new("BRZ", 0..3);
        instr.push_operand(op(OperandKind::Label(".end".to_string()))).unwrap();
        instr.push_operand(op(OperandKind::Relative(-4))).unwrap();
        instr.push_operand(op(OperandKind::SpecialRegister(SpecialReg::SP))).unwrap();
        assert_eq!(instr.to_string(), "BRZ .end ~-4 SP");

        let mut instr = Instruction::new("STR", 0..3);
        instr.push_operand(op(OperandKind::MemoryAddress(12))).unwrap();
        instr.push_operand(op(OperandKind::Port("%TEXT".to_string()))).unwrap();
        assert_eq!(instr.to_string(), "STR M12 %TEXT");

        assert!(Instruction::new("minheap", 0..7).is_header());
    }
}

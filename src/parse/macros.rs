//! Macro expansion.
//!
//! A macro operand (`@NAME`) is replaced by the text its [`MacroHandler`] produces,
//! and that text is parsed again in place of the macro.
//!
//! The default handler, [`BasicMacros`], provides a set of constants
//! computed from the target word width of the parser:
//!
//! | name     | value (for word width `W`)        |
//! |----------|-----------------------------------|
//! | `MAX`    | all `W` bits set                  |
//! | `SMAX`   | all bits set except the sign bit  |
//! | `MSB`    | only the sign bit set             |
//! | `SMSB`   | only the bit below the sign bit   |
//! | `LHALF`  | the lower half of the bits set    |
//! | `UHALF`  | the upper half of the bits set    |
//! | `BITS`   | `W` itself                        |
//!
//! Each of these is written as a binary literal of exactly `W` digits (e.g., `@MSB` for `W = 4` is `0b1000`).

/// The maximum depth of nested macro expansions.
///
/// An expansion which itself expands macros more deeply than this
/// is rejected with [`ParseErrKind::MacroRecursion`].
///
/// [`ParseErrKind::MacroRecursion`]: crate::parse::ParseErrKind::MacroRecursion
pub const MAX_MACRO_DEPTH: usize = 32;

/// A handler which expands macro names into replacement text.
///
/// Any `Fn(&str, u32) -> Option<String>` closure is a macro handler.
///
/// # Example
/// ```
/// use urcl_parser::ast::OperandKind;
/// use urcl_parser::parse::Parser;
///
/// let mut parser = Parser::new();
/// parser.set_macro_handler(|name: &str, _bits: u32| {
///     name.eq_ignore_ascii_case("ANSWER").then(|| "42".to_string())
/// });
///
/// let op = parser.parse_operand("@answer").unwrap();
/// assert_eq!(op.kind, OperandKind::Immediate(42));
/// ```
pub trait MacroHandler: Send + Sync {
    /// Expands the macro `name` (without its `@` sigil) for a target word width of `bits`.
    ///
    /// This returns `None` if the macro is not known to this handler.
    fn expand(&self, name: &str, bits: u32) -> Option<String>;
}
impl<F> MacroHandler for F
    where F: Fn(&str, u32) -> Option<String> + Send + Sync
{
    fn expand(&self, name: &str, bits: u32) -> Option<String> {
        self(name, bits)
    }
}

/// The built-in macro set.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct BasicMacros;

impl BasicMacros {
    /// Computes the value of a built-in macro (case-insensitive)
    /// for a target word width of `bits`.
    ///
    /// This is `None` for unknown names and for widths outside `1..=128`.
    pub fn value(name: &str, bits: u32) -> Option<u128> {
        if !(1..=u128::BITS).contains(&bits) {
            return None;
        }
        let max = mask(bits);
        let msb = 1u128 << (bits - 1);
        let lhalf = max >> (bits / 2);

        let value = match name.to_ascii_uppercase().as_str() {
            "MAX"   => max,
            "SMAX"  => max >> 1,
            "MSB"   => msb,
            "SMSB"  => msb >> 1,
            "LHALF" => lhalf,
            "UHALF" => max & !lhalf,
            "BITS"  => u128::from(bits),
            _ => return None
        };
        Some(value)
    }
}
impl MacroHandler for BasicMacros {
    fn expand(&self, name: &str, bits: u32) -> Option<String> {
        Self::value(name, bits).map(|v| binary_literal(v, bits))
    }
}

fn mask(bits: u32) -> u128 {
    u128::MAX.checked_shr(u128::BITS.saturating_sub(bits)).unwrap_or(0)
}

/// Writes the lower `bits` bits of `value` as a binary literal
/// with exactly `bits` digits (e.g., `0b0101`).
pub fn binary_literal(value: u128, bits: u32) -> String {
    let width = bits as usize;
    format!("0b{:0width$b}", value & mask(bits))
}

/// The macro handler slot of a parser.
#[derive(Default)]
pub(crate) enum Macros {
    #[default]
    Basic,
    Disabled,
    Custom(Box<dyn MacroHandler>)
}
impl Macros {
    pub(crate) fn expand(&self, name: &str, bits: u32) -> Option<String> {
        match self {
            Macros::Basic     => BasicMacros.expand(name, bits),
            Macros::Disabled  => None,
            Macros::Custom(h) => h.expand(name, bits),
        }
    }
}
impl std::fmt::Debug for Macros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Macros::Basic     => f.write_str("Basic"),
            Macros::Disabled  => f.write_str("Disabled"),
            Macros::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{binary_literal, BasicMacros, MacroHandler, Macros};

    fn expand(name: &str, bits: u32) -> String {
        BasicMacros.expand(name, bits).unwrap()
    }

    #[test]
    fn test_basic_64() {
        assert_eq!(expand("MAX", 64), format!("0b{}", "1".repeat(64)));
        assert_eq!(expand("SMAX", 64), format!("0b0{}", "1".repeat(63)));
        assert_eq!(expand("MSB", 64), format!("0b1{}", "0".repeat(63)));
        assert_eq!(expand("SMSB", 64), format!("0b01{}", "0".repeat(62)));
        assert_eq!(expand("LHALF", 64), format!("0b{}{}", "0".repeat(32), "1".repeat(32)));
        assert_eq!(expand("UHALF", 64), format!("0b{}{}", "1".repeat(32), "0".repeat(32)));
        assert_eq!(expand("BITS", 64), format!("0b{}1000000", "0".repeat(57)));
    }

    #[test]
    fn test_basic_small() {
        assert_eq!(expand("max", 8), "0b11111111");
        assert_eq!(expand("Smax", 8), "0b01111111");
        assert_eq!(expand("msb", 8), "0b10000000");
        assert_eq!(expand("smsb", 8), "0b01000000");
        assert_eq!(expand("lhalf", 8), "0b00001111");
        assert_eq!(expand("uhalf", 8), "0b11110000");
        assert_eq!(expand("bits", 8), "0b00001000");

        // odd widths keep the larger half in the lower half
        assert_eq!(expand("LHALF", 5), "0b00111");
        assert_eq!(expand("UHALF", 5), "0b11000");

        assert_eq!(expand("MAX", 1), "0b1");
        assert_eq!(expand("BITS", 1), "0b1");
        assert_eq!(expand("SMAX", 1), "0b0");
    }

    #[test]
    fn test_basic_wide() {
        let lit = expand("MAX", 71);
        assert_eq!(lit.len(), 2 + 71);
        assert!(lit[2..].bytes().all(|b| b == b'1'));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(BasicMacros.expand("MIN", 16), None);
        assert_eq!(BasicMacros.expand("", 16), None);
        assert_eq!(Macros::Disabled.expand("MAX", 16), None);
    }

    #[test]
    fn test_unsupported_width() {
        assert_eq!(BasicMacros.expand("MAX", 0), None);
        assert_eq!(BasicMacros.expand("BITS", 129), None);
        assert_eq!(BasicMacros.expand("MIN", 0), None);
        assert_eq!(BasicMacros.expand("MIN", u32::MAX), None);
        assert_eq!(BasicMacros::value("MAX", 128), Some(u128::MAX));
        assert_eq!(BasicMacros::value("MSB", 128), Some(1 << 127));
    }

    #[test]
    fn test_custom() {
        let slot = Macros::Custom(Box::new(|name: &str, bits: u32| {
            (name == "W").then(|| bits.to_string())
        }));
        assert_eq!(slot.expand("W", 16).as_deref(), Some("16"));
        assert_eq!(slot.expand("MAX", 16), None);
    }

    #[test]
    fn test_binary_literal() {
        assert_eq!(binary_literal(5, 4), "0b0101");
        assert_eq!(binary_literal(0x1F, 4), "0b1111");
        assert_eq!(binary_literal(0, 3), "0b000");
    }
}

//! A URCL parser.
//!
//! This crate parses URCL source into instruction, label, and header records,
//! reporting any malformed source as a single error pointing into the source.
//!
//! # Usage
//!
//! To parse URCL source code with the default configuration:
//! ```
//! use urcl_parser::ast::OperandKind;
//! use urcl_parser::parse::parse_ast;
//!
//! let code = "
//!     BITS 16
//!     MINREG 2
//! .loop
//!     ADD R1, R1, 0x2 // step
//!     BRL .loop R1 @MAX
//!     HLT
//! ";
//! let ast = parse_ast(code).unwrap();
//!
//! assert_eq!(ast.headers.len(), 2);
//! assert_eq!(ast.labels[0].address, 0);
//! assert_eq!(ast.instructions.len(), 3);
//! assert_eq!(ast.instructions[1].operand(2).unwrap().kind, OperandKind::Immediate(u64::MAX));
//! ```
//!
//! The parser can also be configured (see [`parse::Parser`]), which affects macro expansion:
//! ```
//! use urcl_parser::ast::OperandKind;
//! use urcl_parser::parse::Parser;
//!
//! let mut parser = Parser::new();
//! parser.set_target_bits(8).unwrap();
//!
//! let op = parser.parse_operand("@SMAX").unwrap();
//! assert_eq!(op.kind, OperandKind::Immediate(0x7F));
//! ```
//!
//! Errors carry their location in source and can be rendered with [`err::report`]:
//! ```
//! use urcl_parser::err::report;
//! use urcl_parser::parse::parse_ast;
//!
//! let code = "IMM R1 5\nMOV R2 R";
//! let err = parse_ast(code).unwrap_err();
//! assert_eq!(err.span(), 17..17);
//! assert!(report(&err, code).starts_with("2:9: invalid register index"));
//! ```
//!
//! Multiple sources can be combined into one program with resolved labels.
//! See the [`program`] module for more details.
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod err;
pub mod program;

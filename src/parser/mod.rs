//! Command-language parsing: tokenizer and statement parser.
//!
//! [`statement::parse`] is the entry point: it tokenizes and parses one
//! complete statement. Parsing is pure and side-effect free; whether the
//! parsed combination is executable is decided later, against the
//! compiled grammar, by the transformer.

pub mod lexer;
pub mod statement;

pub use lexer::{lex, Token, TokenKind};
pub use statement::{parse, RawClause, RawField, RawProjectRef, Spanned, Statement};

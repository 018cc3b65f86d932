//! Tokenizer and parser for the krait Python toolchain.
//!
//! Two stages, strictly ordered:
//!
//! 1. [`tokenize`] turns source text into a token stream: literals, names,
//!    keywords, operators, plus the synthesized `Newline` / `Indent` /
//!    `Dedent` / `EndMarker` tokens and the f-/t-string boundary tokens.
//! 2. [`parse_module`] / [`parse_expression`] turn the token stream into a
//!    [`krait_ast`] tree with a PEG parser: ordered choice, explicit
//!    checkpoints, and packrat memoization for the backtracking rules.
//!
//! Both stages fail fast with positioned errors ([`LexError`],
//! [`ParseError`]); neither performs any I/O.
//!
//! ```
//! let module = krait_parser::parse_module("x = 1\n").unwrap();
//! assert_eq!(module.body.len(), 1);
//! ```

mod error;
mod lexer;
mod parser;
mod string;
mod token;

pub use error::{LexError, LexErrorKind, ParseError};
pub use lexer::tokenize;
pub use token::{Token, TokenFlags, TokenKind, TokenValue};

use krait_ast::{Expr, Module};

/// Parse a whole source file into a [`Module`].
pub fn parse_module(source: &str) -> Result<Module, ParseError> {
    let tokens = tokenize(source)?;
    parser::Parser::new(tokens).parse_module()
}

/// Parse a single expression (for example a REPL line).
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    parser::Parser::new(tokens).parse_expression_only()
}

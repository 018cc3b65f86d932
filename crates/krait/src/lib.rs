//! krait - a front-to-middle-end toolchain for Python source.
//!
//! The pipeline is strictly one-way: source text is tokenized and parsed by
//! [`krait_parser`], and the resulting AST is lowered here to a stack-based
//! instruction stream modeled after CPython 3.12-era bytecode.
//!
//! # Pipeline
//!
//! - [`compile_source`] runs the whole thing: tokenize, parse, compile, and
//!   finalize a [`CodeObject`] tree (one object per module, function, class
//!   body, lambda, and generator expression).
//! - [`disassemble`] renders a code object as a human-readable listing.
//! - [`Evaluator`] tree-walks the small arithmetic/name/`print` subset so
//!   toy programs can run end to end.
//!
//! ```
//! let code = krait::compile_source("x = 1\nprint(x)\n", "<demo>").unwrap();
//! let listing = krait::disassemble(&code);
//! assert!(listing.contains("STORE_NAME"));
//! ```
//!
//! # Errors
//!
//! Lexical and syntactic errors are fatal and carry source positions.
//! Compiler errors accumulate instead: [`compile_module`] always produces a
//! code object plus the list of problems it found, and [`compile_source`]
//! turns a non-empty list into [`Error::Compile`]. The [`Diagnostic`] type
//! renders any of them against the source text.

pub mod bytecode;
mod code;
mod compiler;
mod diagnostic;
mod dis;
mod error;
mod eval;
mod value;

pub use code::{CodeFlags, CodeObject, Constant, Instruction};
pub use compiler::compile_module;
pub use diagnostic::{Diagnostic, Label};
pub use dis::disassemble;
pub use error::{CompileError, CompileErrorKind, Error, EvalError, Result};
pub use eval::Evaluator;
pub use value::Value;

/// Compile source text all the way to a finalized code object.
///
/// Fails on the first lexical or syntactic error, or if the compiler
/// accumulated any errors.
pub fn compile_source(source: &str, filename: &str) -> Result<CodeObject> {
    let module = krait_parser::parse_module(source)?;
    let (code, errors) = compile_module(&module, filename);
    if errors.is_empty() {
        Ok(code)
    } else {
        Err(Error::Compile(errors))
    }
}

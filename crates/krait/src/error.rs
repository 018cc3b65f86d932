//! Error types for the compiler and evaluator, plus the crate-level
//! aggregate error.

use krait_ast::SourceLocation;
use thiserror::Error;

/// What the compiler complained about.
///
/// These are recoverable: the compiler records them and keeps going, so a
/// single run can report every problem. A code object produced alongside a
/// non-empty error list is not guaranteed executable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("'break' outside loop")]
    BreakOutsideLoop,
    #[error("'continue' outside loop")]
    ContinueOutsideLoop,
    #[error("'return' outside function")]
    ReturnOutsideFunction,
    #[error("'yield' outside function")]
    YieldOutsideFunction,
    #[error("invalid assignment target")]
    InvalidAssignTarget,
    #[error("invalid delete target")]
    InvalidDeleteTarget,
    #[error("assignment expression target must be a name")]
    InvalidWalrusTarget,
    #[error("annotation target must be a name, attribute, or subscript")]
    InvalidAnnotationTarget,
    #[error("starred expression cannot be used here")]
    StarredNotAllowed,
    #[error("nonlocal declaration not allowed at module level")]
    NonlocalAtModuleLevel,
}

/// One accumulated compiler error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {location}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub location: SourceLocation,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

/// A runtime error from the expression evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {location}")]
pub struct EvalError {
    pub message: String,
    pub location: SourceLocation,
}

impl EvalError {
    pub fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

/// Any error the toolchain can produce, for callers that drive the whole
/// pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] krait_parser::LexError),
    #[error(transparent)]
    Parse(#[from] krait_parser::ParseError),
    #[error("compilation produced {} error(s); first: {}", .0.len(), .0[0])]
    Compile(Vec<CompileError>),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

pub type Result<T> = std::result::Result<T, Error>;

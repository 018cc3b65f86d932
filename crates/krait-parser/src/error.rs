//! Lexical and syntactic error types.

use krait_ast::SourceLocation;
use thiserror::Error;

/// What went wrong while tokenizing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated triple-quoted string literal")]
    UnterminatedTripleQuotedString,
    #[error("invalid escape sequence `\\{0}`")]
    InvalidEscape(char),
    #[error("invalid numeric literal: {0}")]
    InvalidNumber(String),
    #[error("unindent does not match any outer indentation level")]
    DedentMismatch,
    #[error("inconsistent use of tabs and spaces in indentation")]
    TabError,
    #[error("unexpected character `{0}`")]
    UnrecognizedToken(char),
    #[error("invalid string prefix `{0}`")]
    InvalidStringPrefix(String),
    #[error("single `}}` is not allowed inside an f-string")]
    SingleRbrace,
    #[error("newline inside a format specifier")]
    NewlineInFormatSpec,
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("line continuation must be followed by a newline")]
    LineContinuation,
}

/// A fatal tokenizer error. Tokenization stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {location}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub location: SourceLocation,
}

impl LexError {
    pub fn new(kind: LexErrorKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

/// A fatal parse error: the first position where no grammar alternative
/// matched, with the offending token's lexeme.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {location} (near `{lexeme}`)")]
pub struct ParseError {
    pub message: String,
    pub lexeme: String,
    pub location: SourceLocation,
}

impl ParseError {
    pub fn new(message: impl Into<String>, lexeme: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            lexeme: lexeme.into(),
            location,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.kind.to_string(),
            lexeme: String::new(),
            location: err.location,
        }
    }
}

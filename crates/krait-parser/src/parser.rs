//! The PEG parser.
//!
//! Grammar rules are methods on [`Parser`]: each consumes tokens from the
//! current cursor position and either returns a node with the cursor
//! advanced, or an error. Ordered choice is expressed with an explicit
//! checkpoint/rewind pair, and the rules that get retried after a rewind
//! (`expression`, `star_expressions`) memoize their outcome per position so
//! backtracking stays linear.
//!
//! The grammar itself follows CPython's PEG grammar for 3.12, minus the
//! constructs the toolchain does not model (complex literals, `\N{...}`
//! escapes).
//!
//! Submodules split the rule set by family:
//! - [`expr`]: the operator-precedence ladder, atoms, displays, f-strings
//! - [`stmt`]: simple and compound statements, parameters, targets
//! - [`pattern`]: `match` patterns

use krait_ast::{Expr, Module, SourceLocation, Stmt};
use rustc_hash::FxHashMap;

use crate::error::ParseError;
use crate::token::{Token, TokenKind, TokenValue};

mod expr;
mod pattern;
mod stmt;

/// Rules that participate in packrat memoization. Only rules that are
/// re-attempted at the same position after a rewind are worth caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RuleId {
    Expression,
    StarExpressions,
}

/// A memoized rule outcome: the produced node plus the cursor after it, or
/// the failure the rule produced.
#[derive(Debug, Clone)]
pub(crate) enum MemoEntry {
    Success(Expr, u32),
    Failure(ParseError),
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Packrat cache, keyed by `(rule, position)`. Lives for one parse.
    memo: FxHashMap<(RuleId, u32), MemoEntry>,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(
            tokens.last().map(|t| t.kind),
            Some(TokenKind::EndMarker)
        ));
        Parser {
            tokens,
            pos: 0,
            memo: FxHashMap::default(),
        }
    }

    /// Parse a whole module: statements up to `EndMarker`.
    pub(crate) fn parse_module(mut self) -> Result<Module, ParseError> {
        let location = SourceLocation::new(1, 0);
        let mut body: Vec<Stmt> = Vec::new();
        loop {
            while self.eat(TokenKind::Newline) {}
            if self.at(TokenKind::EndMarker) {
                break;
            }
            self.statement_into(&mut body)?;
        }
        Ok(Module { body, location })
    }

    /// Parse a single expression (the `eval` entry point): an expression
    /// followed by nothing else.
    pub(crate) fn parse_expression_only(mut self) -> Result<Expr, ParseError> {
        let expr = self.star_expressions()?;
        self.eat(TokenKind::Newline);
        if !self.at(TokenKind::EndMarker) {
            return Err(self.error_here("unexpected tokens after expression"));
        }
        Ok(expr)
    }

    // -- cursor primitives --------------------------------------------------

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.current().kind
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    pub(crate) fn next_kind(&self) -> TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map_or(TokenKind::EndMarker, |t| t.kind)
    }

    pub(crate) fn location(&self) -> SourceLocation {
        self.current().location()
    }

    /// Consume and return the current token.
    pub(crate) fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.error_here(format!("expected {what}")))
        }
    }

    /// An identifier. Soft keywords (`match`, `case`, `type`) double as
    /// identifiers anywhere a plain name is expected.
    pub(crate) fn expect_name(&mut self, what: &str) -> Result<(String, SourceLocation), ParseError> {
        let location = self.location();
        match self.kind() {
            TokenKind::Name => {
                let token = self.bump();
                let TokenValue::Name(name) = token.value else {
                    unreachable!("name token always carries a Name value");
                };
                Ok((name, location))
            }
            kind if kind.is_soft_keyword() => {
                let token = self.bump();
                Ok((token.lexeme, location))
            }
            _ => Err(self.error_here(format!("expected {what}"))),
        }
    }

    pub(crate) fn at_name(&self) -> bool {
        self.at(TokenKind::Name) || self.kind().is_soft_keyword()
    }

    pub(crate) fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.current();
        ParseError::new(message, token.lexeme.clone(), token.location())
    }

    // -- backtracking -------------------------------------------------------

    pub(crate) fn checkpoint(&self) -> usize {
        self.pos
    }

    pub(crate) fn rewind(&mut self, checkpoint: usize) {
        self.pos = checkpoint;
    }

    /// Run a memoized rule: on a cache hit, replay the recorded outcome; on
    /// a miss, run the rule and record whatever it produced.
    pub(crate) fn memoized(
        &mut self,
        rule: RuleId,
        f: impl FnOnce(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let key = (rule, self.pos as u32);
        if let Some(entry) = self.memo.get(&key) {
            return match entry.clone() {
                MemoEntry::Success(expr, end) => {
                    self.pos = end as usize;
                    Ok(expr)
                }
                MemoEntry::Failure(error) => Err(error),
            };
        }
        let result = f(self);
        let entry = match &result {
            Ok(expr) => MemoEntry::Success(expr.clone(), self.pos as u32),
            Err(error) => MemoEntry::Failure(error.clone()),
        };
        self.memo.insert(key, entry);
        result
    }
}

//! F-string and t-string tokenizer modes.
//!
//! Each `f"..."` / `t"..."` start pushes a context onto a stack; the top of
//! the stack decides whether the lexer is producing literal middle tokens or
//! regular tokens for an embedded expression. The decision is keyed off the
//! lexer's paren-nesting counter: the `{` that opens a replacement field
//! increments it, so "inside a replacement field" is exactly "nesting is
//! deeper than it was when this string started, adjusted for open format
//! specs".

use crate::token::{TokenFlags, TokenKind};

/// Whether a context belongs to an f-string or a t-string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterpolatedKind {
    FString,
    TString,
}

impl InterpolatedKind {
    pub(crate) const fn start_token(self) -> TokenKind {
        match self {
            InterpolatedKind::FString => TokenKind::FStringStart,
            InterpolatedKind::TString => TokenKind::TStringStart,
        }
    }

    pub(crate) const fn middle_token(self) -> TokenKind {
        match self {
            InterpolatedKind::FString => TokenKind::FStringMiddle,
            InterpolatedKind::TString => TokenKind::TStringMiddle,
        }
    }

    pub(crate) const fn end_token(self) -> TokenKind {
        match self {
            InterpolatedKind::FString => TokenKind::FStringEnd,
            InterpolatedKind::TString => TokenKind::TStringEnd,
        }
    }
}

/// One active f-/t-string.
#[derive(Debug, Clone)]
pub(crate) struct FStringContext {
    kind: InterpolatedKind,
    quote_char: char,
    triple: bool,
    raw: bool,
    /// The lexer's paren-nesting level when the string started.
    nesting: u32,
    /// How many format specs are open, innermost last. Each open spec shifts
    /// the "top level" of the current replacement field one paren deeper.
    format_spec_depth: u32,
}

impl FStringContext {
    /// Build a context from the start token's flags. Returns `None` when the
    /// flags describe a plain string.
    pub(crate) fn new(flags: TokenFlags, nesting: u32) -> Option<Self> {
        let kind = if flags.contains(TokenFlags::FSTRING) {
            InterpolatedKind::FString
        } else if flags.contains(TokenFlags::TSTRING) {
            InterpolatedKind::TString
        } else {
            return None;
        };
        Some(FStringContext {
            kind,
            quote_char: flags.quote_char(),
            triple: flags.is_triple_quoted(),
            raw: flags.is_raw(),
            nesting,
            format_spec_depth: 0,
        })
    }

    pub(crate) fn kind(&self) -> InterpolatedKind {
        self.kind
    }

    pub(crate) fn quote_char(&self) -> char {
        self.quote_char
    }

    pub(crate) fn is_triple_quoted(&self) -> bool {
        self.triple
    }

    pub(crate) fn is_raw(&self) -> bool {
        self.raw
    }

    pub(crate) fn nesting(&self) -> u32 {
        self.nesting
    }

    pub(crate) fn flags(&self) -> TokenFlags {
        let mut flags = match self.kind {
            InterpolatedKind::FString => TokenFlags::FSTRING,
            InterpolatedKind::TString => TokenFlags::TSTRING,
        };
        if self.raw {
            flags |= TokenFlags::RAW;
        }
        if self.triple {
            flags |= TokenFlags::TRIPLE_QUOTED;
        }
        if self.quote_char == '"' {
            flags |= TokenFlags::DOUBLE_QUOTES;
        }
        flags
    }

    /// True when the lexer is inside a replacement field's expression and
    /// should produce regular tokens.
    pub(crate) fn is_in_interpolation(&self, current_nesting: u32) -> bool {
        current_nesting > self.nesting + self.format_spec_depth
    }

    /// True when the lexer is inside a format spec and should produce middle
    /// tokens without treating `{{` / `}}` as escapes.
    pub(crate) fn is_in_format_spec(&self, current_nesting: u32) -> bool {
        self.format_spec_depth > 0 && current_nesting == self.nesting + self.format_spec_depth
    }

    /// A `:` starts a format spec only at the replacement field's own top
    /// level. Returns true (and records the spec) when it does.
    pub(crate) fn try_start_format_spec(&mut self, current_nesting: u32) -> bool {
        if current_nesting == self.nesting + self.format_spec_depth + 1 {
            self.format_spec_depth += 1;
            true
        } else {
            false
        }
    }

    /// A `}` closing the field that owns the innermost format spec ends that
    /// spec.
    pub(crate) fn try_end_format_spec(&mut self, current_nesting: u32) {
        if self.format_spec_depth > 0 && current_nesting == self.nesting + self.format_spec_depth {
            self.format_spec_depth -= 1;
        }
    }
}

/// The stack of active f-/t-strings.
#[derive(Debug, Clone, Default)]
pub(crate) struct FStrings {
    stack: Vec<FStringContext>,
}

impl FStrings {
    pub(crate) fn current(&self) -> Option<&FStringContext> {
        self.stack.last()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut FStringContext> {
        self.stack.last_mut()
    }

    pub(crate) fn push(&mut self, context: FStringContext) {
        self.stack.push(context);
    }

    pub(crate) fn pop(&mut self) -> Option<FStringContext> {
        self.stack.pop()
    }
}

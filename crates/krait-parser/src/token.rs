//! Token kinds and the token record produced by the tokenizer.

use krait_ast::SourceLocation;
use std::fmt;

bitflags::bitflags! {
    /// String-literal properties recorded on `String` / `FStringStart` /
    /// `TStringStart` tokens. Prefix letters may appear in any order and any
    /// case in the source; the flags normalize them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TokenFlags: u8 {
        const RAW = 1 << 0;
        const BYTES = 1 << 1;
        const UNICODE = 1 << 2;
        const FSTRING = 1 << 3;
        const TSTRING = 1 << 4;
        const TRIPLE_QUOTED = 1 << 5;
        const DOUBLE_QUOTES = 1 << 6;
    }
}

impl TokenFlags {
    pub fn is_raw(self) -> bool {
        self.contains(TokenFlags::RAW)
    }

    pub fn is_bytes(self) -> bool {
        self.contains(TokenFlags::BYTES)
    }

    pub fn is_interpolated(self) -> bool {
        self.intersects(TokenFlags::FSTRING | TokenFlags::TSTRING)
    }

    pub fn is_triple_quoted(self) -> bool {
        self.contains(TokenFlags::TRIPLE_QUOTED)
    }

    pub fn quote_char(self) -> char {
        if self.contains(TokenFlags::DOUBLE_QUOTES) { '"' } else { '\'' }
    }
}

/// The decoded payload of a token, where one exists.
///
/// `String` tokens carry the *raw* inner text (between the quotes); escape
/// decoding happens in [`crate::string`] when the parser builds the constant,
/// because decoding depends on the prefix flags. `FStringMiddle` text has
/// doubled braces already collapsed but escapes intact, for the same reason.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TokenValue {
    #[default]
    None,
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    FStringMiddle(String),
}

/// All token kinds.
///
/// `Match`, `Case`, and `Type` are soft keywords: the tokenizer always emits
/// the keyword kind and the parser decides from context whether to treat the
/// token as an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals and names
    Int,
    Float,
    String,
    Name,

    // f-string / t-string boundaries
    FStringStart,
    FStringMiddle,
    FStringEnd,
    TStringStart,
    TStringMiddle,
    TStringEnd,

    // Keywords
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Case,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    False,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Match,
    None,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    True,
    Try,
    Type,
    While,
    With,
    Yield,

    // Punctuation
    Lpar,
    Rpar,
    Lsqb,
    Rsqb,
    Lbrace,
    Rbrace,
    Comma,
    Colon,
    Semi,
    Dot,
    Ellipsis,
    Rarrow,
    /// `!` inside an f-string replacement field (conversion marker). Never
    /// produced outside one; `!=` always wins by longest match.
    Exclaim,

    // Operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    At,
    Amper,
    Vbar,
    CircumFlex,
    Tilde,
    LeftShift,
    RightShift,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    EqEqual,
    NotEqual,
    Equal,
    ColonEqual,

    // Augmented assignment
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    DoubleSlashEqual,
    PercentEqual,
    AtEqual,
    AmperEqual,
    VbarEqual,
    CircumflexEqual,
    LeftShiftEqual,
    RightShiftEqual,
    DoubleStarEqual,

    // Structure
    Newline,
    /// A newline inside parentheses; filtered out before parsing.
    NonLogicalNewline,
    Indent,
    Dedent,
    EndMarker,
}

impl TokenKind {
    /// Keywords that the parser may reinterpret as plain identifiers.
    pub fn is_soft_keyword(self) -> bool {
        matches!(self, TokenKind::Match | TokenKind::Case | TokenKind::Type)
    }

    /// The augmented-assignment operator kinds, in no particular order.
    pub fn is_aug_assign(self) -> bool {
        matches!(
            self,
            TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::SlashEqual
                | TokenKind::DoubleSlashEqual
                | TokenKind::PercentEqual
                | TokenKind::AtEqual
                | TokenKind::AmperEqual
                | TokenKind::VbarEqual
                | TokenKind::CircumflexEqual
                | TokenKind::LeftShiftEqual
                | TokenKind::RightShiftEqual
                | TokenKind::DoubleStarEqual
        )
    }

    /// Map an identifier to its keyword kind, if it is one.
    pub fn keyword(text: &str) -> Option<TokenKind> {
        Some(match text {
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            "True" => TokenKind::True,
            "and" => TokenKind::And,
            "as" => TokenKind::As,
            "assert" => TokenKind::Assert,
            "async" => TokenKind::Async,
            "await" => TokenKind::Await,
            "break" => TokenKind::Break,
            "case" => TokenKind::Case,
            "class" => TokenKind::Class,
            "continue" => TokenKind::Continue,
            "def" => TokenKind::Def,
            "del" => TokenKind::Del,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "except" => TokenKind::Except,
            "finally" => TokenKind::Finally,
            "for" => TokenKind::For,
            "from" => TokenKind::From,
            "global" => TokenKind::Global,
            "if" => TokenKind::If,
            "import" => TokenKind::Import,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "lambda" => TokenKind::Lambda,
            "match" => TokenKind::Match,
            "nonlocal" => TokenKind::Nonlocal,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "pass" => TokenKind::Pass,
            "raise" => TokenKind::Raise,
            "return" => TokenKind::Return,
            "try" => TokenKind::Try,
            "type" => TokenKind::Type,
            "while" => TokenKind::While,
            "with" => TokenKind::With,
            "yield" => TokenKind::Yield,
            _ => return Option::None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{self:?}"))
    }
}

/// One token: kind, raw lexeme, decoded value, and source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub value: TokenValue,
    pub flags: TokenFlags,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

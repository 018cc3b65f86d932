//! The tokenizer.
//!
//! Source text goes in, a finite token stream terminated by `EndMarker` comes
//! out. The lexer is context-sensitive in two ways: an indentation stack
//! synthesizes `Indent`/`Dedent` tokens at the start of logical lines, and a
//! stack of f-/t-string contexts switches the lexer between literal-middle
//! mode and regular-token mode inside replacement fields.
//!
//! Errors are fatal: the first [`LexError`] stops tokenization.

use std::cmp::Ordering;

use krait_ast::SourceLocation;

use crate::error::{LexError, LexErrorKind};
use crate::lexer::cursor::{Cursor, EOF_CHAR};
use crate::lexer::fstring::{FStringContext, FStrings};
use crate::lexer::indentation::{Indentation, Indentations};
use crate::token::{Token, TokenFlags, TokenKind, TokenValue};

mod cursor;
mod fstring;
mod indentation;

/// Tokenize a whole source file.
///
/// The returned stream contains every synthesized token (`Newline`, `Indent`,
/// `Dedent`, `EndMarker`) but no comments and no non-logical newlines: those
/// never reach the parser.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        if token.kind == TokenKind::NonLogicalNewline {
            continue;
        }
        let done = token.kind == TokenKind::EndMarker;
        tokens.push(token);
        if done {
            break;
        }
    }
    Ok(tokens)
}

#[derive(Copy, Clone, Debug)]
enum State {
    /// At the start of the file or right after a logical newline.
    AfterNewline,
    /// At the start of a logical line, after its indentation.
    NonEmptyLogicalLine,
    /// Inside a logical line.
    Other,
}

impl State {
    const fn is_after_newline(self) -> bool {
        matches!(self, State::AfterNewline)
    }

    const fn is_new_logical_line(self) -> bool {
        matches!(self, State::AfterNewline | State::NonEmptyLogicalLine)
    }
}

struct Lexer<'src> {
    source: &'src str,
    cursor: Cursor<'src>,
    state: State,
    /// Open `(`/`[`/`{` count. Newlines are non-logical while it is nonzero.
    nesting: u32,
    indentations: Indentations,
    pending_indentation: Option<Indentation>,
    fstrings: FStrings,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str) -> Self {
        let mut cursor = Cursor::new(source);
        // Skip a UTF-8 BOM if present.
        cursor.eat_char('\u{feff}');
        Lexer {
            source,
            cursor,
            state: State::AfterNewline,
            nesting: 0,
            indentations: Indentations::default(),
            pending_indentation: None,
            fstrings: FStrings::default(),
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.cursor.line(), self.cursor.column())
    }

    fn token_location(&self) -> SourceLocation {
        SourceLocation::new(self.cursor.token_line(), self.cursor.token_column())
    }

    fn error(&self, kind: LexErrorKind) -> LexError {
        LexError::new(kind, self.token_location())
    }

    /// Build a token spanning from the last `start_token` to the cursor.
    fn make(&self, kind: TokenKind, value: TokenValue, flags: TokenFlags) -> Token {
        Token {
            kind,
            lexeme: self.cursor.token_text().to_string(),
            value,
            flags,
            line: self.cursor.token_line(),
            column: self.cursor.token_column(),
        }
    }

    fn simple(&self, kind: TokenKind) -> Token {
        self.make(kind, TokenValue::None, TokenFlags::empty())
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            if let Some(token) = self.lex_token()? {
                return Ok(token);
            }
        }
    }

    /// Lex one token, or `None` when the lexer consumed trivia (a comment,
    /// an empty f-string middle, an unchanged indentation).
    fn lex_token(&mut self) -> Result<Option<Token>, LexError> {
        self.cursor.start_token();

        if self.fstrings.current().is_some() {
            let in_middle_mode = self
                .fstrings
                .current()
                .is_some_and(|context| !context.is_in_interpolation(self.nesting));
            if in_middle_mode {
                if let Some(token) = self.lex_fstring_middle_or_end()? {
                    if token.kind == TokenKind::FStringEnd || token.kind == TokenKind::TStringEnd {
                        self.fstrings.pop();
                    }
                    return Ok(Some(token));
                }
                // Empty middle: fall through to regular lexing (the next
                // character is `{` or `}`).
                self.cursor.start_token();
            }
        } else if let Some(indentation) = self.pending_indentation.take() {
            match self.indentations.current().try_compare(indentation) {
                Ok(Ordering::Greater) => {
                    self.pending_indentation = Some(indentation);
                    self.dedent_one(indentation)?;
                    return Ok(Some(self.simple(TokenKind::Dedent)));
                }
                Ok(_) => {}
                Err(_) => return Err(self.error(LexErrorKind::TabError)),
            }
        }

        if self.state.is_after_newline() {
            if let Some(token) = self.eat_indentation()? {
                return Ok(Some(token));
            }
        } else {
            self.skip_whitespace()?;
        }

        self.cursor.start_token();
        match self.cursor.bump() {
            Some(c) if c.is_ascii() => self.consume_ascii_character(c),
            Some(c) if unicode_ident::is_xid_start(c) => {
                let token = self.lex_identifier(c)?;
                self.state = State::Other;
                Ok(Some(token))
            }
            Some(c) => Err(self.error(LexErrorKind::UnrecognizedToken(c))),
            None => self.consume_end().map(Some),
        }
    }

    /// Pop one indentation level on the way down to `target`, erroring when
    /// the stack jumps past it.
    fn dedent_one(&mut self, target: Indentation) -> Result<(), LexError> {
        self.indentations.dedent();
        match self.indentations.current().try_compare(target) {
            Ok(Ordering::Less) => Err(self.error(LexErrorKind::DedentMismatch)),
            Ok(_) => Ok(()),
            Err(_) => Err(self.error(LexErrorKind::TabError)),
        }
    }

    /// Measure the indentation of a fresh logical line and emit at most one
    /// `Indent`/`Dedent` token (further dedents go through
    /// `pending_indentation`).
    fn eat_indentation(&mut self) -> Result<Option<Token>, LexError> {
        let mut indentation = Indentation::root();
        loop {
            match self.cursor.first() {
                ' ' => {
                    self.cursor.bump();
                    indentation = indentation.add_space();
                }
                '\t' => {
                    self.cursor.bump();
                    indentation = indentation.add_tab();
                }
                '\\' => {
                    self.cursor.bump();
                    if self.cursor.eat_char('\r') {
                        self.cursor.eat_char('\n');
                    } else if !self.cursor.eat_char('\n') {
                        return Err(self.error(LexErrorKind::LineContinuation));
                    }
                    if self.cursor.is_eof() {
                        return Err(self.error(LexErrorKind::UnexpectedEof));
                    }
                    indentation = Indentation::root();
                }
                '\x0c' => {
                    self.cursor.bump();
                    indentation = Indentation::root();
                }
                _ => break,
            }
        }

        // Blank and comment-only lines change nothing.
        if matches!(self.cursor.first(), '\n' | '\r' | '#' | EOF_CHAR) {
            return Ok(None);
        }

        self.state = State::NonEmptyLogicalLine;
        match self.indentations.current().try_compare(indentation) {
            Ok(Ordering::Greater) => {
                self.pending_indentation = Some(indentation);
                self.dedent_one(indentation)?;
                Ok(Some(self.simple(TokenKind::Dedent)))
            }
            Ok(Ordering::Equal) => Ok(None),
            Ok(Ordering::Less) => {
                self.indentations.indent(indentation);
                Ok(Some(self.simple(TokenKind::Indent)))
            }
            Err(_) => Err(self.error(LexErrorKind::TabError)),
        }
    }

    fn skip_whitespace(&mut self) -> Result<(), LexError> {
        loop {
            match self.cursor.first() {
                ' ' | '\t' | '\x0c' => {
                    self.cursor.bump();
                }
                '\\' => {
                    self.cursor.bump();
                    if self.cursor.eat_char('\r') {
                        self.cursor.eat_char('\n');
                    } else if !self.cursor.eat_char('\n') {
                        return Err(self.error(LexErrorKind::LineContinuation));
                    }
                    if self.cursor.is_eof() {
                        return Err(self.error(LexErrorKind::UnexpectedEof));
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn consume_ascii_character(&mut self, c: char) -> Result<Option<Token>, LexError> {
        let kind = match c {
            c if is_ascii_identifier_start(c) => {
                let token = self.lex_identifier(c)?;
                self.state = State::Other;
                return Ok(Some(token));
            }
            '0'..='9' => {
                let token = self.lex_number(c)?;
                self.state = State::Other;
                return Ok(Some(token));
            }
            '#' => {
                self.lex_comment();
                return Ok(None);
            }
            '\'' | '"' => {
                let token = self.lex_string(c, TokenFlags::empty())?;
                self.state = State::Other;
                return Ok(Some(token));
            }

            '=' => {
                if self.cursor.eat_char('=') {
                    TokenKind::EqEqual
                } else {
                    TokenKind::Equal
                }
            }
            '+' => {
                if self.cursor.eat_char('=') {
                    TokenKind::PlusEqual
                } else {
                    TokenKind::Plus
                }
            }
            '*' => {
                if self.cursor.eat_char('=') {
                    TokenKind::StarEqual
                } else if self.cursor.eat_char('*') {
                    if self.cursor.eat_char('=') {
                        TokenKind::DoubleStarEqual
                    } else {
                        TokenKind::DoubleStar
                    }
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.cursor.eat_char('=') {
                    TokenKind::SlashEqual
                } else if self.cursor.eat_char('/') {
                    if self.cursor.eat_char('=') {
                        TokenKind::DoubleSlashEqual
                    } else {
                        TokenKind::DoubleSlash
                    }
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.cursor.eat_char('=') {
                    TokenKind::PercentEqual
                } else {
                    TokenKind::Percent
                }
            }
            '|' => {
                if self.cursor.eat_char('=') {
                    TokenKind::VbarEqual
                } else {
                    TokenKind::Vbar
                }
            }
            '^' => {
                if self.cursor.eat_char('=') {
                    TokenKind::CircumflexEqual
                } else {
                    TokenKind::CircumFlex
                }
            }
            '&' => {
                if self.cursor.eat_char('=') {
                    TokenKind::AmperEqual
                } else {
                    TokenKind::Amper
                }
            }
            '-' => {
                if self.cursor.eat_char('=') {
                    TokenKind::MinusEqual
                } else if self.cursor.eat_char('>') {
                    TokenKind::Rarrow
                } else {
                    TokenKind::Minus
                }
            }
            '@' => {
                if self.cursor.eat_char('=') {
                    TokenKind::AtEqual
                } else {
                    TokenKind::At
                }
            }
            '!' => {
                if self.cursor.eat_char('=') {
                    TokenKind::NotEqual
                } else if self
                    .fstrings
                    .current()
                    .is_some_and(|context| context.is_in_interpolation(self.nesting))
                {
                    TokenKind::Exclaim
                } else {
                    return Err(self.error(LexErrorKind::UnrecognizedToken('!')));
                }
            }
            '~' => TokenKind::Tilde,
            '(' => {
                self.nesting += 1;
                TokenKind::Lpar
            }
            ')' => {
                self.nesting = self.nesting.saturating_sub(1);
                TokenKind::Rpar
            }
            '[' => {
                self.nesting += 1;
                TokenKind::Lsqb
            }
            ']' => {
                self.nesting = self.nesting.saturating_sub(1);
                TokenKind::Rsqb
            }
            '{' => {
                self.nesting += 1;
                TokenKind::Lbrace
            }
            '}' => {
                let nesting = self.nesting;
                if let Some(context_nesting) = self.fstrings.current().map(FStringContext::nesting)
                {
                    if context_nesting == nesting {
                        return Err(self.error(LexErrorKind::SingleRbrace));
                    }
                    if let Some(context) = self.fstrings.current_mut() {
                        context.try_end_format_spec(nesting);
                    }
                }
                self.nesting = self.nesting.saturating_sub(1);
                TokenKind::Rbrace
            }
            ':' => {
                let nesting = self.nesting;
                if self
                    .fstrings
                    .current_mut()
                    .is_some_and(|context| context.try_start_format_spec(nesting))
                {
                    TokenKind::Colon
                } else if self.cursor.eat_char('=') {
                    TokenKind::ColonEqual
                } else {
                    TokenKind::Colon
                }
            }
            ';' => TokenKind::Semi,
            '<' => {
                if self.cursor.eat_char('<') {
                    if self.cursor.eat_char('=') {
                        TokenKind::LeftShiftEqual
                    } else {
                        TokenKind::LeftShift
                    }
                } else if self.cursor.eat_char('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.cursor.eat_char('>') {
                    if self.cursor.eat_char('=') {
                        TokenKind::RightShiftEqual
                    } else {
                        TokenKind::RightShift
                    }
                } else if self.cursor.eat_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            ',' => TokenKind::Comma,
            '.' => {
                if self.cursor.first().is_ascii_digit() {
                    let token = self.lex_decimal_number('.')?;
                    self.state = State::Other;
                    return Ok(Some(token));
                } else if self.cursor.eat_char2('.', '.') {
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            '\n' | '\r' => {
                if c == '\r' {
                    self.cursor.eat_char('\n');
                }
                return if self.nesting == 0 && !self.state.is_new_logical_line() {
                    self.state = State::AfterNewline;
                    Ok(Some(self.simple(TokenKind::Newline)))
                } else {
                    let nesting = self.nesting;
                    if let Some(context) = self.fstrings.current_mut() {
                        context.try_end_format_spec(nesting);
                    }
                    Ok(Some(self.simple(TokenKind::NonLogicalNewline)))
                };
            }
            c => {
                self.state = State::Other;
                return Err(self.error(LexErrorKind::UnrecognizedToken(c)));
            }
        };

        self.state = State::Other;
        Ok(Some(self.simple(kind)))
    }

    /// Lex an identifier, a keyword, or a prefixed string literal.
    fn lex_identifier(&mut self, first: char) -> Result<Token, LexError> {
        // A string prefix is an identifier-looking run directly followed by a
        // quote: r'' b"" fr'' and friends.
        let prefix_flags = match (first, self.cursor.first()) {
            (_, quote @ ('\'' | '"')) => single_char_prefix(first).map(|flags| {
                self.cursor.bump();
                (flags, quote)
            }),
            (_, second) if is_quote(self.cursor.second()) => {
                double_char_prefix([first, second]).map(|flags| {
                    self.cursor.bump();
                    let quote = self.cursor.bump().expect("quote checked above");
                    (flags, quote)
                })
            }
            _ => None,
        };

        if let Some((flags, quote)) = prefix_flags {
            if flags.is_interpolated() {
                return self.lex_fstring_start(quote, flags);
            }
            return self.lex_string(quote, flags);
        }

        self.cursor
            .eat_while(|c| c.is_ascii_alphanumeric() || c == '_' || unicode_ident::is_xid_continue(c));

        let text = self.cursor.token_text();

        // An identifier made of prefix letters running into a quote is a
        // malformed string prefix (`bf''`, `ub''`), not implicit
        // concatenation.
        if is_quote(self.cursor.first())
            && text.len() <= 3
            && text
                .chars()
                .all(|c| matches!(c.to_ascii_lowercase(), 'r' | 'b' | 'u' | 'f' | 't'))
        {
            return Err(self.error(LexErrorKind::InvalidStringPrefix(text.to_string())));
        }

        if let Some(keyword) = TokenKind::keyword(text) {
            Ok(self.simple(keyword))
        } else {
            Ok(self.make(
                TokenKind::Name,
                TokenValue::Name(text.to_string()),
                TokenFlags::empty(),
            ))
        }
    }

    /// Lex the opening of an f-string or t-string and push its context.
    fn lex_fstring_start(&mut self, quote: char, mut flags: TokenFlags) -> Result<Token, LexError> {
        if quote == '"' {
            flags |= TokenFlags::DOUBLE_QUOTES;
        }
        if self.cursor.eat_char2(quote, quote) {
            flags |= TokenFlags::TRIPLE_QUOTED;
        }
        let context = FStringContext::new(flags, self.nesting)
            .expect("flags carry an interpolated-string bit");
        let kind = context.kind().start_token();
        self.fstrings.push(context);
        Ok(self.make(kind, TokenValue::None, flags))
    }

    /// Lex one f-/t-string middle token, the end token, or nothing when the
    /// cursor sits directly on `{` / `}`.
    fn lex_fstring_middle_or_end(&mut self) -> Result<Option<Token>, LexError> {
        let context = self
            .fstrings
            .current()
            .expect("called only with an active context")
            .clone();

        // End of the string?
        if context.is_triple_quoted() {
            let q = context.quote_char();
            if self.cursor.eat_char3(q, q, q) {
                return Ok(Some(self.make(
                    context.kind().end_token(),
                    TokenValue::None,
                    context.flags(),
                )));
            }
        } else if self.cursor.eat_char(context.quote_char()) {
            return Ok(Some(self.make(
                context.kind().end_token(),
                TokenValue::None,
                context.flags(),
            )));
        }

        // Doubled braces decode to single braces; everything else of the
        // middle is kept raw (escape decoding happens in `string`).
        let mut normalized = String::new();
        let mut last_offset = self.cursor.offset();
        let in_format_spec = context.is_in_format_spec(self.nesting);
        let mut in_named_unicode = false;

        loop {
            match self.cursor.first() {
                EOF_CHAR if self.cursor.is_eof() => {
                    return Err(self.error(if context.is_triple_quoted() {
                        LexErrorKind::UnterminatedTripleQuotedString
                    } else {
                        LexErrorKind::UnterminatedString
                    }));
                }
                '\n' | '\r' if !context.is_triple_quoted() => {
                    return Err(self.error(if in_format_spec {
                        LexErrorKind::NewlineInFormatSpec
                    } else {
                        LexErrorKind::UnterminatedString
                    }));
                }
                '\\' => {
                    self.cursor.bump();
                    if matches!(self.cursor.first(), '{' | '}') {
                        // The brace is handled by the next iteration so that
                        // it can still open or close a replacement field.
                        continue;
                    }
                    if !context.is_raw() && self.cursor.first() == 'N' && self.cursor.second() == '{'
                    {
                        self.cursor.bump();
                        self.cursor.bump();
                        in_named_unicode = true;
                        continue;
                    }
                    if self.cursor.eat_char('\r') {
                        self.cursor.eat_char('\n');
                    } else {
                        self.cursor.bump();
                    }
                }
                quote @ ('\'' | '"') if quote == context.quote_char() => {
                    if context.is_triple_quoted() {
                        let q = context.quote_char();
                        if self.cursor.rest().starts_with(&format!("{q}{q}{q}")) {
                            break;
                        }
                        self.cursor.bump();
                    } else {
                        break;
                    }
                }
                '{' => {
                    if self.cursor.second() == '{' && !in_format_spec {
                        self.cursor.bump();
                        normalized.push_str(&self.source[last_offset..self.cursor.offset()]);
                        self.cursor.bump();
                        last_offset = self.cursor.offset();
                    } else {
                        break;
                    }
                }
                '}' => {
                    if in_named_unicode {
                        in_named_unicode = false;
                        self.cursor.bump();
                    } else if self.cursor.second() == '}' && !in_format_spec {
                        self.cursor.bump();
                        normalized.push_str(&self.source[last_offset..self.cursor.offset()]);
                        self.cursor.bump();
                        last_offset = self.cursor.offset();
                    } else {
                        break;
                    }
                }
                _ => {
                    self.cursor.bump();
                }
            }
        }

        if self.cursor.offset() == self.cursor.token_start() {
            return Ok(None);
        }

        let value = if normalized.is_empty() {
            self.cursor.token_text().to_string()
        } else {
            normalized.push_str(&self.source[last_offset..self.cursor.offset()]);
            normalized
        };

        Ok(Some(self.make(
            context.kind().middle_token(),
            TokenValue::FStringMiddle(value),
            context.flags(),
        )))
    }

    /// Lex a plain (non-interpolated) string or bytes literal. The token
    /// value is the raw inner text; escapes are decoded later.
    fn lex_string(&mut self, quote: char, mut flags: TokenFlags) -> Result<Token, LexError> {
        if quote == '"' {
            flags |= TokenFlags::DOUBLE_QUOTES;
        }
        if self.cursor.eat_char2(quote, quote) {
            flags |= TokenFlags::TRIPLE_QUOTED;
        }

        let value_start = self.cursor.offset();
        let quote_byte = quote as u8;

        let value_end = if flags.is_triple_quoted() {
            loop {
                let Some(index) = memchr::memchr(quote_byte, self.cursor.rest().as_bytes()) else {
                    self.cursor.skip_to_end();
                    return Err(self.error(LexErrorKind::UnterminatedTripleQuotedString));
                };
                let num_backslashes = self.cursor.rest().as_bytes()[..index]
                    .iter()
                    .rev()
                    .take_while(|&&b| b == b'\\')
                    .count();
                self.cursor.skip_bytes(index + 1);
                if num_backslashes % 2 == 1 {
                    continue;
                }
                if self.cursor.eat_char2(quote, quote) {
                    break self.cursor.offset() - 3;
                }
            }
        } else {
            loop {
                let Some(index) =
                    memchr::memchr3(quote_byte, b'\r', b'\n', self.cursor.rest().as_bytes())
                else {
                    self.cursor.skip_to_end();
                    return Err(self.error(LexErrorKind::UnterminatedString));
                };
                let num_backslashes = self.cursor.rest().as_bytes()[..index]
                    .iter()
                    .rev()
                    .take_while(|&&b| b == b'\\')
                    .count();
                self.cursor.skip_bytes(index);
                let next = self.cursor.first();
                if num_backslashes % 2 == 1 {
                    self.cursor.bump();
                    if next == '\r' {
                        self.cursor.eat_char('\n');
                    }
                    continue;
                }
                match next {
                    '\r' | '\n' => {
                        return Err(self.error(LexErrorKind::UnterminatedString));
                    }
                    c if c == quote => {
                        let end = self.cursor.offset();
                        self.cursor.bump();
                        break end;
                    }
                    _ => unreachable!("memchr3 stops on a quote or newline"),
                }
            }
        };

        Ok(self.make(
            TokenKind::String,
            TokenValue::Str(self.source[value_start..value_end].to_string()),
            flags,
        ))
    }

    fn lex_number(&mut self, first: char) -> Result<Token, LexError> {
        if first == '0' {
            if self.cursor.eat_if(|c| matches!(c, 'x' | 'X')).is_some() {
                self.lex_number_radix(16)
            } else if self.cursor.eat_if(|c| matches!(c, 'o' | 'O')).is_some() {
                self.lex_number_radix(8)
            } else if self.cursor.eat_if(|c| matches!(c, 'b' | 'B')).is_some() {
                self.lex_number_radix(2)
            } else {
                self.lex_decimal_number(first)
            }
        } else {
            self.lex_decimal_number(first)
        }
    }

    fn lex_number_radix(&mut self, radix: u32) -> Result<Token, LexError> {
        let mut digits = String::new();
        self.radix_run(&mut digits, radix);
        if digits.is_empty() {
            return Err(self.error(LexErrorKind::InvalidNumber(format!(
                "missing digits after `{}`",
                self.cursor.token_text()
            ))));
        }
        let value = i64::from_str_radix(&digits, radix).map_err(|_| {
            self.error(LexErrorKind::InvalidNumber(
                "integer literal too large".to_string(),
            ))
        })?;
        Ok(self.make(TokenKind::Int, TokenValue::Int(value), TokenFlags::empty()))
    }

    fn lex_decimal_number(&mut self, first: char) -> Result<Token, LexError> {
        let start_is_zero = first == '0';
        let mut number = String::new();
        if first != '.' {
            number.push(first);
            self.radix_run(&mut number, 10);
        }

        let mut is_float = false;
        if first == '.' || self.cursor.eat_char('.') {
            number.push('.');
            if self.cursor.first() == '_' {
                return Err(self.error(LexErrorKind::InvalidNumber(
                    "digit separator after decimal point".to_string(),
                )));
            }
            self.radix_run(&mut number, 10);
            is_float = true;
        }

        match self.cursor.rest().as_bytes() {
            [b'e' | b'E', b'0'..=b'9', ..] | [b'e' | b'E', b'-' | b'+', b'0'..=b'9', ..] => {
                number.push(self.cursor.bump().expect("exponent marker"));
                if let Some(sign) = self.cursor.eat_if(|c| matches!(c, '+' | '-')) {
                    number.push(sign);
                }
                self.radix_run(&mut number, 10);
                is_float = true;
            }
            _ => {}
        }

        // No complex constants in this toolchain.
        if self.cursor.eat_if(|c| matches!(c, 'j' | 'J')).is_some() {
            return Err(self.error(LexErrorKind::InvalidNumber(
                "imaginary literals are not supported".to_string(),
            )));
        }

        if is_float {
            let value: f64 = number.parse().map_err(|_| {
                self.error(LexErrorKind::InvalidNumber(
                    "invalid decimal literal".to_string(),
                ))
            })?;
            Ok(self.make(TokenKind::Float, TokenValue::Float(value), TokenFlags::empty()))
        } else {
            let value: i64 = number.parse().map_err(|_| {
                self.error(LexErrorKind::InvalidNumber(
                    "integer literal too large".to_string(),
                ))
            })?;
            if start_is_zero && value != 0 {
                return Err(self.error(LexErrorKind::InvalidNumber(
                    "leading zeros in decimal integer literals are not permitted".to_string(),
                )));
            }
            Ok(self.make(TokenKind::Int, TokenValue::Int(value), TokenFlags::empty()))
        }
    }

    /// Consume digits in the given radix, allowing `_` separators between
    /// digits.
    fn radix_run(&mut self, digits: &mut String, radix: u32) {
        loop {
            if let Some(c) = self.cursor.eat_if(|c| c.is_digit(radix)) {
                digits.push(c);
            } else if self.cursor.first() == '_' && self.cursor.second().is_digit(radix) {
                self.cursor.bump();
            } else {
                break;
            }
        }
    }

    fn lex_comment(&mut self) {
        let bytes = self.cursor.rest().as_bytes();
        let offset = memchr::memchr2(b'\n', b'\r', bytes).unwrap_or(bytes.len());
        self.cursor.skip_bytes(offset);
    }

    fn consume_end(&mut self) -> Result<Token, LexError> {
        if self.fstrings.pop().is_some() {
            return Err(self.error(LexErrorKind::UnterminatedString));
        }
        if self.nesting > 0 {
            self.nesting = 0;
            return Err(self.error(LexErrorKind::UnexpectedEof));
        }
        if !self.state.is_new_logical_line() {
            self.state = State::AfterNewline;
            Ok(self.simple(TokenKind::Newline))
        } else if self.indentations.dedent().is_some() {
            Ok(self.simple(TokenKind::Dedent))
        } else {
            Ok(self.simple(TokenKind::EndMarker))
        }
    }
}

const fn is_quote(c: char) -> bool {
    matches!(c, '\'' | '"')
}

const fn is_ascii_identifier_start(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '_')
}

/// Map a one-letter string prefix to its flags.
fn single_char_prefix(c: char) -> Option<TokenFlags> {
    Some(match c {
        'f' | 'F' => TokenFlags::FSTRING,
        't' | 'T' => TokenFlags::TSTRING,
        'u' | 'U' => TokenFlags::UNICODE,
        'b' | 'B' => TokenFlags::BYTES,
        'r' | 'R' => TokenFlags::RAW,
        _ => return None,
    })
}

/// Map a two-letter string prefix to its flags. Only `r` combines with
/// another letter; `b`/`u`/`f`/`t` are mutually exclusive.
fn double_char_prefix(chars: [char; 2]) -> Option<TokenFlags> {
    Some(match chars {
        ['r' | 'R', 'f' | 'F'] | ['f' | 'F', 'r' | 'R'] => TokenFlags::FSTRING | TokenFlags::RAW,
        ['r' | 'R', 't' | 'T'] | ['t' | 'T', 'r' | 'R'] => TokenFlags::TSTRING | TokenFlags::RAW,
        ['r' | 'R', 'b' | 'B'] | ['b' | 'B', 'r' | 'R'] => TokenFlags::BYTES | TokenFlags::RAW,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenization should succeed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn simple_assignment() {
        assert_eq!(
            kinds("x = 1\n"),
            vec![
                TokenKind::Name,
                TokenKind::Equal,
                TokenKind::Int,
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
    }

    #[test]
    fn augmented_operators_longest_match() {
        assert_eq!(
            kinds("x **= 2; x //= 3; x <<= 4; x >= 5\n"),
            vec![
                TokenKind::Name,
                TokenKind::DoubleStarEqual,
                TokenKind::Int,
                TokenKind::Semi,
                TokenKind::Name,
                TokenKind::DoubleSlashEqual,
                TokenKind::Int,
                TokenKind::Semi,
                TokenKind::Name,
                TokenKind::LeftShiftEqual,
                TokenKind::Int,
                TokenKind::Semi,
                TokenKind::Name,
                TokenKind::GreaterEqual,
                TokenKind::Int,
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
    }

    #[test]
    fn indent_dedent_balance() {
        let tokens = tokenize("if x:\n    y = 1\n    z = 2\nw = 3\n").unwrap();
        let indents = tokens.iter().filter(|t| t.kind == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(indents, 1);
        assert_eq!(indents, dedents);
    }

    #[test]
    fn dedents_flushed_at_eof() {
        let tokens = tokenize("if x:\n    if y:\n        pass").unwrap();
        let indents = tokens.iter().filter(|t| t.kind == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(indents, dedents);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::EndMarker);
    }

    #[test]
    fn dedent_to_unknown_level_errors() {
        let err = tokenize("if x:\n    pass\n  y = 1\n").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::DedentMismatch);
    }

    #[test]
    fn blank_and_comment_lines_produce_no_tokens() {
        assert_eq!(
            kinds("x = 1\n\n# comment\n\ny = 2\n"),
            vec![
                TokenKind::Name,
                TokenKind::Equal,
                TokenKind::Int,
                TokenKind::Newline,
                TokenKind::Name,
                TokenKind::Equal,
                TokenKind::Int,
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
    }

    #[test]
    fn implicit_line_joining_inside_parens() {
        assert_eq!(
            kinds("x = (1 +\n     2)\n"),
            vec![
                TokenKind::Name,
                TokenKind::Equal,
                TokenKind::Lpar,
                TokenKind::Int,
                TokenKind::Plus,
                TokenKind::Int,
                TokenKind::Rpar,
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
    }

    #[test]
    fn fstring_with_format_spec() {
        // The `:` at the field's top level switches to format-spec mode.
        assert_eq!(
            kinds("f\"{value:.2f}\"\n"),
            vec![
                TokenKind::FStringStart,
                TokenKind::Lbrace,
                TokenKind::Name,
                TokenKind::Colon,
                TokenKind::FStringMiddle,
                TokenKind::Rbrace,
                TokenKind::FStringEnd,
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
    }

    #[test]
    fn fstring_nested_spec_field() {
        // The inner `{w}` interrupts the format spec and re-enters it.
        assert_eq!(
            kinds("f\"{x:{w}}\"\n"),
            vec![
                TokenKind::FStringStart,
                TokenKind::Lbrace,
                TokenKind::Name,
                TokenKind::Colon,
                TokenKind::Lbrace,
                TokenKind::Name,
                TokenKind::Rbrace,
                TokenKind::Rbrace,
                TokenKind::FStringEnd,
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
    }

    #[test]
    fn fstring_doubled_braces_are_literal() {
        let tokens = tokenize("f\"a{{b}}c\"\n").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::FStringMiddle);
        assert_eq!(tokens[1].value, TokenValue::FStringMiddle("a{b}c".to_string()));
        assert_eq!(tokens[2].kind, TokenKind::FStringEnd);
    }

    #[test]
    fn fstring_conversion_marker() {
        assert_eq!(
            kinds("f\"{x!r}\"\n"),
            vec![
                TokenKind::FStringStart,
                TokenKind::Lbrace,
                TokenKind::Name,
                TokenKind::Exclaim,
                TokenKind::Name,
                TokenKind::Rbrace,
                TokenKind::FStringEnd,
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
    }

    #[test]
    fn single_rbrace_in_fstring_errors() {
        let err = tokenize("f\"}\"\n").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::SingleRbrace);
    }

    #[test]
    fn unterminated_string_errors() {
        let err = tokenize("x = 'abc\n").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
    }

    #[test]
    fn invalid_prefix_combination_errors() {
        let err = tokenize("bf''\n").unwrap_err();
        assert!(matches!(err.kind, LexErrorKind::InvalidStringPrefix(_)));
    }

    #[test]
    fn number_lexemes() {
        let tokens = tokenize("0xff 0o17 0b101 1_000 3.14 1e10 .5\n").unwrap();
        let values: Vec<&TokenValue> = tokens.iter().map(|t| &t.value).collect();
        assert_eq!(values[0], &TokenValue::Int(255));
        assert_eq!(values[1], &TokenValue::Int(15));
        assert_eq!(values[2], &TokenValue::Int(5));
        assert_eq!(values[3], &TokenValue::Int(1000));
        assert_eq!(values[4], &TokenValue::Float(3.14));
        assert_eq!(values[5], &TokenValue::Float(1e10));
        assert_eq!(values[6], &TokenValue::Float(0.5));
    }

    #[test]
    fn line_and_column_positions() {
        let tokens = tokenize("x = 1\ny = 2\n").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 0));
        assert_eq!((tokens[4].line, tokens[4].column), (2, 0));
        assert_eq!((tokens[6].line, tokens[6].column), (2, 4));
    }

    #[test]
    fn tstring_tokens() {
        assert_eq!(
            kinds("t\"{x}\"\n"),
            vec![
                TokenKind::TStringStart,
                TokenKind::Lbrace,
                TokenKind::Name,
                TokenKind::Rbrace,
                TokenKind::TStringEnd,
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
    }
}

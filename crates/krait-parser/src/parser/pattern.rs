//! `match` statement patterns (PEP 634): literal, capture, wildcard, value,
//! sequence, mapping, class, star, and or-patterns.

use krait_ast::{
    ConstantValue, Expr, ExprAttribute, ExprConstant, ExprContext, ExprName, ExprUnaryOp, Pattern,
    PatternMatchAs, PatternMatchClass, PatternMatchMapping, PatternMatchOr, PatternMatchSequence,
    PatternMatchSingleton, PatternMatchStar, PatternMatchValue, SourceLocation, UnaryOp,
};

use crate::error::ParseError;
use crate::parser::Parser;
use crate::token::{TokenKind, TokenValue};

impl Parser {
    /// The pattern of a `case` clause: an open sequence (`case a, b:`) or a
    /// single pattern.
    pub(crate) fn patterns(&mut self) -> Result<Pattern, ParseError> {
        let location = self.location();
        let first = self.maybe_star_pattern()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut patterns = vec![first];
        while self.eat(TokenKind::Comma) {
            if matches!(self.kind(), TokenKind::Colon | TokenKind::If) {
                break;
            }
            patterns.push(self.maybe_star_pattern()?);
        }
        Ok(Pattern::MatchSequence(PatternMatchSequence {
            patterns,
            location,
        }))
    }

    /// A sequence element: `*rest` or a regular pattern.
    fn maybe_star_pattern(&mut self) -> Result<Pattern, ParseError> {
        if self.at(TokenKind::Star) {
            let location = self.location();
            self.bump();
            let (name, _) = self.expect_name("name after `*`")?;
            let name = if name == "_" { None } else { Some(name) };
            return Ok(Pattern::MatchStar(PatternMatchStar { name, location }));
        }
        self.pattern()
    }

    /// `or_pattern ['as' name]`.
    fn pattern(&mut self) -> Result<Pattern, ParseError> {
        let location = self.location();
        let pattern = self.or_pattern()?;
        if self.eat(TokenKind::As) {
            let (name, name_location) = self.expect_name("name after `as`")?;
            if name == "_" {
                return Err(ParseError::new(
                    "cannot use `_` as a capture target",
                    name,
                    name_location,
                ));
            }
            return Ok(Pattern::MatchAs(PatternMatchAs {
                pattern: Some(Box::new(pattern)),
                name: Some(name),
                location,
            }));
        }
        Ok(pattern)
    }

    fn or_pattern(&mut self) -> Result<Pattern, ParseError> {
        let location = self.location();
        let first = self.closed_pattern()?;
        if !self.at(TokenKind::Vbar) {
            return Ok(first);
        }
        let mut patterns = vec![first];
        while self.eat(TokenKind::Vbar) {
            patterns.push(self.closed_pattern()?);
        }
        Ok(Pattern::MatchOr(PatternMatchOr { patterns, location }))
    }

    fn closed_pattern(&mut self) -> Result<Pattern, ParseError> {
        let location = self.location();
        match self.kind() {
            TokenKind::None => {
                self.bump();
                Ok(Pattern::MatchSingleton(PatternMatchSingleton {
                    value: ConstantValue::None,
                    location,
                }))
            }
            TokenKind::True => {
                self.bump();
                Ok(Pattern::MatchSingleton(PatternMatchSingleton {
                    value: ConstantValue::Bool(true),
                    location,
                }))
            }
            TokenKind::False => {
                self.bump();
                Ok(Pattern::MatchSingleton(PatternMatchSingleton {
                    value: ConstantValue::Bool(false),
                    location,
                }))
            }
            TokenKind::Minus | TokenKind::Int | TokenKind::Float => {
                let value = self.literal_number()?;
                Ok(Pattern::MatchValue(PatternMatchValue {
                    value: Box::new(value),
                    location,
                }))
            }
            TokenKind::String => {
                let value = self.literal_string()?;
                Ok(Pattern::MatchValue(PatternMatchValue {
                    value: Box::new(value),
                    location,
                }))
            }
            TokenKind::FStringStart | TokenKind::TStringStart => {
                Err(self.error_here("patterns may not use f-strings"))
            }
            TokenKind::Name | TokenKind::Match | TokenKind::Case | TokenKind::Type => {
                self.name_or_class_pattern(location)
            }
            TokenKind::Lpar => {
                self.bump();
                if self.eat(TokenKind::Rpar) {
                    return Ok(Pattern::MatchSequence(PatternMatchSequence {
                        patterns: Vec::new(),
                        location,
                    }));
                }
                let first = self.maybe_star_pattern()?;
                if self.at(TokenKind::Comma) {
                    let mut patterns = vec![first];
                    while self.eat(TokenKind::Comma) {
                        if self.at(TokenKind::Rpar) {
                            break;
                        }
                        patterns.push(self.maybe_star_pattern()?);
                    }
                    self.expect(TokenKind::Rpar, "`)`")?;
                    return Ok(Pattern::MatchSequence(PatternMatchSequence {
                        patterns,
                        location,
                    }));
                }
                self.expect(TokenKind::Rpar, "`)`")?;
                Ok(first)
            }
            TokenKind::Lsqb => {
                self.bump();
                let mut patterns = Vec::new();
                while !self.at(TokenKind::Rsqb) {
                    patterns.push(self.maybe_star_pattern()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::Rsqb, "`]`")?;
                Ok(Pattern::MatchSequence(PatternMatchSequence {
                    patterns,
                    location,
                }))
            }
            TokenKind::Lbrace => self.mapping_pattern(location),
            _ => Err(self.error_here("expected a pattern")),
        }
    }

    /// A capture, wildcard, dotted value pattern, or class pattern.
    fn name_or_class_pattern(&mut self, location: SourceLocation) -> Result<Pattern, ParseError> {
        let is_wildcard = matches!(&self.current().value, TokenValue::Name(n) if n == "_");
        if is_wildcard && !matches!(self.next_kind(), TokenKind::Dot | TokenKind::Lpar) {
            self.bump();
            return Ok(Pattern::MatchAs(PatternMatchAs {
                pattern: None,
                name: None,
                location,
            }));
        }

        let (name, name_location) = self.expect_name("name")?;
        let mut value = Expr::Name(ExprName {
            id: name,
            ctx: ExprContext::Load,
            location: name_location,
        });
        let mut dotted = false;
        while self.at(TokenKind::Dot) {
            let dot_location = self.location();
            self.bump();
            let (attr, _) = self.expect_name("attribute name after `.`")?;
            value = Expr::Attribute(ExprAttribute {
                value: Box::new(value),
                attr,
                ctx: ExprContext::Load,
                location: dot_location,
            });
            dotted = true;
        }

        if self.at(TokenKind::Lpar) {
            return self.class_pattern(value, location);
        }

        if dotted {
            Ok(Pattern::MatchValue(PatternMatchValue {
                value: Box::new(value),
                location,
            }))
        } else {
            let Expr::Name(name) = value else {
                unreachable!("undotted value is a name");
            };
            Ok(Pattern::MatchAs(PatternMatchAs {
                pattern: None,
                name: Some(name.id),
                location,
            }))
        }
    }

    fn class_pattern(&mut self, cls: Expr, location: SourceLocation) -> Result<Pattern, ParseError> {
        self.expect(TokenKind::Lpar, "`(`")?;
        let mut patterns = Vec::new();
        let mut kwd_attrs = Vec::new();
        let mut kwd_patterns = Vec::new();
        while !self.at(TokenKind::Rpar) {
            if self.at_name() && self.next_kind() == TokenKind::Equal {
                let (attr, _) = self.expect_name("attribute name")?;
                self.bump();
                kwd_attrs.push(attr);
                kwd_patterns.push(self.pattern()?);
            } else {
                if !kwd_attrs.is_empty() {
                    return Err(
                        self.error_here("positional patterns follow keyword patterns")
                    );
                }
                patterns.push(self.pattern()?);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Rpar, "`)`")?;
        Ok(Pattern::MatchClass(PatternMatchClass {
            cls: Box::new(cls),
            patterns,
            kwd_attrs,
            kwd_patterns,
            location,
        }))
    }

    fn mapping_pattern(&mut self, location: SourceLocation) -> Result<Pattern, ParseError> {
        self.expect(TokenKind::Lbrace, "`{`")?;
        let mut keys = Vec::new();
        let mut patterns = Vec::new();
        let mut rest = None;
        while !self.at(TokenKind::Rbrace) {
            if self.eat(TokenKind::DoubleStar) {
                let (name, _) = self.expect_name("name after `**`")?;
                rest = Some(name);
                self.eat(TokenKind::Comma);
                break;
            }
            keys.push(self.mapping_key()?);
            self.expect(TokenKind::Colon, "`:` in mapping pattern")?;
            patterns.push(self.pattern()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Rbrace, "`}`")?;
        Ok(Pattern::MatchMapping(PatternMatchMapping {
            keys,
            patterns,
            rest,
            location,
        }))
    }

    /// A mapping-pattern key: a literal or a dotted value.
    fn mapping_key(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        match self.kind() {
            TokenKind::None => {
                self.bump();
                Ok(constant(ConstantValue::None, location))
            }
            TokenKind::True => {
                self.bump();
                Ok(constant(ConstantValue::Bool(true), location))
            }
            TokenKind::False => {
                self.bump();
                Ok(constant(ConstantValue::Bool(false), location))
            }
            TokenKind::Minus | TokenKind::Int | TokenKind::Float => self.literal_number(),
            TokenKind::String => self.literal_string(),
            TokenKind::Name | TokenKind::Match | TokenKind::Case | TokenKind::Type => {
                let (name, name_location) = self.expect_name("name")?;
                let mut value = Expr::Name(ExprName {
                    id: name,
                    ctx: ExprContext::Load,
                    location: name_location,
                });
                if !self.at(TokenKind::Dot) {
                    return Err(self.error_here("mapping pattern keys must be literals or values"));
                }
                while self.at(TokenKind::Dot) {
                    let dot_location = self.location();
                    self.bump();
                    let (attr, _) = self.expect_name("attribute name after `.`")?;
                    value = Expr::Attribute(ExprAttribute {
                        value: Box::new(value),
                        attr,
                        ctx: ExprContext::Load,
                        location: dot_location,
                    });
                }
                Ok(value)
            }
            _ => Err(self.error_here("expected a mapping pattern key")),
        }
    }

    /// A (possibly negated) numeric literal.
    fn literal_number(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        if self.eat(TokenKind::Minus) {
            let operand = self.literal_number()?;
            return Ok(Expr::UnaryOp(ExprUnaryOp {
                op: UnaryOp::USub,
                operand: Box::new(operand),
                location,
            }));
        }
        match self.kind() {
            TokenKind::Int => {
                let token = self.bump();
                let TokenValue::Int(value) = token.value else {
                    unreachable!("int token always carries an Int value");
                };
                Ok(constant(ConstantValue::Int(value), location))
            }
            TokenKind::Float => {
                let token = self.bump();
                let TokenValue::Float(value) = token.value else {
                    unreachable!("float token always carries a Float value");
                };
                Ok(constant(ConstantValue::Float(value), location))
            }
            _ => Err(self.error_here("expected a number")),
        }
    }

    /// A string literal pattern (implicit concatenation allowed, f-strings
    /// rejected).
    fn literal_string(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        let mut text: Option<String> = None;
        let mut bytes: Option<Vec<u8>> = None;
        while self.at(TokenKind::String) {
            let token = self.bump();
            match crate::string::decode_string_token(&token)? {
                ConstantValue::Str(s) => match &mut text {
                    Some(existing) => existing.push_str(&s),
                    None => text = Some(s),
                },
                ConstantValue::Bytes(b) => match &mut bytes {
                    Some(existing) => existing.extend(b),
                    None => bytes = Some(b),
                },
                _ => unreachable!("string decoding yields Str or Bytes"),
            }
        }
        if self.at(TokenKind::FStringStart) || self.at(TokenKind::TStringStart) {
            return Err(self.error_here("patterns may not use f-strings"));
        }
        match (text, bytes) {
            (Some(s), None) => Ok(constant(ConstantValue::Str(s), location)),
            (None, Some(b)) => Ok(constant(ConstantValue::Bytes(b), location)),
            (None, None) => Err(self.error_here("expected a string")),
            (Some(_), Some(_)) => Err(self.error_here("cannot mix bytes and nonbytes literals")),
        }
    }
}

fn constant(value: ConstantValue, location: SourceLocation) -> Expr {
    Expr::Constant(ExprConstant { value, location })
}

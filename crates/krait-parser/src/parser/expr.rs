//! Expression rules: the precedence ladder, atoms and displays,
//! comprehensions, call arguments, subscripts, and string assembly
//! (implicit concatenation and f-/t-string bodies).

use krait_ast::{
    BoolOp, CmpOp, Comprehension, ConstantValue, Conversion, Expr, ExprAttribute, ExprAwait,
    ExprBinOp, ExprBoolOp, ExprCall, ExprCompare, ExprConstant, ExprContext, ExprDict,
    ExprDictComp, ExprFormattedValue, ExprGeneratorExp, ExprIfExp, ExprJoinedStr, ExprLambda,
    ExprList, ExprListComp, ExprName, ExprNamedExpr, ExprSet, ExprSetComp, ExprSlice, ExprStarred,
    ExprSubscript, ExprTuple, ExprUnaryOp, ExprYield, ExprYieldFrom, Keyword, Operator,
    SourceLocation, UnaryOp,
};

use crate::error::ParseError;
use crate::parser::{Parser, RuleId};
use crate::string;
use crate::token::{TokenKind, TokenValue};

impl Parser {
    /// `expression`: ternary conditional or lambda. Memoized.
    pub(crate) fn expression(&mut self) -> Result<Expr, ParseError> {
        self.memoized(RuleId::Expression, |p| p.expression_uncached())
    }

    fn expression_uncached(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::Lambda) {
            return self.lambda();
        }
        let location = self.location();
        let body = self.disjunction()?;
        if !self.at(TokenKind::If) {
            return Ok(body);
        }
        self.bump();
        let test = self.disjunction()?;
        self.expect(TokenKind::Else, "`else` in conditional expression")?;
        let orelse = self.expression()?;
        Ok(Expr::IfExp(ExprIfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
            location,
        }))
    }

    /// `star_expressions`: a comma-separated list at statement level; a
    /// trailing or internal comma builds a tuple. Memoized.
    pub(crate) fn star_expressions(&mut self) -> Result<Expr, ParseError> {
        self.memoized(RuleId::StarExpressions, |p| p.star_expressions_uncached())
    }

    fn star_expressions_uncached(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        let first = self.star_expression()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at_expression_end() {
                break;
            }
            elts.push(self.star_expression()?);
        }
        Ok(Expr::Tuple(ExprTuple {
            elts,
            ctx: ExprContext::Load,
            location,
        }))
    }

    /// `star_expression`: `*bitwise_or` or a plain expression.
    pub(crate) fn star_expression(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::Star) {
            let location = self.location();
            self.bump();
            let value = self.bit_or()?;
            return Ok(Expr::Starred(ExprStarred {
                value: Box::new(value),
                ctx: ExprContext::Load,
                location,
            }));
        }
        self.expression()
    }

    /// Token kinds that terminate an expression list.
    fn at_expression_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline
                | TokenKind::Semi
                | TokenKind::EndMarker
                | TokenKind::Equal
                | TokenKind::Colon
                | TokenKind::Rpar
                | TokenKind::Rsqb
                | TokenKind::Rbrace
        )
    }

    /// `named_expression`: `name := expression` or a plain expression. A
    /// walrus with a non-name target is rejected here.
    pub(crate) fn named_expression(&mut self) -> Result<Expr, ParseError> {
        if self.at_name() && self.next_kind() == TokenKind::ColonEqual {
            let location = self.location();
            let (id, name_location) = self.expect_name("name")?;
            self.bump();
            let value = self.expression()?;
            return Ok(Expr::NamedExpr(ExprNamedExpr {
                target: Box::new(Expr::Name(ExprName {
                    id,
                    ctx: ExprContext::Store,
                    location: name_location,
                })),
                value: Box::new(value),
                location,
            }));
        }
        let expr = self.expression()?;
        if self.at(TokenKind::ColonEqual) {
            return Err(self.error_here("assignment expression target must be a name"));
        }
        Ok(expr)
    }

    fn lambda(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        self.bump();
        let parameters = if self.at(TokenKind::Colon) {
            Default::default()
        } else {
            self.parameters(false)?
        };
        self.expect(TokenKind::Colon, "`:` after lambda parameters")?;
        let body = self.expression()?;
        Ok(Expr::Lambda(ExprLambda {
            parameters,
            body: Box::new(body),
            location,
        }))
    }

    // -- precedence ladder --------------------------------------------------

    pub(crate) fn disjunction(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        let first = self.conjunction()?;
        if !self.at(TokenKind::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(TokenKind::Or) {
            values.push(self.conjunction()?);
        }
        Ok(Expr::BoolOp(ExprBoolOp {
            op: BoolOp::Or,
            values,
            location,
        }))
    }

    fn conjunction(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        let first = self.inversion()?;
        if !self.at(TokenKind::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(TokenKind::And) {
            values.push(self.inversion()?);
        }
        Ok(Expr::BoolOp(ExprBoolOp {
            op: BoolOp::And,
            values,
            location,
        }))
    }

    fn inversion(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::Not) {
            let location = self.location();
            self.bump();
            let operand = self.inversion()?;
            return Ok(Expr::UnaryOp(ExprUnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                location,
            }));
        }
        self.comparison()
    }

    /// A comparison chain collapses into one `Compare` node.
    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        let left = self.bit_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.eat_cmp_op() {
            ops.push(op);
            comparators.push(self.bit_or()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare(ExprCompare {
            left: Box::new(left),
            ops,
            comparators,
            location,
        }))
    }

    fn eat_cmp_op(&mut self) -> Option<CmpOp> {
        let op = match self.kind() {
            TokenKind::EqEqual => CmpOp::Eq,
            TokenKind::NotEqual => CmpOp::NotEq,
            TokenKind::Less => CmpOp::Lt,
            TokenKind::LessEqual => CmpOp::LtE,
            TokenKind::Greater => CmpOp::Gt,
            TokenKind::GreaterEqual => CmpOp::GtE,
            TokenKind::In => CmpOp::In,
            TokenKind::Is => {
                self.bump();
                if self.eat(TokenKind::Not) {
                    return Some(CmpOp::IsNot);
                }
                return Some(CmpOp::Is);
            }
            TokenKind::Not => {
                if self.next_kind() == TokenKind::In {
                    self.bump();
                    self.bump();
                    return Some(CmpOp::NotIn);
                }
                return None;
            }
            _ => return None,
        };
        self.bump();
        Some(op)
    }

    pub(crate) fn bit_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.bit_xor()?;
        while self.at(TokenKind::Vbar) {
            let location = self.location();
            self.bump();
            let right = self.bit_xor()?;
            left = binop(left, Operator::BitOr, right, location);
        }
        Ok(left)
    }

    fn bit_xor(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.bit_and()?;
        while self.at(TokenKind::CircumFlex) {
            let location = self.location();
            self.bump();
            let right = self.bit_and()?;
            left = binop(left, Operator::BitXor, right, location);
        }
        Ok(left)
    }

    fn bit_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.shift()?;
        while self.at(TokenKind::Amper) {
            let location = self.location();
            self.bump();
            let right = self.shift()?;
            left = binop(left, Operator::BitAnd, right, location);
        }
        Ok(left)
    }

    fn shift(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.sum()?;
        loop {
            let op = match self.kind() {
                TokenKind::LeftShift => Operator::LShift,
                TokenKind::RightShift => Operator::RShift,
                _ => break,
            };
            let location = self.location();
            self.bump();
            let right = self.sum()?;
            left = binop(left, op, right, location);
        }
        Ok(left)
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => Operator::Add,
                TokenKind::Minus => Operator::Sub,
                _ => break,
            };
            let location = self.location();
            self.bump();
            let right = self.term()?;
            left = binop(left, op, right, location);
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => Operator::Mult,
                TokenKind::At => Operator::MatMult,
                TokenKind::Slash => Operator::Div,
                TokenKind::DoubleSlash => Operator::FloorDiv,
                TokenKind::Percent => Operator::Mod,
                _ => break,
            };
            let location = self.location();
            self.bump();
            let right = self.factor()?;
            left = binop(left, op, right, location);
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.kind() {
            TokenKind::Plus => UnaryOp::UAdd,
            TokenKind::Minus => UnaryOp::USub,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.power(),
        };
        let location = self.location();
        self.bump();
        let operand = self.factor()?;
        Ok(Expr::UnaryOp(ExprUnaryOp {
            op,
            operand: Box::new(operand),
            location,
        }))
    }

    /// `**` binds tighter than unary on the left and looser on the right:
    /// `-x ** y` is `-(x ** y)`, `x ** -y` is fine.
    fn power(&mut self) -> Result<Expr, ParseError> {
        let left = self.await_primary()?;
        if !self.at(TokenKind::DoubleStar) {
            return Ok(left);
        }
        let location = self.location();
        self.bump();
        let right = self.factor()?;
        Ok(binop(left, Operator::Pow, right, location))
    }

    fn await_primary(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::Await) {
            let location = self.location();
            self.bump();
            let value = self.await_primary()?;
            return Ok(Expr::Await(ExprAwait {
                value: Box::new(value),
                location,
            }));
        }
        self.primary()
    }

    /// An atom followed by `.attr`, `(...)`, and `[...]` trailers.
    pub(crate) fn primary(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.atom()?;
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    let location = self.location();
                    self.bump();
                    let (attr, _) = self.expect_name("attribute name after `.`")?;
                    expr = Expr::Attribute(ExprAttribute {
                        value: Box::new(expr),
                        attr,
                        ctx: ExprContext::Load,
                        location,
                    });
                }
                TokenKind::Lpar => {
                    let location = self.location();
                    self.bump();
                    let (args, keywords) = self.call_arguments()?;
                    expr = Expr::Call(ExprCall {
                        func: Box::new(expr),
                        args,
                        keywords,
                        location,
                    });
                }
                TokenKind::Lsqb => {
                    let location = self.location();
                    self.bump();
                    let slice = self.slices()?;
                    self.expect(TokenKind::Rsqb, "`]`")?;
                    expr = Expr::Subscript(ExprSubscript {
                        value: Box::new(expr),
                        slice: Box::new(slice),
                        ctx: ExprContext::Load,
                        location,
                    });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    // -- atoms and displays -------------------------------------------------

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        match self.kind() {
            TokenKind::Name => {
                let token = self.bump();
                let TokenValue::Name(id) = token.value else {
                    unreachable!("name token always carries a Name value");
                };
                Ok(Expr::Name(ExprName {
                    id,
                    ctx: ExprContext::Load,
                    location,
                }))
            }
            // Soft keywords are ordinary names in expression position.
            kind if kind.is_soft_keyword() => {
                let token = self.bump();
                Ok(Expr::Name(ExprName {
                    id: token.lexeme,
                    ctx: ExprContext::Load,
                    location,
                }))
            }
            TokenKind::True => {
                self.bump();
                Ok(constant(ConstantValue::Bool(true), location))
            }
            TokenKind::False => {
                self.bump();
                Ok(constant(ConstantValue::Bool(false), location))
            }
            TokenKind::None => {
                self.bump();
                Ok(constant(ConstantValue::None, location))
            }
            TokenKind::Ellipsis => {
                self.bump();
                Ok(constant(ConstantValue::Ellipsis, location))
            }
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
            TokenKind::String
            | TokenKind::FStringStart
            | TokenKind::TStringStart => self.strings(),
            TokenKind::Lpar => self.parenthesized(),
            TokenKind::Lsqb => self.list_display(),
            TokenKind::Lbrace => self.brace_display(),
            _ => Err(self.error_here("expected an expression")),
        }
    }

    /// `(...)`: the empty tuple, a parenthesized expression or yield, a
    /// tuple display, or a generator expression.
    fn parenthesized(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        self.bump();

        if self.at(TokenKind::Rpar) {
            self.bump();
            return Ok(Expr::Tuple(ExprTuple {
                elts: Vec::new(),
                ctx: ExprContext::Load,
                location,
            }));
        }

        if self.at(TokenKind::Yield) {
            let value = self.yield_expression()?;
            self.expect(TokenKind::Rpar, "`)`")?;
            return Ok(value);
        }

        let first = if self.at(TokenKind::Star) {
            self.star_expression()?
        } else {
            self.named_expression()?
        };

        if self.at(TokenKind::For) || (self.at(TokenKind::Async) && self.next_kind() == TokenKind::For)
        {
            let generators = self.comprehension_clauses()?;
            self.expect(TokenKind::Rpar, "`)`")?;
            return Ok(Expr::GeneratorExp(ExprGeneratorExp {
                elt: Box::new(first),
                generators,
                location,
            }));
        }

        if self.at(TokenKind::Comma) {
            let mut elts = vec![first];
            while self.eat(TokenKind::Comma) {
                if self.at(TokenKind::Rpar) {
                    break;
                }
                elts.push(if self.at(TokenKind::Star) {
                    self.star_expression()?
                } else {
                    self.named_expression()?
                });
            }
            self.expect(TokenKind::Rpar, "`)`")?;
            return Ok(Expr::Tuple(ExprTuple {
                elts,
                ctx: ExprContext::Load,
                location,
            }));
        }

        self.expect(TokenKind::Rpar, "`)`")?;
        Ok(first)
    }

    /// `[...]`: a list display or list comprehension.
    fn list_display(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        self.bump();

        if self.at(TokenKind::Rsqb) {
            self.bump();
            return Ok(Expr::List(ExprList {
                elts: Vec::new(),
                ctx: ExprContext::Load,
                location,
            }));
        }

        let first = if self.at(TokenKind::Star) {
            self.star_expression()?
        } else {
            self.named_expression()?
        };

        if self.at(TokenKind::For) || (self.at(TokenKind::Async) && self.next_kind() == TokenKind::For)
        {
            let generators = self.comprehension_clauses()?;
            self.expect(TokenKind::Rsqb, "`]`")?;
            return Ok(Expr::ListComp(ExprListComp {
                elt: Box::new(first),
                generators,
                location,
            }));
        }

        let mut elts = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::Rsqb) {
                break;
            }
            elts.push(if self.at(TokenKind::Star) {
                self.star_expression()?
            } else {
                self.named_expression()?
            });
        }
        self.expect(TokenKind::Rsqb, "`]`")?;
        Ok(Expr::List(ExprList {
            elts,
            ctx: ExprContext::Load,
            location,
        }))
    }

    /// `{...}`: dict or set display, or a dict/set comprehension.
    fn brace_display(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        self.bump();

        if self.at(TokenKind::Rbrace) {
            self.bump();
            return Ok(Expr::Dict(ExprDict {
                keys: Vec::new(),
                values: Vec::new(),
                location,
            }));
        }

        // `**mapping` can only start a dict display.
        if self.at(TokenKind::DoubleStar) {
            self.bump();
            let value = self.bit_or()?;
            return self.dict_display_rest(location, vec![None], vec![value]);
        }

        let first = if self.at(TokenKind::Star) {
            self.star_expression()?
        } else {
            self.named_expression()?
        };

        if self.eat(TokenKind::Colon) {
            let value = self.expression()?;
            if self.at(TokenKind::For)
                || (self.at(TokenKind::Async) && self.next_kind() == TokenKind::For)
            {
                let generators = self.comprehension_clauses()?;
                self.expect(TokenKind::Rbrace, "`}`")?;
                return Ok(Expr::DictComp(ExprDictComp {
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                    location,
                }));
            }
            return self.dict_display_rest(location, vec![Some(first)], vec![value]);
        }

        if self.at(TokenKind::For) || (self.at(TokenKind::Async) && self.next_kind() == TokenKind::For)
        {
            let generators = self.comprehension_clauses()?;
            self.expect(TokenKind::Rbrace, "`}`")?;
            return Ok(Expr::SetComp(ExprSetComp {
                elt: Box::new(first),
                generators,
                location,
            }));
        }

        let mut elts = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::Rbrace) {
                break;
            }
            elts.push(if self.at(TokenKind::Star) {
                self.star_expression()?
            } else {
                self.named_expression()?
            });
        }
        self.expect(TokenKind::Rbrace, "`}`")?;
        Ok(Expr::Set(ExprSet { elts, location }))
    }

    /// The remaining `key: value` / `**mapping` items of a dict display.
    fn dict_display_rest(
        &mut self,
        location: SourceLocation,
        mut keys: Vec<Option<Expr>>,
        mut values: Vec<Expr>,
    ) -> Result<Expr, ParseError> {
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::Rbrace) {
                break;
            }
            if self.eat(TokenKind::DoubleStar) {
                keys.push(None);
                values.push(self.bit_or()?);
            } else {
                let key = self.expression()?;
                self.expect(TokenKind::Colon, "`:` in dict display")?;
                let value = self.expression()?;
                keys.push(Some(key));
                values.push(value);
            }
        }
        self.expect(TokenKind::Rbrace, "`}`")?;
        Ok(Expr::Dict(ExprDict {
            keys,
            values,
            location,
        }))
    }

    /// One or more `for ... in ... [if ...]` clauses.
    pub(crate) fn comprehension_clauses(&mut self) -> Result<Vec<Comprehension>, ParseError> {
        let mut generators = Vec::new();
        loop {
            let is_async = if self.at(TokenKind::Async) && self.next_kind() == TokenKind::For {
                self.bump();
                true
            } else {
                false
            };
            if !self.eat(TokenKind::For) {
                break;
            }
            let target = self.star_targets()?;
            self.expect(TokenKind::In, "`in` in comprehension")?;
            let iter = self.disjunction()?;
            let mut ifs = Vec::new();
            while self.eat(TokenKind::If) {
                ifs.push(self.comprehension_test()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                ifs,
                is_async,
            });
            if !(self.at(TokenKind::For)
                || (self.at(TokenKind::Async) && self.next_kind() == TokenKind::For))
            {
                break;
            }
        }
        if generators.is_empty() {
            return Err(self.error_here("expected `for` in comprehension"));
        }
        Ok(generators)
    }

    /// A comprehension `if` condition: a disjunction, with walrus allowed.
    fn comprehension_test(&mut self) -> Result<Expr, ParseError> {
        if self.at_name() && self.next_kind() == TokenKind::ColonEqual {
            return self.named_expression();
        }
        self.disjunction()
    }

    pub(crate) fn yield_expression(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        self.expect(TokenKind::Yield, "`yield`")?;
        if self.eat(TokenKind::From) {
            let value = self.expression()?;
            return Ok(Expr::YieldFrom(ExprYieldFrom {
                value: Box::new(value),
                location,
            }));
        }
        if self.at_expression_end() {
            return Ok(Expr::Yield(ExprYield {
                value: None,
                location,
            }));
        }
        let value = self.star_expressions()?;
        Ok(Expr::Yield(ExprYield {
            value: Some(Box::new(value)),
            location,
        }))
    }

    // -- call arguments and subscripts --------------------------------------

    /// The argument list of a call, after `(`. Consumes the closing `)`.
    pub(crate) fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>), ParseError> {
        let mut args: Vec<Expr> = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();

        while !self.at(TokenKind::Rpar) {
            let location = self.location();
            if self.eat(TokenKind::DoubleStar) {
                let value = self.expression()?;
                keywords.push(Keyword {
                    arg: None,
                    value,
                    location,
                });
            } else if self.at(TokenKind::Star) {
                self.bump();
                let value = self.expression()?;
                args.push(Expr::Starred(ExprStarred {
                    value: Box::new(value),
                    ctx: ExprContext::Load,
                    location,
                }));
            } else if self.at_name() && self.next_kind() == TokenKind::Equal {
                let (name, _) = self.expect_name("keyword argument name")?;
                self.bump();
                let value = self.expression()?;
                keywords.push(Keyword {
                    arg: Some(name),
                    value,
                    location,
                });
            } else {
                let value = self.named_expression()?;
                if self.at(TokenKind::For)
                    || (self.at(TokenKind::Async) && self.next_kind() == TokenKind::For)
                {
                    // sum(x for x in xs): a bare generator must be the only
                    // argument.
                    if !args.is_empty() || !keywords.is_empty() {
                        return Err(self.error_here(
                            "generator expression must be parenthesized when not the sole argument",
                        ));
                    }
                    let generators = self.comprehension_clauses()?;
                    if self.at(TokenKind::Comma) {
                        return Err(self.error_here(
                            "generator expression must be parenthesized when not the sole argument",
                        ));
                    }
                    args.push(Expr::GeneratorExp(ExprGeneratorExp {
                        elt: Box::new(value),
                        generators,
                        location,
                    }));
                } else {
                    if !keywords.is_empty() {
                        return Err(
                            self.error_here("positional argument follows keyword argument")
                        );
                    }
                    args.push(value);
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Rpar, "`)`")?;
        Ok((args, keywords))
    }

    /// The inside of `[...]` in a subscript: one slice item or a tuple of
    /// them.
    pub(crate) fn slices(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        let first = self.slice_item()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::Rsqb) {
                break;
            }
            elts.push(self.slice_item()?);
        }
        Ok(Expr::Tuple(ExprTuple {
            elts,
            ctx: ExprContext::Load,
            location,
        }))
    }

    fn slice_item(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();

        let lower = if self.at(TokenKind::Colon) {
            None
        } else {
            let expr = if self.at(TokenKind::Star) {
                self.star_expression()?
            } else {
                self.named_expression()?
            };
            if !self.at(TokenKind::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };

        self.expect(TokenKind::Colon, "`:`")?;
        let upper = if matches!(
            self.kind(),
            TokenKind::Colon | TokenKind::Comma | TokenKind::Rsqb
        ) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        let step = if self.eat(TokenKind::Colon) {
            if matches!(self.kind(), TokenKind::Comma | TokenKind::Rsqb) {
                None
            } else {
                Some(Box::new(self.expression()?))
            }
        } else {
            None
        };

        Ok(Expr::Slice(ExprSlice {
            lower,
            upper,
            step,
            location,
        }))
    }

    // -- strings ------------------------------------------------------------

    /// One or more adjacent string literals (implicit concatenation),
    /// including f-strings and t-strings.
    fn strings(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();

        enum Part {
            Str(String),
            Bytes(Vec<u8>),
            Interpolated(Vec<Expr>, bool),
        }

        let mut parts: Vec<Part> = Vec::new();
        loop {
            match self.kind() {
                TokenKind::String => {
                    let token = self.bump();
                    match string::decode_string_token(&token)? {
                        ConstantValue::Str(s) => parts.push(Part::Str(s)),
                        ConstantValue::Bytes(b) => parts.push(Part::Bytes(b)),
                        _ => unreachable!("string decoding yields Str or Bytes"),
                    }
                }
                TokenKind::FStringStart => {
                    let values = self.interpolated_body(TokenKind::FStringEnd)?;
                    parts.push(Part::Interpolated(values, false));
                }
                TokenKind::TStringStart => {
                    let values = self.interpolated_body(TokenKind::TStringEnd)?;
                    parts.push(Part::Interpolated(values, true));
                }
                _ => break,
            }
        }

        let any_bytes = parts.iter().any(|p| matches!(p, Part::Bytes(_)));
        let any_str = parts
            .iter()
            .any(|p| matches!(p, Part::Str(_) | Part::Interpolated(..)));
        if any_bytes && any_str {
            return Err(self.error_here("cannot mix bytes and nonbytes literals"));
        }
        if any_bytes {
            let mut bytes = Vec::new();
            for part in parts {
                if let Part::Bytes(b) = part {
                    bytes.extend(b);
                }
            }
            return Ok(constant(ConstantValue::Bytes(bytes), location));
        }

        let any_template = parts
            .iter()
            .any(|p| matches!(p, Part::Interpolated(_, true)));
        let any_plain_or_fstring = parts
            .iter()
            .any(|p| matches!(p, Part::Str(_) | Part::Interpolated(_, false)));
        if any_template && any_plain_or_fstring {
            return Err(self.error_here("cannot mix t-string literals with other strings"));
        }

        let any_interpolated = parts.iter().any(|p| matches!(p, Part::Interpolated(..)));
        if !any_interpolated {
            let mut text = String::new();
            for part in parts {
                if let Part::Str(s) = part {
                    text.push_str(&s);
                }
            }
            return Ok(constant(ConstantValue::Str(text), location));
        }

        // At least one interpolated part: the whole thing is a JoinedStr.
        let mut values: Vec<Expr> = Vec::new();
        for part in parts {
            match part {
                Part::Str(s) => push_joined_constant(&mut values, s, location),
                Part::Interpolated(vs, _) => {
                    for v in vs {
                        match v {
                            Expr::Constant(c) => {
                                if let ConstantValue::Str(s) = c.value {
                                    push_joined_constant(&mut values, s, c.location);
                                }
                            }
                            other => values.push(other),
                        }
                    }
                }
                Part::Bytes(_) => unreachable!("bytes handled above"),
            }
        }
        Ok(Expr::JoinedStr(ExprJoinedStr {
            values,
            is_template: any_template,
            location,
        }))
    }

    /// The body of one f-/t-string, between its start and end tokens.
    fn interpolated_body(&mut self, end: TokenKind) -> Result<Vec<Expr>, ParseError> {
        self.bump();
        let mut values: Vec<Expr> = Vec::new();
        loop {
            match self.kind() {
                TokenKind::FStringMiddle | TokenKind::TStringMiddle => {
                    let token = self.bump();
                    let TokenValue::FStringMiddle(raw) = &token.value else {
                        unreachable!("middle token always carries a FStringMiddle value");
                    };
                    let text =
                        string::decode_fstring_middle(raw, token.flags, token.location())?;
                    push_joined_constant(&mut values, text, token.location());
                }
                TokenKind::Lbrace => {
                    values.push(self.replacement_field()?);
                }
                kind if kind == end => {
                    self.bump();
                    break;
                }
                _ => return Err(self.error_here("unterminated f-string body")),
            }
        }
        Ok(values)
    }

    /// `{ expr [!conversion] [:format_spec] }`.
    fn replacement_field(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        self.expect(TokenKind::Lbrace, "`{`")?;

        let value = if self.at(TokenKind::Yield) {
            self.yield_expression()?
        } else {
            self.star_expressions()?
        };

        let conversion = if self.eat(TokenKind::Exclaim) {
            let (name, name_location) = self.expect_name("conversion character")?;
            let mut chars = name.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                return Err(ParseError::new(
                    "f-string conversion must be `s`, `r`, or `a`",
                    name,
                    name_location,
                ));
            };
            match Conversion::from_char(c) {
                Some(conversion) => Some(conversion),
                None => {
                    return Err(ParseError::new(
                        "f-string conversion must be `s`, `r`, or `a`",
                        name,
                        name_location,
                    ));
                }
            }
        } else {
            None
        };

        let format_spec = if self.at(TokenKind::Colon) {
            let spec_location = self.location();
            self.bump();
            let mut spec_values: Vec<Expr> = Vec::new();
            loop {
                match self.kind() {
                    TokenKind::FStringMiddle | TokenKind::TStringMiddle => {
                        let token = self.bump();
                        let TokenValue::FStringMiddle(raw) = &token.value else {
                            unreachable!("middle token always carries a FStringMiddle value");
                        };
                        let text =
                            string::decode_fstring_middle(raw, token.flags, token.location())?;
                        push_joined_constant(&mut spec_values, text, token.location());
                    }
                    TokenKind::Lbrace => spec_values.push(self.replacement_field()?),
                    TokenKind::Rbrace => break,
                    _ => return Err(self.error_here("unterminated format specifier")),
                }
            }
            Some(Box::new(Expr::JoinedStr(ExprJoinedStr {
                values: spec_values,
                is_template: false,
                location: spec_location,
            })))
        } else {
            None
        };

        self.expect(TokenKind::Rbrace, "`}`")?;
        Ok(Expr::FormattedValue(ExprFormattedValue {
            value: Box::new(value),
            conversion,
            format_spec,
            location,
        }))
    }
}

fn binop(left: Expr, op: Operator, right: Expr, location: SourceLocation) -> Expr {
    Expr::BinOp(ExprBinOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
        location,
    })
}

fn constant(value: ConstantValue, location: SourceLocation) -> Expr {
    Expr::Constant(ExprConstant { value, location })
}

/// Append a literal string piece, merging with a preceding constant so that
/// adjacent literal runs stay one node (which keeps rendering canonical).
fn push_joined_constant(values: &mut Vec<Expr>, text: String, location: SourceLocation) {
    if text.is_empty() {
        return;
    }
    if let Some(Expr::Constant(prev)) = values.last_mut() {
        if let ConstantValue::Str(s) = &mut prev.value {
            s.push_str(&text);
            return;
        }
    }
    values.push(constant(ConstantValue::Str(text), location));
}

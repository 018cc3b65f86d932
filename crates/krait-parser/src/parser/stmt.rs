//! Statement rules: simple statements, compound statements, parameter
//! lists, and assignment-target grammars.

use krait_ast::{
    Alias, ExceptHandler, Expr, ExprContext, ExprList, ExprStarred, ExprTuple, MatchCase,
    Operator, Parameter, Parameters, Stmt, StmtAssert, StmtAssign, StmtAugAssign,
    StmtAnnAssign, StmtBreak, StmtClassDef, StmtContinue, StmtDelete, StmtExpr, StmtFor,
    StmtFunctionDef, StmtGlobal, StmtIf, StmtImport, StmtImportFrom, StmtMatch, StmtNonlocal,
    StmtPass, StmtRaise, StmtReturn, StmtTry, StmtTypeAlias, StmtWhile, StmtWith, TypeParam,
    TypeParamParamSpec, TypeParamTypeVar, TypeParamTypeVarTuple, WithItem,
};

use crate::error::ParseError;
use crate::parser::Parser;
use crate::token::TokenKind;

impl Parser {
    /// Parse one compound statement or one logical line of simple
    /// statements into `body`.
    pub(crate) fn statement_into(&mut self, body: &mut Vec<Stmt>) -> Result<(), ParseError> {
        match self.kind() {
            TokenKind::If => {
                let stmt = self.if_statement()?;
                body.push(stmt);
                return Ok(());
            }
            TokenKind::While => {
                let stmt = self.while_statement()?;
                body.push(stmt);
                return Ok(());
            }
            TokenKind::For => {
                let stmt = self.for_statement(false)?;
                body.push(stmt);
                return Ok(());
            }
            TokenKind::Try => {
                let stmt = self.try_statement()?;
                body.push(stmt);
                return Ok(());
            }
            TokenKind::With => {
                let stmt = self.with_statement(false)?;
                body.push(stmt);
                return Ok(());
            }
            TokenKind::Def => {
                let stmt = self.function_def(false, Vec::new())?;
                body.push(stmt);
                return Ok(());
            }
            TokenKind::Class => {
                let stmt = self.class_def(Vec::new())?;
                body.push(stmt);
                return Ok(());
            }
            TokenKind::At => {
                let stmt = self.decorated_statement()?;
                body.push(stmt);
                return Ok(());
            }
            TokenKind::Async => {
                let stmt = self.async_statement()?;
                body.push(stmt);
                return Ok(());
            }
            TokenKind::Match => {
                // Soft keyword: a match statement only when the header
                // parses as one; otherwise `match` is an ordinary name.
                if self.probe_match_header() {
                    let stmt = self.match_statement()?;
                    body.push(stmt);
                    return Ok(());
                }
            }
            _ => {}
        }

        // A line of `;`-separated simple statements.
        loop {
            body.push(self.simple_statement()?);
            if !self.eat(TokenKind::Semi) {
                break;
            }
            if self.at(TokenKind::Newline) || self.at(TokenKind::EndMarker) {
                break;
            }
        }
        if !self.eat(TokenKind::Newline) && !self.at(TokenKind::EndMarker) {
            return Err(self.error_here("expected a newline after statement"));
        }
        Ok(())
    }

    /// An indented (or inline) suite after `:`.
    pub(crate) fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::Colon, "`:`")?;
        let mut body = Vec::new();
        if self.eat(TokenKind::Newline) {
            self.expect(TokenKind::Indent, "an indented block")?;
            while !self.at(TokenKind::Dedent) && !self.at(TokenKind::EndMarker) {
                self.statement_into(&mut body)?;
            }
            self.expect(TokenKind::Dedent, "the end of the block")?;
        } else {
            loop {
                body.push(self.simple_statement()?);
                if !self.eat(TokenKind::Semi) {
                    break;
                }
                if self.at(TokenKind::Newline) || self.at(TokenKind::EndMarker) {
                    break;
                }
            }
            if !self.eat(TokenKind::Newline) && !self.at(TokenKind::EndMarker) {
                return Err(self.error_here("expected a newline after statement"));
            }
        }
        Ok(body)
    }

    // -- simple statements --------------------------------------------------

    fn simple_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.location();
        match self.kind() {
            TokenKind::Pass => {
                self.bump();
                Ok(Stmt::Pass(StmtPass { location }))
            }
            TokenKind::Break => {
                self.bump();
                Ok(Stmt::Break(StmtBreak { location }))
            }
            TokenKind::Continue => {
                self.bump();
                Ok(Stmt::Continue(StmtContinue { location }))
            }
            TokenKind::Return => {
                self.bump();
                let value = if self.at_line_end() {
                    None
                } else {
                    Some(Box::new(self.star_expressions()?))
                };
                Ok(Stmt::Return(StmtReturn { value, location }))
            }
            TokenKind::Raise => {
                self.bump();
                if self.at_line_end() {
                    return Ok(Stmt::Raise(StmtRaise {
                        exc: None,
                        cause: None,
                        location,
                    }));
                }
                let exc = self.expression()?;
                let cause = if self.eat(TokenKind::From) {
                    Some(Box::new(self.expression()?))
                } else {
                    None
                };
                Ok(Stmt::Raise(StmtRaise {
                    exc: Some(Box::new(exc)),
                    cause,
                    location,
                }))
            }
            TokenKind::Global => {
                self.bump();
                let names = self.name_list()?;
                Ok(Stmt::Global(StmtGlobal { names, location }))
            }
            TokenKind::Nonlocal => {
                self.bump();
                let names = self.name_list()?;
                Ok(Stmt::Nonlocal(StmtNonlocal { names, location }))
            }
            TokenKind::Del => self.del_statement(),
            TokenKind::Import => self.import_statement(),
            TokenKind::From => self.import_from_statement(),
            TokenKind::Assert => {
                self.bump();
                let test = self.expression()?;
                let msg = if self.eat(TokenKind::Comma) {
                    Some(Box::new(self.expression()?))
                } else {
                    None
                };
                Ok(Stmt::Assert(StmtAssert {
                    test: Box::new(test),
                    msg,
                    location,
                }))
            }
            TokenKind::Yield => {
                let value = self.yield_expression()?;
                Ok(Stmt::Expr(StmtExpr {
                    value: Box::new(value),
                    location,
                }))
            }
            TokenKind::Type => {
                // Soft keyword: `type X = ...` or an expression statement
                // using `type` as a name.
                let checkpoint = self.checkpoint();
                match self.type_alias_statement() {
                    Ok(stmt) => Ok(stmt),
                    Err(_) => {
                        self.rewind(checkpoint);
                        self.expression_statement()
                    }
                }
            }
            _ => self.expression_statement(),
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline | TokenKind::Semi | TokenKind::EndMarker
        )
    }

    fn name_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = vec![self.expect_name("name")?.0];
        while self.eat(TokenKind::Comma) {
            names.push(self.expect_name("name")?.0);
        }
        Ok(names)
    }

    /// Plain expression statement, assignment, augmented assignment, or
    /// annotated assignment.
    fn expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.location();
        let first = self.star_expressions()?;

        if self.at(TokenKind::ColonEqual) {
            return Err(self.error_here("assignment expression target must be a name"));
        }

        // Annotated assignment: `target: annotation [= value]`.
        if self.at(TokenKind::Colon) {
            if !matches!(
                first,
                Expr::Name(_) | Expr::Attribute(_) | Expr::Subscript(_)
            ) {
                return Err(self.error_here("only a name, attribute, or subscript can be annotated"));
            }
            self.bump();
            let annotation = self.expression()?;
            let value = if self.eat(TokenKind::Equal) {
                let value = if self.at(TokenKind::Yield) {
                    self.yield_expression()?
                } else {
                    self.star_expressions()?
                };
                Some(Box::new(value))
            } else {
                None
            };
            let simple = matches!(first, Expr::Name(_));
            let mut target = first;
            target.set_ctx(ExprContext::Store);
            return Ok(Stmt::AnnAssign(StmtAnnAssign {
                target: Box::new(target),
                annotation: Box::new(annotation),
                value,
                simple,
                location,
            }));
        }

        // Augmented assignment.
        if self.kind().is_aug_assign() {
            if !matches!(
                first,
                Expr::Name(_) | Expr::Attribute(_) | Expr::Subscript(_)
            ) {
                return Err(self.error_here("invalid augmented assignment target"));
            }
            let op = aug_assign_operator(self.kind());
            self.bump();
            let value = if self.at(TokenKind::Yield) {
                self.yield_expression()?
            } else {
                self.star_expressions()?
            };
            let mut target = first;
            target.set_ctx(ExprContext::Store);
            return Ok(Stmt::AugAssign(StmtAugAssign {
                target: Box::new(target),
                op,
                value: Box::new(value),
                location,
            }));
        }

        // Plain assignment chain: `a = b = value`.
        if self.at(TokenKind::Equal) {
            let mut chain = vec![first];
            while self.eat(TokenKind::Equal) {
                let next = if self.at(TokenKind::Yield) {
                    self.yield_expression()?
                } else {
                    self.star_expressions()?
                };
                chain.push(next);
            }
            let value = chain.pop().expect("chain has the value");
            let mut targets = chain;
            for target in &mut targets {
                self.validate_assign_target(target)?;
                target.set_ctx(ExprContext::Store);
            }
            return Ok(Stmt::Assign(StmtAssign {
                targets,
                value: Box::new(value),
                location,
            }));
        }

        Ok(Stmt::Expr(StmtExpr {
            value: Box::new(first),
            location,
        }))
    }

    fn validate_assign_target(&self, target: &Expr) -> Result<(), ParseError> {
        if matches!(target, Expr::Starred(_)) {
            return Err(ParseError::new(
                "starred assignment target must be in a list or tuple",
                String::new(),
                target.location(),
            ));
        }
        if target.is_assignable() {
            Ok(())
        } else {
            Err(ParseError::new(
                "invalid assignment target",
                String::new(),
                target.location(),
            ))
        }
    }

    fn del_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.bump();
        let expr = self.star_expressions()?;
        let mut targets = match expr {
            Expr::Tuple(tuple) => tuple.elts,
            other => vec![other],
        };
        for target in &mut targets {
            if matches!(target, Expr::Starred(_)) {
                return Err(ParseError::new(
                    "cannot delete starred expression",
                    String::new(),
                    target.location(),
                ));
            }
            if !target.is_assignable() {
                return Err(ParseError::new(
                    "cannot delete this expression",
                    String::new(),
                    target.location(),
                ));
            }
            target.set_ctx(ExprContext::Del);
        }
        Ok(Stmt::Delete(StmtDelete { targets, location }))
    }

    fn import_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.bump();
        let mut names = vec![self.import_alias(true)?];
        while self.eat(TokenKind::Comma) {
            names.push(self.import_alias(true)?);
        }
        Ok(Stmt::Import(StmtImport { names, location }))
    }

    fn import_from_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.bump();

        let mut level = 0u32;
        loop {
            if self.eat(TokenKind::Dot) {
                level += 1;
            } else if self.eat(TokenKind::Ellipsis) {
                level += 3;
            } else {
                break;
            }
        }

        let module = if self.at(TokenKind::Import) {
            None
        } else {
            Some(self.dotted_name()?)
        };
        if level == 0 && module.is_none() {
            return Err(self.error_here("expected a module name"));
        }
        self.expect(TokenKind::Import, "`import`")?;

        let names = if self.eat(TokenKind::Star) {
            vec![Alias {
                name: "*".to_string(),
                asname: None,
                location: self.location(),
            }]
        } else if self.eat(TokenKind::Lpar) {
            let mut names = vec![self.import_alias(false)?];
            while self.eat(TokenKind::Comma) {
                if self.at(TokenKind::Rpar) {
                    break;
                }
                names.push(self.import_alias(false)?);
            }
            self.expect(TokenKind::Rpar, "`)`")?;
            names
        } else {
            let mut names = vec![self.import_alias(false)?];
            while self.eat(TokenKind::Comma) {
                names.push(self.import_alias(false)?);
            }
            names
        };

        Ok(Stmt::ImportFrom(StmtImportFrom {
            module,
            names,
            level,
            location,
        }))
    }

    fn import_alias(&mut self, dotted: bool) -> Result<Alias, ParseError> {
        let location = self.location();
        let name = if dotted {
            self.dotted_name()?
        } else {
            self.expect_name("name")?.0
        };
        let asname = if self.eat(TokenKind::As) {
            Some(self.expect_name("name after `as`")?.0)
        } else {
            None
        };
        Ok(Alias {
            name,
            asname,
            location,
        })
    }

    fn dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.expect_name("module name")?.0;
        while self.at(TokenKind::Dot) && !matches!(self.next_kind(), TokenKind::Import) {
            self.bump();
            name.push('.');
            name.push_str(&self.expect_name("name after `.`")?.0);
        }
        Ok(name)
    }

    fn type_alias_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.expect(TokenKind::Type, "`type`")?;
        if !self.at(TokenKind::Name) && !self.kind().is_soft_keyword() {
            return Err(self.error_here("expected a name after `type`"));
        }
        let (name, _) = self.expect_name("alias name")?;
        let type_params = self.type_params()?;
        self.expect(TokenKind::Equal, "`=` in type alias")?;
        let value = self.expression()?;
        Ok(Stmt::TypeAlias(StmtTypeAlias {
            name,
            type_params,
            value: Box::new(value),
            location,
        }))
    }

    // -- compound statements ------------------------------------------------

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.bump();
        let test = self.named_expression()?;
        let body = self.block()?;
        let orelse = self.else_clause()?;
        Ok(Stmt::If(StmtIf {
            test: Box::new(test),
            body,
            orelse,
            location,
        }))
    }

    /// `elif` parses as a nested `If` that is the sole statement of the
    /// enclosing `orelse`, preserving source order.
    fn else_clause(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.at(TokenKind::Elif) {
            let location = self.location();
            self.bump();
            let test = self.named_expression()?;
            let body = self.block()?;
            let orelse = self.else_clause()?;
            return Ok(vec![Stmt::If(StmtIf {
                test: Box::new(test),
                body,
                orelse,
                location,
            })]);
        }
        if self.at(TokenKind::Else) {
            self.bump();
            return self.block();
        }
        Ok(Vec::new())
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.bump();
        let test = self.named_expression()?;
        let body = self.block()?;
        let orelse = if self.eat(TokenKind::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::While(StmtWhile {
            test: Box::new(test),
            body,
            orelse,
            location,
        }))
    }

    fn for_statement(&mut self, is_async: bool) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.bump();
        let target = self.star_targets()?;
        self.expect(TokenKind::In, "`in`")?;
        let iter = self.star_expressions()?;
        let body = self.block()?;
        let orelse = if self.eat(TokenKind::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        let stmt = StmtFor {
            target: Box::new(target),
            iter: Box::new(iter),
            body,
            orelse,
            location,
        };
        Ok(if is_async {
            Stmt::AsyncFor(stmt)
        } else {
            Stmt::For(stmt)
        })
    }

    fn with_statement(&mut self, is_async: bool) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.bump();

        let items = if self.at(TokenKind::Lpar) {
            let checkpoint = self.checkpoint();
            match self.parenthesized_with_items() {
                Ok(items) => items,
                Err(_) => {
                    self.rewind(checkpoint);
                    self.with_items()?
                }
            }
        } else {
            self.with_items()?
        };

        let body = self.block()?;
        let stmt = StmtWith {
            items,
            body,
            location,
        };
        Ok(if is_async {
            Stmt::AsyncWith(stmt)
        } else {
            Stmt::With(stmt)
        })
    }

    /// `with (a as x, b as y):` — only accepted when the parenthesized list
    /// is followed by `:`, otherwise the parens belong to an expression.
    fn parenthesized_with_items(&mut self) -> Result<Vec<WithItem>, ParseError> {
        self.expect(TokenKind::Lpar, "`(`")?;
        let mut items = Vec::new();
        loop {
            if self.at(TokenKind::Rpar) {
                break;
            }
            items.push(self.with_item()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Rpar, "`)`")?;
        if items.is_empty() || !self.at(TokenKind::Colon) {
            return Err(self.error_here("not a parenthesized with-item list"));
        }
        Ok(items)
    }

    fn with_items(&mut self) -> Result<Vec<WithItem>, ParseError> {
        let mut items = vec![self.with_item()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.with_item()?);
        }
        Ok(items)
    }

    fn with_item(&mut self) -> Result<WithItem, ParseError> {
        let context_expr = self.expression()?;
        let optional_vars = if self.eat(TokenKind::As) {
            let mut target = self.star_target()?;
            target.set_ctx(ExprContext::Store);
            Some(Box::new(target))
        } else {
            None
        };
        Ok(WithItem {
            context_expr,
            optional_vars,
        })
    }

    fn try_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.bump();
        let body = self.block()?;

        let mut handlers = Vec::new();
        let mut is_star: Option<bool> = None;
        while self.at(TokenKind::Except) {
            let handler_location = self.location();
            self.bump();
            let star = self.eat(TokenKind::Star);
            match is_star {
                None => is_star = Some(star),
                Some(existing) if existing != star => {
                    return Err(self.error_here("cannot mix `except` and `except*` handlers"));
                }
                _ => {}
            }
            let (r#type, name) = if self.at(TokenKind::Colon) {
                if star {
                    return Err(self.error_here("`except*` requires an exception type"));
                }
                (None, None)
            } else {
                let ty = self.expression()?;
                let name = if self.eat(TokenKind::As) {
                    Some(self.expect_name("name after `as`")?.0)
                } else {
                    None
                };
                (Some(Box::new(ty)), name)
            };
            let handler_body = self.block()?;
            handlers.push(ExceptHandler {
                r#type,
                name,
                body: handler_body,
                location: handler_location,
            });
        }

        let orelse = if self.eat(TokenKind::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat(TokenKind::Finally) {
            self.block()?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error_here("expected `except` or `finally` after `try` body"));
        }
        if handlers.is_empty() && !orelse.is_empty() {
            return Err(self.error_here("`else` clause requires at least one `except`"));
        }

        let stmt = StmtTry {
            body,
            handlers,
            orelse,
            finalbody,
            location,
        };
        Ok(if is_star == Some(true) {
            Stmt::TryStar(stmt)
        } else {
            Stmt::Try(stmt)
        })
    }

    fn decorated_statement(&mut self) -> Result<Stmt, ParseError> {
        let mut decorators = Vec::new();
        while self.at(TokenKind::At) {
            self.bump();
            decorators.push(self.named_expression()?);
            self.expect(TokenKind::Newline, "a newline after decorator")?;
        }
        match self.kind() {
            TokenKind::Def => self.function_def(false, decorators),
            TokenKind::Class => self.class_def(decorators),
            TokenKind::Async => {
                self.bump();
                if self.at(TokenKind::Def) {
                    self.function_def(true, decorators)
                } else {
                    Err(self.error_here("expected `def` after `async`"))
                }
            }
            _ => Err(self.error_here("expected `def` or `class` after decorators")),
        }
    }

    fn async_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        match self.kind() {
            TokenKind::Def => self.function_def(true, Vec::new()),
            TokenKind::For => self.for_statement(true),
            TokenKind::With => self.with_statement(true),
            _ => Err(self.error_here("expected `def`, `for`, or `with` after `async`")),
        }
    }

    fn function_def(&mut self, is_async: bool, decorators: Vec<Expr>) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.expect(TokenKind::Def, "`def`")?;
        let (name, _) = self.expect_name("function name")?;
        let type_params = self.type_params()?;
        self.expect(TokenKind::Lpar, "`(`")?;
        let parameters = if self.at(TokenKind::Rpar) {
            Parameters::default()
        } else {
            self.parameters(true)?
        };
        self.expect(TokenKind::Rpar, "`)`")?;
        let returns = if self.eat(TokenKind::Rarrow) {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        let body = self.block()?;
        let stmt = StmtFunctionDef {
            name,
            type_params,
            parameters,
            body,
            decorators,
            returns,
            location,
        };
        Ok(if is_async {
            Stmt::AsyncFunctionDef(stmt)
        } else {
            Stmt::FunctionDef(stmt)
        })
    }

    fn class_def(&mut self, decorators: Vec<Expr>) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.expect(TokenKind::Class, "`class`")?;
        let (name, _) = self.expect_name("class name")?;
        let type_params = self.type_params()?;
        let (bases, keywords) = if self.eat(TokenKind::Lpar) {
            self.call_arguments()?
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.block()?;
        Ok(Stmt::ClassDef(StmtClassDef {
            name,
            type_params,
            bases,
            keywords,
            body,
            decorators,
            location,
        }))
    }

    // -- match statement header probe ---------------------------------------

    /// Decide whether a leading `match` token opens a match statement:
    /// it does when `match <subject> :` parses. Rewinds unconditionally.
    fn probe_match_header(&mut self) -> bool {
        let checkpoint = self.checkpoint();
        self.bump();
        let is_match = self.star_expressions().is_ok() && self.at(TokenKind::Colon);
        self.rewind(checkpoint);
        is_match
    }

    fn match_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.location();
        self.expect(TokenKind::Match, "`match`")?;
        let subject = self.star_expressions()?;
        self.expect(TokenKind::Colon, "`:`")?;
        self.expect(TokenKind::Newline, "a newline after `match ...:`")?;
        self.expect(TokenKind::Indent, "an indented case block")?;

        let mut cases = Vec::new();
        while self.at(TokenKind::Case) {
            self.bump();
            let pattern = self.patterns()?;
            let guard = if self.eat(TokenKind::If) {
                Some(Box::new(self.named_expression()?))
            } else {
                None
            };
            let body = self.block()?;
            cases.push(MatchCase {
                pattern,
                guard,
                body,
            });
        }
        if cases.is_empty() {
            return Err(self.error_here("expected at least one `case` block"));
        }
        self.expect(TokenKind::Dedent, "the end of the match block")?;

        Ok(Stmt::Match(StmtMatch {
            subject: Box::new(subject),
            cases,
            location,
        }))
    }

    // -- type parameters ----------------------------------------------------

    /// PEP 695 `[T, *Ts, **P]` on `def`, `class`, and `type`.
    pub(crate) fn type_params(&mut self) -> Result<Vec<TypeParam>, ParseError> {
        if !self.eat(TokenKind::Lsqb) {
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        loop {
            if self.at(TokenKind::Rsqb) {
                break;
            }
            let location = self.location();
            if self.eat(TokenKind::Star) {
                let (name, _) = self.expect_name("type variable tuple name")?;
                params.push(TypeParam::TypeVarTuple(TypeParamTypeVarTuple {
                    name,
                    location,
                }));
            } else if self.eat(TokenKind::DoubleStar) {
                let (name, _) = self.expect_name("parameter specification name")?;
                params.push(TypeParam::ParamSpec(TypeParamParamSpec { name, location }));
            } else {
                let (name, _) = self.expect_name("type parameter name")?;
                let bound = if self.eat(TokenKind::Colon) {
                    Some(Box::new(self.expression()?))
                } else {
                    None
                };
                params.push(TypeParam::TypeVar(TypeParamTypeVar {
                    name,
                    bound,
                    location,
                }));
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Rsqb, "`]`")?;
        if params.is_empty() {
            return Err(self.error_here("type parameter list cannot be empty"));
        }
        Ok(params)
    }

    // -- parameter lists ----------------------------------------------------

    /// The parameter list of a `def` (annotations allowed) or `lambda`.
    /// Stops before the closing `)` / `:`.
    pub(crate) fn parameters(&mut self, allow_annotations: bool) -> Result<Parameters, ParseError> {
        let mut params = Parameters::default();
        let mut seen_star = false;
        let mut bare_star = false;
        let mut seen_slash = false;
        let mut seen_default = false;

        loop {
            match self.kind() {
                TokenKind::Rpar | TokenKind::Colon => break,
                TokenKind::Slash => {
                    if seen_slash || seen_star || params.args.is_empty() {
                        return Err(self.error_here("unexpected `/` in parameter list"));
                    }
                    self.bump();
                    params.posonly = std::mem::take(&mut params.args);
                    seen_slash = true;
                }
                TokenKind::Star => {
                    if seen_star {
                        return Err(self.error_here("only one `*` is allowed in a parameter list"));
                    }
                    self.bump();
                    seen_star = true;
                    if self.at_name() {
                        let parameter = self.parameter(allow_annotations, false)?;
                        params.vararg = Some(Box::new(parameter));
                    } else {
                        bare_star = true;
                    }
                }
                TokenKind::DoubleStar => {
                    self.bump();
                    let parameter = self.parameter(allow_annotations, false)?;
                    params.kwarg = Some(Box::new(parameter));
                    self.eat(TokenKind::Comma);
                    break;
                }
                _ => {
                    let parameter = self.parameter(allow_annotations, true)?;
                    if seen_star {
                        params.kwonly.push(parameter);
                    } else {
                        if parameter.default.is_none() && seen_default {
                            return Err(self.error_here(
                                "parameter without a default follows parameter with a default",
                            ));
                        }
                        if parameter.default.is_some() {
                            seen_default = true;
                        }
                        params.args.push(parameter);
                    }
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        if bare_star && params.kwonly.is_empty() {
            return Err(self.error_here("named parameters must follow bare `*`"));
        }
        Ok(params)
    }

    fn parameter(
        &mut self,
        allow_annotations: bool,
        allow_default: bool,
    ) -> Result<Parameter, ParseError> {
        let (name, location) = self.expect_name("parameter name")?;
        let annotation = if allow_annotations && self.eat(TokenKind::Colon) {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        let default = if self.at(TokenKind::Equal) {
            if !allow_default {
                return Err(self.error_here("this parameter cannot have a default value"));
            }
            self.bump();
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        Ok(Parameter {
            name,
            annotation,
            default,
            location,
        })
    }

    // -- assignment-target grammar -------------------------------------------

    /// `star_targets`: the restricted grammar for `for` targets and
    /// comprehension targets (no comparisons, so `in` terminates it). The
    /// result is tagged with `Store` context recursively.
    pub(crate) fn star_targets(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        let first = self.star_target()?;
        let mut target = if self.at(TokenKind::Comma) {
            let mut elts = vec![first];
            while self.eat(TokenKind::Comma) {
                if self.at_target_list_end() {
                    break;
                }
                elts.push(self.star_target()?);
            }
            Expr::Tuple(ExprTuple {
                elts,
                ctx: ExprContext::Store,
                location,
            })
        } else {
            first
        };
        target.set_ctx(ExprContext::Store);
        Ok(target)
    }

    fn at_target_list_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::In
                | TokenKind::Equal
                | TokenKind::Colon
                | TokenKind::Newline
                | TokenKind::Rpar
                | TokenKind::Rsqb
                | TokenKind::EndMarker
        )
    }

    /// A single target, possibly starred.
    pub(crate) fn star_target(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::Star) {
            let location = self.location();
            self.bump();
            let value = self.star_target()?;
            return Ok(Expr::Starred(ExprStarred {
                value: Box::new(value),
                ctx: ExprContext::Store,
                location,
            }));
        }
        self.single_target()
    }

    fn single_target(&mut self) -> Result<Expr, ParseError> {
        let location = self.location();
        match self.kind() {
            TokenKind::Lpar => {
                self.bump();
                if self.eat(TokenKind::Rpar) {
                    return Ok(Expr::Tuple(ExprTuple {
                        elts: Vec::new(),
                        ctx: ExprContext::Store,
                        location,
                    }));
                }
                let first = self.star_target()?;
                if self.at(TokenKind::Comma) {
                    let mut elts = vec![first];
                    while self.eat(TokenKind::Comma) {
                        if self.at(TokenKind::Rpar) {
                            break;
                        }
                        elts.push(self.star_target()?);
                    }
                    self.expect(TokenKind::Rpar, "`)`")?;
                    return Ok(Expr::Tuple(ExprTuple {
                        elts,
                        ctx: ExprContext::Store,
                        location,
                    }));
                }
                self.expect(TokenKind::Rpar, "`)`")?;
                Ok(first)
            }
            TokenKind::Lsqb => {
                self.bump();
                let mut elts = Vec::new();
                while !self.at(TokenKind::Rsqb) {
                    elts.push(self.star_target()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::Rsqb, "`]`")?;
                Ok(Expr::List(ExprList {
                    elts,
                    ctx: ExprContext::Store,
                    location,
                }))
            }
            _ => {
                let target = self.primary()?;
                if !matches!(
                    target,
                    Expr::Name(_) | Expr::Attribute(_) | Expr::Subscript(_)
                ) {
                    return Err(ParseError::new(
                        "invalid assignment target",
                        String::new(),
                        target.location(),
                    ));
                }
                Ok(target)
            }
        }
    }
}

fn aug_assign_operator(kind: TokenKind) -> Operator {
    match kind {
        TokenKind::PlusEqual => Operator::Add,
        TokenKind::MinusEqual => Operator::Sub,
        TokenKind::StarEqual => Operator::Mult,
        TokenKind::SlashEqual => Operator::Div,
        TokenKind::DoubleSlashEqual => Operator::FloorDiv,
        TokenKind::PercentEqual => Operator::Mod,
        TokenKind::AtEqual => Operator::MatMult,
        TokenKind::AmperEqual => Operator::BitAnd,
        TokenKind::VbarEqual => Operator::BitOr,
        TokenKind::CircumflexEqual => Operator::BitXor,
        TokenKind::LeftShiftEqual => Operator::LShift,
        TokenKind::RightShiftEqual => Operator::RShift,
        TokenKind::DoubleStarEqual => Operator::Pow,
        _ => unreachable!("caller checked is_aug_assign"),
    }
}

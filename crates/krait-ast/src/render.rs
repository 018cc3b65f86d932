//! Canonical source rendering.
//!
//! Turns an AST back into Python text that parses to a structurally equal
//! tree. The output is canonical rather than faithful: 4-space indentation,
//! single-quoted strings, minimal parenthesization driven by operator
//! precedence, and explicit parentheses around constructs (tuples, walrus,
//! yield) whose bare form is only legal in some positions.

use crate::nodes::*;
use crate::op::{BoolOp, Operator, UnaryOp};

/// Render a whole module.
pub fn render_module(module: &Module) -> String {
    let mut r = Renderer::new();
    r.stmts(&module.body);
    r.out
}

/// Render a single expression with no outer parentheses.
pub fn render_expr(expr: &Expr) -> String {
    let mut r = Renderer::new();
    r.expr(expr, Prec::NONE);
    r.out
}

/// Binding strengths, loosest to tightest. An expression is parenthesized
/// when its own strength is below what the surrounding position requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Prec(u8);

impl Prec {
    /// Statement positions: nothing needs parentheses.
    const NONE: Prec = Prec(0);
    /// Positions that accept any expression except bare tuples/yield/walrus
    /// (argument lists, subscript elements, comprehension iterables).
    const TEST: Prec = Prec(2);
    const TERNARY: Prec = Prec(3);
    const OR: Prec = Prec(4);
    const AND: Prec = Prec(5);
    const NOT: Prec = Prec(6);
    const CMP: Prec = Prec(7);
    const BIT_OR: Prec = Prec(8);
    const BIT_XOR: Prec = Prec(9);
    const BIT_AND: Prec = Prec(10);
    const SHIFT: Prec = Prec(11);
    const ARITH: Prec = Prec(12);
    const TERM: Prec = Prec(13);
    const UNARY: Prec = Prec(14);
    const POWER: Prec = Prec(15);
    const AWAIT: Prec = Prec(16);
    const ATOM: Prec = Prec(18);

    fn next(self) -> Prec {
        Prec(self.0 + 1)
    }
}

fn binop_prec(op: Operator) -> Prec {
    match op {
        Operator::BitOr => Prec::BIT_OR,
        Operator::BitXor => Prec::BIT_XOR,
        Operator::BitAnd => Prec::BIT_AND,
        Operator::LShift | Operator::RShift => Prec::SHIFT,
        Operator::Add | Operator::Sub => Prec::ARITH,
        Operator::Mult
        | Operator::MatMult
        | Operator::Div
        | Operator::FloorDiv
        | Operator::Mod => Prec::TERM,
        Operator::Pow => Prec::POWER,
    }
}

struct Renderer {
    out: String,
    indent: usize,
}

impl Renderer {
    fn new() -> Self {
        Renderer {
            out: String::new(),
            indent: 0,
        }
    }

    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn newline(&mut self) {
        self.out.push('\n');
    }

    // -- statements ---------------------------------------------------------

    fn stmts(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn block(&mut self, body: &[Stmt]) {
        self.push(":");
        self.newline();
        self.indent += 1;
        if body.is_empty() {
            self.line_start();
            self.push("pass");
            self.newline();
        } else {
            self.stmts(body);
        }
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(s) => self.function_def(s, false),
            Stmt::AsyncFunctionDef(s) => self.function_def(s, true),
            Stmt::ClassDef(s) => self.class_def(s),
            Stmt::Return(s) => {
                self.line_start();
                self.push("return");
                if let Some(value) = &s.value {
                    self.push(" ");
                    self.expr(value, Prec::NONE);
                }
                self.newline();
            }
            Stmt::Delete(s) => {
                self.line_start();
                self.push("del ");
                self.comma_exprs(&s.targets, Prec::TEST);
                self.newline();
            }
            Stmt::Assign(s) => {
                self.line_start();
                for target in &s.targets {
                    self.expr(target, Prec::NONE);
                    self.push(" = ");
                }
                self.expr(&s.value, Prec::NONE);
                self.newline();
            }
            Stmt::AugAssign(s) => {
                self.line_start();
                self.expr(&s.target, Prec::NONE);
                self.push(" ");
                self.push(s.op.as_str());
                self.push("= ");
                self.expr(&s.value, Prec::NONE);
                self.newline();
            }
            Stmt::AnnAssign(s) => {
                self.line_start();
                self.expr(&s.target, Prec::ATOM);
                self.push(": ");
                self.expr(&s.annotation, Prec::TEST);
                if let Some(value) = &s.value {
                    self.push(" = ");
                    self.expr(value, Prec::NONE);
                }
                self.newline();
            }
            Stmt::TypeAlias(s) => {
                self.line_start();
                self.push("type ");
                self.push(&s.name);
                self.type_params(&s.type_params);
                self.push(" = ");
                self.expr(&s.value, Prec::TEST);
                self.newline();
            }
            Stmt::For(s) | Stmt::AsyncFor(s) => {
                self.line_start();
                if matches!(stmt, Stmt::AsyncFor(_)) {
                    self.push("async ");
                }
                self.push("for ");
                self.expr(&s.target, Prec::NONE);
                self.push(" in ");
                self.expr(&s.iter, Prec::NONE);
                self.block(&s.body);
                if !s.orelse.is_empty() {
                    self.line_start();
                    self.push("else");
                    self.block(&s.orelse);
                }
            }
            Stmt::While(s) => {
                self.line_start();
                self.push("while ");
                self.expr(&s.test, Prec::NONE);
                self.block(&s.body);
                if !s.orelse.is_empty() {
                    self.line_start();
                    self.push("else");
                    self.block(&s.orelse);
                }
            }
            Stmt::If(s) => self.if_stmt(s, "if"),
            Stmt::With(s) | Stmt::AsyncWith(s) => {
                self.line_start();
                if matches!(stmt, Stmt::AsyncWith(_)) {
                    self.push("async ");
                }
                self.push("with ");
                for (i, item) in s.items.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(&item.context_expr, Prec::TEST);
                    if let Some(vars) = &item.optional_vars {
                        self.push(" as ");
                        self.expr(vars, Prec::TEST);
                    }
                }
                self.block(&s.body);
            }
            Stmt::Match(s) => {
                self.line_start();
                self.push("match ");
                self.expr(&s.subject, Prec::NONE);
                self.push(":");
                self.newline();
                self.indent += 1;
                for case in &s.cases {
                    self.line_start();
                    self.push("case ");
                    self.pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.push(" if ");
                        self.expr(guard, Prec::TEST);
                    }
                    self.block(&case.body);
                }
                self.indent -= 1;
            }
            Stmt::Raise(s) => {
                self.line_start();
                self.push("raise");
                if let Some(exc) = &s.exc {
                    self.push(" ");
                    self.expr(exc, Prec::TEST);
                    if let Some(cause) = &s.cause {
                        self.push(" from ");
                        self.expr(cause, Prec::TEST);
                    }
                }
                self.newline();
            }
            Stmt::Try(s) | Stmt::TryStar(s) => {
                let star = matches!(stmt, Stmt::TryStar(_));
                self.line_start();
                self.push("try");
                self.block(&s.body);
                for handler in &s.handlers {
                    self.line_start();
                    self.push(if star { "except* " } else { "except" });
                    if let Some(ty) = &handler.r#type {
                        if !star {
                            self.push(" ");
                        }
                        self.expr(ty, Prec::TEST);
                        if let Some(name) = &handler.name {
                            self.push(" as ");
                            self.push(name);
                        }
                    }
                    self.block(&handler.body);
                }
                if !s.orelse.is_empty() {
                    self.line_start();
                    self.push("else");
                    self.block(&s.orelse);
                }
                if !s.finalbody.is_empty() {
                    self.line_start();
                    self.push("finally");
                    self.block(&s.finalbody);
                }
            }
            Stmt::Assert(s) => {
                self.line_start();
                self.push("assert ");
                self.expr(&s.test, Prec::TEST);
                if let Some(msg) = &s.msg {
                    self.push(", ");
                    self.expr(msg, Prec::TEST);
                }
                self.newline();
            }
            Stmt::Import(s) => {
                self.line_start();
                self.push("import ");
                self.aliases(&s.names);
                self.newline();
            }
            Stmt::ImportFrom(s) => {
                self.line_start();
                self.push("from ");
                for _ in 0..s.level {
                    self.push(".");
                }
                if let Some(module) = &s.module {
                    self.push(module);
                }
                self.push(" import ");
                self.aliases(&s.names);
                self.newline();
            }
            Stmt::Global(s) => {
                self.line_start();
                self.push("global ");
                self.push(&s.names.join(", "));
                self.newline();
            }
            Stmt::Nonlocal(s) => {
                self.line_start();
                self.push("nonlocal ");
                self.push(&s.names.join(", "));
                self.newline();
            }
            Stmt::Expr(s) => {
                self.line_start();
                self.expr(&s.value, Prec::NONE);
                self.newline();
            }
            Stmt::Pass(_) => {
                self.line_start();
                self.push("pass");
                self.newline();
            }
            Stmt::Break(_) => {
                self.line_start();
                self.push("break");
                self.newline();
            }
            Stmt::Continue(_) => {
                self.line_start();
                self.push("continue");
                self.newline();
            }
        }
    }

    fn if_stmt(&mut self, s: &StmtIf, keyword: &str) {
        self.line_start();
        self.push(keyword);
        self.push(" ");
        self.expr(&s.test, Prec::NONE);
        self.block(&s.body);
        // A sole nested `If` in orelse renders back as `elif`.
        match s.orelse.as_slice() {
            [] => {}
            [Stmt::If(nested)] => self.if_stmt(nested, "elif"),
            other => {
                self.line_start();
                self.push("else");
                self.block(other);
            }
        }
    }

    fn function_def(&mut self, s: &StmtFunctionDef, is_async: bool) {
        for decorator in &s.decorators {
            self.line_start();
            self.push("@");
            self.expr(decorator, Prec::TEST);
            self.newline();
        }
        self.line_start();
        if is_async {
            self.push("async ");
        }
        self.push("def ");
        self.push(&s.name);
        self.type_params(&s.type_params);
        self.push("(");
        self.parameters(&s.parameters);
        self.push(")");
        if let Some(returns) = &s.returns {
            self.push(" -> ");
            self.expr(returns, Prec::TEST);
        }
        self.block(&s.body);
    }

    fn class_def(&mut self, s: &StmtClassDef) {
        for decorator in &s.decorators {
            self.line_start();
            self.push("@");
            self.expr(decorator, Prec::TEST);
            self.newline();
        }
        self.line_start();
        self.push("class ");
        self.push(&s.name);
        self.type_params(&s.type_params);
        if !s.bases.is_empty() || !s.keywords.is_empty() {
            self.push("(");
            let mut first = true;
            for base in &s.bases {
                if !first {
                    self.push(", ");
                }
                first = false;
                self.expr(base, Prec::TEST);
            }
            for kw in &s.keywords {
                if !first {
                    self.push(", ");
                }
                first = false;
                self.keyword(kw);
            }
            self.push(")");
        }
        self.block(&s.body);
    }

    fn type_params(&mut self, params: &[TypeParam]) {
        if params.is_empty() {
            return;
        }
        self.push("[");
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match param {
                TypeParam::TypeVar(p) => {
                    self.push(&p.name);
                    if let Some(bound) = &p.bound {
                        self.push(": ");
                        self.expr(bound, Prec::TEST);
                    }
                }
                TypeParam::ParamSpec(p) => {
                    self.push("**");
                    self.push(&p.name);
                }
                TypeParam::TypeVarTuple(p) => {
                    self.push("*");
                    self.push(&p.name);
                }
            }
        }
        self.push("]");
    }

    fn parameters(&mut self, params: &Parameters) {
        let mut first = true;
        let mut sep = |r: &mut Self| {
            if !first {
                r.push(", ");
            }
            first = false;
        };
        for p in &params.posonly {
            sep(self);
            self.parameter(p);
        }
        if !params.posonly.is_empty() {
            sep(self);
            self.push("/");
        }
        for p in &params.args {
            sep(self);
            self.parameter(p);
        }
        if let Some(vararg) = &params.vararg {
            sep(self);
            self.push("*");
            self.parameter(vararg);
        } else if !params.kwonly.is_empty() {
            sep(self);
            self.push("*");
        }
        for p in &params.kwonly {
            sep(self);
            self.parameter(p);
        }
        if let Some(kwarg) = &params.kwarg {
            sep(self);
            self.push("**");
            self.parameter(kwarg);
        }
    }

    fn parameter(&mut self, p: &Parameter) {
        self.push(&p.name);
        if let Some(annotation) = &p.annotation {
            self.push(": ");
            self.expr(annotation, Prec::TEST);
            if let Some(default) = &p.default {
                self.push(" = ");
                self.expr(default, Prec::TEST);
            }
        } else if let Some(default) = &p.default {
            self.push("=");
            self.expr(default, Prec::TEST);
        }
    }

    fn aliases(&mut self, names: &[Alias]) {
        for (i, alias) in names.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(&alias.name);
            if let Some(asname) = &alias.asname {
                self.push(" as ");
                self.push(asname);
            }
        }
    }

    fn keyword(&mut self, kw: &Keyword) {
        match &kw.arg {
            Some(name) => {
                self.push(name);
                self.push("=");
                self.expr(&kw.value, Prec::TEST);
            }
            None => {
                self.push("**");
                self.expr(&kw.value, Prec::TEST);
            }
        }
    }

    // -- patterns -----------------------------------------------------------

    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::MatchValue(p) => self.expr(&p.value, Prec::CMP),
            Pattern::MatchSingleton(p) => self.push(&p.value.py_repr()),
            Pattern::MatchSequence(p) => {
                self.push("[");
                for (i, sub) in p.patterns.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.pattern(sub);
                }
                self.push("]");
            }
            Pattern::MatchMapping(p) => {
                self.push("{");
                let mut first = true;
                for (key, sub) in p.keys.iter().zip(&p.patterns) {
                    if !first {
                        self.push(", ");
                    }
                    first = false;
                    self.expr(key, Prec::TEST);
                    self.push(": ");
                    self.pattern(sub);
                }
                if let Some(rest) = &p.rest {
                    if !first {
                        self.push(", ");
                    }
                    self.push("**");
                    self.push(rest);
                }
                self.push("}");
            }
            Pattern::MatchClass(p) => {
                self.expr(&p.cls, Prec::ATOM);
                self.push("(");
                let mut first = true;
                for sub in &p.patterns {
                    if !first {
                        self.push(", ");
                    }
                    first = false;
                    self.pattern(sub);
                }
                for (attr, sub) in p.kwd_attrs.iter().zip(&p.kwd_patterns) {
                    if !first {
                        self.push(", ");
                    }
                    first = false;
                    self.push(attr);
                    self.push("=");
                    self.pattern(sub);
                }
                self.push(")");
            }
            Pattern::MatchStar(p) => {
                self.push("*");
                self.push(p.name.as_deref().unwrap_or("_"));
            }
            Pattern::MatchAs(p) => match (&p.pattern, &p.name) {
                (Some(sub), Some(name)) => {
                    self.pattern(sub);
                    self.push(" as ");
                    self.push(name);
                }
                (None, Some(name)) => self.push(name),
                (None, None) => self.push("_"),
                (Some(sub), None) => self.pattern(sub),
            },
            Pattern::MatchOr(p) => {
                for (i, sub) in p.patterns.iter().enumerate() {
                    if i > 0 {
                        self.push(" | ");
                    }
                    self.pattern(sub);
                }
            }
        }
    }

    // -- expressions --------------------------------------------------------

    fn comma_exprs(&mut self, exprs: &[Expr], prec: Prec) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(expr, prec);
        }
    }

    fn paren_if(&mut self, needed: bool, f: impl FnOnce(&mut Self)) {
        if needed {
            self.push("(");
        }
        f(self);
        if needed {
            self.push(")");
        }
    }

    fn expr(&mut self, expr: &Expr, min: Prec) {
        match expr {
            Expr::BoolOp(e) => {
                let prec = match e.op {
                    BoolOp::Or => Prec::OR,
                    BoolOp::And => Prec::AND,
                };
                self.paren_if(prec < min, |r| {
                    for (i, value) in e.values.iter().enumerate() {
                        if i > 0 {
                            r.push(" ");
                            r.push(e.op.as_str());
                            r.push(" ");
                        }
                        r.expr(value, prec.next());
                    }
                });
            }
            Expr::NamedExpr(e) => {
                // Always parenthesized; bare walrus is legal in so few
                // positions that the canonical form keeps the parens.
                self.push("(");
                self.expr(&e.target, Prec::ATOM);
                self.push(" := ");
                self.expr(&e.value, Prec::TEST);
                self.push(")");
            }
            Expr::BinOp(e) => {
                let prec = binop_prec(e.op);
                self.paren_if(prec < min, |r| {
                    if e.op == Operator::Pow {
                        // Right-associative.
                        r.expr(&e.left, prec.next());
                        r.push(" ** ");
                        r.expr(&e.right, prec);
                    } else {
                        r.expr(&e.left, prec);
                        r.push(" ");
                        r.push(e.op.as_str());
                        r.push(" ");
                        r.expr(&e.right, prec.next());
                    }
                });
            }
            Expr::UnaryOp(e) => {
                let prec = match e.op {
                    UnaryOp::Not => Prec::NOT,
                    _ => Prec::UNARY,
                };
                self.paren_if(prec < min, |r| {
                    r.push(e.op.as_str());
                    if e.op == UnaryOp::Not {
                        r.push(" ");
                    }
                    r.expr(&e.operand, prec);
                });
            }
            Expr::Lambda(e) => {
                self.paren_if(Prec::TERNARY < min, |r| {
                    r.push("lambda");
                    if !e.parameters.is_empty() {
                        r.push(" ");
                        r.parameters(&e.parameters);
                    }
                    r.push(": ");
                    r.expr(&e.body, Prec::TEST);
                });
            }
            Expr::IfExp(e) => {
                self.paren_if(Prec::TERNARY < min, |r| {
                    r.expr(&e.body, Prec::TERNARY.next());
                    r.push(" if ");
                    r.expr(&e.test, Prec::TERNARY.next());
                    r.push(" else ");
                    r.expr(&e.orelse, Prec::TERNARY);
                });
            }
            Expr::Dict(e) => {
                self.push("{");
                for (i, (key, value)) in e.keys.iter().zip(&e.values).enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    match key {
                        Some(key) => {
                            self.expr(key, Prec::TEST);
                            self.push(": ");
                            self.expr(value, Prec::TEST);
                        }
                        None => {
                            self.push("**");
                            self.expr(value, Prec::BIT_OR);
                        }
                    }
                }
                self.push("}");
            }
            Expr::Set(e) => {
                self.push("{");
                self.comma_exprs(&e.elts, Prec::TEST);
                self.push("}");
            }
            Expr::ListComp(e) => {
                self.push("[");
                self.expr(&e.elt, Prec::TEST);
                self.generators(&e.generators);
                self.push("]");
            }
            Expr::SetComp(e) => {
                self.push("{");
                self.expr(&e.elt, Prec::TEST);
                self.generators(&e.generators);
                self.push("}");
            }
            Expr::DictComp(e) => {
                self.push("{");
                self.expr(&e.key, Prec::TEST);
                self.push(": ");
                self.expr(&e.value, Prec::TEST);
                self.generators(&e.generators);
                self.push("}");
            }
            Expr::GeneratorExp(e) => {
                self.push("(");
                self.expr(&e.elt, Prec::TEST);
                self.generators(&e.generators);
                self.push(")");
            }
            Expr::Await(e) => {
                self.paren_if(Prec::AWAIT < min, |r| {
                    r.push("await ");
                    r.expr(&e.value, Prec::UNARY);
                });
            }
            Expr::Yield(e) => {
                self.paren_if(min > Prec::NONE, |r| {
                    r.push("yield");
                    if let Some(value) = &e.value {
                        r.push(" ");
                        r.expr(value, Prec::TEST);
                    }
                });
            }
            Expr::YieldFrom(e) => {
                self.paren_if(min > Prec::NONE, |r| {
                    r.push("yield from ");
                    r.expr(&e.value, Prec::TEST);
                });
            }
            Expr::Compare(e) => {
                self.paren_if(Prec::CMP < min, |r| {
                    r.expr(&e.left, Prec::CMP.next());
                    for (op, comparator) in e.ops.iter().zip(&e.comparators) {
                        r.push(" ");
                        r.push(op.as_str());
                        r.push(" ");
                        r.expr(comparator, Prec::CMP.next());
                    }
                });
            }
            Expr::Call(e) => {
                self.expr(&e.func, Prec::ATOM);
                self.push("(");
                let mut first = true;
                for arg in &e.args {
                    if !first {
                        self.push(", ");
                    }
                    first = false;
                    match arg {
                        Expr::Starred(starred) => {
                            self.push("*");
                            self.expr(&starred.value, Prec::TEST);
                        }
                        Expr::GeneratorExp(genexp)
                            if e.args.len() == 1 && e.keywords.is_empty() =>
                        {
                            // sum(x for x in xs) — the call parens double as
                            // the generator parens.
                            self.expr(&genexp.elt, Prec::TEST);
                            self.generators(&genexp.generators);
                        }
                        _ => self.expr(arg, Prec::TEST),
                    }
                }
                for kw in &e.keywords {
                    if !first {
                        self.push(", ");
                    }
                    first = false;
                    self.keyword(kw);
                }
                self.push(")");
            }
            Expr::FormattedValue(_) => {
                // A bare replacement field only occurs inside a JoinedStr;
                // rendering one alone wraps it in a minimal f-string.
                self.push("f'");
                self.fstring_value(expr);
                self.push("'");
            }
            Expr::JoinedStr(e) => {
                self.push(if e.is_template { "t'" } else { "f'" });
                for value in &e.values {
                    self.fstring_value(value);
                }
                self.push("'");
            }
            Expr::Constant(e) => self.push(&e.value.py_repr()),
            Expr::Attribute(e) => {
                self.expr(&e.value, Prec::ATOM);
                self.push(".");
                self.push(&e.attr);
            }
            Expr::Subscript(e) => {
                self.expr(&e.value, Prec::ATOM);
                self.push("[");
                match e.slice.as_ref() {
                    // x[1, 2] keeps the bare tuple form.
                    Expr::Tuple(t) if !t.elts.is_empty() => {
                        self.comma_exprs(&t.elts, Prec::TEST);
                    }
                    slice => self.expr(slice, Prec::TEST),
                }
                self.push("]");
            }
            Expr::Starred(e) => {
                self.push("*");
                self.expr(&e.value, Prec::BIT_OR);
            }
            Expr::Name(e) => self.push(&e.id),
            Expr::List(e) => {
                self.push("[");
                self.comma_exprs(&e.elts, Prec::TEST);
                self.push("]");
            }
            Expr::Tuple(e) => {
                self.push("(");
                self.comma_exprs(&e.elts, Prec::TEST);
                if e.elts.len() == 1 {
                    self.push(",");
                }
                self.push(")");
            }
            Expr::Slice(e) => {
                if let Some(lower) = &e.lower {
                    self.expr(lower, Prec::TEST);
                }
                self.push(":");
                if let Some(upper) = &e.upper {
                    self.expr(upper, Prec::TEST);
                }
                if let Some(step) = &e.step {
                    self.push(":");
                    self.expr(step, Prec::TEST);
                }
            }
        }
    }

    fn generators(&mut self, generators: &[Comprehension]) {
        for generator in generators {
            if generator.is_async {
                self.push(" async for ");
            } else {
                self.push(" for ");
            }
            self.expr(&generator.target, Prec::TEST);
            self.push(" in ");
            self.expr(&generator.iter, Prec::OR);
            for test in &generator.ifs {
                self.push(" if ");
                self.expr(test, Prec::OR);
            }
        }
    }

    /// Render one piece of an f-string body: a literal middle or a
    /// replacement field.
    fn fstring_value(&mut self, value: &Expr) {
        match value {
            Expr::Constant(c) => {
                if let ConstantValue::Str(s) = &c.value {
                    for ch in s.chars() {
                        match ch {
                            '{' => self.push("{{"),
                            '}' => self.push("}}"),
                            '\'' => self.push("\\'"),
                            '\\' => self.push("\\\\"),
                            '\n' => self.push("\\n"),
                            '\r' => self.push("\\r"),
                            '\t' => self.push("\\t"),
                            ch => self.out.push(ch),
                        }
                    }
                }
            }
            Expr::FormattedValue(f) => {
                self.push("{");
                self.expr(&f.value, Prec::TEST);
                if let Some(conversion) = f.conversion {
                    self.push("!");
                    self.out.push(conversion.as_char());
                }
                if let Some(spec) = &f.format_spec {
                    self.push(":");
                    if let Expr::JoinedStr(spec) = spec.as_ref() {
                        for value in &spec.values {
                            self.fstring_value(value);
                        }
                    }
                }
                self.push("}");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceLocation;

    fn name(id: &str) -> Expr {
        Expr::Name(ExprName {
            id: id.to_string(),
            ctx: ExprContext::Load,
            location: SourceLocation::default(),
        })
    }

    fn int(value: i64) -> Expr {
        Expr::Constant(ExprConstant {
            value: ConstantValue::Int(value),
            location: SourceLocation::default(),
        })
    }

    #[test]
    fn binop_precedence_parens() {
        // (a + b) * 2 keeps its parentheses; a + b * 2 has none.
        let product = Expr::BinOp(ExprBinOp {
            left: Box::new(Expr::BinOp(ExprBinOp {
                left: Box::new(name("a")),
                op: Operator::Add,
                right: Box::new(name("b")),
                location: SourceLocation::default(),
            })),
            op: Operator::Mult,
            right: Box::new(int(2)),
            location: SourceLocation::default(),
        });
        assert_eq!(render_expr(&product), "(a + b) * 2");

        let sum = Expr::BinOp(ExprBinOp {
            left: Box::new(name("a")),
            op: Operator::Add,
            right: Box::new(Expr::BinOp(ExprBinOp {
                left: Box::new(name("b")),
                op: Operator::Mult,
                right: Box::new(int(2)),
                location: SourceLocation::default(),
            })),
            location: SourceLocation::default(),
        });
        assert_eq!(render_expr(&sum), "a + b * 2");
    }

    #[test]
    fn power_is_right_associative() {
        let power = Expr::BinOp(ExprBinOp {
            left: Box::new(int(2)),
            op: Operator::Pow,
            right: Box::new(Expr::BinOp(ExprBinOp {
                left: Box::new(int(3)),
                op: Operator::Pow,
                right: Box::new(int(4)),
                location: SourceLocation::default(),
            })),
            location: SourceLocation::default(),
        });
        assert_eq!(render_expr(&power), "2 ** 3 ** 4");
    }

    #[test]
    fn single_element_tuple_keeps_trailing_comma() {
        let tuple = Expr::Tuple(ExprTuple {
            elts: vec![int(1)],
            ctx: ExprContext::Load,
            location: SourceLocation::default(),
        });
        assert_eq!(render_expr(&tuple), "(1,)");
    }
}

//! Statement, expression, pattern, and type-parameter nodes.
//!
//! One struct per node kind, one enum per syntactic family. Child expressions
//! are boxed so the enums stay small; lists of children are plain `Vec`s. The
//! tree is strictly hierarchical: a node owns its children and nothing else
//! holds a reference into it.

use crate::SourceLocation;
use crate::op::{BoolOp, CmpOp, Operator, UnaryOp};

/// The grammatical position of an expression.
///
/// Assignment and `del` targets carry `Store` / `Del`; everything else is
/// `Load`. Only Name, Attribute, Subscript, Starred, List, and Tuple can
/// appear in Store or Del position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExprContext {
    #[default]
    Load,
    Store,
    Del,
}

/// A literal constant value.
///
/// Integers are `i64`; literals that do not fit produce a lexical error
/// rather than silently widening. `Ellipsis` is modeled as a constant, the
/// same way CPython's `ast.Constant` carries `...`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstantValue {
    None,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl ConstantValue {
    pub fn is_none(&self) -> bool {
        matches!(self, ConstantValue::None)
    }

    /// Python `repr()` of the value, used by the renderer and disassembler.
    pub fn py_repr(&self) -> String {
        match self {
            ConstantValue::None => "None".to_string(),
            ConstantValue::Ellipsis => "...".to_string(),
            ConstantValue::Bool(true) => "True".to_string(),
            ConstantValue::Bool(false) => "False".to_string(),
            ConstantValue::Int(i) => i.to_string(),
            ConstantValue::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e16 {
                    format!("{f:.1}")
                } else {
                    format!("{f}")
                }
            }
            ConstantValue::Str(s) => {
                let escaped = s
                    .chars()
                    .flat_map(|c| match c {
                        '\'' => vec!['\\', '\''],
                        '\\' => vec!['\\', '\\'],
                        '\n' => vec!['\\', 'n'],
                        '\r' => vec!['\\', 'r'],
                        '\t' => vec!['\\', 't'],
                        c => vec![c],
                    })
                    .collect::<String>();
                format!("'{escaped}'")
            }
            ConstantValue::Bytes(b) => {
                let mut out = String::from("b'");
                for &byte in b {
                    match byte {
                        b'\'' => out.push_str("\\'"),
                        b'\\' => out.push_str("\\\\"),
                        b'\n' => out.push_str("\\n"),
                        b'\r' => out.push_str("\\r"),
                        b'\t' => out.push_str("\\t"),
                        0x20..=0x7e => out.push(byte as char),
                        _ => out.push_str(&format!("\\x{byte:02x}")),
                    }
                }
                out.push('\'');
                out
            }
        }
    }
}

/// The `!s` / `!r` / `!a` conversion in a replacement field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Conversion {
    Str,
    Repr,
    Ascii,
}

impl Conversion {
    pub fn as_char(self) -> char {
        match self {
            Conversion::Str => 's',
            Conversion::Repr => 'r',
            Conversion::Ascii => 'a',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            's' => Some(Conversion::Str),
            'r' => Some(Conversion::Repr),
            'a' => Some(Conversion::Ascii),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Module root
// ---------------------------------------------------------------------------

/// The root of a parsed source file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Module {
    pub body: Vec<Stmt>,
    pub location: SourceLocation,
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// A statement.
///
/// `AsyncFunctionDef`, `AsyncFor`, `AsyncWith`, and `TryStar` reuse the node
/// struct of their synchronous / plain counterpart; the variant itself is the
/// distinguishing tag.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stmt {
    FunctionDef(StmtFunctionDef),
    AsyncFunctionDef(StmtFunctionDef),
    ClassDef(StmtClassDef),
    Return(StmtReturn),
    Delete(StmtDelete),
    Assign(StmtAssign),
    AugAssign(StmtAugAssign),
    AnnAssign(StmtAnnAssign),
    TypeAlias(StmtTypeAlias),
    For(StmtFor),
    AsyncFor(StmtFor),
    While(StmtWhile),
    If(StmtIf),
    With(StmtWith),
    AsyncWith(StmtWith),
    Match(StmtMatch),
    Raise(StmtRaise),
    Try(StmtTry),
    TryStar(StmtTry),
    Assert(StmtAssert),
    Import(StmtImport),
    ImportFrom(StmtImportFrom),
    Global(StmtGlobal),
    Nonlocal(StmtNonlocal),
    Expr(StmtExpr),
    Pass(StmtPass),
    Break(StmtBreak),
    Continue(StmtContinue),
}

impl Stmt {
    pub fn location(&self) -> SourceLocation {
        match self {
            Stmt::FunctionDef(s) | Stmt::AsyncFunctionDef(s) => s.location,
            Stmt::ClassDef(s) => s.location,
            Stmt::Return(s) => s.location,
            Stmt::Delete(s) => s.location,
            Stmt::Assign(s) => s.location,
            Stmt::AugAssign(s) => s.location,
            Stmt::AnnAssign(s) => s.location,
            Stmt::TypeAlias(s) => s.location,
            Stmt::For(s) | Stmt::AsyncFor(s) => s.location,
            Stmt::While(s) => s.location,
            Stmt::If(s) => s.location,
            Stmt::With(s) | Stmt::AsyncWith(s) => s.location,
            Stmt::Match(s) => s.location,
            Stmt::Raise(s) => s.location,
            Stmt::Try(s) | Stmt::TryStar(s) => s.location,
            Stmt::Assert(s) => s.location,
            Stmt::Import(s) => s.location,
            Stmt::ImportFrom(s) => s.location,
            Stmt::Global(s) => s.location,
            Stmt::Nonlocal(s) => s.location,
            Stmt::Expr(s) => s.location,
            Stmt::Pass(s) => s.location,
            Stmt::Break(s) => s.location,
            Stmt::Continue(s) => s.location,
        }
    }
}

/// `def name[T](params) -> returns: body`, possibly decorated or async.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtFunctionDef {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub parameters: Parameters,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub returns: Option<Box<Expr>>,
    pub location: SourceLocation,
}

/// `class name[T](bases, **keywords): body`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtClassDef {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub bases: Vec<Expr>,
    pub keywords: Vec<Keyword>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtReturn {
    pub value: Option<Box<Expr>>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtDelete {
    pub targets: Vec<Expr>,
    pub location: SourceLocation,
}

/// `a = b = value`. Every target carries `Store` context.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtAssign {
    pub targets: Vec<Expr>,
    pub value: Box<Expr>,
    pub location: SourceLocation,
}

/// `target op= value`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtAugAssign {
    pub target: Box<Expr>,
    pub op: Operator,
    pub value: Box<Expr>,
    pub location: SourceLocation,
}

/// `target: annotation = value`. `simple` is true for a bare unparenthesized
/// name, which is what makes the annotation land in the scope's annotations.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtAnnAssign {
    pub target: Box<Expr>,
    pub annotation: Box<Expr>,
    pub value: Option<Box<Expr>>,
    pub simple: bool,
    pub location: SourceLocation,
}

/// PEP 695 `type Alias[T] = value`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtTypeAlias {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub value: Box<Expr>,
    pub location: SourceLocation,
}

/// `for target in iter: body else: orelse` (also the async variant).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtFor {
    pub target: Box<Expr>,
    pub iter: Box<Expr>,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtWhile {
    pub test: Box<Expr>,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub location: SourceLocation,
}

/// `if test: body` with `elif` chains nested as a single `If` statement in
/// `orelse`, preserving source order the way CPython's grammar does.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtIf {
    pub test: Box<Expr>,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtWith {
    pub items: Vec<WithItem>,
    pub body: Vec<Stmt>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtMatch {
    pub subject: Box<Expr>,
    pub cases: Vec<MatchCase>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtRaise {
    pub exc: Option<Box<Expr>>,
    pub cause: Option<Box<Expr>>,
    pub location: SourceLocation,
}

/// `try` / `except` / `else` / `finally`. `TryStar` (except*) shares this
/// node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtTry {
    pub body: Vec<Stmt>,
    pub handlers: Vec<ExceptHandler>,
    pub orelse: Vec<Stmt>,
    pub finalbody: Vec<Stmt>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtAssert {
    pub test: Box<Expr>,
    pub msg: Option<Box<Expr>>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtImport {
    pub names: Vec<Alias>,
    pub location: SourceLocation,
}

/// `from .module import name as alias`. `level` counts leading dots.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtImportFrom {
    pub module: Option<String>,
    pub names: Vec<Alias>,
    pub level: u32,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtGlobal {
    pub names: Vec<String>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtNonlocal {
    pub names: Vec<String>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtExpr {
    pub value: Box<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtPass {
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtBreak {
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StmtContinue {
    pub location: SourceLocation,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// An expression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    BoolOp(ExprBoolOp),
    NamedExpr(ExprNamedExpr),
    BinOp(ExprBinOp),
    UnaryOp(ExprUnaryOp),
    Lambda(ExprLambda),
    IfExp(ExprIfExp),
    Dict(ExprDict),
    Set(ExprSet),
    ListComp(ExprListComp),
    SetComp(ExprSetComp),
    DictComp(ExprDictComp),
    GeneratorExp(ExprGeneratorExp),
    Await(ExprAwait),
    Yield(ExprYield),
    YieldFrom(ExprYieldFrom),
    Compare(ExprCompare),
    Call(ExprCall),
    FormattedValue(ExprFormattedValue),
    JoinedStr(ExprJoinedStr),
    Constant(ExprConstant),
    Attribute(ExprAttribute),
    Subscript(ExprSubscript),
    Starred(ExprStarred),
    Name(ExprName),
    List(ExprList),
    Tuple(ExprTuple),
    Slice(ExprSlice),
}

impl Expr {
    pub fn location(&self) -> SourceLocation {
        match self {
            Expr::BoolOp(e) => e.location,
            Expr::NamedExpr(e) => e.location,
            Expr::BinOp(e) => e.location,
            Expr::UnaryOp(e) => e.location,
            Expr::Lambda(e) => e.location,
            Expr::IfExp(e) => e.location,
            Expr::Dict(e) => e.location,
            Expr::Set(e) => e.location,
            Expr::ListComp(e) => e.location,
            Expr::SetComp(e) => e.location,
            Expr::DictComp(e) => e.location,
            Expr::GeneratorExp(e) => e.location,
            Expr::Await(e) => e.location,
            Expr::Yield(e) => e.location,
            Expr::YieldFrom(e) => e.location,
            Expr::Compare(e) => e.location,
            Expr::Call(e) => e.location,
            Expr::FormattedValue(e) => e.location,
            Expr::JoinedStr(e) => e.location,
            Expr::Constant(e) => e.location,
            Expr::Attribute(e) => e.location,
            Expr::Subscript(e) => e.location,
            Expr::Starred(e) => e.location,
            Expr::Name(e) => e.location,
            Expr::List(e) => e.location,
            Expr::Tuple(e) => e.location,
            Expr::Slice(e) => e.location,
        }
    }

    /// The context of this expression, if it is a kind that carries one.
    pub fn ctx(&self) -> Option<ExprContext> {
        match self {
            Expr::Attribute(e) => Some(e.ctx),
            Expr::Subscript(e) => Some(e.ctx),
            Expr::Starred(e) => Some(e.ctx),
            Expr::Name(e) => Some(e.ctx),
            Expr::List(e) => Some(e.ctx),
            Expr::Tuple(e) => Some(e.ctx),
            _ => None,
        }
    }

    /// Recursively re-tag this expression (and, for sequences and starred
    /// expressions, its elements) with the given context.
    ///
    /// The parser calls this after recognizing an assignment or `del` target;
    /// everything parses as Load first and is re-tagged once the grammatical
    /// position is known.
    pub fn set_ctx(&mut self, ctx: ExprContext) {
        match self {
            Expr::Attribute(e) => e.ctx = ctx,
            Expr::Subscript(e) => e.ctx = ctx,
            Expr::Name(e) => e.ctx = ctx,
            Expr::Starred(e) => {
                e.ctx = ctx;
                e.value.set_ctx(ctx);
            }
            Expr::List(e) => {
                e.ctx = ctx;
                for elt in &mut e.elts {
                    elt.set_ctx(ctx);
                }
            }
            Expr::Tuple(e) => {
                e.ctx = ctx;
                for elt in &mut e.elts {
                    elt.set_ctx(ctx);
                }
            }
            _ => {}
        }
    }

    /// Whether this expression is a valid assignment / `del` target.
    pub fn is_assignable(&self) -> bool {
        match self {
            Expr::Name(_) | Expr::Attribute(_) | Expr::Subscript(_) => true,
            Expr::Starred(e) => e.value.is_assignable(),
            Expr::List(e) => e.elts.iter().all(Expr::is_assignable),
            Expr::Tuple(e) => e.elts.iter().all(Expr::is_assignable),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprBoolOp {
    pub op: BoolOp,
    pub values: Vec<Expr>,
    pub location: SourceLocation,
}

/// The walrus operator `target := value`. The target is always a simple name.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprNamedExpr {
    pub target: Box<Expr>,
    pub value: Box<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprBinOp {
    pub left: Box<Expr>,
    pub op: Operator,
    pub right: Box<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprUnaryOp {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprLambda {
    pub parameters: Parameters,
    pub body: Box<Expr>,
    pub location: SourceLocation,
}

/// `body if test else orelse`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprIfExp {
    pub test: Box<Expr>,
    pub body: Box<Expr>,
    pub orelse: Box<Expr>,
    pub location: SourceLocation,
}

/// A dict display. A `None` key marks a `**mapping` unpacking item.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprDict {
    pub keys: Vec<Option<Expr>>,
    pub values: Vec<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprSet {
    pub elts: Vec<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprListComp {
    pub elt: Box<Expr>,
    pub generators: Vec<Comprehension>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprSetComp {
    pub elt: Box<Expr>,
    pub generators: Vec<Comprehension>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprDictComp {
    pub key: Box<Expr>,
    pub value: Box<Expr>,
    pub generators: Vec<Comprehension>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprGeneratorExp {
    pub elt: Box<Expr>,
    pub generators: Vec<Comprehension>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprAwait {
    pub value: Box<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprYield {
    pub value: Option<Box<Expr>>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprYieldFrom {
    pub value: Box<Expr>,
    pub location: SourceLocation,
}

/// A comparison chain: `left ops[0] comparators[0] ops[1] comparators[1] ...`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprCompare {
    pub left: Box<Expr>,
    pub ops: Vec<CmpOp>,
    pub comparators: Vec<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprCall {
    pub func: Box<Expr>,
    pub args: Vec<Expr>,
    pub keywords: Vec<Keyword>,
    pub location: SourceLocation,
}

/// One `{...}` replacement field of an f-string or t-string.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprFormattedValue {
    pub value: Box<Expr>,
    pub conversion: Option<Conversion>,
    /// The format spec is itself a [`ExprJoinedStr`]: literal pieces plus
    /// nested replacement fields.
    pub format_spec: Option<Box<Expr>>,
    pub location: SourceLocation,
}

/// A whole f-string or t-string: interleaved string constants and
/// [`ExprFormattedValue`]s.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprJoinedStr {
    pub values: Vec<Expr>,
    /// True for t-strings (template strings); they build a template object
    /// instead of eagerly formatting.
    pub is_template: bool,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprConstant {
    pub value: ConstantValue,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprAttribute {
    pub value: Box<Expr>,
    pub attr: String,
    pub ctx: ExprContext,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprSubscript {
    pub value: Box<Expr>,
    pub slice: Box<Expr>,
    pub ctx: ExprContext,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprStarred {
    pub value: Box<Expr>,
    pub ctx: ExprContext,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprName {
    pub id: String,
    pub ctx: ExprContext,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprList {
    pub elts: Vec<Expr>,
    pub ctx: ExprContext,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprTuple {
    pub elts: Vec<Expr>,
    pub ctx: ExprContext,
    pub location: SourceLocation,
}

/// `lower:upper:step` inside a subscript.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprSlice {
    pub lower: Option<Box<Expr>>,
    pub upper: Option<Box<Expr>>,
    pub step: Option<Box<Expr>>,
    pub location: SourceLocation,
}

// ---------------------------------------------------------------------------
// Helper records
// ---------------------------------------------------------------------------

/// The full parameter list of a function or lambda.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameters {
    /// Parameters before a `/` marker.
    pub posonly: Vec<Parameter>,
    /// Regular positional-or-keyword parameters.
    pub args: Vec<Parameter>,
    /// The `*args` parameter, if any.
    pub vararg: Option<Box<Parameter>>,
    /// Keyword-only parameters (after `*` or `*args`).
    pub kwonly: Vec<Parameter>,
    /// The `**kwargs` parameter, if any.
    pub kwarg: Option<Box<Parameter>>,
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        self.posonly.is_empty()
            && self.args.is_empty()
            && self.vararg.is_none()
            && self.kwonly.is_empty()
            && self.kwarg.is_none()
    }

    /// All parameter names in binding order: positional-only, positional,
    /// vararg, keyword-only, kwarg. This is the order locals are numbered in.
    pub fn iter_names(&self) -> impl Iterator<Item = &str> {
        self.posonly
            .iter()
            .chain(&self.args)
            .map(|p| p.name.as_str())
            .chain(self.vararg.iter().map(|p| p.name.as_str()))
            .chain(self.kwonly.iter().map(|p| p.name.as_str()))
            .chain(self.kwarg.iter().map(|p| p.name.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameter {
    pub name: String,
    pub annotation: Option<Box<Expr>>,
    pub default: Option<Box<Expr>>,
    pub location: SourceLocation,
}

/// A keyword argument in a call. `arg == None` marks `**mapping`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Keyword {
    pub arg: Option<String>,
    pub value: Expr,
    pub location: SourceLocation,
}

/// One `for target in iter` clause of a comprehension, with its `if` tests.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

/// One `except` (or `except*`) clause.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExceptHandler {
    pub r#type: Option<Box<Expr>>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
    pub location: SourceLocation,
}

/// One `expr as target` item of a `with` statement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WithItem {
    pub context_expr: Expr,
    pub optional_vars: Option<Box<Expr>>,
}

/// One `case pattern if guard: body` clause.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Box<Expr>>,
    pub body: Vec<Stmt>,
}

/// An import alias: `name as asname`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
    pub location: SourceLocation,
}

// ---------------------------------------------------------------------------
// Patterns (PEP 634)
// ---------------------------------------------------------------------------

/// A `match` pattern.
///
/// Literal and value patterns are both `MatchValue`; `None` / `True` / `False`
/// use `MatchSingleton` because they compare by identity. A capture or
/// wildcard is `MatchAs` with no inner pattern (`name == None` is `_`).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Pattern {
    MatchValue(PatternMatchValue),
    MatchSingleton(PatternMatchSingleton),
    MatchSequence(PatternMatchSequence),
    MatchMapping(PatternMatchMapping),
    MatchClass(PatternMatchClass),
    MatchStar(PatternMatchStar),
    MatchAs(PatternMatchAs),
    MatchOr(PatternMatchOr),
}

impl Pattern {
    pub fn location(&self) -> SourceLocation {
        match self {
            Pattern::MatchValue(p) => p.location,
            Pattern::MatchSingleton(p) => p.location,
            Pattern::MatchSequence(p) => p.location,
            Pattern::MatchMapping(p) => p.location,
            Pattern::MatchClass(p) => p.location,
            Pattern::MatchStar(p) => p.location,
            Pattern::MatchAs(p) => p.location,
            Pattern::MatchOr(p) => p.location,
        }
    }

    /// Whether the pattern matches every subject (a wildcard or bare capture).
    pub fn is_irrefutable(&self) -> bool {
        match self {
            Pattern::MatchAs(p) => p.pattern.is_none(),
            Pattern::MatchOr(p) => p.patterns.iter().any(Pattern::is_irrefutable),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternMatchValue {
    pub value: Box<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternMatchSingleton {
    pub value: ConstantValue,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternMatchSequence {
    pub patterns: Vec<Pattern>,
    pub location: SourceLocation,
}

/// `{key: pattern, ..., **rest}`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternMatchMapping {
    pub keys: Vec<Expr>,
    pub patterns: Vec<Pattern>,
    pub rest: Option<String>,
    pub location: SourceLocation,
}

/// `Cls(pattern, ..., attr=pattern, ...)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternMatchClass {
    pub cls: Box<Expr>,
    pub patterns: Vec<Pattern>,
    pub kwd_attrs: Vec<String>,
    pub kwd_patterns: Vec<Pattern>,
    pub location: SourceLocation,
}

/// `*name` (or `*_`) inside a sequence pattern.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternMatchStar {
    pub name: Option<String>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternMatchAs {
    pub pattern: Option<Box<Pattern>>,
    pub name: Option<String>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternMatchOr {
    pub patterns: Vec<Pattern>,
    pub location: SourceLocation,
}

// ---------------------------------------------------------------------------
// Type parameters (PEP 695)
// ---------------------------------------------------------------------------

/// A type parameter in a `def`, `class`, or `type` declaration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeParam {
    TypeVar(TypeParamTypeVar),
    ParamSpec(TypeParamParamSpec),
    TypeVarTuple(TypeParamTypeVarTuple),
}

impl TypeParam {
    pub fn name(&self) -> &str {
        match self {
            TypeParam::TypeVar(p) => &p.name,
            TypeParam::ParamSpec(p) => &p.name,
            TypeParam::TypeVarTuple(p) => &p.name,
        }
    }

    pub fn location(&self) -> SourceLocation {
        match self {
            TypeParam::TypeVar(p) => p.location,
            TypeParam::ParamSpec(p) => p.location,
            TypeParam::TypeVarTuple(p) => p.location,
        }
    }
}

/// `T` or `T: bound`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeParamTypeVar {
    pub name: String,
    pub bound: Option<Box<Expr>>,
    pub location: SourceLocation,
}

/// `**P`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeParamParamSpec {
    pub name: String,
    pub location: SourceLocation,
}

/// `*Ts`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeParamTypeVarTuple {
    pub name: String,
    pub location: SourceLocation,
}

//! The bytecode compiler: AST in, [`CodeObject`] tree out.
//!
//! The compiler walks the tree once, keeping a stack of scope records. Each
//! scope owns the code object it is building; at scope exit the object is
//! finalized and interned as a constant in its parent. Forward jumps are
//! emitted with a placeholder argument and patched when the target is
//! reached; backward jumps know their target at emission.
//!
//! Errors do not abort compilation. They accumulate on the compiler
//! ([`CompileError`]) so one run reports everything; a code object produced
//! alongside errors is not guaranteed executable.

use krait_ast::{
    BoolOp, CmpOp, Comprehension, Conversion, Expr, ExprCall, ExprCompare, ExprJoinedStr,
    Keyword, Module, Parameters, SourceLocation, Stmt, StmtClassDef, StmtFor, StmtFunctionDef,
    StmtIf, StmtImportFrom, StmtTry, StmtTypeAlias, StmtWhile, StmtWith, TypeParam, UnaryOp,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::bytecode::{BinaryOpArg, CompareOpArg, Opcode, conversion, intrinsic1, intrinsic2};
use crate::code::{CodeFlags, CodeObject, Constant, Instruction};
use crate::error::{CompileError, CompileErrorKind};

mod pattern;

/// Compile a parsed module into its top-level code object.
///
/// The error list is part of the result, not a failure: callers decide
/// whether a non-empty list is fatal.
pub fn compile_module(module: &Module, filename: &str) -> (CodeObject, Vec<CompileError>) {
    let mut compiler = Compiler {
        filename: filename.to_string(),
        scopes: Vec::new(),
        errors: Vec::new(),
    };

    compiler.push_scope(
        ScopeKind::Module,
        "<module>",
        "<module>".to_string(),
        CodeFlags::empty(),
        module.location.line,
    );
    let line = module.location.line.max(1);
    compiler.emit(Opcode::Resume, 0, line);
    if stmts_contain_annotation(&module.body) {
        compiler.emit(Opcode::SetupAnnotations, 0, line);
    }
    for stmt in &module.body {
        compiler.compile_stmt(stmt);
    }
    compiler.emit_none(line);
    compiler.emit(Opcode::ReturnValue, 0, line);

    let code = compiler.pop_scope();
    (code, compiler.errors)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Module,
    Function,
    Class,
    Comprehension,
}

/// A loop being compiled: where `continue` goes, and the `break` jumps that
/// still need a target.
struct Loop {
    head: u32,
    breaks: Vec<usize>,
    is_for: bool,
}

/// One entry of the scope stack.
struct Scope {
    kind: ScopeKind,
    code: CodeObject,
    /// Local name -> varname index, filled in as names are first written.
    locals: FxHashMap<String, u32>,
    globals: FxHashSet<String>,
    nonlocals: FxHashSet<String>,
    loops: Vec<Loop>,
}

enum FunctionBody<'a> {
    Block(&'a [Stmt]),
    Expr(&'a Expr),
}

/// The element action at the innermost level of a comprehension.
enum CompElement<'a> {
    List(&'a Expr),
    Set(&'a Expr),
    Dict(&'a Expr, &'a Expr),
    Yield(&'a Expr),
}

pub(crate) struct Compiler {
    filename: String,
    scopes: Vec<Scope>,
    errors: Vec<CompileError>,
}

impl Compiler {
    // -- scope plumbing -----------------------------------------------------

    fn push_scope(
        &mut self,
        kind: ScopeKind,
        name: &str,
        qualname: String,
        flags: CodeFlags,
        first_line: u32,
    ) {
        let code = CodeObject::new(name, &qualname, &self.filename, first_line, flags);
        self.scopes.push(Scope {
            kind,
            code,
            locals: FxHashMap::default(),
            globals: FxHashSet::default(),
            nonlocals: FxHashSet::default(),
            loops: Vec::new(),
        });
    }

    fn pop_scope(&mut self) -> CodeObject {
        let mut scope = self.scopes.pop().expect("scope stack underflow");
        debug_assert!(scope.loops.is_empty(), "loop left open at scope exit");
        scope.code.finalize();
        scope.code
    }

    /// The qualified name a child scope named `name` gets.
    fn child_qualname(&self, name: &str) -> String {
        let Some(scope) = self.scopes.last() else {
            return name.to_string();
        };
        match scope.kind {
            ScopeKind::Module => name.to_string(),
            ScopeKind::Class => format!("{}.{}", scope.code.qualname, name),
            ScopeKind::Function | ScopeKind::Comprehension => {
                format!("{}.<locals>.{}", scope.code.qualname, name)
            }
        }
    }

    fn in_function_scope(&self) -> bool {
        matches!(
            self.scopes.last().map(|s| s.kind),
            Some(ScopeKind::Function | ScopeKind::Comprehension)
        )
    }

    fn is_nested(&self) -> bool {
        self.scopes
            .iter()
            .any(|s| matches!(s.kind, ScopeKind::Function | ScopeKind::Comprehension))
    }

    pub(crate) fn error(&mut self, kind: CompileErrorKind, location: SourceLocation) {
        self.errors.push(CompileError::new(kind, location));
    }

    // -- emission -----------------------------------------------------------

    pub(crate) fn emit(&mut self, opcode: Opcode, arg: u32, line: u32) {
        self.scopes
            .last_mut()
            .expect("no open scope")
            .code
            .instructions
            .push(Instruction { opcode, arg, line });
    }

    /// Emit a forward jump with a placeholder target; returns the index to
    /// patch.
    pub(crate) fn emit_jump(&mut self, opcode: Opcode, line: u32) -> usize {
        let index = self.offset() as usize;
        self.emit(opcode, 0, line);
        index
    }

    /// Point a previously emitted jump at the next instruction.
    pub(crate) fn patch_jump(&mut self, index: usize) {
        let target = self.offset();
        let code = &mut self.scopes.last_mut().expect("no open scope").code;
        debug_assert!(code.instructions[index].opcode.is_jump());
        code.instructions[index].arg = target;
    }

    /// Index of the next instruction to be emitted.
    pub(crate) fn offset(&self) -> u32 {
        self.scopes
            .last()
            .expect("no open scope")
            .code
            .instructions
            .len() as u32
    }

    pub(crate) fn emit_const(&mut self, constant: Constant, line: u32) {
        if let Constant::Int(value @ 0..=255) = constant {
            self.emit(Opcode::LoadSmallInt, value as u32, line);
            return;
        }
        let index = self
            .scopes
            .last_mut()
            .expect("no open scope")
            .code
            .add_const(constant);
        self.emit(Opcode::LoadConst, index, line);
    }

    pub(crate) fn emit_none(&mut self, line: u32) {
        self.emit_const(Constant::None, line);
    }

    fn add_name(&mut self, name: &str) -> u32 {
        self.scopes
            .last_mut()
            .expect("no open scope")
            .code
            .add_name(name)
    }

    // -- name resolution ----------------------------------------------------

    fn resolve_load(&mut self, name: &str) -> (Opcode, u32) {
        let scope = self.scopes.last_mut().expect("no open scope");
        match scope.kind {
            ScopeKind::Function | ScopeKind::Comprehension => {
                if scope.globals.contains(name) {
                    (Opcode::LoadGlobal, scope.code.add_name(name))
                } else if scope.nonlocals.contains(name) {
                    (Opcode::LoadDeref, scope.code.add_freevar(name))
                } else if let Some(&index) = scope.locals.get(name) {
                    (Opcode::LoadFast, index)
                } else {
                    (Opcode::LoadName, scope.code.add_name(name))
                }
            }
            ScopeKind::Module | ScopeKind::Class => (Opcode::LoadName, scope.code.add_name(name)),
        }
    }

    fn resolve_store(&mut self, name: &str) -> (Opcode, u32) {
        let scope = self.scopes.last_mut().expect("no open scope");
        match scope.kind {
            ScopeKind::Function | ScopeKind::Comprehension => {
                if scope.globals.contains(name) {
                    (Opcode::StoreGlobal, scope.code.add_name(name))
                } else if scope.nonlocals.contains(name) {
                    (Opcode::StoreDeref, scope.code.add_freevar(name))
                } else {
                    let index = match scope.locals.get(name) {
                        Some(&index) => index,
                        None => {
                            let index = scope.code.add_varname(name);
                            scope.locals.insert(name.to_string(), index);
                            index
                        }
                    };
                    (Opcode::StoreFast, index)
                }
            }
            ScopeKind::Module | ScopeKind::Class => (Opcode::StoreName, scope.code.add_name(name)),
        }
    }

    fn resolve_delete(&mut self, name: &str) -> (Opcode, u32) {
        let scope = self.scopes.last_mut().expect("no open scope");
        match scope.kind {
            ScopeKind::Function | ScopeKind::Comprehension => {
                if scope.globals.contains(name) {
                    (Opcode::DeleteGlobal, scope.code.add_name(name))
                } else if let Some(&index) = scope.locals.get(name) {
                    (Opcode::DeleteFast, index)
                } else {
                    (Opcode::DeleteName, scope.code.add_name(name))
                }
            }
            ScopeKind::Module | ScopeKind::Class => {
                (Opcode::DeleteName, scope.code.add_name(name))
            }
        }
    }

    pub(crate) fn emit_load(&mut self, name: &str, line: u32) {
        let (opcode, arg) = self.resolve_load(name);
        self.emit(opcode, arg, line);
    }

    pub(crate) fn emit_store(&mut self, name: &str, line: u32) {
        let (opcode, arg) = self.resolve_store(name);
        self.emit(opcode, arg, line);
    }

    fn emit_delete(&mut self, name: &str, line: u32) {
        let (opcode, arg) = self.resolve_delete(name);
        self.emit(opcode, arg, line);
    }

    // -- statements ---------------------------------------------------------

    fn compile_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.compile_stmt(stmt);
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) {
        let line = stmt.location().line;
        match stmt {
            Stmt::Expr(s) => {
                self.compile_expr(&s.value);
                self.emit(Opcode::PopTop, 0, line);
            }
            Stmt::Assign(s) => {
                self.compile_expr(&s.value);
                let last = s.targets.len() - 1;
                for (i, target) in s.targets.iter().enumerate() {
                    if i < last {
                        self.emit(Opcode::Copy, 1, line);
                    }
                    self.compile_store_target(target);
                }
            }
            Stmt::AugAssign(s) => self.compile_aug_assign(s, line),
            Stmt::AnnAssign(s) => {
                if let Some(value) = &s.value {
                    self.compile_expr(value);
                    self.compile_store_target(&s.target);
                }
                // Only simple names in module/class scope land in
                // __annotations__; everything else is evaluated for effect
                // at definition sites only.
                if !self.in_function_scope() && s.simple {
                    let Expr::Name(name) = s.target.as_ref() else {
                        self.error(CompileErrorKind::InvalidAnnotationTarget, s.location);
                        return;
                    };
                    self.compile_expr(&s.annotation);
                    self.emit_load("__annotations__", line);
                    self.emit_const(Constant::Str(name.id.clone()), line);
                    self.emit(Opcode::StoreSubscr, 0, line);
                }
            }
            Stmt::Return(s) => {
                if !self.in_function_scope() {
                    self.error(CompileErrorKind::ReturnOutsideFunction, stmt.location());
                }
                match &s.value {
                    Some(value) => self.compile_expr(value),
                    None => self.emit_none(line),
                }
                self.emit(Opcode::ReturnValue, 0, line);
            }
            Stmt::Pass(_) => self.emit(Opcode::Nop, 0, line),
            Stmt::Break(_) => {
                let is_for = self
                    .scopes
                    .last()
                    .expect("no open scope")
                    .loops
                    .last()
                    .map(|r#loop| r#loop.is_for);
                let Some(is_for) = is_for else {
                    self.error(CompileErrorKind::BreakOutsideLoop, stmt.location());
                    self.emit(Opcode::Nop, 0, line);
                    return;
                };
                if is_for {
                    self.emit(Opcode::PopIter, 0, line);
                }
                let jump = self.emit_jump(Opcode::JumpForward, line);
                self.scopes
                    .last_mut()
                    .expect("no open scope")
                    .loops
                    .last_mut()
                    .expect("loop checked above")
                    .breaks
                    .push(jump);
            }
            Stmt::Continue(_) => {
                let head = self
                    .scopes
                    .last()
                    .expect("no open scope")
                    .loops
                    .last()
                    .map(|r#loop| r#loop.head);
                match head {
                    Some(head) => self.emit(Opcode::JumpBackward, head, line),
                    None => {
                        self.error(CompileErrorKind::ContinueOutsideLoop, stmt.location());
                        self.emit(Opcode::Nop, 0, line);
                    }
                }
            }
            Stmt::If(s) => self.compile_if(s, line),
            Stmt::While(s) => self.compile_while(s, line),
            Stmt::For(s) => self.compile_for(s, false, line),
            Stmt::AsyncFor(s) => self.compile_for(s, true, line),
            Stmt::With(s) => self.compile_with(s, false, line),
            Stmt::AsyncWith(s) => self.compile_with(s, true, line),
            Stmt::Try(s) => self.compile_try(s, false, line),
            Stmt::TryStar(s) => self.compile_try(s, true, line),
            Stmt::Raise(s) => {
                let argc = match (&s.exc, &s.cause) {
                    (None, _) => 0,
                    (Some(exc), None) => {
                        self.compile_expr(exc);
                        1
                    }
                    (Some(exc), Some(cause)) => {
                        self.compile_expr(exc);
                        self.compile_expr(cause);
                        2
                    }
                };
                self.emit(Opcode::RaiseVarargs, argc, line);
            }
            Stmt::Assert(s) => {
                self.compile_expr(&s.test);
                let end = self.emit_jump(Opcode::PopJumpIfTrue, line);
                self.emit_load("AssertionError", line);
                if let Some(msg) = &s.msg {
                    self.compile_expr(msg);
                    self.emit(Opcode::Call, 1, line);
                }
                self.emit(Opcode::RaiseVarargs, 1, line);
                self.patch_jump(end);
            }
            Stmt::Delete(s) => {
                for target in &s.targets {
                    self.compile_delete_target(target);
                }
            }
            Stmt::Global(s) => {
                let scope = self.scopes.last_mut().expect("no open scope");
                for name in &s.names {
                    scope.globals.insert(name.clone());
                }
            }
            Stmt::Nonlocal(s) => {
                if !self.in_function_scope() {
                    self.error(CompileErrorKind::NonlocalAtModuleLevel, stmt.location());
                    return;
                }
                let scope = self.scopes.last_mut().expect("no open scope");
                for name in &s.names {
                    scope.nonlocals.insert(name.clone());
                    scope.code.add_freevar(name);
                }
            }
            Stmt::Import(s) => {
                for alias in &s.names {
                    self.emit_const(Constant::Int(0), line);
                    self.emit_none(line);
                    let name_index = self.add_name(&alias.name);
                    self.emit(Opcode::ImportName, name_index, line);
                    match &alias.asname {
                        Some(asname) => {
                            // `import a.b as c` binds the innermost module.
                            for attr in alias.name.split('.').skip(1) {
                                let attr_index = self.add_name(attr);
                                self.emit(Opcode::LoadAttr, attr_index, line);
                            }
                            self.emit_store(asname, line);
                        }
                        None => {
                            let first = alias.name.split('.').next().expect("nonempty name");
                            self.emit_store(first, line);
                        }
                    }
                }
            }
            Stmt::ImportFrom(s) => self.compile_import_from(s, line),
            Stmt::FunctionDef(s) => self.compile_function_def(s, false, line),
            Stmt::AsyncFunctionDef(s) => self.compile_function_def(s, true, line),
            Stmt::ClassDef(s) => self.compile_class_def(s, line),
            Stmt::TypeAlias(s) => self.compile_type_alias(s, line),
            Stmt::Match(s) => self.compile_match(s, line),
        }
    }

    fn compile_if(&mut self, s: &StmtIf, line: u32) {
        self.compile_expr(&s.test);
        let else_jump = self.emit_jump(Opcode::PopJumpIfFalse, line);
        self.compile_body(&s.body);
        if s.orelse.is_empty() {
            self.patch_jump(else_jump);
        } else {
            let end_jump = self.emit_jump(Opcode::JumpForward, line);
            self.patch_jump(else_jump);
            self.compile_body(&s.orelse);
            self.patch_jump(end_jump);
        }
    }

    fn compile_while(&mut self, s: &StmtWhile, line: u32) {
        let head = self.offset();
        self.scopes
            .last_mut()
            .expect("no open scope")
            .loops
            .push(Loop {
                head,
                breaks: Vec::new(),
                is_for: false,
            });

        self.compile_expr(&s.test);
        let exit_jump = self.emit_jump(Opcode::PopJumpIfFalse, line);
        self.compile_body(&s.body);
        self.emit(Opcode::JumpBackward, head, line);
        self.patch_jump(exit_jump);

        let r#loop = self
            .scopes
            .last_mut()
            .expect("no open scope")
            .loops
            .pop()
            .expect("loop pushed above");
        self.compile_body(&s.orelse);
        // Break skips the else clause.
        for jump in r#loop.breaks {
            self.patch_jump(jump);
        }
    }

    fn compile_for(&mut self, s: &StmtFor, is_async: bool, line: u32) {
        self.compile_expr(&s.iter);
        self.emit(
            if is_async {
                Opcode::GetAiter
            } else {
                Opcode::GetIter
            },
            0,
            line,
        );

        let head = self.offset();
        self.scopes
            .last_mut()
            .expect("no open scope")
            .loops
            .push(Loop {
                head,
                breaks: Vec::new(),
                is_for: true,
            });

        let exit_jump = if is_async {
            self.emit(Opcode::GetAnext, 0, line);
            self.emit_none(line);
            self.emit_send_loop(line);
            None
        } else {
            Some(self.emit_jump(Opcode::ForIter, line))
        };

        self.compile_store_target(&s.target);
        self.compile_body(&s.body);
        self.emit(Opcode::JumpBackward, head, line);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit(Opcode::EndFor, 0, line);
        } else {
            self.emit(Opcode::EndAsyncFor, 0, line);
        }

        let r#loop = self
            .scopes
            .last_mut()
            .expect("no open scope")
            .loops
            .pop()
            .expect("loop pushed above");
        self.compile_body(&s.orelse);
        for jump in r#loop.breaks {
            self.patch_jump(jump);
        }
    }

    fn compile_with(&mut self, s: &StmtWith, is_async: bool, line: u32) {
        for item in &s.items {
            self.compile_expr(&item.context_expr);
            if is_async {
                self.emit(Opcode::BeforeAsyncWith, 0, line);
                self.emit(Opcode::GetAwaitable, 0, line);
                self.emit_none(line);
                self.emit_send_loop(line);
            } else {
                self.emit(Opcode::BeforeWith, 0, line);
            }
            match &item.optional_vars {
                Some(target) => self.compile_store_target(target),
                None => self.emit(Opcode::PopTop, 0, line),
            }
        }

        self.compile_body(&s.body);

        // The __exit__ callables sit on the stack, innermost on top.
        for _ in &s.items {
            self.emit_none(line);
            self.emit_none(line);
            self.emit_none(line);
            self.emit(Opcode::Call, 3, line);
            if is_async {
                self.emit(Opcode::GetAwaitable, 0, line);
                self.emit_none(line);
                self.emit_send_loop(line);
            }
            self.emit(Opcode::PopTop, 0, line);
        }
    }

    fn compile_try(&mut self, s: &StmtTry, is_star: bool, line: u32) {
        self.compile_body(&s.body);
        let else_jump = self.emit_jump(Opcode::JumpForward, line);

        // Handler chain. PUSH_EXC_INFO marks the handler entry; each typed
        // handler tests the live exception and either runs or falls through
        // to the next. All handler bodies funnel into one shared POP_EXCEPT
        // so the exception slot is balanced on every path.
        let mut skip_else_jump = None;
        if !s.handlers.is_empty() {
            let mut cleanup_jumps = Vec::new();
            let mut has_bare = false;
            self.emit(Opcode::PushExcInfo, 0, line);
            for handler in &s.handlers {
                let handler_line = handler.location.line;
                let next_jump = match &handler.r#type {
                    Some(r#type) => {
                        self.compile_expr(r#type);
                        self.emit(
                            if is_star {
                                Opcode::CheckEgMatch
                            } else {
                                Opcode::CheckExcMatch
                            },
                            0,
                            handler_line,
                        );
                        Some(self.emit_jump(Opcode::PopJumpIfFalse, handler_line))
                    }
                    None => {
                        has_bare = true;
                        None
                    }
                };
                if let Some(name) = &handler.name {
                    self.emit(Opcode::Copy, 1, handler_line);
                    self.emit_store(name, handler_line);
                }
                self.compile_body(&handler.body);
                cleanup_jumps.push(self.emit_jump(Opcode::JumpForward, handler_line));
                if let Some(next_jump) = next_jump {
                    self.patch_jump(next_jump);
                }
            }
            if !has_bare {
                self.emit(Opcode::Reraise, 0, line);
            }
            for jump in cleanup_jumps {
                self.patch_jump(jump);
            }
            self.emit(Opcode::PopExcept, 0, line);
            if !s.orelse.is_empty() {
                skip_else_jump = Some(self.emit_jump(Opcode::JumpForward, line));
            }
        }

        self.patch_jump(else_jump);
        self.compile_body(&s.orelse);
        if let Some(jump) = skip_else_jump {
            self.patch_jump(jump);
        }
        self.compile_body(&s.finalbody);
    }

    fn compile_import_from(&mut self, s: &StmtImportFrom, line: u32) {
        self.emit_const(Constant::Int(s.level as i64), line);
        let names_tuple = Constant::Tuple(
            s.names
                .iter()
                .map(|alias| Constant::Str(alias.name.clone()))
                .collect(),
        );
        self.emit_const(names_tuple, line);
        let module_index = self.add_name(s.module.as_deref().unwrap_or(""));
        self.emit(Opcode::ImportName, module_index, line);

        if s.names.len() == 1 && s.names[0].name == "*" {
            self.emit(Opcode::CallIntrinsic1, intrinsic1::IMPORT_STAR, line);
            self.emit(Opcode::PopTop, 0, line);
            return;
        }
        for alias in &s.names {
            let name_index = self.add_name(&alias.name);
            self.emit(Opcode::ImportFrom, name_index, line);
            let bind = alias.asname.as_deref().unwrap_or(&alias.name);
            self.emit_store(bind, line);
        }
        self.emit(Opcode::PopTop, 0, line);
    }

    fn compile_aug_assign(&mut self, s: &krait_ast::StmtAugAssign, line: u32) {
        let arg = BinaryOpArg::from_operator(s.op).arg(true);
        match s.target.as_ref() {
            Expr::Name(name) => {
                self.emit_load(&name.id, line);
                self.compile_expr(&s.value);
                self.emit(Opcode::BinaryOp, arg, line);
                self.emit_store(&name.id, line);
            }
            Expr::Attribute(attr) => {
                self.compile_expr(&attr.value);
                self.emit(Opcode::Copy, 1, line);
                let attr_index = self.add_name(&attr.attr);
                self.emit(Opcode::LoadAttr, attr_index, line);
                self.compile_expr(&s.value);
                self.emit(Opcode::BinaryOp, arg, line);
                self.emit(Opcode::Swap, 2, line);
                self.emit(Opcode::StoreAttr, attr_index, line);
            }
            Expr::Subscript(subscript) => {
                self.compile_expr(&subscript.value);
                self.compile_expr(&subscript.slice);
                self.emit(Opcode::Copy, 2, line);
                self.emit(Opcode::Copy, 2, line);
                self.emit(Opcode::BinarySubscr, 0, line);
                self.compile_expr(&s.value);
                self.emit(Opcode::BinaryOp, arg, line);
                self.emit(Opcode::Swap, 3, line);
                self.emit(Opcode::Swap, 2, line);
                self.emit(Opcode::StoreSubscr, 0, line);
            }
            other => {
                self.error(CompileErrorKind::InvalidAssignTarget, other.location());
            }
        }
    }

    // -- assignment targets -------------------------------------------------

    /// Store TOS into `target`.
    pub(crate) fn compile_store_target(&mut self, target: &Expr) {
        let line = target.location().line;
        match target {
            Expr::Name(name) => self.emit_store(&name.id, line),
            Expr::Attribute(attr) => {
                self.compile_expr(&attr.value);
                let attr_index = self.add_name(&attr.attr);
                self.emit(Opcode::StoreAttr, attr_index, line);
            }
            Expr::Subscript(subscript) => {
                self.compile_expr(&subscript.value);
                match subscript.slice.as_ref() {
                    Expr::Slice(slice) if slice.step.is_none() => {
                        self.compile_opt_expr(&slice.lower, line);
                        self.compile_opt_expr(&slice.upper, line);
                        self.emit(Opcode::StoreSlice, 0, line);
                    }
                    slice => {
                        self.compile_expr(slice);
                        self.emit(Opcode::StoreSubscr, 0, line);
                    }
                }
            }
            Expr::Tuple(tuple) => self.compile_unpack_targets(&tuple.elts, line),
            Expr::List(list) => self.compile_unpack_targets(&list.elts, line),
            Expr::Starred(starred) => self.compile_store_target(&starred.value),
            other => {
                self.error(CompileErrorKind::InvalidAssignTarget, other.location());
                self.emit(Opcode::PopTop, 0, line);
            }
        }
    }

    fn compile_unpack_targets(&mut self, elts: &[Expr], line: u32) {
        let star_position = elts
            .iter()
            .position(|e| matches!(e, Expr::Starred(_)));
        match star_position {
            None => {
                self.emit(Opcode::UnpackSequence, elts.len() as u32, line);
            }
            Some(position) => {
                let before = position as u32;
                let after = (elts.len() - position - 1) as u32;
                self.emit(Opcode::UnpackEx, before | (after << 8), line);
            }
        }
        for elt in elts {
            self.compile_store_target(elt);
        }
    }

    fn compile_delete_target(&mut self, target: &Expr) {
        let line = target.location().line;
        match target {
            Expr::Name(name) => self.emit_delete(&name.id, line),
            Expr::Attribute(attr) => {
                self.compile_expr(&attr.value);
                let attr_index = self.add_name(&attr.attr);
                self.emit(Opcode::DeleteAttr, attr_index, line);
            }
            Expr::Subscript(subscript) => {
                self.compile_expr(&subscript.value);
                self.compile_expr(&subscript.slice);
                self.emit(Opcode::DeleteSubscr, 0, line);
            }
            Expr::Tuple(tuple) => {
                for elt in &tuple.elts {
                    self.compile_delete_target(elt);
                }
            }
            Expr::List(list) => {
                for elt in &list.elts {
                    self.compile_delete_target(elt);
                }
            }
            other => self.error(CompileErrorKind::InvalidDeleteTarget, other.location()),
        }
    }

    // -- expressions --------------------------------------------------------

    fn compile_opt_expr(&mut self, expr: &Option<Box<Expr>>, line: u32) {
        match expr {
            Some(expr) => self.compile_expr(expr),
            None => self.emit_none(line),
        }
    }

    pub(crate) fn compile_expr(&mut self, expr: &Expr) {
        let line = expr.location().line;
        match expr {
            Expr::Constant(c) => self.emit_const(Constant::from(&c.value), line),
            Expr::Name(name) => self.emit_load(&name.id, line),
            Expr::BinOp(e) => {
                self.compile_expr(&e.left);
                self.compile_expr(&e.right);
                let arg = BinaryOpArg::from_operator(e.op).arg(false);
                self.emit(Opcode::BinaryOp, arg, line);
            }
            Expr::UnaryOp(e) => {
                self.compile_expr(&e.operand);
                match e.op {
                    UnaryOp::USub => self.emit(Opcode::UnaryNegative, 0, line),
                    UnaryOp::Invert => self.emit(Opcode::UnaryInvert, 0, line),
                    UnaryOp::Not => self.emit(Opcode::UnaryNot, 0, line),
                    UnaryOp::UAdd => {
                        self.emit(Opcode::CallIntrinsic1, intrinsic1::UNARY_POSITIVE, line);
                    }
                }
            }
            Expr::BoolOp(e) => {
                let jump_op = match e.op {
                    BoolOp::And => Opcode::PopJumpIfFalse,
                    BoolOp::Or => Opcode::PopJumpIfTrue,
                };
                let mut short_circuits = Vec::new();
                for value in &e.values[..e.values.len() - 1] {
                    self.compile_expr(value);
                    self.emit(Opcode::Copy, 1, line);
                    short_circuits.push(self.emit_jump(jump_op, line));
                    self.emit(Opcode::PopTop, 0, line);
                }
                self.compile_expr(e.values.last().expect("boolop has operands"));
                for jump in short_circuits {
                    self.patch_jump(jump);
                }
            }
            Expr::Compare(e) => self.compile_compare(e, line),
            Expr::IfExp(e) => {
                self.compile_expr(&e.test);
                let else_jump = self.emit_jump(Opcode::PopJumpIfFalse, line);
                self.compile_expr(&e.body);
                let end_jump = self.emit_jump(Opcode::JumpForward, line);
                self.patch_jump(else_jump);
                self.compile_expr(&e.orelse);
                self.patch_jump(end_jump);
            }
            Expr::NamedExpr(e) => {
                self.compile_expr(&e.value);
                self.emit(Opcode::Copy, 1, line);
                match e.target.as_ref() {
                    Expr::Name(name) => self.emit_store(&name.id, line),
                    other => {
                        self.error(CompileErrorKind::InvalidWalrusTarget, other.location());
                        self.emit(Opcode::PopTop, 0, line);
                    }
                }
            }
            Expr::Call(e) => self.compile_call(e, line),
            Expr::Attribute(e) => {
                self.compile_expr(&e.value);
                let attr_index = self.add_name(&e.attr);
                self.emit(Opcode::LoadAttr, attr_index, line);
            }
            Expr::Subscript(e) => {
                self.compile_expr(&e.value);
                match e.slice.as_ref() {
                    Expr::Slice(slice) if slice.step.is_none() => {
                        self.compile_opt_expr(&slice.lower, line);
                        self.compile_opt_expr(&slice.upper, line);
                        self.emit(Opcode::BinarySlice, 0, line);
                    }
                    slice => {
                        self.compile_expr(slice);
                        self.emit(Opcode::BinarySubscr, 0, line);
                    }
                }
            }
            Expr::Slice(e) => {
                self.compile_opt_expr(&e.lower, line);
                self.compile_opt_expr(&e.upper, line);
                match &e.step {
                    Some(step) => {
                        self.compile_expr(step);
                        self.emit(Opcode::BuildSlice, 3, line);
                    }
                    None => self.emit(Opcode::BuildSlice, 2, line),
                }
            }
            Expr::List(e) => {
                if e.elts.iter().any(|elt| matches!(elt, Expr::Starred(_))) {
                    self.emit(Opcode::BuildList, 0, line);
                    self.compile_spread_elements(&e.elts, Opcode::ListAppend, Opcode::ListExtend);
                } else {
                    for elt in &e.elts {
                        self.compile_expr(elt);
                    }
                    self.emit(Opcode::BuildList, e.elts.len() as u32, line);
                }
            }
            Expr::Tuple(e) => {
                if e.elts.iter().any(|elt| matches!(elt, Expr::Starred(_))) {
                    self.emit(Opcode::BuildList, 0, line);
                    self.compile_spread_elements(&e.elts, Opcode::ListAppend, Opcode::ListExtend);
                    self.emit(Opcode::CallIntrinsic1, intrinsic1::LIST_TO_TUPLE, line);
                } else {
                    for elt in &e.elts {
                        self.compile_expr(elt);
                    }
                    self.emit(Opcode::BuildTuple, e.elts.len() as u32, line);
                }
            }
            Expr::Set(e) => {
                if e.elts.iter().any(|elt| matches!(elt, Expr::Starred(_))) {
                    self.emit(Opcode::BuildSet, 0, line);
                    self.compile_spread_elements(&e.elts, Opcode::SetAdd, Opcode::SetUpdate);
                } else {
                    for elt in &e.elts {
                        self.compile_expr(elt);
                    }
                    self.emit(Opcode::BuildSet, e.elts.len() as u32, line);
                }
            }
            Expr::Dict(e) => {
                if e.keys.iter().all(Option::is_some) {
                    for (key, value) in e.keys.iter().zip(&e.values) {
                        self.compile_expr(key.as_ref().expect("checked above"));
                        self.compile_expr(value);
                    }
                    self.emit(Opcode::BuildMap, e.keys.len() as u32, line);
                } else {
                    self.emit(Opcode::BuildMap, 0, line);
                    for (key, value) in e.keys.iter().zip(&e.values) {
                        match key {
                            Some(key) => {
                                self.compile_expr(key);
                                self.compile_expr(value);
                                self.emit(Opcode::MapAdd, 1, line);
                            }
                            None => {
                                self.compile_expr(value);
                                self.emit(Opcode::DictUpdate, 1, line);
                            }
                        }
                    }
                }
            }
            Expr::ListComp(e) => {
                self.emit(Opcode::BuildList, 0, line);
                self.compile_comp_clauses(&e.generators, 0, &CompElement::List(&e.elt), line);
            }
            Expr::SetComp(e) => {
                self.emit(Opcode::BuildSet, 0, line);
                self.compile_comp_clauses(&e.generators, 0, &CompElement::Set(&e.elt), line);
            }
            Expr::DictComp(e) => {
                self.emit(Opcode::BuildMap, 0, line);
                self.compile_comp_clauses(
                    &e.generators,
                    0,
                    &CompElement::Dict(&e.key, &e.value),
                    line,
                );
            }
            Expr::GeneratorExp(e) => self.compile_genexp(e, line),
            Expr::Lambda(e) => {
                self.compile_function_object(
                    "<lambda>",
                    &e.parameters,
                    FunctionBody::Expr(&e.body),
                    false,
                    line,
                );
            }
            Expr::Await(e) => {
                self.compile_expr(&e.value);
                self.emit(Opcode::GetAwaitable, 0, line);
                self.emit_none(line);
                self.emit_send_loop(line);
            }
            Expr::Yield(e) => {
                if !self.in_function_scope() {
                    self.error(CompileErrorKind::YieldOutsideFunction, expr.location());
                }
                match &e.value {
                    Some(value) => self.compile_expr(value),
                    None => self.emit_none(line),
                }
                self.emit(Opcode::YieldValue, 0, line);
            }
            Expr::YieldFrom(e) => {
                if !self.in_function_scope() {
                    self.error(CompileErrorKind::YieldOutsideFunction, expr.location());
                }
                self.compile_expr(&e.value);
                self.emit(Opcode::GetYieldFromIter, 0, line);
                self.emit_none(line);
                self.emit_send_loop(line);
            }
            Expr::JoinedStr(e) => self.compile_joined_str(e, line),
            Expr::FormattedValue(_) => {
                // Only reachable for a replacement field outside a JoinedStr,
                // which the parser never produces.
                self.error(CompileErrorKind::StarredNotAllowed, expr.location());
                self.emit_none(line);
            }
            Expr::Starred(e) => {
                self.error(CompileErrorKind::StarredNotAllowed, expr.location());
                self.compile_expr(&e.value);
            }
        }
    }

    fn compile_compare(&mut self, e: &ExprCompare, line: u32) {
        self.compile_expr(&e.left);
        let n = e.ops.len();
        if n == 1 {
            self.compile_expr(&e.comparators[0]);
            self.emit_cmp(e.ops[0], line);
            return;
        }

        // Chained comparison: keep the shared middle operand with SWAP/COPY
        // and short-circuit to a failure block that discards it and yields
        // False.
        let mut fail_jumps = Vec::new();
        for i in 0..n - 1 {
            self.compile_expr(&e.comparators[i]);
            self.emit(Opcode::Swap, 2, line);
            self.emit(Opcode::Copy, 2, line);
            self.emit_cmp(e.ops[i], line);
            fail_jumps.push(self.emit_jump(Opcode::PopJumpIfFalse, line));
        }
        self.compile_expr(&e.comparators[n - 1]);
        self.emit_cmp(e.ops[n - 1], line);
        let end_jump = self.emit_jump(Opcode::JumpForward, line);
        for jump in fail_jumps {
            self.patch_jump(jump);
        }
        self.emit(Opcode::PopTop, 0, line);
        self.emit_const(Constant::Bool(false), line);
        self.patch_jump(end_jump);
    }

    pub(crate) fn emit_cmp(&mut self, op: CmpOp, line: u32) {
        match op {
            CmpOp::Lt => self.emit(Opcode::CompareOp, CompareOpArg::Lt as u32, line),
            CmpOp::LtE => self.emit(Opcode::CompareOp, CompareOpArg::LtE as u32, line),
            CmpOp::Eq => self.emit(Opcode::CompareOp, CompareOpArg::Eq as u32, line),
            CmpOp::NotEq => self.emit(Opcode::CompareOp, CompareOpArg::NotEq as u32, line),
            CmpOp::Gt => self.emit(Opcode::CompareOp, CompareOpArg::Gt as u32, line),
            CmpOp::GtE => self.emit(Opcode::CompareOp, CompareOpArg::GtE as u32, line),
            CmpOp::Is => self.emit(Opcode::IsOp, 0, line),
            CmpOp::IsNot => self.emit(Opcode::IsOp, 1, line),
            CmpOp::In => self.emit(Opcode::ContainsOp, 0, line),
            CmpOp::NotIn => self.emit(Opcode::ContainsOp, 1, line),
        }
    }

    fn compile_call(&mut self, e: &ExprCall, line: u32) {
        self.compile_expr(&e.func);

        let has_star = e.args.iter().any(|a| matches!(a, Expr::Starred(_)));
        let has_kwstar = e.keywords.iter().any(|k| k.arg.is_none());

        if !has_star && !has_kwstar {
            for arg in &e.args {
                self.compile_expr(arg);
            }
            if e.keywords.is_empty() {
                self.emit(Opcode::Call, e.args.len() as u32, line);
            } else {
                for keyword in &e.keywords {
                    self.compile_expr(&keyword.value);
                }
                self.emit_kw_names(&e.keywords, line);
                self.emit(
                    Opcode::CallKw,
                    (e.args.len() + e.keywords.len()) as u32,
                    line,
                );
            }
            return;
        }

        // Iterable/mapping unpacking goes through CALL_FUNCTION_EX with an
        // argument tuple and an optional keyword dict.
        self.emit(Opcode::BuildList, 0, line);
        self.compile_spread_elements(&e.args, Opcode::ListAppend, Opcode::ListExtend);
        self.emit(Opcode::CallIntrinsic1, intrinsic1::LIST_TO_TUPLE, line);
        if e.keywords.is_empty() {
            self.emit(Opcode::CallFunctionEx, 0, line);
        } else {
            self.emit(Opcode::BuildMap, 0, line);
            for keyword in &e.keywords {
                match &keyword.arg {
                    Some(name) => {
                        self.emit_const(Constant::Str(name.clone()), line);
                        self.compile_expr(&keyword.value);
                        self.emit(Opcode::MapAdd, 1, line);
                    }
                    None => {
                        self.compile_expr(&keyword.value);
                        self.emit(Opcode::DictMerge, 1, line);
                    }
                }
            }
            self.emit(Opcode::CallFunctionEx, 1, line);
        }
    }

    fn emit_kw_names(&mut self, keywords: &[Keyword], line: u32) {
        let names = Constant::Tuple(
            keywords
                .iter()
                .map(|k| Constant::Str(k.arg.clone().expect("checked by caller")))
                .collect(),
        );
        self.emit_const(names, line);
    }

    /// Elements of a display with at least one `*spread`: the builder is
    /// already on the stack, each element is appended or extended into it.
    fn compile_spread_elements(&mut self, elts: &[Expr], append: Opcode, extend: Opcode) {
        for elt in elts {
            let line = elt.location().line;
            match elt {
                Expr::Starred(starred) => {
                    self.compile_expr(&starred.value);
                    self.emit(extend, 1, line);
                }
                _ => {
                    self.compile_expr(elt);
                    self.emit(append, 1, line);
                }
            }
        }
    }

    /// The `GET_AWAITABLE`-style send loop: expects `[receiver, None]` on
    /// the stack and leaves the final result.
    fn emit_send_loop(&mut self, line: u32) {
        let send_jump = self.emit_jump(Opcode::Send, line);
        self.emit(Opcode::YieldValue, 0, line);
        self.emit(Opcode::Resume, 3, line);
        self.emit(
            Opcode::JumpBackwardNoInterrupt,
            send_jump as u32,
            line,
        );
        self.patch_jump(send_jump);
        self.emit(Opcode::EndSend, 0, line);
    }

    // -- f-strings and t-strings --------------------------------------------

    fn compile_joined_str(&mut self, e: &ExprJoinedStr, line: u32) {
        for value in &e.values {
            match value {
                Expr::Constant(c) => self.emit_const(Constant::from(&c.value), line),
                Expr::FormattedValue(field) => {
                    self.compile_expr(&field.value);
                    if let Some(conv) = field.conversion {
                        let arg = match conv {
                            Conversion::Str => conversion::STR,
                            Conversion::Repr => conversion::REPR,
                            Conversion::Ascii => conversion::ASCII,
                        };
                        self.emit(Opcode::ConvertValue, arg, line);
                    }
                    let has_spec = match &field.format_spec {
                        Some(spec) => {
                            self.compile_expr(spec);
                            true
                        }
                        None => false,
                    };
                    if e.is_template {
                        self.emit(Opcode::BuildInterpolation, u32::from(has_spec), line);
                    } else if has_spec {
                        self.emit(Opcode::FormatWithSpec, 0, line);
                    } else {
                        self.emit(Opcode::FormatSimple, 0, line);
                    }
                }
                other => self.compile_expr(other),
            }
        }
        let build = if e.is_template {
            Opcode::BuildTemplate
        } else {
            Opcode::BuildString
        };
        self.emit(build, e.values.len() as u32, line);
    }

    // -- comprehensions -----------------------------------------------------

    /// One `for` clause of an inlined comprehension, recursing for nested
    /// clauses. The builder (or nothing, for generator bodies) is below the
    /// iterator stack.
    fn compile_comp_clauses(
        &mut self,
        generators: &[Comprehension],
        index: usize,
        element: &CompElement<'_>,
        line: u32,
    ) {
        let generator = &generators[index];
        let in_genexp_scope = matches!(element, CompElement::Yield(_));

        if in_genexp_scope && index == 0 {
            // The outermost iterable arrives as the implicit argument.
            self.emit(Opcode::LoadFast, 0, line);
        } else {
            self.compile_expr(&generator.iter);
            self.emit(
                if generator.is_async {
                    Opcode::GetAiter
                } else {
                    Opcode::GetIter
                },
                0,
                line,
            );
        }

        let head = self.offset();
        let exit_jump = if generator.is_async {
            self.emit(Opcode::GetAnext, 0, line);
            self.emit_none(line);
            self.emit_send_loop(line);
            None
        } else {
            Some(self.emit_jump(Opcode::ForIter, line))
        };

        self.compile_store_target(&generator.target);
        for test in &generator.ifs {
            self.compile_expr(test);
            // A failed filter continues with the next item.
            self.emit(Opcode::PopJumpIfFalse, head, line);
        }

        if index + 1 < generators.len() {
            self.compile_comp_clauses(generators, index + 1, element, line);
        } else {
            // The builder sits below one iterator per clause.
            let depth = generators.len() as u32 + 1;
            match element {
                CompElement::List(elt) => {
                    self.compile_expr(elt);
                    self.emit(Opcode::ListAppend, depth, line);
                }
                CompElement::Set(elt) => {
                    self.compile_expr(elt);
                    self.emit(Opcode::SetAdd, depth, line);
                }
                CompElement::Dict(key, value) => {
                    self.compile_expr(key);
                    self.compile_expr(value);
                    self.emit(Opcode::MapAdd, depth, line);
                }
                CompElement::Yield(elt) => {
                    self.compile_expr(elt);
                    self.emit(Opcode::YieldValue, 0, line);
                    self.emit(Opcode::PopTop, 0, line);
                }
            }
        }

        self.emit(Opcode::JumpBackward, head, line);
        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit(Opcode::EndFor, 0, line);
        } else {
            self.emit(Opcode::EndAsyncFor, 0, line);
        }
    }

    /// A generator expression becomes a nested generator code object called
    /// with the outermost iterable.
    fn compile_genexp(&mut self, e: &krait_ast::ExprGeneratorExp, line: u32) {
        let mut flags = CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS | CodeFlags::GENERATOR;
        if self.is_nested() {
            flags |= CodeFlags::NESTED;
        }
        if e.generators.iter().any(|g| g.is_async) {
            flags |= CodeFlags::ASYNC_GENERATOR;
        }

        let qualname = self.child_qualname("<genexpr>");
        self.push_scope(ScopeKind::Comprehension, "<genexpr>", qualname, flags, line);
        {
            let scope = self.scopes.last_mut().expect("scope pushed above");
            scope.code.argcount = 1;
            let index = scope.code.add_varname(".0");
            scope.locals.insert(".0".to_string(), index);
        }
        self.emit(Opcode::ReturnGenerator, 0, line);
        self.emit(Opcode::PopTop, 0, line);
        self.emit(Opcode::Resume, 0, line);
        self.compile_comp_clauses(&e.generators, 0, &CompElement::Yield(&e.elt), line);
        self.emit_none(line);
        self.emit(Opcode::ReturnValue, 0, line);
        let code = self.pop_scope();

        self.emit_const(Constant::Code(Box::new(code)), line);
        self.emit(Opcode::MakeFunction, 0, line);
        self.compile_expr(&e.generators[0].iter);
        self.emit(
            if e.generators[0].is_async {
                Opcode::GetAiter
            } else {
                Opcode::GetIter
            },
            0,
            line,
        );
        self.emit(Opcode::Call, 1, line);
    }

    // -- functions, classes, type statements --------------------------------

    fn compile_function_def(&mut self, s: &StmtFunctionDef, is_async: bool, line: u32) {
        for decorator in &s.decorators {
            self.compile_expr(decorator);
        }
        let has_type_params = !s.type_params.is_empty();
        if has_type_params {
            self.compile_type_param_tuple(&s.type_params, line);
        }
        self.compile_function_object(
            &s.name,
            &s.parameters,
            FunctionBody::Block(&s.body),
            is_async,
            line,
        );
        if has_type_params {
            self.emit(
                Opcode::CallIntrinsic2,
                intrinsic2::SET_FUNCTION_TYPE_PARAMS,
                line,
            );
        }
        for _ in &s.decorators {
            self.emit(Opcode::Call, 1, line);
        }
        self.emit_store(&s.name, line);
    }

    /// Compile a function body into a nested code object and emit the
    /// `MAKE_FUNCTION` sequence, leaving the function object on the stack.
    fn compile_function_object(
        &mut self,
        name: &str,
        parameters: &Parameters,
        body: FunctionBody<'_>,
        is_async: bool,
        line: u32,
    ) {
        // Defaults are evaluated in the enclosing scope, at definition time.
        let pos_defaults: Vec<&Expr> = parameters
            .posonly
            .iter()
            .chain(&parameters.args)
            .filter_map(|p| p.default.as_deref())
            .collect();
        let mut make_flags = 0u32;
        if !pos_defaults.is_empty() {
            for default in &pos_defaults {
                self.compile_expr(default);
            }
            self.emit(Opcode::BuildTuple, pos_defaults.len() as u32, line);
            make_flags |= 0x01;
        }
        let kw_defaults: Vec<(&str, &Expr)> = parameters
            .kwonly
            .iter()
            .filter_map(|p| p.default.as_deref().map(|d| (p.name.as_str(), d)))
            .collect();
        if !kw_defaults.is_empty() {
            for (kw_name, default) in &kw_defaults {
                self.emit_const(Constant::Str((*kw_name).to_string()), line);
                self.compile_expr(default);
            }
            self.emit(Opcode::BuildMap, kw_defaults.len() as u32, line);
            make_flags |= 0x02;
        }

        let has_yield = match &body {
            FunctionBody::Block(stmts) => stmts_contain_yield(stmts),
            FunctionBody::Expr(_) => false,
        };
        let mut flags = CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;
        if self.is_nested() {
            flags |= CodeFlags::NESTED;
        }
        if parameters.vararg.is_some() {
            flags |= CodeFlags::VARARGS;
        }
        if parameters.kwarg.is_some() {
            flags |= CodeFlags::VARKEYWORDS;
        }
        match (is_async, has_yield) {
            (true, true) => flags |= CodeFlags::ASYNC_GENERATOR,
            (true, false) => flags |= CodeFlags::COROUTINE,
            (false, true) => flags |= CodeFlags::GENERATOR,
            (false, false) => {}
        }

        let qualname = self.child_qualname(name);
        self.push_scope(ScopeKind::Function, name, qualname, flags, line);
        {
            let scope = self.scopes.last_mut().expect("scope pushed above");
            scope.code.argcount = (parameters.posonly.len() + parameters.args.len()) as u32;
            scope.code.posonlyargcount = parameters.posonly.len() as u32;
            scope.code.kwonlyargcount = parameters.kwonly.len() as u32;
            for parameter in parameters.iter_names() {
                let index = scope.code.add_varname(parameter);
                scope.locals.insert(parameter.to_string(), index);
            }
        }
        if has_yield {
            self.emit(Opcode::ReturnGenerator, 0, line);
            self.emit(Opcode::PopTop, 0, line);
        }
        self.emit(Opcode::Resume, 0, line);
        match body {
            FunctionBody::Block(stmts) => {
                self.compile_body(stmts);
                let needs_return = !matches!(
                    self.scopes
                        .last()
                        .expect("scope pushed above")
                        .code
                        .instructions
                        .last(),
                    Some(Instruction {
                        opcode: Opcode::ReturnValue,
                        ..
                    })
                );
                if needs_return {
                    self.emit_none(line);
                    self.emit(Opcode::ReturnValue, 0, line);
                }
            }
            FunctionBody::Expr(expr) => {
                self.compile_expr(expr);
                self.emit(Opcode::ReturnValue, 0, line);
            }
        }
        let code = self.pop_scope();

        self.emit_const(Constant::Code(Box::new(code)), line);
        self.emit(Opcode::MakeFunction, make_flags, line);
    }

    fn compile_class_def(&mut self, s: &StmtClassDef, line: u32) {
        for decorator in &s.decorators {
            self.compile_expr(decorator);
        }
        let has_type_params = !s.type_params.is_empty();
        if has_type_params {
            self.compile_type_param_tuple(&s.type_params, line);
        }

        self.emit(Opcode::LoadBuildClass, 0, line);

        // The class body compiles as a function executed in a fresh
        // namespace.
        let qualname = self.child_qualname(&s.name);
        self.push_scope(
            ScopeKind::Class,
            &s.name,
            qualname.clone(),
            CodeFlags::empty(),
            line,
        );
        self.emit(Opcode::Resume, 0, line);
        self.emit_load("__name__", line);
        self.emit_store("__module__", line);
        self.emit_const(Constant::Str(qualname), line);
        self.emit_store("__qualname__", line);
        if stmts_contain_annotation(&s.body) {
            self.emit(Opcode::SetupAnnotations, 0, line);
        }
        self.compile_body(&s.body);
        self.emit_none(line);
        self.emit(Opcode::ReturnValue, 0, line);
        let code = self.pop_scope();

        self.emit_const(Constant::Code(Box::new(code)), line);
        self.emit(Opcode::MakeFunction, 0, line);
        self.emit_const(Constant::Str(s.name.clone()), line);

        let mut arg_count = 2u32;
        for base in &s.bases {
            if matches!(base, Expr::Starred(_)) {
                self.error(CompileErrorKind::StarredNotAllowed, base.location());
                continue;
            }
            self.compile_expr(base);
            arg_count += 1;
        }
        if s.keywords.is_empty() {
            self.emit(Opcode::Call, arg_count, line);
        } else {
            for keyword in &s.keywords {
                self.compile_expr(&keyword.value);
            }
            self.emit_kw_names(&s.keywords, line);
            self.emit(Opcode::CallKw, arg_count + s.keywords.len() as u32, line);
        }

        if has_type_params {
            self.emit(
                Opcode::CallIntrinsic2,
                intrinsic2::SET_FUNCTION_TYPE_PARAMS,
                line,
            );
        }
        for _ in &s.decorators {
            self.emit(Opcode::Call, 1, line);
        }
        self.emit_store(&s.name, line);
    }

    /// PEP 695 `type` statement: a `(name, type_params, value_closure)`
    /// triple handed to the TYPEALIAS intrinsic. The value is wrapped in a
    /// code object so it evaluates lazily.
    fn compile_type_alias(&mut self, s: &StmtTypeAlias, line: u32) {
        self.emit_const(Constant::Str(s.name.clone()), line);
        if s.type_params.is_empty() {
            self.emit_const(Constant::Tuple(Vec::new()), line);
        } else {
            self.compile_type_param_tuple(&s.type_params, line);
        }

        let mut flags = CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;
        if self.is_nested() {
            flags |= CodeFlags::NESTED;
        }
        let qualname = self.child_qualname(&s.name);
        self.push_scope(ScopeKind::Function, &s.name, qualname, flags, line);
        self.emit(Opcode::Resume, 0, line);
        self.compile_expr(&s.value);
        self.emit(Opcode::ReturnValue, 0, line);
        let code = self.pop_scope();

        self.emit_const(Constant::Code(Box::new(code)), line);
        self.emit(Opcode::MakeFunction, 0, line);
        self.emit(Opcode::BuildTuple, 3, line);
        self.emit(Opcode::CallIntrinsic1, intrinsic1::TYPEALIAS, line);
        self.emit_store(&s.name, line);
    }

    fn compile_type_param_tuple(&mut self, params: &[TypeParam], line: u32) {
        for param in params {
            match param {
                TypeParam::TypeVar(p) => {
                    self.emit_const(Constant::Str(p.name.clone()), line);
                    match &p.bound {
                        Some(bound) => {
                            self.compile_expr(bound);
                            self.emit(
                                Opcode::CallIntrinsic2,
                                intrinsic2::TYPEVAR_WITH_BOUND,
                                line,
                            );
                        }
                        None => self.emit(Opcode::CallIntrinsic1, intrinsic1::TYPEVAR, line),
                    }
                }
                TypeParam::ParamSpec(p) => {
                    self.emit_const(Constant::Str(p.name.clone()), line);
                    self.emit(Opcode::CallIntrinsic1, intrinsic1::PARAMSPEC, line);
                }
                TypeParam::TypeVarTuple(p) => {
                    self.emit_const(Constant::Str(p.name.clone()), line);
                    self.emit(Opcode::CallIntrinsic1, intrinsic1::TYPEVARTUPLE, line);
                }
            }
        }
        self.emit(Opcode::BuildTuple, params.len() as u32, line);
    }

    fn compile_match(&mut self, s: &krait_ast::StmtMatch, line: u32) {
        self.compile_expr(&s.subject);
        let mut end_jumps = Vec::new();
        for case in &s.cases {
            let case_line = case.pattern.location().line;
            self.emit(Opcode::Copy, 1, case_line);
            self.compile_pattern(&case.pattern);
            let fail_jump = self.emit_jump(Opcode::PopJumpIfFalse, case_line);
            let guard_jump = match &case.guard {
                Some(guard) => {
                    self.compile_expr(guard);
                    Some(self.emit_jump(Opcode::PopJumpIfFalse, case_line))
                }
                None => None,
            };
            self.emit(Opcode::PopTop, 0, case_line);
            self.compile_body(&case.body);
            end_jumps.push(self.emit_jump(Opcode::JumpForward, case_line));
            self.patch_jump(fail_jump);
            if let Some(guard_jump) = guard_jump {
                self.patch_jump(guard_jump);
            }
        }
        // No case matched: discard the subject.
        self.emit(Opcode::PopTop, 0, line);
        for jump in end_jumps {
            self.patch_jump(jump);
        }
    }
}

// ---------------------------------------------------------------------------
// Scope-property walkers
// ---------------------------------------------------------------------------

/// Whether a scope body contains `yield` / `yield from`, ignoring nested
/// scopes (functions, classes, lambdas).
fn stmts_contain_yield(body: &[Stmt]) -> bool {
    body.iter().any(stmt_contains_yield)
}

fn stmt_contains_yield(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::FunctionDef(_) | Stmt::AsyncFunctionDef(_) | Stmt::ClassDef(_) => false,
        Stmt::Expr(s) => expr_contains_yield(&s.value),
        Stmt::Assign(s) => expr_contains_yield(&s.value),
        Stmt::AugAssign(s) => expr_contains_yield(&s.value),
        Stmt::AnnAssign(s) => s.value.as_deref().is_some_and(expr_contains_yield),
        Stmt::Return(s) => s.value.as_deref().is_some_and(expr_contains_yield),
        Stmt::If(s) => {
            expr_contains_yield(&s.test)
                || stmts_contain_yield(&s.body)
                || stmts_contain_yield(&s.orelse)
        }
        Stmt::While(s) => {
            expr_contains_yield(&s.test)
                || stmts_contain_yield(&s.body)
                || stmts_contain_yield(&s.orelse)
        }
        Stmt::For(s) | Stmt::AsyncFor(s) => {
            expr_contains_yield(&s.iter)
                || stmts_contain_yield(&s.body)
                || stmts_contain_yield(&s.orelse)
        }
        Stmt::With(s) | Stmt::AsyncWith(s) => {
            s.items
                .iter()
                .any(|item| expr_contains_yield(&item.context_expr))
                || stmts_contain_yield(&s.body)
        }
        Stmt::Try(s) | Stmt::TryStar(s) => {
            stmts_contain_yield(&s.body)
                || s.handlers
                    .iter()
                    .any(|handler| stmts_contain_yield(&handler.body))
                || stmts_contain_yield(&s.orelse)
                || stmts_contain_yield(&s.finalbody)
        }
        Stmt::Match(s) => {
            expr_contains_yield(&s.subject)
                || s.cases.iter().any(|case| {
                    case.guard.as_deref().is_some_and(expr_contains_yield)
                        || stmts_contain_yield(&case.body)
                })
        }
        Stmt::Raise(s) => {
            s.exc.as_deref().is_some_and(expr_contains_yield)
                || s.cause.as_deref().is_some_and(expr_contains_yield)
        }
        Stmt::Assert(s) => {
            expr_contains_yield(&s.test) || s.msg.as_deref().is_some_and(expr_contains_yield)
        }
        Stmt::Delete(s) => s.targets.iter().any(expr_contains_yield),
        Stmt::TypeAlias(_)
        | Stmt::Import(_)
        | Stmt::ImportFrom(_)
        | Stmt::Global(_)
        | Stmt::Nonlocal(_)
        | Stmt::Pass(_)
        | Stmt::Break(_)
        | Stmt::Continue(_) => false,
    }
}

fn expr_contains_yield(expr: &Expr) -> bool {
    match expr {
        Expr::Yield(_) | Expr::YieldFrom(_) => true,
        Expr::Lambda(_) => false,
        Expr::BoolOp(e) => e.values.iter().any(expr_contains_yield),
        Expr::NamedExpr(e) => expr_contains_yield(&e.value),
        Expr::BinOp(e) => expr_contains_yield(&e.left) || expr_contains_yield(&e.right),
        Expr::UnaryOp(e) => expr_contains_yield(&e.operand),
        Expr::IfExp(e) => {
            expr_contains_yield(&e.test)
                || expr_contains_yield(&e.body)
                || expr_contains_yield(&e.orelse)
        }
        Expr::Dict(e) => {
            e.keys
                .iter()
                .any(|k| k.as_ref().is_some_and(expr_contains_yield))
                || e.values.iter().any(expr_contains_yield)
        }
        Expr::Set(e) => e.elts.iter().any(expr_contains_yield),
        // Inlined comprehensions run in the enclosing scope; generator
        // expressions do not.
        Expr::ListComp(e) => comp_contains_yield(&e.generators) || expr_contains_yield(&e.elt),
        Expr::SetComp(e) => comp_contains_yield(&e.generators) || expr_contains_yield(&e.elt),
        Expr::DictComp(e) => {
            comp_contains_yield(&e.generators)
                || expr_contains_yield(&e.key)
                || expr_contains_yield(&e.value)
        }
        Expr::GeneratorExp(e) => {
            // Only the outermost iterable evaluates in the enclosing scope.
            e.generators
                .first()
                .is_some_and(|g| expr_contains_yield(&g.iter))
        }
        Expr::Await(e) => expr_contains_yield(&e.value),
        Expr::Compare(e) => {
            expr_contains_yield(&e.left) || e.comparators.iter().any(expr_contains_yield)
        }
        Expr::Call(e) => {
            expr_contains_yield(&e.func)
                || e.args.iter().any(expr_contains_yield)
                || e.keywords.iter().any(|k| expr_contains_yield(&k.value))
        }
        Expr::FormattedValue(e) => expr_contains_yield(&e.value),
        Expr::JoinedStr(e) => e.values.iter().any(expr_contains_yield),
        Expr::Attribute(e) => expr_contains_yield(&e.value),
        Expr::Subscript(e) => expr_contains_yield(&e.value) || expr_contains_yield(&e.slice),
        Expr::Starred(e) => expr_contains_yield(&e.value),
        Expr::List(e) => e.elts.iter().any(expr_contains_yield),
        Expr::Tuple(e) => e.elts.iter().any(expr_contains_yield),
        Expr::Slice(e) => {
            e.lower.as_deref().is_some_and(expr_contains_yield)
                || e.upper.as_deref().is_some_and(expr_contains_yield)
                || e.step.as_deref().is_some_and(expr_contains_yield)
        }
        Expr::Constant(_) | Expr::Name(_) => false,
    }
}

fn comp_contains_yield(generators: &[Comprehension]) -> bool {
    generators.iter().any(|g| {
        expr_contains_yield(&g.iter)
            || g.ifs.iter().any(expr_contains_yield)
    })
}

/// Whether a scope body contains a simple annotated assignment, which calls
/// for `SETUP_ANNOTATIONS` at scope entry. Nested scopes do not count.
fn stmts_contain_annotation(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::AnnAssign(s) => s.simple,
        Stmt::If(s) => stmts_contain_annotation(&s.body) || stmts_contain_annotation(&s.orelse),
        Stmt::While(s) => {
            stmts_contain_annotation(&s.body) || stmts_contain_annotation(&s.orelse)
        }
        Stmt::For(s) | Stmt::AsyncFor(s) => {
            stmts_contain_annotation(&s.body) || stmts_contain_annotation(&s.orelse)
        }
        Stmt::With(s) | Stmt::AsyncWith(s) => stmts_contain_annotation(&s.body),
        Stmt::Try(s) | Stmt::TryStar(s) => {
            stmts_contain_annotation(&s.body)
                || s.handlers
                    .iter()
                    .any(|handler| stmts_contain_annotation(&handler.body))
                || stmts_contain_annotation(&s.orelse)
                || stmts_contain_annotation(&s.finalbody)
        }
        _ => false,
    })
}

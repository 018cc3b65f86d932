//! Compiler integration tests: instruction shapes for the lowering
//! catalogue, error accumulation, and the structural invariants every
//! finalized code object must satisfy (valid jump targets, bounded stack
//! depth, interned constants).

use krait::bytecode::Opcode;
use krait::{CodeFlags, CodeObject, CompileErrorKind, Constant, compile_module};
use pretty_assertions::assert_eq;

fn compile(source: &str) -> CodeObject {
    let module = krait_parser::parse_module(source)
        .unwrap_or_else(|e| panic!("parse failed for {source:?}: {e}"));
    let (code, errors) = compile_module(&module, "<test>");
    assert!(errors.is_empty(), "unexpected compile errors: {errors:?}");
    code
}

fn compile_with_errors(source: &str) -> (CodeObject, Vec<krait::CompileError>) {
    let module = krait_parser::parse_module(source).unwrap();
    compile_module(&module, "<test>")
}

fn ops(code: &CodeObject) -> Vec<(Opcode, u32)> {
    code.instructions.iter().map(|i| (i.opcode, i.arg)).collect()
}

fn opcodes(code: &CodeObject) -> Vec<Opcode> {
    code.instructions.iter().map(|i| i.opcode).collect()
}

/// Find a nested code object by name, depth-first.
fn find_code<'a>(code: &'a CodeObject, name: &str) -> Option<&'a CodeObject> {
    for constant in &code.consts {
        if let Constant::Code(nested) = constant {
            if nested.name == name {
                return Some(nested);
            }
            if let Some(found) = find_code(nested, name) {
                return Some(found);
            }
        }
    }
    None
}

fn for_each_code(code: &CodeObject, f: &mut impl FnMut(&CodeObject)) {
    f(code);
    for constant in &code.consts {
        if let Constant::Code(nested) = constant {
            for_each_code(nested, f);
        }
    }
}

/// Structural invariants: every jump lands on an instruction boundary, and
/// simulating the declared stack effects along all reachable paths stays
/// within `[0, stacksize]`.
fn check_invariants(code: &CodeObject) {
    for_each_code(code, &mut |code| {
        let offset_of: std::collections::HashMap<u32, usize> = code
            .offsets
            .iter()
            .enumerate()
            .map(|(index, &offset)| (offset, index))
            .collect();

        for instruction in &code.instructions {
            if instruction.opcode.is_jump() {
                assert!(
                    offset_of.contains_key(&instruction.arg),
                    "jump to {} is not an instruction boundary in {}",
                    instruction.arg,
                    code.qualname
                );
            }
        }

        // Reachable-path stack simulation.
        let count = code.instructions.len();
        let mut depths: Vec<Option<i32>> = vec![None; count];
        let mut work = vec![(0usize, 0i32)];
        while let Some((index, depth)) = work.pop() {
            if index >= count {
                continue;
            }
            match depths[index] {
                Some(seen) if seen >= depth => continue,
                _ => depths[index] = Some(depth),
            }
            assert!(
                depth >= 0,
                "negative stack depth at instruction {index} of {}",
                code.qualname
            );
            assert!(
                depth as u32 <= code.stacksize,
                "depth {depth} exceeds stacksize {} at instruction {index} of {}",
                code.stacksize,
                code.qualname
            );
            let instruction = &code.instructions[index];
            let opcode = instruction.opcode;
            let after = depth + opcode.stack_effect(instruction.arg, false);
            if opcode.is_jump() {
                let target = offset_of[&instruction.arg];
                let jump_depth = depth + opcode.stack_effect(instruction.arg, true);
                assert!(jump_depth >= 0, "negative depth on jump in {}", code.qualname);
                work.push((target, jump_depth));
                if !matches!(
                    opcode,
                    Opcode::JumpForward | Opcode::JumpBackward | Opcode::JumpBackwardNoInterrupt
                ) {
                    work.push((index + 1, after));
                }
            } else if !matches!(
                opcode,
                Opcode::ReturnValue
                    | Opcode::Reraise
                    | Opcode::RaiseVarargs
                    | Opcode::InterpreterExit
            ) {
                assert!(after >= 0, "negative depth after {opcode:?} in {}", code.qualname);
                work.push((index + 1, after));
            }
        }
    });
}

#[test]
fn augmented_assignment_instruction_sequence() {
    // `x += 5` lowers to a load / inplace-add / store sequence.
    let code = compile("x += 5\n");
    let expected = vec![
        (Opcode::Resume, 0),
        (Opcode::LoadName, 0),
        (Opcode::LoadSmallInt, 5),
        (Opcode::BinaryOp, 13), // NB_INPLACE_ADD
        (Opcode::StoreName, 0),
        (Opcode::LoadConst, 0),
        (Opcode::ReturnValue, 0),
    ];
    assert_eq!(ops(&code), expected);
    assert_eq!(code.names, vec!["x".to_string()]);
    assert_eq!(code.consts[0], Constant::None);
}

#[test]
fn break_outside_loop_accumulates_and_compilation_continues() {
    // A break at module scope is reported but does not abort the run.
    let (code, errors) = compile_with_errors("break\nx = 1\n");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CompileErrorKind::BreakOutsideLoop);
    // The statement after the error still compiled.
    assert!(code.names.contains(&"x".to_string()));
    assert!(opcodes(&code).contains(&Opcode::StoreName));
}

#[test]
fn type_alias_lowering() {
    // `type Vector[T] = list[T]` builds a (name, params, closure) triple.
    let code = compile("type Vector[T] = list[T]\n");
    let listing = ops(&code);
    // name, typevar intrinsic, tuple, closure, 3-tuple, TYPEALIAS intrinsic
    assert!(listing.contains(&(Opcode::CallIntrinsic1, 7))); // INTRINSIC_TYPEVAR
    assert!(listing.contains(&(Opcode::BuildTuple, 1)));
    assert!(listing.contains(&(Opcode::MakeFunction, 0)));
    assert!(listing.contains(&(Opcode::BuildTuple, 3)));
    assert!(listing.contains(&(Opcode::CallIntrinsic1, 11))); // INTRINSIC_TYPEALIAS
    assert!(listing.contains(&(Opcode::StoreName, 0)));
    let value_code = find_code(&code, "Vector").expect("lazy value code object");
    assert!(opcodes(value_code).contains(&Opcode::BinarySubscr));
    check_invariants(&code);
}

#[test]
fn walrus_copies_before_store() {
    let code = compile("y = ((n := 10) + n)\n");
    let listing = ops(&code);
    let copy_position = listing
        .iter()
        .position(|&op| op == (Opcode::Copy, 1))
        .expect("walrus emits COPY 1");
    assert_eq!(listing[copy_position + 1].0, Opcode::StoreName);
    check_invariants(&code);
}

#[test]
fn function_lowering_and_flags() {
    let code = compile("def add(a, b=1):\n    return a + b\n");
    let listing = ops(&code);
    // defaults tuple then MAKE_FUNCTION with the defaults bit
    assert!(listing.contains(&(Opcode::BuildTuple, 1)));
    assert!(listing.contains(&(Opcode::MakeFunction, 0x01)));

    let function = find_code(&code, "add").expect("nested function code");
    assert_eq!(function.argcount, 2);
    assert_eq!(function.varnames, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(function.nlocals, 2);
    assert!(function.flags.contains(CodeFlags::OPTIMIZED));
    assert!(function.flags.contains(CodeFlags::NEWLOCALS));
    // Parameters resolve to fast locals inside the body.
    assert!(ops(function).contains(&(Opcode::LoadFast, 0)));
    assert!(ops(function).contains(&(Opcode::LoadFast, 1)));
    check_invariants(&code);
}

#[test]
fn generator_and_coroutine_flags() {
    let code = compile(
        "def gen():\n    yield 1\nasync def coro():\n    await x\nasync def agen():\n    yield 1\n",
    );
    let generator = find_code(&code, "gen").unwrap();
    assert!(generator.flags.contains(CodeFlags::GENERATOR));
    assert_eq!(opcodes(generator)[0], Opcode::ReturnGenerator);

    let coroutine = find_code(&code, "coro").unwrap();
    assert!(coroutine.flags.contains(CodeFlags::COROUTINE));
    assert!(!coroutine.flags.contains(CodeFlags::GENERATOR));

    let async_generator = find_code(&code, "agen").unwrap();
    assert!(async_generator.flags.contains(CodeFlags::ASYNC_GENERATOR));
    check_invariants(&code);
}

#[test]
fn vararg_flags() {
    let code = compile("def f(*args, **kwargs):\n    pass\n");
    let function = find_code(&code, "f").unwrap();
    assert!(function.flags.contains(CodeFlags::VARARGS));
    assert!(function.flags.contains(CodeFlags::VARKEYWORDS));
}

#[test]
fn class_lowering() {
    let code = compile("class C(Base):\n    x = 1\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::LoadBuildClass, 0)));
    // class-body closure + name constant + one base
    assert!(listing.contains(&(Opcode::Call, 3)));

    let body = find_code(&code, "C").expect("class body code");
    assert!(body.names.contains(&"__module__".to_string()));
    assert!(body.names.contains(&"__qualname__".to_string()));
    // Class bodies use name-based stores.
    assert!(opcodes(body).contains(&Opcode::StoreName));
    check_invariants(&code);
}

#[test]
fn list_comprehension_inlines_builder_loop() {
    let code = compile("squares = [x * x for x in data]\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::BuildList, 0)));
    assert!(listing.contains(&(Opcode::GetIter, 0)));
    // one clause: the builder sits under one iterator
    assert!(listing.contains(&(Opcode::ListAppend, 2)));
    assert!(listing.contains(&(Opcode::EndFor, 0)));
    check_invariants(&code);
}

#[test]
fn dict_comprehension_uses_map_add() {
    let code = compile("d = {k: v for k, v in pairs if k}\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::BuildMap, 0)));
    assert!(listing.contains(&(Opcode::MapAdd, 2)));
    check_invariants(&code);
}

#[test]
fn generator_expression_gets_nested_code() {
    let code = compile("g = (x for x in xs)\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::MakeFunction, 0)));
    assert!(listing.contains(&(Opcode::GetIter, 0)));
    assert!(listing.contains(&(Opcode::Call, 1)));

    let genexpr = find_code(&code, "<genexpr>").expect("genexpr code object");
    assert!(genexpr.flags.contains(CodeFlags::GENERATOR));
    assert_eq!(genexpr.argcount, 1);
    assert_eq!(genexpr.varnames[0], ".0");
    assert!(opcodes(genexpr).contains(&Opcode::YieldValue));
    check_invariants(&code);
}

#[test]
fn fstring_with_spec_lowering() {
    // `f"{value:.2f}"` formats with an explicit spec.
    let code = compile("f\"{value:.2f}\"\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::FormatWithSpec, 0)));
    assert!(listing.contains(&(Opcode::BuildString, 1)));
    check_invariants(&code);
}

#[test]
fn fstring_conversion_lowering() {
    let code = compile("f\"{x!r} and {y}\"\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::ConvertValue, 2))); // repr
    assert!(listing.contains(&(Opcode::FormatSimple, 0)));
    assert!(listing.contains(&(Opcode::BuildString, 3)));
    check_invariants(&code);
}

#[test]
fn tstring_builds_template() {
    let code = compile("t\"{x}!\"\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::BuildInterpolation, 0)));
    assert!(listing.contains(&(Opcode::BuildTemplate, 2)));
    check_invariants(&code);
}

#[test]
fn global_declaration_changes_resolution() {
    let code = compile("def f():\n    global counter\n    counter = 1\n    return counter\n");
    let function = find_code(&code, "f").unwrap();
    let listing = opcodes(function);
    assert!(listing.contains(&Opcode::StoreGlobal));
    assert!(listing.contains(&Opcode::LoadGlobal));
    assert!(!listing.contains(&Opcode::StoreFast));
}

#[test]
fn locals_are_recorded_on_first_write() {
    let code = compile("def f():\n    x = 1\n    return x\n");
    let function = find_code(&code, "f").unwrap();
    assert_eq!(function.varnames, vec!["x".to_string()]);
    assert!(ops(function).contains(&(Opcode::StoreFast, 0)));
    assert!(ops(function).contains(&(Opcode::LoadFast, 0)));
}

#[test]
fn while_loop_shape() {
    let code = compile("while x:\n    y = 1\nelse:\n    z = 1\n");
    let listing = opcodes(&code);
    assert!(listing.contains(&Opcode::PopJumpIfFalse));
    assert!(listing.contains(&Opcode::JumpBackward));
    check_invariants(&code);
}

#[test]
fn for_loop_with_break_cleans_iterator() {
    let code = compile("for x in xs:\n    if x:\n        break\nelse:\n    y = 1\n");
    let listing = opcodes(&code);
    assert!(listing.contains(&Opcode::GetIter));
    assert!(listing.contains(&Opcode::ForIter));
    assert!(listing.contains(&Opcode::PopIter));
    assert!(listing.contains(&Opcode::EndFor));
    check_invariants(&code);
}

#[test]
fn unpacking_assignment() {
    let code = compile("a, b = pair\nhead, *tail = items\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::UnpackSequence, 2)));
    assert!(listing.contains(&(Opcode::UnpackEx, 1)));
    check_invariants(&code);
}

#[test]
fn try_except_shape() {
    let code = compile(
        "try:\n    risky()\nexcept ValueError as e:\n    handle(e)\nexcept KeyError:\n    other()\nelse:\n    ok()\nfinally:\n    done()\n",
    );
    let listing = opcodes(&code);
    assert!(listing.contains(&Opcode::PushExcInfo));
    assert_eq!(
        listing.iter().filter(|&&op| op == Opcode::CheckExcMatch).count(),
        2
    );
    assert!(listing.contains(&Opcode::PopExcept));
    assert!(listing.contains(&Opcode::Reraise));
    check_invariants(&code);
}

#[test]
fn try_star_uses_group_match() {
    let code = compile("try:\n    risky()\nexcept* ValueError:\n    pass\n");
    assert!(opcodes(&code).contains(&Opcode::CheckEgMatch));
    check_invariants(&code);
}

#[test]
fn with_statement_shape() {
    let code = compile("with open(p) as f:\n    use(f)\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::BeforeWith, 0)));
    assert!(listing.contains(&(Opcode::Call, 3))); // __exit__(None, None, None)
    check_invariants(&code);
}

#[test]
fn async_constructs() {
    let code = compile(
        "async def f():\n    async with ctx() as c:\n        pass\n    async for x in xs:\n        pass\n    await other()\n",
    );
    let function = find_code(&code, "f").unwrap();
    let listing = opcodes(function);
    assert!(listing.contains(&Opcode::BeforeAsyncWith));
    assert!(listing.contains(&Opcode::GetAiter));
    assert!(listing.contains(&Opcode::GetAnext));
    assert!(listing.contains(&Opcode::Send));
    assert!(listing.contains(&Opcode::EndSend));
    assert!(listing.contains(&Opcode::EndAsyncFor));
    assert!(listing.contains(&Opcode::GetAwaitable));
    check_invariants(&code);
}

#[test]
fn match_statement_lowering() {
    // Each pattern family maps to its MATCH_* opcode.
    let code = compile(
        "match p:\n    case (0, y):\n        a = 1\n    case {'k': v}:\n        a = 2\n    case Point(x=0):\n        a = 3\n    case _:\n        a = 4\n",
    );
    let listing = opcodes(&code);
    assert!(listing.contains(&Opcode::MatchSequence));
    assert!(listing.contains(&Opcode::GetLen));
    assert!(listing.contains(&Opcode::UnpackSequence));
    assert!(listing.contains(&Opcode::MatchMapping));
    assert!(listing.contains(&Opcode::MatchKeys));
    assert!(listing.contains(&Opcode::MatchClass));
    check_invariants(&code);
}

#[test]
fn subscript_and_slice_forms() {
    let code = compile("a = x[i]\nb = x[1:2]\nc = x[1:2:3]\nx[0] = 1\ndel x[0]\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::BinarySubscr, 0)));
    assert!(listing.contains(&(Opcode::BinarySlice, 0)));
    assert!(listing.contains(&(Opcode::BuildSlice, 3)));
    assert!(listing.contains(&(Opcode::StoreSubscr, 0)));
    assert!(listing.contains(&(Opcode::DeleteSubscr, 0)));
    check_invariants(&code);
}

#[test]
fn call_forms() {
    let code = compile("f(1, 2)\ng(1, key=2)\nh(*args, **kwargs)\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::Call, 2)));
    assert!(listing.contains(&(Opcode::CallKw, 2)));
    assert!(listing.contains(&(Opcode::CallFunctionEx, 1)));
    assert!(listing.contains(&(Opcode::ListExtend, 1)));
    assert!(listing.contains(&(Opcode::DictMerge, 1)));
    check_invariants(&code);
}

#[test]
fn import_lowering() {
    let code = compile("import os.path as p\nfrom sys import argv as av\nfrom . import sibling\n");
    let listing = opcodes(&code);
    assert!(listing.contains(&Opcode::ImportName));
    assert!(listing.contains(&Opcode::ImportFrom));
    assert!(listing.contains(&Opcode::LoadAttr)); // os.path -> path
    check_invariants(&code);
}

#[test]
fn assert_lowering() {
    let code = compile("assert x, 'message'\n");
    let listing = opcodes(&code);
    assert!(listing.contains(&Opcode::PopJumpIfTrue));
    assert!(listing.contains(&Opcode::RaiseVarargs));
    check_invariants(&code);
}

#[test]
fn chained_comparison_lowering() {
    let code = compile("r = a < b < c\n");
    let listing = ops(&code);
    assert!(listing.contains(&(Opcode::Swap, 2)));
    assert!(listing.contains(&(Opcode::Copy, 2)));
    assert_eq!(
        listing
            .iter()
            .filter(|(op, _)| *op == Opcode::CompareOp)
            .count(),
        2
    );
    check_invariants(&code);
}

#[test]
fn boolop_short_circuit_lowering() {
    let code = compile("r = a and b or c\n");
    let listing = opcodes(&code);
    assert!(listing.contains(&Opcode::PopJumpIfFalse));
    assert!(listing.contains(&Opcode::PopJumpIfTrue));
    check_invariants(&code);
}

#[test]
fn annotations_at_module_scope() {
    let code = compile("x: int = 1\n");
    let listing = opcodes(&code);
    assert_eq!(listing[1], Opcode::SetupAnnotations);
    assert!(listing.contains(&Opcode::StoreSubscr));
    assert!(code.names.contains(&"__annotations__".to_string()));
    check_invariants(&code);
}

#[test]
fn constants_interned_across_statements() {
    let code = compile("x = 'same'\ny = 'same'\nz = 'other'\n");
    let strings = code
        .consts
        .iter()
        .filter(|c| matches!(c, Constant::Str(_)))
        .count();
    assert_eq!(strings, 2);
}

#[test]
fn wide_arguments_use_extended_arg() {
    // Force a constant-pool index above 255.
    let mut source = String::new();
    for i in 0..300 {
        source.push_str(&format!("v{i} = {}\n", 10_000 + i));
    }
    let code = compile(&source);
    assert!(code.consts.len() > 256);
    assert!(
        code.code
            .chunks(2)
            .any(|pair| pair[0] == Opcode::ExtendedArg.as_u8()),
        "packed code should contain EXTENDED_ARG prefixes"
    );
    check_invariants(&code);
}

#[test]
fn invariants_hold_across_a_broad_corpus() {
    let programs = [
        "x = 1\n",
        "def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\n",
        "total = 0\nfor i in range(10):\n    if i % 2:\n        continue\n    total += i\n",
        "data = {k: [v * 2 for v in vs] for k, vs in table.items()}\n",
        "class A:\n    def m(self):\n        with lock:\n            return self.x\n",
        "try:\n    pass\nexcept A:\n    pass\nexcept B as b:\n    pass\nfinally:\n    pass\n",
        "async def main():\n    async for item in source():\n        await sink(item)\n",
        "match cmd:\n    case ['go', d] | ['move', d]:\n        run(d)\n    case {'stop': _, **rest}:\n        halt(rest)\n    case C(1, y=2) as m if cond(m):\n        use(m)\n",
        "def g():\n    x = yield\n    yield from other()\n",
        "f\"{a!s:>{width}}\" 'tail'\n",
        "type Pair[K, V] = tuple[K, V]\n",
        "lambda a, *rest, key=None: (a, rest, key)\n",
        "s = {1, 2, *more}\nt = (1, *more)\nl = [1, *more]\nd = {**base, 'k': 1}\n",
    ];
    for program in programs {
        let code = compile(program);
        check_invariants(&code);
    }
}

#[test]
fn continue_outside_loop_is_accumulated() {
    let (_, errors) = compile_with_errors("continue\n");
    assert_eq!(errors[0].kind, CompileErrorKind::ContinueOutsideLoop);
}

#[test]
fn return_outside_function_is_accumulated() {
    let (_, errors) = compile_with_errors("return 1\n");
    assert_eq!(errors[0].kind, CompileErrorKind::ReturnOutsideFunction);
}

#[test]
fn nonlocal_at_module_level_is_accumulated() {
    let (_, errors) = compile_with_errors("nonlocal x\n");
    assert_eq!(errors[0].kind, CompileErrorKind::NonlocalAtModuleLevel);
}

#[test]
fn qualified_names_nest() {
    let code = compile("class C:\n    def m(self):\n        def inner():\n            pass\n");
    let inner = find_code(&code, "inner").unwrap();
    assert_eq!(inner.qualname, "C.m.<locals>.inner");
    assert!(inner.flags.contains(CodeFlags::NESTED));
}

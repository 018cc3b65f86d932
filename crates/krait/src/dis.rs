//! Human-readable disassembly of code objects.
//!
//! One table per code object: a header with the identity and counts, the
//! constant/name/varname pools, then the instruction listing with source
//! line, byte offset, opcode name, argument, and an annotation resolving the
//! argument (constant repr, name, jump target, operator symbol). Nested code
//! objects are dumped recursively after their parent.

use std::fmt::Write;

use crate::bytecode::{BinaryOpArg, CompareOpArg, Opcode, intrinsic1, intrinsic2};
use crate::code::{CodeObject, Constant};

/// Render a full recursive disassembly.
pub fn disassemble(code: &CodeObject) -> String {
    let mut out = String::new();
    dis_one(code, &mut out);
    out
}

fn dis_one(code: &CodeObject, out: &mut String) {
    let _ = writeln!(
        out,
        "Disassembly of <code object {} at \"{}\", line {}>:",
        code.qualname, code.filename, code.first_line
    );
    let _ = writeln!(
        out,
        "  argcount: {}  posonly: {}  kwonly: {}  nlocals: {}  stacksize: {}  flags: {:#x}",
        code.argcount,
        code.posonlyargcount,
        code.kwonlyargcount,
        code.nlocals,
        code.stacksize,
        code.flags.bits()
    );
    if !code.consts.is_empty() {
        let consts: Vec<String> = code
            .consts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{i}: {}", c.py_repr()))
            .collect();
        let _ = writeln!(out, "  consts: {}", consts.join("  "));
    }
    if !code.names.is_empty() {
        let _ = writeln!(out, "  names: {}", code.names.join(", "));
    }
    if !code.varnames.is_empty() {
        let _ = writeln!(out, "  varnames: {}", code.varnames.join(", "));
    }
    if !code.freevars.is_empty() {
        let _ = writeln!(out, "  freevars: {}", code.freevars.join(", "));
    }

    let mut previous_line = 0;
    for (index, instruction) in code.instructions.iter().enumerate() {
        let offset = code.offsets.get(index).copied().unwrap_or(0);
        let line_column = if instruction.line != previous_line {
            previous_line = instruction.line;
            format!("{:>4}", instruction.line)
        } else {
            "    ".to_string()
        };
        let name = instruction.opcode.name();
        let arg_column = if instruction.opcode.has_arg() {
            format!("{:>5}", instruction.arg)
        } else {
            "     ".to_string()
        };
        let annotation = annotate(code, instruction.opcode, instruction.arg);
        if annotation.is_empty() {
            let _ = writeln!(out, "{line_column} {offset:>8} {name:<28}{arg_column}");
        } else {
            let _ = writeln!(
                out,
                "{line_column} {offset:>8} {name:<28}{arg_column} ({annotation})"
            );
        }
    }
    let _ = writeln!(out);

    for constant in &code.consts {
        if let Constant::Code(nested) = constant {
            dis_one(nested, out);
        }
    }
}

fn annotate(code: &CodeObject, opcode: Opcode, arg: u32) -> String {
    let name_pool = |pool: &[String]| {
        pool.get(arg as usize)
            .cloned()
            .unwrap_or_else(|| format!("<invalid {arg}>"))
    };
    match opcode {
        Opcode::LoadConst => code
            .consts
            .get(arg as usize)
            .map(Constant::py_repr)
            .unwrap_or_else(|| format!("<invalid {arg}>")),
        Opcode::LoadName
        | Opcode::StoreName
        | Opcode::DeleteName
        | Opcode::LoadGlobal
        | Opcode::StoreGlobal
        | Opcode::DeleteGlobal
        | Opcode::LoadAttr
        | Opcode::StoreAttr
        | Opcode::DeleteAttr
        | Opcode::ImportName
        | Opcode::ImportFrom => name_pool(&code.names),
        Opcode::LoadFast | Opcode::StoreFast | Opcode::DeleteFast => name_pool(&code.varnames),
        Opcode::LoadDeref | Opcode::StoreDeref | Opcode::MakeCell => name_pool(&code.freevars),
        opcode if opcode.is_jump() => format!("to {arg}"),
        Opcode::BinaryOp => BinaryOpArg::symbol(arg).to_string(),
        Opcode::CompareOp => CompareOpArg::symbol(arg).to_string(),
        Opcode::IsOp => if arg == 0 { "is" } else { "is not" }.to_string(),
        Opcode::ContainsOp => if arg == 0 { "in" } else { "not in" }.to_string(),
        Opcode::CallIntrinsic1 => intrinsic1::name(arg).to_string(),
        Opcode::CallIntrinsic2 => intrinsic2::name(arg).to_string(),
        Opcode::ConvertValue => match arg {
            1 => "str".to_string(),
            2 => "repr".to_string(),
            3 => "ascii".to_string(),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_module;

    fn dis(source: &str) -> String {
        let module = krait_parser::parse_module(source).unwrap();
        let (code, errors) = compile_module(&module, "<test>");
        assert!(errors.is_empty(), "unexpected compile errors: {errors:?}");
        disassemble(&code)
    }

    #[test]
    fn listing_resolves_names_and_constants() {
        let output = dis("x = 1000\ny = x\n");
        assert!(output.contains("LOAD_CONST"));
        assert!(output.contains("(1000)"));
        assert!(output.contains("STORE_NAME"));
        assert!(output.contains("(x)"));
    }

    #[test]
    fn jumps_render_as_byte_targets() {
        let output = dis("if a:\n    b\n");
        assert!(output.contains("POP_JUMP_IF_FALSE"));
        assert!(output.contains("(to "));
    }

    #[test]
    fn nested_code_objects_are_dumped() {
        let output = dis("def f():\n    return 1\n");
        assert!(output.contains("<code object <module>"));
        assert!(output.contains("<code object f"));
    }
}

//! Code objects: the compiler's output record.
//!
//! A [`CodeObject`] is built up mutably for the duration of one scope, then
//! finalized exactly once: the assembler packs the logical instruction list
//! into bytes (inserting `EXTENDED_ARG` prefixes), rewrites jump arguments
//! from instruction indices to byte offsets, and records the maximum stack
//! depth. Nested scopes become [`Constant::Code`] entries in their parent's
//! constant pool.

use crate::bytecode::Opcode;

bitflags::bitflags! {
    /// Code-object flags. Bit positions match CPython's `CO_*` values.
    /// Serde support comes from bitflags' own `serde` feature.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CodeFlags: u32 {
        const OPTIMIZED = 0x1;
        const NEWLOCALS = 0x2;
        const VARARGS = 0x4;
        const VARKEYWORDS = 0x8;
        const NESTED = 0x10;
        const GENERATOR = 0x20;
        const NOFREE = 0x40;
        const COROUTINE = 0x80;
        const ITERABLE_COROUTINE = 0x100;
        const ASYNC_GENERATOR = 0x200;
        const FUTURE_DIVISION = 0x20000;
        const FUTURE_ANNOTATIONS = 0x1000000;
    }
}

/// A constant-pool entry. Nested code objects are interned here like any
/// other constant.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    None,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Constant>),
    Code(Box<CodeObject>),
}

impl Constant {
    /// Python-style `repr`, used in disassembly annotations.
    pub fn py_repr(&self) -> String {
        match self {
            Constant::None => "None".to_string(),
            Constant::Ellipsis => "Ellipsis".to_string(),
            Constant::Bool(true) => "True".to_string(),
            Constant::Bool(false) => "False".to_string(),
            Constant::Int(i) => i.to_string(),
            Constant::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e16 {
                    format!("{f:.1}")
                } else {
                    format!("{f}")
                }
            }
            Constant::Str(s) => format!("{:?}", s).replace('"', "'"),
            Constant::Bytes(b) => format!("b{:?}", String::from_utf8_lossy(b)),
            Constant::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Constant::py_repr).collect();
                if items.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Constant::Code(code) => format!("<code object {}>", code.qualname),
        }
    }
}

impl From<&krait_ast::ConstantValue> for Constant {
    fn from(value: &krait_ast::ConstantValue) -> Self {
        use krait_ast::ConstantValue;
        match value {
            ConstantValue::None => Constant::None,
            ConstantValue::Ellipsis => Constant::Ellipsis,
            ConstantValue::Bool(b) => Constant::Bool(*b),
            ConstantValue::Int(i) => Constant::Int(*i),
            ConstantValue::Float(f) => Constant::Float(*f),
            ConstantValue::Str(s) => Constant::Str(s.clone()),
            ConstantValue::Bytes(b) => Constant::Bytes(b.clone()),
        }
    }
}

/// One logical instruction: opcode, full-width argument, source line.
///
/// For jump opcodes the argument is a target *instruction index* while the
/// code object is under construction, and the target's *byte offset* after
/// [`CodeObject::finalize`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    pub opcode: Opcode,
    pub arg: u32,
    pub line: u32,
}

/// The compiled form of one scope.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodeObject {
    // Identity.
    pub name: String,
    pub qualname: String,
    pub filename: String,
    pub first_line: u32,

    // Code.
    pub instructions: Vec<Instruction>,
    /// Byte offset of each instruction; filled in by `finalize`.
    pub offsets: Vec<u32>,
    /// Packed bytecode; filled in by `finalize`.
    pub code: Vec<u8>,

    // Pools.
    pub consts: Vec<Constant>,
    pub names: Vec<String>,
    pub varnames: Vec<String>,
    pub freevars: Vec<String>,
    pub cellvars: Vec<String>,

    // Counts.
    pub argcount: u32,
    pub posonlyargcount: u32,
    pub kwonlyargcount: u32,
    pub nlocals: u32,
    pub stacksize: u32,

    pub flags: CodeFlags,
}

impl CodeObject {
    pub fn new(name: &str, qualname: &str, filename: &str, first_line: u32, flags: CodeFlags) -> Self {
        CodeObject {
            name: name.to_string(),
            qualname: qualname.to_string(),
            filename: filename.to_string(),
            first_line,
            flags,
            ..Default::default()
        }
    }

    /// Intern a constant, reusing an existing equal entry.
    ///
    /// Slot 0 is reserved for `None` by convention, so the pool is seeded
    /// with it on first use.
    pub fn add_const(&mut self, value: Constant) -> u32 {
        if self.consts.is_empty() {
            self.consts.push(Constant::None);
        }
        if let Some(index) = self.consts.iter().position(|c| *c == value) {
            return index as u32;
        }
        self.consts.push(value);
        (self.consts.len() - 1) as u32
    }

    /// Intern a global/attribute/import name.
    pub fn add_name(&mut self, name: &str) -> u32 {
        if let Some(index) = self.names.iter().position(|n| n == name) {
            return index as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    /// Intern a local variable name.
    pub fn add_varname(&mut self, name: &str) -> u32 {
        if let Some(index) = self.varnames.iter().position(|n| n == name) {
            return index as u32;
        }
        self.varnames.push(name.to_string());
        (self.varnames.len() - 1) as u32
    }

    /// Intern a free variable name.
    pub fn add_freevar(&mut self, name: &str) -> u32 {
        if let Some(index) = self.freevars.iter().position(|n| n == name) {
            return index as u32;
        }
        self.freevars.push(name.to_string());
        (self.freevars.len() - 1) as u32
    }

    /// Finalize the code object: compute `nlocals` and `stacksize`, resolve
    /// jump arguments to byte offsets, and pack the byte vector.
    ///
    /// Must be called exactly once, at scope exit.
    pub fn finalize(&mut self) {
        debug_assert!(self.code.is_empty(), "finalize called twice");
        self.nlocals = self.varnames.len() as u32;
        self.stacksize = self.max_stack_depth();
        self.assemble();
    }

    /// Conservative maximum stack depth: simulate the instruction list with
    /// the declared stack effects, following both edges of every jump.
    ///
    /// Runs before assembly, while jump arguments are still instruction
    /// indices. Instructions only reachable through an exception edge (the
    /// `END_ASYNC_FOR` landing pad) are not simulated.
    fn max_stack_depth(&self) -> u32 {
        let count = self.instructions.len();
        if count == 0 {
            return 0;
        }
        let mut depths: Vec<Option<i32>> = vec![None; count];
        let mut work: Vec<(usize, i32)> = vec![(0, 0)];
        let mut max_depth: i32 = 0;

        while let Some((index, depth)) = work.pop() {
            if index >= count {
                continue;
            }
            match depths[index] {
                Some(seen) if seen >= depth => continue,
                _ => depths[index] = Some(depth),
            }
            max_depth = max_depth.max(depth);

            let instruction = &self.instructions[index];
            let opcode = instruction.opcode;
            let after = depth + opcode.stack_effect(instruction.arg, false);
            max_depth = max_depth.max(after);

            if opcode.is_jump() {
                let target = instruction.arg as usize;
                let jump_depth = depth + opcode.stack_effect(instruction.arg, true);
                work.push((target, jump_depth));
                let unconditional = matches!(
                    opcode,
                    Opcode::JumpForward | Opcode::JumpBackward | Opcode::JumpBackwardNoInterrupt
                );
                if !unconditional {
                    work.push((index + 1, after));
                }
            } else if !matches!(
                opcode,
                Opcode::ReturnValue
                    | Opcode::Reraise
                    | Opcode::RaiseVarargs
                    | Opcode::InterpreterExit
            ) {
                work.push((index + 1, after));
            }
        }
        max_depth.max(0) as u32
    }

    /// Number of 2-byte units needed to encode `arg` (1 plus one per
    /// `EXTENDED_ARG` prefix).
    fn units_for(arg: u32) -> u32 {
        match arg {
            0..=0xff => 1,
            0x100..=0xffff => 2,
            0x1_0000..=0xff_ffff => 3,
            _ => 4,
        }
    }

    /// Pack instructions into bytes. Jump targets are instruction indices on
    /// entry; encoding widths and byte offsets depend on each other, so the
    /// widths are grown to a fixed point before emission.
    fn assemble(&mut self) {
        let n = self.instructions.len();
        let mut units: Vec<u32> = vec![1; n];
        let mut offsets: Vec<u32> = vec![0; n];

        loop {
            let mut offset = 0;
            for i in 0..n {
                offsets[i] = offset;
                offset += units[i] * 2;
            }

            let mut changed = false;
            for (i, instruction) in self.instructions.iter().enumerate() {
                let encoded = if instruction.opcode.is_jump() {
                    offsets[instruction.arg as usize]
                } else {
                    instruction.arg
                };
                let needed = Self::units_for(encoded);
                if needed > units[i] {
                    units[i] = needed;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Rewrite jump arguments to byte offsets, then emit.
        for instruction in &mut self.instructions {
            if instruction.opcode.is_jump() {
                instruction.arg = offsets[instruction.arg as usize];
            }
        }

        let mut code = Vec::with_capacity(self.instructions.len() * 2);
        for instruction in &self.instructions {
            let arg = instruction.arg;
            let prefixes = Self::units_for(arg) - 1;
            for p in (1..=prefixes).rev() {
                code.push(Opcode::ExtendedArg.as_u8());
                code.push(((arg >> (8 * p)) & 0xff) as u8);
            }
            code.push(instruction.opcode.as_u8());
            code.push((arg & 0xff) as u8);
        }

        self.offsets = offsets;
        self.code = code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_pool_reserves_slot_zero_for_none() {
        let mut code = CodeObject::default();
        let index = code.add_const(Constant::Int(7));
        assert_eq!(code.consts[0], Constant::None);
        assert_eq!(index, 1);
        assert_eq!(code.add_const(Constant::None), 0);
    }

    #[test]
    fn constants_are_interned_by_value() {
        // Adding the same constant twice returns the same index.
        let mut code = CodeObject::default();
        let a = code.add_const(Constant::Str("x".to_string()));
        let b = code.add_const(Constant::Str("x".to_string()));
        assert_eq!(a, b);
        let c = code.add_const(Constant::Str("y".to_string()));
        assert_ne!(a, c);
    }

    #[test]
    fn names_are_interned_by_string() {
        let mut code = CodeObject::default();
        assert_eq!(code.add_name("a"), 0);
        assert_eq!(code.add_name("b"), 1);
        assert_eq!(code.add_name("a"), 0);
        assert_eq!(code.add_varname("a"), 0);
    }

    #[test]
    fn assemble_packs_two_bytes_per_instruction() {
        let mut code = CodeObject::default();
        code.instructions = vec![
            Instruction {
                opcode: Opcode::LoadSmallInt,
                arg: 5,
                line: 1,
            },
            Instruction {
                opcode: Opcode::ReturnValue,
                arg: 0,
                line: 1,
            },
        ];
        code.finalize();
        assert_eq!(code.code.len(), 4);
        assert_eq!(code.offsets, vec![0, 2]);
        assert_eq!(code.code[0], Opcode::LoadSmallInt.as_u8());
        assert_eq!(code.code[1], 5);
    }

    #[test]
    fn wide_arguments_get_extended_arg_prefixes() {
        let mut code = CodeObject::default();
        code.instructions = vec![Instruction {
            opcode: Opcode::LoadConst,
            arg: 0x1234,
            line: 1,
        }];
        code.finalize();
        assert_eq!(
            code.code,
            vec![
                Opcode::ExtendedArg.as_u8(),
                0x12,
                Opcode::LoadConst.as_u8(),
                0x34
            ]
        );
    }

    #[test]
    fn jump_arguments_become_byte_offsets() {
        let mut code = CodeObject::default();
        code.instructions = vec![
            Instruction {
                opcode: Opcode::LoadSmallInt,
                arg: 1,
                line: 1,
            },
            Instruction {
                opcode: Opcode::PopJumpIfFalse,
                arg: 3, // instruction index
                line: 1,
            },
            Instruction {
                opcode: Opcode::Nop,
                arg: 0,
                line: 1,
            },
            Instruction {
                opcode: Opcode::ReturnValue,
                arg: 0,
                line: 1,
            },
        ];
        code.finalize();
        // Target instruction 3 sits at byte offset 6.
        assert_eq!(code.instructions[1].arg, 6);
    }

    #[test]
    fn stack_depth_is_recorded() {
        let mut code = CodeObject::default();
        code.instructions = vec![
            Instruction {
                opcode: Opcode::LoadSmallInt,
                arg: 1,
                line: 1,
            },
            Instruction {
                opcode: Opcode::LoadSmallInt,
                arg: 2,
                line: 1,
            },
            Instruction {
                opcode: Opcode::BinaryOp,
                arg: 0,
                line: 1,
            },
            Instruction {
                opcode: Opcode::ReturnValue,
                arg: 0,
                line: 1,
            },
        ];
        code.finalize();
        assert_eq!(code.stacksize, 2);
    }
}

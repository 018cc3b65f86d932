//! The instruction set.
//!
//! Each instruction is two bytes on the wire: a one-byte opcode and a
//! one-byte argument, with `EXTENDED_ARG` prefixes supplying higher argument
//! bits. Numeric opcode values follow the CPython 3.12 layout where the
//! opcode exists there; opcodes that CPython added later (`LOAD_SMALL_INT`,
//! `BUILD_TEMPLATE`, the split format opcodes) occupy slots that 3.12 leaves
//! unused. Values below [`Opcode::HAVE_ARGUMENT`] take no argument.
//!
//! Every opcode declares its stack effect as a function of its argument, and
//! for the jump opcodes, of whether the jump is taken. The compiler's
//! stack-size analysis and the test suite's stack simulation both read from
//! this single table.

/// One opcode. The discriminant is the wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Opcode {
    // ---- no argument ----
    Cache = 0,
    PopTop = 1,
    PushNull = 2,
    InterpreterExit = 3,
    EndFor = 4,
    EndSend = 5,
    ToBool = 6,
    PopIter = 7,
    Nop = 9,
    UnaryNegative = 11,
    UnaryNot = 12,
    UnaryInvert = 15,
    BinarySubscr = 25,
    BinarySlice = 26,
    StoreSlice = 27,
    GetLen = 30,
    MatchMapping = 31,
    MatchSequence = 32,
    MatchKeys = 33,
    PushExcInfo = 35,
    CheckExcMatch = 36,
    CheckEgMatch = 37,
    FormatSimple = 40,
    FormatWithSpec = 41,
    WithExceptStart = 49,
    GetAiter = 50,
    GetAnext = 51,
    BeforeAsyncWith = 52,
    BeforeWith = 53,
    EndAsyncFor = 54,
    StoreSubscr = 60,
    DeleteSubscr = 61,
    GetIter = 68,
    GetYieldFromIter = 69,
    GetAwaitable = 70,
    LoadBuildClass = 71,
    ReturnGenerator = 75,
    ReturnValue = 83,
    SetupAnnotations = 85,
    PopExcept = 89,

    // ---- with argument ----
    StoreName = 90,
    DeleteName = 91,
    UnpackSequence = 92,
    ForIter = 93,
    UnpackEx = 94,
    StoreAttr = 95,
    DeleteAttr = 96,
    StoreGlobal = 97,
    DeleteGlobal = 98,
    Swap = 99,
    LoadConst = 100,
    LoadName = 101,
    BuildTuple = 102,
    BuildList = 103,
    BuildSet = 104,
    BuildMap = 105,
    LoadAttr = 106,
    CompareOp = 107,
    ImportName = 108,
    ImportFrom = 109,
    JumpForward = 110,
    LoadSmallInt = 111,
    PopJumpIfFalse = 114,
    PopJumpIfTrue = 115,
    LoadGlobal = 116,
    IsOp = 117,
    ContainsOp = 118,
    Reraise = 119,
    Copy = 120,
    BinaryOp = 122,
    Send = 123,
    LoadFast = 124,
    StoreFast = 125,
    DeleteFast = 126,
    PopJumpIfNotNone = 128,
    PopJumpIfNone = 129,
    RaiseVarargs = 130,
    MakeFunction = 132,
    BuildSlice = 133,
    JumpBackwardNoInterrupt = 134,
    MakeCell = 135,
    LoadDeref = 137,
    StoreDeref = 138,
    JumpBackward = 140,
    CallFunctionEx = 142,
    ExtendedArg = 144,
    ListAppend = 145,
    SetAdd = 146,
    MapAdd = 147,
    YieldValue = 150,
    Resume = 151,
    MatchClass = 152,
    BuildString = 157,
    BuildTemplate = 158,
    BuildInterpolation = 159,
    ConvertValue = 161,
    ListExtend = 162,
    SetUpdate = 163,
    DictMerge = 164,
    DictUpdate = 165,
    Call = 171,
    CallKw = 172,
    CallIntrinsic1 = 173,
    CallIntrinsic2 = 174,
}

impl Opcode {
    /// Opcodes at or above this value carry an argument.
    pub const HAVE_ARGUMENT: u8 = 90;

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn has_arg(self) -> bool {
        self.as_u8() >= Self::HAVE_ARGUMENT
    }

    /// Whether the argument names a jump target.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::JumpForward
                | Opcode::JumpBackward
                | Opcode::JumpBackwardNoInterrupt
                | Opcode::PopJumpIfFalse
                | Opcode::PopJumpIfTrue
                | Opcode::PopJumpIfNone
                | Opcode::PopJumpIfNotNone
                | Opcode::ForIter
                | Opcode::Send
        )
    }

    /// The uppercase wire name used in disassembly listings.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Cache => "CACHE",
            Opcode::PopTop => "POP_TOP",
            Opcode::PushNull => "PUSH_NULL",
            Opcode::InterpreterExit => "INTERPRETER_EXIT",
            Opcode::EndFor => "END_FOR",
            Opcode::EndSend => "END_SEND",
            Opcode::ToBool => "TO_BOOL",
            Opcode::PopIter => "POP_ITER",
            Opcode::Nop => "NOP",
            Opcode::UnaryNegative => "UNARY_NEGATIVE",
            Opcode::UnaryNot => "UNARY_NOT",
            Opcode::UnaryInvert => "UNARY_INVERT",
            Opcode::BinarySubscr => "BINARY_SUBSCR",
            Opcode::BinarySlice => "BINARY_SLICE",
            Opcode::StoreSlice => "STORE_SLICE",
            Opcode::GetLen => "GET_LEN",
            Opcode::MatchMapping => "MATCH_MAPPING",
            Opcode::MatchSequence => "MATCH_SEQUENCE",
            Opcode::MatchKeys => "MATCH_KEYS",
            Opcode::PushExcInfo => "PUSH_EXC_INFO",
            Opcode::CheckExcMatch => "CHECK_EXC_MATCH",
            Opcode::CheckEgMatch => "CHECK_EG_MATCH",
            Opcode::FormatSimple => "FORMAT_SIMPLE",
            Opcode::FormatWithSpec => "FORMAT_WITH_SPEC",
            Opcode::WithExceptStart => "WITH_EXCEPT_START",
            Opcode::GetAiter => "GET_AITER",
            Opcode::GetAnext => "GET_ANEXT",
            Opcode::BeforeAsyncWith => "BEFORE_ASYNC_WITH",
            Opcode::BeforeWith => "BEFORE_WITH",
            Opcode::EndAsyncFor => "END_ASYNC_FOR",
            Opcode::StoreSubscr => "STORE_SUBSCR",
            Opcode::DeleteSubscr => "DELETE_SUBSCR",
            Opcode::GetIter => "GET_ITER",
            Opcode::GetYieldFromIter => "GET_YIELD_FROM_ITER",
            Opcode::GetAwaitable => "GET_AWAITABLE",
            Opcode::LoadBuildClass => "LOAD_BUILD_CLASS",
            Opcode::ReturnGenerator => "RETURN_GENERATOR",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::SetupAnnotations => "SETUP_ANNOTATIONS",
            Opcode::PopExcept => "POP_EXCEPT",
            Opcode::StoreName => "STORE_NAME",
            Opcode::DeleteName => "DELETE_NAME",
            Opcode::UnpackSequence => "UNPACK_SEQUENCE",
            Opcode::ForIter => "FOR_ITER",
            Opcode::UnpackEx => "UNPACK_EX",
            Opcode::StoreAttr => "STORE_ATTR",
            Opcode::DeleteAttr => "DELETE_ATTR",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::DeleteGlobal => "DELETE_GLOBAL",
            Opcode::Swap => "SWAP",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::LoadName => "LOAD_NAME",
            Opcode::BuildTuple => "BUILD_TUPLE",
            Opcode::BuildList => "BUILD_LIST",
            Opcode::BuildSet => "BUILD_SET",
            Opcode::BuildMap => "BUILD_MAP",
            Opcode::LoadAttr => "LOAD_ATTR",
            Opcode::CompareOp => "COMPARE_OP",
            Opcode::ImportName => "IMPORT_NAME",
            Opcode::ImportFrom => "IMPORT_FROM",
            Opcode::JumpForward => "JUMP_FORWARD",
            Opcode::LoadSmallInt => "LOAD_SMALL_INT",
            Opcode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            Opcode::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::IsOp => "IS_OP",
            Opcode::ContainsOp => "CONTAINS_OP",
            Opcode::Reraise => "RERAISE",
            Opcode::Copy => "COPY",
            Opcode::BinaryOp => "BINARY_OP",
            Opcode::Send => "SEND",
            Opcode::LoadFast => "LOAD_FAST",
            Opcode::StoreFast => "STORE_FAST",
            Opcode::DeleteFast => "DELETE_FAST",
            Opcode::PopJumpIfNotNone => "POP_JUMP_IF_NOT_NONE",
            Opcode::PopJumpIfNone => "POP_JUMP_IF_NONE",
            Opcode::RaiseVarargs => "RAISE_VARARGS",
            Opcode::MakeFunction => "MAKE_FUNCTION",
            Opcode::BuildSlice => "BUILD_SLICE",
            Opcode::JumpBackwardNoInterrupt => "JUMP_BACKWARD_NO_INTERRUPT",
            Opcode::MakeCell => "MAKE_CELL",
            Opcode::LoadDeref => "LOAD_DEREF",
            Opcode::StoreDeref => "STORE_DEREF",
            Opcode::JumpBackward => "JUMP_BACKWARD",
            Opcode::CallFunctionEx => "CALL_FUNCTION_EX",
            Opcode::ExtendedArg => "EXTENDED_ARG",
            Opcode::ListAppend => "LIST_APPEND",
            Opcode::SetAdd => "SET_ADD",
            Opcode::MapAdd => "MAP_ADD",
            Opcode::YieldValue => "YIELD_VALUE",
            Opcode::Resume => "RESUME",
            Opcode::MatchClass => "MATCH_CLASS",
            Opcode::BuildString => "BUILD_STRING",
            Opcode::BuildTemplate => "BUILD_TEMPLATE",
            Opcode::BuildInterpolation => "BUILD_INTERPOLATION",
            Opcode::ConvertValue => "CONVERT_VALUE",
            Opcode::ListExtend => "LIST_EXTEND",
            Opcode::SetUpdate => "SET_UPDATE",
            Opcode::DictMerge => "DICT_MERGE",
            Opcode::DictUpdate => "DICT_UPDATE",
            Opcode::Call => "CALL",
            Opcode::CallKw => "CALL_KW",
            Opcode::CallIntrinsic1 => "CALL_INTRINSIC_1",
            Opcode::CallIntrinsic2 => "CALL_INTRINSIC_2",
        }
    }

    /// Net change in operand-stack depth for this instruction.
    ///
    /// `jump` selects the effect on the taken-branch for the opcodes whose
    /// effect differs (`FOR_ITER`, `SEND`). For everything else it is
    /// ignored.
    pub fn stack_effect(self, arg: u32, jump: bool) -> i32 {
        let arg = arg as i32;
        match self {
            Opcode::Cache | Opcode::Nop | Opcode::Resume | Opcode::ExtendedArg => 0,
            Opcode::PopTop => -1,
            Opcode::PushNull => 1,
            Opcode::InterpreterExit => -1,
            Opcode::EndFor => -1,
            Opcode::EndSend => -1,
            Opcode::ToBool => 0,
            Opcode::PopIter => -1,
            Opcode::UnaryNegative | Opcode::UnaryNot | Opcode::UnaryInvert => 0,
            Opcode::BinarySubscr => -1,
            Opcode::BinarySlice => -2,
            Opcode::StoreSlice => -4,
            Opcode::GetLen => 1,
            Opcode::MatchMapping | Opcode::MatchSequence => 1,
            Opcode::MatchKeys => 1,
            Opcode::PushExcInfo => 1,
            Opcode::CheckExcMatch | Opcode::CheckEgMatch => 0,
            Opcode::FormatSimple => 0,
            Opcode::FormatWithSpec => -1,
            Opcode::WithExceptStart => 1,
            Opcode::GetAiter => 0,
            Opcode::GetAnext => 1,
            Opcode::BeforeAsyncWith | Opcode::BeforeWith => 1,
            Opcode::EndAsyncFor => -1,
            Opcode::StoreSubscr => -3,
            Opcode::DeleteSubscr => -2,
            Opcode::GetIter | Opcode::GetYieldFromIter | Opcode::GetAwaitable => 0,
            Opcode::LoadBuildClass => 1,
            Opcode::ReturnGenerator => 1,
            Opcode::ReturnValue => -1,
            Opcode::SetupAnnotations => 0,
            Opcode::PopExcept => -1,

            Opcode::StoreName | Opcode::StoreGlobal | Opcode::StoreFast | Opcode::StoreDeref => -1,
            Opcode::DeleteName
            | Opcode::DeleteGlobal
            | Opcode::DeleteFast
            | Opcode::MakeCell => 0,
            Opcode::UnpackSequence => arg - 1,
            // UNPACK_EX: low byte = before-star count, high byte = after.
            Opcode::UnpackEx => (arg & 0xff) + (arg >> 8),
            Opcode::ForIter => {
                if jump {
                    0
                } else {
                    1
                }
            }
            Opcode::StoreAttr => -2,
            Opcode::DeleteAttr => -1,
            Opcode::Swap => 0,
            Opcode::LoadConst
            | Opcode::LoadName
            | Opcode::LoadGlobal
            | Opcode::LoadFast
            | Opcode::LoadDeref
            | Opcode::LoadSmallInt => 1,
            Opcode::BuildTuple | Opcode::BuildList | Opcode::BuildSet | Opcode::BuildString => {
                1 - arg
            }
            Opcode::BuildTemplate => 1 - arg,
            Opcode::BuildInterpolation => -arg,
            Opcode::BuildMap => 1 - 2 * arg,
            Opcode::LoadAttr => 0,
            Opcode::CompareOp => -1,
            Opcode::ImportName => -1,
            Opcode::ImportFrom => 1,
            Opcode::JumpForward | Opcode::JumpBackward | Opcode::JumpBackwardNoInterrupt => 0,
            Opcode::PopJumpIfFalse
            | Opcode::PopJumpIfTrue
            | Opcode::PopJumpIfNone
            | Opcode::PopJumpIfNotNone => -1,
            Opcode::IsOp | Opcode::ContainsOp => -1,
            Opcode::Reraise => 0,
            Opcode::Copy => 1,
            Opcode::BinaryOp => -1,
            // SEND replaces the sent value with the received one on both
            // paths; END_SEND later drops the receiver.
            Opcode::Send => 0,
            Opcode::RaiseVarargs => -arg,
            // MAKE_FUNCTION pops the code object plus one extra per flag bit
            // (defaults, kwdefaults, annotations, closure) and pushes the
            // function.
            Opcode::MakeFunction => -((arg & 0xf).count_ones() as i32),
            Opcode::BuildSlice => 1 - arg,
            Opcode::CallFunctionEx => -2 - (arg & 1),
            Opcode::ListAppend | Opcode::SetAdd => -1,
            Opcode::MapAdd => -2,
            Opcode::YieldValue => 0,
            Opcode::MatchClass => -2,
            Opcode::ConvertValue => 0,
            Opcode::ListExtend | Opcode::SetUpdate | Opcode::DictMerge | Opcode::DictUpdate => -1,
            Opcode::Call => -arg,
            Opcode::CallKw => -arg - 1,
            Opcode::CallIntrinsic1 => 0,
            Opcode::CallIntrinsic2 => -1,
        }
    }
}

/// `BINARY_OP` argument values, matching CPython's `NB_*` numbering
/// (`NB_FLOOR_DIVIDE == 2`, `NB_REMAINDER == 6`). Inplace variants start at
/// [`BinaryOpArg::INPLACE_OFFSET`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinaryOpArg {
    Add = 0,
    And = 1,
    FloorDivide = 2,
    Lshift = 3,
    MatrixMultiply = 4,
    Multiply = 5,
    Remainder = 6,
    Or = 7,
    Power = 8,
    Rshift = 9,
    Subtract = 10,
    TrueDivide = 11,
    Xor = 12,
}

impl BinaryOpArg {
    pub const INPLACE_OFFSET: u32 = 13;

    pub fn from_operator(op: krait_ast::Operator) -> Self {
        use krait_ast::Operator;
        match op {
            Operator::Add => BinaryOpArg::Add,
            Operator::BitAnd => BinaryOpArg::And,
            Operator::FloorDiv => BinaryOpArg::FloorDivide,
            Operator::LShift => BinaryOpArg::Lshift,
            Operator::MatMult => BinaryOpArg::MatrixMultiply,
            Operator::Mult => BinaryOpArg::Multiply,
            Operator::Mod => BinaryOpArg::Remainder,
            Operator::BitOr => BinaryOpArg::Or,
            Operator::Pow => BinaryOpArg::Power,
            Operator::RShift => BinaryOpArg::Rshift,
            Operator::Sub => BinaryOpArg::Subtract,
            Operator::Div => BinaryOpArg::TrueDivide,
            Operator::BitXor => BinaryOpArg::Xor,
        }
    }

    pub fn arg(self, inplace: bool) -> u32 {
        self as u32 + if inplace { Self::INPLACE_OFFSET } else { 0 }
    }

    /// The symbol shown in disassembly annotations (`+`, `+=`, ...).
    pub fn symbol(arg: u32) -> &'static str {
        const PLAIN: [&str; 13] = [
            "+", "&", "//", "<<", "@", "*", "%", "|", "**", ">>", "-", "/", "^",
        ];
        const INPLACE: [&str; 13] = [
            "+=", "&=", "//=", "<<=", "@=", "*=", "%=", "|=", "**=", ">>=", "-=", "/=", "^=",
        ];
        let index = (arg % 26) as usize;
        if index < 13 {
            PLAIN[index]
        } else {
            INPLACE[index - 13]
        }
    }
}

/// `COMPARE_OP` argument values, following the CPython 3.11 `cmp_op` order.
/// Identity and membership tests use `IS_OP` / `CONTAINS_OP` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompareOpArg {
    Lt = 0,
    LtE = 1,
    Eq = 2,
    NotEq = 3,
    Gt = 4,
    GtE = 5,
}

impl CompareOpArg {
    pub fn symbol(arg: u32) -> &'static str {
        match arg {
            0 => "<",
            1 => "<=",
            2 => "==",
            3 => "!=",
            4 => ">",
            5 => ">=",
            _ => "?",
        }
    }
}

/// `CALL_INTRINSIC_1` function numbers (CPython 3.12 values).
pub mod intrinsic1 {
    pub const IMPORT_STAR: u32 = 2;
    pub const UNARY_POSITIVE: u32 = 5;
    pub const LIST_TO_TUPLE: u32 = 6;
    pub const TYPEVAR: u32 = 7;
    pub const PARAMSPEC: u32 = 8;
    pub const TYPEVARTUPLE: u32 = 9;
    pub const TYPEALIAS: u32 = 11;

    pub fn name(arg: u32) -> &'static str {
        match arg {
            IMPORT_STAR => "INTRINSIC_IMPORT_STAR",
            UNARY_POSITIVE => "INTRINSIC_UNARY_POSITIVE",
            LIST_TO_TUPLE => "INTRINSIC_LIST_TO_TUPLE",
            TYPEVAR => "INTRINSIC_TYPEVAR",
            PARAMSPEC => "INTRINSIC_PARAMSPEC",
            TYPEVARTUPLE => "INTRINSIC_TYPEVARTUPLE",
            TYPEALIAS => "INTRINSIC_TYPEALIAS",
            _ => "INTRINSIC_UNKNOWN",
        }
    }
}

/// `CALL_INTRINSIC_2` function numbers (CPython 3.12 values).
pub mod intrinsic2 {
    pub const TYPEVAR_WITH_BOUND: u32 = 2;
    pub const SET_FUNCTION_TYPE_PARAMS: u32 = 4;

    pub fn name(arg: u32) -> &'static str {
        match arg {
            TYPEVAR_WITH_BOUND => "INTRINSIC_TYPEVAR_WITH_BOUND",
            SET_FUNCTION_TYPE_PARAMS => "INTRINSIC_SET_FUNCTION_TYPE_PARAMS",
            _ => "INTRINSIC_UNKNOWN",
        }
    }
}

/// `CONVERT_VALUE` argument values.
pub mod conversion {
    pub const STR: u32 = 1;
    pub const REPR: u32 = 2;
    pub const ASCII: u32 = 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_boundary() {
        assert!(!Opcode::PopTop.has_arg());
        assert!(!Opcode::ReturnValue.has_arg());
        assert!(Opcode::LoadConst.has_arg());
        assert!(Opcode::Call.has_arg());
    }

    #[test]
    fn call_consumes_callable_plus_args() {
        // CALL n consumes the callable plus n arguments, produces one value.
        assert_eq!(Opcode::Call.stack_effect(0, false), 0);
        assert_eq!(Opcode::Call.stack_effect(3, false), -3);
    }

    #[test]
    fn builders_consume_their_elements() {
        assert_eq!(Opcode::BuildList.stack_effect(4, false), -3);
        assert_eq!(Opcode::BuildMap.stack_effect(2, false), -3);
        assert_eq!(Opcode::BuildString.stack_effect(1, false), 0);
    }

    #[test]
    fn jumps_and_conditionals() {
        assert_eq!(Opcode::JumpForward.stack_effect(7, false), 0);
        assert_eq!(Opcode::PopJumpIfFalse.stack_effect(7, false), -1);
        assert_eq!(Opcode::ForIter.stack_effect(7, false), 1);
        assert_eq!(Opcode::ForIter.stack_effect(7, true), 0);
    }

    #[test]
    fn binary_op_numbering_matches_cpython() {
        // CPython numbering: 2 is floor-div, 6 is modulo.
        assert_eq!(BinaryOpArg::FloorDivide as u32, 2);
        assert_eq!(BinaryOpArg::Remainder as u32, 6);
        assert_eq!(
            BinaryOpArg::from_operator(krait_ast::Operator::FloorDiv).arg(false),
            2
        );
        assert_eq!(
            BinaryOpArg::from_operator(krait_ast::Operator::Add).arg(true),
            13
        );
        assert_eq!(BinaryOpArg::symbol(13), "+=");
    }

    #[test]
    fn unpack_ex_effect_counts_both_sides() {
        // one before the star, two after: pops 1, pushes 1 + 1 + 2
        let arg = 1 | (2 << 8);
        assert_eq!(Opcode::UnpackEx.stack_effect(arg, false), 3);
    }
}

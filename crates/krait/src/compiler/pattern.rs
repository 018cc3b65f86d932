//! `match` pattern lowering.
//!
//! Every pattern compiles to the same protocol: the subject (a copy owned by
//! this pattern) is on top of the stack on entry, and a single boolean
//! replaces it on exit. Composite patterns (sequence, mapping, class, or,
//! as) keep that protocol by cleaning up their intermediate values on every
//! failure path, so the surrounding `case` dispatch only ever sees one
//! boolean.

use krait_ast::{
    ConstantValue, Pattern, PatternMatchClass, PatternMatchMapping, PatternMatchSequence,
};

use crate::bytecode::{CompareOpArg, Opcode};
use crate::code::Constant;
use crate::compiler::Compiler;

impl Compiler {
    /// Compile one pattern: `[subject] -> [bool]`.
    pub(super) fn compile_pattern(&mut self, pattern: &Pattern) {
        let line = pattern.location().line;
        match pattern {
            Pattern::MatchValue(p) => {
                self.compile_expr(&p.value);
                self.emit(Opcode::CompareOp, CompareOpArg::Eq as u32, line);
            }
            Pattern::MatchSingleton(p) => {
                let constant = match &p.value {
                    ConstantValue::None => Constant::None,
                    ConstantValue::Bool(b) => Constant::Bool(*b),
                    other => Constant::from(other),
                };
                // Small ints would bypass the pool; singletons compare by
                // identity, so always load from the pool.
                let index = self
                    .code_mut()
                    .add_const(constant);
                self.emit(Opcode::LoadConst, index, line);
                self.emit(Opcode::IsOp, 0, line);
            }
            Pattern::MatchAs(p) => match (&p.pattern, &p.name) {
                (None, None) => {
                    // Wildcard: always matches.
                    self.emit(Opcode::PopTop, 0, line);
                    self.emit_const(Constant::Bool(true), line);
                }
                (None, Some(name)) => {
                    // Bare capture: bind and match.
                    self.emit_store(name, line);
                    self.emit_const(Constant::Bool(true), line);
                }
                (Some(inner), name) => {
                    // Bind only after the inner pattern matches.
                    self.emit(Opcode::Copy, 1, line);
                    self.compile_pattern(inner);
                    let fail_jump = self.emit_jump(Opcode::PopJumpIfFalse, line);
                    match name {
                        Some(name) => self.emit_store(name, line),
                        None => self.emit(Opcode::PopTop, 0, line),
                    }
                    self.emit_const(Constant::Bool(true), line);
                    let end_jump = self.emit_jump(Opcode::JumpForward, line);
                    self.patch_jump(fail_jump);
                    self.emit(Opcode::PopTop, 0, line);
                    self.emit_const(Constant::Bool(false), line);
                    self.patch_jump(end_jump);
                }
            },
            Pattern::MatchOr(p) => {
                let mut matched_jumps = Vec::new();
                let last = p.patterns.len() - 1;
                for alternative in &p.patterns[..last] {
                    self.emit(Opcode::Copy, 1, line);
                    self.compile_pattern(alternative);
                    matched_jumps.push(self.emit_jump(Opcode::PopJumpIfTrue, line));
                }
                self.compile_pattern(&p.patterns[last]);
                let end_jump = self.emit_jump(Opcode::JumpForward, line);
                for jump in matched_jumps {
                    self.patch_jump(jump);
                }
                self.emit(Opcode::PopTop, 0, line);
                self.emit_const(Constant::Bool(true), line);
                self.patch_jump(end_jump);
            }
            Pattern::MatchStar(p) => {
                // Only reachable as a sequence element; the rest-list is the
                // value on the stack.
                match &p.name {
                    Some(name) => self.emit_store(name, line),
                    None => self.emit(Opcode::PopTop, 0, line),
                }
                self.emit_const(Constant::Bool(true), line);
            }
            Pattern::MatchSequence(p) => self.compile_sequence_pattern(p, line),
            Pattern::MatchMapping(p) => self.compile_mapping_pattern(p, line),
            Pattern::MatchClass(p) => self.compile_class_pattern(p, line),
        }
    }

    fn code_mut(&mut self) -> &mut crate::code::CodeObject {
        &mut self
            .scopes_last_mut()
            .code
    }

    fn compile_sequence_pattern(&mut self, p: &PatternMatchSequence, line: u32) {
        let star_position = p
            .patterns
            .iter()
            .position(|sub| matches!(sub, Pattern::MatchStar(_)));
        let n = p.patterns.len() as u32;

        let mut fail_subject_jumps = Vec::new();
        self.emit(Opcode::MatchSequence, 0, line);
        fail_subject_jumps.push(self.emit_jump(Opcode::PopJumpIfFalse, line));

        // Length check, then destructure.
        self.emit(Opcode::GetLen, 0, line);
        match star_position {
            None => {
                self.emit_const(Constant::Int(n as i64), line);
                self.emit(Opcode::CompareOp, CompareOpArg::Eq as u32, line);
            }
            Some(_) => {
                self.emit_const(Constant::Int(n as i64 - 1), line);
                self.emit(Opcode::CompareOp, CompareOpArg::GtE as u32, line);
            }
        }
        fail_subject_jumps.push(self.emit_jump(Opcode::PopJumpIfFalse, line));

        match star_position {
            None => self.emit(Opcode::UnpackSequence, n, line),
            Some(position) => {
                let before = position as u32;
                let after = n - before - 1;
                self.emit(Opcode::UnpackEx, before | (after << 8), line);
            }
        }
        let elements: Vec<&Pattern> = p.patterns.iter().collect();
        self.compile_element_patterns(&elements, 0, line);
        let end_jump = self.emit_jump(Opcode::JumpForward, line);

        for jump in fail_subject_jumps {
            self.patch_jump(jump);
        }
        self.emit(Opcode::PopTop, 0, line);
        self.emit_const(Constant::Bool(false), line);
        self.patch_jump(end_jump);
    }

    /// Match `patterns` against the values the destructuring just pushed
    /// (first value on top), with `extra_below` additional working values to
    /// discard on failure. Leaves a single boolean.
    fn compile_element_patterns(&mut self, patterns: &[&Pattern], extra_below: u32, line: u32) {
        let n = patterns.len();
        let mut fail_jumps: Vec<(usize, u32)> = Vec::new();
        for (i, sub) in patterns.iter().enumerate() {
            self.compile_pattern(sub);
            let remaining = (n - 1 - i) as u32 + extra_below;
            fail_jumps.push((self.emit_jump(Opcode::PopJumpIfFalse, line), remaining));
        }
        // All elements matched.
        for _ in 0..extra_below {
            self.emit(Opcode::PopTop, 0, line);
        }
        self.emit_const(Constant::Bool(true), line);
        let end_jump = self.emit_jump(Opcode::JumpForward, line);

        let mut end_jumps = vec![end_jump];
        for (jump, remaining) in fail_jumps {
            self.patch_jump(jump);
            for _ in 0..remaining {
                self.emit(Opcode::PopTop, 0, line);
            }
            self.emit_const(Constant::Bool(false), line);
            end_jumps.push(self.emit_jump(Opcode::JumpForward, line));
        }
        for jump in end_jumps {
            self.patch_jump(jump);
        }
    }

    fn compile_mapping_pattern(&mut self, p: &PatternMatchMapping, line: u32) {
        self.emit(Opcode::MatchMapping, 0, line);
        let not_mapping_jump = self.emit_jump(Opcode::PopJumpIfFalse, line);

        if p.keys.is_empty() {
            // `{}` or `{**rest}`: any mapping matches.
            if let Some(rest) = &p.rest {
                self.emit(Opcode::Copy, 1, line);
                self.emit_store(rest, line);
            }
            self.emit(Opcode::PopTop, 0, line);
            self.emit_const(Constant::Bool(true), line);
            let end_jump = self.emit_jump(Opcode::JumpForward, line);
            self.patch_jump(not_mapping_jump);
            self.emit(Opcode::PopTop, 0, line);
            self.emit_const(Constant::Bool(false), line);
            self.patch_jump(end_jump);
            return;
        }

        let key_count = p.keys.len() as u32;
        for key in &p.keys {
            self.compile_expr(key);
        }
        self.emit(Opcode::BuildTuple, key_count, line);
        self.emit(Opcode::MatchKeys, 0, line);
        // [subject, keys, values-or-None]
        self.emit(Opcode::Copy, 1, line);
        self.emit_none(line);
        self.emit(Opcode::IsOp, 1, line);
        let missing_keys_jump = self.emit_jump(Opcode::PopJumpIfFalse, line);

        self.emit(Opcode::UnpackSequence, key_count, line);
        // Sub-patterns consume the values; on success the keys tuple and the
        // subject still need binding/cleanup, handled via `extra_below = 2`
        // minus the rest binding below.
        let mut fail_jumps: Vec<(usize, u32)> = Vec::new();
        let n = p.patterns.len();
        for (i, sub) in p.patterns.iter().enumerate() {
            self.compile_pattern(sub);
            let remaining = (n - 1 - i) as u32 + 2;
            fail_jumps.push((self.emit_jump(Opcode::PopJumpIfFalse, line), remaining));
        }
        // Matched: [subject, keys].
        self.emit(Opcode::PopTop, 0, line);
        if let Some(rest) = &p.rest {
            self.emit(Opcode::Copy, 1, line);
            self.emit_store(rest, line);
        }
        self.emit(Opcode::PopTop, 0, line);
        self.emit_const(Constant::Bool(true), line);
        let matched_jump = self.emit_jump(Opcode::JumpForward, line);

        let mut end_jumps = vec![matched_jump];
        for (jump, remaining) in fail_jumps {
            self.patch_jump(jump);
            for _ in 0..remaining {
                self.emit(Opcode::PopTop, 0, line);
            }
            self.emit_const(Constant::Bool(false), line);
            end_jumps.push(self.emit_jump(Opcode::JumpForward, line));
        }

        // MATCH_KEYS produced None: [subject, keys, None].
        self.patch_jump(missing_keys_jump);
        self.emit(Opcode::PopTop, 0, line);
        self.emit(Opcode::PopTop, 0, line);
        self.emit(Opcode::PopTop, 0, line);
        self.emit_const(Constant::Bool(false), line);
        end_jumps.push(self.emit_jump(Opcode::JumpForward, line));

        // Not a mapping at all: [subject].
        self.patch_jump(not_mapping_jump);
        self.emit(Opcode::PopTop, 0, line);
        self.emit_const(Constant::Bool(false), line);

        for jump in end_jumps {
            self.patch_jump(jump);
        }
    }

    fn compile_class_pattern(&mut self, p: &PatternMatchClass, line: u32) {
        self.compile_expr(&p.cls);
        let names = Constant::Tuple(
            p.kwd_attrs
                .iter()
                .map(|attr| Constant::Str(attr.clone()))
                .collect(),
        );
        self.emit_const(names, line);
        // [subject, cls, names] -> [attrs-tuple | None]
        self.emit(Opcode::MatchClass, p.patterns.len() as u32, line);
        self.emit(Opcode::Copy, 1, line);
        self.emit_none(line);
        self.emit(Opcode::IsOp, 1, line);
        let no_match_jump = self.emit_jump(Opcode::PopJumpIfFalse, line);

        let total = (p.patterns.len() + p.kwd_patterns.len()) as u32;
        let all_patterns: Vec<&Pattern> = p.patterns.iter().chain(&p.kwd_patterns).collect();
        if total == 0 {
            self.emit(Opcode::PopTop, 0, line);
            self.emit_const(Constant::Bool(true), line);
        } else {
            self.emit(Opcode::UnpackSequence, total, line);
            self.compile_element_patterns(&all_patterns, 0, line);
        }
        let end_jump = self.emit_jump(Opcode::JumpForward, line);

        // MATCH_CLASS produced None.
        self.patch_jump(no_match_jump);
        self.emit(Opcode::PopTop, 0, line);
        self.emit_const(Constant::Bool(false), line);
        self.patch_jump(end_jump);
    }

    fn scopes_last_mut(&mut self) -> &mut crate::compiler::Scope {
        self.scopes
            .last_mut()
            .expect("no open scope")
    }
}

//! A small tree-walking evaluator.
//!
//! Covers the arithmetic / names / `print` subset so the CLI can run toy
//! programs end to end: constants, name binding, the numeric and comparison
//! operators, boolean logic, `if`/`while`, and `print` with captured output.
//! Everything else reports a clean "not supported" error. The bytecode
//! pipeline is the product; this module is a demonstration harness.

use rustc_hash::FxHashMap;

use krait_ast::{BoolOp, CmpOp, Expr, Module, Operator, SourceLocation, Stmt, UnaryOp};

use crate::error::EvalError;
use crate::value::Value;

/// Evaluator state: global bindings plus captured `print` output.
#[derive(Default)]
pub struct Evaluator {
    globals: FxHashMap<String, Value>,
    output: Vec<String>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines printed so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Execute a module body. Returns the value of the final expression
    /// statement, if the module ends in one.
    pub fn run_module(&mut self, module: &Module) -> Result<Option<Value>, EvalError> {
        let mut last = None;
        for stmt in &module.body {
            last = self.exec_stmt(stmt)?;
        }
        Ok(last)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Option<Value>, EvalError> {
        match stmt {
            Stmt::Expr(s) => {
                let value = self.eval_expr(&s.value)?;
                Ok(Some(value))
            }
            Stmt::Assign(s) => {
                let value = self.eval_expr(&s.value)?;
                for target in &s.targets {
                    let Expr::Name(name) = target else {
                        return Err(self.unsupported("assignment target", target.location()));
                    };
                    self.globals.insert(name.id.clone(), value.clone());
                }
                Ok(None)
            }
            Stmt::AugAssign(s) => {
                let Expr::Name(name) = s.target.as_ref() else {
                    return Err(self.unsupported("assignment target", s.target.location()));
                };
                let current = self.load(&name.id, name.location)?;
                let rhs = self.eval_expr(&s.value)?;
                let value = apply_binop(s.op, &current, &rhs, s.location)?;
                self.globals.insert(name.id.clone(), value);
                Ok(None)
            }
            Stmt::If(s) => {
                if self.eval_expr(&s.test)?.is_truthy() {
                    self.exec_body(&s.body)
                } else {
                    self.exec_body(&s.orelse)
                }
            }
            Stmt::While(s) => {
                while self.eval_expr(&s.test)?.is_truthy() {
                    self.exec_body(&s.body)?;
                }
                Ok(None)
            }
            Stmt::Pass(_) => Ok(None),
            other => Err(self.unsupported("statement", other.location())),
        }
    }

    fn exec_body(&mut self, body: &[Stmt]) -> Result<Option<Value>, EvalError> {
        let mut last = None;
        for stmt in body {
            last = self.exec_stmt(stmt)?;
        }
        Ok(last)
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Constant(c) => {
                use krait_ast::ConstantValue;
                Ok(match &c.value {
                    ConstantValue::None => Value::None,
                    ConstantValue::Bool(b) => Value::Bool(*b),
                    ConstantValue::Int(i) => Value::Int(*i),
                    ConstantValue::Float(f) => Value::Float(*f),
                    ConstantValue::Str(s) => Value::Str(s.clone()),
                    _ => return Err(self.unsupported("constant", c.location)),
                })
            }
            Expr::Name(name) => self.load(&name.id, name.location),
            Expr::BinOp(e) => {
                let left = self.eval_expr(&e.left)?;
                let right = self.eval_expr(&e.right)?;
                apply_binop(e.op, &left, &right, e.location)
            }
            Expr::UnaryOp(e) => {
                let operand = self.eval_expr(&e.operand)?;
                match e.op {
                    UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
                    UnaryOp::UAdd => Ok(operand),
                    UnaryOp::USub => match operand {
                        Value::Int(i) => Ok(Value::Int(-i)),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(EvalError::new(
                            format!("bad operand type for unary -: '{}'", other.type_name()),
                            e.location,
                        )),
                    },
                    UnaryOp::Invert => match operand {
                        Value::Int(i) => Ok(Value::Int(!i)),
                        other => Err(EvalError::new(
                            format!("bad operand type for unary ~: '{}'", other.type_name()),
                            e.location,
                        )),
                    },
                }
            }
            Expr::BoolOp(e) => {
                let mut value = self.eval_expr(&e.values[0])?;
                for operand in &e.values[1..] {
                    let keep_going = match e.op {
                        BoolOp::And => value.is_truthy(),
                        BoolOp::Or => !value.is_truthy(),
                    };
                    if !keep_going {
                        break;
                    }
                    value = self.eval_expr(operand)?;
                }
                Ok(value)
            }
            Expr::Compare(e) => {
                let mut left = self.eval_expr(&e.left)?;
                for (op, comparator) in e.ops.iter().zip(&e.comparators) {
                    let right = self.eval_expr(comparator)?;
                    if !apply_cmpop(*op, &left, &right, e.location)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp(e) => {
                if self.eval_expr(&e.test)?.is_truthy() {
                    self.eval_expr(&e.body)
                } else {
                    self.eval_expr(&e.orelse)
                }
            }
            Expr::Call(e) => {
                let Expr::Name(func) = e.func.as_ref() else {
                    return Err(self.unsupported("call", e.location));
                };
                if func.id != "print" || !e.keywords.is_empty() {
                    return Err(self.unsupported("call", e.location));
                }
                let mut parts = Vec::with_capacity(e.args.len());
                for arg in &e.args {
                    parts.push(self.eval_expr(arg)?.py_str());
                }
                self.output.push(parts.join(" "));
                Ok(Value::None)
            }
            other => Err(self.unsupported("expression", other.location())),
        }
    }

    fn load(&self, name: &str, location: SourceLocation) -> Result<Value, EvalError> {
        self.globals
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::new(format!("name '{name}' is not defined"), location))
    }

    fn unsupported(&self, what: &str, location: SourceLocation) -> EvalError {
        EvalError::new(
            format!("{what} is not supported by the expression evaluator"),
            location,
        )
    }
}

fn apply_binop(
    op: Operator,
    left: &Value,
    right: &Value,
    location: SourceLocation,
) -> Result<Value, EvalError> {
    let type_error = || {
        EvalError::new(
            format!(
                "unsupported operand types for {}: '{}' and '{}'",
                op.as_str(),
                left.type_name(),
                right.type_name()
            ),
            location,
        )
    };
    match op {
        Operator::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            _ => numeric(left, right, |a, b| a + b).ok_or_else(type_error),
        },
        Operator::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            _ => numeric(left, right, |a, b| a - b).ok_or_else(type_error),
        },
        Operator::Mult => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                Ok(Value::Str(if *n <= 0 {
                    String::new()
                } else {
                    s.repeat(*n as usize)
                }))
            }
            _ => numeric(left, right, |a, b| a * b).ok_or_else(type_error),
        },
        Operator::Div => {
            let (a, b) = both_floats(left, right).ok_or_else(type_error)?;
            if b == 0.0 {
                Err(EvalError::new("division by zero", location))
            } else {
                Ok(Value::Float(a / b))
            }
        }
        Operator::FloorDiv => match (left, right) {
            (Value::Int(_), Value::Int(0)) => Err(EvalError::new("division by zero", location)),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.div_euclid(*b))),
            _ => {
                let (a, b) = both_floats(left, right).ok_or_else(type_error)?;
                if b == 0.0 {
                    Err(EvalError::new("division by zero", location))
                } else {
                    Ok(Value::Float((a / b).floor()))
                }
            }
        },
        Operator::Mod => match (left, right) {
            (Value::Int(_), Value::Int(0)) => Err(EvalError::new("division by zero", location)),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.rem_euclid(*b))),
            _ => {
                let (a, b) = both_floats(left, right).ok_or_else(type_error)?;
                Ok(Value::Float(a - b * (a / b).floor()))
            }
        },
        Operator::Pow => match (left, right) {
            (Value::Int(a), Value::Int(b)) if *b >= 0 => {
                Ok(Value::Int(a.pow((*b).min(u32::MAX as i64) as u32)))
            }
            _ => {
                let (a, b) = both_floats(left, right).ok_or_else(type_error)?;
                Ok(Value::Float(a.powf(b)))
            }
        },
        Operator::BitOr => int_binop(left, right, |a, b| a | b).ok_or_else(type_error),
        Operator::BitXor => int_binop(left, right, |a, b| a ^ b).ok_or_else(type_error),
        Operator::BitAnd => int_binop(left, right, |a, b| a & b).ok_or_else(type_error),
        Operator::LShift => int_binop(left, right, |a, b| a << (b & 63)).ok_or_else(type_error),
        Operator::RShift => int_binop(left, right, |a, b| a >> (b & 63)).ok_or_else(type_error),
        Operator::MatMult => Err(type_error()),
    }
}

fn apply_cmpop(
    op: CmpOp,
    left: &Value,
    right: &Value,
    location: SourceLocation,
) -> Result<bool, EvalError> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        _ => match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    match op {
        CmpOp::Eq => Ok(left == right || ordering == Some(std::cmp::Ordering::Equal)),
        CmpOp::NotEq => {
            Ok(!(left == right || ordering == Some(std::cmp::Ordering::Equal)))
        }
        CmpOp::Is => Ok(left == right),
        CmpOp::IsNot => Ok(left != right),
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
            let ordering = ordering.ok_or_else(|| {
                EvalError::new(
                    format!(
                        "'{}' not supported between '{}' and '{}'",
                        op.as_str(),
                        left.type_name(),
                        right.type_name()
                    ),
                    location,
                )
            })?;
            Ok(match op {
                CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                CmpOp::LtE => ordering != std::cmp::Ordering::Greater,
                CmpOp::Gt => ordering == std::cmp::Ordering::Greater,
                CmpOp::GtE => ordering != std::cmp::Ordering::Less,
                _ => unreachable!(),
            })
        }
        CmpOp::In | CmpOp::NotIn => Err(EvalError::new(
            "membership tests are not supported by the expression evaluator",
            location,
        )),
    }
}

fn numeric(left: &Value, right: &Value, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
    let (a, b) = both_floats(left, right)?;
    Some(Value::Float(f(a, b)))
}

fn both_floats(left: &Value, right: &Value) -> Option<(f64, f64)> {
    match (left, right) {
        (Value::Str(_), _) | (_, Value::Str(_)) | (Value::None, _) | (_, Value::None) => None,
        _ => Some((left.as_float()?, right.as_float()?)),
    }
}

fn int_binop(left: &Value, right: &Value, f: impl Fn(i64, i64) -> i64) -> Option<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(Value::Int(f(*a, *b))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (Option<Value>, Vec<String>) {
        let module = krait_parser::parse_module(source).unwrap();
        let mut evaluator = Evaluator::new();
        let value = evaluator.run_module(&module).unwrap();
        (value, evaluator.output().to_vec())
    }

    #[test]
    fn arithmetic_and_names() {
        let (value, _) = run("x = 6\ny = 7\nx * y\n");
        assert_eq!(value, Some(Value::Int(42)));
    }

    #[test]
    fn print_is_captured() {
        let (_, output) = run("x = 2\nprint('x is', x)\n");
        assert_eq!(output, vec!["x is 2".to_string()]);
    }

    #[test]
    fn while_loop_accumulates() {
        let (value, _) = run("total = 0\ni = 1\nwhile i <= 4:\n    total += i\n    i += 1\ntotal\n");
        assert_eq!(value, Some(Value::Int(10)));
    }

    #[test]
    fn truthiness_and_conditionals() {
        let (value, _) = run("x = 0\nif x:\n    r = 'yes'\nelse:\n    r = 'no'\nr\n");
        assert_eq!(value, Some(Value::Str("no".to_string())));
    }

    #[test]
    fn undefined_name_errors() {
        let module = krait_parser::parse_module("missing\n").unwrap();
        let err = Evaluator::new().run_module(&module).unwrap_err();
        assert!(err.message.contains("not defined"));
    }

    #[test]
    fn division_semantics() {
        let (value, _) = run("7 / 2\n");
        assert_eq!(value, Some(Value::Float(3.5)));
        let (value, _) = run("7 // 2\n");
        assert_eq!(value, Some(Value::Int(3)));
        let (value, _) = run("-7 % 3\n");
        assert_eq!(value, Some(Value::Int(2)));
    }
}

//! Compiled-expression evaluator (spec §4.4, §4.11), grounded in
//! `examples/original_source/csvsqldb/stack_machine.h`.
//!
//! A `StackMachine` is a flat instruction vector produced by an external
//! compiler (out of scope here); `evaluate` runs it once per row against a
//! `VariableStore` the caller has already filled from the row's columns.

use crate::function_registry::{FunctionError, FunctionRegistry};
use crate::value::{CastError, Value, ValueKind};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("stack machine: value stack underflow")]
    StackUnderflow,
    #[error("stack machine: {0} left on the stack after evaluation, expected 1")]
    UnbalancedProgram(usize),
    #[error("division by zero")]
    DivisionByZero,
    #[error(transparent)]
    Cast(#[from] CastError),
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error("malformed LIKE pattern: {0}")]
    Pattern(String),
    #[error("variable slot {0} was never bound")]
    UnboundVariable(usize),
}

/// Sparse slot-indexed value bindings, refilled from the current row's
/// columns before each `evaluate` call.
#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    variables: Vec<Option<Value>>,
}

impl VariableStore {
    pub fn new() -> Self {
        VariableStore::default()
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if index >= self.variables.len() {
            self.variables.resize(index + 1, None);
        }
        self.variables[index] = Some(value);
    }

    pub fn get(&self, index: usize) -> Result<&Value, EvalError> {
        self.variables
            .get(index)
            .and_then(|v| v.as_ref())
            .ok_or(EvalError::UnboundVariable(index))
    }
}

/// Names which row column feeds which `VariableStore` slot. `(column_name,
/// slot)`; the evaluating operator resolves `column_name` against its input
/// schema once at `connect()` time.
pub type VariableIndex = (String, usize);
pub type VariableMapping = Vec<VariableIndex>;

#[derive(Debug, Clone)]
pub enum OpCode {
    Push(Value),
    PushVar(usize),
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    IsNot,
    And,
    Or,
    Not,
    Cast(ValueKind),
    Like(String),
    Between,
    In(usize),
    Func(String),
}

#[derive(Debug, Clone)]
pub struct Instruction(pub OpCode);

/// An instruction vector plus the value stack it evaluates against.
#[derive(Debug, Clone, Default)]
pub struct StackMachine {
    instructions: Vec<Instruction>,
}

impl StackMachine {
    pub fn new() -> Self {
        StackMachine::default()
    }

    pub fn add_instruction(&mut self, op: OpCode) {
        self.instructions.push(Instruction(op));
    }

    pub fn reset(&mut self) {
        self.instructions.clear();
    }

    pub fn dump(&self) -> String {
        self.instructions
            .iter()
            .map(|i| format!("{:?}", i.0))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Runs the instruction sequence once, returning the single value left
    /// on the stack.
    pub fn evaluate(
        &self,
        store: &VariableStore,
        functions: &FunctionRegistry,
    ) -> Result<Value, EvalError> {
        let mut stack: Vec<Value> = Vec::new();

        for Instruction(op) in &self.instructions {
            match op {
                OpCode::Push(v) => stack.push(v.clone()),
                OpCode::PushVar(idx) => stack.push(store.get(*idx)?.clone()),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod => {
                    let (lhs, rhs) = pop_binary(&mut stack)?;
                    stack.push(arithmetic(op, lhs, rhs)?);
                }
                OpCode::Concat => {
                    let (lhs, rhs) = pop_binary(&mut stack)?;
                    stack.push(concat(lhs, rhs)?);
                }
                OpCode::Eq | OpCode::Neq | OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => {
                    let (lhs, rhs) = pop_binary(&mut stack)?;
                    stack.push(relational(op, lhs, rhs)?);
                }
                OpCode::Is => {
                    let (lhs, rhs) = pop_binary(&mut stack)?;
                    stack.push(Value::Bool(lhs.is_null() == rhs.is_null() && values_is_eq(&lhs, &rhs)));
                }
                OpCode::IsNot => {
                    let (lhs, rhs) = pop_binary(&mut stack)?;
                    stack.push(Value::Bool(
                        !(lhs.is_null() == rhs.is_null() && values_is_eq(&lhs, &rhs)),
                    ));
                }
                OpCode::And => {
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    stack.push(logical_and(lhs, rhs));
                }
                OpCode::Or => {
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    stack.push(logical_or(lhs, rhs));
                }
                OpCode::Not => {
                    let v = pop(&mut stack)?;
                    stack.push(if v.is_null() {
                        Value::Null
                    } else {
                        Value::Bool(!v.is_truthy())
                    });
                }
                OpCode::Plus => {
                    let v = pop(&mut stack)?;
                    stack.push(v);
                }
                OpCode::Minus => {
                    let v = pop(&mut stack)?;
                    stack.push(negate(v)?);
                }
                OpCode::Cast(target) => {
                    let v = pop(&mut stack)?;
                    stack.push(v.cast_to(*target)?);
                }
                OpCode::Like(pattern) => {
                    let v = pop(&mut stack)?;
                    stack.push(like(&v, pattern)?);
                }
                OpCode::Between => {
                    let to = pop(&mut stack)?;
                    let from = pop(&mut stack)?;
                    let x = pop(&mut stack)?;
                    stack.push(between(&x, &from, &to)?);
                }
                OpCode::In(arity) => {
                    let mut candidates = Vec::with_capacity(*arity);
                    for _ in 0..*arity {
                        candidates.push(pop(&mut stack)?);
                    }
                    let x = pop(&mut stack)?;
                    stack.push(in_list(&x, &candidates));
                }
                OpCode::Func(name) => {
                    let arity = functions.arity(name)?;
                    let mut args = Vec::with_capacity(arity);
                    for _ in 0..arity {
                        args.push(pop(&mut stack)?);
                    }
                    args.reverse();
                    stack.push(functions.call(name, &args)?);
                }
            }
        }

        if stack.len() != 1 {
            return Err(EvalError::UnbalancedProgram(stack.len()));
        }
        Ok(stack.pop().unwrap())
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, EvalError> {
    stack.pop().ok_or(EvalError::StackUnderflow)
}

/// Most binary opcodes are compiled rhs-first-then-lhs, so lhs is pushed
/// last and sits on top: the first value popped is the lhs operand.
fn pop_binary(stack: &mut Vec<Value>) -> Result<(Value, Value), EvalError> {
    let lhs = pop(stack)?;
    let rhs = pop(stack)?;
    Ok((lhs, rhs))
}

fn arithmetic(op: &OpCode, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    let (a, b, as_real) = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => (*a as f64, *b as f64, false),
        (Value::Int(a), Value::Real(b)) => (*a as f64, *b, true),
        (Value::Real(a), Value::Int(b)) => (*a, *b as f64, true),
        (Value::Real(a), Value::Real(b)) => (*a, *b, true),
        _ => {
            return Err(EvalError::Cast(CastError::Unsupported(
                lhs.kind().unwrap_or(ValueKind::Int),
                rhs.kind().unwrap_or(ValueKind::Int),
            )))
        }
    };
    let (int_a, int_b) = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => (Some(*a), Some(*b)),
        _ => (None, None),
    };

    if matches!(op, OpCode::Div) && b == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    if matches!(op, OpCode::Mod) && b == 0.0 {
        return Err(EvalError::DivisionByZero);
    }

    if !as_real {
        let (ia, ib) = (int_a.unwrap(), int_b.unwrap());
        let result = match op {
            OpCode::Add => ia.checked_add(ib),
            OpCode::Sub => ia.checked_sub(ib),
            OpCode::Mul => ia.checked_mul(ib),
            OpCode::Div => ia.checked_div(ib),
            OpCode::Mod => ia.checked_rem(ib),
            _ => unreachable!(),
        };
        return result.map(Value::Int).ok_or(EvalError::Cast(CastError::Overflow));
    }

    let result = match op {
        OpCode::Add => a + b,
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,
        OpCode::Mod => a % b,
        _ => unreachable!(),
    };
    Ok(Value::Real(result))
}

fn concat(lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (a, b) => Err(EvalError::Cast(CastError::Unsupported(
            a.kind().unwrap_or(ValueKind::String),
            b.kind().unwrap_or(ValueKind::String),
        ))),
    }
}

fn values_is_eq(lhs: &Value, rhs: &Value) -> bool {
    if lhs.is_null() && rhs.is_null() {
        return true;
    }
    lhs.compare(rhs).map(|o| o.is_eq()).unwrap_or(false)
}

fn relational(op: &OpCode, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    let ord = lhs.compare(&rhs)?;
    let result = match op {
        OpCode::Eq => ord.is_eq(),
        OpCode::Neq => !ord.is_eq(),
        OpCode::Lt => ord.is_lt(),
        OpCode::Le => ord.is_le(),
        OpCode::Gt => ord.is_gt(),
        OpCode::Ge => ord.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

/// Three-valued AND: `NULL AND false` is `false`, `NULL AND true` is `NULL`.
fn logical_and(lhs: Value, rhs: Value) -> Value {
    if matches!(lhs, Value::Bool(false)) || matches!(rhs, Value::Bool(false)) {
        return Value::Bool(false);
    }
    if lhs.is_null() || rhs.is_null() {
        return Value::Null;
    }
    Value::Bool(lhs.is_truthy() && rhs.is_truthy())
}

/// Three-valued OR: `NULL OR true` is `true`, `NULL OR false` is `NULL`.
fn logical_or(lhs: Value, rhs: Value) -> Value {
    if matches!(lhs, Value::Bool(true)) || matches!(rhs, Value::Bool(true)) {
        return Value::Bool(true);
    }
    if lhs.is_null() || rhs.is_null() {
        return Value::Null;
    }
    Value::Bool(lhs.is_truthy() || rhs.is_truthy())
}

fn negate(v: Value) -> Result<Value, EvalError> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or(EvalError::Cast(CastError::Overflow)),
        Value::Real(r) => Ok(Value::Real(-r)),
        other => Err(EvalError::Cast(CastError::Unsupported(
            other.kind().unwrap_or(ValueKind::Int),
            ValueKind::Int,
        ))),
    }
}

/// `%` matches any run of characters, `_` matches exactly one.
fn like(value: &Value, pattern: &str) -> Result<Value, EvalError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let s = match value {
        Value::String(s) => s,
        other => {
            return Err(EvalError::Cast(CastError::Unsupported(
                other.kind().unwrap_or(ValueKind::String),
                ValueKind::String,
            )))
        }
    };
    Ok(Value::Bool(like_match(s.as_bytes(), pattern.as_bytes())))
}

fn like_match(s: &[u8], pattern: &[u8]) -> bool {
    match pattern.first() {
        None => s.is_empty(),
        Some(b'%') => {
            like_match(s, &pattern[1..]) || (!s.is_empty() && like_match(&s[1..], pattern))
        }
        Some(b'_') => !s.is_empty() && like_match(&s[1..], &pattern[1..]),
        Some(c) => !s.is_empty() && s[0] == *c && like_match(&s[1..], &pattern[1..]),
    }
}

fn between(x: &Value, from: &Value, to: &Value) -> Result<Value, EvalError> {
    if x.is_null() || from.is_null() || to.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Bool(
        x.compare(from)?.is_ge() && x.compare(to)?.is_le(),
    ))
}

fn in_list(x: &Value, candidates: &[Value]) -> Value {
    if x.is_null() {
        return Value::Null;
    }
    let mut saw_null = false;
    for c in candidates {
        if c.is_null() {
            saw_null = true;
            continue;
        }
        if x.compare(c).map(|o| o.is_eq()).unwrap_or(false) {
            return Value::Bool(true);
        }
    }
    if saw_null {
        Value::Null
    } else {
        Value::Bool(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ops: Vec<OpCode>) -> Value {
        let mut sm = StackMachine::new();
        for op in ops {
            sm.add_instruction(op);
        }
        let store = VariableStore::new();
        let functions = FunctionRegistry::new();
        sm.evaluate(&store, &functions).unwrap()
    }

    #[test]
    fn add_promotes_to_real() {
        let v = run(vec![
            OpCode::Push(Value::Real(1.5)),
            OpCode::Push(Value::Int(2)),
            OpCode::Add,
        ]);
        assert_eq!(v, Value::Real(3.5));
    }

    #[test]
    fn int_add_stays_int() {
        let v = run(vec![
            OpCode::Push(Value::Int(3)),
            OpCode::Push(Value::Int(2)),
            OpCode::Add,
        ]);
        assert_eq!(v, Value::Int(5));
    }

    #[test]
    fn eq_with_null_is_null_not_false() {
        let v = run(vec![OpCode::Push(Value::Null), OpCode::Push(Value::Int(1)), OpCode::Eq]);
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn is_null_is_true_for_null() {
        let v = run(vec![
            OpCode::Push(Value::Null),
            OpCode::Push(Value::Null),
            OpCode::Is,
        ]);
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn division_by_zero_fails() {
        let mut sm = StackMachine::new();
        sm.add_instruction(OpCode::Push(Value::Int(0)));
        sm.add_instruction(OpCode::Push(Value::Int(1)));
        sm.add_instruction(OpCode::Div);
        let store = VariableStore::new();
        let functions = FunctionRegistry::new();
        assert!(matches!(
            sm.evaluate(&store, &functions),
            Err(EvalError::DivisionByZero)
        ));
    }

    #[test]
    fn between_is_inclusive() {
        let v = run(vec![
            OpCode::Push(Value::Int(5)),
            OpCode::Push(Value::Int(1)),
            OpCode::Push(Value::Int(5)),
            OpCode::Between,
        ]);
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn in_list_matches_reverse_pushed_candidates() {
        // IN pushes its candidate list in reverse order (§4.11): for
        // `x IN (1, 2, 3)` the compiler pushes 3, 2, 1, then x.
        let v = run(vec![
            OpCode::Push(Value::Int(3)),
            OpCode::Push(Value::Int(2)),
            OpCode::Push(Value::Int(1)),
            OpCode::Push(Value::Int(2)),
            OpCode::In(3),
        ]);
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn like_percent_and_underscore() {
        let v = run(vec![
            OpCode::Push(Value::String("Lars".to_string())),
            OpCode::Like("L_r%".to_string()),
        ]);
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn and_short_circuits_to_false_on_null() {
        let v = run(vec![
            OpCode::Push(Value::Null),
            OpCode::Push(Value::Bool(false)),
            OpCode::And,
        ]);
        assert_eq!(v, Value::Bool(false));
    }

    #[test]
    fn func_upper_via_registry() {
        let v = run(vec![
            OpCode::Push(Value::String("ab".to_string())),
            OpCode::Func("UPPER".to_string()),
        ]);
        assert_eq!(v, Value::String("AB".to_string()));
    }
}

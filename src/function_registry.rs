//! `FunctionRegistry`: name-to-implementation lookup consulted by the
//! stack machine's FUNC instruction (spec §4.4, §6).

use std::collections::HashMap;

use crate::value::{CastError, Value, ValueKind};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FunctionError {
    #[error("unknown function {0}")]
    Unknown(String),
    #[error("{0} takes {1} argument(s)")]
    Arity(String, usize),
    #[error("{0}")]
    Cast(#[from] CastError),
}

type Implementation = fn(&[Value]) -> Result<Value, FunctionError>;

struct FunctionDef {
    arity: usize,
    implementation: Implementation,
}

/// Scalar functions callable from compiled expressions. Seeded with a
/// handful of built-ins; callers may register more with `register`.
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = FunctionRegistry {
            functions: HashMap::new(),
        };
        registry.register("UPPER", 1, upper);
        registry.register("LOWER", 1, lower);
        registry.register("LENGTH", 1, length);
        registry.register("ABS", 1, abs);
        registry.register("COALESCE", 2, coalesce);
        registry
    }

    pub fn register(&mut self, name: &str, arity: usize, implementation: Implementation) {
        self.functions.insert(
            name.to_ascii_uppercase(),
            FunctionDef {
                arity,
                implementation,
            },
        );
    }

    pub fn arity(&self, name: &str) -> Result<usize, FunctionError> {
        self.functions
            .get(&name.to_ascii_uppercase())
            .map(|f| f.arity)
            .ok_or_else(|| FunctionError::Unknown(name.to_string()))
    }

    /// All registered functions as `(name, arity)`, used by `SYSTEM_FUNCTIONS`.
    pub fn registered(&self) -> Vec<(String, usize)> {
        self.functions
            .iter()
            .map(|(name, def)| (name.clone(), def.arity))
            .collect()
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, FunctionError> {
        let def = self
            .functions
            .get(&name.to_ascii_uppercase())
            .ok_or_else(|| FunctionError::Unknown(name.to_string()))?;
        if args.len() != def.arity {
            return Err(FunctionError::Arity(name.to_string(), def.arity));
        }
        (def.implementation)(args)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn upper(args: &[Value]) -> Result<Value, FunctionError> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(s.to_uppercase())),
        other => Err(FunctionError::Cast(CastError::Unsupported(
            other.kind().unwrap_or(ValueKind::String),
            ValueKind::String,
        ))),
    }
}

fn lower(args: &[Value]) -> Result<Value, FunctionError> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(s.to_lowercase())),
        other => Err(FunctionError::Cast(CastError::Unsupported(
            other.kind().unwrap_or(ValueKind::String),
            ValueKind::String,
        ))),
    }
}

fn length(args: &[Value]) -> Result<Value, FunctionError> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
        other => Err(FunctionError::Cast(CastError::Unsupported(
            other.kind().unwrap_or(ValueKind::String),
            ValueKind::String,
        ))),
    }
}

fn abs(args: &[Value]) -> Result<Value, FunctionError> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Real(r) => Ok(Value::Real(r.abs())),
        other => Err(FunctionError::Cast(CastError::Unsupported(
            other.kind().unwrap_or(ValueKind::Int),
            ValueKind::Int,
        ))),
    }
}

fn coalesce(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(if args[0].is_null() {
        args[1].clone()
    } else {
        args[0].clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_uppercases_strings() {
        let registry = FunctionRegistry::new();
        let result = registry
            .call("upper", &[Value::String("mixed".to_string())])
            .unwrap();
        assert_eq!(result, Value::String("MIXED".to_string()));
    }

    #[test]
    fn coalesce_picks_first_non_null() {
        let registry = FunctionRegistry::new();
        let result = registry
            .call("COALESCE", &[Value::Null, Value::Int(7)])
            .unwrap();
        assert_eq!(result, Value::Int(7));
    }

    #[test]
    fn unknown_function_fails() {
        let registry = FunctionRegistry::new();
        assert!(matches!(
            registry.call("NOPE", &[]),
            Err(FunctionError::Unknown(_))
        ));
    }

    #[test]
    fn wrong_arity_fails() {
        let registry = FunctionRegistry::new();
        assert!(matches!(
            registry.call("UPPER", &[]),
            Err(FunctionError::Arity(_, 1))
        ));
    }
}

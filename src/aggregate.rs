//! Aggregation function protocol and implementations (spec §4.8), grounded
//! in `examples/original_source/csvsqldb/aggregation_functions.h`.
//!
//! Each function is `init()`-ed once per group, fed with `step()` for every
//! row in the group, and read once with `finalize()`. `suppress()` marks
//! pass-through helper columns (group-by keys carried but not selected)
//! that should not appear in the emitted row.

use crate::value::{Value, ValueKind};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("only INT and REAL are allowed for {0}, got {1}")]
    NonNumeric(&'static str, ValueKind),
    #[error("{0} overflowed")]
    Overflow(&'static str),
}

/// An aggregate function instance tracking the running state of one group.
/// Implementors must be cheaply cloneable: `GroupingBlockIterator` clones a
/// fresh, `init()`-ed set of functions per group it discovers.
pub trait AggregateFunction: AggregateFunctionClone + Send {
    fn init(&mut self);
    fn step(&mut self, value: &Value) -> Result<(), AggregateError>;
    fn finalize(&self) -> Value;
    fn suppress(&self) -> bool {
        false
    }
    fn name(&self) -> &'static str;
}

pub trait AggregateFunctionClone {
    fn clone_box(&self) -> Box<dyn AggregateFunction>;
}

impl<T> AggregateFunctionClone for T
where
    T: 'static + AggregateFunction + Clone,
{
    fn clone_box(&self) -> Box<dyn AggregateFunction> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn AggregateFunction> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Which built-in aggregate to instantiate; mirrors `eAggregateFunction` in
/// the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    CountStar,
    Sum,
    Avg,
    Min,
    Max,
    Arbitrary,
}

pub fn create(kind: AggregateKind, arg_type: ValueKind) -> Box<dyn AggregateFunction> {
    match kind {
        AggregateKind::Count => Box::new(Count::default()),
        AggregateKind::CountStar => Box::new(CountStar::default()),
        AggregateKind::Sum => Box::new(Sum::new(arg_type)),
        AggregateKind::Avg => Box::new(Avg::new(arg_type)),
        AggregateKind::Min => Box::new(MinMax::new_min(arg_type)),
        AggregateKind::Max => Box::new(MinMax::new_max(arg_type)),
        AggregateKind::Arbitrary => Box::new(Arbitrary::default()),
    }
}

/// The output `ValueKind` of an aggregate given its argument type (COUNT
/// variants always produce INT regardless of argument type).
pub fn result_kind(kind: AggregateKind, arg_type: ValueKind) -> ValueKind {
    match kind {
        AggregateKind::Count | AggregateKind::CountStar => ValueKind::Int,
        AggregateKind::Avg => ValueKind::Real,
        _ => arg_type,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Count {
    count: i64,
}

impl AggregateFunction for Count {
    fn init(&mut self) {
        self.count = 0;
    }
    fn step(&mut self, value: &Value) -> Result<(), AggregateError> {
        if !value.is_null() {
            self.count += 1;
        }
        Ok(())
    }
    fn finalize(&self) -> Value {
        Value::Int(self.count)
    }
    fn name(&self) -> &'static str {
        "COUNT"
    }
}

#[derive(Debug, Clone, Default)]
pub struct CountStar {
    count: i64,
}

impl AggregateFunction for CountStar {
    fn init(&mut self) {
        self.count = 0;
    }
    fn step(&mut self, _value: &Value) -> Result<(), AggregateError> {
        self.count += 1;
        Ok(())
    }
    fn finalize(&self) -> Value {
        Value::Int(self.count)
    }
    fn name(&self) -> &'static str {
        "COUNT_STAR"
    }
}

#[derive(Debug, Clone)]
pub struct Sum {
    arg_type: ValueKind,
    sum_int: i64,
    sum_real: f64,
    any: bool,
}

impl Sum {
    pub fn new(arg_type: ValueKind) -> Self {
        Sum {
            arg_type,
            sum_int: 0,
            sum_real: 0.0,
            any: false,
        }
    }
}

impl AggregateFunction for Sum {
    fn init(&mut self) {
        self.sum_int = 0;
        self.sum_real = 0.0;
        self.any = false;
    }
    fn step(&mut self, value: &Value) -> Result<(), AggregateError> {
        match value {
            Value::Null => Ok(()),
            Value::Int(i) => {
                self.sum_int = self
                    .sum_int
                    .checked_add(*i)
                    .ok_or(AggregateError::Overflow("SUM"))?;
                self.any = true;
                Ok(())
            }
            Value::Real(r) => {
                self.sum_real += r;
                self.any = true;
                Ok(())
            }
            other => Err(AggregateError::NonNumeric(
                "SUM",
                other.kind().unwrap_or(ValueKind::Int),
            )),
        }
    }
    fn finalize(&self) -> Value {
        match self.arg_type {
            ValueKind::Real => Value::Real(self.sum_real),
            _ => Value::Int(self.sum_int),
        }
    }
    fn name(&self) -> &'static str {
        "SUM"
    }
}

#[derive(Debug, Clone)]
pub struct Avg {
    arg_type: ValueKind,
    sum_int: i64,
    sum_real: f64,
    count: i64,
}

impl Avg {
    pub fn new(arg_type: ValueKind) -> Self {
        Avg {
            arg_type,
            sum_int: 0,
            sum_real: 0.0,
            count: 0,
        }
    }
}

impl AggregateFunction for Avg {
    fn init(&mut self) {
        self.sum_int = 0;
        self.sum_real = 0.0;
        self.count = 0;
    }
    fn step(&mut self, value: &Value) -> Result<(), AggregateError> {
        match value {
            Value::Null => Ok(()),
            Value::Int(i) => {
                self.sum_int = self
                    .sum_int
                    .checked_add(*i)
                    .ok_or(AggregateError::Overflow("AVG"))?;
                self.count += 1;
                Ok(())
            }
            Value::Real(r) => {
                self.sum_real += r;
                self.count += 1;
                Ok(())
            }
            other => Err(AggregateError::NonNumeric(
                "AVG",
                other.kind().unwrap_or(ValueKind::Int),
            )),
        }
    }
    fn finalize(&self) -> Value {
        if self.count == 0 {
            return Value::Null;
        }
        let sum = match self.arg_type {
            ValueKind::Real => self.sum_real,
            _ => self.sum_int as f64,
        };
        Value::Real(sum / self.count as f64)
    }
    fn name(&self) -> &'static str {
        "AVG"
    }
}

#[derive(Debug, Clone)]
pub struct MinMax {
    value: Value,
    is_min: bool,
}

impl MinMax {
    pub fn new_min(_arg_type: ValueKind) -> Self {
        MinMax {
            value: Value::Null,
            is_min: true,
        }
    }
    pub fn new_max(_arg_type: ValueKind) -> Self {
        MinMax {
            value: Value::Null,
            is_min: false,
        }
    }
}

impl AggregateFunction for MinMax {
    fn init(&mut self) {
        self.value = Value::Null;
    }
    fn step(&mut self, value: &Value) -> Result<(), AggregateError> {
        if value.is_null() {
            return Ok(());
        }
        let replace = match &self.value {
            Value::Null => true,
            current => {
                let ord = current.compare(value).unwrap_or(std::cmp::Ordering::Equal);
                if self.is_min {
                    ord == std::cmp::Ordering::Greater
                } else {
                    ord == std::cmp::Ordering::Less
                }
            }
        };
        if replace {
            self.value = value.clone();
        }
        Ok(())
    }
    fn finalize(&self) -> Value {
        self.value.clone()
    }
    fn name(&self) -> &'static str {
        if self.is_min {
            "MIN"
        } else {
            "MAX"
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Arbitrary {
    value: Value,
}

impl AggregateFunction for Arbitrary {
    fn init(&mut self) {
        self.value = Value::Null;
    }
    fn step(&mut self, value: &Value) -> Result<(), AggregateError> {
        if self.value.is_null() && !value.is_null() {
            self.value = value.clone();
        }
        Ok(())
    }
    fn finalize(&self) -> Value {
        self.value.clone()
    }
    fn name(&self) -> &'static str {
        "ARBITRARY"
    }
}

/// Retains the (uniform, by group-by construction) value observed for a
/// pass-through grouping column. `suppress` controls whether it is emitted.
#[derive(Debug, Clone)]
pub struct Passthrough {
    value: Value,
    suppress: bool,
}

impl Passthrough {
    pub fn new(suppress: bool) -> Self {
        Passthrough {
            value: Value::Null,
            suppress,
        }
    }
}

impl AggregateFunction for Passthrough {
    fn init(&mut self) {
        self.value = Value::Null;
    }
    fn step(&mut self, value: &Value) -> Result<(), AggregateError> {
        self.value = value.clone();
        Ok(())
    }
    fn finalize(&self) -> Value {
        self.value.clone()
    }
    fn suppress(&self) -> bool {
        self.suppress
    }
    fn name(&self) -> &'static str {
        "PASSTHROUGH"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_ignores_nulls() {
        let mut s = Sum::new(ValueKind::Int);
        s.init();
        for v in [Value::Int(1), Value::Null, Value::Int(2)] {
            s.step(&v).unwrap();
        }
        assert_eq!(s.finalize(), Value::Int(3));
    }

    #[test]
    fn avg_is_null_when_count_zero() {
        let mut a = Avg::new(ValueKind::Int);
        a.init();
        assert_eq!(a.finalize(), Value::Null);
    }

    #[test]
    fn avg_equals_sum_over_count() {
        let mut a = Avg::new(ValueKind::Int);
        a.init();
        for v in [Value::Int(2), Value::Int(4), Value::Int(6)] {
            a.step(&v).unwrap();
        }
        assert_eq!(a.finalize(), Value::Real(4.0));
    }

    #[test]
    fn min_max_ties_keep_first_seen() {
        let mut m = MinMax::new_max(ValueKind::Int);
        m.init();
        m.step(&Value::Int(5)).unwrap();
        m.step(&Value::Int(5)).unwrap();
        assert_eq!(m.finalize(), Value::Int(5));
    }

    #[test]
    fn count_star_counts_rows_unconditionally() {
        let mut c = CountStar::default();
        c.init();
        c.step(&Value::Null).unwrap();
        c.step(&Value::Int(1)).unwrap();
        assert_eq!(c.finalize(), Value::Int(2));
    }

    #[test]
    fn sum_overflow_is_detected() {
        let mut s = Sum::new(ValueKind::Int);
        s.init();
        s.step(&Value::Int(i64::MAX)).unwrap();
        assert!(s.step(&Value::Int(1)).is_err());
    }
}

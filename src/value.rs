//! The dynamic `Value` tagged union and the `Table` type, plus
//! arithmetic, equality and change-detection semantics.

use crate::error::EvalError;
use derive_more::Display;
use std::rc::Rc;

#[derive(Clone, Debug, Display)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    #[display("{_0}")]
    Str(Rc<String>),
    #[display("null")]
    Null,
    #[display("[{}]", _0.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))]
    List(Rc<Vec<Value>>),
    #[display("table({} rows)", _0.rows.len())]
    Table(Rc<Table>),
}

/// A table: a list of rows, each row a list of values, with an
/// optional header row.
#[derive(Clone, Debug, Default)]
pub struct Table {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn list(values: Vec<Value>) -> Value {
        Value::List(Rc::new(values))
    }

    pub fn table(table: Table) -> Value {
        Value::Table(Rc::new(table))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Null => "null",
            Value::List(_) => "list",
            Value::Table(_) => "table",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn type_mismatch(op: &str, a: &Value, b: &Value) -> EvalError {
        EvalError::TypeMismatch {
            message: format!("cannot apply `{op}` to {} and {}", a.type_name(), b.type_name()),
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value, EvalError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
            (a, b) if numeric(a) && numeric(b) => Ok(Value::Float(a.as_f64().unwrap() + b.as_f64().unwrap())),
            (a, b) => Err(Self::type_mismatch("+", a, b)),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value, EvalError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            (a, b) if numeric(a) && numeric(b) => Ok(Value::Float(a.as_f64().unwrap() - b.as_f64().unwrap())),
            (a, b) => Err(Self::type_mismatch("-", a, b)),
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value, EvalError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
            (a, b) if numeric(a) && numeric(b) => Ok(Value::Float(a.as_f64().unwrap() * b.as_f64().unwrap())),
            (a, b) => Err(Self::type_mismatch("*", a, b)),
        }
    }

    pub fn div(&self, other: &Value) -> Result<Value, EvalError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            (a, b) if numeric(a) && numeric(b) => {
                let divisor = b.as_f64().unwrap();
                if divisor == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(Value::Float(a.as_f64().unwrap() / divisor))
                }
            }
            (a, b) => Err(Self::type_mismatch("/", a, b)),
        }
    }

    pub fn rem(&self, other: &Value) -> Result<Value, EvalError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            (a, b) if numeric(a) && numeric(b) => {
                let divisor = b.as_f64().unwrap();
                if divisor == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(Value::Float(a.as_f64().unwrap() % divisor))
                }
            }
            (a, b) => Err(Self::type_mismatch("%", a, b)),
        }
    }

    pub fn neg(&self) -> Result<Value, EvalError> {
        match self {
            Value::Int(a) => Ok(Value::Int(-a)),
            Value::Float(a) => Ok(Value::Float(-a)),
            other => Err(EvalError::TypeMismatch {
                message: format!("cannot negate {}", other.type_name()),
            }),
        }
    }

    pub fn not(&self) -> Result<Value, EvalError> {
        match self {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(EvalError::TypeMismatch {
                message: format!("cannot negate {} as a bool", other.type_name()),
            }),
        }
    }

    pub fn compare(&self, other: &Value) -> Result<std::cmp::Ordering, EvalError> {
        match (self, other) {
            (a, b) if numeric(a) && numeric(b) => a
                .as_f64()
                .unwrap()
                .partial_cmp(&b.as_f64().unwrap())
                .ok_or_else(|| EvalError::TypeMismatch {
                    message: "cannot compare NaN".into(),
                }),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (a, b) => Err(Self::type_mismatch("comparison", a, b)),
        }
    }

    /// Tagged equality: compares by tag and value. Used both for the
    /// `==`/`!=` operators and for change detection: NaN is always
    /// unequal to itself, to guarantee propagation progress, even
    /// though that makes equality non-reflexive.
    pub fn value_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => {
                if a.is_nan() || b.is_nan() {
                    false
                } else {
                    a.to_bits() == b.to_bits() || a == b
                }
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Value::Table(a), Value::Table(b)) => {
                a.header == b.header
                    && a.rows.len() == b.rows.len()
                    && a.rows
                        .iter()
                        .zip(b.rows.iter())
                        .all(|(r1, r2)| r1.len() == r2.len() && r1.iter().zip(r2.iter()).all(|(x, y)| x.value_eq(y)))
            }
            _ => false,
        }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(other.rows.iter())
                .all(|(a, b)| a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y)))
    }
}

fn numeric(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Float(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_arithmetic_stays_int() {
        assert!(matches!(Value::Int(4).add(&Value::Int(3)).unwrap(), Value::Int(7)));
    }

    #[test]
    fn int_float_promotes() {
        let v = Value::Int(1).add(&Value::Float(0.5)).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 1.5));
    }

    #[test]
    fn string_concat() {
        let v = Value::str("a").add(&Value::str("b")).unwrap();
        assert!(matches!(v, Value::Str(s) if *s == "ab"));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(Value::Int(1).div(&Value::Int(0)).unwrap_err(), EvalError::DivisionByZero);
        assert_eq!(
            Value::Float(1.0).div(&Value::Float(0.0)).unwrap_err(),
            EvalError::DivisionByZero
        );
    }

    #[test]
    fn nan_never_equal() {
        let nan = Value::Float(f64::NAN);
        assert!(!nan.value_eq(&nan));
    }

    #[test]
    fn list_equality_is_structural() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert!(a.value_eq(&b));
    }
}

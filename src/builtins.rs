//! Dispatch table for the built-in table/list functions. `load_csv`/
//! `csv_header` live in [`crate::csv_loader`]; `pre`/`fold` are AST
//! forms handled directly by the engine, not builtins, since they bind
//! a lambda rather than evaluating one over a list of plain values.

use crate::csv_loader;
use crate::error::EvalError;
use crate::value::{Table, Value};

/// The set of names the analyzer and parser recognise as builtin call
/// targets, used to validate `filter`/`count_if`'s lambda-arity
/// special-casing during parsing as well as dispatch here.
pub const BUILTIN_NAMES: &[&str] = &[
    "load_csv", "csv_header", "col", "row", "len", "sum", "avg", "min", "max", "count_if", "filter",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// The number of arguments a builtin call expects, or `None` if `name`
/// isn't a builtin at all. Used by the analyzer to reject malformed
/// calls before a program is ever evaluated.
pub fn arity(name: &str) -> Option<usize> {
    match name {
        "load_csv" => Some(2),
        "csv_header" => Some(1),
        "col" => Some(2),
        "row" => Some(2),
        "len" => Some(1),
        "sum" | "avg" | "max" | "min" => Some(1),
        "filter" => Some(2),
        "count_if" => Some(2),
        _ => None,
    }
}

/// Dispatches a non-lambda builtin call. `filter`/`count_if` are
/// handled separately by the engine since their second argument is a
/// lambda evaluated per row, not a plain [`Value`].
pub fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "load_csv" => {
            let path = expect_str(args, 0, "load_csv")?;
            let has_header = expect_bool(args, 1, "load_csv")?;
            csv_loader::load_csv(&path, has_header).map(Value::table)
        }
        "csv_header" => {
            let path = expect_str(args, 0, "csv_header")?;
            let header = csv_loader::csv_header(&path)?;
            Ok(Value::list(header.into_iter().map(Value::str).collect()))
        }
        "col" => {
            let table = expect_table(args, 0, "col")?;
            let index = expect_index(args, 1, "col")?;
            col(&table, index)
        }
        "row" => {
            let table = expect_table(args, 0, "row")?;
            let index = expect_index(args, 1, "row")?;
            row(&table, index)
        }
        "len" => len(&args[0]),
        "sum" => reduce_numeric(args, "sum", 0.0, |acc, v| acc + v, |s, _| Value::Float(s), true),
        "avg" => {
            let list = expect_list(args, 0, "avg")?;
            if list.is_empty() {
                return Ok(Value::Float(0.0));
            }
            let mut total = 0.0;
            for v in list.iter() {
                total += numeric_operand("avg", v)?;
            }
            Ok(Value::Float(total / list.len() as f64))
        }
        "max" => extremum(args, "max", |a, b| a > b),
        "min" => extremum(args, "min", |a, b| a < b),
        other => Err(EvalError::TypeMismatch {
            message: format!(
                "`{other}` takes a lambda argument and must be evaluated by the engine, not dispatched here"
            ),
        }),
    }
}

/// Builtins that always return `int` when all inputs are int (`sum`
/// keeps int-ness, unlike `avg` which always produces a float).
fn reduce_numeric(
    args: &[Value],
    name: &str,
    init: f64,
    fold: impl Fn(f64, f64) -> f64,
    wrap: impl Fn(f64, bool) -> Value,
    preserve_int: bool,
) -> Result<Value, EvalError> {
    let list = expect_list(args, 0, name)?;
    if list.is_empty() {
        return Ok(Value::Int(0));
    }
    let all_int = preserve_int && list.iter().all(|v| matches!(v, Value::Int(_)));
    if all_int {
        let mut total: i64 = 0;
        for v in list.iter() {
            if let Value::Int(i) = v {
                total += i;
            }
        }
        return Ok(Value::Int(total));
    }
    let mut acc = init;
    for v in list.iter() {
        acc = fold(acc, numeric_operand(name, v)?);
    }
    Ok(wrap(acc, all_int))
}

fn extremum(args: &[Value], name: &str, better: impl Fn(f64, f64) -> bool) -> Result<Value, EvalError> {
    let list = expect_list(args, 0, name)?;
    if list.is_empty() {
        return Ok(Value::Null);
    }
    let all_int = list.iter().all(|v| matches!(v, Value::Int(_)));
    let mut best = numeric_operand(name, &list[0])?;
    let mut best_idx = 0;
    for (i, v) in list.iter().enumerate().skip(1) {
        let n = numeric_operand(name, v)?;
        if better(n, best) {
            best = n;
            best_idx = i;
        }
    }
    if all_int {
        Ok(list[best_idx].clone())
    } else {
        Ok(Value::Float(best))
    }
}

pub fn col(table: &Table, index: i64) -> Result<Value, EvalError> {
    let width = table
        .header
        .as_ref()
        .map(Vec::len)
        .unwrap_or_else(|| table.rows.first().map_or(0, Vec::len));
    if index < 0 || index as usize >= width {
        return Err(EvalError::IndexOutOfRange { index, len: width });
    }
    let idx = index as usize;
    Ok(Value::list(
        table
            .rows
            .iter()
            .map(|r| r.get(idx).cloned().unwrap_or(Value::Null))
            .collect(),
    ))
}

pub fn row(table: &Table, index: i64) -> Result<Value, EvalError> {
    if index < 0 || index as usize >= table.rows.len() {
        return Err(EvalError::IndexOutOfRange {
            index,
            len: table.rows.len(),
        });
    }
    Ok(Value::list(table.rows[index as usize].clone()))
}

pub fn len(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Table(t) => Ok(Value::Int(t.rows.len() as i64)),
        Value::List(l) => Ok(Value::Int(l.len() as i64)),
        other => Err(EvalError::TypeMismatch {
            message: format!("`len` expects a table or list, found {}", other.type_name()),
        }),
    }
}

fn numeric_operand(fn_name: &str, v: &Value) -> Result<f64, EvalError> {
    v.as_f64().ok_or_else(|| EvalError::TypeMismatch {
        message: format!("`{fn_name}` expects a numeric list, found element of type {}", v.type_name()),
    })
}

fn expect_list(args: &[Value], i: usize, fn_name: &str) -> Result<std::rc::Rc<Vec<Value>>, EvalError> {
    match &args[i] {
        Value::List(l) => Ok(l.clone()),
        other => Err(EvalError::TypeMismatch {
            message: format!("`{fn_name}` expects a list argument, found {}", other.type_name()),
        }),
    }
}

fn expect_table(args: &[Value], i: usize, fn_name: &str) -> Result<std::rc::Rc<Table>, EvalError> {
    match &args[i] {
        Value::Table(t) => Ok(t.clone()),
        other => Err(EvalError::TypeMismatch {
            message: format!("`{fn_name}` expects a table argument, found {}", other.type_name()),
        }),
    }
}

fn expect_str(args: &[Value], i: usize, fn_name: &str) -> Result<String, EvalError> {
    match &args[i] {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(EvalError::TypeMismatch {
            message: format!("`{fn_name}` expects a string argument, found {}", other.type_name()),
        }),
    }
}

fn expect_bool(args: &[Value], i: usize, fn_name: &str) -> Result<bool, EvalError> {
    args[i].as_bool().ok_or_else(|| EvalError::TypeMismatch {
        message: format!("`{fn_name}` expects a bool argument, found {}", args[i].type_name()),
    })
}

fn expect_index(args: &[Value], i: usize, fn_name: &str) -> Result<i64, EvalError> {
    match &args[i] {
        Value::Int(n) => Ok(*n),
        other => Err(EvalError::TypeMismatch {
            message: format!("`{fn_name}` expects an int index, found {}", other.type_name()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().map(|&i| Value::Int(i)).collect())
    }

    #[test]
    fn sum_preserves_int() {
        assert!(matches!(call("sum", &[ints(&[1, 2, 3])]).unwrap(), Value::Int(6)));
    }

    #[test]
    fn sum_of_empty_is_zero() {
        assert!(matches!(call("sum", &[Value::list(vec![])]).unwrap(), Value::Int(0)));
    }

    #[test]
    fn avg_is_always_float() {
        let v = call("avg", &[ints(&[2, 4])]).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 3.0));
    }

    #[test]
    fn min_max_on_empty_is_null() {
        assert!(matches!(call("max", &[Value::list(vec![])]).unwrap(), Value::Null));
        assert!(matches!(call("min", &[Value::list(vec![])]).unwrap(), Value::Null));
    }

    #[test]
    fn col_out_of_range_errors() {
        let table = Table {
            header: None,
            rows: vec![vec![Value::Int(1)]],
        };
        let err = col(&table, 5).unwrap_err();
        assert!(matches!(err, EvalError::IndexOutOfRange { index: 5, .. }));
    }

    #[test]
    fn len_of_table_counts_rows() {
        let table = Table {
            header: None,
            rows: vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        };
        assert!(matches!(len(&Value::table(table)).unwrap(), Value::Int(2)));
    }
}

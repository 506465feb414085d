//! `load_csv`/`csv_header` builtins and the cell-coercion rules they
//! share. A Ripple table has no schema, so each cell is coerced
//! individually rather than deserialized into a fixed record type.

use crate::error::EvalError;
use crate::value::{Table, Value};
use std::fs::File;

/// Parses `path` into a [`Table`]. When `has_header` is true the first
/// record becomes the table's header and is excluded from `rows`.
pub fn load_csv(path: &str, has_header: bool) -> Result<Table, EvalError> {
    let file = File::open(path).map_err(|e| EvalError::IOError {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    let mut reader = csv::ReaderBuilder::new().has_headers(has_header).from_reader(file);

    let header = if has_header {
        Some(
            reader
                .headers()
                .map_err(|e| io_error(path, &e))?
                .iter()
                .map(str::to_string)
                .collect(),
        )
    } else {
        None
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| io_error(path, &e))?;
        rows.push(record.iter().map(coerce_cell).collect());
    }

    debug!("load_csv: {} rows from {path} (header: {has_header})", rows.len());
    Ok(Table { header, rows })
}

/// Returns the header row of `path` as a list of strings, regardless
/// of whether the caller's `load_csv` call treats it as data.
pub fn csv_header(path: &str) -> Result<Vec<String>, EvalError> {
    let file = File::open(path).map_err(|e| EvalError::IOError {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
    Ok(reader
        .headers()
        .map_err(|e| io_error(path, &e))?
        .iter()
        .map(str::to_string)
        .collect())
}

fn io_error(path: &str, e: &csv::Error) -> EvalError {
    EvalError::IOError {
        path: path.to_string(),
        message: e.to_string(),
    }
}

/// Coerces a raw CSV cell into a `Value`: int if it parses as one,
/// else float, else a case-insensitive `true`/`false` bool, else
/// `null` for an empty cell, else the raw string.
fn coerce_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Value::Float(f);
    }
    match cell.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    Value::str(cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(name: &str, contents: &str) -> String {
        let path = std::env::temp_dir().join(format!("ripple_csv_test_{name}.csv"));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn coerces_cells_by_type() {
        assert!(matches!(coerce_cell("42"), Value::Int(42)));
        assert!(matches!(coerce_cell("3.5"), Value::Float(f) if f == 3.5));
        assert!(matches!(coerce_cell("TRUE"), Value::Bool(true)));
        assert!(matches!(coerce_cell(""), Value::Null));
        assert!(matches!(coerce_cell("hello"), Value::Str(s) if *s == "hello"));
    }

    #[test]
    fn loads_table_with_header() {
        let path = write_fixture("header", "name,salary\nalice,50000\nbob,60000\n");
        let table = load_csv(&path, true).unwrap();
        assert_eq!(table.header, Some(vec!["name".into(), "salary".into()]));
        assert_eq!(table.rows.len(), 2);
        assert!(matches!(&table.rows[0][1], Value::Int(50000)));
    }

    #[test]
    fn loads_table_without_header() {
        let path = write_fixture("noheader", "1,2\n3,4\n");
        let table = load_csv(&path, false).unwrap();
        assert_eq!(table.header, None);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn csv_header_reads_first_row() {
        let path = write_fixture("headeronly", "a,b,c\n1,2,3\n");
        assert_eq!(csv_header(&path).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_csv("/nonexistent/path/does-not-exist.csv", true).unwrap_err();
        assert!(matches!(err, EvalError::IOError { .. }));
    }
}

//! CSV serialization of typed records.
//!
//! The header row is taken from the field names of the first record, in
//! declaration order. Fields containing a comma, a double quote, CR or LF are
//! wrapped in double quotes with embedded quotes doubled. Null fields become
//! empty cells; nested arrays and objects are written as compact JSON.

use serde::Serialize;
use serde_json::{Map, Value};

/// Serialize records to CSV text. An empty slice produces an empty string.
pub fn to_csv<T: Serialize>(records: &[T]) -> crate::Result<String> {
    let rows = records
        .iter()
        .map(to_object)
        .collect::<crate::Result<Vec<_>>>()?;

    let Some(first) = rows.first() else {
        return Ok(String::new());
    };
    let header: Vec<&str> = first.keys().map(String::as_str).collect();

    let mut out = String::new();
    write_line(&mut out, header.iter().map(|h| escape_field(h)));
    for row in &rows {
        write_line(
            &mut out,
            header
                .iter()
                .map(|h| escape_field(&cell(row.get(*h).unwrap_or(&Value::Null)))),
        );
    }
    Ok(out)
}

/// Quote a single field if it needs quoting.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn to_object<T: Serialize>(record: &T) -> crate::Result<Map<String, Value>> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(crate::Error::Serialization(format!(
            "csv records must serialize to objects, got {other}"
        ))),
        Err(e) => Err(crate::Error::Serialization(e.to_string())),
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn write_line(out: &mut String, fields: impl Iterator<Item = String>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&field);
    }
    out.push('\n');
}

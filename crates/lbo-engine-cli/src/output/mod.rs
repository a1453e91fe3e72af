pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Render a scalar JSON value for a table cell or CSV field.
pub fn format_scalar(value: &Value, null: &str) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => null.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Rows of a sensitivity grid result: `(a_value, b_value, cell)`.
pub fn grid_rows(result: &serde_json::Map<String, Value>) -> Option<(String, String, Vec<[String; 3]>)> {
    let axis_a = result.get("axis_a")?.as_object()?;
    let axis_b = result.get("axis_b")?.as_object()?;
    let a_values = axis_a.get("values")?.as_array()?;
    let b_values = axis_b.get("values")?.as_array()?;
    let cells = result.get("cells")?.as_array()?;

    let mut rows = Vec::with_capacity(a_values.len() * b_values.len());
    for (a, row) in a_values.iter().zip(cells) {
        let row = row.as_array()?;
        for (b, cell) in b_values.iter().zip(row) {
            rows.push([format_scalar(a, ""), format_scalar(b, ""), format_scalar(cell, "")]);
        }
    }
    Some((
        format_scalar(axis_a.get("name")?, ""),
        format_scalar(axis_b.get("name")?, ""),
        rows,
    ))
}

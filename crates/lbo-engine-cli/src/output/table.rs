use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::format_scalar;

/// Format output as tables using the tabled crate.
///
/// Scalar fields of the result go in a Field/Value table; each array of
/// records (debt schedule, tornado bars, scenario rows) gets its own table.
/// A two-way grid is drawn as a matrix.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else {
                print_object(map);
            }
        }
        Value::Array(arr) => print_records(arr),
        _ => println!("{}", value),
    }
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    match result {
        Value::Object(res_map) => {
            if let Some(matrix) = grid_matrix(res_map) {
                println!("{}", matrix);
            }
            print_object(res_map);
        }
        other => println!("{}", format_value(other)),
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut nested: Vec<(&str, &Vec<Value>)> = Vec::new();
    for (key, val) in map {
        match val {
            Value::Array(arr) if is_record_array(arr) => nested.push((key.as_str(), arr)),
            Value::Array(arr) if arr.iter().all(Value::is_array) && !arr.is_empty() => {}
            _ => builder.push_record([key.as_str(), &format_value(val)]),
        }
    }
    println!("{}", Table::from(builder));

    for (key, arr) in nested {
        println!("\n{}:", key);
        print_records(arr);
    }
}

fn is_record_array(arr: &[Value]) -> bool {
    !arr.is_empty() && arr.iter().all(Value::is_object)
}

fn print_records(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

/// Sensitivity grid as a matrix: rows are axis A, columns axis B.
fn grid_matrix(result: &Map<String, Value>) -> Option<Table> {
    let (a_name, b_name, rows) = super::grid_rows(result)?;
    let b_values: Vec<String> = result
        .get("axis_b")?
        .get("values")?
        .as_array()?
        .iter()
        .map(format_value)
        .collect();
    if b_values.is_empty() {
        return None;
    }

    let mut builder = Builder::default();
    let mut header = vec![format!("{a_name} \\ {b_name}")];
    header.extend(b_values.iter().cloned());
    builder.push_record(header);

    for chunk in rows.chunks(b_values.len()) {
        let mut record = vec![chunk[0][0].clone()];
        record.extend(chunk.iter().map(|cell| {
            if cell[2].is_empty() {
                "n/a".to_string()
            } else {
                cell[2].clone()
            }
        }));
        builder.push_record(record);
    }
    Some(Table::from(builder))
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        other => format_scalar(other, "null"),
    }
}

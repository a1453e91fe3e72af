use serde_json::Value;
use std::io;

use super::{format_scalar, grid_rows};

/// Record arrays written as CSV rows, in the order they are looked for.
const RECORD_KEYS: [&str; 4] = ["schedule", "bars", "results", "tiers"];

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    let _ = write_csv(&mut wtr, value);
    let _ = wtr.flush();
}

fn write_csv<W: io::Write>(wtr: &mut csv::Writer<W>, value: &Value) -> csv::Result<()> {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result {
        Value::Object(map) => {
            if let Some((a_name, b_name, rows)) = grid_rows(map) {
                wtr.write_record([a_name.as_str(), b_name.as_str(), "value"])?;
                for row in rows {
                    wtr.write_record(&row)?;
                }
                return Ok(());
            }
            if let Some(records) = RECORD_KEYS
                .iter()
                .filter_map(|k| map.get(*k).and_then(Value::as_array))
                .find(|arr| !arr.is_empty())
            {
                return write_array_csv(wtr, records);
            }
            wtr.write_record(["field", "value"])?;
            for (key, val) in map {
                wtr.write_record([key.as_str(), &format_scalar(val, "")])?;
            }
            Ok(())
        }
        Value::Array(arr) => write_array_csv(wtr, arr),
        other => wtr.write_record([&format_scalar(other, "")]),
    }
}

fn write_array_csv<W: io::Write>(wtr: &mut csv::Writer<W>, arr: &[Value]) -> csv::Result<()> {
    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        wtr.write_record(&headers)?;

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(|v| format_scalar(v, "")).unwrap_or_default())
                    .collect();
                wtr.write_record(&row)?;
            }
        }
    } else {
        for item in arr {
            wtr.write_record([&format_scalar(item, "")])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(value: &Value) -> String {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        write_csv(&mut wtr, value).unwrap();
        wtr.flush().unwrap();
        String::from_utf8(wtr.get_ref().clone()).unwrap()
    }

    #[test]
    fn test_grid_as_long_form() {
        let value = json!({
            "result": {
                "axis_a": { "name": "exit_multiple", "values": ["8"] },
                "axis_b": { "name": "senior_leverage", "values": ["3", "4"] },
                "cells": [["0.1", null]],
            }
        });
        assert_eq!(
            render(&value),
            "exit_multiple,senior_leverage,value\n8,3,0.1\n8,4,\n"
        );
    }

    #[test]
    fn test_schedule_rows() {
        let value = json!({
            "result": {
                "ending_debt": "100",
                "schedule": [
                    { "period": 1, "total_debt": "150" },
                    { "period": 2, "total_debt": "100" },
                ],
            }
        });
        assert_eq!(render(&value), "period,total_debt\n1,150\n2,100\n");
    }

    #[test]
    fn test_flat_result() {
        let value = json!({ "result": { "irr": "0.2", "moic": "2.5" } });
        assert_eq!(render(&value), "field,value\nirr,0.2\nmoic,2.5\n");
    }
}

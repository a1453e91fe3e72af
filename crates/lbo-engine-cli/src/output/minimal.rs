use serde_json::Value;

use super::format_scalar;

/// Headline figures in priority order, as JSON pointers into the result.
const PRIORITY_POINTERS: [&str; 12] = [
    "/returns/irr",
    "/irr",
    "/moic",
    "/probability_weighted_value",
    "/base_case_value",
    "/base_value",
    "/mean",
    "/equity_contribution",
    "/total_lp",
    "/ending_debt",
    "/exit_equity_value",
    "/total_sources",
];

/// Print just the headline answer from the output.
pub fn print_minimal(value: &Value) {
    println!("{}", minimal_answer(value));
}

fn minimal_answer(value: &Value) -> String {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    for pointer in PRIORITY_POINTERS {
        if let Some(val) = result_obj.pointer(pointer) {
            if !val.is_null() {
                return format_scalar(val, "null");
            }
        }
    }

    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}", key, format_scalar(val, "null"));
        }
    }

    format_scalar(result_obj, "null")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pipeline_reports_irr() {
        let value = json!({
            "result": { "sizing": {}, "returns": { "irr": "0.21", "moic": "2.6" } },
            "warnings": [],
        });
        assert_eq!(minimal_answer(&value), "0.21");
    }

    #[test]
    fn test_null_skipped() {
        let value = json!({
            "result": { "probability_weighted_value": null, "base_case_value": "0.18" },
        });
        assert_eq!(minimal_answer(&value), "0.18");
    }

    #[test]
    fn test_falls_back_to_first_field() {
        let value = json!({ "result": { "hurdle": "12" } });
        assert_eq!(minimal_answer(&value), "hurdle: 12");
    }
}

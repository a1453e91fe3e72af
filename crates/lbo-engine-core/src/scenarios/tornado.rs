use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;

use crate::error::LboError;
use crate::scenarios::variables::VariableMap;
use crate::types::*;
use crate::LboResult;

/// Low and high values to test for one variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoRange {
    pub name: String,
    pub low: Decimal,
    pub high: Decimal,
}

/// Metric response to one variable moving between its low and high value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoBar {
    pub variable: String,
    pub low_input: Decimal,
    pub high_input: Decimal,
    pub low_value: Option<Decimal>,
    pub high_value: Option<Decimal>,
    /// |high_value - low_value|; `None` if either side failed
    pub swing: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoOutput {
    pub base_value: Decimal,
    /// Sorted by swing, largest first; failed bars last
    pub bars: Vec<TornadoBar>,
}

/// One-at-a-time sensitivity: each variable moves to its low and high value
/// while everything else stays at the base map.
///
/// The base case must evaluate; a failing low or high side only blanks that
/// bar.
pub fn evaluate_tornado<F>(
    metric_fn: F,
    base_vars: &VariableMap,
    ranges: &[TornadoRange],
) -> LboResult<ComputationOutput<TornadoOutput>>
where
    F: Fn(&VariableMap) -> LboResult<Decimal>,
{
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if ranges.is_empty() {
        return Err(LboError::InsufficientData(
            "Tornado analysis needs at least one variable range".into(),
        ));
    }
    for r in ranges {
        if r.low > r.high {
            return Err(LboError::invalid(
                format!("variable:{}", r.name),
                "Low value must not exceed high value",
            ));
        }
    }

    let base_value = metric_fn(base_vars)?;

    let mut evaluate = |name: &str, value: Decimal| -> Option<Decimal> {
        let mut vars = base_vars.clone();
        vars.insert(name.to_string(), value);
        match metric_fn(&vars) {
            Ok(v) => Some(v),
            Err(e) => {
                warnings.push(format!("{name} = {value}: {e}"));
                None
            }
        }
    };

    let mut bars: Vec<TornadoBar> = ranges
        .iter()
        .map(|r| {
            let low_value = evaluate(&r.name, r.low);
            let high_value = evaluate(&r.name, r.high);
            let swing = match (low_value, high_value) {
                (Some(lo), Some(hi)) => Some((hi - lo).abs()),
                _ => None,
            };
            TornadoBar {
                variable: r.name.clone(),
                low_input: r.low,
                high_input: r.high,
                low_value,
                high_value,
                swing,
            }
        })
        .collect();

    bars.sort_by(|a, b| match (a.swing, b.swing) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let output = TornadoOutput { base_value, bars };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Tornado Sensitivity (one variable at a time)",
        &serde_json::json!({
            "variables": ranges.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "base_value": base_value.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::LboError;
use crate::scenarios::variables::VariableMap;
use crate::types::*;
use crate::LboResult;

/// A named set of overrides with its probability weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedScenario {
    pub name: String,
    pub probability: Rate,
    #[serde(default)]
    pub overrides: VariableMap,
}

/// Result for a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub probability: Rate,
    pub output_value: Option<Decimal>,
    pub deviation_from_base: Option<Decimal>,
    pub deviation_pct: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of scenario analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutput {
    pub base_case_value: Decimal,
    pub results: Vec<ScenarioResult>,
    /// `None` when any scenario failed to evaluate
    pub probability_weighted_value: Option<Decimal>,
}

/// Evaluate bear/base/bull style scenarios through the metric function.
///
/// Probabilities must sum to 1 within 0.001. Each scenario's overrides are
/// layered on the base map; a failing scenario is reported in its row and
/// suppresses the probability-weighted value.
pub fn evaluate_scenarios<F>(
    metric_fn: F,
    base_vars: &VariableMap,
    scenarios: &[NamedScenario],
) -> LboResult<ComputationOutput<ScenarioOutput>>
where
    F: Fn(&VariableMap) -> LboResult<Decimal>,
{
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if scenarios.is_empty() {
        return Err(LboError::InsufficientData(
            "At least one scenario required".into(),
        ));
    }
    for s in scenarios {
        if s.probability < Decimal::ZERO || s.probability > Decimal::ONE {
            return Err(LboError::invalid(
                format!("scenario:{} probability", s.name),
                "Probability must be between 0 and 1",
            ));
        }
    }
    let total_prob: Decimal = scenarios.iter().map(|s| s.probability).sum();
    let prob_tolerance = dec!(0.001);
    if (total_prob - Decimal::ONE).abs() > prob_tolerance {
        return Err(LboError::invalid(
            "probabilities",
            format!("Probabilities must sum to 1.0 (got {total_prob})"),
        ));
    }
    if total_prob != Decimal::ONE {
        warnings.push(format!(
            "Probabilities sum to {total_prob}; treated as approximately 1.0"
        ));
    }

    let base_case_value = metric_fn(base_vars)?;

    let mut results = Vec::with_capacity(scenarios.len());
    let mut weighted = Some(Decimal::ZERO);

    for scenario in scenarios {
        let mut vars = base_vars.clone();
        vars.extend(scenario.overrides.iter().map(|(k, v)| (k.clone(), *v)));

        let result = match metric_fn(&vars) {
            Ok(value) => {
                let deviation = value - base_case_value;
                let deviation_pct = if base_case_value.is_zero() {
                    if !deviation.is_zero() {
                        warnings.push(format!(
                            "Base case is zero; cannot compute deviation_pct for scenario '{}'",
                            scenario.name
                        ));
                    }
                    None
                } else {
                    Some(deviation / base_case_value)
                };
                weighted = weighted.map(|w| w + scenario.probability * value);
                ScenarioResult {
                    name: scenario.name.clone(),
                    probability: scenario.probability,
                    output_value: Some(value),
                    deviation_from_base: Some(deviation),
                    deviation_pct,
                    error: None,
                }
            }
            Err(e) => {
                warnings.push(format!("Scenario '{}' failed: {e}", scenario.name));
                weighted = None;
                ScenarioResult {
                    name: scenario.name.clone(),
                    probability: scenario.probability,
                    output_value: None,
                    deviation_from_base: None,
                    deviation_pct: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    let output = ScenarioOutput {
        base_case_value,
        results,
        probability_weighted_value: weighted,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Bear/Base/Bull Scenario Analysis",
        &serde_json::json!({
            "num_scenarios": scenarios.len(),
            "base_case_value": base_case_value.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::variables::tests::reference_deal;
    use crate::scenarios::variables::{lbo_metric_fn, LboMetric};
    use rust_decimal_macros::dec;

    fn growth_metric(vars: &VariableMap) -> LboResult<Decimal> {
        let g = vars.get("growth").copied().unwrap_or_default();
        if g < dec!(-0.5) {
            return Err(LboError::invalid("growth", "too low"));
        }
        Ok(dec!(1000) * (Decimal::ONE + g))
    }

    fn scenario(name: &str, probability: Rate, growth: Decimal) -> NamedScenario {
        NamedScenario {
            name: name.into(),
            probability,
            overrides: VariableMap::from([("growth".to_string(), growth)]),
        }
    }

    #[test]
    fn test_bear_base_bull() {
        let scenarios = vec![
            scenario("Bear", dec!(0.25), dec!(-0.2)),
            scenario("Base", dec!(0.50), Decimal::ZERO),
            scenario("Bull", dec!(0.25), dec!(0.2)),
        ];
        let out = evaluate_scenarios(growth_metric, &VariableMap::new(), &scenarios)
            .unwrap()
            .result;
        assert_eq!(out.base_case_value, dec!(1000));
        assert_eq!(out.probability_weighted_value, Some(dec!(1000)));
        assert_eq!(out.results[0].deviation_from_base, Some(dec!(-200)));
        assert_eq!(out.results[0].deviation_pct, Some(dec!(-0.2)));
        assert_eq!(out.results[2].output_value, Some(dec!(1200)));
    }

    #[test]
    fn test_probabilities_must_sum_to_one() {
        let scenarios = vec![
            scenario("A", dec!(0.30), Decimal::ZERO),
            scenario("B", dec!(0.30), Decimal::ZERO),
        ];
        assert!(evaluate_scenarios(growth_metric, &VariableMap::new(), &scenarios).is_err());
    }

    #[test]
    fn test_near_one_warns() {
        let scenarios = vec![
            scenario("A", dec!(0.5005), Decimal::ZERO),
            scenario("B", dec!(0.5), Decimal::ZERO),
        ];
        let result = evaluate_scenarios(growth_metric, &VariableMap::new(), &scenarios).unwrap();
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_failed_scenario_isolated() {
        let scenarios = vec![
            scenario("Crash", dec!(0.5), dec!(-0.9)),
            scenario("Base", dec!(0.5), Decimal::ZERO),
        ];
        let out = evaluate_scenarios(growth_metric, &VariableMap::new(), &scenarios)
            .unwrap()
            .result;
        assert!(out.results[0].error.is_some());
        assert_eq!(out.results[1].output_value, Some(dec!(1000)));
        assert_eq!(out.probability_weighted_value, None);
    }

    #[test]
    fn test_empty_scenarios_rejected() {
        assert!(matches!(
            evaluate_scenarios(growth_metric, &VariableMap::new(), &[]),
            Err(LboError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_lbo_scenarios_ordered() {
        let deal = reference_deal();
        let metric = lbo_metric_fn(&deal, LboMetric::Irr);
        let scenarios = vec![
            NamedScenario {
                name: "Bear".into(),
                probability: dec!(0.25),
                overrides: VariableMap::from([
                    ("exit_multiple".to_string(), dec!(8)),
                    ("revenue_growth".to_string(), dec!(0.01)),
                ]),
            },
            NamedScenario {
                name: "Base".into(),
                probability: dec!(0.5),
                overrides: VariableMap::new(),
            },
            NamedScenario {
                name: "Bull".into(),
                probability: dec!(0.25),
                overrides: VariableMap::from([("exit_multiple".to_string(), dec!(12))]),
            },
        ];
        let out = evaluate_scenarios(&metric, &VariableMap::new(), &scenarios)
            .unwrap()
            .result;
        let irr: Vec<Decimal> = out.results.iter().map(|r| r.output_value.unwrap()).collect();
        assert!(irr[0] < irr[1] && irr[1] < irr[2]);
        assert_eq!(out.results[1].deviation_from_base, Some(Decimal::ZERO));
    }
}

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::Uniform;
use std::time::Instant;

use crate::error::LboError;
use crate::scenarios::sensitivity::Execution;
use crate::scenarios::variables::VariableMap;
use crate::types::*;
use crate::LboResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A variable drawn uniformly from `[min, max)` on every path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McVariable {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

/// Monte Carlo run over the full LBO pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloInput {
    pub variables: Vec<McVariable>,
    /// Number of simulation paths (minimum 100).
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    /// Optional seed for reproducibility.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Report the probability that the metric falls below this value
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub execution: Execution,
}

fn default_num_simulations() -> u32 {
    1_000
}

/// Percentile summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// A single histogram bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

/// Distribution of the metric across successful paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub num_simulations: u32,
    pub valid: u32,
    pub failed: u32,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: McPercentiles,
    /// Share of valid paths strictly below the threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability_below_threshold: Option<f64>,
    pub histogram: Vec<HistogramBin>,
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Compute the percentile value from a **sorted** slice using linear interpolation.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Build a histogram with `num_bins` equal-width bins over a sorted slice.
fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];
    let n = sorted.len() as f64;

    if (max_val - min_val).abs() < f64::EPSILON {
        return vec![HistogramBin {
            lower: min_val,
            upper: max_val,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let mut counts = vec![0u32; num_bins];
    for &val in sorted {
        let idx = (((val - min_val) / bin_width).floor() as usize).min(num_bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min_val + i as f64 * bin_width,
            upper: if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            },
            count,
            frequency: count as f64 / n,
        })
        .collect()
}

fn summarise(
    mut values: Vec<f64>,
    num_simulations: u32,
    failed: u32,
    threshold: Option<f64>,
) -> MonteCarloSummary {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len() as f64;

    let mean = values.iter().sum::<f64>() / n;
    let median = if values.len() % 2 == 0 {
        let mid = values.len() / 2;
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[values.len() / 2]
    };
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    let percentiles = McPercentiles {
        p5: percentile_sorted(&values, 5.0),
        p10: percentile_sorted(&values, 10.0),
        p25: percentile_sorted(&values, 25.0),
        p50: percentile_sorted(&values, 50.0),
        p75: percentile_sorted(&values, 75.0),
        p90: percentile_sorted(&values, 90.0),
        p95: percentile_sorted(&values, 95.0),
    };
    let probability_below_threshold =
        threshold.map(|t| values.iter().filter(|v| **v < t).count() as f64 / n);

    MonteCarloSummary {
        num_simulations,
        valid: values.len() as u32,
        failed,
        mean,
        median,
        std_dev: variance.sqrt(),
        min: values[0],
        max: values[values.len() - 1],
        percentiles,
        probability_below_threshold,
        histogram: build_histogram(&values, 20),
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Draw every path's variable map up front from one RNG, variables in input
/// order within each path.
fn draw_paths(input: &MonteCarloInput, base_vars: &VariableMap) -> LboResult<Vec<VariableMap>> {
    let distributions = input
        .variables
        .iter()
        .map(|v| {
            Uniform::new(v.min, v.max).map_err(|e| {
                LboError::invalid(
                    format!("variable:{}", v.name),
                    format!("Invalid uniform range: {e}"),
                )
            })
        })
        .collect::<LboResult<Vec<_>>>()?;

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let mut paths = Vec::with_capacity(input.num_simulations as usize);
    for _ in 0..input.num_simulations {
        let mut vars = base_vars.clone();
        for (var, dist) in input.variables.iter().zip(&distributions) {
            let draw: f64 = rng.sample(dist);
            let value = Decimal::from_f64(draw).ok_or_else(|| LboError::DegenerateInput {
                context: format!("sample {draw} for {} is not representable", var.name),
            })?;
            vars.insert(var.name.clone(), value);
        }
        paths.push(vars);
    }
    Ok(paths)
}

/// Run the metric function over `num_simulations` sampled paths.
///
/// Sampling happens sequentially before any evaluation, so a given seed
/// gives identical output in sequential and parallel mode. Failed paths are
/// counted and excluded from the statistics.
pub fn run_monte_carlo<F>(
    metric_fn: F,
    base_vars: &VariableMap,
    input: &MonteCarloInput,
) -> LboResult<ComputationOutput<MonteCarloSummary>>
where
    F: Fn(&VariableMap) -> LboResult<Decimal> + Sync,
{
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // Validation
    if input.num_simulations < 100 {
        return Err(LboError::invalid("num_simulations", "Must be at least 100"));
    }
    if input.variables.is_empty() {
        return Err(LboError::InsufficientData(
            "At least one variable is required".into(),
        ));
    }
    for v in &input.variables {
        if !v.min.is_finite() || !v.max.is_finite() || v.min >= v.max {
            return Err(LboError::invalid(
                format!("variable:{}", v.name),
                "Range must be finite with min < max",
            ));
        }
    }

    let paths = draw_paths(input, base_vars)?;

    let evaluate = |vars: &VariableMap| -> LboResult<f64> {
        let value = metric_fn(vars)?;
        value.to_f64().ok_or_else(|| LboError::DegenerateInput {
            context: format!("metric value {value} does not fit in f64"),
        })
    };
    let results: Vec<LboResult<f64>> = match input.execution {
        Execution::Parallel => paths.par_iter().map(evaluate).collect(),
        Execution::Sequential => paths.iter().map(evaluate).collect(),
    };

    let mut values = Vec::with_capacity(results.len());
    let mut failed = 0u32;
    let mut first_failure: Option<String> = None;
    for result in results {
        match result {
            Ok(v) => values.push(v),
            Err(e) => {
                failed += 1;
                first_failure.get_or_insert_with(|| e.to_string());
            }
        }
    }

    if values.is_empty() {
        return Err(LboError::InsufficientData(format!(
            "All {} simulation paths failed: {}",
            input.num_simulations,
            first_failure.unwrap_or_default()
        )));
    }
    if failed > 0 {
        warnings.push(format!(
            "{failed} of {} paths failed and were excluded (first: {})",
            input.num_simulations,
            first_failure.unwrap_or_default()
        ));
    }

    let output = summarise(values, input.num_simulations, failed, input.threshold);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_precision(
        "Monte Carlo Simulation (uniform inputs, full pipeline per path)",
        &serde_json::json!({
            "num_simulations": input.num_simulations,
            "seed": input.seed,
            "variables": input.variables.iter().map(|v| &v.name).collect::<Vec<_>>(),
            "execution": input.execution,
        }),
        warnings,
        elapsed,
        "ieee754_f64",
        output,
    ))
}

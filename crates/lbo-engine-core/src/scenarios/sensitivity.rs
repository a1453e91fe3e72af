use rayon::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::LboError;
use crate::scenarios::variables::VariableMap;
use crate::types::*;
use crate::LboResult;

/// Largest number of points a stepped range may expand to.
pub const MAX_SWEEP_POINTS: usize = 10_000;

/// How grid cells are evaluated. Both modes produce identical results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    #[default]
    Sequential,
    Parallel,
}

/// A named variable and the ordered values it takes along one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityAxis {
    pub name: String,
    pub values: Vec<Decimal>,
}

/// Axis definition as supplied by callers: explicit values or a stepped range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisSpec {
    Values { name: String, values: Vec<Decimal> },
    Range(SensitivityVariable),
}

impl AxisSpec {
    pub fn resolve(&self) -> LboResult<SensitivityAxis> {
        match self {
            AxisSpec::Values { name, values } => SensitivityAxis::from_values(name, values.clone()),
            AxisSpec::Range(var) => SensitivityAxis::from_range(var),
        }
    }
}

impl SensitivityAxis {
    pub fn from_values(name: impl Into<String>, values: Vec<Decimal>) -> LboResult<Self> {
        let name = name.into();
        if values.is_empty() {
            return Err(LboError::invalid(
                format!("variable:{name}"),
                "Axis needs at least one value",
            ));
        }
        Ok(Self { name, values })
    }

    pub fn from_range(var: &SensitivityVariable) -> LboResult<Self> {
        Ok(Self {
            name: var.name.clone(),
            values: generate_sweep_values(var)?,
        })
    }

    fn midpoint(&self) -> Decimal {
        match (self.values.first(), self.values.last()) {
            (Some(first), Some(last)) => (*first + *last) / dec!(2),
            _ => Decimal::ZERO,
        }
    }
}

/// A cell whose evaluation failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellError {
    pub row: usize,
    pub col: usize,
    pub reason: String,
}

/// Two-way sensitivity result. `cells[i][j]` is the metric with
/// `axis_a.values[i]` and `axis_b.values[j]`; `None` marks a failed cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityGrid {
    pub axis_a: SensitivityAxis,
    pub axis_b: SensitivityAxis,
    pub cells: Vec<Vec<Option<Decimal>>>,
    pub cell_errors: Vec<CellError>,
    /// Cell closest to the base-case values (row, col)
    pub base_case_position: (usize, usize),
    pub base_case_value: Option<Decimal>,
}

/// A point of a one-way sweep whose evaluation failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointError {
    pub index: usize,
    pub reason: String,
}

/// One-way sensitivity result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivitySweep {
    pub axis: SensitivityAxis,
    pub values: Vec<Option<Decimal>>,
    pub point_errors: Vec<PointError>,
    pub base_case_index: usize,
    pub base_case_value: Option<Decimal>,
}

/// Generate the sweep values for a sensitivity variable from min to max with step.
pub fn generate_sweep_values(var: &SensitivityVariable) -> LboResult<Vec<Decimal>> {
    if var.step <= Decimal::ZERO {
        return Err(LboError::invalid(
            format!("variable:{}", var.name),
            "Step must be positive",
        ));
    }
    if var.min > var.max {
        return Err(LboError::invalid(
            format!("variable:{}", var.name),
            "Min must be <= max",
        ));
    }

    let too_many = var
        .max
        .checked_sub(var.min)
        .and_then(|span| span.checked_div(var.step))
        .map_or(true, |steps| steps.ceil() >= Decimal::from(MAX_SWEEP_POINTS));
    if too_many {
        return Err(LboError::invalid(
            format!("variable:{}", var.name),
            format!(
                "Step {} over [{}, {}] yields more than {MAX_SWEEP_POINTS} points",
                var.step, var.min, var.max
            ),
        ));
    }

    let mut values = Vec::new();
    let mut current = var.min;
    while current <= var.max {
        values.push(current);
        match current.checked_add(var.step) {
            Some(next) => current = next,
            None => break,
        }
    }
    // Step may overshoot max
    if values.last().is_some_and(|last| *last < var.max) {
        values.push(var.max);
    }
    Ok(values)
}

fn closest_index(values: &[Decimal], target: Decimal) -> usize {
    values
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| (**v - target).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Base position on an axis: the base map's value if it names the axis
/// variable, the midpoint of the axis otherwise.
fn base_index(axis: &SensitivityAxis, base_vars: &VariableMap) -> usize {
    let target = base_vars
        .get(&axis.name)
        .copied()
        .unwrap_or_else(|| axis.midpoint());
    closest_index(&axis.values, target)
}

fn run_points<P, F>(points: &[P], execution: Execution, eval: F) -> Vec<LboResult<Decimal>>
where
    P: Sync,
    F: Fn(&P) -> LboResult<Decimal> + Sync,
{
    match execution {
        Execution::Parallel => points.par_iter().map(&eval).collect(),
        Execution::Sequential => points.iter().map(&eval).collect(),
    }
}

/// Evaluate a two-way grid by substituting each pair of axis values into a
/// fresh clone of `base_vars`.
///
/// A failing cell becomes `None` with its reason in `cell_errors`; it never
/// aborts the grid. Parallel execution preserves cell order.
pub fn evaluate_grid<F>(
    metric_fn: F,
    base_vars: &VariableMap,
    axis_a: &SensitivityAxis,
    axis_b: &SensitivityAxis,
    execution: Execution,
) -> LboResult<ComputationOutput<SensitivityGrid>>
where
    F: Fn(&VariableMap) -> LboResult<Decimal> + Sync,
{
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if axis_a.values.is_empty() || axis_b.values.is_empty() {
        return Err(LboError::invalid("axis", "Both axes need at least one value"));
    }
    if axis_a.name == axis_b.name {
        return Err(LboError::invalid(
            format!("variable:{}", axis_b.name),
            "Grid axes must name different variables",
        ));
    }

    let cols = axis_b.values.len();
    let positions: Vec<(usize, usize)> = (0..axis_a.values.len())
        .flat_map(|i| (0..cols).map(move |j| (i, j)))
        .collect();

    let results = run_points(&positions, execution, |&(i, j)| {
        let mut vars = base_vars.clone();
        vars.insert(axis_a.name.clone(), axis_a.values[i]);
        vars.insert(axis_b.name.clone(), axis_b.values[j]);
        metric_fn(&vars)
    });

    let mut cells = vec![vec![None; cols]; axis_a.values.len()];
    let mut cell_errors = Vec::new();
    for (&(i, j), result) in positions.iter().zip(results) {
        match result {
            Ok(value) => cells[i][j] = Some(value),
            Err(e) => cell_errors.push(CellError {
                row: i,
                col: j,
                reason: e.to_string(),
            }),
        }
    }
    for err in &cell_errors {
        warnings.push(format!(
            "Evaluation failed at ({}, {}): {}",
            axis_a.values[err.row], axis_b.values[err.col], err.reason
        ));
    }

    let base_row = base_index(axis_a, base_vars);
    let base_col = base_index(axis_b, base_vars);
    let base_case_value = cells[base_row][base_col];

    let output = SensitivityGrid {
        axis_a: axis_a.clone(),
        axis_b: axis_b.clone(),
        cells,
        cell_errors,
        base_case_position: (base_row, base_col),
        base_case_value,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "2-Way Sensitivity Grid (full pipeline per cell)",
        &serde_json::json!({
            "axis_a": axis_a.name,
            "axis_b": axis_b.name,
            "cells": positions.len(),
            "execution": execution,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Evaluate a one-way sweep of a single variable.
pub fn evaluate_sweep<F>(
    metric_fn: F,
    base_vars: &VariableMap,
    axis: &SensitivityAxis,
    execution: Execution,
) -> LboResult<ComputationOutput<SensitivitySweep>>
where
    F: Fn(&VariableMap) -> LboResult<Decimal> + Sync,
{
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if axis.values.is_empty() {
        return Err(LboError::invalid(
            format!("variable:{}", axis.name),
            "Axis needs at least one value",
        ));
    }

    let results = run_points(&axis.values, execution, |value| {
        let mut vars = base_vars.clone();
        vars.insert(axis.name.clone(), *value);
        metric_fn(&vars)
    });

    let mut values = Vec::with_capacity(results.len());
    let mut point_errors = Vec::new();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(v) => values.push(Some(v)),
            Err(e) => {
                warnings.push(format!("Evaluation failed at {}: {e}", axis.values[index]));
                point_errors.push(PointError {
                    index,
                    reason: e.to_string(),
                });
                values.push(None);
            }
        }
    }

    let base_case_index = base_index(axis, base_vars);
    let base_case_value = values[base_case_index];

    let output = SensitivitySweep {
        axis: axis.clone(),
        values,
        point_errors,
        base_case_index,
        base_case_value,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "1-Way Sensitivity Sweep (full pipeline per point)",
        &serde_json::json!({
            "variable": axis.name,
            "points": axis.values.len(),
            "execution": execution,
        }),
        warnings,
        elapsed,
        output,
    ))
}

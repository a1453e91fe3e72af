use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::LboError;
use crate::pe::lbo::{run_lbo, LboInput, LboOutput};
use crate::pe::returns::ExitAssumption;
use crate::LboResult;

/// Named overrides applied on top of a base [`LboInput`].
pub type VariableMap = BTreeMap<String, Decimal>;

/// Inputs that sensitivity, tornado, Monte Carlo and scenario runs can override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LboVariable {
    EntryMultiple,
    ExitMultiple,
    TotalLeverage,
    SeniorLeverage,
    TransactionCostRate,
    /// Applied to every projection period
    RevenueGrowth,
    /// Applied to every projection period
    EbitdaMargin,
    TaxRate,
    CapexRate,
    MinimumCash,
    /// Added to every tranche's interest rate
    InterestRateShift,
    /// Replaces the sweep rate of every non-subordinated tranche
    SweepRate,
    TerminalGrowth,
    DiscountRate,
    PreferredRate,
    CarryRate,
}

impl LboVariable {
    pub const ALL: [LboVariable; 16] = [
        LboVariable::EntryMultiple,
        LboVariable::ExitMultiple,
        LboVariable::TotalLeverage,
        LboVariable::SeniorLeverage,
        LboVariable::TransactionCostRate,
        LboVariable::RevenueGrowth,
        LboVariable::EbitdaMargin,
        LboVariable::TaxRate,
        LboVariable::CapexRate,
        LboVariable::MinimumCash,
        LboVariable::InterestRateShift,
        LboVariable::SweepRate,
        LboVariable::TerminalGrowth,
        LboVariable::DiscountRate,
        LboVariable::PreferredRate,
        LboVariable::CarryRate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LboVariable::EntryMultiple => "entry_multiple",
            LboVariable::ExitMultiple => "exit_multiple",
            LboVariable::TotalLeverage => "total_leverage",
            LboVariable::SeniorLeverage => "senior_leverage",
            LboVariable::TransactionCostRate => "transaction_cost_rate",
            LboVariable::RevenueGrowth => "revenue_growth",
            LboVariable::EbitdaMargin => "ebitda_margin",
            LboVariable::TaxRate => "tax_rate",
            LboVariable::CapexRate => "capex_rate",
            LboVariable::MinimumCash => "minimum_cash",
            LboVariable::InterestRateShift => "interest_rate_shift",
            LboVariable::SweepRate => "sweep_rate",
            LboVariable::TerminalGrowth => "terminal_growth",
            LboVariable::DiscountRate => "discount_rate",
            LboVariable::PreferredRate => "preferred_rate",
            LboVariable::CarryRate => "carry_rate",
        }
    }

    /// Value of this variable in an unmodified input, where one exists.
    ///
    /// Per-period variables report period 1; `interest_rate_shift` is zero.
    pub fn base_value(&self, input: &LboInput) -> Option<Decimal> {
        let first = input.operating.periods.first();
        match self {
            LboVariable::EntryMultiple => Some(input.transaction.entry_multiple),
            LboVariable::ExitMultiple => match &input.exit {
                ExitAssumption::Multiple { exit_multiple } => Some(*exit_multiple),
                _ => None,
            },
            LboVariable::TotalLeverage => Some(input.transaction.total_leverage),
            LboVariable::SeniorLeverage => Some(input.transaction.senior_leverage),
            LboVariable::TransactionCostRate => Some(input.transaction.transaction_cost_rate),
            LboVariable::RevenueGrowth => first.map(|a| a.revenue_growth),
            LboVariable::EbitdaMargin => first.map(|a| a.ebitda_margin),
            LboVariable::TaxRate => first.map(|a| a.tax_rate),
            LboVariable::CapexRate => first.map(|a| a.capex_rate),
            LboVariable::MinimumCash => Some(input.minimum_cash),
            LboVariable::InterestRateShift => Some(Decimal::ZERO),
            LboVariable::SweepRate => input
                .tranches
                .iter()
                .find(|t| !t.kind.is_subordinated())
                .map(|t| t.cash_sweep_rate),
            LboVariable::TerminalGrowth => match &input.exit {
                ExitAssumption::TerminalGrowth { growth_rate, .. } => Some(*growth_rate),
                _ => None,
            },
            LboVariable::DiscountRate => match &input.exit {
                ExitAssumption::TerminalGrowth { discount_rate, .. } => Some(*discount_rate),
                _ => None,
            },
            LboVariable::PreferredRate => Some(input.waterfall.preferred_rate),
            LboVariable::CarryRate => Some(input.waterfall.carry_rate),
        }
    }

    fn apply(&self, input: &mut LboInput, value: Decimal) -> LboResult<()> {
        match self {
            LboVariable::EntryMultiple => input.transaction.entry_multiple = value,
            LboVariable::TotalLeverage => input.transaction.total_leverage = value,
            LboVariable::SeniorLeverage => input.transaction.senior_leverage = value,
            LboVariable::TransactionCostRate => input.transaction.transaction_cost_rate = value,
            LboVariable::RevenueGrowth => {
                input.operating.periods.iter_mut().for_each(|a| a.revenue_growth = value)
            }
            LboVariable::EbitdaMargin => {
                input.operating.periods.iter_mut().for_each(|a| a.ebitda_margin = value)
            }
            LboVariable::TaxRate => {
                input.operating.periods.iter_mut().for_each(|a| a.tax_rate = value)
            }
            LboVariable::CapexRate => {
                input.operating.periods.iter_mut().for_each(|a| a.capex_rate = value)
            }
            LboVariable::MinimumCash => input.minimum_cash = value,
            LboVariable::InterestRateShift => input
                .tranches
                .iter_mut()
                .for_each(|t| t.interest_rate += value),
            LboVariable::SweepRate => input
                .tranches
                .iter_mut()
                .filter(|t| !t.kind.is_subordinated())
                .for_each(|t| t.cash_sweep_rate = value),
            LboVariable::PreferredRate => input.waterfall.preferred_rate = value,
            LboVariable::CarryRate => input.waterfall.carry_rate = value,
            LboVariable::ExitMultiple => match &mut input.exit {
                ExitAssumption::Multiple { exit_multiple } => *exit_multiple = value,
                _ => return Err(self.exit_mismatch("a multiple-based exit")),
            },
            LboVariable::TerminalGrowth => match &mut input.exit {
                ExitAssumption::TerminalGrowth { growth_rate, .. } => *growth_rate = value,
                _ => return Err(self.exit_mismatch("a terminal-growth exit")),
            },
            LboVariable::DiscountRate => match &mut input.exit {
                ExitAssumption::TerminalGrowth { discount_rate, .. } => *discount_rate = value,
                _ => return Err(self.exit_mismatch("a terminal-growth exit")),
            },
        }
        Ok(())
    }

    fn exit_mismatch(&self, needed: &str) -> LboError {
        LboError::invalid(
            format!("variable:{}", self.name()),
            format!("Only applies to {needed}"),
        )
    }
}

impl fmt::Display for LboVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LboVariable {
    type Err = LboError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LboVariable::ALL
            .iter()
            .copied()
            .find(|v| v.name() == s)
            .ok_or_else(|| {
                LboError::invalid(
                    format!("variable:{s}"),
                    "Unknown sensitivity variable",
                )
            })
    }
}

/// Output metric extracted from a full LBO run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LboMetric {
    Irr,
    Moic,
    ExitEquity,
    ExitLeverage,
    LpTotal,
    GpTotal,
}

impl LboMetric {
    pub fn name(&self) -> &'static str {
        match self {
            LboMetric::Irr => "irr",
            LboMetric::Moic => "moic",
            LboMetric::ExitEquity => "exit_equity",
            LboMetric::ExitLeverage => "exit_leverage",
            LboMetric::LpTotal => "lp_total",
            LboMetric::GpTotal => "gp_total",
        }
    }

    pub fn extract(&self, output: &LboOutput) -> LboResult<Decimal> {
        match self {
            LboMetric::Irr => Ok(output.returns.irr),
            LboMetric::Moic => Ok(output.returns.moic),
            LboMetric::ExitEquity => Ok(output.returns.exit_equity_value),
            LboMetric::ExitLeverage => output.exit_leverage.ok_or_else(|| LboError::DegenerateInput {
                context: "exit leverage with zero exit EBITDA".into(),
            }),
            LboMetric::LpTotal => Ok(output.waterfall.total_lp),
            LboMetric::GpTotal => Ok(output.waterfall.total_gp),
        }
    }
}

impl fmt::Display for LboMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LboMetric {
    type Err = LboError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            LboMetric::Irr,
            LboMetric::Moic,
            LboMetric::ExitEquity,
            LboMetric::ExitLeverage,
            LboMetric::LpTotal,
            LboMetric::GpTotal,
        ]
        .into_iter()
        .find(|m| m.name() == s)
        .ok_or_else(|| LboError::invalid("metric", format!("Unknown output metric '{s}'")))
    }
}

/// Clone the base input and substitute every variable in `vars`.
pub fn apply_variables(base: &LboInput, vars: &VariableMap) -> LboResult<LboInput> {
    let mut input = base.clone();
    for (name, value) in vars {
        let variable: LboVariable = name.parse()?;
        variable.apply(&mut input, *value)?;
    }
    Ok(input)
}

/// Base-case values for the named variables, read from `base`.
pub fn base_variables(base: &LboInput, names: &[&str]) -> LboResult<VariableMap> {
    let mut vars = VariableMap::new();
    for name in names {
        let variable: LboVariable = name.parse()?;
        if let Some(value) = variable.base_value(base) {
            vars.insert(variable.name().to_string(), value);
        }
    }
    Ok(vars)
}

/// A metric function that runs the full pipeline on `base` with overrides.
pub fn lbo_metric_fn(
    base: &LboInput,
    metric: LboMetric,
) -> impl Fn(&VariableMap) -> LboResult<Decimal> + Sync + '_ {
    move |vars: &VariableMap| {
        let input = apply_variables(base, vars)?;
        let output = run_lbo(&input)?;
        metric.extract(&output.result)
    }
}

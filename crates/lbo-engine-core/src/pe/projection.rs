use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{LboError, OrOverflow};
use crate::types::*;
use crate::LboResult;

/// Operating assumptions for a single projection period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingAssumptions {
    /// Revenue growth over the prior period (0.05 = 5%)
    pub revenue_growth: Rate,
    /// EBITDA as a fraction of revenue
    pub ebitda_margin: Rate,
    /// Depreciation & amortisation as a fraction of revenue
    pub da_rate: Rate,
    /// Capital expenditures as a fraction of revenue
    pub capex_rate: Rate,
    /// Net working capital balance as a fraction of revenue
    pub nwc_rate: Rate,
    /// Cash tax rate on EBIT
    pub tax_rate: Rate,
}

/// Base year plus the per-period assumption records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingInputs {
    /// Base-year revenue. Derived from entry EBITDA and the base margin when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_revenue: Option<Money>,
    /// Base-year EBITDA margin
    pub base_ebitda_margin: Rate,
    /// One record per projection period, period 1 first
    pub periods: Vec<OperatingAssumptions>,
}

impl OperatingInputs {
    /// Base-year revenue, falling back to `entry_ebitda / base_ebitda_margin`.
    pub fn resolve_base_revenue(&self, entry_ebitda: Money) -> LboResult<Money> {
        match self.base_revenue {
            Some(revenue) if revenue > Decimal::ZERO => Ok(revenue),
            Some(_) => Err(LboError::invalid("base_revenue", "Base revenue must be positive")),
            None => {
                if self.base_ebitda_margin <= Decimal::ZERO {
                    return Err(LboError::invalid(
                        "base_ebitda_margin",
                        "A positive base margin is required to derive base revenue",
                    ));
                }
                Ok(entry_ebitda / self.base_ebitda_margin)
            }
        }
    }
}

/// One period of the operating projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionRow {
    pub period: u32,
    pub revenue: Money,
    pub ebitda: Money,
    pub depreciation_amortisation: Money,
    pub ebit: Money,
    pub nopat: Money,
    pub capex: Money,
    pub nwc: Money,
    pub nwc_change: Money,
    pub interest_expense: Money,
    /// NOPAT + D&A - CapEx - change in NWC - interest. Pre-principal.
    pub free_cash_flow: Money,
}

/// Ordered projection, period 0 (base year) first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingProjection {
    pub rows: Vec<ProjectionRow>,
}

impl OperatingProjection {
    pub fn last(&self) -> Option<&ProjectionRow> {
        self.rows.last()
    }

    /// Row for a given period number
    pub fn period(&self, period: u32) -> Option<&ProjectionRow> {
        self.rows.get(period as usize)
    }
}

/// Revenue and NWC carried from one period into the next
#[derive(Debug, Clone, Copy)]
pub struct PeriodState {
    pub revenue: Money,
    pub nwc: Money,
}

/// Assumption record for a zero-based period index, carrying the last
/// record forward when the vector is shorter than the horizon.
pub fn assumptions_at(assumptions: &[OperatingAssumptions], index: usize) -> &OperatingAssumptions {
    let last = assumptions.len().saturating_sub(1);
    &assumptions[index.min(last)]
}

/// Validate the assumption vector against the projection horizon.
pub fn validate_assumptions(
    assumptions: &[OperatingAssumptions],
    periods: u32,
    warnings: &mut Vec<String>,
) -> LboResult<()> {
    if assumptions.is_empty() {
        return Err(LboError::invalid(
            "operating.periods",
            "At least one operating assumption record is required",
        ));
    }
    for (i, a) in assumptions.iter().enumerate() {
        let field = |name: &str| format!("operating.periods[{i}].{name}");
        if a.revenue_growth <= -Decimal::ONE {
            return Err(LboError::invalid(
                field("revenue_growth"),
                "Revenue growth must be greater than -100%",
            ));
        }
        if a.tax_rate < Decimal::ZERO || a.tax_rate >= Decimal::ONE {
            return Err(LboError::invalid(field("tax_rate"), "Tax rate must be in [0, 1)"));
        }
        if a.da_rate < Decimal::ZERO || a.capex_rate < Decimal::ZERO || a.nwc_rate < Decimal::ZERO
        {
            return Err(LboError::invalid(
                field("rates"),
                "D&A, CapEx and NWC intensities cannot be negative",
            ));
        }
    }
    if assumptions.len() < periods as usize {
        warnings.push(format!(
            "{} operating assumption record(s) for {} periods; carrying the last record forward",
            assumptions.len(),
            periods
        ));
    } else if assumptions.len() > periods as usize {
        warnings.push(format!(
            "{} operating assumption records supplied; only the first {} are used",
            assumptions.len(),
            periods
        ));
    }
    Ok(())
}

/// Base-year row and the state period 1 grows from.
///
/// Base-year NWC uses the period-1 NWC intensity.
pub fn base_period(
    base_revenue: Money,
    base_ebitda_margin: Rate,
    first: &OperatingAssumptions,
) -> LboResult<(ProjectionRow, PeriodState)> {
    let nwc = base_revenue.checked_mul(first.nwc_rate).or_overflow("base-year NWC")?;
    let ebitda = base_revenue
        .checked_mul(base_ebitda_margin)
        .or_overflow("base-year EBITDA")?;
    let row = ProjectionRow {
        period: 0,
        revenue: base_revenue,
        ebitda,
        depreciation_amortisation: Decimal::ZERO,
        ebit: Decimal::ZERO,
        nopat: Decimal::ZERO,
        capex: Decimal::ZERO,
        nwc,
        nwc_change: Decimal::ZERO,
        interest_expense: Decimal::ZERO,
        free_cash_flow: Decimal::ZERO,
    };
    Ok((
        row,
        PeriodState {
            revenue: base_revenue,
            nwc,
        },
    ))
}

/// Project a single period given the prior state and this period's interest.
///
/// Tax is charged only on positive EBIT, so when EBIT is negative NOPAT
/// equals EBIT rather than `EBIT * (1 - tax_rate)`.
///
/// Arithmetic overflow (runaway growth over a long horizon) is reported
/// as `DegenerateInput`.
pub fn project_period(
    period: u32,
    prior: &PeriodState,
    a: &OperatingAssumptions,
    interest_expense: Money,
) -> LboResult<(ProjectionRow, PeriodState)> {
    let context = format!("operating projection, period {period}");
    let mul = |x: Decimal, y: Decimal| x.checked_mul(y).or_overflow(&context);
    let sub = |x: Decimal, y: Decimal| x.checked_sub(y).or_overflow(&context);

    let growth = Decimal::ONE
        .checked_add(a.revenue_growth)
        .or_overflow(&context)?;
    let revenue = mul(prior.revenue, growth)?;
    let ebitda = mul(revenue, a.ebitda_margin)?;
    let da = mul(revenue, a.da_rate)?;
    let ebit = sub(ebitda, da)?;
    // No tax credit on operating losses
    let tax = if ebit > Decimal::ZERO {
        mul(ebit, a.tax_rate)?
    } else {
        Decimal::ZERO
    };
    let nopat = sub(ebit, tax)?;
    let capex = mul(revenue, a.capex_rate)?;
    let nwc = mul(revenue, a.nwc_rate)?;
    let nwc_change = sub(nwc, prior.nwc)?;
    let free_cash_flow = nopat
        .checked_add(da)
        .and_then(|v| v.checked_sub(capex))
        .and_then(|v| v.checked_sub(nwc_change))
        .and_then(|v| v.checked_sub(interest_expense))
        .or_overflow(&context)?;

    Ok((
        ProjectionRow {
            period,
            revenue,
            ebitda,
            depreciation_amortisation: da,
            ebit,
            nopat,
            capex,
            nwc,
            nwc_change,
            interest_expense,
            free_cash_flow,
        },
        PeriodState { revenue, nwc },
    ))
}

/// Project revenue, EBITDA and FCF over `periods` with a known interest series.
///
/// `interest_by_period[i]` is the interest charged in period `i + 1`; missing
/// entries are treated as zero. Inside a full LBO run the debt simulator
/// drives [`project_period`] directly so interest follows the balances.
pub fn project_operations(
    base_revenue: Money,
    base_ebitda_margin: Rate,
    assumptions: &[OperatingAssumptions],
    periods: u32,
    interest_by_period: &[Money],
) -> LboResult<ComputationOutput<OperatingProjection>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if base_revenue <= Decimal::ZERO {
        return Err(LboError::invalid("base_revenue", "Base revenue must be positive"));
    }
    if periods == 0 {
        return Err(LboError::invalid("periods", "Projection needs at least 1 period"));
    }
    validate_assumptions(assumptions, periods, &mut warnings)?;

    let (base_row, mut state) = base_period(base_revenue, base_ebitda_margin, &assumptions[0])?;
    let mut rows = Vec::with_capacity(periods as usize + 1);
    rows.push(base_row);

    for period in 1..=periods {
        let idx = (period - 1) as usize;
        let interest = interest_by_period.get(idx).copied().unwrap_or(Decimal::ZERO);
        let (row, next) =
            project_period(period, &state, assumptions_at(assumptions, idx), interest)?;
        rows.push(row);
        state = next;
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Operating Projection",
        &serde_json::json!({
            "base_revenue": base_revenue.to_string(),
            "base_ebitda_margin": base_ebitda_margin.to_string(),
            "periods": periods,
        }),
        warnings,
        elapsed,
        OperatingProjection { rows },
    ))
}

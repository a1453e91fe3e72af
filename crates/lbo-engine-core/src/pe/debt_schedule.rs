use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use crate::error::{LboError, OrOverflow};
use crate::pe::credit_metrics::{self, CreditMetricsRow};
use crate::pe::projection::{
    assumptions_at, base_period, project_period, validate_assumptions, OperatingAssumptions,
    OperatingProjection,
};
use crate::types::*;
use crate::LboResult;

/// Kind of debt tranche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrancheKind {
    Revolver,
    TermLoanA,
    TermLoanB,
    Subordinated,
}

impl TrancheKind {
    pub fn is_subordinated(&self) -> bool {
        matches!(self, TrancheKind::Subordinated)
    }
}

/// Principal of a tranche: fixed by the caller, or a share of the residual
/// left in its class after specified tranches are funded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrancheAmount {
    Specified(Money),
    Residual {
        #[serde(default = "default_residual_weight")]
        weight: Decimal,
    },
}

fn default_residual_weight() -> Decimal {
    Decimal::ONE
}

/// Definition of a single debt tranche
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtTranche {
    pub name: String,
    pub kind: TrancheKind,
    pub amount: TrancheAmount,
    /// Annual cash interest rate on the beginning balance
    pub interest_rate: Rate,
    /// Fraction of original principal repaid each period
    #[serde(default)]
    pub mandatory_amortisation_rate: Rate,
    /// Fraction of sweep-eligible cash offered to this tranche
    #[serde(default)]
    pub cash_sweep_rate: Rate,
    /// Lower ranks are swept first
    pub seniority: u32,
}

/// A tranche with its principal resolved by the transaction sizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedTranche {
    pub tranche: DebtTranche,
    pub principal: Money,
}

/// Check tranche terms: unique seniority, rate ranges, and no early
/// paydown of subordinated debt.
pub fn validate_tranches(tranches: &[DebtTranche]) -> LboResult<()> {
    let mut ranks = HashSet::new();
    for t in tranches {
        let field = |name: &str| format!("tranche:{}.{name}", t.name);
        if !ranks.insert(t.seniority) {
            return Err(LboError::invalid(
                field("seniority"),
                format!("Seniority rank {} is used by more than one tranche", t.seniority),
            ));
        }
        if t.interest_rate < Decimal::ZERO {
            return Err(LboError::invalid(
                field("interest_rate"),
                "Interest rate cannot be negative",
            ));
        }
        for (name, rate) in [
            ("mandatory_amortisation_rate", t.mandatory_amortisation_rate),
            ("cash_sweep_rate", t.cash_sweep_rate),
        ] {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(LboError::invalid(field(name), "Rate must be between 0 and 1"));
            }
        }
        if t.kind.is_subordinated()
            && (!t.mandatory_amortisation_rate.is_zero() || !t.cash_sweep_rate.is_zero())
        {
            return Err(LboError::invalid(
                field("kind"),
                "Subordinated tranches cannot amortise or receive cash sweep ahead of senior debt",
            ));
        }
        match &t.amount {
            TrancheAmount::Specified(amount) if *amount < Decimal::ZERO => {
                return Err(LboError::invalid(
                    field("amount"),
                    "Tranche amount cannot be negative",
                ));
            }
            TrancheAmount::Residual { weight } if *weight <= Decimal::ZERO => {
                return Err(LboError::invalid(
                    field("amount"),
                    "Residual weight must be positive",
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Input for the period-by-period debt and cash-sweep simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtSimulationInput {
    pub tranches: Vec<ResolvedTranche>,
    pub base_revenue: Money,
    pub base_ebitda_margin: Rate,
    pub operating: Vec<OperatingAssumptions>,
    pub periods: u32,
    /// Cash retained each period before any sweep
    #[serde(default)]
    pub minimum_cash: Money,
}

/// A single tranche in a single period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranchePeriod {
    pub name: String,
    pub seniority: u32,
    pub beginning_balance: Money,
    pub interest: Money,
    pub mandatory_payment: Money,
    pub sweep_payment: Money,
    pub ending_balance: Money,
}

/// One period of the debt schedule, tranches in seniority order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtScheduleRow {
    pub period: u32,
    pub tranches: Vec<TranchePeriod>,
    /// Total ending debt
    pub total_debt: Money,
    pub total_interest: Money,
    pub total_mandatory: Money,
    pub total_sweep: Money,
    pub free_cash_flow: Money,
    /// max(0, FCF - mandatory - minimum cash)
    pub cash_available_for_sweep: Money,
    /// Cumulative cash retained after debt service
    pub cash_balance: Money,
    /// Amount by which mandatory debt service plus the minimum cash reserve
    /// exceeded FCF. Only set in periods with mandatory debt service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity_shortfall: Option<Money>,
}

/// Full simulation output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtSimulationOutput {
    pub projection: OperatingProjection,
    pub schedule: Vec<DebtScheduleRow>,
    pub credit_metrics: Vec<CreditMetricsRow>,
    pub ending_debt: Money,
    pub total_interest_paid: Money,
    pub total_principal_repaid: Money,
    pub liquidity_shortfall_periods: Vec<u32>,
}

/// Run the co-iterated operating projection and debt schedule.
///
/// Each period: interest on beginning balances, FCF using that interest,
/// mandatory amortisation, then a seniority-ordered sweep of
/// `max(0, FCF - mandatory - minimum_cash)`. Cash only rolls to the next
/// tranche once the current one is retired; subordinated debt is never swept.
pub fn simulate_debt(
    input: &DebtSimulationInput,
) -> LboResult<ComputationOutput<DebtSimulationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // ─── Validation ──────────────────────────────────────────────────
    if input.periods == 0 {
        return Err(LboError::invalid("periods", "Simulation needs at least 1 period"));
    }
    if input.base_revenue <= Decimal::ZERO {
        return Err(LboError::invalid("base_revenue", "Base revenue must be positive"));
    }
    if input.minimum_cash < Decimal::ZERO {
        return Err(LboError::invalid(
            "minimum_cash",
            "Minimum cash balance cannot be negative",
        ));
    }
    let definitions: Vec<DebtTranche> = input.tranches.iter().map(|t| t.tranche.clone()).collect();
    validate_tranches(&definitions)?;
    if let Some(t) = input.tranches.iter().find(|t| t.principal < Decimal::ZERO) {
        return Err(LboError::invalid(
            format!("tranche:{}.principal", t.tranche.name),
            "Principal cannot be negative",
        ));
    }
    validate_assumptions(&input.operating, input.periods, &mut warnings)?;

    let tranches = &input.tranches;
    let mut order: Vec<usize> = (0..tranches.len()).collect();
    order.sort_by_key(|&i| tranches[i].tranche.seniority);

    let mut balances: Vec<Money> = tranches.iter().map(|t| t.principal).collect();
    let (base_row, mut state) =
        base_period(input.base_revenue, input.base_ebitda_margin, &input.operating[0])?;

    let mut projection_rows = Vec::with_capacity(input.periods as usize + 1);
    projection_rows.push(base_row);
    let mut schedule = Vec::with_capacity(input.periods as usize);
    let mut cash_balance = Decimal::ZERO;
    let mut total_interest_paid = Decimal::ZERO;
    let mut total_principal_repaid = Decimal::ZERO;
    let mut liquidity_shortfall_periods = Vec::new();

    for period in 1..=input.periods {
        let beginning = balances.clone();
        let context = format!("debt schedule, period {period}");

        // 1. Interest on beginning balances
        let interest: Vec<Money> = tranches
            .iter()
            .zip(&beginning)
            .map(|(t, bal)| bal.checked_mul(t.tranche.interest_rate).or_overflow(&context))
            .collect::<LboResult<_>>()?;
        let total_interest = checked_total(&interest, &context)?;

        // 2. FCF using this period's interest
        let assumptions = assumptions_at(&input.operating, (period - 1) as usize);
        let (row, next_state) = project_period(period, &state, assumptions, total_interest)?;
        let fcf = row.free_cash_flow;

        // 3. Mandatory amortisation on original principal
        let mut mandatory = vec![Decimal::ZERO; tranches.len()];
        for &i in &order {
            let due = tranches[i]
                .principal
                .checked_mul(tranches[i].tranche.mandatory_amortisation_rate)
                .or_overflow(&context)?;
            let paid = due.min(balances[i]).max(Decimal::ZERO);
            mandatory[i] = paid;
            balances[i] -= paid;
        }
        let total_mandatory = checked_total(&mandatory, &context)?;

        // 4. Sweep-eligible cash after the minimum cash reserve
        let raw_available = fcf
            .checked_sub(total_mandatory)
            .and_then(|v| v.checked_sub(input.minimum_cash))
            .or_overflow(&context)?;
        let liquidity_shortfall = if raw_available < Decimal::ZERO && total_mandatory > Decimal::ZERO
        {
            warnings.push(format!(
                "Period {period}: mandatory debt service of {total_mandatory} exceeds free cash flow of {fcf} \
                 less the minimum cash reserve of {}",
                input.minimum_cash
            ));
            liquidity_shortfall_periods.push(period);
            Some(-raw_available)
        } else {
            None
        };
        let available = raw_available.max(Decimal::ZERO);

        // 5. Discretionary sweep in seniority order
        let mut sweep = vec![Decimal::ZERO; tranches.len()];
        let mut remaining = available;
        for &i in &order {
            if remaining <= Decimal::ZERO {
                break;
            }
            let t = &tranches[i].tranche;
            if t.kind.is_subordinated()
                || t.cash_sweep_rate <= Decimal::ZERO
                || balances[i] <= Decimal::ZERO
            {
                continue;
            }
            let paid = (remaining * t.cash_sweep_rate).min(balances[i]);
            sweep[i] = paid;
            balances[i] -= paid;
            remaining -= paid;
            if balances[i] > Decimal::ZERO {
                // Junior tranches wait until this one is retired
                break;
            }
        }
        let total_sweep: Money = sweep.iter().sum();

        // 6. Roll balances forward
        cash_balance = fcf
            .checked_sub(total_mandatory)
            .and_then(|v| v.checked_sub(total_sweep))
            .and_then(|v| v.checked_add(cash_balance))
            .or_overflow(&context)?;
        total_interest_paid = total_interest_paid
            .checked_add(total_interest)
            .or_overflow(&context)?;
        total_principal_repaid += total_mandatory + total_sweep;

        let tranche_rows: Vec<TranchePeriod> = order
            .iter()
            .map(|&i| TranchePeriod {
                name: tranches[i].tranche.name.clone(),
                seniority: tranches[i].tranche.seniority,
                beginning_balance: beginning[i],
                interest: interest[i],
                mandatory_payment: mandatory[i],
                sweep_payment: sweep[i],
                ending_balance: balances[i],
            })
            .collect();

        schedule.push(DebtScheduleRow {
            period,
            tranches: tranche_rows,
            total_debt: balances.iter().sum(),
            total_interest,
            total_mandatory,
            total_sweep,
            free_cash_flow: fcf,
            cash_available_for_sweep: available,
            cash_balance,
            liquidity_shortfall,
        });
        projection_rows.push(row);
        state = next_state;
    }

    let projection = OperatingProjection {
        rows: projection_rows,
    };
    let credit_metrics = credit_metrics::compute_credit_metrics(&projection, &schedule);
    let ending_debt = schedule
        .last()
        .map(|r| r.total_debt)
        .unwrap_or(Decimal::ZERO);

    let output = DebtSimulationOutput {
        projection,
        schedule,
        credit_metrics,
        ending_debt,
        total_interest_paid,
        total_principal_repaid,
        liquidity_shortfall_periods,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Multi-Tranche Debt Schedule with Seniority Cash Sweep",
        &serde_json::json!({
            "num_tranches": input.tranches.len(),
            "periods": input.periods,
            "minimum_cash": input.minimum_cash.to_string(),
            "interest_convention": "beginning_balance",
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Sum a per-tranche vector, reporting overflow as `DegenerateInput`.
fn checked_total(values: &[Money], context: &str) -> LboResult<Money> {
    values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .or_overflow(context)
}

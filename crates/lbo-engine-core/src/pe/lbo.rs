use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::pe::credit_metrics::CreditMetricsRow;
use crate::pe::debt_schedule::{
    simulate_debt, DebtScheduleRow, DebtSimulationInput, DebtTranche, ResolvedTranche,
};
use crate::pe::projection::{OperatingInputs, OperatingProjection};
use crate::pe::returns::{compute_returns, ExitAssumption, ReturnsInput, ReturnsSummary};
use crate::pe::sources_uses::{
    allocate_tranches, build_sources_uses, size_transaction, SourcesUsesOutput,
    TransactionInputs, TransactionSizing,
};
use crate::pe::waterfall::{allocate_waterfall, WaterfallInput, WaterfallResult, WaterfallTerms};
use crate::types::*;
use crate::LboResult;

/// Full LBO model input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboInput {
    pub transaction: TransactionInputs,
    /// Debt package, any order; seniority ranks decide the sweep order
    pub tranches: Vec<DebtTranche>,
    pub operating: OperatingInputs,
    pub exit: ExitAssumption,
    pub waterfall: WaterfallTerms,
    /// Cash retained each period before any sweep
    #[serde(default)]
    pub minimum_cash: Money,
}

/// Full LBO model output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboOutput {
    pub sizing: TransactionSizing,
    pub sources_uses: SourcesUsesOutput,
    /// Tranches with funded principal
    pub tranches: Vec<ResolvedTranche>,
    pub projection: OperatingProjection,
    pub schedule: Vec<DebtScheduleRow>,
    pub credit_metrics: Vec<CreditMetricsRow>,
    /// Periods where mandatory debt service exceeded FCF
    pub liquidity_shortfall_periods: Vec<u32>,
    pub returns: ReturnsSummary,
    /// Ending debt / exit EBITDA
    pub exit_leverage: Option<Multiple>,
    pub waterfall: WaterfallResult,
}

fn prefixed(stage: &str, warnings: Vec<String>) -> impl Iterator<Item = String> + '_ {
    warnings.into_iter().map(move |w| format!("{stage}: {w}"))
}

/// Run a complete LBO from entry through exit and distribution.
///
/// Stages run strictly in order: sizing and tranche allocation, the
/// co-iterated operating projection and debt schedule, exit returns, and
/// the distribution waterfall on the sponsor's proceeds.
pub fn run_lbo(input: &LboInput) -> LboResult<ComputationOutput<LboOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // ─── Sizing ──────────────────────────────────────────────────────
    let sizing_out = size_transaction(&input.transaction)?;
    warnings.extend(prefixed("Sizing", sizing_out.warnings));
    let sizing = sizing_out.result;

    let mut allocation_warnings = Vec::new();
    let tranches = allocate_tranches(&sizing, &input.tranches, &mut allocation_warnings)?;
    warnings.extend(prefixed("Tranches", allocation_warnings));

    let sources_uses = build_sources_uses(
        &sizing,
        input.transaction.existing_cash,
        input.transaction.existing_debt_payoff,
        &tranches,
    );
    if !sources_uses.balanced {
        warnings.push("Sources & Uses are not balanced".into());
    }

    // ─── Projection & debt schedule ──────────────────────────────────
    let base_revenue = input
        .operating
        .resolve_base_revenue(input.transaction.entry_ebitda)?;
    let simulation = simulate_debt(&DebtSimulationInput {
        tranches: tranches.clone(),
        base_revenue,
        base_ebitda_margin: input.operating.base_ebitda_margin,
        operating: input.operating.periods.clone(),
        periods: input.transaction.holding_periods,
        minimum_cash: input.minimum_cash,
    })?;
    warnings.extend(prefixed("Debt schedule", simulation.warnings));
    let debt = simulation.result;

    // ─── Exit & returns ──────────────────────────────────────────────
    let (exit_ebitda, exit_unlevered_fcf) = debt
        .projection
        .last()
        .map(|row| (row.ebitda, row.free_cash_flow + row.interest_expense))
        .unwrap_or((Decimal::ZERO, Decimal::ZERO));

    let returns_out = compute_returns(&ReturnsInput {
        exit: input.exit.clone(),
        exit_ebitda,
        exit_free_cash_flow: exit_unlevered_fcf,
        ending_debt: debt.ending_debt,
        equity_contribution: sizing.equity_contribution,
        holding_periods: input.transaction.holding_periods,
        interim_distributions: vec![],
    })?;
    warnings.extend(prefixed("Returns", returns_out.warnings));
    let returns = returns_out.result;

    let exit_leverage = debt.ending_debt.checked_div(exit_ebitda);
    if exit_leverage.is_none() {
        warnings.push(format!("Exit EBITDA of {exit_ebitda}; exit leverage undefined"));
    }

    // ─── Distribution waterfall ──────────────────────────────────────
    let waterfall_out = allocate_waterfall(&WaterfallInput {
        total_distributions: returns.total_distributions,
        initial_investment: sizing.equity_contribution,
        years: input.transaction.holding_periods,
        terms: input.waterfall.clone(),
    })?;
    warnings.extend(prefixed("Waterfall", waterfall_out.warnings));

    let output = LboOutput {
        sizing,
        sources_uses,
        tranches,
        projection: debt.projection,
        schedule: debt.schedule,
        credit_metrics: debt.credit_metrics,
        liquidity_shortfall_periods: debt.liquidity_shortfall_periods,
        returns,
        exit_leverage,
        waterfall: waterfall_out.result,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Leveraged Buyout Model",
        &serde_json::json!({
            "entry_ebitda": input.transaction.entry_ebitda.to_string(),
            "entry_multiple": input.transaction.entry_multiple.to_string(),
            "holding_periods": input.transaction.holding_periods,
            "exit": &input.exit,
            "num_tranches": input.tranches.len(),
            "minimum_cash": input.minimum_cash.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Debt balances never go negative and never increase
//! 2. Debt service never exceeds FCF unless the period is flagged
//! 3. Waterfall tiers conserve distributions and grow with proceeds
//! 4. The annualised return recompounds to the multiple
//! 5. Parallel grid evaluation matches sequential evaluation

use lbo_engine_core::pe::debt_schedule::{
    simulate_debt, DebtSimulationInput, DebtTranche, ResolvedTranche, TrancheAmount, TrancheKind,
};
use lbo_engine_core::pe::projection::OperatingAssumptions;
use lbo_engine_core::pe::waterfall::{allocate_waterfall, WaterfallInput, WaterfallTerms};
use lbo_engine_core::scenarios::sensitivity::{evaluate_grid, Execution, SensitivityAxis};
use lbo_engine_core::scenarios::variables::VariableMap;
use lbo_engine_core::time_value::{annualised_return, compound_factor};
use lbo_engine_core::LboResult;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Slack for sums of 28-digit decimals that round in the last place.
fn eps() -> Decimal {
    Decimal::new(1, 12)
}

// ── Strategies (proptest) ────────────────────────────────────────────

/// A rate in hundredths between `lo` and `hi` percent.
fn arb_rate(lo: i64, hi: i64) -> impl Strategy<Value = Decimal> {
    (lo..=hi).prop_map(|bp| Decimal::new(bp, 2))
}

fn arb_money(lo: i64, hi: i64) -> impl Strategy<Value = Decimal> {
    (lo..=hi).prop_map(Decimal::from)
}

fn arb_assumptions() -> impl Strategy<Value = OperatingAssumptions> {
    (
        arb_rate(-10, 15),
        arb_rate(2, 40),
        arb_rate(0, 8),
        arb_rate(0, 8),
        arb_rate(0, 20),
        arb_rate(0, 35),
    )
        .prop_map(|(growth, margin, da, capex, nwc, tax)| OperatingAssumptions {
            revenue_growth: growth,
            ebitda_margin: margin,
            da_rate: da,
            capex_rate: capex,
            nwc_rate: nwc,
            tax_rate: tax,
        })
}

fn arb_senior(seniority: u32) -> impl Strategy<Value = ResolvedTranche> {
    (arb_money(0, 400), arb_rate(0, 12), arb_rate(0, 20), arb_rate(0, 100)).prop_map(
        move |(principal, rate, amort, sweep)| ResolvedTranche {
            tranche: DebtTranche {
                name: format!("Senior {seniority}"),
                kind: TrancheKind::TermLoanB,
                amount: TrancheAmount::Specified(principal),
                interest_rate: rate,
                mandatory_amortisation_rate: amort,
                cash_sweep_rate: sweep,
                seniority,
            },
            principal,
        },
    )
}

fn arb_subordinated(seniority: u32) -> impl Strategy<Value = ResolvedTranche> {
    (arb_money(0, 200), arb_rate(0, 15)).prop_map(move |(principal, rate)| ResolvedTranche {
        tranche: DebtTranche {
            name: "Notes".into(),
            kind: TrancheKind::Subordinated,
            amount: TrancheAmount::Specified(principal),
            interest_rate: rate,
            mandatory_amortisation_rate: Decimal::ZERO,
            cash_sweep_rate: Decimal::ZERO,
            seniority,
        },
        principal,
    })
}

fn arb_simulation() -> impl Strategy<Value = DebtSimulationInput> {
    (
        arb_senior(1),
        arb_senior(2),
        arb_subordinated(3),
        prop::collection::vec(arb_assumptions(), 1..=7),
        arb_money(100, 2_000),
        arb_money(0, 30),
        1u32..=7,
    )
        .prop_map(|(a, b, sub, operating, base_revenue, minimum_cash, periods)| {
            DebtSimulationInput {
                tranches: vec![b, sub, a],
                base_revenue,
                base_ebitda_margin: Decimal::new(20, 2),
                operating,
                periods,
                minimum_cash,
            }
        })
}

fn arb_terms() -> impl Strategy<Value = WaterfallTerms> {
    (arb_rate(0, 15), arb_rate(0, 100), arb_rate(0, 40)).prop_map(|(pref, catchup, carry)| {
        WaterfallTerms {
            preferred_rate: pref,
            gp_catchup_rate: catchup,
            carry_rate: carry,
        }
    })
}

// ── 1-2. Debt schedule ───────────────────────────────────────────────

proptest! {
    /// Balances stay within [0, beginning] and only go down.
    #[test]
    fn balances_never_negative_or_increasing(input in arb_simulation()) {
        let out = simulate_debt(&input).unwrap().result;
        for row in &out.schedule {
            for t in &row.tranches {
                prop_assert!(t.ending_balance >= Decimal::ZERO);
                prop_assert!(t.ending_balance <= t.beginning_balance);
                prop_assert_eq!(
                    t.ending_balance,
                    t.beginning_balance - t.mandatory_payment - t.sweep_payment
                );
            }
        }
    }

    /// Principal paid never exceeds FCF unless the row carries a shortfall,
    /// and a shortfall is the reserve-inclusive gap left by mandatory service.
    #[test]
    fn payments_bounded_by_free_cash_flow(input in arb_simulation()) {
        let out = simulate_debt(&input).unwrap().result;
        for row in &out.schedule {
            let paid = row.total_mandatory + row.total_sweep;
            match row.liquidity_shortfall {
                None => prop_assert!(paid <= row.free_cash_flow + eps() || paid.is_zero()),
                Some(shortfall) => {
                    prop_assert!(shortfall > Decimal::ZERO);
                    prop_assert!(row.total_mandatory > Decimal::ZERO);
                    prop_assert!(row.total_sweep.is_zero());
                    let gap = row.total_mandatory + input.minimum_cash - row.free_cash_flow;
                    prop_assert!((shortfall - gap).abs() <= eps());
                }
            }
            prop_assert!(row.total_sweep <= row.cash_available_for_sweep + eps());
        }
    }

    /// Subordinated tranches only ever receive interest.
    #[test]
    fn subordinated_never_swept(input in arb_simulation()) {
        let out = simulate_debt(&input).unwrap().result;
        for row in &out.schedule {
            let notes = row.tranches.iter().find(|t| t.name == "Notes").unwrap();
            prop_assert!(notes.sweep_payment.is_zero());
            prop_assert!(notes.mandatory_payment.is_zero());
        }
    }
}

// ── 3. Waterfall ─────────────────────────────────────────────────────

proptest! {
    /// Tiers sum to the distributions and each tier fits what was left.
    #[test]
    fn waterfall_conserves_distributions(
        total in arb_money(0, 5_000),
        initial in arb_money(1, 2_000),
        years in 1u32..=10,
        terms in arb_terms(),
    ) {
        let out = allocate_waterfall(&WaterfallInput {
            total_distributions: total,
            initial_investment: initial,
            years,
            terms,
        })
        .unwrap()
        .result;
        prop_assert!((out.total_lp + out.total_gp - total).abs() < eps());
        let mut left = total;
        for tier in &out.tiers {
            prop_assert!(tier.amount >= Decimal::ZERO);
            prop_assert!(tier.amount <= left + eps());
            left -= tier.amount;
            prop_assert!((tier.remaining - left).abs() < eps());
        }
    }

    /// More proceeds never leave either party worse off.
    #[test]
    fn waterfall_monotone_in_proceeds(
        total in arb_money(0, 5_000),
        extra in arb_money(0, 1_000),
        initial in arb_money(1, 2_000),
        years in 1u32..=10,
        terms in arb_terms(),
    ) {
        let run = |amount: Decimal| {
            allocate_waterfall(&WaterfallInput {
                total_distributions: amount,
                initial_investment: initial,
                years,
                terms: terms.clone(),
            })
            .unwrap()
            .result
        };
        let lower = run(total);
        let higher = run(total + extra);
        prop_assert!(higher.total_lp >= lower.total_lp - eps());
        prop_assert!(higher.total_gp >= lower.total_gp - eps());
    }
}

// ── 4. Returns ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn annualised_return_recompounds(moic_bp in 10i64..=1_000, periods in 1u32..=10) {
        let moic = Decimal::new(moic_bp, 2);
        let irr = annualised_return(moic, periods).unwrap();
        let back = compound_factor(Decimal::ONE + irr, periods).unwrap();
        prop_assert!((back - moic).abs() < Decimal::new(1, 8));
    }
}

// ── 5. Grid execution ────────────────────────────────────────────────

fn ratio_metric(vars: &VariableMap) -> LboResult<Decimal> {
    let a = vars.get("a").copied().unwrap_or_default();
    let b = vars.get("b").copied().unwrap_or_default();
    if b.is_zero() {
        return Err(lbo_engine_core::LboError::DegenerateInput {
            context: "b is zero".into(),
        });
    }
    Ok(a / b)
}

proptest! {
    #[test]
    fn parallel_grid_matches_sequential(
        a_values in prop::collection::vec(arb_money(-50, 50), 1..8),
        b_values in prop::collection::vec(arb_money(-5, 5), 1..8),
    ) {
        let a = SensitivityAxis::from_values("a", a_values).unwrap();
        let b = SensitivityAxis::from_values("b", b_values).unwrap();
        let base = VariableMap::new();
        let seq = evaluate_grid(ratio_metric, &base, &a, &b, Execution::Sequential).unwrap().result;
        let par = evaluate_grid(ratio_metric, &base, &a, &b, Execution::Parallel).unwrap().result;
        prop_assert_eq!(&seq.cells, &par.cells);
        prop_assert_eq!(seq.cell_errors.len(), par.cell_errors.len());
        prop_assert_eq!(seq.base_case_position, par.base_case_position);
    }
}

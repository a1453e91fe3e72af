use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::LboError;
use crate::pe::debt_schedule::{validate_tranches, DebtTranche, ResolvedTranche, TrancheAmount};
use crate::types::*;
use crate::LboResult;

/// Entry assumptions for a leveraged acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInputs {
    /// Entry EBITDA (LTM or run-rate)
    pub entry_ebitda: Money,
    /// Entry EV/EBITDA multiple
    pub entry_multiple: Multiple,
    /// Holding period in annual periods
    pub holding_periods: u32,
    /// Total debt / entry EBITDA
    pub total_leverage: Multiple,
    /// Senior debt / entry EBITDA
    pub senior_leverage: Multiple,
    /// Transaction costs as a fraction of purchase price
    #[serde(default)]
    pub transaction_cost_rate: Rate,
    /// Cash on the target's balance sheet used to fund the deal
    #[serde(default)]
    pub existing_cash: Money,
    /// Target debt refinanced at close
    #[serde(default)]
    pub existing_debt_payoff: Money,
}

/// Transaction sizing derived from entry assumptions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSizing {
    pub purchase_price: Money,
    pub total_debt: Money,
    pub senior_debt: Money,
    pub sub_debt: Money,
    pub transaction_costs: Money,
    /// Purchase price + costs - existing cash + refinanced debt
    pub total_uses: Money,
    /// Total uses less total debt. May be negative when over-levered.
    pub equity_contribution: Money,
    /// True when the debt package exceeds total uses
    pub over_levered: bool,
}

/// Sources & Uses table for the funded capital structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesUsesOutput {
    /// All sources of funds
    pub sources: Vec<(String, Money)>,
    /// All uses of funds (existing cash shown as a negative use)
    pub uses: Vec<(String, Money)>,
    pub total_sources: Money,
    pub total_uses: Money,
    /// Whether funded tranche principal equals the leverage-implied debt
    pub balanced: bool,
}

fn validate_transaction(input: &TransactionInputs) -> LboResult<()> {
    if input.entry_ebitda <= Decimal::ZERO {
        return Err(LboError::invalid("entry_ebitda", "Entry EBITDA must be positive"));
    }
    if input.entry_multiple <= Decimal::ZERO {
        return Err(LboError::invalid(
            "entry_multiple",
            "Entry multiple must be positive",
        ));
    }
    if input.holding_periods == 0 {
        return Err(LboError::invalid(
            "holding_periods",
            "Holding period must be at least 1",
        ));
    }
    if input.senior_leverage < Decimal::ZERO || input.total_leverage < Decimal::ZERO {
        return Err(LboError::invalid(
            "leverage",
            "Leverage ratios cannot be negative",
        ));
    }
    if input.total_leverage < input.senior_leverage {
        return Err(LboError::invalid(
            "total_leverage",
            "Total leverage must be at least senior leverage",
        ));
    }
    if input.transaction_cost_rate < Decimal::ZERO || input.transaction_cost_rate >= Decimal::ONE
    {
        return Err(LboError::invalid(
            "transaction_cost_rate",
            "Transaction cost rate must be in [0, 1)",
        ));
    }
    if input.existing_cash < Decimal::ZERO {
        return Err(LboError::invalid(
            "existing_cash",
            "Existing cash cannot be negative",
        ));
    }
    if input.existing_debt_payoff < Decimal::ZERO {
        return Err(LboError::invalid(
            "existing_debt_payoff",
            "Refinanced debt cannot be negative",
        ));
    }
    Ok(())
}

/// Size the transaction: purchase price, debt package and required equity.
///
/// An over-levered structure (negative equity) is reported through
/// `over_levered` and a warning; it is not clamped.
pub fn size_transaction(
    input: &TransactionInputs,
) -> LboResult<ComputationOutput<TransactionSizing>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_transaction(input)?;

    let purchase_price = input.entry_ebitda * input.entry_multiple;
    let total_debt = input.entry_ebitda * input.total_leverage;
    let senior_debt = input.entry_ebitda * input.senior_leverage;
    let sub_debt = (total_debt - senior_debt).max(Decimal::ZERO);
    let transaction_costs = input.transaction_cost_rate * purchase_price;
    let total_uses =
        purchase_price + transaction_costs - input.existing_cash + input.existing_debt_payoff;
    let equity_contribution = total_uses - total_debt;

    let over_levered = equity_contribution < Decimal::ZERO;
    if over_levered {
        warnings.push(format!(
            "Over-levered structure: debt of {total_debt} exceeds total uses of {total_uses}"
        ));
    } else if equity_contribution.is_zero() {
        warnings.push("Structure is fully debt-funded; equity contribution is zero".into());
    }

    let output = TransactionSizing {
        purchase_price,
        total_debt,
        senior_debt,
        sub_debt,
        transaction_costs,
        total_uses,
        equity_contribution,
        over_levered,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "LBO Transaction Sizing",
        &serde_json::json!({
            "entry_ebitda": input.entry_ebitda.to_string(),
            "entry_multiple": input.entry_multiple.to_string(),
            "total_leverage": input.total_leverage.to_string(),
            "senior_leverage": input.senior_leverage.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Resolve every tranche's principal against the sized debt package.
///
/// Senior-class tranches (everything but subordinated) share `senior_debt`;
/// subordinated tranches share `sub_debt`. Within a class, `Residual`
/// tranches split `class_total - specified` pro-rata to their weight, and
/// the last residual tranche in input order takes the rounding remainder.
pub fn allocate_tranches(
    sizing: &TransactionSizing,
    tranches: &[DebtTranche],
    warnings: &mut Vec<String>,
) -> LboResult<Vec<ResolvedTranche>> {
    validate_tranches(tranches)?;

    let mut principals: Vec<Money> = vec![Decimal::ZERO; tranches.len()];

    for subordinated in [false, true] {
        let (class_name, class_total) = if subordinated {
            ("subordinated", sizing.sub_debt)
        } else {
            ("senior", sizing.senior_debt)
        };

        let members: Vec<usize> = tranches
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind.is_subordinated() == subordinated)
            .map(|(i, _)| i)
            .collect();

        let mut specified = Decimal::ZERO;
        let mut residual_members: Vec<(usize, Decimal)> = Vec::new();
        for &i in &members {
            match &tranches[i].amount {
                TrancheAmount::Specified(amount) => {
                    principals[i] = *amount;
                    specified += *amount;
                }
                TrancheAmount::Residual { weight } => residual_members.push((i, *weight)),
            }
        }

        let residual = class_total - specified;

        if residual_members.is_empty() {
            if !members.is_empty() && residual != Decimal::ZERO {
                warnings.push(format!(
                    "Specified {class_name} tranches total {specified} but leverage implies {class_total}"
                ));
            } else if members.is_empty() && class_total > Decimal::ZERO {
                warnings.push(format!(
                    "Leverage implies {class_total} of {class_name} debt but no {class_name} tranche is defined"
                ));
            }
            continue;
        }

        if residual < Decimal::ZERO {
            return Err(LboError::invalid(
                format!("tranches:{class_name}"),
                format!(
                    "Specified {class_name} tranches ({specified}) exceed the leverage-implied total ({class_total})"
                ),
            ));
        }

        let total_weight: Decimal = residual_members.iter().map(|(_, w)| *w).sum();
        let mut allocated = Decimal::ZERO;
        let last = residual_members.len() - 1;
        for (pos, (i, weight)) in residual_members.iter().enumerate() {
            let share = if pos == last {
                residual - allocated
            } else {
                residual * *weight / total_weight
            };
            principals[*i] = share;
            allocated += share;
        }
    }

    Ok(tranches
        .iter()
        .zip(principals)
        .map(|(t, principal)| ResolvedTranche {
            tranche: t.clone(),
            principal,
        })
        .collect())
}

/// Build the Sources & Uses table from the sizing and funded tranches.
pub fn build_sources_uses(
    sizing: &TransactionSizing,
    existing_cash: Money,
    existing_debt_payoff: Money,
    tranches: &[ResolvedTranche],
) -> SourcesUsesOutput {
    let mut sources: Vec<(String, Money)> = tranches
        .iter()
        .filter(|t| t.principal > Decimal::ZERO)
        .map(|t| (t.tranche.name.clone(), t.principal))
        .collect();
    sources.push(("Sponsor Equity".into(), sizing.equity_contribution));

    let mut uses: Vec<(String, Money)> = vec![("Purchase Price".into(), sizing.purchase_price)];
    if sizing.transaction_costs > Decimal::ZERO {
        uses.push(("Transaction Costs".into(), sizing.transaction_costs));
    }
    if existing_debt_payoff > Decimal::ZERO {
        uses.push(("Refinance Existing Debt".into(), existing_debt_payoff));
    }
    if existing_cash > Decimal::ZERO {
        uses.push(("Less: Existing Cash".into(), -existing_cash));
    }

    let funded_debt: Money = tranches.iter().map(|t| t.principal).sum();
    let total_sources: Money = sources.iter().map(|(_, v)| *v).sum();
    let total_uses: Money = uses.iter().map(|(_, v)| *v).sum();

    SourcesUsesOutput {
        sources,
        uses,
        total_sources,
        total_uses,
        balanced: funded_debt == sizing.total_debt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::debt_schedule::TrancheKind;
    use rust_decimal_macros::dec;

    fn base_inputs() -> TransactionInputs {
        TransactionInputs {
            entry_ebitda: dec!(100),
            entry_multiple: dec!(10),
            holding_periods: 5,
            total_leverage: dec!(5.0),
            senior_leverage: dec!(4.0),
            transaction_cost_rate: Decimal::ZERO,
            existing_cash: Decimal::ZERO,
            existing_debt_payoff: Decimal::ZERO,
        }
    }

    fn tranche(name: &str, kind: TrancheKind, amount: TrancheAmount, seniority: u32) -> DebtTranche {
        DebtTranche {
            name: name.into(),
            kind,
            amount,
            interest_rate: dec!(0.06),
            mandatory_amortisation_rate: Decimal::ZERO,
            cash_sweep_rate: Decimal::ZERO,
            seniority,
        }
    }

    #[test]
    fn test_basic_sizing() {
        let out = size_transaction(&base_inputs()).unwrap().result;
        assert_eq!(out.purchase_price, dec!(1000));
        assert_eq!(out.total_debt, dec!(500));
        assert_eq!(out.senior_debt, dec!(400));
        assert_eq!(out.sub_debt, dec!(100));
        assert_eq!(out.transaction_costs, Decimal::ZERO);
        assert_eq!(out.equity_contribution, dec!(500));
        assert!(!out.over_levered);
    }

    #[test]
    fn test_costs_cash_and_refinancing() {
        let mut input = base_inputs();
        input.transaction_cost_rate = dec!(0.02);
        input.existing_cash = dec!(30);
        input.existing_debt_payoff = dec!(50);
        let out = size_transaction(&input).unwrap().result;
        // uses = 1000 + 20 - 30 + 50 = 1040
        assert_eq!(out.transaction_costs, dec!(20));
        assert_eq!(out.total_uses, dec!(1040));
        assert_eq!(out.equity_contribution, dec!(540));
    }

    #[test]
    fn test_over_levered_is_reported_not_clamped() {
        let mut input = base_inputs();
        input.entry_multiple = dec!(4);
        let result = size_transaction(&input).unwrap();
        assert!(result.result.over_levered);
        assert_eq!(result.result.equity_contribution, dec!(-100));
        assert!(result.warnings.iter().any(|w| w.contains("Over-levered")));
    }

    #[test]
    fn test_senior_above_total_rejected() {
        let mut input = base_inputs();
        input.senior_leverage = dec!(6);
        match size_transaction(&input).unwrap_err() {
            LboError::InvalidInput { field, .. } => assert_eq!(field, "total_leverage"),
            other => panic!("Expected InvalidInput, got: {other:?}"),
        }
    }

    #[test]
    fn test_negative_leverage_rejected() {
        let mut input = base_inputs();
        input.senior_leverage = dec!(-1);
        assert!(size_transaction(&input).is_err());
    }

    #[test]
    fn test_zero_holding_period_rejected() {
        let mut input = base_inputs();
        input.holding_periods = 0;
        assert!(size_transaction(&input).is_err());
    }

    #[test]
    fn test_residual_allocation_pro_rata() {
        let sizing = size_transaction(&base_inputs()).unwrap().result;
        let tranches = vec![
            tranche("Revolver", TrancheKind::Revolver, TrancheAmount::Specified(dec!(50)), 1),
            tranche("TLA", TrancheKind::TermLoanA, TrancheAmount::Residual { weight: dec!(1) }, 2),
            tranche("TLB", TrancheKind::TermLoanB, TrancheAmount::Residual { weight: dec!(2) }, 3),
            tranche("Notes", TrancheKind::Subordinated, TrancheAmount::Residual { weight: dec!(1) }, 4),
        ];
        let mut warnings = Vec::new();
        let resolved = allocate_tranches(&sizing, &tranches, &mut warnings).unwrap();
        // Senior residual 400 - 50 = 350 split 1:2
        let tla = resolved[1].principal;
        let tlb = resolved[2].principal;
        assert_eq!(tla + tlb, dec!(350));
        assert!((tla - dec!(350) / dec!(3)).abs() < dec!(0.0000001));
        assert_eq!(resolved[3].principal, dec!(100));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_residual_sum_is_exact() {
        let sizing = size_transaction(&base_inputs()).unwrap().result;
        let tranches = vec![
            tranche("A", TrancheKind::TermLoanA, TrancheAmount::Residual { weight: dec!(1) }, 1),
            tranche("B", TrancheKind::TermLoanB, TrancheAmount::Residual { weight: dec!(1) }, 2),
            tranche("C", TrancheKind::Revolver, TrancheAmount::Residual { weight: dec!(1) }, 3),
        ];
        let mut warnings = Vec::new();
        let resolved = allocate_tranches(&sizing, &tranches, &mut warnings).unwrap();
        let total: Decimal = resolved.iter().map(|t| t.principal).sum();
        assert_eq!(total, dec!(400));
    }

    #[test]
    fn test_specified_exceeding_class_rejected() {
        let sizing = size_transaction(&base_inputs()).unwrap().result;
        let tranches = vec![
            tranche("TLA", TrancheKind::TermLoanA, TrancheAmount::Specified(dec!(450)), 1),
            tranche("TLB", TrancheKind::TermLoanB, TrancheAmount::Residual { weight: dec!(1) }, 2),
        ];
        let mut warnings = Vec::new();
        assert!(allocate_tranches(&sizing, &tranches, &mut warnings).is_err());
    }

    #[test]
    fn test_mismatch_without_residual_warns() {
        let sizing = size_transaction(&base_inputs()).unwrap().result;
        let tranches = vec![tranche(
            "TLA",
            TrancheKind::TermLoanA,
            TrancheAmount::Specified(dec!(300)),
            1,
        )];
        let mut warnings = Vec::new();
        let resolved = allocate_tranches(&sizing, &tranches, &mut warnings).unwrap();
        assert_eq!(resolved[0].principal, dec!(300));
        // senior mismatch + missing subordinated tranche
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_sources_uses_table() {
        let mut input = base_inputs();
        input.existing_cash = dec!(20);
        let sizing = size_transaction(&input).unwrap().result;
        let tranches = vec![
            tranche("Senior", TrancheKind::TermLoanB, TrancheAmount::Residual { weight: dec!(1) }, 1),
            tranche("Mezz", TrancheKind::Subordinated, TrancheAmount::Residual { weight: dec!(1) }, 2),
        ];
        let mut warnings = Vec::new();
        let resolved = allocate_tranches(&sizing, &tranches, &mut warnings).unwrap();
        let su = build_sources_uses(&sizing, input.existing_cash, input.existing_debt_payoff, &resolved);

        assert_eq!(su.total_sources, su.total_uses);
        assert_eq!(su.total_uses, dec!(980));
        assert!(su.balanced);
        let names: Vec<&str> = su.sources.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Senior", "Mezz", "Sponsor Equity"]);
        assert!(su.uses.iter().any(|(n, v)| n == "Less: Existing Cash" && *v == dec!(-20)));
    }
}

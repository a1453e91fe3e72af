use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{LboError, OrOverflow};
use crate::time_value::compound_factor;
use crate::types::*;
use crate::LboResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Economic terms of a four-tier European waterfall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallTerms {
    /// Annual preferred return, compounded over the hold (typically 0.08)
    pub preferred_rate: Rate,
    /// Fraction of the catch-up target paid to the GP (1.0 = full catch-up)
    pub gp_catchup_rate: Rate,
    /// GP carried interest share (typically 0.20)
    pub carry_rate: Rate,
}

/// Input for a whole-fund distribution waterfall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallInput {
    /// Total proceeds available for distribution
    pub total_distributions: Money,
    /// Capital contributed by LPs
    pub initial_investment: Money,
    /// Years the preferred return accrues over
    pub years: u32,
    pub terms: WaterfallTerms,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Result for a single waterfall tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallTierResult {
    pub tier_name: String,
    /// Total amount distributed in this tier
    pub amount: Money,
    pub to_gp: Money,
    pub to_lp: Money,
    /// Proceeds remaining after this tier
    pub remaining: Money,
}

/// Full waterfall allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallResult {
    pub tier1_return_of_capital: Money,
    pub tier2_preferred_return: Money,
    pub tier3_gp_catchup: Money,
    pub tier4_lp_share: Money,
    pub tier4_gp_share: Money,
    pub total_lp: Money,
    pub total_gp: Money,
    /// Compounded preferred return owed before carry
    pub hurdle_amount: Money,
    /// GP total as a fraction of profit; `None` when there is no profit
    pub gp_share_of_profit: Option<Rate>,
    pub tiers: Vec<WaterfallTierResult>,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

fn validate(input: &WaterfallInput) -> LboResult<()> {
    if input.total_distributions < Decimal::ZERO {
        return Err(LboError::invalid(
            "total_distributions",
            "Total distributions cannot be negative",
        ));
    }
    if input.initial_investment <= Decimal::ZERO {
        return Err(LboError::invalid(
            "initial_investment",
            "Initial investment must be positive",
        ));
    }
    if input.years == 0 {
        return Err(LboError::invalid("years", "Hurdle period must be at least 1 year"));
    }
    let t = &input.terms;
    if t.preferred_rate < Decimal::ZERO || t.preferred_rate >= Decimal::ONE {
        return Err(LboError::invalid("preferred_rate", "Preferred rate must be in [0, 1)"));
    }
    if t.carry_rate < Decimal::ZERO || t.carry_rate >= Decimal::ONE {
        return Err(LboError::invalid("carry_rate", "Carry rate must be in [0, 1)"));
    }
    if t.gp_catchup_rate < Decimal::ZERO || t.gp_catchup_rate > Decimal::ONE {
        return Err(LboError::invalid(
            "gp_catchup_rate",
            "Catch-up rate must be between 0 and 1",
        ));
    }
    Ok(())
}

/// Allocate distributions through return of capital, a compounded
/// preferred return, GP catch-up and the carried-interest split.
///
/// Each tier takes at most what is left, so the tiers always sum to
/// `total_distributions`. The final split gives the GP the remainder after
/// the LP share so rounding never leaks.
pub fn allocate_waterfall(input: &WaterfallInput) -> LboResult<ComputationOutput<WaterfallResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate(input)?;

    let terms = &input.terms;
    let mut remaining = input.total_distributions;
    let mut tiers: Vec<WaterfallTierResult> = Vec::with_capacity(4);

    // Tier 1: return of capital
    let tier1 = remaining.min(input.initial_investment);
    remaining -= tier1;
    tiers.push(WaterfallTierResult {
        tier_name: "Return of Capital".into(),
        amount: tier1,
        to_gp: Decimal::ZERO,
        to_lp: tier1,
        remaining,
    });
    if tier1 < input.initial_investment {
        warnings.push(format!(
            "Distributions of {} do not return contributed capital of {}",
            input.total_distributions, input.initial_investment
        ));
    }

    // Tier 2: preferred return
    let growth = compound_factor(Decimal::ONE + terms.preferred_rate, input.years)?;
    let hurdle_amount = input
        .initial_investment
        .checked_mul(growth - Decimal::ONE)
        .or_overflow("preferred return hurdle")?;
    let tier2 = remaining.min(hurdle_amount);
    remaining -= tier2;
    tiers.push(WaterfallTierResult {
        tier_name: "Preferred Return".into(),
        amount: tier2,
        to_gp: Decimal::ZERO,
        to_lp: tier2,
        remaining,
    });

    // Tier 3: GP catch-up toward carry on the preferred return
    let catchup_target = (terms.carry_rate / (Decimal::ONE - terms.carry_rate))
        .checked_mul(tier2)
        .and_then(|t| t.checked_mul(terms.gp_catchup_rate))
        .or_overflow("GP catch-up target")?;
    let tier3 = remaining.min(catchup_target);
    remaining -= tier3;
    tiers.push(WaterfallTierResult {
        tier_name: "GP Catch-Up".into(),
        amount: tier3,
        to_gp: tier3,
        to_lp: Decimal::ZERO,
        remaining,
    });

    // Tier 4: carried interest split
    let tier4_lp = remaining * (Decimal::ONE - terms.carry_rate);
    let tier4_gp = remaining - tier4_lp;
    tiers.push(WaterfallTierResult {
        tier_name: "Carried Interest".into(),
        amount: remaining,
        to_gp: tier4_gp,
        to_lp: tier4_lp,
        remaining: Decimal::ZERO,
    });

    let total_lp = tier1 + tier2 + tier4_lp;
    let total_gp = tier3 + tier4_gp;
    let profit = input.total_distributions - input.initial_investment;
    let gp_share_of_profit = if profit > Decimal::ZERO {
        Some(total_gp / profit)
    } else {
        None
    };

    let output = WaterfallResult {
        tier1_return_of_capital: tier1,
        tier2_preferred_return: tier2,
        tier3_gp_catchup: tier3,
        tier4_lp_share: tier4_lp,
        tier4_gp_share: tier4_gp,
        total_lp,
        total_gp,
        hurdle_amount,
        gp_share_of_profit,
        tiers,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Distribution Waterfall (European, whole-fund)",
        &serde_json::json!({
            "total_distributions": input.total_distributions.to_string(),
            "initial_investment": input.initial_investment.to_string(),
            "years": input.years,
            "preferred_rate": terms.preferred_rate.to_string(),
            "gp_catchup_rate": terms.gp_catchup_rate.to_string(),
            "carry_rate": terms.carry_rate.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn standard_terms() -> WaterfallTerms {
        WaterfallTerms {
            preferred_rate: dec!(0.08),
            gp_catchup_rate: dec!(1.0),
            carry_rate: dec!(0.20),
        }
    }

    fn input(total: Money) -> WaterfallInput {
        WaterfallInput {
            total_distributions: total,
            initial_investment: dec!(500),
            years: 5,
            terms: standard_terms(),
        }
    }

    #[test]
    fn test_full_catchup_waterfall() {
        let out = allocate_waterfall(&input(dec!(1000))).unwrap().result;
        assert_eq!(out.tier1_return_of_capital, dec!(500));
        // 500 * (1.08^5 - 1)
        assert_eq!(out.hurdle_amount, dec!(234.6640384));
        assert_eq!(out.tier2_preferred_return, dec!(234.6640384));
        assert_eq!(out.tier3_gp_catchup, dec!(58.6660096));
        assert_eq!(out.total_gp, dec!(100));
        assert_eq!(out.total_lp, dec!(900));
        assert_eq!(out.gp_share_of_profit, Some(dec!(0.2)));
    }

    #[test]
    fn test_tiers_conserve_distributions() {
        for total in [dec!(0), dec!(250), dec!(600), dec!(780), dec!(1000), dec!(5000)] {
            let out = allocate_waterfall(&input(total)).unwrap().result;
            let tier_sum = out.tier1_return_of_capital
                + out.tier2_preferred_return
                + out.tier3_gp_catchup
                + out.tier4_lp_share
                + out.tier4_gp_share;
            assert_eq!(tier_sum, total);
            assert_eq!(out.total_lp + out.total_gp, total);
            for tier in &out.tiers {
                assert!(tier.amount >= Decimal::ZERO);
                assert_eq!(tier.to_gp + tier.to_lp, tier.amount);
            }
        }
    }

    #[test]
    fn test_below_capital_all_to_lp() {
        let result = allocate_waterfall(&input(dec!(300))).unwrap();
        let out = &result.result;
        assert_eq!(out.tier1_return_of_capital, dec!(300));
        assert_eq!(out.total_gp, Decimal::ZERO);
        assert_eq!(out.gp_share_of_profit, None);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_within_hurdle_no_gp() {
        let out = allocate_waterfall(&input(dec!(700))).unwrap().result;
        assert_eq!(out.tier2_preferred_return, dec!(200));
        assert_eq!(out.tier3_gp_catchup, Decimal::ZERO);
        assert_eq!(out.total_gp, Decimal::ZERO);
    }

    #[test]
    fn test_partial_catchup() {
        let mut i = input(dec!(1000));
        i.terms.gp_catchup_rate = dec!(0.5);
        let out = allocate_waterfall(&i).unwrap().result;
        assert_eq!(out.tier3_gp_catchup, dec!(29.3330048));
        // GP ends below a full 20% of profit
        assert!(out.total_gp < dec!(100));
    }

    #[test]
    fn test_tier_breakdown_remaining() {
        let out = allocate_waterfall(&input(dec!(1000))).unwrap().result;
        assert_eq!(out.tiers.len(), 4);
        assert_eq!(out.tiers[0].remaining, dec!(500));
        assert_eq!(out.tiers[3].remaining, Decimal::ZERO);
        assert_eq!(out.tiers[3].to_gp, out.tier4_gp_share);
    }

    #[test]
    fn test_invalid_terms_rejected() {
        let mut i = input(dec!(1000));
        i.terms.carry_rate = dec!(1.0);
        assert!(allocate_waterfall(&i).is_err());

        let mut i = input(dec!(1000));
        i.terms.gp_catchup_rate = dec!(1.5);
        assert!(allocate_waterfall(&i).is_err());

        let mut i = input(dec!(1000));
        i.years = 0;
        assert!(allocate_waterfall(&i).is_err());

        assert!(allocate_waterfall(&input(dec!(-1))).is_err());
    }

    #[test]
    fn test_hurdle_overflow_is_degenerate() {
        let mut i = input(dec!(1000));
        i.years = 200;
        i.terms.preferred_rate = dec!(0.5);
        match allocate_waterfall(&i).unwrap_err() {
            LboError::DegenerateInput { context } => assert!(context.contains("overflow")),
            other => panic!("Expected DegenerateInput, got: {other:?}"),
        }
    }
}

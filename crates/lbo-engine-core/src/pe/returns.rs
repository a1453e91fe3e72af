use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{LboError, OrOverflow};
use crate::time_value;
use crate::types::*;
use crate::LboResult;

/// How exit enterprise value is derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ExitAssumption {
    /// EV = exit EBITDA x multiple
    Multiple { exit_multiple: Multiple },
    /// Gordon growth on the exit-period unlevered FCF
    TerminalGrowth {
        growth_rate: Rate,
        discount_rate: Rate,
    },
}

/// Which IRR solution was used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrMethod {
    /// `MOIC^(1/n) - 1`
    ClosedForm,
    /// Newton-Raphson on the equity cash flows
    RootFinding,
}

/// Input for exit valuation and sponsor returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsInput {
    pub exit: ExitAssumption,
    /// EBITDA in the exit period
    pub exit_ebitda: Money,
    /// Unlevered FCF in the exit period (terminal-growth exits only)
    #[serde(default)]
    pub exit_free_cash_flow: Money,
    /// Total debt outstanding at exit
    pub ending_debt: Money,
    /// Sponsor equity invested at entry
    pub equity_contribution: Money,
    pub holding_periods: u32,
    /// Distributions to equity before exit; index 0 is period 1
    #[serde(default)]
    pub interim_distributions: Vec<Money>,
}

/// Exit valuation and sponsor return metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsSummary {
    pub exit_enterprise_value: Money,
    pub exit_debt: Money,
    /// EV less debt. Negative when debt exceeds value.
    pub exit_equity_value: Money,
    /// Exit proceeds (floored at zero) plus interim distributions
    pub total_distributions: Money,
    /// (Exit equity value + interim distributions) / equity contribution.
    /// Not floored, so an underwater exit reports a negative multiple.
    pub moic: Multiple,
    pub irr: Rate,
    pub irr_method: IrrMethod,
}

/// Exit enterprise value under the chosen exit assumption.
pub fn exit_enterprise_value(
    exit: &ExitAssumption,
    exit_ebitda: Money,
    exit_free_cash_flow: Money,
) -> LboResult<Money> {
    match exit {
        ExitAssumption::Multiple { exit_multiple } => {
            if *exit_multiple <= Decimal::ZERO {
                return Err(LboError::invalid("exit_multiple", "Exit multiple must be positive"));
            }
            exit_ebitda
                .checked_mul(*exit_multiple)
                .or_overflow("exit enterprise value")
        }
        ExitAssumption::TerminalGrowth {
            growth_rate,
            discount_rate,
        } => {
            let spread = *discount_rate - *growth_rate;
            if spread <= Decimal::ZERO {
                return Err(LboError::DegenerateInput {
                    context: format!(
                        "terminal value: discount rate {discount_rate} must exceed growth rate {growth_rate}"
                    ),
                });
            }
            exit_free_cash_flow
                .checked_mul(Decimal::ONE + *growth_rate)
                .and_then(|v| v.checked_div(spread))
                .or_overflow("terminal value")
        }
    }
}

/// Compute exit equity, MOIC and IRR for the sponsor.
///
/// With no interim distributions the IRR is the closed-form annualised
/// multiple; otherwise it is solved on `[-equity, d1, .., dN + exit]` with
/// exit proceeds floored at zero. A non-positive MOIC reports an IRR of
/// -100% with a warning.
pub fn compute_returns(input: &ReturnsInput) -> LboResult<ComputationOutput<ReturnsSummary>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // ─── Validation ──────────────────────────────────────────────────
    if input.equity_contribution <= Decimal::ZERO {
        return Err(LboError::invalid(
            "equity_contribution",
            "Sponsor equity must be positive to compute returns",
        ));
    }
    if input.holding_periods == 0 {
        return Err(LboError::invalid(
            "holding_periods",
            "Holding period must be at least 1",
        ));
    }
    if input.interim_distributions.len() > input.holding_periods as usize {
        return Err(LboError::invalid(
            "interim_distributions",
            format!(
                "{} interim distributions supplied for a {}-period hold",
                input.interim_distributions.len(),
                input.holding_periods
            ),
        ));
    }
    if input.interim_distributions.iter().any(|d| *d < Decimal::ZERO) {
        return Err(LboError::invalid(
            "interim_distributions",
            "Interim distributions cannot be negative",
        ));
    }

    // ─── Exit valuation ──────────────────────────────────────────────
    let exit_enterprise_value =
        exit_enterprise_value(&input.exit, input.exit_ebitda, input.exit_free_cash_flow)?;
    if exit_enterprise_value < Decimal::ZERO {
        warnings.push(format!("Exit enterprise value is negative: {exit_enterprise_value}"));
    }
    let exit_equity_value = exit_enterprise_value
        .checked_sub(input.ending_debt)
        .or_overflow("exit equity value")?;

    let exit_proceeds = if exit_equity_value < Decimal::ZERO {
        warnings.push(format!(
            "Exit debt of {} exceeds enterprise value; equity receives nothing at exit",
            input.ending_debt
        ));
        Decimal::ZERO
    } else {
        exit_equity_value
    };

    let interim_total = input
        .interim_distributions
        .iter()
        .try_fold(Decimal::ZERO, |acc, d| acc.checked_add(*d))
        .or_overflow("interim distributions")?;
    let total_distributions = exit_proceeds
        .checked_add(interim_total)
        .or_overflow("total distributions")?;
    let moic = exit_equity_value
        .checked_add(interim_total)
        .and_then(|v| v.checked_div(input.equity_contribution))
        .or_overflow("MOIC")?;

    // ─── IRR ─────────────────────────────────────────────────────────
    let has_interim = input.interim_distributions.iter().any(|d| !d.is_zero());
    let irr_method = if has_interim {
        IrrMethod::RootFinding
    } else {
        IrrMethod::ClosedForm
    };

    let irr = if moic <= Decimal::ZERO {
        warnings.push("Total loss of equity; IRR reported as -100%".into());
        dec!(-1)
    } else if has_interim {
        let n = input.holding_periods as usize;
        let mut flows = vec![Decimal::ZERO; n + 1];
        flows[0] = -input.equity_contribution;
        for (i, d) in input.interim_distributions.iter().enumerate() {
            flows[i + 1] += *d;
        }
        flows[n] += exit_proceeds;
        time_value::irr(&flows, dec!(0.15))?
    } else {
        time_value::annualised_return(moic, input.holding_periods)?
    };

    let output = ReturnsSummary {
        exit_enterprise_value,
        exit_debt: input.ending_debt,
        exit_equity_value,
        total_distributions,
        moic,
        irr,
        irr_method,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "LBO Exit Valuation and Sponsor Returns",
        &serde_json::json!({
            "exit": &input.exit,
            "equity_contribution": input.equity_contribution.to_string(),
            "holding_periods": input.holding_periods,
            "irr_method": irr_method,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_value::compound_factor;
    use rust_decimal_macros::dec;

    fn base_input() -> ReturnsInput {
        ReturnsInput {
            exit: ExitAssumption::Multiple {
                exit_multiple: dec!(10),
            },
            exit_ebitda: dec!(127.62815625),
            exit_free_cash_flow: Decimal::ZERO,
            ending_debt: dec!(500),
            equity_contribution: dec!(500),
            holding_periods: 5,
            interim_distributions: vec![],
        }
    }

    #[test]
    fn test_multiple_exit_returns() {
        let out = compute_returns(&base_input()).unwrap().result;
        assert_eq!(out.exit_enterprise_value, dec!(1276.2815625));
        assert_eq!(out.exit_equity_value, dec!(776.2815625));
        assert_eq!(out.moic, dec!(1.552563125));
        assert!((out.irr - dec!(0.092)).abs() < dec!(0.001), "got {}", out.irr);
        assert_eq!(out.irr_method, IrrMethod::ClosedForm);
    }

    #[test]
    fn test_irr_recompounds_to_moic() {
        let out = compute_returns(&base_input()).unwrap().result;
        let back = compound_factor(Decimal::ONE + out.irr, 5).unwrap();
        assert!((back - out.moic).abs() < dec!(0.000000001));
    }

    #[test]
    fn test_terminal_growth_exit() {
        let mut input = base_input();
        input.exit = ExitAssumption::TerminalGrowth {
            growth_rate: dec!(0.02),
            discount_rate: dec!(0.10),
        };
        input.exit_free_cash_flow = dec!(80);
        let out = compute_returns(&input).unwrap().result;
        // 80 * 1.02 / 0.08 = 1020
        assert_eq!(out.exit_enterprise_value, dec!(1020));
        assert_eq!(out.exit_equity_value, dec!(520));
    }

    #[test]
    fn test_terminal_growth_above_discount_is_degenerate() {
        let mut input = base_input();
        input.exit = ExitAssumption::TerminalGrowth {
            growth_rate: dec!(0.10),
            discount_rate: dec!(0.10),
        };
        assert!(matches!(
            compute_returns(&input),
            Err(LboError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn test_non_positive_equity_rejected() {
        let mut input = base_input();
        input.equity_contribution = Decimal::ZERO;
        match compute_returns(&input).unwrap_err() {
            LboError::InvalidInput { field, .. } => assert_eq!(field, "equity_contribution"),
            other => panic!("Expected InvalidInput, got: {other:?}"),
        }
    }

    #[test]
    fn test_underwater_exit_is_total_loss() {
        let mut input = base_input();
        input.exit_ebitda = dec!(100);
        input.ending_debt = dec!(1200);
        let result = compute_returns(&input).unwrap();
        let out = &result.result;
        assert_eq!(out.exit_enterprise_value, dec!(1000));
        assert_eq!(out.exit_equity_value, dec!(-200));
        assert_eq!(out.moic, dec!(-0.4));
        assert_eq!(out.moic, out.exit_equity_value / input.equity_contribution);
        assert_eq!(out.total_distributions, Decimal::ZERO);
        assert_eq!(out.irr, dec!(-1));
        assert!(result.warnings.iter().any(|w| w.contains("Total loss")));
    }

    #[test]
    fn test_underwater_exit_with_interim_cash() {
        let mut input = base_input();
        input.exit_ebitda = dec!(100);
        input.ending_debt = dec!(1200);
        input.interim_distributions = vec![dec!(300)];
        let out = compute_returns(&input).unwrap().result;
        // Multiple nets the -200 exit against 300 received
        assert_eq!(out.moic, dec!(0.2));
        assert_eq!(out.total_distributions, dec!(300));
        // IRR follows the cash actually received: -500 then 300
        assert_eq!(out.irr_method, IrrMethod::RootFinding);
        assert!((out.irr - dec!(-0.4)).abs() < dec!(0.0001), "got {}", out.irr);
    }

    #[test]
    fn test_interim_distributions_use_root_finding() {
        let mut input = base_input();
        input.interim_distributions = vec![dec!(50), Decimal::ZERO, dec!(50)];
        let out = compute_returns(&input).unwrap().result;
        assert_eq!(out.irr_method, IrrMethod::RootFinding);
        assert_eq!(out.total_distributions, dec!(876.2815625));
        // Earlier cash lifts IRR above the no-dividend case
        let plain = compute_returns(&base_input()).unwrap().result;
        assert!(out.irr > plain.irr);
        let flows = [dec!(-500), dec!(50), dec!(0), dec!(50), dec!(0), dec!(776.2815625)];
        let npv = time_value::npv(out.irr, &flows).unwrap();
        assert!(npv.abs() < dec!(0.001), "npv at irr = {npv}");
    }

    #[test]
    fn test_too_many_interim_distributions_rejected() {
        let mut input = base_input();
        input.interim_distributions = vec![dec!(1); 6];
        assert!(compute_returns(&input).is_err());
    }
}

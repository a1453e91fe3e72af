use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pe::debt_schedule::DebtScheduleRow;
use crate::pe::projection::OperatingProjection;
use crate::types::*;

/// Leverage and coverage ratios for a single period.
///
/// A ratio is `None` when its denominator is zero or the quotient overflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditMetricsRow {
    pub period: u32,
    /// Ending total debt / EBITDA
    pub total_debt_to_ebitda: Option<Multiple>,
    /// EBITDA / total interest
    pub ebitda_to_interest: Option<Multiple>,
    /// EBIT / total interest
    pub ebit_to_interest: Option<Multiple>,
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Option<Multiple> {
    numerator.checked_div(denominator)
}

/// Per-period credit ratios from the projection and the debt schedule.
///
/// Schedule rows without a matching projection period are skipped.
pub fn compute_credit_metrics(
    projection: &OperatingProjection,
    schedule: &[DebtScheduleRow],
) -> Vec<CreditMetricsRow> {
    schedule
        .iter()
        .filter_map(|row| {
            let ops = projection.period(row.period)?;
            Some(CreditMetricsRow {
                period: row.period,
                total_debt_to_ebitda: ratio(row.total_debt, ops.ebitda),
                ebitda_to_interest: ratio(ops.ebitda, row.total_interest),
                ebit_to_interest: ratio(ops.ebit, row.total_interest),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::projection::ProjectionRow;
    use rust_decimal_macros::dec;

    fn ops_row(period: u32, ebitda: Money, ebit: Money) -> ProjectionRow {
        ProjectionRow {
            period,
            revenue: ebitda * dec!(4),
            ebitda,
            depreciation_amortisation: ebitda - ebit,
            ebit,
            nopat: ebit,
            capex: Decimal::ZERO,
            nwc: Decimal::ZERO,
            nwc_change: Decimal::ZERO,
            interest_expense: Decimal::ZERO,
            free_cash_flow: Decimal::ZERO,
        }
    }

    fn debt_row(period: u32, total_debt: Money, total_interest: Money) -> DebtScheduleRow {
        DebtScheduleRow {
            period,
            tranches: vec![],
            total_debt,
            total_interest,
            total_mandatory: Decimal::ZERO,
            total_sweep: Decimal::ZERO,
            free_cash_flow: Decimal::ZERO,
            cash_available_for_sweep: Decimal::ZERO,
            cash_balance: Decimal::ZERO,
            liquidity_shortfall: None,
        }
    }

    #[test]
    fn test_ratios() {
        let projection = OperatingProjection {
            rows: vec![ops_row(0, dec!(100), dec!(100)), ops_row(1, dec!(120), dec!(100))],
        };
        let metrics = compute_credit_metrics(&projection, &[debt_row(1, dec!(480), dec!(40))]);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].total_debt_to_ebitda, Some(dec!(4)));
        assert_eq!(metrics[0].ebitda_to_interest, Some(dec!(3)));
        assert_eq!(metrics[0].ebit_to_interest, Some(dec!(2.5)));
    }

    #[test]
    fn test_zero_interest_gives_none() {
        let projection = OperatingProjection {
            rows: vec![ops_row(0, dec!(100), dec!(90)), ops_row(1, dec!(100), dec!(90))],
        };
        let metrics = compute_credit_metrics(&projection, &[debt_row(1, Decimal::ZERO, Decimal::ZERO)]);
        assert_eq!(metrics[0].total_debt_to_ebitda, Some(Decimal::ZERO));
        assert_eq!(metrics[0].ebitda_to_interest, None);
        assert_eq!(metrics[0].ebit_to_interest, None);
    }

    #[test]
    fn test_zero_ebitda_gives_none() {
        let projection = OperatingProjection {
            rows: vec![ops_row(0, dec!(100), dec!(90)), ops_row(1, Decimal::ZERO, dec!(-10))],
        };
        let metrics = compute_credit_metrics(&projection, &[debt_row(1, dec!(300), dec!(20))]);
        assert_eq!(metrics[0].total_debt_to_ebitda, None);
        assert_eq!(metrics[0].ebitda_to_interest, Some(Decimal::ZERO));
    }
}

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::{LboError, OrOverflow};
use crate::types::{Money, Multiple, Rate};
use crate::LboResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const ROOT_TOLERANCE: Decimal = dec!(0.000000000000000001);
const MAX_IRR_ITERATIONS: u32 = 100;

/// Compute `base^periods` by iterative multiplication (avoids powd drift on
/// integer exponents). Overflow is a `DegenerateInput` error.
pub fn compound_factor(base: Decimal, periods: u32) -> LboResult<Decimal> {
    let mut factor = Decimal::ONE;
    for _ in 0..periods {
        factor = factor
            .checked_mul(base)
            .or_overflow(&format!("compound factor {base}^{periods}"))?;
    }
    Ok(factor)
}

/// Net Present Value of a series of annual, end-of-period cash flows
pub fn npv(rate: Rate, cash_flows: &[Money]) -> LboResult<Money> {
    if rate <= dec!(-1) {
        return Err(LboError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }

    let mut result = Decimal::ZERO;
    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        let context = || format!("NPV at rate {rate}, period {t}");
        if t > 0 {
            discount = discount.checked_mul(one_plus_r).or_overflow(&context())?;
        }
        if discount.is_zero() {
            return Err(LboError::DegenerateInput {
                context: format!("NPV discount factor at period {t}"),
            });
        }
        let pv = cf.checked_div(discount).or_overflow(&context())?;
        result = result.checked_add(pv).or_overflow(&context())?;
    }

    Ok(result)
}

/// Internal Rate of Return using Newton-Raphson on the NPV function.
///
/// Used whenever the equity cash flows include interim distributions; the
/// single-inflow/single-outflow case uses [`annualised_return`] instead.
pub fn irr(cash_flows: &[Money], guess: Rate) -> LboResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(LboError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }
    let has_outflow = cash_flows.iter().any(|cf| cf.is_sign_negative());
    let has_inflow = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    if !has_outflow || !has_inflow {
        return Err(LboError::DegenerateInput {
            context: "IRR requires at least one negative and one positive cash flow".into(),
        });
    }

    let mut rate = guess;

    for i in 0..MAX_IRR_ITERATIONS {
        let mut npv_val = Decimal::ZERO;
        let mut dnpv = Decimal::ZERO;
        let one_plus_r = Decimal::ONE + rate;
        let mut discount = Decimal::ONE;

        let context = format!("IRR iteration {i} at rate {rate}");
        for (t, cf) in cash_flows.iter().enumerate() {
            if t > 0 {
                discount = discount.checked_mul(one_plus_r).or_overflow(&context)?;
            }
            if discount.is_zero() {
                continue;
            }
            let pv = cf.checked_div(discount).or_overflow(&context)?;
            npv_val = npv_val.checked_add(pv).or_overflow(&context)?;
            if t > 0 {
                let t_dec = Decimal::from(t as u64);
                let slope = t_dec
                    .checked_mul(pv)
                    .and_then(|x| x.checked_div(one_plus_r))
                    .or_overflow(&context)?;
                dnpv = dnpv.checked_sub(slope).or_overflow(&context)?;
            }
        }

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }

        if dnpv.is_zero() {
            return Err(LboError::ConvergenceFailure {
                function: "IRR".into(),
                iterations: i,
                last_delta: npv_val,
            });
        }

        rate = npv_val
            .checked_div(dnpv)
            .and_then(|step| rate.checked_sub(step))
            .or_overflow(&context)?;

        // Guard against divergence
        if rate < dec!(-0.99) {
            rate = dec!(-0.99);
        } else if rate > dec!(100.0) {
            rate = dec!(100.0);
        }
    }

    Err(LboError::ConvergenceFailure {
        function: "IRR".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta: npv(rate, cash_flows).unwrap_or(Decimal::MAX),
    })
}

/// Closed-form annualised return for a single inflow at period 0 and a
/// single distribution at `periods`: `multiple^(1/periods) - 1`.
///
/// The root is seeded with `powd` and polished with Newton steps on
/// `x^n - multiple` so that `(1 + r)^n` reproduces the multiple to
/// full decimal precision.
pub fn annualised_return(multiple: Multiple, periods: u32) -> LboResult<Rate> {
    if periods == 0 {
        return Err(LboError::invalid(
            "holding_periods",
            "Holding period must be at least 1",
        ));
    }
    if multiple <= Decimal::ZERO {
        return Err(LboError::DegenerateInput {
            context: format!("annualised return of non-positive multiple {multiple}"),
        });
    }
    if periods == 1 {
        return Ok(multiple - Decimal::ONE);
    }

    let n = Decimal::from(periods);
    let mut root = multiple
        .checked_powd(Decimal::ONE / n)
        .filter(|r| *r > Decimal::ZERO)
        .unwrap_or_else(|| multiple.max(Decimal::ONE));

    for i in 0..MAX_IRR_ITERATIONS {
        let upper = compound_factor(root, periods - 1)?;
        let context = format!("annualised return of {multiple} over {periods} periods");
        let value = upper
            .checked_mul(root)
            .and_then(|v| v.checked_sub(multiple))
            .or_overflow(&context)?;
        let slope = n.checked_mul(upper).or_overflow(&context)?;
        if slope.is_zero() {
            return Err(LboError::ConvergenceFailure {
                function: "annualised_return".into(),
                iterations: i,
                last_delta: value,
            });
        }
        let step = value / slope;
        root -= step;
        if step.abs() < ROOT_TOLERANCE {
            return Ok(root - Decimal::ONE);
        }
    }

    Err(LboError::ConvergenceFailure {
        function: "annualised_return".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta: compound_factor(root, periods)? - multiple,
    })
}

use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use lbo_engine_core::pe::debt_schedule::{self, DebtSimulationInput};
use lbo_engine_core::pe::lbo::{self, LboInput};
use lbo_engine_core::pe::returns::{self, ExitAssumption, ReturnsInput};
use lbo_engine_core::pe::sources_uses::{self, TransactionInputs};
use lbo_engine_core::pe::waterfall::{self, WaterfallInput};

use crate::input;

/// Arguments for the full LBO pipeline
#[derive(Args)]
pub struct RunArgs {
    /// Path to a JSON or YAML deal file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_pipeline(args: RunArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let deal: LboInput = input::read_request(args.input.as_deref(), "the LBO pipeline")?;
    let result = lbo::run_lbo(&deal)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for transaction sizing
#[derive(Args)]
pub struct SizeArgs {
    /// Path to a JSON or YAML file with transaction inputs
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_size(args: SizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let transaction: TransactionInputs =
        input::read_request(args.input.as_deref(), "transaction sizing")?;
    let result = sources_uses::size_transaction(&transaction)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for a standalone debt schedule
#[derive(Args)]
pub struct DebtScheduleArgs {
    /// Path to a JSON or YAML file with resolved tranches and operating assumptions
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_debt_schedule(args: DebtScheduleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let simulation: DebtSimulationInput =
        input::read_request(args.input.as_deref(), "the debt schedule")?;
    let result = debt_schedule::simulate_debt(&simulation)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for exit valuation and sponsor returns
#[derive(Args)]
pub struct ReturnsArgs {
    /// Path to JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// EBITDA in the exit period
    #[arg(long)]
    pub exit_ebitda: Option<Decimal>,

    /// EV / EBITDA multiple at exit
    #[arg(long)]
    pub exit_multiple: Option<Decimal>,

    /// Debt outstanding at exit
    #[arg(long, default_value = "0")]
    pub ending_debt: Decimal,

    /// Sponsor equity contributed at entry
    #[arg(long)]
    pub equity: Option<Decimal>,

    /// Holding period in years
    #[arg(long)]
    pub periods: Option<u32>,

    /// Interim distributions per period (comma-separated, e.g. "0,25,25")
    #[arg(long, value_delimiter = ',')]
    pub distributions: Option<Vec<Decimal>>,
}

pub fn run_returns(args: ReturnsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let has_flags = args.exit_ebitda.is_some() || args.exit_multiple.is_some();
    let returns_input: ReturnsInput = if args.input.is_some() || !has_flags {
        input::read_request(args.input.as_deref(), "returns")?
    } else {
        let exit_ebitda = args
            .exit_ebitda
            .ok_or("--exit-ebitda is required (or provide --input)")?;
        let exit_multiple = args
            .exit_multiple
            .ok_or("--exit-multiple is required (or provide --input)")?;
        let equity = args
            .equity
            .ok_or("--equity is required (or provide --input)")?;
        let periods = args
            .periods
            .ok_or("--periods is required (or provide --input)")?;

        ReturnsInput {
            exit: ExitAssumption::Multiple { exit_multiple },
            exit_ebitda,
            exit_free_cash_flow: Decimal::ZERO,
            ending_debt: args.ending_debt,
            equity_contribution: equity,
            holding_periods: periods,
            interim_distributions: args.distributions.unwrap_or_default(),
        }
    };

    let result = returns::compute_returns(&returns_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for the distribution waterfall
#[derive(Args)]
pub struct WaterfallArgs {
    /// Path to a JSON or YAML waterfall file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_waterfall(args: WaterfallArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let wf_input: WaterfallInput = input::read_request(args.input.as_deref(), "the waterfall")?;
    let result = waterfall::allocate_waterfall(&wf_input)?;
    Ok(serde_json::to_value(result)?)
}

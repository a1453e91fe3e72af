mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::lbo::{DebtScheduleArgs, ReturnsArgs, RunArgs, SizeArgs, WaterfallArgs};
use commands::scenarios::{MonteCarloArgs, ScenarioArgs, SensitivityArgs, TornadoArgs};

/// Leveraged buyout modelling with decimal precision
#[derive(Parser)]
#[command(
    name = "lbo",
    version,
    about = "Leveraged buyout modelling with decimal precision",
    long_about = "A CLI for sizing, simulating and stress-testing leveraged buyouts. \
                  Runs the full pipeline from sources & uses through the debt schedule, \
                  sponsor returns and the distribution waterfall, plus sensitivity grids, \
                  tornado charts, scenarios and Monte Carlo over any pipeline input."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full LBO pipeline
    Run(RunArgs),
    /// Size the transaction (purchase price, debt, equity)
    Size(SizeArgs),
    /// Simulate the debt schedule against an operating projection
    DebtSchedule(DebtScheduleArgs),
    /// Exit valuation, MOIC and IRR
    Returns(ReturnsArgs),
    /// Four-tier LP/GP distribution waterfall
    Waterfall(WaterfallArgs),
    /// One- or two-way sensitivity over pipeline inputs
    Sensitivity(SensitivityArgs),
    /// Tornado chart: one variable at a time between low and high
    Tornado(TornadoArgs),
    /// Probability-weighted bear/base/bull scenarios
    Scenarios(ScenarioArgs),
    /// Monte Carlo over uniformly sampled inputs
    MonteCarlo(MonteCarloArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Run(args) => commands::lbo::run_pipeline(args),
        Commands::Size(args) => commands::lbo::run_size(args),
        Commands::DebtSchedule(args) => commands::lbo::run_debt_schedule(args),
        Commands::Returns(args) => commands::lbo::run_returns(args),
        Commands::Waterfall(args) => commands::lbo::run_waterfall(args),
        Commands::Sensitivity(args) => commands::scenarios::run_sensitivity(args),
        Commands::Tornado(args) => commands::scenarios::run_tornado(args),
        Commands::Scenarios(args) => commands::scenarios::run_scenarios(args),
        Commands::MonteCarlo(args) => commands::scenarios::run_monte_carlo(args),
        Commands::Version => {
            println!("lbo {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

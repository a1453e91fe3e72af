use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use lbo_engine_core::pe::lbo::LboInput;
use lbo_engine_core::scenarios::monte_carlo::{self, MonteCarloInput};
use lbo_engine_core::scenarios::scenario::{self, NamedScenario};
use lbo_engine_core::scenarios::sensitivity::{self, AxisSpec, Execution};
use lbo_engine_core::scenarios::tornado::{self, TornadoRange};
use lbo_engine_core::scenarios::variables::{base_variables, lbo_metric_fn, LboMetric, VariableMap};
use lbo_engine_core::SensitivityVariable;

use crate::input;

fn default_metric() -> LboMetric {
    LboMetric::Irr
}

/// Base map for a run: explicit values from the request, otherwise the
/// deal's own values for every variable the analysis touches.
fn resolve_base_vars(
    base: &LboInput,
    explicit: Option<VariableMap>,
    names: &[&str],
) -> Result<VariableMap, Box<dyn std::error::Error>> {
    match explicit {
        Some(vars) => Ok(vars),
        None => Ok(base_variables(base, names)?),
    }
}

fn parse_sens_var(spec: &str) -> Result<SensitivityVariable, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 4 {
        return Err(format!(
            "Sensitivity variable must be name:min:max:step, got '{}'",
            spec
        )
        .into());
    }
    Ok(SensitivityVariable {
        name: parts[0].to_string(),
        min: parts[1].parse()?,
        max: parts[2].parse()?,
        step: parts[3].parse()?,
    })
}

fn execution_flag(parallel: bool, requested: Execution) -> Execution {
    if parallel {
        Execution::Parallel
    } else {
        requested
    }
}

// ---------------------------------------------------------------------------
// Sensitivity
// ---------------------------------------------------------------------------

/// Arguments for one- and two-way sensitivity
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to a JSON or YAML sensitivity request
    #[arg(long)]
    pub input: Option<String>,

    /// Output metric: irr, moic, exit_equity, exit_leverage, lp_total, gp_total
    #[arg(long)]
    pub metric: Option<LboMetric>,

    /// First variable in format name:min:max:step
    /// (e.g. "exit_multiple:8:12:1")
    #[arg(long)]
    pub var1: Option<String>,

    /// Second variable (optional, creates a 2D grid)
    #[arg(long)]
    pub var2: Option<String>,

    /// Evaluate cells on the rayon thread pool
    #[arg(long)]
    pub parallel: bool,
}

#[derive(Debug, Deserialize)]
struct SensitivityRequest {
    base: LboInput,
    #[serde(default = "default_metric")]
    metric: LboMetric,
    #[serde(default)]
    axis_a: Option<AxisSpec>,
    #[serde(default)]
    axis_b: Option<AxisSpec>,
    #[serde(default)]
    base_variables: Option<VariableMap>,
    #[serde(default)]
    execution: Execution,
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: SensitivityRequest =
        input::read_request(args.input.as_deref(), "sensitivity analysis")?;

    let axis_a = match args.var1.as_deref() {
        Some(spec) => AxisSpec::Range(parse_sens_var(spec)?),
        None => request
            .axis_a
            .ok_or("--var1 or axis_a in the request is required")?,
    }
    .resolve()?;
    let axis_b = match args.var2.as_deref() {
        Some(spec) => Some(AxisSpec::Range(parse_sens_var(spec)?)),
        None => request.axis_b,
    }
    .map(|spec| spec.resolve())
    .transpose()?;

    let metric = args.metric.unwrap_or(request.metric);
    let execution = execution_flag(args.parallel, request.execution);

    let mut names = vec![axis_a.name.as_str()];
    if let Some(ref b) = axis_b {
        names.push(b.name.as_str());
    }
    let base_vars = resolve_base_vars(&request.base, request.base_variables, &names)?;
    let metric_fn = lbo_metric_fn(&request.base, metric);

    match axis_b {
        Some(axis_b) => {
            let result =
                sensitivity::evaluate_grid(&metric_fn, &base_vars, &axis_a, &axis_b, execution)?;
            Ok(serde_json::to_value(result)?)
        }
        None => {
            let result = sensitivity::evaluate_sweep(&metric_fn, &base_vars, &axis_a, execution)?;
            Ok(serde_json::to_value(result)?)
        }
    }
}

// ---------------------------------------------------------------------------
// Tornado
// ---------------------------------------------------------------------------

/// Arguments for a tornado chart
#[derive(Args)]
pub struct TornadoArgs {
    /// Path to a JSON or YAML tornado request
    #[arg(long)]
    pub input: Option<String>,

    /// Output metric (overrides the request)
    #[arg(long)]
    pub metric: Option<LboMetric>,
}

#[derive(Debug, Deserialize)]
struct TornadoRequest {
    base: LboInput,
    #[serde(default = "default_metric")]
    metric: LboMetric,
    ranges: Vec<TornadoRange>,
    #[serde(default)]
    base_variables: Option<VariableMap>,
}

pub fn run_tornado(args: TornadoArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: TornadoRequest = input::read_request(args.input.as_deref(), "tornado analysis")?;
    let metric = args.metric.unwrap_or(request.metric);

    let names: Vec<&str> = request.ranges.iter().map(|r| r.name.as_str()).collect();
    let base_vars = resolve_base_vars(&request.base, request.base_variables.clone(), &names)?;
    let metric_fn = lbo_metric_fn(&request.base, metric);

    let result = tornado::evaluate_tornado(&metric_fn, &base_vars, &request.ranges)?;
    Ok(serde_json::to_value(result)?)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Arguments for bear/base/bull scenario analysis
#[derive(Args)]
pub struct ScenarioArgs {
    /// Path to a JSON or YAML scenario request
    #[arg(long)]
    pub input: Option<String>,

    /// Output metric (overrides the request)
    #[arg(long)]
    pub metric: Option<LboMetric>,
}

#[derive(Debug, Deserialize)]
struct ScenarioRequest {
    base: LboInput,
    #[serde(default = "default_metric")]
    metric: LboMetric,
    scenarios: Vec<NamedScenario>,
}

pub fn run_scenarios(args: ScenarioArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ScenarioRequest =
        input::read_request(args.input.as_deref(), "scenario analysis")?;
    let metric = args.metric.unwrap_or(request.metric);
    let metric_fn = lbo_metric_fn(&request.base, metric);

    let result =
        scenario::evaluate_scenarios(&metric_fn, &VariableMap::new(), &request.scenarios)?;
    Ok(serde_json::to_value(result)?)
}

// ---------------------------------------------------------------------------
// Monte Carlo
// ---------------------------------------------------------------------------

/// Arguments for Monte Carlo simulation
#[derive(Args)]
pub struct MonteCarloArgs {
    /// Path to a JSON or YAML Monte Carlo request
    #[arg(long)]
    pub input: Option<String>,

    /// Output metric (overrides the request)
    #[arg(long)]
    pub metric: Option<LboMetric>,

    /// Number of simulated paths (overrides the request)
    #[arg(long)]
    pub simulations: Option<u32>,

    /// RNG seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Evaluate paths on the rayon thread pool
    #[arg(long)]
    pub parallel: bool,
}

#[derive(Debug, Deserialize)]
struct MonteCarloRequest {
    base: LboInput,
    #[serde(default = "default_metric")]
    metric: LboMetric,
    simulation: MonteCarloInput,
}

pub fn run_monte_carlo(args: MonteCarloArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: MonteCarloRequest =
        input::read_request(args.input.as_deref(), "Monte Carlo simulation")?;
    let metric = args.metric.unwrap_or(request.metric);

    let mut simulation = request.simulation;
    if let Some(n) = args.simulations {
        simulation.num_simulations = n;
    }
    if args.seed.is_some() {
        simulation.seed = args.seed;
    }
    simulation.execution = execution_flag(args.parallel, simulation.execution);

    let metric_fn = lbo_metric_fn(&request.base, metric);
    let result = monte_carlo::run_monte_carlo(&metric_fn, &VariableMap::new(), &simulation)?;
    Ok(serde_json::to_value(result)?)
}

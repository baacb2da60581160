mod aggregate;
mod crisis;
mod engine;
mod monte_carlo;
mod quantiles;
mod returns;
mod solver;
mod tax;
mod types;

pub use aggregate::{build_summary, build_yearly_table, retirement_index};
pub use crisis::{CrisisOverlay, RecoveryEntry, RecoverySchedule, clamp_drawdown};
pub use engine::{
    ScenarioContext, run_deterministic_path, run_stochastic_path, simulate_scenario,
    standard_normal,
};
pub use monte_carlo::{MAX_RUNS, run_monte_carlo};
pub use quantiles::{DEFAULT_QUANTILES, column_quantiles, quantile};
pub use returns::{CpiTimeline, cpi_at_retirement, monthly_log_mean, monthly_rate};
pub use solver::{
    DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, DEFAULT_UPPER_BOUND, PayoutMode, SavingsSearch,
    SearchIteration, SearchResult, TargetMode, find_required_savings,
};
pub use tax::{WithdrawalOutcome, apply_withdrawal, gain_ratio};
pub use types::{
    CrisisConfig, DeterministicResult, MonteCarloConfig, MonteCarloResult, QuantilePoint,
    QuantileSet, RecoveryProfile, Scenario, SimulationResult, SummaryMetrics, SummaryQuantiles,
    TimelineQuantiles, TimelineRow, WithdrawalMode, YearlyQuantiles, YearlyRow,
};

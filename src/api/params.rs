use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    CrisisConfig, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, DEFAULT_UPPER_BOUND,
    MonteCarloConfig, PayoutMode, RecoveryProfile, SavingsSearch, Scenario, TargetMode,
    WithdrawalMode,
};

pub const MIN_MONTE_CARLO_RUNS: u32 = 50;
pub const MAX_MONTE_CARLO_RUNS: u32 = 500;
pub const MAX_SOLVER_ITERATIONS: u32 = 200;
pub const MAX_AGE: u32 = 120;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliWithdrawalMode {
    Off,
    InterestOnly,
    TargetNet,
}

impl From<CliWithdrawalMode> for WithdrawalMode {
    fn from(value: CliWithdrawalMode) -> Self {
        match value {
            CliWithdrawalMode::Off => WithdrawalMode::Off,
            CliWithdrawalMode::InterestOnly => WithdrawalMode::InterestOnly,
            CliWithdrawalMode::TargetNet => WithdrawalMode::TargetNet,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiWithdrawalMode {
    Off,
    #[serde(alias = "interest-only", alias = "interest_only")]
    InterestOnly,
    #[serde(alias = "target-net", alias = "target_net")]
    TargetNet,
}

impl From<ApiWithdrawalMode> for CliWithdrawalMode {
    fn from(value: ApiWithdrawalMode) -> Self {
        match value {
            ApiWithdrawalMode::Off => CliWithdrawalMode::Off,
            ApiWithdrawalMode::InterestOnly => CliWithdrawalMode::InterestOnly,
            ApiWithdrawalMode::TargetNet => CliWithdrawalMode::TargetNet,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiTargetMode {
    Nominal,
    Real,
}

impl From<ApiTargetMode> for TargetMode {
    fn from(value: ApiTargetMode) -> Self {
        match value {
            ApiTargetMode::Nominal => TargetMode::Nominal,
            ApiTargetMode::Real => TargetMode::Real,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiPayoutMode {
    Forever,
    #[serde(alias = "until-age", alias = "until_age")]
    UntilAge,
}

impl From<ApiPayoutMode> for PayoutMode {
    fn from(value: ApiPayoutMode) -> Self {
        match value {
            ApiPayoutMode::Forever => PayoutMode::Forever,
            ApiPayoutMode::UntilAge => PayoutMode::UntilAge,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sparplan",
    about = "Monthly savings plan projection with taxes, inflation, crisis and Monte Carlo"
)]
pub struct Cli {
    #[arg(long, default_value_t = 50_000.0, help = "Starting portfolio value")]
    pub start_capital: f64,
    #[arg(
        long,
        default_value_t = 6.5,
        help = "Expected annual return before retirement in percent"
    )]
    pub annual_return_pre: f64,
    #[arg(
        long,
        help = "Expected annual return after retirement in percent, defaults to the pre-retirement return"
    )]
    pub annual_return_post: Option<f64>,
    #[arg(long, default_value_t = 2.0, help = "Annual inflation in percent")]
    pub inflation: f64,
    #[arg(long, default_value_t = 500.0)]
    pub monthly_savings: f64,
    #[arg(long, default_value_t = 30)]
    pub current_age: u32,
    #[arg(long, default_value_t = 67)]
    pub retirement_age: u32,
    #[arg(long, default_value_t = 95, help = "Age the projection runs to")]
    pub max_age: u32,
    #[arg(
        long,
        default_value_t = 20.0,
        help = "Share of the starting capital that is unrealized gain, in percent"
    )]
    pub start_gain_pct: f64,
    #[arg(
        long,
        default_value_t = 26.375,
        help = "Tax rate on realized gains in percent"
    )]
    pub tax_rate: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Yearly increase of the monthly savings amount in percent"
    )]
    pub savings_increase_pct: f64,
    #[arg(long, help = "Upper limit for the escalated monthly savings")]
    pub savings_cap: Option<f64>,
    #[arg(long, help = "Stop contributing after this many years")]
    pub stop_investing_after_years: Option<f64>,
    #[arg(long, value_enum, default_value_t = CliWithdrawalMode::Off)]
    pub withdrawal_mode: CliWithdrawalMode,
    #[arg(
        long,
        default_value_t = 1_500.0,
        help = "Net monthly withdrawal when --withdrawal-mode=target-net"
    )]
    pub target_net_withdrawal: f64,
    #[arg(long, help = "Run Monte Carlo paths alongside the deterministic projection")]
    pub monte_carlo: bool,
    #[arg(long, default_value_t = 100)]
    pub mc_runs: u32,
    #[arg(
        long,
        default_value_t = 15.0,
        help = "Annual return volatility in percent"
    )]
    pub sigma: f64,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    #[arg(long, help = "Inject a 12-month market crisis")]
    pub crisis: bool,
    #[arg(long, default_value_t = 20.0, help = "Years until the crisis starts")]
    pub crisis_after_years: f64,
    #[arg(
        long,
        default_value_t = 40.0,
        help = "Peak-to-trough crisis drawdown in percent"
    )]
    pub crisis_drawdown: f64,
    #[arg(
        long,
        default_value = "typical",
        help = "Recovery after the crisis: off, fast, typical, gfc or lost-decade"
    )]
    pub recovery_profile: String,
}

/// Query or JSON body of `/api/simulate`. Present fields overlay the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulatePayload {
    pub start_capital: Option<f64>,
    pub annual_return_pre: Option<f64>,
    pub annual_return_post: Option<f64>,
    #[serde(alias = "inflationAnnual")]
    pub inflation: Option<f64>,
    pub monthly_savings: Option<f64>,
    pub current_age: Option<u32>,
    pub retirement_age: Option<u32>,
    pub max_age: Option<u32>,
    #[serde(alias = "startUnrealizedGainPct")]
    pub start_gain_pct: Option<f64>,
    pub tax_rate: Option<f64>,
    #[serde(alias = "savingsIncreaseAnnualPct")]
    pub savings_increase_pct: Option<f64>,
    pub savings_cap: Option<f64>,
    pub stop_investing_after_years: Option<f64>,
    pub withdrawal_mode: Option<ApiWithdrawalMode>,
    pub target_net_withdrawal: Option<f64>,

    #[serde(alias = "mcEnabled")]
    pub monte_carlo: Option<bool>,
    pub mc_runs: Option<u32>,
    #[serde(alias = "sigmaAnnual")]
    pub sigma: Option<f64>,
    pub seed: Option<u64>,

    #[serde(alias = "crisisEnabled")]
    pub crisis: Option<bool>,
    pub crisis_after_years: Option<f64>,
    #[serde(alias = "crisisMaxDrawdown")]
    pub crisis_drawdown: Option<f64>,
    pub recovery_profile: Option<String>,
}

/// Solver-specific fields of `/api/solve`; the scenario fields come from a
/// `SimulatePayload` read from the same request.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SolvePayload {
    pub target_net_monthly: Option<f64>,
    pub target_mode: Option<ApiTargetMode>,
    pub payout_mode: Option<ApiPayoutMode>,
    pub end_age: Option<u32>,
    pub upper_bound: Option<f64>,
    pub tolerance: Option<f64>,
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    pub target_net_monthly: f64,
    pub target_mode: TargetMode,
    pub payout_mode: PayoutMode,
    pub end_age: u32,
    pub upper_bound: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            target_net_monthly: 2_500.0,
            target_mode: TargetMode::Nominal,
            payout_mode: PayoutMode::Forever,
            end_age: 100,
            upper_bound: DEFAULT_UPPER_BOUND,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("current age ({current}) must be less than retirement age ({retirement})")]
    RetirementNotAfterCurrent { current: u32, retirement: u32 },
    #[error("max age ({max}) must be greater than retirement age ({retirement})")]
    HorizonEndsBeforeRetirement { retirement: u32, max: u32 },
    #[error("max age must be at most 120, got {0}")]
    MaxAgeTooHigh(u32),
    #[error("{field} must be greater than -100%, got {value}")]
    ReturnAtOrBelowTotalLoss { field: &'static str, value: f64 },
    #[error("savings increase must be greater than -100%, got {0}")]
    SavingsIncreaseTooLow(f64),
    #[error("unrealized gain percentage must be between 0 and 100, got {0}")]
    GainOutOfRange(f64),
    #[error("tax rate must be between 0 and 100%, got {0}")]
    TaxRateOutOfRange(f64),
    #[error("savings cap ({cap}) must be greater than or equal to starting monthly savings ({savings})")]
    SavingsCapBelowSavings { cap: f64, savings: f64 },
    #[error("stop investing after years must be zero or greater, got {0}")]
    NegativeStopYears(f64),
    #[error("Monte Carlo runs must be between 50 and 500, got {0}")]
    MonteCarloRunsOutOfRange(u32),
    #[error("target net withdrawal must be zero or greater, got {0}")]
    NegativeTargetWithdrawal(f64),
    #[error("volatility must be zero or greater, got {0}")]
    NegativeVolatility(f64),
    #[error("crisis drawdown must be between 0 and 100, got {0}")]
    DrawdownOutOfRange(f64),
    #[error("start capital must be zero or greater, got {0}")]
    NegativeStartCapital(f64),
    #[error("monthly savings must be zero or greater, got {0}")]
    NegativeMonthlySavings(f64),
    #[error("target net monthly income must be zero or greater, got {0}")]
    NegativeSolveTarget(f64),
    #[error("end age ({end}) must be greater than retirement age ({retirement})")]
    EndAgeNotAfterRetirement { retirement: u32, end: u32 },
    #[error("end age must be at most 120, got {0}")]
    EndAgeTooHigh(u32),
    #[error("upper bound must be greater than 0, got {0}")]
    NonPositiveUpperBound(f64),
    #[error("tolerance must be greater than 0, got {0}")]
    NonPositiveTolerance(f64),
    #[error("max iterations must be between 1 and 200, got {0}")]
    MaxIterationsOutOfRange(u32),
}

/// Result of checking a scenario: blocking errors plus advisory warnings.
#[derive(Debug, Default)]
pub struct Validation {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug)]
pub struct ValidatedScenario {
    pub scenario: Scenario,
    pub warnings: Vec<String>,
}

fn check_finite(cli: &Cli, errors: &mut Vec<ValidationError>) {
    let fields = [
        ("start capital", Some(cli.start_capital)),
        ("annual return", Some(cli.annual_return_pre)),
        ("post-retirement return", cli.annual_return_post),
        ("inflation", Some(cli.inflation)),
        ("monthly savings", Some(cli.monthly_savings)),
        ("unrealized gain percentage", Some(cli.start_gain_pct)),
        ("tax rate", Some(cli.tax_rate)),
        ("savings increase", Some(cli.savings_increase_pct)),
        ("savings cap", cli.savings_cap),
        ("stop investing after years", cli.stop_investing_after_years),
        ("target net withdrawal", Some(cli.target_net_withdrawal)),
        ("volatility", Some(cli.sigma)),
        ("crisis start", Some(cli.crisis_after_years)),
        ("crisis drawdown", Some(cli.crisis_drawdown)),
    ];
    for (field, value) in fields {
        if value.is_some_and(|v| !v.is_finite()) {
            errors.push(ValidationError::NotFinite { field });
        }
    }
}

pub fn validate(cli: &Cli) -> Validation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_finite(cli, &mut errors);

    if cli.current_age >= cli.retirement_age {
        errors.push(ValidationError::RetirementNotAfterCurrent {
            current: cli.current_age,
            retirement: cli.retirement_age,
        });
    }
    if cli.retirement_age >= cli.max_age {
        errors.push(ValidationError::HorizonEndsBeforeRetirement {
            retirement: cli.retirement_age,
            max: cli.max_age,
        });
    }
    if cli.max_age > MAX_AGE {
        errors.push(ValidationError::MaxAgeTooHigh(cli.max_age));
    }
    if cli.annual_return_pre <= -100.0 {
        errors.push(ValidationError::ReturnAtOrBelowTotalLoss {
            field: "annual return",
            value: cli.annual_return_pre,
        });
    }
    if let Some(value) = cli.annual_return_post.filter(|&r| r <= -100.0) {
        errors.push(ValidationError::ReturnAtOrBelowTotalLoss {
            field: "post-retirement return",
            value,
        });
    }
    if cli.savings_increase_pct <= -100.0 {
        errors.push(ValidationError::SavingsIncreaseTooLow(
            cli.savings_increase_pct,
        ));
    }
    if !(0.0..=100.0).contains(&cli.start_gain_pct) {
        errors.push(ValidationError::GainOutOfRange(cli.start_gain_pct));
    }
    if !(0.0..=100.0).contains(&cli.tax_rate) {
        errors.push(ValidationError::TaxRateOutOfRange(cli.tax_rate));
    }
    if let Some(cap) = cli.savings_cap.filter(|&cap| cap < cli.monthly_savings) {
        errors.push(ValidationError::SavingsCapBelowSavings {
            cap,
            savings: cli.monthly_savings,
        });
    }
    if let Some(years) = cli.stop_investing_after_years.filter(|&years| years < 0.0) {
        errors.push(ValidationError::NegativeStopYears(years));
    }
    if cli.monte_carlo
        && !(MIN_MONTE_CARLO_RUNS..=MAX_MONTE_CARLO_RUNS).contains(&cli.mc_runs)
    {
        errors.push(ValidationError::MonteCarloRunsOutOfRange(cli.mc_runs));
    }
    if cli.withdrawal_mode == CliWithdrawalMode::TargetNet && cli.target_net_withdrawal < 0.0 {
        errors.push(ValidationError::NegativeTargetWithdrawal(
            cli.target_net_withdrawal,
        ));
    }
    if cli.sigma < 0.0 {
        errors.push(ValidationError::NegativeVolatility(cli.sigma));
    }
    if !(0.0..=100.0).contains(&cli.crisis_drawdown) {
        errors.push(ValidationError::DrawdownOutOfRange(cli.crisis_drawdown));
    }
    if cli.start_capital < 0.0 {
        errors.push(ValidationError::NegativeStartCapital(cli.start_capital));
    }
    if cli.monthly_savings < 0.0 {
        errors.push(ValidationError::NegativeMonthlySavings(cli.monthly_savings));
    }

    if cli.annual_return_pre < 0.0 && cli.annual_return_pre > -100.0 {
        warnings.push("Annual return is negative.".to_string());
    }
    if cli.inflation < 0.0 {
        warnings.push("Inflation is negative.".to_string());
    }
    let horizon_years = cli.max_age.saturating_sub(cli.current_age) as f64;
    if cli.crisis && cli.crisis_after_years > horizon_years {
        warnings.push(
            "Crisis year is beyond the simulation horizon; crisis will be ignored.".to_string(),
        );
    }

    Validation { errors, warnings }
}

/// Validates the flags and converts percentages to fractions.
pub fn build_scenario(cli: &Cli) -> Result<ValidatedScenario, Vec<ValidationError>> {
    let validation = validate(cli);
    if !validation.is_ok() {
        return Err(validation.errors);
    }

    let scenario = Scenario {
        start_capital: cli.start_capital,
        annual_return_pre: cli.annual_return_pre / 100.0,
        annual_return_post: cli.annual_return_post.map(|r| r / 100.0),
        inflation_annual: cli.inflation / 100.0,
        monthly_savings: cli.monthly_savings,
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        max_age: cli.max_age,
        start_gain_fraction: cli.start_gain_pct / 100.0,
        tax_rate: cli.tax_rate / 100.0,
        savings_increase_annual: cli.savings_increase_pct / 100.0,
        savings_cap: cli.savings_cap,
        stop_investing_after_years: cli.stop_investing_after_years,
        withdrawal_mode: cli.withdrawal_mode.into(),
        target_net_withdrawal: cli.target_net_withdrawal,
        monte_carlo: MonteCarloConfig {
            enabled: cli.monte_carlo,
            runs: cli.mc_runs,
            sigma_annual: cli.sigma / 100.0,
            seed: cli.seed,
        },
        crisis: CrisisConfig {
            enabled: cli.crisis,
            after_years: cli.crisis_after_years,
            max_drawdown: cli.crisis_drawdown / 100.0,
            recovery_profile: RecoveryProfile::from_key(&cli.recovery_profile),
        },
    };

    Ok(ValidatedScenario {
        scenario,
        warnings: validation.warnings,
    })
}

pub fn default_cli_for_api() -> Cli {
    Cli {
        start_capital: 50_000.0,
        annual_return_pre: 6.5,
        annual_return_post: None,
        inflation: 2.0,
        monthly_savings: 500.0,
        current_age: 30,
        retirement_age: 67,
        max_age: 95,
        start_gain_pct: 20.0,
        tax_rate: 26.375,
        savings_increase_pct: 0.0,
        savings_cap: None,
        stop_investing_after_years: None,
        withdrawal_mode: CliWithdrawalMode::Off,
        target_net_withdrawal: 1_500.0,
        monte_carlo: false,
        mc_runs: 100,
        sigma: 15.0,
        seed: 42,
        crisis: false,
        crisis_after_years: 20.0,
        crisis_drawdown: 40.0,
        recovery_profile: "typical".to_string(),
    }
}

pub fn cli_from_payload(payload: SimulatePayload) -> Cli {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.start_capital {
        cli.start_capital = v;
    }
    if let Some(v) = payload.annual_return_pre {
        cli.annual_return_pre = v;
    }
    if let Some(v) = payload.annual_return_post {
        cli.annual_return_post = Some(v);
    }
    if let Some(v) = payload.inflation {
        cli.inflation = v;
    }
    if let Some(v) = payload.monthly_savings {
        cli.monthly_savings = v;
    }
    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.max_age {
        cli.max_age = v;
    }
    if let Some(v) = payload.start_gain_pct {
        cli.start_gain_pct = v;
    }
    if let Some(v) = payload.tax_rate {
        cli.tax_rate = v;
    }
    if let Some(v) = payload.savings_increase_pct {
        cli.savings_increase_pct = v;
    }
    if let Some(v) = payload.savings_cap {
        cli.savings_cap = Some(v);
    }
    if let Some(v) = payload.stop_investing_after_years {
        cli.stop_investing_after_years = Some(v);
    }
    if let Some(v) = payload.withdrawal_mode {
        cli.withdrawal_mode = v.into();
    }
    if let Some(v) = payload.target_net_withdrawal {
        cli.target_net_withdrawal = v;
    }

    if let Some(v) = payload.monte_carlo {
        cli.monte_carlo = v;
    }
    if let Some(v) = payload.mc_runs {
        cli.mc_runs = v;
    }
    if let Some(v) = payload.sigma {
        cli.sigma = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }

    if let Some(v) = payload.crisis {
        cli.crisis = v;
    }
    if let Some(v) = payload.crisis_after_years {
        cli.crisis_after_years = v;
    }
    if let Some(v) = payload.crisis_drawdown {
        cli.crisis_drawdown = v;
    }
    if let Some(v) = payload.recovery_profile {
        cli.recovery_profile = v;
    }

    cli
}

pub fn solve_options_from_payload(payload: SolvePayload) -> SolveOptions {
    let defaults = SolveOptions::default();
    SolveOptions {
        target_net_monthly: payload
            .target_net_monthly
            .unwrap_or(defaults.target_net_monthly),
        target_mode: payload.target_mode.map_or(defaults.target_mode, Into::into),
        payout_mode: payload.payout_mode.map_or(defaults.payout_mode, Into::into),
        end_age: payload.end_age.unwrap_or(defaults.end_age),
        upper_bound: payload.upper_bound.unwrap_or(defaults.upper_bound),
        tolerance: payload.tolerance.unwrap_or(defaults.tolerance),
        max_iterations: payload.max_iterations.unwrap_or(defaults.max_iterations),
    }
}

pub fn validate_solve(options: &SolveOptions, scenario: &Scenario) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !options.target_net_monthly.is_finite() {
        errors.push(ValidationError::NotFinite {
            field: "target net monthly income",
        });
    } else if options.target_net_monthly < 0.0 {
        errors.push(ValidationError::NegativeSolveTarget(options.target_net_monthly));
    }
    if options.payout_mode == PayoutMode::UntilAge && options.end_age <= scenario.retirement_age {
        errors.push(ValidationError::EndAgeNotAfterRetirement {
            retirement: scenario.retirement_age,
            end: options.end_age,
        });
    }
    if options.end_age > MAX_AGE {
        errors.push(ValidationError::EndAgeTooHigh(options.end_age));
    }
    if !(options.upper_bound > 0.0 && options.upper_bound.is_finite()) {
        errors.push(ValidationError::NonPositiveUpperBound(options.upper_bound));
    }
    if !(options.tolerance > 0.0 && options.tolerance.is_finite()) {
        errors.push(ValidationError::NonPositiveTolerance(options.tolerance));
    }
    if !(1..=MAX_SOLVER_ITERATIONS).contains(&options.max_iterations) {
        errors.push(ValidationError::MaxIterationsOutOfRange(
            options.max_iterations,
        ));
    }

    errors
}

/// Builds the solver request on top of an already validated scenario.
pub fn build_search(
    scenario: Scenario,
    options: &SolveOptions,
) -> Result<SavingsSearch, Vec<ValidationError>> {
    let errors = validate_solve(options, &scenario);
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut search = SavingsSearch::new(
        scenario,
        options.target_net_monthly,
        options.target_mode,
        options.payout_mode,
        options.end_age,
    );
    search.upper_bound = options.upper_bound;
    search.tolerance = options.tolerance;
    search.max_iterations = options.max_iterations;
    Ok(search)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveDefaults {
    pub target_net_monthly: f64,
    pub target_mode: TargetMode,
    pub payout_mode: PayoutMode,
    pub end_age: u32,
    pub upper_bound: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl From<SolveOptions> for SolveDefaults {
    fn from(value: SolveOptions) -> Self {
        Self {
            target_net_monthly: value.target_net_monthly,
            target_mode: value.target_mode,
            payout_mode: value.payout_mode,
            end_age: value.end_age,
            upper_bound: value.upper_bound,
            tolerance: value.tolerance,
            max_iterations: value.max_iterations,
        }
    }
}

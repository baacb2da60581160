use std::f64::consts::PI;

use rand::Rng;
use tracing::debug;

use super::aggregate::{build_summary, build_yearly_table};
use super::crisis::{CrisisOverlay, RecoveryEntry, RecoverySchedule};
use super::monte_carlo::run_monte_carlo;
use super::returns::{CpiTimeline, monthly_rate};
use super::tax::{apply_withdrawal, gain_ratio};
use super::types::{DeterministicResult, Scenario, SimulationResult, TimelineRow, WithdrawalMode};

/// Values at or below this are treated as an empty portfolio, and it floors
/// the after-tax share when grossing up a net withdrawal.
pub const EPS: f64 = 1e-8;

/// Everything derived from a scenario once, before any path is simulated.
/// Shared read-only by the deterministic path and every Monte Carlo run.
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub months: usize,
    pub cpi: CpiTimeline,
    pub overlay: CrisisOverlay,
    pub recovery: RecoverySchedule,
    pub pre_return: f64,
    pub post_return: f64,
    /// Last month in which contributions are still made, if capped.
    pub stop_month: Option<usize>,
    pub sigma_annual: f64,
}

impl ScenarioContext {
    pub fn new(scenario: &Scenario) -> Self {
        let months = scenario.total_months();
        let stop_month = scenario
            .stop_investing_after_years
            .map(|years| (years * 12.0).round().max(0.0) as usize)
            .filter(|&m| m > 0);

        Self {
            months,
            cpi: CpiTimeline::build(months, scenario.inflation_annual),
            overlay: CrisisOverlay::build(&scenario.crisis, months),
            recovery: RecoverySchedule::build(&scenario.crisis, scenario.annual_return_pre, months),
            pre_return: scenario.annual_return_pre,
            post_return: scenario.post_retirement_return(),
            stop_month,
            sigma_annual: scenario.monte_carlo.sigma_annual.max(0.0),
        }
    }
}

#[derive(Debug)]
struct PathState {
    value: f64,
    basis: f64,
    monthly_savings: f64,
    depleted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct WithdrawalFlow {
    gross: f64,
    net: f64,
    tax: f64,
}

/// Box-Muller over two uniform draws; zero draws are rejected.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let mut u = 0.0;
    while u == 0.0 {
        u = rng.random::<f64>();
    }
    let mut v = 0.0;
    while v == 0.0 {
        v = rng.random::<f64>();
    }
    (-2.0 * u.ln()).sqrt() * (2.0 * PI * v).cos()
}

fn lognormal_monthly_return<R: Rng + ?Sized>(
    expected_monthly: f64,
    sigma_annual: f64,
    rng: &mut R,
) -> f64 {
    let sigma_monthly = sigma_annual / 12.0_f64.sqrt();
    let mu = (1.0 + expected_monthly).ln();
    (mu + standard_normal(rng) * sigma_monthly).exp() - 1.0
}

fn expected_monthly_return(annual_return: f64, recovery: Option<&RecoveryEntry>) -> f64 {
    let base = monthly_rate(annual_return);
    match recovery {
        Some(entry) => base + monthly_rate(entry.premium_annual) * entry.decay,
        None => base,
    }
}

pub fn run_deterministic_path(scenario: &Scenario, ctx: &ScenarioContext) -> Vec<TimelineRow> {
    simulate_path(scenario, ctx, |expected| expected)
}

pub fn run_stochastic_path<R: Rng + ?Sized>(
    scenario: &Scenario,
    ctx: &ScenarioContext,
    rng: &mut R,
) -> Vec<TimelineRow> {
    let sigma = ctx.sigma_annual;
    simulate_path(scenario, ctx, |expected| {
        lognormal_monthly_return(expected, sigma, rng)
    })
}

fn simulate_path<F>(scenario: &Scenario, ctx: &ScenarioContext, mut draw_return: F) -> Vec<TimelineRow>
where
    F: FnMut(f64) -> f64,
{
    let mut state = PathState {
        value: scenario.start_capital,
        basis: scenario.start_capital * (1.0 - scenario.start_gain_fraction),
        monthly_savings: scenario.monthly_savings,
        depleted: false,
    };
    let retirement_age = scenario.retirement_age as f64;
    let current_age = scenario.current_age as f64;

    let mut timeline = Vec::with_capacity(ctx.months + 1);
    timeline.push(TimelineRow {
        month: 0,
        age: current_age,
        cpi: ctx.cpi.at(0),
        value_nominal: state.value,
        value_real: ctx.cpi.deflate(0, state.value),
        basis_nominal: state.basis,
        basis_real: ctx.cpi.deflate(0, state.basis),
        contribution: 0.0,
        withdraw_gross: 0.0,
        withdraw_net: 0.0,
        tax_paid: 0.0,
        return_applied: 0.0,
        is_retired: current_age >= retirement_age,
        is_crisis_month: false,
        is_recovery_month: false,
        is_depleted: false,
    });

    for t in 1..=ctx.months {
        let age = current_age + t as f64 / 12.0;

        if t % 12 == 1 && t > 1 && scenario.savings_increase_annual != 0.0 {
            let increased = state.monthly_savings * (1.0 + scenario.savings_increase_annual);
            state.monthly_savings = match scenario.savings_cap {
                Some(cap) => increased.min(cap),
                None => increased,
            };
        }

        let is_retired = age >= retirement_age;
        let may_contribute = ctx.stop_month.is_none_or(|stop| t <= stop);
        let contribution = if !state.depleted && !is_retired && may_contribute {
            state.monthly_savings
        } else {
            0.0
        };
        state.value += contribution;
        state.basis += contribution;

        let annual_return = if is_retired {
            ctx.post_return
        } else {
            ctx.pre_return
        };
        let recovery = ctx.recovery.entry_at(t);
        let expected = expected_monthly_return(annual_return, recovery);
        let base_return = draw_return(expected);

        let crisis_return = ctx.overlay.return_at(t);
        let return_applied = match crisis_return {
            Some(shock) => (1.0 + base_return) * (1.0 + shock) - 1.0,
            None => base_return,
        };

        let value_before_growth = state.value;
        state.value *= 1.0 + return_applied;

        let mut flow = WithdrawalFlow::default();
        if !state.depleted && is_retired && scenario.withdrawal_mode != WithdrawalMode::Off {
            flow = withdraw(scenario, &mut state, value_before_growth, expected);
        }

        timeline.push(TimelineRow {
            month: t,
            age,
            cpi: ctx.cpi.at(t),
            value_nominal: state.value,
            value_real: ctx.cpi.deflate(t, state.value),
            basis_nominal: state.basis,
            basis_real: ctx.cpi.deflate(t, state.basis),
            contribution,
            withdraw_gross: flow.gross,
            withdraw_net: flow.net,
            tax_paid: flow.tax,
            return_applied,
            is_retired,
            is_crisis_month: crisis_return.is_some(),
            is_recovery_month: recovery.is_some(),
            is_depleted: state.depleted,
        });
    }

    timeline
}

fn withdraw(
    scenario: &Scenario,
    state: &mut PathState,
    value_before_growth: f64,
    expected_monthly: f64,
) -> WithdrawalFlow {
    let gross = match scenario.withdrawal_mode {
        WithdrawalMode::Off => return WithdrawalFlow::default(),
        // Expected rather than realized return, otherwise volatile paths
        // over-withdraw in good months and deplete early.
        WithdrawalMode::InterestOnly => {
            (value_before_growth * expected_monthly).max(0.0).min(state.value)
        }
        WithdrawalMode::TargetNet => {
            let ratio = gain_ratio(state.value, state.basis);
            let after_tax_share = (1.0 - scenario.tax_rate * ratio).max(EPS);
            (scenario.target_net_withdrawal / after_tax_share).min(state.value)
        }
    };

    let outcome = apply_withdrawal(state.value, state.basis, gross, scenario.tax_rate);
    state.value = outcome.value;
    state.basis = outcome.basis;
    if state.value <= EPS && gross > 0.0 {
        state.depleted = true;
    }

    WithdrawalFlow {
        gross,
        net: outcome.net,
        tax: outcome.tax,
    }
}

pub fn simulate_scenario(scenario: &Scenario) -> SimulationResult {
    let ctx = ScenarioContext::new(scenario);
    debug!(
        months = ctx.months,
        crisis = ctx.overlay.is_active(),
        recovery_months = ctx.recovery.len(),
        "simulating scenario"
    );

    let timeline = run_deterministic_path(scenario, &ctx);
    let summary = build_summary(&timeline, scenario);
    let yearly = build_yearly_table(&timeline);

    let monte_carlo = scenario
        .monte_carlo
        .enabled
        .then(|| run_monte_carlo(scenario, &ctx, summary.retirement_index));

    SimulationResult {
        deterministic: DeterministicResult {
            timeline,
            summary,
            yearly,
        },
        monte_carlo,
    }
}

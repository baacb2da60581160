use rand::SeedableRng;
use rand::rngs::SmallRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

use super::aggregate::build_yearly_table;
use super::engine::{ScenarioContext, run_stochastic_path};
use super::quantiles::{DEFAULT_QUANTILES, column_quantiles};
use super::types::{
    MonteCarloResult, QuantileSet, Scenario, SummaryQuantiles, TimelineQuantiles,
    YearlyQuantiles,
};

pub const MAX_RUNS: u32 = 10_000;

/// Per-run columns kept for cross-run quantiles.
struct RunTrace {
    values: Vec<f64>,
    basis: Vec<f64>,
    yearly_ages: Vec<f64>,
    yearly_end_nominal: Vec<f64>,
    yearly_end_real: Vec<f64>,
    yearly_withdraw_net: Vec<f64>,
    yearly_withdraw_net_real: Vec<f64>,
    yearly_tax: Vec<f64>,
}

fn derive_seed(base_seed: u64, run: u32) -> u64 {
    splitmix64(base_seed ^ run as u64)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

fn trace_run(scenario: &Scenario, ctx: &ScenarioContext, run: u32) -> RunTrace {
    let mut rng = SmallRng::seed_from_u64(derive_seed(scenario.monte_carlo.seed, run));
    let path = run_stochastic_path(scenario, ctx, &mut rng);
    let yearly = build_yearly_table(&path);

    RunTrace {
        values: path.iter().map(|row| row.value_nominal).collect(),
        basis: path.iter().map(|row| row.basis_nominal).collect(),
        yearly_ages: yearly.iter().map(|row| row.age).collect(),
        yearly_end_nominal: yearly.iter().map(|row| row.value_nominal).collect(),
        yearly_end_real: yearly.iter().map(|row| row.value_real).collect(),
        yearly_withdraw_net: yearly.iter().map(|row| row.withdraw_net).collect(),
        yearly_withdraw_net_real: yearly.iter().map(|row| row.withdraw_net_real).collect(),
        yearly_tax: yearly.iter().map(|row| row.tax_paid).collect(),
    }
}

fn collect_runs(scenario: &Scenario, ctx: &ScenarioContext, runs: u32) -> Vec<RunTrace> {
    #[cfg(feature = "parallel")]
    {
        (0..runs)
            .into_par_iter()
            .map(|run| trace_run(scenario, ctx, run))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..runs).map(|run| trace_run(scenario, ctx, run)).collect()
    }
}

fn column<F>(traces: &[RunTrace], pick: F) -> Vec<Vec<f64>>
where
    F: Fn(&RunTrace) -> &Vec<f64>,
{
    traces.iter().map(|trace| pick(trace).clone()).collect()
}

/// Runs the stochastic paths and reduces them to per-month and per-year
/// quantiles. Retirement quantiles are read at `retirement_index`, the
/// deterministic path's retirement crossing.
pub fn run_monte_carlo(
    scenario: &Scenario,
    ctx: &ScenarioContext,
    retirement_index: usize,
) -> MonteCarloResult {
    let runs = scenario.monte_carlo.runs.clamp(1, MAX_RUNS);
    debug!(runs, sigma = ctx.sigma_annual, "running monte carlo");

    let traces = collect_runs(scenario, ctx, runs);
    let q = &DEFAULT_QUANTILES;

    let values = column_quantiles(&column(&traces, |t| &t.values), q);
    let basis = column_quantiles(&column(&traces, |t| &t.basis), q);

    // Real quantiles deflate the nominal quantile rather than re-ranking
    // deflated values.
    let quantiles_timeline: Vec<TimelineQuantiles> = values
        .into_iter()
        .zip(basis)
        .enumerate()
        .map(|(t, (nominal, basis_nominal))| {
            let cpi = ctx.cpi.at(t);
            TimelineQuantiles {
                real: nominal.deflate(cpi),
                basis_real: basis_nominal.deflate(cpi),
                nominal,
                basis_nominal,
            }
        })
        .collect();

    let summary_quantiles = quantiles_timeline
        .get(retirement_index)
        .or_else(|| quantiles_timeline.last())
        .map(|point| SummaryQuantiles {
            retirement_nominal: point.nominal.clone(),
            retirement_real: point.real.clone(),
        })
        .unwrap_or(SummaryQuantiles {
            retirement_nominal: QuantileSet::default(),
            retirement_real: QuantileSet::default(),
        });

    let end_nominal = column_quantiles(&column(&traces, |t| &t.yearly_end_nominal), q);
    let end_real = column_quantiles(&column(&traces, |t| &t.yearly_end_real), q);
    let withdraw_net = column_quantiles(&column(&traces, |t| &t.yearly_withdraw_net), q);
    let withdraw_net_real =
        column_quantiles(&column(&traces, |t| &t.yearly_withdraw_net_real), q);
    let tax = column_quantiles(&column(&traces, |t| &t.yearly_tax), q);

    let ages = traces
        .first()
        .map(|trace| trace.yearly_ages.clone())
        .unwrap_or_default();
    let yearly_quantiles = ages
        .into_iter()
        .enumerate()
        .map(|(i, age)| YearlyQuantiles {
            age,
            end_value_nominal: end_nominal[i].clone(),
            end_value_real: end_real[i].clone(),
            withdrawals_net_nominal: withdraw_net[i].clone(),
            withdrawals_net_real: withdraw_net_real[i].clone(),
            tax_paid_nominal: tax[i].clone(),
        })
        .collect();

    MonteCarloResult {
        runs,
        quantiles_timeline,
        summary_quantiles,
        yearly_quantiles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::tests::sample_scenario;
    use crate::core::engine::{run_deterministic_path, simulate_scenario};
    use crate::core::types::WithdrawalMode;

    fn mc_scenario(runs: u32) -> Scenario {
        let mut scenario = sample_scenario();
        scenario.monte_carlo.enabled = true;
        scenario.monte_carlo.runs = runs;
        scenario
    }

    #[test]
    fn timeline_quantiles_cover_every_month() {
        let scenario = mc_scenario(64);
        let ctx = ScenarioContext::new(&scenario);
        let result = run_monte_carlo(&scenario, &ctx, 12);

        assert_eq!(result.runs, 64);
        assert_eq!(result.quantiles_timeline.len(), 61);
        assert_eq!(result.yearly_quantiles.len(), 5);

        let start = &result.quantiles_timeline[0];
        for q in DEFAULT_QUANTILES {
            assert_eq!(start.nominal.get(q), Some(100_000.0));
        }
        for point in &result.quantiles_timeline {
            let p10 = point.nominal.get(0.1).unwrap_or_default();
            let p50 = point.nominal.get(0.5).unwrap_or_default();
            let p90 = point.nominal.get(0.9).unwrap_or_default();
            assert!(p10 <= p50 && p50 <= p90);
        }
        let last = &result.quantiles_timeline[60];
        assert!(last.nominal.get(0.1) < last.nominal.get(0.9));
    }

    #[test]
    fn real_quantiles_are_deflated_nominal_quantiles() {
        let scenario = mc_scenario(50);
        let ctx = ScenarioContext::new(&scenario);
        let result = run_monte_carlo(&scenario, &ctx, 12);

        let point = &result.quantiles_timeline[36];
        let cpi = ctx.cpi.at(36);
        let nominal = point.nominal.get(0.5).unwrap_or_default();
        let real = point.real.get(0.5).unwrap_or_default();
        assert!((real - nominal / cpi).abs() < 1e-9);

        assert_eq!(
            result.summary_quantiles.retirement_nominal,
            result.quantiles_timeline[12].nominal
        );
        assert_eq!(
            result.summary_quantiles.retirement_real,
            result.quantiles_timeline[12].real
        );
    }

    #[test]
    fn results_are_reproducible_for_seed() {
        let scenario = mc_scenario(50);
        let ctx = ScenarioContext::new(&scenario);
        let a = run_monte_carlo(&scenario, &ctx, 12);
        let b = run_monte_carlo(&scenario, &ctx, 12);
        assert_eq!(
            a.quantiles_timeline[60].nominal,
            b.quantiles_timeline[60].nominal
        );

        let mut reseeded = scenario.clone();
        reseeded.monte_carlo.seed = 7;
        let c = run_monte_carlo(&reseeded, &ctx, 12);
        assert_ne!(
            a.quantiles_timeline[60].nominal,
            c.quantiles_timeline[60].nominal
        );
    }

    #[test]
    fn zero_volatility_collapses_quantiles_onto_deterministic_path() {
        let mut scenario = mc_scenario(50);
        scenario.monte_carlo.sigma_annual = 0.0;
        let ctx = ScenarioContext::new(&scenario);
        let det = run_deterministic_path(&scenario, &ctx);
        let result = run_monte_carlo(&scenario, &ctx, 12);

        for (row, point) in det.iter().zip(result.quantiles_timeline.iter()) {
            let p10 = point.nominal.get(0.1).unwrap_or_default();
            let p90 = point.nominal.get(0.9).unwrap_or_default();
            assert!((p10 - row.value_nominal).abs() < 1e-6);
            assert!((p90 - row.value_nominal).abs() < 1e-6);
        }
    }

    #[test]
    fn yearly_quantiles_track_withdrawals_and_tax() {
        let mut scenario = mc_scenario(50);
        scenario.retirement_age = 37;
        scenario.withdrawal_mode = WithdrawalMode::InterestOnly;
        scenario.start_gain_fraction = 0.5;
        let result = simulate_scenario(&scenario);
        let mc = result.monte_carlo.expect("monte carlo enabled");

        assert_eq!(mc.yearly_quantiles[0].withdrawals_net_nominal.get(0.5), Some(0.0));
        let later = &mc.yearly_quantiles[3];
        assert!(later.withdrawals_net_nominal.get(0.5).unwrap_or_default() > 0.0);
        assert!(later.tax_paid_nominal.get(0.5).unwrap_or_default() > 0.0);
        assert!(
            later.withdrawals_net_real.get(0.5).unwrap_or_default()
                < later.withdrawals_net_nominal.get(0.5).unwrap_or_default()
        );
        assert!((later.age - 39.0).abs() < 1e-9);
    }

    #[test]
    fn run_count_is_clamped() {
        let scenario = mc_scenario(0);
        let ctx = ScenarioContext::new(&scenario);
        let result = run_monte_carlo(&scenario, &ctx, 12);
        assert_eq!(result.runs, 1);
        assert_eq!(result.quantiles_timeline.len(), 61);
    }
}

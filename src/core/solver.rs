use serde::Serialize;
use tracing::{debug, info};

use super::engine::simulate_scenario;
use super::returns::cpi_at_retirement;
use super::types::{DeterministicResult, Scenario, WithdrawalMode};

pub const DEFAULT_UPPER_BOUND: f64 = 50_000.0;
pub const DEFAULT_TOLERANCE: f64 = 0.1;
pub const DEFAULT_MAX_ITERATIONS: u32 = 30;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetMode {
    /// Target is in money of the retirement date.
    Nominal,
    /// Target is in today's money and is indexed to the retirement date.
    Real,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PayoutMode {
    /// Perpetual payout at retirement: value x expected return, after tax.
    Forever,
    /// Withdraw the target every month without depleting before `end_age`.
    UntilAge,
}

#[derive(Debug, Clone)]
pub struct SavingsSearch {
    pub base: Scenario,
    pub target_net_monthly: f64,
    pub target_mode: TargetMode,
    pub payout_mode: PayoutMode,
    pub end_age: u32,
    pub upper_bound: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl SavingsSearch {
    pub fn new(
        base: Scenario,
        target_net_monthly: f64,
        target_mode: TargetMode,
        payout_mode: PayoutMode,
        end_age: u32,
    ) -> Self {
        Self {
            base,
            target_net_monthly,
            target_mode,
            payout_mode,
            end_age,
            upper_bound: DEFAULT_UPPER_BOUND,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub meets_target: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub feasible: bool,
    pub required_savings: Option<f64>,
    pub target_nominal: f64,
    pub target_real: f64,
    pub iterations: u32,
    pub history: Vec<SearchIteration>,
    /// Deterministic results at the reported contribution, or at the upper
    /// bound when the target is out of reach.
    pub results: DeterministicResult,
}

struct Targets {
    nominal: f64,
    real: f64,
}

struct CandidateEval {
    meets_target: bool,
    results: DeterministicResult,
}

fn scenario_for_candidate(search: &SavingsSearch, monthly_savings: f64, targets: &Targets) -> Scenario {
    let mut scenario = search.base.clone();
    scenario.monthly_savings = monthly_savings;
    scenario.monte_carlo.enabled = false;
    match search.payout_mode {
        PayoutMode::UntilAge => {
            scenario.withdrawal_mode = WithdrawalMode::TargetNet;
            scenario.target_net_withdrawal = targets.nominal;
            scenario.max_age = search.end_age;
        }
        PayoutMode::Forever => {
            scenario.withdrawal_mode = WithdrawalMode::Off;
            scenario.target_net_withdrawal = 0.0;
        }
    }
    scenario
}

fn evaluate_candidate(search: &SavingsSearch, monthly_savings: f64, targets: &Targets) -> CandidateEval {
    let scenario = scenario_for_candidate(search, monthly_savings, targets);
    let results = simulate_scenario(&scenario).deterministic;

    let meets_target = match search.payout_mode {
        PayoutMode::Forever => {
            let summary = &results.summary;
            match search.target_mode {
                TargetMode::Real => summary.forever_net_monthly_real >= targets.real,
                TargetMode::Nominal => summary.forever_net_monthly >= targets.nominal,
            }
        }
        PayoutMode::UntilAge => !results.timeline.iter().any(|row| row.is_depleted),
    };

    CandidateEval {
        meets_target,
        results,
    }
}

/// Bisects the monthly contribution needed to reach the target. Relies on
/// feasibility being monotonic in the contribution amount.
pub fn find_required_savings(search: &SavingsSearch) -> SearchResult {
    let base = &search.base;
    let target_nominal = match search.target_mode {
        TargetMode::Real => {
            search.target_net_monthly
                * cpi_at_retirement(base.inflation_annual, base.current_age, base.retirement_age)
        }
        TargetMode::Nominal => search.target_net_monthly,
    };
    let targets = Targets {
        nominal: target_nominal,
        real: search.target_net_monthly,
    };

    let low_eval = evaluate_candidate(search, 0.0, &targets);
    if low_eval.meets_target {
        info!("target already met without contributions");
        return SearchResult {
            feasible: true,
            required_savings: Some(0.0),
            target_nominal: targets.nominal,
            target_real: targets.real,
            iterations: 0,
            history: Vec::new(),
            results: low_eval.results,
        };
    }

    let high_eval = evaluate_candidate(search, search.upper_bound, &targets);
    if !high_eval.meets_target {
        info!(
            upper_bound = search.upper_bound,
            "target unreachable within contribution bound"
        );
        return SearchResult {
            feasible: false,
            required_savings: None,
            target_nominal: targets.nominal,
            target_real: targets.real,
            iterations: 0,
            history: Vec::new(),
            results: high_eval.results,
        };
    }

    let mut lo = 0.0;
    let mut hi = search.upper_bound;
    let mut best = high_eval.results;
    let mut history = Vec::with_capacity(search.max_iterations as usize);
    let mut it = 0;

    while it < search.max_iterations && hi - lo > search.tolerance {
        it += 1;
        let mid = (lo + hi) * 0.5;
        let eval = evaluate_candidate(search, mid, &targets);
        debug!(iteration = it, lo, hi, mid, meets = eval.meets_target, "bisection step");
        history.push(SearchIteration {
            iteration: it,
            lower_bound: lo,
            upper_bound: hi,
            candidate_value: mid,
            meets_target: eval.meets_target,
        });

        if eval.meets_target {
            hi = mid;
            best = eval.results;
        } else {
            lo = mid;
        }
    }

    info!(required = hi, iterations = it, "solved required savings");
    SearchResult {
        feasible: true,
        required_savings: Some(hi),
        target_nominal: targets.nominal,
        target_real: targets.real,
        iterations: it,
        history,
        results: best,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::tests::sample_scenario;
    use crate::core::returns::monthly_rate;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn zero_growth_base() -> Scenario {
        let mut scenario = sample_scenario();
        scenario.start_capital = 100.0;
        scenario.annual_return_pre = 0.0;
        scenario.inflation_annual = 0.0;
        scenario.tax_rate = 0.0;
        scenario.current_age = 30;
        scenario.retirement_age = 31;
        scenario.max_age = 40;
        scenario
    }

    #[test]
    fn trivially_satisfied_target_needs_no_savings() {
        let mut base = sample_scenario();
        base.start_capital = 10_000_000.0;
        let search = SavingsSearch::new(base, 10.0, TargetMode::Nominal, PayoutMode::Forever, 100);
        let result = find_required_savings(&search);

        assert!(result.feasible);
        assert_eq!(result.required_savings, Some(0.0));
        assert_eq!(result.iterations, 0);
        assert!(result.history.is_empty());
    }

    #[test]
    fn unattainable_target_is_infeasible() {
        let mut search = SavingsSearch::new(
            zero_growth_base(),
            1_000_000.0,
            TargetMode::Nominal,
            PayoutMode::UntilAge,
            90,
        );
        search.upper_bound = 100.0;
        let result = find_required_savings(&search);

        assert!(!result.feasible);
        assert_eq!(result.required_savings, None);
        assert!(result.results.timeline.iter().any(|row| row.is_depleted));
    }

    #[test]
    fn until_age_finds_contribution_that_funds_payout() {
        // Eleven contributions plus the starting 100 must fund 109 payouts of
        // 100 with no growth.
        let search = SavingsSearch::new(
            zero_growth_base(),
            100.0,
            TargetMode::Nominal,
            PayoutMode::UntilAge,
            40,
        );
        let result = find_required_savings(&search);

        assert!(result.feasible);
        let required = result.required_savings.unwrap_or_default();
        assert_close(required, (10_900.0 - 100.0) / 11.0, search.tolerance + 1e-9);
        assert!(result.iterations > 0 && result.iterations <= search.max_iterations);
        assert_eq!(result.history.len(), result.iterations as usize);
        assert!(!result.results.timeline.iter().any(|row| row.is_depleted));
    }

    #[test]
    fn forever_payout_matches_closed_form() {
        let mut base = zero_growth_base();
        base.annual_return_pre = 0.12;
        base.annual_return_post = Some(0.06);
        let search = SavingsSearch::new(base, 50.0, TargetMode::Nominal, PayoutMode::Forever, 100);
        let result = find_required_savings(&search);

        // 50/month forever at 6% needs 10_000 at retirement. The retirement
        // month itself already grows at the post-retirement rate.
        let pre = 1.0 + monthly_rate(0.12);
        let post = 1.0 + monthly_rate(0.06);
        let per_unit: f64 = (1..=11).map(|k| pre.powi(12 - k)).sum();
        let expected = (10_000.0 / post - 100.0 * pre.powi(11)) / per_unit;
        assert!(result.feasible);
        assert_close(result.required_savings.unwrap_or_default(), expected, 0.1 + 1e-9);
        assert!(result.results.summary.forever_net_monthly >= 50.0);
    }

    #[test]
    fn real_target_is_indexed_to_retirement_date() {
        let mut base = zero_growth_base();
        base.inflation_annual = 0.03;
        base.current_age = 30;
        base.retirement_age = 40;
        base.max_age = 50;
        let search = SavingsSearch::new(base, 1_000.0, TargetMode::Real, PayoutMode::Forever, 100);
        let result = find_required_savings(&search);

        assert_eq!(result.target_real, 1_000.0);
        assert_close(result.target_nominal, 1_000.0 * 1.03_f64.powi(10), 1e-6);
    }

    #[test]
    fn solver_ignores_monte_carlo_setting() {
        let mut base = zero_growth_base();
        base.monte_carlo.enabled = true;
        let search = SavingsSearch::new(base, 100.0, TargetMode::Nominal, PayoutMode::UntilAge, 40);
        let scenario = scenario_for_candidate(&search, 10.0, &Targets { nominal: 100.0, real: 100.0 });
        assert!(!scenario.monte_carlo.enabled);
        assert_eq!(scenario.withdrawal_mode, WithdrawalMode::TargetNet);
        assert_eq!(scenario.max_age, 40);

        let result = find_required_savings(&search);
        assert!(result.feasible);
    }

    #[test]
    fn iteration_cap_bounds_the_search() {
        let mut search = SavingsSearch::new(
            zero_growth_base(),
            100.0,
            TargetMode::Nominal,
            PayoutMode::UntilAge,
            40,
        );
        search.max_iterations = 3;
        let result = find_required_savings(&search);
        assert_eq!(result.iterations, 3);
        assert!(result.required_savings.unwrap_or_default() >= (10_900.0 - 100.0) / 11.0);
    }
}

use super::tax::gain_ratio;
use super::types::{Scenario, SummaryMetrics, TimelineRow, YearlyRow};

/// Index of the first row at or past retirement age, falling back to the last
/// row when retirement lies beyond the horizon.
pub fn retirement_index(timeline: &[TimelineRow], retirement_age: f64) -> usize {
    timeline
        .iter()
        .position(|row| row.age >= retirement_age)
        .unwrap_or(timeline.len().saturating_sub(1))
}

pub fn build_summary(timeline: &[TimelineRow], scenario: &Scenario) -> SummaryMetrics {
    let index = retirement_index(timeline, scenario.retirement_age as f64);
    let (point, last) = match (timeline.get(index), timeline.last()) {
        (Some(point), Some(last)) => (*point, *last),
        _ => return empty_summary(),
    };

    let ratio = gain_ratio(point.value_nominal, point.basis_nominal);
    let after_tax = 1.0 - scenario.tax_rate * ratio;
    let annual_return = scenario.post_retirement_return();

    let forever_gross_annual = point.value_nominal * annual_return;
    let forever_net_annual = forever_gross_annual * after_tax;
    let forever_gross_annual_real = point.value_real * annual_return;
    let forever_net_annual_real = forever_gross_annual_real * after_tax;

    SummaryMetrics {
        retirement_index: index,
        retirement_age: point.age,
        retirement_value_nominal: point.value_nominal,
        retirement_value_real: point.value_real,
        forever_gross_annual,
        forever_net_annual,
        forever_gross_annual_real,
        forever_net_annual_real,
        forever_gross_monthly: forever_gross_annual / 12.0,
        forever_net_monthly: forever_net_annual / 12.0,
        forever_gross_monthly_real: forever_gross_annual_real / 12.0,
        forever_net_monthly_real: forever_net_annual_real / 12.0,
        depletion_age: timeline.iter().find(|row| row.is_depleted).map(|row| row.age),
        ending_value_nominal: last.value_nominal,
        ending_value_real: last.value_real,
    }
}

fn empty_summary() -> SummaryMetrics {
    SummaryMetrics {
        retirement_index: 0,
        retirement_age: 0.0,
        retirement_value_nominal: 0.0,
        retirement_value_real: 0.0,
        forever_gross_annual: 0.0,
        forever_net_annual: 0.0,
        forever_gross_annual_real: 0.0,
        forever_net_annual_real: 0.0,
        forever_gross_monthly: 0.0,
        forever_net_monthly: 0.0,
        forever_gross_monthly_real: 0.0,
        forever_net_monthly_real: 0.0,
        depletion_age: None,
        ending_value_nominal: 0.0,
        ending_value_real: 0.0,
    }
}

/// One row per completed 12-month block (months 1-12, 13-24, ...). Real
/// withdrawal sums deflate each month by its own CPI.
pub fn build_yearly_table(timeline: &[TimelineRow]) -> Vec<YearlyRow> {
    (12..timeline.len())
        .step_by(12)
        .map(|end_index| {
            let block = &timeline[end_index - 11..=end_index];
            let end = &timeline[end_index];
            let sum = |f: fn(&TimelineRow) -> f64| block.iter().map(f).sum::<f64>();

            YearlyRow {
                age: end.age,
                value_nominal: end.value_nominal,
                value_real: end.value_real,
                contribution: sum(|row| row.contribution),
                withdraw_gross: sum(|row| row.withdraw_gross),
                withdraw_net: sum(|row| row.withdraw_net),
                withdraw_gross_real: sum(|row| row.withdraw_gross / row.cpi),
                withdraw_net_real: sum(|row| row.withdraw_net / row.cpi),
                tax_paid: sum(|row| row.tax_paid),
                return_applied: end.return_applied,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::tests::sample_scenario;
    use crate::core::engine::{ScenarioContext, run_deterministic_path};
    use crate::core::types::WithdrawalMode;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6 * expected.abs().max(1.0),
            "expected {expected}, got {actual}"
        );
    }

    fn timeline_for(scenario: &Scenario) -> Vec<TimelineRow> {
        run_deterministic_path(scenario, &ScenarioContext::new(scenario))
    }

    #[test]
    fn summary_reads_retirement_crossing_point() {
        let mut scenario = sample_scenario();
        scenario.start_gain_fraction = 0.5;
        let timeline = timeline_for(&scenario);
        let summary = build_summary(&timeline, &scenario);

        assert_eq!(summary.retirement_index, 12);
        assert_approx(summary.retirement_age, 36.0);
        assert_approx(summary.retirement_value_nominal, 106_000.0);

        let ratio = (106_000.0 - 50_000.0) / 106_000.0;
        let gross = 106_000.0 * 0.06;
        assert_approx(summary.forever_gross_annual, gross);
        assert_approx(summary.forever_net_annual, gross * (1.0 - 0.25 * ratio));
        assert_approx(summary.forever_net_monthly, summary.forever_net_annual / 12.0);
        assert_approx(
            summary.forever_gross_annual_real,
            timeline[12].value_real * 0.06,
        );
        assert_eq!(summary.depletion_age, None);
        assert_approx(summary.ending_value_nominal, timeline[60].value_nominal);
    }

    #[test]
    fn summary_falls_back_to_last_row_when_retirement_is_beyond_horizon() {
        let mut scenario = sample_scenario();
        scenario.retirement_age = 50;
        let timeline = timeline_for(&scenario);
        let summary = build_summary(&timeline, &scenario);
        assert_eq!(summary.retirement_index, 60);
        assert_approx(summary.retirement_age, 40.0);
    }

    #[test]
    fn summary_reports_first_depleted_age() {
        let mut scenario = sample_scenario();
        scenario.start_capital = 6_000.0;
        scenario.current_age = 60;
        scenario.retirement_age = 60;
        scenario.max_age = 62;
        scenario.annual_return_pre = 0.0;
        scenario.withdrawal_mode = WithdrawalMode::TargetNet;
        scenario.target_net_withdrawal = 1_000.0;
        let summary = build_summary(&timeline_for(&scenario), &scenario);
        assert_approx(summary.depletion_age.unwrap_or_default(), 60.5);
        assert_eq!(summary.ending_value_nominal, 0.0);
    }

    #[test]
    fn empty_timeline_yields_zeroed_summary() {
        let summary = build_summary(&[], &sample_scenario());
        assert_eq!(summary.retirement_value_nominal, 0.0);
        assert_eq!(summary.depletion_age, None);
    }

    #[test]
    fn yearly_rollup_sums_blocks_of_twelve_months() {
        let mut scenario = sample_scenario();
        scenario.monthly_savings = 100.0;
        scenario.current_age = 35;
        scenario.retirement_age = 37;
        scenario.max_age = 39;
        scenario.withdrawal_mode = WithdrawalMode::InterestOnly;
        let timeline = timeline_for(&scenario);
        let yearly = build_yearly_table(&timeline);

        assert_eq!(yearly.len(), 4);
        assert_approx(yearly[0].age, 36.0);
        assert_approx(yearly[0].contribution, 1_200.0);
        // Month 24 is the first retired month.
        assert_approx(yearly[1].contribution, 1_100.0);
        assert_eq!(yearly[0].withdraw_gross, 0.0);
        assert!(yearly[2].withdraw_gross > 0.0);
        assert_approx(yearly[1].value_nominal, timeline[24].value_nominal);
        assert_eq!(yearly[3].return_applied, timeline[48].return_applied);
    }

    #[test]
    fn yearly_real_withdrawals_use_each_month_cpi() {
        let mut scenario = sample_scenario();
        scenario.current_age = 60;
        scenario.retirement_age = 60;
        scenario.max_age = 61;
        scenario.withdrawal_mode = WithdrawalMode::InterestOnly;
        let timeline = timeline_for(&scenario);
        let yearly = build_yearly_table(&timeline);

        let expected: f64 = timeline[1..=12]
            .iter()
            .map(|row| row.withdraw_net / row.cpi)
            .sum();
        assert_approx(yearly[0].withdraw_net_real, expected);
        assert!(yearly[0].withdraw_net_real > yearly[0].withdraw_net / timeline[12].cpi);
    }

    #[test]
    fn partial_final_year_is_dropped() {
        let timeline = timeline_for(&sample_scenario());
        assert_eq!(build_yearly_table(&timeline[..30]).len(), 2);
        assert!(build_yearly_table(&timeline[..12]).is_empty());
    }
}

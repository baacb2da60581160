use serde::Serialize;

/// Geometric conversion of an annual rate to the equivalent monthly rate.
pub fn monthly_rate(annual_rate: f64) -> f64 {
    (1.0 + annual_rate).powf(1.0 / 12.0) - 1.0
}

/// Log-space drift of one month at a constant annual rate, equal to
/// `ln(1 + monthly_rate(annual_rate))`. Path draws that already hold a
/// monthly expectation (recovery premium included) take the log directly.
pub fn monthly_log_mean(annual_rate: f64) -> f64 {
    (1.0 + annual_rate).ln() / 12.0
}

/// Cumulative price index at the retirement month, used to index a target
/// stated in today's money.
pub fn cpi_at_retirement(inflation_annual: f64, current_age: u32, retirement_age: u32) -> f64 {
    let months = ((retirement_age as f64 - current_age as f64) * 12.0)
        .round()
        .max(0.0);
    (1.0 + monthly_rate(inflation_annual)).powf(months)
}

/// Cumulative price index per month, `cpi[0] == 1.0`.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct CpiTimeline(Vec<f64>);

impl CpiTimeline {
    pub fn build(months: usize, inflation_annual: f64) -> Self {
        let inflation_monthly = monthly_rate(inflation_annual);
        let mut cpi = Vec::with_capacity(months + 1);
        cpi.push(1.0);
        for t in 1..=months {
            cpi.push(cpi[t - 1] * (1.0 + inflation_monthly));
        }
        Self(cpi)
    }

    pub fn at(&self, month: usize) -> f64 {
        self.0.get(month).copied().unwrap_or(1.0)
    }

    pub fn deflate(&self, month: usize, nominal: f64) -> f64 {
        nominal / self.at(month)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    #[test]
    fn twelve_monthly_steps_compound_to_annual_rate() {
        let monthly = monthly_rate(0.12);
        assert_approx((1.0 + monthly).powi(12) - 1.0, 0.12, 1e-4);
    }

    #[test]
    fn zero_annual_rate_is_zero_monthly() {
        assert_eq!(monthly_rate(0.0), 0.0);
        assert_eq!(monthly_log_mean(0.0), 0.0);
    }

    #[test]
    fn log_mean_matches_log_of_monthly_rate() {
        assert_approx(monthly_log_mean(0.07), (1.0 + monthly_rate(0.07)).ln(), 1e-12);
    }

    #[test]
    fn cpi_timeline_starts_at_one_and_compounds() {
        let cpi = CpiTimeline::build(24, 0.02);
        assert_eq!(cpi.len(), 25);
        assert_eq!(cpi.at(0), 1.0);
        assert_approx(cpi.at(12), 1.02, 1e-9);
        assert_approx(cpi.at(24), 1.02 * 1.02, 1e-9);
        assert_approx(cpi.deflate(12, 102.0), 100.0, 1e-7);
    }

    #[test]
    fn cpi_at_retirement_matches_timeline() {
        let cpi = CpiTimeline::build(12 * 37, 0.02);
        assert_approx(cpi_at_retirement(0.02, 30, 67), cpi.at(12 * 37), 1e-9);
        assert_eq!(cpi_at_retirement(0.02, 67, 60), 1.0);
    }

    proptest! {
        #[test]
        fn monthly_compounding_recovers_annual_rate(rate in -0.5f64..1.0) {
            let compounded = (1.0 + monthly_rate(rate)).powi(12) - 1.0;
            prop_assert!((compounded - rate).abs() <= 1e-4 * rate.abs().max(1e-6));
        }

        #[test]
        fn cpi_is_monotonic_for_non_negative_inflation(inflation in 0.0f64..0.2, months in 1usize..600) {
            let cpi = CpiTimeline::build(months, inflation);
            for t in 1..cpi.len() {
                prop_assert!(cpi.at(t) >= cpi.at(t - 1));
            }
        }
    }
}

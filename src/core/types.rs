use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WithdrawalMode {
    Off,
    InterestOnly,
    TargetNet,
}

/// Post-crisis recovery presets. Each maps to the number of years the market
/// needs to fully erase the crisis drawdown.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryProfile {
    Off,
    Fast,
    Typical,
    Gfc,
    LostDecade,
}

impl RecoveryProfile {
    /// Unknown keys fall back to `Off`.
    pub fn from_key(key: &str) -> Self {
        match key {
            "fast" => RecoveryProfile::Fast,
            "typical" => RecoveryProfile::Typical,
            "gfc" => RecoveryProfile::Gfc,
            "lostDecade" | "lost-decade" | "lost_decade" => RecoveryProfile::LostDecade,
            _ => RecoveryProfile::Off,
        }
    }

    pub fn horizon_years(self) -> f64 {
        match self {
            RecoveryProfile::Off => 0.0,
            RecoveryProfile::Fast => 2.0,
            RecoveryProfile::Typical => 3.5,
            RecoveryProfile::Gfc => 4.0,
            RecoveryProfile::LostDecade => 10.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RecoveryProfile::Off => "Off",
            RecoveryProfile::Fast => "Fast (2 years)",
            RecoveryProfile::Typical => "Typical (3.5 years)",
            RecoveryProfile::Gfc => "GFC-like (4 years)",
            RecoveryProfile::LostDecade => "Dotcom / Lost-decade-like (10+ years)",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloConfig {
    pub enabled: bool,
    pub runs: u32,
    pub sigma_annual: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisConfig {
    pub enabled: bool,
    pub after_years: f64,
    /// Peak-to-trough loss as a fraction, e.g. 0.4 for a 40% crash.
    pub max_drawdown: f64,
    pub recovery_profile: RecoveryProfile,
}

/// A fully validated savings plan. All rates are fractions, ages are years.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub start_capital: f64,
    pub annual_return_pre: f64,
    /// Unset means the pre-retirement return keeps applying after retirement.
    pub annual_return_post: Option<f64>,
    pub inflation_annual: f64,
    pub monthly_savings: f64,
    pub current_age: u32,
    pub retirement_age: u32,
    pub max_age: u32,
    pub start_gain_fraction: f64,
    pub tax_rate: f64,
    pub savings_increase_annual: f64,
    pub savings_cap: Option<f64>,
    pub stop_investing_after_years: Option<f64>,
    pub withdrawal_mode: WithdrawalMode,
    pub target_net_withdrawal: f64,
    pub monte_carlo: MonteCarloConfig,
    pub crisis: CrisisConfig,
}

impl Scenario {
    pub fn total_months(&self) -> usize {
        self.max_age.saturating_sub(self.current_age) as usize * 12
    }

    pub fn post_retirement_return(&self) -> f64 {
        self.annual_return_post.unwrap_or(self.annual_return_pre)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRow {
    pub month: usize,
    pub age: f64,
    pub cpi: f64,
    pub value_nominal: f64,
    pub value_real: f64,
    pub basis_nominal: f64,
    pub basis_real: f64,
    pub contribution: f64,
    pub withdraw_gross: f64,
    pub withdraw_net: f64,
    pub tax_paid: f64,
    pub return_applied: f64,
    pub is_retired: bool,
    pub is_crisis_month: bool,
    pub is_recovery_month: bool,
    pub is_depleted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMetrics {
    pub retirement_index: usize,
    pub retirement_age: f64,
    pub retirement_value_nominal: f64,
    pub retirement_value_real: f64,
    pub forever_gross_annual: f64,
    pub forever_net_annual: f64,
    pub forever_gross_annual_real: f64,
    pub forever_net_annual_real: f64,
    pub forever_gross_monthly: f64,
    pub forever_net_monthly: f64,
    pub forever_gross_monthly_real: f64,
    pub forever_net_monthly_real: f64,
    pub depletion_age: Option<f64>,
    pub ending_value_nominal: f64,
    pub ending_value_real: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyRow {
    pub age: f64,
    pub value_nominal: f64,
    pub value_real: f64,
    pub contribution: f64,
    pub withdraw_gross: f64,
    pub withdraw_net: f64,
    pub withdraw_gross_real: f64,
    pub withdraw_net_real: f64,
    pub tax_paid: f64,
    pub return_applied: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantilePoint {
    pub q: f64,
    pub value: f64,
}

/// Quantile level to value mapping for one time index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QuantileSet(pub Vec<QuantilePoint>);

impl QuantileSet {
    pub fn get(&self, q: f64) -> Option<f64> {
        self.0
            .iter()
            .find(|p| (p.q - q).abs() <= 1e-12)
            .map(|p| p.value)
    }

    /// Divides every quantile by `cpi`. This is the deflated nominal
    /// quantile, not the quantile of the deflated distribution.
    pub fn deflate(&self, cpi: f64) -> Self {
        QuantileSet(
            self.0
                .iter()
                .map(|p| QuantilePoint {
                    q: p.q,
                    value: p.value / cpi,
                })
                .collect(),
        )
    }
}

/// One entry per time index.
pub type QuantileTable = Vec<QuantileSet>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineQuantiles {
    pub nominal: QuantileSet,
    pub real: QuantileSet,
    pub basis_nominal: QuantileSet,
    pub basis_real: QuantileSet,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuantiles {
    pub retirement_nominal: QuantileSet,
    pub retirement_real: QuantileSet,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyQuantiles {
    pub age: f64,
    pub end_value_nominal: QuantileSet,
    pub end_value_real: QuantileSet,
    pub withdrawals_net_nominal: QuantileSet,
    pub withdrawals_net_real: QuantileSet,
    pub tax_paid_nominal: QuantileSet,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResult {
    pub runs: u32,
    pub quantiles_timeline: Vec<TimelineQuantiles>,
    pub summary_quantiles: SummaryQuantiles,
    pub yearly_quantiles: Vec<YearlyQuantiles>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterministicResult {
    pub timeline: Vec<TimelineRow>,
    pub summary: SummaryMetrics,
    pub yearly: Vec<YearlyRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub deterministic: DeterministicResult,
    pub monte_carlo: Option<MonteCarloResult>,
}

//! Market crisis overlay and the post-crisis recovery premium.
//!
//! A crisis is a fixed one-year shape: a log-linear slide from the pre-crisis
//! level to the trough, followed by a partial log-linear rebound. The shape
//! parameters are policy constants, only the depth and onset are configurable.

use serde::Serialize;

use super::types::CrisisConfig;

pub const CRISIS_MONTHS: usize = 12;
/// Month (within the crisis year) at which the trough is reached.
pub const TROUGH_MONTH: usize = 8;
/// Share of the drawdown recovered by the end of the crisis year.
pub const END_RECOVERY_FRACTION: f64 = 0.35;
pub const MAX_DRAWDOWN: f64 = 0.95;

pub fn clamp_drawdown(drawdown: f64) -> f64 {
    drawdown.clamp(0.0, MAX_DRAWDOWN)
}

fn onset_month(after_years: f64) -> usize {
    (after_years * 12.0).round().max(0.0) as usize
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisOverlay {
    pub start_month: Option<usize>,
    pub crisis_returns: Vec<f64>,
}

impl CrisisOverlay {
    /// Empty when disabled or when the onset falls at or past the horizon.
    pub fn build(config: &CrisisConfig, total_months: usize) -> Self {
        if !config.enabled {
            return Self::default();
        }
        let start_month = onset_month(config.after_years);
        if start_month >= total_months {
            return Self::default();
        }

        let trough = 1.0 - clamp_drawdown(config.max_drawdown);
        let end = trough + END_RECOVERY_FRACTION * (1.0 - trough);

        let log_start = 0.0_f64;
        let log_trough = trough.ln();
        let log_end = end.ln();

        let mut levels = Vec::with_capacity(CRISIS_MONTHS + 1);
        for m in 0..=TROUGH_MONTH {
            let w = m as f64 / TROUGH_MONTH as f64;
            levels.push(log_start + w * (log_trough - log_start));
        }
        for m in TROUGH_MONTH + 1..=CRISIS_MONTHS {
            let w = (m - TROUGH_MONTH) as f64 / (CRISIS_MONTHS - TROUGH_MONTH) as f64;
            levels.push(log_trough + w * (log_end - log_trough));
        }

        let crisis_returns = levels
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).exp() - 1.0)
            .collect();

        Self {
            start_month: Some(start_month),
            crisis_returns,
        }
    }

    pub fn is_active(&self) -> bool {
        self.start_month.is_some()
    }

    /// Crisis return for absolute month `t`, if `t` lies in the crisis year.
    pub fn return_at(&self, month: usize) -> Option<f64> {
        let start = self.start_month?;
        let offset = month.checked_sub(start)?;
        self.crisis_returns.get(offset).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryEntry {
    pub month_index: usize,
    pub premium_annual: f64,
    /// Linear fade from 1 at the start of the window towards 0 at its end.
    pub decay: f64,
}

/// Contiguous run of recovery entries addressed by absolute month.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySchedule {
    start_month: usize,
    entries: Vec<RecoveryEntry>,
}

impl RecoverySchedule {
    pub fn build(config: &CrisisConfig, base_annual_return: f64, total_months: usize) -> Self {
        if !config.enabled {
            return Self::default();
        }
        let years = config.recovery_profile.horizon_years();
        if years <= 0.0 {
            return Self::default();
        }

        let recovery_start = onset_month(config.after_years) + CRISIS_MONTHS;
        if recovery_start >= total_months {
            return Self::default();
        }

        let drawdown = clamp_drawdown(config.max_drawdown);
        let required_cagr = (1.0 / (1.0 - drawdown)).powf(1.0 / years) - 1.0;
        let premium_annual = (required_cagr - base_annual_return).max(0.0);

        let window = ((years * 12.0).round() as usize).min(total_months - recovery_start);
        let entries = (0..window)
            .map(|j| RecoveryEntry {
                month_index: recovery_start + j,
                premium_annual,
                decay: 1.0 - j as f64 / window as f64,
            })
            .collect();

        Self {
            start_month: recovery_start,
            entries,
        }
    }

    pub fn entry_at(&self, month: usize) -> Option<&RecoveryEntry> {
        let offset = month.checked_sub(self.start_month)?;
        self.entries.get(offset)
    }

    pub fn entries(&self) -> &[RecoveryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fraction of `value` that is unrealized gain, always in `[0, 1]`.
pub fn gain_ratio(value: f64, basis: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    ((value - basis).max(0.0) / value).min(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalOutcome {
    pub value: f64,
    pub basis: f64,
    pub tax: f64,
    pub net: f64,
    pub gain_ratio: f64,
}

/// Sells `gross` pro rata: the gain share of the sale is taxed, the principal
/// share reduces the cost basis.
pub fn apply_withdrawal(value: f64, basis: f64, gross: f64, tax_rate: f64) -> WithdrawalOutcome {
    let gain_ratio = gain_ratio(value, basis);
    let taxable_gain = gross * gain_ratio;
    let tax = taxable_gain * tax_rate;
    let principal = gross - taxable_gain;

    WithdrawalOutcome {
        value: (value - gross).max(0.0),
        basis: (basis - principal).max(0.0),
        tax,
        net: gross - tax,
        gain_ratio,
    }
}

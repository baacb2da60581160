use super::types::{QuantilePoint, QuantileSet, QuantileTable};

pub const DEFAULT_QUANTILES: [f64; 3] = [0.1, 0.5, 0.9];

/// Linear interpolation between order statistics of an ascending slice.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = q.clamp(0.0, 1.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let w = rank - lower as f64;
        (sorted[lower] + w * (sorted[upper] - sorted[lower]))
            .max(sorted[lower])
            .min(sorted[upper])
    }
}

pub fn quantile_set(values: &mut [f64], quantiles: &[f64]) -> QuantileSet {
    values.sort_by(|a, b| a.total_cmp(b));
    QuantileSet(
        quantiles
            .iter()
            .map(|&q| QuantilePoint {
                q,
                value: quantile(values, q),
            })
            .collect(),
    )
}

/// Quantiles of every column of a runs x time matrix. The column count is
/// taken from the first run.
pub fn column_quantiles(matrix: &[Vec<f64>], quantiles: &[f64]) -> QuantileTable {
    let columns = matrix.first().map_or(0, Vec::len);
    let mut column = Vec::with_capacity(matrix.len());

    (0..columns)
        .map(|t| {
            column.clear();
            column.extend(matrix.iter().filter_map(|run| run.get(t).copied()));
            quantile_set(&mut column, quantiles)
        })
        .collect()
}

//! Per-group lag and rolling statistics.
//!
//! The batch is ordered by `(Account, Primary Account, Secondary Account,
//! AU, As of Date)`; every run of rows sharing the first four keys is one
//! group, and each row's features look only at its own group's history.

use std::cmp::Ordering;

use crate::config::HistoryPolicy;
use crate::detect::encode::GroupCodes;
use crate::ingest::{numeric_key, ReconciliationRecord};

/// A record index plus the statistics derived from its group history.
///
/// `rule_anomaly` and `codes` start at their defaults and are filled by the
/// later pipeline stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineeredRow {
    /// Position of the source record in the input batch.
    pub source: usize,
    /// Number of earlier observations in the same group.
    pub history: usize,
    pub lag1: f64,
    pub lag2: f64,
    pub rolling_mean: f64,
    pub rolling_std: f64,
    pub rule_anomaly: bool,
    pub codes: GroupCodes,
}

/// Raw statistics before the history policy is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct RawStats {
    lag1: Option<f64>,
    lag2: Option<f64>,
    rolling_mean: Option<f64>,
    rolling_std: Option<f64>,
}

impl RawStats {
    fn is_complete(&self) -> bool {
        self.lag1.is_some() && self.rolling_mean.is_some() && self.rolling_std.is_some()
    }
}

/// How each grouping-key column is ordered and compared.
///
/// A column whose every value parses as a number compares numerically, any
/// other column compares as text. Sorting and group boundaries both go
/// through [`KeyOrder::compare_keys`], so rows that sort together always
/// land in the same group.
#[derive(Debug, Clone, Copy)]
struct KeyOrder {
    numeric: [bool; 4],
}

impl KeyOrder {
    fn detect(records: &[ReconciliationRecord]) -> Self {
        let mut numeric = [true; 4];
        for record in records {
            for (flag, value) in numeric.iter_mut().zip(record.group_key()) {
                *flag = *flag && numeric_key(value).is_some();
            }
        }
        Self { numeric }
    }

    fn compare_keys(&self, a: &ReconciliationRecord, b: &ReconciliationRecord) -> Ordering {
        for ((numeric, x), y) in self.numeric.iter().zip(a.group_key()).zip(b.group_key()) {
            let ord = match (*numeric, numeric_key(x), numeric_key(y)) {
                (true, Some(xv), Some(yv)) => xv.total_cmp(&yv),
                _ => x.cmp(y),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn compare(&self, a: &ReconciliationRecord, b: &ReconciliationRecord) -> Ordering {
        self.compare_keys(a, b).then_with(|| a.as_of.cmp(&b.as_of))
    }
}

/// Indices of `records` in pipeline order: group keys, then date.
pub fn chronological_order(records: &[ReconciliationRecord]) -> Vec<usize> {
    sorted_indices(records, KeyOrder::detect(records))
}

fn sorted_indices(records: &[ReconciliationRecord], order: KeyOrder) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..records.len()).collect();
    indices.sort_by(|&a, &b| order.compare(&records[a], &records[b]));
    indices
}

/// Sample mean and standard deviation (n - 1 denominator).
///
/// A single value has a zero standard deviation.
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (sum_sq / (n - 1.0)).sqrt())
}

fn group_stats(values: &[f64], window: usize) -> Vec<RawStats> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let (rolling_mean, rolling_std) = if i + 1 >= window {
                let (m, s) = mean_and_std(&values[i + 1 - window..=i]);
                (Some(m), Some(s))
            } else {
                (None, None)
            };
            RawStats {
                lag1: i.checked_sub(1).map(|j| values[j]),
                lag2: i.checked_sub(2).map(|j| values[j]),
                rolling_mean,
                rolling_std,
            }
        })
        .collect()
}

/// Build engineered rows for a batch, in chronological group order.
///
/// With [`HistoryPolicy::FillZero`] every record yields a row and undefined
/// statistics become `0.0`. With [`HistoryPolicy::DropInsufficient`] rows
/// without a defined lag and full rolling window are removed first.
pub fn build(
    records: &[ReconciliationRecord],
    window: usize,
    policy: HistoryPolicy,
) -> Vec<EngineeredRow> {
    let key_order = KeyOrder::detect(records);
    let order = sorted_indices(records, key_order);
    let mut rows = Vec::with_capacity(order.len());

    let mut start = 0;
    while start < order.len() {
        let first = &records[order[start]];
        let end = order[start..]
            .iter()
            .position(|&i| key_order.compare_keys(&records[i], first) != Ordering::Equal)
            .map_or(order.len(), |offset| start + offset);

        let members = &order[start..end];
        let values: Vec<f64> = members
            .iter()
            .map(|&i| records[i].balance_difference)
            .collect();

        for (history, (&source, stats)) in members
            .iter()
            .zip(group_stats(&values, window))
            .enumerate()
        {
            if policy == HistoryPolicy::DropInsufficient && !stats.is_complete() {
                continue;
            }
            rows.push(EngineeredRow {
                source,
                history,
                lag1: stats.lag1.unwrap_or(0.0),
                lag2: stats.lag2.unwrap_or(0.0),
                rolling_mean: stats.rolling_mean.unwrap_or(0.0),
                rolling_std: stats.rolling_std.unwrap_or(0.0),
                ..EngineeredRow::default()
            });
        }

        start = end;
    }

    tracing::debug!(
        records = records.len(),
        rows = rows.len(),
        ?policy,
        "built engineered rows"
    );
    rows
}

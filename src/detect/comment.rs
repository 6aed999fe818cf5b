//! Explanatory comments for scored rows.

use std::fmt;

use serde::Serialize;

/// The fixed comment vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Comment {
    HugeSpike,
    InconsistentDeviation,
    InLineWithHistory,
    ConsistentDeviation,
    None,
}

impl Comment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comment::HugeSpike => "Huge spike in the outstanding balance.",
            Comment::InconsistentDeviation => "Inconsistent deviation in the outstanding balances.",
            Comment::InLineWithHistory => "Outstanding balance in line with previous data.",
            Comment::ConsistentDeviation => "Consistent deviation in the outstanding balances.",
            Comment::None => "",
        }
    }

    /// Pick the comment for a scored row. Branches are checked in order and
    /// the first match wins:
    ///
    /// 1. predicted and break, `|x| > mean + k*std` → huge spike
    /// 2. predicted and break → inconsistent deviation
    /// 3. break, `|x - mean| < std` → in line with previous data
    /// 4. break → consistent deviation
    /// 5. anything else → empty
    pub fn synthesize(
        predicted_anomaly: bool,
        is_break: bool,
        balance_difference: f64,
        rolling_mean: f64,
        rolling_std: f64,
        multiplier: f64,
    ) -> Self {
        if !is_break {
            return Comment::None;
        }

        if predicted_anomaly {
            if balance_difference.abs() > rolling_mean + multiplier * rolling_std {
                Comment::HugeSpike
            } else {
                Comment::InconsistentDeviation
            }
        } else if (balance_difference - rolling_mean).abs() < rolling_std {
            Comment::InLineWithHistory
        } else {
            Comment::ConsistentDeviation
        }
    }
}

impl fmt::Display for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Rule-based ground-truth labeling.

use crate::ingest::STATUS_BREAK;

/// `status == "Break" && |x - mean| > k * std`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationRule {
    pub multiplier: f64,
}

impl Default for DeviationRule {
    fn default() -> Self {
        Self { multiplier: 2.0 }
    }
}

impl DeviationRule {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    /// A zero `rolling_std` flags any nonzero deviation on a break.
    pub fn is_anomaly(
        &self,
        match_status: &str,
        balance_difference: f64,
        rolling_mean: f64,
        rolling_std: f64,
    ) -> bool {
        match_status == STATUS_BREAK
            && (balance_difference - rolling_mean).abs() > self.multiplier * rolling_std
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_breaks_are_flagged() {
        let rule = DeviationRule::default();
        assert!(rule.is_anomaly("Break", 100.0, 0.0, 10.0));
        assert!(!rule.is_anomaly("Match", 100.0, 0.0, 10.0));
        assert!(!rule.is_anomaly("break", 100.0, 0.0, 10.0));
    }

    #[test]
    fn test_threshold_is_strict() {
        let rule = DeviationRule::default();
        assert!(!rule.is_anomaly("Break", 20.0, 0.0, 10.0));
        assert!(rule.is_anomaly("Break", 20.001, 0.0, 10.0));
        assert!(rule.is_anomaly("Break", -20.001, 0.0, 10.0));
    }

    #[test]
    fn test_zero_std_flags_any_deviation() {
        let rule = DeviationRule::default();
        assert!(rule.is_anomaly("Break", 0.01, 0.0, 0.0));
        assert!(!rule.is_anomaly("Break", 5.0, 5.0, 0.0));
    }

    #[test]
    fn test_deterministic() {
        let rule = DeviationRule::new(2.0);
        let a = rule.is_anomaly("Break", 500.0, 173.3, 282.9);
        let b = rule.is_anomaly("Break", 500.0, 173.3, 282.9);
        assert_eq!(a, b);
        assert!(!a);
    }
}

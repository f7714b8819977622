//! Coarse trend classification.
//!
//! Callers go through [`TrendPolicy`] so the half-split heuristic can be
//! replaced (for example by a regression slope test) without touching them.

use crate::types::Trend;

pub trait TrendPolicy: Send + Sync {
    /// Classifies a series in chronological order. `Improving` means the
    /// values went up.
    fn classify(&self, series: &[f64]) -> Trend;
}

/// Compares the mean of the first half of the series with the mean of the
/// second half. With an odd length the middle point belongs to the second
/// half.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfSplitTrend {
    /// Relative change needed to leave `Stable`, e.g. `0.05` for 5%.
    pub threshold: f64,
}

impl Default for HalfSplitTrend {
    fn default() -> Self {
        Self { threshold: 0.05 }
    }
}

impl TrendPolicy for HalfSplitTrend {
    fn classify(&self, series: &[f64]) -> Trend {
        if series.len() < 2 {
            return Trend::Stable;
        }

        let (first, second) = series.split_at(series.len() / 2);
        let first_mean = mean(first);
        let second_mean = mean(second);

        if first_mean == 0.0 {
            return if second_mean > 0.0 {
                Trend::Improving
            } else if second_mean < 0.0 {
                Trend::Declining
            } else {
                Trend::Stable
            };
        }

        let change = (second_mean - first_mean) / first_mean.abs();
        if change > self.threshold {
            Trend::Improving
        } else if change < -self.threshold {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

/// Whether a rising metric is good news.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    HigherIsBetter,
    LowerIsBetter,
}

pub fn classify_metric(policy: &dyn TrendPolicy, series: &[f64], polarity: Polarity) -> Trend {
    let trend = policy.classify(series);
    match (polarity, trend) {
        (Polarity::HigherIsBetter, trend) => trend,
        (Polarity::LowerIsBetter, Trend::Improving) => Trend::Declining,
        (Polarity::LowerIsBetter, Trend::Declining) => Trend::Improving,
        (Polarity::LowerIsBetter, Trend::Stable) => Trend::Stable,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_volume_and_success_rate_are_improving() {
        let policy = HalfSplitTrend::default();
        let requests = [10.0, 12.0, 9.0, 11.0, 13.0, 14.0, 15.0];
        let success_rates = [0.90, 0.91, 0.89, 0.93, 0.95, 0.96, 0.97];

        assert_eq!(policy.classify(&requests), Trend::Improving);
        assert_eq!(policy.classify(&success_rates), Trend::Improving);
    }

    #[test]
    fn small_changes_are_stable_and_drops_are_declining() {
        let policy = HalfSplitTrend::default();
        assert_eq!(policy.classify(&[100.0, 100.0, 102.0, 103.0]), Trend::Stable);
        assert_eq!(policy.classify(&[100.0, 100.0, 80.0, 70.0]), Trend::Declining);
        assert_eq!(policy.classify(&[5.0]), Trend::Stable);
        assert_eq!(policy.classify(&[]), Trend::Stable);
    }

    #[test]
    fn growth_from_zero_counts_as_improving() {
        let policy = HalfSplitTrend::default();
        assert_eq!(policy.classify(&[0.0, 0.0, 3.0, 4.0]), Trend::Improving);
        assert_eq!(policy.classify(&[0.0, 0.0, 0.0, 0.0]), Trend::Stable);
    }

    #[test]
    fn lower_is_better_metrics_are_mirrored() {
        let policy = HalfSplitTrend::default();
        let slower = [1.0, 1.0, 2.0, 2.0];
        assert_eq!(
            classify_metric(&policy, &slower, Polarity::LowerIsBetter),
            Trend::Declining
        );
        assert_eq!(
            classify_metric(&policy, &slower, Polarity::HigherIsBetter),
            Trend::Improving
        );
    }

    struct AlwaysStable;

    impl TrendPolicy for AlwaysStable {
        fn classify(&self, _series: &[f64]) -> Trend {
            Trend::Stable
        }
    }

    #[test]
    fn policies_are_swappable() {
        let policy: &dyn TrendPolicy = &AlwaysStable;
        assert_eq!(
            classify_metric(policy, &[1.0, 100.0], Polarity::HigherIsBetter),
            Trend::Stable
        );
    }
}

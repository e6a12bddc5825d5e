//! Rolling baseline statistics
//!
//! This module computes rolling statistics over a user's observation series.
//! Windows are counted in observations, not calendar days: a 14-observation
//! window is the last 14 non-null values, however far apart they are.

/// Short-term window (observations)
pub const SHORT_WINDOW: usize = 3;

/// Weekly window (observations)
pub const WEEK_WINDOW: usize = 7;

/// Default baseline window (observations)
pub const DEFAULT_BASELINE_WINDOW: usize = 14;

/// Window for z-score normalization (observations)
pub const ZSCORE_WINDOW: usize = 28;

/// Chronological series of observations for one variable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationSeries {
    values: Vec<f64>,
}

impl ObservationSeries {
    /// Build a series, dropping non-finite values
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: values.into_iter().filter(|v| v.is_finite()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Most recent observation
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Last `size` observations, or all of them if fewer exist
    pub fn window(&self, size: usize) -> &[f64] {
        let start = self.values.len().saturating_sub(size);
        &self.values[start..]
    }

    /// Mean of the last `size` observations
    pub fn rolling_mean(&self, size: usize) -> Option<f64> {
        mean(self.window(size))
    }

    /// Median of the last `size` observations
    pub fn rolling_median(&self, size: usize) -> Option<f64> {
        let mut window = self.window(size).to_vec();
        if window.is_empty() {
            return None;
        }

        window.sort_by(f64::total_cmp);
        let mid = window.len() / 2;
        if window.len() % 2 == 0 {
            Some((window[mid - 1] + window[mid]) / 2.0)
        } else {
            Some(window[mid])
        }
    }

    /// Z-score of the latest observation against the last `size` observations.
    ///
    /// Uses the population standard deviation. Needs at least two observations;
    /// a flat window yields exactly 0.
    pub fn zscore(&self, size: usize) -> Option<f64> {
        let window = self.window(size);
        if window.len() < 2 {
            return None;
        }

        let window_mean = mean(window)?;
        let variance =
            window.iter().map(|v| (v - window_mean).powi(2)).sum::<f64>() / window.len() as f64;
        let std_dev = variance.sqrt();

        if std_dev == 0.0 {
            return Some(0.0);
        }

        let z = (self.last()? - window_mean) / std_dev;
        z.is_finite().then_some(z)
    }
}

/// Relative change between a short and a long baseline (`short / long - 1`)
pub fn relative_delta(short: Option<f64>, long: Option<f64>) -> Option<f64> {
    match (short, long) {
        (Some(s), Some(l)) if l != 0.0 => Some(s / l - 1.0),
        _ => None,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(sum / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_mean_short_history() {
        let series = ObservationSeries::new([1000.0, 2000.0, 3000.0]);
        assert_eq!(series.rolling_mean(SHORT_WINDOW), Some(2000.0));
        // Fewer observations than the window: use what exists
        assert_eq!(series.rolling_mean(DEFAULT_BASELINE_WINDOW), Some(2000.0));
    }

    #[test]
    fn test_rolling_mean_uses_last_observations() {
        let series = ObservationSeries::new([60.0, 70.0, 80.0, 90.0, 100.0]);
        // Only 80, 90, 100 are in window
        assert!((series.rolling_mean(3).unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_series() {
        let series = ObservationSeries::default();
        assert_eq!(series.rolling_mean(3), None);
        assert_eq!(series.rolling_median(14), None);
        assert_eq!(series.zscore(28), None);
    }

    #[test]
    fn test_rolling_median_odd_and_even() {
        let odd = ObservationSeries::new([5.0, 1.0, 3.0]);
        assert_eq!(odd.rolling_median(14), Some(3.0));

        let even = ObservationSeries::new([4.0, 1.0, 3.0, 2.0]);
        assert_eq!(even.rolling_median(14), Some(2.5));
    }

    #[test]
    fn test_rolling_median_windows_before_sorting() {
        // Old large values must fall out of the window before sorting
        let mut values = vec![1000.0; 5];
        values.extend((1..=14).map(|v| v as f64));
        let series = ObservationSeries::new(values);
        assert_eq!(series.rolling_median(14), Some(7.5));
    }

    #[test]
    fn test_zscore_requires_two_observations() {
        let series = ObservationSeries::new([42.0]);
        assert_eq!(series.zscore(ZSCORE_WINDOW), None);
    }

    #[test]
    fn test_zscore_flat_window_is_zero() {
        let series = ObservationSeries::new([7.0, 7.0, 7.0, 7.0]);
        assert_eq!(series.zscore(ZSCORE_WINDOW), Some(0.0));
    }

    #[test]
    fn test_zscore_population_std_dev() {
        // mean 5, population std dev 2
        let series = ObservationSeries::new([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((series.zscore(ZSCORE_WINDOW).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_values_dropped() {
        let series = ObservationSeries::new([1.0, f64::NAN, 3.0, f64::INFINITY]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.last(), Some(3.0));
    }

    #[test]
    fn test_relative_delta() {
        assert_eq!(relative_delta(Some(110.0), Some(100.0)).map(|d| (d * 100.0).round()), Some(10.0));
        assert_eq!(relative_delta(Some(1.0), Some(0.0)), None);
        assert_eq!(relative_delta(None, Some(1.0)), None);
    }
}

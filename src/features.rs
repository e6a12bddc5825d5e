//! Feature derivation
//!
//! This module turns a user's historical records into a point-in-time feature
//! snapshot: for every tracked variable, a table of aggregator name to value.
//! - Current value from the latest record
//! - Rolling means and median over observation windows
//! - Short vs long baseline delta and 28-observation z-score
//! - Derived ratios (max heart rate as a share of the user's maximum)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::baseline::{
    relative_delta, ObservationSeries, DEFAULT_BASELINE_WINDOW, SHORT_WINDOW, WEEK_WINDOW,
    ZSCORE_WINDOW,
};
use crate::normalizer::Normalizer;
use crate::types::HistoricalRecord;

/// Variables computed when the caller does not name its own set
pub const DEFAULT_FIELDS: &[&str] = &[
    "steps",
    "minutes_light",
    "minutes_moderate",
    "minutes_vigorous",
    "heart_rate_average_bpm",
    "max_heart_rate_bpm",
    "min_heart_rate_bpm",
    "resting_heart_rate",
    "user_max_heart_rate_bpm",
    "heart_rate_variability_sdnn",
    "rem_sleep_minutes",
    "asleep_state_minutes",
    "deep_sleep_state_minutes",
    "light_sleep_state_minutes",
    "awake_state_minutes",
    "avg_breaths_per_min",
    "acwr",
    "trimp",
    "readiness_score",
    "hrv_rhr_ratio",
];

/// Derived variable: max heart rate over the user's max heart rate
pub const MAX_HR_PCT_USER_MAX: &str = "max_hr_pct_user_max";

const MAX_HEART_RATE: &str = "max_heart_rate_bpm";
const USER_MAX_HEART_RATE: &str = "user_max_heart_rate_bpm";

/// Named statistical transform applied to a variable's series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    Current,
    #[serde(rename = "mean_3d")]
    Mean3d,
    #[serde(rename = "mean_7d")]
    Mean7d,
    #[serde(rename = "mean_14d")]
    Mean14d,
    #[serde(rename = "median_14d")]
    Median14d,
    #[serde(rename = "delta_pct_3v14")]
    DeltaPct3v14,
    #[serde(rename = "zscore_28d")]
    Zscore28d,
}

impl Aggregator {
    pub const ALL: [Aggregator; 7] = [
        Aggregator::Current,
        Aggregator::Mean3d,
        Aggregator::Mean7d,
        Aggregator::Mean14d,
        Aggregator::Median14d,
        Aggregator::DeltaPct3v14,
        Aggregator::Zscore28d,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregator::Current => "current",
            Aggregator::Mean3d => "mean_3d",
            Aggregator::Mean7d => "mean_7d",
            Aggregator::Mean14d => "mean_14d",
            Aggregator::Median14d => "median_14d",
            Aggregator::DeltaPct3v14 => "delta_pct_3v14",
            Aggregator::Zscore28d => "zscore_28d",
        }
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Aggregator::ALL
            .into_iter()
            .find(|agg| agg.as_str() == s)
            .ok_or_else(|| format!("unknown aggregator '{s}'"))
    }
}

/// Variable → aggregator → value table for one user as of one date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSnapshot {
    variables: BTreeMap<String, BTreeMap<String, Option<f64>>>,
}

impl FeatureSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `var` under aggregator `agg`, if present and non-null
    pub fn get(&self, var: &str, agg: &str) -> Option<f64> {
        self.variables.get(var)?.get(agg).copied().flatten()
    }

    /// Whether the snapshot has an entry (possibly null) for `var`/`agg`
    pub fn contains(&self, var: &str, agg: &str) -> bool {
        self.variables
            .get(var)
            .is_some_and(|aggs| aggs.contains_key(agg))
    }

    pub fn insert(&mut self, var: impl Into<String>, agg: Aggregator, value: Option<f64>) {
        self.variables
            .entry(var.into())
            .or_default()
            .insert(agg.as_str().to_string(), value);
    }

    pub fn variable(&self, var: &str) -> Option<&BTreeMap<String, Option<f64>>> {
        self.variables.get(var)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Builds feature snapshots from historical records
#[derive(Debug, Clone)]
pub struct FeatureAggregator {
    fields: Vec<String>,
}

impl Default for FeatureAggregator {
    fn default() -> Self {
        Self::with_fields(DEFAULT_FIELDS.iter().copied())
    }
}

impl FeatureAggregator {
    /// Aggregator over a custom set of numeric fields
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Build the snapshot for `user_id` as of `target_date`.
    ///
    /// Records belonging to other users or dated after the target are ignored.
    /// Returns an empty snapshot when nothing remains.
    pub fn build(
        &self,
        records: &[HistoricalRecord],
        user_id: &str,
        target_date: NaiveDate,
    ) -> FeatureSnapshot {
        let mut history: Vec<&HistoricalRecord> = records
            .iter()
            .filter(|r| r.user_id == user_id && r.date <= target_date)
            .collect();

        let mut snapshot = FeatureSnapshot::new();
        if history.is_empty() {
            tracing::debug!(user_id, %target_date, "no history up to target date");
            return snapshot;
        }

        // Stable: same-day records keep their supplied order
        history.sort_by_key(|r| r.date);

        let latest = history[history.len() - 1];

        for field in &self.fields {
            let current = latest.value(field).and_then(Normalizer::to_number);
            let series = ObservationSeries::new(
                history
                    .iter()
                    .filter_map(|r| r.value(field).and_then(Normalizer::to_number)),
            );

            let mean_3d = series.rolling_mean(SHORT_WINDOW);
            let mean_14d = series.rolling_mean(DEFAULT_BASELINE_WINDOW);

            snapshot.insert(field.as_str(), Aggregator::Current, current);
            snapshot.insert(field.as_str(), Aggregator::Mean3d, mean_3d);
            snapshot.insert(field.as_str(), Aggregator::Mean7d, series.rolling_mean(WEEK_WINDOW));
            snapshot.insert(field.as_str(), Aggregator::Mean14d, mean_14d);
            snapshot.insert(
                field.as_str(),
                Aggregator::Median14d,
                series.rolling_median(DEFAULT_BASELINE_WINDOW),
            );
            snapshot.insert(
                field.as_str(),
                Aggregator::DeltaPct3v14,
                relative_delta(mean_3d, mean_14d),
            );
            snapshot.insert(field.as_str(), Aggregator::Zscore28d, series.zscore(ZSCORE_WINDOW));
        }

        derive_max_hr_pct(&mut snapshot);

        tracing::debug!(
            user_id,
            %target_date,
            variables = snapshot.len(),
            records = history.len(),
            "built feature snapshot"
        );

        snapshot
    }
}

/// Max heart rate as a fraction of the user's max heart rate
fn derive_max_hr_pct(snapshot: &mut FeatureSnapshot) {
    let max_hr = snapshot.get(MAX_HEART_RATE, Aggregator::Current.as_str());
    let user_max = snapshot.get(USER_MAX_HEART_RATE, Aggregator::Current.as_str());

    if let (Some(max_hr), Some(user_max)) = (max_hr, user_max) {
        if user_max != 0.0 {
            snapshot.insert(MAX_HR_PCT_USER_MAX, Aggregator::Current, Some(max_hr / user_max));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn steps_history(values: &[f64]) -> Vec<HistoricalRecord> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| HistoricalRecord::new("u1", day(i as u32 + 1)).with_value("steps", *v))
            .collect()
    }

    #[test]
    fn test_three_observation_mean() {
        let records = steps_history(&[1000.0, 2000.0, 3000.0]);
        let snapshot = FeatureAggregator::default().build(&records, "u1", day(3));

        assert_eq!(snapshot.get("steps", "current"), Some(3000.0));
        assert_eq!(snapshot.get("steps", "mean_3d"), Some(2000.0));
        assert_eq!(snapshot.get("steps", "mean_14d"), Some(2000.0));
        assert_eq!(snapshot.get("steps", "median_14d"), Some(2000.0));
        assert_eq!(snapshot.get("steps", "delta_pct_3v14"), Some(0.0));
    }

    #[test]
    fn test_future_records_ignored() {
        let records = steps_history(&[1000.0, 2000.0, 3000.0, 9000.0]);
        let snapshot = FeatureAggregator::default().build(&records, "u1", day(3));
        assert_eq!(snapshot.get("steps", "current"), Some(3000.0));
    }

    #[test]
    fn test_other_users_ignored() {
        let mut records = steps_history(&[1000.0]);
        records.push(HistoricalRecord::new("u2", day(1)).with_value("steps", 50000));
        let snapshot = FeatureAggregator::default().build(&records, "u1", day(5));
        assert_eq!(snapshot.get("steps", "mean_7d"), Some(1000.0));
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let records = vec![
            HistoricalRecord::new("u1", day(3)).with_value("steps", 3000),
            HistoricalRecord::new("u1", day(1)).with_value("steps", 1000),
            HistoricalRecord::new("u1", day(2)).with_value("steps", 2000),
        ];
        let snapshot = FeatureAggregator::default().build(&records, "u1", day(3));
        assert_eq!(snapshot.get("steps", "current"), Some(3000.0));
    }

    #[test]
    fn test_windows_count_observations_not_days() {
        // Gaps between dates and missing values do not shrink the window
        let records = vec![
            HistoricalRecord::new("u1", day(1)).with_value("steps", 100),
            HistoricalRecord::new("u1", day(10)).with_value("steps", 200),
            HistoricalRecord::new("u1", day(11)).with_value("steps", json!(null)),
            HistoricalRecord::new("u1", day(20)).with_value("steps", 300),
            HistoricalRecord::new("u1", day(30)).with_value("steps", 400),
        ];
        let snapshot = FeatureAggregator::default().build(&records, "u1", day(30));
        assert_eq!(snapshot.get("steps", "mean_3d"), Some(300.0));
    }

    #[test]
    fn test_current_absent_when_latest_missing() {
        let records = vec![
            HistoricalRecord::new("u1", day(1)).with_value("steps", 1000),
            HistoricalRecord::new("u1", day(2)).with_value("readiness_score", 70),
        ];
        let snapshot = FeatureAggregator::default().build(&records, "u1", day(2));

        assert!(snapshot.contains("steps", "current"));
        assert_eq!(snapshot.get("steps", "current"), None);
        assert_eq!(snapshot.get("steps", "mean_3d"), Some(1000.0));
    }

    #[test]
    fn test_unparsable_values_are_absent() {
        let records = vec![
            HistoricalRecord::new("u1", day(1)).with_value("steps", "1000"),
            HistoricalRecord::new("u1", day(2)).with_value("steps", "broken"),
        ];
        let snapshot = FeatureAggregator::default().build(&records, "u1", day(2));
        assert_eq!(snapshot.get("steps", "current"), None);
        assert_eq!(snapshot.get("steps", "mean_3d"), Some(1000.0));
    }

    #[test]
    fn test_zscore_nullity_and_flat_window() {
        let single = steps_history(&[500.0]);
        let snapshot = FeatureAggregator::default().build(&single, "u1", day(1));
        assert_eq!(snapshot.get("steps", "zscore_28d"), None);

        let flat = steps_history(&[500.0, 500.0, 500.0]);
        let snapshot = FeatureAggregator::default().build(&flat, "u1", day(3));
        assert_eq!(snapshot.get("steps", "zscore_28d"), Some(0.0));
    }

    #[test]
    fn test_derived_max_hr_pct() {
        let records = vec![HistoricalRecord::new("u1", day(1))
            .with_value("max_heart_rate_bpm", 171)
            .with_value("user_max_heart_rate_bpm", 190)];
        let snapshot = FeatureAggregator::default().build(&records, "u1", day(1));

        let pct = snapshot.get(MAX_HR_PCT_USER_MAX, "current").unwrap();
        assert!((pct - 0.9).abs() < 1e-9);
        assert!(!snapshot.contains(MAX_HR_PCT_USER_MAX, "mean_3d"));
    }

    #[test]
    fn test_derived_max_hr_pct_zero_denominator() {
        let records = vec![HistoricalRecord::new("u1", day(1))
            .with_value("max_heart_rate_bpm", 171)
            .with_value("user_max_heart_rate_bpm", 0)];
        let snapshot = FeatureAggregator::default().build(&records, "u1", day(1));
        assert!(snapshot.variable(MAX_HR_PCT_USER_MAX).is_none());
    }

    #[test]
    fn test_empty_history() {
        let snapshot = FeatureAggregator::default().build(&[], "u1", day(1));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_custom_fields() {
        let records = vec![HistoricalRecord::new("u1", day(1)).with_value("mood", 4)];
        let snapshot = FeatureAggregator::with_fields(["mood"]).build(&records, "u1", day(1));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("mood", "current"), Some(4.0));
    }

    #[test]
    fn test_aggregator_names_round_trip() {
        for agg in Aggregator::ALL {
            assert_eq!(agg.as_str().parse::<Aggregator>(), Ok(agg));
        }
        assert!("mean_30d".parse::<Aggregator>().is_err());
    }

    #[test]
    fn test_snapshot_serializes_nulls() {
        let mut snapshot = FeatureSnapshot::new();
        snapshot.insert("steps", Aggregator::Current, Some(10.0));
        snapshot.insert("steps", Aggregator::Zscore28d, None);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value, json!({"steps": {"current": 10.0, "zscore_28d": null}}));
    }
}

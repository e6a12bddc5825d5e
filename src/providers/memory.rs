//! In-memory providers
//!
//! Used by the stateless JSON API, the CLI and tests. The audit log keeps
//! entries behind an `RwLock` so lookups run concurrently with inserts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::{AuditSink, HistoryProvider, RuleProvider};
use crate::error::EngineError;
use crate::types::{AuditEntry, HistoricalRecord, MessageId, Rule};

/// History keyed by user id
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    by_user: HashMap<String, Vec<HistoricalRecord>>,
}

impl InMemoryHistory {
    pub fn new(records: impl IntoIterator<Item = HistoricalRecord>) -> Self {
        let mut by_user: HashMap<String, Vec<HistoricalRecord>> = HashMap::new();
        for record in records {
            by_user.entry(record.user_id.clone()).or_default().push(record);
        }
        Self { by_user }
    }
}

impl HistoryProvider for InMemoryHistory {
    fn load_user_history(&self, user_id: &str) -> Result<Vec<HistoricalRecord>, EngineError> {
        Ok(self.by_user.get(user_id).cloned().unwrap_or_default())
    }
}

/// Fixed rule set
#[derive(Debug, Default)]
pub struct InMemoryRules {
    rules: Vec<Rule>,
}

impl InMemoryRules {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl RuleProvider for InMemoryRules {
    fn enabled_rules(&self, tenant_id: &str) -> Result<Vec<Rule>, EngineError> {
        let mut rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| r.enabled && r.tenant_id == tenant_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.severity.cmp(&a.severity))
        });
        Ok(rules)
    }
}

/// Daily fired count of one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// Fired counts of one rule over the requested range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSeries {
    pub rule_id: String,
    pub points: Vec<DailyCount>,
}

/// Fired counts per rule per day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerAnalytics {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub series: Vec<RuleSeries>,
}

/// Audit store with recency lookups
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<AuditEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Load entries from a JSON array
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let entries: Vec<AuditEntry> = serde_json::from_str(json)?;
        Ok(Self::with_entries(entries))
    }

    /// Serialize all entries as a JSON array
    pub fn to_json(&self) -> Result<String, EngineError> {
        let entries = self.entries();
        Ok(serde_json::to_string_pretty(&entries)?)
    }

    /// Snapshot of the stored entries, in insertion order
    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.with_read(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-rule daily fired counts for a tenant across `[start, end]`.
    ///
    /// Only rules that fired at least once in the range get a series; each
    /// series covers every day of the range, zero-filled. An empty `rule_ids`
    /// means all rules.
    pub fn trigger_analytics(
        &self,
        tenant_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        rule_ids: &[String],
    ) -> TriggerAnalytics {
        let mut counts: BTreeMap<String, HashMap<NaiveDate, u64>> = BTreeMap::new();
        self.with_read(|entries| {
            for entry in entries.iter().filter(|e| {
                e.fired
                    && e.tenant_id == tenant_id
                    && e.date >= start
                    && e.date <= end
                    && (rule_ids.is_empty() || rule_ids.contains(&e.rule_id))
            }) {
                *counts
                    .entry(entry.rule_id.clone())
                    .or_default()
                    .entry(entry.date)
                    .or_insert(0) += 1;
            }
        });

        let series = counts
            .into_iter()
            .map(|(rule_id, by_date)| RuleSeries {
                rule_id,
                points: start
                    .iter_days()
                    .take_while(|d| *d <= end)
                    .map(|date| DailyCount {
                        date,
                        count: by_date.get(&date).copied().unwrap_or(0),
                    })
                    .collect(),
            })
            .collect();

        TriggerAnalytics { start, end, series }
    }

    fn with_read<T>(&self, f: impl FnOnce(&[AuditEntry]) -> T) -> T {
        match self.entries.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

impl AuditSink for InMemoryAuditLog {
    fn was_message_fired_recently(
        &self,
        user_id: &str,
        rule_id: &str,
        message_id: MessageId,
        since: NaiveDate,
        before: NaiveDate,
    ) -> bool {
        self.with_read(|entries| {
            entries.iter().any(|e| {
                e.fired
                    && e.user_id == user_id
                    && e.rule_id == rule_id
                    && e.message_id == Some(message_id)
                    && e.date >= since
                    && e.date < before
            })
        })
    }

    fn was_rule_fired_recently(
        &self,
        user_id: &str,
        rule_id: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> bool {
        self.with_read(|entries| {
            entries.iter().any(|e| {
                e.fired
                    && e.user_id == user_id
                    && e.rule_id == rule_id
                    && e.date >= since
                    && e.date <= until
            })
        })
    }

    fn record(&self, entry: AuditEntry) {
        match self.entries.write() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::days_before;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn fired(user: &str, rule: &str, msg: MessageId, on: &str) -> AuditEntry {
        AuditEntry::new("default", user, date(on), rule, true, Some(msg))
    }

    #[test]
    fn test_history_grouped_by_user() {
        let history = InMemoryHistory::new(vec![
            HistoricalRecord::new("u1", date("2024-01-01")),
            HistoricalRecord::new("u2", date("2024-01-01")),
            HistoricalRecord::new("u1", date("2024-01-02")),
        ]);

        assert_eq!(history.load_user_history("u1").unwrap().len(), 2);
        assert!(history.load_user_history("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_rules_filtered_and_sorted() {
        let rules = InMemoryRules::new(vec![
            Rule::new("low", "sleep", json!({"all": []})).with_priority(10),
            Rule::new("off", "sleep", json!({"all": []})).with_priority(99).disabled(),
            Rule::new("other", "sleep", json!({"all": []})).with_tenant("acme"),
            Rule::new("high", "sleep", json!({"all": []})).with_priority(80),
            Rule::new("high-sev", "sleep", json!({"all": []}))
                .with_priority(80)
                .with_severity(3),
        ]);

        let ids: Vec<String> = rules
            .enabled_rules("default")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["high-sev", "high", "low"]);
    }

    #[test]
    fn test_message_lookup_is_half_open() {
        let log = InMemoryAuditLog::new();
        log.record(fired("u1", "r1", 7, "2024-03-10"));

        assert!(log.was_message_fired_recently("u1", "r1", 7, date("2024-03-10"), date("2024-03-11")));
        assert!(!log.was_message_fired_recently("u1", "r1", 7, date("2024-03-01"), date("2024-03-10")));
        assert!(!log.was_message_fired_recently("u1", "r1", 8, date("2024-03-01"), date("2024-03-11")));
        assert!(!log.was_message_fired_recently("u2", "r1", 7, date("2024-03-01"), date("2024-03-11")));
    }

    #[test]
    fn test_rule_lookup_is_inclusive_and_ignores_unfired() {
        let log = InMemoryAuditLog::new();
        log.record(fired("u1", "r1", 1, "2024-03-10"));
        log.record(AuditEntry::new("default", "u1", date("2024-03-12"), "r2", false, None));

        assert!(log.was_rule_fired_recently("u1", "r1", date("2024-03-03"), date("2024-03-10")));
        assert!(!log.was_rule_fired_recently("u1", "r1", date("2024-03-11"), date("2024-03-14")));
        assert!(!log.was_rule_fired_recently("u1", "r2", date("2024-03-01"), date("2024-03-14")));
    }

    #[test]
    fn test_json_round_trip_through_log() {
        let log = InMemoryAuditLog::with_entries(vec![fired("u1", "r1", 1, "2024-03-10")]);
        let json = log.to_json().unwrap();

        let restored = InMemoryAuditLog::from_json(&json).unwrap();
        assert_eq!(restored.entries(), log.entries());
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_trigger_analytics_zero_fills() {
        let log = InMemoryAuditLog::new();
        log.record(fired("u1", "r1", 1, "2024-03-01"));
        log.record(fired("u2", "r1", 1, "2024-03-01"));
        log.record(fired("u1", "r1", 1, "2024-03-03"));
        log.record(fired("u1", "r2", 1, "2024-03-02"));
        log.record(fired("u1", "r1", 1, "2024-04-01"));
        log.record(AuditEntry::new("default", "u1", date("2024-03-02"), "r3", false, None));

        let analytics = log.trigger_analytics("default", date("2024-03-01"), date("2024-03-03"), &[]);
        assert_eq!(analytics.series.len(), 2);

        let r1 = &analytics.series[0];
        assert_eq!(r1.rule_id, "r1");
        let counts: Vec<u64> = r1.points.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![2, 0, 1]);

        let only_r2 = log.trigger_analytics(
            "default",
            date("2024-03-01"),
            date("2024-03-03"),
            &["r2".to_string()],
        );
        assert_eq!(only_r2.series.len(), 1);
        assert_eq!(only_r2.series[0].rule_id, "r2");

        assert!(log
            .trigger_analytics("acme", date("2024-03-01"), date("2024-03-03"), &[])
            .series
            .is_empty());
    }

    #[test]
    fn test_days_before() {
        assert_eq!(days_before(date("2024-03-01"), 1), date("2024-02-29"));
        assert_eq!(days_before(date("2024-03-01"), 0), date("2024-03-01"));
    }
}

//! Collaborator interfaces
//!
//! The engine reads history and rules and writes audits through these traits.
//! Implementations must be `Send + Sync` so one engine can serve concurrent
//! evaluations for different users.

mod memory;

pub use memory::{DailyCount, InMemoryAuditLog, InMemoryHistory, InMemoryRules, RuleSeries, TriggerAnalytics};

use chrono::{Days, NaiveDate};

use crate::error::EngineError;
use crate::types::{AuditEntry, HistoricalRecord, MessageId, Rule};

/// Source of a user's historical daily records
pub trait HistoryProvider: Send + Sync {
    /// All records for the user, in any order
    fn load_user_history(&self, user_id: &str) -> Result<Vec<HistoricalRecord>, EngineError>;
}

/// Source of rule definitions
pub trait RuleProvider: Send + Sync {
    /// Enabled rules of a tenant, ordered by priority then severity, both descending
    fn enabled_rules(&self, tenant_id: &str) -> Result<Vec<Rule>, EngineError>;
}

/// Audit lookups and persistence
pub trait AuditSink: Send + Sync {
    /// Whether the message was fired for (user, rule) on a date in `[since, before)`
    fn was_message_fired_recently(
        &self,
        user_id: &str,
        rule_id: &str,
        message_id: MessageId,
        since: NaiveDate,
        before: NaiveDate,
    ) -> bool;

    /// Whether the rule fired for the user on a date in `[since, until]`
    fn was_rule_fired_recently(
        &self,
        user_id: &str,
        rule_id: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> bool;

    /// Persist one evaluation outcome
    fn record(&self, entry: AuditEntry);
}

/// `date - days`, clamped at the minimum representable date
pub(crate) fn days_before(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

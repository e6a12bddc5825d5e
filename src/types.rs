//! Core types for the Synheart Rules engine
//!
//! This module defines the data structures that flow through each stage of an
//! evaluation: historical records in, rules and their messages, audit entries,
//! and the recommendation events that come out.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::dsl::{self, ConditionNode, TraceRecord};
use crate::error::DslError;
use crate::features::FeatureSnapshot;

/// Identifier of a rule message
pub type MessageId = u32;

/// Tenant used when a document does not name one
pub const DEFAULT_TENANT: &str = "default";

/// Locale used when a rule does not name one
pub const DEFAULT_LOCALE: &str = "es-ES";

/// One day of raw wearable/sleep values for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub user_id: String,
    pub date: NaiveDate,
    /// Raw column values, keyed by variable name. Values may be numbers,
    /// numeric strings, or anything else (treated as absent).
    #[serde(flatten)]
    pub values: HashMap<String, serde_json::Value>,
}

impl HistoricalRecord {
    pub fn new(user_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            date,
            values: HashMap::new(),
        }
    }

    /// Builder-style setter for a raw value
    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn value(&self, field: &str) -> Option<&serde_json::Value> {
        self.values.get(field)
    }
}

/// A candidate message attached to a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Template text, may contain `{{ var:agg:fmt }}` placeholders
    pub text: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Message {
    pub fn new(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            weight: 1,
            active: true,
            locale: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// A personalized recommendation rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    pub category: String,
    /// 0-100, higher wins conflicts
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// 1-3
    #[serde(default = "default_severity")]
    pub severity: u8,
    /// 0-30, minimum days between firings for the same user
    #[serde(default)]
    pub cooldown_days: u32,
    /// 0-10. Carried with the rule but not enforced by post-processing.
    #[serde(default)]
    pub max_per_day: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Stored condition logic in its JSON wire format
    pub logic: serde_json::Value,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(skip)]
    condition: OnceLock<Result<ConditionNode, DslError>>,
}

impl Rule {
    pub fn new(id: impl Into<String>, category: impl Into<String>, logic: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            version: default_version(),
            enabled: true,
            tenant_id: default_tenant(),
            category: category.into(),
            priority: default_priority(),
            severity: default_severity(),
            cooldown_days: 0,
            max_per_day: 0,
            tags: Vec::new(),
            logic,
            locale: default_locale(),
            messages: Vec::new(),
            condition: OnceLock::new(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_severity(mut self, severity: u8) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_cooldown_days(mut self, days: u32) -> Self {
        self.cooldown_days = days;
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Parsed condition tree.
    ///
    /// The logic is parsed on first access and cached for the lifetime of this
    /// `Rule` value; a rule reloaded from its provider parses again.
    pub fn condition(&self) -> Result<&ConditionNode, DslError> {
        self.condition
            .get_or_init(|| dsl::parse(&self.logic))
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn active_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.active)
    }
}

/// A recommendation produced for a user on a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationEvent {
    pub date: NaiveDate,
    pub tenant_id: String,
    pub user_id: String,
    pub rule_id: String,
    pub category: String,
    pub severity: u8,
    pub priority: u8,
    pub message_id: MessageId,
    pub message_text: String,
    pub locale: String,
    /// Condition trace that made the rule fire
    pub why: Vec<TraceRecord>,
}

/// One persisted evaluation outcome (one per rule per call)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub rule_id: String,
    pub fired: bool,
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discarded_reason: Option<String>,
    #[serde(default)]
    pub why: Vec<TraceRecord>,
    #[serde(default)]
    pub features: FeatureSnapshot,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Minimal entry for a rule outcome; trace and features start empty
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        date: NaiveDate,
        rule_id: impl Into<String>,
        fired: bool,
        message_id: Option<MessageId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            date,
            rule_id: rule_id.into(),
            fired,
            message_id,
            discarded_reason: None,
            why: Vec::new(),
            features: FeatureSnapshot::default(),
            created_at: Utc::now(),
        }
    }
}

/// Per-rule debug information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDebugInfo {
    pub rule_id: String,
    pub fired: bool,
    pub priority: u8,
    pub severity: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    pub why: Vec<TraceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub render_warnings: Vec<String>,
}

/// Debug section of an evaluation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub feature_snapshot: FeatureSnapshot,
    pub rule_count: usize,
    pub events_before_postprocess: usize,
    pub rules: Vec<RuleDebugInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of evaluating every rule for one user and date
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Events that survived cooldowns and caps
    pub events: Vec<RecommendationEvent>,
    /// Every event that fired, before post-processing
    #[serde(default)]
    pub fired_events: Vec<RecommendationEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

fn default_weight() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

fn default_priority() -> u8 {
    50
}

fn default_severity() -> u8 {
    1
}

fn default_tenant() -> String {
    DEFAULT_TENANT.to_string()
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

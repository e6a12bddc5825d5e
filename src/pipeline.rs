//! Rule orchestration
//!
//! This module provides the public API for Synheart Rules. One evaluation runs
//! per (user, date, tenant):
//! 1. FeatureAggregator - Build the feature snapshot from history
//! 2. Condition tree - Evaluate every enabled rule against the snapshot
//! 3. MessageSelector / TemplateRenderer - Pick and fill a message for fired rules
//! 4. AuditSink - Record one outcome per rule
//! 5. PostProcessor - Apply cooldowns and daily caps

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::features::{FeatureAggregator, FeatureSnapshot};
use crate::messages::{MessageSelector, TemplateRenderer};
use crate::normalizer::parse_date;
use crate::postprocess::{ConflictResolver, PostProcessor};
use crate::providers::{AuditSink, HistoryProvider, InMemoryAuditLog, InMemoryHistory, InMemoryRules, RuleProvider};
use crate::schema::HistoryLoader;
use crate::types::{
    AuditEntry, DebugInfo, EvaluationResult, RecommendationEvent, Rule, RuleDebugInfo,
};

/// Audit reason for a rule whose condition held but had nothing to send
pub const NO_ELIGIBLE_MESSAGE: &str = "no_eligible_message";

/// Audit reason prefix for a rule whose logic could not be parsed
pub const LOGIC_ERROR: &str = "logic_error";

/// Evaluates a tenant's rules for one user and date.
///
/// The engine holds no per-user state; it is `Send + Sync` and can serve
/// concurrent evaluations for different users.
pub struct RulesEngine {
    history: Arc<dyn HistoryProvider>,
    rules: Arc<dyn RuleProvider>,
    audits: Arc<dyn AuditSink>,
    config: EngineConfig,
    aggregator: FeatureAggregator,
    selector: MessageSelector,
    renderer: TemplateRenderer,
    post: PostProcessor,
}

/// Outcome of one rule within an evaluation
struct RuleOutcome {
    event: Option<RecommendationEvent>,
    audit: AuditEntry,
    debug: RuleDebugInfo,
}

impl RulesEngine {
    pub fn new(
        history: Arc<dyn HistoryProvider>,
        rules: Arc<dyn RuleProvider>,
        audits: Arc<dyn AuditSink>,
        config: EngineConfig,
    ) -> Self {
        let aggregator = match &config.fields {
            Some(fields) => FeatureAggregator::with_fields(fields.iter().cloned()),
            None => FeatureAggregator::default(),
        };
        let resolver = ConflictResolver::new(
            config.max_recs_per_day,
            config.max_recs_per_category_per_day,
        );

        Self {
            history,
            rules,
            audits,
            selector: MessageSelector::new(config.anti_repeat_days),
            renderer: TemplateRenderer::new(),
            post: PostProcessor::new(resolver),
            aggregator,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Feature snapshot of a user as of `date`
    pub fn features(&self, user_id: &str, date: NaiveDate) -> Result<FeatureSnapshot, EngineError> {
        let history = self.history.load_user_history(user_id)?;
        if history.is_empty() {
            tracing::warn!(user_id, "user has no history");
        }
        Ok(self.aggregator.build(&history, user_id, date))
    }

    /// Evaluate with the thread-local random generator.
    ///
    /// `tenant_id` falls back to the configured default tenant.
    pub fn evaluate_user(
        &self,
        user_id: &str,
        date: NaiveDate,
        tenant_id: Option<&str>,
        debug: bool,
    ) -> Result<EvaluationResult, EngineError> {
        let mut rng = rand::thread_rng();
        self.evaluate_user_with_rng(user_id, date, tenant_id, debug, &mut rng)
    }

    /// Evaluate with a caller-supplied random generator for message selection
    pub fn evaluate_user_with_rng<R>(
        &self,
        user_id: &str,
        date: NaiveDate,
        tenant_id: Option<&str>,
        debug: bool,
        rng: &mut R,
    ) -> Result<EvaluationResult, EngineError>
    where
        R: Rng + ?Sized,
    {
        let tenant_id = tenant_id.unwrap_or(self.config.default_tenant.as_str());
        tracing::info!(user_id, %date, tenant_id, "evaluating rules");

        let snapshot = self.features(user_id, date)?;
        if snapshot.is_empty() {
            tracing::info!(user_id, %date, "no history up to date, skipping rules");
            return Ok(EvaluationResult {
                debug: debug.then(|| DebugInfo {
                    feature_snapshot: snapshot,
                    rule_count: 0,
                    events_before_postprocess: 0,
                    rules: Vec::new(),
                    message: Some(format!("no history for user {user_id} up to {date}")),
                }),
                ..EvaluationResult::default()
            });
        }

        let mut rules = self.rules.enabled_rules(tenant_id)?;
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.severity.cmp(&a.severity))
        });

        let mut fired = Vec::new();
        let mut rule_debug = Vec::with_capacity(rules.len());

        for rule in &rules {
            let outcome = self.evaluate_rule(rule, &snapshot, user_id, date, tenant_id, rng);
            self.audits.record(outcome.audit);
            fired.extend(outcome.event);
            if debug {
                rule_debug.push(outcome.debug);
            }
        }

        let fired_count = fired.len();
        let events = self.post.process(fired.clone(), &rules, self.audits.as_ref(), date);

        tracing::info!(
            user_id,
            %date,
            tenant_id,
            rules = rules.len(),
            fired = fired_count,
            delivered = events.len(),
            "evaluation complete"
        );

        Ok(EvaluationResult {
            events,
            fired_events: fired,
            debug: debug.then(|| DebugInfo {
                feature_snapshot: snapshot,
                rule_count: rules.len(),
                events_before_postprocess: fired_count,
                rules: rule_debug,
                message: None,
            }),
        })
    }

    fn evaluate_rule<R>(
        &self,
        rule: &Rule,
        snapshot: &FeatureSnapshot,
        user_id: &str,
        date: NaiveDate,
        tenant_id: &str,
        rng: &mut R,
    ) -> RuleOutcome
    where
        R: Rng + ?Sized,
    {
        let mut audit = AuditEntry::new(tenant_id, user_id, date, rule.id.as_str(), false, None);
        audit.features = snapshot.clone();
        let mut debug = RuleDebugInfo {
            rule_id: rule.id.clone(),
            fired: false,
            priority: rule.priority,
            severity: rule.severity,
            message_id: None,
            why: Vec::new(),
            error: None,
            render_warnings: Vec::new(),
        };

        let node = match rule.condition() {
            Ok(node) => node,
            Err(e) => {
                tracing::error!(rule_id = %rule.id, error = %e, "rule logic is malformed");
                audit.discarded_reason = Some(format!("{LOGIC_ERROR}: {e}"));
                debug.error = Some(e.to_string());
                return RuleOutcome {
                    event: None,
                    audit,
                    debug,
                };
            }
        };

        let (holds, trace) = node.eval(snapshot);
        let why = vec![trace];
        audit.why = why.clone();
        debug.why = why.clone();

        if !holds {
            tracing::debug!(rule_id = %rule.id, "rule did not fire");
            return RuleOutcome {
                event: None,
                audit,
                debug,
            };
        }

        let Some(message) = self
            .selector
            .select(rule, user_id, date, self.audits.as_ref(), rng)
        else {
            tracing::warn!(rule_id = %rule.id, "rule fired without an eligible message");
            audit.discarded_reason = Some(NO_ELIGIBLE_MESSAGE.to_string());
            debug.error = Some(NO_ELIGIBLE_MESSAGE.to_string());
            return RuleOutcome {
                event: None,
                audit,
                debug,
            };
        };

        let rendered = self.renderer.render(&message.text, snapshot);
        for warning in &rendered.warnings {
            tracing::debug!(rule_id = %rule.id, message_id = message.id, %warning, "render warning");
        }

        tracing::debug!(rule_id = %rule.id, message_id = message.id, "rule fired");
        audit.fired = true;
        audit.message_id = Some(message.id);
        debug.fired = true;
        debug.message_id = Some(message.id);
        debug.render_warnings = rendered.warnings.iter().map(ToString::to_string).collect();

        let event = RecommendationEvent {
            date,
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            rule_id: rule.id.clone(),
            category: rule.category.clone(),
            severity: rule.severity,
            priority: rule.priority,
            message_id: message.id,
            message_text: rendered.text,
            locale: self.locale_for(rule, message.locale.as_deref()),
            why,
        };

        RuleOutcome {
            event: Some(event),
            audit,
            debug,
        }
    }

    fn locale_for(&self, rule: &Rule, message_locale: Option<&str>) -> String {
        [message_locale, Some(rule.locale.as_str())]
            .into_iter()
            .flatten()
            .find(|l| !l.trim().is_empty())
            .unwrap_or(self.config.default_locale.as_str())
            .to_string()
    }
}

/// Stateless simulation request
#[derive(Debug, Deserialize)]
struct SimulateRequest {
    user_id: String,
    date: String,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    history: Vec<Map<String, Value>>,
    #[serde(default)]
    rules: Vec<Rule>,
    #[serde(default)]
    audits: Vec<AuditEntry>,
    #[serde(default)]
    config: Option<EngineConfig>,
}

/// Stateless feature request
#[derive(Debug, Deserialize)]
struct FeaturesRequest {
    user_id: String,
    date: String,
    #[serde(default)]
    history: Vec<Map<String, Value>>,
    #[serde(default)]
    fields: Option<Vec<String>>,
}

/// Evaluate a self-contained simulation request.
///
/// The request carries history rows, rules, prior audits and optional config;
/// the response is the evaluation result as JSON. A `seed` makes message
/// selection reproducible.
///
/// # Example
/// ```ignore
/// let result = simulate_json(r#"{
///     "user_id": "u1",
///     "date": "2024-06-10",
///     "history": [{"user_id": "u1", "date": "2024-06-10", "steps": 1200}],
///     "rules": [...]
/// }"#)?;
/// ```
pub fn simulate_json(request: &str) -> Result<String, EngineError> {
    let request: SimulateRequest = serde_json::from_str(request)?;
    let date = request_date(&request.date)?;
    let config = request.config.unwrap_or_default();
    config.validate()?;

    let engine = RulesEngine::new(
        Arc::new(InMemoryHistory::new(HistoryLoader::from_rows(request.history))),
        Arc::new(InMemoryRules::new(request.rules)),
        Arc::new(InMemoryAuditLog::with_entries(request.audits)),
        config,
    );

    let mut rng = match request.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let result = engine.evaluate_user_with_rng(
        &request.user_id,
        date,
        request.tenant_id.as_deref(),
        request.debug,
        &mut rng,
    )?;

    Ok(serde_json::to_string(&result)?)
}

/// Build the feature snapshot for a self-contained request and return it as JSON
pub fn features_json(request: &str) -> Result<String, EngineError> {
    let request: FeaturesRequest = serde_json::from_str(request)?;
    let date = request_date(&request.date)?;

    let aggregator = match request.fields {
        Some(fields) => FeatureAggregator::with_fields(fields),
        None => FeatureAggregator::default(),
    };
    let records = HistoryLoader::from_rows(request.history);
    let snapshot = aggregator.build(&records, &request.user_id, date);

    Ok(serde_json::to_string(&snapshot)?)
}

fn request_date(raw: &str) -> Result<NaiveDate, EngineError> {
    parse_date(raw).ok_or_else(|| EngineError::DateParseError(raw.to_string()))
}
